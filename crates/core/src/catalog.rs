//! Exam catalog.
//!
//! The catalog document lists categories and exam templates:
//!
//! ```json
//! {
//!   "categorias": [{"id": "cardiologia", "nome": "Cardiologia", "icone": "fa-heartbeat"}],
//!   "exames": [{
//!     "id": "ecg", "nome": "Eletrocardiograma", "descricao": "ECG de repouso",
//!     "categoria": "cardiologia", "icone": "fa-heartbeat",
//!     "campos": [{"id": "ritmo", "tipo": "select", "label": "Ritmo",
//!                 "opcoes": [{"valor": "sinusal", "label": "Sinusal"}]}]
//!   }]
//! }
//! ```
//!
//! Templates are immutable once loaded and shared as `Arc<ExamTemplate>`. A missing or broken
//! catalog is never fatal: [`ExamCatalog::load`] falls back to a built-in generic template.

use crate::constants::ALL_CATEGORIES;
use crate::{LaudoError, LaudoResult};
use laudo_types::lenient;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(rename = "nome", default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(rename = "icone", default, deserialize_with = "lenient::text")]
    pub icon: String,
}

/// One choice of a select field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawOption")]
pub struct SelectOption {
    #[serde(rename = "valor")]
    pub value: String,
    pub label: String,
}

/// Catalogs write options as `{valor, label}` objects or as bare scalars.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawOption {
    Full {
        #[serde(rename = "valor", default, deserialize_with = "lenient::text")]
        value: String,
        #[serde(default, deserialize_with = "lenient::optional_text")]
        label: Option<String>,
    },
    Bare(#[serde(deserialize_with = "lenient::text")] String),
}

impl From<RawOption> for SelectOption {
    fn from(raw: RawOption) -> Self {
        match raw {
            RawOption::Bare(value) => SelectOption {
                label: value.clone(),
                value,
            },
            RawOption::Full { value, label } => SelectOption {
                label: label.unwrap_or_else(|| value.clone()),
                value,
            },
        }
    }
}

/// Input kind of an exam field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Rendered in the observations block rather than the results list.
    TextArea,
    Select(Vec<SelectOption>),
    /// `step` is kept as written in the catalog (e.g. `"0.1"`); `None` means any.
    Number(Option<String>),
}

impl FieldKind {
    fn tag(&self) -> &'static str {
        match self {
            FieldKind::Text => "texto",
            FieldKind::TextArea => "textarea",
            FieldKind::Select(_) => "select",
            FieldKind::Number(_) => "numero",
        }
    }
}

/// A field of an exam template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawField", into = "RawField")]
pub struct FieldDefinition {
    pub id: String,
    pub kind: FieldKind,
    pub label: String,
    pub placeholder: String,
}

impl FieldDefinition {
    /// Checks `value` against the field kind.
    ///
    /// An empty value is always accepted (it clears the field).
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::InvalidInput` if a select value is not one of the options, or a
    /// number value does not parse as a finite decimal.
    pub fn check_value(&self, value: &str) -> LaudoResult<()> {
        if value.is_empty() {
            return Ok(());
        }
        match &self.kind {
            FieldKind::Text | FieldKind::TextArea => Ok(()),
            FieldKind::Select(options) => {
                if options.iter().any(|o| o.value == value) {
                    Ok(())
                } else {
                    Err(LaudoError::InvalidInput(format!(
                        "{:?} is not an option of field {}",
                        value, self.id
                    )))
                }
            }
            FieldKind::Number(_) => match value.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(()),
                _ => Err(LaudoError::InvalidInput(format!(
                    "field {} expects a number, got {:?}",
                    self.id, value
                ))),
            },
        }
    }

    pub fn is_textarea(&self) -> bool {
        matches!(self.kind, FieldKind::TextArea)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawField {
    #[serde(default, deserialize_with = "lenient::text")]
    id: String,
    #[serde(default, deserialize_with = "lenient::text")]
    tipo: String,
    #[serde(default, deserialize_with = "lenient::text")]
    label: String,
    #[serde(default, deserialize_with = "lenient::text")]
    placeholder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    opcoes: Option<Vec<SelectOption>>,
    /// Written as a JSON number or string.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_text"
    )]
    step: Option<String>,
}

impl From<RawField> for FieldDefinition {
    fn from(raw: RawField) -> Self {
        let kind = match raw.tipo.trim().to_ascii_lowercase().as_str() {
            "textarea" => FieldKind::TextArea,
            "select" => FieldKind::Select(raw.opcoes.unwrap_or_default()),
            "numero" | "number" => FieldKind::Number(raw.step),
            _ => FieldKind::Text,
        };
        FieldDefinition {
            id: raw.id,
            kind,
            label: raw.label,
            placeholder: raw.placeholder,
        }
    }
}

impl From<FieldDefinition> for RawField {
    fn from(field: FieldDefinition) -> Self {
        let tipo = field.kind.tag().to_string();
        let (opcoes, step) = match field.kind {
            FieldKind::Select(options) => (Some(options), None),
            FieldKind::Number(step) => (None, step),
            FieldKind::Text | FieldKind::TextArea => (None, None),
        };
        RawField {
            id: field.id,
            tipo,
            label: field.label,
            placeholder: field.placeholder,
            opcoes,
            step,
        }
    }
}

/// A named, categorized set of field definitions.
///
/// Every key defaults so that a draft's embedded snapshot of a template decodes even when it was
/// written by an older catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamTemplate {
    #[serde(default, deserialize_with = "lenient::text")]
    pub id: String,
    #[serde(rename = "nome", default, deserialize_with = "lenient::text")]
    pub name: String,
    #[serde(rename = "descricao", default, deserialize_with = "lenient::text")]
    pub description: String,
    #[serde(rename = "categoria", default, deserialize_with = "lenient::text")]
    pub category: String,
    #[serde(rename = "icone", default, deserialize_with = "lenient::text")]
    pub icon: String,
    #[serde(rename = "campos", default, deserialize_with = "lenient::null_as_default")]
    pub fields: Vec<FieldDefinition>,
}

impl ExamTemplate {
    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(rename = "categorias", default, deserialize_with = "lenient::null_as_default")]
    categories: Vec<Category>,
    #[serde(rename = "exames", default, deserialize_with = "lenient::null_as_default")]
    exams: Vec<ExamTemplate>,
}

/// Where the loaded templates came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    File(PathBuf),
    Fallback,
}

/// The loaded exam catalog.
#[derive(Debug, Clone)]
pub struct ExamCatalog {
    categories: Vec<Category>,
    exams: Vec<Arc<ExamTemplate>>,
    source: CatalogSource,
}

impl ExamCatalog {
    /// Loads the catalog from `path`, falling back to the built-in catalog on any failure.
    ///
    /// Exams and categories fall back independently: a document with exams but no categories
    /// keeps its exams and gets the default category list.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("failed to read catalog {}: {}", path.display(), e);
                return Self::fallback();
            }
        };

        match Self::from_json(&text) {
            Ok(mut catalog) => {
                catalog.source = CatalogSource::File(path.to_path_buf());
                tracing::info!(
                    exams = catalog.exams.len(),
                    categories = catalog.categories.len(),
                    "catalog loaded from {}",
                    path.display()
                );
                catalog
            }
            Err(e) => {
                tracing::warn!("failed to parse catalog {}: {}", path.display(), e);
                Self::fallback()
            }
        }
    }

    /// Parses a catalog document.
    ///
    /// Exams without an id are dropped. An empty exam list, after dropping, yields the fallback
    /// template.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::Decode` if `text` is not a catalog document.
    pub fn from_json(text: &str) -> LaudoResult<Self> {
        let document: CatalogDocument = serde_json::from_str(text)
            .map_err(|e| LaudoError::Decode(format!("catalog: {e}")))?;

        let mut exams: Vec<Arc<ExamTemplate>> = Vec::with_capacity(document.exams.len());
        for exam in document.exams {
            if exam.id.trim().is_empty() {
                tracing::warn!("skipping catalog exam without id: {:?}", exam.name);
                continue;
            }
            exams.push(Arc::new(exam));
        }
        if exams.is_empty() {
            tracing::warn!("catalog has no exams, using the generic template");
            exams = fallback_exams();
        }

        let categories = if document.categories.is_empty() {
            default_categories()
        } else {
            document.categories
        };

        Ok(Self {
            categories,
            exams,
            source: CatalogSource::Fallback,
        })
    }

    /// The built-in catalog: default categories and one generic template.
    pub fn fallback() -> Self {
        Self {
            categories: default_categories(),
            exams: fallback_exams(),
            source: CatalogSource::Fallback,
        }
    }

    pub fn source(&self) -> &CatalogSource {
        &self.source
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn exams(&self) -> &[Arc<ExamTemplate>] {
        &self.exams
    }

    /// Looks up a template by id.
    pub fn find(&self, id: &str) -> Option<Arc<ExamTemplate>> {
        self.exams.iter().find(|e| e.id == id).cloned()
    }

    /// Templates of one category; `"todos"` returns all of them.
    pub fn by_category(&self, category: &str) -> Vec<Arc<ExamTemplate>> {
        if category == ALL_CATEGORIES {
            return self.exams.clone();
        }
        self.exams
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }

    /// Case-insensitive substring search over name and description. A blank term matches all.
    pub fn search(&self, term: &str) -> Vec<Arc<ExamTemplate>> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self.exams.clone();
        }
        self.exams
            .iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&term) || e.description.to_lowercase().contains(&term)
            })
            .cloned()
            .collect()
    }
}

fn default_categories() -> Vec<Category> {
    [
        ("laboratorio", "Laboratório", "fa-flask"),
        ("ginecologia", "Ginecologia", "fa-female"),
        ("pediatria", "Pediatria", "fa-baby"),
        ("cardiologia", "Cardiologia", "fa-heartbeat"),
        ("radiologia", "Radiologia", "fa-x-ray"),
        ("generico", "Genérico", "fa-file-medical"),
    ]
    .into_iter()
    .map(|(id, name, icon)| Category {
        id: id.to_string(),
        name: name.to_string(),
        icon: icon.to_string(),
    })
    .collect()
}

fn fallback_exams() -> Vec<Arc<ExamTemplate>> {
    let textarea = |id: &str, label: &str, placeholder: &str| FieldDefinition {
        id: id.to_string(),
        kind: FieldKind::TextArea,
        label: label.to_string(),
        placeholder: placeholder.to_string(),
    };

    vec![Arc::new(ExamTemplate {
        id: "modelo_generico".to_string(),
        name: "Laudo Genérico".to_string(),
        description: "Modelo de laudo genérico".to_string(),
        category: "generico".to_string(),
        icon: "fa-file-medical".to_string(),
        fields: vec![
            textarea("descricao", "Descrição", "Descrição do caso..."),
            textarea("achados", "Achados", "Achados principais..."),
            textarea("discussao", "Discussão", "Discussão do caso..."),
            textarea("conclusao", "Conclusão", "Conclusão final..."),
        ],
    })]
}
