//! Backend-neutral page layout.
//!
//! The layout decides *what* each page says; the HTML and SVG backends decide how it looks.
//! All text here is raw user input and must be escaped by the backend.

use crate::config::Branding;
use crate::constants::CONCLUSION_FIELD_ID;
use crate::state::ReportState;
use laudo_types::DataUri;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledValue {
    pub label: String,
    pub value: String,
}

impl LabeledValue {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Header { title: String, subtitle: String },
    Divider,
    SectionTitle(String),
    FieldGrid(Vec<LabeledValue>),
    ExamInfo { title: String, description: String },
    /// Non-textarea fields with a value.
    Results(Vec<LabeledValue>),
    /// Textarea fields with a value, labelled by field label.
    Observations(Vec<LabeledValue>),
    AttachmentIndicator(usize),
    Conclusion {
        statement: String,
        exam_conclusion: Option<String>,
    },
    /// `None` renders the "no signature" placeholder.
    Signature(Option<DataUri>),
    ProfessionalInfo {
        name: String,
        registration: String,
        date_time: String,
    },
    FooterNotes(Vec<String>),
    AttachmentTitle(String),
    AttachmentImage { image: DataUri, alt: String },
    AttachmentCaption(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKind {
    Main,
    /// `ordinal` is 1-based.
    Attachment { ordinal: usize, total: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    pub index: usize,
    pub kind: PageKind,
    pub blocks: Vec<Block>,
}

impl PageLayout {
    /// Element id of the page, `laudo-pagina-{index}`.
    pub fn id(&self) -> String {
        page_id(self.index)
    }
}

pub fn page_id(index: usize) -> String {
    format!("laudo-pagina-{index}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLayout {
    pub pages: Vec<PageLayout>,
}

/// Lays out the main page followed by one page per attachment.
pub fn layout_document(state: &ReportState, branding: &Branding) -> DocumentLayout {
    let total = state.attachments().len();
    let mut pages = Vec::with_capacity(total + 1);
    pages.push(main_page(state, branding));
    for i in 0..total {
        pages.push(attachment_page(state, branding, i));
    }
    DocumentLayout { pages }
}

/// Lays out a single page, or `None` when `index` is past the last page.
pub fn layout_page(state: &ReportState, branding: &Branding, index: usize) -> Option<PageLayout> {
    match index {
        0 => Some(main_page(state, branding)),
        i if i <= state.attachments().len() => Some(attachment_page(state, branding, i - 1)),
        _ => None,
    }
}

fn or_dash(value: &str) -> String {
    if value.trim().is_empty() {
        "-".to_string()
    } else {
        value.to_string()
    }
}

fn main_page(state: &ReportState, branding: &Branding) -> PageLayout {
    let patient = state.patient();
    let professional = state.professional();
    let presentation = state.presentation();

    let document = if patient.document_id.is_empty() {
        "-".to_string()
    } else {
        format!("{}: {}", presentation.document_type, patient.document_id)
    };
    let age = if patient.age.is_empty() {
        "-".to_string()
    } else {
        format!("{} anos", patient.age)
    };

    let mut blocks = vec![
        Block::Header {
            title: branding.institution().to_uppercase(),
            subtitle: branding.subtitle().to_string(),
        },
        Block::Divider,
        Block::SectionTitle("DADOS DO PACIENTE".into()),
        Block::FieldGrid(vec![
            LabeledValue::new("Nome", or_dash(&patient.name)),
            LabeledValue::new("Documento", document),
            LabeledValue::new("Idade", age),
            LabeledValue::new("Unidade", or_dash(&patient.unit)),
        ]),
        Block::SectionTitle("INFORMAÇÕES DO EXAME".into()),
    ];

    match state.current_exam() {
        Some(exam) => {
            blocks.push(Block::ExamInfo {
                title: exam.name.clone(),
                description: exam.description.clone(),
            });

            let mut results = Vec::new();
            let mut observations = Vec::new();
            for field in &exam.fields {
                let Some(value) = state.field_value(&field.id) else {
                    continue;
                };
                let entry = LabeledValue::new(field.label.clone(), value);
                if field.is_textarea() {
                    observations.push(entry);
                } else {
                    results.push(entry);
                }
            }
            if !results.is_empty() {
                blocks.push(Block::Results(results));
            }
            if !observations.is_empty() {
                blocks.push(Block::Observations(observations));
            }
        }
        None => blocks.push(Block::ExamInfo {
            title: "Selecione um exame no catálogo".into(),
            description: "Nenhum exame selecionado.".into(),
        }),
    }

    if !state.attachments().is_empty() {
        blocks.push(Block::AttachmentIndicator(state.attachments().len()));
    }

    let exam_conclusion = state
        .current_exam()
        .and_then(|_| state.field_value(CONCLUSION_FIELD_ID))
        .map(str::to_string);
    blocks.push(Block::SectionTitle("CONCLUSÃO".into()));
    blocks.push(Block::Conclusion {
        statement: format!(
            "Laudo emitido pelo {} do {}.",
            branding.subtitle(),
            branding.institution()
        ),
        exam_conclusion,
    });

    let date_time = match (
        presentation.exam_date.trim(),
        presentation.exam_time.trim(),
    ) {
        ("", "") => "-".to_string(),
        (date, "") => date.to_string(),
        (date, time) => format!("{date} às {time}").trim().to_string(),
    };

    blocks.push(Block::Divider);
    blocks.push(Block::Signature(
        state
            .signature()
            .filter(|s| s.has_image())
            .map(|s| s.image.clone()),
    ));
    blocks.push(Block::ProfessionalInfo {
        name: if professional.has_name() {
            professional.name.clone()
        } else {
            "_______________________________________".into()
        },
        registration: professional
            .registration_line()
            .unwrap_or_else(|| "Registro Profissional".into()),
        date_time,
    });
    blocks.push(Block::FooterNotes(vec![
        format!(
            "Este laudo tem validade institucional do {}",
            branding.institution()
        ),
        format!(
            "Número do Laudo: {}",
            or_dash(&presentation.report_number)
        ),
    ]));

    PageLayout {
        index: 0,
        kind: PageKind::Main,
        blocks,
    }
}

fn attachment_page(state: &ReportState, branding: &Branding, position: usize) -> PageLayout {
    let attachments = state.attachments();
    let attachment = &attachments[position];
    let total = attachments.len();
    let ordinal = position + 1;
    let page_number = position + 2;

    PageLayout {
        index: ordinal,
        kind: PageKind::Attachment { ordinal, total },
        blocks: vec![
            Block::Header {
                title: branding.institution().to_uppercase(),
                subtitle: format!("Anexo do Laudo - Página {page_number}"),
            },
            Block::Divider,
            Block::AttachmentTitle(format!(
                "Anexo {} de {}: {}",
                ordinal, total, attachment.display_name
            )),
            Block::AttachmentImage {
                image: attachment.image.clone(),
                alt: attachment.display_name.clone(),
            },
            Block::AttachmentCaption(format!(
                "Arquivo: {} | Tamanho: {} | Página {} do laudo",
                attachment.display_name, attachment.size_label, page_number
            )),
            Block::Divider,
            Block::FooterNotes(vec![
                format!(
                    "Anexo {} do Laudo {}",
                    ordinal,
                    state.presentation().report_number
                )
                .trim_end()
                .to_string(),
                format!("{} - {}", branding.institution(), branding.subtitle()),
            ]),
        ],
    }
}
