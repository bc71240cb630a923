//! Patient and professional records.

use crate::lenient;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Patient identification as entered on the form.
///
/// All values are free text. Presence is only checked at export time (the patient name is
/// required there), so an empty record is a valid in-progress state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    #[serde(rename = "nome", default, deserialize_with = "lenient::text")]
    pub name: String,

    #[serde(rename = "documento", default, deserialize_with = "lenient::text")]
    pub document_id: String,

    #[serde(rename = "idade", default, deserialize_with = "lenient::text")]
    pub age: String,

    #[serde(rename = "unidade", default, deserialize_with = "lenient::text")]
    pub unit: String,
}

impl Patient {
    /// Returns `true` when the name contains at least one non-whitespace character.
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// The professional signing the report.
///
/// Survives a "clear all" so that consecutive reports by the same professional do not need the
/// details re-entered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Professional {
    #[serde(rename = "nome", default, deserialize_with = "lenient::text")]
    pub name: String,

    #[serde(rename = "registro", default, deserialize_with = "lenient::text")]
    pub registration_id: String,

    #[serde(rename = "tipoRegistro", default)]
    pub registration_type: RegistrationType,
}

impl Professional {
    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }

    /// Footer line for the registration, e.g. `CRM: 12345`.
    ///
    /// Returns `None` when no registration number was entered.
    pub fn registration_line(&self) -> Option<String> {
        let id = self.registration_id.trim();
        if id.is_empty() {
            return None;
        }
        Some(format!("{}: {}", self.registration_type, id))
    }
}

/// Professional council a registration number belongs to.
///
/// Known councils are matched case-insensitively. Anything else is kept verbatim in
/// [`RegistrationType::Other`] so that a draft written with an unfamiliar tag still restores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RegistrationType {
    /// Conselho Regional de Medicina
    #[default]
    Crm,
    /// Conselho Regional de Enfermagem
    Coren,
    /// Conselho Regional de Odontologia
    Cro,
    /// Conselho Regional de Biomedicina
    Crbm,
    /// Conselho Regional de Farmácia
    Crf,
    Other(String),
}

impl RegistrationType {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "" | "CRM" => Self::Crm,
            "COREN" => Self::Coren,
            "CRO" => Self::Cro,
            "CRBM" => Self::Crbm,
            "CRF" => Self::Crf,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Crm => "CRM",
            Self::Coren => "COREN",
            Self::Cro => "CRO",
            Self::Crbm => "CRBM",
            Self::Crf => "CRF",
            Self::Other(tag) => tag,
        }
    }
}

impl fmt::Display for RegistrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RegistrationType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RegistrationType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(RegistrationType::parse(&lenient::text(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patient_uses_draft_keys() {
        let patient = Patient {
            name: "Maria Silva".into(),
            document_id: "AB123".into(),
            age: "42".into(),
            unit: "Centro".into(),
        };
        let json = serde_json::to_value(&patient).unwrap();
        assert_eq!(json["nome"], "Maria Silva");
        assert_eq!(json["documento"], "AB123");
        assert_eq!(json["idade"], "42");
        assert_eq!(json["unidade"], "Centro");
    }

    #[test]
    fn test_patient_missing_fields_default_to_empty() {
        let patient: Patient = serde_json::from_str(r#"{"nome":"Ana"}"#).unwrap();
        assert_eq!(patient.name, "Ana");
        assert!(patient.document_id.is_empty());
        assert!(patient.unit.is_empty());
    }

    #[test]
    fn test_null_and_numeric_values_do_not_reject_the_record() {
        let patient: Patient =
            serde_json::from_str(r#"{"nome":null,"documento":12345,"idade":42}"#).unwrap();
        assert!(patient.name.is_empty());
        assert_eq!(patient.document_id, "12345");
        assert_eq!(patient.age, "42");

        let professional: Professional =
            serde_json::from_str(r#"{"nome":"Dr. João","registro":999,"tipoRegistro":null}"#)
                .unwrap();
        assert_eq!(professional.registration_id, "999");
        assert_eq!(professional.registration_type, RegistrationType::Crm);
    }

    #[test]
    fn test_whitespace_name_is_not_a_name() {
        let patient = Patient {
            name: "   ".into(),
            ..Default::default()
        };
        assert!(!patient.has_name());
    }

    #[test]
    fn test_registration_type_round_trips_known_and_unknown_tags() {
        let professional: Professional =
            serde_json::from_str(r#"{"nome":"Dr. João","registro":"999","tipoRegistro":"crm"}"#)
                .unwrap();
        assert_eq!(professional.registration_type, RegistrationType::Crm);

        let other: Professional =
            serde_json::from_str(r#"{"nome":"X","tipoRegistro":"CRP"}"#).unwrap();
        assert_eq!(
            other.registration_type,
            RegistrationType::Other("CRP".into())
        );
        assert_eq!(
            serde_json::to_value(&other).unwrap()["tipoRegistro"],
            "CRP"
        );
    }

    #[test]
    fn test_registration_line_uses_council_tag() {
        let professional = Professional {
            name: "Dra. Paula".into(),
            registration_id: " 12345 ".into(),
            registration_type: RegistrationType::Coren,
        };
        assert_eq!(
            professional.registration_line().as_deref(),
            Some("COREN: 12345")
        );

        let unregistered = Professional::default();
        assert_eq!(unregistered.registration_line(), None);
    }
}
