//! Draft record and its JSON encoding.

use crate::catalog::ExamTemplate;
use crate::state::ReportState;
use crate::{LaudoError, LaudoResult};
use chrono::{DateTime, SecondsFormat, Utc};
use laudo_types::lenient::{self, null_as_default};
use laudo_types::{Attachment, Patient, Professional, Signature};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The persisted snapshot of an in-progress report.
///
/// Keys match the stored record exactly. Every key is optional on input; `null` is read as the
/// empty value, and a mistyped text value is read as text or dropped. Attachments are read from
/// `anexos`, or from the legacy `imagens` key when `anexos` is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    #[serde(rename = "paciente", default, deserialize_with = "null_as_default")]
    pub patient: Patient,

    #[serde(rename = "profissional", default, deserialize_with = "null_as_default")]
    pub professional: Professional,

    /// Full template snapshot. Only its id is used on restore, so a damaged snapshot keeps
    /// just the id.
    #[serde(rename = "exameAtual", default, deserialize_with = "loose_exam")]
    pub current_exam: Option<ExamTemplate>,

    #[serde(rename = "dadosExame", default, deserialize_with = "lenient_string_map")]
    pub field_values: BTreeMap<String, String>,

    #[serde(rename = "anexos", default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,

    #[serde(rename = "imagens", default, skip_serializing_if = "Option::is_none")]
    pub legacy_images: Option<Vec<Attachment>>,

    #[serde(rename = "assinatura", default, deserialize_with = "loose_object")]
    pub signature: Option<Signature>,

    /// ISO-8601 save time.
    #[serde(default, deserialize_with = "lenient::text")]
    pub timestamp: String,

    #[serde(rename = "numeroExame", default, deserialize_with = "lenient::text")]
    pub report_number: String,

    #[serde(rename = "dataExame", default, deserialize_with = "lenient::text")]
    pub exam_date: String,

    #[serde(rename = "horaExame", default, deserialize_with = "lenient::text")]
    pub exam_time: String,

    #[serde(rename = "tipoDocumento", default, deserialize_with = "lenient::text")]
    pub document_type: String,

    #[serde(rename = "unidade", default, deserialize_with = "lenient::text")]
    pub unit: String,
}

impl Draft {
    /// Attachments to restore, preferring the current key over the legacy one.
    pub fn restorable_attachments(&self) -> Option<&[Attachment]> {
        self.attachments
            .as_deref()
            .or(self.legacy_images.as_deref())
    }
}

/// Projects `state` into a draft captured at `saved_at`.
///
/// Only the first `max_attachments` attachments are kept.
pub fn serialize(state: &ReportState, saved_at: DateTime<Utc>, max_attachments: usize) -> Draft {
    let presentation = state.presentation();
    Draft {
        patient: state.patient().clone(),
        professional: state.professional().clone(),
        current_exam: state.current_exam().map(|exam| exam.as_ref().clone()),
        field_values: state.field_values().clone(),
        attachments: Some(
            state
                .attachments()
                .iter()
                .take(max_attachments)
                .cloned()
                .collect(),
        ),
        legacy_images: None,
        signature: state.signature().cloned(),
        timestamp: saved_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        report_number: presentation.report_number.clone(),
        exam_date: presentation.exam_date.clone(),
        exam_time: presentation.exam_time.clone(),
        document_type: presentation.document_type.clone(),
        unit: state.patient().unit.clone(),
    }
}

/// # Errors
///
/// Returns `LaudoError::Serialization` if the draft cannot be encoded.
pub fn encode(draft: &Draft) -> LaudoResult<String> {
    serde_json::to_string(draft).map_err(LaudoError::Serialization)
}

/// Decodes a stored draft.
///
/// # Errors
///
/// Returns `LaudoError::Decode` naming the offending path (e.g. `anexos[2].numero`) when `raw`
/// is not a draft record.
pub fn deserialize(raw: &str) -> LaudoResult<Draft> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    let draft = serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        let path = err.path().to_string();
        LaudoError::Decode(format!("{} (at {})", err.into_inner(), path))
    })?;
    deserializer
        .end()
        .map_err(|e| LaudoError::Decode(e.to_string()))?;
    Ok(draft)
}

/// Objects that fail to decode are dropped with a warning; any other value is `None`.
fn loose_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(decoded) => Ok(Some(decoded)),
        Err(e) => {
            tracing::warn!("dropping undecodable draft entry: {}", e);
            Ok(None)
        }
    }
}

fn loose_exam<'de, D>(deserializer: D) -> Result<Option<ExamTemplate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let Value::Object(map) = &value else {
        return Ok(None);
    };
    let id = match map.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Ok(None),
    };
    match serde_json::from_value::<ExamTemplate>(value) {
        Ok(exam) => Ok(Some(exam)),
        Err(e) => {
            tracing::warn!("draft exam snapshot {} is damaged, keeping its id: {}", id, e);
            Ok(Some(ExamTemplate {
                id,
                ..Default::default()
            }))
        }
    }
}

/// Field values were typed into form inputs, but older drafts may hold numbers or booleans.
/// Scalars are kept as text; `null` and nested values are dropped, as is a map that is not an
/// object.
fn lenient_string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(raw) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key, text))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDefinition, FieldKind};
    use crate::state::ReportCommand;
    use chrono::TimeZone;
    use laudo_types::{AttachmentId, DataUri, SignatureSource, UNKNOWN_SIZE_LABEL};
    use std::sync::Arc;

    fn attachment(n: usize) -> Attachment {
        Attachment {
            id: AttachmentId::new(format!("id-{n}")),
            display_name: format!("anexo-{n}.png"),
            image: DataUri::parse(format!("data:image/png;base64,QUJD{n}")).unwrap(),
            mime_type: "image/png".into(),
            size_label: "1.5 KB".into(),
            ordinal: 0,
        }
    }

    fn populated_state(attachments: usize) -> ReportState {
        let mut state = ReportState::new();
        let exam = Arc::new(ExamTemplate {
            id: "ecg".into(),
            name: "Eletrocardiograma".into(),
            fields: vec![FieldDefinition {
                id: "laudo".into(),
                kind: FieldKind::TextArea,
                label: "Laudo".into(),
                placeholder: String::new(),
            }],
            ..Default::default()
        });
        state
            .apply(ReportCommand::SetPatient(Patient {
                name: "Maria <Silva>".into(),
                document_id: "AB123".into(),
                age: "42".into(),
                unit: "centro".into(),
            }))
            .unwrap();
        state
            .apply(ReportCommand::SetProfessional(Professional {
                name: "Dr. João".into(),
                registration_id: "999".into(),
                ..Default::default()
            }))
            .unwrap();
        state.apply(ReportCommand::SelectExam(exam)).unwrap();
        state
            .apply(ReportCommand::SetFieldValue {
                field_id: "laudo".into(),
                value: "Ritmo sinusal".into(),
            })
            .unwrap();
        for n in 0..attachments {
            state
                .apply(ReportCommand::AddAttachment(attachment(n)))
                .unwrap();
        }
        state
            .apply(ReportCommand::SetReportNumber("LAUDO-001001".into()))
            .unwrap();
        state
    }

    fn saved_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_serialize_uses_stored_keys() {
        let draft = serialize(&populated_state(1), saved_at(), 10);
        let json: serde_json::Value = serde_json::from_str(&encode(&draft).unwrap()).unwrap();

        assert_eq!(json["paciente"]["nome"], "Maria <Silva>");
        assert_eq!(json["profissional"]["tipoRegistro"], "CRM");
        assert_eq!(json["exameAtual"]["id"], "ecg");
        assert_eq!(json["exameAtual"]["campos"][0]["tipo"], "textarea");
        assert_eq!(json["dadosExame"]["laudo"], "Ritmo sinusal");
        assert_eq!(json["anexos"][0]["numero"], 1);
        assert!(json["assinatura"].is_null());
        assert_eq!(json["timestamp"], "2024-05-01T12:30:00.000Z");
        assert_eq!(json["numeroExame"], "LAUDO-001001");
        assert_eq!(json["tipoDocumento"], "Passaporte");
        assert_eq!(json["unidade"], "centro");
        assert!(json.get("imagens").is_none());
    }

    #[test]
    fn test_round_trip_keeps_first_ten_attachments() {
        let state = populated_state(12);
        let draft = serialize(&state, saved_at(), 10);
        let decoded = deserialize(&encode(&draft).unwrap()).unwrap();

        assert_eq!(&decoded.patient, state.patient());
        assert_eq!(&decoded.professional, state.professional());
        assert_eq!(&decoded.field_values, state.field_values());
        let restored = decoded.restorable_attachments().unwrap();
        assert_eq!(restored.len(), 10);
        assert_eq!(restored, &state.attachments()[..10]);
        assert_eq!(decoded, draft);
    }

    #[test]
    fn test_malformed_input_is_a_decode_error() {
        assert!(matches!(deserialize("not json"), Err(LaudoError::Decode(_))));
        assert!(matches!(deserialize("[1, 2]"), Err(LaudoError::Decode(_))));

        let Err(LaudoError::Decode(message)) =
            deserialize(r#"{"anexos": [{"name": "a.png"}, "b.png"]}"#)
        else {
            panic!("expected decode error");
        };
        assert!(message.contains("anexos[1]"), "{message}");
    }

    #[test]
    fn test_mistyped_values_keep_the_rest_of_the_draft() {
        let draft = deserialize(
            r#"{"paciente": {"nome": null, "documento": 123, "idade": "42"},
                "profissional": {"nome": "Dr. João", "registro": 999},
                "exameAtual": {"id": "ecg", "nome": "Eletrocardiograma",
                               "campos": [{"id": "ritmo", "tipo": "select", "opcoes": 5}]},
                "anexos": [{"name": "a.png", "data": "data:image/png;base64,AAAA",
                            "numero": "um", "tamanho": 2048}],
                "assinatura": "quebrada", "dadosExame": "perdido",
                "numeroExame": "LAUDO-001050", "dataExame": 20240501}"#,
        )
        .unwrap();

        assert!(draft.patient.name.is_empty());
        assert_eq!(draft.patient.document_id, "123");
        assert_eq!(draft.patient.age, "42");
        assert_eq!(draft.professional.registration_id, "999");
        let exam = draft.current_exam.as_ref().unwrap();
        assert_eq!(exam.id, "ecg");
        assert!(exam.fields.is_empty());
        let attachments = draft.restorable_attachments().unwrap();
        assert_eq!(attachments[0].ordinal, 1);
        assert_eq!(attachments[0].size_label, "2048");
        assert!(draft.signature.is_none());
        assert_eq!(draft.report_number, "LAUDO-001050");
        assert_eq!(draft.exam_date, "20240501");
        assert!(draft.field_values.is_empty());
    }

    #[test]
    fn test_exam_snapshot_without_id_is_dropped() {
        let draft = deserialize(r#"{"exameAtual": {"nome": "Sem id"}, "numeroExame": "x"}"#)
            .unwrap();
        assert!(draft.current_exam.is_none());
        let draft = deserialize(r#"{"exameAtual": "ecg"}"#).unwrap();
        assert!(draft.current_exam.is_none());
    }

    #[test]
    fn test_sparse_and_null_values_decode() {
        let draft = deserialize(
            r#"{"paciente": null, "exameAtual": null, "assinatura": null,
                "dadosExame": {"fc": 72, "ok": true, "vazio": null, "texto": "x"},
                "numeroExame": null}"#,
        )
        .unwrap();
        assert_eq!(draft.patient, Patient::default());
        assert!(draft.current_exam.is_none());
        assert_eq!(draft.field_values.get("fc").map(String::as_str), Some("72"));
        assert_eq!(draft.field_values.get("ok").map(String::as_str), Some("true"));
        assert!(!draft.field_values.contains_key("vazio"));
        assert!(draft.report_number.is_empty());
        assert!(draft.restorable_attachments().is_none());
    }

    #[test]
    fn test_legacy_images_key_is_accepted() {
        let draft = deserialize(
            r#"{"imagens": [{"id": 1700000000000.25, "name": "raio-x.png",
                             "data": "data:image/png;base64,AAAA", "type": "image/png"}]}"#,
        )
        .unwrap();
        let images = draft.restorable_attachments().unwrap();
        assert_eq!(images[0].display_name, "raio-x.png");
        assert_eq!(images[0].size_label, UNKNOWN_SIZE_LABEL);
        assert_eq!(images[0].ordinal, 1);
        assert_eq!(images[0].id.as_str(), "1700000000000.25");
    }

    #[test]
    fn test_current_key_wins_over_legacy() {
        let draft = deserialize(
            r#"{"anexos": [], "imagens": [{"name": "velho.png"}]}"#,
        )
        .unwrap();
        assert_eq!(draft.restorable_attachments().map(<[_]>::len), Some(0));
    }

    #[test]
    fn test_signature_round_trip() {
        let mut state = populated_state(0);
        state
            .apply(ReportCommand::SetSignature(Signature {
                image: DataUri::parse("data:image/png;base64,AAAA").unwrap(),
                source: SignatureSource::Uploaded,
                captured_at: "2024-05-01T12:00:00.000Z".into(),
                original_file_name: "assinatura.png".into(),
            }))
            .unwrap();
        let decoded =
            deserialize(&encode(&serialize(&state, saved_at(), 10)).unwrap()).unwrap();
        assert_eq!(decoded.signature.as_ref(), state.signature());
    }
}
