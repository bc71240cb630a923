//! The report being authored.
//!
//! [`ReportState`] is the single owned aggregate. It has no public setters: every change goes
//! through [`ReportState::apply`] with a [`ReportCommand`], and a command that fails validation
//! leaves the state exactly as it was.
//!
//! Invariants held after every successful `apply`:
//! - field values only reference fields of the current exam, and are empty when no exam is
//!   selected;
//! - `attachments[i].ordinal == i + 1`;
//! - the current page index is within `0..=attachments.len()`.

use crate::catalog::ExamTemplate;
use crate::constants::DEFAULT_DOCUMENT_TYPE;
use crate::{LaudoError, LaudoResult};
use laudo_types::{Attachment, Patient, Professional, Signature};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Values shown on the report that are typed by the user but carry no rules of their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    /// Report number as displayed, e.g. `LAUDO-001001`.
    pub report_number: String,
    /// `YYYY-MM-DD`
    pub exam_date: String,
    /// `HH:MM`
    pub exam_time: String,
    pub document_type: String,
}

impl Default for Presentation {
    fn default() -> Self {
        Self {
            report_number: String::new(),
            exam_date: String::new(),
            exam_time: String::new(),
            document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
        }
    }
}

/// A mutation of [`ReportState`].
#[derive(Debug, Clone)]
pub enum ReportCommand {
    SetPatient(Patient),
    SetProfessional(Professional),
    /// `None` leaves the value unchanged.
    SetPresentation {
        exam_date: Option<String>,
        exam_time: Option<String>,
        document_type: Option<String>,
    },
    SetReportNumber(String),
    /// Selects a template and clears all field values.
    SelectExam(Arc<ExamTemplate>),
    CloseExam,
    /// An empty value clears the field.
    SetFieldValue { field_id: String, value: String },
    AddAttachment(Attachment),
    /// Removes the attachment at a 0-based index.
    RemoveAttachment(usize),
    /// Replaces the whole attachment list, renumbering it.
    ReplaceAttachments(Vec<Attachment>),
    SetSignature(Signature),
    RemoveSignature,
    /// Clears patient, exam, field values, attachments and page. Professional, signature and
    /// presentation values are kept.
    ClearReport,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportState {
    patient: Patient,
    professional: Professional,
    current_exam: Option<Arc<ExamTemplate>>,
    field_values: BTreeMap<String, String>,
    attachments: Vec<Attachment>,
    signature: Option<Signature>,
    presentation: Presentation,
    current_page: usize,
}

impl ReportState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patient(&self) -> &Patient {
        &self.patient
    }

    pub fn professional(&self) -> &Professional {
        &self.professional
    }

    pub fn current_exam(&self) -> Option<&Arc<ExamTemplate>> {
        self.current_exam.as_ref()
    }

    /// Non-empty field values keyed by field id.
    pub fn field_values(&self) -> &BTreeMap<String, String> {
        &self.field_values
    }

    pub fn field_value(&self, field_id: &str) -> Option<&str> {
        self.field_values.get(field_id).map(String::as_str)
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Applies one command.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::InvalidInput` if:
    /// - a field value is set with no exam selected, for an unknown field, or with a value the
    ///   field kind rejects,
    /// - an attachment index is out of range.
    pub fn apply(&mut self, command: ReportCommand) -> LaudoResult<()> {
        match command {
            ReportCommand::SetPatient(patient) => self.patient = patient,
            ReportCommand::SetProfessional(professional) => self.professional = professional,
            ReportCommand::SetPresentation {
                exam_date,
                exam_time,
                document_type,
            } => {
                if let Some(date) = exam_date {
                    self.presentation.exam_date = date;
                }
                if let Some(time) = exam_time {
                    self.presentation.exam_time = time;
                }
                if let Some(kind) = document_type {
                    self.presentation.document_type = kind;
                }
            }
            ReportCommand::SetReportNumber(number) => self.presentation.report_number = number,
            ReportCommand::SelectExam(exam) => {
                self.current_exam = Some(exam);
                self.field_values.clear();
            }
            ReportCommand::CloseExam => {
                self.current_exam = None;
                self.field_values.clear();
            }
            ReportCommand::SetFieldValue { field_id, value } => {
                let exam = self.current_exam.as_ref().ok_or_else(|| {
                    LaudoError::InvalidInput("no exam selected".into())
                })?;
                let field = exam.field(&field_id).ok_or_else(|| {
                    LaudoError::InvalidInput(format!(
                        "exam {} has no field {}",
                        exam.id, field_id
                    ))
                })?;
                field.check_value(&value)?;

                if value.is_empty() {
                    self.field_values.remove(&field_id);
                } else {
                    self.field_values.insert(field_id, value);
                }
            }
            ReportCommand::AddAttachment(attachment) => {
                self.attachments.push(attachment);
                self.settle_attachments();
            }
            ReportCommand::RemoveAttachment(index) => {
                if index >= self.attachments.len() {
                    return Err(LaudoError::InvalidInput(format!(
                        "attachment index {} out of range (have {})",
                        index,
                        self.attachments.len()
                    )));
                }
                self.attachments.remove(index);
                self.settle_attachments();
            }
            ReportCommand::ReplaceAttachments(attachments) => {
                self.attachments = attachments;
                self.settle_attachments();
            }
            ReportCommand::SetSignature(signature) => self.signature = Some(signature),
            ReportCommand::RemoveSignature => self.signature = None,
            ReportCommand::ClearReport => {
                self.patient = Patient::default();
                self.current_exam = None;
                self.field_values.clear();
                self.attachments.clear();
                self.current_page = 0;
            }
        }
        Ok(())
    }

    /// Used by the pagination controller, which checks the range.
    pub(crate) fn set_current_page(&mut self, page: usize) {
        self.current_page = page.min(self.attachments.len());
    }

    fn settle_attachments(&mut self) {
        for (i, attachment) in self.attachments.iter_mut().enumerate() {
            attachment.ordinal = i as u32 + 1;
        }
        self.current_page = self.current_page.min(self.attachments.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldDefinition, FieldKind, SelectOption};
    use laudo_types::{AttachmentId, DataUri};

    fn attachment(name: &str) -> Attachment {
        Attachment {
            id: AttachmentId::new(name),
            display_name: name.to_string(),
            image: DataUri::parse("data:image/png;base64,AAAA").unwrap(),
            mime_type: "image/png".into(),
            size_label: "3 Bytes".into(),
            ordinal: 0,
        }
    }

    fn exam() -> Arc<ExamTemplate> {
        Arc::new(ExamTemplate {
            id: "ecg".into(),
            name: "Eletrocardiograma".into(),
            fields: vec![
                FieldDefinition {
                    id: "ritmo".into(),
                    kind: FieldKind::Select(vec![SelectOption {
                        value: "sinusal".into(),
                        label: "Sinusal".into(),
                    }]),
                    label: "Ritmo".into(),
                    placeholder: String::new(),
                },
                FieldDefinition {
                    id: "fc".into(),
                    kind: FieldKind::Number(None),
                    label: "FC".into(),
                    placeholder: String::new(),
                },
            ],
            ..Default::default()
        })
    }

    fn assert_ordinals(state: &ReportState) {
        for (i, a) in state.attachments().iter().enumerate() {
            assert_eq!(a.ordinal as usize, i + 1);
        }
    }

    #[test]
    fn test_remove_second_of_three_renumbers() {
        let mut state = ReportState::new();
        for name in ["a.png", "b.png", "c.png"] {
            state.apply(ReportCommand::AddAttachment(attachment(name))).unwrap();
        }
        state.apply(ReportCommand::RemoveAttachment(1)).unwrap();

        let names: Vec<_> = state
            .attachments()
            .iter()
            .map(|a| (a.display_name.as_str(), a.ordinal))
            .collect();
        assert_eq!(names, vec![("a.png", 1), ("c.png", 2)]);
    }

    #[test]
    fn test_ordinals_hold_over_mixed_sequences() {
        let mut state = ReportState::new();
        let ops: [(bool, usize); 9] = [
            (true, 0),
            (true, 0),
            (false, 0),
            (true, 0),
            (true, 0),
            (false, 2),
            (false, 1),
            (true, 0),
            (false, 0),
        ];
        for (n, (add, index)) in ops.into_iter().enumerate() {
            let command = if add {
                ReportCommand::AddAttachment(attachment(&format!("{n}.png")))
            } else {
                ReportCommand::RemoveAttachment(index)
            };
            state.apply(command).unwrap();
            assert_ordinals(&state);
        }
        assert_eq!(state.attachments().len(), 1);
    }

    #[test]
    fn test_remove_out_of_range_is_rejected_without_change() {
        let mut state = ReportState::new();
        state.apply(ReportCommand::AddAttachment(attachment("a.png"))).unwrap();
        let before = state.clone();

        assert!(matches!(
            state.apply(ReportCommand::RemoveAttachment(1)),
            Err(LaudoError::InvalidInput(_))
        ));
        assert_eq!(state, before);
    }

    #[test]
    fn test_page_is_clamped_when_attachments_shrink() {
        let mut state = ReportState::new();
        for name in ["a.png", "b.png"] {
            state.apply(ReportCommand::AddAttachment(attachment(name))).unwrap();
        }
        state.set_current_page(2);
        state.apply(ReportCommand::RemoveAttachment(0)).unwrap();
        assert_eq!(state.current_page(), 1);
        state.apply(ReportCommand::ReplaceAttachments(Vec::new())).unwrap();
        assert_eq!(state.current_page(), 0);
    }

    #[test]
    fn test_field_values_follow_the_selected_exam() {
        let mut state = ReportState::new();
        assert!(state
            .apply(ReportCommand::SetFieldValue {
                field_id: "fc".into(),
                value: "72".into()
            })
            .is_err());

        state.apply(ReportCommand::SelectExam(exam())).unwrap();
        state
            .apply(ReportCommand::SetFieldValue {
                field_id: "fc".into(),
                value: "72".into(),
            })
            .unwrap();
        assert_eq!(state.field_value("fc"), Some("72"));

        assert!(state
            .apply(ReportCommand::SetFieldValue {
                field_id: "inexistente".into(),
                value: "x".into()
            })
            .is_err());
        assert!(state
            .apply(ReportCommand::SetFieldValue {
                field_id: "ritmo".into(),
                value: "irregular".into()
            })
            .is_err());

        state
            .apply(ReportCommand::SetFieldValue {
                field_id: "fc".into(),
                value: String::new(),
            })
            .unwrap();
        assert!(state.field_values().is_empty());

        state
            .apply(ReportCommand::SetFieldValue {
                field_id: "ritmo".into(),
                value: "sinusal".into(),
            })
            .unwrap();
        state.apply(ReportCommand::SelectExam(exam())).unwrap();
        assert!(state.field_values().is_empty());

        state.apply(ReportCommand::CloseExam).unwrap();
        assert!(state.current_exam().is_none());
    }

    #[test]
    fn test_clear_report_keeps_professional_and_signature() {
        let mut state = ReportState::new();
        state
            .apply(ReportCommand::SetPatient(Patient {
                name: "Maria".into(),
                ..Default::default()
            }))
            .unwrap();
        state
            .apply(ReportCommand::SetProfessional(Professional {
                name: "Dr. João".into(),
                ..Default::default()
            }))
            .unwrap();
        state
            .apply(ReportCommand::SetSignature(Signature {
                image: DataUri::parse("data:image/png;base64,AAAA").unwrap(),
                source: Default::default(),
                captured_at: String::new(),
                original_file_name: "s.png".into(),
            }))
            .unwrap();
        state.apply(ReportCommand::SelectExam(exam())).unwrap();
        state.apply(ReportCommand::AddAttachment(attachment("a.png"))).unwrap();
        state.set_current_page(1);

        state.apply(ReportCommand::ClearReport).unwrap();

        assert!(!state.patient().has_name());
        assert!(state.current_exam().is_none());
        assert!(state.attachments().is_empty());
        assert_eq!(state.current_page(), 0);
        assert_eq!(state.professional().name, "Dr. João");
        assert!(state.signature().is_some());
    }

    #[test]
    fn test_presentation_updates_are_partial() {
        let mut state = ReportState::new();
        assert_eq!(state.presentation().document_type, "Passaporte");
        state
            .apply(ReportCommand::SetPresentation {
                exam_date: Some("2024-05-01".into()),
                exam_time: Some("14:30".into()),
                document_type: None,
            })
            .unwrap();
        state
            .apply(ReportCommand::SetPresentation {
                exam_date: None,
                exam_time: None,
                document_type: Some("CPF".into()),
            })
            .unwrap();
        let p = state.presentation();
        assert_eq!(
            (p.exam_date.as_str(), p.exam_time.as_str(), p.document_type.as_str()),
            ("2024-05-01", "14:30", "CPF")
        );
    }
}
