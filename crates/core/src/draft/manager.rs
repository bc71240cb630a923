//! Draft persistence and the restoration sequence.

use super::codec::{self, Draft};
use crate::catalog::ExamCatalog;
use crate::constants::DRAFT_KEY;
use crate::notification::Notice;
use crate::numbering::SequenceCounter;
use crate::state::{ReportCommand, ReportState};
use crate::store::KeyValueStore;
use crate::{LaudoError, LaudoResult};
use chrono::Utc;
use std::sync::Arc;

/// One stage of [`DraftManager::load_draft`], in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreStep {
    Patient,
    Professional,
    ReportNumber,
    Schedule,
    Attachments,
    Signature,
    Exam,
    Preview,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied,
    /// The draft had nothing for this step.
    Skipped,
    /// Recovered locally; restoration carried on.
    Warning(String),
    Failed(String),
}

/// What a restoration did, step by step, plus the notices to show.
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub steps: Vec<(RestoreStep, StepOutcome)>,
    pub notices: Vec<Notice>,
}

impl RestoreReport {
    pub fn outcome(&self, step: RestoreStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn has_failures(&self) -> bool {
        self.steps
            .iter()
            .any(|(_, o)| matches!(o, StepOutcome::Failed(_)))
    }
}

/// Saves, finds, restores and clears the single stored draft.
pub struct DraftManager {
    store: Arc<dyn KeyValueStore>,
    max_attachments: usize,
}

impl DraftManager {
    pub fn new(store: Arc<dyn KeyValueStore>, max_attachments: usize) -> Self {
        Self {
            store,
            max_attachments,
        }
    }

    /// Writes `state` over any previous draft.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::Serialization` or `LaudoError::Storage`; the previous draft is then
    /// still in place.
    pub fn save_draft(&self, state: &ReportState) -> LaudoResult<()> {
        let draft = codec::serialize(state, Utc::now(), self.max_attachments);
        let encoded = codec::encode(&draft)?;
        self.store.set(DRAFT_KEY, &encoded)?;
        tracing::debug!(bytes = encoded.len(), "draft saved");
        Ok(())
    }

    /// Returns the stored draft, if one exists and decodes.
    ///
    /// Malformed or unreadable drafts are logged and reported as absent.
    pub fn check_for_draft(&self) -> Option<Draft> {
        let raw = match self.store.get(DRAFT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("failed to read draft: {}", e);
                return None;
            }
        };
        match codec::deserialize(&raw) {
            Ok(draft) => {
                tracing::info!(saved_at = %draft.timestamp, "draft found");
                Some(draft)
            }
            Err(e) => {
                tracing::warn!("ignoring stored draft: {}", e);
                None
            }
        }
    }

    /// Deletes the stored draft. The sequence counter is not touched.
    pub fn clear_draft(&self) -> LaudoResult<()> {
        self.store.remove(DRAFT_KEY)
    }

    /// Restores `draft` into `state`.
    ///
    /// The steps run in [`RestoreStep`] order and are independent: a failing step is logged and
    /// recorded, and the following steps still run. Nothing already applied is rolled back.
    ///
    /// The exam is resolved by id against `catalog`; the draft's embedded template is never
    /// used. Field values are restored only for fields of the resolved template and only if the
    /// field kind accepts them.
    ///
    /// The caller is expected to re-render after this returns ([`RestoreStep::Preview`] only
    /// records the request).
    pub fn load_draft(
        &self,
        draft: &Draft,
        state: &mut ReportState,
        counter: &mut SequenceCounter,
        catalog: &ExamCatalog,
    ) -> RestoreReport {
        let mut report = RestoreReport::default();

        let mut run = |step: RestoreStep, result: LaudoResult<StepOutcome>| {
            let outcome = result.unwrap_or_else(|e| {
                tracing::error!(?step, "draft restore step failed: {}", e);
                StepOutcome::Failed(e.to_string())
            });
            report.steps.push((step, outcome));
        };

        run(RestoreStep::Patient, restore_patient(draft, state));
        run(
            RestoreStep::Professional,
            state
                .apply(ReportCommand::SetProfessional(draft.professional.clone()))
                .map(|_| StepOutcome::Applied),
        );
        run(
            RestoreStep::ReportNumber,
            restore_report_number(draft, state, counter),
        );
        run(RestoreStep::Schedule, restore_schedule(draft, state));
        run(RestoreStep::Attachments, restore_attachments(draft, state));
        run(RestoreStep::Signature, restore_signature(draft, state));
        run(RestoreStep::Exam, restore_exam(draft, state, catalog));
        run(RestoreStep::Preview, Ok(StepOutcome::Applied));

        if matches!(
            report.outcome(RestoreStep::Exam),
            Some(StepOutcome::Warning(_))
        ) {
            report
                .notices
                .push(Notice::warning("Exame não encontrado no catálogo"));
        }
        if report.has_failures() {
            report.notices.push(Notice::error("Erro ao restaurar rascunho"));
        } else {
            report
                .notices
                .push(Notice::success("Rascunho restaurado com sucesso!"));
        }

        tracing::info!(failures = report.has_failures(), "draft restoration finished");
        report
    }
}

fn restore_patient(draft: &Draft, state: &mut ReportState) -> LaudoResult<StepOutcome> {
    let mut patient = draft.patient.clone();
    if patient.unit.is_empty() && !draft.unit.is_empty() {
        patient.unit = draft.unit.clone();
    }
    state.apply(ReportCommand::SetPatient(patient))?;

    if !draft.document_type.is_empty() {
        state.apply(ReportCommand::SetPresentation {
            exam_date: None,
            exam_time: None,
            document_type: Some(draft.document_type.clone()),
        })?;
    }
    Ok(StepOutcome::Applied)
}

fn restore_report_number(
    draft: &Draft,
    state: &mut ReportState,
    counter: &mut SequenceCounter,
) -> LaudoResult<StepOutcome> {
    if draft.report_number.is_empty() {
        return Ok(StepOutcome::Skipped);
    }
    state.apply(ReportCommand::SetReportNumber(draft.report_number.clone()))?;
    counter.observe(&draft.report_number)?;
    Ok(StepOutcome::Applied)
}

fn restore_schedule(draft: &Draft, state: &mut ReportState) -> LaudoResult<StepOutcome> {
    let exam_date = (!draft.exam_date.is_empty()).then(|| draft.exam_date.clone());
    let exam_time = (!draft.exam_time.is_empty()).then(|| draft.exam_time.clone());
    if exam_date.is_none() && exam_time.is_none() {
        return Ok(StepOutcome::Skipped);
    }
    state.apply(ReportCommand::SetPresentation {
        exam_date,
        exam_time,
        document_type: None,
    })?;
    Ok(StepOutcome::Applied)
}

fn restore_attachments(draft: &Draft, state: &mut ReportState) -> LaudoResult<StepOutcome> {
    let Some(attachments) = draft.restorable_attachments() else {
        return Ok(StepOutcome::Skipped);
    };
    state.apply(ReportCommand::ReplaceAttachments(attachments.to_vec()))?;
    Ok(StepOutcome::Applied)
}

fn restore_signature(draft: &Draft, state: &mut ReportState) -> LaudoResult<StepOutcome> {
    match &draft.signature {
        Some(signature) if signature.has_image() => {
            state.apply(ReportCommand::SetSignature(signature.clone()))?;
            Ok(StepOutcome::Applied)
        }
        _ => Ok(StepOutcome::Skipped),
    }
}

fn restore_exam(
    draft: &Draft,
    state: &mut ReportState,
    catalog: &ExamCatalog,
) -> LaudoResult<StepOutcome> {
    let Some(id) = draft
        .current_exam
        .as_ref()
        .map(|exam| exam.id.as_str())
        .filter(|id| !id.is_empty())
    else {
        return Ok(StepOutcome::Skipped);
    };

    let Some(template) = catalog.find(id) else {
        let err = LaudoError::NotFound(format!("exam {id} is not in the catalog"));
        tracing::warn!("{}", err);
        return Ok(StepOutcome::Warning(err.to_string()));
    };

    state.apply(ReportCommand::SelectExam(template.clone()))?;
    for field in &template.fields {
        let Some(value) = draft.field_values.get(&field.id) else {
            continue;
        };
        let command = ReportCommand::SetFieldValue {
            field_id: field.id.clone(),
            value: value.clone(),
        };
        if let Err(e) = state.apply(command) {
            tracing::warn!("dropping restored value of field {}: {}", field.id, e);
        }
    }
    Ok(StepOutcome::Applied)
}
