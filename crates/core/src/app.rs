//! Application orchestrator.
//!
//! [`LaudoApp`] owns one report and everything that acts on it: the state, the catalog, the
//! sequence counter, the stored draft, the preview and the exporter. Hosts (the CLI and the
//! session actor) talk to it and never to the parts directly.
//!
//! Every successful mutation goes through [`LaudoApp::update`]: render all pages, render the
//! current page, then save the draft. The saved draft therefore always matches what was last
//! rendered.

use crate::catalog::ExamCatalog;
use crate::config::CoreConfig;
use crate::constants::DEFAULT_DOCUMENT_TYPE;
use crate::draft::{Draft, DraftManager, RestoreReport};
use crate::export::{ExportPipeline, ExportedFile, Rasterizer, SvgRasterizer};
use crate::notification::{Notice, NoticeQueue};
use crate::numbering::SequenceCounter;
use crate::pagination::{self, PageView};
use crate::preview::{layout_document, render_document, RenderedDocument};
use crate::state::{ReportCommand, ReportState};
use crate::store::{FileStore, KeyValueStore};
use crate::{LaudoError, LaudoResult};
use laudo_files::AssetService;
use laudo_types::{Patient, Professional, ReportNumber};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentSummary {
    pub ordinal: u32,
    pub name: String,
    pub size: String,
}

/// Read-only summary of the report, for hosts to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub report_number: String,
    pub exam_date: String,
    pub exam_time: String,
    pub document_type: String,
    pub patient: Patient,
    pub professional: Professional,
    pub exam_id: Option<String>,
    pub exam_name: Option<String>,
    pub field_values: BTreeMap<String, String>,
    pub attachments: Vec<AttachmentSummary>,
    pub has_signature: bool,
    pub current_page: usize,
    pub total_pages: usize,
    pub counter: u64,
    pub saves: u64,
}

pub struct LaudoApp {
    config: CoreConfig,
    catalog: Option<Arc<ExamCatalog>>,
    state: ReportState,
    counter: SequenceCounter,
    drafts: DraftManager,
    assets: AssetService,
    exporter: ExportPipeline,
    document: RenderedDocument,
    view: PageView,
    notices: NoticeQueue,
    saves: u64,
}

impl LaudoApp {
    /// Builds an app with an empty report. No catalog is installed yet.
    pub fn new(
        config: CoreConfig,
        store: Arc<dyn KeyValueStore>,
        rasterizer: Arc<dyn Rasterizer>,
    ) -> Self {
        let counter = SequenceCounter::load(Arc::clone(&store), config.counter_baseline());
        let drafts = DraftManager::new(store, config.max_draft_attachments());
        let exporter = ExportPipeline::new(rasterizer, &config);
        let mut state = ReportState::new();
        let document = render_document(&layout_document(&state, config.branding()));
        let view = pagination::render_current_page(&mut state, &document);
        Self {
            config,
            catalog: None,
            state,
            counter,
            drafts,
            assets: AssetService::new(),
            exporter,
            document,
            view,
            notices: NoticeQueue::default(),
            saves: 0,
        }
    }

    /// Opens the report stored under the configured data directory, loading the catalog
    /// synchronously and restoring any draft.
    pub fn open(config: CoreConfig) -> Self {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.data_dir()));
        let catalog = Arc::new(ExamCatalog::load(config.catalog_path()));
        let mut app = Self::new(config, store, Arc::new(SvgRasterizer::new()));
        let draft = app.check_for_draft();
        app.install_catalog(catalog);
        app.boot(draft);
        app
    }

    /// Restores `draft` when there is one, otherwise starts a fresh report.
    pub fn boot(&mut self, draft: Option<Draft>) -> Option<RestoreReport> {
        match draft {
            Some(draft) => match self.restore_draft(&draft) {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::error!("draft restoration aborted: {}", e);
                    self.notify_error(&e);
                    self.start_fresh();
                    None
                }
            },
            None => {
                self.start_fresh();
                None
            }
        }
    }

    /// Stamps the report with the current date and time and a new report number.
    pub fn start_fresh(&mut self) {
        self.stamp_now();
        if let Err(e) = self.assign_new_number() {
            tracing::error!("failed to generate report number: {}", e);
            self.notify_error(&e);
        }
        self.update();
    }

    pub fn install_catalog(&mut self, catalog: Arc<ExamCatalog>) {
        tracing::info!(
            exams = catalog.exams().len(),
            source = ?catalog.source(),
            "exam catalog installed"
        );
        self.catalog = Some(catalog);
    }

    pub fn catalog(&self) -> Option<&Arc<ExamCatalog>> {
        self.catalog.as_ref()
    }

    pub fn check_for_draft(&self) -> Option<Draft> {
        self.drafts.check_for_draft()
    }

    /// Runs the staged restoration, then re-renders and saves.
    ///
    /// Missing date, time or number in the draft are filled in as for a fresh report.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::InvalidInput` if no catalog has been installed yet.
    pub fn restore_draft(&mut self, draft: &Draft) -> LaudoResult<RestoreReport> {
        let catalog = self
            .catalog
            .clone()
            .ok_or_else(|| LaudoError::InvalidInput("exam catalog is not loaded".into()))?;

        let report = self
            .drafts
            .load_draft(draft, &mut self.state, &mut self.counter, &catalog);

        if self.state.presentation().exam_date.is_empty() {
            self.stamp_now();
        }
        if self.state.presentation().report_number.is_empty() {
            if let Err(e) = self.assign_new_number() {
                self.notify_error(&e);
            }
        }
        self.notices.extend(report.notices.iter().cloned());
        self.update();
        Ok(report)
    }

    /// Applies `command` and runs [`Self::update`].
    ///
    /// # Errors
    ///
    /// Returns the reducer's error, after queueing it as a notice. The state is unchanged.
    pub fn apply(&mut self, command: ReportCommand) -> LaudoResult<()> {
        if let Err(e) = self.state.apply(command) {
            tracing::warn!("command rejected: {}", e);
            self.notify_error(&e);
            return Err(e);
        }
        self.update();
        Ok(())
    }

    /// Selects the catalog template `exam_id`.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::NotFound` if the catalog has no such template, or
    /// `LaudoError::InvalidInput` if no catalog is loaded.
    pub fn select_exam_by_id(&mut self, exam_id: &str) -> LaudoResult<()> {
        let found = match &self.catalog {
            Some(catalog) => catalog
                .find(exam_id)
                .ok_or_else(|| LaudoError::NotFound(format!("exam {exam_id}"))),
            None => Err(LaudoError::InvalidInput("exam catalog is not loaded".into())),
        };
        match found {
            Ok(exam) => self.apply(ReportCommand::SelectExam(exam)),
            Err(e) => {
                self.notify_error(&e);
                Err(e)
            }
        }
    }

    /// Adds each readable image as an attachment. Rejected files are reported as notices and
    /// skipped. Returns how many were added.
    pub fn attach_files<P: AsRef<Path>>(&mut self, paths: &[P]) -> usize {
        let mut added = 0;
        for path in paths {
            match self.assets.attachment_from_path(path.as_ref()) {
                Ok(attachment) => {
                    let name = attachment.display_name.clone();
                    if self
                        .state
                        .apply(ReportCommand::AddAttachment(attachment))
                        .is_ok()
                    {
                        self.notices
                            .push(Notice::success(format!("Anexo \"{name}\" adicionado")));
                        added += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.as_ref().display(), "attachment rejected: {}", e);
                    self.notify_error(&LaudoError::Asset(e));
                }
            }
        }
        if added > 0 {
            self.update();
        }
        added
    }

    /// # Errors
    ///
    /// Returns `LaudoError::Asset` if the bytes are rejected.
    pub fn attach_bytes(&mut self, file_name: &str, bytes: &[u8]) -> LaudoResult<()> {
        let attachment = self
            .assets
            .attachment_from_bytes(file_name, bytes)
            .map_err(|e| self.reject(LaudoError::Asset(e)))?;
        self.apply(ReportCommand::AddAttachment(attachment))?;
        self.notices
            .push(Notice::success(format!("Anexo \"{file_name}\" adicionado")));
        Ok(())
    }

    /// Loads, scales and installs the professional's signature.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::Asset` if the file is rejected; the previous signature is kept.
    pub fn sign_file(&mut self, path: &Path) -> LaudoResult<()> {
        let signature = self
            .assets
            .signature_from_path(path)
            .map_err(|e| self.reject(LaudoError::Asset(e)))?;
        self.apply(ReportCommand::SetSignature(signature))?;
        self.notices
            .push(Notice::success("Assinatura carregada com sucesso"));
        Ok(())
    }

    /// Re-renders every page, then the current page, then saves the draft.
    pub fn update(&mut self) {
        self.refresh_preview();
        if let Err(e) = self.save_draft() {
            tracing::error!("autosave after update failed: {}", e);
        }
    }

    fn refresh_preview(&mut self) {
        let layout = layout_document(&self.state, self.config.branding());
        self.document = render_document(&layout);
        self.view = pagination::render_current_page(&mut self.state, &self.document);
    }

    /// Persists the current state as the draft.
    ///
    /// # Errors
    ///
    /// Returns the storage error after queueing an error notice.
    pub fn save_draft(&mut self) -> LaudoResult<()> {
        match self.drafts.save_draft(&self.state) {
            Ok(()) => {
                self.saves += 1;
                Ok(())
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Assigns the next report number from the counter.
    ///
    /// # Errors
    ///
    /// Returns `LaudoError::Storage` if the counter cannot be persisted; the number is unchanged.
    pub fn generate_number(&mut self) -> LaudoResult<ReportNumber> {
        let number = self.assign_new_number().map_err(|e| self.reject(e))?;
        self.update();
        Ok(number)
    }

    fn assign_new_number(&mut self) -> LaudoResult<ReportNumber> {
        let number = self.counter.generate()?;
        self.state
            .apply(ReportCommand::SetReportNumber(number.to_string()))?;
        Ok(number)
    }

    fn stamp_now(&mut self) {
        let now = chrono::Local::now();
        let applied = self.state.apply(ReportCommand::SetPresentation {
            exam_date: Some(now.format("%Y-%m-%d").to_string()),
            exam_time: Some(now.format("%H:%M").to_string()),
            document_type: None,
        });
        if let Err(e) = applied {
            tracing::warn!("failed to stamp exam date: {}", e);
        }
    }

    /// Starts a new report for the same professional.
    ///
    /// Clears patient, exam, field values, attachments and page; keeps professional and
    /// signature; stamps the current date; assigns a new number and deletes the stored draft.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the draft or counter cannot be written. The report is cleared
    /// regardless.
    pub fn clear_all(&mut self) -> LaudoResult<()> {
        self.state.apply(ReportCommand::ClearReport)?;
        self.state.apply(ReportCommand::SetPresentation {
            exam_date: None,
            exam_time: None,
            document_type: Some(DEFAULT_DOCUMENT_TYPE.to_string()),
        })?;
        self.stamp_now();

        let result = self
            .assign_new_number()
            .and_then(|_| self.drafts.clear_draft());
        self.refresh_preview();

        match result {
            Ok(()) => {
                tracing::info!(number = %self.state.presentation().report_number, "report cleared");
                self.notices.push(Notice::success(
                    "Todos os dados foram limpos (exceto profissional e assinatura)",
                ));
                Ok(())
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    pub fn change_page(&mut self, delta: isize) -> usize {
        let page = pagination::change_page(&mut self.state, delta);
        self.refresh_preview();
        page
    }

    pub fn go_to_page(&mut self, page: isize) -> bool {
        let moved = pagination::go_to_page(&mut self.state, page);
        if moved {
            self.refresh_preview();
        }
        moved
    }

    /// Exports the main page as PNG.
    ///
    /// # Errors
    ///
    /// Returns the export error after queueing its notice.
    pub async fn export(&mut self) -> LaudoResult<ExportedFile> {
        let result = self.exporter.export(&mut self.state).await;
        self.refresh_preview();
        match result {
            Ok(file) => {
                self.notices.push(Notice::success(format!(
                    "Laudo exportado: {}",
                    file.file_name()
                )));
                Ok(file)
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Exports every page as PNG.
    ///
    /// # Errors
    ///
    /// Returns the export error after queueing its notice.
    pub async fn export_all(&mut self) -> LaudoResult<Vec<ExportedFile>> {
        let result = self.exporter.export_all_pages(&mut self.state).await;
        self.refresh_preview();
        match result {
            Ok(files) => {
                self.notices.push(Notice::success(format!(
                    "{} página(s) exportada(s)",
                    files.len()
                )));
                Ok(files)
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }

    pub fn state(&self) -> &ReportState {
        &self.state
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn document(&self) -> &RenderedDocument {
        &self.document
    }

    pub fn view(&self) -> &PageView {
        &self.view
    }

    /// Full preview markup: every page plus the control strip.
    pub fn preview_html(&self) -> String {
        self.view.to_html(&self.document)
    }

    /// Number of successful draft saves since the app was built.
    pub fn save_count(&self) -> u64 {
        self.saves
    }

    pub fn snapshot(&self) -> Snapshot {
        let presentation = self.state.presentation();
        Snapshot {
            report_number: presentation.report_number.clone(),
            exam_date: presentation.exam_date.clone(),
            exam_time: presentation.exam_time.clone(),
            document_type: presentation.document_type.clone(),
            patient: self.state.patient().clone(),
            professional: self.state.professional().clone(),
            exam_id: self.state.current_exam().map(|e| e.id.clone()),
            exam_name: self.state.current_exam().map(|e| e.name.clone()),
            field_values: self.state.field_values().clone(),
            attachments: self
                .state
                .attachments()
                .iter()
                .map(|a| AttachmentSummary {
                    ordinal: a.ordinal,
                    name: a.display_name.clone(),
                    size: a.size_label.clone(),
                })
                .collect(),
            has_signature: self.state.signature().is_some_and(|s| s.has_image()),
            current_page: self.state.current_page(),
            total_pages: pagination::total_pages(&self.state),
            counter: self.counter.current(),
            saves: self.saves,
        }
    }

    fn notify_error(&mut self, err: &LaudoError) {
        self.notices.push(Notice::from_error(err));
    }

    fn reject(&mut self, err: LaudoError) -> LaudoError {
        self.notify_error(&err);
        err
    }
}
