//! Async session actor.
//!
//! A single task owns the [`LaudoApp`]. Every request goes through one `mpsc` queue and is
//! handled to completion before the next, so the report is never mutated concurrently. The
//! same task runs the autosave ticker and publishes save status and notices.
//!
//! Startup:
//! 1. the catalog starts loading on a blocking task,
//! 2. the stored draft is checked; without one a fresh report is started,
//! 3. the actor waits for the catalog before restoring the draft,
//! 4. queued requests are served.

use crate::app::{LaudoApp, Snapshot};
use crate::catalog::ExamCatalog;
use crate::export::ExportedFile;
use crate::notification::Notice;
use crate::state::ReportCommand;
use crate::{LaudoError, LaudoResult};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const REQUEST_QUEUE: usize = 32;
const NOTICE_BUFFER: usize = 64;

#[derive(Debug)]
pub enum Request {
    Apply(ReportCommand),
    SelectExamById(String),
    AttachFiles(Vec<PathBuf>),
    SignFile(PathBuf),
    GoToPage(isize),
    ChangePage(isize),
    GenerateNumber,
    ClearAll,
    Save,
    Export,
    ExportAll,
    Preview,
    Snapshot,
    /// Saves one last time and stops the actor.
    Shutdown,
}

#[derive(Debug)]
pub enum Response {
    Done,
    Page { current: usize, moved: bool },
    Attached(usize),
    Number(String),
    Exported(Vec<ExportedFile>),
    Preview(String),
    Snapshot(Box<Snapshot>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
}

struct Envelope {
    request: Request,
    reply: oneshot::Sender<LaudoResult<Response>>,
}

/// Cloneable handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    requests: mpsc::Sender<Envelope>,
    notices: broadcast::Sender<Notice>,
    save_status: watch::Receiver<SaveStatus>,
}

impl SessionHandle {
    /// Queues `request` and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns the request's own error, or `LaudoError::SessionClosed` if the actor has stopped.
    pub async fn send(&self, request: Request) -> LaudoResult<Response> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Envelope { request, reply })
            .await
            .map_err(|_| LaudoError::SessionClosed)?;
        response.await.map_err(|_| LaudoError::SessionClosed)?
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    pub fn save_status(&self) -> watch::Receiver<SaveStatus> {
        self.save_status.clone()
    }
}

/// Starts the actor for `app`, which must not have a catalog installed yet.
pub fn spawn(app: LaudoApp) -> (SessionHandle, JoinHandle<()>) {
    let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
    let (notices_tx, _) = broadcast::channel(NOTICE_BUFFER);
    let (status_tx, status_rx) = watch::channel(SaveStatus::Idle);

    let catalog_path = app.config().catalog_path().to_path_buf();
    let (catalog_tx, catalog_rx) = oneshot::channel();
    tokio::task::spawn_blocking(move || {
        let _ = catalog_tx.send(ExamCatalog::load(&catalog_path));
    });

    let actor = Actor {
        app,
        notices: notices_tx.clone(),
        status: status_tx,
        tracker: SaveTracker::default(),
    };
    let task = tokio::spawn(actor.run(requests_rx, catalog_rx));

    (
        SessionHandle {
            requests: requests_tx,
            notices: notices_tx,
            save_status: status_rx,
        },
        task,
    )
}

#[derive(Default)]
struct SaveTracker {
    seen: u64,
    deadline: Option<Instant>,
}

struct Actor {
    app: LaudoApp,
    notices: broadcast::Sender<Notice>,
    status: watch::Sender<SaveStatus>,
    tracker: SaveTracker,
}

impl Actor {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Envelope>,
        catalog: oneshot::Receiver<ExamCatalog>,
    ) {
        let draft = self.app.check_for_draft();
        if draft.is_none() {
            self.app.start_fresh();
        }

        let catalog = catalog.await.unwrap_or_else(|_| {
            tracing::warn!("catalog loader stopped without a result, using fallback");
            ExamCatalog::fallback()
        });
        self.app.install_catalog(Arc::new(catalog));
        if draft.is_some() {
            self.app.boot(draft);
        }
        self.settle();
        tracing::info!("session ready");

        let period = self.app.config().autosave_interval();
        let mut autosave = tokio::time::interval_at(Instant::now() + period, period);
        autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.tracker.deadline;
            tokio::select! {
                envelope = requests.recv() => {
                    let Some(Envelope { request, reply }) = envelope else {
                        break;
                    };
                    let shutdown = matches!(request, Request::Shutdown);
                    let result = self.handle(request).await;
                    if let Err(e) = &result {
                        tracing::debug!("request failed: {}", e);
                    }
                    self.settle();
                    let _ = reply.send(result);
                    if shutdown {
                        tracing::info!("session stopped");
                        return;
                    }
                }
                _ = autosave.tick() => {
                    tracing::debug!("autosave");
                    let _ = self.app.save_draft();
                    self.settle();
                }
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.tracker.deadline = None;
                    self.status.send_replace(SaveStatus::Saved);
                }
            }
        }

        tracing::info!("all session handles dropped, saving");
        if self.app.save_draft().is_ok() {
            self.status.send_replace(SaveStatus::Saved);
        }
    }

    async fn handle(&mut self, request: Request) -> LaudoResult<Response> {
        let app = &mut self.app;
        match request {
            Request::Apply(command) => app.apply(command).map(|_| Response::Done),
            Request::SelectExamById(id) => app.select_exam_by_id(&id).map(|_| Response::Done),
            Request::AttachFiles(paths) => Ok(Response::Attached(app.attach_files(&paths))),
            Request::SignFile(path) => app.sign_file(&path).map(|_| Response::Done),
            Request::GoToPage(page) => {
                let moved = app.go_to_page(page);
                Ok(Response::Page {
                    current: app.state().current_page(),
                    moved,
                })
            }
            Request::ChangePage(delta) => {
                let before = app.state().current_page();
                let current = app.change_page(delta);
                Ok(Response::Page {
                    current,
                    moved: current != before,
                })
            }
            Request::GenerateNumber => app
                .generate_number()
                .map(|number| Response::Number(number.to_string())),
            Request::ClearAll => app.clear_all().map(|_| Response::Done),
            Request::Save => app.save_draft().map(|_| Response::Done),
            Request::Export => app.export().await.map(|file| Response::Exported(vec![file])),
            Request::ExportAll => app.export_all().await.map(Response::Exported),
            Request::Preview => Ok(Response::Preview(app.preview_html())),
            Request::Snapshot => Ok(Response::Snapshot(Box::new(app.snapshot()))),
            Request::Shutdown => app.save_draft().map(|_| Response::Done),
        }
    }

    /// Publishes queued notices and any new save.
    fn settle(&mut self) {
        for notice in self.app.drain_notices() {
            // No subscribers is fine.
            let _ = self.notices.send(notice);
        }
        let saves = self.app.save_count();
        if saves != self.tracker.seen {
            self.tracker.seen = saves;
            self.tracker.deadline = Some(Instant::now() + self.app.config().save_status_window());
            self.status.send_replace(SaveStatus::Saving);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::constants::DRAFT_KEY;
    use crate::export::tests::FakeRasterizer;
    use crate::notification::Severity;
    use crate::store::{KeyValueStore, MemoryStore};
    use laudo_types::Patient;
    use std::time::Duration;
    use tempfile::TempDir;

    fn session(dir: &TempDir, store: Arc<MemoryStore>) -> (SessionHandle, JoinHandle<()>) {
        let config = CoreConfig::new(
            dir.path().join("data"),
            dir.path().join("sem-catalogo.json"),
            dir.path().join("exports"),
        )
        .unwrap()
        .with_settle_delay(Duration::ZERO);
        spawn(LaudoApp::new(
            config,
            store,
            Arc::new(FakeRasterizer::default()),
        ))
    }

    async fn snapshot(handle: &SessionHandle) -> Snapshot {
        match handle.send(Request::Snapshot).await.unwrap() {
            Response::Snapshot(snapshot) => *snapshot,
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fresh_session_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let (handle, task) = session(&dir, store.clone());

        assert_eq!(snapshot(&handle).await.report_number, "LAUDO-001001");

        handle
            .send(Request::Apply(ReportCommand::SetPatient(Patient {
                name: "Maria".into(),
                ..Default::default()
            })))
            .await
            .unwrap();

        assert!(matches!(
            handle.send(Request::Shutdown).await.unwrap(),
            Response::Done
        ));
        task.await.unwrap();

        let stored = store.get(DRAFT_KEY).unwrap().unwrap();
        assert!(stored.contains("Maria"));
        assert!(matches!(
            handle.send(Request::Snapshot).await,
            Err(LaudoError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_restore_waits_for_catalog() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                DRAFT_KEY,
                r#"{"paciente": {"nome": "Ana"},
                    "exameAtual": {"id": "modelo_generico"},
                    "dadosExame": {"conclusao": "Normal"},
                    "numeroExame": "LAUDO-001050"}"#,
            )
            .unwrap();
        let (handle, _task) = session(&dir, store);

        let restored = snapshot(&handle).await;
        assert_eq!(restored.patient.name, "Ana");
        assert_eq!(restored.exam_id.as_deref(), Some("modelo_generico"));
        assert_eq!(restored.field_values.get("conclusao").map(String::as_str), Some("Normal"));
        assert_eq!(restored.counter, 1050);

        let Response::Number(next) = handle.send(Request::GenerateNumber).await.unwrap() else {
            panic!("expected a number");
        };
        assert_eq!(next, "LAUDO-001051");
    }

    #[tokio::test]
    async fn test_notices_are_broadcast() {
        let dir = TempDir::new().unwrap();
        let (handle, _task) = session(&dir, Arc::new(MemoryStore::new()));
        snapshot(&handle).await;
        let mut notices = handle.subscribe_notices();

        let err = handle
            .send(Request::SelectExamById("inexistente".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, LaudoError::NotFound(_)));

        let notice = notices.recv().await.unwrap();
        assert_eq!(notice.severity, Severity::Warning);
    }

    #[tokio::test]
    async fn test_page_requests_report_movement() {
        let dir = TempDir::new().unwrap();
        let (handle, _task) = session(&dir, Arc::new(MemoryStore::new()));

        let response = handle.send(Request::GoToPage(3)).await.unwrap();
        assert!(matches!(response, Response::Page { current: 0, moved: false }));
        let response = handle.send(Request::ChangePage(-1)).await.unwrap();
        assert!(matches!(response, Response::Page { current: 0, moved: false }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_status_returns_to_saved() {
        let dir = TempDir::new().unwrap();
        let (handle, _task) = session(&dir, Arc::new(MemoryStore::new()));
        let mut status = handle.save_status();

        handle.send(Request::Save).await.unwrap();
        assert_eq!(*status.borrow_and_update(), SaveStatus::Saving);

        status
            .wait_for(|s| *s == SaveStatus::Saved)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_fires_on_the_interval() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let (handle, _task) = session(&dir, store.clone());
        let mut status = handle.save_status();

        handle
            .send(Request::Apply(ReportCommand::SetPatient(Patient {
                name: "Maria".into(),
                ..Default::default()
            })))
            .await
            .unwrap();
        status
            .wait_for(|s| *s == SaveStatus::Saved)
            .await
            .unwrap();
        store.remove(DRAFT_KEY).unwrap();
        let saves = snapshot(&handle).await.saves;

        tokio::time::advance(Duration::from_secs(30)).await;
        status
            .wait_for(|s| *s == SaveStatus::Saving)
            .await
            .unwrap();
        let stored = store.get(DRAFT_KEY).unwrap().unwrap();
        assert!(stored.contains("Maria"));

        status
            .wait_for(|s| *s == SaveStatus::Saved)
            .await
            .unwrap();
        assert_eq!(snapshot(&handle).await.saves, saves + 1);
    }
}
