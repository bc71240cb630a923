use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use laudo_core::export::SvgRasterizer;
use laudo_core::session::{self, Request, Response, SessionHandle};
use laudo_core::store::FileStore;
use laudo_core::types::{Patient, Professional};
use laudo_core::{CoreConfig, LaudoApp, ReportCommand};

/// One request line on stdin, tagged by `op`.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WireRequest {
    SetPatient {
        patient: Patient,
    },
    SetProfessional {
        professional: Professional,
    },
    SetPresentation {
        #[serde(default)]
        exam_date: Option<String>,
        #[serde(default)]
        exam_time: Option<String>,
        #[serde(default)]
        document_type: Option<String>,
    },
    SelectExam {
        id: String,
    },
    CloseExam,
    SetField {
        field_id: String,
        value: String,
    },
    Attach {
        paths: Vec<PathBuf>,
    },
    /// 0-based attachment index.
    Detach {
        index: usize,
    },
    Sign {
        path: PathBuf,
    },
    Unsign,
    GoToPage {
        page: isize,
    },
    ChangePage {
        delta: isize,
    },
    GenerateNumber,
    ClearAll,
    Save,
    Export,
    ExportAll,
    Preview,
    Snapshot,
    Shutdown,
}

impl From<WireRequest> for Request {
    fn from(wire: WireRequest) -> Self {
        match wire {
            WireRequest::SetPatient { patient } => {
                Request::Apply(ReportCommand::SetPatient(patient))
            }
            WireRequest::SetProfessional { professional } => {
                Request::Apply(ReportCommand::SetProfessional(professional))
            }
            WireRequest::SetPresentation {
                exam_date,
                exam_time,
                document_type,
            } => Request::Apply(ReportCommand::SetPresentation {
                exam_date,
                exam_time,
                document_type,
            }),
            WireRequest::SelectExam { id } => Request::SelectExamById(id),
            WireRequest::CloseExam => Request::Apply(ReportCommand::CloseExam),
            WireRequest::SetField { field_id, value } => {
                Request::Apply(ReportCommand::SetFieldValue { field_id, value })
            }
            WireRequest::Attach { paths } => Request::AttachFiles(paths),
            WireRequest::Detach { index } => {
                Request::Apply(ReportCommand::RemoveAttachment(index))
            }
            WireRequest::Sign { path } => Request::SignFile(path),
            WireRequest::Unsign => Request::Apply(ReportCommand::RemoveSignature),
            WireRequest::GoToPage { page } => Request::GoToPage(page),
            WireRequest::ChangePage { delta } => Request::ChangePage(delta),
            WireRequest::GenerateNumber => Request::GenerateNumber,
            WireRequest::ClearAll => Request::ClearAll,
            WireRequest::Save => Request::Save,
            WireRequest::Export => Request::Export,
            WireRequest::ExportAll => Request::ExportAll,
            WireRequest::Preview => Request::Preview,
            WireRequest::Snapshot => Request::Snapshot,
            WireRequest::Shutdown => Request::Shutdown,
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportedFileOut {
    path: String,
    page: usize,
    width: u32,
    height: u32,
}

fn response_json(response: Response) -> anyhow::Result<Value> {
    Ok(match response {
        Response::Done => Value::Null,
        Response::Page { current, moved } => json!({ "current": current, "moved": moved }),
        Response::Attached(count) => json!({ "attached": count }),
        Response::Number(number) => Value::String(number),
        Response::Exported(files) => serde_json::to_value(
            files
                .into_iter()
                .map(|f| ExportedFileOut {
                    path: f.path.display().to_string(),
                    page: f.page,
                    width: f.width,
                    height: f.height,
                })
                .collect::<Vec<_>>(),
        )?,
        Response::Preview(markup) => Value::String(markup),
        Response::Snapshot(snapshot) => serde_json::to_value(*snapshot)?,
    })
}

/// Main entry point for the Laudo session host
///
/// Reads one JSON request per line from stdin and writes one JSON line per reply to stdout.
/// Notices and save status changes are written to stdout as they happen. EOF or Ctrl-C shut
/// the session down after a final save.
///
/// # Environment Variables
/// - `LAUDO_DATA_DIR`: Directory for the draft and counter (default: "laudo_data")
/// - `LAUDO_CATALOG`: Exam catalog JSON (default: "assets/exames.json")
/// - `LAUDO_EXPORT_DIR`: Directory for exported PNGs (default: "exports")
/// - `LAUDO_AUTOSAVE_SECS`: Autosave period (default: 30)
/// - `LAUDO_SETTLE_MS`: Delay before rasterizing an export (default: 500)
/// - `LAUDO_INSTITUTION`: Institution printed on the report
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("laudo=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CoreConfig::from_env()?;
    tracing::info!("++ Starting Laudo session (data in {})", config.data_dir().display());

    let store = Arc::new(FileStore::new(config.data_dir()));
    let app = LaudoApp::new(config, store, Arc::new(SvgRasterizer::new()));
    let (handle, actor) = session::spawn(app);

    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(write_lines(out_rx));
    let events = tokio::spawn(forward_events(handle.clone(), out_tx.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let shutdown = handle_line(&handle, &line, &out_tx).await?;
                if shutdown {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    if let Err(e) = handle.send(Request::Shutdown).await {
        tracing::debug!("session already closed: {}", e);
    }
    actor.await?;
    events.abort();
    drop(out_tx);
    writer.await??;
    Ok(())
}

/// Returns `true` when the line asked for shutdown.
async fn handle_line(
    handle: &SessionHandle,
    line: &str,
    out: &mpsc::UnboundedSender<String>,
) -> anyhow::Result<bool> {
    let wire: WireRequest = match serde_json::from_str(line) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::warn!("bad request line: {}", e);
            let _ = out.send(json!({ "ok": false, "error": format!("bad request: {e}") }).to_string());
            return Ok(false);
        }
    };
    let shutdown = matches!(wire, WireRequest::Shutdown);
    let reply = match handle.send(wire.into()).await {
        Ok(response) => json!({ "ok": true, "result": response_json(response)? }),
        Err(e) => json!({ "ok": false, "error": e.to_string() }),
    };
    let _ = out.send(reply.to_string());
    Ok(shutdown)
}

async fn forward_events(handle: SessionHandle, out: mpsc::UnboundedSender<String>) {
    let mut notices = handle.subscribe_notices();
    let mut status = handle.save_status();
    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    let _ = out.send(json!({ "notice": notice }).to_string());
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notice subscriber lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                let _ = out.send(json!({ "save_status": current }).to_string());
            }
        }
    }
}

async fn write_lines(mut lines: mpsc::UnboundedReceiver<String>) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        stdout.write_all(line.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}
