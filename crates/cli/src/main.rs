use clap::{Parser, Subcommand};
use laudo_core::catalog::FieldKind;
use laudo_core::constants::ALL_CATEGORIES;
use laudo_core::types::{Patient, Professional, RegistrationType};
use laudo_core::{CoreConfig, LaudoApp, ReportCommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "laudo")]
#[command(about = "Digital medical report (laudo) authoring CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List exam templates
    Catalog {
        /// Only templates of this category ("todos" for all)
        #[arg(long)]
        category: Option<String>,
        /// Case-insensitive search in name and description
        #[arg(long)]
        search: Option<String>,
    },
    /// Update patient data (omitted options are kept)
    Patient {
        #[arg(long)]
        name: Option<String>,
        /// Document number
        #[arg(long)]
        document: Option<String>,
        /// Document type (default: Passaporte)
        #[arg(long)]
        document_type: Option<String>,
        #[arg(long)]
        age: Option<String>,
        #[arg(long)]
        unit: Option<String>,
    },
    /// Update the signing professional (omitted options are kept)
    Professional {
        #[arg(long)]
        name: Option<String>,
        /// Registration number
        #[arg(long)]
        registration: Option<String>,
        /// Council: CRM, COREN, CRO, CRBM, CRF
        #[arg(long)]
        registration_type: Option<String>,
    },
    /// Set the exam date and/or time
    ExamDate {
        /// YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        /// HH:MM
        #[arg(long)]
        time: Option<String>,
    },
    /// Select an exam template by id
    SelectExam { id: String },
    /// Close the current exam, discarding its field values
    CloseExam,
    /// Set a field of the current exam (empty value clears it)
    Field { id: String, value: String },
    /// Attach one or more images
    Attach {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Remove an attachment by its number (1-based)
    Detach { number: usize },
    /// Load the professional's signature image
    Sign { path: PathBuf },
    /// Remove the signature
    Unsign,
    /// Preview page N (1 = main report). The page is not remembered by later invocations.
    Page {
        number: usize,
        /// Write the page markup to this file instead of stdout
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Print the preview markup, or write it to a file
    Preview {
        #[arg(long)]
        html: Option<PathBuf>,
    },
    /// Assign a new report number
    Number,
    /// Export the main page (or every page) as PNG
    Export {
        #[arg(long)]
        all: bool,
    },
    /// Start a new report, keeping professional and signature
    Clear,
    /// Show the current report as JSON
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("laudo=warn".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'laudo --help' for commands");
        return Ok(());
    };

    let config = CoreConfig::from_env()?;
    let mut app = LaudoApp::open(config);
    for notice in app.drain_notices() {
        tracing::debug!("startup: {}", notice);
    }

    let outcome = run(&mut app, command).await;
    for notice in app.drain_notices() {
        println!("{}", notice);
    }
    outcome
}

async fn run(app: &mut LaudoApp, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Catalog { category, search } => {
            let Some(catalog) = app.catalog() else {
                anyhow::bail!("exam catalog is not loaded");
            };
            let mut exams = catalog.by_category(category.as_deref().unwrap_or(ALL_CATEGORIES));
            if let Some(term) = search {
                let matches = catalog.search(&term);
                exams.retain(|e| matches.iter().any(|m| m.id == e.id));
            }
            if exams.is_empty() {
                println!("No exams found.");
            }
            for exam in exams {
                println!("{} - {} [{}]", exam.id, exam.name, exam.category);
                for field in &exam.fields {
                    let kind = match &field.kind {
                        FieldKind::Text => "texto".to_string(),
                        FieldKind::TextArea => "textarea".to_string(),
                        FieldKind::Select(options) => format!(
                            "select: {}",
                            options
                                .iter()
                                .map(|o| o.value.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                        FieldKind::Number(_) => "numero".to_string(),
                    };
                    println!("    {} ({}): {}", field.id, kind, field.label);
                }
            }
        }
        Commands::Patient {
            name,
            document,
            document_type,
            age,
            unit,
        } => {
            let current = app.state().patient();
            let patient = Patient {
                name: name.unwrap_or_else(|| current.name.clone()),
                document_id: document.unwrap_or_else(|| current.document_id.clone()),
                age: age.unwrap_or_else(|| current.age.clone()),
                unit: unit.unwrap_or_else(|| current.unit.clone()),
            };
            app.apply(ReportCommand::SetPatient(patient))?;
            if document_type.is_some() {
                app.apply(ReportCommand::SetPresentation {
                    exam_date: None,
                    exam_time: None,
                    document_type,
                })?;
            }
            println!("Patient updated.");
        }
        Commands::Professional {
            name,
            registration,
            registration_type,
        } => {
            let current = app.state().professional();
            let professional = Professional {
                name: name.unwrap_or_else(|| current.name.clone()),
                registration_id: registration.unwrap_or_else(|| current.registration_id.clone()),
                registration_type: registration_type
                    .map(|t| RegistrationType::parse(&t))
                    .unwrap_or_else(|| current.registration_type.clone()),
            };
            app.apply(ReportCommand::SetProfessional(professional))?;
            println!("Professional updated.");
        }
        Commands::ExamDate { date, time } => {
            app.apply(ReportCommand::SetPresentation {
                exam_date: date,
                exam_time: time,
                document_type: None,
            })?;
            let presentation = app.state().presentation();
            println!("Exam date: {} {}", presentation.exam_date, presentation.exam_time);
        }
        Commands::SelectExam { id } => {
            app.select_exam_by_id(&id)?;
            println!("Selected exam: {}", id);
        }
        Commands::CloseExam => {
            app.apply(ReportCommand::CloseExam)?;
            println!("Exam closed.");
        }
        Commands::Field { id, value } => {
            app.apply(ReportCommand::SetFieldValue {
                field_id: id.clone(),
                value,
            })?;
            println!("Field {} updated.", id);
        }
        Commands::Attach { paths } => {
            let added = app.attach_files(&paths);
            println!("{} of {} file(s) attached.", added, paths.len());
        }
        Commands::Detach { number } => {
            if number == 0 {
                anyhow::bail!("attachment numbers start at 1");
            }
            app.apply(ReportCommand::RemoveAttachment(number - 1))?;
            println!("Attachment {} removed.", number);
        }
        Commands::Sign { path } => {
            app.sign_file(&path)?;
        }
        Commands::Unsign => {
            app.apply(ReportCommand::RemoveSignature)?;
            println!("Signature removed.");
        }
        Commands::Page { number, html } => {
            let target = isize::try_from(number)?.saturating_sub(1);
            if !app.go_to_page(target) {
                anyhow::bail!(
                    "page {} does not exist (report has {} page(s))",
                    number,
                    app.view().total
                );
            }
            if let Some(controls) = &app.view().controls {
                eprintln!("{}", controls.indicator);
            }
            write_preview(app, html)?;
        }
        Commands::Preview { html } => write_preview(app, html)?,
        Commands::Number => {
            let number = app.generate_number()?;
            println!("{}", number);
        }
        Commands::Export { all } => {
            let files = if all {
                app.export_all().await?
            } else {
                vec![app.export().await?]
            };
            for file in files {
                println!("{} ({}x{})", file.path.display(), file.width, file.height);
            }
        }
        Commands::Clear => {
            app.clear_all()?;
            // The next invocation restores this draft instead of assigning yet another number.
            app.save_draft()?;
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&app.snapshot())?);
        }
    }
    Ok(())
}

fn write_preview(app: &LaudoApp, html: Option<PathBuf>) -> anyhow::Result<()> {
    let markup = app.preview_html();
    match html {
        Some(path) => {
            std::fs::write(&path, markup)?;
            println!("Preview written to {}", path.display());
        }
        None => println!("{}", markup),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use laudo_core::catalog::ExamCatalog;
    use laudo_core::export::SvgRasterizer;
    use laudo_core::store::MemoryStore;
    use std::sync::Arc;

    fn open_in(store: &Arc<MemoryStore>) -> LaudoApp {
        let config = CoreConfig::new("data".into(), "exames.json".into(), "exports".into())
            .unwrap();
        let mut app = LaudoApp::new(config, store.clone(), Arc::new(SvgRasterizer::new()));
        let draft = app.check_for_draft();
        app.install_catalog(Arc::new(ExamCatalog::fallback()));
        app.boot(draft);
        app
    }

    #[tokio::test]
    async fn test_clear_keeps_its_number_for_the_next_invocation() {
        let store = Arc::new(MemoryStore::new());

        let mut first = open_in(&store);
        run(&mut first, Commands::Clear).await.unwrap();
        let cleared = first.state().presentation().report_number.clone();

        let second = open_in(&store);
        assert_eq!(second.state().presentation().report_number, cleared);
    }

    #[tokio::test]
    async fn test_page_out_of_range_is_an_error() {
        let store = Arc::new(MemoryStore::new());
        let mut app = open_in(&store);
        let err = run(&mut app, Commands::Page { number: 3, html: None })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("page 3 does not exist"));
    }
}
