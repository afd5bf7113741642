//! `oasis` command-line entry point.
//!
//! Thin wrapper over [`oasis_engine::Engine`] for local use. Every command
//! prints the resulting record(s) as pretty JSON on stdout; logs go to
//! stderr and follow `RUST_LOG` (default `info`).

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use oasis_engine::Engine;
use oasis_engine::EngineConfig;
use oasis_engine::ExportFormat;
use oasis_engine::RunOptions;
use oasis_engine::export_version;
use oasis_protocol::RiskRequest;
use oasis_protocol::RunMode;
use oasis_store::NewFeedback;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "oasis", about = "Versioned risk assessments with validated LLM output")]
struct Cli {
    /// Config file; defaults to $OASIS_CONFIG or ~/.config/oasis/oasis.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(subcommand)]
    Project(ProjectCommand),
    #[command(subcommand)]
    Assessment(AssessmentCommand),
    /// Generate and store the next version of an assessment.
    Run {
        #[arg(long)]
        assessment: String,
        /// Request JSON; defaults to the assessment's stored payload.
        #[arg(long, value_name = "FILE")]
        request: Option<PathBuf>,
        #[arg(long, default_value_t = RunMode::Auto)]
        mode: RunMode,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        variant: Option<String>,
        #[arg(long)]
        rag: Option<bool>,
    },
    /// List versions of an assessment, newest first.
    Versions {
        #[arg(long)]
        assessment: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Attach reviewer feedback to a version.
    Feedback {
        #[arg(long)]
        assessment: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        rating: Option<u8>,
        #[arg(long = "flag")]
        flags: Vec<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        reviewer: Option<String>,
    },
    /// Render a version as markdown, csv or json.
    Export {
        #[arg(long)]
        assessment: String,
        #[arg(long)]
        version: String,
        #[arg(long, default_value_t = ExportFormat::Markdown)]
        format: ExportFormat,
        /// Write into this directory instead of stdout.
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    #[command(subcommand)]
    Template(TemplateCommand),
}

#[derive(Subcommand, Debug)]
enum ProjectCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    List {
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum AssessmentCommand {
    Create {
        #[arg(long)]
        project: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        template: Option<String>,
        #[arg(long, value_name = "FILE")]
        request: PathBuf,
    },
    List {
        #[arg(long)]
        project: String,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// Create a template or append a new content version.
    Upsert {
        #[arg(long)]
        name: String,
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        notes: Option<String>,
    },
    List,
    Show {
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            let mut config = EngineConfig::load_from_path(path)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            config
        }
        None => EngineConfig::load()?,
    };
    tracing::debug!(store = %config.store_path.display(), "oasis starting");
    let engine = Engine::new(config);

    match cli.command {
        Command::Project(ProjectCommand::Create { name, description }) => {
            print_json(&engine.store().create_project(&name, description.as_deref())?)
        }
        Command::Project(ProjectCommand::List { limit }) => {
            print_json(&engine.store().list_projects(limit)?)
        }
        Command::Assessment(AssessmentCommand::Create {
            project,
            title,
            template,
            request,
        }) => {
            let payload = read_request(&request)?;
            print_json(&engine.store().create_assessment(
                &project,
                &title,
                template.as_deref(),
                payload,
            )?)
        }
        Command::Assessment(AssessmentCommand::List { project, limit }) => {
            print_json(&engine.store().list_assessment_summaries(&project, limit)?)
        }
        Command::Run {
            assessment,
            request,
            mode,
            model,
            variant,
            rag,
        } => {
            let request = match request {
                Some(path) => read_request(&path)?,
                None => engine.store().get_assessment(&assessment)?.payload,
            };
            let version = engine
                .run_assessment(
                    &assessment,
                    request,
                    RunOptions {
                        mode,
                        model_override: model,
                        prompt_variant: variant,
                        rag_enabled: rag,
                    },
                )
                .await?;
            print_json(&version)
        }
        Command::Versions { assessment, limit } => {
            print_json(&engine.store().list_versions(&assessment, limit)?)
        }
        Command::Feedback {
            assessment,
            version,
            rating,
            flags,
            comment,
            reviewer,
        } => {
            let receipt = engine.store().create_feedback(
                &assessment,
                &version,
                NewFeedback {
                    rating,
                    flags,
                    comment,
                    recommended_edits: None,
                    reviewer,
                },
            )?;
            if let Some(requested) = &receipt.reassigned_from {
                eprintln!(
                    "note: feedback stored against assessment {} (requested {requested})",
                    receipt.feedback.assessment_id
                );
            }
            print_json(&receipt.feedback)
        }
        Command::Export {
            assessment,
            version,
            format,
            out,
        } => {
            let export = export_version(engine.store(), &assessment, &version, format)?;
            match out {
                Some(dir) => {
                    std::fs::create_dir_all(&dir)
                        .with_context(|| format!("creating {}", dir.display()))?;
                    let path = dir.join(&export.filename);
                    std::fs::write(&path, &export.body)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("wrote {}", path.display());
                    Ok(())
                }
                None => {
                    print!("{}", export.body);
                    Ok(())
                }
            }
        }
        Command::Template(TemplateCommand::Upsert { name, file, notes }) => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            print_json(
                &engine
                    .resolver()
                    .upsert_template(&name, &content, notes.as_deref())?,
            )
        }
        Command::Template(TemplateCommand::List) => {
            print_json(&engine.resolver().variant_names()?)
        }
        Command::Template(TemplateCommand::Show { name }) => {
            print_json(&engine.resolver().describe(&name)?)
        }
    }
}

fn read_request(path: &Path) -> Result<RiskRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading request {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing request {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{json}");
    Ok(())
}
