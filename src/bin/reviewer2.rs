use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use reviewer2::io::{aggregate_jsonl, append_jsonl, read_paper_list, read_values, write_manifest};
use reviewer2::qc::{arm_means, validate_jsonl, write_arm_means};
use reviewer2::schema::{parse_arm_list, RecordDefaults};
use reviewer2::{stub_records, RecordSchema};
use std::path::{Path, PathBuf};

/// Persona-driven paper review pipeline: ingest, generate, validate, summarize.
#[derive(Parser)]
#[command(name = "reviewer2", author, version, about, long_about = None)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read the paper list and write manifest_<run_id>.json
    Ingest {
        #[arg(long)]
        papers: PathBuf,
        #[arg(long)]
        run_id: String,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },

    /// Append one stub record per (paper, arm) to the output log
    Review {
        #[arg(long)]
        papers: PathBuf,
        #[arg(long)]
        run_id: String,
        #[arg(long, default_value = "praise,neutral,harsh")]
        arms: String,
        #[arg(long, default_value = "out/reviews.jsonl")]
        out: PathBuf,
        #[command(flatten)]
        labels: Labels,
    },

    /// Generate, judge and append full records using an OpenRouter-compatible endpoint
    #[cfg(feature = "llm")]
    Generate {
        #[arg(long)]
        papers: PathBuf,
        #[arg(long)]
        run_id: String,
        /// Directory of <paper_id>.json extraction outputs
        #[arg(long)]
        content_dir: PathBuf,
        #[arg(long, default_value = "praise,neutral,harsh")]
        arms: String,
        #[arg(long, default_value = "out/reviews.jsonl")]
        out: PathBuf,
        #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
        api_key: String,
        #[arg(long, env = "OPENROUTER_BASE_URL", default_value = reviewer2::llm::OPENROUTER_BASE_URL)]
        base_url: String,
        /// Model id sent to the endpoint for reviews
        #[arg(long, env = "REVIEWER_MODEL_ID", default_value = "openai/gpt-5")]
        reviewer_model_id: String,
        /// Model id sent to the endpoint for judging
        #[arg(long, env = "JUDGE_MODEL_ID", default_value = "anthropic/claude-sonnet-4")]
        judge_model_id: String,
        #[command(flatten)]
        labels: Labels,
    },

    /// Validate every line of a JSONL log; exits non-zero on any failure
    Qc {
        input: PathBuf,
        /// Alternative schema file (defaults to the built-in FULL-20)
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Concatenate JSONL logs
    Aggregate {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },

    /// Write per-arm score means as CSV
    Means {
        input: PathBuf,
        #[arg(long, default_value = "out/arm_means.csv")]
        out: PathBuf,
    },
}

/// Labels stamped onto every record.
#[derive(clap::Args)]
struct Labels {
    #[arg(long, env = "REVIEWER_MODEL", default_value = "gpt-5")]
    model: String,
    #[arg(long, env = "JUDGE_MODEL", default_value = "Claude")]
    judge_model: String,
    #[arg(long, default_value = "A")]
    persona_version: String,
}

impl From<Labels> for RecordDefaults {
    fn from(labels: Labels) -> Self {
        Self {
            model: labels.model,
            judge_model: labels.judge_model,
            persona_version: labels.persona_version,
            ..Default::default()
        }
    }
}

fn load_schema(path: Option<&Path>) -> Result<RecordSchema> {
    let schema = match path {
        Some(path) => RecordSchema::from_path(path)
            .with_context(|| format!("failed to load schema {}", path.display()))?,
        None => RecordSchema::full20()?,
    };
    Ok(schema)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match cli.command {
        Command::Ingest {
            papers,
            run_id,
            out_dir,
        } => {
            let papers = read_paper_list(&papers)
                .with_context(|| format!("failed to read {}", papers.display()))?;
            let path = write_manifest(&out_dir, &run_id, &papers)?;
            println!("{}", path.display());
        }

        Command::Review {
            papers,
            run_id,
            arms,
            out,
            labels,
        } => {
            let arms = parse_arm_list(&arms)?;
            let defaults = RecordDefaults::from(labels);
            let papers = read_paper_list(&papers)
                .with_context(|| format!("failed to read {}", papers.display()))?;
            let mut written = 0;
            for paper in &papers {
                for record in stub_records(paper, &run_id, &arms, &defaults) {
                    append_jsonl(&out, &record)?;
                    written += 1;
                }
            }
            info!("Appended {} stub record(s) to {}", written, out.display());
        }

        #[cfg(feature = "llm")]
        Command::Generate {
            papers,
            run_id,
            content_dir,
            arms,
            out,
            api_key,
            base_url,
            reviewer_model_id,
            judge_model_id,
            labels,
        } => {
            use reviewer2::llm::{JudgeClient, LlmConfig, OpenRouterClient, ReviewerClient};
            use reviewer2::{Judge, Orchestrator, OrchestratorConfig, RetryPolicy};

            let config = OrchestratorConfig {
                arms: parse_arm_list(&arms)?,
                defaults: RecordDefaults::from(labels),
                ..Default::default()
            };
            let client = OpenRouterClient::new(LlmConfig::new(api_key).with_base_url(base_url))?;
            let orchestrator = Orchestrator::new(
                ReviewerClient::new(client.clone(), reviewer_model_id),
                Judge::new(JudgeClient::new(client, judge_model_id), RetryPolicy::default()),
                RecordSchema::full20()?,
                config,
            );

            let papers = read_paper_list(&papers)
                .with_context(|| format!("failed to read {}", papers.display()))?;
            let summary = orchestrator
                .run_batch(&papers, &content_dir, &run_id, &out)
                .await;
            info!(
                "{}/{} paper(s) done, {} record(s) appended to {}",
                summary.papers_ok,
                papers.len(),
                summary.records_written,
                out.display()
            );
            if !summary.all_succeeded() {
                for failure in &summary.failures {
                    eprintln!("{} ({}): {}", failure.paper_id, failure.paper_title, failure.error);
                }
                std::process::exit(1);
            }
        }

        Command::Qc { input, schema } => {
            let schema = load_schema(schema.as_deref())?;
            let report = validate_jsonl(&input, &schema)
                .with_context(|| format!("failed to read {}", input.display()))?;
            println!("{}", report);
            if !report.passed() {
                std::process::exit(1);
            }
        }

        Command::Aggregate { inputs, out } => {
            let count = aggregate_jsonl(&inputs, &out)?;
            println!("{} line(s) written to {}", count, out.display());
        }

        Command::Means { input, out } => {
            let records = read_values(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let means = arm_means(&records);
            if means.is_empty() {
                bail!("no records with an arm in {}", input.display());
            }
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            write_arm_means(&out, &means)?;
            println!("{}", out.display());
        }
    }

    Ok(())
}
