//! NER batch annotation tool
//!
//! Annotates dataset rows with an LLM, scores the predictions at entity
//! level and writes the predictions and report to the output directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use llmner_agent::{
    BatchRunner, ModelProvider, NerAgent, OpenAiCompatProvider, RunOutput, Settings, export_run,
    fetch_conll2003_test_split, notify_webhook,
};
use llmner_core::{
    EvalOptions, EvaluationReport, LabelSchema, NerDataset, TokenSanitizer,
    evaluate_ner_predictions,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI arguments
#[derive(Parser)]
#[command(name = "ner-run")]
#[command(about = "Annotate CoNLL-2003 rows with an LLM and score the predictions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    settings: Settings,

    /// Dataset file (JSON lines, or CoNLL columns); the CoNLL-2003 test
    /// split is downloaded when omitted
    #[arg(short, long, env = "NER_DATASET")]
    dataset: Option<PathBuf>,

    /// Where the downloaded test split is cached
    #[arg(long, env = "NER_CACHE_DIR", default_value = "data")]
    cache_dir: PathBuf,

    /// Number of rows to annotate
    #[arg(short, long, default_value_t = 100)]
    limit: usize,

    /// Concurrent annotation requests (capped by --max-concurrency)
    #[arg(short, long, default_value_t = 1)]
    concurrency: usize,

    /// Normalize tokens before prompting
    #[arg(long)]
    sanitize_tokens: bool,

    /// Rows printed after the run
    #[arg(long, default_value_t = 10)]
    samples: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-score a saved predictions.jsonl file
    Evaluate {
        /// Predictions written by a previous run
        predictions: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A .env file wins over the inherited environment.
    dotenvy::dotenv_override().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut cli = Cli::parse();
    match cli.command.take() {
        Some(Commands::Evaluate { predictions }) => evaluate_saved(&predictions),
        None => run(cli).await,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings;
    settings.validate().context("invalid configuration")?;
    let provider = OpenAiCompatProvider::from_settings(&settings)?;

    let dataset = match &cli.dataset {
        Some(path) => load_dataset(path)?,
        None => fetch_conll2003_test_split(provider.http_client(), &cli.cache_dir)
            .await
            .context("failed to load the CoNLL-2003 test split")?,
    };
    info!(rows = dataset.len(), limit = cli.limit, "dataset loaded");
    let schema = dataset.schema().clone();

    let agent = NerAgent::new(provider.get_model(None), &schema)
        .with_retry(settings.retry_policy()?);
    let mut runner = BatchRunner::new(agent)
        .with_concurrency(cli.concurrency)
        .with_max_concurrency(settings.max_concurrency);
    if cli.sanitize_tokens {
        runner = runner.with_sanitizer(TokenSanitizer::new()?);
    }

    let output = runner.run_dataset(dataset, cli.limit).await?;
    print_samples(&output, cli.samples)?;

    let report =
        evaluate_ner_predictions(&output.dataset, &schema.id2label(), &EvalOptions::default())
            .context("evaluation failed")?;
    print_report(&report);

    let paths = export_run(&settings.output_dir, &output, &report)
        .with_context(|| format!("failed to write {}", settings.output_dir.display()))?;
    println!(
        "Saved predictions to {}, {}, {} and {}",
        paths.jsonl.display(),
        paths.csv.display(),
        paths.parquet.display(),
        paths.xlsx.display()
    );
    println!("Saved report to {}", paths.report.display());

    if let Some(url) = &settings.webhook_url {
        notify_webhook(
            provider.http_client(),
            url,
            &settings.model_name,
            &output.summary,
            &report.overall,
        )
        .await;
    }

    Ok(())
}

fn evaluate_saved(path: &Path) -> Result<()> {
    let schema = LabelSchema::conll2003();
    let id2label = schema.id2label();
    let dataset = NerDataset::load_jsonl(path, schema)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let report = evaluate_ner_predictions(&dataset, &id2label, &EvalOptions::default())?;
    print_report(&report);
    Ok(())
}

/// Pick the loader from the file extension.
fn load_dataset(path: &Path) -> Result<NerDataset> {
    let schema = LabelSchema::conll2003();
    let is_jsonl = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e, "jsonl" | "json" | "ndjson"));

    let dataset = if is_jsonl {
        NerDataset::load_jsonl(path, schema)
    } else {
        NerDataset::load_conll(path, schema)
    };
    dataset.with_context(|| format!("failed to load dataset {}", path.display()))
}

fn print_samples(output: &RunOutput, count: usize) -> Result<()> {
    for (i, row) in output.dataset.rows().iter().take(count).enumerate() {
        let sample = serde_json::json!({
            "id": row.id,
            "tokens": row.tokens,
            "ner_tags": row.ner_tags,
            "pred_ner_tags": row.pred_ner_tags,
            "pred_status": output.statuses.get(i).map(|s| s.label()),
        });
        println!("Sample {i} {}", serde_json::to_string(&sample)?);
    }
    Ok(())
}

fn print_report(report: &EvaluationReport) {
    println!("{}", report.report_text);
    println!(
        "precision: {:.4}  recall: {:.4}  f1: {:.4}",
        report.overall.precision, report.overall.recall, report.overall.f1
    );
}
