//! Streaming data-quality checks over NDJSON row streams.
//!
//! This binary runs a quality stage over rows read from a file or stdin,
//! passes each row through (optionally with a `check_result` verdict), and
//! flushes the collected metrics to the configured store or endpoint.
//!
//! # Guarantees
//! - Store and endpoint credentials never appear in logs
//! - Rows go to stdout or `--output`; logs always go to stderr
//! - Metrics counted before a fatal row error are still flushed

mod input;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rowaudit_core::{
    QualityError, QualityStage, Result, RowMetricsTree, RowSchema, RuleCatalog, StageConfig,
    alert::LogAlertDispatcher,
    config_schema::{missing_options, validate_config_document},
    error::redact_url,
    evaluator::QualityEvaluator,
    logging::{LogFormat, init_logging_with_format},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "rowaudit")]
#[command(about = "Streaming data-quality checks with shared metric aggregation")]
#[command(version)]
#[command(long_about = "
rowaudit - data-quality rules over row streams

Reads newline-delimited JSON rows, applies the configured rules to the
target columns, and aggregates neat/dirty counts per rule, per field and per
table into a shared metric store or HTTP endpoint.

INPUT ROWS:
  [1, \"a@x.com\"]                       insert, positional fields
  {\"id\": 1, \"email\": \"a@x.com\"}        insert, fields by column name
  {\"kind\": \"-D\", \"fields\": [1, \"\"]}    change row (+I, -U, +U, -D)

EXAMPLES:
  rowaudit run --config job.json --schema columns.json --input rows.ndjson
  rowaudit check-config --config job.json --schema columns.json
  rowaudit rules
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a quality stage over NDJSON rows
    Run(RunArgs),
    /// Validate a stage configuration without processing rows
    CheckConfig(CheckConfigArgs),
    /// List built-in rule types and codes
    Rules,
}

#[derive(Args)]
struct RunArgs {
    /// Stage configuration file (JSON)
    #[arg(short, long, env = "ROWAUDIT_CONFIG")]
    config: PathBuf,

    /// Row schema file (JSON list of column names or column specs)
    #[arg(short, long)]
    schema: PathBuf,

    /// Input rows; reads stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output rows; writes stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log and skip rows that fail evaluation instead of stopping
    #[arg(long)]
    skip_invalid: bool,
}

#[derive(Args)]
struct CheckConfigArgs {
    /// Stage configuration file (JSON)
    #[arg(short, long, env = "ROWAUDIT_CONFIG")]
    config: PathBuf,

    /// Also bind rules against this row schema
    #[arg(short, long)]
    schema: Option<PathBuf>,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    quiet: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Row counts of one `run` invocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RunSummary {
    rows: u64,
    passed: u64,
    failed: u64,
    skipped: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging_with_format(
        cli.global.verbose,
        cli.global.quiet,
        cli.global.log_format.into(),
    )?;

    match &cli.command {
        Command::Run(args) => run(args).await.map(|_| ()),
        Command::CheckConfig(args) => check_config(args).await,
        Command::Rules => {
            list_rules(&RuleCatalog::builtin());
            Ok(())
        }
    }
}

/// Reads, schema-checks and deserializes a stage configuration file.
async fn load_config(path: &Path) -> Result<StageConfig> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        QualityError::io(format!("Failed to read config file {}", path.display()), e)
    })?;
    let document: serde_json::Value = serde_json::from_str(&text)
        .map_err(|e| QualityError::serialization("Failed to parse config file", e))?;

    let missing = missing_options(&document);
    if !missing.is_empty() {
        warn!("Config is missing required options: {}", missing.join(", "));
    }
    validate_config_document(&document)?;

    let config: StageConfig = serde_json::from_value(document).map_err(|e| {
        QualityError::configuration(format!("Invalid stage configuration: {}", e))
    })?;
    config.validate()?;
    Ok(config)
}

/// Describes where a configuration sends its metrics, credentials redacted.
fn describe_target(config: &StageConfig) -> String {
    match (&config.metric_store, &config.metric_api) {
        (Some(store), _) => format!("store {} (key '{}')", redact_url(&store.url), store.key),
        (None, Some(api)) => format!("endpoint {}", redact_url(api)),
        (None, None) => "nowhere (preview)".to_string(),
    }
}

async fn run(args: &RunArgs) -> Result<RunSummary> {
    let config = load_config(&args.config).await?;
    let schema = input::load_schema(&args.schema).await?;

    info!("Starting quality run");
    info!("Rules: {}", config.rule_info.len());
    info!("Metrics: {}", describe_target(&config));

    let mut stage = QualityStage::from_config(config, &schema, &RuleCatalog::builtin()).await?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                QualityError::io(format!("Failed to open input {}", path.display()), e)
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let writer: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(tokio::fs::File::create(path).await.map_err(|e| {
            QualityError::io(format!("Failed to create output {}", path.display()), e)
        })?),
        None => Box::new(tokio::io::stdout()),
    };
    let mut writer = BufWriter::new(writer);

    let processed = process_rows(&stage, &schema, reader, &mut writer, args.skip_invalid).await;

    // metrics counted so far are flushed even when the stream failed
    stage.close().await;
    writer
        .flush()
        .await
        .map_err(|e| QualityError::io("Failed to flush output rows", e))?;

    let summary = processed?;
    info!(
        "✓ Quality run completed: {} rows, {} passed, {} failed, {} skipped",
        summary.rows, summary.passed, summary.failed, summary.skipped
    );
    Ok(summary)
}

async fn process_rows<R, W>(
    stage: &QualityStage,
    schema: &RowSchema,
    reader: R,
    writer: &mut W,
    skip_invalid: bool,
) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = RunSummary::default();
    let mut lines = reader.lines();
    let mut line_number = 0u64;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| QualityError::io("Failed to read input rows", e))?
    {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let evaluation = match input::parse_row(&line, schema).and_then(|row| stage.evaluate(row)) {
            Ok(evaluation) => evaluation,
            Err(e) if skip_invalid => {
                warn!("Skipping row on line {}: {}", line_number, e);
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                error!("Row on line {} failed: {}", line_number, e);
                return Err(e);
            }
        };

        summary.rows += 1;
        if evaluation.passed {
            summary.passed += 1;
        } else {
            summary.failed += 1;
        }

        let mut rendered = input::render_row(&evaluation.row)?;
        rendered.push('\n');
        writer
            .write_all(rendered.as_bytes())
            .await
            .map_err(|e| QualityError::io("Failed to write output row", e))?;
    }

    Ok(summary)
}

async fn check_config(args: &CheckConfigArgs) -> Result<()> {
    let config = load_config(&args.config).await?;
    let catalog = RuleCatalog::builtin();

    for (rule_id, rule) in &config.rule_info {
        catalog.resolve(&rule.rule_type, &rule.rule_code).map_err(|e| {
            error!("Rule '{}' cannot be resolved: {}", rule_id, e);
            e
        })?;
    }

    if let Some(path) = &args.schema {
        let schema = input::load_schema(path).await?;
        let metrics = Arc::new(RowMetricsTree::from_rules(&config.rule_info));
        QualityEvaluator::new(
            &config,
            &schema,
            &catalog,
            metrics,
            Arc::new(LogAlertDispatcher),
        )?;
        info!("✓ All rule columns found in {}", path.display());
    }

    println!("Configuration is valid");
    println!("Rules: {}", config.rule_info.len());
    println!("Job mode: {}", config.job_mode);
    println!("Metrics: {}", describe_target(&config));
    if config.alerting_enabled() {
        println!("Dirty data limit: {}", config.dirty_data_limit);
    }
    Ok(())
}

fn list_rules(catalog: &RuleCatalog) {
    println!("Built-in rule types:");
    for (rule_type, codes) in catalog.describe() {
        println!("  {}", rule_type);
        for code in codes {
            println!("    {}", code);
        }
    }
}
