use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notice_extract::{
    load_items, write_csv, write_json, BatchOptions, BatchRunner, PatternLibrary, VERSION,
};

#[derive(Parser)]
#[command(
    name = "notice-extract",
    about = "Extract structured fields from notice text and HTML",
    version
)]
struct Cli {
    /// Rule table to use instead of the built-in one (JSON)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch of items through the extractor
    Run {
        /// Input items: JSON array or JSON Lines
        #[arg(long, short)]
        input: PathBuf,

        /// Output file
        #[arg(long, short)]
        output: PathBuf,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Process items on a worker pool
        #[arg(long)]
        parallel: bool,

        /// Worker pool size (implies --parallel)
        #[arg(long)]
        threads: Option<usize>,

        /// Anchor for relative dates such as "3 days ago" (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        reference_date: Option<NaiveDate>,
    },
    /// List the fields and matchers of the loaded rule table
    Rules,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn main() -> Result<()> {
    // Logs go to stderr; stdout stays free for data
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let library = load_library(cli.rules.as_deref())?;

    match cli.command {
        Commands::Run {
            input,
            output,
            format,
            parallel,
            threads,
            reference_date,
        } => {
            let options = BatchOptions {
                parallel: parallel || threads.is_some(),
                threads,
                reference_date,
            };
            run(&library, &input, &output, format, options)
        }
        Commands::Rules => {
            print_rules(&library);
            Ok(())
        }
    }
}

fn load_library(path: Option<&Path>) -> Result<PatternLibrary> {
    match path {
        Some(path) => PatternLibrary::from_file(path),
        None => Ok(PatternLibrary::standard().clone()),
    }
}

fn run(
    library: &PatternLibrary,
    input: &Path,
    output: &Path,
    format: OutputFormat,
    options: BatchOptions,
) -> Result<()> {
    eprintln!("📰 Notice Extract v{}", VERSION);
    eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    eprintln!("\n📂 Loading items...");
    let items = load_items(input)?;
    eprintln!("✓ Loaded {} items from {:?}", items.len(), input);

    eprintln!("\n🔍 Extracting {} fields...", library.rule_count());
    let runner = BatchRunner::with_options(library, options);
    let result = runner.run_batch(&items);

    eprintln!("\n💾 Writing output...");
    match format {
        OutputFormat::Json => write_json(&result, output),
        OutputFormat::Csv => write_csv(&result, library, output),
    }
    .with_context(|| format!("Failed to export results to {:?}", output))?;
    eprintln!("✓ Wrote {:?}", output);

    let summary = result.summary();
    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!("✅ {}", summary.summary());
    for (field, rate) in &summary.field_found_rates {
        eprintln!("   {:<18} {:>5.1}% found", field, rate * 100.0);
    }
    for failure in &result.failures {
        eprintln!("❌ item {}: {}", failure.index, failure.error);
    }

    Ok(())
}

fn print_rules(library: &PatternLibrary) {
    for rule in library.rules() {
        println!("{} ({})", rule.name(), rule.kind());
        if !rule.description().is_empty() {
            println!("    {}", rule.description());
        }
        if rule.is_noop() {
            println!("    (no matchers)");
        }
        for (priority, matcher) in rule.matchers().iter().enumerate() {
            println!(
                "    {}. {:<16} confidence {:.2}  /{}/",
                priority + 1,
                matcher.id(),
                matcher.confidence(),
                matcher.pattern()
            );
        }
    }
}
