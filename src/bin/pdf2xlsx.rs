use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use pdf_table_export::{
    ExcelLayout, HeaderMode, PageSelection, PipelineError, PipelineOptions, QualityMode,
    RunSummary, run_with_options,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "pdf2xlsx",
    version,
    about = "Convert tables in text PDFs into cleaned Excel and CSV files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Extract, clean and type tables, then write Excel and CSV output.
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
struct ConvertArgs {
    /// Input PDF path.
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory. Defaults to the config value, then `output`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON file with pipeline options; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Approximate maximum size of each output part in MiB.
    #[arg(long)]
    chunk_size_mb: Option<f64>,

    /// Base name for the Excel output.
    #[arg(long)]
    excel_name: Option<String>,

    /// Base name for the CSV output.
    #[arg(long)]
    csv_name: Option<String>,

    /// Fraction of non-null values that must parse for a column to become
    /// numeric or date.
    #[arg(long)]
    type_threshold: Option<f64>,

    /// Page selection like 1-3,5.
    #[arg(long)]
    pages: Option<String>,

    /// Force header interpretation on first row of each table.
    #[arg(long, conflicts_with = "no_header")]
    has_header: bool,

    /// Disable header interpretation; keep first row as data.
    #[arg(long, conflicts_with = "has_header")]
    no_header: bool,

    /// Drop low-confidence tables instead of exporting them.
    #[arg(long)]
    skip_ambiguous: bool,

    /// Omit the source_file, page and table_id columns.
    #[arg(long)]
    no_meta: bool,

    /// Write one workbook with a worksheet per part instead of a workbook per part.
    #[arg(long)]
    sheet_per_chunk: bool,

    /// CSV delimiter character.
    #[arg(long)]
    delimiter: Option<char>,

    /// Start CSV files with a UTF-8 byte order mark.
    #[arg(long)]
    bom: bool,

    /// Fail when the PDF contains no tables.
    #[arg(long)]
    require_tables: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Enable verbose warning output.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_options(args: &ConvertArgs) -> Result<PipelineOptions> {
    let mut options = match &args.config {
        Some(path) => PipelineOptions::from_json_file(path)
            .with_context(|| format!("failed to load --config '{}'", path.display()))?,
        None => PipelineOptions::default(),
    };

    if let Some(pages) = &args.pages {
        let selection = PageSelection::from_str(pages)
            .map_err(|error| anyhow!("invalid page selection: {error}"))
            .context("failed to parse --pages")?;
        options.extraction.pages = Some(selection);
    }

    if args.has_header {
        options.extraction.header_mode = HeaderMode::HasHeader;
    } else if args.no_header {
        options.extraction.header_mode = HeaderMode::NoHeader;
    }
    if args.skip_ambiguous {
        options.extraction.quality_mode = QualityMode::SkipAmbiguous;
    }

    if let Some(output) = &args.output {
        options.output_dir.clone_from(output);
    }
    if let Some(chunk_size_mb) = args.chunk_size_mb {
        options.chunk_size_mb = chunk_size_mb;
    }
    if let Some(threshold) = args.type_threshold {
        options.type_threshold = threshold;
    }
    if args.excel_name.is_some() {
        options.excel_name.clone_from(&args.excel_name);
    }
    if args.csv_name.is_some() {
        options.csv_name.clone_from(&args.csv_name);
    }
    if let Some(delimiter) = args.delimiter {
        options.csv_delimiter = delimiter;
    }
    if args.no_meta {
        options.include_meta = false;
    }
    if args.sheet_per_chunk {
        options.excel_layout = ExcelLayout::SheetPerChunk;
    }
    options.csv_bom |= args.bom;
    options.require_tables |= args.require_tables;

    options.validate().context("invalid options")?;
    Ok(options)
}

fn log_report(summary: &RunSummary, verbose: bool) {
    if summary.warnings.is_empty() {
        return;
    }

    eprintln!("warning: {} issue(s) detected", summary.warnings.len());
    if verbose {
        for warning in &summary.warnings {
            eprintln!(
                "  - {:?} page={:?} table_id={:?} chunk={:?} confidence={:?}: {}",
                warning.code,
                warning.page,
                warning.table_id,
                warning.chunk_index,
                warning.confidence,
                warning.message
            );
        }
    }
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(summary).context("failed to serialize run summary")?;
        println!("{rendered}");
        return Ok(());
    }

    println!(
        "{} table(s), {} row(s) after removing {} duplicate(s), {} part(s)",
        summary.tables_found,
        summary.rows_written,
        summary.quality.duplicates_removed,
        summary.chunk_count
    );
    for guess in &summary.type_guesses {
        println!(
            "  {}: {} ({} coercion failure(s))",
            guess.column, guess.kind, guess.coercion_failure_count
        );
    }
    for path in summary.excel_files.iter().chain(&summary.csv_files) {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn exit_code_for(error: &PipelineError) -> ExitCode {
    if error.is_fatal() {
        ExitCode::from(1)
    } else {
        ExitCode::from(2)
    }
}

fn run_convert(args: &ConvertArgs) -> ExitCode {
    let options = match parse_options(args) {
        Ok(options) => options,
        Err(error) => {
            eprintln!("error: {error:#}");
            return ExitCode::from(1);
        }
    };

    match run_with_options(&args.input, &options) {
        Ok(summary) => {
            log_report(&summary, args.verbose);
            if let Err(error) = print_summary(&summary, args.json) {
                eprintln!("error: {error:#}");
                return ExitCode::from(1);
            }
            if summary.has_rows() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(error) => {
            let code = exit_code_for(&error);
            let error = anyhow::Error::new(error)
                .context(format!("failed to convert '{}'", args.input.display()));
            eprintln!("error: {error:#}");
            code
        }
    }
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pdf_table_export=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert(args) => run_convert(&args),
    }
}
