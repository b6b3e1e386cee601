use clap::{Args, Parser, Subcommand};
use shred::{DataSource, OutputFormat, ShredConfig, ShredError, Shredder, WriterOptions};
use std::io;
use std::path::PathBuf;

/// Shreds nested JSON record streams into flat relational tables.
#[derive(Parser)]
#[command(name = "shred", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Shred input records into one file per table under an output
    /// directory.
    Flatten(FlattenArgs),
    /// Print the JSON schema of the configuration file.
    Spec,
}

#[derive(Args)]
struct FlattenArgs {
    /// Path to a JSON configuration file.
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// Entity name: the main table is named for it.
    #[arg(long, default_value = "records")]
    entity: String,

    /// Directory receiving the output files.
    #[arg(long, short)]
    output: PathBuf,

    /// Output format: csv, jsonl, or parquet.
    #[arg(long, default_value = "jsonl")]
    format: String,

    /// Input file (.json, .jsonl, .ndjson). Reads stdin when omitted.
    input: Option<PathBuf>,
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("SHRED_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shred=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Flatten(args) => flatten(args),
        Command::Spec => spec(),
    };
    if let Err(err) = result {
        tracing::error!(error = %err, "operation failed");
        std::process::exit(1);
    }
}

fn flatten(args: FlattenArgs) -> Result<(), ShredError> {
    let config = match &args.config_file {
        Some(path) => ShredConfig::load(path)?,
        None => ShredConfig::default(),
    };
    let shredder = Shredder::new(config)?;
    let format: OutputFormat = args.format.parse()?;

    let source = match args.input {
        Some(path) => DataSource::from(path),
        None => {
            let text = io::read_to_string(io::stdin())
                .map_err(|err| ShredError::Processing(format!("failed to read stdin: {err}")))?;
            DataSource::from(text)
        }
    };

    shredder.flatten_stream(
        source,
        &args.entity,
        &args.output,
        format,
        &WriterOptions::default(),
    )
}

fn spec() -> Result<(), ShredError> {
    let schema = ShredConfig::json_schema();
    let rendered = serde_json::to_string_pretty(&schema)
        .map_err(|err| ShredError::Processing(format!("failed to render schema: {err}")))?;
    println!("{rendered}");
    Ok(())
}
