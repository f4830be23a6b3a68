use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueHint};
use log::info;

use rusty_rsa::{load_dataset, load_table, AnyDataset, DatasetOps, FileFormat};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Inspect, import and reshape RSA datasets"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a saved dataset
    Info(InfoArgs),

    /// Import an observation table (.parquet, .json, .csv) as a Dataset
    Import(ImportArgs),

    /// Re-encode a saved dataset in another format
    Convert(ConvertArgs),

    /// Fold the time axis of a TemporalDataset into its observations
    Flatten(FlattenArgs),
}

#[derive(Args)]
struct InfoArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Format of the input; inferred from the extension when omitted
    #[arg(long)]
    format: Option<FileFormat>,
}

#[derive(Args)]
struct ImportArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    table: PathBuf,

    /// Column holding each observation's measurement vector
    #[arg(long, default_value = "pattern")]
    column: String,

    /// Destination for the saved dataset
    #[arg(long, value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Format of the output; inferred from the extension when omitted
    #[arg(long)]
    format: Option<FileFormat>,
}

#[derive(Args)]
struct ConvertArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    #[arg(long)]
    from: Option<FileFormat>,

    #[arg(long)]
    to: Option<FileFormat>,
}

#[derive(Args)]
struct FlattenArgs {
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,

    #[arg(value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Time descriptor that orders the flattened blocks
    #[arg(long, default_value = "time")]
    by: String,

    #[arg(long)]
    format: Option<FileFormat>,
}

fn output_format(path: &Path, explicit: Option<FileFormat>) -> Result<FileFormat> {
    match explicit {
        Some(format) => Ok(format),
        None => FileFormat::from_path(path)
            .with_context(|| format!("choose --format for {}", path.display())),
    }
}

fn load(path: &Path, format: Option<FileFormat>) -> Result<AnyDataset> {
    load_dataset(path, format).with_context(|| format!("loading {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init();

    match Cli::parse().command {
        Command::Info(args) => {
            let dataset = load(&args.input, args.format)?;
            println!("{dataset}");
        }
        Command::Import(args) => {
            let dataset = load_table(&args.table, &args.column)
                .with_context(|| format!("importing {}", args.table.display()))?;
            let format = output_format(&args.output, args.format)?;
            dataset.save(&args.output, format)?;
            println!(
                "Wrote {} observations x {} channels to {}",
                dataset.n_obs(),
                dataset.n_channel(),
                args.output.display()
            );
        }
        Command::Convert(args) => {
            let dataset = load(&args.input, args.from)?;
            let format = output_format(&args.output, args.to)?;
            dataset.save(&args.output, format)?;
            info!("converted {} to {format}", args.input.display());
        }
        Command::Flatten(args) => {
            let dataset = load(&args.input, None)?;
            let kind = dataset.kind();
            let temporal = dataset
                .into_temporal()
                .with_context(|| format!("{} holds a {kind}, not a TemporalDataset", args.input.display()))?;
            let flat = temporal.convert_to_dataset(&args.by)?;
            let format = output_format(&args.output, args.format)?;
            flat.save(&args.output, format)?;
            println!(
                "Wrote {} rows ({} obs x {} time points) to {}",
                flat.n_obs(),
                temporal.n_obs(),
                temporal.n_time(),
                args.output.display()
            );
        }
    }
    Ok(())
}
