//! Ledger Export CLI
//!
//! Converts Stripe payout exports and bank CSV statements into ledger-format
//! text, appending to an output file (or stdout) and persisting learned
//! state back to the configuration file.
//!
//! # Usage
//!
//! ```bash
//! ledger-export --output-file ledger.dat stripe payouts.json
//! ledger-export --output-file ledger.dat csv my-bank statement.csv
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Set to `debug` or `warn` to control logging verbosity

use clap::{Parser, Subcommand};
use ledger_export::{Config, CsvRunner, JsonExportSource, Result, StripeRunner};
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "ledger-export", version, about = "Convert financial exports into ledger-format text")]
struct Cli {
    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Append rendered entries to this file instead of stdout
    #[arg(long, global = true)]
    output_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert a Stripe payout export (JSON)
    Stripe {
        /// Path to the payout export file
        input: PathBuf,
    },
    /// Convert a bank or card CSV statement
    Csv {
        /// Name of the mapping profile under `csv.account` in the config
        mapping: String,

        /// Path to the CSV statement
        csv_input: PathBuf,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => default_config_path(),
    };
    let mut config = Config::load(&config_path)?;

    // Entries are appended; the output file is a ledger the user curates.
    let mut writer: Box<dyn Write> = match &cli.output_file {
        Some(path) => Box::new(BufWriter::new(
            OpenOptions::new().create(true).append(true).open(path)?,
        )),
        None => Box::new(io::stdout()),
    };

    match &cli.command {
        Command::Stripe { input } => {
            let source = JsonExportSource::from_path(input)?;
            let mut runner = StripeRunner::new(source, &mut writer, &mut config)?;
            runner.run()?;
        }
        Command::Csv { mapping, csv_input } => {
            let file = File::open(csv_input)?;
            let mut runner = CsvRunner::new(&mut writer, &mut config);
            runner.run(mapping, BufReader::new(file))?;
        }
    }

    writer.flush()?;

    // Learned lookups and cursors are only worth keeping after a clean run;
    // a save failure loses that state but never the written entries.
    if let Err(e) = config.save(&config_path) {
        warn!("Unable to save configuration to {}: {}", config_path.display(), e);
    }

    Ok(())
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ledger-export.json")
}
