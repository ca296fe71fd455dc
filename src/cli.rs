//! Command-line surface (§5.1, §6): `import`, `reconcile`, `compute`, `report`. Each subcommand
//! consumes the previous stage's output (`import` reads the raw source CSV via `--input`; every
//! later stage reads the prior stage's intermediate file or directory via `--in`) so a user can
//! re-run later stages without reprocessing earlier ones. `report` only filters and renders —
//! it performs no pipeline computation of its own.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "qntropy", about = "Spanish IRPF crypto tax reconciliation and FIFO cost-basis engine")]
pub struct Cli {
    /// Path to the TOML config file; missing file falls back to defaults.
    #[arg(long, default_value = "Config.toml", global = true)]
    pub config: PathBuf,

    /// Price cache / fixture directory, overriding the config file.
    #[arg(long, global = true)]
    pub price_cache: Option<PathBuf>,

    /// Reconciliation and disposal-side quantity tolerance, overriding the config file.
    #[arg(long, global = true)]
    pub tolerance: Option<rust_decimal::Decimal>,

    /// Source timezone for naive timestamps, overriding the config file.
    #[arg(long, global = true)]
    pub tz: Option<String>,

    /// Skip rows with an unrecognized `Type`, rather than failing the run.
    #[arg(long, global = true)]
    pub skip_unknown: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Normalize a source export into a canonical, time-sorted transaction stream.
    Import {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Reconcile a normalized stream, inserting synthetic repair transactions as needed.
    Reconcile {
        #[arg(long = "in")]
        input: PathBuf,
        /// Final-balance snapshot CSV (§6); if omitted, no consolidation pass runs.
        #[arg(long)]
        snapshot: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the price oracle and FIFO engine over a reconciled stream, writing TaxEvents and an
    /// audit trail as intermediate JSON (§5.1) for `report` to render later.
    Compute {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Filter a `compute`-stage output directory to one tax year and render the final CSV
    /// report. Performs no further aggregation or pipeline computation (§5.1).
    Report {
        #[arg(long = "in")]
        input: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Restrict the written events to one tax year; omit to emit every year found.
        #[arg(long)]
        year: Option<i32>,
    },
}
