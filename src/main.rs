// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::Write as _;
use std::path::Path;

use clap::Parser;
use env_logger::Env;

use qntropy::cli::{Cli, Command};
use qntropy::config::Config;
use qntropy::error::QntropyError;
use qntropy::fifo::FifoEngine;
use qntropy::normalize;
use qntropy::oracle::{PriceCache, PriceOracle, StaticTableProvider};
use qntropy::reconcile::Reconciler;
use qntropy::sink::EventSink;
use qntropy::io;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            log::error!("{err}");
            std::process::exit(err.exit_code());
        }
    }
}

fn run(cli: Cli) -> Result<(), QntropyError> {
    let mut config = Config::load(Some(&cli.config))?;
    if let Some(dir) = &cli.price_cache {
        config.price_cache_dir = Some(dir.clone());
    }
    if let Some(tolerance) = cli.tolerance {
        config.tolerance = tolerance;
    }
    if let Some(tz) = &cli.tz {
        config.tz = tz.clone();
    }
    if cli.skip_unknown {
        config.skip_unknown = true;
    }

    let tz: chrono_tz::Tz = config
        .tz
        .parse()
        .map_err(|_| QntropyError::Config(format!("unknown timezone '{}'", config.tz)))?;

    match cli.command {
        Command::Import { input, out } => {
            let rows = io::read_source_rows(&input)?;
            let (txs, audit) = normalize::normalize_all(&rows, tz, config.skip_unknown)?;
            log::info!("normalized {} transactions ({} rows skipped)", txs.len(), audit.len());
            write_json_lines(&out, &txs)?;
            Ok(())
        }
        Command::Reconcile { input, snapshot, out } => {
            let txs: Vec<qntropy_core::Tx> = read_json_lines(&input)?;
            let mut reconciler = Reconciler::new(config.tolerance);
            let (mut reconciled, mut audit) = reconciler.reconcile(txs)?;
            if let Some(snapshot_path) = snapshot {
                let snapshot = io::read_snapshot(&snapshot_path)?;
                let (consolidation_txs, consolidation_audit) = reconciler.consolidate(&snapshot)?;
                reconciled.extend(consolidation_txs);
                audit.extend(consolidation_audit);
            }
            log::info!("reconciled {} transactions ({} audit entries)", reconciled.len(), audit.len());
            write_json_lines(&out, &reconciled)?;
            Ok(())
        }
        Command::Compute { input, out } => {
            let txs: Vec<qntropy_core::Tx> = read_json_lines(&input)?;
            let oracle = build_oracle(&config)?;
            let mut engine = FifoEngine::new();
            let mut sink = EventSink::new();
            for tx in &txs {
                let mut audit = Vec::new();
                let events = engine.process(tx, &oracle, &mut audit)?;
                sink.push_events(events);
                sink.push_audits(audit);
            }
            let (events, audit) = sink.into_parts();
            log::info!("emitted {} tax events, {} audit entries", events.len(), audit.len());
            std::fs::create_dir_all(&out)?;
            write_json_lines(&out.join("events.json"), &events)?;
            write_json_lines(&out.join("audit.json"), &audit)?;
            Ok(())
        }
        Command::Report { input, out, year } => {
            // report only filters and renders a prior `compute` run's output; it performs no
            // normalization, reconciliation, or FIFO computation of its own (§5.1).
            let mut events: Vec<qntropy_core::TaxEvent> =
                read_json_lines(&input.join("events.json"))?;
            let audit: Vec<qntropy_core::AuditEntry> = read_json_lines(&input.join("audit.json"))?;

            if let Some(year) = year {
                events.retain(|e| e.tax_year() == year);
            }

            std::fs::create_dir_all(&out)?;
            io::write_events(&out.join("events.csv"), &events)?;
            io::write_audit(&out.join("audit.csv"), &audit)?;
            log::info!("report written to {}", out.display());
            Ok(())
        }
    }
}

fn build_oracle(config: &Config) -> Result<PriceOracle, QntropyError> {
    let cache = PriceCache::new(config.price_cache_dir());
    let mut oracle = PriceOracle::new(cache, config.bridge_assets.clone());
    if let Some(fixture) = &config.price_fixture {
        oracle.register(Box::new(StaticTableProvider::load(fixture)?));
    } else {
        oracle.register(Box::new(StaticTableProvider::empty()));
    }
    Ok(oracle)
}

/// Intermediate pipeline stages hand off each record type as JSON lines, so later stages can be
/// re-run in isolation without re-parsing or re-deriving an earlier stage's output.
fn write_json_lines<T: serde::Serialize>(path: &Path, records: &[T]) -> Result<(), QntropyError> {
    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

fn read_json_lines<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, QntropyError> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(QntropyError::from))
        .collect()
}
