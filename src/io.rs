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

//! File I/O: reading the source transaction export and the final-balance snapshot, and writing
//! the TaxEvent / Audit report CSVs (§6). No tax logic lives here — only shape translation.

use std::collections::HashMap;
use std::path::Path;

use qntropy_core::{AuditEntry, Instant, TaxEvent};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::QntropyError;
use crate::fifo::round_event_for_report;
use crate::normalize::SourceRow;
use crate::reconcile::Snapshot;

pub fn read_source_rows(path: &Path) -> Result<Vec<SourceRow>, QntropyError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: SourceRow = result?;
        rows.push(row);
    }
    Ok(rows)
}

/// Reads the `asset, amount` snapshot CSV, with a leading `# as_of=<ISO-8601>` comment header
/// (§6). Missing assets default to zero elsewhere; this just parses what's present.
pub fn read_snapshot(path: &Path) -> Result<Snapshot, QntropyError> {
    let content = std::fs::read_to_string(path)?;

    let as_of_line = content
        .lines()
        .find(|line| line.trim_start().starts_with("# as_of="))
        .ok_or_else(|| QntropyError::Config(format!("{}: missing '# as_of=' header", path.display())))?;
    let as_of_str = as_of_line
        .trim_start()
        .trim_start_matches("# as_of=")
        .trim();
    let as_of: Instant = as_of_str
        .parse::<chrono::DateTime<chrono::Utc>>()
        .map_err(|e| QntropyError::Config(format!("bad as_of timestamp '{as_of_str}': {e}")))?;

    let body: String = content
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(body.as_bytes());
    let mut balances = HashMap::new();
    for result in reader.records() {
        let record = result?;
        if record.len() < 2 {
            continue;
        }
        let asset = record.get(0).unwrap_or("").trim().to_uppercase();
        let amount: Decimal = record
            .get(1)
            .unwrap_or("")
            .trim()
            .parse()
            .map_err(|e| QntropyError::Config(format!("bad snapshot amount for {asset}: {e}")))?;
        if !asset.is_empty() {
            balances.insert(asset, amount);
        }
    }

    Ok(Snapshot { as_of, balances })
}

#[derive(Serialize)]
struct EventRow {
    tax_year: i32,
    kind: &'static str,
    instant_utc: String,
    asset: String,
    qty: Decimal,
    proceeds_eur: Decimal,
    cost_basis_eur: Decimal,
    gain_eur: Decimal,
    holding: String,
    income_category: String,
    source_tx_id: String,
    synthetic_inputs: bool,
    lots_consumed_json: String,
}

fn event_row(event: &TaxEvent) -> Result<EventRow, QntropyError> {
    let rounded = round_event_for_report(event);
    let row = match rounded {
        TaxEvent::CapitalDisposal {
            tax_year,
            asset_disposed,
            qty,
            proceeds_eur,
            cost_basis_eur,
            gain_eur,
            holding,
            lots_consumed,
            source_tx_id,
            synthetic_inputs,
            instant,
        } => EventRow {
            tax_year,
            kind: "CapitalDisposal",
            instant_utc: instant.to_rfc3339(),
            asset: asset_disposed.to_string(),
            qty,
            proceeds_eur,
            cost_basis_eur,
            gain_eur,
            holding: format!("{holding:?}"),
            income_category: String::new(),
            source_tx_id,
            synthetic_inputs,
            lots_consumed_json: serde_json::to_string(&lots_consumed)?,
        },
        TaxEvent::Income {
            tax_year,
            asset_received,
            qty,
            fmv_eur,
            category,
            source_tx_id,
            synthetic_inputs,
            instant,
        } => EventRow {
            tax_year,
            kind: "Income",
            instant_utc: instant.to_rfc3339(),
            asset: asset_received.to_string(),
            qty,
            proceeds_eur: fmv_eur,
            cost_basis_eur: Decimal::ZERO,
            gain_eur: Decimal::ZERO,
            holding: String::new(),
            income_category: format!("{category:?}"),
            source_tx_id,
            synthetic_inputs,
            lots_consumed_json: "[]".to_string(),
        },
    };
    Ok(row)
}

pub fn write_events(path: &Path, events: &[TaxEvent]) -> Result<(), QntropyError> {
    let mut writer = csv::Writer::from_path(path)?;
    for event in events {
        writer.serialize(event_row(event)?)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct AuditRow {
    instant_utc: String,
    category: String,
    subject_tx_id: String,
    reason: String,
}

pub fn write_audit(path: &Path, entries: &[AuditEntry]) -> Result<(), QntropyError> {
    let mut writer = csv::Writer::from_path(path)?;
    for entry in entries {
        writer.serialize(AuditRow {
            instant_utc: entry.instant.to_rfc3339(),
            category: format!("{:?}", entry.kind),
            subject_tx_id: entry.subject_tx_id.clone(),
            reason: entry.reason.clone(),
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scratch_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "qntropy-io-test-{tag}-{:?}",
            std::thread::current().id()
        ))
    }

    #[test]
    fn snapshot_parses_as_of_header_and_balances() {
        let path = scratch_path("snapshot");
        std::fs::write(
            &path,
            "# as_of=2023-12-31T00:00:00Z\nBTC,0.25\nETH,10\n",
        )
        .unwrap();

        let snapshot = read_snapshot(&path).unwrap();
        assert_eq!(
            snapshot.as_of,
            chrono::Utc.with_ymd_and_hms(2023, 12, 31, 0, 0, 0).unwrap()
        );
        assert_eq!(snapshot.balances.get("BTC").copied(), Some(Decimal::new(25, 2)));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn writes_capital_disposal_row() {
        let path = scratch_path("events");
        let event = TaxEvent::CapitalDisposal {
            tax_year: 2023,
            asset_disposed: "BTC".parse().unwrap(),
            qty: Decimal::ONE,
            proceeds_eur: Decimal::new(249880, 1),
            cost_basis_eur: Decimal::new(200100, 1),
            gain_eur: Decimal::new(49780, 1),
            holding: qntropy_core::Holding::Short,
            lots_consumed: vec![],
            source_tx_id: "sell".to_string(),
            synthetic_inputs: false,
            instant: chrono::Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap(),
        };
        write_events(&path, std::slice::from_ref(&event)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("CapitalDisposal"));
        assert!(content.contains("BTC"));

        std::fs::remove_file(&path).ok();
    }
}
