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

//! Component A — the normalizer: source rows → canonical, time-sorted `Tx` records.

use qntropy_core::{parse_instant, AuditEntry, AuditKind, Leg, Tx, TxKind};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::error::QntropyError;

/// One line of the third-party aggregator's trade-table export (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRow {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Buy Amount")]
    pub buy_amount: String,
    #[serde(rename = "Buy Currency")]
    pub buy_currency: String,
    #[serde(rename = "Sell Amount")]
    pub sell_amount: String,
    #[serde(rename = "Sell Currency")]
    pub sell_currency: String,
    #[serde(rename = "Fee")]
    pub fee: String,
    #[serde(rename = "Fee Currency")]
    pub fee_currency: String,
    #[serde(rename = "Exchange")]
    pub exchange: String,
    #[serde(rename = "Group")]
    pub group: String,
    #[serde(rename = "Comment")]
    pub comment: String,
    #[serde(rename = "Date")]
    pub date: String,
}

/// Maps the source `Type` string to a canonical [`TxKind`]. Explicit and exhaustive over the
/// aggregator's vocabulary; anything not listed here is `UnknownTxKind`.
fn map_kind(raw: &str) -> Option<TxKind> {
    match raw.trim() {
        "Deposit" => Some(TxKind::Deposit),
        "Withdrawal" => Some(TxKind::Withdrawal),
        "Trade" => Some(TxKind::Trade),
        "Staking" | "Staking Reward" => Some(TxKind::StakingReward),
        "Lending Interest" | "Interest" => Some(TxKind::LendingInterest),
        "Airdrop" => Some(TxKind::Airdrop),
        "Fork" => Some(TxKind::Fork),
        "Fee" => Some(TxKind::FeeOnly),
        "Transfer" | "Internal Transfer" => Some(TxKind::TransferInternal),
        "Income" => Some(TxKind::Income),
        _ => None,
    }
}

/// Parses an amount column: an empty string means "no leg", not zero.
fn parse_amount(raw: &str) -> Result<Option<Decimal>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Decimal::from_str(trimmed)
        .map(Some)
        .map_err(|e| format!("cannot parse amount '{trimmed}': {e}"))
}

fn build_leg(amount_raw: &str, currency_raw: &str) -> Result<Option<Leg>, String> {
    let amount = parse_amount(amount_raw)?;
    match amount {
        None => Ok(None),
        Some(amount) => {
            let currency = currency_raw.trim();
            if currency.is_empty() {
                return Err("amount present but currency column is empty".to_string());
            }
            let asset = currency.parse().expect("Asset::from_str is infallible");
            Leg::new(asset, amount)
                .map(Some)
                .map_err(|e| e.to_string())
        }
    }
}

/// Normalize a single source row into a canonical `Tx`, given its 1-based ordinal in the file
/// and the timezone the `Date` column should be interpreted under.
pub fn normalize_row(
    row: &SourceRow,
    ordinal: usize,
    tz: chrono_tz::Tz,
    skip_unknown: bool,
) -> Result<Option<Tx>, QntropyError> {
    let kind = match map_kind(&row.kind) {
        Some(kind) => kind,
        None if skip_unknown => return Ok(None),
        None => {
            return Err(QntropyError::UnknownTxKind {
                ordinal,
                raw_kind: row.kind.clone(),
            })
        }
    };

    let instant = parse_instant(&row.date, tz).map_err(|message| QntropyError::ParseError {
        ordinal,
        message,
    })?;

    let in_leg = build_leg(&row.buy_amount, &row.buy_currency)
        .map_err(|message| QntropyError::ParseError { ordinal, message })?;
    let out_leg = build_leg(&row.sell_amount, &row.sell_currency)
        .map_err(|message| QntropyError::ParseError { ordinal, message })?;
    let fee_leg = build_leg(&row.fee, &row.fee_currency)
        .map_err(|message| QntropyError::ParseError { ordinal, message })?;

    if kind == TxKind::Trade && (in_leg.is_none() || out_leg.is_none()) {
        return Err(QntropyError::ParseError {
            ordinal,
            message: "Trade rows must have both a Buy and a Sell leg".to_string(),
        });
    }

    let id = format!("row-{ordinal}");
    let tx = Tx::new(
        id,
        instant,
        kind,
        in_leg,
        out_leg,
        fee_leg,
        row.exchange.clone(),
        row.group.clone(),
        row.comment.clone(),
    )
    .map_err(|source| QntropyError::InvalidAmount { ordinal, source })?;

    Ok(Some(tx))
}

/// Normalize an entire source row sequence into a time-sorted `Tx` stream. Per-row `ParseError`/
/// `InvalidAmount` failures are recovered locally: the row is skipped and an `AuditEntry` records
/// it; `UnknownTxKind` is fatal unless `skip_unknown` is set.
pub fn normalize_all(
    rows: &[SourceRow],
    tz: chrono_tz::Tz,
    skip_unknown: bool,
) -> Result<(Vec<Tx>, Vec<AuditEntry>), QntropyError> {
    let mut txs = Vec::with_capacity(rows.len());
    let mut audit = Vec::new();

    for (idx, row) in rows.iter().enumerate() {
        let ordinal = idx + 1;
        match normalize_row(row, ordinal, tz, skip_unknown) {
            Ok(Some(tx)) => txs.push(tx),
            Ok(None) => {
                // skip_unknown dropped an unrecognized kind; still audit it.
                audit.push(AuditEntry::new(
                    chrono::Utc::now(),
                    AuditKind::RowSkipped,
                    format!("row-{ordinal}"),
                    format!("unknown tx kind '{}' skipped (--skip-unknown)", row.kind),
                ));
            }
            Err(err @ QntropyError::ParseError { .. }) | Err(err @ QntropyError::InvalidAmount { .. }) => {
                audit.push(AuditEntry::new(
                    chrono::Utc::now(),
                    AuditKind::RowSkipped,
                    format!("row-{ordinal}"),
                    err.to_string(),
                ));
            }
            Err(other) => return Err(other),
        }
    }

    sort_stable(&mut txs);
    Ok((txs, audit))
}

/// Sort by `(instant, kind tie-break priority, id)`. Stable and idempotent — re-sorting
/// already-sorted output is a no-op (§8 property 5).
pub fn sort_stable(txs: &mut [Tx]) {
    txs.sort_by(|a, b| {
        a.instant
            .cmp(&b.instant)
            .then_with(|| a.kind.tie_break_priority().cmp(&b.kind.tie_break_priority()))
            .then_with(|| a.id.cmp(&b.id))
    });
}
