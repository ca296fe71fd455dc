//! Closed, typed error taxonomy for the pipeline (§7). Per-row errors are recovered locally by
//! callers (row skipped + `AuditEntry`); everything that reaches [`QntropyError`] is an
//! engine-level failure that stops the run and is mapped to an exit code by the CLI.

use qntropy_core::TxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QntropyError {
    #[error("row {ordinal}: {message}")]
    ParseError { ordinal: usize, message: String },

    #[error("row {ordinal}: unknown transaction kind '{raw_kind}'")]
    UnknownTxKind { ordinal: usize, raw_kind: String },

    #[error("row {ordinal}: invalid amount: {source}")]
    InvalidAmount { ordinal: usize, source: TxError },

    #[error("no EUR price for {asset} at {instant} (fallback window exhausted)")]
    MissingPrice { asset: String, instant: String },

    #[error("reconciliation invariant violated for {asset}: balance {balance} after repair at tx {tx_id}")]
    ReconciliationFatal {
        asset: String,
        balance: String,
        tx_id: String,
    },

    #[error("price cache I/O error at {path}: {source}")]
    CacheIoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid transaction: {0}")]
    Tx(#[from] TxError),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exit codes per §6: `0` success, `2` input validation error, `3` price data missing beyond
/// fallback, `4` internal invariant violation.
impl QntropyError {
    pub fn exit_code(&self) -> i32 {
        match self {
            QntropyError::ParseError { .. }
            | QntropyError::UnknownTxKind { .. }
            | QntropyError::InvalidAmount { .. }
            | QntropyError::Tx(_)
            | QntropyError::Config(_)
            | QntropyError::Csv(_) => 2,
            QntropyError::MissingPrice { .. } => 3,
            QntropyError::ReconciliationFatal { .. } => 4,
            QntropyError::CacheIoError { .. } | QntropyError::Io(_) | QntropyError::Json(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_contract() {
        assert_eq!(
            QntropyError::MissingPrice {
                asset: "BTC".into(),
                instant: "2023-01-01T00:00:00Z".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            QntropyError::ReconciliationFatal {
                asset: "BTC".into(),
                balance: "-1".into(),
                tx_id: "t1".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(
            QntropyError::UnknownTxKind {
                ordinal: 1,
                raw_kind: "Bogus".into()
            }
            .exit_code(),
            2
        );
    }
}
