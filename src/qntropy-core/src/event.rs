//! Taxable events and audit trail records emitted by the FIFO engine and reconciler.

use crate::asset::Asset;
use crate::instant::Instant;
use crate::lot::LotSlice;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Long vs. short-term holding, per the Spanish IRPF 12-month boundary (`> 12 months` is Long).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Holding {
    Short,
    Long,
}

/// Category of movable-capital income recognized at receipt.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum IncomeCategory {
    MovableCapital,
    Other,
}

/// A taxable event, emitted once and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaxEvent {
    CapitalDisposal {
        tax_year: i32,
        asset_disposed: Asset,
        qty: Decimal,
        proceeds_eur: Decimal,
        cost_basis_eur: Decimal,
        gain_eur: Decimal,
        holding: Holding,
        lots_consumed: Vec<LotSlice>,
        source_tx_id: String,
        synthetic_inputs: bool,
        instant: Instant,
    },
    Income {
        tax_year: i32,
        asset_received: Asset,
        qty: Decimal,
        fmv_eur: Decimal,
        category: IncomeCategory,
        source_tx_id: String,
        synthetic_inputs: bool,
        instant: Instant,
    },
}

impl TaxEvent {
    pub fn tax_year(&self) -> i32 {
        match self {
            TaxEvent::CapitalDisposal { tax_year, .. } => *tax_year,
            TaxEvent::Income { tax_year, .. } => *tax_year,
        }
    }

    pub fn synthetic_inputs(&self) -> bool {
        match self {
            TaxEvent::CapitalDisposal {
                synthetic_inputs, ..
            } => *synthetic_inputs,
            TaxEvent::Income {
                synthetic_inputs, ..
            } => *synthetic_inputs,
        }
    }

    pub fn source_tx_id(&self) -> &str {
        match self {
            TaxEvent::CapitalDisposal { source_tx_id, .. } => source_tx_id,
            TaxEvent::Income { source_tx_id, .. } => source_tx_id,
        }
    }

    pub fn instant(&self) -> Instant {
        match self {
            TaxEvent::CapitalDisposal { instant, .. } => *instant,
            TaxEvent::Income { instant, .. } => *instant,
        }
    }
}

/// The kind of reconciliation or pricing action an [`AuditEntry`] records.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum AuditKind {
    SyntheticInserted,
    ConsolidationApplied,
    ConsolidationNegligible,
    PriceFallback,
    LotDeficit,
    TransferSplit,
    RowSkipped,
}

/// A human-auditable record of any reconciliation or pricing action taken by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub instant: Instant,
    pub kind: AuditKind,
    pub subject_tx_id: String,
    pub reason: String,
}

impl AuditEntry {
    pub fn new(
        instant: Instant,
        kind: AuditKind,
        subject_tx_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AuditEntry {
            instant,
            kind,
            subject_tx_id: subject_tx_id.into(),
            reason: reason.into(),
        }
    }
}
