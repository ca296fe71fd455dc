//! Acquisition lots held in a per-asset FIFO queue.

use crate::asset::Asset;
use crate::instant::Instant;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single acquisition record sitting in a per-asset FIFO queue, consumed (partially or fully)
/// on disposal. `qty_remaining` invariant: the sum across an asset's queue equals that asset's
/// reconciled balance at any point in time, within a `1e-12` tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub asset: Asset,
    pub qty_remaining: Decimal,
    pub acquired_at: Instant,
    pub unit_basis_eur: Decimal,
    pub source_tx_id: String,
    /// Whether the transaction that created this lot was itself synthetic. Propagated to any
    /// `LotSlice` consumed from it, so a disposal's `synthetic_inputs` reflects its full ancestry,
    /// not just whether the disposing transaction itself was synthetic.
    pub synthetic_origin: bool,
}

impl Lot {
    pub fn new(
        asset: Asset,
        qty: Decimal,
        acquired_at: Instant,
        unit_basis_eur: Decimal,
        source_tx_id: impl Into<String>,
        synthetic_origin: bool,
    ) -> Self {
        debug_assert!(qty > Decimal::ZERO, "lots must be created with positive qty");
        debug_assert!(
            unit_basis_eur >= Decimal::ZERO,
            "unit basis must be non-negative"
        );
        Lot {
            asset,
            qty_remaining: qty,
            acquired_at,
            unit_basis_eur,
            source_tx_id: source_tx_id.into(),
            synthetic_origin,
        }
    }

    pub fn basis_eur(&self) -> Decimal {
        self.qty_remaining * self.unit_basis_eur
    }
}

/// A value-copy record of how much of a given [`Lot`] was consumed by one disposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotSlice {
    pub lot_source_tx_id: String,
    pub lot_acquired_at: Instant,
    pub consumed_qty: Decimal,
    pub basis_eur: Decimal,
    pub synthetic_origin: bool,
}
