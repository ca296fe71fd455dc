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

//! Component D — the FIFO lot engine and tax classifier: maintains a per-asset acquisition
//! queue, consumes it on disposals, and emits `TaxEvent`s.
//!
//! Grounded on the teacher's `Ledger`/`InventoryItem` fragmentation algorithm in `fifo.rs`
//! (`process_inflow` / `process_swap_or_outflow`): a `VecDeque` per asset replaces the teacher's
//! `Vec` + remaining-amount scan, since every consumption here is strictly from the front.

use std::collections::{HashMap, VecDeque};

use chrono::Months;
use qntropy_core::{
    round_eur, AuditEntry, AuditKind, Asset, Holding, IncomeCategory, Instant, Lot, LotSlice, Tx,
    TxKind,
};
use rust_decimal::Decimal;

use crate::error::QntropyError;
use crate::oracle::PriceOracle;

/// Per-asset FIFO acquisition queues.
pub struct FifoEngine {
    lots: HashMap<String, VecDeque<Lot>>,
}

impl Default for FifoEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FifoEngine {
    pub fn new() -> Self {
        FifoEngine {
            lots: HashMap::new(),
        }
    }

    /// Sum of `qty_remaining` across an asset's queue; used by the lot-sum-equals-balance
    /// invariant in tests.
    pub fn remaining_qty(&self, asset: &str) -> Decimal {
        self.lots
            .get(&asset.to_uppercase())
            .map(|q| q.iter().map(|l| l.qty_remaining).sum())
            .unwrap_or(Decimal::ZERO)
    }

    fn queue_mut(&mut self, asset: &str) -> &mut VecDeque<Lot> {
        self.lots.entry(asset.to_uppercase()).or_default()
    }

    #[allow(clippy::too_many_arguments)]
    fn push_lot(
        &mut self,
        asset: Asset,
        qty: Decimal,
        acquired_at: Instant,
        unit_basis_eur: Decimal,
        source_tx_id: &str,
        synthetic_origin: bool,
    ) {
        if qty <= Decimal::ZERO {
            return;
        }
        self.queue_mut(asset.symbol()).push_back(Lot::new(
            asset,
            qty,
            acquired_at,
            unit_basis_eur,
            source_tx_id,
            synthetic_origin,
        ));
    }

    /// Pop lots from the front of `asset`'s queue until `qty` is accounted for. If the queue runs
    /// dry first, a zero-basis deficit slice covers the shortfall and an audit entry notes it
    /// (§4.4: "defensive; Reconciler should have prevented this").
    fn consume(
        &mut self,
        asset: &str,
        qty: Decimal,
        instant: Instant,
        source_tx_id: &str,
        audit: &mut Vec<AuditEntry>,
    ) -> (Vec<LotSlice>, Decimal, Instant) {
        let queue = self.queue_mut(asset);
        let mut remaining = qty;
        let mut slices = Vec::new();
        let mut basis_total = Decimal::ZERO;
        let mut earliest = instant;
        let mut first = true;

        while remaining > Decimal::ZERO {
            let Some(front) = queue.front_mut() else {
                break;
            };
            if front.qty_remaining <= Decimal::ZERO {
                queue.pop_front();
                continue;
            }
            let consumed = remaining.min(front.qty_remaining);
            let slice_basis = consumed * front.unit_basis_eur;

            if first {
                earliest = front.acquired_at;
                first = false;
            }

            slices.push(LotSlice {
                lot_source_tx_id: front.source_tx_id.clone(),
                lot_acquired_at: front.acquired_at,
                consumed_qty: consumed,
                basis_eur: slice_basis,
                synthetic_origin: front.synthetic_origin,
            });
            basis_total += slice_basis;

            front.qty_remaining -= consumed;
            remaining -= consumed;
            if front.qty_remaining <= Decimal::ZERO {
                queue.pop_front();
            }
        }

        if remaining > Decimal::ZERO {
            audit.push(AuditEntry::new(
                instant,
                AuditKind::LotDeficit,
                source_tx_id.to_string(),
                format!("{remaining} {asset} had no matching lot; covered with a zero-basis deficit slice"),
            ));
            if first {
                earliest = instant;
            }
            slices.push(LotSlice {
                lot_source_tx_id: "deficit".to_string(),
                lot_acquired_at: instant,
                consumed_qty: remaining,
                basis_eur: Decimal::ZERO,
                // No real acquisition ancestry at all; treated the same as a synthetic lot so the
                // disposal it feeds is flagged synthetic_inputs like any other unverified basis.
                synthetic_origin: true,
            });
        }

        (slices, basis_total, earliest)
    }

    fn holding(acquired_at: Instant, disposed_at: Instant) -> Holding {
        match acquired_at.checked_add_months(Months::new(12)) {
            Some(boundary) if disposed_at > boundary => Holding::Long,
            Some(_) => Holding::Short,
            None => Holding::Long,
        }
    }

    /// Entry point: process one reconciled Tx, returning the `TaxEvent`s it produces (zero, one,
    /// or more — a third-asset fee produces its own disposal event alongside the primary one).
    pub fn process(
        &mut self,
        tx: &Tx,
        oracle: &PriceOracle,
        audit: &mut Vec<AuditEntry>,
    ) -> Result<Vec<TaxEventOut>, QntropyError> {
        let tax_year = qntropy_core::tax_year_of(tx.instant);
        let mut events = Vec::new();

        match tx.kind {
            TxKind::Deposit => {
                self.acquire_simple(tx, oracle, audit, &mut events, tax_year, false, IncomeCategory::Other)?;
            }
            TxKind::SyntheticBalancingDeposit => {
                // Conservative default per the balance-repair policy: a deficit the Reconciler
                // found no matching history for is recorded at zero basis, not FMV.
                self.acquire_zero_basis(tx, audit, tax_year)?;
            }
            TxKind::StakingReward | TxKind::LendingInterest => {
                self.acquire_simple(tx, oracle, audit, &mut events, tax_year, true, IncomeCategory::MovableCapital)?;
            }
            TxKind::Income => {
                self.acquire_simple(tx, oracle, audit, &mut events, tax_year, true, IncomeCategory::Other)?;
            }
            TxKind::Airdrop | TxKind::Fork => {
                self.acquire_zero_basis(tx, audit, tax_year)?;
            }
            TxKind::Withdrawal => {
                if tx.is_internal_transfer() {
                    self.transfer_out(tx, audit)?;
                } else {
                    self.dispose_whole(tx, oracle, audit, &mut events, tax_year, false)?;
                }
            }
            TxKind::TransferInternal => {
                if tx.out_leg.is_some() {
                    self.transfer_out(tx, audit)?;
                }
                if tx.in_leg.is_some() {
                    self.transfer_in(tx, audit)?;
                }
            }
            TxKind::Trade => {
                self.trade(tx, oracle, audit, &mut events, tax_year)?;
            }
            TxKind::FeeOnly => {
                self.fee_only(tx, oracle, audit, &mut events, tax_year)?;
            }
            TxKind::SyntheticConsolidation => {
                if tx.in_leg.is_some() {
                    self.acquire_zero_basis(tx, audit, tax_year)?;
                } else {
                    self.dispose_whole(tx, oracle, audit, &mut events, tax_year, true)?;
                }
            }
        }

        Ok(events)
    }

    /// Deposit / StakingReward / LendingInterest / Income: acquisition valued at FMV, acquisition
    /// fee (if any) added to basis; staking/lending/income emit an `Income` event at receipt.
    #[allow(clippy::too_many_arguments)]
    fn acquire_simple(
        &mut self,
        tx: &Tx,
        oracle: &PriceOracle,
        audit: &mut Vec<AuditEntry>,
        events: &mut Vec<TaxEventOut>,
        tax_year: i32,
        emit_income: bool,
        category: IncomeCategory,
    ) -> Result<(), QntropyError> {
        let in_leg = tx.in_leg.as_ref().expect("validated by Tx::new");
        let asset = in_leg.asset.clone();

        let fmv_unit = if asset.is_eur() {
            Decimal::ONE
        } else {
            oracle.price_eur(asset.symbol(), tx.instant, audit)?
        };
        let base_basis_total = fmv_unit * in_leg.amount;

        let (fee_eur, fee_events) =
            self.acquisition_fee_eur(tx, &asset, oracle, audit, tax_year)?;
        events.extend(fee_events);

        let basis_total = base_basis_total + fee_eur;
        let unit_basis = basis_total / in_leg.amount;

        self.push_lot(asset.clone(), in_leg.amount, tx.instant, unit_basis, &tx.id, tx.synthetic);

        if emit_income {
            events.push(TaxEventOut::Income {
                tax_year,
                asset_received: asset,
                qty: in_leg.amount,
                fmv_eur: base_basis_total,
                category,
                source_tx_id: tx.id.clone(),
                synthetic_inputs: tx.synthetic,
                instant: tx.instant,
            });
        }

        Ok(())
    }

    /// Airdrop / Fork / synthetic deposits: zero-basis acquisition, no income event at receipt.
    fn acquire_zero_basis(&mut self, tx: &Tx, _audit: &mut Vec<AuditEntry>, _tax_year: i32) -> Result<(), QntropyError> {
        let in_leg = tx.in_leg.as_ref().expect("validated by Tx::new");
        self.push_lot(in_leg.asset.clone(), in_leg.amount, tx.instant, Decimal::ZERO, &tx.id, tx.synthetic);
        Ok(())
    }

    /// A Withdrawal (or withdrawal-shaped SyntheticConsolidation) marked internal is a transfer,
    /// not a disposal: lots leave the queue with no `CapitalDisposal`.
    fn transfer_out(&mut self, tx: &Tx, audit: &mut Vec<AuditEntry>) -> Result<(), QntropyError> {
        let out_leg = tx.out_leg.as_ref().expect("validated by Tx::new");
        let (_, _, _) = self.consume(out_leg.asset.symbol(), out_leg.amount, tx.instant, &tx.id, audit);
        audit.push(AuditEntry::new(
            tx.instant,
            AuditKind::TransferSplit,
            tx.id.clone(),
            format!(
                "internal transfer out of {} {}, no disposal recorded",
                out_leg.amount, out_leg.asset
            ),
        ));
        Ok(())
    }

    /// The deposit half of an internal transfer: a new zero-basis lot, since basis carryover
    /// across legs requires an explicit match rule this pipeline does not implement (open
    /// question: internal transfer matching).
    fn transfer_in(&mut self, tx: &Tx, audit: &mut Vec<AuditEntry>) -> Result<(), QntropyError> {
        let in_leg = tx.in_leg.as_ref().expect("validated by Tx::new");
        self.push_lot(in_leg.asset.clone(), in_leg.amount, tx.instant, Decimal::ZERO, &tx.id, tx.synthetic);
        audit.push(AuditEntry::new(
            tx.instant,
            AuditKind::TransferSplit,
            tx.id.clone(),
            format!(
                "internal transfer in of {} {}, recorded at zero basis",
                in_leg.amount, in_leg.asset
            ),
        ));
        Ok(())
    }

    /// Withdrawal (external) or withdrawal-shaped SyntheticConsolidation: a disposal at FMV.
    fn dispose_whole(
        &mut self,
        tx: &Tx,
        oracle: &PriceOracle,
        audit: &mut Vec<AuditEntry>,
        events: &mut Vec<TaxEventOut>,
        tax_year: i32,
        synthetic_inputs: bool,
    ) -> Result<(), QntropyError> {
        let out_leg = tx.out_leg.as_ref().expect("validated by Tx::new");
        let asset = out_leg.asset.clone();

        if asset.is_eur() {
            // Withdrawing EUR itself realizes no gain; EUR is the numeraire, not a lot asset.
            return Ok(());
        }

        let fmv_unit = oracle.price_eur(asset.symbol(), tx.instant, audit)?;
        let (fee_eur, fee_events) = self.disposal_fee_eur(tx, &asset, oracle, audit, tax_year)?;
        events.extend(fee_events);

        let mut qty_to_dispose = out_leg.amount;
        if let Some(fee) = &tx.fee_leg {
            if fee.asset == asset {
                qty_to_dispose += fee.amount;
            }
        }

        let (slices, basis_total, earliest) =
            self.consume(asset.symbol(), qty_to_dispose, tx.instant, &tx.id, audit);
        let proceeds = fmv_unit * out_leg.amount - fee_eur;
        let synthetic_inputs =
            tx.synthetic || synthetic_inputs || slices.iter().any(|s| s.synthetic_origin);

        events.push(TaxEventOut::CapitalDisposal {
            tax_year,
            asset_disposed: asset,
            qty: out_leg.amount,
            proceeds_eur: proceeds,
            cost_basis_eur: basis_total,
            gain_eur: proceeds - basis_total,
            holding: Self::holding(earliest, tx.instant),
            lots_consumed: slices,
            source_tx_id: tx.id.clone(),
            synthetic_inputs,
            instant: tx.instant,
        });

        Ok(())
    }

    /// `FeeOnly`: the fee asset is disposed at zero proceeds, realizing a loss equal to its
    /// consumed basis (§4.4).
    fn fee_only(
        &mut self,
        tx: &Tx,
        _oracle: &PriceOracle,
        audit: &mut Vec<AuditEntry>,
        events: &mut Vec<TaxEventOut>,
        tax_year: i32,
    ) -> Result<(), QntropyError> {
        let fee_leg = tx.fee_leg.as_ref().expect("validated by Tx::new");
        if fee_leg.asset.is_eur() {
            return Ok(());
        }
        let (slices, basis_total, earliest) =
            self.consume(fee_leg.asset.symbol(), fee_leg.amount, tx.instant, &tx.id, audit);
        let synthetic_inputs = tx.synthetic || slices.iter().any(|s| s.synthetic_origin);

        events.push(TaxEventOut::CapitalDisposal {
            tax_year,
            asset_disposed: fee_leg.asset.clone(),
            qty: fee_leg.amount,
            proceeds_eur: Decimal::ZERO,
            cost_basis_eur: basis_total,
            gain_eur: -basis_total,
            holding: Self::holding(earliest, tx.instant),
            lots_consumed: slices,
            source_tx_id: tx.id.clone(),
            synthetic_inputs,
            instant: tx.instant,
        });

        Ok(())
    }

    /// A `Trade` treats whichever leg is EUR as pure numeraire (no lot, no disposal); a
    /// crypto-to-crypto swap prices the whole trade off the acquired leg's own FMV so the
    /// disposed leg's proceeds and the acquired leg's basis agree.
    fn trade(
        &mut self,
        tx: &Tx,
        oracle: &PriceOracle,
        audit: &mut Vec<AuditEntry>,
        events: &mut Vec<TaxEventOut>,
        tax_year: i32,
    ) -> Result<(), QntropyError> {
        let in_leg = tx.in_leg.as_ref().expect("validated by Tx::new");
        let out_leg = tx.out_leg.as_ref().expect("validated by Tx::new");

        let trade_value_eur = if out_leg.asset.is_eur() {
            out_leg.amount
        } else if in_leg.asset.is_eur() {
            in_leg.amount
        } else {
            oracle.price_eur(in_leg.asset.symbol(), tx.instant, audit)? * in_leg.amount
        };

        // Fee attaches to whichever side is the fiat-funded leg; for a crypto-to-crypto swap it
        // defaults to the disposal side.
        let fee_on_acquisition = out_leg.asset.is_eur();

        let (acquisition_fee_eur, disposal_fee_eur, fee_events) = if fee_on_acquisition {
            let (fee, ev) = self.acquisition_fee_eur(tx, &in_leg.asset, oracle, audit, tax_year)?;
            (fee, Decimal::ZERO, ev)
        } else {
            let (fee, ev) = self.disposal_fee_eur(tx, &out_leg.asset, oracle, audit, tax_year)?;
            (Decimal::ZERO, fee, ev)
        };
        events.extend(fee_events);

        if !out_leg.asset.is_eur() {
            let mut qty_to_dispose = out_leg.amount;
            if let Some(fee) = &tx.fee_leg {
                if fee.asset == out_leg.asset {
                    qty_to_dispose += fee.amount;
                }
            }
            let (slices, basis_total, earliest) =
                self.consume(out_leg.asset.symbol(), qty_to_dispose, tx.instant, &tx.id, audit);
            let proceeds = trade_value_eur - disposal_fee_eur;
            let synthetic_inputs = tx.synthetic || slices.iter().any(|s| s.synthetic_origin);

            events.push(TaxEventOut::CapitalDisposal {
                tax_year,
                asset_disposed: out_leg.asset.clone(),
                qty: out_leg.amount,
                proceeds_eur: proceeds,
                cost_basis_eur: basis_total,
                gain_eur: proceeds - basis_total,
                holding: Self::holding(earliest, tx.instant),
                lots_consumed: slices,
                source_tx_id: tx.id.clone(),
                synthetic_inputs,
                instant: tx.instant,
            });
        }

        if !in_leg.asset.is_eur() {
            let basis_total = trade_value_eur + acquisition_fee_eur;
            let unit_basis = basis_total / in_leg.amount;
            self.push_lot(in_leg.asset.clone(), in_leg.amount, tx.instant, unit_basis, &tx.id, tx.synthetic);
        }

        Ok(())
    }

    /// Fee attached to an acquisition: EUR fees add their amount directly; fees in the acquired
    /// asset add their FMV; fees in a third asset are disposed of recursively and their FMV is
    /// added to the acquired asset's basis.
    fn acquisition_fee_eur(
        &mut self,
        tx: &Tx,
        acquired_asset: &Asset,
        oracle: &PriceOracle,
        audit: &mut Vec<AuditEntry>,
        tax_year: i32,
    ) -> Result<(Decimal, Vec<TaxEventOut>), QntropyError> {
        let Some(fee) = &tx.fee_leg else {
            return Ok((Decimal::ZERO, Vec::new()));
        };

        if fee.asset.is_eur() {
            return Ok((fee.amount, Vec::new()));
        }
        if &fee.asset == acquired_asset {
            let fmv = oracle.price_eur(fee.asset.symbol(), tx.instant, audit)? * fee.amount;
            return Ok((fmv, Vec::new()));
        }

        self.dispose_fee_asset(tx, &fee.asset, fee.amount, oracle, audit, tax_year)
    }

    /// Fee attached to a disposal: symmetric to [`FifoEngine::acquisition_fee_eur`], subtracted
    /// from proceeds by the caller.
    fn disposal_fee_eur(
        &mut self,
        tx: &Tx,
        disposed_asset: &Asset,
        oracle: &PriceOracle,
        audit: &mut Vec<AuditEntry>,
        tax_year: i32,
    ) -> Result<(Decimal, Vec<TaxEventOut>), QntropyError> {
        let Some(fee) = &tx.fee_leg else {
            return Ok((Decimal::ZERO, Vec::new()));
        };

        if fee.asset.is_eur() {
            return Ok((fee.amount, Vec::new()));
        }
        if &fee.asset == disposed_asset {
            let fmv = oracle.price_eur(fee.asset.symbol(), tx.instant, audit)? * fee.amount;
            return Ok((fmv, Vec::new()));
        }

        self.dispose_fee_asset(tx, &fee.asset, fee.amount, oracle, audit, tax_year)
    }

    /// A fee paid in neither leg's asset (§9 open question 3): treated as a simultaneous disposal
    /// of that third asset at its own FMV, which both realizes its own gain/loss and supplies the
    /// EUR value added to (or subtracted from) the primary leg.
    fn dispose_fee_asset(
        &mut self,
        tx: &Tx,
        fee_asset: &Asset,
        fee_amount: Decimal,
        oracle: &PriceOracle,
        audit: &mut Vec<AuditEntry>,
        tax_year: i32,
    ) -> Result<(Decimal, Vec<TaxEventOut>), QntropyError> {
        let fmv_unit = oracle.price_eur(fee_asset.symbol(), tx.instant, audit)?;
        let proceeds = fmv_unit * fee_amount;
        let (slices, basis_total, earliest) =
            self.consume(fee_asset.symbol(), fee_amount, tx.instant, &tx.id, audit);
        let synthetic_inputs = tx.synthetic || slices.iter().any(|s| s.synthetic_origin);

        let event = TaxEventOut::CapitalDisposal {
            tax_year,
            asset_disposed: fee_asset.clone(),
            qty: fee_amount,
            proceeds_eur: proceeds,
            cost_basis_eur: basis_total,
            gain_eur: proceeds - basis_total,
            holding: Self::holding(earliest, tx.instant),
            lots_consumed: slices,
            source_tx_id: tx.id.clone(),
            synthetic_inputs,
            instant: tx.instant,
        };

        Ok((proceeds, vec![event]))
    }
}

/// Mirrors [`qntropy_core::TaxEvent`] field-for-field; kept as a distinct type so the engine can
/// construct events before rounding, which only happens at the reporting boundary (`io::write_events`).
pub type TaxEventOut = qntropy_core::TaxEvent;

pub fn round_event_for_report(event: &TaxEventOut) -> TaxEventOut {
    let mut rounded = event.clone();
    match &mut rounded {
        TaxEventOut::CapitalDisposal {
            proceeds_eur,
            cost_basis_eur,
            gain_eur,
            ..
        } => {
            *proceeds_eur = round_eur(*proceeds_eur);
            *cost_basis_eur = round_eur(*cost_basis_eur);
            *gain_eur = round_eur(*gain_eur);
        }
        TaxEventOut::Income { fmv_eur, .. } => {
            *fmv_eur = round_eur(*fmv_eur);
        }
    }
    rounded
}
