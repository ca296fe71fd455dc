//! The canonical transaction record and the closed set of kinds it can take.

use crate::asset::Asset;
use crate::instant::Instant;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every kind of ledger-modifying event the core understands. Closed by construction: any
/// `match` on this enum that omits a catch-all arm is checked exhaustively by the compiler,
/// which is the point — new kinds must be threaded through every consumer deliberately.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    Deposit,
    Withdrawal,
    Trade,
    StakingReward,
    LendingInterest,
    Airdrop,
    Fork,
    FeeOnly,
    TransferInternal,
    Income,
    SyntheticBalancingDeposit,
    SyntheticConsolidation,
}

impl TxKind {
    /// Secondary sort key used to break same-`instant` ties so acquisitions always post before
    /// disposals (required for deterministic FIFO consumption — §4.1, §4.3).
    pub fn tie_break_priority(self) -> u8 {
        match self {
            TxKind::Deposit
            | TxKind::SyntheticBalancingDeposit
            | TxKind::SyntheticConsolidation => 0,
            TxKind::StakingReward | TxKind::LendingInterest | TxKind::Airdrop | TxKind::Fork => 1,
            TxKind::Trade => 2,
            TxKind::TransferInternal | TxKind::Income => 3,
            TxKind::Withdrawal => 4,
            TxKind::FeeOnly => 5,
        }
    }

    pub fn is_synthetic_kind(self) -> bool {
        matches!(
            self,
            TxKind::SyntheticBalancingDeposit | TxKind::SyntheticConsolidation
        )
    }
}

/// One side of a transaction: an asset and a strictly positive amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub asset: Asset,
    pub amount: Decimal,
}

impl Leg {
    pub fn new(asset: Asset, amount: Decimal) -> Result<Self, TxError> {
        if amount <= Decimal::ZERO {
            return Err(TxError::InvalidAmount { amount });
        }
        Ok(Leg { asset, amount })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TxError {
    #[error("amount must be > 0, found {amount}")]
    InvalidAmount { amount: Decimal },
    #[error("{kind:?} requires an in_leg")]
    MissingInLeg { kind: TxKind },
    #[error("{kind:?} requires an out_leg")]
    MissingOutLeg { kind: TxKind },
    #[error("{kind:?} must not have an in_leg")]
    UnexpectedInLeg { kind: TxKind },
    #[error("{kind:?} must not have an out_leg")]
    UnexpectedOutLeg { kind: TxKind },
    #[error("Trade legs must be on distinct assets, both were {asset}")]
    TradeSameAsset { asset: String },
    #[error("FeeOnly transactions must carry only a fee_leg")]
    FeeOnlyMustBeFeeOnly,
    #[error("synthetic transactions require a non-empty origin_note")]
    MissingOriginNote,
}

/// A single canonical ledger event. Construction enforces every invariant named in the
/// specification; there is no way to obtain a `Tx` that violates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tx {
    pub id: String,
    pub instant: Instant,
    pub kind: TxKind,
    pub in_leg: Option<Leg>,
    pub out_leg: Option<Leg>,
    pub fee_leg: Option<Leg>,
    pub venue: String,
    pub group: String,
    pub comment: String,
    pub synthetic: bool,
    pub origin_note: Option<String>,
}

#[allow(clippy::too_many_arguments)]
impl Tx {
    pub fn new(
        id: impl Into<String>,
        instant: Instant,
        kind: TxKind,
        in_leg: Option<Leg>,
        out_leg: Option<Leg>,
        fee_leg: Option<Leg>,
        venue: impl Into<String>,
        group: impl Into<String>,
        comment: impl Into<String>,
    ) -> Result<Self, TxError> {
        Self::new_inner(
            id.into(),
            instant,
            kind,
            in_leg,
            out_leg,
            fee_leg,
            venue.into(),
            group.into(),
            comment.into(),
            false,
            None,
        )
    }

    /// Construct a synthetic transaction. `origin_note` must be non-empty (spec invariant:
    /// `synthetic = true` implies a mandatory, non-empty `origin_note`).
    #[allow(clippy::too_many_arguments)]
    pub fn new_synthetic(
        id: impl Into<String>,
        instant: Instant,
        kind: TxKind,
        in_leg: Option<Leg>,
        out_leg: Option<Leg>,
        origin_note: impl Into<String>,
    ) -> Result<Self, TxError> {
        let origin_note = origin_note.into();
        if origin_note.trim().is_empty() {
            return Err(TxError::MissingOriginNote);
        }
        Self::new_inner(
            id.into(),
            instant,
            kind,
            in_leg,
            out_leg,
            None,
            String::new(),
            String::new(),
            String::new(),
            true,
            Some(origin_note),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn new_inner(
        id: String,
        instant: Instant,
        kind: TxKind,
        in_leg: Option<Leg>,
        out_leg: Option<Leg>,
        fee_leg: Option<Leg>,
        venue: String,
        group: String,
        comment: String,
        synthetic: bool,
        origin_note: Option<String>,
    ) -> Result<Self, TxError> {
        validate_legs(kind, &in_leg, &out_leg, &fee_leg)?;

        Ok(Tx {
            id,
            instant,
            kind,
            in_leg,
            out_leg,
            fee_leg,
            venue,
            group,
            comment,
            synthetic,
            origin_note,
        })
    }

    pub fn is_internal_transfer(&self) -> bool {
        self.kind == TxKind::TransferInternal
            || (self.kind == TxKind::Withdrawal
                && (self.group.eq_ignore_ascii_case("internal")
                    || self.comment.to_lowercase().contains("internal transfer")))
    }
}

fn validate_legs(
    kind: TxKind,
    in_leg: &Option<Leg>,
    out_leg: &Option<Leg>,
    fee_leg: &Option<Leg>,
) -> Result<(), TxError> {
    use TxKind::*;

    match kind {
        Deposit | StakingReward | LendingInterest | Airdrop | Fork | Income
        | SyntheticBalancingDeposit => {
            if in_leg.is_none() {
                return Err(TxError::MissingInLeg { kind });
            }
            if out_leg.is_some() {
                return Err(TxError::UnexpectedOutLeg { kind });
            }
        }
        Withdrawal => {
            if out_leg.is_none() {
                return Err(TxError::MissingOutLeg { kind });
            }
            if in_leg.is_some() {
                return Err(TxError::UnexpectedInLeg { kind });
            }
        }
        Trade => {
            let (Some(i), Some(o)) = (in_leg, out_leg) else {
                return Err(if in_leg.is_none() {
                    TxError::MissingInLeg { kind }
                } else {
                    TxError::MissingOutLeg { kind }
                });
            };
            if i.asset == o.asset {
                return Err(TxError::TradeSameAsset {
                    asset: i.asset.symbol().to_string(),
                });
            }
        }
        TransferInternal => {
            if in_leg.is_none() && out_leg.is_none() {
                return Err(TxError::MissingInLeg { kind });
            }
        }
        FeeOnly => {
            if in_leg.is_some() || out_leg.is_some() || fee_leg.is_none() {
                return Err(TxError::FeeOnlyMustBeFeeOnly);
            }
        }
        SyntheticConsolidation => {
            // Either a Deposit-shaped or Withdrawal-shaped synthetic, never both.
            match (in_leg.is_some(), out_leg.is_some()) {
                (true, false) | (false, true) => {}
                _ => return Err(TxError::MissingInLeg { kind }),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn now() -> Instant {
        Utc.with_ymd_and_hms(2023, 1, 2, 10, 0, 0).unwrap()
    }

    fn btc() -> Asset {
        "BTC".parse().unwrap()
    }

    fn eur() -> Asset {
        Asset::eur()
    }

    #[test]
    fn trade_requires_distinct_assets() {
        let leg = Leg::new(btc(), Decimal::ONE).unwrap();
        let err = Tx::new(
            "t1", now(), TxKind::Trade, Some(leg.clone()), Some(leg), None, "", "", "",
        )
        .unwrap_err();
        assert!(matches!(err, TxError::TradeSameAsset { .. }));
    }

    #[test]
    fn deposit_rejects_out_leg() {
        let in_leg = Leg::new(btc(), Decimal::ONE).unwrap();
        let out_leg = Leg::new(eur(), Decimal::ONE).unwrap();
        let err = Tx::new(
            "t1",
            now(),
            TxKind::Deposit,
            Some(in_leg),
            Some(out_leg),
            None,
            "",
            "",
            "",
        )
        .unwrap_err();
        assert!(matches!(err, TxError::UnexpectedOutLeg { .. }));
    }

    #[test]
    fn withdrawal_rejects_in_leg() {
        let out_leg = Leg::new(btc(), Decimal::ONE).unwrap();
        let err = Tx::new(
            "t1",
            now(),
            TxKind::Withdrawal,
            Some(out_leg.clone()),
            Some(out_leg),
            None,
            "",
            "",
            "",
        )
        .unwrap_err();
        assert!(matches!(err, TxError::UnexpectedInLeg { .. }));
    }

    #[test]
    fn leg_rejects_non_positive_amount() {
        assert!(Leg::new(btc(), Decimal::ZERO).is_err());
        assert!(Leg::new(btc(), Decimal::NEGATIVE_ONE).is_err());
    }

    #[test]
    fn synthetic_requires_origin_note() {
        let in_leg = Leg::new(btc(), Decimal::ONE).unwrap();
        let err = Tx::new_synthetic(
            "s1",
            now(),
            TxKind::SyntheticBalancingDeposit,
            Some(in_leg),
            None,
            "   ",
        )
        .unwrap_err();
        assert!(matches!(err, TxError::MissingOriginNote));
    }

    #[test]
    fn tie_break_orders_deposits_before_disposals() {
        assert!(TxKind::Deposit.tie_break_priority() < TxKind::Trade.tie_break_priority());
        assert!(TxKind::Trade.tie_break_priority() < TxKind::Withdrawal.tie_break_priority());
        assert!(TxKind::Withdrawal.tie_break_priority() < TxKind::FeeOnly.tie_break_priority());
    }
}
