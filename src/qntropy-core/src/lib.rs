//! Shared data model for the Qntropy crypto tax reconciliation engine: assets, canonical
//! transactions, FIFO lots, and the taxable events / audit entries the pipeline emits.

pub mod asset;
pub mod event;
pub mod instant;
pub mod lot;
pub mod money;
pub mod tx;

pub use asset::{Asset, AssetClass};
pub use event::{AuditEntry, AuditKind, Holding, IncomeCategory, TaxEvent};
pub use instant::{parse_instant, tax_year_of, Instant};
pub use lot::{Lot, LotSlice};
pub use money::{round_eur, within_tolerance};
pub use tx::{Leg, Tx, TxError, TxKind};
