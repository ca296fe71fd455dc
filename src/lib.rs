//! Qntropy: a Spanish IRPF crypto tax reconciliation and FIFO cost-basis engine.
//!
//! The pipeline is Normalizer → Reconciler → FIFO Lot Engine → Event Sink, with the Price Oracle
//! consulted by the reconciler (for synthetic-deposit valuation, not exercised by default) and by
//! the FIFO engine (for every acquisition/disposal valuation).

pub mod cli;
pub mod config;
pub mod error;
pub mod fifo;
pub mod io;
pub mod normalize;
pub mod oracle;
pub mod reconcile;
pub mod sink;

pub use error::QntropyError;
