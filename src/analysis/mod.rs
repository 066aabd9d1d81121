//! Analysis modules.
//!
//! The aggregator turns the network's sites into one usage snapshot.

pub mod aggregator;

pub use aggregator::*;
