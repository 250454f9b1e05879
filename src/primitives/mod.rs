//! Primitives - pure building blocks used by the runtime.
//!
//! - [`list`] - keyed reconciliation of a chain's children against its source

pub mod list;

pub use list::{reconcile, Entering, Reconciliation, Updating};
