//! State Module - behaviors and the reactive event bus
//!
//! This module contains the pieces that connect user code and signals to the
//! runtime:
//!
//! - **Behavior** - lifecycle hooks, methods, factory registry, node context
//! - **Bus** - events pushed by effects, download waiters, sensor state

mod behavior;
mod bus;

pub use behavior::*;
pub use bus::*;
