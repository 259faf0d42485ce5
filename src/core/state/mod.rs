// src/core/state/mod.rs

//! Defines the central `TcState` struct and all related state components.
//! Broken down into logical parts, one file per concern, rather than one
//! large module.

mod core;
pub mod persistence;
mod stats;

pub use core::{TcInit, TcState};
pub use persistence::{OperationClassTag, SessionRow, SessionStore};
pub use stats::StatsState;
