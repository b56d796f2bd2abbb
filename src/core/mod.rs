//! Task contract and execution environment.
//!
//! This module defines what the engine needs from the outside world: the
//! [`Task`](task::Task) trait, its error type, and the environment every task
//! runs in.

pub mod checkpoint;
pub mod env;
pub mod task;
pub mod types;
