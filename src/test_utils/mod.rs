//! Helpers shared by the unit tests: an in-process coordination service wired
//! to a session monitor, and polling assertions for asynchronous watch loops.
mod common;

pub use common::*;
