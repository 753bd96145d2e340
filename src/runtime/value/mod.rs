//! Dynamic values exchanged between coroutines and executors
//!
//! Coroutines resume with a [`Value`], effects resolve to a [`Value`] and
//! channels carry [`Action`]s.

pub mod runtime_value;
pub use runtime_value::*;

#[cfg(test)]
mod tests;
