//! Memory model implementations.

pub mod fsrs;

use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::models::{MemoryState, Rating};

/// A memory model maps a card's memory state and a rating to its next state.
///
/// Implementations must be pure: identical inputs always produce identical
/// outputs, and the returned `due` is never earlier than `now`.
pub trait MemoryModel: Debug + Send + Sync {
    /// Algorithm identifier.
    fn name(&self) -> &'static str;

    /// Calculate the next memory state after a review at `now`.
    fn next(&self, state: &MemoryState, rating: Rating, now: DateTime<Utc>) -> MemoryState;

    /// Probability of recall at `now`.
    fn retrievability(&self, state: &MemoryState, now: DateTime<Utc>) -> f64;
}
