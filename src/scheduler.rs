//! Card scheduling on top of a pluggable memory model.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::algorithm::fsrs::Fsrs;
use crate::algorithm::MemoryModel;
use crate::error::{Error, Result};
use crate::migration::migrate_card;
use crate::models::{Card, MemoryState, Rating, ReviewRecord, Schedule};

/// Number of weights an FSRS weight override must carry.
pub const WEIGHT_COUNT: usize = 19;

/// Tunable scheduler parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Target probability of recall at the due date, 0.7 to 0.99.
    pub request_retention: f64,
    /// Longest interval in days, 1 to 36500.
    pub maximum_interval: f64,
    pub enable_short_term: bool,
    pub enable_fuzz: bool,
    /// Custom weights; default weights are used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            request_retention: 0.9,
            maximum_interval: 36500.0,
            enable_short_term: true,
            enable_fuzz: false,
            weights: None,
        }
    }
}

impl SchedulerConfig {
    /// Ensures every value is within its accepted range.
    pub fn validate(&self) -> Result<()> {
        if !(0.7..=0.99).contains(&self.request_retention) {
            return Err(Error::InvalidConfig(format!(
                "request_retention must be between 0.7 and 0.99, got {}",
                self.request_retention
            )));
        }

        if !(1.0..=36500.0).contains(&self.maximum_interval) {
            return Err(Error::InvalidConfig(format!(
                "maximum_interval must be between 1 and 36500 days, got {}",
                self.maximum_interval
            )));
        }

        if let Some(weights) = &self.weights {
            if weights.len() != WEIGHT_COUNT {
                return Err(Error::InvalidConfig(format!(
                    "weights must have exactly {} values, got {}",
                    WEIGHT_COUNT,
                    weights.len()
                )));
            }
            if weights.iter().any(|w| !w.is_finite()) {
                return Err(Error::InvalidConfig("weights must be finite numbers".to_string()));
            }
        }

        Ok(())
    }
}

/// Applies ratings to cards through a memory model.
#[derive(Debug, Clone)]
pub struct Scheduler {
    model: Arc<dyn MemoryModel>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Fsrs::default())
    }
}

impl Scheduler {
    pub fn new(model: impl MemoryModel + 'static) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    /// Builds an FSRS scheduler after validating `config`.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        Ok(Self::new(Fsrs::from_config(config)?))
    }

    pub fn algorithm(&self) -> &'static str {
        self.model.name()
    }

    /// Rates `card` at `now` and returns the updated card with the review
    /// appended to its history. Unmigrated cards are migrated first.
    pub fn schedule(&self, card: &Card, rating: Rating, now: DateTime<Utc>) -> Card {
        let migrated = migrate_card(card, now);
        let current = migrated.memory().copied().unwrap_or_else(|| MemoryState::new(now));

        let mut next = self.model.next(&current, rating, now);
        if next.due.map_or(true, |due| due < now) {
            next.due = Some(now);
        }

        let mut updated = migrated.with_schedule(Schedule::Migrated(next));
        updated.push_record(ReviewRecord::scheduled(rating, now, &next));

        debug!(
            card = %updated.id(),
            rating = rating.name(),
            state = next.state.name(),
            due = ?next.due,
            "card scheduled"
        );
        updated
    }

    /// Due instant each rating would produce, without touching the card.
    pub fn preview(&self, card: &Card, now: DateTime<Utc>) -> [(Rating, DateTime<Utc>); 4] {
        Rating::ALL.map(|rating| {
            let due = self.schedule(card, rating, now).due().unwrap_or(now);
            (rating, due)
        })
    }

    /// Probability of recalling `card` at `now`; zero for cards never reviewed.
    pub fn retrievability(&self, card: &Card, now: DateTime<Utc>) -> f64 {
        card.memory()
            .map_or(0.0, |state| self.model.retrievability(state, now))
    }
}
