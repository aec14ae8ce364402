//! Spaced repetition review engine.
//!
//! Provides:
//! - Card and deck model with due-card queries
//! - FSRS memory model behind the [`MemoryModel`] trait
//! - Scheduler, lazy migration of legacy cards, review sessions
//! - File-per-deck JSON repository

pub mod algorithm;
pub mod clock;
pub mod config;
pub mod error;
pub mod migration;
pub mod models;
pub mod review;
pub mod scheduler;
pub mod stats;
pub mod storage;

pub use algorithm::fsrs::Fsrs;
pub use algorithm::MemoryModel;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use migration::{is_migrated, migrate_card, migrate_deck};
pub use models::{
    Card, Deck, DeckStats, LifecycleState, MemoryState, Rating, RecordOrigin, ReviewRecord,
    Schedule,
};
pub use review::{shuffle_cards, Review};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use stats::{CardStats, SparklineItem};
pub use storage::DeckRepository;
