//! Upgrade of cards written before the current memory model.
//!
//! Migration runs lazily, right before a card is first scheduled, so a deck
//! holding both migrated and unmigrated cards is always valid.

use chrono::{DateTime, Utc};

use crate::models::{Card, Deck, MemoryState, Rating, ReviewRecord, Schedule};

pub fn is_migrated(card: &Card) -> bool {
    card.is_migrated()
}

/// Gives an unmigrated card the new-card memory state, reviewable at `now`.
/// Lapses are rebuilt from the failed reviews in its history. Migrated cards
/// are returned unchanged.
pub fn migrate_card(card: &Card, now: DateTime<Utc>) -> Card {
    if is_migrated(card) {
        return card.clone();
    }

    let state = MemoryState {
        lapses: count_lapses(card.history()),
        ..MemoryState::new(now)
    };
    card.with_schedule(Schedule::Migrated(state))
}

/// Migrates every card of `deck`.
pub fn migrate_deck(deck: &Deck, now: DateTime<Utc>) -> Deck {
    let mut migrated = deck.clone();
    for card in deck.list() {
        if !is_migrated(card) {
            migrated.upsert(migrate_card(card, now));
        }
    }
    migrated
}

fn count_lapses(history: &[ReviewRecord]) -> u64 {
    history.iter().filter(|r| r.rating == Rating::Again).count() as u64
}
