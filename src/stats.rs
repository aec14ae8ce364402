//! Per-card review statistics rebuilt from history.

use chrono::{DateTime, Utc};

use crate::models::{Card, Rating};

/// One point of a card's review sparkline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SparklineItem {
    pub rating: Rating,
    pub reviewed_at: DateTime<Utc>,
}

/// Summary of every review a card has received.
#[derive(Debug, Clone, PartialEq)]
pub struct CardStats {
    /// Review count per rating, indexed Again, Hard, Good, Easy.
    pub totals: [usize; 4],
    /// Reviews in chronological order.
    pub sparkline: Vec<SparklineItem>,
}

impl CardStats {
    pub fn from_card(card: &Card) -> Self {
        let mut totals = [0; 4];
        let mut sparkline: Vec<SparklineItem> = card
            .history()
            .iter()
            .map(|record| {
                totals[record.rating.value() as usize - 1] += 1;
                SparklineItem {
                    rating: record.rating,
                    reviewed_at: record.reviewed_at,
                }
            })
            .collect();
        sparkline.sort_by_key(|item| item.reviewed_at);

        Self { totals, sparkline }
    }

    pub fn count(&self, rating: Rating) -> usize {
        self.totals[rating.value() as usize - 1]
    }

    pub fn reviews(&self) -> usize {
        self.sparkline.len()
    }

    pub fn first_review(&self) -> Option<DateTime<Utc>> {
        self.sparkline.first().map(|item| item.reviewed_at)
    }

    pub fn last_review(&self) -> Option<DateTime<Utc>> {
        self.sparkline.last().map(|item| item.reviewed_at)
    }
}
