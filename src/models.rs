//! Data models for flashcards and decks.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Rating for how well you remembered a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rating {
    Again = 1, // Complete blackout
    Hard = 2,  // Serious difficulty
    Good = 3,  // Some hesitation
    Easy = 4,  // Perfect recall
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Maps a keypress to a rating. `5` is the super-easy key and lands on `Easy`.
    pub fn from_key(c: char) -> Option<Self> {
        match c {
            '1' => Some(Self::Again),
            '2' => Some(Self::Hard),
            '3' => Some(Self::Good),
            '4' | '5' => Some(Self::Easy),
            _ => None,
        }
    }

    /// Parses a score from the legacy 0-based scale used by old review logs.
    pub fn from_legacy_score(s: &str) -> Result<Self> {
        match s.trim().parse::<u8>() {
            Ok(0) => Ok(Self::Again),
            Ok(1) => Ok(Self::Hard),
            Ok(2) => Ok(Self::Good),
            Ok(3) | Ok(4) => Ok(Self::Easy),
            _ => Err(Error::InvalidScore(s.to_string())),
        }
    }

    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Again => "Again",
            Self::Hard => "Hard",
            Self::Good => "Good",
            Self::Easy => "Easy",
        }
    }
}

impl FromStr for Rating {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_key(c).ok_or_else(|| Error::InvalidScore(s.to_string())),
            _ => Err(Error::InvalidScore(s.to_string())),
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a card sits in the spaced repetition progression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Learning => "Learning",
            Self::Review => "Review",
            Self::Relearning => "Relearning",
        }
    }
}

/// Memory model state of a card that has been scheduled at least once
/// under the current model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryState {
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: u64,
    pub scheduled_days: u64,
    pub reps: u64,
    pub lapses: u64,
    pub state: LifecycleState,
    pub due: Option<DateTime<Utc>>,
    pub last_review: DateTime<Utc>,
}

impl MemoryState {
    /// Zero state of a brand new card, reviewable from `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            state: LifecycleState::New,
            due: Some(now),
            last_review: now,
        }
    }

    /// Earliest instant the card may be reviewed.
    pub fn next_review_at(&self) -> DateTime<Utc> {
        self.due.unwrap_or(self.last_review)
    }
}

/// Scheduling status of a card.
///
/// Cards written before the current memory model carry no usable memory
/// state; they stay `Unmigrated` until their first rating.
#[derive(Debug, Clone, PartialEq)]
pub enum Schedule {
    Unmigrated,
    Migrated(MemoryState),
}

/// How a review record entered the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOrigin {
    #[default]
    Scheduled,
    Imported,
}

/// One entry of a card's review history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub rating: Rating,
    pub reviewed_at: DateTime<Utc>,
    #[serde(default)]
    pub stability: f64,
    #[serde(default)]
    pub difficulty: f64,
    #[serde(default)]
    pub elapsed_days: u64,
    #[serde(default)]
    pub scheduled_days: u64,
    #[serde(default)]
    pub state: LifecycleState,
    #[serde(default)]
    pub origin: RecordOrigin,
}

impl ReviewRecord {
    /// Snapshot of the state a rating produced.
    pub fn scheduled(rating: Rating, reviewed_at: DateTime<Utc>, result: &MemoryState) -> Self {
        Self {
            rating,
            reviewed_at,
            stability: result.stability,
            difficulty: result.difficulty,
            elapsed_days: result.elapsed_days,
            scheduled_days: result.scheduled_days,
            state: result.state,
            origin: RecordOrigin::Scheduled,
        }
    }

    /// A record recovered from a legacy review log.
    pub fn imported(rating: Rating, reviewed_at: DateTime<Utc>, scheduled_days: u64) -> Self {
        Self {
            rating,
            reviewed_at,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days,
            state: LifecycleState::default(),
            origin: RecordOrigin::Imported,
        }
    }
}

/// A single flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CardFile", into = "CardFile")]
pub struct Card {
    id: String,
    question: String,
    answer: String,
    schedule: Schedule,
    history: Vec<ReviewRecord>,
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn require(field: &'static str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::EmptyField(field));
    }
    Ok(value.to_string())
}

impl Card {
    /// Creates a new card, reviewable from `now`.
    pub fn new(question: &str, answer: &str, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id: generate_id(),
            question: require("question", question)?,
            answer: require("answer", answer)?,
            schedule: Schedule::Migrated(MemoryState::new(now)),
            history: Vec::new(),
        })
    }

    /// Builds a card from already persisted parts, e.g. when importing.
    pub fn from_parts(
        id: &str,
        question: &str,
        answer: &str,
        schedule: Schedule,
        history: Vec<ReviewRecord>,
    ) -> Result<Self> {
        Ok(Self {
            id: require("card id", id)?,
            question: require("question", question)?,
            answer: require("answer", answer)?,
            schedule,
            history,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn history(&self) -> &[ReviewRecord] {
        &self.history
    }

    /// Memory state, if the card has been migrated to the current model.
    pub fn memory(&self) -> Option<&MemoryState> {
        match &self.schedule {
            Schedule::Migrated(state) => Some(state),
            Schedule::Unmigrated => None,
        }
    }

    pub fn is_migrated(&self) -> bool {
        self.memory().is_some()
    }

    pub fn last_review(&self) -> Option<DateTime<Utc>> {
        self.memory().map(|m| m.last_review)
    }

    pub fn due(&self) -> Option<DateTime<Utc>> {
        self.memory().and_then(|m| m.due)
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.memory().map(|m| m.state).unwrap_or_default()
    }

    /// `due` if set, otherwise the last review. `None` for unmigrated cards.
    pub fn next_review_at(&self) -> Option<DateTime<Utc>> {
        self.memory().map(MemoryState::next_review_at)
    }

    /// Whether the card can be reviewed at `now`. Unmigrated cards are always due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_review_at() {
            Some(at) => at <= now,
            None => true,
        }
    }

    /// Returns a copy with new question and answer text; memory state is kept.
    pub fn edit(&self, question: &str, answer: &str) -> Result<Self> {
        Ok(Self {
            question: require("question", question)?,
            answer: require("answer", answer)?,
            ..self.clone()
        })
    }

    pub(crate) fn with_schedule(&self, schedule: Schedule) -> Self {
        Self {
            schedule,
            ..self.clone()
        }
    }

    pub(crate) fn push_record(&mut self, record: ReviewRecord) {
        self.history.push(record);
    }
}

/// On-disk shape of a card. Memory state is stored flat; a card without
/// `last_review` is read back as unmigrated.
#[derive(Serialize, Deserialize)]
struct CardFile {
    id: String,
    question: String,
    answer: String,
    #[serde(default)]
    history: Vec<ReviewRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    due: Option<DateTime<Utc>>,
    #[serde(default)]
    stability: f64,
    #[serde(default)]
    difficulty: f64,
    #[serde(default)]
    elapsed_days: u64,
    #[serde(default)]
    scheduled_days: u64,
    #[serde(default)]
    reps: u64,
    #[serde(default)]
    lapses: u64,
    #[serde(default)]
    state: LifecycleState,
    #[serde(default, alias = "reviewed_at", skip_serializing_if = "Option::is_none")]
    last_review: Option<DateTime<Utc>>,
}

impl TryFrom<CardFile> for Card {
    type Error = Error;

    fn try_from(file: CardFile) -> Result<Self> {
        let schedule = match unset_if_zero(file.last_review) {
            Some(last_review) => Schedule::Migrated(MemoryState {
                stability: file.stability,
                difficulty: file.difficulty,
                elapsed_days: file.elapsed_days,
                scheduled_days: file.scheduled_days,
                reps: file.reps,
                lapses: file.lapses,
                state: file.state,
                due: unset_if_zero(file.due),
                last_review,
            }),
            None => Schedule::Unmigrated,
        };
        Card::from_parts(&file.id, &file.question, &file.answer, schedule, file.history)
    }
}

/// Older deck files write never-set instants as year 1 instead of omitting them.
fn unset_if_zero(at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    at.filter(|at| at.year() > 1)
}

impl From<Card> for CardFile {
    fn from(card: Card) -> Self {
        let state = card.memory().copied();
        CardFile {
            due: state.and_then(|m| m.due),
            stability: state.map_or(0.0, |m| m.stability),
            difficulty: state.map_or(0.0, |m| m.difficulty),
            elapsed_days: state.map_or(0, |m| m.elapsed_days),
            scheduled_days: state.map_or(0, |m| m.scheduled_days),
            reps: state.map_or(0, |m| m.reps),
            lapses: state.map_or(0, |m| m.lapses),
            state: state.map(|m| m.state).unwrap_or_default(),
            last_review: state.map(|m| m.last_review),
            id: card.id,
            question: card.question,
            answer: card.answer,
            history: card.history,
        }
    }
}

/// Statistics for a deck.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DeckStats {
    pub total_cards: usize,
    pub new_cards: usize,
    pub learning_cards: usize,
    pub review_cards: usize,
    pub due_cards: usize,
}

/// A collection of flashcards.
///
/// Every mutation returns a new deck; persisting it is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    #[serde(skip)]
    id: String,
    name: String,
    #[serde(default, deserialize_with = "unique_cards")]
    cards: Vec<Card>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_studied: Option<DateTime<Utc>>,
}

impl Deck {
    pub fn new(name: &str) -> Result<Self> {
        Self::with_cards(name, Vec::new())
    }

    /// Creates a deck keyed by the slug of `name`. Later cards replace
    /// earlier ones sharing the same id.
    pub fn with_cards(name: &str, cards: Vec<Card>) -> Result<Self> {
        let name = require("deck name", name)?;
        let mut deck = Self {
            id: slugify(&name),
            name,
            cards: Vec::with_capacity(cards.len()),
            last_studied: None,
        };
        for card in cards {
            deck.upsert(card);
        }
        Ok(deck)
    }

    /// Storage key, derived from the name at creation and never changed.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_studied(&self) -> Option<DateTime<Utc>> {
        self.last_studied
    }

    pub fn total(&self) -> usize {
        self.cards.len()
    }

    pub fn find_card(&self, id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == id)
    }

    /// All cards, most recently reviewed first, ties ordered by question.
    pub fn list(&self) -> Vec<&Card> {
        let mut cards: Vec<&Card> = self.cards.iter().collect();
        cards.sort_by(|a, b| {
            b.last_review()
                .cmp(&a.last_review())
                .then_with(|| a.question.cmp(&b.question))
        });
        cards
    }

    /// Cards reviewable at `now`, in the same order as [`Deck::list`].
    pub fn due_cards(&self, now: DateTime<Utc>) -> Vec<&Card> {
        self.list().into_iter().filter(|c| c.is_due(now)).collect()
    }

    pub fn has_due_cards(&self, now: DateTime<Utc>) -> bool {
        self.cards.iter().any(|c| c.is_due(now))
    }

    /// Adds a new card and returns the updated deck together with it.
    pub fn add(&self, question: &str, answer: &str, now: DateTime<Utc>) -> Result<(Deck, Card)> {
        let mut card = Card::new(question, answer, now)?;
        while self.find_card(&card.id).is_some() {
            card.id = generate_id();
        }

        let mut deck = self.clone();
        deck.cards.push(card.clone());
        Ok((deck, card))
    }

    /// Replaces the card with the same id. Unknown cards leave the deck as is.
    pub fn change(&self, card: Card) -> Deck {
        let mut deck = self.clone();
        if let Some(slot) = deck.cards.iter_mut().find(|c| c.id == card.id) {
            *slot = card;
        }
        deck
    }

    pub fn remove(&self, card: &Card) -> Result<Deck> {
        let index = self
            .cards
            .iter()
            .position(|c| c.id == card.id)
            .ok_or_else(|| Error::CardNotFound(card.id.clone()))?;

        let mut deck = self.clone();
        deck.cards.remove(index);
        Ok(deck)
    }

    /// Changes the display name. The storage key stays the same.
    pub fn rename(&self, name: &str) -> Result<Deck> {
        Ok(Deck {
            name: require("deck name", name)?,
            ..self.clone()
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::EmptyField("deck name"));
        }
        if self.id.is_empty() {
            return Err(Error::EmptyField("deck id"));
        }
        Ok(())
    }

    pub fn stats(&self, now: DateTime<Utc>) -> DeckStats {
        let mut stats = DeckStats {
            total_cards: self.cards.len(),
            ..Default::default()
        };

        for card in &self.cards {
            match card.lifecycle_state() {
                LifecycleState::New => stats.new_cards += 1,
                LifecycleState::Learning | LifecycleState::Relearning => stats.learning_cards += 1,
                LifecycleState::Review => stats.review_cards += 1,
            }

            if card.is_due(now) {
                stats.due_cards += 1;
            }
        }

        stats
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.last_studied = Some(now);
    }

    pub(crate) fn upsert(&mut self, card: Card) {
        match self.cards.iter_mut().find(|c| c.id == card.id) {
            Some(slot) => *slot = card,
            None => self.cards.push(card),
        }
    }
}

/// Deck files must not repeat a card id.
fn unique_cards<'de, D>(deserializer: D) -> std::result::Result<Vec<Card>, D::Error>
where
    D: Deserializer<'de>,
{
    let cards = Vec::<Card>::deserialize(deserializer)?;
    if let Some(id) = first_duplicate(&cards) {
        return Err(serde::de::Error::custom(format!("duplicate card id '{}'", id)));
    }
    Ok(cards)
}

fn first_duplicate(cards: &[Card]) -> Option<&str> {
    let mut seen = HashSet::new();
    cards
        .iter()
        .map(|c| c.id.as_str())
        .find(|id| !seen.insert(*id))
}

/// Convert a deck name to a file-system friendly key.
pub fn slugify(name: &str) -> String {
    let slug = name
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join("-");

    if slug.is_empty() {
        "deck".to_string()
    } else {
        slug
    }
}
