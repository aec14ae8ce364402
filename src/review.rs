//! Review sessions over the due cards of a deck.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::models::{Card, Deck, Rating};
use crate::scheduler::Scheduler;

/// Shuffles cards with the thread-local RNG.
pub fn shuffle_cards(cards: &mut [Card]) {
    cards.shuffle(&mut rand::thread_rng());
}

/// One pass through the due cards of a deck.
///
/// Cards rated `Again` go back to the end of the queue; any other rating
/// completes them. The session is finished once the queue is empty.
pub struct Review {
    deck: Deck,
    queue: VecDeque<Card>,
    completed: usize,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
}

impl Review {
    /// Starts a session with the cards of `deck` due now, ordered by `shuffle`.
    pub fn new<F>(deck: Deck, scheduler: Scheduler, clock: Arc<dyn Clock>, shuffle: F) -> Self
    where
        F: FnOnce(&mut [Card]),
    {
        let mut due: Vec<Card> = deck.due_cards(clock.now()).into_iter().cloned().collect();
        shuffle(&mut due);
        debug!(deck = deck.name(), due = due.len(), "review started");

        Self {
            deck,
            queue: due.into(),
            completed: 0,
            scheduler,
            clock,
        }
    }

    /// The deck as updated by every rating so far.
    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn into_deck(self) -> Deck {
        self.deck
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Cards left to review.
    pub fn left(&self) -> usize {
        self.queue.len()
    }

    pub fn total(&self) -> usize {
        self.completed + self.left()
    }

    /// 1-based position of the current card, never past `total`.
    pub fn current(&self) -> usize {
        if self.completed == self.total() {
            self.completed
        } else {
            self.completed + 1
        }
    }

    pub fn is_finished(&self) -> bool {
        self.queue.is_empty()
    }

    /// The card under review.
    pub fn card(&self) -> Result<&Card> {
        self.queue.front().ok_or(Error::EmptyQueue)
    }

    pub fn queue(&self) -> impl Iterator<Item = &Card> {
        self.queue.iter()
    }

    /// Rates the current card and folds the result back into the deck.
    pub fn rate(&mut self, rating: Rating) -> Result<Card> {
        let card = self.queue.pop_front().ok_or(Error::EmptyQueue)?;
        let now = self.clock.now();

        let card = self.scheduler.schedule(&card, rating, now);
        self.deck = self.deck.change(card.clone());
        self.deck.touch(now);

        if rating == Rating::Again {
            self.queue.push_back(card.clone());
        } else {
            self.completed += 1;
        }

        debug!(
            card = card.id(),
            rating = rating.name(),
            completed = self.completed,
            left = self.queue.len(),
            "card rated"
        );
        Ok(card)
    }

    /// Moves the current card to the end of the queue.
    pub fn skip(&mut self) -> Result<()> {
        let card = self.queue.pop_front().ok_or(Error::EmptyQueue)?;
        self.queue.push_back(card);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{LifecycleState, Schedule};
    use crate::scheduler::tests::StubModel;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap()
    }

    fn deck_with(questions: &[&str]) -> Deck {
        questions
            .iter()
            .fold(Deck::new("Capitals").unwrap(), |deck, q| deck.add(q, "answer", t0()).unwrap().0)
    }

    fn start(deck: Deck) -> (Review, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0() + Duration::minutes(1)));
        let review = Review::new(deck, Scheduler::new(StubModel), clock.clone(), |_| {});
        (review, clock)
    }

    fn queue_ids(review: &Review) -> Vec<String> {
        review.queue().map(|c| c.id().to_string()).collect()
    }

    #[test]
    fn starts_with_due_cards_only() {
        let deck = deck_with(&["a", "b"]);
        let (deck, later) = deck.add("c", "answer", t0() + Duration::days(1)).unwrap();

        let (review, _) = start(deck);
        assert_eq!(review.total(), 2);
        assert!(review.queue().all(|c| c.id() != later.id()));
        assert_eq!(review.current(), 1);
    }

    #[test]
    fn shuffle_is_applied_to_the_queue() {
        let deck = deck_with(&["a", "b", "c"]);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0()));

        let plain = Review::new(deck.clone(), Scheduler::default(), clock.clone(), |_| {});
        let reversed = Review::new(deck, Scheduler::default(), clock, |cards| cards.reverse());

        let mut expected = queue_ids(&plain);
        expected.reverse();
        assert_eq!(queue_ids(&reversed), expected);
    }

    #[test]
    fn rating_the_only_card_finishes_the_session() {
        let (mut review, clock) = start(deck_with(&["What is 2+2?"]));

        let rated = review.rate(Rating::Good).unwrap();
        assert!(review.is_finished());
        assert_eq!(review.completed(), 1);
        assert_eq!(review.total(), 1);
        assert_eq!(review.current(), review.total());

        let stored = review.deck().find_card(rated.id()).unwrap();
        assert_eq!(stored, &rated);
        assert_eq!(stored.history().len(), 1);
        assert_eq!(review.deck().last_studied(), Some(clock.now()));
    }

    #[test]
    fn again_moves_card_to_the_tail() {
        let (mut review, _) = start(deck_with(&["a", "b"]));
        let first = review.card().unwrap().id().to_string();

        let rated = review.rate(Rating::Again).unwrap();
        assert_eq!(review.left(), 2);
        assert_eq!(review.completed(), 0);
        assert_eq!(review.total(), 2);
        assert_eq!(queue_ids(&review).last(), Some(&first));
        assert_eq!(review.queue().last(), Some(&rated));
        assert_eq!(rated.history().len(), 1);
    }

    #[test]
    fn non_again_ratings_complete_exactly_one_card() {
        for rating in [Rating::Hard, Rating::Good, Rating::Easy] {
            let (mut review, _) = start(deck_with(&["a", "b", "c"]));
            review.rate(rating).unwrap();
            assert_eq!(review.left(), 2);
            assert_eq!(review.completed(), 1);
            assert_eq!(review.total(), 3);
            assert_eq!(review.current(), 2);
        }
    }

    #[test]
    fn skip_only_rotates_the_queue() {
        let (mut review, _) = start(deck_with(&["a", "b", "c"]));
        let before = queue_ids(&review);
        let deck_before = review.deck().clone();

        review.skip().unwrap();

        let after = queue_ids(&review);
        assert_eq!(after.len(), before.len());
        assert_eq!(after[..2], before[1..]);
        assert_eq!(after[2], before[0]);
        assert_eq!(review.completed(), 0);
        assert_eq!(review.deck(), &deck_before);
    }

    #[test]
    fn finished_session_rejects_transitions() {
        let (mut review, _) = start(Deck::new("Empty").unwrap());
        assert!(review.is_finished());
        assert_eq!(review.current(), 0);
        assert!(matches!(review.rate(Rating::Good), Err(Error::EmptyQueue)));
        assert!(matches!(review.skip(), Err(Error::EmptyQueue)));
        assert!(matches!(review.card(), Err(Error::EmptyQueue)));
    }

    #[test]
    fn lapsed_card_is_reviewed_again_until_recalled() {
        let (mut review, clock) = start(deck_with(&["a"]));

        review.rate(Rating::Again).unwrap();
        clock.advance(Duration::minutes(5));
        assert_eq!(review.current(), 1);
        let card = review.rate(Rating::Good).unwrap();

        assert!(review.is_finished());
        assert_eq!(card.history().len(), 2);
        assert_eq!(card.lifecycle_state(), LifecycleState::Review);
    }

    #[test]
    fn unmigrated_cards_are_migrated_when_rated() {
        let legacy = Card::from_parts("old", "q", "a", Schedule::Unmigrated, Vec::new()).unwrap();
        let deck = Deck::with_cards("Legacy", vec![legacy]).unwrap();
        let (mut review, _) = start(deck);

        let rated = review.rate(Rating::Good).unwrap();
        assert!(rated.is_migrated());
        assert!(review.deck().find_card("old").unwrap().is_migrated());
    }

    #[test]
    fn into_deck_returns_the_rated_deck() {
        let (mut review, _) = start(deck_with(&["a", "b"]));
        let rated = review.rate(Rating::Easy).unwrap();

        let deck = review.into_deck();
        assert_eq!(deck.total(), 2);
        assert_eq!(deck.find_card(rated.id()), Some(&rated));
    }
}
