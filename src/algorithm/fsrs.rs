//! FSRS (Free Spaced Repetition Scheduler) memory model.
//!
//! DSR model with 19 weights:
//! - Difficulty (D): how hard the card is, 1-10
//! - Stability (S): days until retrievability drops to 90%
//! - Retrievability (R): probability of recall
//!
//! With short-term scheduling enabled, new and lapsed cards go through
//! minute-scale learning steps before graduating to day intervals.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::MemoryModel;
use crate::error::Result;
use crate::models::{LifecycleState, MemoryState, Rating};
use crate::scheduler::SchedulerConfig;

/// Default FSRS-5 weights.
pub const DEFAULT_WEIGHTS: [f64; 19] = [
    0.40255, 1.18385, 3.173, 15.69105, // w[0-3]: initial stability for Again, Hard, Good, Easy
    7.1949,  // w[4]: initial difficulty base
    0.5345,  // w[5]: initial difficulty modifier
    1.4604,  // w[6]: difficulty delta per grade
    0.0046,  // w[7]: mean reversion weight
    1.54575, // w[8]: stability exp base
    0.1192,  // w[9]: stability decay
    1.01925, // w[10]: retrievability effect
    1.9395,  // w[11]: forget stability base
    0.11,    // w[12]: difficulty on forget
    0.29605, // w[13]: stability on forget
    2.2698,  // w[14]: retrievability on forget
    0.2315,  // w[15]: hard penalty
    2.9898,  // w[16]: easy bonus
    0.51655, // w[17]: short-term stability rate
    0.6621,  // w[18]: short-term stability offset
];

const DECAY: f64 = -0.5;
/// 0.9^(1 / DECAY) - 1, so that R = 90% when t = S.
const FACTOR: f64 = 19.0 / 81.0;

/// (start, end, factor) ranges used to widen the fuzz window.
const FUZZ_RANGES: [(f64, f64, f64); 3] = [(2.5, 7.0, 0.15), (7.0, 20.0, 0.1), (20.0, f64::MAX, 0.05)];

/// FSRS algorithm with configurable parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Fsrs {
    pub request_retention: f64,
    pub maximum_interval: f64,
    pub enable_short_term: bool,
    pub enable_fuzz: bool,
    pub w: [f64; 19],
}

impl Default for Fsrs {
    fn default() -> Self {
        Self::build(&SchedulerConfig::default())
    }
}

enum Step {
    Minutes(i64),
    Days,
}

impl Fsrs {
    /// Builds the model from validated scheduler settings.
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &SchedulerConfig) -> Self {
        let mut w = DEFAULT_WEIGHTS;
        if let Some(weights) = config.weights.as_deref() {
            if weights.len() == w.len() {
                w.copy_from_slice(weights);
            }
        }

        Self {
            request_retention: config.request_retention,
            maximum_interval: config.maximum_interval,
            enable_short_term: config.enable_short_term,
            enable_fuzz: config.enable_fuzz,
            w,
        }
    }

    /// S0(G) = w[G-1]
    fn initial_stability(&self, rating: Rating) -> f64 {
        self.w[rating.value() as usize - 1].max(0.1)
    }

    /// D0(G) = w[4] - e^(w[5] * (G - 1)) + 1
    fn initial_difficulty(&self, rating: Rating) -> f64 {
        let g = rating.value() as f64;
        (self.w[4] - (self.w[5] * (g - 1.0)).exp() + 1.0).clamp(1.0, 10.0)
    }

    /// Linear damping towards 10, then mean reversion towards D0(Easy).
    fn next_difficulty(&self, difficulty: f64, rating: Rating) -> f64 {
        let g = rating.value() as f64;
        let delta = -self.w[6] * (g - 3.0);
        let damped = difficulty + delta * (10.0 - difficulty) / 9.0;
        let reverted = self.w[7] * self.initial_difficulty(Rating::Easy) + (1.0 - self.w[7]) * damped;
        reverted.clamp(1.0, 10.0)
    }

    /// R(t, S) = (1 + FACTOR * t / S)^DECAY
    fn forgetting_curve(&self, elapsed_days: f64, stability: f64) -> f64 {
        if stability <= 0.0 {
            return 0.0;
        }
        (1.0 + FACTOR * elapsed_days / stability).powf(DECAY)
    }

    fn next_recall_stability(&self, difficulty: f64, stability: f64, r: f64, rating: Rating) -> f64 {
        let hard_penalty = if rating == Rating::Hard { self.w[15] } else { 1.0 };
        let easy_bonus = if rating == Rating::Easy { self.w[16] } else { 1.0 };

        stability
            * (1.0
                + self.w[8].exp()
                    * (11.0 - difficulty)
                    * stability.powf(-self.w[9])
                    * (((1.0 - r) * self.w[10]).exp() - 1.0)
                    * hard_penalty
                    * easy_bonus)
    }

    fn next_forget_stability(&self, difficulty: f64, stability: f64, r: f64) -> f64 {
        let s = self.w[11]
            * difficulty.powf(-self.w[12])
            * ((stability + 1.0).powf(self.w[13]) - 1.0)
            * ((1.0 - r) * self.w[14]).exp();
        s.clamp(0.1, stability.max(0.1))
    }

    fn short_term_stability(&self, stability: f64, rating: Rating) -> f64 {
        let g = rating.value() as f64;
        stability * (self.w[17] * (g - 3.0 + self.w[18])).exp()
    }

    /// Days until retrievability reaches the requested retention.
    fn next_interval(&self, stability: f64, elapsed_days: u64, seed: u64) -> u64 {
        let interval = stability / FACTOR * (self.request_retention.powf(1.0 / DECAY) - 1.0);
        let interval = self.apply_fuzz(interval.round(), elapsed_days, seed);
        interval.round().clamp(1.0, self.maximum_interval.max(1.0)) as u64
    }

    fn apply_fuzz(&self, interval: f64, elapsed_days: u64, seed: u64) -> f64 {
        if !self.enable_fuzz || interval < 2.5 {
            return interval;
        }
        let (min_ivl, max_ivl) = fuzz_range(interval, elapsed_days, self.maximum_interval);
        let roll: f64 = StdRng::seed_from_u64(seed).gen();
        (roll * (max_ivl - min_ivl + 1.0) + min_ivl).floor()
    }

    fn step(&self, next: &mut MemoryState, now: DateTime<Utc>, step: Step, seed: u64) {
        match step {
            Step::Minutes(minutes) => {
                next.scheduled_days = 0;
                next.due = Some(now + Duration::minutes(minutes));
            }
            Step::Days => {
                let days = self.next_interval(next.stability, next.elapsed_days, seed);
                next.scheduled_days = days;
                next.due = Some(now + Duration::days(days as i64));
            }
        }
    }
}

impl MemoryModel for Fsrs {
    fn name(&self) -> &'static str {
        "fsrs"
    }

    fn next(&self, state: &MemoryState, rating: Rating, now: DateTime<Utc>) -> MemoryState {
        // A card without stability has never been rated, whatever its label says.
        let phase = if state.stability <= 0.0 {
            LifecycleState::New
        } else {
            state.state
        };
        let elapsed_days = match phase {
            LifecycleState::New => 0,
            _ => (now - state.last_review).num_days().max(0) as u64,
        };

        let mut next = MemoryState {
            elapsed_days,
            reps: state.reps + 1,
            last_review: now,
            ..*state
        };
        let seed = fuzz_seed(now, state);

        let step = match phase {
            LifecycleState::New => {
                next.stability = self.initial_stability(rating);
                next.difficulty = self.initial_difficulty(rating);
                if self.enable_short_term && rating != Rating::Easy {
                    next.state = LifecycleState::Learning;
                    Step::Minutes(match rating {
                        Rating::Again => 1,
                        Rating::Hard => 5,
                        _ => 10,
                    })
                } else {
                    next.state = LifecycleState::Review;
                    Step::Days
                }
            }
            LifecycleState::Learning | LifecycleState::Relearning if self.enable_short_term => {
                next.difficulty = self.next_difficulty(state.difficulty, rating);
                next.stability = self.short_term_stability(state.stability, rating);
                match rating {
                    Rating::Again => Step::Minutes(5),
                    Rating::Hard => Step::Minutes(10),
                    Rating::Good | Rating::Easy => {
                        next.state = LifecycleState::Review;
                        Step::Days
                    }
                }
            }
            _ => {
                let r = self.forgetting_curve(elapsed_days as f64, state.stability);
                next.difficulty = self.next_difficulty(state.difficulty, rating);
                if rating == Rating::Again {
                    next.stability = self.next_forget_stability(state.difficulty, state.stability, r);
                    if phase == LifecycleState::Review {
                        next.lapses += 1;
                    }
                    if self.enable_short_term {
                        next.state = LifecycleState::Relearning;
                        Step::Minutes(5)
                    } else {
                        next.state = LifecycleState::Review;
                        Step::Days
                    }
                } else {
                    next.stability =
                        self.next_recall_stability(state.difficulty, state.stability, r, rating);
                    next.state = LifecycleState::Review;
                    Step::Days
                }
            }
        };

        if rating != Rating::Again {
            next.stability = next.stability.max(state.stability);
        }
        self.step(&mut next, now, step, seed);
        next
    }

    fn retrievability(&self, state: &MemoryState, now: DateTime<Utc>) -> f64 {
        if state.state == LifecycleState::New {
            return 0.0;
        }
        let elapsed = (now - state.last_review).num_seconds().max(0) as f64 / 86_400.0;
        self.forgetting_curve(elapsed, state.stability)
    }
}

fn fuzz_range(interval: f64, elapsed_days: u64, maximum_interval: f64) -> (f64, f64) {
    let mut delta = 1.0;
    for (start, end, factor) in FUZZ_RANGES {
        delta += factor * (interval.min(end) - start).max(0.0);
    }

    let interval = interval.min(maximum_interval);
    let mut min_ivl = (interval - delta).round().max(2.0);
    let max_ivl = (interval + delta).round().min(maximum_interval);
    if interval > elapsed_days as f64 {
        min_ivl = min_ivl.max(elapsed_days as f64 + 1.0);
    }
    (min_ivl.min(max_ivl), max_ivl)
}

/// Seed derived from the review itself, so fuzzing stays reproducible.
fn fuzz_seed(now: DateTime<Utc>, state: &MemoryState) -> u64 {
    (now.timestamp_millis() as u64)
        ^ state.reps.rotate_left(32)
        ^ state.stability.to_bits().rotate_left(17)
}
