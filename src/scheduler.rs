//! SuperMemo SM-2 scheduling.
//!
//! Everything here is pure: functions take snapshots plus the current time and hand back new
//! values, leaving storage to the caller.

use crate::card::Card;
use serde::Deserialize;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;
use time::Duration;
use time::OffsetDateTime;

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;

const FIRST_INTERVAL: u32 = 1;
const SECOND_INTERVAL: u32 = 6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("invalid rating {0}, expected 1 (again) to 4 (easy)")]
    InvalidRating(u8),
    #[error("invalid card state: {0}")]
    InvalidState(String),
    #[error("next review {interval} days from now is out of range")]
    OutOfRange { interval: u32 },
}

/// How well a card was recalled, from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Rating {
    /// Complete failure.
    Again = 1,
    /// Recalled with difficulty.
    Hard = 2,
    /// Recalled with some effort.
    Good = 3,
    /// Effortless recall.
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn value(self) -> u8 {
        self as u8
    }

    /// Whether the rating continues the run of successful repetitions.
    pub fn is_success(self) -> bool {
        self >= Rating::Good
    }

    fn ease_adjustment(self) -> f64 {
        let distance = 5.0 - f64::from(self.value());

        0.1 - distance * (0.08 + distance * 0.02)
    }
}

impl TryFrom<u8> for Rating {
    type Error = SchedulerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Rating::Again),
            2 => Ok(Rating::Hard),
            3 => Ok(Rating::Good),
            4 => Ok(Rating::Easy),
            _ => Err(SchedulerError::InvalidRating(value)),
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Rating::Again => "Again",
            Rating::Hard => "Hard",
            Rating::Good => "Good",
            Rating::Easy => "Easy",
        };

        write!(f, "{s}")
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.value()
    }
}

/// The part of a card that scheduling reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct State {
    pub ease_factor: f64,
    pub interval: u32,
    pub repetitions: u32,
}

/// The result of scheduling a card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub ease_factor: f64,
    pub interval: u32,
    pub repetitions: u32,
    pub next_review: OffsetDateTime,
}

impl State {
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if !self.ease_factor.is_finite() || self.ease_factor <= 0.0 {
            return Err(SchedulerError::InvalidState(format!(
                "ease factor must be a positive number, given {}",
                self.ease_factor
            )));
        }
        if self.interval == 0 && self.repetitions > 0 {
            return Err(SchedulerError::InvalidState(format!(
                "interval must be at least one day after {} repetitions",
                self.repetitions
            )));
        }

        Ok(())
    }
}

/// Schedule for a card that has just been created.
pub fn new_card_schedule(now: OffsetDateTime) -> Schedule {
    Schedule {
        ease_factor: DEFAULT_EASE_FACTOR,
        interval: FIRST_INTERVAL,
        repetitions: 0,
        next_review: now + Duration::days(FIRST_INTERVAL.into()),
    }
}

/// Computes the state following a review rated `rating`.
///
/// Interval growth uses the ease factor the card had going into the review; the adjusted ease
/// factor only applies from the next review onwards.
pub fn schedule_next(
    state: &State,
    rating: Rating,
    now: OffsetDateTime,
) -> Result<Schedule, SchedulerError> {
    state.validate()?;

    let (interval, repetitions) = if rating.is_success() {
        let interval = match state.repetitions {
            0 => FIRST_INTERVAL,
            1 => SECOND_INTERVAL,
            _ => ((f64::from(state.interval) * state.ease_factor).round() as u32).max(FIRST_INTERVAL),
        };

        (interval, state.repetitions.saturating_add(1))
    } else {
        (FIRST_INTERVAL, 0)
    };

    let ease_factor = (state.ease_factor + rating.ease_adjustment()).max(MIN_EASE_FACTOR);

    let next_review = now
        .checked_add(Duration::days(interval.into()))
        .ok_or(SchedulerError::OutOfRange { interval })?;

    Ok(Schedule {
        ease_factor,
        interval,
        repetitions,
        next_review,
    })
}

/// Applies a review to a card, returning the updated card. The given card is left untouched.
pub fn review(card: &Card, rating: Rating, now: OffsetDateTime) -> Result<Card, SchedulerError> {
    if card.correct_reviews > card.total_reviews {
        return Err(SchedulerError::InvalidState(format!(
            "{} correct reviews out of {} total",
            card.correct_reviews, card.total_reviews
        )));
    }

    let schedule = schedule_next(&card.state(), rating, now)?;

    let mut reviewed = card.clone();
    reviewed.apply(&schedule);
    reviewed.last_reviewed = Some(now);
    reviewed.total_reviews = card.total_reviews.saturating_add(1);
    if rating.is_success() {
        reviewed.correct_reviews = card.correct_reviews.saturating_add(1);
    }

    Ok(reviewed)
}

/// A card is due once its review time has come. Cards that were never scheduled are always due.
pub fn is_due(card: &Card, now: OffsetDateTime) -> bool {
    match card.next_review {
        Some(next_review) => now >= next_review,
        None => true,
    }
}

fn overdue_by(card: &Card, now: OffsetDateTime) -> Duration {
    card.next_review
        .map_or(Duration::ZERO, |next_review| now - next_review)
}

/// Returns the due cards, most overdue first. Equally overdue cards are ordered by ascending ease
/// factor so harder cards come up first. The sort is stable, so cards tied on both keys keep the
/// order they were given in.
pub fn select_due(cards: &[Card], now: OffsetDateTime) -> Vec<&Card> {
    let mut due: Vec<&Card> = cards.iter().filter(|card| is_due(card, now)).collect();

    due.sort_by(|a, b| {
        overdue_by(b, now)
            .cmp(&overdue_by(a, now))
            .then_with(|| a.ease_factor.total_cmp(&b.ease_factor))
    });

    due
}

/// Percentage of correct reviews pooled over every card that has been reviewed.
pub fn retention_rate<'a>(cards: impl IntoIterator<Item = &'a Card>) -> f64 {
    let (correct, total) = cards
        .into_iter()
        .filter(|card| card.total_reviews > 0)
        .fold((0u64, 0u64), |(correct, total), card| {
            (
                correct + u64::from(card.correct_reviews),
                total + u64::from(card.total_reviews),
            )
        });

    if total == 0 {
        return 0.0;
    }

    correct as f64 / total as f64 * 100.0
}

/// Orders cards by ease factor, hardest first.
pub fn by_difficulty(a: &&Card, b: &&Card) -> Ordering {
    a.ease_factor.total_cmp(&b.ease_factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::tests::card;
    use proptest::prelude::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-03-10 12:00 UTC);

    fn state(ease_factor: f64, interval: u32, repetitions: u32) -> State {
        State {
            ease_factor,
            interval,
            repetitions,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn new_card() {
        let schedule = new_card_schedule(NOW);

        assert_eq!(schedule.interval, 1);
        assert_eq!(schedule.repetitions, 0);
        assert_eq!(schedule.ease_factor, 2.5);
        assert_eq!(schedule.next_review, datetime!(2024-03-11 12:00 UTC));
    }

    #[test]
    fn good_on_new_card() {
        let next = schedule_next(&state(2.5, 1, 0), Rating::Good, NOW).unwrap();

        assert_eq!(next.repetitions, 1);
        assert_eq!(next.interval, 1);
        assert_close(next.ease_factor, 2.36);
        assert_eq!(next.next_review, datetime!(2024-03-11 12:00 UTC));
    }

    #[test]
    fn easy_on_new_card_keeps_ease() {
        let next = schedule_next(&state(2.5, 1, 0), Rating::Easy, NOW).unwrap();

        assert_eq!(next.repetitions, 1);
        assert_eq!(next.interval, 1);
        assert_close(next.ease_factor, 2.5);
    }

    #[test]
    fn second_success_is_six_days() {
        let next = schedule_next(&state(2.5, 1, 1), Rating::Good, NOW).unwrap();

        assert_eq!(next.repetitions, 2);
        assert_eq!(next.interval, 6);
        assert_eq!(next.next_review, datetime!(2024-03-16 12:00 UTC));
    }

    #[test]
    fn third_success_uses_ease_before_adjustment() {
        let next = schedule_next(&state(2.5, 6, 2), Rating::Good, NOW).unwrap();

        assert_eq!(next.repetitions, 3);
        // 6 * 2.36 would round to 14
        assert_eq!(next.interval, 15);
        assert_close(next.ease_factor, 2.36);
    }

    #[test]
    fn again_resets_and_clamps_ease() {
        let next = schedule_next(&state(1.3, 10, 3), Rating::Again, NOW).unwrap();

        assert_eq!(next.repetitions, 0);
        assert_eq!(next.interval, 1);
        assert_eq!(next.ease_factor, MIN_EASE_FACTOR);
    }

    #[test]
    fn hard_is_a_failure() {
        let next = schedule_next(&state(2.5, 40, 5), Rating::Hard, NOW).unwrap();

        assert_eq!(next.repetitions, 0);
        assert_eq!(next.interval, 1);
        // 0.1 - 3 * (0.08 + 3 * 0.02)
        assert_close(next.ease_factor, 2.18);
    }

    #[test]
    fn ease_has_no_upper_bound() {
        let next = schedule_next(&state(4.0, 10, 3), Rating::Easy, NOW).unwrap();

        assert_close(next.ease_factor, 4.0);
        assert_eq!(next.interval, 40);
    }

    #[test]
    fn rating_from_number() {
        assert_eq!(Rating::try_from(1), Ok(Rating::Again));
        assert_eq!(Rating::try_from(4), Ok(Rating::Easy));
        assert_eq!(Rating::try_from(0), Err(SchedulerError::InvalidRating(0)));
        assert_eq!(Rating::try_from(5), Err(SchedulerError::InvalidRating(5)));
    }

    #[test]
    fn ratings_display_by_name() {
        let names: Vec<String> = Rating::ALL.iter().map(Rating::to_string).collect();

        assert_eq!(names, ["Again", "Hard", "Good", "Easy"]);
    }

    #[test]
    fn ratings_are_ordered() {
        assert!(Rating::Again < Rating::Hard);
        assert!(Rating::Hard < Rating::Good);
        assert!(Rating::Good < Rating::Easy);
        assert!(!Rating::Hard.is_success());
        assert!(Rating::Good.is_success());
    }

    #[test]
    fn rejects_bad_ease_factor() {
        for ease_factor in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = schedule_next(&state(ease_factor, 1, 0), Rating::Good, NOW);

            assert!(
                matches!(result, Err(SchedulerError::InvalidState(_))),
                "{ease_factor} accepted"
            );
        }
    }

    #[test]
    fn rejects_zero_interval_once_repeated() {
        let result = schedule_next(&state(2.5, 0, 4), Rating::Good, NOW);

        assert!(matches!(result, Err(SchedulerError::InvalidState(_))));
    }

    #[test]
    fn rejects_interval_past_end_of_calendar() {
        let result = schedule_next(&state(2.5, u32::MAX, 5), Rating::Good, NOW);

        assert!(matches!(result, Err(SchedulerError::OutOfRange { .. })));
    }

    #[test]
    fn review_counts_correct_answers() {
        let reviewed = review(&card(1), Rating::Good, NOW).unwrap();

        assert_eq!(reviewed.total_reviews, 1);
        assert_eq!(reviewed.correct_reviews, 1);
        assert_eq!(reviewed.last_reviewed, Some(NOW));
        assert_eq!(reviewed.next_review, Some(datetime!(2024-03-11 12:00 UTC)));

        let reviewed = review(&reviewed, Rating::Hard, NOW).unwrap();

        assert_eq!(reviewed.total_reviews, 2);
        assert_eq!(reviewed.correct_reviews, 1);
        assert_eq!(reviewed.repetitions, 0);
    }

    #[test]
    fn review_leaves_original_untouched() {
        let original = card(1);

        let _ = review(&original, Rating::Easy, NOW).unwrap();

        assert_eq!(original, card(1));
    }

    #[test]
    fn review_rejects_more_correct_than_total() {
        let broken = Card {
            total_reviews: 1,
            correct_reviews: 2,
            ..card(1)
        };

        assert!(matches!(
            review(&broken, Rating::Good, NOW),
            Err(SchedulerError::InvalidState(_))
        ));
    }

    #[test]
    fn unscheduled_card_is_due() {
        assert!(is_due(&card(1), NOW));
    }

    #[test]
    fn due_exactly_at_review_time() {
        let scheduled = |next_review| Card {
            next_review: Some(next_review),
            ..card(1)
        };

        assert!(is_due(&scheduled(NOW), NOW));
        assert!(is_due(&scheduled(NOW - Duration::seconds(1)), NOW));
        assert!(!is_due(&scheduled(NOW + Duration::seconds(1)), NOW));
    }

    #[test]
    fn select_due_orders_by_overdue_then_ease() {
        let cards = vec![
            Card {
                next_review: Some(NOW + Duration::days(1)),
                ..card(1)
            },
            Card {
                next_review: Some(NOW - Duration::days(1)),
                ease_factor: 2.5,
                ..card(2)
            },
            Card {
                next_review: Some(NOW - Duration::days(3)),
                ..card(3)
            },
            Card {
                next_review: Some(NOW - Duration::days(1)),
                ease_factor: 1.7,
                ..card(4)
            },
            Card {
                next_review: None,
                ease_factor: 1.3,
                ..card(5)
            },
            Card {
                next_review: Some(NOW),
                ease_factor: 2.0,
                ..card(6)
            },
        ];

        let ids: Vec<u64> = select_due(&cards, NOW).iter().map(|c| c.id).collect();

        assert_eq!(ids, vec![3, 4, 2, 5, 6]);
    }

    #[test]
    fn select_due_keeps_input_order_for_full_ties() {
        let cards: Vec<Card> = (1..=4).map(card).collect();

        let ids: Vec<u64> = select_due(&cards, NOW).iter().map(|c| c.id).collect();

        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn retention_rate_of_nothing_is_zero() {
        assert_eq!(retention_rate(&Vec::<Card>::new()), 0.0);
        assert_eq!(retention_rate(&[card(1), card(2)]), 0.0);
    }

    #[test]
    fn retention_rate_skips_unreviewed_cards() {
        let cards = [
            Card {
                total_reviews: 10,
                correct_reviews: 8,
                ..card(1)
            },
            card(2),
        ];

        assert_close(retention_rate(&cards), 80.0);
    }

    #[test]
    fn retention_rate_is_pooled() {
        let cards = [
            Card {
                total_reviews: 100,
                correct_reviews: 50,
                ..card(1)
            },
            Card {
                total_reviews: 10,
                correct_reviews: 10,
                ..card(2)
            },
        ];

        // A per-card average would give 75%
        assert_close(retention_rate(&cards), 60.0 / 110.0 * 100.0);
    }

    fn any_rating() -> impl Strategy<Value = Rating> {
        prop::sample::select(Rating::ALL.to_vec())
    }

    fn any_state() -> impl Strategy<Value = State> {
        (1.3f64..5.0, 1u32..10_000, 0u32..100).prop_map(|(ease_factor, interval, repetitions)| {
            state(ease_factor, interval, repetitions)
        })
    }

    proptest! {
        #[test]
        fn ease_never_drops_below_minimum(state in any_state(), rating in any_rating()) {
            let next = schedule_next(&state, rating, NOW).unwrap();

            prop_assert!(next.ease_factor >= MIN_EASE_FACTOR);
        }

        #[test]
        fn failure_always_resets(state in any_state(), rating in prop::sample::select(vec![Rating::Again, Rating::Hard])) {
            let next = schedule_next(&state, rating, NOW).unwrap();

            prop_assert_eq!(next.repetitions, 0);
            prop_assert_eq!(next.interval, 1);
        }

        #[test]
        fn success_grows_interval(state in any_state(), rating in prop::sample::select(vec![Rating::Good, Rating::Easy])) {
            let next = schedule_next(&state, rating, NOW).unwrap();

            let expected = match state.repetitions {
                0 => 1,
                1 => 6,
                _ => (f64::from(state.interval) * state.ease_factor).round() as u32,
            };
            prop_assert_eq!(next.interval, expected);
            prop_assert_eq!(next.repetitions, state.repetitions + 1);
            prop_assert_eq!(next.next_review, NOW + Duration::days(expected.into()));
        }

        #[test]
        fn scheduled_interval_is_at_least_a_day(state in any_state(), rating in any_rating()) {
            let next = schedule_next(&state, rating, NOW).unwrap();

            prop_assert!(next.interval >= 1);
        }

        #[test]
        fn selected_cards_are_due_and_ordered(offsets in prop::collection::vec((prop::option::of(-1000i64..1000), 1.3f64..3.0), 0..30)) {
            let cards: Vec<Card> = offsets
                .iter()
                .enumerate()
                .map(|(i, (offset, ease_factor))| Card {
                    next_review: offset.map(|hours| NOW + Duration::hours(hours)),
                    ease_factor: *ease_factor,
                    ..card(i as u64)
                })
                .collect();

            let due = select_due(&cards, NOW);

            prop_assert_eq!(due.len(), cards.iter().filter(|c| is_due(c, NOW)).count());
            for pair in due.windows(2) {
                let (a, b) = (overdue_by(pair[0], NOW), overdue_by(pair[1], NOW));
                prop_assert!(is_due(pair[0], NOW));
                prop_assert!(a >= b);
                if a == b {
                    prop_assert!(pair[0].ease_factor <= pair[1].ease_factor);
                }
            }
        }
    }
}
