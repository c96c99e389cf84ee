use crate::card::Card;
use crate::card::Deck;
use crate::card::Review;
use crate::clock::local_date;
use crate::scheduler;
use crate::scheduler::Rating;
use crate::scheduler::DEFAULT_EASE_FACTOR;
use std::collections::HashSet;
use std::fmt;
use time::Duration;
use time::OffsetDateTime;

const RECENT_DAYS: i64 = 7;
const TOP_CARDS: usize = 5;
const QUESTION_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub total: usize,
    pub due: usize,
    pub new: usize,
    pub mastered: usize,
    pub reviews: usize,
    pub retention_rate: f64,
    /// Mean ease factor of the cards that have been reviewed.
    pub average_ease: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeckLine {
    pub name: String,
    pub cards: usize,
    pub due: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverallStats {
    pub overview: Overview,
    pub decks: Vec<DeckLine>,
    pub detail: Option<OverallDetail>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverallDetail {
    /// Review counts indexed by rating value - 1.
    pub ratings: [usize; 4],
    pub intervals: IntervalDistribution,
    pub recent_reviews: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntervalDistribution {
    pub one_day: usize,
    pub under_a_week: usize,
    pub under_a_month: usize,
    pub longer: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeckStats {
    pub deck: Deck,
    pub overview: Overview,
    pub detail: Option<DeckDetail>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeckDetail {
    pub difficult: Vec<DifficultCard>,
    pub due_soon: Vec<UpcomingCard>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DifficultCard {
    pub question: String,
    pub ease_factor: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpcomingCard {
    pub question: String,
    pub days_until: i64,
}

impl Overview {
    pub fn new(cards: &[&Card], reviews: usize, now: OffsetDateTime) -> Self {
        let reviewed: Vec<&&Card> = cards.iter().filter(|c| c.total_reviews > 0).collect();

        let average_ease = if reviewed.is_empty() {
            DEFAULT_EASE_FACTOR
        } else {
            reviewed.iter().map(|c| c.ease_factor).sum::<f64>() / reviewed.len() as f64
        };

        Self {
            total: cards.len(),
            due: cards.iter().filter(|c| scheduler::is_due(c, now)).count(),
            new: cards.iter().filter(|c| c.total_reviews == 0).count(),
            mastered: cards.iter().filter(|c| c.is_mastered()).count(),
            reviews,
            retention_rate: scheduler::retention_rate(cards.iter().copied()),
            average_ease,
        }
    }
}

impl IntervalDistribution {
    fn new(cards: &[Card]) -> Self {
        let mut distribution = Self::default();

        for card in cards {
            match card.interval {
                1 => distribution.one_day += 1,
                i if i <= 6 => distribution.under_a_week += 1,
                i if i <= 21 => distribution.under_a_month += 1,
                _ => distribution.longer += 1,
            }
        }

        distribution
    }
}

pub fn overall(
    decks: &[Deck],
    cards: &[Card],
    reviews: &[Review],
    now: OffsetDateTime,
    detailed: bool,
) -> OverallStats {
    let all: Vec<&Card> = cards.iter().collect();

    let decks = decks
        .iter()
        .map(|deck| {
            let in_deck: Vec<&Card> = cards.iter().filter(|c| c.deck_id == deck.id).collect();

            DeckLine {
                name: deck.name.clone(),
                cards: in_deck.len(),
                due: in_deck.iter().filter(|c| scheduler::is_due(c, now)).count(),
            }
        })
        .collect();

    let detail = detailed.then(|| {
        let mut ratings = [0; 4];
        for review in reviews {
            ratings[usize::from(review.rating.value() - 1)] += 1;
        }

        let since = now - Duration::days(RECENT_DAYS);

        OverallDetail {
            ratings,
            intervals: IntervalDistribution::new(cards),
            recent_reviews: reviews.iter().filter(|r| r.reviewed_at >= since).count(),
        }
    });

    OverallStats {
        overview: Overview::new(&all, reviews.len(), now),
        decks,
        detail,
    }
}

pub fn deck(
    deck: Deck,
    cards: &[Card],
    reviews: &[Review],
    now: OffsetDateTime,
    detailed: bool,
) -> DeckStats {
    let in_deck: Vec<&Card> = cards.iter().filter(|c| c.deck_id == deck.id).collect();
    let ids: HashSet<u64> = in_deck.iter().map(|c| c.id).collect();
    let review_count = reviews.iter().filter(|r| ids.contains(&r.card_id)).count();

    let detail = detailed.then(|| {
        let mut difficult: Vec<&Card> = in_deck
            .iter()
            .copied()
            .filter(|c| c.total_reviews > 0)
            .collect();
        difficult.sort_by(scheduler::by_difficulty);

        let mut upcoming: Vec<(&Card, OffsetDateTime)> = in_deck
            .iter()
            .filter_map(|c| c.next_review.filter(|&next| next > now).map(|next| (*c, next)))
            .collect();
        upcoming.sort_by_key(|&(_, next)| next);

        DeckDetail {
            difficult: difficult
                .into_iter()
                .take(TOP_CARDS)
                .map(|c| DifficultCard {
                    question: preview(&c.question),
                    ease_factor: c.ease_factor,
                    success_rate: percentage(c.correct_reviews as usize, c.total_reviews as usize),
                })
                .collect(),
            due_soon: upcoming
                .into_iter()
                .take(TOP_CARDS)
                .map(|(c, next)| UpcomingCard {
                    question: preview(&c.question),
                    days_until: days_until(now, next),
                })
                .collect(),
        }
    });

    DeckStats {
        overview: Overview::new(&in_deck, review_count, now),
        deck,
        detail,
    }
}

fn days_until(now: OffsetDateTime, then: OffsetDateTime) -> i64 {
    let day = Duration::DAY.whole_seconds() as f64;

    ((then - now).as_seconds_f64() / day).ceil() as i64
}

pub fn preview(question: &str) -> String {
    let question = question.replace('\n', " ");

    if question.chars().count() > QUESTION_PREVIEW_CHARS {
        let truncated: String = question.chars().take(QUESTION_PREVIEW_CHARS).collect();
        format!("{truncated}...")
    } else {
        question
    }
}

pub fn percentage(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

fn plural(n: i64) -> &'static str {
    if n == 1 { "" } else { "s" }
}

impl fmt::Display for Overview {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "  Total cards: {}", self.total)?;
        writeln!(f, "  Due for review: {}", self.due)?;
        writeln!(f, "  New cards: {}", self.new)?;
        writeln!(
            f,
            "  Mastered: {} ({:.1}%)",
            self.mastered,
            percentage(self.mastered, self.total)
        )?;
        writeln!(f, "  Total reviews: {}", self.reviews)?;
        writeln!(f, "  Retention rate: {:.1}%", self.retention_rate)?;
        writeln!(f, "  Average ease: {:.2}", self.average_ease)
    }
}

impl fmt::Display for OverallStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Cards")?;
        writeln!(f, "{}", self.overview)?;

        writeln!(f, "Decks")?;
        writeln!(f, "  Total decks: {}", self.decks.len())?;
        for deck in &self.decks {
            writeln!(f, "  - {}: {} cards ({} due)", deck.name, deck.cards, deck.due)?;
        }

        if let Some(detail) = &self.detail {
            writeln!(f)?;
            write!(f, "{detail}")?;
        }

        Ok(())
    }
}

impl fmt::Display for OverallDetail {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let total: usize = self.ratings.iter().sum();

        writeln!(f, "Review distribution")?;
        for rating in Rating::ALL {
            let count = self.ratings[usize::from(rating.value() - 1)];
            writeln!(
                f,
                "  {rating}: {count} ({:.1}%)",
                percentage(count, total)
            )?;
        }

        writeln!(f, "Interval distribution")?;
        writeln!(f, "  1 day: {} cards", self.intervals.one_day)?;
        writeln!(f, "  2-6 days: {} cards", self.intervals.under_a_week)?;
        writeln!(f, "  1-3 weeks: {} cards", self.intervals.under_a_month)?;
        writeln!(f, "  1+ months: {} cards", self.intervals.longer)?;

        writeln!(f, "Last {RECENT_DAYS} days: {} reviews", self.recent_reviews)
    }
}

impl fmt::Display for DeckStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.deck.name)?;
        if let Some(description) = &self.deck.description {
            writeln!(f, "  {description}")?;
        }
        writeln!(f, "  Created: {}", local_date(self.deck.created_at))?;
        writeln!(f)?;
        write!(f, "{}", self.overview)?;

        if let Some(detail) = &self.detail {
            if !detail.difficult.is_empty() {
                writeln!(f)?;
                writeln!(f, "Most difficult")?;
                for (i, card) in detail.difficult.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, card.question)?;
                    writeln!(
                        f,
                        "     Ease: {:.2}, Success: {:.1}%",
                        card.ease_factor, card.success_rate
                    )?;
                }
            }

            if !detail.due_soon.is_empty() {
                writeln!(f)?;
                writeln!(f, "Due soon")?;
                for (i, card) in detail.due_soon.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, card.question)?;
                    writeln!(
                        f,
                        "     Due in {} day{}",
                        card.days_until,
                        plural(card.days_until)
                    )?;
                }
            }
        }

        Ok(())
    }
}
