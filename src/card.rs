use crate::scheduler;
use crate::scheduler::Rating;
use crate::scheduler::Schedule;
use crate::scheduler::State;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;

/// Interval, in days, from which a card counts as mastered.
pub const MASTERED_INTERVAL: u32 = 21;
const LEARNING_INTERVAL: u32 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: u64,
    pub deck_id: u64,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: Vec<String>,

    pub ease_factor: f64,
    pub interval: u32,
    pub repetitions: u32,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_reviewed: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub next_review: Option<OffsetDateTime>,

    pub total_reviews: u32,
    pub correct_reviews: u32,
    /// Average response time in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_time: Option<u32>,
}

/// A card that hasn't been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCard {
    pub deck_id: u64,
    pub question: String,
    pub answer: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub card_id: u64,
    pub rating: Rating,
    /// Seconds taken to answer.
    pub response_time: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub reviewed_at: OffsetDateTime,
}

/// Which cards a listing shows. Every criterion that is set has to match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardFilter {
    pub deck_id: Option<u64>,
    pub tag: Option<String>,
    pub due: bool,
    pub new: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Review,
    Learning,
    Mastered,
}

impl Card {
    pub fn state(&self) -> State {
        State {
            ease_factor: self.ease_factor,
            interval: self.interval,
            repetitions: self.repetitions,
        }
    }

    pub fn apply(&mut self, schedule: &Schedule) {
        self.ease_factor = schedule.ease_factor;
        self.interval = schedule.interval;
        self.repetitions = schedule.repetitions;
        self.next_review = Some(schedule.next_review);
    }

    pub fn status(&self) -> Status {
        if self.total_reviews == 0 {
            Status::New
        } else if self.interval >= MASTERED_INTERVAL {
            Status::Mastered
        } else if self.interval >= LEARNING_INTERVAL {
            Status::Learning
        } else {
            Status::Review
        }
    }

    pub fn is_mastered(&self) -> bool {
        self.interval >= MASTERED_INTERVAL
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn record_response_time(&mut self, secs: u32) {
        self.average_time = Some(match self.average_time {
            Some(avg) => ((f64::from(avg) + f64::from(secs)) / 2.0).round() as u32,
            None => secs,
        });
    }
}

impl CardFilter {
    pub fn matches(&self, card: &Card, now: OffsetDateTime) -> bool {
        self.deck_id.is_none_or(|deck_id| card.deck_id == deck_id)
            && self.tag.as_deref().is_none_or(|tag| card.has_tag(tag))
            && (!self.due || scheduler::is_due(card, now))
            && (!self.new || card.total_reviews == 0)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Status::New => "New",
            Status::Review => "Review",
            Status::Learning => "Learning",
            Status::Mastered => "Mastered",
        };

        write!(f, "{s}")
    }
}

/// Splits a comma separated list of tags, dropping empty entries.
pub fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}
