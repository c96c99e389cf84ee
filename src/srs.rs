use crate::archive::Archive;
use crate::card::Card;
use crate::card::Deck;
use crate::card::NewCard;
use crate::card::Review;
use crate::scheduler::Rating;
use crate::scheduler::Schedule;
use anyhow::anyhow;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use rusqlite::config::DbConfig;
use rusqlite::params;
use rusqlite::types::Type;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use std::collections::HashMap;
use std::path::Path;
use time::OffsetDateTime;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub const DEFAULT_DECK_NAME: &str = "Default Deck";
const DEFAULT_DECK_DESCRIPTION: &str = "Your first flashcard deck";

const CARD_COLUMNS: &str = "
    Card.id, deckId, question, answer, tags, creationTimestamp,
    easeFactor, intervalDays, repetitions, scheduledForTimestamp, lastReviewTimestamp,
    totalReviews, correctReviews, averageTimeSecs
";

pub struct Srs {
    conn: Connection,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub decks: usize,
    pub cards: usize,
    pub reviews: usize,
    pub skipped_reviews: usize,
}

impl Srs {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(dir) = db_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;

        debug!(path = %db_path.display(), "opened database");

        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;

        conn.execute_batch(include_str!("schema.sql"))?;

        Ok(Self { conn })
    }

    /// Writes a consistent copy of the database to `path`, which must not exist yet.
    pub fn backup_to(&self, path: &Path) -> Result<()> {
        let path = path
            .to_str()
            .ok_or_else(|| anyhow!("backup path {} isn't valid UTF-8", path.display()))?;

        self.conn.execute("VACUUM INTO ?", [path])?;

        Ok(())
    }

    pub fn decks(&self) -> Result<Vec<Deck>> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, name, description, creationTimestamp, updateTimestamp
            FROM Deck
            ORDER BY creationTimestamp, id
            ",
        )?;

        let iter = stmt.query_map([], deck_from_row)?;

        let r: Result<_, rusqlite::Error> = iter.collect();

        Ok(r?)
    }

    pub fn get_deck(&self, id: u64) -> Result<Deck> {
        self.conn
            .query_row(
                "
                SELECT id, name, description, creationTimestamp, updateTimestamp
                FROM Deck
                WHERE id = ?
                ",
                [id],
                deck_from_row,
            )
            .optional()?
            .ok_or_else(|| anyhow!("no deck with id {id}"))
    }

    pub fn create_deck(
        &mut self,
        name: &str,
        description: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Deck> {
        let name = name.trim();
        if name.is_empty() {
            bail!("deck name can't be empty");
        }

        let description = description.map(str::trim).filter(|d| !d.is_empty());

        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM Deck WHERE name = ?)",
            [name],
            |row| row.get(0),
        )?;
        if exists {
            bail!("a deck named '{name}' already exists");
        }

        self.conn.execute(
            "INSERT INTO Deck(name, description, creationTimestamp, updateTimestamp) VALUES (?, ?, ?, ?)",
            params![name, description, to_millis(now)?, to_millis(now)?],
        )?;

        let id = self.conn.last_insert_rowid() as u64;

        info!(id, name, "created deck");

        self.get_deck(id)
    }

    pub fn create_default_deck(&mut self, now: OffsetDateTime) -> Result<Deck> {
        self.create_deck(DEFAULT_DECK_NAME, Some(DEFAULT_DECK_DESCRIPTION), now)
    }

    pub fn cards(&self) -> Result<Vec<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {CARD_COLUMNS}
            FROM Card JOIN Schedule ON Card.id = Schedule.cardId
            ORDER BY creationTimestamp, Card.id
            "
        ))?;

        let iter = stmt.query_map([], card_from_row)?;

        let r: Result<_, rusqlite::Error> = iter.collect();

        Ok(r?)
    }

    pub fn get_card(&self, id: u64) -> Result<Card> {
        self.conn
            .query_row(
                &format!(
                    "
                    SELECT {CARD_COLUMNS}
                    FROM Card JOIN Schedule ON Card.id = Schedule.cardId
                    WHERE Card.id = ?
                    "
                ),
                [id],
                card_from_row,
            )
            .optional()?
            .ok_or_else(|| anyhow!("no card with id {id}"))
    }

    pub fn create_card(
        &mut self,
        card: NewCard,
        schedule: &Schedule,
        now: OffsetDateTime,
    ) -> Result<Card> {
        if card.question.trim().is_empty() {
            bail!("question can't be empty");
        }
        if card.answer.trim().is_empty() {
            bail!("answer can't be empty");
        }

        let tx = self.conn.transaction()?;

        let deck_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM Deck WHERE id = ?)",
            [card.deck_id],
            |row| row.get(0),
        )?;
        if !deck_exists {
            bail!("no deck with id {}", card.deck_id);
        }

        let card = Card {
            id: 0,
            deck_id: card.deck_id,
            question: card.question.trim().to_string(),
            answer: card.answer.trim().to_string(),
            tags: card.tags,
            ease_factor: schedule.ease_factor,
            interval: schedule.interval,
            repetitions: schedule.repetitions,
            created_at: now,
            last_reviewed: None,
            next_review: Some(schedule.next_review),
            total_reviews: 0,
            correct_reviews: 0,
            average_time: None,
        };

        let id = insert_card(&tx, &card)?;

        tx.execute(
            "UPDATE Deck SET updateTimestamp = ? WHERE id = ?",
            params![to_millis(now)?, card.deck_id],
        )?;

        tx.commit()?;

        info!(id, deck_id = card.deck_id, "created card");

        Ok(Card { id, ..card })
    }

    pub fn delete_card(&mut self, id: u64) -> Result<()> {
        let deleted = self.conn.execute("DELETE FROM Card WHERE id = ?", [id])?;
        if deleted == 0 {
            bail!("no card with id {id}");
        }

        info!(id, "deleted card");

        Ok(())
    }

    /// Stores the outcome of a review. `previous` is the card the review was computed from; if the
    /// stored card no longer matches it, another review got there first and nothing is written.
    pub fn record_review(&mut self, previous: &Card, reviewed: &Card, review: &Review) -> Result<()> {
        if previous.id != reviewed.id || review.card_id != reviewed.id {
            bail!(
                "review of card {} doesn't match card {}",
                review.card_id,
                reviewed.id
            );
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let updated = tx.execute(
            "
            UPDATE Schedule
            SET easeFactor = ?, intervalDays = ?, repetitions = ?, scheduledForTimestamp = ?,
                lastReviewTimestamp = ?, totalReviews = ?, correctReviews = ?, averageTimeSecs = ?
            WHERE cardId = ? AND totalReviews = ?
            ",
            params![
                reviewed.ease_factor,
                reviewed.interval,
                reviewed.repetitions,
                reviewed.next_review.map(to_millis).transpose()?,
                reviewed.last_reviewed.map(to_millis).transpose()?,
                reviewed.total_reviews,
                reviewed.correct_reviews,
                reviewed.average_time,
                reviewed.id,
                previous.total_reviews,
            ],
        )?;

        if updated == 0 {
            bail!(
                "card {} was changed while it was being reviewed, review not saved",
                reviewed.id
            );
        }

        insert_review(&tx, review.card_id, review)?;

        tx.commit()?;

        debug!(
            card_id = reviewed.id,
            rating = review.rating.value(),
            interval = reviewed.interval,
            "recorded review"
        );

        Ok(())
    }

    pub fn reviews(&self) -> Result<Vec<Review>> {
        let mut stmt = self.conn.prepare(
            "
            SELECT cardId, rating, responseTimeSecs, timestamp
            FROM Answer
            ORDER BY timestamp, id
            ",
        )?;

        let iter = stmt.query_map([], |row| {
            let rating: u8 = row.get(1)?;

            Ok(Review {
                card_id: row.get(0)?,
                rating: Rating::try_from(rating)
                    .map_err(|e| conversion_error(1, Type::Integer, e))?,
                response_time: row.get(2)?,
                reviewed_at: timestamp(row, 3)?,
            })
        })?;

        let r: Result<_, rusqlite::Error> = iter.collect();

        Ok(r?)
    }

    /// Adds everything in the archive under fresh ids. Decks are matched up with existing decks
    /// of the same name. Either the whole archive is imported or nothing is.
    pub fn import(&mut self, archive: &Archive) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();

        let tx = self.conn.transaction()?;

        let mut deck_ids = HashMap::new();
        for deck in &archive.decks {
            let name = deck.name.trim();
            if name.is_empty() {
                bail!("deck {} has an empty name", deck.id);
            }

            let inserted = tx.execute(
                "
                INSERT INTO Deck(name, description, creationTimestamp, updateTimestamp)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(name) DO NOTHING
                ",
                params![
                    name,
                    deck.description,
                    to_millis(deck.created_at)?,
                    to_millis(deck.updated_at)?
                ],
            )?;
            summary.decks += inserted;

            let id: u64 = tx.query_row("SELECT id FROM Deck WHERE name = ?", [name], |row| {
                row.get(0)
            })?;
            deck_ids.insert(deck.id, id);
        }

        let mut card_ids = HashMap::new();
        for card in &archive.cards {
            card.state()
                .validate()
                .with_context(|| format!("card {} can't be imported", card.id))?;
            if card.interval == 0 {
                bail!("card {} can't be imported: interval must be at least one day", card.id);
            }
            if card.correct_reviews > card.total_reviews {
                bail!(
                    "card {} can't be imported: {} correct reviews out of {} total",
                    card.id,
                    card.correct_reviews,
                    card.total_reviews
                );
            }

            let deck_id = *deck_ids
                .get(&card.deck_id)
                .ok_or_else(|| anyhow!("card {} is in unknown deck {}", card.id, card.deck_id))?;

            let id = insert_card(&tx, &Card {
                deck_id,
                ..card.clone()
            })
            .with_context(|| format!("card {} can't be imported", card.id))?;
            card_ids.insert(card.id, id);
            summary.cards += 1;
        }

        for review in &archive.reviews {
            match card_ids.get(&review.card_id) {
                Some(&card_id) => {
                    insert_review(&tx, card_id, review).with_context(|| {
                        format!("review of card {} can't be imported", review.card_id)
                    })?;
                    summary.reviews += 1;
                }
                None => {
                    warn!(card_id = review.card_id, "skipping review of unknown card");
                    summary.skipped_reviews += 1;
                }
            }
        }

        tx.commit()?;

        info!(
            decks = summary.decks,
            cards = summary.cards,
            reviews = summary.reviews,
            "imported archive"
        );

        Ok(summary)
    }
}

fn insert_card(conn: &Connection, card: &Card) -> Result<u64> {
    conn.execute(
        "INSERT INTO Card(deckId, question, answer, tags, creationTimestamp) VALUES (?, ?, ?, ?, ?)",
        params![
            card.deck_id,
            card.question,
            card.answer,
            serde_json::to_string(&card.tags)?,
            to_millis(card.created_at)?
        ],
    )?;

    let id = conn.last_insert_rowid() as u64;

    conn.execute(
        "
        INSERT INTO Schedule(
            cardId, easeFactor, intervalDays, repetitions, scheduledForTimestamp,
            lastReviewTimestamp, totalReviews, correctReviews, averageTimeSecs
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            id,
            card.ease_factor,
            card.interval,
            card.repetitions,
            card.next_review.map(to_millis).transpose()?,
            card.last_reviewed.map(to_millis).transpose()?,
            card.total_reviews,
            card.correct_reviews,
            card.average_time,
        ],
    )?;

    Ok(id)
}

fn insert_review(conn: &Connection, card_id: u64, review: &Review) -> Result<()> {
    conn.execute(
        "INSERT INTO Answer(cardId, rating, responseTimeSecs, timestamp) VALUES (?, ?, ?, ?)",
        params![
            card_id,
            review.rating.value(),
            review.response_time,
            to_millis(review.reviewed_at)?
        ],
    )?;

    Ok(())
}

fn deck_from_row(row: &Row) -> rusqlite::Result<Deck> {
    Ok(Deck {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: timestamp(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

fn card_from_row(row: &Row) -> rusqlite::Result<Card> {
    let tags: String = row.get(4)?;
    let tags = serde_json::from_str(&tags).map_err(|e| conversion_error(4, Type::Text, e))?;

    Ok(Card {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        question: row.get(2)?,
        answer: row.get(3)?,
        tags,
        created_at: timestamp(row, 5)?,
        ease_factor: row.get(6)?,
        interval: row.get(7)?,
        repetitions: row.get(8)?,
        next_review: opt_timestamp(row, 9)?,
        last_reviewed: opt_timestamp(row, 10)?,
        total_reviews: row.get(11)?,
        correct_reviews: row.get(12)?,
        average_time: row.get(13)?,
    })
}

/// Timestamps are stored as whole milliseconds. Anything finer can't be stored without changing
/// it, so it's refused.
fn to_millis(t: OffsetDateTime) -> Result<i64> {
    let nanos = t.unix_timestamp_nanos();
    if nanos % 1_000_000 != 0 {
        bail!("timestamp {t} has sub-millisecond precision");
    }

    Ok((nanos / 1_000_000) as i64)
}

fn timestamp(row: &Row, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let millis: i64 = row.get(idx)?;

    from_millis(idx, millis)
}

fn opt_timestamp(row: &Row, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    let millis: Option<i64> = row.get(idx)?;

    millis.map(|millis| from_millis(idx, millis)).transpose()
}

fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|e| conversion_error(idx, Type::Integer, e))
}

fn conversion_error(
    idx: usize,
    ty: Type,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}
