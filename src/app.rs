use crate::archive::Archive;
use crate::backup;
use crate::card::parse_tags;
use crate::card::Card;
use crate::card::CardFilter;
use crate::card::Deck;
use crate::card::NewCard;
use crate::card::Review;
use crate::clock::local_date;
use crate::clock::Clock;
use crate::config::Config;
use crate::prompt;
use crate::scheduler;
use crate::scheduler::Rating;
use crate::srs::Srs;
use crate::srs::DEFAULT_DECK_NAME;
use crate::stats;
use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use time::OffsetDateTime;
use tracing::debug;

pub struct App<C: Clock> {
    srs: Srs,
    clock: C,
    config: Config,
    rng: fastrand::Rng,
}

impl<C: Clock> App<C> {
    pub fn new(srs: Srs, clock: C, config: Config) -> Self {
        Self {
            srs,
            clock,
            config,
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_rng(self, rng: fastrand::Rng) -> Self {
        Self { rng, ..self }
    }

    fn backup(&self) {
        backup::create_or_warn(
            &self.srs,
            &self.config.backup_dir,
            self.config.backups_to_keep,
            self.clock.now(),
        );
    }

    pub fn add_card(
        &mut self,
        deck_id: Option<u64>,
        question: Option<String>,
        answer: Option<String>,
        tags: Option<String>,
    ) -> Result<Card> {
        self.backup();

        let deck = self.pick_deck(deck_id)?;

        let interactive = question.is_none() || answer.is_none();
        let question = match question {
            Some(question) => question,
            None => prompt::required_line("Question:")?,
        };
        let answer = match answer {
            Some(answer) => answer,
            None => prompt::required_line("Answer:")?,
        };
        let tags = match tags {
            Some(tags) => tags,
            None if interactive => prompt::line("Tags (comma separated, optional):")?,
            None => String::new(),
        };

        let now = self.clock.now();
        let card = self.srs.create_card(
            NewCard {
                deck_id: deck.id,
                question,
                answer,
                tags: parse_tags(&tags),
            },
            &scheduler::new_card_schedule(now),
            now,
        )?;

        println!("Card added to {}", deck.name);
        println!("  Question: {}", card.question);
        println!("  Answer: {}", card.answer);
        if !card.tags.is_empty() {
            println!("  Tags: {}", card.tags.join(", "));
        }

        Ok(card)
    }

    fn pick_deck(&mut self, deck_id: Option<u64>) -> Result<Deck> {
        if let Some(id) = deck_id {
            return self.srs.get_deck(id);
        }

        let mut decks = self.srs.decks()?;

        match decks.len() {
            0 => {
                println!("No decks found, creating {DEFAULT_DECK_NAME}");
                self.srs.create_default_deck(self.clock.now())
            }
            1 => Ok(decks.remove(0)),
            _ => choose_deck(decks),
        }
    }

    pub fn add_deck(&mut self, name: Option<String>, description: Option<String>) -> Result<Deck> {
        let (name, description) = match name {
            Some(name) => (name, description),
            None => {
                let name = prompt::required_line("Deck name:")?;
                let description = match description {
                    Some(description) => description,
                    None => prompt::line("Description (optional):")?,
                };

                (name, Some(description))
            }
        };

        self.backup();

        let deck = self
            .srs
            .create_deck(&name, description.as_deref(), self.clock.now())?;

        println!("Created {} ({})", deck.name, deck.id);
        if let Some(description) = &deck.description {
            println!("  {description}");
        }

        Ok(deck)
    }

    pub fn add_quick(&mut self) -> Result<Card> {
        println!("Quick card creation");

        let question = prompt::required_line("Question:")?;
        let answer = prompt::required_line("Answer:")?;
        let tags = prompt::line("Tags (optional):")?;

        self.add_card(None, Some(question), Some(answer), Some(tags))
    }

    pub fn list_decks(&self) -> Result<()> {
        let decks = self.srs.decks()?;

        if decks.is_empty() {
            println!("No decks found. Create one with: sm2 add deck");
            return Ok(());
        }

        let cards = self.srs.cards()?;
        let now = self.clock.now();

        for deck in decks {
            let in_deck: Vec<&Card> = cards.iter().filter(|c| c.deck_id == deck.id).collect();
            let due = in_deck.iter().filter(|c| scheduler::is_due(c, now)).count();
            let mastered = in_deck.iter().filter(|c| c.is_mastered()).count();

            println!("{} ({})", deck.name, deck.id);
            if let Some(description) = &deck.description {
                println!("  {description}");
            }
            println!(
                "  {} total, {due} due, {mastered} mastered",
                in_deck.len()
            );
            println!("  Created: {}", local_date(deck.created_at));
            println!();
        }

        Ok(())
    }

    pub fn list_cards(&self, filter: &CardFilter) -> Result<()> {
        let now = self.clock.now();

        let cards: Vec<Card> = self
            .srs
            .cards()?
            .into_iter()
            .filter(|card| filter.matches(card, now))
            .collect();

        if cards.is_empty() {
            println!("No cards found.");
            return Ok(());
        }

        let deck_names: HashMap<u64, String> = self
            .srs
            .decks()?
            .into_iter()
            .map(|deck| (deck.id, deck.name))
            .collect();

        println!("{} cards", cards.len());

        for card in &cards {
            let deck_name = deck_names
                .get(&card.deck_id)
                .map(String::as_str)
                .unwrap_or("Unknown");
            let due = if scheduler::is_due(card, now) {
                "due"
            } else {
                "not due"
            };

            println!();
            println!("[{}] {}", card.id, card.question.replace('\n', " "));
            println!("  A: {}", card.answer.replace('\n', " "));
            println!("  Deck: {deck_name} | {} | {due}", card.status());
            if !card.tags.is_empty() {
                println!("  Tags: {}", card.tags.join(", "));
            }
            if let Some(next_review) = card.next_review {
                println!("  Next review: {}", local_date(next_review));
            }
        }

        Ok(())
    }

    /// Cards to go through in a review session, in the order they should be shown.
    pub fn due_cards(&mut self, limit: usize, deck_id: Option<u64>) -> Result<Vec<Card>> {
        let mut cards = self.srs.cards()?;

        if let Some(deck_id) = deck_id {
            self.srs.get_deck(deck_id)?;
            cards.retain(|card| card.deck_id == deck_id);
        }

        // Cards that tie on every ordering key come up in random order
        self.rng.shuffle(&mut cards);

        Ok(scheduler::select_due(&cards, self.clock.now())
            .into_iter()
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn review(&mut self, limit: Option<usize>, deck_id: Option<u64>) -> Result<()> {
        let limit = limit.unwrap_or(self.config.review_limit);
        let cards = self.due_cards(limit, deck_id)?;

        if cards.is_empty() {
            println!("No cards due for review! Come back later.");
            return Ok(());
        }

        self.backup();

        let num_cards = cards.len();
        println!("{num_cards} cards to review");

        let started = self.clock.now();
        let mut num_reviewed = 0;

        for card in &cards {
            println!("\nCard {}/{num_cards}\n", num_reviewed + 1);
            println!("{}\n", card.question);

            let shown = self.clock.now();
            prompt::any("Press any key to show the answer")?;

            println!("{}", "-".repeat(79));
            println!("{}\n", card.answer);

            let rating = prompt::rating()?;
            let reviewed = self.answer(card, rating, shown)?;

            println!("{}", feedback(rating, reviewed.interval));

            num_reviewed += 1;

            let remaining = num_cards - num_reviewed;
            if num_reviewed % self.config.review_checkpoint == 0
                && remaining > 0
                && !prompt::binary(format!("Continue reviewing? ({remaining} cards remaining)"))?
            {
                break;
            }
        }

        let elapsed = (self.clock.now() - started).whole_seconds().max(0);

        println!("{}", "-".repeat(79));
        println!("Finished review");
        println!("  Cards reviewed: {num_reviewed}");
        println!("  Time taken: {}", format_time(elapsed));
        println!(
            "  Average per card: {}s",
            (elapsed as f64 / num_reviewed as f64).round()
        );

        Ok(())
    }

    /// Applies a rating to a card and stores the result. `shown` is when the card was put in front
    /// of the user.
    pub fn answer(&mut self, card: &Card, rating: Rating, shown: OffsetDateTime) -> Result<Card> {
        let now = self.clock.now();
        let response_time = (now - shown).as_seconds_f64().round().max(0.0) as u32;

        let mut reviewed = scheduler::review(card, rating, now)?;
        reviewed.record_response_time(response_time);

        let review = Review {
            card_id: card.id,
            rating,
            response_time,
            reviewed_at: now,
        };

        self.srs.record_review(card, &reviewed, &review)?;

        debug!(card_id = card.id, ?rating, response_time, "answered card");

        Ok(reviewed)
    }

    pub fn stats(&self, deck_id: Option<u64>, detailed: bool) -> Result<()> {
        let cards = self.srs.cards()?;
        let reviews = self.srs.reviews()?;
        let now = self.clock.now();

        match deck_id {
            Some(deck_id) => {
                let deck = self.srs.get_deck(deck_id)?;

                print!("{}", stats::deck(deck, &cards, &reviews, now, detailed));
            }
            None => {
                let decks = self.srs.decks()?;

                print!("{}", stats::overall(&decks, &cards, &reviews, now, detailed));
            }
        }

        Ok(())
    }

    pub fn delete(&mut self, card_id: u64) -> Result<()> {
        let question = self.srs.get_card(card_id)?.question;

        if prompt::binary(format!(
            "Are you sure you want to delete '{}'",
            stats::preview(&question)
        ))? {
            self.backup();
            self.srs.delete_card(card_id)?;
            println!("... deleted.");
        }

        Ok(())
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        let archive = Archive::collect(&self.srs)?;

        archive.write(path)?;

        println!(
            "Exported {} decks, {} cards and {} reviews to {}",
            archive.decks.len(),
            archive.cards.len(),
            archive.reviews.len(),
            path.display()
        );

        Ok(())
    }

    pub fn import(&mut self, path: &Path) -> Result<()> {
        let archive = Archive::read(path)?;

        self.backup();

        let summary = self.srs.import(&archive)?;

        println!(
            "Imported {} new decks, {} cards and {} reviews from {}",
            summary.decks,
            summary.cards,
            summary.reviews,
            path.display()
        );
        if summary.skipped_reviews > 0 {
            println!(
                "Skipped {} reviews of cards missing from the archive",
                summary.skipped_reviews
            );
        }

        Ok(())
    }
}

fn choose_deck(decks: Vec<Deck>) -> Result<Deck> {
    for deck in &decks {
        println!("{} {}", deck.id, deck.name);
    }

    loop {
        let input = prompt::required_line("Deck id:")?;

        let chosen = input
            .parse::<u64>()
            .ok()
            .and_then(|id| decks.iter().find(|deck| deck.id == id));

        match chosen {
            Some(deck) => return Ok(deck.clone()),
            None => println!("'{input}' isn't one of the decks above."),
        }
    }
}

fn feedback(rating: Rating, interval: u32) -> String {
    match rating {
        Rating::Again => "You'll see this card again soon".to_string(),
        _ => format!(
            "Next review in {interval} day{}",
            if interval == 1 { "" } else { "s" }
        ),
    }
}

fn format_time(seconds: i64) -> String {
    let minutes = seconds / 60;
    let seconds = seconds % 60;

    if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}
