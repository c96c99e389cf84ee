//! JSON archives of a whole collection, used by `export` and `import`.

use crate::card::Card;
use crate::card::Deck;
use crate::card::Review;
use crate::srs::Srs;
use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::path::Path;

pub const VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    pub version: String,
    #[serde(default)]
    pub decks: Vec<Deck>,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

impl Archive {
    pub fn collect(srs: &Srs) -> Result<Self> {
        Ok(Self {
            version: VERSION.to_string(),
            decks: srs.decks()?,
            cards: srs.cards()?,
            reviews: srs.reviews()?,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("failed to write {}", path.display()))?;

        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let json =
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

        serde_json::from_str(&json).with_context(|| format!("{} isn't a valid archive", path.display()))
    }
}
