use anyhow::anyhow;
use anyhow::Result;
use std::ffi::OsString;
use std::path::PathBuf;

pub const DB_ENV_VAR: &str = "SM2_CLI_DB";
pub const LOG_ENV_VAR: &str = "SM2_CLI_LOG";

const APP_DIR: &str = "sm2-cli";
const DB_FILE: &str = "cards.db";
const BACKUP_DIR: &str = "backups";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub backup_dir: PathBuf,
    pub backups_to_keep: usize,
    pub review_limit: usize,
    /// Number of cards between "continue?" prompts during a review.
    pub review_checkpoint: usize,
}

impl Config {
    pub fn with_db_path(db_path: PathBuf) -> Self {
        let backup_dir = db_path
            .parent()
            .map(|dir| dir.join(BACKUP_DIR))
            .unwrap_or_else(|| PathBuf::from(BACKUP_DIR));

        Self {
            db_path,
            backup_dir,
            backups_to_keep: 10,
            review_limit: 20,
            review_checkpoint: 5,
        }
    }

    /// Picks the database from, in order, the command line, the environment, and the user's data
    /// directory.
    pub fn resolve(path_arg: Option<PathBuf>, env_path: Option<OsString>) -> Result<Self> {
        let db_path = match (path_arg, env_path.filter(|p| !p.is_empty())) {
            (Some(path), _) => path,
            (None, Some(path)) => PathBuf::from(path),
            (None, None) => dirs::data_dir()
                .ok_or_else(|| anyhow!("no data directory found, pass --path or set {DB_ENV_VAR}"))?
                .join(APP_DIR)
                .join(DB_FILE),
        };

        Ok(Self::with_db_path(db_path))
    }

    pub fn from_env(path_arg: Option<PathBuf>) -> Result<Self> {
        Self::resolve(path_arg, std::env::var_os(DB_ENV_VAR))
    }
}
