use crate::srs::Srs;
use anyhow::Context;
use anyhow::Result;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use time::UtcOffset;
use tracing::debug;
use tracing::warn;

const PREFIX: &str = "cards-";
const EXTENSION: &str = ".db";

const FILE_TIMESTAMP: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]-[subsecond digits:3]Z");

/// Copies the database into `dir` and prunes all but the `keep` most recent copies. Returns the
/// path of the new backup.
pub fn create(srs: &Srs, dir: &Path, keep: usize, now: OffsetDateTime) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let stamp = now.to_offset(UtcOffset::UTC).format(FILE_TIMESTAMP)?;
    let path = dir.join(format!("{PREFIX}{stamp}{EXTENSION}"));

    if path.exists() {
        debug!(path = %path.display(), "backup already taken");
    } else {
        srs.backup_to(&path)?;
        debug!(path = %path.display(), "backed up database");
    }

    prune(dir, keep)?;

    Ok(path)
}

/// Like [`create`], but failures are logged instead of returned.
pub fn create_or_warn(srs: &Srs, dir: &Path, keep: usize, now: OffsetDateTime) {
    if let Err(e) = create(srs, dir, keep, now) {
        warn!("failed to back up database: {e:#}");
    }
}

fn prune(dir: &Path, keep: usize) -> Result<()> {
    let mut backups = list(dir)?;

    // Names sort chronologically
    backups.sort();
    backups.reverse();

    for path in backups.iter().skip(keep) {
        fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
        debug!(path = %path.display(), "removed old backup");
    }

    Ok(())
}

pub fn list(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut backups = vec![];

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };

        if name.starts_with(PREFIX) && name.ends_with(EXTENSION) {
            backups.push(entry.path());
        }
    }

    backups.sort();

    Ok(backups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    const NOW: OffsetDateTime = datetime!(2024-06-01 8:00:00.5 UTC);

    #[test]
    fn names_backup_after_time() {
        let dir = tempfile::tempdir().unwrap();
        let srs = Srs::open_in_memory().unwrap();

        let path = create(&srs, dir.path(), 10, NOW).unwrap();

        assert_eq!(
            path.file_name().unwrap(),
            "cards-2024-06-01T08-00-00-500Z.db"
        );
        assert!(path.exists());
    }

    #[test]
    fn keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let srs = Srs::open_in_memory().unwrap();
        fs::write(dir.path().join("notes.txt"), "not a backup").unwrap();

        for day in 0..5 {
            create(&srs, dir.path(), 3, NOW + Duration::days(day)).unwrap();
        }

        let names: Vec<String> = list(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(
            names,
            vec![
                "cards-2024-06-03T08-00-00-500Z.db",
                "cards-2024-06-04T08-00-00-500Z.db",
                "cards-2024-06-05T08-00-00-500Z.db",
            ]
        );
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn same_instant_is_backed_up_once() {
        let dir = tempfile::tempdir().unwrap();
        let srs = Srs::open_in_memory().unwrap();

        create(&srs, dir.path(), 10, NOW).unwrap();
        create(&srs, dir.path(), 10, NOW).unwrap();

        assert_eq!(list(dir.path()).unwrap().len(), 1);
    }
}
