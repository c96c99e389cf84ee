use crate::card::CardFilter;
use anyhow::bail;
use anyhow::Result;
use pico_args::Arguments;
use std::ffi::OsStr;
use std::path::PathBuf;

pub const USAGE: &str = "\
sm2 - flashcards with SM-2 spaced repetition

USAGE:
  sm2 [--path DB] <COMMAND>

COMMANDS:
  add card [-d DECK_ID] [-q QUESTION] [-a ANSWER] [-t TAGS]
  add deck [-n NAME] [-d DESCRIPTION]
  add quick
  list decks
  list cards [-d DECK_ID] [-t TAG] [--due] [--new]
  list due
  review [-l LIMIT] [-d DECK_ID]
  stats [-d DECK_ID] [--detailed]
  delete CARD_ID
  export FILE
  import FILE

OPTIONS:
  --path DB       Database to use (default: $SM2_CLI_DB, then the user data directory)
  -h, --help      Print help
  -V, --version   Print version
";

#[derive(Debug, PartialEq)]
pub struct Opt {
    pub path: Option<PathBuf>,
    pub command: Command,
}

#[derive(Debug, PartialEq)]
pub enum Command {
    AddCard {
        deck_id: Option<u64>,
        question: Option<String>,
        answer: Option<String>,
        tags: Option<String>,
    },
    AddDeck {
        name: Option<String>,
        description: Option<String>,
    },
    AddQuick,
    ListDecks,
    ListCards(CardFilter),
    Review {
        limit: Option<usize>,
        deck_id: Option<u64>,
    },
    Stats {
        deck_id: Option<u64>,
        detailed: bool,
    },
    Delete {
        card_id: u64,
    },
    Export {
        path: PathBuf,
    },
    Import {
        path: PathBuf,
    },
    Help,
    Version,
}

pub fn from_env() -> Result<Opt> {
    parse(Arguments::from_env())
}

pub fn parse(mut args: Arguments) -> Result<Opt> {
    if args.contains(["-V", "--version"]) {
        return Ok(Opt {
            path: None,
            command: Command::Version,
        });
    }

    let help = args.contains(["-h", "--help"]);
    let path = args.opt_value_from_os_str("--path", parse_path)?;

    let subcommand = args.subcommand()?;
    let command = match subcommand.as_deref() {
        _ if help => Command::Help,
        None => Command::Help,
        Some("add") => match args.subcommand()?.as_deref() {
            Some("card") => Command::AddCard {
                deck_id: args.opt_value_from_str(["-d", "--deck"])?,
                question: args.opt_value_from_str(["-q", "--question"])?,
                answer: args.opt_value_from_str(["-a", "--answer"])?,
                tags: args.opt_value_from_str(["-t", "--tags"])?,
            },
            Some("deck") => Command::AddDeck {
                name: args.opt_value_from_str(["-n", "--name"])?,
                description: args.opt_value_from_str(["-d", "--description"])?,
            },
            Some("quick") => Command::AddQuick,
            Some(other) => bail!("unknown add command '{other}', expected card, deck or quick"),
            None => bail!("add needs one of card, deck or quick"),
        },
        Some("list") => match args.subcommand()?.as_deref() {
            Some("decks") => Command::ListDecks,
            Some("cards") => Command::ListCards(CardFilter {
                deck_id: args.opt_value_from_str(["-d", "--deck"])?,
                tag: args.opt_value_from_str(["-t", "--tag"])?,
                due: args.contains("--due"),
                new: args.contains("--new"),
            }),
            Some("due") => Command::ListCards(CardFilter {
                due: true,
                ..CardFilter::default()
            }),
            Some(other) => bail!("unknown list command '{other}', expected decks, cards or due"),
            None => bail!("list needs one of decks, cards or due"),
        },
        Some("review") => {
            let limit: Option<usize> = args.opt_value_from_str(["-l", "--limit"])?;
            if limit == Some(0) {
                bail!("limit must be at least 1");
            }

            Command::Review {
                limit,
                deck_id: args.opt_value_from_str(["-d", "--deck"])?,
            }
        }
        Some("stats") => Command::Stats {
            deck_id: args.opt_value_from_str(["-d", "--deck"])?,
            detailed: args.contains("--detailed"),
        },
        Some("delete") => Command::Delete {
            card_id: args.free_from_str()?,
        },
        Some("export") => Command::Export {
            path: args.free_from_os_str(parse_path)?,
        },
        Some("import") => Command::Import {
            path: args.free_from_os_str(parse_path)?,
        },
        Some(other) => bail!("unknown command '{other}', see --help"),
    };

    let remaining = args.finish();
    if !remaining.is_empty() && command != Command::Help {
        bail!("unexpected arguments: {remaining:?}");
    }

    Ok(Opt { path, command })
}

fn parse_path(s: &OsStr) -> Result<PathBuf, &'static str> {
    Ok(s.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;

    fn parse_args(args: &[&str]) -> Result<Opt> {
        parse(Arguments::from_vec(
            args.iter().map(OsString::from).collect(),
        ))
    }

    fn command(args: &[&str]) -> Command {
        parse_args(args).unwrap().command
    }

    #[test]
    fn add_card_with_everything() {
        assert_eq!(
            command(&["add", "card", "-d", "3", "-q", "2 + 2", "--answer", "4", "-t", "math,easy"]),
            Command::AddCard {
                deck_id: Some(3),
                question: Some("2 + 2".to_string()),
                answer: Some("4".to_string()),
                tags: Some("math,easy".to_string()),
            }
        );
    }

    #[test]
    fn add_deck_uses_d_for_description() {
        assert_eq!(
            command(&["add", "deck", "-n", "Kanji", "-d", "N5"]),
            Command::AddDeck {
                name: Some("Kanji".to_string()),
                description: Some("N5".to_string()),
            }
        );
    }

    #[test]
    fn list_due_is_a_filter() {
        assert_eq!(
            command(&["list", "due"]),
            command(&["list", "cards", "--due"])
        );
        assert_eq!(
            command(&["list", "cards", "-t", "verbs", "--new"]),
            Command::ListCards(CardFilter {
                tag: Some("verbs".to_string()),
                new: true,
                ..CardFilter::default()
            })
        );
    }

    #[test]
    fn review_defaults() {
        assert_eq!(
            command(&["review"]),
            Command::Review {
                limit: None,
                deck_id: None,
            }
        );
        assert_eq!(
            command(&["review", "--limit", "5", "-d", "2"]),
            Command::Review {
                limit: Some(5),
                deck_id: Some(2),
            }
        );
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(parse_args(&["review", "-l", "0"]).is_err());
    }

    #[test]
    fn global_path() {
        let opt = parse_args(&["--path", "/tmp/x.db", "stats", "--detailed"]).unwrap();

        assert_eq!(opt.path, Some(PathBuf::from("/tmp/x.db")));
        assert_eq!(
            opt.command,
            Command::Stats {
                deck_id: None,
                detailed: true,
            }
        );
    }

    #[test]
    fn positional_arguments() {
        assert_eq!(command(&["delete", "12"]), Command::Delete { card_id: 12 });
        assert_eq!(
            command(&["export", "out.json"]),
            Command::Export {
                path: PathBuf::from("out.json"),
            }
        );
        assert!(parse_args(&["delete", "twelve"]).is_err());
        assert!(parse_args(&["import"]).is_err());
    }

    #[test]
    fn help_and_version() {
        assert_eq!(command(&[]), Command::Help);
        assert_eq!(command(&["review", "--help"]), Command::Help);
        assert_eq!(command(&["-V"]), Command::Version);
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse_args(&["frobnicate"]).is_err());
        assert!(parse_args(&["add"]).is_err());
        assert!(parse_args(&["add", "note"]).is_err());
        assert!(parse_args(&["stats", "--verbose"]).is_err());
    }
}
