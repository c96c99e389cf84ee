use anyhow::Result;
use sm2_cli::app::App;
use sm2_cli::clock::UtcClock;
use sm2_cli::config::Config;
use sm2_cli::config::LOG_ENV_VAR;
use sm2_cli::opt;
use sm2_cli::opt::Command;
use sm2_cli::srs::Srs;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let opt = opt::from_env()?;

    match opt.command {
        Command::Help => {
            print!("{}", opt::USAGE);
            return Ok(());
        }
        Command::Version => {
            println!("sm2 {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    let config = Config::from_env(opt.path)?;
    debug!(db = %config.db_path.display(), "opening database");

    let srs = Srs::open(&config.db_path)?;
    let mut app = App::new(srs, UtcClock, config);

    match opt.command {
        Command::AddCard {
            deck_id,
            question,
            answer,
            tags,
        } => app.add_card(deck_id, question, answer, tags).map(|_| ()),
        Command::AddDeck { name, description } => app.add_deck(name, description).map(|_| ()),
        Command::AddQuick => app.add_quick().map(|_| ()),
        Command::ListDecks => app.list_decks(),
        Command::ListCards(filter) => app.list_cards(&filter),
        Command::Review { limit, deck_id } => app.review(limit, deck_id),
        Command::Stats { deck_id, detailed } => app.stats(deck_id, detailed),
        Command::Delete { card_id } => app.delete(card_id),
        Command::Export { path } => app.export(&path),
        Command::Import { path } => app.import(&path),
        Command::Help | Command::Version => Ok(()),
    }
}
