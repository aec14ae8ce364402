//! srl - spaced repetition flashcards on the command line.
//!
//! Decks live as JSON files in a directory; reviews are scheduled with FSRS.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use srl::{
    shuffle_cards, Card, CardStats, Clock, Config, Deck, DeckRepository, Error, Rating, Review,
    Scheduler, SystemClock,
};

const WRAP_WIDTH: usize = 72;

// ══════════════════════════════════════════════════════════════════════════
// CLI Arguments
// ══════════════════════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "srl")]
#[command(author, version, about = "Learning things through spaced repetition", long_about = None)]
struct Args {
    /// Directory containing deck files
    #[arg(short, long, global = true)]
    decks_dir: Option<PathBuf>,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when SRL_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Deck(DeckCommand),
    /// Print the effective configuration
    Config {
        /// Write it to the configuration file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DeckCommand {
    /// List all decks
    Decks,
    /// Create an empty deck
    Create { name: String },
    /// Delete a deck and its files
    Delete { deck: String },
    /// Rename a deck (its file keeps the original name)
    Rename { deck: String, name: String },
    /// List the cards of a deck
    Cards { deck: String },
    /// Add a card to a deck
    Add {
        deck: String,
        question: String,
        answer: String,
    },
    /// Change the text of a card
    Edit {
        deck: String,
        id: String,
        question: String,
        answer: String,
    },
    /// Remove a card from a deck
    Remove { deck: String, id: String },
    /// Review the due cards of a deck
    Review { deck: String },
    /// Show review statistics of a card
    Stats { deck: String, id: String },
    /// Merge a legacy review log into card history
    ImportLog { deck: String },
}

// ══════════════════════════════════════════════════════════════════════════
// Main Entry Point
// ══════════════════════════════════════════════════════════════════════════

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config_path = args.config.unwrap_or_else(Config::default_path);
    let config = Config::load_from(&config_path)?;

    let command = match args.command {
        Command::Deck(command) => command,
        Command::Config { write } => {
            print!("{}", config.to_toml()?);
            if write {
                config.save_to(&config_path)?;
                println!("✓ Saved to {}", config_path.display());
            }
            return Ok(());
        }
    };

    let decks_dir = args.decks_dir.unwrap_or_else(|| config.decks_dir());
    let mut repo = DeckRepository::new(&decks_dir)
        .with_context(|| format!("Failed to open decks in {}", decks_dir.display()))?;
    let scheduler = Scheduler::from_config(&config.scheduler)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    run(command, &mut repo, scheduler, clock)
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env("SRL_LOG")
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    Ok(())
}

fn run(command: DeckCommand, repo: &mut DeckRepository, scheduler: Scheduler, clock: Arc<dyn Clock>) -> Result<()> {
    match command {
        DeckCommand::Decks => {
            let now = clock.now();
            if repo.total() == 0 {
                println!("No decks in {}", repo.location().display());
            }
            for deck in repo.list() {
                let stats = deck.stats(now);
                let marker = if deck.has_due_cards(now) { '*' } else { ' ' };
                println!(
                    "{} {:<30} {:>4} cards  {:>4} due  {:>4} new",
                    marker,
                    deck.name(),
                    stats.total_cards,
                    stats.due_cards,
                    stats.new_cards
                );
            }
        }
        DeckCommand::Create { name } => {
            let deck = repo.create(&name, Vec::new())?;
            println!("✓ Created '{}'", deck.name());
        }
        DeckCommand::Delete { deck } => {
            let deck = repo.find(&deck)?;
            repo.delete(&deck)?;
            println!("✓ Deleted '{}'", deck.name());
        }
        DeckCommand::Rename { deck, name } => {
            let deck = repo.find(&deck)?.rename(&name)?;
            repo.save(&deck)?;
            println!("✓ Renamed to '{}'", deck.name());
        }
        DeckCommand::Cards { deck } => {
            let deck = repo.find(&deck)?;
            print_cards(&deck);
        }
        DeckCommand::Add {
            deck,
            question,
            answer,
        } => {
            let (deck, card) = repo.find(&deck)?.add(&question, &answer, clock.now())?;
            repo.save(&deck)?;
            println!("✓ Added card {} to '{}'", card.id(), deck.name());
        }
        DeckCommand::Edit {
            deck,
            id,
            question,
            answer,
        } => {
            let deck = repo.find(&deck)?;
            let card = find_card(&deck, &id)?.edit(&question, &answer)?;
            repo.save(&deck.change(card))?;
            println!("✓ Updated card {}", id);
        }
        DeckCommand::Remove { deck, id } => {
            let deck = repo.find(&deck)?;
            let card = find_card(&deck, &id)?.clone();
            repo.save(&deck.remove(&card)?)?;
            println!("✓ Removed card {}", id);
        }
        DeckCommand::Review { deck } => {
            let deck = repo.find(&deck)?;
            run_review(repo, scheduler, clock, deck)?;
        }
        DeckCommand::Stats { deck, id } => {
            let deck = repo.find(&deck)?;
            let card = find_card(&deck, &id)?;
            print_card_stats(card, &scheduler, clock.now());
        }
        DeckCommand::ImportLog { deck } => {
            let deck = repo.find(&deck)?;
            let before: usize = deck.list().iter().map(|c| c.history().len()).sum();
            let deck = repo.import_legacy_log(&deck)?;
            let after: usize = deck.list().iter().map(|c| c.history().len()).sum();
            repo.save(&deck)?;
            println!("✓ Imported {} reviews into '{}'", after - before, deck.name());
        }
    }

    Ok(())
}

fn find_card<'a>(deck: &'a Deck, id: &str) -> Result<&'a Card> {
    Ok(deck
        .find_card(id)
        .ok_or_else(|| Error::CardNotFound(id.to_string()))?)
}

// ══════════════════════════════════════════════════════════════════════════
// Review Loop
// ══════════════════════════════════════════════════════════════════════════

fn run_review(repo: &mut DeckRepository, scheduler: Scheduler, clock: Arc<dyn Clock>, deck: Deck) -> Result<()> {
    let mut review = Review::new(deck, scheduler.clone(), clock.clone(), shuffle_cards);
    if review.is_finished() {
        println!("Nothing to review in '{}'.", review.deck().name());
        return Ok(());
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    'session: while !review.is_finished() {
        let card = review.card()?.clone();
        println!();
        println!("── {}/{} ──", review.current(), review.total());
        println!("{}", textwrap::fill(card.question(), WRAP_WIDTH));

        match read_input(&mut lines, "\n[Enter] show answer  [q] quit ")? {
            Some(input) if input == "q" => break 'session,
            None => break 'session,
            _ => {}
        }
        println!("{}", textwrap::fill(card.answer(), WRAP_WIDTH));

        let now = clock.now();
        let hints: Vec<String> = scheduler
            .preview(&card, now)
            .iter()
            .map(|(rating, due)| format!("[{}] {} ({})", rating.value(), rating.name(), format_interval(*due - now)))
            .collect();
        println!("\n{}  [s] skip", hints.join("  "));

        loop {
            let Some(input) = read_input(&mut lines, "> ")? else {
                break 'session;
            };
            match input.as_str() {
                "q" => break 'session,
                "s" => {
                    review.skip()?;
                    break;
                }
                score => match score.parse::<Rating>() {
                    Ok(rating) => {
                        review.rate(rating)?;
                        repo.save(review.deck())?;
                        break;
                    }
                    Err(err) => println!("{}", err),
                },
            }
        }
    }

    let (completed, total) = (review.completed(), review.total());
    let deck = review.into_deck();
    println!("\nReviewed {} of {} cards in '{}'.", completed, total, deck.name());
    Ok(())
}

fn read_input<B: BufRead>(lines: &mut io::Lines<B>, prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    match lines.next() {
        Some(line) => Ok(Some(line?.trim().to_string())),
        None => Ok(None),
    }
}

fn format_interval(interval: Duration) -> String {
    if interval.num_days() > 0 {
        format!("{}d", interval.num_days())
    } else if interval.num_hours() > 0 {
        format!("{}h", interval.num_hours())
    } else {
        format!("{}m", interval.num_minutes().max(1))
    }
}

// ══════════════════════════════════════════════════════════════════════════
// Output
// ══════════════════════════════════════════════════════════════════════════

fn print_cards(deck: &Deck) {
    println!("{} ({} cards)", deck.name(), deck.total());
    for card in deck.list() {
        let due = card
            .due()
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<14} {:<10} {:<16} {}",
            card.id(),
            card.lifecycle_state().name(),
            due,
            truncate(card.question(), 40)
        );
    }
}

fn print_card_stats(card: &Card, scheduler: &Scheduler, now: DateTime<Utc>) {
    let stats = CardStats::from_card(card);
    println!("{}", textwrap::fill(card.question(), WRAP_WIDTH));

    let (Some(first), Some(last)) = (stats.first_review(), stats.last_review()) else {
        println!("\nNo reviews yet.");
        return;
    };

    println!();
    println!("Reviews:        {}", stats.reviews());
    for rating in Rating::ALL {
        println!("  {:<12} {}", rating.name(), stats.count(rating));
    }
    println!("First review:   {}", first.format("%Y-%m-%d"));
    println!("Last review:    {}", last.format("%Y-%m-%d"));
    if let Some(memory) = card.memory() {
        println!("Stability:      {:.2}", memory.stability);
        println!("Difficulty:     {:.2}", memory.difficulty);
        println!("Lapses:         {}", memory.lapses);
    }
    println!(
        "Retrievability: {:.0}% ({})",
        scheduler.retrievability(card, now) * 100.0,
        scheduler.algorithm()
    );

    let sparkline: String = stats
        .sparkline
        .iter()
        .map(|item| match item.rating {
            Rating::Again => '▁',
            Rating::Hard => '▃',
            Rating::Good => '▅',
            Rating::Easy => '█',
        })
        .collect();
    println!("History:        {}", sparkline);
}

fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}
