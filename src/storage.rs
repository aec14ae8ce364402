//! Storage module for saving and loading flashcard decks.
//!
//! Each deck lives in `<decks_dir>/<slug>.json`. Older installations kept
//! review history in a separate `<slug>-stats.jsonl` log next to it; that
//! log can be folded into card history with
//! [`DeckRepository::import_legacy_log`].

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{slugify, Card, Deck, Rating, ReviewRecord};

const DECK_EXTENSION: &str = "json";
const LEGACY_LOG_SUFFIX: &str = "-stats.jsonl";

/// Handles deck persistence. Every deck in the directory is loaded up front.
#[derive(Debug)]
pub struct DeckRepository {
    decks_dir: PathBuf,
    decks: BTreeMap<String, Deck>,
}

impl DeckRepository {
    /// Opens the repository at `decks_dir`, creating the directory if needed.
    /// Fails if any deck file cannot be read or parsed.
    pub fn new(decks_dir: impl Into<PathBuf>) -> Result<Self> {
        let decks_dir = decks_dir.into();
        fs::create_dir_all(&decks_dir).map_err(|e| Error::io(&decks_dir, e))?;

        let decks = load_decks(&decks_dir)?;
        info!(dir = %decks_dir.display(), decks = decks.len(), "deck repository loaded");
        Ok(Self { decks_dir, decks })
    }

    /// Get default storage location.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("srl")
            .join("decks")
    }

    pub fn location(&self) -> &Path {
        &self.decks_dir
    }

    fn deck_path(&self, deck_id: &str) -> PathBuf {
        self.decks_dir.join(format!("{}.{}", deck_id, DECK_EXTENSION))
    }

    fn log_path(&self, deck_id: &str) -> PathBuf {
        self.decks_dir.join(format!("{}{}", deck_id, LEGACY_LOG_SUFFIX))
    }

    /// All decks ordered by name.
    pub fn list(&self) -> Vec<&Deck> {
        let mut decks: Vec<&Deck> = self.decks.values().collect();
        decks.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        decks
    }

    pub fn total(&self) -> usize {
        self.decks.len()
    }

    /// Creates and persists a new deck. The storage key is the slug of `name`.
    pub fn create(&mut self, name: &str, cards: Vec<Card>) -> Result<Deck> {
        let deck = Deck::with_cards(name, cards)?;
        if self.decks.contains_key(deck.id()) {
            return Err(Error::DeckExists(deck.name().to_string()));
        }

        self.save(&deck)?;
        info!(deck = deck.name(), id = deck.id(), "deck created");
        Ok(deck)
    }

    /// Writes `deck` to disk, replacing any previous version. Fails if
    /// another deck already uses the same name, ignoring case.
    pub fn save(&mut self, deck: &Deck) -> Result<PathBuf> {
        deck.validate()?;

        let wanted = deck.name().to_lowercase();
        if let Some(other) = self
            .decks
            .values()
            .find(|d| d.id() != deck.id() && d.name().to_lowercase() == wanted)
        {
            return Err(Error::DeckExists(other.name().to_string()));
        }

        let path = self.deck_path(deck.id());
        let json = serde_json::to_string_pretty(deck).map_err(|source| Error::Encode {
            name: deck.name().to_string(),
            source,
        })?;
        fs::write(&path, json).map_err(|e| Error::io(&path, e))?;

        self.decks.insert(deck.id().to_string(), deck.clone());
        debug!(deck = deck.name(), path = %path.display(), cards = deck.total(), "deck saved");
        Ok(path)
    }

    /// Removes the deck file, its legacy log if any, and the index entry.
    pub fn delete(&mut self, deck: &Deck) -> Result<()> {
        if !self.decks.contains_key(deck.id()) {
            return Err(Error::DeckNotFound(deck.name().to_string()));
        }

        let path = self.deck_path(deck.id());
        fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;

        let log = self.log_path(deck.id());
        if log.exists() {
            fs::remove_file(&log).map_err(|e| Error::io(&log, e))?;
        }

        self.decks.remove(deck.id());
        debug!(deck = deck.name(), "deck deleted");
        Ok(())
    }

    /// Looks a deck up by name, ignoring case.
    pub fn find(&self, name: &str) -> Result<Deck> {
        let wanted = name.trim().to_lowercase();
        self.decks
            .values()
            .find(|deck| deck.name().to_lowercase() == wanted)
            .cloned()
            .ok_or_else(|| Error::DeckNotFound(name.to_string()))
    }

    /// Folds the legacy review log of `deck` into card history.
    ///
    /// Records are appended in timestamp order; records already present are
    /// skipped, so importing twice is harmless. The returned deck is not saved.
    pub fn import_legacy_log(&self, deck: &Deck) -> Result<Deck> {
        let path = self.log_path(deck.id());
        if !path.exists() {
            return Ok(deck.clone());
        }

        let mut entries = read_legacy_log(&path)?;
        entries.sort_by_key(|entry| entry.timestamp);

        let mut updated = deck.clone();
        let mut imported = 0;
        for entry in entries {
            let Some(card) = updated.find_card(&entry.card_id) else {
                warn!(card = %entry.card_id, log = %path.display(), "skipping log entry for unknown card");
                continue;
            };

            let rating = Rating::from_legacy_score(&entry.score)?;
            let record = ReviewRecord::imported(rating, entry.timestamp, entry.interval.round().max(0.0) as u64);
            let seen = card
                .history()
                .iter()
                .any(|r| r.reviewed_at == record.reviewed_at && r.rating == record.rating);
            if seen {
                continue;
            }

            let mut card = card.clone();
            card.push_record(record);
            updated.upsert(card);
            imported += 1;
        }

        info!(deck = deck.name(), imported, "legacy review log imported");
        Ok(updated)
    }
}

/// One line of a legacy review log.
#[derive(Debug, Deserialize)]
struct LegacyEntry {
    card_id: String,
    timestamp: DateTime<Utc>,
    score: String,
    #[serde(default, deserialize_with = "number_or_string")]
    interval: f64,
}

fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Number(f64),
        Text(String),
    }

    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n),
        Value::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn read_legacy_log(path: &Path) -> Result<Vec<LegacyEntry>> {
    let file = fs::File::open(path).map_err(|e| Error::io(path, e))?;

    let mut entries = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| Error::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line).map_err(|e| Error::malformed(path, e))?;
        entries.push(entry);
    }
    Ok(entries)
}

fn load_decks(dir: &Path) -> Result<BTreeMap<String, Deck>> {
    let mut decks = BTreeMap::new();

    for entry in fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != DECK_EXTENSION) {
            continue;
        }

        let deck = read_deck(&path)?;
        decks.insert(deck.id().to_string(), deck);
    }

    Ok(decks)
}

fn read_deck(path: &Path) -> Result<Deck> {
    let json = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let mut deck: Deck = serde_json::from_str(&json).map_err(|e| Error::malformed(path, e))?;

    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| slugify(deck.name()));
    deck.set_id(id);
    deck.validate()?;

    debug!(path = %path.display(), cards = deck.total(), "deck loaded");
    Ok(deck)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordOrigin;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, 4, 4, 0, 0).unwrap()
    }

    fn cards(n: usize) -> Vec<Card> {
        (0..n)
            .map(|i| Card::new(&format!("question {}", i), "answer", t0()).unwrap())
            .collect()
    }

    fn sorted_ids(deck: &Deck) -> Vec<String> {
        let mut ids: Vec<String> = deck.list().iter().map(|c| c.id().to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn empty_directory_gives_empty_repository() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DeckRepository::new(temp_dir.path()).unwrap();
        assert_eq!(repo.total(), 0);
    }

    #[test]
    fn missing_directory_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("decks");

        let repo = DeckRepository::new(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(repo.location(), dir.as_path());
    }

    #[test]
    fn malformed_deck_aborts_loading() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("good.json"), r#"{"name":"Good","cards":[]}"#).unwrap();
        fs::write(temp_dir.path().join("broken.json"), "{ not json").unwrap();

        let err = DeckRepository::new(temp_dir.path()).unwrap_err();
        assert!(matches!(err, Error::Malformed { ref path, .. } if path.ends_with("broken.json")));
    }

    #[test]
    fn deck_without_name_aborts_loading() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("nameless.json"), r#"{"name":"  ","cards":[]}"#).unwrap();

        assert!(matches!(
            DeckRepository::new(temp_dir.path()),
            Err(Error::EmptyField("deck name"))
        ));
    }

    #[test]
    fn create_then_find_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();

        let created = repo.create("Spanish Verbs", cards(3)).unwrap();
        assert!(temp_dir.path().join("spanish-verbs.json").is_file());

        let found = repo.find("spanish verbs").unwrap();
        assert_eq!(found.name(), "Spanish Verbs");
        assert_eq!(sorted_ids(&found), sorted_ids(&created));

        let reopened = DeckRepository::new(temp_dir.path()).unwrap();
        let loaded = reopened.find("SPANISH VERBS").unwrap();
        assert_eq!(loaded, created);
    }

    #[test]
    fn create_rejects_duplicates_and_blank_names() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();

        repo.create("Math", Vec::new()).unwrap();
        assert!(matches!(repo.create("math", Vec::new()), Err(Error::DeckExists(_))));
        assert!(matches!(repo.create(" ", Vec::new()), Err(Error::EmptyField(_))));
        assert_eq!(repo.total(), 1);
    }

    #[test]
    fn create_fails_when_persisting_fails() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("decks");
        let mut repo = DeckRepository::new(&dir).unwrap();
        fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(repo.create("Math", Vec::new()), Err(Error::Io { .. })));
        assert_eq!(repo.total(), 0);
    }

    #[test]
    fn list_is_ordered_by_name() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();
        for name in ["Rust", "Go", "Haskell"] {
            repo.create(name, Vec::new()).unwrap();
        }

        let names: Vec<&str> = repo.list().iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Go", "Haskell", "Rust"]);
    }

    #[test]
    fn save_is_last_write_wins() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();
        let deck = repo.create("Math", Vec::new()).unwrap();

        let (deck, card) = deck.add("2+2", "4", t0()).unwrap();
        repo.save(&deck).unwrap();
        let deck = deck.rename("Arithmetic").unwrap();
        repo.save(&deck).unwrap();
        repo.save(&deck).unwrap();

        let reopened = DeckRepository::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.total(), 1);
        let loaded = reopened.find("arithmetic").unwrap();
        assert_eq!(loaded.id(), "math");
        assert_eq!(loaded.find_card(card.id()), Some(&card));
        assert!(matches!(reopened.find("Math"), Err(Error::DeckNotFound(_))));
    }

    #[test]
    fn delete_removes_file_and_entry() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();
        let deck = repo.create("Math", Vec::new()).unwrap();
        fs::write(temp_dir.path().join("math-stats.jsonl"), "").unwrap();

        repo.delete(&deck).unwrap();
        assert_eq!(repo.total(), 0);
        assert!(!temp_dir.path().join("math.json").exists());
        assert!(!temp_dir.path().join("math-stats.jsonl").exists());

        assert!(matches!(repo.delete(&deck), Err(Error::DeckNotFound(_))));
    }

    #[test]
    fn find_unknown_deck() {
        let temp_dir = TempDir::new().unwrap();
        let repo = DeckRepository::new(temp_dir.path()).unwrap();
        assert!(matches!(repo.find("nope"), Err(Error::DeckNotFound(name)) if name == "nope"));
    }

    #[test]
    fn mixed_migration_states_load() {
        let temp_dir = TempDir::new().unwrap();
        let json = r#"{
            "name": "Legacy",
            "cards": [
                {"id": "a1", "question": "q1", "answer": "a1"},
                {"id": "b2", "question": "q2", "answer": "a2",
                 "last_review": "2024-04-01T00:00:00Z", "due": "2024-04-05T00:00:00Z",
                 "stability": 4.2, "difficulty": 5.1, "reps": 2, "state": "Review"}
            ]
        }"#;
        fs::write(temp_dir.path().join("legacy.json"), json).unwrap();

        let repo = DeckRepository::new(temp_dir.path()).unwrap();
        let deck = repo.find("legacy").unwrap();
        assert!(!deck.find_card("a1").unwrap().is_migrated());
        let migrated = deck.find_card("b2").unwrap();
        assert_eq!(migrated.memory().unwrap().stability, 4.2);
        assert_eq!(deck.id(), "legacy");
    }

    #[test]
    fn import_legacy_log_appends_history() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();
        let legacy = Card::from_parts("c1", "hola", "hello", crate::models::Schedule::Unmigrated, Vec::new()).unwrap();
        let deck = repo.create("Spanish", vec![legacy]).unwrap();

        let log = [
            r#"{"algorithm":"sm2","card_id":"c1","timestamp":"2024-01-03T00:00:00Z","score":"3","last_review":"2024-01-01T00:00:00Z","repetitions":2,"interval":"6","easiness_factor":"2.5"}"#,
            r#"{"algorithm":"sm2","card_id":"c1","timestamp":"2024-01-01T00:00:00Z","score":"0","interval":"1"}"#,
            "",
            r#"{"algorithm":"sm2","card_id":"gone","timestamp":"2024-01-02T00:00:00Z","score":"2"}"#,
        ]
        .join("\n");
        fs::write(temp_dir.path().join("spanish-stats.jsonl"), log).unwrap();

        let deck = repo.import_legacy_log(&deck).unwrap();
        let history = deck.find_card("c1").unwrap().history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].rating, Rating::Again);
        assert_eq!(history[0].reviewed_at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(history[1].rating, Rating::Easy);
        assert_eq!(history[1].scheduled_days, 6);
        assert!(history.iter().all(|r| r.origin == RecordOrigin::Imported));

        let again = repo.import_legacy_log(&deck).unwrap();
        assert_eq!(again, deck);

        repo.save(&deck).unwrap();
        let reopened = DeckRepository::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.find("spanish").unwrap().find_card("c1").unwrap().history().len(), 2);
    }

    #[test]
    fn import_without_log_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();
        let deck = repo.create("Math", cards(1)).unwrap();

        assert_eq!(repo.import_legacy_log(&deck).unwrap(), deck);
    }

    #[test]
    fn malformed_log_line_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();
        let deck = repo.create("Math", cards(1)).unwrap();
        fs::write(temp_dir.path().join("math-stats.jsonl"), "nope\n").unwrap();

        assert!(matches!(repo.import_legacy_log(&deck), Err(Error::Malformed { .. })));
    }

    #[test]
    fn review_progress_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();
        let deck = repo.create("Math", cards(1)).unwrap();
        let card = deck.list()[0].clone();

        let rated = crate::scheduler::Scheduler::default().schedule(&card, Rating::Good, t0() + Duration::hours(1));
        repo.save(&deck.change(rated.clone())).unwrap();

        let reopened = DeckRepository::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.find("math").unwrap().find_card(card.id()), Some(&rated));
    }

    #[test]
    fn rename_onto_another_deck_name_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = DeckRepository::new(temp_dir.path()).unwrap();
        repo.create("Go", Vec::new()).unwrap();
        let math = repo.create("Math", Vec::new()).unwrap();

        let renamed = math.rename("go").unwrap();
        assert!(matches!(repo.save(&renamed), Err(Error::DeckExists(name)) if name == "Go"));
        assert_eq!(repo.find("math").unwrap(), math);
        assert_eq!(repo.find("GO").unwrap().id(), "go");

        let reopened = DeckRepository::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.find("Math").unwrap(), math);
    }

    #[test]
    fn repeated_card_ids_abort_loading() {
        let temp_dir = TempDir::new().unwrap();
        let json = r#"{"name":"Dupes","cards":[
            {"id":"a1","question":"q1","answer":"a1"},
            {"id":"a1","question":"q2","answer":"a2"}
        ]}"#;
        fs::write(temp_dir.path().join("dupes.json"), json).unwrap();

        let err = DeckRepository::new(temp_dir.path()).unwrap_err();
        assert!(matches!(err, Error::Malformed { ref path, .. } if path.ends_with("dupes.json")));
    }
}
