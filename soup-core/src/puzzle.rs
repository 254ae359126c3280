//! Puzzle records and the tiered story catalog.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Prefix carried by every user-added puzzle id.
pub const CUSTOM_ID_PREFIX: &str = "custom_";

/// Stable identifier of a puzzle.
pub type PuzzleId = String;

/// Returns true if the id belongs to a user-added puzzle.
pub fn is_custom_id(id: &str) -> bool {
    id.starts_with(CUSTOM_ID_PREFIX)
}

/// Difficulty tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Easy,
    #[default]
    Medium,
    Hard,
    Extreme,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Easy, Tier::Medium, Tier::Hard, Tier::Extreme];

    pub fn name(&self) -> &'static str {
        match self {
            Tier::Easy => "easy",
            Tier::Medium => "medium",
            Tier::Hard => "hard",
            Tier::Extreme => "extreme",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Ok(Tier::Easy),
            "medium" => Ok(Tier::Medium),
            "hard" => Ok(Tier::Hard),
            "extreme" => Ok(Tier::Extreme),
            other => Err(other.to_string()),
        }
    }
}

/// One game scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Puzzle {
    #[serde(default)]
    pub id: PuzzleId,
    pub title: String,
    /// The text shown to the player.
    pub situation: String,
    /// The hidden solution.
    pub truth: String,
    /// Flavor text revealed when the game ends.
    pub background: String,
    #[serde(default)]
    pub hints: Vec<String>,
}

impl Puzzle {
    pub fn is_custom(&self) -> bool {
        is_custom_id(&self.id)
    }
}

/// A user-submitted puzzle before validation.
///
/// Every field is optional so that a missing field can be reported by name
/// instead of failing inside the JSON decoder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PuzzleDraft {
    pub title: Option<String>,
    pub situation: Option<String>,
    pub truth: Option<String>,
    pub background: Option<String>,
    pub hints: Option<Vec<String>>,
}

impl PuzzleDraft {
    /// Names of the required fields that are absent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push("title");
        }
        if self.situation.is_none() {
            missing.push("situation");
        }
        if self.truth.is_none() {
            missing.push("truth");
        }
        if self.background.is_none() {
            missing.push("background");
        }
        if self.hints.is_none() {
            missing.push("hints");
        }
        missing
    }

    /// Turn the draft into a puzzle with the given id.
    ///
    /// Returns the missing field names if the draft is incomplete.
    pub fn into_puzzle(self, id: PuzzleId) -> Result<Puzzle, Vec<&'static str>> {
        match self {
            PuzzleDraft {
                title: Some(title),
                situation: Some(situation),
                truth: Some(truth),
                background: Some(background),
                hints: Some(hints),
            } => Ok(Puzzle {
                id,
                title,
                situation,
                truth,
                background,
                hints,
            }),
            draft => Err(draft.missing_fields()),
        }
    }
}

/// Puzzles grouped by tier. Every tier is always present.
///
/// Document content that cannot be read as puzzles (keys that are not a
/// tier, entries that fail to decode) is kept aside and written back by
/// [`to_document`](Self::to_document), so rewriting the catalog never
/// drops it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryCatalog {
    tiers: BTreeMap<Tier, Vec<Puzzle>>,
    foreign_tiers: serde_json::Map<String, serde_json::Value>,
    foreign_entries: BTreeMap<Tier, Vec<serde_json::Value>>,
}

impl StoryCatalog {
    /// A catalog with all four tiers present and empty.
    pub fn empty() -> Self {
        Self {
            tiers: Tier::ALL.iter().map(|t| (*t, Vec::new())).collect(),
            foreign_tiers: serde_json::Map::new(),
            foreign_entries: BTreeMap::new(),
        }
    }

    /// Keep a document key that is not a tier name.
    pub fn keep_foreign_tier(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.foreign_tiers.insert(name.into(), value);
    }

    /// Keep an entry of `tier` that does not decode as a puzzle.
    pub fn keep_foreign_entry(&mut self, tier: Tier, entry: serde_json::Value) {
        self.foreign_entries.entry(tier).or_default().push(entry);
    }

    fn foreign_values_mut(&mut self) -> impl Iterator<Item = &mut Vec<serde_json::Value>> {
        self.foreign_entries.values_mut().chain(
            self.foreign_tiers
                .values_mut()
                .filter_map(serde_json::Value::as_array_mut),
        )
    }

    fn foreign_contains_id(&self, id: &str) -> bool {
        self.foreign_entries
            .values()
            .flatten()
            .chain(
                self.foreign_tiers
                    .values()
                    .filter_map(serde_json::Value::as_array)
                    .flatten(),
            )
            .any(|entry| entry_id(entry) == Some(id))
    }

    pub fn tier(&self, tier: Tier) -> &[Puzzle] {
        self.tiers.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn tier_mut(&mut self, tier: Tier) -> &mut Vec<Puzzle> {
        self.tiers.entry(tier).or_default()
    }

    pub fn tiers(&self) -> impl Iterator<Item = (Tier, &[Puzzle])> {
        self.tiers.iter().map(|(t, p)| (*t, p.as_slice()))
    }

    pub fn push(&mut self, tier: Tier, puzzle: Puzzle) {
        self.tier_mut(tier).push(puzzle);
    }

    pub fn get(&self, id: &str) -> Option<(Tier, &Puzzle)> {
        self.tiers
            .iter()
            .find_map(|(t, puzzles)| puzzles.iter().find(|p| p.id == id).map(|p| (*t, p)))
    }

    /// Whether any puzzle or kept entry carries `id`.
    pub fn contains_id(&self, id: &str) -> bool {
        self.get(id).is_some() || self.foreign_contains_id(id)
    }

    /// Remove a puzzle from every tier, kept entries included.
    /// Returns the number removed.
    pub fn remove(&mut self, id: &str) -> usize {
        let mut removed = 0;
        for puzzles in self.tiers.values_mut() {
            let before = puzzles.len();
            puzzles.retain(|p| p.id != id);
            removed += before - puzzles.len();
        }
        for entries in self.foreign_values_mut() {
            let before = entries.len();
            entries.retain(|entry| entry_id(entry) != Some(id));
            removed += before - entries.len();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.tiers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persisted document form: tier name -> array of puzzles, followed by
    /// any kept entries and keys.
    pub fn to_document(&self) -> serde_json::Value {
        let mut map: serde_json::Map<String, serde_json::Value> = self
            .tiers
            .iter()
            .map(|(tier, puzzles)| {
                let mut entries: Vec<serde_json::Value> = puzzles
                    .iter()
                    .filter_map(|p| serde_json::to_value(p).ok())
                    .collect();
                if let Some(kept) = self.foreign_entries.get(tier) {
                    entries.extend(kept.iter().cloned());
                }
                (tier.name().to_string(), serde_json::Value::Array(entries))
            })
            .collect();

        for (name, value) in &self.foreign_tiers {
            map.entry(name.clone()).or_insert_with(|| value.clone());
        }
        serde_json::Value::Object(map)
    }
}

fn entry_id(entry: &serde_json::Value) -> Option<&str> {
    entry.get("id").and_then(serde_json::Value::as_str)
}

impl Default for StoryCatalog {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn puzzle(id: &str) -> Puzzle {
        Puzzle {
            id: id.to_string(),
            title: "t".to_string(),
            situation: "s".to_string(),
            truth: "tr".to_string(),
            background: "b".to_string(),
            hints: vec!["h".to_string()],
        }
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("easy".parse::<Tier>(), Ok(Tier::Easy));
        assert_eq!(" Extreme ".parse::<Tier>(), Ok(Tier::Extreme));
        assert!("impossible".parse::<Tier>().is_err());
        assert_eq!(Tier::default(), Tier::Medium);
    }

    #[test]
    fn test_empty_catalog_has_all_tiers() {
        let catalog = StoryCatalog::empty();
        assert_eq!(catalog.tiers().count(), 4);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_draft_missing_fields() {
        let draft = PuzzleDraft {
            title: Some("x".to_string()),
            hints: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(
            draft.missing_fields(),
            vec!["situation", "truth", "background"]
        );
        assert!(draft.into_puzzle("custom_1".to_string()).is_err());
    }

    #[test]
    fn test_remove_from_every_tier() {
        let mut catalog = StoryCatalog::empty();
        catalog.push(Tier::Easy, puzzle("custom_1"));
        catalog.push(Tier::Hard, puzzle("custom_1"));
        catalog.push(Tier::Hard, puzzle("easy_0"));

        assert_eq!(catalog.remove("custom_1"), 2);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains_id("easy_0"));
    }

    #[test]
    fn test_document_shape() {
        let mut catalog = StoryCatalog::empty();
        catalog.push(Tier::Medium, puzzle("m"));
        let doc = catalog.to_document();
        assert_eq!(doc["medium"][0]["id"], "m");
        assert_eq!(doc["extreme"], serde_json::json!([]));
    }

    #[test]
    fn test_document_keeps_foreign_content() {
        let mut catalog = StoryCatalog::empty();
        catalog.push(Tier::Easy, puzzle("easy_0"));
        catalog.keep_foreign_entry(Tier::Easy, serde_json::json!({"title": "half"}));
        catalog.keep_foreign_tier(
            "简单",
            serde_json::json!([{"id": "custom_1700000000", "title": "legacy"}]),
        );

        let doc = catalog.to_document();
        assert_eq!(doc["easy"][0]["id"], "easy_0");
        assert_eq!(doc["easy"][1]["title"], "half");
        assert_eq!(doc["简单"][0]["title"], "legacy");
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains_id("custom_1700000000"));
    }

    #[test]
    fn test_remove_reaches_foreign_entries() {
        let mut catalog = StoryCatalog::empty();
        catalog.keep_foreign_tier(
            "简单",
            serde_json::json!([{"id": "custom_1"}, {"id": "custom_2"}]),
        );

        assert_eq!(catalog.remove("custom_1"), 1);
        assert_eq!(catalog.to_document()["简单"], serde_json::json!([{"id": "custom_2"}]));
        assert!(!catalog.contains_id("custom_1"));
    }

    #[test]
    fn test_custom_prefix() {
        assert!(puzzle("custom_1700000000").is_custom());
        assert!(!puzzle("easy_1").is_custom());
    }
}
