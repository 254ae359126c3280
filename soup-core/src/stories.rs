//! The story pool.
//!
//! `StoryStore` owns the in-memory catalog and keeps the persisted `stories`
//! document in sync with it. Reads never wait on persistence; mutations take
//! a writer lock for the whole read-modify-persist cycle so that two
//! concurrent additions cannot overwrite each other's file.

use crate::persist::{DocumentStore, PersistError};
use crate::puzzle::{
    is_custom_id, Puzzle, PuzzleDraft, PuzzleId, StoryCatalog, Tier, CUSTOM_ID_PREFIX,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Document key under which the catalog is stored.
pub const STORIES_KEY: &str = "stories";

/// Errors from story pool operations.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("No puzzles available for difficulty '{0}'")]
    EmptyTier(Tier),

    #[error("Invalid story: {0}")]
    Validation(String),

    #[error("Unknown difficulty: {0}")]
    UnknownTier(String),

    #[error("Failed to save stories: {0}")]
    Persist(#[from] PersistError),
}

/// Read the persisted catalog.
///
/// Never fails: a missing or unreadable document yields an empty catalog
/// with all four tiers present.
pub async fn load_catalog(store: &dyn DocumentStore) -> StoryCatalog {
    match store.load(STORIES_KEY).await {
        Ok(Some(document)) => catalog_from_document(&document),
        Ok(None) => {
            tracing::info!("No story catalog found, starting empty");
            StoryCatalog::empty()
        }
        Err(e) => {
            tracing::error!("Failed to load stories: {}", e);
            StoryCatalog::empty()
        }
    }
}

/// Build a catalog from its document form.
///
/// Keys that are not tier names and entries that do not decode are not
/// playable, but they are kept in the catalog so the next save writes them
/// back.
pub fn catalog_from_document(document: &Value) -> StoryCatalog {
    let mut catalog = StoryCatalog::empty();

    let Some(tiers) = document.as_object() else {
        tracing::warn!("Story catalog is not an object, starting empty");
        return catalog;
    };

    for (name, entries) in tiers {
        let Ok(tier) = name.parse::<Tier>() else {
            tracing::warn!("Keeping unknown difficulty '{}' in story catalog unplayed", name);
            catalog.keep_foreign_tier(name.clone(), entries.clone());
            continue;
        };
        let Some(entries) = entries.as_array() else {
            tracing::warn!("Difficulty '{}' is not a list, skipping", name);
            continue;
        };

        for (index, entry) in entries.iter().enumerate() {
            match serde_json::from_value::<Puzzle>(entry.clone()) {
                Ok(mut puzzle) => {
                    if puzzle.id.is_empty() {
                        puzzle.id = format!("{tier}_{index}");
                    }
                    catalog.push(tier, puzzle);
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed story {} in '{}': {}", index, name, e);
                    catalog.keep_foreign_entry(tier, entry.clone());
                }
            }
        }
    }

    catalog
}

/// The puzzle catalog plus its persistence.
pub struct StoryStore {
    store: Arc<dyn DocumentStore>,
    catalog: RwLock<StoryCatalog>,
    writer: tokio::sync::Mutex<()>,
    last_custom_id: AtomicU64,
}

impl StoryStore {
    /// Load the catalog from the store.
    pub async fn open(store: Arc<dyn DocumentStore>) -> Self {
        let catalog = load_catalog(store.as_ref()).await;
        tracing::info!("Loaded {} stories", catalog.len());
        Self::with_catalog(store, catalog)
    }

    /// Use an already-built catalog without reading the store.
    pub fn with_catalog(store: Arc<dyn DocumentStore>, catalog: StoryCatalog) -> Self {
        Self {
            store,
            catalog: RwLock::new(catalog),
            writer: tokio::sync::Mutex::new(()),
            last_custom_id: AtomicU64::new(0),
        }
    }

    /// Install `builtin` if no catalog has ever been persisted.
    ///
    /// Returns whether the catalog was installed.
    pub async fn seed_if_missing(&self, builtin: StoryCatalog) -> Result<bool, StoryError> {
        let _writer = self.writer.lock().await;
        if self.store.load(STORIES_KEY).await?.is_some() {
            return Ok(false);
        }

        let document = builtin.to_document();
        self.replace(builtin);
        self.store.save(STORIES_KEY, &document).await?;
        tracing::info!("Seeded built-in story catalog");
        Ok(true)
    }

    /// A snapshot of the current catalog.
    pub fn catalog(&self) -> StoryCatalog {
        self.read(|c| c.clone())
    }

    pub fn get(&self, id: &str) -> Option<Puzzle> {
        self.read(|c| c.get(id).map(|(_, p)| p.clone()))
    }

    pub fn tier_len(&self, tier: Tier) -> usize {
        self.read(|c| c.tier(tier).len())
    }

    /// Pick a puzzle uniformly at random from one tier.
    ///
    /// An empty tier is an error; no other tier is substituted.
    pub fn pick_random<R: Rng + ?Sized>(
        &self,
        tier: Tier,
        rng: &mut R,
    ) -> Result<Puzzle, StoryError> {
        self.read(|c| c.tier(tier).choose(rng).cloned())
            .ok_or(StoryError::EmptyTier(tier))
    }

    /// Validate and append a user-supplied puzzle, then persist the catalog.
    pub async fn add_custom(
        &self,
        draft: PuzzleDraft,
        tier: Tier,
    ) -> Result<PuzzleId, StoryError> {
        let missing = draft.missing_fields();
        if !missing.is_empty() {
            return Err(StoryError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        let _writer = self.writer.lock().await;

        let (id, document) = {
            let mut catalog = self.write();
            let id = self.next_custom_id(&catalog);
            let puzzle = draft
                .into_puzzle(id.clone())
                .map_err(|missing| StoryError::Validation(missing.join(", ")))?;
            catalog.push(tier, puzzle);
            (id, catalog.to_document())
        };

        if let Err(e) = self.store.save(STORIES_KEY, &document).await {
            tracing::error!("Failed to save story {}: {}", id, e);
            return Err(e.into());
        }

        tracing::info!("Added custom story {} to {}", id, tier);
        Ok(id)
    }

    /// Remove a user-added puzzle from every tier and persist the catalog.
    ///
    /// Built-in ids are never removed; they return `Ok(false)`.
    pub async fn remove_custom(&self, id: &str) -> Result<bool, StoryError> {
        if !is_custom_id(id) {
            tracing::debug!("Refusing to remove built-in story {}", id);
            return Ok(false);
        }

        let _writer = self.writer.lock().await;

        let document = {
            let mut catalog = self.write();
            if catalog.remove(id) == 0 {
                return Ok(false);
            }
            catalog.to_document()
        };

        if let Err(e) = self.store.save(STORIES_KEY, &document).await {
            tracing::error!("Failed to save stories after removing {}: {}", id, e);
            return Err(e.into());
        }

        tracing::info!("Removed custom story {}", id);
        Ok(true)
    }

    fn next_custom_id(&self, catalog: &StoryCatalog) -> PuzzleId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let mut candidate = now.max(self.last_custom_id.load(Ordering::SeqCst) + 1);
        while catalog.contains_id(&format!("{CUSTOM_ID_PREFIX}{candidate}")) {
            candidate += 1;
        }
        self.last_custom_id.store(candidate, Ordering::SeqCst);
        format!("{CUSTOM_ID_PREFIX}{candidate}")
    }

    fn read<T>(&self, f: impl FnOnce(&StoryCatalog) -> T) -> T {
        match self.catalog.read() {
            Ok(guard) => f(&guard),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoryCatalog> {
        self.catalog
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn replace(&self, catalog: StoryCatalog) {
        *self.write() = catalog;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    fn draft(title: &str) -> PuzzleDraft {
        PuzzleDraft {
            title: Some(title.to_string()),
            situation: Some("一个人走进餐厅点了一碗海龟汤。".to_string()),
            truth: Some("真相".to_string()),
            background: Some("背景".to_string()),
            hints: Some(vec!["a".to_string()]),
        }
    }

    fn builtin(id: &str) -> Puzzle {
        Puzzle {
            id: id.to_string(),
            title: "built-in".to_string(),
            situation: "s".to_string(),
            truth: "t".to_string(),
            background: "b".to_string(),
            hints: vec![],
        }
    }

    fn memory_store() -> (Arc<MemoryStore>, StoryStore) {
        let memory = Arc::new(MemoryStore::new());
        let store = StoryStore::with_catalog(memory.clone(), StoryCatalog::empty());
        (memory, store)
    }

    #[tokio::test]
    async fn test_load_missing_catalog() {
        let catalog = load_catalog(&MemoryStore::new()).await;
        assert_eq!(catalog.tiers().count(), 4);
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_catalog() {
        let store = MemoryStore::new().with_document(STORIES_KEY, json!("garbage"));
        let catalog = load_catalog(&store).await;
        assert_eq!(catalog.tiers().count(), 4);
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_catalog_from_document_assigns_ids_and_skips_bad_entries() {
        let doc = json!({
            "easy": [
                {"title": "a", "situation": "s", "truth": "t", "background": "b", "hints": ["h"]},
                {"title": "broken"}
            ],
            "nightmare": [
                {"title": "x", "situation": "s", "truth": "t", "background": "b", "hints": []}
            ],
            "hard": "not a list"
        });
        let catalog = catalog_from_document(&doc);
        assert_eq!(catalog.tiers().count(), 4);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.tier(Tier::Easy)[0].id, "easy_0");
    }

    #[tokio::test]
    async fn test_rewrite_keeps_unplayable_content() {
        let memory = Arc::new(MemoryStore::new().with_document(
            STORIES_KEY,
            json!({
                "easy": [
                    {"id": "easy_0", "title": "a", "situation": "s", "truth": "t", "background": "b", "hints": []},
                    {"title": "broken"}
                ],
                "简单": [
                    {"id": "custom_1700000000", "title": "legacy", "situation": "s", "truth": "t", "background": "b", "hints": []}
                ]
            }),
        ));
        let store = StoryStore::open(memory.clone()).await;
        assert_eq!(store.catalog().len(), 1);

        let id = store.add_custom(draft("new"), Tier::Hard).await.unwrap();
        let doc = memory.document(STORIES_KEY).unwrap();
        assert_eq!(doc["简单"][0]["id"], "custom_1700000000");
        assert_eq!(doc["easy"][1], json!({"title": "broken"}));
        assert_eq!(doc["hard"][0]["id"], json!(id));

        // Legacy custom stories can still be deleted by id
        assert!(store.remove_custom("custom_1700000000").await.unwrap());
        let doc = memory.document(STORIES_KEY).unwrap();
        assert_eq!(doc["简单"], json!([]));
        assert_eq!(doc["easy"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_pick_random_empty_tier() {
        let (_, store) = memory_store();
        let mut rng = StdRng::seed_from_u64(1);
        let err = store.pick_random(Tier::Hard, &mut rng).unwrap_err();
        assert!(matches!(err, StoryError::EmptyTier(Tier::Hard)));
    }

    #[test]
    fn test_pick_random_stays_in_tier() {
        let mut catalog = StoryCatalog::empty();
        catalog.push(Tier::Easy, builtin("easy_0"));
        catalog.push(Tier::Medium, builtin("medium_0"));
        let store = StoryStore::with_catalog(Arc::new(MemoryStore::new()), catalog);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..10 {
            assert_eq!(store.pick_random(Tier::Easy, &mut rng).unwrap().id, "easy_0");
        }
    }

    #[tokio::test]
    async fn test_add_custom_persists_full_catalog() {
        let (memory, store) = memory_store();
        let id = store.add_custom(draft("新故事"), Tier::Hard).await.unwrap();

        assert!(id.starts_with(CUSTOM_ID_PREFIX));
        assert!(id[CUSTOM_ID_PREFIX.len()..].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(store.tier_len(Tier::Hard), 1);

        let doc = memory.document(STORIES_KEY).expect("catalog persisted");
        assert_eq!(doc["hard"][0]["id"], json!(id));
        assert_eq!(doc["easy"], json!([]));

        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(store.pick_random(Tier::Hard, &mut rng).unwrap().id, id);
    }

    #[tokio::test]
    async fn test_add_custom_rejects_missing_fields() {
        let (memory, store) = memory_store();
        let mut incomplete = draft("x");
        incomplete.background = None;
        incomplete.hints = None;

        let err = store.add_custom(incomplete, Tier::Easy).await.unwrap_err();
        match err {
            StoryError::Validation(msg) => {
                assert!(msg.contains("background"));
                assert!(msg.contains("hints"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.catalog().is_empty());
        assert!(memory.document(STORIES_KEY).is_none());
    }

    #[tokio::test]
    async fn test_rapid_additions_get_distinct_ids() {
        let (_, store) = memory_store();
        let a = store.add_custom(draft("a"), Tier::Easy).await.unwrap();
        let b = store.add_custom(draft("b"), Tier::Easy).await.unwrap();
        let c = store.add_custom(draft("c"), Tier::Medium).await.unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(store.catalog().len(), 3);
    }

    #[tokio::test]
    async fn test_add_then_remove_round_trip() {
        let mut catalog = StoryCatalog::empty();
        catalog.push(Tier::Hard, builtin("hard_0"));
        let store = StoryStore::with_catalog(Arc::new(MemoryStore::new()), catalog);
        let before = store.catalog();

        let id = store.add_custom(draft("temp"), Tier::Hard).await.unwrap();
        assert!(store.remove_custom(&id).await.unwrap());
        assert_eq!(store.catalog(), before);
        assert!(!store.remove_custom(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_builtin_is_noop() {
        let mut catalog = StoryCatalog::empty();
        catalog.push(Tier::Easy, builtin("easy_0"));
        let memory = Arc::new(MemoryStore::new());
        let store = StoryStore::with_catalog(memory.clone(), catalog);
        let before = store.catalog();

        assert!(!store.remove_custom("easy_0").await.unwrap());
        assert_eq!(store.catalog(), before);
        assert!(memory.document(STORIES_KEY).is_none());
    }

    #[tokio::test]
    async fn test_save_failure_keeps_in_memory_change() {
        let store = StoryStore::with_catalog(
            Arc::new(MemoryStore::new().failing_saves()),
            StoryCatalog::empty(),
        );
        let err = store.add_custom(draft("x"), Tier::Easy).await.unwrap_err();
        assert!(matches!(err, StoryError::Persist(_)));
        assert_eq!(store.tier_len(Tier::Easy), 1);
    }

    #[tokio::test]
    async fn test_seed_if_missing() {
        let memory = Arc::new(MemoryStore::new());
        let store = StoryStore::open(memory.clone()).await;
        let mut builtin_catalog = StoryCatalog::empty();
        builtin_catalog.push(Tier::Medium, builtin("medium_0"));

        assert!(store.seed_if_missing(builtin_catalog.clone()).await.unwrap());
        assert_eq!(store.tier_len(Tier::Medium), 1);
        assert!(memory.document(STORIES_KEY).is_some());

        // Second seed leaves the persisted catalog alone
        assert!(!store.seed_if_missing(StoryCatalog::empty()).await.unwrap());
        assert_eq!(store.tier_len(Tier::Medium), 1);
    }

    #[tokio::test]
    async fn test_open_reads_persisted_catalog() {
        let memory = Arc::new(MemoryStore::new().with_document(
            STORIES_KEY,
            json!({"extreme": [{"id": "x1", "title": "t", "situation": "s", "truth": "t", "background": "b", "hints": []}]}),
        ));
        let store = StoryStore::open(memory).await;
        assert_eq!(store.tier_len(Tier::Extreme), 1);
        assert_eq!(store.get("x1").map(|p| p.title), Some("t".to_string()));
    }
}
