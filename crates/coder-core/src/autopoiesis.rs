//! Autopoiesis: accept/reject pattern learning
//!
//! Counts rejections per `action:reason` and acceptances per action. Once a
//! count reaches its threshold every further event is mirrored to the
//! attached [`LearningStore`], and a new instance hydrates from those
//! records so earlier learning applies from the first task.

use crate::config::CoderConfig;
use crate::error::StoreError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Store predicate for persisted rejection patterns: `(action, reason)`
pub const AVOID_PATTERN: &str = "avoid_pattern";
/// Store predicate for persisted acceptance patterns: `(action)`
pub const PREFERRED_PATTERN: &str = "preferred_pattern";

/// One persisted tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedRecord {
    /// Positional arguments after the predicate
    pub args: Vec<String>,
}

/// Durable mirror for learned patterns
#[async_trait::async_trait]
pub trait LearningStore: Send + Sync {
    async fn save(
        &self,
        shard: &str,
        predicate: &str,
        args: &[String],
        extra: &serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn load_by_predicate(
        &self,
        shard: &str,
        predicate: &str,
    ) -> Result<Vec<LearnedRecord>, StoreError>;
}

/// Patterns at or above their thresholds
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LearnedPatterns {
    /// `action:reason` -> rejection count
    pub avoid: BTreeMap<String, u32>,
    /// action -> acceptance count
    pub preferred: BTreeMap<String, u32>,
}

impl LearnedPatterns {
    /// True when neither map has entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.avoid.is_empty() && self.preferred.is_empty()
    }
}

#[derive(Debug, Default)]
struct Counters {
    rejections: BTreeMap<String, u32>,
    acceptances: BTreeMap<String, u32>,
}

/// Learning counters with an optional persistent mirror
pub struct Autopoiesis {
    counters: Mutex<Counters>,
    store: Option<Arc<dyn LearningStore>>,
    shard: String,
    rejection_threshold: u32,
    acceptance_threshold: u32,
}

impl fmt::Debug for Autopoiesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counters = self.counters.lock();
        f.debug_struct("Autopoiesis")
            .field("shard", &self.shard)
            .field("rejections", &counters.rejections.len())
            .field("acceptances", &counters.acceptances.len())
            .field("has_store", &self.store.is_some())
            .finish()
    }
}

impl Autopoiesis {
    /// Create with explicit thresholds
    #[must_use]
    pub fn new(shard: impl Into<String>, rejection_threshold: u32, acceptance_threshold: u32) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            store: None,
            shard: shard.into(),
            rejection_threshold,
            acceptance_threshold,
        }
    }

    /// Create from configuration
    #[must_use]
    pub fn from_config(config: &CoderConfig) -> Self {
        Self::new(
            config.learning_shard.clone(),
            config.rejection_threshold,
            config.acceptance_threshold,
        )
    }

    /// Attach a persistent store
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn LearningStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Whether a learning store is attached
    #[must_use]
    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Counter key for a rejection
    #[must_use]
    pub fn rejection_key(action: &str, reason: &str) -> String {
        format!("{action}:{reason}")
    }

    /// Record a rejection; returns the new count
    pub async fn track_rejection(&self, action: &str, reason: &str) -> u32 {
        let key = Self::rejection_key(action, reason);
        let count = {
            let mut counters = self.counters.lock();
            let entry = counters.rejections.entry(key.clone()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };
        tracing::debug!(%key, count, "rejection tracked");

        if count >= self.rejection_threshold {
            let args = [action.to_string(), reason.to_string()];
            self.persist(AVOID_PATTERN, &args, &key, count).await;
        }
        count
    }

    /// Record an acceptance; returns the new count
    pub async fn track_acceptance(&self, action: &str) -> u32 {
        let count = {
            let mut counters = self.counters.lock();
            let entry = counters.acceptances.entry(action.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };
        tracing::debug!(action, count, "acceptance tracked");

        if count >= self.acceptance_threshold {
            let args = [action.to_string()];
            self.persist(PREFERRED_PATTERN, &args, action, count).await;
        }
        count
    }

    /// Hydrate counters from the store
    ///
    /// Each key starts at `threshold + saves - 1` so a single save restores
    /// exactly the threshold. Counters never decrease. Returns the number of
    /// keys hydrated.
    ///
    /// # Errors
    /// Returns the store error; counters are left untouched in that case.
    pub async fn load_learned_patterns(&self) -> Result<usize, StoreError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let avoid = store.load_by_predicate(&self.shard, AVOID_PATTERN).await?;
        let preferred = store.load_by_predicate(&self.shard, PREFERRED_PATTERN).await?;

        let mut avoid_saves: BTreeMap<String, u32> = BTreeMap::new();
        for record in avoid {
            match record.args.as_slice() {
                [action, reason] => {
                    *avoid_saves.entry(Self::rejection_key(action, reason)).or_insert(0) += 1;
                }
                other => tracing::debug!(args = ?other, "skipping malformed avoid_pattern record"),
            }
        }

        let mut preferred_saves: BTreeMap<String, u32> = BTreeMap::new();
        for record in preferred {
            match record.args.as_slice() {
                [action] => *preferred_saves.entry(action.clone()).or_insert(0) += 1,
                other => tracing::debug!(args = ?other, "skipping malformed preferred_pattern record"),
            }
        }

        let hydrated = avoid_saves.len() + preferred_saves.len();
        let mut counters = self.counters.lock();
        for (key, saves) in avoid_saves {
            let value = self.rejection_threshold + saves - 1;
            let entry = counters.rejections.entry(key).or_insert(0);
            *entry = (*entry).max(value);
        }
        for (action, saves) in preferred_saves {
            let value = self.acceptance_threshold + saves - 1;
            let entry = counters.acceptances.entry(action).or_insert(0);
            *entry = (*entry).max(value);
        }
        drop(counters);

        tracing::info!(shard = %self.shard, keys = hydrated, "learned patterns loaded");
        Ok(hydrated)
    }

    /// Rejections seen for an `action:reason` key
    #[must_use]
    pub fn rejection_count(&self, key: &str) -> u32 {
        self.counters.lock().rejections.get(key).copied().unwrap_or(0)
    }

    /// Acceptances seen for an action
    #[must_use]
    pub fn acceptance_count(&self, action: &str) -> u32 {
        self.counters.lock().acceptances.get(action).copied().unwrap_or(0)
    }

    /// Snapshot of patterns at or above threshold
    #[must_use]
    pub fn learned_patterns(&self) -> LearnedPatterns {
        let counters = self.counters.lock();
        LearnedPatterns {
            avoid: counters
                .rejections
                .iter()
                .filter(|(_, &n)| n >= self.rejection_threshold)
                .map(|(k, &n)| (k.clone(), n))
                .collect(),
            preferred: counters
                .acceptances
                .iter()
                .filter(|(_, &n)| n >= self.acceptance_threshold)
                .map(|(k, &n)| (k.clone(), n))
                .collect(),
        }
    }

    async fn persist(&self, predicate: &str, args: &[String], key: &str, count: u32) {
        let Some(store) = &self.store else {
            return;
        };
        let extra = serde_json::json!({
            "key": key,
            "count": count,
            "recorded_at": chrono::Utc::now().to_rfc3339(),
        });
        if let Err(e) = store.save(&self.shard, predicate, args, &extra).await {
            tracing::warn!(predicate, %key, error = %e, "failed to persist learned pattern");
        }
    }
}
