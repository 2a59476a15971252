//! Kernel contract and in-memory reference store
//!
//! The logic kernel itself lives outside the edit pipeline. [`Kernel`] is the
//! seam the pipeline talks through; [`InMemoryKernel`] is a ground-fact store
//! used when no external kernel is wired in, and by tests.

use crate::error::KernelError;
use crate::fact::Fact;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Fact store with assert/retract/query
#[async_trait::async_trait]
pub trait Kernel: Send + Sync {
    /// Assert a fact
    async fn assert_fact(&self, fact: Fact) -> Result<(), KernelError>;

    /// Retract a fact (no-op when absent)
    async fn retract_fact(&self, fact: &Fact) -> Result<(), KernelError>;

    /// All facts for a predicate
    async fn query(&self, predicate: &str) -> Result<Vec<Fact>, KernelError>;

    /// Load a policy file
    async fn load_policy_file(&self, path: &Path) -> Result<(), KernelError>;
}

/// Ground-fact kernel with set semantics per predicate
#[derive(Debug)]
pub struct InMemoryKernel {
    facts: RwLock<BTreeMap<String, Vec<Fact>>>,
    loaded_policies: Mutex<HashSet<PathBuf>>,
    available: AtomicBool,
}

impl InMemoryKernel {
    /// Create empty kernel
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            facts: RwLock::new(BTreeMap::new()),
            loaded_policies: Mutex::new(HashSet::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Create kernel seeded with facts
    #[must_use]
    pub fn with_facts(facts: impl IntoIterator<Item = Fact>) -> Self {
        let kernel = Self::new();
        for fact in facts {
            kernel.insert(fact);
        }
        kernel
    }

    /// Synchronous insert (setup helper); returns false for duplicates
    pub fn insert(&self, fact: Fact) -> bool {
        let mut guard = self.facts.write();
        let bucket = guard.entry(fact.predicate.clone()).or_default();
        if bucket.contains(&fact) {
            return false;
        }
        bucket.push(fact);
        true
    }

    /// Synchronous snapshot of one predicate
    #[must_use]
    pub fn facts(&self, predicate: &str) -> Vec<Fact> {
        self.facts
            .read()
            .get(predicate)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the exact fact is present
    #[must_use]
    pub fn contains(&self, fact: &Fact) -> bool {
        self.facts
            .read()
            .get(&fact.predicate)
            .is_some_and(|bucket| bucket.contains(fact))
    }

    /// Total fact count
    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.read().values().map(Vec::len).sum()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Toggle availability; when unavailable every call fails
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of policy files loaded
    #[must_use]
    pub fn loaded_policy_count(&self) -> usize {
        self.loaded_policies.lock().len()
    }

    fn check_available(&self) -> Result<(), KernelError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(KernelError::Unavailable("in-memory kernel offline".to_string()))
        }
    }
}

impl Default for InMemoryKernel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Kernel for InMemoryKernel {
    async fn assert_fact(&self, fact: Fact) -> Result<(), KernelError> {
        self.check_available()?;
        self.insert(fact);
        Ok(())
    }

    async fn retract_fact(&self, fact: &Fact) -> Result<(), KernelError> {
        self.check_available()?;
        let mut guard = self.facts.write();
        if let Some(bucket) = guard.get_mut(&fact.predicate) {
            bucket.retain(|f| f != fact);
            if bucket.is_empty() {
                guard.remove(&fact.predicate);
            }
        }
        Ok(())
    }

    async fn query(&self, predicate: &str) -> Result<Vec<Fact>, KernelError> {
        self.check_available()?;
        Ok(self.facts(predicate))
    }

    async fn load_policy_file(&self, path: &Path) -> Result<(), KernelError> {
        self.check_available()?;
        let already_loaded = self.loaded_policies.lock().contains(path);
        if already_loaded {
            tracing::debug!(path = %path.display(), "policy already loaded");
            return Ok(());
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| KernelError::PolicyIo {
                path: path.to_path_buf(),
                source,
            })?;

        let mut parsed = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
                continue;
            }
            if line.contains(":-") || line.starts_with("Decl ") {
                tracing::debug!(line = idx + 1, "skipping rule in policy file");
                continue;
            }
            let fact = Fact::parse(line).map_err(|source| KernelError::PolicySyntax {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
            parsed.push(fact);
        }

        let count = parsed.len();
        for fact in parsed {
            self.insert(fact);
        }
        self.loaded_policies.lock().insert(path.to_path_buf());
        tracing::info!(path = %path.display(), facts = count, "policy loaded");
        Ok(())
    }
}
