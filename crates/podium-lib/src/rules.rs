//! Rule store keyed by rule id
//!
//! Optionally mirrored to a JSON file that is rewritten atomically after
//! every change and read back on construction.

use crate::models::{RuleState, TrafficRule};
use crate::observability::PodiumMetrics;
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

#[derive(Default)]
pub struct RuleStore {
    rules: DashMap<String, (u64, TrafficRule)>,
    next_seq: AtomicU64,
    path: Option<PathBuf>,
    metrics: PodiumMetrics,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store mirrored to `path`, loading whatever the file already holds
    pub fn with_persistence(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            path: Some(path.into()),
            ..Default::default()
        };
        if let Some(path) = store.path.as_deref().filter(|p| p.exists()) {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read rule file {:?}", path))?;
            let rules: Vec<TrafficRule> =
                serde_json::from_slice(&data).context("Failed to parse rule file")?;
            info!(path = %path.display(), rules = rules.len(), "Loaded rules from disk");
            store.insert_all(rules);
        }
        Ok(store)
    }

    fn insert_all(&self, rules: Vec<TrafficRule>) -> usize {
        let mut added = 0;
        for rule in rules {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            if self.rules.insert(rule.ruleid.clone(), (seq, rule)).is_none() {
                added += 1;
            }
        }
        self.metrics.set_rules_registered(self.rules.len());
        added
    }

    /// Add (or replace) rules by rule id
    pub fn add_rules(&self, rules: Vec<TrafficRule>) -> usize {
        let added = self.insert_all(rules);
        self.persist_logged();
        added
    }

    pub fn get(&self, ruleid: &str) -> Option<TrafficRule> {
        self.rules.get(ruleid).map(|r| r.value().1.clone())
    }

    /// Rules issued under `reqid`, in the order they were added
    pub fn by_reqid(&self, reqid: &str) -> Vec<TrafficRule> {
        let mut matched: Vec<(u64, TrafficRule)> = self
            .rules
            .iter()
            .filter(|r| r.value().1.reqid == reqid)
            .map(|r| r.value().clone())
            .collect();
        matched.sort_by_key(|(seq, _)| *seq);
        matched.into_iter().map(|(_, rule)| rule).collect()
    }

    /// Move the given rules to `state`; unknown ids are ignored
    pub fn set_state<'a>(&self, ruleids: impl IntoIterator<Item = &'a str>, state: RuleState) {
        let mut changed = false;
        for ruleid in ruleids {
            if let Some(mut entry) = self.rules.get_mut(ruleid) {
                entry.value_mut().1.state = state;
                changed = true;
            }
        }
        if changed {
            self.persist_logged();
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn persist_logged(&self) {
        if let Some(path) = self.path.as_deref() {
            if let Err(e) = self.save_to_disk(path) {
                warn!(path = %path.display(), error = %e, "Failed to persist rules");
            }
        }
    }

    fn save_to_disk(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut ordered: Vec<(u64, TrafficRule)> =
            self.rules.iter().map(|r| r.value().clone()).collect();
        ordered.sort_by_key(|(seq, _)| *seq);
        let rules: Vec<&TrafficRule> = ordered.iter().map(|(_, rule)| rule).collect();
        let json = serde_json::to_vec_pretty(&rules).context("Failed to serialize rules")?;

        let temp_path = path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;
        file.write_all(&json).context("Failed to write rules")?;
        file.sync_all().context("Failed to sync rule file")?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
        Ok(())
    }
}
