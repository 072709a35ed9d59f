//! Long-term memory: a flat L2 vector index persisted as JSON.
//!
//! Entries are `(vector, summary)` pairs. Search is exhaustive and returns
//! squared Euclidean distances, smallest first. The whole index is
//! rewritten to disk after every add, through `tokio::fs`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::QuorumError;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryEntry {
    vector: Vec<f32>,
    summary: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    dimension: usize,
    entries: Vec<MemoryEntry>,
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Recollection {
    pub summary: String,
    /// Squared L2 distance to the query
    pub distance: f32,
}

pub struct LongTermMemory {
    dimension: usize,
    path: Option<PathBuf>,
    entries: Vec<MemoryEntry>,
}

impl LongTermMemory {
    /// An empty index that never touches disk.
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            dimension,
            path: None,
            entries: Vec::new(),
        }
    }

    /// Load the index at `path`, or start empty if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            info!(path = %path.display(), "No long-term memory found, starting fresh");
            return Ok(Self {
                dimension,
                path: Some(path),
                entries: Vec::new(),
            });
        }

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read long-term memory from {}", path.display()))?;
        let file: IndexFile = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse long-term memory from {}", path.display()))?;

        if file.dimension != dimension {
            return Err(QuorumError::Memory(format!(
                "index at {} has dimension {}, expected {dimension}",
                path.display(),
                file.dimension
            ))
            .into());
        }

        info!(path = %path.display(), entries = file.entries.len(), "Long-term memory loaded");
        Ok(Self {
            dimension,
            path: Some(path),
            entries: file.entries,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append an entry and persist the index.
    pub async fn add(&mut self, vector: Vec<f32>, summary: impl Into<String>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(QuorumError::Memory(format!(
                "vector dimension mismatch: got {}, expected {}",
                vector.len(),
                self.dimension
            ))
            .into());
        }

        self.entries.push(MemoryEntry {
            vector,
            summary: summary.into(),
        });
        self.save().await
    }

    /// Up to `k` nearest entries, closest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Recollection>> {
        if query.len() != self.dimension {
            return Err(QuorumError::Memory(format!(
                "query dimension mismatch: got {}, expected {}",
                query.len(),
                self.dimension
            ))
            .into());
        }

        let mut hits: Vec<Recollection> = self
            .entries
            .iter()
            .map(|e| Recollection {
                summary: e.summary.clone(),
                distance: squared_l2(&e.vector, query),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let file = IndexFile {
            dimension: self.dimension,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialise long-term memory")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write long-term memory to {}", path.display()))?;

        debug!(path = %path.display(), entries = self.entries.len(), "Long-term memory saved");
        Ok(())
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
