//! Dataset directory loading.
//!
//! Mirrors the layout the generator produces: single JSON arrays for
//! users, categories, products and transactions, and sessions chunked
//! across `sessions_0.json`, `sessions_1.json`, … to keep individual
//! files small.

use crate::error::{Error, Result};
use crate::types::{AnalysisWindow, Category, Product, Session, Transaction, User};
use serde::de::DeserializeOwned;
use std::path::Path;

/// A dataset exactly as the generator wrote it, before validation.
#[derive(Debug, Clone, Default)]
pub struct RawDataset {
    pub users: Vec<User>,
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
    pub sessions: Vec<Session>,
    pub transactions: Vec<Transaction>,
}

impl RawDataset {
    /// Load a generated dataset directory.
    ///
    /// Session chunks are discovered with a `sessions_*.json` glob and
    /// read in lexicographic order.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let users: Vec<User> = read_entity_file(&dir.join("users.json"))?;
        let categories: Vec<Category> = read_entity_file(&dir.join("categories.json"))?;
        let products: Vec<Product> = read_entity_file(&dir.join("products.json"))?;
        let transactions: Vec<Transaction> = read_entity_file(&dir.join("transactions.json"))?;

        let pattern = dir.join("sessions_*.json");
        let pattern = pattern
            .to_str()
            .ok_or_else(|| Error::Config(format!("non-UTF-8 dataset path: {:?}", dir)))?;

        let mut chunk_paths: Vec<_> = glob::glob(pattern)
            .map_err(|e| Error::Config(format!("bad session glob pattern: {}", e)))?
            .filter_map(|entry| entry.ok())
            .collect();
        chunk_paths.sort();

        let mut sessions = Vec::new();
        for path in &chunk_paths {
            let chunk: Vec<Session> = read_entity_file(path)?;
            tracing::debug!(path = %path.display(), sessions = chunk.len(), "Loaded session chunk");
            sessions.extend(chunk);
        }

        tracing::info!(
            users = users.len(),
            categories = categories.len(),
            products = products.len(),
            sessions = sessions.len(),
            session_chunks = chunk_paths.len(),
            transactions = transactions.len(),
            "Dataset loaded"
        );

        Ok(Self {
            users,
            categories,
            products,
            sessions,
            transactions,
        })
    }

    /// Total number of input records across all entity kinds.
    pub fn record_count(&self) -> usize {
        self.users.len()
            + self.categories.len()
            + self.products.len()
            + self.sessions.len()
            + self.transactions.len()
    }

    /// Infer the observation window from the data: `days` long, ending
    /// just after the latest observed activity.
    ///
    /// Returns `None` when there are no sessions or transactions to
    /// anchor the window on.
    pub fn infer_window(&self, days: u32) -> Option<AnalysisWindow> {
        let latest_tx = self.transactions.iter().map(|t| t.timestamp).max();
        let latest_session = self.sessions.iter().map(|s| s.last_activity()).max();

        let latest = match (latest_tx, latest_session) {
            (Some(a), Some(b)) => a.max(b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return None,
        };

        // end is exclusive; nudge past the latest instant so it is inside
        Some(AnalysisWindow::from_end(latest + chrono::Duration::seconds(1), days))
    }
}

fn read_entity_file<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })?;
    let records = serde_json::from_str(&content)?;
    Ok(records)
}
