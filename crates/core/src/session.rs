use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("score store unavailable: {0}")]
    Unavailable(String),
}

/// Per-user score persistence. The game engine never touches it.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn get(&self, user_id: &UserId) -> Result<Option<i64>, StoreError>;
    async fn set(&self, user_id: &UserId, score: i64) -> Result<(), StoreError>;

    /// Adds `delta` to the stored score in one step, starting from `initial` when the user
    /// has none, and returns the new score. A concurrent `set` lands either before or after
    /// the adjustment, never in the middle of it.
    async fn adjust(&self, user_id: &UserId, initial: i64, delta: i64) -> Result<i64, StoreError>;
}

#[derive(Default)]
pub struct InMemoryScoreStore {
    scores: RwLock<HashMap<UserId, i64>>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.scores.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.scores.read().await.is_empty()
    }
}

#[async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn get(&self, user_id: &UserId) -> Result<Option<i64>, StoreError> {
        let scores = self.scores.read().await;
        Ok(scores.get(user_id).copied())
    }

    async fn set(&self, user_id: &UserId, score: i64) -> Result<(), StoreError> {
        let mut scores = self.scores.write().await;
        scores.insert(user_id.clone(), score);
        Ok(())
    }

    async fn adjust(&self, user_id: &UserId, initial: i64, delta: i64) -> Result<i64, StoreError> {
        let mut scores = self.scores.write().await;
        let score = scores.entry(user_id.clone()).or_insert(initial);
        *score = score.saturating_add(delta);
        Ok(*score)
    }
}
