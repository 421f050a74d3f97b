use std::{collections::HashMap, fmt};

use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{AssessmentId, CandidateId};
use storage::Storage;
use tokio::sync::Mutex;

/// String-keyed store for in-progress form state.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, payload: &str) -> Result<()>;
    async fn clear(&self, key: &str) -> Result<()>;
}

/// Which draft slot a form session reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DraftScope {
    /// A candidate taking the assessment.
    Response {
        assessment_id: AssessmentId,
        candidate_id: CandidateId,
    },
    /// A recruiter previewing the assessment.
    Preview { assessment_id: AssessmentId },
}

impl DraftScope {
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for DraftScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response {
                assessment_id,
                candidate_id,
            } => write!(f, "assessment-response-{assessment_id}-{candidate_id}"),
            Self::Preview { assessment_id } => write!(f, "assessment-preview-{assessment_id}"),
        }
    }
}

#[derive(Default)]
pub struct MemoryDraftStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, payload: &str) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[async_trait]
impl DraftStore for Storage {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        self.draft(key).await
    }

    async fn save(&self, key: &str, payload: &str) -> Result<()> {
        self.put_draft(key, payload).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.clear_draft(key).await.map(|_| ())
    }
}
