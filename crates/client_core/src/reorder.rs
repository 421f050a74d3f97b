//! Optimistic reordering of the jobs board.
//!
//! Concurrent reorders are not serialized: each call snapshots whatever the
//! views hold when it starts, so when two overlap the later rollback or
//! refresh wins.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{Job, JobId},
    ordering::apply_reorder,
    protocol::{JobsQuery, Page, ReorderRequest},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    view_store::{ViewSnapshot, ViewStore},
};

#[async_trait]
pub trait JobsRemote: Send + Sync {
    async fn list_jobs(&self, query: &JobsQuery) -> Result<Page<Job>, ClientError>;
    async fn reorder_job(&self, job_id: &JobId, request: ReorderRequest) -> Result<(), ClientError>;
}

pub type JobViews = ViewStore<JobsQuery, Page<Job>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    /// Source and destination were equal; nothing happened.
    Unchanged,
    /// The server accepted the move.
    Applied,
}

pub struct ReorderCoordinator {
    remote: Arc<dyn JobsRemote>,
    views: Mutex<JobViews>,
    authoritative: JobsQuery,
}

impl ReorderCoordinator {
    /// `authoritative` is the view refetched after every reorder.
    pub fn new(remote: Arc<dyn JobsRemote>, authoritative: JobsQuery) -> Self {
        Self {
            remote,
            views: Mutex::new(ViewStore::new()),
            authoritative,
        }
    }

    /// Fetches a page from the remote and caches it.
    pub async fn load(&self, query: JobsQuery) -> Result<Page<Job>, ClientError> {
        let page = self.remote.list_jobs(&query).await?;
        self.views.lock().await.set(query, page.clone());
        Ok(page)
    }

    pub async fn view(&self, query: &JobsQuery) -> Option<Page<Job>> {
        self.views.lock().await.get(query).cloned()
    }

    pub async fn is_stale(&self, query: &JobsQuery) -> bool {
        self.views.lock().await.is_stale(query)
    }

    pub async fn snapshot(&self) -> ViewSnapshot<JobsQuery, Page<Job>> {
        self.views.lock().await.snapshot()
    }

    /// Moves the job at `from_order` to `to_order` in every cached view that
    /// holds it, then asks the remote to do the same. A remote failure
    /// restores all views to the pre-move snapshot and is returned as is.
    /// Either way the views are invalidated and the authoritative view is
    /// refetched once.
    pub async fn reorder(
        &self,
        job_id: &JobId,
        request: ReorderRequest,
    ) -> Result<ReorderOutcome, ClientError> {
        if request.is_noop() {
            return Ok(ReorderOutcome::Unchanged);
        }

        let snapshot = {
            let mut views = self.views.lock().await;
            let snapshot = views.snapshot();
            let touched = views.update_all(|page| apply_reorder(&mut page.items, request));
            debug!(
                job_id = %job_id,
                from = request.from_order,
                to = request.to_order,
                touched,
                "applied optimistic reorder"
            );
            snapshot
        };

        let result = self.remote.reorder_job(job_id, request).await;
        if let Err(error) = &result {
            warn!(job_id = %job_id, %error, "reorder failed; rolling back");
            self.views.lock().await.restore(snapshot);
        }

        self.reconcile().await;
        result.map(|()| {
            info!(job_id = %job_id, to = request.to_order, "reorder confirmed");
            ReorderOutcome::Applied
        })
    }

    async fn reconcile(&self) {
        self.views.lock().await.invalidate_all();
        match self.remote.list_jobs(&self.authoritative).await {
            Ok(page) => self
                .views
                .lock()
                .await
                .set(self.authoritative.clone(), page),
            Err(error) => warn!(%error, "refresh after reorder failed; views left stale"),
        }
    }
}

#[cfg(test)]
#[path = "tests/reorder_tests.rs"]
mod tests;
