use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use chrono::Utc;
use shared::{
    domain::JobStatus,
    error::{ApiError, ErrorCode},
    ordering::is_dense,
};
use tokio::sync::Notify;

use super::*;

struct FakeRemote {
    board: Mutex<Vec<Job>>,
    fail_reorder: AtomicBool,
    fail_list: AtomicBool,
    reorder_calls: AtomicUsize,
    list_calls: AtomicUsize,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeRemote {
    fn with_jobs(n: i64) -> Self {
        let now = Utc::now();
        let board = (1..=n)
            .map(|order| Job {
                id: JobId(format!("job-{order}")),
                title: format!("Job {order}"),
                slug: format!("job-{order}"),
                status: JobStatus::Active,
                tags: Default::default(),
                order,
                description: None,
                requirements: Vec::new(),
                created_at: now,
                updated_at: now,
            })
            .collect();
        Self {
            board: Mutex::new(board),
            fail_reorder: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
            reorder_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    fn gated(mut self, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        self.gate = Some((entered, release));
        self
    }
}

fn server_error() -> ClientError {
    ClientError::Api {
        status: 500,
        error: ApiError::new(ErrorCode::Internal, "Failed to reorder jobs"),
    }
}

#[async_trait]
impl JobsRemote for FakeRemote {
    async fn list_jobs(&self, query: &JobsQuery) -> Result<Page<Job>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        let mut jobs = self.board.lock().await.clone();
        jobs.sort_by_key(|job| job.order);
        Ok(Page::from_items(
            jobs,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(10),
        ))
    }

    async fn reorder_job(&self, _job_id: &JobId, request: ReorderRequest) -> Result<(), ClientError> {
        self.reorder_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if self.fail_reorder.load(Ordering::SeqCst) {
            return Err(server_error());
        }
        let mut board = self.board.lock().await;
        apply_reorder(board.as_mut_slice(), request);
        Ok(())
    }
}

fn page_query(page: u32, page_size: u32) -> JobsQuery {
    JobsQuery {
        page: Some(page),
        page_size: Some(page_size),
        ..JobsQuery::default()
    }
}

fn ids(page: &Page<Job>) -> Vec<&str> {
    page.items.iter().map(|job| job.id.as_str()).collect()
}

#[tokio::test]
async fn successful_reorder_refreshes_authoritative_view() {
    let remote = Arc::new(FakeRemote::with_jobs(5));
    let board = JobsQuery::default();
    let coordinator = ReorderCoordinator::new(remote.clone(), board.clone());
    coordinator.load(board.clone()).await.expect("load");

    let outcome = coordinator
        .reorder(&JobId::from("job-5"), ReorderRequest::new(5, 2))
        .await
        .expect("reorder");
    assert_eq!(outcome, ReorderOutcome::Applied);

    let view = coordinator.view(&board).await.expect("cached");
    assert_eq!(ids(&view), ["job-1", "job-5", "job-2", "job-3", "job-4"]);
    assert!(is_dense(&view.items));
    assert!(!coordinator.is_stale(&board).await);
    assert_eq!(remote.list_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn optimistic_order_is_visible_before_the_remote_answers() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let remote = Arc::new(FakeRemote::with_jobs(5).gated(entered.clone(), release.clone()));
    let board = JobsQuery::default();
    let coordinator = Arc::new(ReorderCoordinator::new(remote.clone(), board.clone()));
    coordinator.load(board.clone()).await.expect("load");

    let task = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .reorder(&JobId::from("job-1"), ReorderRequest::new(1, 4))
                .await
        }
    });

    entered.notified().await;
    let pending = coordinator.view(&board).await.expect("cached");
    assert_eq!(ids(&pending), ["job-2", "job-3", "job-4", "job-1", "job-5"]);
    assert_eq!(remote.board.lock().await[0].order, 1);

    release.notify_one();
    let outcome = task.await.expect("join").expect("reorder");
    assert_eq!(outcome, ReorderOutcome::Applied);
}

#[tokio::test]
async fn failure_restores_every_view_from_the_snapshot() {
    let remote = Arc::new(FakeRemote::with_jobs(8));
    let board = page_query(1, 4);
    let second = page_query(2, 4);
    let coordinator = ReorderCoordinator::new(remote.clone(), board.clone());
    coordinator.load(board.clone()).await.expect("load");
    coordinator.load(second.clone()).await.expect("load");
    let before_first = coordinator.view(&board).await.expect("cached");
    let before_second = coordinator.view(&second).await.expect("cached");

    remote.fail_reorder.store(true, Ordering::SeqCst);
    remote.fail_list.store(true, Ordering::SeqCst);
    let err = coordinator
        .reorder(&JobId::from("job-3"), ReorderRequest::new(3, 1))
        .await
        .expect_err("remote failure");
    assert_eq!(err.code(), Some(ErrorCode::Internal));

    assert_eq!(coordinator.view(&board).await, Some(before_first));
    assert_eq!(coordinator.view(&second).await, Some(before_second));
    assert!(coordinator.is_stale(&board).await);
    assert!(coordinator.is_stale(&second).await);
}

#[tokio::test]
async fn failure_then_refresh_matches_the_server() {
    let remote = Arc::new(FakeRemote::with_jobs(5));
    let board = JobsQuery::default();
    let coordinator = ReorderCoordinator::new(remote.clone(), board.clone());
    let before = coordinator.load(board.clone()).await.expect("load");

    remote.fail_reorder.store(true, Ordering::SeqCst);
    assert!(coordinator
        .reorder(&JobId::from("job-5"), ReorderRequest::new(5, 2))
        .await
        .is_err());

    assert_eq!(coordinator.view(&board).await, Some(before));
    assert!(!coordinator.is_stale(&board).await);
}

#[tokio::test]
async fn same_position_makes_no_remote_call() {
    let remote = Arc::new(FakeRemote::with_jobs(3));
    let board = JobsQuery::default();
    let coordinator = ReorderCoordinator::new(remote.clone(), board.clone());
    coordinator.load(board.clone()).await.expect("load");
    let before = coordinator.snapshot().await;

    let outcome = coordinator
        .reorder(&JobId::from("job-2"), ReorderRequest::new(2, 2))
        .await
        .expect("noop");

    assert_eq!(outcome, ReorderOutcome::Unchanged);
    assert_eq!(remote.reorder_calls.load(Ordering::SeqCst), 0);
    assert_eq!(remote.list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.snapshot().await, before);
}

#[tokio::test]
async fn page_without_the_moved_job_is_left_alone_until_refresh() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let remote = Arc::new(FakeRemote::with_jobs(8).gated(entered.clone(), release.clone()));
    let board = page_query(1, 4);
    let second = page_query(2, 4);
    let coordinator = Arc::new(ReorderCoordinator::new(remote.clone(), board.clone()));
    coordinator.load(board.clone()).await.expect("load");
    let untouched = coordinator.load(second.clone()).await.expect("load");

    let task = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            coordinator
                .reorder(&JobId::from("job-1"), ReorderRequest::new(1, 3))
                .await
        }
    });
    entered.notified().await;
    assert_eq!(coordinator.view(&second).await, Some(untouched));
    release.notify_one();
    task.await.expect("join").expect("reorder");

    assert!(coordinator.is_stale(&second).await);
    assert!(!coordinator.is_stale(&board).await);
}
