use std::collections::BTreeSet;

use shared::{form, ordering::is_dense};

use super::*;

#[tokio::test]
async fn seed_builds_a_dense_board_with_assessments() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let summary = seed(&storage, 40).await.expect("seed");
    assert_eq!(
        summary,
        SeedSummary {
            jobs: SEED_JOBS,
            candidates: 40,
            assessments: SEED_ASSESSMENTS,
        }
    );

    let jobs = storage.list_jobs().await.expect("jobs");
    assert_eq!(jobs.len(), SEED_JOBS);
    assert!(is_dense(&jobs));
    let slugs: BTreeSet<_> = jobs.iter().map(|job| job.slug.as_str()).collect();
    assert_eq!(slugs.len(), SEED_JOBS);

    let candidates = storage.list_candidates().await.expect("candidates");
    assert_eq!(candidates.len(), 40);
    let stages: BTreeSet<_> = candidates.iter().map(|c| c.stage.as_str()).collect();
    assert_eq!(stages.len(), CandidateStage::ALL.len());

    for job in jobs.iter().take(SEED_ASSESSMENTS) {
        let assessment = storage
            .assessment_for_job(&job.id)
            .await
            .expect("query")
            .expect("assessment");
        assert!(form::check_conditions(&assessment).is_ok());
        assert_eq!(assessment.questions().count(), 6);
    }
    assert!(storage
        .assessment_for_job(&jobs[SEED_ASSESSMENTS].id)
        .await
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn seed_refuses_a_populated_store() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    seed(&storage, 0).await.expect("seed");
    assert!(seed(&storage, 0).await.is_err());

    storage.clear_all().await.expect("clear");
    seed(&storage, 0).await.expect("reseed");
}
