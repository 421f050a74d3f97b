use super::*;
use shared::{
    domain::{AnswerValue, AssessmentSection, Question, QuestionId, QuestionKind, ResponseId, SectionId},
    ordering::{is_dense, RankOutOfRange},
};

async fn storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

fn new_job(title: &str) -> NewJob {
    NewJob {
        title: title.to_string(),
        tags: ["rust".to_string()].into_iter().collect(),
        ..NewJob::default()
    }
}

async fn board(storage: &Storage, titles: &[&str]) -> Vec<Job> {
    let mut jobs = Vec::new();
    for title in titles {
        let slug = shared::domain::slugify(title);
        jobs.push(storage.create_job(&new_job(title), &slug).await.expect("job"));
    }
    jobs
}

fn new_candidate(job_id: &JobId, name: &str) -> NewCandidate {
    NewCandidate {
        name: name.to_string(),
        email: format!("{}@email.com", name.to_lowercase().replace(' ', ".")),
        phone: None,
        stage: None,
        job_id: job_id.clone(),
        resume_url: None,
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = storage().await;
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("hiring.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[test]
fn normalizes_bare_paths_into_sqlite_urls() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(normalize_database_url(" data/hiring.db "), "sqlite://data/hiring.db");
    assert_eq!(normalize_database_url("sqlite:data\\hiring.db"), "sqlite://data/hiring.db");
    assert_eq!(
        normalize_database_url("postgres://db/hiring"),
        "postgres://db/hiring"
    );
}

#[test]
fn database_file_skips_memory_and_foreign_urls() {
    assert_eq!(
        database_file("sqlite://data/hiring.db?mode=rwc"),
        Some(Path::new("data/hiring.db"))
    );
    assert_eq!(
        database_file("sqlite:///var/lib/hiring.db"),
        Some(Path::new("/var/lib/hiring.db"))
    );
    assert_eq!(database_file("sqlite::memory:"), None);
    assert_eq!(database_file("sqlite://shared.db?mode=memory&cache=shared"), None);
    assert_eq!(database_file("sqlite://"), None);
    assert_eq!(database_file("postgres://db/hiring"), None);
    create_database_dir("sqlite://hiring.db").expect("bare file name needs no directory");
}

#[tokio::test]
async fn new_jobs_are_appended_at_the_bottom() {
    let storage = storage().await;
    let jobs = board(&storage, &["Frontend Developer", "Backend Engineer", "Data Scientist"]).await;

    assert_eq!(jobs.iter().map(|job| job.order).collect::<Vec<_>>(), [1, 2, 3]);
    let listed = storage.list_jobs().await.expect("list");
    assert_eq!(listed, jobs);
    assert_eq!(storage.count_jobs().await.expect("count"), 3);

    let by_slug = storage
        .job_by_slug("backend-engineer")
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(by_slug.id, jobs[1].id);
    assert!(by_slug.tags.contains("rust"));
}

#[tokio::test]
async fn duplicate_slug_is_rejected() {
    let storage = storage().await;
    board(&storage, &["Backend Engineer"]).await;
    let err = storage
        .create_job(&new_job("Backend Engineer"), "backend-engineer")
        .await;
    assert!(err.is_err());
}

#[tokio::test]
async fn reorder_moves_fifth_job_to_second() {
    let storage = storage().await;
    let jobs = board(&storage, &["A", "B", "C", "D", "E"]).await;

    storage
        .reorder_jobs(ReorderRequest::new(5, 2))
        .await
        .expect("reorder");

    let listed = storage.list_jobs().await.expect("list");
    let titles: Vec<_> = listed.iter().map(|job| job.title.as_str()).collect();
    assert_eq!(titles, ["A", "E", "B", "C", "D"]);
    assert!(is_dense(&listed));
    let moved = storage.job(&jobs[4].id).await.expect("get").expect("present");
    assert_eq!(moved.order, 2);
}

#[tokio::test]
async fn reorder_outside_the_board_changes_nothing() {
    let storage = storage().await;
    board(&storage, &["A", "B", "C"]).await;
    let before = storage.list_jobs().await.expect("list");

    assert!(storage.reorder_jobs(ReorderRequest::new(0, 2)).await.is_err());
    let err = storage
        .reorder_jobs(ReorderRequest::new(1, 4))
        .await
        .expect_err("past the end");
    assert_eq!(
        err.downcast_ref::<RankOutOfRange>(),
        Some(&RankOutOfRange {
            field: "to_order",
            value: 4,
            count: 3,
        })
    );
    storage
        .reorder_jobs(ReorderRequest::new(2, 2))
        .await
        .expect("noop");
    let err = storage
        .reorder_jobs(ReorderRequest::new(7, 7))
        .await
        .expect_err("noop outside the board");
    assert!(err.downcast_ref::<RankOutOfRange>().is_some());

    assert_eq!(storage.list_jobs().await.expect("list"), before);
}

#[tokio::test]
async fn deleting_a_job_closes_the_gap() {
    let storage = storage().await;
    let jobs = board(&storage, &["A", "B", "C", "D"]).await;

    assert!(storage.delete_job(&jobs[1].id).await.expect("delete"));
    assert!(!storage.delete_job(&jobs[1].id).await.expect("delete again"));

    let listed = storage.list_jobs().await.expect("list");
    let titles: Vec<_> = listed.iter().map(|job| job.title.as_str()).collect();
    assert_eq!(titles, ["A", "C", "D"]);
    assert!(is_dense(&listed));
}

#[tokio::test]
async fn update_job_keeps_its_position() {
    let storage = storage().await;
    let jobs = board(&storage, &["A", "B"]).await;
    let mut job = jobs[1].clone();
    job.title = "B2".into();
    job.status = JobStatus::Archived;
    job.order = 99;

    assert!(storage.update_job(&job).await.expect("update"));
    let stored = storage.job(&job.id).await.expect("get").expect("present");
    assert_eq!(stored.title, "B2");
    assert_eq!(stored.status, JobStatus::Archived);
    assert_eq!(stored.order, 2);
}

#[tokio::test]
async fn candidate_lifecycle_is_recorded_on_the_timeline() {
    let storage = storage().await;
    let job = board(&storage, &["Backend Engineer"]).await.remove(0);
    let candidate = storage
        .create_candidate(&new_candidate(&job.id, "Jane Doe"))
        .await
        .expect("candidate");
    assert_eq!(candidate.stage, CandidateStage::Applied);

    let updated = storage
        .update_candidate(&candidate.id, &CandidateUpdate {
            stage: Some(CandidateStage::Screen),
            ..CandidateUpdate::default()
        })
        .await
        .expect("update")
        .expect("present");
    assert_eq!(updated.stage, CandidateStage::Screen);

    let note = storage
        .add_note(&candidate.id, &NewNote {
            content: "Strong systems background, loop in @sam.lee for the tech round please".into(),
            author_id: "u-1".into(),
            author_name: "Alex".into(),
        })
        .await
        .expect("note")
        .expect("present");
    assert_eq!(note.mentions, ["sam.lee"]);

    let timeline = storage
        .candidate_timeline(&candidate.id)
        .await
        .expect("timeline");
    let descriptions: Vec<_> = timeline.iter().map(|e| e.description.as_str()).collect();
    assert_eq!(descriptions.len(), 3);
    assert!(descriptions.contains(&"Candidate applied for position"));
    assert!(descriptions.contains(&"Stage changed from applied to screen"));
    let note_event = timeline
        .iter()
        .find(|e| e.kind == TimelineEventKind::NoteAdded)
        .expect("note event");
    assert!(note_event.description.ends_with("..."));
    assert_eq!(note_event.created_by, "Alex");

    let stored = storage.candidate(&candidate.id).await.expect("get").expect("present");
    assert_eq!(stored.notes, vec![note]);
}

#[tokio::test]
async fn unchanged_stage_adds_no_event_and_unknown_ids_are_none() {
    let storage = storage().await;
    let job = board(&storage, &["A"]).await.remove(0);
    let candidate = storage
        .create_candidate(&new_candidate(&job.id, "Sam Lee"))
        .await
        .expect("candidate");

    storage
        .update_candidate(&candidate.id, &CandidateUpdate {
            stage: Some(CandidateStage::Applied),
            name: Some("Samuel Lee".into()),
            ..CandidateUpdate::default()
        })
        .await
        .expect("update");
    let timeline = storage.candidate_timeline(&candidate.id).await.expect("timeline");
    assert_eq!(timeline.len(), 1);

    let ghost = CandidateId::from("ghost");
    assert!(storage
        .update_candidate(&ghost, &CandidateUpdate::default())
        .await
        .expect("update")
        .is_none());
    assert!(storage
        .add_note(&ghost, &NewNote {
            content: "hi".into(),
            author_id: "u".into(),
            author_name: "U".into(),
        })
        .await
        .expect("note")
        .is_none());
}

fn sample_assessment(job_id: &JobId) -> Assessment {
    let now = Utc::now();
    Assessment {
        id: AssessmentId::from("assessment-backend-engineer"),
        job_id: job_id.clone(),
        title: "Backend Engineer Assessment".into(),
        description: None,
        sections: vec![AssessmentSection {
            id: SectionId::from("s1"),
            title: "Technical Skills".into(),
            description: None,
            order: 1,
            questions: vec![Question {
                id: QuestionId::from("q1"),
                title: "Years of experience?".into(),
                description: None,
                required: true,
                order: 1,
                show_if: None,
                kind: QuestionKind::Numeric {
                    min: Some(0.0),
                    max: Some(50.0),
                    step: None,
                },
            }],
        }],
        time_limit_minutes: Some(30),
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn assessment_upsert_replaces_definition_per_job() {
    let storage = storage().await;
    let job = board(&storage, &["Backend Engineer"]).await.remove(0);
    let first = storage
        .upsert_assessment(&sample_assessment(&job.id))
        .await
        .expect("insert");

    let mut revised = sample_assessment(&job.id);
    revised.id = AssessmentId::from("other-id");
    revised.title = "Revised".into();
    let stored = storage.upsert_assessment(&revised).await.expect("update");

    assert_eq!(stored.id, first.id);
    assert_eq!(stored.title, "Revised");
    assert_eq!(stored.sections, revised.sections);
    assert!(storage
        .assessment_for_job(&JobId::from("nope"))
        .await
        .expect("lookup")
        .is_none());
}

#[tokio::test]
async fn completed_response_is_stored_and_timelined() {
    let storage = storage().await;
    let job = board(&storage, &["Backend Engineer"]).await.remove(0);
    let assessment = storage
        .upsert_assessment(&sample_assessment(&job.id))
        .await
        .expect("assessment");
    let candidate = storage
        .create_candidate(&new_candidate(&job.id, "Jane Doe"))
        .await
        .expect("candidate");

    let mut answers = shared::domain::Answers::new();
    answers.insert(QuestionId::from("q1"), AnswerValue::Number(7.0));
    let response = AssessmentResponse {
        id: ResponseId::generate(),
        assessment_id: assessment.id.clone(),
        candidate_id: candidate.id.clone(),
        answers,
        started_at: Utc::now(),
        completed_at: Some(Utc::now()),
        score: None,
    };
    storage.save_response(&response).await.expect("save");

    let stored = storage
        .response_for(&assessment.id, &candidate.id)
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(stored.answers, response.answers);

    let timeline = storage.candidate_timeline(&candidate.id).await.expect("timeline");
    assert_eq!(timeline[0].kind, TimelineEventKind::AssessmentCompleted);
}

#[tokio::test]
async fn drafts_overwrite_and_clear() {
    let storage = storage().await;
    let key = "assessment-response-a1-c1";
    assert_eq!(storage.draft(key).await.expect("get"), None);

    storage.put_draft(key, r#"{"q1":"Yes"}"#).await.expect("put");
    storage.put_draft(key, r#"{"q1":"No"}"#).await.expect("put");
    assert_eq!(
        storage.draft(key).await.expect("get").as_deref(),
        Some(r#"{"q1":"No"}"#)
    );

    assert!(storage.clear_draft(key).await.expect("clear"));
    assert!(!storage.clear_draft(key).await.expect("clear again"));
}

#[tokio::test]
async fn snapshot_survives_clear_and_import() {
    let storage = storage().await;
    let jobs = board(&storage, &["A", "B", "C"]).await;
    storage.upsert_assessment(&sample_assessment(&jobs[0].id)).await.expect("assessment");
    let candidate = storage
        .create_candidate(&new_candidate(&jobs[0].id, "Jane Doe"))
        .await
        .expect("candidate");
    storage
        .add_note(&candidate.id, &NewNote {
            content: "short".into(),
            author_id: "u".into(),
            author_name: "U".into(),
        })
        .await
        .expect("note");

    let snapshot = storage.export_snapshot().await.expect("export");
    assert_eq!(snapshot.jobs.len(), 3);
    assert_eq!(snapshot.candidates[0].notes.len(), 1);
    assert_eq!(snapshot.timeline_events.len(), 2);

    assert!(storage.import_snapshot(&snapshot).await.is_err());
    assert_eq!(storage.count_jobs().await.expect("count"), 3);

    storage.clear_all().await.expect("clear");
    assert!(storage.export_snapshot().await.expect("export").is_empty());

    storage.import_snapshot(&snapshot).await.expect("import");
    assert_eq!(storage.export_snapshot().await.expect("export"), snapshot);
}
