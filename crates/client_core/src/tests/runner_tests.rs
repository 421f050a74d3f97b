use std::sync::atomic::{AtomicUsize, Ordering};

use shared::{
    domain::{AssessmentId, AssessmentSection, CandidateId, JobId, QuestionKind, SectionId},
    error::{ApiError, ErrorCode},
    form::FieldError,
};
use storage::Storage;
use tokio::sync::Mutex;

use super::*;
use crate::drafts::MemoryDraftStore;

#[derive(Default)]
struct RecordingHandler {
    calls: AtomicUsize,
    received: Mutex<Option<Answers>>,
    fail: bool,
}

#[async_trait]
impl SubmitHandler for RecordingHandler {
    async fn submit(
        &self,
        _assessment: &Assessment,
        answers: &Answers,
        _started_at: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClientError::Api {
                status: 503,
                error: ApiError::new(ErrorCode::Internal, "unavailable"),
            });
        }
        *self.received.lock().await = Some(answers.clone());
        Ok(())
    }
}

fn question(id: &str, required: bool, show_if: Option<&str>, kind: QuestionKind) -> Question {
    Question {
        id: QuestionId::from(id),
        title: id.to_string(),
        description: None,
        required,
        order: 0,
        show_if: show_if.map(str::to_string),
        kind,
    }
}

fn screening() -> Assessment {
    let now = Utc::now();
    Assessment {
        id: AssessmentId::from("assessment-backend-engineer"),
        job_id: JobId::from("job-1"),
        title: "Backend Engineer Assessment".into(),
        description: None,
        sections: vec![AssessmentSection {
            id: SectionId::from("s1"),
            title: "Technical Skills".into(),
            description: None,
            order: 1,
            questions: vec![
                question("q1", true, None, QuestionKind::SingleChoice {
                    options: vec!["Yes".into(), "No".into()],
                }),
                question("q2", true, Some("q1 == 'Yes'"), QuestionKind::Numeric {
                    min: Some(0.0),
                    max: Some(100.0),
                    step: None,
                }),
                question("q3", false, None, QuestionKind::MultiChoice {
                    options: vec!["Docker".into(), "AWS".into(), "Kafka".into()],
                    min_selections: Some(1),
                    max_selections: Some(2),
                }),
            ],
        }],
        time_limit_minutes: Some(30),
        created_at: now,
        updated_at: now,
    }
}

fn scope() -> DraftScope {
    DraftScope::Response {
        assessment_id: AssessmentId::from("assessment-backend-engineer"),
        candidate_id: CandidateId::from("c-1"),
    }
}

#[tokio::test]
async fn answers_are_persisted_and_resumed() {
    let drafts: Arc<dyn DraftStore> = Arc::new(MemoryDraftStore::new());
    let mut runner = AssessmentRunner::open(screening(), scope(), drafts.clone())
        .await
        .expect("open");
    runner
        .set_answer(QuestionId::from("q1"), "Yes".into())
        .await
        .expect("answer");
    runner
        .set_answer(QuestionId::from("q2"), AnswerValue::Number(12.0))
        .await
        .expect("answer");

    let stored = drafts
        .load("assessment-response-assessment-backend-engineer-c-1")
        .await
        .expect("load")
        .expect("draft");
    assert!(stored.contains("\"q2\":12"));

    let resumed = AssessmentRunner::open(screening(), scope(), drafts)
        .await
        .expect("reopen");
    assert_eq!(resumed.answers(), runner.answers());
}

#[tokio::test]
async fn malformed_draft_starts_empty() {
    let drafts = Arc::new(MemoryDraftStore::new());
    drafts
        .save(&scope().key(), "{not json")
        .await
        .expect("seed");

    let runner = AssessmentRunner::open(screening(), scope(), drafts)
        .await
        .expect("open");
    assert!(runner.answers().is_empty());
}

#[tokio::test]
async fn visibility_follows_answers() {
    let mut runner = AssessmentRunner::open(screening(), scope(), Arc::new(MemoryDraftStore::new()))
        .await
        .expect("open");
    assert!(!runner.is_visible(&QuestionId::from("q2")));
    assert_eq!(runner.visible_questions().len(), 2);

    runner
        .set_answer(QuestionId::from("q1"), "Yes".into())
        .await
        .expect("answer");
    assert!(runner.is_visible(&QuestionId::from("q2")));
    assert_eq!(runner.visible_questions().len(), 3);
}

#[tokio::test]
async fn invalid_answers_never_reach_the_handler() {
    let mut runner = AssessmentRunner::open(screening(), scope(), Arc::new(MemoryDraftStore::new()))
        .await
        .expect("open");
    runner
        .set_answer(QuestionId::from("q1"), "Yes".into())
        .await
        .expect("answer");
    runner
        .set_answer(QuestionId::from("q2"), "150".into())
        .await
        .expect("answer");
    runner
        .set_answer(QuestionId::from("q3"), AnswerValue::selections(["Docker", "AWS", "Kafka"]))
        .await
        .expect("answer");

    let handler = RecordingHandler::default();
    let err = runner.submit(&handler).await.expect_err("invalid");
    let ClientError::Validation(errors) = &err else {
        panic!("expected validation error, got {err:?}");
    };
    assert_eq!(errors.get(&QuestionId::from("q2")), Some(&FieldError::AboveMax(100.0)));
    assert_eq!(
        errors.get(&QuestionId::from("q3")),
        Some(&FieldError::TooManySelections(2))
    );
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn hidden_required_question_does_not_block_submission() {
    let mut runner = AssessmentRunner::open(screening(), scope(), Arc::new(MemoryDraftStore::new()))
        .await
        .expect("open");
    runner
        .set_answer(QuestionId::from("q1"), "No".into())
        .await
        .expect("answer");

    let handler = RecordingHandler::default();
    runner.submit(&handler).await.expect("submit");
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(handler.received.lock().await.as_ref(), Some(runner.answers()));
}

#[tokio::test]
async fn failed_submission_keeps_answers_and_draft() {
    let drafts: Arc<dyn DraftStore> = Arc::new(MemoryDraftStore::new());
    let mut runner = AssessmentRunner::open(screening(), scope(), drafts.clone())
        .await
        .expect("open");
    runner
        .set_answer(QuestionId::from("q1"), "No".into())
        .await
        .expect("answer");
    let before = drafts.load(&scope().key()).await.expect("load");

    let handler = RecordingHandler {
        fail: true,
        ..RecordingHandler::default()
    };
    let err = runner.submit(&handler).await.expect_err("remote failure");
    assert!(matches!(err, ClientError::Api { status: 503, .. }));
    assert_eq!(runner.answers().len(), 1);
    assert_eq!(drafts.load(&scope().key()).await.expect("load"), before);
}

#[tokio::test]
async fn unknown_questions_are_rejected_and_discard_clears_the_draft() {
    let drafts: Arc<dyn DraftStore> = Arc::new(MemoryDraftStore::new());
    let mut runner = AssessmentRunner::open(screening(), scope(), drafts.clone())
        .await
        .expect("open");
    let err = runner
        .set_answer(QuestionId::from("q99"), "x".into())
        .await
        .expect_err("unknown");
    assert!(matches!(err, ClientError::UnknownQuestion(_)));

    runner
        .set_answer(QuestionId::from("q1"), "Yes".into())
        .await
        .expect("answer");
    runner.clear_answer(&QuestionId::from("q1")).await.expect("clear");
    assert_eq!(
        drafts.load(&scope().key()).await.expect("load").as_deref(),
        Some("{}")
    );

    runner.discard().await.expect("discard");
    assert_eq!(drafts.load(&scope().key()).await.expect("load"), None);
}

#[tokio::test]
async fn sqlite_drafts_share_the_same_key_space() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let drafts: Arc<dyn DraftStore> = Arc::new(storage.clone());
    let preview = DraftScope::Preview {
        assessment_id: AssessmentId::from("a-1"),
    };
    assert_eq!(preview.key(), "assessment-preview-a-1");

    let mut runner = AssessmentRunner::open(screening(), preview.clone(), drafts.clone())
        .await
        .expect("open");
    runner
        .set_answer(QuestionId::from("q1"), "No".into())
        .await
        .expect("answer");

    let raw = storage
        .draft("assessment-preview-a-1")
        .await
        .expect("draft")
        .expect("present");
    assert_eq!(raw, r#"{"q1":"No"}"#);

    let resumed = AssessmentRunner::open(screening(), preview, drafts)
        .await
        .expect("reopen");
    assert_eq!(resumed.answer(&QuestionId::from("q1")), Some(&AnswerValue::from("No")));
}
