//! A single fill-in session over an assessment: answers, visibility,
//! validation, draft persistence and submission.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{AnswerValue, Answers, Assessment, Question, QuestionId},
    form::{self, ValidationErrors},
};
use tracing::{debug, info, warn};

use crate::{
    drafts::{DraftScope, DraftStore},
    error::ClientError,
};

/// Receives the full answer map once local validation passes.
#[async_trait]
pub trait SubmitHandler: Send + Sync {
    async fn submit(
        &self,
        assessment: &Assessment,
        answers: &Answers,
        started_at: DateTime<Utc>,
    ) -> Result<(), ClientError>;
}

pub struct AssessmentRunner {
    assessment: Assessment,
    scope: DraftScope,
    drafts: Arc<dyn DraftStore>,
    answers: Answers,
    started_at: DateTime<Utc>,
}

impl AssessmentRunner {
    /// Starts a session, resuming from the stored draft when one exists. A
    /// draft that no longer parses is dropped with a warning.
    pub async fn open(
        assessment: Assessment,
        scope: DraftScope,
        drafts: Arc<dyn DraftStore>,
    ) -> Result<Self, ClientError> {
        let key = scope.key();
        let stored = drafts.load(&key).await.map_err(ClientError::Drafts)?;
        let answers = match stored {
            None => Answers::new(),
            Some(raw) => match serde_json::from_str::<Answers>(&raw) {
                Ok(answers) => {
                    debug!(%key, restored = answers.len(), "resumed draft");
                    answers
                }
                Err(error) => {
                    warn!(%key, %error, "ignoring malformed draft");
                    Answers::new()
                }
            },
        };

        Ok(Self {
            assessment,
            scope,
            drafts,
            answers,
            started_at: Utc::now(),
        })
    }

    pub fn assessment(&self) -> &Assessment {
        &self.assessment
    }

    pub fn scope(&self) -> &DraftScope {
        &self.scope
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn answer(&self, question_id: &QuestionId) -> Option<&AnswerValue> {
        self.answers.get(question_id)
    }

    /// Records an answer and overwrites the stored draft.
    pub async fn set_answer(
        &mut self,
        question_id: QuestionId,
        value: AnswerValue,
    ) -> Result<(), ClientError> {
        if self.question(&question_id).is_none() {
            return Err(ClientError::UnknownQuestion(question_id));
        }
        self.answers.insert(question_id, value);
        self.persist().await
    }

    pub async fn clear_answer(&mut self, question_id: &QuestionId) -> Result<(), ClientError> {
        if self.answers.remove(question_id).is_some() {
            self.persist().await?;
        }
        Ok(())
    }

    pub fn question(&self, question_id: &QuestionId) -> Option<&Question> {
        self.assessment
            .questions()
            .find(|question| &question.id == question_id)
    }

    pub fn visible_questions(&self) -> Vec<&Question> {
        form::visible_questions(&self.assessment, &self.answers)
    }

    pub fn is_visible(&self, question_id: &QuestionId) -> bool {
        self.question(question_id)
            .is_some_and(|question| form::is_visible(question, &self.answers))
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        form::validate(&self.assessment, &self.answers)
    }

    /// Validates locally and only then hands the answers to `handler`. The
    /// draft is kept either way so a failed attempt can be retried.
    pub async fn submit(&self, handler: &dyn SubmitHandler) -> Result<(), ClientError> {
        if let Err(errors) = self.validate() {
            debug!(key = %self.scope, failed = errors.0.len(), "submission blocked locally");
            return Err(ClientError::Validation(errors));
        }
        handler
            .submit(&self.assessment, &self.answers, self.started_at)
            .await?;
        info!(key = %self.scope, assessment_id = %self.assessment.id, "assessment submitted");
        Ok(())
    }

    /// Drops the stored draft and the in-memory answers.
    pub async fn discard(&mut self) -> Result<(), ClientError> {
        self.answers.clear();
        self.drafts
            .clear(&self.scope.key())
            .await
            .map_err(ClientError::Drafts)
    }

    async fn persist(&self) -> Result<(), ClientError> {
        let payload = serde_json::to_string(&self.answers)
            .map_err(|err| ClientError::Drafts(err.into()))?;
        self.drafts
            .save(&self.scope.key(), &payload)
            .await
            .map_err(ClientError::Drafts)
    }
}

#[cfg(test)]
#[path = "tests/runner_tests.rs"]
mod tests;
