//! Typed client for the hiring HTTP API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    domain::{
        Answers, Assessment, AssessmentResponse, Candidate, CandidateId, Job, JobId, Note,
        TimelineEvent,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        CandidateUpdate, CandidatesQuery, JobUpdate, JobsQuery, NewCandidate, NewJob, NewNote,
        Page, ReorderRequest, SaveAssessmentRequest, SubmitResponseRequest,
    },
};
use tracing::{debug, info};
use url::Url;

use crate::{error::ClientError, reorder::JobsRemote, runner::SubmitHandler};

#[derive(Debug, Clone)]
pub struct HttpClient {
    http: Client,
    base: Url,
}

impl HttpClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = Url::parse(base_url)?;
        if base.cannot_be_a_base() {
            return Err(ClientError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn health(&self) -> Result<(), ClientError> {
        self.http
            .get(self.endpoint(&["healthz"]))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn list_jobs(&self, query: &JobsQuery) -> Result<Page<Job>, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&["jobs"]))
            .query(query)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn get_job(&self, job_id: &JobId) -> Result<Job, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&["jobs", job_id.as_str()]))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn create_job(&self, new_job: &NewJob) -> Result<Job, ClientError> {
        let response = self
            .http
            .post(self.endpoint(&["jobs"]))
            .json(new_job)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn update_job(&self, job_id: &JobId, update: &JobUpdate) -> Result<Job, ClientError> {
        let response = self
            .http
            .patch(self.endpoint(&["jobs", job_id.as_str()]))
            .json(update)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn delete_job(&self, job_id: &JobId) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.endpoint(&["jobs", job_id.as_str()]))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn reorder_job(
        &self,
        job_id: &JobId,
        request: ReorderRequest,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .patch(self.endpoint(&["jobs", job_id.as_str(), "reorder"]))
            .json(&request)
            .send()
            .await?;
        check(response).await?;
        debug!(job_id = %job_id, from = request.from_order, to = request.to_order, "reorder accepted");
        Ok(())
    }

    pub async fn list_candidates(
        &self,
        query: &CandidatesQuery,
    ) -> Result<Page<Candidate>, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&["candidates"]))
            .query(query)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn get_candidate(&self, candidate_id: &CandidateId) -> Result<Candidate, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&["candidates", candidate_id.as_str()]))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn create_candidate(&self, candidate: &NewCandidate) -> Result<Candidate, ClientError> {
        let response = self
            .http
            .post(self.endpoint(&["candidates"]))
            .json(candidate)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn update_candidate(
        &self,
        candidate_id: &CandidateId,
        update: &CandidateUpdate,
    ) -> Result<Candidate, ClientError> {
        let response = self
            .http
            .patch(self.endpoint(&["candidates", candidate_id.as_str()]))
            .json(update)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn add_note(&self, candidate_id: &CandidateId, note: &NewNote) -> Result<Note, ClientError> {
        let response = self
            .http
            .post(self.endpoint(&["candidates", candidate_id.as_str(), "notes"]))
            .json(note)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn candidate_timeline(
        &self,
        candidate_id: &CandidateId,
    ) -> Result<Vec<TimelineEvent>, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&["candidates", candidate_id.as_str(), "timeline"]))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn get_assessment(&self, job_id: &JobId) -> Result<Assessment, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&["assessments", job_id.as_str()]))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn save_assessment(
        &self,
        job_id: &JobId,
        request: &SaveAssessmentRequest,
    ) -> Result<Assessment, ClientError> {
        let response = self
            .http
            .put(self.endpoint(&["assessments", job_id.as_str()]))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn submit_response(
        &self,
        job_id: &JobId,
        request: &SubmitResponseRequest,
    ) -> Result<AssessmentResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint(&["assessments", job_id.as_str(), "submit"]))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn get_response(
        &self,
        job_id: &JobId,
        candidate_id: &CandidateId,
    ) -> Result<AssessmentResponse, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&["assessments", job_id.as_str(), "responses", candidate_id.as_str()]))
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    Ok(check(response).await?.json().await?)
}

/// Turns a non-success status into a `ClientError`, reading the error
/// envelope when the body carries one.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await?;
    let error = serde_json::from_str::<ApiError>(&body)
        .unwrap_or_else(|_| ApiError::new(ErrorCode::Internal, body.trim()));
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound(error.message));
    }
    Err(ClientError::Api {
        status: status.as_u16(),
        error,
    })
}

#[async_trait]
impl JobsRemote for HttpClient {
    async fn list_jobs(&self, query: &JobsQuery) -> Result<Page<Job>, ClientError> {
        HttpClient::list_jobs(self, query).await
    }

    async fn reorder_job(&self, job_id: &JobId, request: ReorderRequest) -> Result<(), ClientError> {
        HttpClient::reorder_job(self, job_id, request).await
    }
}

/// Submits a candidate's answers through the HTTP API.
pub struct RemoteSubmission {
    client: HttpClient,
    candidate_id: CandidateId,
}

impl RemoteSubmission {
    pub fn new(client: HttpClient, candidate_id: CandidateId) -> Self {
        Self {
            client,
            candidate_id,
        }
    }
}

#[async_trait]
impl SubmitHandler for RemoteSubmission {
    async fn submit(
        &self,
        assessment: &Assessment,
        answers: &Answers,
        started_at: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let request = SubmitResponseRequest {
            candidate_id: self.candidate_id.clone(),
            answers: answers.clone(),
            started_at: Some(started_at),
        };
        let response = self
            .client
            .submit_response(&assessment.job_id, &request)
            .await?;
        info!(
            response_id = %response.id,
            candidate_id = %self.candidate_id,
            "response stored"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
