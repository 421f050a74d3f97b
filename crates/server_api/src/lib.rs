use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use shared::{
    domain::{
        slugify, Assessment, AssessmentId, AssessmentResponse, Candidate, CandidateId, Job, JobId,
        Note, ResponseId, TimelineEvent,
    },
    error::{ApiError, ErrorCode},
    form,
    ordering::RankOutOfRange,
    protocol::{
        CandidateUpdate, CandidatesQuery, JobSortKey, JobUpdate, JobsQuery, NewCandidate, NewJob,
        NewNote, Page, ReorderRequest, SaveAssessmentRequest, SortOrder, SubmitResponseRequest,
        DEFAULT_CANDIDATES_PAGE_SIZE, DEFAULT_JOBS_PAGE_SIZE,
    },
};
use storage::Storage;
use tracing::{info, warn};

pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub max_page_size: u32,
}

impl ApiContext {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    fn page_size(&self, requested: Option<u32>, default: u32) -> u32 {
        requested
            .unwrap_or(default)
            .clamp(1, self.max_page_size.max(1))
    }
}

pub async fn list_jobs(ctx: &ApiContext, query: &JobsQuery) -> Result<Page<Job>, ApiError> {
    let mut jobs = ctx.storage.list_jobs().await.map_err(internal)?;

    if let Some(needle) = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
    {
        jobs.retain(|job| {
            job.title.to_lowercase().contains(&needle)
                || job.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
        });
    }
    jobs.retain(|job| query.status.matches(job.status));

    let wanted = query.tag_set();
    if !wanted.is_empty() {
        jobs.retain(|job| {
            let have: BTreeSet<String> = job.tags.iter().map(|tag| tag.to_lowercase()).collect();
            wanted.is_subset(&have)
        });
    }

    let key = query.sort.unwrap_or_default();
    jobs.sort_by(|a, b| {
        let ordering = match key {
            JobSortKey::Order => a.order.cmp(&b.order),
            JobSortKey::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            JobSortKey::Slug => a.slug.cmp(&b.slug),
            JobSortKey::Status => a.status.as_str().cmp(b.status.as_str()),
            JobSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        };
        match query.order.unwrap_or_default() {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let page_size = ctx.page_size(query.page_size, DEFAULT_JOBS_PAGE_SIZE);
    Ok(Page::from_items(jobs, query.page.unwrap_or(1), page_size))
}

pub async fn get_job(ctx: &ApiContext, job_id: &JobId) -> Result<Job, ApiError> {
    ctx.storage
        .job(job_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("job"))
}

pub async fn create_job(ctx: &ApiContext, new_job: NewJob) -> Result<Job, ApiError> {
    if new_job.title.trim().is_empty() {
        return Err(ApiError::validation("title is required"));
    }
    let slug = resolve_slug(new_job.slug.as_deref(), &new_job.title)?;
    ensure_slug_free(ctx, &slug, None).await?;

    let job = ctx
        .storage
        .create_job(&new_job, &slug)
        .await
        .map_err(internal)?;
    info!(job_id = %job.id, slug = %job.slug, order = job.order, "created job");
    Ok(job)
}

pub async fn update_job(ctx: &ApiContext, job_id: &JobId, update: JobUpdate) -> Result<Job, ApiError> {
    let mut job = get_job(ctx, job_id).await?;

    if let Some(title) = update.title {
        if title.trim().is_empty() {
            return Err(ApiError::validation("title is required"));
        }
        job.title = title.trim().to_string();
    }
    if let Some(slug) = update.slug {
        let slug = resolve_slug(Some(&slug), &job.title)?;
        if slug != job.slug {
            ensure_slug_free(ctx, &slug, Some(job_id)).await?;
            job.slug = slug;
        }
    }
    if let Some(status) = update.status {
        job.status = status;
    }
    if let Some(tags) = update.tags {
        job.tags = tags;
    }
    if update.description.is_some() {
        job.description = update.description;
    }
    if let Some(requirements) = update.requirements {
        job.requirements = requirements;
    }
    job.updated_at = Utc::now();

    ctx.storage.update_job(&job).await.map_err(internal)?;
    Ok(job)
}

pub async fn delete_job(ctx: &ApiContext, job_id: &JobId) -> Result<(), ApiError> {
    if ctx.storage.delete_job(job_id).await.map_err(internal)? {
        info!(job_id = %job_id, "deleted job");
        Ok(())
    } else {
        Err(ApiError::not_found("job"))
    }
}

/// Applies a dense-ranking move. The path job only has to exist; the
/// positions in `request` identify what moves.
pub async fn reorder_job(
    ctx: &ApiContext,
    job_id: &JobId,
    request: ReorderRequest,
) -> Result<(), ApiError> {
    get_job(ctx, job_id).await?;
    ctx.storage.reorder_jobs(request).await.map_err(|err| {
        match err.downcast_ref::<RankOutOfRange>() {
            Some(out_of_range) => ApiError::validation(out_of_range.to_string()),
            None => internal(err),
        }
    })
}

pub async fn list_candidates(
    ctx: &ApiContext,
    query: &CandidatesQuery,
) -> Result<Page<Candidate>, ApiError> {
    let mut candidates = ctx.storage.list_candidates().await.map_err(internal)?;

    if let Some(needle) = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
    {
        candidates.retain(|candidate| {
            candidate.name.to_lowercase().contains(&needle)
                || candidate.email.to_lowercase().contains(&needle)
        });
    }
    if let Some(stage) = query.stage {
        candidates.retain(|candidate| candidate.stage == stage);
    }
    if let Some(job_id) = &query.job_id {
        candidates.retain(|candidate| &candidate.job_id == job_id);
    }

    let page_size = ctx.page_size(query.page_size, DEFAULT_CANDIDATES_PAGE_SIZE);
    Ok(Page::from_items(candidates, query.page.unwrap_or(1), page_size))
}

pub async fn get_candidate(ctx: &ApiContext, candidate_id: &CandidateId) -> Result<Candidate, ApiError> {
    ctx.storage
        .candidate(candidate_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("candidate"))
}

pub async fn create_candidate(ctx: &ApiContext, new_candidate: NewCandidate) -> Result<Candidate, ApiError> {
    if new_candidate.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    check_email(&new_candidate.email)?;
    get_job(ctx, &new_candidate.job_id).await?;

    let candidate = ctx
        .storage
        .create_candidate(&new_candidate)
        .await
        .map_err(internal)?;
    info!(candidate_id = %candidate.id, job_id = %candidate.job_id, "created candidate");
    Ok(candidate)
}

pub async fn update_candidate(
    ctx: &ApiContext,
    candidate_id: &CandidateId,
    update: CandidateUpdate,
) -> Result<Candidate, ApiError> {
    if update.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(ApiError::validation("name is required"));
    }
    if let Some(email) = &update.email {
        check_email(email)?;
    }

    ctx.storage
        .update_candidate(candidate_id, &update)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("candidate"))
}

pub async fn add_note(
    ctx: &ApiContext,
    candidate_id: &CandidateId,
    new_note: NewNote,
) -> Result<Note, ApiError> {
    if new_note.content.trim().is_empty() {
        return Err(ApiError::validation("note content is required"));
    }
    ctx.storage
        .add_note(candidate_id, &new_note)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("candidate"))
}

pub async fn candidate_timeline(
    ctx: &ApiContext,
    candidate_id: &CandidateId,
) -> Result<Vec<TimelineEvent>, ApiError> {
    get_candidate(ctx, candidate_id).await?;
    ctx.storage
        .candidate_timeline(candidate_id)
        .await
        .map_err(internal)
}

pub async fn get_assessment(ctx: &ApiContext, job_id: &JobId) -> Result<Assessment, ApiError> {
    ctx.storage
        .assessment_for_job(job_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("assessment"))
}

/// Creates or replaces the assessment of a job. Every `show_if` must parse
/// and question ids must be unique across sections.
pub async fn save_assessment(
    ctx: &ApiContext,
    job_id: &JobId,
    request: SaveAssessmentRequest,
) -> Result<Assessment, ApiError> {
    get_job(ctx, job_id).await?;
    if request.title.trim().is_empty() {
        return Err(ApiError::validation("title is required"));
    }

    let now = Utc::now();
    let assessment = Assessment {
        id: request.id.unwrap_or_else(AssessmentId::generate),
        job_id: job_id.clone(),
        title: request.title.trim().to_string(),
        description: request.description,
        sections: request.sections,
        time_limit_minutes: request.time_limit_minutes,
        created_at: now,
        updated_at: now,
    };

    let mut seen = BTreeSet::new();
    let duplicates: BTreeMap<String, String> = assessment
        .questions()
        .filter(|question| !seen.insert(question.id.clone()))
        .map(|question| (question.id.to_string(), "duplicate question id".to_string()))
        .collect();
    if !duplicates.is_empty() {
        return Err(ApiError::validation("question ids must be unique").with_fields(duplicates));
    }

    if let Err(errors) = form::check_conditions(&assessment) {
        let fields = errors
            .into_iter()
            .map(|(id, err)| (id.to_string(), format!("invalid show_if: {err}")))
            .collect();
        return Err(ApiError::validation("assessment has invalid conditions").with_fields(fields));
    }

    ctx.storage
        .upsert_assessment(&assessment)
        .await
        .map_err(internal)
}

/// The candidate's latest response to the job's assessment.
pub async fn get_response(
    ctx: &ApiContext,
    job_id: &JobId,
    candidate_id: &CandidateId,
) -> Result<AssessmentResponse, ApiError> {
    let assessment = get_assessment(ctx, job_id).await?;
    ctx.storage
        .response_for(&assessment.id, candidate_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("response"))
}

/// Re-validates a candidate's answers with the form rules and stores the
/// completed response.
pub async fn submit_response(
    ctx: &ApiContext,
    job_id: &JobId,
    request: SubmitResponseRequest,
) -> Result<AssessmentResponse, ApiError> {
    let assessment = get_assessment(ctx, job_id).await?;
    get_candidate(ctx, &request.candidate_id).await?;

    if let Err(errors) = form::validate(&assessment, &request.answers) {
        warn!(
            assessment_id = %assessment.id,
            candidate_id = %request.candidate_id,
            failed = errors.0.len(),
            "rejected assessment submission"
        );
        return Err(ApiError::validation("answers failed validation").with_fields(errors.messages()));
    }

    let completed_at = Utc::now();
    let response = AssessmentResponse {
        id: ResponseId::generate(),
        assessment_id: assessment.id,
        candidate_id: request.candidate_id,
        answers: request.answers,
        started_at: request.started_at.unwrap_or(completed_at),
        completed_at: Some(completed_at),
        score: None,
    };
    ctx.storage.save_response(&response).await.map_err(internal)?;
    info!(response_id = %response.id, candidate_id = %response.candidate_id, "stored assessment response");
    Ok(response)
}

fn resolve_slug(requested: Option<&str>, title: &str) -> Result<String, ApiError> {
    let source = requested
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(title);
    let slug = slugify(source);
    if slug.is_empty() {
        return Err(ApiError::validation("slug must contain at least one letter or digit"));
    }
    Ok(slug)
}

async fn ensure_slug_free(ctx: &ApiContext, slug: &str, owner: Option<&JobId>) -> Result<(), ApiError> {
    let existing = ctx.storage.job_by_slug(slug).await.map_err(internal)?;
    match existing {
        Some(job) if Some(&job.id) != owner => Err(ApiError::new(
            ErrorCode::Conflict,
            format!("slug '{slug}' is already taken"),
        )),
        _ => Ok(()),
    }
}

fn check_email(email: &str) -> Result<(), ApiError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::validation(format!("'{email}' is not a valid email"))),
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
