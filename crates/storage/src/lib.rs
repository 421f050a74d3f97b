use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, SqliteConnection,
};
use std::{
    collections::HashMap,
    fs,
    path::Path,
    str::FromStr,
};
use tracing::info;

use shared::{
    domain::{
        extract_mentions, Assessment, AssessmentId, AssessmentResponse, Candidate, CandidateId,
        CandidateStage, Job, JobId, JobStatus, Note, NoteId, TimelineEvent, TimelineEventId,
        TimelineEventKind,
    },
    ordering::{check_range, shifted_rank},
    protocol::{CandidateUpdate, NewCandidate, NewJob, NewNote, ReorderRequest},
};

/// Author recorded on timeline events the system emits on its own.
pub const SYSTEM_AUTHOR: &str = "system";

const NOTE_PREVIEW_CHARS: usize = 50;

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Everything persisted, in a shape suitable for JSON export and import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub timeline_events: Vec<TimelineEvent>,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub assessment_responses: Vec<AssessmentResponse>,
}

impl DataSnapshot {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
            && self.candidates.is_empty()
            && self.timeline_events.is_empty()
            && self.assessments.is_empty()
            && self.assessment_responses.is_empty()
    }
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        create_database_dir(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn count_jobs(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All jobs ordered by board position.
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!("{JOB_COLUMNS} ORDER BY sort_order ASC, created_at ASC"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    pub async fn job(&self, job_id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("{JOB_COLUMNS} WHERE id = ?"))
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    pub async fn job_by_slug(&self, slug: &str) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("{JOB_COLUMNS} WHERE slug = ?"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(job_from_row).transpose()
    }

    /// Appends a job at the bottom of the board. `slug` must already be
    /// resolved and unique.
    pub async fn create_job(&self, new_job: &NewJob, slug: &str) -> Result<Job> {
        let mut tx = self.pool.begin().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&mut *tx)
            .await?;

        let now = Utc::now();
        let job = Job {
            id: JobId::generate(),
            title: new_job.title.trim().to_string(),
            slug: slug.to_string(),
            status: new_job.status.unwrap_or(JobStatus::Active),
            tags: new_job.tags.clone(),
            order: count + 1,
            description: new_job.description.clone(),
            requirements: new_job.requirements.clone(),
            created_at: now,
            updated_at: now,
        };
        insert_job(&mut tx, &job).await?;
        tx.commit().await?;
        Ok(job)
    }

    /// Writes every field of `job` except its board position.
    pub async fn update_job(&self, job: &Job) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE jobs SET title = ?, slug = ?, status = ?, tags = ?, description = ?, requirements = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&job.title)
        .bind(&job.slug)
        .bind(job.status.as_str())
        .bind(serde_json::to_string(&job.tags)?)
        .bind(&job.description)
        .bind(serde_json::to_string(&job.requirements)?)
        .bind(job.updated_at)
        .bind(job.id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Removes a job and closes the gap it leaves in the ranking.
    pub async fn delete_job(&self, job_id: &JobId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let affected = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(job_id.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if affected > 0 {
            densify_job_order(&mut tx).await?;
        }
        tx.commit().await?;
        Ok(affected > 0)
    }

    /// Moves the job at `from_order` to `to_order`, shifting the jobs in
    /// between by one. Runs in a single transaction so readers never observe
    /// a half-shifted board.
    pub async fn reorder_jobs(&self, request: ReorderRequest) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query("SELECT id, sort_order FROM jobs")
            .fetch_all(&mut *tx)
            .await?;
        check_range(request, rows.len() as i64)?;
        if request.is_noop() {
            return Ok(());
        }

        let now = Utc::now();
        for row in rows {
            let id: String = row.try_get("id")?;
            let rank: i64 = row.try_get("sort_order")?;
            let next = shifted_rank(rank, request);
            if next == rank {
                continue;
            }
            sqlx::query("UPDATE jobs SET sort_order = ?, updated_at = ? WHERE id = ?")
                .bind(next)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!(
            from = request.from_order,
            to = request.to_order,
            "reordered jobs"
        );
        Ok(())
    }

    /// Inserts a candidate and records the "applied" event on its timeline.
    pub async fn create_candidate(&self, new_candidate: &NewCandidate) -> Result<Candidate> {
        let now = Utc::now();
        let candidate = Candidate {
            id: CandidateId::generate(),
            name: new_candidate.name.trim().to_string(),
            email: new_candidate.email.trim().to_string(),
            phone: new_candidate.phone.clone(),
            stage: new_candidate.stage.unwrap_or(CandidateStage::Applied),
            job_id: new_candidate.job_id.clone(),
            resume_url: new_candidate.resume_url.clone(),
            notes: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.pool.begin().await?;
        insert_candidate(&mut tx, &candidate).await?;
        insert_timeline_event(
            &mut tx,
            &TimelineEvent {
                id: TimelineEventId::generate(),
                candidate_id: candidate.id.clone(),
                kind: TimelineEventKind::StageChange,
                from_stage: None,
                to_stage: Some(candidate.stage),
                description: "Candidate applied for position".to_string(),
                created_at: now,
                created_by: SYSTEM_AUTHOR.to_string(),
            },
        )
        .await?;
        tx.commit().await?;
        Ok(candidate)
    }

    pub async fn candidate(&self, candidate_id: &CandidateId) -> Result<Option<Candidate>> {
        let row = sqlx::query(&format!("{CANDIDATE_COLUMNS} WHERE id = ?"))
            .bind(candidate_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut candidate = candidate_from_row(&row)?;
        let notes = sqlx::query(&format!(
            "{NOTE_COLUMNS} WHERE candidate_id = ? ORDER BY created_at ASC"
        ))
        .bind(candidate_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        candidate.notes = notes
            .iter()
            .map(|row| note_from_row(row).map(|(_, note)| note))
            .collect::<Result<_>>()?;
        Ok(Some(candidate))
    }

    /// All candidates with their notes, newest first.
    pub async fn list_candidates(&self) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(&format!("{CANDIDATE_COLUMNS} ORDER BY created_at DESC, id ASC"))
            .fetch_all(&self.pool)
            .await?;
        let note_rows = sqlx::query(&format!("{NOTE_COLUMNS} ORDER BY created_at ASC"))
            .fetch_all(&self.pool)
            .await?;

        let mut notes: HashMap<CandidateId, Vec<Note>> = HashMap::new();
        for row in &note_rows {
            let (owner, note) = note_from_row(row)?;
            notes.entry(owner).or_default().push(note);
        }

        rows.iter()
            .map(|row| {
                let mut candidate = candidate_from_row(row)?;
                candidate.notes = notes.remove(&candidate.id).unwrap_or_default();
                Ok(candidate)
            })
            .collect()
    }

    /// Applies `update` and records a stage change on the timeline when the
    /// stage actually moves. Returns `None` for an unknown candidate.
    pub async fn update_candidate(
        &self,
        candidate_id: &CandidateId,
        update: &CandidateUpdate,
    ) -> Result<Option<Candidate>> {
        let Some(mut candidate) = self.candidate(candidate_id).await? else {
            return Ok(None);
        };
        let previous_stage = candidate.stage;

        if let Some(name) = &update.name {
            candidate.name = name.trim().to_string();
        }
        if let Some(email) = &update.email {
            candidate.email = email.trim().to_string();
        }
        if update.phone.is_some() {
            candidate.phone = update.phone.clone();
        }
        if update.resume_url.is_some() {
            candidate.resume_url = update.resume_url.clone();
        }
        if let Some(stage) = update.stage {
            candidate.stage = stage;
        }
        candidate.updated_at = Utc::now();

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE candidates SET name = ?, email = ?, phone = ?, stage = ?, resume_url = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&candidate.name)
        .bind(&candidate.email)
        .bind(&candidate.phone)
        .bind(candidate.stage.as_str())
        .bind(&candidate.resume_url)
        .bind(candidate.updated_at)
        .bind(candidate.id.as_str())
        .execute(&mut *tx)
        .await?;

        if candidate.stage != previous_stage {
            insert_timeline_event(
                &mut tx,
                &TimelineEvent {
                    id: TimelineEventId::generate(),
                    candidate_id: candidate.id.clone(),
                    kind: TimelineEventKind::StageChange,
                    from_stage: Some(previous_stage),
                    to_stage: Some(candidate.stage),
                    description: format!(
                        "Stage changed from {previous_stage} to {}",
                        candidate.stage
                    ),
                    created_at: candidate.updated_at,
                    created_by: SYSTEM_AUTHOR.to_string(),
                },
            )
            .await?;
        }
        tx.commit().await?;
        Ok(Some(candidate))
    }

    /// Attaches a note to a candidate. Returns `None` for an unknown candidate.
    pub async fn add_note(
        &self,
        candidate_id: &CandidateId,
        new_note: &NewNote,
    ) -> Result<Option<Note>> {
        let mut tx = self.pool.begin().await?;
        let exists: Option<String> = sqlx::query_scalar("SELECT id FROM candidates WHERE id = ?")
            .bind(candidate_id.as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let note = Note {
            id: NoteId::generate(),
            content: new_note.content.clone(),
            mentions: extract_mentions(&new_note.content),
            author_id: new_note.author_id.clone(),
            author_name: new_note.author_name.clone(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO candidate_notes (id, candidate_id, content, mentions, author_id, author_name, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(note.id.as_str())
        .bind(candidate_id.as_str())
        .bind(&note.content)
        .bind(serde_json::to_string(&note.mentions)?)
        .bind(&note.author_id)
        .bind(&note.author_name)
        .bind(note.created_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE candidates SET updated_at = ? WHERE id = ?")
            .bind(note.created_at)
            .bind(candidate_id.as_str())
            .execute(&mut *tx)
            .await?;

        insert_timeline_event(
            &mut tx,
            &TimelineEvent {
                id: TimelineEventId::generate(),
                candidate_id: candidate_id.clone(),
                kind: TimelineEventKind::NoteAdded,
                from_stage: None,
                to_stage: None,
                description: format!("Note added: {}", note_preview(&note.content)),
                created_at: note.created_at,
                created_by: note.author_name.clone(),
            },
        )
        .await?;
        tx.commit().await?;
        Ok(Some(note))
    }

    /// Timeline of one candidate, newest first.
    pub async fn candidate_timeline(&self, candidate_id: &CandidateId) -> Result<Vec<TimelineEvent>> {
        let rows = sqlx::query(&format!(
            "{TIMELINE_COLUMNS} WHERE candidate_id = ? ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(candidate_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(timeline_event_from_row).collect()
    }

    pub async fn assessment_for_job(&self, job_id: &JobId) -> Result<Option<Assessment>> {
        let row = sqlx::query(&format!("{ASSESSMENT_COLUMNS} WHERE job_id = ?"))
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(assessment_from_row).transpose()
    }

    /// Stores the assessment for its job, replacing any previous definition
    /// while keeping the original id and creation time.
    pub async fn upsert_assessment(&self, assessment: &Assessment) -> Result<Assessment> {
        sqlx::query(
            "INSERT INTO assessments (id, job_id, title, description, sections, time_limit_minutes, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(job_id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                sections = excluded.sections,
                time_limit_minutes = excluded.time_limit_minutes,
                updated_at = excluded.updated_at",
        )
        .bind(assessment.id.as_str())
        .bind(assessment.job_id.as_str())
        .bind(&assessment.title)
        .bind(&assessment.description)
        .bind(serde_json::to_string(&assessment.sections)?)
        .bind(assessment.time_limit_minutes.map(i64::from))
        .bind(assessment.created_at)
        .bind(assessment.updated_at)
        .execute(&self.pool)
        .await?;

        self.assessment_for_job(&assessment.job_id)
            .await?
            .with_context(|| format!("assessment for job {} vanished after upsert", assessment.job_id))
    }

    /// Persists a response. A completed response also lands on the
    /// candidate's timeline.
    pub async fn save_response(&self, response: &AssessmentResponse) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_response(&mut tx, response).await?;
        if let Some(completed_at) = response.completed_at {
            insert_timeline_event(
                &mut tx,
                &TimelineEvent {
                    id: TimelineEventId::generate(),
                    candidate_id: response.candidate_id.clone(),
                    kind: TimelineEventKind::AssessmentCompleted,
                    from_stage: None,
                    to_stage: None,
                    description: "Assessment completed".to_string(),
                    created_at: completed_at,
                    created_by: SYSTEM_AUTHOR.to_string(),
                },
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Latest response a candidate gave to an assessment.
    pub async fn response_for(
        &self,
        assessment_id: &AssessmentId,
        candidate_id: &CandidateId,
    ) -> Result<Option<AssessmentResponse>> {
        let row = sqlx::query(&format!(
            "{RESPONSE_COLUMNS} WHERE assessment_id = ? AND candidate_id = ?
             ORDER BY started_at DESC, rowid DESC LIMIT 1"
        ))
        .bind(assessment_id.as_str())
        .bind(candidate_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(response_from_row).transpose()
    }

    pub async fn draft(&self, scope_key: &str) -> Result<Option<String>> {
        let payload = sqlx::query_scalar("SELECT payload FROM drafts WHERE scope_key = ?")
            .bind(scope_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payload)
    }

    pub async fn put_draft(&self, scope_key: &str, payload: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO drafts (scope_key, payload, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(scope_key) DO UPDATE SET payload = excluded.payload, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(scope_key)
        .bind(payload)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to persist draft '{scope_key}'"))?;
        Ok(())
    }

    pub async fn clear_draft(&self, scope_key: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM drafts WHERE scope_key = ?")
            .bind(scope_key)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    pub async fn export_snapshot(&self) -> Result<DataSnapshot> {
        let jobs = self.list_jobs().await?;
        let mut candidates = self.list_candidates().await?;
        candidates.reverse();

        let timeline_events = sqlx::query(&format!("{TIMELINE_COLUMNS} ORDER BY rowid ASC"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(timeline_event_from_row)
            .collect::<Result<_>>()?;
        let assessments = sqlx::query(&format!("{ASSESSMENT_COLUMNS} ORDER BY created_at ASC"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(assessment_from_row)
            .collect::<Result<_>>()?;
        let assessment_responses = sqlx::query(&format!("{RESPONSE_COLUMNS} ORDER BY rowid ASC"))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(response_from_row)
            .collect::<Result<_>>()?;

        Ok(DataSnapshot {
            jobs,
            candidates,
            timeline_events,
            assessments,
            assessment_responses,
        })
    }

    /// Loads a snapshot in one transaction. Fails without side effects when
    /// any record collides with an existing id, slug, or job assessment.
    pub async fn import_snapshot(&self, snapshot: &DataSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for job in &snapshot.jobs {
            insert_job(&mut tx, job)
                .await
                .with_context(|| format!("failed to import job {}", job.id))?;
        }
        densify_job_order(&mut tx).await?;

        for candidate in &snapshot.candidates {
            insert_candidate(&mut tx, candidate)
                .await
                .with_context(|| format!("failed to import candidate {}", candidate.id))?;
            for note in &candidate.notes {
                sqlx::query(
                    "INSERT INTO candidate_notes (id, candidate_id, content, mentions, author_id, author_name, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(note.id.as_str())
                .bind(candidate.id.as_str())
                .bind(&note.content)
                .bind(serde_json::to_string(&note.mentions)?)
                .bind(&note.author_id)
                .bind(&note.author_name)
                .bind(note.created_at)
                .execute(&mut *tx)
                .await?;
            }
        }
        for event in &snapshot.timeline_events {
            insert_timeline_event(&mut tx, event).await?;
        }
        for assessment in &snapshot.assessments {
            sqlx::query(
                "INSERT INTO assessments (id, job_id, title, description, sections, time_limit_minutes, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(assessment.id.as_str())
            .bind(assessment.job_id.as_str())
            .bind(&assessment.title)
            .bind(&assessment.description)
            .bind(serde_json::to_string(&assessment.sections)?)
            .bind(assessment.time_limit_minutes.map(i64::from))
            .bind(assessment.created_at)
            .bind(assessment.updated_at)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to import assessment {}", assessment.id))?;
        }
        for response in &snapshot.assessment_responses {
            insert_response(&mut tx, response).await?;
        }
        tx.commit().await?;

        info!(
            jobs = snapshot.jobs.len(),
            candidates = snapshot.candidates.len(),
            assessments = snapshot.assessments.len(),
            "imported snapshot"
        );
        Ok(())
    }

    /// Deletes every record, drafts included.
    pub async fn clear_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "assessment_responses",
            "assessments",
            "timeline_events",
            "candidate_notes",
            "candidates",
            "jobs",
            "drafts",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to clear {table}"))?;
        }
        tx.commit().await?;
        Ok(())
    }
}

const JOB_COLUMNS: &str = "SELECT id, title, slug, status, tags, sort_order, description, requirements, created_at, updated_at FROM jobs";
const CANDIDATE_COLUMNS: &str = "SELECT id, name, email, phone, stage, job_id, resume_url, created_at, updated_at FROM candidates";
const NOTE_COLUMNS: &str = "SELECT id, candidate_id, content, mentions, author_id, author_name, created_at FROM candidate_notes";
const TIMELINE_COLUMNS: &str = "SELECT id, candidate_id, kind, from_stage, to_stage, description, created_at, created_by FROM timeline_events";
const ASSESSMENT_COLUMNS: &str = "SELECT id, job_id, title, description, sections, time_limit_minutes, created_at, updated_at FROM assessments";
const RESPONSE_COLUMNS: &str = "SELECT id, assessment_id, candidate_id, answers, started_at, completed_at, score FROM assessment_responses";

async fn insert_job(conn: &mut SqliteConnection, job: &Job) -> Result<()> {
    sqlx::query(
        "INSERT INTO jobs (id, title, slug, status, tags, sort_order, description, requirements, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(job.id.as_str())
    .bind(&job.title)
    .bind(&job.slug)
    .bind(job.status.as_str())
    .bind(serde_json::to_string(&job.tags)?)
    .bind(job.order)
    .bind(&job.description)
    .bind(serde_json::to_string(&job.requirements)?)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Renumbers the board to `1..=N`, keeping the current relative order.
async fn densify_job_order(conn: &mut SqliteConnection) -> Result<()> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT id FROM jobs ORDER BY sort_order ASC, created_at ASC, id ASC")
            .fetch_all(&mut *conn)
            .await?;
    for (index, id) in ids.into_iter().enumerate() {
        sqlx::query("UPDATE jobs SET sort_order = ? WHERE id = ? AND sort_order != ?")
            .bind(index as i64 + 1)
            .bind(id)
            .bind(index as i64 + 1)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn insert_candidate(conn: &mut SqliteConnection, candidate: &Candidate) -> Result<()> {
    sqlx::query(
        "INSERT INTO candidates (id, name, email, phone, stage, job_id, resume_url, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(candidate.id.as_str())
    .bind(&candidate.name)
    .bind(&candidate.email)
    .bind(&candidate.phone)
    .bind(candidate.stage.as_str())
    .bind(candidate.job_id.as_str())
    .bind(&candidate.resume_url)
    .bind(candidate.created_at)
    .bind(candidate.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_timeline_event(conn: &mut SqliteConnection, event: &TimelineEvent) -> Result<()> {
    sqlx::query(
        "INSERT INTO timeline_events (id, candidate_id, kind, from_stage, to_stage, description, created_at, created_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(event.id.as_str())
    .bind(event.candidate_id.as_str())
    .bind(event.kind.as_str())
    .bind(event.from_stage.map(CandidateStage::as_str))
    .bind(event.to_stage.map(CandidateStage::as_str))
    .bind(&event.description)
    .bind(event.created_at)
    .bind(&event.created_by)
    .execute(&mut *conn)
    .await
    .context("failed to record timeline event")?;
    Ok(())
}

async fn insert_response(conn: &mut SqliteConnection, response: &AssessmentResponse) -> Result<()> {
    sqlx::query(
        "INSERT INTO assessment_responses (id, assessment_id, candidate_id, answers, started_at, completed_at, score)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(response.id.as_str())
    .bind(response.assessment_id.as_str())
    .bind(response.candidate_id.as_str())
    .bind(serde_json::to_string(&response.answers)?)
    .bind(response.started_at)
    .bind(response.completed_at)
    .bind(response.score)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn note_preview(content: &str) -> String {
    if content.chars().count() <= NOTE_PREVIEW_CHARS {
        return content.to_string();
    }
    let head: String = content.chars().take(NOTE_PREVIEW_CHARS).collect();
    format!("{head}...")
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).with_context(|| format!("malformed json in column '{column}'"))
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let status: String = row.try_get("status")?;
    Ok(Job {
        id: JobId(row.try_get("id")?),
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        status: JobStatus::from_str(&status)?,
        tags: json_column(row, "tags")?,
        order: row.try_get("sort_order")?,
        description: row.try_get("description")?,
        requirements: json_column(row, "requirements")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn candidate_from_row(row: &SqliteRow) -> Result<Candidate> {
    let stage: String = row.try_get("stage")?;
    Ok(Candidate {
        id: CandidateId(row.try_get("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        stage: CandidateStage::from_str(&stage)?,
        job_id: JobId(row.try_get("job_id")?),
        resume_url: row.try_get("resume_url")?,
        notes: Vec::new(),
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn note_from_row(row: &SqliteRow) -> Result<(CandidateId, Note)> {
    let owner = CandidateId(row.try_get("candidate_id")?);
    let note = Note {
        id: NoteId(row.try_get("id")?),
        content: row.try_get("content")?,
        mentions: json_column(row, "mentions")?,
        author_id: row.try_get("author_id")?,
        author_name: row.try_get("author_name")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    };
    Ok((owner, note))
}

fn timeline_event_from_row(row: &SqliteRow) -> Result<TimelineEvent> {
    let kind: String = row.try_get("kind")?;
    let from_stage: Option<String> = row.try_get("from_stage")?;
    let to_stage: Option<String> = row.try_get("to_stage")?;
    Ok(TimelineEvent {
        id: TimelineEventId(row.try_get("id")?),
        candidate_id: CandidateId(row.try_get("candidate_id")?),
        kind: TimelineEventKind::from_str(&kind)?,
        from_stage: from_stage.as_deref().map(CandidateStage::from_str).transpose()?,
        to_stage: to_stage.as_deref().map(CandidateStage::from_str).transpose()?,
        description: row.try_get("description")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        created_by: row.try_get("created_by")?,
    })
}

fn assessment_from_row(row: &SqliteRow) -> Result<Assessment> {
    let time_limit: Option<i64> = row.try_get("time_limit_minutes")?;
    Ok(Assessment {
        id: AssessmentId(row.try_get("id")?),
        job_id: JobId(row.try_get("job_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        sections: json_column(row, "sections")?,
        time_limit_minutes: time_limit.map(u32::try_from).transpose()?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn response_from_row(row: &SqliteRow) -> Result<AssessmentResponse> {
    Ok(AssessmentResponse {
        id: shared::domain::ResponseId(row.try_get("id")?),
        assessment_id: AssessmentId(row.try_get("assessment_id")?),
        candidate_id: CandidateId(row.try_get("candidate_id")?),
        answers: json_column(row, "answers")?,
        started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
        score: row.try_get("score")?,
    })
}

/// Turns a configured database location (url or bare file path) into a
/// `sqlite://` url.
pub fn normalize_database_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("://") || raw.starts_with("sqlite::memory:") {
        return raw.to_string();
    }
    let location = raw.strip_prefix("sqlite:").unwrap_or(raw);
    format!("sqlite://{}", location.replace('\\', "/"))
}

/// The file a sqlite url points at. `None` for in-memory databases and
/// urls of other schemes.
fn database_file(database_url: &str) -> Option<&Path> {
    let rest = database_url.strip_prefix("sqlite:")?;
    let (location, params) = rest.split_once('?').unwrap_or((rest, ""));
    let location = location.strip_prefix("//").unwrap_or(location);
    let in_memory = location == ":memory:" || params.split('&').any(|param| param == "mode=memory");
    (!location.is_empty() && !in_memory).then(|| Path::new(location))
}

fn create_database_dir(database_url: &str) -> Result<()> {
    let Some(dir) = database_file(database_url)
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty())
    else {
        return Ok(());
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("creating database directory {}", dir.display()))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
