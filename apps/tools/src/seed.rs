use anyhow::{ensure, Result};
use chrono::Utc;
use shared::{
    domain::{
        slugify, Assessment, AssessmentId, AssessmentSection, CandidateStage, Job, JobStatus,
        Question, QuestionId, QuestionKind, SectionId,
    },
    protocol::{NewCandidate, NewJob},
};
use storage::Storage;
use tracing::info;

pub const SEED_JOBS: usize = 25;
pub const SEED_ASSESSMENTS: usize = 3;

const TITLES: [&str; SEED_JOBS] = [
    "Senior Frontend Engineer",
    "Backend Engineer",
    "Full Stack Developer",
    "DevOps Engineer",
    "Product Manager",
    "UX Designer",
    "Data Scientist",
    "Mobile Developer",
    "QA Engineer",
    "Technical Writer",
    "Engineering Manager",
    "Security Engineer",
    "Site Reliability Engineer",
    "Machine Learning Engineer",
    "Platform Engineer",
    "Solutions Architect",
    "Developer Advocate",
    "Data Engineer",
    "Support Engineer",
    "Release Manager",
    "Database Administrator",
    "Cloud Architect",
    "UI Engineer",
    "Growth Engineer",
    "Staff Software Engineer",
];

const TAGS: [&str; 10] = [
    "remote", "onsite", "hybrid", "react", "rust", "python", "aws", "docker", "senior", "junior",
];

const FIRST_NAMES: [&str; 12] = [
    "Alex", "Sam", "Jordan", "Taylor", "Morgan", "Casey", "Riley", "Jamie", "Avery", "Quinn",
    "Robin", "Drew",
];

const LAST_NAMES: [&str; 10] = [
    "Smith", "Lee", "Garcia", "Chen", "Patel", "Novak", "Okafor", "Silva", "Kim", "Brown",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub jobs: usize,
    pub candidates: usize,
    pub assessments: usize,
}

/// Fills an empty store with a deterministic data set.
pub async fn seed(storage: &Storage, candidates: usize) -> Result<SeedSummary> {
    ensure!(
        storage.count_jobs().await? == 0,
        "store already holds jobs; run `clear` first"
    );

    let mut jobs = Vec::with_capacity(SEED_JOBS);
    for (index, title) in TITLES.iter().enumerate() {
        let new_job = NewJob {
            title: (*title).to_string(),
            slug: None,
            status: Some(if index % 5 == 4 {
                JobStatus::Archived
            } else {
                JobStatus::Active
            }),
            tags: [TAGS[index % TAGS.len()], TAGS[(index * 3 + 1) % TAGS.len()]]
                .into_iter()
                .map(str::to_string)
                .collect(),
            description: Some(format!("Join us as a {title}.")),
            requirements: vec![
                "3+ years of relevant experience".to_string(),
                "Clear written communication".to_string(),
            ],
        };
        jobs.push(storage.create_job(&new_job, &slugify(title)).await?);
    }

    for index in 0..candidates {
        let first = FIRST_NAMES[index % FIRST_NAMES.len()];
        let last = LAST_NAMES[(index / FIRST_NAMES.len()) % LAST_NAMES.len()];
        let job = &jobs[index % jobs.len()];
        storage
            .create_candidate(&NewCandidate {
                name: format!("{first} {last}"),
                email: format!(
                    "{}.{}{index}@example.com",
                    first.to_lowercase(),
                    last.to_lowercase()
                ),
                phone: None,
                stage: Some(CandidateStage::ALL[index % CandidateStage::ALL.len()]),
                job_id: job.id.clone(),
                resume_url: None,
            })
            .await?;
    }

    for job in jobs.iter().take(SEED_ASSESSMENTS) {
        storage.upsert_assessment(&assessment_for(job)).await?;
    }

    let summary = SeedSummary {
        jobs: jobs.len(),
        candidates,
        assessments: SEED_ASSESSMENTS.min(jobs.len()),
    };
    info!(?summary, "seeded store");
    Ok(summary)
}

fn question(id: &str, title: &str, required: bool, show_if: Option<&str>, kind: QuestionKind) -> Question {
    Question {
        id: QuestionId::from(id),
        title: title.to_string(),
        description: None,
        required,
        order: 0,
        show_if: show_if.map(str::to_string),
        kind,
    }
}

/// Two sections covering every question type, with one conditional branch.
pub fn assessment_for(job: &Job) -> Assessment {
    let now = Utc::now();
    let mut screening = vec![
        question("q1", "Are you authorized to work in this location?", true, None, QuestionKind::SingleChoice {
            options: vec!["Yes".into(), "No".into()],
        }),
        question(
            "q2",
            "Years of professional experience",
            true,
            Some("q1 == 'Yes'"),
            QuestionKind::Numeric {
                min: Some(0.0),
                max: Some(50.0),
                step: Some(1.0),
            },
        ),
        question("q3", "Which tools have you used in production?", false, None, QuestionKind::MultiChoice {
            options: vec!["Docker".into(), "Kubernetes".into(), "AWS".into(), "Terraform".into()],
            min_selections: Some(1),
            max_selections: Some(3),
        }),
    ];
    let mut written = vec![
        question("q4", "Link to your portfolio", false, None, QuestionKind::ShortText {
            max_length: Some(200),
            placeholder: Some("https://".into()),
        }),
        question(
            "q5",
            "Describe a project you are proud of",
            true,
            Some("q2 >= 2"),
            QuestionKind::LongText {
                max_length: Some(2000),
                placeholder: None,
            },
        ),
        question("q6", "Resume", false, None, QuestionKind::FileUpload {
            accepted_types: vec![".pdf".into(), ".docx".into()],
            max_size: Some(5 * 1024 * 1024),
        }),
    ];
    for (order, question) in screening.iter_mut().chain(written.iter_mut()).enumerate() {
        question.order = order as i64 + 1;
    }

    Assessment {
        id: AssessmentId::from(format!("assessment-{}", job.slug).as_str()),
        job_id: job.id.clone(),
        title: format!("{} Assessment", job.title),
        description: Some(format!("Screening questions for the {} role.", job.title)),
        sections: vec![
            AssessmentSection {
                id: SectionId::from("screening"),
                title: "Screening".into(),
                description: None,
                order: 1,
                questions: screening,
            },
            AssessmentSection {
                id: SectionId::from("written"),
                title: "Written".into(),
                description: None,
                order: 2,
                questions: written,
            },
        ],
        time_limit_minutes: Some(45),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
#[path = "tests/seed_tests.rs"]
mod tests;
