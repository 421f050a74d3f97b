//! Client side of the hiring platform: an HTTP client for the API, the
//! optimistic jobs-board reorder coordinator, and the assessment runner
//! with its draft persistence.

pub mod drafts;
pub mod error;
pub mod http;
pub mod reorder;
pub mod runner;
pub mod view_store;

pub use drafts::{DraftScope, DraftStore, MemoryDraftStore};
pub use error::ClientError;
pub use http::{HttpClient, RemoteSubmission};
pub use reorder::{JobsRemote, ReorderCoordinator, ReorderOutcome};
pub use runner::{AssessmentRunner, SubmitHandler};
pub use view_store::{ViewSnapshot, ViewStore};
