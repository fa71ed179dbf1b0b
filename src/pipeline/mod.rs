// Hardening job pipeline
//
// fetch -> unpack -> transform -> repack -> align & sign -> publish, then
// finalize. Every job ends with exactly one result payload.

pub mod error;
pub mod job;
pub mod result;
pub mod workspace;
pub mod publish;
pub mod transform;
pub mod orchestrator;

pub use error::{ErrorKind, PipelineError, PipelineResult, ValidationError};
pub use job::{Job, JobRequest, NamingStrategy};
pub use result::{HardeningSummary, JobOutcome, JobStatus, ResultPayload};
pub use workspace::StagingWorkspace;
pub use publish::{find_launcher_icon, PublicLayout};
pub use transform::{apply_transforms, TransformOptions, TransformReport};
pub use orchestrator::{identity_store_from_config, Orchestrator, PipelineTools};
