// Result payload delivered once per job

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::error::{ErrorKind, PipelineError};
use super::job::Job;

const SUCCESS_MESSAGE: &str = "APK hardened successfully";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
    Failed,
}

/// What the transform and publish stages did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardeningSummary {
    pub permissions_removed: usize,
    pub package_renamed: bool,
    pub files_rewritten: usize,
    pub display_name_updated: bool,
    pub protection_stub_injected: bool,
    pub launch_reporter_injected: bool,
    pub launchers_hooked: usize,
    pub filler_files_added: usize,
    pub icon_extracted: bool,
    pub idsig_files_removed: usize,
}

/// Everything a successful run reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutcome {
    pub download_url: String,
    pub public_path: PathBuf,
    pub file_name: String,
    pub original_package: String,
    pub new_package: String,
    pub old_version_code: u64,
    pub new_version_code: u64,
    pub old_version_name: String,
    pub new_version_name: String,
    pub old_display_name: String,
    pub new_display_name: String,
    pub icon_url: Option<String>,
    pub keystore_url: Option<String>,
    pub summary: HardeningSummary,
}

/// JSON body posted to the callback.
///
/// Success-only fields are always present and `null` on failure, so
/// receivers can read a single shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub job_id: Uuid,
    pub id: String,
    pub original_url: String,
    pub status: JobStatus,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub download_url: Option<String>,
    pub public_path: Option<String>,
    pub file_name: Option<String>,
    pub original_package: Option<String>,
    pub new_package: Option<String>,
    pub old_version_code: Option<u64>,
    pub new_version_code: Option<u64>,
    pub old_version_name: Option<String>,
    pub new_version_name: Option<String>,
    pub old_display_name: Option<String>,
    pub new_display_name: Option<String>,
    pub icon_url: Option<String>,
    pub keystore_url: Option<String>,
    pub message: Option<String>,
    pub hardening_summary: Option<HardeningSummary>,
}

impl ResultPayload {
    fn base(job: &Job, status: JobStatus) -> Self {
        Self {
            job_id: job.job_id(),
            id: job.id().to_string(),
            original_url: job.apk_url().to_string(),
            status,
            error: None,
            error_kind: None,
            download_url: None,
            public_path: None,
            file_name: None,
            original_package: None,
            new_package: None,
            old_version_code: None,
            new_version_code: None,
            old_version_name: None,
            new_version_name: None,
            old_display_name: None,
            new_display_name: None,
            icon_url: None,
            keystore_url: None,
            message: None,
            hardening_summary: None,
        }
    }

    pub fn failed(job: &Job, error: &PipelineError) -> Self {
        Self {
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            ..Self::base(job, JobStatus::Failed)
        }
    }

    pub fn succeeded(job: &Job, outcome: JobOutcome) -> Self {
        Self {
            download_url: Some(outcome.download_url),
            public_path: Some(outcome.public_path.display().to_string()),
            file_name: Some(outcome.file_name),
            original_package: Some(outcome.original_package),
            new_package: Some(outcome.new_package),
            old_version_code: Some(outcome.old_version_code),
            new_version_code: Some(outcome.new_version_code),
            old_version_name: Some(outcome.old_version_name),
            new_version_name: Some(outcome.new_version_name),
            old_display_name: Some(outcome.old_display_name),
            new_display_name: Some(outcome.new_display_name),
            icon_url: outcome.icon_url,
            keystore_url: outcome.keystore_url,
            message: Some(SUCCESS_MESSAGE.to_string()),
            hardening_summary: Some(outcome.summary),
            ..Self::base(job, JobStatus::Success)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}
