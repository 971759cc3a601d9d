//! FINISHING phase: flush, resume, clean up, report
//!
//! Runs after a normal end, a cancellation or a fatal error alike. The
//! server client given to the coordinator must still be usable here, so it
//! is not tied to the run token.

use super::UploadCoordinator;
use crate::error::{IngestError, Result};
use crate::models::JobCommand;
use photosync_common::EventCode;
use tracing::{info, warn};

impl UploadCoordinator {
    pub(super) async fn finish(&self) -> Result<()> {
        let mut errors = Vec::new();

        if let Err(e) = self.albums.close().await {
            self.recorder.record(
                EventCode::ErrorServerError,
                None,
                &[("album", "flush"), ("error", &e.to_string())],
            );
            errors.push(e);
        }

        self.tagger.close().await;

        self.resume_jobs().await;

        let queued: Vec<String> = std::mem::take(&mut *self.lock_delete_queue());
        if !queued.is_empty() {
            info!(count = queued.len(), "Deleting replaced server assets");
            if let Err(e) = self.client.delete_assets(&queued, true).await {
                self.recorder.record(
                    EventCode::ErrorServerError,
                    None,
                    &[("delete", &queued.join(",")), ("error", &e.to_string())],
                );
                errors.push(e);
            }
        }

        for line in self.recorder.report().lines() {
            info!("{}", line);
        }

        match IngestError::join(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Resume the jobs paused at the start of the run
    async fn resume_jobs(&self) {
        let paused: Vec<String> = std::mem::take(&mut *self.lock_paused_jobs());
        for name in paused {
            match self.client.send_job_command(&name, JobCommand::Resume).await {
                Ok(()) => info!(job = %name, "Server job resumed"),
                Err(e) => warn!(job = %name, error = %e, "Can't resume server job"),
            }
        }
    }
}
