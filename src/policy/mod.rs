//! Watermark and quota policy, derived from the account store.
//!
//! The quota is enforced retroactively: the transcode that reaches the cap
//! has already happened, the requester is only notified. Nothing here ever
//! blocks a request.

use crate::accounts::AccountStore;
use crate::common::errors::{PipelineError, Result};
use crate::session::SubmissionKind;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;

/// Outcome of the post-transcode bookkeeping, delivered to the requester
/// alongside the finished video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostTranscodeNotice {
    None,
    /// Free quota reached or passed; `uses` is the new count. Informational
    /// only, future requests still go through (watermarked).
    QuotaExceeded { uses: u64 },
}

/// Classify an inbound submission by declared MIME type. Anything audio pairs
/// as the audio track; every other supported payload (video, still image,
/// generic document) is treated as the visual track.
pub fn classify_submission(
    mime_type: Option<&str>,
    file_ref: Option<PathBuf>,
) -> Result<(SubmissionKind, PathBuf)> {
    let file_ref = file_ref.ok_or(PipelineError::UnsupportedSubmission)?;
    let kind = match mime_type {
        Some(mime) if mime.contains("audio") => SubmissionKind::Audio,
        _ => SubmissionKind::Visual,
    };
    Ok((kind, file_ref))
}

pub struct PolicyEngine {
    accounts: Arc<AccountStore>,
    free_quota: u64,
}

impl PolicyEngine {
    pub fn new(accounts: Arc<AccountStore>, free_quota: u64) -> Self {
        PolicyEngine {
            accounts,
            free_quota,
        }
    }

    /// Watermark exactly when the requester is not premium.
    pub fn decide_watermark(&self, identity: &str) -> bool {
        !self.accounts.is_premium(identity)
    }

    /// Record one use and decide whether to nudge the requester about the
    /// free quota. Called only after a successful transcode.
    pub fn after_successful_transcode(&self, identity: &str) -> Result<PostTranscodeNotice> {
        let uses = self.accounts.record_usage(identity)?;
        if !self.accounts.is_premium(identity) && uses >= self.free_quota {
            info!("{} reached {} of {} free edits", identity, uses, self.free_quota);
            return Ok(PostTranscodeNotice::QuotaExceeded { uses });
        }
        Ok(PostTranscodeNotice::None)
    }
}
