//! Error taxonomy for the pairing/transcode pipeline.
//!
//! Every variant is user-surfaceable: the transport layer renders these as
//! chat replies, none of them terminate the process.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An inbound submission carried no usable file reference.
    /// No state was mutated; the requester may simply resend.
    #[error("unsupported submission: no usable file reference found")]
    UnsupportedSubmission,

    /// A pairing cycle was finalized before both kinds were present.
    /// Contract violation: the coordinator checks completeness first, so this
    /// surfacing at all indicates a bug in the calling code.
    #[error("incomplete session for '{identity}': missing {missing}")]
    IncompleteSession {
        identity: String,
        missing: &'static str,
    },

    /// ffmpeg exited non-zero or produced no output file.
    /// The session has been cleared; the requester retries by resubmitting
    /// both files. Usage is never advanced on this path.
    #[error("transcode failed: {diagnostic}")]
    TranscodeFailed { diagnostic: String },

    /// Account store read or write failure. The temp-file + rename discipline
    /// guarantees the on-disk mapping is never left half-written.
    #[error("account store I/O failed for {path:?}")]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The on-disk account mapping could not be parsed or encoded.
    #[error("account store corrupt or unencodable at {path:?}")]
    StorageCodec {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    /// True when the error is recoverable from the requester's point of view
    /// (resubmitting is a sensible next step).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::UnsupportedSubmission | PipelineError::TranscodeFailed { .. }
        )
    }
}
