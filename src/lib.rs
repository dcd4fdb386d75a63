//! pairmux pairs one visual and one audio submission per requester, muxes
//! them into a single video with ffmpeg, and gates the watermark on a
//! usage-quota/premium policy.
//!
//! The crate is the core a chat transport embeds: the transport downloads the
//! files, calls [`coordinator::DeliveryCoordinator::submit_file`] per
//! delivery, and renders the returned [`coordinator::SubmissionOutcome`] back
//! to the requester. Message plumbing, command parsing and the admin identity
//! check stay on the transport's side.

pub mod accounts;
pub mod bootstrap;
pub mod common;
pub mod config;
pub mod coordinator;
pub mod policy;
pub mod session;
pub mod transcode;

pub use common::errors::{PipelineError, Result};
pub use config::PairmuxConfig;
pub use coordinator::{DeliveryCoordinator, SubmissionOutcome};
pub use policy::PostTranscodeNotice;
pub use session::SubmissionKind;
pub use transcode::{FfmpegTranscoder, TranscodeJob, Transcoder};
