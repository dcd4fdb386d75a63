//! Transient pairing buffer: per-requester partial submissions waiting for
//! their complementary track. Purely in-memory; a crash simply asks the
//! requester to resubmit.

use crate::common::errors::{PipelineError, Result};
use dashmap::DashMap;
use std::fmt;
use std::path::PathBuf;

/// Classification of an inbound file: visual track (video, still image or
/// document) or audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionKind {
    Visual,
    Audio,
}

impl SubmissionKind {
    pub fn complement(self) -> SubmissionKind {
        match self {
            SubmissionKind::Visual => SubmissionKind::Audio,
            SubmissionKind::Audio => SubmissionKind::Visual,
        }
    }
}

impl fmt::Display for SubmissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionKind::Visual => write!(f, "visual"),
            SubmissionKind::Audio => write!(f, "audio"),
        }
    }
}

/// At most one pending reference per kind; a resubmission of the same kind
/// overwrites the previous one (last-write-wins).
#[derive(Debug, Default)]
struct PendingPair {
    visual: Option<PathBuf>,
    audio: Option<PathBuf>,
}

impl PendingPair {
    fn slot(&mut self, kind: SubmissionKind) -> &mut Option<PathBuf> {
        match kind {
            SubmissionKind::Visual => &mut self.visual,
            SubmissionKind::Audio => &mut self.audio,
        }
    }

    fn is_complete(&self) -> bool {
        self.visual.is_some() && self.audio.is_some()
    }
}

/// Concurrent identity -> pending-pair map. Per-identity cycle ordering is
/// the coordinator's responsibility; this map only guarantees that individual
/// operations do not tear.
#[derive(Default)]
pub struct PairingSessions {
    sessions: DashMap<String, PendingPair>,
}

impl PairingSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the reference for `kind`, creating the session if
    /// this is the identity's first pending submission.
    pub fn submit(&self, identity: &str, kind: SubmissionKind, file_ref: PathBuf) {
        let mut pair = self.sessions.entry(identity.to_string()).or_default();
        *pair.slot(kind) = Some(file_ref);
    }

    /// Both kinds present?
    pub fn is_complete(&self, identity: &str) -> bool {
        self.sessions
            .get(identity)
            .map(|pair| pair.is_complete())
            .unwrap_or(false)
    }

    /// Atomically remove the session and hand both references to the caller.
    /// Calling this on an incomplete session is a contract violation.
    pub fn take_and_clear(&self, identity: &str) -> Result<(PathBuf, PathBuf)> {
        let incomplete = |missing| PipelineError::IncompleteSession {
            identity: identity.to_string(),
            missing,
        };

        let (_, pair) = self
            .sessions
            .remove_if(identity, |_, pair| pair.is_complete())
            .ok_or_else(|| incomplete("a full pair"))?;

        let visual = pair.visual.ok_or_else(|| incomplete("visual"))?;
        let audio = pair.audio.ok_or_else(|| incomplete("audio"))?;
        Ok((visual, audio))
    }

    /// Drop whatever is pending for `identity`, complete or not. Used after a
    /// failed transcode so the pairing never sticks.
    pub fn clear(&self, identity: &str) {
        self.sessions.remove(identity);
    }

    pub fn pending_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(name: &str) -> PathBuf {
        PathBuf::from(name)
    }

    #[test]
    fn pair_completes_in_either_order() {
        let sessions = PairingSessions::new();

        sessions.submit("alice", SubmissionKind::Visual, p("a.mp4"));
        assert!(!sessions.is_complete("alice"));
        sessions.submit("alice", SubmissionKind::Audio, p("a.mp3"));
        assert!(sessions.is_complete("alice"));

        sessions.submit("bob", SubmissionKind::Audio, p("b.mp3"));
        sessions.submit("bob", SubmissionKind::Visual, p("b.mp4"));
        assert!(sessions.is_complete("bob"));
    }

    #[test]
    fn resubmission_overwrites_only_that_kind() {
        let sessions = PairingSessions::new();
        sessions.submit("alice", SubmissionKind::Visual, p("first.mp4"));
        sessions.submit("alice", SubmissionKind::Visual, p("second.mp4"));
        assert!(!sessions.is_complete("alice"));

        sessions.submit("alice", SubmissionKind::Audio, p("song.mp3"));
        let (visual, audio) = sessions.take_and_clear("alice").unwrap();
        assert_eq!(visual, p("second.mp4"));
        assert_eq!(audio, p("song.mp3"));
    }

    #[test]
    fn take_and_clear_deletes_the_session() {
        let sessions = PairingSessions::new();
        sessions.submit("alice", SubmissionKind::Visual, p("a.mp4"));
        sessions.submit("alice", SubmissionKind::Audio, p("a.mp3"));

        sessions.take_and_clear("alice").unwrap();
        assert!(!sessions.is_complete("alice"));
        assert_eq!(sessions.pending_count(), 0);
    }

    #[test]
    fn take_on_incomplete_session_is_an_error_and_keeps_state() {
        let sessions = PairingSessions::new();
        sessions.submit("alice", SubmissionKind::Audio, p("a.mp3"));

        let err = sessions.take_and_clear("alice").unwrap_err();
        assert!(matches!(err, PipelineError::IncompleteSession { .. }));
        // The half-filled session survives a bad take attempt.
        assert_eq!(sessions.pending_count(), 1);

        let err = sessions.take_and_clear("nobody").unwrap_err();
        assert!(matches!(err, PipelineError::IncompleteSession { .. }));
    }

    #[test]
    fn identities_are_independent() {
        let sessions = PairingSessions::new();
        sessions.submit("alice", SubmissionKind::Visual, p("a.mp4"));
        sessions.submit("bob", SubmissionKind::Audio, p("b.mp3"));

        assert!(!sessions.is_complete("alice"));
        assert!(!sessions.is_complete("bob"));
        sessions.clear("alice");
        assert_eq!(sessions.pending_count(), 1);
    }
}
