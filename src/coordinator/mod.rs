//! Delivery coordination: the per-requester pairing state machine.
//!
//! Each requester moves Idle -> AwaitingPair -> Processing -> Idle, one cycle
//! at a time. Distinct requesters run fully in parallel; the blocking ffmpeg
//! call only ever holds the completing requester's own cycle lock.

use crate::accounts::AccountStore;
use crate::common::OUTPUT_EXTENSION;
use crate::common::errors::{PipelineError, Result};
use crate::config::PairmuxConfig;
use crate::policy::{self, PolicyEngine, PostTranscodeNotice};
use crate::session::{PairingSessions, SubmissionKind};
use crate::transcode::{TranscodeJob, Transcoder};
use chrono::Local;
use dashmap::DashMap;
use log::{info, warn};
use rand::Rng;
use rand::distr::Alphanumeric;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// What the transport should tell the requester after a submission.
#[derive(Debug)]
pub enum SubmissionOutcome {
    /// Stored; waiting for the complementary kind.
    PairedPending(SubmissionKind),
    /// The pair completed and the transcode succeeded.
    TranscodeSuccess {
        output: PathBuf,
        notice: PostTranscodeNotice,
    },
    /// The pair completed but ffmpeg failed. The session is cleared; the
    /// requester retries by resubmitting both files. Usage was not advanced.
    TranscodeFailure { diagnostic: String },
    /// The submission carried no usable file reference. Nothing was stored.
    UnsupportedType,
}

pub struct DeliveryCoordinator {
    config: PairmuxConfig,
    accounts: Arc<AccountStore>,
    sessions: PairingSessions,
    policy: PolicyEngine,
    transcoder: Box<dyn Transcoder>,
    /// One mutex per identity ever seen, never reaped: cardinality matches
    /// the account store, which also keeps every identity forever. A sweep
    /// would only matter for an unbounded anonymous-identity transport.
    cycle_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl DeliveryCoordinator {
    /// Open the account store, ensure the media directory exists, and mark
    /// the configured admin identity (permanent, implicitly premium).
    pub fn new(config: PairmuxConfig, transcoder: Box<dyn Transcoder>) -> Result<Self> {
        std::fs::create_dir_all(&config.media_dir).map_err(|source| {
            PipelineError::StorageIo {
                path: config.media_dir.clone(),
                source,
            }
        })?;

        let accounts = Arc::new(AccountStore::open(&config.accounts_file)?);
        if let Some(admin) = &config.admin_identity {
            accounts.grant_admin(admin)?;
        }

        let policy = PolicyEngine::new(Arc::clone(&accounts), config.free_quota);
        Ok(DeliveryCoordinator {
            config,
            accounts,
            sessions: PairingSessions::new(),
            policy,
            transcoder,
            cycle_locks: DashMap::new(),
        })
    }

    /// Handle one inbound file submission. Blocks for the duration of the
    /// transcode when this submission completes the pair.
    ///
    /// `Err` is reserved for account-store failures; everything the requester
    /// can act on comes back as a [`SubmissionOutcome`].
    pub fn submit_file(
        &self,
        identity: &str,
        mime_type: Option<&str>,
        file_ref: Option<PathBuf>,
    ) -> Result<SubmissionOutcome> {
        let (kind, file_ref) = match policy::classify_submission(mime_type, file_ref) {
            Ok(classified) => classified,
            Err(PipelineError::UnsupportedSubmission) => {
                return Ok(SubmissionOutcome::UnsupportedType);
            }
            Err(other) => return Err(other),
        };

        // One pairing cycle at a time per requester. Other requesters are
        // untouched by this lock, including while ffmpeg runs below.
        let lock = self.cycle_lock(identity);
        let _cycle = lock.lock().unwrap_or_else(|e| e.into_inner());

        self.sessions.submit(identity, kind, file_ref);
        if !self.sessions.is_complete(identity) {
            info!("{}: stored {} track, awaiting {}", identity, kind, kind.complement());
            return Ok(SubmissionOutcome::PairedPending(kind));
        }

        // Pair complete: consume the session up front so a failed transcode
        // can never leave a stuck pairing behind.
        let (visual, audio) = self.sessions.take_and_clear(identity)?;
        let watermark = self
            .policy
            .decide_watermark(identity)
            .then(|| self.config.watermark_text.clone());

        let job = TranscodeJob {
            visual,
            audio,
            output: self.output_path(identity),
            watermark,
        };

        match self.transcoder.run(&job) {
            Ok(output) => {
                let notice = self.policy.after_successful_transcode(identity)?;
                Ok(SubmissionOutcome::TranscodeSuccess { output, notice })
            }
            Err(PipelineError::TranscodeFailed { diagnostic }) => {
                warn!("{}: transcode failed: {}", identity, diagnostic);
                Ok(SubmissionOutcome::TranscodeFailure { diagnostic })
            }
            Err(other) => Err(other),
        }
    }

    pub fn query_is_premium(&self, identity: &str) -> bool {
        self.accounts.is_premium(identity)
    }

    /// Textual report over all known accounts. The transport must verify the
    /// caller is the configured admin before invoking this.
    pub fn usage_report(&self) -> String {
        self.accounts.usage_report()
    }

    pub fn grant_premium_days(&self, identity: &str, days: i64) -> Result<chrono::NaiveDate> {
        self.accounts.grant_premium(identity, days)
    }

    /// Grant premium for the configured default duration. What an unlock
    /// command without an explicit day count maps to.
    pub fn grant_premium_default(&self, identity: &str) -> Result<chrono::NaiveDate> {
        self.accounts.grant_premium(identity, self.config.premium_days)
    }

    pub fn mark_admin(&self, identity: &str) -> Result<()> {
        self.accounts.grant_admin(identity)
    }

    /// Rendered to the requester together with a quota-exceeded notice.
    pub fn upgrade_hint(&self) -> &str {
        &self.config.upgrade_hint
    }

    pub fn accounts(&self) -> &AccountStore {
        &self.accounts
    }

    fn cycle_lock(&self, identity: &str) -> Arc<Mutex<()>> {
        self.cycle_locks
            .entry(identity.to_string())
            .or_default()
            .clone()
    }

    fn output_path(&self, identity: &str) -> PathBuf {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .filter(|c: &u8| c.is_ascii_lowercase() || c.is_ascii_digit())
            .take(6)
            .map(char::from)
            .collect();
        self.config.media_dir.join(format!(
            "{}_final_{}_{}.{}",
            identity,
            Local::now().format("%Y%m%d%H%M%S"),
            suffix,
            OUTPUT_EXTENSION
        ))
    }
}
