//! Runtime configuration, loaded from the environment (optionally seeded from
//! a `.env` file). All fields have working defaults so a bare deployment only
//! needs `PAIRMUX_ADMIN_IDENTITY` set.

use crate::common::{DEFAULT_PREMIUM_DAYS, FREE_EDIT_QUOTA};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct PairmuxConfig {
    /// Identity whose `stats` queries the transport should honor. Marked
    /// admin (and therefore permanently premium) at bootstrap.
    #[serde(default)]
    pub admin_identity: Option<String>,

    /// Where downloaded tracks and muxed outputs live.
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,

    /// Whole-file JSON mapping identity -> account record.
    #[serde(default = "default_accounts_file")]
    pub accounts_file: PathBuf,

    /// Text burned into non-premium output.
    #[serde(default = "default_watermark_text")]
    pub watermark_text: String,

    /// Rendered to the requester alongside a quota-exceeded notice.
    #[serde(default = "default_upgrade_hint")]
    pub upgrade_hint: String,

    #[serde(default = "default_premium_days")]
    pub premium_days: i64,

    #[serde(default = "default_free_quota")]
    pub free_quota: u64,

    /// Override when ffmpeg is not on PATH.
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("./media")
}

fn default_accounts_file() -> PathBuf {
    PathBuf::from("./db/accounts.json")
}

fn default_watermark_text() -> String {
    "pairmux".to_string()
}

fn default_upgrade_hint() -> String {
    "Upgrade to premium for watermark-free edits.".to_string()
}

fn default_premium_days() -> i64 {
    DEFAULT_PREMIUM_DAYS
}

fn default_free_quota() -> u64 {
    FREE_EDIT_QUOTA
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

impl PairmuxConfig {
    /// Read `PAIRMUX_*` variables from the process environment, after loading
    /// `.env` if one is present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        envy::prefixed("PAIRMUX_")
            .from_env::<PairmuxConfig>()
            .context("failed to deserialize PAIRMUX_* environment variables")
    }
}

impl Default for PairmuxConfig {
    fn default() -> Self {
        PairmuxConfig {
            admin_identity: None,
            media_dir: default_media_dir(),
            accounts_file: default_accounts_file(),
            watermark_text: default_watermark_text(),
            upgrade_hint: default_upgrade_hint(),
            premium_days: default_premium_days(),
            free_quota: default_free_quota(),
            ffmpeg_bin: default_ffmpeg_bin(),
        }
    }
}
