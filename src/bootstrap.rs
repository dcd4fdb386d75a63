//! Startup tasks the embedding transport runs once before serving requests.
//!
//! Includes:
//! - Logger initialization
//! - Folder structure creation
//! - ffmpeg availability probe

use crate::config::PairmuxConfig;
use crate::transcode::check_ffmpeg;
use anyhow::{Context, Result};
use env_logger::{Builder, Env, WriteStyle};
use std::fs;

/// Initialize env_logger, defaulting to `info` when `RUST_LOG` is unset.
/// Safe to call more than once (later calls are no-ops).
pub fn init_logger() {
    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .write_style(WriteStyle::Auto)
        .try_init();
}

/// Create the media directory and the account-store parent directory.
pub fn initialize_folders(config: &PairmuxConfig) -> Result<()> {
    fs::create_dir_all(&config.media_dir)
        .with_context(|| format!("failed to create media dir {:?}", config.media_dir))?;
    if let Some(parent) = config.accounts_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create account store dir {parent:?}"))?;
    }
    Ok(())
}

/// Run every startup task: logging, folders, and the ffmpeg probe. A missing
/// ffmpeg is logged loudly but not fatal, so a transport can still serve
/// `stats` and grant commands on a misconfigured host.
pub fn startup(config: &PairmuxConfig) -> Result<()> {
    init_logger();
    initialize_folders(config)?;
    check_ffmpeg(&config.ffmpeg_bin);
    Ok(())
}
