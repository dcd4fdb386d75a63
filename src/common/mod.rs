pub mod errors;

/// Free edits before a non-premium requester is nudged to upgrade.
/// The cap is soft: processing is never blocked, only flagged.
pub const FREE_EDIT_QUOTA: u64 = 3;

/// Length of a premium grant when no explicit duration is given.
pub const DEFAULT_PREMIUM_DAYS: i64 = 14;

/// Watermark styling is fixed: white 24pt text anchored top-left.
pub const WATERMARK_FONT_SIZE: u32 = 24;
pub const WATERMARK_FONT_COLOR: &'static str = "white";
pub const WATERMARK_POSITION: (u32, u32) = (10, 10);

/// Container extension for muxed output files.
pub const OUTPUT_EXTENSION: &'static str = "mp4";
