//! FFmpeg initialisation and console verbosity.
//!
//! FFmpeg has its own logging, separate from the [`log`] facade this crate
//! reports through. [`set_ffmpeg_log_level`] maps a [`log::LevelFilter`]
//! onto FFmpeg's `AV_LOG_*` levels so both can be tuned with one knob.
//!
//! ```no_run
//! // Keep FFmpeg quiet unless something goes wrong.
//! ffvmaf::set_ffmpeg_log_level(log::LevelFilter::Error);
//! ```

use std::sync::OnceLock;

use ffmpeg_next::util::log::Level;

use crate::error::VmafError;

static INITIALISED: OnceLock<Result<(), String>> = OnceLock::new();

/// Initialise FFmpeg once per process.
///
/// Safe to call repeatedly; only the first call does any work. Every
/// [`MediaSource`](crate::MediaSource) constructor calls this.
pub fn init() -> Result<(), VmafError> {
    INITIALISED
        .get_or_init(|| ffmpeg_next::init().map_err(|error| error.to_string()))
        .clone()
        .map_err(|reason| VmafError::ResourceAllocation(format!("FFmpeg runtime: {reason}")))
}

/// Set FFmpeg's console verbosity from a [`log::LevelFilter`].
///
/// `Off` silences FFmpeg completely, `Error` keeps errors only, `Trace`
/// enables everything FFmpeg can print.
pub fn set_ffmpeg_log_level(level: log::LevelFilter) {
    ffmpeg_next::util::log::set_level(to_ffmpeg_level(level));
}

/// Parse an FFmpeg-style level name (`quiet`, `error`, `warning`, ...).
pub fn parse_ffmpeg_log_level(name: &str) -> Option<log::LevelFilter> {
    let level = match name.to_ascii_lowercase().as_str() {
        "quiet" | "off" | "panic" | "fatal" => log::LevelFilter::Off,
        "error" => log::LevelFilter::Error,
        "warning" | "warn" => log::LevelFilter::Warn,
        "info" | "verbose" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => return None,
    };
    Some(level)
}

fn to_ffmpeg_level(level: log::LevelFilter) -> Level {
    match level {
        log::LevelFilter::Off => Level::Quiet,
        log::LevelFilter::Error => Level::Error,
        log::LevelFilter::Warn => Level::Warning,
        log::LevelFilter::Info => Level::Info,
        log::LevelFilter::Debug => Level::Debug,
        log::LevelFilter::Trace => Level::Trace,
    }
}
