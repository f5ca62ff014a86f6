//! Reader for ffmpeg's `-progress` key/value channel.
//!
//! The channel is a sequence of `key=value` lines; each snapshot ends with a
//! `progress=continue|end` line. Only `out_time` and `total_size` are used.

use crate::error::{MediaError, Result};
use std::fmt;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Snapshot of a running conversion
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Progress {
    /// Output time produced so far, in seconds
    pub duration: f64,
    /// Bytes written so far
    pub size: u64,
}

/// Callback invoked with a snapshot roughly every `rate`
#[derive(Clone)]
pub struct ProgressCallback {
    pub rate: Duration,
    pub func: Arc<dyn Fn(Progress) + Send + Sync>,
}

impl ProgressCallback {
    pub fn new(rate: Duration, func: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        Self {
            rate,
            func: Arc::new(func),
        }
    }

    /// A zero rate disables reporting
    pub fn is_enabled(&self) -> bool {
        !self.rate.is_zero()
    }
}

impl fmt::Debug for ProgressCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressCallback").field("rate", &self.rate).finish_non_exhaustive()
    }
}

/// Parse `HH:MM:SS[.fraction]` into seconds.
///
/// ```rust,ignore
/// assert_eq!(parse_timestamp("00:01:02.5")?, 62.5);
/// ```
pub fn parse_timestamp(text: &str) -> Result<f64> {
    let invalid = || MediaError::Parse(format!("invalid timestamp: {:?}", text));

    let mut parts = text.trim().splitn(3, ':');
    let (hours, minutes, seconds) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(m), Some(s)) => (h, m, s),
        _ => return Err(invalid()),
    };

    let hours: u64 = hours.parse().map_err(|_| invalid())?;
    let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
    let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }

    let whole = hours
        .checked_mul(3600)
        .and_then(|secs| secs.checked_add(minutes * 60))
        .ok_or_else(invalid)?;
    Ok(whole as f64 + seconds)
}

/// Read the progress channel until EOF, invoking `callback` per snapshot.
///
/// Emitted values never decrease. Unknown keys and unparsable values are
/// skipped. Returns the number of snapshots delivered.
pub fn read_progress<R: BufRead>(reader: R, callback: &ProgressCallback) -> usize {
    let mut emitted = Progress::default();
    let mut current = Progress::default();
    let mut count = 0;

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Progress channel read failed: {}", e);
                break;
            }
        };

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();

        match key.trim() {
            "out_time" => match parse_timestamp(value) {
                Ok(seconds) => current.duration = seconds,
                Err(e) => debug!("Skipping progress value: {}", e),
            },
            "total_size" => {
                if let Ok(size) = value.parse::<u64>() {
                    current.size = size;
                }
            }
            "progress" => {
                emitted = Progress {
                    duration: emitted.duration.max(current.duration),
                    size: emitted.size.max(current.size),
                };
                current = Progress::default();
                (callback.func)(emitted);
                count += 1;
            }
            _ => {}
        }
    }

    count
}
