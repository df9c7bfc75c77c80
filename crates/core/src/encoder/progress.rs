//! Stream parsers for the encoder's diagnostic output.
//!
//! Two parsers run over every chunk: one caches the input duration from the
//! first `Duration: HH:MM:SS.cc` header, the other extracts the current
//! position from the `-progress` key-value stream.

use regex_lite::Regex;

/// Incremental parser over the child's diagnostic stream.
///
/// Progress is reported only once the total duration is known; percent is
/// clamped to `[0, 100]` and never decreases within one run.
pub struct ProgressParser {
    duration_re: Regex,
    out_time_re: Regex,
    time_re: Regex,
    duration_secs: Option<f64>,
    last_percent: u8,
}

/// A parsed position sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    pub percent: u8,
    pub time_secs: f64,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self {
            duration_re: Regex::new(r"Duration: (\d+):(\d{2}):(\d{2})\.(\d{2})")
                .expect("static regex"),
            // out_time_ms is microseconds despite the name; see feed().
            out_time_re: Regex::new(r"out_time_ms=(\d+)").expect("static regex"),
            time_re: Regex::new(r"time=(\d+):(\d{2}):(\d{2})\.(\d{2})").expect("static regex"),
            duration_secs: None,
            last_percent: 0,
        }
    }

    /// Total input duration, once the header has been seen.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    /// Feeds one chunk of diagnostic output. Returns a sample when the
    /// chunk carried a position and the duration is already known.
    pub fn feed(&mut self, chunk: &str) -> Option<ProgressSample> {
        if self.duration_secs.is_none() {
            if let Some(caps) = self.duration_re.captures(chunk) {
                self.duration_secs = Some(clock_to_secs(&caps));
            }
        }

        let time_secs = if let Some(caps) = self.out_time_re.captures(chunk) {
            // The field name says milliseconds but the value is in
            // microseconds; dividing by 1_000 would overshoot by 1000x.
            let micros: f64 = caps.get(1)?.as_str().parse().ok()?;
            Some(micros / 1_000_000.0)
        } else {
            self.time_re
                .captures(chunk)
                .map(|caps| clock_to_secs(&caps))
        }?;

        let duration = self.duration_secs?;
        if duration <= 0.0 {
            return None;
        }

        let percent = ((time_secs / duration * 100.0).floor() as u64).min(100) as u8;
        self.last_percent = self.last_percent.max(percent);

        Some(ProgressSample {
            percent: self.last_percent,
            time_secs,
        })
    }
}

impl Default for ProgressParser {
    fn default() -> Self {
        Self::new()
    }
}

fn clock_to_secs(caps: &regex_lite::Captures) -> f64 {
    let hours: f64 = caps[1].parse().unwrap_or(0.0);
    let minutes: f64 = caps[2].parse().unwrap_or(0.0);
    let seconds: f64 = caps[3].parse().unwrap_or(0.0);
    let centis: f64 = caps[4].parse().unwrap_or(0.0);
    hours * 3600.0 + minutes * 60.0 + seconds + centis / 100.0
}
