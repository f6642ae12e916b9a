//! Progress bar and logging utilities.
//!
//! Bars are hidden in log-only mode, where periodic `info!` lines take their
//! place for tail-friendly output.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    log_only: bool,
    hidden: bool,
}

impl Progress {
    pub fn new(log_only: bool) -> Self {
        Self {
            log_only,
            hidden: false,
        }
    }

    /// Draws nothing and logs nothing. Used by tests and dry runs of helpers.
    pub fn hidden() -> Self {
        Self {
            log_only: false,
            hidden: true,
        }
    }

    fn draws(&self) -> bool {
        !self.log_only && !self.hidden
    }

    pub fn bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new(len);
        if self.draws() {
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (ETA: {eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=> "),
            );
        } else {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_message(msg.to_string());
        pb
    }

    pub fn spinner(&self, msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if self.draws() {
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{msg} {spinner} [{elapsed_precise}]")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
        } else {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }
        pb.set_message(msg.to_string());
        pb
    }

    /// Log every `interval` items and at the end, in log-only mode only.
    pub fn log(&self, phase: &str, current: u64, total: u64, interval: u64) {
        if !self.log_only || total == 0 {
            return;
        }
        if current % interval.max(1) == 0 || current == total {
            let pct = 100.0 * current as f64 / total as f64;
            info!(target: "progress", "[{}] {}/{} ({:.1}%)", phase, current, total, pct);
        }
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{:.1}m", secs / 60.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1.5m");
    }

    #[test]
    fn test_hidden_bar_tracks_position() {
        let pb = Progress::hidden().bar(10, "Tracks");
        pb.inc(3);
        assert_eq!(pb.position(), 3);
        assert!(pb.is_hidden());
    }
}
