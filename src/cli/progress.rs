//! Progress display for a sync run: one bar per asset stream.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::models::{AssetKind, AssetOutcome, AssetStatus, StreamStats};

pub struct SyncProgress {
    multi: MultiProgress,
    titles: ProgressBar,
    achievements: ProgressBar,
}

impl SyncProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let titles = multi.add(Self::stream_bar(AssetKind::Title));
        let achievements = multi.add(Self::stream_bar(AssetKind::Achievement));
        Self {
            multi,
            titles,
            achievements,
        }
    }

    fn stream_bar(kind: AssetKind) -> ProgressBar {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix:<13} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("█▓░"),
        );
        bar.set_prefix(kind.container());
        bar.set_message("listing");
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        bar
    }

    fn bar(&self, kind: AssetKind) -> &ProgressBar {
        match kind {
            AssetKind::Title => &self.titles,
            AssetKind::Achievement => &self.achievements,
        }
    }

    pub fn start_stream(&self, kind: AssetKind, stats: &StreamStats) {
        let bar = self.bar(kind);
        bar.set_length(stats.eligible as u64);
        bar.set_message(format!("{} already stored", stats.existing));
    }

    /// Advance the stream's bar for a finished unit.
    pub fn record(&self, outcome: &AssetOutcome) {
        if outcome.status != AssetStatus::Skipped {
            self.bar(outcome.kind).inc(1);
        }
    }

    pub fn finish_stream(&self, kind: AssetKind) {
        self.bar(kind).finish_with_message("done");
    }

    /// Print a line above the bars.
    pub fn println(&self, message: &str) {
        let _ = self.multi.println(message);
    }

    pub fn finish(&self) {
        for bar in [&self.titles, &self.achievements] {
            if !bar.is_finished() {
                bar.abandon_with_message("stopped");
            }
        }
    }
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self::new()
    }
}
