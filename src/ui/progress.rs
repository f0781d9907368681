use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar over the conversations of a sync run.
///
/// Hidden when stdout is not a terminal so piped output stays clean.
pub fn sync_progress() -> ProgressBar {
    if !console::Term::stdout().is_term() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} conversations {msg}") {
        pb.set_style(style.progress_chars("=> "));
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
