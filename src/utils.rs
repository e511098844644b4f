use indicatif::{ProgressBar, ProgressStyle};

pub fn create_progress_bar(quiet: bool, len: usize) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let progress = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{msg:>12} [{bar:40}] {pos}/{len}") {
        progress.set_style(style.progress_chars("=> "));
    }
    progress
}
