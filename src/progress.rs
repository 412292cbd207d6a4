//! Progress indicators for the provisync CLI.

use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for a batch of `len` entities
pub fn bar(len: u64, prefix: &str) -> ProgressBar {
    let style = ProgressStyle::with_template("{prefix:.cyan.bold} [{bar:30}] {pos}/{len} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    let pb = ProgressBar::new(len);
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb
}

/// Bar that draws nothing, for quiet runs and tests
pub fn hidden() -> ProgressBar {
    ProgressBar::hidden()
}
