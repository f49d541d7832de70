use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::app::FetchProgress;
use crate::format::human_bytes;

/// Terminal rendering of a bundle download. Steps are tensors, component
/// rows and the metadata pair.
pub struct PullBar {
    bar: ProgressBar,
}

impl PullBar {
    pub fn new(model: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("pulling manifest for {}", model));
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn handle(&self, event: FetchProgress) {
        match event {
            FetchProgress::Manifest { components, tensors } => {
                self.bar.set_length((tensors + components + 1) as u64);
                self.bar.set_position(0);
                self.bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
            }
            FetchProgress::TensorCached { name } => {
                self.bar.set_message(format!("cached {}", name));
                self.bar.inc(1);
            }
            FetchProgress::TensorFetched { name, bytes } => {
                self.bar.set_message(format!("{} ({})", name, human_bytes(bytes)));
                self.bar.inc(1);
            }
            FetchProgress::Component { index, name } => {
                self.bar.set_message(format!("component {}: {}", index, name));
                self.bar.inc(1);
            }
            FetchProgress::Metadata => {
                self.bar.set_message("config and tokenizer".to_string());
                self.bar.inc(1);
            }
            FetchProgress::Registered { .. } => {
                self.bar.finish_with_message("success");
            }
        }
    }

    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }
}
