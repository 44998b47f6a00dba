//! Progress bar adapter using indicatif.

use attention_core::{ProgressEvent, ProgressSink};
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle};

/// Progress bar adapter for CLI output.
pub struct ProgressBar {
    bar: Option<IndicatifBar>,
    quiet: bool,
}

impl ProgressBar {
    /// Creates a new progress bar.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, suppress all output
    /// * `show_bar` - If true, show progress bar; otherwise print per-stage lines
    #[must_use]
    pub fn new(quiet: bool, show_bar: bool) -> Self {
        if quiet {
            return Self {
                bar: None,
                quiet: true,
            };
        }

        let bar = show_bar.then(|| {
            let bar = IndicatifBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
            ) {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar
        });

        Self { bar, quiet }
    }
}

impl ProgressSink for ProgressBar {
    fn on_event(&self, event: ProgressEvent) {
        if self.quiet {
            return;
        }

        match event {
            ProgressEvent::Started { stage, total } => {
                if let Some(bar) = &self.bar {
                    bar.reset();
                    if let Some(t) = total {
                        bar.set_length(u64::try_from(t).unwrap_or(u64::MAX));
                    }
                    bar.set_message(stage);
                }
            }
            ProgressEvent::Advanced { message } => {
                if let Some(bar) = &self.bar {
                    bar.inc(1);
                    bar.set_message(message);
                }
            }
            ProgressEvent::Skipped { item, reason } => {
                let line = format!("WARN: Skipping {item}: {reason}");
                match &self.bar {
                    Some(bar) => bar.println(line),
                    None => eprintln!("{line}"),
                }
            }
            ProgressEvent::Epoch {
                epoch,
                train_loss,
                val_loss,
                val_mae,
            } => {
                let val = match (val_loss, val_mae) {
                    (Some(loss), Some(mae)) => format!(" val_loss={loss:.4} val_mae={mae:.4}"),
                    _ => String::new(),
                };
                let line = format!("epoch {epoch}: train_loss={train_loss:.4}{val}");
                match &self.bar {
                    Some(bar) => {
                        bar.inc(1);
                        bar.println(line);
                    }
                    None => eprintln!("{line}"),
                }
            }
            ProgressEvent::Finished { summary } => match &self.bar {
                Some(bar) => bar.finish_with_message(summary),
                None => eprintln!("{summary}"),
            },
        }
    }
}
