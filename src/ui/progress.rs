use crate::indexer::IndexEvent;
use crossbeam::channel::{Receiver, Sender, unbounded};
use indicatif::{ProgressBar, ProgressStyle};
use std::thread;
use std::time::Duration;

/// Progress bar for an indexing run, fed by [`IndexEvent`]s on a channel
pub struct IndexProgress {
    bar: ProgressBar,
    handle: Option<thread::JoinHandle<()>>,
}

impl IndexProgress {
    /// Start the display thread. Draws nothing unless `visible` and stdout is
    /// a terminal.
    pub fn start(visible: bool) -> (Self, Sender<IndexEvent>) {
        let (tx, rx) = unbounded::<IndexEvent>();

        let bar = if visible && console::Term::stdout().is_term() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        bar.set_message("Scanning files");
        bar.enable_steady_tick(Duration::from_millis(100));

        let worker = bar.clone();
        let handle = thread::spawn(move || drive(worker, rx));
        (
            Self {
                bar,
                handle: Some(handle),
            },
            tx,
        )
    }

    /// Wait for the run's last event (or for every sender to drop) and clear
    /// the bar.
    pub fn finish(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.bar.finish_and_clear();
    }
}

fn drive(bar: ProgressBar, rx: Receiver<IndexEvent>) {
    for event in rx {
        match event {
            IndexEvent::Extracting { total } => {
                if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar.set_length(total as u64);
                bar.set_position(0);
                bar.set_message("Extracting");
            }
            IndexEvent::FileDone { path, .. } => {
                bar.inc(1);
                bar.set_message(path);
            }
            IndexEvent::Schema => bar.set_message("Schema"),
            IndexEvent::Finished => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_progress_finishes() {
        let (progress, tx) = IndexProgress::start(false);
        tx.send(IndexEvent::Extracting { total: 2 }).unwrap();
        tx.send(IndexEvent::FileDone { path: "a.rb".into(), ok: true }).unwrap();
        tx.send(IndexEvent::Finished).unwrap();
        progress.finish();
    }

    #[test]
    fn test_dropped_sender_ends_display() {
        let (progress, tx) = IndexProgress::start(false);
        drop(tx);
        progress.finish();
    }
}
