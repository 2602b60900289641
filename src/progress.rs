//! Terminal rendering of per-device progress
//!
//! Device tasks send [`ProgressEvent`]s; one thread owns every bar and draws
//! them keyed by device id.

use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::JoinHandle;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use nuwriter_core::{Phase, ProgressEvent};

const BYTES_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";
const PERCENT_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}";

/// Owner of the rendering thread
pub struct ProgressRenderer {
    tx: Sender<ProgressEvent>,
    handle: JoinHandle<()>,
}

impl ProgressRenderer {
    /// Start the rendering thread
    pub fn start() -> Self {
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::spawn(move || render(rx));
        Self { tx, handle }
    }

    /// Sender to hand to a device session
    pub fn sender(&self) -> Sender<ProgressEvent> {
        self.tx.clone()
    }

    /// Wait until every session has dropped its sender and the bars are done
    pub fn finish(self) {
        drop(self.tx);
        if self.handle.join().is_err() {
            log::warn!("progress renderer panicked");
        }
    }
}

fn style(phase: Phase) -> ProgressStyle {
    let template = match phase {
        Phase::Erase => PERCENT_TEMPLATE,
        _ => BYTES_TEMPLATE,
    };
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

fn render(rx: Receiver<ProgressEvent>) {
    let multi = MultiProgress::new();
    let mut bars: HashMap<usize, ProgressBar> = HashMap::new();

    for event in rx {
        match event {
            ProgressEvent::Begin {
                device,
                phase,
                total,
                detail,
            } => {
                let bar = bars
                    .entry(device)
                    .or_insert_with(|| multi.add(ProgressBar::new(total)));
                bar.reset();
                bar.set_length(total);
                bar.set_style(style(phase));
                let msg = if detail.is_empty() {
                    format!("#{} {}", device, phase.label())
                } else {
                    format!("#{} {} {}", device, phase.label(), detail)
                };
                bar.set_message(msg);
            }
            ProgressEvent::Advance { device, done, .. } => {
                if let Some(bar) = bars.get(&device) {
                    bar.set_position(done);
                }
            }
            ProgressEvent::Finish { device, phase } => {
                if let Some(bar) = bars.get(&device) {
                    if let Some(len) = bar.length() {
                        bar.set_position(len);
                    }
                    bar.set_message(format!("#{} {} done", device, phase.label()));
                }
            }
            ProgressEvent::Done { device, error } => {
                if let Some(bar) = bars.remove(&device) {
                    match error {
                        Some(e) => bar.abandon_with_message(format!("#{} failed: {}", device, e)),
                        None => bar.finish(),
                    }
                }
            }
        }
    }

    for bar in bars.into_values() {
        bar.finish_and_clear();
    }
}
