use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::events::{EngineEvent, Progress, SlideChange};

const BAR_WIDTH: usize = 20;

/// Text rendering of the slideshow window: the slide label, the current
/// item and a progress bar.
#[derive(Debug)]
pub struct Presenter {
    total: usize,
    slide: SlideChange,
    progress: Progress,
}

impl Presenter {
    pub fn new(total: usize, first: SlideChange, progress: Progress) -> Self {
        Self {
            total,
            slide: first,
            progress,
        }
    }

    pub fn apply(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Progress(progress) => self.progress = progress,
            EngineEvent::SlideChanged(slide) => {
                self.progress = Progress::reset(self.progress.slide_duration);
                self.slide = slide;
            }
        }
    }

    /// "slide 2 of 5" style label; slide numbers start at 1.
    pub fn label(&self) -> String {
        format!("slide {} of {}", self.slide.index + 1, self.total)
    }

    pub fn line(&self) -> String {
        format!(
            "{} [{}] {:.0}s/{:.0}s {}",
            self.label(),
            render_bar(self.progress.fraction(), BAR_WIDTH),
            self.progress.seconds(),
            self.progress.slide_duration.as_secs_f64(),
            self.slide.item.display()
        )
    }
}

pub fn render_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("{}{}", "#".repeat(filled), "-".repeat(width - filled))
}

/// Render engine events until the stream closes or shutdown is requested.
///
/// A closed stream means the engine is gone, so it also triggers shutdown.
pub async fn run(
    mut events: Receiver<EngineEvent>,
    mut view: Presenter,
    cancel: CancellationToken,
) -> Result<()> {
    info!("{}", view.line());
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            event = events.recv() => match event {
                Some(event) => {
                    view.apply(event);
                    info!("{}", view.line());
                }
                None => {
                    info!("slideshow ended");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
    Ok(())
}
