use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::tasks::engine::PlaybackEngine;

/// A user action, as the buttons of a viewer window would issue it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Start,
    TogglePause,
    Next,
    Previous,
    /// Zero-based target slide.
    GoTo(usize),
    Stop,
}

/// Parse one line of keyboard input.
///
/// `g <n>` takes the same 1-based slide number the display shows.
pub fn parse(line: &str) -> Option<Control> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let control = match words.next() {
        None => Control::TogglePause,
        Some("n" | "next") => Control::Next,
        Some("p" | "prev" | "previous") => Control::Previous,
        Some("r" | "pause" | "resume") => Control::TogglePause,
        Some("s" | "start") => Control::Start,
        Some("q" | "quit" | "stop") => Control::Stop,
        Some("g" | "go") => {
            let slide: usize = words.next()?.parse().ok()?;
            Control::GoTo(slide.checked_sub(1)?)
        }
        Some(_) => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(control)
}

pub fn apply(engine: &PlaybackEngine, control: Control) -> Result<(), Error> {
    match control {
        Control::Start => engine.start(),
        Control::TogglePause => engine.pause(),
        Control::Next => engine.skip_forward(),
        Control::Previous => engine.skip_back(),
        Control::GoTo(index) => engine.next_slide(index).map(|_| ()),
        Control::Stop => engine.stop(),
    }
}

/// Forward stdin lines until EOF. Runs on a blocking thread.
pub fn read_stdin(to_controls: Sender<String>) {
    for line in io::stdin().lock().lines() {
        match line {
            Ok(line) => {
                if to_controls.blocking_send(line).is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!("stdin read failed: {err}");
                return;
            }
        }
    }
    debug!("stdin closed");
}

/// Map input lines to engine commands until stopped or input ends.
pub async fn run(
    mut lines: Receiver<String>,
    engine: Arc<PlaybackEngine>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            line = lines.recv() => {
                let Some(line) = line else {
                    info!("input closed; initiating shutdown");
                    cancel.cancel();
                    break;
                };
                let Some(control) = parse(&line) else {
                    warn!(input = %line.trim(), "unrecognised key (n, p, r, g <n>, s, q)");
                    continue;
                };
                debug!(?control, "control");
                match apply(&engine, control) {
                    Ok(()) => {}
                    Err(Error::Stopped) => {
                        debug!(?control, "ignored; slideshow already stopped");
                    }
                    Err(err) => warn!(?control, "control failed: {err}"),
                }
                if control == Control::Stop {
                    cancel.cancel();
                    break;
                }
            }
        }
    }
    Ok(())
}
