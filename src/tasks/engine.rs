//! Slide timing engine.
//!
//! A single actor task owns the playback state. Public methods only enqueue
//! commands, and the advance timer plus progress ticker for the current epoch
//! run in their own task which reports back through a bounded channel. Every
//! epoch carries a generation number; the actor drops timer events whose
//! generation is no longer current, and cancels the epoch task when the epoch
//! is replaced.

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::select;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::Error;
use crate::events::{EngineEvent, PlaybackState, PlaybackStatus, Progress, SlideChange};

const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);
const DEFAULT_EVENT_BUFFER: usize = 32;
const TIMER_BUFFER: usize = 8;
/// Stand-in deadline for durations too large to add to an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Tunables for [`PlaybackEngine::with_options`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// How long each slide stays up before the engine advances.
    pub slide_duration: Duration,
    /// Resolution of progress events.
    pub tick_period: Duration,
    /// Capacity of the outbound event channel.
    pub event_buffer: usize,
}

impl EngineOptions {
    pub fn new(slide_duration: Duration) -> Self {
        Self {
            slide_duration,
            tick_period: DEFAULT_TICK_PERIOD,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.slide_duration.is_zero() {
            return Err(Error::InvalidDuration);
        }
        if self.tick_period.is_zero() {
            return Err(Error::InvalidOption(
                "tick period must be greater than zero".into(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(Error::InvalidOption(
                "event buffer must hold at least one event".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Command {
    Start,
    Pause,
    GoTo(usize),
    Step(Step),
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Forward,
    Back,
}

#[derive(Debug)]
enum TimerEvent {
    Tick { generation: u64, elapsed: Duration },
    Expired { generation: u64 },
}

/// Handle to a running slideshow.
///
/// Commands never block: they are queued for the engine task and take effect
/// in the order they were issued. Queries read the state last published by
/// the engine task, so a command that was just queued may not be reflected
/// yet; use [`PlaybackEngine::status`] to wait for it.
#[derive(Debug)]
pub struct PlaybackEngine {
    playlist: Arc<[PathBuf]>,
    options: EngineOptions,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<PlaybackStatus>,
    cancel: CancellationToken,
    stopped: AtomicBool,
    task: JoinHandle<()>,
}

impl PlaybackEngine {
    /// Build an engine with the default tick period and event buffer.
    ///
    /// Must be called from within a Tokio runtime. The engine starts idle;
    /// nothing is emitted until [`PlaybackEngine::start`].
    pub fn new(
        playlist: Vec<PathBuf>,
        slide_duration: Duration,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>), Error> {
        Self::with_options(playlist, EngineOptions::new(slide_duration))
    }

    pub fn with_options(
        playlist: Vec<PathBuf>,
        options: EngineOptions,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>), Error> {
        if playlist.is_empty() {
            return Err(Error::EmptyPlaylist);
        }
        options.validate()?;

        let playlist: Arc<[PathBuf]> = playlist.into();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(options.event_buffer);
        let (timer_tx, timer_rx) = mpsc::channel(TIMER_BUFFER);
        let (status_tx, status_rx) = watch::channel(PlaybackStatus {
            index: 0,
            state: PlaybackState::Idle,
            remaining: options.slide_duration,
        });
        let cancel = CancellationToken::new();

        let actor = Actor {
            playlist: Arc::clone(&playlist),
            options,
            events: event_tx,
            status: status_tx,
            timer_tx,
            cancel: cancel.clone(),
            index: 0,
            phase: PlaybackState::Idle,
            remaining: options.slide_duration,
            generation: 0,
            epoch: None,
        };
        let task = tokio::spawn(actor.run(command_rx, timer_rx));

        info!(
            items = playlist.len(),
            slide_duration = %humantime::format_duration(options.slide_duration),
            "playback engine ready"
        );

        let engine = Self {
            playlist,
            options,
            commands: command_tx,
            status: status_rx,
            cancel,
            stopped: AtomicBool::new(false),
            task,
        };
        Ok((engine, event_rx))
    }

    /// Arm the timer for the current slide. Restarts the slide from zero if
    /// playback is already running or paused.
    pub fn start(&self) -> Result<(), Error> {
        self.send(Command::Start)
    }

    /// Toggle between running and paused.
    pub fn pause(&self) -> Result<(), Error> {
        self.send(Command::Pause)
    }

    /// Jump to `index` (wrapped to the playlist length) and restart its timer.
    ///
    /// Returns the item that will be shown.
    pub fn next_slide(&self, index: usize) -> Result<PathBuf, Error> {
        let index = index % self.playlist.len();
        self.send(Command::GoTo(index))?;
        Ok(self.playlist[index].clone())
    }

    /// Move one slide forward, relative to the engine's own position.
    pub fn skip_forward(&self) -> Result<(), Error> {
        self.send(Command::Step(Step::Forward))
    }

    /// Move one slide back, wrapping from the first item to the last.
    pub fn skip_back(&self) -> Result<(), Error> {
        self.send(Command::Step(Step::Back))
    }

    /// Terminate the engine task and close the event stream.
    ///
    /// Only the first call succeeds; later calls return [`Error::Stopped`].
    pub fn stop(&self) -> Result<(), Error> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Err(Error::Stopped);
        }
        info!("stopping playback engine");
        self.cancel.cancel();
        Ok(())
    }

    /// Drop the command handle and wait for the engine task to exit.
    pub async fn join(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(err) = task.await {
            warn!("playback engine task failed: {err}");
        }
    }

    pub fn current_index(&self) -> usize {
        self.status.borrow().index
    }

    pub fn current_item(&self) -> PathBuf {
        self.playlist[self.current_index()].clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.status.borrow().state
    }

    pub fn is_paused(&self) -> bool {
        self.state() == PlaybackState::Paused
    }

    /// Subscribe to state snapshots published by the engine task.
    pub fn status(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.clone()
    }

    pub fn playlist(&self) -> &[PathBuf] {
        &self.playlist
    }

    pub fn slide_duration(&self) -> Duration {
        self.options.slide_duration
    }

    fn send(&self, command: Command) -> Result<(), Error> {
        if self.stopped.load(Ordering::Acquire) || self.cancel.is_cancelled() {
            debug!(?command, "command rejected; engine stopped");
            return Err(Error::Stopped);
        }
        self.commands.send(command).map_err(|_| Error::Stopped)
    }
}

/// Timer state for one epoch. Dropping it cancels the epoch task.
struct Epoch {
    started: Instant,
    remaining_at_start: Duration,
    /// Cleared once the task has returned normally.
    timer: Option<JoinHandle<()>>,
    _timer: DropGuard,
}

impl Epoch {
    fn remaining_now(&self) -> Duration {
        self.remaining_at_start
            .saturating_sub(self.started.elapsed())
    }
}

struct Actor {
    playlist: Arc<[PathBuf]>,
    options: EngineOptions,
    events: mpsc::Sender<EngineEvent>,
    status: watch::Sender<PlaybackStatus>,
    timer_tx: mpsc::Sender<TimerEvent>,
    cancel: CancellationToken,
    index: usize,
    phase: PlaybackState,
    remaining: Duration,
    generation: u64,
    epoch: Option<Epoch>,
}

impl Actor {
    #[instrument(name = "playback", skip_all)]
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut timers: mpsc::Receiver<TimerEvent>,
    ) {
        // Any exit path tears down the current epoch task with the root token.
        let _guard = self.cancel.clone().drop_guard();

        loop {
            let flow = select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("cancel received; exiting playback engine");
                    break;
                }

                // Commands win over timer events that are ready at the same time,
                // so a manual jump always supersedes a pending expiry.
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("all engine handles dropped; exiting playback engine");
                        break;
                    }
                },

                Some(event) = timers.recv() => self.handle_timer(event).await,

                res = timer_exit(&mut self.epoch) => match res {
                    Ok(()) => {
                        if let Some(epoch) = self.epoch.as_mut() {
                            epoch.timer = None;
                        }
                        ControlFlow::Continue(())
                    }
                    Err(err) => {
                        error!(generation = self.generation, "slide timer task failed: {err}");
                        ControlFlow::Break(())
                    }
                },
            };
            if flow.is_break() {
                break;
            }
        }

        self.disarm();
        self.phase = PlaybackState::Stopped;
        self.publish();
        info!(index = self.index, "playback engine stopped");
    }

    async fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        trace!(?command, phase = ?self.phase, "engine command");
        match command {
            Command::Start => {
                let restarting = self.phase != PlaybackState::Idle;
                self.remaining = self.options.slide_duration;
                self.arm();
                self.phase = PlaybackState::Running;
                self.publish();
                info!(index = self.index, restarting, "playback started");
                if restarting {
                    return self
                        .deliver(EngineEvent::Progress(Progress::reset(
                            self.options.slide_duration,
                        )))
                        .await;
                }
                ControlFlow::Continue(())
            }
            Command::Pause => {
                match self.phase {
                    PlaybackState::Running => {
                        if let Some(epoch) = self.epoch.as_ref() {
                            self.remaining = epoch.remaining_now();
                        }
                        self.disarm();
                        self.phase = PlaybackState::Paused;
                        self.publish();
                        info!(
                            index = self.index,
                            remaining_ms = self.remaining.as_millis() as u64,
                            "playback paused"
                        );
                    }
                    PlaybackState::Paused => {
                        self.arm();
                        self.phase = PlaybackState::Running;
                        self.publish();
                        info!(
                            index = self.index,
                            remaining_ms = self.remaining.as_millis() as u64,
                            "playback resumed"
                        );
                    }
                    PlaybackState::Idle | PlaybackState::Stopped => {
                        debug!(phase = ?self.phase, "pause ignored; playback not running");
                    }
                }
                ControlFlow::Continue(())
            }
            Command::GoTo(index) => self.show(index).await,
            Command::Step(step) => {
                let len = self.playlist.len();
                let index = match step {
                    Step::Forward => (self.index + 1) % len,
                    Step::Back => (self.index + len - 1) % len,
                };
                self.show(index).await
            }
        }
    }

    async fn handle_timer(&mut self, event: TimerEvent) -> ControlFlow<()> {
        match event {
            TimerEvent::Tick {
                generation,
                elapsed,
            } if self.is_current(generation) => {
                self.remaining = self.options.slide_duration.saturating_sub(elapsed);
                self.publish();
                self.emit_progress(elapsed)
            }
            TimerEvent::Expired { generation } if self.is_current(generation) => {
                let next = (self.index + 1) % self.playlist.len();
                debug!(from = self.index, to = next, "slide timer expired");
                self.show(next).await
            }
            stale => {
                trace!(?stale, current = self.generation, "discarding stale timer event");
                ControlFlow::Continue(())
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        generation == self.generation && self.phase == PlaybackState::Running
    }

    /// The single slide transition shared by manual and automatic navigation.
    async fn show(&mut self, index: usize) -> ControlFlow<()> {
        self.index = index % self.playlist.len();
        self.remaining = self.options.slide_duration;
        self.arm();
        self.phase = PlaybackState::Running;
        self.publish();

        let item = self.playlist[self.index].clone();
        info!(index = self.index, item = %item.display(), "slide changed");

        self.deliver(EngineEvent::Progress(Progress::reset(
            self.options.slide_duration,
        )))
        .await?;
        self.deliver(EngineEvent::SlideChanged(SlideChange {
            index: self.index,
            item,
        }))
        .await
    }

    /// Replace the current epoch with a fresh one covering `self.remaining`.
    fn arm(&mut self) {
        self.disarm();
        let started = Instant::now();
        let token = self.cancel.child_token();
        let timer = EpochTimer {
            generation: self.generation,
            started,
            remaining: self.remaining,
            elapsed: self.options.slide_duration.saturating_sub(self.remaining),
            tick_period: self.options.tick_period,
        };
        trace!(generation = self.generation, remaining = ?self.remaining, "arming epoch");
        let handle = tokio::spawn(timer.run(self.timer_tx.clone(), token.clone()));
        self.epoch = Some(Epoch {
            started,
            remaining_at_start: self.remaining,
            timer: Some(handle),
            _timer: token.drop_guard(),
        });
    }

    fn disarm(&mut self) {
        self.epoch = None;
        self.generation = self.generation.wrapping_add(1);
    }

    fn publish(&self) {
        self.status.send_replace(PlaybackStatus {
            index: self.index,
            state: self.phase,
            remaining: self.remaining,
        });
    }

    fn emit_progress(&self, elapsed: Duration) -> ControlFlow<()> {
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        let progress = Progress {
            elapsed,
            slide_duration: self.options.slide_duration,
        };
        match self.events.try_send(EngineEvent::Progress(progress)) {
            Ok(()) => ControlFlow::Continue(()),
            Err(TrySendError::Full(_)) => {
                trace!("event buffer full; dropping progress tick");
                ControlFlow::Continue(())
            }
            Err(TrySendError::Closed(_)) => {
                warn!("event consumer closed; stopping playback engine");
                ControlFlow::Break(())
            }
        }
    }

    /// Deliver an event that must not be lost, giving up only on cancellation.
    async fn deliver(&self, event: EngineEvent) -> ControlFlow<()> {
        if self.cancel.is_cancelled() {
            return ControlFlow::Break(());
        }
        select! {
            biased;
            _ = self.cancel.cancelled() => ControlFlow::Break(()),
            res = self.events.send(event) => match res {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => {
                    warn!("event consumer closed; stopping playback engine");
                    ControlFlow::Break(())
                }
            },
        }
    }
}

/// Advance timer and progress ticker for one epoch.
struct EpochTimer {
    generation: u64,
    started: Instant,
    remaining: Duration,
    /// Elapsed slide time when the epoch was armed.
    elapsed: Duration,
    tick_period: Duration,
}

impl EpochTimer {
    async fn run(self, to_engine: mpsc::Sender<TimerEvent>, cancel: CancellationToken) {
        let deadline = instant_after(self.started, self.remaining);
        let first = until_next_tick(self.elapsed, self.tick_period);
        let mut next_tick = instant_after(self.started, first);
        let mut elapsed = self.elapsed.saturating_add(first);

        loop {
            let (at, event) = if next_tick <= deadline {
                (
                    next_tick,
                    TimerEvent::Tick {
                        generation: self.generation,
                        elapsed,
                    },
                )
            } else {
                (
                    deadline,
                    TimerEvent::Expired {
                        generation: self.generation,
                    },
                )
            };
            let expired = matches!(event, TimerEvent::Expired { .. });

            select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = sleep_until(at) => {}
            }
            select! {
                biased;
                _ = cancel.cancelled() => return,
                res = to_engine.send(event) => {
                    if res.is_err() {
                        return;
                    }
                }
            }
            if expired {
                return;
            }
            next_tick = instant_after(next_tick, self.tick_period);
            elapsed = elapsed.saturating_add(self.tick_period);
        }
    }
}

/// Delay from `elapsed` to the next whole multiple of `period`.
fn until_next_tick(elapsed: Duration, period: Duration) -> Duration {
    let into = elapsed.as_nanos() % period.as_nanos();
    let into = Duration::new(
        (into / 1_000_000_000) as u64,
        (into % 1_000_000_000) as u32,
    );
    period - into
}

fn instant_after(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .unwrap_or_else(|| Instant::now() + FAR_FUTURE)
}

/// Resolves when the current epoch task exits; pending while there is none.
async fn timer_exit(epoch: &mut Option<Epoch>) -> Result<(), JoinError> {
    match epoch.as_mut().and_then(|epoch| epoch.timer.as_mut()) {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
