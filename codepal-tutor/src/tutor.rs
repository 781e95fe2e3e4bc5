//! Tutor runtime - drives sessions against a model provider
//!
//! One cooperative loop owns everything: commands come in through
//! [`Tutor::dispatch`], outstanding model calls and the next-step delay are
//! polled together in a single `FuturesUnordered`, and every change is
//! published as a [`View`] on a watch channel.

use crate::phrases::Locale;
use crate::session::{CallTicket, Followup, ModelCall, Session, Snapshot};
use codepal_core::{Curriculum, Error, ModelProvider, Progress, Result};
use futures_util::future::LocalBoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Pause before the next step's instruction is posted
pub const NEXT_STEP_DELAY: Duration = Duration::from_millis(1500);

/// Configuration for the tutor
#[derive(Debug, Clone)]
pub struct TutorConfig {
    /// Model id; empty uses the provider's default
    pub model: String,
    pub next_step_delay: Duration,
    pub locale: Locale,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            next_step_delay: NEXT_STEP_DELAY,
            locale: Locale::default(),
        }
    }
}

/// Something the player did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SelectLevel(u32),
    Submit(String),
    Run,
    EditCode(String),
    ReturnToMenu,
}

/// One row of the level menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelEntry {
    pub id: u32,
    pub title: String,
    pub world: String,
    pub unlocked: bool,
    pub completed: bool,
}

/// What the presentation layer shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum View {
    Menu(Vec<LevelEntry>),
    Playing(Snapshot),
}

struct Settled {
    ticket: CallTicket,
    outcome: Outcome,
}

enum Outcome {
    Reply(Result<String>),
    Elapsed,
}

/// The tutor runtime
pub struct Tutor<P: ModelProvider + 'static> {
    provider: Arc<P>,
    config: TutorConfig,
    course: Curriculum,
    progress: Progress,
    session: Option<Session>,
    epoch: u64,
    pending: FuturesUnordered<LocalBoxFuture<'static, Settled>>,
    view: watch::Sender<View>,
}

impl<P: ModelProvider + 'static> Tutor<P> {
    pub fn new(provider: P, course: Curriculum, config: TutorConfig) -> Self {
        let progress = Progress::new();
        let (view, _) = watch::channel(View::Menu(menu(&course, &progress)));
        Self {
            provider: Arc::new(provider),
            config,
            course,
            progress,
            session: None,
            epoch: 0,
            pending: FuturesUnordered::new(),
            view,
        }
    }

    /// Watch the published view
    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.view.subscribe()
    }

    pub fn view(&self) -> View {
        self.view.borrow().clone()
    }

    pub fn course(&self) -> &Curriculum {
        &self.course
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    /// The level menu as it stands now
    pub fn menu(&self) -> Vec<LevelEntry> {
        menu(&self.course, &self.progress)
    }

    /// True when no model call or delay is outstanding
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply one player command.
    ///
    /// Selecting a locked or unknown level fails and leaves the view as it
    /// was. Session commands outside a session fail with `InvalidArgument`.
    pub fn dispatch(&mut self, command: Command) -> Result<()> {
        debug!(target: "codepal::tutor", ?command, "dispatch");
        match command {
            Command::SelectLevel(id) => {
                let level = self
                    .progress
                    .check_selectable(&self.course, id)
                    .map_err(|e| e.with_operation("tutor::dispatch"))?
                    .clone();
                self.epoch += 1;
                self.session = Some(Session::start(level, self.config.locale, self.epoch));
            }
            Command::Submit(text) => {
                if let Some(call) = self.playing("submit")?.submit(&text) {
                    self.send(call);
                }
            }
            Command::Run => {
                if let Some(call) = self.playing("run")?.request_run() {
                    self.send(call);
                }
            }
            Command::EditCode(code) => self.playing("edit_code")?.edit_code(code),
            Command::ReturnToMenu => {
                self.epoch += 1;
                if self.session.take().is_some() {
                    info!(target: "codepal::tutor", "returned to menu");
                }
            }
        }
        self.publish();
        Ok(())
    }

    /// Wait for the next outstanding call or delay and apply it.
    ///
    /// Returns false when nothing is outstanding.
    pub async fn step(&mut self) -> bool {
        match self.pending.next().await {
            Some(settled) => {
                self.settle_one(settled);
                true
            }
            None => false,
        }
    }

    /// Drive until nothing is outstanding
    pub async fn settle(&mut self) {
        while self.step().await {}
    }

    /// Serve commands from `commands` until the channel closes.
    ///
    /// Rejected commands are logged and otherwise ignored.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Self {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if let Err(err) = self.dispatch(command) {
                            warn!(target: "codepal::tutor", error = %err, "command rejected");
                        }
                    }
                    None => break,
                },
                Some(settled) = self.pending.next(), if !self.pending.is_empty() => {
                    self.settle_one(settled);
                }
            }
        }
        self
    }

    fn playing(&mut self, action: &'static str) -> Result<&mut Session> {
        self.session.as_mut().ok_or_else(|| {
            Error::invalid_argument("no level is being played")
                .with_operation("tutor::dispatch")
                .with_context("action", action)
        })
    }

    fn send(&mut self, call: ModelCall) {
        let provider = Arc::clone(&self.provider);
        let model = self.config.model.clone();
        let ModelCall { ticket, request } = call;

        debug!(target: "codepal::tutor", ?ticket, "model call queued");
        self.pending.push(
            async move {
                let reply = provider.send(&model, &request).await;
                Settled {
                    ticket,
                    outcome: Outcome::Reply(reply),
                }
            }
            .boxed_local(),
        );
    }

    fn schedule_announcement(&mut self, ticket: CallTicket) {
        let delay = self.config.next_step_delay;
        self.pending.push(
            async move {
                tokio::time::sleep(delay).await;
                Settled {
                    ticket,
                    outcome: Outcome::Elapsed,
                }
            }
            .boxed_local(),
        );
    }

    fn settle_one(&mut self, settled: Settled) {
        let Settled { ticket, outcome } = settled;

        let session = match self.session.as_mut() {
            Some(session) if session.epoch() == ticket.epoch => session,
            _ => {
                debug!(target: "codepal::tutor", ?ticket, "dropping result for a closed session");
                return;
            }
        };

        let followups = match outcome {
            Outcome::Reply(reply) => session.apply(ticket, reply),
            Outcome::Elapsed => {
                session.announce(ticket);
                Vec::new()
            }
        };

        for followup in followups {
            match followup {
                Followup::Call(call) => self.send(call),
                Followup::Announce(ticket) => self.schedule_announcement(ticket),
                Followup::LevelCompleted(id) => {
                    if self.progress.record(id) {
                        info!(target: "codepal::tutor", level = id, "progress recorded");
                    }
                }
            }
        }
        self.publish();
    }

    fn publish(&self) {
        let view = match &self.session {
            Some(session) => View::Playing(session.snapshot()),
            None => View::Menu(menu(&self.course, &self.progress)),
        };
        self.view.send_replace(view);
    }
}

fn menu(course: &Curriculum, progress: &Progress) -> Vec<LevelEntry> {
    course
        .levels
        .iter()
        .map(|level| LevelEntry {
            id: level.id,
            title: level.title.clone(),
            world: course
                .world(&level.world_id)
                .map(|w| w.title.clone())
                .unwrap_or_else(|| level.world_id.clone()),
            unlocked: progress.is_selectable(course, level.id),
            completed: progress.is_completed(level.id),
        })
        .collect()
}
