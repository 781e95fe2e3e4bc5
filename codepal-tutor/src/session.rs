//! # Play Session
//!
//! The tutoring state machine for one level. It is pure and synchronous:
//! operations return the model calls they need, and the runtime feeds each
//! result back through [`Session::apply`]. Every call carries a
//! [`CallTicket`]; a result whose ticket is no longer outstanding is dropped.
//!
//! ```text
//! Idle --submit--> AwaitingJudgement --judged--> Idle
//! Idle --run--> Executing --objective met, more steps--> Idle (next step)
//!                         --objective met, last step--> Finished
//!                         --otherwise--> Idle (+ explanation call)
//! ```

use crate::phrases::Locale;
use crate::prompt;
use codepal_core::{
    decode, Error, ExecutionResult, Level, ModelRequest, Result, Role, TutorJudgement, VisualState,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Which control the player should use next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GuideFocus {
    AwaitingInput,
    AwaitingExecution,
    AwaitingFinish,
}

/// Coarse state, derived from outstanding calls and the finished flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Idle,
    AwaitingJudgement,
    Executing,
    Finished,
}

/// One entry of the chat log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub code: Option<String>,
    pub completed: Option<bool>,
    pub visual_action: Option<String>,
    pub correction: Option<String>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }

    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            code: None,
            completed: None,
            visual_action: None,
            correction: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    fn from_judgement(judgement: TutorJudgement) -> Self {
        Self {
            role: Role::Model,
            text: judgement.message,
            code: judgement.code,
            completed: Some(judgement.step_complete),
            visual_action: judgement.visual_action,
            correction: judgement.correction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Judgement,
    Execution,
    Explanation,
    /// The delayed "next step" chat line
    Announcement,
}

/// Identity of an outstanding call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallTicket {
    pub epoch: u64,
    pub level: u32,
    pub step: usize,
    pub seq: u64,
    pub kind: CallKind,
}

/// A model request the runtime must fulfil
#[derive(Debug, Clone)]
pub struct ModelCall {
    pub ticket: CallTicket,
    pub request: ModelRequest,
}

/// Work that follows from applying a result
#[derive(Debug, Clone)]
pub enum Followup {
    /// Send another model request
    Call(ModelCall),
    /// Wait the next-step delay, then hand the ticket to [`Session::announce`]
    Announce(CallTicket),
    /// Record the level as completed
    LevelCompleted(u32),
}

/// Read-only view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub epoch: u64,
    pub level_id: u32,
    pub level_title: String,
    pub world_id: String,
    pub step_index: usize,
    pub step_count: usize,
    pub instruction: String,
    pub hint: String,
    pub phase: Phase,
    pub focus: GuideFocus,
    pub chat: Vec<ChatMessage>,
    pub code: String,
    pub console: String,
    pub visual: VisualState,
}

#[derive(Debug, Default)]
struct Outstanding {
    judgement: Option<CallTicket>,
    execution: Option<CallTicket>,
    explanation: Option<CallTicket>,
    announcement: Option<CallTicket>,
}

impl Outstanding {
    fn slot(&mut self, kind: CallKind) -> &mut Option<CallTicket> {
        match kind {
            CallKind::Judgement => &mut self.judgement,
            CallKind::Execution => &mut self.execution,
            CallKind::Explanation => &mut self.explanation,
            CallKind::Announcement => &mut self.announcement,
        }
    }
}

/// State of one level being played
#[derive(Debug)]
pub struct Session {
    epoch: u64,
    level: Level,
    locale: Locale,
    step: usize,
    chat: Vec<ChatMessage>,
    focus: GuideFocus,
    code: String,
    console: String,
    visual: VisualState,
    finished: bool,
    next_seq: u64,
    outstanding: Outstanding,
}

impl Session {
    /// Begin `level` at its first step with a greeting in the chat.
    ///
    /// `epoch` must differ from every earlier session's so their results are
    /// recognised as stale.
    pub fn start(level: Level, locale: Locale, epoch: u64) -> Self {
        let first = level.step(0).map(|s| s.instruction.as_str()).unwrap_or_default();
        let greeting = ChatMessage::model(locale.greeting(&level.title, first));

        info!(target: "codepal::session", level = level.id, epoch, "level started");

        Self {
            epoch,
            level,
            locale,
            step: 0,
            chat: vec![greeting],
            focus: GuideFocus::AwaitingInput,
            code: String::new(),
            console: String::new(),
            visual: VisualState::new(),
            finished: false,
            next_seq: 0,
            outstanding: Outstanding::default(),
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn step_index(&self) -> usize {
        self.step
    }

    pub fn focus(&self) -> GuideFocus {
        self.focus
    }

    pub fn chat(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn console(&self) -> &str {
        &self.console
    }

    pub fn visual(&self) -> &VisualState {
        &self.visual
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn phase(&self) -> Phase {
        if self.finished {
            Phase::Finished
        } else if self.outstanding.execution.is_some() {
            Phase::Executing
        } else if self.outstanding.judgement.is_some() {
            Phase::AwaitingJudgement
        } else {
            Phase::Idle
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let step = self.level.step(self.step);
        Snapshot {
            epoch: self.epoch,
            level_id: self.level.id,
            level_title: self.level.title.clone(),
            world_id: self.level.world_id.clone(),
            step_index: self.step,
            step_count: self.level.step_count(),
            instruction: step.map(|s| s.instruction.clone()).unwrap_or_default(),
            hint: step.map(|s| s.hint.clone()).unwrap_or_default(),
            phase: self.phase(),
            focus: self.focus,
            chat: self.chat.clone(),
            code: self.code.clone(),
            console: self.console.clone(),
            visual: self.visual.clone(),
        }
    }

    // =========================================================================
    // Player actions
    // =========================================================================

    /// Send the player's message for judging.
    ///
    /// Ignored when blank, while a judgement is outstanding, or once finished.
    pub fn submit(&mut self, text: &str) -> Option<ModelCall> {
        let text = text.trim();
        if text.is_empty() || self.finished || self.outstanding.judgement.is_some() {
            debug!(target: "codepal::session", "submit ignored");
            return None;
        }
        let step = self.level.step(self.step)?.clone();

        self.chat.push(ChatMessage::user(text));
        let request = prompt::judgement(&self.level, &step, &self.chat, self.locale);
        Some(self.issue(CallKind::Judgement, request))
    }

    /// Ask for a simulated run of the code buffer.
    ///
    /// Ignored while a run is outstanding, when the buffer is blank, or once
    /// finished.
    pub fn request_run(&mut self) -> Option<ModelCall> {
        if self.code.trim().is_empty() || self.finished || self.outstanding.execution.is_some() {
            debug!(target: "codepal::session", "run ignored");
            return None;
        }
        let step = self.level.step(self.step)?;

        let request = prompt::execution(step, &self.code, self.locale);
        Some(self.issue(CallKind::Execution, request))
    }

    /// Replace the code buffer with the editor's contents
    pub fn edit_code(&mut self, code: impl Into<String>) {
        if self.finished {
            return;
        }
        self.code = code.into();
        self.focus = if !self.code.trim().is_empty() && self.outstanding.execution.is_none() {
            GuideFocus::AwaitingExecution
        } else {
            GuideFocus::AwaitingInput
        };
    }

    // =========================================================================
    // Results
    // =========================================================================

    /// Whether `ticket` is the outstanding call of its kind for this step
    pub fn accepts(&self, ticket: &CallTicket) -> bool {
        ticket.epoch == self.epoch
            && ticket.level == self.level.id
            && ticket.step == self.step
            && self.outstanding_ticket(ticket.kind) == Some(*ticket)
    }

    /// Feed back the result of the call identified by `ticket`.
    ///
    /// Stale results are dropped and yield no follow-ups.
    pub fn apply(&mut self, ticket: CallTicket, result: Result<String>) -> Vec<Followup> {
        if !self.accepts(&ticket) {
            debug!(target: "codepal::session", ?ticket, "dropping stale result");
            return Vec::new();
        }
        *self.outstanding.slot(ticket.kind) = None;

        match ticket.kind {
            CallKind::Judgement => {
                self.on_judgement(result);
                Vec::new()
            }
            CallKind::Execution => self.on_execution(result),
            CallKind::Explanation => {
                self.on_explanation(result);
                Vec::new()
            }
            CallKind::Announcement => {
                // Announcements carry no model result
                self.post_announcement();
                Vec::new()
            }
        }
    }

    /// Post the delayed next-step line for `ticket`, unless it went stale.
    pub fn announce(&mut self, ticket: CallTicket) -> bool {
        if ticket.kind != CallKind::Announcement || !self.accepts(&ticket) {
            debug!(target: "codepal::session", ?ticket, "dropping stale announcement");
            return false;
        }
        self.outstanding.announcement = None;
        self.post_announcement();
        true
    }

    fn on_judgement(&mut self, result: Result<String>) {
        let judgement = match result.and_then(|text| decode::<TutorJudgement>(&text)) {
            Ok(judgement) => judgement,
            Err(err) => {
                self.log_failure("judgement", &err);
                self.chat.push(ChatMessage::model(self.locale.apology()));
                return;
            }
        };

        info!(
            target: "codepal::session",
            level = self.level.id,
            step = self.step,
            complete = judgement.step_complete,
            "message judged"
        );

        let complete = judgement.step_complete;
        let message = ChatMessage::from_judgement(judgement);
        if complete {
            if let Some(code) = &message.code {
                self.append_code(code);
                self.focus = GuideFocus::AwaitingExecution;
            }
        }
        self.chat.push(message);
    }

    fn on_execution(&mut self, result: Result<String>) -> Vec<Followup> {
        let outcome = match result.and_then(|text| decode::<ExecutionResult>(&text)) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.log_failure("run", &err);
                self.console = self.locale.runtime_error().to_string();
                self.focus = GuideFocus::AwaitingInput;
                return Vec::new();
            }
        };

        info!(
            target: "codepal::session",
            level = self.level.id,
            step = self.step,
            success = outcome.is_success,
            objective = outcome.is_objective_met,
            commands = outcome.drawing_commands.len(),
            "run judged"
        );

        self.console = outcome.console_output;
        if outcome.is_success {
            self.visual.push(outcome.drawing_commands);
        }
        self.focus = GuideFocus::AwaitingInput;

        if !(outcome.is_success && outcome.is_objective_met) {
            return self.explain().into_iter().map(Followup::Call).collect();
        }

        if self.step + 1 < self.level.step_count() {
            self.step += 1;
            // Results issued for the previous step are now stale
            self.outstanding = Outstanding::default();
            let ticket = self.ticket(CallKind::Announcement);
            self.outstanding.announcement = Some(ticket);
            info!(target: "codepal::session", level = self.level.id, step = self.step, "step advanced");
            vec![Followup::Announce(ticket)]
        } else {
            self.finished = true;
            self.outstanding = Outstanding::default();
            self.focus = GuideFocus::AwaitingFinish;
            self.chat
                .push(ChatMessage::model(self.locale.level_complete(&self.level.title)));
            info!(target: "codepal::session", level = self.level.id, "level completed");
            vec![Followup::LevelCompleted(self.level.id)]
        }
    }

    fn on_explanation(&mut self, result: Result<String>) {
        let text = match result {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => self.locale.explain_fallback().to_string(),
            Err(err) => {
                self.log_failure("explanation", &err);
                self.locale.explain_fallback().to_string()
            }
        };
        self.chat.push(ChatMessage::model(text));
    }

    /// Model-call failures are part of normal play; anything else is a bug
    fn log_failure(&self, call: &'static str, err: &Error) {
        if err.kind().is_model_call() {
            warn!(target: "codepal::session", level = self.level.id, step = self.step, call, error = %err, "model call failed");
        } else {
            error!(target: "codepal::session", level = self.level.id, step = self.step, call, error = %err, "unexpected failure");
        }
    }

    fn explain(&mut self) -> Option<ModelCall> {
        let step = self.level.step(self.step)?;
        let request = prompt::explanation(step, &self.code, &self.console, self.locale);
        Some(self.issue(CallKind::Explanation, request))
    }

    fn post_announcement(&mut self) {
        if let Some(step) = self.level.step(self.step) {
            let line = self.locale.next_step(&step.instruction);
            self.chat.push(ChatMessage::model(line));
        }
    }

    fn append_code(&mut self, code: &str) {
        if !self.code.is_empty() && !self.code.ends_with('\n') {
            self.code.push('\n');
        }
        self.code.push_str(code);
    }

    fn ticket(&mut self, kind: CallKind) -> CallTicket {
        self.next_seq += 1;
        CallTicket {
            epoch: self.epoch,
            level: self.level.id,
            step: self.step,
            seq: self.next_seq,
            kind,
        }
    }

    fn issue(&mut self, kind: CallKind, request: ModelRequest) -> ModelCall {
        let ticket = self.ticket(kind);
        *self.outstanding.slot(kind) = Some(ticket);
        debug!(target: "codepal::session", ?ticket, "model call issued");
        ModelCall { ticket, request }
    }

    fn outstanding_ticket(&self, kind: CallKind) -> Option<CallTicket> {
        match kind {
            CallKind::Judgement => self.outstanding.judgement,
            CallKind::Execution => self.outstanding.execution,
            CallKind::Explanation => self.outstanding.explanation,
            CallKind::Announcement => self.outstanding.announcement,
        }
    }
}
