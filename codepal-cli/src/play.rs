//! Interactive play loop
//!
//! Two halves run on one task: the driver reads stdin and feeds the tutor,
//! the printer watches published views and prints what changed.

use codepal_core::{render, ErrorKind, Frame, Mark, ModelAdapter, Role, UpdatePulse};
use codepal_tutor::{Command, GuideFocus, LevelEntry, Phase, Snapshot, Tutor, View};
use std::path::PathBuf;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

const HELP: &str = "\
Type a message to talk to Pixel, or one of:
  /run            run the code in the editor
  /hint           show a hint for this step
  /code           show the editor
  /edit <code>    replace the editor (use \\n for new lines)
  /canvas [file]  describe the screen, or save it as SVG
  /menu           back to the level menu
  /levels         list the levels
  /play N         play level N
  /quit           leave";

/// One line of player input
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Command(Command),
    Hint,
    Code,
    Canvas(Option<PathBuf>),
    Levels,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Input::Command(Command::Submit(line.to_string()));
    };

    let (word, arg) = match rest.split_once(char::is_whitespace) {
        Some((word, arg)) => (word, arg.trim()),
        None => (rest, ""),
    };

    match word {
        "run" => Input::Command(Command::Run),
        "hint" => Input::Hint,
        "code" => Input::Code,
        "edit" => Input::Command(Command::EditCode(arg.replace("\\n", "\n"))),
        "canvas" => Input::Canvas((!arg.is_empty()).then(|| PathBuf::from(arg))),
        "menu" => Input::Command(Command::ReturnToMenu),
        "levels" => Input::Levels,
        "play" => match arg.parse() {
            Ok(id) => Input::Command(Command::SelectLevel(id)),
            Err(_) => Input::Unknown(line.to_string()),
        },
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

pub async fn run(tutor: Tutor<ModelAdapter>, start_level: Option<u32>) -> anyhow::Result<()> {
    let views = tutor.subscribe();
    println!("{}\n", HELP);
    let (result, ()) = tokio::join!(drive(tutor, start_level), print_views(views));
    result
}

async fn drive(mut tutor: Tutor<ModelAdapter>, start_level: Option<u32>) -> anyhow::Result<()> {
    if let Some(level) = start_level {
        report(tutor.dispatch(Command::SelectLevel(level)));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match parse_input(&line) {
                    Input::Command(command) => report(tutor.dispatch(command)),
                    Input::Hint => match tutor.view() {
                        View::Playing(s) => println!("Hint: {}", s.hint),
                        View::Menu(_) => println!("Pick a level first with /play N."),
                    },
                    Input::Code => match tutor.view() {
                        View::Playing(s) if !s.code.trim().is_empty() => print_code(&s.code),
                        View::Playing(_) => println!("The editor is empty."),
                        View::Menu(_) => println!("Pick a level first with /play N."),
                    },
                    Input::Canvas(path) => match tutor.view() {
                        View::Playing(s) => show_canvas(&s, path),
                        View::Menu(_) => println!("Pick a level first with /play N."),
                    },
                    Input::Levels => print_menu(&tutor.menu()),
                    Input::Help => println!("{}", HELP),
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Unknown(line) => println!("I don't know {}. Type /help.", line),
                }
            }
            _ = tutor.step(), if !tutor.is_idle() => {}
        }
    }
    Ok(())
}

fn report(result: codepal_core::Result<()>) {
    let Err(err) = result else {
        return;
    };
    match err.kind() {
        ErrorKind::LevelLocked => {
            println!("That level is still locked. Finish the level before it first!")
        }
        ErrorKind::LevelNotFound => println!("There is no such level. Type /levels to see them."),
        ErrorKind::InvalidArgument => println!("Pick a level first with /play N."),
        _ => println!("Something went wrong: {}", err),
    }
}

fn print_menu(levels: &[LevelEntry]) {
    println!("Levels:");
    for level in levels {
        let mark = if level.completed {
            "done"
        } else if level.unlocked {
            "open"
        } else {
            "locked"
        };
        println!("  {:>3}. {:<24} {:<12} [{}]", level.id, level.title, level.world, mark);
    }
    println!("Type /play N to start a level.");
}

fn print_code(code: &str) {
    println!("    ┌─ code");
    for line in code.lines() {
        println!("    │ {}", line);
    }
    println!("    └─");
}

fn show_canvas(snapshot: &Snapshot, path: Option<PathBuf>) {
    let frame = render(&snapshot.visual);
    match path {
        Some(path) => match std::fs::write(&path, frame.to_svg()) {
            Ok(()) => println!("Saved the screen to {}", path.display()),
            Err(err) => println!("Could not save {}: {}", path.display(), err),
        },
        None => println!("{}", describe(&frame)),
    }
}

/// Plain-text description of a frame
fn describe(frame: &Frame) -> String {
    if frame.placeholder {
        return "[screen] not initialized yet".to_string();
    }
    let mut out = format!("[screen] {}x{} background {}", frame.width, frame.height, frame.background);
    for mark in &frame.marks {
        let line = match mark {
            Mark::Circle { x, y, radius, color } => {
                format!("circle at ({}, {}) radius {} {}", x, y, radius, color)
            }
            Mark::Rect {
                x,
                y,
                width,
                height,
                color,
            } => format!("rect at ({}, {}) size {}x{} {}", x, y, width, height, color),
            Mark::Text { x, y, text, color } => {
                format!("text at ({}, {}) \"{}\" {}", x, y, text, color)
            }
        };
        out.push_str("\n  - ");
        out.push_str(&line);
    }
    out
}

/// Prints the parts of each published view that changed
#[derive(Default)]
struct Printer {
    in_menu: bool,
    epoch: Option<u64>,
    chat_seen: usize,
    console: String,
    focus: Option<GuideFocus>,
    phase: Option<Phase>,
    pulse: UpdatePulse,
    pulsing: bool,
}

impl Printer {
    fn show(&mut self, view: &View) {
        match view {
            View::Menu(levels) => {
                if !self.in_menu {
                    print_menu(levels);
                }
                self.in_menu = true;
                self.epoch = None;
            }
            View::Playing(snapshot) => {
                self.in_menu = false;
                self.show_session(snapshot);
            }
        }
    }

    fn show_session(&mut self, s: &Snapshot) {
        if self.epoch != Some(s.epoch) {
            println!("\n=== Level {}: {} ===", s.level_id, s.level_title);
            self.epoch = Some(s.epoch);
            self.chat_seen = 0;
            self.console.clear();
            self.focus = None;
            self.phase = None;
            self.pulse = UpdatePulse::default();
            self.pulsing = false;
        }

        for message in s.chat.iter().skip(self.chat_seen) {
            if message.role == Role::Model {
                println!("Pixel: {}", message.text);
                if let Some(correction) = &message.correction {
                    println!("       ({})", correction);
                }
                if let Some(code) = &message.code {
                    print_code(code);
                }
            }
        }
        self.chat_seen = s.chat.len();

        if s.console != self.console {
            if !s.console.is_empty() {
                println!("console> {}", s.console);
            }
            self.console = s.console.clone();
        }

        let active = self.pulse.observe(s.visual.len(), Instant::now());
        if active && !self.pulsing {
            println!("✨ The screen changed!\n{}", describe(&render(&s.visual)));
        }
        self.pulsing = active;

        if self.phase != Some(s.phase) {
            match s.phase {
                Phase::AwaitingJudgement => println!("(Pixel is thinking...)"),
                Phase::Executing => println!("(running your code...)"),
                Phase::Idle | Phase::Finished => {}
            }
            self.phase = Some(s.phase);
        }

        if self.focus != Some(s.focus) {
            match s.focus {
                GuideFocus::AwaitingInput => {
                    println!("Step {}/{}: {}", s.step_index + 1, s.step_count, s.instruction)
                }
                GuideFocus::AwaitingExecution => println!("Type /run to run your code."),
                GuideFocus::AwaitingFinish => println!("Level complete! Type /menu to continue."),
            }
            self.focus = Some(s.focus);
        }
    }
}

async fn print_views(mut views: watch::Receiver<View>) {
    let mut printer = Printer::default();
    let first = views.borrow_and_update().clone();
    printer.show(&first);

    while views.changed().await.is_ok() {
        let view = views.borrow_and_update().clone();
        printer.show(&view);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codepal_core::{DrawingCommand, VisualState};

    #[test]
    fn test_parse_input() {
        assert_eq!(
            parse_input("make it black"),
            Input::Command(Command::Submit("make it black".into()))
        );
        assert_eq!(parse_input("  "), Input::Empty);
        assert_eq!(parse_input("/run"), Input::Command(Command::Run));
        assert_eq!(parse_input("/play 3"), Input::Command(Command::SelectLevel(3)));
        assert!(matches!(parse_input("/play x"), Input::Unknown(_)));
        assert_eq!(
            parse_input("/edit x = 1\\nscreen.fill(\"red\")"),
            Input::Command(Command::EditCode("x = 1\nscreen.fill(\"red\")".into()))
        );
        assert_eq!(parse_input("/canvas"), Input::Canvas(None));
        assert_eq!(
            parse_input("/canvas sky.svg"),
            Input::Canvas(Some(PathBuf::from("sky.svg")))
        );
        assert_eq!(parse_input("/menu"), Input::Command(Command::ReturnToMenu));
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert!(matches!(parse_input("/dance"), Input::Unknown(_)));
    }

    #[test]
    fn test_describe_frame() {
        assert!(describe(&render(&VisualState::new())).contains("not initialized"));

        let mut state = VisualState::new();
        state.push(vec![
            DrawingCommand::Fill {
                color: "#000000".into(),
            },
            DrawingCommand::Circle {
                x: 300.0,
                y: 80.0,
                radius: 40.0,
                color: "yellow".into(),
            },
        ]);
        let text = describe(&render(&state));
        assert!(text.contains("background #000000"));
        assert!(text.contains("circle at (300, 80) radius 40 yellow"));
    }
}
