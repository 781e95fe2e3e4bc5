//! Model requests the tutor sends: judging a message, simulating a run, and
//! explaining a failed run.

use crate::phrases::Locale;
use crate::session::ChatMessage;
use codepal_core::{Contract, ExecutionResult, Level, ModelRequest, Role, Step, Turn, TutorJudgement};

const LANGUAGE_GUIDE: &str = "\
The kids' drawing language has a 400x300 screen with the origin at the top left.
  screen.fill(color)                      paint the whole screen
  screen.circle(x, y, radius, color)      draw a filled circle
  screen.rect(x, y, width, height, color) draw a filled rectangle
  screen.text(x, y, words, color?)        write text
  screen.clear()                          wipe the screen
  repeat n { ... }                        run the block n times, `i` counts from 0
Variables are assigned with `name = value`.";

/// Ask the model whether the child's latest message achieves the step.
pub fn judgement(level: &Level, step: &Step, history: &[ChatMessage], locale: Locale) -> ModelRequest {
    let system = format!(
        "You are Pixel, a cheerful robot who teaches children to code.\n\
         The child is playing level \"{title}\". The current mission is:\n\
         {instruction}\n\n\
         The mission expects the visual action \"{action}\". Code that would solve it looks like:\n\
         {reference}\n\n\
         {guide}\n\n\
         Decide if the child's latest message asks for something that completes the mission.\n\
         If it does, set stepComplete to true and put the code for it in `code`, using only the \
         drawing language above, and name the visual action in `visualAction`.\n\
         If it does not, set stepComplete to false and give a short, kind `correction`.\n\
         Never show the reference code unless the child has truly earned it. \
         Keep `message` to one or two short sentences in {language}.",
        title = level.title,
        instruction = step.instruction,
        action = step.expected_action,
        reference = step.reference_code,
        guide = LANGUAGE_GUIDE,
        language = locale.language(),
    );

    ModelRequest::new(history_turns(history))
        .with_system(system)
        .with_contract(TutorJudgement::output_contract())
}

/// Ask the model to pretend to run `code` and describe the outcome.
pub fn execution(step: &Step, code: &str, locale: Locale) -> ModelRequest {
    let system = format!(
        "You are the runtime of a kids' drawing language. You never really execute code: \
         you predict exactly what running it would do.\n\n\
         {guide}\n\n\
         Report what the program prints in `consoleOutput` (in {language} when it is an error). \
         Set isSuccess to false if the program has a mistake that stops it.\n\
         List in `drawingCommands` every shape on the screen after the run, in drawing order, \
         as a complete picture and not as changes.\n\
         Set isObjectiveMet to true only if the result achieves this mission:\n\
         {instruction}",
        guide = LANGUAGE_GUIDE,
        language = locale.language(),
        instruction = step.instruction,
    );

    ModelRequest::new(vec![Turn::user(format!("Run this program:\n```\n{}\n```", code))])
        .with_system(system)
        .with_contract(ExecutionResult::output_contract())
}

/// Ask the model to turn console output into a gentle explanation.
pub fn explanation(step: &Step, code: &str, console: &str, locale: Locale) -> ModelRequest {
    let system = format!(
        "You are Pixel, a cheerful robot who teaches children to code. A child ran a program \
         that did not finish their mission: {instruction}\n\
         Explain in {language}, in at most three short sentences, what went wrong and one thing \
         to try next. Do not write the whole solution. Reply with plain text only.",
        instruction = step.instruction,
        language = locale.language(),
    );

    ModelRequest::new(vec![Turn::user(format!(
        "My program:\n```\n{}\n```\nThe console said:\n{}",
        code, console
    ))])
    .with_system(system)
}

/// Chat history as alternating turns.
///
/// Turns before the child's first message are dropped and consecutive
/// messages from one side are joined, so the first turn is always the
/// child's and roles alternate.
pub fn history_turns(history: &[ChatMessage]) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();

    for message in history.iter().skip_while(|m| m.role != Role::User) {
        let mut text = message.text.clone();
        if let Some(code) = &message.code {
            text.push_str(&format!("\n```\n{}\n```", code));
        }

        match turns.last_mut() {
            Some(last) if last.role == message.role => {
                last.text.push_str("\n\n");
                last.text.push_str(&text);
            }
            _ => turns.push(Turn {
                role: message.role,
                text,
            }),
        }
    }
    turns
}
