//! # codepal-tutor
//!
//! The tutoring loop:
//! 1. The player picks an unlocked level from the menu
//! 2. Each chat message is judged by the model against the current step
//! 3. A complete step adds code to the editor
//! 4. Running the code asks the model to simulate it and draw the result
//! 5. Meeting the objective advances to the next step, or finishes the level
//!
//! [`Session`] is the pure state machine; [`Tutor`] drives it against a
//! [`codepal_core::ModelProvider`].

pub mod phrases;
pub mod prompt;
pub mod session;
pub mod tutor;

pub use phrases::Locale;
pub use session::{CallKind, CallTicket, ChatMessage, Followup, GuideFocus, ModelCall, Phase, Session, Snapshot};
pub use tutor::{Command, LevelEntry, Tutor, TutorConfig, View, NEXT_STEP_DELAY};
