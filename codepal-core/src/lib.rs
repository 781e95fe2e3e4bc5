//! # codepal-core
//!
//! The building blocks of the codepal tutor.
//!
//! ## Core Concepts
//! - **Provider**: one send/receive contract over two hosted-model wire formats
//! - **Contracts**: validated decoding of the structured replies the model gives
//! - **Canvas**: drawing commands, visual history and the frame interpreter
//! - **Assist**: keyword and identifier completion over the code buffer
//! - **Curriculum**: worlds, levels, steps and unlock progress

pub mod assist;
pub mod canvas;
pub mod contract;
pub mod curriculum;
pub mod error;
pub mod provider;

pub use assist::{accept, suggest, MAX_SUGGESTIONS};
pub use canvas::{render, DrawingCommand, Frame, Mark, UpdatePulse, VisualState};
pub use contract::{decode, Contract, ExecutionResult, TutorJudgement};
pub use curriculum::{Curriculum, Level, Progress, Step, World};
pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    CompatProvider, ModelAdapter, ModelProvider, ModelRequest, NativeProvider, OutputContract,
    ProviderConfig, Role, Turn, WireFormat,
};
