//! Error types for codepal-core
//!
//! Re-exports codepal-error so callers need only one import path.

pub use codepal_error::{Error, ErrorKind, ErrorStatus, Result};
