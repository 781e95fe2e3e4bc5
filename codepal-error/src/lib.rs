//! # codepal-error
//!
//! Unified error handling for codepal, following OpenDAL's error handling practices.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., ServiceFailed, DecodeFailed)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use codepal_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::EmptyResponse, "no candidates in response")
//!         .with_operation("provider::native::send")
//!         .with_context("model", "gemini-2.5-flash"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All functions return `Result<T, codepal_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Don't abuse `From<OtherError>` to prevent raw error leakage

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using codepal Error
pub type Result<T> = std::result::Result<T, Error>;
