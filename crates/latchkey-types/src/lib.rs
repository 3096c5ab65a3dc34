//! Shared data types for the latchkey session engine.
//!
//! This crate is pure data: steps, session snapshots, tokens, login
//! options, error codes, and the discriminated outcomes of remote
//! operations. It performs no I/O and holds no state.

pub mod error;
pub mod options;
pub mod outcome;
pub mod session;
pub mod step;
pub mod token;

pub use error::{ApiError, ErrorCode};
pub use options::LoginOptions;
pub use outcome::{MagicCodeAck, SignInOutcome};
pub use session::{
    DurableSnapshot, Field, FieldErrors, MagicCodeState, Phase, ResetPasswordState, Session,
};
pub use step::Step;
pub use token::{TokenPair, mask_token};
