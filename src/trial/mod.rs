//! Running and supervising one sampling trial.
//!
//! A trial is one rebuilt runner process measuring one TTL curve. The
//! split mirrors the data flow:
//!
//! - [`protocol`]: the grammar of the runner's stderr statistics lines
//! - [`process`]: rebuild, spawn, signal, and reap the runner group
//! - [`supervisor`]: the adaptive per-line decision loop

pub mod process;
pub mod protocol;
pub mod supervisor;

pub use process::{DecoderStream, MakeBackend, TrialBackend, TrialStream};
pub use protocol::{parse_progress, ProgressReport};
pub use supervisor::{run_session, SessionOutcome, SessionReport};
