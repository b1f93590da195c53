//! Subprocess dispatch to external LLM CLIs behind the narrow
//! `LlmDispatcher` trait boundary. The engine never sees a `Command`
//! directly, and never parses stdout before handing it to
//! `taskwright_schema::extract_json`.

pub mod dispatcher;
pub mod error;
pub mod subprocess;

#[cfg(any(test, feature = "test-utils"))]
pub mod stub;

pub use dispatcher::{DispatchRequest, DispatchResult, LlmDispatcher};
pub use error::LlmError;
pub use subprocess::{LlmBinaryConfig, SubprocessDispatcher};

#[cfg(any(test, feature = "test-utils"))]
pub use stub::{ScriptedResponse, StubLlmDispatcher};
