//! Per-call orchestration for voicebridge.
//!
//! The call engine owns everything that happens between "INVITE
//! answered" and "dialog released": the audio adapter and RTP session,
//! the realtime AI transport, and the tool gateway that projects the
//! configured tool catalog to the assistant and executes PIN-gated
//! invocations against the home-automation controller.
//!
//! Ownership is one-way: the SIP user agent emits an immutable call
//! description and the engine talks back only through `hangup` and
//! `release_dialog`.

pub mod config;
pub mod error;
pub mod ha;
pub mod session;
pub mod tools;

pub use config::{CallerProfile, CallerRegistry, EngineConfig, ParamSpec, ToolCatalog, ToolSpec};
pub use error::{Error, Result};
pub use ha::HaClient;
pub use session::{CallSession, SessionState};
pub use tools::ToolGateway;
