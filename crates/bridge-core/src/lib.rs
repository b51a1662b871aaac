//! Command routing, chat detection and response capture for the chat bridge.
//!
//! The crate owns no I/O of its own: the editor, the chat transport and the
//! shell are reached through the [`workspace::Workspace`],
//! [`transport::Transport`] and [`terminal::CommandExecutor`] capability
//! traits so the binary (and tests) can plug in concrete implementations.

pub mod capture;
pub mod config;
pub mod context;
pub mod detector;
pub mod format;
pub mod history;
pub mod relay;
pub mod router;
pub mod sessions;
pub mod terminal;
pub mod transport;
pub mod workspace;

pub use capture::{CaptureStatus, ResponseCapture};
pub use config::{BridgeConfig, RoutingPolicy, load_config};
pub use history::{HistoryEntry, HistoryKind, MessageHistory};
pub use relay::{ReplyRelay, ResponseSink};
pub use router::{Bridge, Command, CommandRouter, Inbound, parse_command};
pub use sessions::{ChatSession, SessionRegistry};
