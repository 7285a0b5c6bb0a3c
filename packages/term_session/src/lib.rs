//! Term Session - client-side state for a line-oriented remote shell
//!
//! This crate holds everything a remote shell client needs between the
//! keyboard and the socket: the editable line buffer, bounded command
//! history with recall, the running-command gate, and interpretation of
//! inbound frames into ANSI output. It performs no I/O; every operation
//! returns [`Effects`] describing bytes to draw and frames to send.
//!
//! # Example
//!
//! ```
//! use term_session::{OutboundFrame, ProtocolMode, Session};
//!
//! let mut session = Session::new(ProtocolMode::Envelope);
//! for key in term_session::decode(b"ls -la\r") {
//!     let effects = session.handle_key(key, true);
//!     if let Some(OutboundFrame::Command(line)) = effects.outbound.first() {
//!         assert_eq!(line, "ls -la");
//!     }
//! }
//! assert!(session.is_running());
//!
//! session.handle_frame(r#"{"type":"system","content":"__COMMAND_COMPLETE__"}"#);
//! assert!(!session.is_running());
//! ```

mod error;
pub mod frame;
pub mod history;
pub mod keys;
pub mod render;
mod session;

pub use error::FrameError;
pub use frame::{InboundFrame, OutboundFrame, OutputKind, ProtocolMode, SystemInfo};
pub use history::{CommandHistory, Recall};
pub use keys::{Key, KeyDecoder, decode};
pub use render::{Color, Screen};
pub use session::{Effects, Identity, Session};
