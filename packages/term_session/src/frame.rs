//! Wire frames exchanged with the command server.
//!
//! Inbound text frames come in three shapes:
//! - `__SYSTEM_INFO__:{"username":..,"hostname":..}` once per connection
//! - a typed envelope `{"type": "stdout"|"stderr"|"status"|"system", "content": ..}`
//! - anything else, rendered as plain text
//!
//! Outbound frames are the raw command line, or a single `0x03` byte for
//! Ctrl-C.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

pub const SYSTEM_INFO_PREFIX: &str = "__SYSTEM_INFO__:";
pub const COMMAND_COMPLETE: &str = "__COMMAND_COMPLETE__";
pub const INTERRUPT_BYTE: u8 = 0x03;

const FALLBACK_USERNAME: &str = "user";
const FALLBACK_HOSTNAME: &str = "web-cli";

/// How the server frames ordinary output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    /// Typed JSON envelopes with an explicit completion marker.
    #[default]
    Envelope,
    /// Every frame is plain text and implicitly completes the command.
    Plain,
}

/// Identity announced by the server, used to personalise the prompt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub hostname: String,
}

impl SystemInfo {
    /// Replace empty fields with the server-agnostic fallbacks.
    fn with_fallbacks(mut self) -> Self {
        if self.username.is_empty() {
            self.username = FALLBACK_USERNAME.to_string();
        }
        if self.hostname.is_empty() {
            self.hostname = FALLBACK_HOSTNAME.to_string();
        }
        self
    }
}

/// The `type` field of an output envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputKind {
    Stdout,
    Stderr,
    Status,
    System,
    Other(String),
}

impl From<String> for OutputKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "stdout" => Self::Stdout,
            "stderr" => Self::Stderr,
            "status" => Self::Status,
            "system" => Self::System,
            _ => Self::Other(kind),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: String,
}

/// A classified inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    SystemInfo(SystemInfo),
    Output { kind: OutputKind, content: String },
    Text(String),
}

impl InboundFrame {
    /// True for the `system` envelope that marks the end of a command.
    pub fn is_command_complete(&self) -> bool {
        matches!(
            self,
            InboundFrame::Output { kind: OutputKind::System, content } if content == COMMAND_COMPLETE
        )
    }
}

/// Classify an inbound text frame.
///
/// The system-info prefix is checked first in every mode. In
/// [`ProtocolMode::Envelope`] the remainder is tried as a typed envelope and
/// falls back to [`InboundFrame::Text`] when it is not one.
pub fn parse_inbound(text: &str, mode: ProtocolMode) -> Result<InboundFrame, FrameError> {
    if let Some(payload) = text.strip_prefix(SYSTEM_INFO_PREFIX) {
        let info: SystemInfo =
            serde_json::from_str(payload).map_err(FrameError::MalformedSystemInfo)?;
        return Ok(InboundFrame::SystemInfo(info.with_fallbacks()));
    }

    if mode == ProtocolMode::Envelope {
        if let Ok(envelope) = serde_json::from_str::<Envelope>(text) {
            return Ok(InboundFrame::Output {
                kind: envelope.kind.into(),
                content: envelope.content,
            });
        }
    }

    Ok(InboundFrame::Text(text.to_string()))
}

/// A frame the client sends to the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundFrame {
    /// The submitted line, exactly as typed.
    Command(String),
    /// Ctrl-C forwarded to the running command.
    Interrupt,
}

impl OutboundFrame {
    /// Text payload for the socket.
    pub fn into_text(self) -> String {
        match self {
            OutboundFrame::Command(line) => line,
            OutboundFrame::Interrupt => char::from(INTERRUPT_BYTE).to_string(),
        }
    }
}
