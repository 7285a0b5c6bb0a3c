use tracing::{debug, trace, warn};

use crate::frame::{self, InboundFrame, OutboundFrame, OutputKind, ProtocolMode};
use crate::history::{CommandHistory, DEFAULT_CAPACITY, Recall};
use crate::keys::Key;
use crate::render::{Color, Screen};

const DEFAULT_USERNAME: &str = "user";
const DEFAULT_HOSTNAME: &str = "web-cli";

/// Who the prompt says we are. Replaced once the server announces itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub hostname: String,
}

impl Identity {
    pub fn new(username: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            hostname: hostname.into(),
        }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new(DEFAULT_USERNAME, DEFAULT_HOSTNAME)
    }
}

/// What the caller must do after feeding the session an event.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Effects {
    /// Bytes to write to the terminal, in order.
    pub output: Vec<u8>,
    /// Frames to send to the server, in order.
    pub outbound: Vec<OutboundFrame>,
}

impl Effects {
    fn from_screen(mut screen: Screen) -> Self {
        Self {
            output: screen.take(),
            outbound: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.output.is_empty() && self.outbound.is_empty()
    }
}

/// Line editor and output router for one client.
///
/// All state is owned here and mutated only through [`Session::handle_key`],
/// [`Session::handle_frame`] and the connection lifecycle hooks.
#[derive(Debug)]
pub struct Session {
    identity: Identity,
    line: String,
    history: CommandHistory,
    running: bool,
    mode: ProtocolMode,
}

impl Session {
    pub fn new(mode: ProtocolMode) -> Self {
        Self::with_history_capacity(mode, DEFAULT_CAPACITY)
    }

    pub fn with_history_capacity(mode: ProtocolMode, capacity: usize) -> Self {
        Self {
            identity: Identity::default(),
            line: String::new(),
            history: CommandHistory::with_capacity(capacity),
            running: false,
            mode,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The not-yet-submitted command line.
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    /// Apply one keystroke. `connected` tells whether the socket is open.
    ///
    /// While a command is running only [`Key::Interrupt`] is processed.
    /// [`Key::Quit`] is left to the caller and produces no effects here.
    pub fn handle_key(&mut self, key: Key, connected: bool) -> Effects {
        if self.running && key != Key::Interrupt {
            trace!(?key, "dropping keystroke while command is running");
            return Effects::default();
        }

        let mut screen = Screen::new();
        let mut outbound = Vec::new();

        match key {
            Key::Enter => {
                if let Some(frame) = self.submit(connected, &mut screen) {
                    outbound.push(frame);
                }
            }
            Key::Backspace => {
                if self.line.pop().is_some() {
                    screen.erase_char();
                }
            }
            Key::Up => self.recall_older(&mut screen),
            Key::Down => self.recall_newer(&mut screen),
            Key::Char(c) => {
                self.line.push(c);
                let mut buf = [0u8; 4];
                screen.write(c.encode_utf8(&mut buf));
            }
            Key::Interrupt => {
                screen.write("^C");
                if self.running {
                    self.running = false;
                    if connected {
                        outbound.push(OutboundFrame::Interrupt);
                    }
                }
                self.line.clear();
                self.history.reset_cursor();
                screen.newline().prompt(&self.identity);
            }
            Key::Quit | Key::Ignored(_) => {}
        }

        Effects {
            output: screen.take(),
            outbound,
        }
    }

    fn submit(&mut self, connected: bool, screen: &mut Screen) -> Option<OutboundFrame> {
        if self.line.trim().is_empty() {
            self.line.clear();
            self.history.reset_cursor();
            screen.newline().prompt(&self.identity);
            return None;
        }
        if !connected {
            debug!("not connected; keeping line buffer");
            return None;
        }

        self.history.push(self.line.trim());
        self.running = true;
        let line = std::mem::take(&mut self.line);
        debug!(len = line.len(), "submitting command");
        Some(OutboundFrame::Command(line))
    }

    fn recall_older(&mut self, screen: &mut Screen) {
        let Some(entry) = self.history.up() else {
            return;
        };
        self.line = entry.to_string();
        self.redraw_line(screen);
    }

    fn recall_newer(&mut self, screen: &mut Screen) {
        match self.history.down() {
            Recall::Entry(entry) => self.line = entry.to_string(),
            Recall::Fresh => self.line.clear(),
            Recall::Unchanged => return,
        }
        self.redraw_line(screen);
    }

    fn redraw_line(&self, screen: &mut Screen) {
        screen.clear_line().prompt(&self.identity).write(&self.line);
    }

    /// Interpret one inbound text frame.
    pub fn handle_frame(&mut self, text: &str) -> Effects {
        let frame = match frame::parse_inbound(text, self.mode) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "ignoring control frame");
                return Effects::default();
            }
        };

        if let InboundFrame::SystemInfo(info) = frame {
            debug!(username = %info.username, hostname = %info.hostname, "server identity");
            self.identity = Identity::new(info.username, info.hostname);
            return Effects::default();
        }

        let mut screen = Screen::new();
        match self.mode {
            ProtocolMode::Envelope => self.render_envelope(frame, &mut screen),
            ProtocolMode::Plain => self.render_plain(frame, &mut screen),
        }
        Effects::from_screen(screen)
    }

    fn render_envelope(&mut self, frame: InboundFrame, screen: &mut Screen) {
        if frame.is_command_complete() {
            self.running = false;
            self.line.clear();
            self.history.reset_cursor();
            screen.newline().prompt(&self.identity);
            return;
        }

        match frame {
            InboundFrame::Output { kind, content } => {
                let color = match &kind {
                    OutputKind::Other(_) => {
                        screen.newline().write(&content);
                        return;
                    }
                    OutputKind::Stdout => Color::White,
                    OutputKind::Stderr => Color::Red,
                    OutputKind::Status => Color::Yellow,
                    OutputKind::System => Color::Cyan,
                };
                if content.trim().is_empty() {
                    return;
                }
                screen.newline();
                if kind == OutputKind::Status {
                    screen.colored(&format!("[{content}]"), color);
                } else {
                    screen.colored(&content, color);
                }
            }
            InboundFrame::Text(text) => {
                if !text.trim().is_empty() {
                    screen.write(&text);
                }
            }
            InboundFrame::SystemInfo(_) => {}
        }
    }

    fn render_plain(&mut self, frame: InboundFrame, screen: &mut Screen) {
        let text = match frame {
            InboundFrame::Text(text) => text,
            InboundFrame::Output { content, .. } => content,
            InboundFrame::SystemInfo(_) => return,
        };
        if !text.trim().is_empty() {
            screen.newline().writeln(&text);
        }
        self.running = false;
        self.line.clear();
        self.history.reset_cursor();
        screen.prompt(&self.identity);
    }

    /// The connection is up and the greeting finished: start a fresh line.
    pub fn opened(&mut self) -> Effects {
        self.line.clear();
        self.history.reset_cursor();
        let mut screen = Screen::new();
        screen.newline().prompt(&self.identity);
        Effects::from_screen(screen)
    }

    /// The connection dropped; nothing can be running any more.
    pub fn disconnected(&mut self) {
        self.running = false;
    }
}
