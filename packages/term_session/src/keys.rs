//! Raw keyboard input decoding.
//!
//! In raw mode a single read from stdin may carry several keystrokes
//! (pastes, fast typing, escape sequences), so input is decoded as a byte
//! stream rather than one key per read.

const ETX: u8 = 0x03; // Ctrl-C
const BS: u8 = 0x08;
const LF: u8 = 0x0A;
const CR: u8 = 0x0D;
const ESC: u8 = 0x1B;
const GS: u8 = 0x1D; // Ctrl-]
const DEL: u8 = 0x7F;

/// A single decoded keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Backspace,
    Up,
    Down,
    /// Ctrl-C: interrupt the running remote command.
    Interrupt,
    /// Ctrl-]: leave the client.
    Quit,
    /// Printable ASCII (0x20..=0x7E).
    Char(char),
    /// Anything without a binding; kept so callers can trace it.
    Ignored(u8),
}

/// Longest unfinished escape sequence carried over to the next read.
const MAX_PENDING: usize = 64;

/// Decode a chunk of raw terminal input into keystrokes, in order.
///
/// `ESC [ A` / `ESC O A` map to [`Key::Up`], `ESC [ B` / `ESC O B` to
/// [`Key::Down`]. Other CSI/SS3 sequences are consumed whole and dropped.
/// Bytes outside printable ASCII with no binding become [`Key::Ignored`].
/// The chunk is treated as complete; use [`KeyDecoder`] for a live stream.
pub fn decode(bytes: &[u8]) -> Vec<Key> {
    let mut decoder = KeyDecoder::new();
    let mut keys = decoder.feed(bytes);
    keys.extend(decoder.flush());
    keys
}

/// Streaming decoder for stdin reads.
///
/// An escape sequence split across two reads (`ESC` | `[A`) is held back
/// until the rest arrives.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    pending: Vec<u8>,
    newline_is_enter: bool,
    last_was_cr: bool,
}

impl KeyDecoder {
    /// Decoder for a terminal in raw mode: only CR submits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder for cooked (line-buffered or piped) input, where lines end
    /// with LF. A CR LF pair counts as one Enter.
    pub fn line_mode() -> Self {
        Self {
            newline_is_enter: true,
            ..Self::default()
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Key> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut keys = Vec::with_capacity(buf.len());
        let mut i = 0;
        while i < buf.len() {
            let b = buf[i];
            i += 1;
            let after_cr = std::mem::replace(&mut self.last_was_cr, b == CR);
            let key = match b {
                CR => Key::Enter,
                LF if self.newline_is_enter => {
                    if after_cr {
                        continue;
                    }
                    Key::Enter
                }
                BS | DEL => Key::Backspace,
                ETX => Key::Interrupt,
                GS => Key::Quit,
                0x20..=0x7E => Key::Char(b as char),
                ESC => match decode_escape(&buf[i..]) {
                    Escape::Done(key, consumed) => {
                        i += consumed;
                        match key {
                            Some(k) => k,
                            None => continue,
                        }
                    }
                    Escape::Incomplete => {
                        let rest = &buf[i - 1..];
                        if rest.len() <= MAX_PENDING {
                            self.pending = rest.to_vec();
                        } else {
                            tracing::debug!(len = rest.len(), "dropping overlong escape sequence");
                        }
                        break;
                    }
                },
                other => Key::Ignored(other),
            };
            keys.push(key);
        }
        keys
    }

    /// Give up on a held escape prefix. A lone ESC becomes
    /// [`Key::Ignored`]; a partial CSI/SS3 sequence is dropped.
    pub fn flush(&mut self) -> Vec<Key> {
        match std::mem::take(&mut self.pending).as_slice() {
            [ESC] => vec![Key::Ignored(ESC)],
            _ => Vec::new(),
        }
    }
}

enum Escape {
    /// The key (if bound) and how many bytes after the ESC belong to it.
    Done(Option<Key>, usize),
    /// The sequence may continue in the next read.
    Incomplete,
}

fn decode_escape(rest: &[u8]) -> Escape {
    match rest.first() {
        None => Escape::Incomplete,
        Some(b'[') => {
            // CSI: parameters/intermediates until a final byte in 0x40..=0x7E.
            let Some(offset) = rest[1..].iter().position(|b| (0x40..=0x7E).contains(b)) else {
                return Escape::Incomplete;
            };
            let params = &rest[1..1 + offset];
            let key = match (params.is_empty(), rest[1 + offset]) {
                (true, b'A') => Some(Key::Up),
                (true, b'B') => Some(Key::Down),
                _ => None,
            };
            Escape::Done(key, offset + 2)
        }
        Some(b'O') => match rest.get(1) {
            None => Escape::Incomplete,
            Some(b'A') => Escape::Done(Some(Key::Up), 2),
            Some(b'B') => Escape::Done(Some(Key::Down), 2),
            Some(_) => Escape::Done(None, 2),
        },
        // ESC + unrelated byte, which is decoded on its own.
        Some(_) => Escape::Done(Some(Key::Ignored(ESC)), 0),
    }
}
