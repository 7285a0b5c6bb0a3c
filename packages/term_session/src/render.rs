use crate::session::Identity;

/// Foreground colors used by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Color {
    /// Prompt, success and the connection greeting (256-color index 120).
    Green,
    Red,
    Yellow,
    Cyan,
    /// Terminal default; no SGR is emitted.
    White,
}

impl Color {
    /// SGR parameters for this color, or `None` for the default.
    pub fn sgr(self) -> Option<&'static str> {
        match self {
            Color::Green => Some("38;5;120"),
            Color::Red => Some("31"),
            Color::Yellow => Some("33"),
            Color::Cyan => Some("36"),
            Color::White => None,
        }
    }
}

/// Append-only ANSI output buffer.
///
/// Text passes through [`convert_eol`] because the host terminal runs in raw
/// mode, where a bare `\n` moves down without returning the carriage.
#[derive(Debug, Default)]
pub struct Screen {
    out: Vec<u8>,
}

impl Screen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, text: &str) -> &mut Self {
        convert_eol(text, &mut self.out);
        self
    }

    pub fn writeln(&mut self, text: &str) -> &mut Self {
        self.write(text);
        self.out.extend_from_slice(b"\r\n");
        self
    }

    pub fn newline(&mut self) -> &mut Self {
        self.out.extend_from_slice(b"\r\n");
        self
    }

    pub fn colored(&mut self, text: &str, color: Color) -> &mut Self {
        match color.sgr() {
            Some(sgr) => {
                self.out.extend_from_slice(format!("\x1b[{sgr}m").as_bytes());
                self.write(text);
                self.out.extend_from_slice(b"\x1b[0m");
            }
            None => {
                self.write(text);
            }
        }
        self
    }

    pub fn prompt(&mut self, identity: &Identity) -> &mut Self {
        self.colored(
            &format!("{}@{}:", identity.username, identity.hostname),
            Color::Green,
        );
        self.out.extend_from_slice(b"$ ");
        self
    }

    /// Move back one column, blank it, and move back again.
    pub fn erase_char(&mut self) -> &mut Self {
        self.out.extend_from_slice(b"\x08 \x08");
        self
    }

    /// Erase the whole current line and return to column 0.
    pub fn clear_line(&mut self) -> &mut Self {
        self.out.extend_from_slice(b"\x1b[2K\r");
        self
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.out
    }

    /// Take the accumulated bytes, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }
}

/// Append `text` to `out`, turning every lone `\n` into `\r\n`.
pub fn convert_eol(text: &str, out: &mut Vec<u8>) {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' && (i == 0 || bytes[i - 1] != b'\r') {
            out.push(b'\r');
        }
        out.push(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen_text(bytes: &[u8]) -> String {
        let mut parser = vt100::Parser::new(24, 80, 0);
        parser.process(bytes);
        let rows: Vec<String> = parser
            .screen()
            .rows(0, 80)
            .map(|row| row.trim_end().to_string())
            .collect();
        rows.join("\n").trim_end().to_string()
    }

    #[test]
    fn eol_conversion() {
        let mut out = Vec::new();
        convert_eol("a\nb\r\nc\n", &mut out);
        assert_eq!(out, b"a\r\nb\r\nc\r\n");
    }

    #[test]
    fn leading_newline_converted() {
        let mut out = Vec::new();
        convert_eol("\nx", &mut out);
        assert_eq!(out, b"\r\nx");
    }

    #[test]
    fn colored_wraps_in_sgr() {
        let mut screen = Screen::new();
        screen.colored("oops", Color::Red);
        assert_eq!(screen.as_bytes(), b"\x1b[31moops\x1b[0m");
    }

    #[test]
    fn white_emits_no_sgr() {
        let mut screen = Screen::new();
        screen.colored("plain", Color::White);
        assert_eq!(screen.as_bytes(), b"plain");
    }

    #[test]
    fn prompt_renders_identity() {
        let mut screen = Screen::new();
        screen.prompt(&Identity::new("bob", "box"));
        assert_eq!(screen.as_bytes(), b"\x1b[38;5;120mbob@box:\x1b[0m$ ");
        assert_eq!(screen_text(screen.as_bytes()), "bob@box:$");
    }

    #[test]
    fn prompt_is_green() {
        let mut screen = Screen::new();
        screen.prompt(&Identity::new("bob", "box"));
        let mut parser = vt100::Parser::new(24, 80, 0);
        parser.process(screen.as_bytes());
        assert_eq!(parser.screen().cell(0, 0).unwrap().fgcolor(), vt100::Color::Idx(120));
        assert_eq!(parser.screen().cell(0, 8).unwrap().fgcolor(), vt100::Color::Default);
    }

    #[test]
    fn erase_and_clear_line() {
        let mut screen = Screen::new();
        screen.write("abc").erase_char();
        assert_eq!(screen_text(screen.as_bytes()), "ab");

        screen.clear_line().write("z");
        assert_eq!(screen_text(screen.as_bytes()), "z");
    }

    #[test]
    fn take_drains() {
        let mut screen = Screen::new();
        screen.writeln("x");
        assert_eq!(screen.take(), b"x\r\n");
        assert!(screen.is_empty());
    }
}
