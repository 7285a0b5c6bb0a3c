//! Typewriter greeting played when a connection opens.
//!
//! The animation is a plain value advanced one character per timer tick, so
//! dropping it (e.g. when a new connection attempt starts) cancels it cleanly.

use std::time::Duration;

use term_session::{Color, Screen};
use tokio::time::{Interval, MissedTickBehavior};

pub const GREETING: &str = "✓ Connected to WebSocket server\n";

/// Emits `text` one character at a time.
#[derive(Debug)]
pub struct Typewriter {
    chars: Vec<char>,
    color: Color,
    next: usize,
}

impl Typewriter {
    pub fn new(text: &str, color: Color) -> Self {
        Self {
            chars: text.chars().collect(),
            color,
            next: 0,
        }
    }

    /// Colored bytes for the next character, or `None` once finished.
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        let c = *self.chars.get(self.next)?;
        self.next += 1;
        let mut buf = [0u8; 4];
        let mut screen = Screen::new();
        screen.colored(c.encode_utf8(&mut buf), self.color);
        Some(screen.take())
    }

    /// Everything not yet emitted, in one write.
    pub fn finish(&mut self) -> Vec<u8> {
        let rest: String = self.chars[self.next..].iter().collect();
        self.next = self.chars.len();
        let mut screen = Screen::new();
        if !rest.is_empty() {
            screen.colored(&rest, self.color);
        }
        screen.take()
    }

    pub fn is_done(&self) -> bool {
        self.next >= self.chars.len()
    }
}

/// A typewriter driven by a tokio interval.
pub struct Greeting {
    writer: Typewriter,
    ticker: Interval,
}

impl Greeting {
    pub fn new(delay: Duration) -> Self {
        let mut ticker = tokio::time::interval(delay.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            writer: Typewriter::new(GREETING, Color::Green),
            ticker,
        }
    }

    /// Wait for the next tick and return the next character's bytes.
    /// `None` means the greeting is complete.
    pub async fn tick(&mut self) -> Option<Vec<u8>> {
        if self.writer.is_done() {
            return None;
        }
        self.ticker.tick().await;
        self.writer.next_chunk()
    }
}

/// The full greeting rendered at once, for when the animation is disabled.
pub fn greeting_bytes() -> Vec<u8> {
    Typewriter::new(GREETING, Color::Green).finish()
}
