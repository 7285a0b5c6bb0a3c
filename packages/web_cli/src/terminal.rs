//! Host terminal plumbing: raw mode for stdin and a reader thread that
//! feeds keystrokes into the event loop.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use raw::RawMode;

#[cfg(unix)]
mod raw {
    use nix::sys::termios::{self, SetArg, Termios};
    use tracing::warn;

    /// Stdin stays in raw mode for as long as this value lives.
    pub struct RawMode {
        saved: Termios,
    }

    impl RawMode {
        /// Returns `None` when stdin is not a terminal (piped input) or the
        /// mode switch is refused.
        pub fn enable() -> Option<Self> {
            let saved = termios::tcgetattr(std::io::stdin()).ok()?;
            let mut raw = saved.clone();
            termios::cfmakeraw(&mut raw);
            if let Err(err) = termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &raw) {
                warn!(%err, "could not switch stdin to raw mode");
                return None;
            }
            Some(Self { saved })
        }
    }

    impl Drop for RawMode {
        fn drop(&mut self) {
            if let Err(err) = termios::tcsetattr(std::io::stdin(), SetArg::TCSANOW, &self.saved) {
                warn!(%err, "could not restore terminal settings");
            }
        }
    }
}

#[cfg(not(unix))]
mod raw {
    /// Raw mode needs termios; other platforms read cooked lines.
    pub struct RawMode;

    impl RawMode {
        pub fn enable() -> Option<Self> {
            None
        }
    }
}

/// Wait up to 100ms for stdin to become readable, so the reader thread can
/// notice a shutdown request between keystrokes.
#[cfg(unix)]
fn stdin_ready() -> bool {
    use nix::libc;
    let mut pfd = libc::pollfd {
        fd: libc::STDIN_FILENO,
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a single valid pollfd that outlives the call.
    unsafe { libc::poll(&mut pfd, 1, 100) > 0 }
}

#[cfg(not(unix))]
fn stdin_ready() -> bool {
    true
}

/// Handle to the stdin reader thread; stopping it (or dropping the handle)
/// makes the thread exit at its next poll.
pub struct StdinReader {
    stop: Arc<AtomicBool>,
}

impl StdinReader {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

impl Drop for StdinReader {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Forward stdin chunks, exactly as each read returns them, into a channel.
/// The channel closes on EOF or a read error.
pub fn spawn_stdin_reader() -> (StdinReader, mpsc::Receiver<Vec<u8>>) {
    let (tx, rx) = mpsc::channel::<Vec<u8>>(64);
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        while !stop_flag.load(Ordering::Relaxed) {
            if !stdin_ready() {
                continue;
            }
            let n = match std::io::stdin().lock().read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    warn!(%err, "stdin read failed");
                    break;
                }
            };
            if tx.blocking_send(buf[..n].to_vec()).is_err() {
                break;
            }
        }
        debug!("stdin reader exiting");
    });

    (StdinReader { stop }, rx)
}
