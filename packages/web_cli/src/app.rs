use std::io::Write;

use anyhow::{Context, Result};
use term_session::{Color, Effects, Key, KeyDecoder, Screen, Session};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::connection::{CloseInfo, Connection, ConnectionEvent, ReconnectTimer};
use crate::greeting::{self, Greeting};

/// Whether the event loop keeps going after handling an event.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// The single event loop: keyboard, socket, greeting animation, reconnect.
///
/// All client state lives here and is only touched from [`App::run`].
pub struct App<W: Write> {
    config: ClientConfig,
    session: Session,
    keys: KeyDecoder,
    connection: Connection,
    greeting: Option<Greeting>,
    reconnect: ReconnectTimer,
    out: W,
}

impl<W: Write> App<W> {
    pub fn new(config: ClientConfig, out: W) -> Self {
        let session = Session::with_history_capacity(config.protocol, config.history_capacity);
        let connection = Connection::new(config.url.clone());
        let reconnect = ReconnectTimer::new(config.reconnect_delay);
        Self {
            config,
            session,
            keys: KeyDecoder::new(),
            connection,
            greeting: None,
            reconnect,
            out,
        }
    }

    /// Replace the raw-mode key decoder, e.g. with [`KeyDecoder::line_mode`]
    /// when stdin is not a terminal.
    pub fn with_key_decoder(mut self, keys: KeyDecoder) -> Self {
        self.keys = keys;
        self
    }

    /// Run until the user quits (Ctrl-]) or `input` closes.
    pub async fn run(mut self, mut input: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        let mut banner = Screen::new();
        banner
            .writeln("Web-based CLI Terminal")
            .writeln(&format!("Connecting to {}...", self.config.url))
            .newline();
        self.write(&banner.take())?;
        self.connect();

        loop {
            tokio::select! {
                chunk = input.recv() => {
                    let Some(bytes) = chunk else {
                        debug!("input closed");
                        break;
                    };
                    if self.on_input(&bytes).await? == Flow::Quit {
                        info!("quit requested");
                        break;
                    }
                }

                event = self.connection.next_event() => {
                    self.on_connection_event(event)?;
                }

                chunk = next_greeting_chunk(&mut self.greeting), if self.greeting.is_some() => {
                    match chunk {
                        Some(bytes) => self.write(&bytes)?,
                        None => {
                            self.greeting = None;
                            let effects = self.session.opened();
                            self.write(&effects.output)?;
                        }
                    }
                }

                () = self.reconnect.wait(), if self.reconnect.is_armed() => {
                    let mut screen = Screen::new();
                    screen.writeln("Attempting to reconnect...");
                    self.write(&screen.take())?;
                    self.connect();
                }
            }
        }

        self.connection.disconnect().await;
        let mut screen = Screen::new();
        screen.newline();
        self.write(&screen.take())?;
        Ok(())
    }

    fn connect(&mut self) {
        // A new attempt supersedes any greeting still typing and any pending retry.
        self.greeting = None;
        self.reconnect.cancel();
        if !self.connection.connect() {
            debug!(state = ?self.connection.state(), "already connected or connecting");
        }
    }

    async fn on_input(&mut self, bytes: &[u8]) -> Result<Flow> {
        for key in self.keys.feed(bytes) {
            if key == Key::Quit {
                return Ok(Flow::Quit);
            }
            let effects = self.session.handle_key(key, self.connection.is_open());
            self.apply(effects).await?;
        }
        Ok(Flow::Continue)
    }

    async fn apply(&mut self, effects: Effects) -> Result<()> {
        self.write(&effects.output)?;
        for frame in effects.outbound {
            self.connection.send(frame.into_text()).await;
        }
        Ok(())
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) -> Result<()> {
        match event {
            ConnectionEvent::Opened => {
                info!(url = %self.connection.url(), "connected");
                match self.config.greeting_delay {
                    Some(delay) => self.greeting = Some(Greeting::new(delay)),
                    None => {
                        let mut bytes = greeting::greeting_bytes();
                        bytes.extend(self.session.opened().output);
                        self.write(&bytes)?;
                    }
                }
            }
            ConnectionEvent::Frame(text) => {
                let effects = self.session.handle_frame(&text);
                self.write(&effects.output)?;
            }
            ConnectionEvent::Error(message) => {
                error!(error = %message, "websocket error");
                let mut screen = Screen::new();
                screen
                    .newline()
                    .colored("✗ WebSocket connection error", Color::Red)
                    .newline();
                self.write(&screen.take())?;
            }
            ConnectionEvent::Closed(info) => self.on_closed(&info)?,
            ConnectionEvent::Failed(err) => {
                error!(error = %err, "connection attempt failed");
                let mut screen = Screen::new();
                screen
                    .colored("✗ Failed to connect to WebSocket server", Color::Red)
                    .newline()
                    .writeln(&err.to_string());
                self.write(&screen.take())?;
            }
        }
        Ok(())
    }

    fn on_closed(&mut self, info: &CloseInfo) -> Result<()> {
        warn!(code = info.code, reason = %info.reason, "disconnected");
        self.greeting = None;
        self.session.disconnected();

        let mut screen = Screen::new();
        screen
            .newline()
            .colored("✗ Disconnected from server", Color::Red)
            .newline()
            .writeln(&info.describe());
        self.write(&screen.take())?;

        self.reconnect.schedule();
        debug!(delay = ?self.config.reconnect_delay, "reconnect scheduled");
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.out
            .write_all(bytes)
            .and_then(|()| self.out.flush())
            .context("Failed to write to terminal")
    }
}

async fn next_greeting_chunk(greeting: &mut Option<Greeting>) -> Option<Vec<u8>> {
    match greeting {
        Some(greeting) => greeting.tick().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;
    use term_session::ProtocolMode;

    /// Terminal stand-in shared between the app task and the test.
    #[derive(Clone, Default)]
    struct SharedOutput(Arc<Mutex<Vec<u8>>>);

    impl SharedOutput {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        async fn wait_for(&self, needle: &str) {
            self.wait_for_count(needle, 1).await;
        }

        async fn wait_for_count(&self, needle: &str, count: usize) {
            let result = tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    if self.text().matches(needle).count() >= count {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;
            assert!(
                result.is_ok(),
                "timed out waiting for {count} x {needle:?}; output so far: {:?}",
                self.text()
            );
        }
    }

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn test_config(url: String) -> ClientConfig {
        ClientConfig {
            url,
            reconnect_delay: Duration::from_millis(50),
            greeting_delay: None,
            history_capacity: 50,
            protocol: ProtocolMode::Envelope,
            log_file: None,
        }
    }

    type Running = (SharedOutput, mpsc::Sender<Vec<u8>>, tokio::task::JoinHandle<Result<()>>);

    fn start(config: ClientConfig) -> Running {
        start_with_decoder(config, KeyDecoder::new())
    }

    fn start_with_decoder(config: ClientConfig, keys: KeyDecoder) -> Running {
        let out = SharedOutput::default();
        let (tx, rx) = mpsc::channel(16);
        let app = App::new(config, out.clone()).with_key_decoder(keys);
        let handle = tokio::spawn(app.run(rx));
        (out, tx, handle)
    }

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    fn envelope(kind: &str, content: &str) -> Message {
        let json = format!(r#"{{"type":"{kind}","content":"{content}"}}"#);
        Message::Text(json.into())
    }

    #[tokio::test]
    async fn command_round_trip() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let info = r#"__SYSTEM_INFO__:{"username":"bob","hostname":"box"}"#;
            ws.send(Message::Text(info.to_string().into())).await.unwrap();

            let command = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert_eq!(command.as_str(), "echo hello");
            ws.send(envelope("stdout", "hello")).await.unwrap();
            ws.send(envelope("system", "__COMMAND_COMPLETE__")).await.unwrap();

            // Hold the socket until the client goes away.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (out, tx, app) = start(test_config(url));
        out.wait_for("$ ").await;
        tx.send(b"echo hello\r".to_vec()).await.unwrap();
        out.wait_for("bob@box:").await;

        let mut parser = vt100::Parser::new(24, 80, 0);
        parser.process(out.text().as_bytes());
        let rows: Vec<String> = parser
            .screen()
            .rows(0, 80)
            .map(|r| r.trim_end().to_string())
            .collect();
        assert!(rows.iter().any(|r| r.ends_with("$ echo hello")), "{rows:?}");
        assert!(rows.iter().any(|r| r == "hello"), "{rows:?}");
        assert!(rows.iter().any(|r| r == "bob@box:$"), "{rows:?}");

        tx.send(vec![0x1D]).await.unwrap();
        app.await.unwrap().unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn abnormal_close_reconnects_once_per_close() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move {
            // First connection: drop the TCP stream without a close frame.
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            drop(ws);

            // Second connection arrives after the reconnect delay.
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let (out, tx, app) = start(test_config(url));
        out.wait_for("Close code: 1006, Reason: Unknown").await;
        out.wait_for("Attempting to reconnect...").await;
        out.wait_for("Attempting to reconnect...\r\n\x1b[38;5;120m✓ Connected").await;
        assert_eq!(out.text().matches("Attempting to reconnect...").count(), 1);

        drop(tx);
        app.await.unwrap().unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_server_keeps_retrying() {
        let (out, tx, app) = start(test_config("ws://127.0.0.1:1/ws".to_string()));
        out.wait_for("✗ WebSocket connection error").await;
        out.wait_for("Close code: 1006").await;
        out.wait_for("Attempting to reconnect...").await;
        out.wait_for("Attempting to reconnect...\r\n\r\n\x1b[31m✗ WebSocket connection error")
            .await;

        tx.send(vec![0x1D]).await.unwrap();
        app.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn invalid_url_is_not_retried() {
        let (out, tx, app) = start(test_config("not a url".to_string()));
        out.wait_for("✗ Failed to connect to WebSocket server").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!out.text().contains("Attempting to reconnect"));

        drop(tx);
        app.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn greeting_is_typed_before_prompt() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let config = ClientConfig {
            greeting_delay: Some(Duration::from_millis(1)),
            ..test_config(url)
        };
        let (out, tx, app) = start(config);
        out.wait_for("user@web-cli:").await;

        let text = out.text();
        let greeting_at = text.find("\x1b[38;5;120mC\x1b[0m").unwrap();
        let prompt_at = text.find("user@web-cli:").unwrap();
        assert!(greeting_at < prompt_at);

        tx.send(vec![0x1D]).await.unwrap();
        app.await.unwrap().unwrap();
        server.await.unwrap();
    }

    /// Server side of a single command exchange: expects `expected` as a
    /// command frame `times` times, completing each one.
    async fn serve_commands(listener: TcpListener, expected: &'static str, times: usize) {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        for _ in 0..times {
            let command = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert_eq!(command.as_str(), expected);
            ws.send(envelope("stdout", "done")).await.unwrap();
            ws.send(envelope("system", "__COMMAND_COMPLETE__")).await.unwrap();
        }
        while let Some(Ok(_)) = ws.next().await {}
    }

    #[tokio::test]
    async fn arrow_key_split_across_reads_recalls_history() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(serve_commands(listener, "echo hi", 2));

        let (out, tx, app) = start(test_config(url));
        out.wait_for("$ ").await;
        tx.send(b"echo hi\r".to_vec()).await.unwrap();
        out.wait_for_count("user@web-cli:", 2).await;

        tx.send(b"\x1b".to_vec()).await.unwrap();
        tx.send(b"[A".to_vec()).await.unwrap();
        tx.send(b"\r".to_vec()).await.unwrap();
        // Recall redraws the prompt once, completion once more.
        out.wait_for_count("user@web-cli:", 4).await;
        assert!(!out.text().contains("[A"));

        tx.send(vec![0x1D]).await.unwrap();
        app.await.unwrap().unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn line_mode_input_submits_on_newline() {
        let (listener, url) = bind().await;
        let server = tokio::spawn(serve_commands(listener, "echo hi", 1));

        let (out, tx, app) = start_with_decoder(test_config(url), KeyDecoder::line_mode());
        out.wait_for("$ ").await;
        tx.send(b"echo hi\n".to_vec()).await.unwrap();
        out.wait_for_count("user@web-cli:", 2).await;

        drop(tx);
        app.await.unwrap().unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn close_mid_greeting_cancels_it_and_reconnect_restarts_it() {
        const GREEN: &str = "\x1b[38;5;120m";
        let (listener, url) = bind().await;
        let server = tokio::spawn(async move {
            // First connection closes while the greeting is still typing.
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            tokio::time::sleep(Duration::from_millis(250)).await;
            drop(ws);

            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let config = ClientConfig {
            greeting_delay: Some(Duration::from_millis(200)),
            reconnect_delay: Duration::from_millis(400),
            ..test_config(url)
        };
        let (out, tx, app) = start(config);
        let restart = format!("Attempting to reconnect...\r\n{GREEN}✓\x1b[0m");
        out.wait_for(&restart).await;

        let text = out.text();
        let closed_at = text.find("✗ Disconnected from server").unwrap();
        let retry_at = text.find("Attempting to reconnect...").unwrap();
        // Only the first few characters were typed before the close.
        assert!(!text[..closed_at].contains(&format!("{GREEN}W\x1b[0m")));
        // Nothing more was typed while waiting to reconnect.
        assert!(!text[closed_at..retry_at].contains(GREEN));
        assert!(!text.contains("user@web-cli:"));

        tx.send(vec![0x1D]).await.unwrap();
        app.await.unwrap().unwrap();
        server.await.unwrap();
    }
}
