//! src/platforms/console.rs
//!
//! A local service that reads chat lines from stdin and prints the bot's
//! output to stdout. Useful for trying plugins without a remote backend.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, Receiver};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::platforms::{Service, ServiceLifecycle, ServiceState};
use crate::{Error, Message};

pub const CONSOLE_CHANNEL: &str = "console";
const CONSOLE_USER_ID: &str = "console-user";

type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct ConsoleService {
    bot_name: String,
    bot_id: String,
    prefix: String,
    lifecycle: Arc<ServiceLifecycle>,

    /// Taken by `open`; `None` afterwards.
    reader: Mutex<Option<BoxedReader>>,
    writer: Arc<Mutex<BoxedWriter>>,

    read_loop_handle: Mutex<Option<JoinHandle<()>>>,
    next_message_id: Arc<AtomicU64>,
}

impl ConsoleService {
    /// Console bound to the process's stdin/stdout.
    pub fn new(bot_name: &str, prefix: &str) -> Self {
        Self::with_io(
            bot_name,
            prefix,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }

    pub fn with_io<R, W>(bot_name: &str, prefix: &str, reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            bot_name: bot_name.to_string(),
            bot_id: format!("console-{}", bot_name.to_lowercase()),
            prefix: prefix.to_string(),
            lifecycle: Arc::new(ServiceLifecycle::new()),
            reader: Mutex::new(Some(Box::new(reader))),
            writer: Arc::new(Mutex::new(Box::new(writer))),
            read_loop_handle: Mutex::new(None),
            next_message_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }

    async fn write_line(&self, line: &str) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

impl Drop for ConsoleService {
    fn drop(&mut self) {
        if let Some(handle) = self.read_loop_handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Service for ConsoleService {
    fn name(&self) -> &str {
        "console"
    }

    fn user_name(&self) -> &str {
        &self.bot_name
    }

    async fn open(&self) -> Result<Receiver<Message>, Error> {
        self.lifecycle.claim()?;

        let reader = match self.reader.lock().await.take() {
            Some(r) => r,
            None => {
                self.lifecycle.release();
                return Err(Error::Connection("console input already consumed".into()));
            }
        };

        let (tx, rx) = mpsc::channel::<Message>(64);
        let lifecycle = Arc::clone(&self.lifecycle);
        let ids = Arc::clone(&self.next_message_id);

        let handle = tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let text = line.trim();
                        if text.is_empty() {
                            continue;
                        }
                        let id = ids.fetch_add(1, Ordering::Relaxed);
                        let msg = Message::new(CONSOLE_CHANNEL, CONSOLE_USER_ID, "console", text)
                            .with_message_id(id.to_string())
                            .as_moderator();
                        if tx.send(msg).await.is_err() {
                            debug!("(ConsoleService) receiver dropped, stopping read loop");
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!("(ConsoleService) read error: {:?}", e);
                        break;
                    }
                }
            }
            lifecycle.close();
            info!("(ConsoleService) read loop ended.");
        });
        *self.read_loop_handle.lock().await = Some(handle);

        info!("(ConsoleService) opened as '{}'", self.bot_name);
        Ok(rx)
    }

    fn is_me(&self, message: &Message) -> bool {
        message.user_id == self.bot_id
    }

    async fn send_message(&self, channel: &str, message: &str) -> Result<(), Error> {
        self.write_line(&format!("[{}] {}: {}", channel, self.bot_name, message)).await
    }

    async fn delete_message(&self, _channel: &str, _message_id: &str) -> Result<(), Error> {
        Err(Error::Unsupported("console cannot delete messages".into()))
    }

    async fn ban_user(&self, _channel: &str, _user_id: &str, _duration: Duration) -> Result<(), Error> {
        Err(Error::Unsupported("console cannot ban users".into()))
    }

    async fn unban_user(&self, _channel: &str, _user_id: &str) -> Result<(), Error> {
        Err(Error::Unsupported("console cannot unban users".into()))
    }

    async fn set_playing(&self, game: &str) -> Result<(), Error> {
        self.write_line(&format!("* {} is now playing {}", self.bot_name, game)).await
    }

    async fn join(&self, join: &str) -> Result<(), Error> {
        debug!("(ConsoleService) join '{}' ignored, console has a single channel", join);
        Ok(())
    }

    async fn typing(&self, _channel: &str) -> Result<(), Error> {
        Ok(())
    }

    async fn private_message(&self, user_id: &str, message: &str) -> Result<(), Error> {
        self.write_line(&format!("[pm:{}] {}: {}", user_id, self.bot_name, message)).await
    }

    fn is_private(&self, _message: &Message) -> bool {
        false
    }

    fn supports_multiline(&self) -> bool {
        true
    }

    fn command_prefix(&self) -> &str {
        &self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn console_with(input: &'static str) -> (ConsoleService, tokio::io::DuplexStream) {
        let (out_write, out_read) = tokio::io::duplex(4096);
        let svc = ConsoleService::with_io("Relay", "!", BufReader::new(input.as_bytes()), out_write);
        (svc, out_read)
    }

    #[tokio::test]
    async fn lines_become_messages_and_stream_closes_at_eof() {
        let (svc, _out) = console_with("hello\n\n!ping\n");
        let mut rx = svc.open().await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.message, "hello");
        assert_eq!(first.channel, CONSOLE_CHANNEL);
        assert_eq!(first.message_id, "1");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.message, "!ping");
        assert_eq!(second.message_id, "2");

        assert!(rx.recv().await.is_none());
        assert_eq!(svc.state(), ServiceState::Closed);
        assert!(!svc.is_me(&first));
    }

    #[tokio::test]
    async fn second_open_is_already_joined() {
        let (svc, _out) = console_with("");
        let _rx = svc.open().await.unwrap();
        assert!(matches!(svc.open().await, Err(Error::AlreadyJoined)));
    }

    #[tokio::test]
    async fn send_message_writes_to_output() {
        let (svc, mut out) = console_with("");
        svc.send_message("console", "pong").await.unwrap();
        drop(svc);

        let mut written = String::new();
        out.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "[console] Relay: pong\n");
    }

    #[tokio::test]
    async fn moderation_actions_are_unsupported() {
        let (svc, _out) = console_with("");
        let res = svc.ban_user("console", "u1", Duration::from_secs(60)).await;
        assert!(matches!(res, Err(Error::Unsupported(_))));
    }
}
