// src/test_utils/mock_service.rs

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::platforms::{Service, ServiceLifecycle, ServiceState};
use crate::{Error, Message};

/// An outbound action the mock accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceAction {
    SendMessage { channel: String, text: String },
    DeleteMessage { channel: String, message_id: String },
    BanUser { channel: String, user_id: String, duration: Duration },
    UnbanUser { channel: String, user_id: String },
    SetPlaying(String),
    Join(String),
    Typing(String),
    PrivateMessage { user_id: String, text: String },
}

type ErrorFactory = Box<dyn Fn() -> Error + Send + Sync>;

/// Scriptable service: replays a fixed message list on `open`, accepts more
/// through [`push`](MockService::push), and records every action.
pub struct MockService {
    name: String,
    user_name: String,
    self_id: String,
    prefix: String,
    multiline: bool,
    private_channels: HashSet<String>,

    lifecycle: Arc<ServiceLifecycle>,
    script: Mutex<Vec<Message>>,
    close_after_script: bool,
    delay: Option<Duration>,
    open_delay: Option<Duration>,
    open_failure: Option<ErrorFactory>,
    failures: HashMap<String, ErrorFactory>,

    sender: Arc<Mutex<Option<Sender<Message>>>>,
    actions: Mutex<Vec<ServiceAction>>,
    opens: AtomicUsize,
}

impl MockService {
    pub fn new(name: &str, user_name: &str) -> Self {
        Self {
            name: name.to_string(),
            user_name: user_name.to_string(),
            self_id: format!("{}-self", name),
            prefix: "!".to_string(),
            multiline: true,
            private_channels: HashSet::new(),
            lifecycle: Arc::new(ServiceLifecycle::new()),
            script: Mutex::new(Vec::new()),
            close_after_script: false,
            delay: None,
            open_delay: None,
            open_failure: None,
            failures: HashMap::new(),
            sender: Arc::new(Mutex::new(None)),
            actions: Mutex::new(Vec::new()),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn with_multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }

    /// Messages in this channel are treated as direct messages.
    pub fn with_private_channel(mut self, channel: &str) -> Self {
        self.private_channels.insert(channel.to_string());
        self
    }

    /// Messages delivered in order as soon as the service is opened.
    pub fn with_script(mut self, messages: Vec<Message>) -> Self {
        self.script = Mutex::new(messages);
        self
    }

    /// Close the stream once the script has been delivered.
    pub fn closing_after_script(mut self) -> Self {
        self.close_after_script = true;
        self
    }

    /// Sleep between scripted messages.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes the handshake in `open` take this long.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn failing_open(mut self, reason: &str) -> Self {
        let reason = reason.to_string();
        self.open_failure = Some(Box::new(move || Error::Connection(reason.clone())));
        self
    }

    /// Makes `action` (e.g. `"ban_user"`) fail with the error `make` builds.
    pub fn failing<F>(mut self, action: &str, make: F) -> Self
    where
        F: Fn() -> Error + Send + Sync + 'static,
    {
        self.failures.insert(action.to_string(), Box::new(make));
        self
    }

    /// The user id this service considers its own.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// A message as if the bot itself had sent it.
    pub fn echo(&self, channel: &str, text: &str) -> Message {
        Message::new(channel, &self.self_id, &self.user_name, text)
    }

    pub fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn actions(&self) -> Vec<ServiceAction> {
        self.actions.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Texts of every `SendMessage`/`PrivateMessage` action, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                ServiceAction::SendMessage { text, .. } => Some(text),
                ServiceAction::PrivateMessage { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Delivers one more message on the open stream.
    pub async fn push(&self, message: Message) -> Result<(), Error> {
        let tx = self
            .sender
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| Error::Connection(format!("{} is not open", self.name)))?;
        tx.send(message)
            .await
            .map_err(|_| Error::Connection(format!("{} stream receiver dropped", self.name)))
    }

    /// Simulates the remote side closing the connection.
    pub fn close(&self) {
        self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
        self.lifecycle.close();
    }

    fn act(&self, name: &str, action: ServiceAction) -> Result<(), Error> {
        if let Some(make) = self.failures.get(name) {
            return Err(make());
        }
        self.actions.lock().unwrap_or_else(|p| p.into_inner()).push(action);
        Ok(())
    }
}

#[async_trait]
impl Service for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    fn user_name(&self) -> &str {
        &self.user_name
    }

    async fn open(&self) -> Result<Receiver<Message>, Error> {
        self.lifecycle.claim()?;
        if let Some(d) = self.open_delay {
            tokio::time::sleep(d).await;
        }
        if let Some(make) = &self.open_failure {
            self.lifecycle.release();
            return Err(make());
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel::<Message>(256);
        *self.sender.lock().unwrap_or_else(|p| p.into_inner()) = Some(tx.clone());

        let script = std::mem::take(&mut *self.script.lock().unwrap_or_else(|p| p.into_inner()));
        let delay = self.delay;
        let close_after = self.close_after_script;
        let slot = Arc::clone(&self.sender);
        let lifecycle = Arc::clone(&self.lifecycle);
        tokio::spawn(async move {
            for msg in script {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                if tx.send(msg).await.is_err() {
                    return;
                }
            }
            if close_after {
                slot.lock().unwrap_or_else(|p| p.into_inner()).take();
                lifecycle.close();
            }
        });

        Ok(rx)
    }

    fn is_me(&self, message: &Message) -> bool {
        message.user_id == self.self_id
    }

    async fn send_message(&self, channel: &str, message: &str) -> Result<(), Error> {
        self.act("send_message", ServiceAction::SendMessage {
            channel: channel.to_string(),
            text: message.to_string(),
        })
    }

    async fn delete_message(&self, channel: &str, message_id: &str) -> Result<(), Error> {
        self.act("delete_message", ServiceAction::DeleteMessage {
            channel: channel.to_string(),
            message_id: message_id.to_string(),
        })
    }

    async fn ban_user(&self, channel: &str, user_id: &str, duration: Duration) -> Result<(), Error> {
        self.act("ban_user", ServiceAction::BanUser {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            duration,
        })
    }

    async fn unban_user(&self, channel: &str, user_id: &str) -> Result<(), Error> {
        self.act("unban_user", ServiceAction::UnbanUser {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
        })
    }

    async fn set_playing(&self, game: &str) -> Result<(), Error> {
        self.act("set_playing", ServiceAction::SetPlaying(game.to_string()))
    }

    async fn join(&self, join: &str) -> Result<(), Error> {
        self.act("join", ServiceAction::Join(join.to_string()))
    }

    async fn typing(&self, channel: &str) -> Result<(), Error> {
        self.act("typing", ServiceAction::Typing(channel.to_string()))
    }

    async fn private_message(&self, user_id: &str, message: &str) -> Result<(), Error> {
        self.act("private_message", ServiceAction::PrivateMessage {
            user_id: user_id.to_string(),
            text: message.to_string(),
        })
    }

    fn is_private(&self, message: &Message) -> bool {
        self.private_channels.contains(&message.channel)
    }

    fn supports_multiline(&self) -> bool {
        self.multiline
    }

    fn command_prefix(&self) -> &str {
        &self.prefix
    }
}
