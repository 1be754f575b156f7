//! Inbound command dispatch.
//!
//! [`CommandDispatcher::handle`] turns one inbound message into at most one handler run:
//!
//! 1. bare `prefix`, `help` and `commands` are routed without a prefix and skip the cooldown;
//! 2. messages without the conversation's prefix go to every handler's `on_chat` hook;
//! 3. otherwise the first word (lower-cased) picks a command or alias, the [`AdmissionGate`]
//!    checks privilege and cooldown, and the handler runs.
//!
//! Every reply, including denials, goes out through the [`Outbox`] and therefore through the
//! scheduler.

pub mod builtin;

pub use builtin::{HelpCommand, PrefixCommand};

use crate::admission::{
    AdmissionGate, CommandSpec, ConversationContext, Denial, OwnerListResolver, PrivilegeLevel,
    Verdict,
};
use crate::clock::{Clock, SystemClock};
use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::scheduler::Ticket;
use crate::store::UserStore;
use crate::transport::{Outbox, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

const THROTTLED_REPLY: &str = "Too many requests. Your command will be processed shortly...";
const FAILED_REPLY: &str = "An error occurred while processing your command.";

/// One inbound message, with the membership snapshot already fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Conversation the message arrived in; replies go here.
    pub chat_id: String,
    pub sender_id: String,
    /// Display name, used to refresh the stored user name.
    pub sender_name: Option<String>,
    pub body: String,
    pub context: ConversationContext,
}

impl InboundMessage {
    pub fn direct(sender_id: impl Into<String>, body: impl Into<String>) -> Self {
        let sender_id = sender_id.into();
        Self {
            chat_id: sender_id.clone(),
            sender_id,
            sender_name: None,
            body: body.into(),
            context: ConversationContext::Direct,
        }
    }

    pub fn in_group(
        chat_id: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
        context: ConversationContext,
    ) -> Self {
        Self {
            chat_id: chat_id.into(),
            sender_id: sender_id.into(),
            sender_name: None,
            body: body.into(),
            context,
        }
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }
}

/// Everything a handler gets for one accepted invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Canonical command name (aliases resolved).
    pub command: String,
    pub args: Vec<String>,
    pub message: InboundMessage,
    /// Prefix in effect for this conversation.
    pub prefix: String,
    /// Caller's resolved level.
    pub level: PrivilegeLevel,
    pub outbox: Outbox,
    /// Registered commands, sorted by name.
    pub catalog: Arc<Vec<CommandSpec>>,
}

impl Invocation {
    /// Queue a reply to the conversation the command came from.
    pub fn reply(&self, text: impl Into<String>) -> Ticket<(), TransportError> {
        self.outbox.send(self.message.chat_id.clone(), text)
    }
}

/// Failure of a handler run.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("scheduler is shutting down")]
    ShuttingDown,
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }

    /// The remote side throttled one of the handler's sends.
    pub fn is_remote_throttle(&self) -> bool {
        matches!(self, HandlerError::Transport(e) if e.is_remote_throttle())
    }
}

impl From<DispatchError<TransportError>> for HandlerError {
    fn from(err: DispatchError<TransportError>) -> Self {
        match err {
            DispatchError::ActionFailed(e) => HandlerError::Transport(e),
            DispatchError::ShuttingDown => HandlerError::ShuttingDown,
        }
    }
}

/// Business logic behind one command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn spec(&self) -> &CommandSpec;

    async fn run(&self, invocation: &Invocation) -> Result<(), HandlerError>;

    /// Called for every message that is not a command.
    async fn on_chat(&self, _message: &InboundMessage, _outbox: &Outbox) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// A name or alias is claimed by two commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("command name or alias {0:?} is already registered")]
pub struct DuplicateCommand(pub String);

/// Per-conversation prefix overrides. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct PrefixTable {
    overrides: Arc<RwLock<HashMap<String, String>>>,
}

impl PrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(overrides: HashMap<String, String>) -> Self {
        Self { overrides: Arc::new(RwLock::new(overrides)) }
    }

    pub fn get(&self, chat_id: &str) -> Option<String> {
        self.overrides.read().unwrap_or_else(|e| e.into_inner()).get(chat_id).cloned()
    }

    pub fn set(&self, chat_id: impl Into<String>, prefix: impl Into<String>) {
        self.overrides
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(chat_id.into(), prefix.into());
    }

    /// Drop the override; returns whether one existed.
    pub fn clear(&self, chat_id: &str) -> bool {
        self.overrides.write().unwrap_or_else(|e| e.into_inner()).remove(chat_id).is_some()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.overrides.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// What [`CommandDispatcher::handle`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Handler ran and succeeded.
    Executed { command: String },
    /// Gate refused; the denial text was sent as a reply.
    Denied { command: String, denial: Denial },
    /// Prefixed message naming no registered command.
    UnknownCommand { name: String },
    /// Handler returned an error; `throttled` tells which reply was sent.
    Failed { command: String, throttled: bool },
    /// Not a command; `on_chat` hooks ran.
    Chat,
    /// Prefix with nothing after it.
    Ignored,
}

/// Routes inbound messages to command handlers.
pub struct CommandDispatcher {
    config: DispatcherConfig,
    gate: AdmissionGate,
    outbox: Outbox,
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    aliases: HashMap<String, String>,
    catalog: Arc<Vec<CommandSpec>>,
    prefixes: PrefixTable,
    store: Option<Arc<dyn UserStore>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("prefix", &self.config.prefix)
            .field("commands", &self.catalog.iter().map(|s| &s.name).collect::<Vec<_>>())
            .finish()
    }
}

impl CommandDispatcher {
    /// Dispatcher whose owners come from `config.owners`.
    pub fn new(config: DispatcherConfig, outbox: Outbox) -> Self {
        let gate = AdmissionGate::new(OwnerListResolver::new(config.owners.iter().cloned()));
        Self {
            config,
            gate,
            outbox,
            handlers: HashMap::new(),
            aliases: HashMap::new(),
            catalog: Arc::new(Vec::new()),
            prefixes: PrefixTable::new(),
            store: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the admission gate (custom resolver or clock).
    pub fn with_gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = gate;
        self
    }

    /// Track command usage in `store`.
    pub fn with_store(mut self, store: Arc<dyn UserStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_prefixes(mut self, prefixes: PrefixTable) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// Clock for `last_active` stamps.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Add a handler under its spec name and aliases.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> Result<(), DuplicateCommand> {
        let spec = handler.spec().clone();
        let name = spec.name.to_lowercase();
        let aliases: Vec<String> = spec.aliases.iter().map(|a| a.to_lowercase()).collect();
        for key in std::iter::once(&name).chain(aliases.iter()) {
            if self.handlers.contains_key(key) || self.aliases.contains_key(key) {
                return Err(DuplicateCommand(key.clone()));
            }
        }
        for alias in aliases {
            self.aliases.insert(alias, name.clone());
        }
        self.handlers.insert(name.clone(), handler);

        let mut catalog: Vec<CommandSpec> = self.catalog.as_ref().clone();
        catalog.push(spec);
        catalog.sort_by(|a, b| a.name.cmp(&b.name));
        self.catalog = Arc::new(catalog);
        tracing::debug!(command = %name, "command registered");
        Ok(())
    }

    pub fn prefixes(&self) -> &PrefixTable {
        &self.prefixes
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn catalog(&self) -> Arc<Vec<CommandSpec>> {
        self.catalog.clone()
    }

    /// Prefix in effect for `chat_id`.
    pub fn effective_prefix(&self, chat_id: &str) -> String {
        self.prefixes.get(chat_id).unwrap_or_else(|| self.config.prefix.clone())
    }

    fn lookup(&self, name: &str) -> Option<&Arc<dyn CommandHandler>> {
        let canonical = self.aliases.get(name).map(String::as_str).unwrap_or(name);
        self.handlers.get(canonical)
    }

    pub async fn handle(&self, message: InboundMessage) -> Outcome {
        let prefix = self.effective_prefix(&message.chat_id);

        let bare = message.body.trim().to_lowercase();
        if let Some((name, args)) = special_command(&bare) {
            if let Some(handler) = self.lookup(name).cloned() {
                return self.run_special(handler, &bare, args, message, prefix).await;
            }
        }

        let Some(rest) = message.body.strip_prefix(prefix.as_str()) else {
            self.chat(&message).await;
            return Outcome::Chat;
        };

        let mut words = rest.split_whitespace();
        let Some(first) = words.next() else {
            return Outcome::Ignored;
        };
        let name = first.to_lowercase();
        let args: Vec<String> = words.map(str::to_string).collect();

        let Some(handler) = self.lookup(&name).cloned() else {
            tracing::debug!(command = %name, sender = %message.sender_id, "unknown command");
            if self.config.notify_unknown_command {
                let text = format!(
                    "The command \"{}\" does not exist, type {}help to see all available commands",
                    name, prefix
                );
                self.reply(&message.chat_id, text).await;
            }
            return Outcome::UnknownCommand { name };
        };

        let spec = handler.spec();
        let level = self.gate.resolve(&message.sender_id, &message.context);
        if let Verdict::Denied(denial) = self.gate.authorize(&message.sender_id, spec, level) {
            self.reply(&message.chat_id, denial.to_string()).await;
            return Outcome::Denied { command: spec.name.clone(), denial };
        }

        let command = spec.name.clone();
        let invocation = self.invocation(command.clone(), args, message, prefix, level);
        match handler.run(&invocation).await {
            Ok(()) => {
                self.track(&invocation.message).await;
                tracing::info!(command = %command, sender = %invocation.message.sender_id, "command executed");
                Outcome::Executed { command }
            }
            Err(err) => {
                let throttled = err.is_remote_throttle();
                if throttled {
                    tracing::warn!(command = %command, "remote throttled while executing command");
                    self.reply(&invocation.message.chat_id, THROTTLED_REPLY).await;
                } else {
                    tracing::error!(command = %command, error = %err, "command failed");
                    self.reply(&invocation.message.chat_id, FAILED_REPLY).await;
                }
                Outcome::Failed { command, throttled }
            }
        }
    }

    async fn run_special(
        &self,
        handler: Arc<dyn CommandHandler>,
        bare: &str,
        args: Vec<String>,
        message: InboundMessage,
        prefix: String,
    ) -> Outcome {
        let spec = handler.spec();
        let level = self.gate.resolve(&message.sender_id, &message.context);
        if let Verdict::Denied(denial) = self.gate.authorize_privilege(spec, level) {
            self.reply(&message.chat_id, denial.to_string()).await;
            return Outcome::Denied { command: spec.name.clone(), denial };
        }

        let command = spec.name.clone();
        let invocation = self.invocation(command.clone(), args, message, prefix, level);
        match handler.run(&invocation).await {
            Ok(()) => {
                tracing::info!(command = %bare, sender = %invocation.message.sender_id, "special command executed");
                Outcome::Executed { command }
            }
            Err(err) => {
                tracing::error!(command = %bare, error = %err, "special command failed");
                let text = format!("An error occurred while processing the {} command.", bare);
                self.reply(&invocation.message.chat_id, text).await;
                Outcome::Failed { command, throttled: err.is_remote_throttle() }
            }
        }
    }

    fn invocation(
        &self,
        command: String,
        args: Vec<String>,
        message: InboundMessage,
        prefix: String,
        level: PrivilegeLevel,
    ) -> Invocation {
        Invocation {
            command,
            args,
            message,
            prefix,
            level,
            outbox: self.outbox.clone(),
            catalog: self.catalog.clone(),
        }
    }

    async fn chat(&self, message: &InboundMessage) {
        for (name, handler) in &self.handlers {
            if let Err(err) = handler.on_chat(message, &self.outbox).await {
                tracing::error!(command = %name, error = %err, "on_chat hook failed");
            }
        }
    }

    async fn track(&self, message: &InboundMessage) {
        let Some(store) = &self.store else {
            return;
        };
        let now = self.clock.now_millis();
        if let Err(err) =
            store.track_command(&message.sender_id, message.sender_name.as_deref(), now).await
        {
            tracing::warn!(sender = %message.sender_id, error = %err, "failed to track command usage");
        }
    }

    async fn reply(&self, chat_id: &str, text: impl Into<String>) {
        if let Err(err) = self.outbox.send(chat_id, text).await {
            tracing::warn!(chat = %chat_id, error = %err, "reply not delivered");
        }
    }
}

/// Bare words answered without a prefix, and the command and args they map to.
fn special_command(bare: &str) -> Option<(&'static str, Vec<String>)> {
    match bare {
        "prefix" => Some(("prefix", Vec::new())),
        "help" => Some(("help", Vec::new())),
        "commands" => Some(("help", vec!["commands".to_string()])),
        _ => None,
    }
}
