//! Command and interaction registries.
//!
//! Commands are keyed by (prefix character, command name) and matched against
//! MESSAGE_CREATE content. Interactions are keyed by component custom id.
//! Registries are filled before the gateway starts and read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use distodo_shared::{Interaction, Message};

/// Handler for a prefixed text command.
///
/// `args` is the rest of the message after the command word, single-space
/// joined, or `None` when the command stands alone.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn call(&self, message: Message, args: Option<String>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(Message, Option<String>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn call(&self, message: Message, args: Option<String>) -> anyhow::Result<()> {
        (self)(message, args).await
    }
}

/// Handler for a message component or modal submission.
#[async_trait]
pub trait InteractionHandler: Send + Sync {
    async fn call(&self, interaction: Interaction) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> InteractionHandler for F
where
    F: Fn(Interaction) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn call(&self, interaction: Interaction) -> anyhow::Result<()> {
        (self)(interaction).await
    }
}

/// A command word split out of message content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    pub prefix: char,
    pub name: &'a str,
    pub args: Option<String>,
}

/// Split content on whitespace. The first character of the first token is the
/// prefix, the rest of that token is the command name.
pub fn parse_command(content: &str) -> Option<ParsedCommand<'_>> {
    let mut tokens = content.split_whitespace();
    let first = tokens.next()?;
    let prefix = first.chars().next()?;
    let name = &first[prefix.len_utf8()..];
    let rest: Vec<&str> = tokens.collect();
    let args = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };
    Some(ParsedCommand { prefix, name, args })
}

#[derive(Default, Clone)]
pub struct CommandRegistry {
    handlers: HashMap<char, HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `<prefix><name>`. A later registration for the
    /// same pair replaces the earlier one.
    pub fn register<H>(&mut self, prefix: char, name: impl Into<String>, handler: H)
    where
        H: CommandHandler + 'static,
    {
        self.handlers
            .entry(prefix)
            .or_default()
            .insert(name.into(), Arc::new(handler));
    }

    pub fn lookup(&self, prefix: char, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(&prefix)?.get(name).cloned()
    }

    /// Match a message against the registered commands.
    pub fn route(&self, message: Message) -> Option<RoutedCallback> {
        let parsed = parse_command(&message.content)?;
        let handler = self.lookup(parsed.prefix, parsed.name)?;
        let name = format!("{}{}", parsed.prefix, parsed.name);
        let args = parsed.args;
        Some(RoutedCallback::Command {
            name,
            handler,
            message,
            args,
        })
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Default, Clone)]
pub struct InteractionRegistry {
    handlers: HashMap<String, Arc<dyn InteractionHandler>>,
}

impl InteractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, custom_id: impl Into<String>, handler: H)
    where
        H: InteractionHandler + 'static,
    {
        self.handlers.insert(custom_id.into(), Arc::new(handler));
    }

    pub fn lookup(&self, custom_id: &str) -> Option<Arc<dyn InteractionHandler>> {
        self.handlers.get(custom_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Both registries, shared read-only with the protocol handler.
#[derive(Default, Clone)]
pub struct Registry {
    pub commands: CommandRegistry,
    pub interactions: InteractionRegistry,
}

/// A handler bound to the context it will be called with, waiting on the
/// response executor.
pub enum RoutedCallback {
    Command {
        name: String,
        handler: Arc<dyn CommandHandler>,
        message: Message,
        args: Option<String>,
    },
    Interaction {
        custom_id: String,
        handler: Arc<dyn InteractionHandler>,
        interaction: Interaction,
    },
}

impl RoutedCallback {
    /// Short name for logs: the command word or the custom id.
    pub fn label(&self) -> &str {
        match self {
            RoutedCallback::Command { name, .. } => name,
            RoutedCallback::Interaction { custom_id, .. } => custom_id,
        }
    }

    pub async fn invoke(self) -> anyhow::Result<()> {
        match self {
            RoutedCallback::Command {
                handler,
                message,
                args,
                ..
            } => handler.call(message, args).await,
            RoutedCallback::Interaction {
                handler,
                interaction,
                ..
            } => handler.call(interaction).await,
        }
    }
}

impl fmt::Debug for RoutedCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutedCallback::Command { name, args, .. } => f
                .debug_struct("Command")
                .field("name", name)
                .field("args", args)
                .finish_non_exhaustive(),
            RoutedCallback::Interaction { custom_id, .. } => f
                .debug_struct("Interaction")
                .field("custom_id", custom_id)
                .finish_non_exhaustive(),
        }
    }
}
