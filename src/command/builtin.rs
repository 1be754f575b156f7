//! Built-in commands: `help` and `prefix`.
//!
//! Both are also reachable without a prefix (see [`crate::command`]).

use super::{CommandHandler, HandlerError, Invocation, PrefixTable};
use crate::admission::{CommandSpec, PrivilegeLevel};
use async_trait::async_trait;
use std::fmt::Write as _;

/// Lists the registered commands, or describes one.
///
/// `help` and `help commands` list everything; `help <name>` shows one entry.
#[derive(Debug, Clone)]
pub struct HelpCommand {
    spec: CommandSpec,
}

impl Default for HelpCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl HelpCommand {
    pub fn new() -> Self {
        Self {
            spec: CommandSpec::new("help")
                .alias("menu")
                .cool_down_secs(3)
                .description("List the available commands"),
        }
    }

    fn listing(invocation: &Invocation) -> String {
        let mut out = String::from("Available commands:");
        for spec in invocation.catalog.iter() {
            if spec.required_level > invocation.level {
                continue;
            }
            let _ = write!(out, "\n{}{}", invocation.prefix, spec.name);
            if !spec.description.is_empty() {
                let _ = write!(out, " - {}", spec.description);
            }
        }
        out
    }

    fn describe(invocation: &Invocation, name: &str) -> String {
        let found = invocation
            .catalog
            .iter()
            .find(|s| s.name == name || s.aliases.iter().any(|a| a.eq_ignore_ascii_case(name)));
        let Some(spec) = found else {
            return format!("The command \"{}\" does not exist", name);
        };
        let mut out = format!("{}{}", invocation.prefix, spec.name);
        if !spec.description.is_empty() {
            let _ = write!(out, "\n{}", spec.description);
        }
        if !spec.aliases.is_empty() {
            let _ = write!(out, "\nAliases: {}", spec.aliases.join(", "));
        }
        let _ = write!(out, "\nPermission: {}", spec.required_level);
        if !spec.cool_down.is_zero() {
            let _ = write!(out, "\nCooldown: {}s", spec.cool_down.as_secs_f64());
        }
        out
    }
}

#[async_trait]
impl CommandHandler for HelpCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn run(&self, invocation: &Invocation) -> Result<(), HandlerError> {
        let text = match invocation.args.first().map(|a| a.to_lowercase()) {
            None => Self::listing(invocation),
            Some(arg) if arg == "commands" => Self::listing(invocation),
            Some(name) => Self::describe(invocation, &name),
        };
        invocation.reply(text).await?;
        Ok(())
    }
}

/// Shows the prefix in effect; group moderators may change or reset it for their conversation.
#[derive(Debug, Clone)]
pub struct PrefixCommand {
    spec: CommandSpec,
    table: PrefixTable,
    global: String,
}

impl PrefixCommand {
    /// `table` should be the dispatcher's own table (see [`super::CommandDispatcher::prefixes`]).
    pub fn new(table: PrefixTable, global: impl Into<String>) -> Self {
        Self {
            spec: CommandSpec::new("prefix")
                .cool_down_secs(5)
                .description("Show or change the command prefix for this chat"),
            table,
            global: global.into(),
        }
    }
}

#[async_trait]
impl CommandHandler for PrefixCommand {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    async fn run(&self, invocation: &Invocation) -> Result<(), HandlerError> {
        let chat = &invocation.message.chat_id;
        let Some(arg) = invocation.args.first() else {
            let text = format!(
                "Global prefix: {}\nChat prefix: {}",
                self.global, invocation.prefix
            );
            invocation.reply(text).await?;
            return Ok(());
        };

        if invocation.level < PrivilegeLevel::GroupModerator {
            let text = format!(
                "You need {} permission to use this command.",
                PrivilegeLevel::GroupModerator
            );
            invocation.reply(text).await?;
            return Ok(());
        }

        let text = if arg.eq_ignore_ascii_case("reset") {
            self.table.clear(chat);
            format!("Prefix reset to {}", self.global)
        } else {
            self.table.set(chat.clone(), arg.clone());
            format!("Prefix changed to {}", arg)
        };
        tracing::info!(chat = %chat, by = %invocation.message.sender_id, "chat prefix updated");
        invocation.reply(text).await?;
        Ok(())
    }
}
