use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::context::DispatchContext;

pub const DEFAULT_CATEGORY: &str = "misc";

/// Notice sent to the chat when a handler fails.
pub const ERROR_NOTICE: &str = "⚠️ Something went wrong while running that command.";
/// Notice sent when a non-owner invokes an owner-only command.
pub const OWNER_ONLY_NOTICE: &str = "⛔ This command is for the bot owner only.";

/// Async message handler shared by commands and reply handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: DispatchContext) -> anyhow::Result<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(DispatchContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn call(&self, ctx: DispatchContext) -> anyhow::Result<()> {
        (self.0)(ctx).await
    }
}

/// Wrap an async closure as a [`Handler`].
///
/// ```ignore
/// let ping = handler_fn(|ctx| async move {
///     ctx.reply("pong").await?;
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(DispatchContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A registered command. Immutable once handed to the registry.
pub struct Command {
    pattern: String,
    aliases: Vec<String>,
    category: String,
    description: String,
    owner_only: bool,
    react: Option<String>,
    hidden: bool,
    handler: Arc<dyn Handler>,
}

impl Command {
    pub fn new(pattern: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            pattern: pattern.into().to_lowercase(),
            aliases: Vec::new(),
            category: DEFAULT_CATEGORY.to_string(),
            description: String::new(),
            owner_only: false,
            react: None,
            hidden: false,
            handler,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into().to_lowercase());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.owner_only = true;
        self
    }

    /// Emoji reaction sent to the triggering message before the handler runs.
    pub fn react(mut self, emoji: impl Into<String>) -> Self {
        self.react = Some(emoji.into());
        self
    }

    /// Keep the command out of the menu listing.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn category_name(&self) -> &str {
        &self.category
    }

    pub fn about(&self) -> &str {
        &self.description
    }

    pub fn is_owner_only(&self) -> bool {
        self.owner_only
    }

    pub fn reaction(&self) -> Option<&str> {
        self.react.as_deref()
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.pattern.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Command index keyed by lowercased pattern and alias.
///
/// The first registration of a key wins; later commands keep whatever keys
/// are still free.
#[derive(Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. Returns the keys that were already taken and therefore
    /// not indexed for this command.
    pub fn register(&mut self, command: Command) -> Vec<String> {
        let slot = self.commands.len();
        let mut shadowed = Vec::new();
        let mut indexed = 0usize;

        for key in command.keys() {
            if key.is_empty() {
                continue;
            }
            if let Some(&owner) = self.index.get(key) {
                if owner != slot {
                    warn!(
                        key,
                        existing = %self.commands[owner].pattern,
                        "command key already registered, keeping the first"
                    );
                    shadowed.push(key.to_string());
                }
                continue;
            }
            self.index.insert(key.to_string(), slot);
            indexed += 1;
        }

        if indexed == 0 {
            warn!(pattern = %command.pattern, "command has no free keys, not registered");
            return shadowed;
        }
        debug!(pattern = %command.pattern, aliases = command.aliases.len(), "command registered");
        self.commands.push(command);
        shadowed
    }

    /// Exact, case-insensitive lookup by pattern or alias.
    pub fn resolve(&self, token: &str) -> Option<&Command> {
        let idx = self.index.get(token.to_lowercase().as_str())?;
        self.commands.get(*idx)
    }

    /// Visible commands grouped by category, each group in registration order.
    pub fn commands(&self) -> BTreeMap<&str, Vec<&Command>> {
        let mut groups: BTreeMap<&str, Vec<&Command>> = BTreeMap::new();
        for cmd in self.commands.iter().filter(|c| !c.hidden) {
            groups.entry(cmd.category.as_str()).or_default().push(cmd);
        }
        groups
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// What happened to a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    /// Owner-only command invoked by someone else.
    Refused,
    Failed(String),
    Panicked(String),
}

/// Run `command` for `ctx`. Never propagates handler errors or panics.
pub async fn dispatch(command: &Command, ctx: DispatchContext) -> DispatchOutcome {
    let pattern = command.pattern();
    let chat = ctx.chat_id().to_string();
    let replier = ctx.replier.clone();

    if command.is_owner_only() && !ctx.is_owner {
        info!(command = pattern, sender = %ctx.sender(), "owner-only command refused");
        if let Err(e) = replier.reply(OWNER_ONLY_NOTICE).await {
            debug!(error = %e, "refusal notice not delivered");
        }
        return DispatchOutcome::Refused;
    }

    if let Some(emoji) = command.reaction() {
        if let Err(e) = replier.react(emoji).await {
            debug!(command = pattern, error = %e, "command reaction failed");
        }
    }

    debug!(command = pattern, %chat, args = ctx.args.len(), "dispatching command");
    let outcome = match AssertUnwindSafe(command.handler.call(ctx))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => return DispatchOutcome::Completed,
        Ok(Err(e)) => {
            error!(command = pattern, %chat, error = %e, "command failed");
            DispatchOutcome::Failed(e.to_string())
        }
        Err(panic) => {
            let msg = panic_message(panic.as_ref());
            error!(command = pattern, %chat, panic = %msg, "command panicked");
            DispatchOutcome::Panicked(msg)
        }
    };

    if let Err(e) = replier.reply(ERROR_NOTICE).await {
        debug!(error = %e, "error notice not delivered");
    }
    outcome
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context, FakeHandle};
    use tether_client::OutboundPayload;

    fn noop() -> Arc<dyn Handler> {
        handler_fn(|_ctx| async { Ok(()) })
    }

    #[test]
    fn resolves_by_pattern_and_alias_case_insensitively() {
        let mut reg = CommandRegistry::new();
        reg.register(Command::new("Menu", noop()).alias("help").alias("LIST"));

        assert_eq!(reg.resolve("menu").unwrap().pattern(), "menu");
        assert_eq!(reg.resolve("HELP").unwrap().pattern(), "menu");
        assert_eq!(reg.resolve("list").unwrap().pattern(), "menu");
        assert!(reg.resolve("men").is_none());
    }

    #[test]
    fn first_registration_wins() {
        let mut reg = CommandRegistry::new();
        assert!(reg
            .register(Command::new("song", noop()).alias("play"))
            .is_empty());
        let shadowed = reg.register(
            Command::new("video", noop())
                .alias("play")
                .alias("mp4"),
        );

        assert_eq!(shadowed, vec!["play".to_string()]);
        assert_eq!(reg.resolve("play").unwrap().pattern(), "song");
        assert_eq!(reg.resolve("mp4").unwrap().pattern(), "video");
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn fully_shadowed_command_is_dropped() {
        let mut reg = CommandRegistry::new();
        reg.register(Command::new("ping", noop()));
        let shadowed = reg.register(Command::new("PING", noop()));
        assert_eq!(shadowed, vec!["ping".to_string()]);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn listing_groups_by_category_and_skips_hidden() {
        let mut reg = CommandRegistry::new();
        reg.register(Command::new("song", noop()).category("download"));
        reg.register(Command::new("alive", noop()).category("main"));
        reg.register(Command::new("video", noop()).category("download"));
        reg.register(Command::new("eval", noop()).category("owner").hidden());

        let groups = reg.commands();
        let names: Vec<_> = groups.keys().copied().collect();
        assert_eq!(names, vec!["download", "main"]);
        let downloads: Vec<_> = groups["download"].iter().map(|c| c.pattern()).collect();
        assert_eq!(downloads, vec!["song", "video"]);
    }

    #[tokio::test]
    async fn reaction_is_sent_before_handler() {
        let handle = FakeHandle::new();
        let cmd = Command::new(
            "song",
            handler_fn(|ctx| async move {
                ctx.reply("done").await?;
                Ok(())
            }),
        )
        .react("🎶");

        let outcome = dispatch(&cmd, context(&handle, ".song x", true)).await;
        assert_eq!(outcome, DispatchOutcome::Completed);

        let sent = handle.sent();
        assert!(matches!(&sent[0].1, OutboundPayload::Reaction { emoji, .. } if emoji == "🎶"));
        assert!(matches!(&sent[1].1, OutboundPayload::Text { text, .. } if text == "done"));
    }

    #[tokio::test]
    async fn handler_error_becomes_notice() {
        let handle = FakeHandle::new();
        let cmd = Command::new(
            "boom",
            handler_fn(|_ctx| async { Err(anyhow::anyhow!("upstream 500")) }),
        );

        let outcome = dispatch(&cmd, context(&handle, ".boom", true)).await;
        assert_eq!(outcome, DispatchOutcome::Failed("upstream 500".into()));
        assert_eq!(handle.texts(), vec![ERROR_NOTICE.to_string()]);
    }

    #[tokio::test]
    async fn handler_panic_is_contained() {
        let handle = FakeHandle::new();
        let cmd = Command::new(
            "crash",
            handler_fn(|_ctx| async {
                let v: Vec<u8> = Vec::new();
                if v.is_empty() {
                    panic!("index out of range");
                }
                Ok(())
            }),
        );

        let outcome = dispatch(&cmd, context(&handle, ".crash", true)).await;
        assert_eq!(outcome, DispatchOutcome::Panicked("index out of range".into()));
        assert_eq!(handle.texts(), vec![ERROR_NOTICE.to_string()]);
    }

    #[tokio::test]
    async fn owner_only_refuses_strangers() {
        let handle = FakeHandle::new();
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        let cmd = Command::new(
            "restart",
            handler_fn(move |_ctx| {
                let flag = flag.clone();
                async move {
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                }
            }),
        )
        .owner_only();

        let outcome = dispatch(&cmd, context(&handle, ".restart", false)).await;
        assert_eq!(outcome, DispatchOutcome::Refused);
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(handle.texts(), vec![OWNER_ONLY_NOTICE.to_string()]);
    }
}
