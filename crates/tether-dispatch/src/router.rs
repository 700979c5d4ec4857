use std::sync::Arc;
use std::time::Duration;

use tether_client::{MessageContent, RawMessage, SharedHandle};
use tether_core::types::OperatingMode;
use tether_core::TetherConfig;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, Instrument};

use crate::command::{dispatch, CommandRegistry};
use crate::context::{DispatchContext, Replier, SharedState};
use crate::conversation::ConversationStore;
use crate::message::InboundMessage;
use crate::reply::ReplyHandlerChain;
use crate::status::StatusResponder;

/// Command token and arguments split out of a prefixed body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased first token after the prefix.
    pub token: String,
    pub args: Vec<String>,
    /// Everything after the token, trimmed.
    pub query: String,
}

/// `None` unless `body` starts with `prefix`.
///
/// `"!ping  a b"` with prefix `"!"` gives token `ping`, args `[a, b]`,
/// query `"a b"`. A bare prefix yields an empty token.
pub fn parse_command(prefix: &str, body: &str) -> Option<ParsedCommand> {
    let rest = body.strip_prefix(prefix)?;
    let rest = rest.trim_start();
    let (token, tail) = match rest.find(char::is_whitespace) {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    Some(ParsedCommand {
        token: token.to_lowercase(),
        args: tail.split_whitespace().map(str::to_string).collect(),
        query: tail.trim().to_string(),
    })
}

/// Where a normalized message goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Status broadcast: auto-seen / auto-react only.
    Status,
    Ordinary {
        command: Option<ParsedCommand>,
        /// Command gating outcome; `false` means the command is ignored.
        command_allowed: bool,
        is_owner: bool,
    },
}

/// Normalizes, classifies and dispatches inbound messages.
pub struct MessageRouter {
    state: Arc<SharedState>,
    replies: Arc<ReplyHandlerChain>,
    status: StatusResponder,
    handle: SharedHandle,
    mode: OperatingMode,
    owners: Vec<String>,
    send_timeout: Duration,
}

impl MessageRouter {
    pub fn new(
        config: &TetherConfig,
        registry: CommandRegistry,
        replies: ReplyHandlerChain,
        conversations: Arc<ConversationStore>,
        handle: SharedHandle,
    ) -> Self {
        let state = SharedState {
            prefix: config.bot.prefix.clone(),
            alive_message: config.bot.alive_message.clone(),
            registry,
            conversations,
            started_at: std::time::Instant::now(),
        };
        Self {
            state: Arc::new(state),
            replies: Arc::new(replies),
            status: StatusResponder::from_config(&config.status),
            handle,
            mode: config.bot.mode,
            owners: config.bot.owner_numbers(),
            send_timeout: Duration::from_secs(config.gateway.send_timeout_secs),
        }
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    pub fn is_owner(&self, msg: &InboundMessage) -> bool {
        msg.from_me || self.owners.iter().any(|o| o == msg.sender_number())
    }

    /// Pure classification of a normalized message.
    pub fn classify(&self, msg: &InboundMessage) -> Route {
        if msg.is_status() {
            return Route::Status;
        }
        let is_owner = self.is_owner(msg);
        let command = parse_command(&self.state.prefix, &msg.body).filter(|c| !c.token.is_empty());
        let command_allowed =
            command.is_some() && self.mode.allows_command(is_owner, msg.is_group);
        Route::Ordinary {
            command,
            command_allowed,
            is_owner,
        }
    }

    /// Normalize and dispatch one raw envelope on its own task.
    ///
    /// Returns `None` when the envelope carries no content, or when it is a
    /// status post and no status action is configured.
    pub fn route(self: &Arc<Self>, raw: RawMessage) -> Option<JoinHandle<()>> {
        let Some(msg) = InboundMessage::from_raw(raw) else {
            debug!("envelope without content dropped");
            return None;
        };
        let route = self.classify(&msg);
        if route == Route::Status && !self.status.is_enabled() {
            return None;
        }
        let kind = msg.raw.message.as_ref().map_or("none", MessageContent::kind);
        let span = info_span!("message", id = %msg.id, chat = %msg.chat_id, kind);
        let router = Arc::clone(self);
        Some(tokio::spawn(
            async move { router.process(msg, route).await }.instrument(span),
        ))
    }

    async fn process(&self, msg: InboundMessage, route: Route) {
        let replier = Replier::new(
            self.handle.clone(),
            msg.chat_id.clone(),
            msg.key().clone(),
            self.send_timeout,
        );

        let (command, command_allowed, is_owner) = match route {
            Route::Status => {
                self.status.handle(&msg, &replier).await;
                return;
            }
            Route::Ordinary {
                command,
                command_allowed,
                is_owner,
            } => (command, command_allowed, is_owner),
        };

        let msg = Arc::new(msg);
        let parsed = command.clone().unwrap_or_default();
        let ctx = DispatchContext::new(
            Arc::clone(&msg),
            parsed.token,
            parsed.args,
            parsed.query,
            is_owner,
            replier,
            Arc::clone(&self.state),
        );

        if let Some(cmd) = &command {
            if !command_allowed {
                debug!(command = %cmd.token, mode = %self.mode, "command ignored by operating mode");
            } else if let Some(found) = self.state.registry.resolve(&cmd.token) {
                let outcome = dispatch(found, ctx.clone()).await;
                debug!(command = %cmd.token, ?outcome, "command finished");
            } else {
                debug!(command = %cmd.token, "unknown command");
            }
        }

        if !msg.body.is_empty() && !self.replies.is_empty() {
            let outcome = self.replies.dispatch(&msg.body, ctx).await;
            debug!(?outcome, "reply chain finished");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{handler_fn, Command};
    use crate::testing::{raw_message, FakeHandle, SENDER};
    use std::sync::Mutex;

    #[test]
    fn parses_token_args_and_query() {
        let p = parse_command("!", "!ping a b").unwrap();
        assert_eq!(p.token, "ping");
        assert_eq!(p.args, vec!["a", "b"]);
        assert_eq!(p.query, "a b");

        let p = parse_command(".", ".Song   never  gonna ").unwrap();
        assert_eq!(p.token, "song");
        assert_eq!(p.args, vec!["never", "gonna"]);
        assert_eq!(p.query, "never  gonna");
    }

    #[test]
    fn non_prefixed_body_is_not_a_command() {
        assert!(parse_command("!", "ping a b").is_none());
        assert!(parse_command("!", "").is_none());
        assert_eq!(parse_command("!", "!").unwrap().token, "");
    }

    fn config(mode: OperatingMode) -> TetherConfig {
        let mut cfg = TetherConfig::default();
        cfg.bot.prefix = "!".into();
        cfg.bot.mode = mode;
        cfg.bot.owners = vec!["+94770000009".into()];
        cfg.status.auto_seen = true;
        cfg
    }

    type Calls = Arc<Mutex<Vec<(String, Vec<String>)>>>;

    /// Router with a `ping` command that records its arguments, and a reply
    /// handler that records every body it claims.
    fn router(mode: OperatingMode, handle: &Arc<FakeHandle>) -> (Arc<MessageRouter>, Calls, Calls) {
        let commands: Calls = Arc::default();
        let replies: Calls = Arc::default();

        let mut registry = CommandRegistry::new();
        let rec = commands.clone();
        registry.register(Command::new(
            "ping",
            handler_fn(move |ctx| {
                let rec = rec.clone();
                async move {
                    rec.lock().unwrap().push((ctx.command.clone(), ctx.args.clone()));
                    Ok(())
                }
            }),
        ));

        let mut chain = ReplyHandlerChain::new();
        let rec = replies.clone();
        chain.register(
            "recorder",
            |_, _| true,
            handler_fn(move |ctx| {
                let rec = rec.clone();
                async move {
                    rec.lock().unwrap().push((ctx.body().to_string(), Vec::new()));
                    Ok(())
                }
            }),
        );

        let router = MessageRouter::new(
            &config(mode),
            registry,
            chain,
            Arc::new(ConversationStore::new()),
            handle.shared(),
        );
        (Arc::new(router), commands, replies)
    }

    async fn route(router: &Arc<MessageRouter>, raw: RawMessage) {
        router.route(raw).expect("routed").await.unwrap();
    }

    #[tokio::test]
    async fn prefixed_command_receives_args() {
        let handle = FakeHandle::new();
        let (router, commands, replies) = router(OperatingMode::Public, &handle);

        route(&router, raw_message(SENDER, None, "!ping a b")).await;

        assert_eq!(
            commands.lock().unwrap().as_slice(),
            &[("ping".to_string(), vec!["a".to_string(), "b".to_string()])]
        );
        // Reply handlers see command bodies too.
        assert_eq!(replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn plain_text_never_invokes_commands() {
        let handle = FakeHandle::new();
        let (router, commands, replies) = router(OperatingMode::Public, &handle);

        route(&router, raw_message(SENDER, None, "ping a b")).await;

        assert!(commands.lock().unwrap().is_empty());
        assert_eq!(replies.lock().unwrap()[0].0, "ping a b");
    }

    #[tokio::test]
    async fn status_posts_bypass_commands_and_replies() {
        let handle = FakeHandle::new();
        let (router, commands, replies) = router(OperatingMode::Public, &handle);

        let raw = raw_message("status@broadcast", Some(SENDER), "!ping");
        let msg = InboundMessage::from_raw(raw.clone()).unwrap();
        assert_eq!(router.classify(&msg), Route::Status);

        route(&router, raw).await;
        assert!(commands.lock().unwrap().is_empty());
        assert!(replies.lock().unwrap().is_empty());
        // auto_seen is on in the test config
        assert_eq!(handle.reads().len(), 1);
    }

    #[tokio::test]
    async fn private_mode_gates_strangers_but_not_owners() {
        let handle = FakeHandle::new();
        let (router, commands, replies) = router(OperatingMode::Private, &handle);

        route(&router, raw_message(SENDER, None, "!ping")).await;
        assert!(commands.lock().unwrap().is_empty());
        // Reply handlers are not gated.
        assert_eq!(replies.lock().unwrap().len(), 1);

        route(&router, raw_message("94770000009@s.whatsapp.net", None, "!ping")).await;
        assert_eq!(commands.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn owner_detection_strips_device_suffix_and_honours_from_me() {
        let handle = FakeHandle::new();
        let (router, _, _) = router(OperatingMode::Private, &handle);

        let owner_in_group = InboundMessage::from_raw(raw_message(
            "120363@g.us",
            Some("94770000009:3@s.whatsapp.net"),
            "hi",
        ))
        .unwrap();
        assert!(router.is_owner(&owner_in_group));

        let mut own = raw_message(SENDER, None, "hi");
        own.key.from_me = true;
        assert!(router.is_owner(&InboundMessage::from_raw(own).unwrap()));

        let stranger = InboundMessage::from_raw(raw_message(SENDER, None, "hi")).unwrap();
        assert!(!router.is_owner(&stranger));
    }

    #[tokio::test]
    async fn group_only_mode_rejects_direct_chats() {
        let handle = FakeHandle::new();
        let (router, commands, _) = router(OperatingMode::GroupOnly, &handle);

        route(&router, raw_message(SENDER, None, "!ping")).await;
        assert!(commands.lock().unwrap().is_empty());

        route(&router, raw_message("120363@g.us", Some(SENDER), "!ping")).await;
        assert_eq!(commands.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_command_does_not_stop_later_messages() {
        let handle = FakeHandle::new();
        let mut registry = CommandRegistry::new();
        registry.register(Command::new(
            "boom",
            handler_fn(|_ctx| async { Err(anyhow::anyhow!("kaput")) }),
        ));
        registry.register(Command::new(
            "ok",
            handler_fn(|ctx| async move {
                ctx.reply("fine").await?;
                Ok(())
            }),
        ));
        let router = Arc::new(MessageRouter::new(
            &config(OperatingMode::Public),
            registry,
            ReplyHandlerChain::new(),
            Arc::new(ConversationStore::new()),
            handle.shared(),
        ));

        route(&router, raw_message(SENDER, None, "!boom")).await;
        route(&router, raw_message(SENDER, None, "!ok")).await;

        assert_eq!(
            handle.texts(),
            vec![crate::command::ERROR_NOTICE.to_string(), "fine".to_string()]
        );
    }

    #[tokio::test]
    async fn content_free_envelopes_are_dropped() {
        let handle = FakeHandle::new();
        let (router, _, _) = router(OperatingMode::Public, &handle);

        let mut raw = raw_message(SENDER, None, "");
        raw.message = None;
        assert!(router.route(raw).is_none());
    }

    #[tokio::test]
    async fn status_posts_skipped_without_status_actions() {
        let handle = FakeHandle::new();
        let mut cfg = config(OperatingMode::Public);
        cfg.status.auto_seen = false;
        cfg.status.auto_react = false;
        let router = Arc::new(MessageRouter::new(
            &cfg,
            CommandRegistry::new(),
            ReplyHandlerChain::new(),
            Arc::new(ConversationStore::new()),
            handle.shared(),
        ));

        assert!(router
            .route(raw_message("status@broadcast", Some(SENDER), "story"))
            .is_none());
        assert!(handle.reads().is_empty());
    }
}
