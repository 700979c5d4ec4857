use std::sync::Arc;
use std::time::Duration;

use tether_client::{MessagingClient, RawMessage, SharedHandle};
use tether_connection::{ConnectionManager, LifecycleListener, ReconnectPolicy, SessionEnd};
use tether_core::TetherConfig;
use tether_dispatch::builtin::register_builtins;
use tether_dispatch::{CommandRegistry, ConversationStore, MessageRouter, ReplyHandlerChain};
use tether_session::{CredentialFetcher, SessionStore};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, Result};
use crate::notify::ReadyNotifier;
use crate::plugin::Plugin;

/// Collects the parts of a [`Gateway`] before anything runs.
pub struct GatewayBuilder {
    config: TetherConfig,
    plugins: Vec<Box<dyn Plugin>>,
    client: Option<Arc<dyn MessagingClient>>,
    fetcher: Option<Arc<dyn CredentialFetcher>>,
}

impl GatewayBuilder {
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn client(mut self, client: Arc<dyn MessagingClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Override the HTTP credential fetcher built from `[session]`.
    pub fn fetcher(mut self, fetcher: Arc<dyn CredentialFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Register plugins then built-ins, and freeze the registries.
    pub fn build(self) -> Result<Gateway> {
        let client = self
            .client
            .ok_or_else(|| GatewayError::Config("no messaging client configured".into()))?;

        let store = match self.fetcher {
            Some(fetcher) => SessionStore::new(
                &self.config.session.dir,
                self.config.session.required_keys.clone(),
                fetcher,
            ),
            None => SessionStore::from_config(&self.config.session),
        };

        let mut commands = CommandRegistry::new();
        let mut replies = ReplyHandlerChain::new();
        for plugin in &self.plugins {
            let before = commands.len();
            plugin.register(&mut commands, &mut replies);
            info!(
                plugin = plugin.name(),
                commands = commands.len() - before,
                "plugin registered"
            );
        }
        register_builtins(&mut commands);
        info!(
            commands = commands.len(),
            reply_handlers = replies.len(),
            "registries frozen"
        );

        let handle = SharedHandle::new();
        let conversations = Arc::new(ConversationStore::new());
        let router = MessageRouter::new(
            &self.config,
            commands,
            replies,
            Arc::clone(&conversations),
            handle.clone(),
        );

        Ok(Gateway {
            config: self.config,
            store: Arc::new(store),
            client,
            router: Arc::new(router),
            conversations,
            handle,
            cancel: CancellationToken::new(),
            manager: None,
            tasks: Vec::new(),
        })
    }
}

/// The running bot.
pub struct Gateway {
    config: TetherConfig,
    store: Arc<SessionStore>,
    client: Arc<dyn MessagingClient>,
    router: Arc<MessageRouter>,
    conversations: Arc<ConversationStore>,
    handle: SharedHandle,
    cancel: CancellationToken,
    manager: Option<ConnectionManager>,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    pub fn builder(config: TetherConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            plugins: Vec::new(),
            client: None,
            fetcher: None,
        }
    }

    /// Bootstrap the session and bring the connection up.
    ///
    /// Fails before any connection attempt when no usable credentials exist.
    pub async fn start(&mut self) -> Result<()> {
        if self.manager.is_some() {
            return Err(GatewayError::Config("gateway already started".into()));
        }

        let creds = self
            .store
            .bootstrap(self.config.session.remote_ref.as_deref())
            .await?;
        info!(registered = creds.is_registered(), "session ready");

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.gateway.inbound_buffer);
        let notifier: Arc<dyn LifecycleListener> =
            Arc::new(ReadyNotifier::from_config(&self.config));
        let manager = ConnectionManager::with_handle(
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            ReconnectPolicy::from_config(&self.config.reconnect),
            inbound_tx,
            self.handle.clone(),
            Some(notifier),
        );
        manager.start(creds).await?;

        // Background tasks only once the connection is under supervision;
        // anything it forwards meanwhile waits in the channel.
        let conv = &self.config.conversation;
        self.tasks.push(self.conversations.spawn_sweeper(
            Duration::from_secs(conv.sweep_interval_secs.max(1)),
            Duration::from_secs(conv.ttl_secs),
            self.cancel.child_token(),
        ));
        self.tasks.push(tokio::spawn(consume(
            inbound_rx,
            Arc::clone(&self.router),
            self.cancel.child_token(),
        )));

        self.manager = Some(manager);
        Ok(())
    }

    /// Token that stops the gateway when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn connection(&self) -> Option<&ConnectionManager> {
        self.manager.as_ref()
    }

    /// Wait until the session ends or [`stop`](Self::stop) is called.
    ///
    /// A stop request is `Ok`; a logout, ban or exhausted reconnect budget
    /// is [`GatewayError::Terminal`].
    pub async fn run_until_stopped(&mut self) -> Result<()> {
        let manager = self.manager.clone().ok_or(GatewayError::NotStarted)?;

        let end = tokio::select! {
            end = manager.wait_terminal() => end,
            _ = self.cancel.cancelled() => {
                info!("stop requested");
                manager.shutdown().await;
                SessionEnd::Shutdown
            }
        };

        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        debug!("gateway stopped");

        match end {
            SessionEnd::Shutdown => Ok(()),
            other => Err(GatewayError::Terminal(other)),
        }
    }
}

/// Single inbound consumer: hands each message to the router in arrival order.
async fn consume(
    mut inbound: mpsc::Receiver<RawMessage>,
    router: Arc<MessageRouter>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = inbound.recv() => match next {
                Some(raw) => {
                    router.route(raw);
                }
                None => break,
            },
        }
    }
    debug!("inbound consumer stopped");
}
