use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{debug, error, warn};

use crate::command::{panic_message, Handler};
use crate::context::DispatchContext;

type Filter = Box<dyn Fn(&str, &DispatchContext) -> bool + Send + Sync>;

struct ReplyHandler {
    name: String,
    filter: Filter,
    handler: Arc<dyn Handler>,
}

/// Ordered chain of `(filter, handler)` pairs. The first filter that accepts
/// a body claims it; later handlers never see that message.
#[derive(Default)]
pub struct ReplyHandlerChain {
    handlers: Vec<ReplyHandler>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    NoMatch,
    Handled(String),
    Failed(String),
}

impl ReplyHandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, filter: F, handler: Arc<dyn Handler>)
    where
        F: Fn(&str, &DispatchContext) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(handler = %name, position = self.handlers.len(), "reply handler registered");
        self.handlers.push(ReplyHandler {
            name,
            filter: Box::new(filter),
            handler,
        });
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Offer `body` to each handler in registration order.
    pub async fn dispatch(&self, body: &str, ctx: DispatchContext) -> ReplyOutcome {
        let mut claimed = None;
        for entry in &self.handlers {
            // A panicking filter counts as a non-match.
            match std::panic::catch_unwind(AssertUnwindSafe(|| (entry.filter)(body, &ctx))) {
                Ok(true) => {
                    claimed = Some(entry);
                    break;
                }
                Ok(false) => {}
                Err(panic) => {
                    warn!(handler = %entry.name, panic = %panic_message(panic.as_ref()), "reply filter panicked");
                }
            }
        }

        let Some(entry) = claimed else {
            return ReplyOutcome::NoMatch;
        };

        debug!(handler = %entry.name, sender = %ctx.sender(), "reply handler matched");
        match AssertUnwindSafe(entry.handler.call(ctx)).catch_unwind().await {
            Ok(Ok(())) => ReplyOutcome::Handled(entry.name.clone()),
            Ok(Err(e)) => {
                error!(handler = %entry.name, error = %e, "reply handler failed");
                ReplyOutcome::Failed(entry.name.clone())
            }
            Err(panic) => {
                error!(handler = %entry.name, panic = %panic_message(panic.as_ref()), "reply handler panicked");
                ReplyOutcome::Failed(entry.name.clone())
            }
        }
    }
}
