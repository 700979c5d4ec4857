use tether_dispatch::{CommandRegistry, ReplyHandlerChain};

/// A bundle of commands and reply handlers.
///
/// Plugins are registered in builder order before the gateway starts; a
/// command key claimed by an earlier plugin cannot be taken by a later one.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn register(&self, commands: &mut CommandRegistry, replies: &mut ReplyHandlerChain);
}
