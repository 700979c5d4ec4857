//! Commands every bot ships with. Registered after plugins so a plugin that
//! claims the same key keeps it.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use crate::command::{handler_fn, Command, CommandRegistry};
use crate::context::DispatchContext;

pub const DEFAULT_ALIVE_MESSAGE: &str = "👋 I'm alive and listening.";

pub fn register_builtins(registry: &mut CommandRegistry) {
    registry.register(
        Command::new("alive", handler_fn(alive))
            .category("main")
            .description("Check the bot is online")
            .react("👋"),
    );
    registry.register(
        Command::new("ping", handler_fn(ping))
            .category("main")
            .description("Measure send latency"),
    );
    registry.register(
        Command::new("menu", handler_fn(menu))
            .alias("help")
            .category("main")
            .description("List available commands")
            .react("📜"),
    );
}

async fn alive(ctx: DispatchContext) -> anyhow::Result<()> {
    let text = format!(
        "{}\n\n⏱️ Uptime: {}",
        ctx.alive_message().unwrap_or(DEFAULT_ALIVE_MESSAGE),
        format_uptime(ctx.uptime())
    );
    ctx.reply(text).await?;
    Ok(())
}

async fn ping(ctx: DispatchContext) -> anyhow::Result<()> {
    let started = Instant::now();
    ctx.reply("🏓 Pinging...").await?;
    let ms = started.elapsed().as_millis();
    ctx.reply(format!("🏓 Pong! {ms} ms")).await?;
    Ok(())
}

async fn menu(ctx: DispatchContext) -> anyhow::Result<()> {
    ctx.reply(render_menu(&ctx)).await?;
    Ok(())
}

fn render_menu(ctx: &DispatchContext) -> String {
    let prefix = ctx.prefix();
    let mut out = String::from("📜 *Commands*\n");
    for (category, commands) in ctx.registry().commands() {
        let _ = write!(out, "\n*{}*\n", category.to_uppercase());
        for cmd in commands {
            let _ = write!(out, "• {prefix}{}", cmd.pattern());
            if !cmd.about().is_empty() {
                let _ = write!(out, " - {}", cmd.about());
            }
            out.push('\n');
        }
    }
    out
}

/// `1d 2h 3m 4s`, dropping leading zero units.
pub fn format_uptime(d: Duration) -> String {
    let secs = d.as_secs();
    let (days, hours, mins, s) = (secs / 86_400, secs / 3600 % 24, secs / 60 % 60, secs % 60);
    if days > 0 {
        format!("{days}d {hours}h {mins}m {s}s")
    } else if hours > 0 {
        format!("{hours}h {mins}m {s}s")
    } else if mins > 0 {
        format!("{mins}m {s}s")
    } else {
        format!("{s}s")
    }
}
