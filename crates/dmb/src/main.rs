use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use dmb_core::{
    config::Config,
    domain::GuildId,
    event::deletion_channel,
    messaging::{port::ArchiveSink, throttled::ThrottledSink},
    monitor::DeletionMonitor,
};
use dmb_discord::DiscordClient;

mod feed;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dmb_core::logging::init("dmb")?;

    let cfg = Config::load()?;
    let client = Arc::new(DiscordClient::new(
        cfg.discord_api_base.clone(),
        cfg.discord_bot_token.clone(),
        GuildId(cfg.discord_guild_id),
        cfg.http_timeout,
    )?);

    let bot = client
        .current_user()
        .await
        .context("resolve bot identity")?;
    info!(
        bot = bot.0,
        guild = cfg.discord_guild_id,
        archive = %cfg.monitor.archive_channel,
        "deletion monitor starting"
    );

    let cancel = CancellationToken::new();
    let (tx, mut rx) = deletion_channel(cfg.event_queue_capacity);
    let lines = feed::spawn_stdin_reader(cfg.event_queue_capacity);
    let feed_cancel = cancel.clone();
    let feed = tokio::spawn(async move {
        match feed::pump_snapshots(lines, tx, feed_cancel).await {
            Ok(n) => info!(forwarded = n, "snapshot feed closed"),
            Err(e) => error!("snapshot feed failed: {e:#}"),
        }
    });

    // Pace archive sends; the adapter still retries a single 429 on its own.
    let sink: Arc<dyn ArchiveSink> =
        Arc::new(ThrottledSink::new(client.clone(), cfg.archive_throttle));

    let mut monitor = DeletionMonitor::new(cfg.monitor.clone(), client, sink, bot);
    let monitor_cancel = cancel.clone();
    let mut monitor_task =
        tokio::spawn(async move { monitor.run(&mut rx, monitor_cancel).await });

    let result = tokio::select! {
        res = &mut monitor_task => res,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            cancel.cancel();
            monitor_task.await
        }
    };
    // The stdin thread is detached, so this only waits for the async side.
    cancel.cancel();
    if let Err(e) = feed.await {
        error!("snapshot feed task failed: {e}");
    }

    result.context("monitor task panicked")??;
    Ok(())
}
