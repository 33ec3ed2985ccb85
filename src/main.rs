//! distodo - a todo-list bot on the real-time gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use distodo_client::{ApiClient, Gateway, SessionSnapshot};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod todo;

use config::BotConfig;

/// A run lasting this long counts as healthy and resets the backoff.
const HEALTHY_RUN: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "distodo=debug,distodo_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BotConfig::from_env()?;
    let reconnect = config.reconnect_config();
    let api = Arc::new(ApiClient::new(config.token.clone()).with_base_url(&config.api_url));

    // One listener for the whole process so no ctrl-c is missed between runs
    let (interrupt_tx, mut interrupt) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                interrupt_tx.send_replace(true);
            }
            Err(e) => error!(error = %e, "Cannot listen for ctrl-c"),
        }
    });

    let mut snapshot = SessionSnapshot::new(config.token.clone());
    let mut attempt = 0;
    loop {
        let mut gateway = Gateway::from_snapshot(snapshot.clone(), config.gateway_config());
        todo::register(&mut gateway, api.clone());
        let handle = gateway.handle();

        let started = Instant::now();
        let run = gateway.run();
        tokio::pin!(run);
        snapshot = tokio::select! {
            snapshot = &mut run => snapshot,
            _ = interrupted(&mut interrupt) => {
                handle.shutdown();
                run.await;
                return Ok(());
            }
        };

        if started.elapsed() >= HEALTHY_RUN {
            attempt = 0;
        }
        if reconnect.exhausted(attempt) {
            error!(attempts = attempt, "Gateway keeps stopping, giving up");
            anyhow::bail!("gateway stopped {attempt} times in a row");
        }

        let delay = reconnect.delay_for_attempt(attempt);
        warn!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            resumable = snapshot.session_id.is_some(),
            "Gateway stopped, restarting"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = interrupted(&mut interrupt) => return Ok(()),
        }
        attempt += 1;
    }
}

/// Resolves once ctrl-c has been seen. Never resolves if the listener failed.
async fn interrupted(interrupt: &mut watch::Receiver<bool>) {
    if interrupt.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
