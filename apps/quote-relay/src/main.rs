//! Quote Relay Binary
//!
//! Starts the refresh pipeline, the consumer group and the query server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin quote-relay
//! ```
//!
//! # Environment Variables
//!
//! - `RELAY_ROLE`: producer | consumer | all (default: all)
//! - `RELAY_ENV`: development | production (default: development)
//! - `NATS_URL`: NATS server or `memory://` (default: nats://localhost:4222)
//! - `STORE_URL`: `memory://` or `postgres://…` (default: memory://)
//! - `REFRESH_INTERVAL_MINUTES`: Refresh period (default: 15)
//! - `TRACKED_SYMBOLS`: Comma-separated symbols (default: bitcoin,ethereum,matic-network)
//! - `HTTP_PORT`: Query server port (default: 3000)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `RUST_LOG`: Log level (default: info)
//!
//! See `RelayConfig` for the full list.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use quote_relay::application::ports::{CloseReason, TransportPort};
use quote_relay::application::services::{
    ConsumerGroup, Producer, Scheduler, StatisticsService,
};
use quote_relay::domain::quote::UpdateEventCodec;
use quote_relay::infrastructure::broker::InMemoryBroker;
use quote_relay::infrastructure::coingecko::CoinGeckoClient;
use quote_relay::infrastructure::config::RelayConfig;
use quote_relay::infrastructure::http::{HttpServer, HttpServerError, HttpState};
use quote_relay::infrastructure::nats::NatsClient;
use quote_relay::infrastructure::store::connect_store;
use quote_relay::infrastructure::telemetry;
use quote_relay::init_metrics;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bound on each graceful shutdown step.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Why the process is stopping.
enum StopCause {
    Signal,
    Fatal(String),
}

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();

    // Initialize telemetry (tracing + optional OpenTelemetry)
    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting quote relay");

    match run().await {
        Ok(StopCause::Signal) => {
            tracing::info!("Quote relay stopped");
            ExitCode::SUCCESS
        }
        Ok(StopCause::Fatal(reason)) => {
            tracing::error!(%reason, "Quote relay stopped after fatal error");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = format!("{e:#}"), "Quote relay failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<StopCause> {
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = RelayConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let tracked = config.pipeline.tracked.clone();
    let store = connect_store(
        &config.store.url,
        config.store.max_connections,
        tracked.clone(),
    )
    .await
    .context("failed to open quote store")?;

    let transport: Arc<dyn TransportPort> = if config.transport.is_memory() {
        tracing::info!("Using in-process broker");
        Arc::new(InMemoryBroker::new())
    } else {
        Arc::new(
            NatsClient::connect(config.transport.nats_options())
                .await
                .context("failed to connect to NATS")?,
        )
    };

    // Consumers subscribe before the first refresh publishes.
    let consumers = if config.role.runs_consumer() {
        let group = ConsumerGroup::start(
            transport.as_ref(),
            Arc::clone(&store),
            &UpdateEventCodec::new(tracked.clone()),
            &config.transport.update_subject,
            &config.transport.queue_group,
            config.pipeline.consumer_workers,
        )
        .await
        .context("failed to start consumer group")?;
        Some(group)
    } else {
        None
    };

    let scheduler_cancel = CancellationToken::new();
    let mut scheduler_task = None;
    let mut trigger = None;
    if config.role.runs_producer() {
        let source = CoinGeckoClient::new(&config.pipeline.quote_api_url)
            .context("failed to build quote API client")?;
        let producer = Producer::new(
            Arc::new(source),
            Arc::clone(&transport),
            tracked.clone(),
            config.transport.update_subject.clone(),
        );
        let scheduler = Scheduler::new(config.pipeline.refresh_interval_minutes, Arc::new(producer));
        trigger = Some(scheduler.trigger_handle());
        scheduler_task = Some(tokio::spawn(scheduler.run(scheduler_cancel.clone())));
    }

    let mut http_state = HttpState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        StatisticsService::new(Arc::clone(&store), tracked),
        Arc::clone(&transport),
        config.environment.is_production(),
    );
    if let Some(handle) = trigger {
        http_state = http_state.with_refresh(handle);
    }
    let http_cancel = CancellationToken::new();
    let mut http_task: JoinHandle<Result<(), HttpServerError>> = tokio::spawn(
        HttpServer::new(config.server.http_port, Arc::new(http_state), http_cancel.clone()).run(),
    );

    tracing::info!(role = config.role.as_str(), "Quote relay ready");

    let cause = tokio::select! {
        () = shutdown_signal() => StopCause::Signal,
        reason = transport_closed(transport.closed()) => StopCause::Fatal(reason),
        result = &mut http_task => {
            let reason = match result {
                Ok(Ok(())) => "HTTP server exited".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("HTTP server task failed: {e}"),
            };
            StopCause::Fatal(reason)
        }
    };

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );

    scheduler_cancel.cancel();
    if let Some(task) = scheduler_task
        && tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err()
    {
        tracing::warn!("Scheduler did not stop in time");
    }

    if let Err(e) = transport.drain().await {
        tracing::warn!(error = %e, "Transport drain failed");
    }

    if let Some(group) = consumers {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, group.join()).await {
            Ok(stats) => tracing::info!(
                consumed = stats.consumed,
                stored = stats.stored,
                malformed = stats.malformed,
                store_failures = stats.store_failures,
                "Consumer group stopped"
            ),
            Err(_) => tracing::warn!("Consumer group did not stop in time"),
        }
    }

    http_cancel.cancel();
    if !http_task.is_finished()
        && tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut http_task).await.is_err()
    {
        tracing::warn!("HTTP server did not stop in time");
    }

    store.close().await;

    Ok(cause)
}

/// Resolve once the transport closes on its own.
async fn transport_closed(mut closed: watch::Receiver<Option<CloseReason>>) -> String {
    loop {
        if let Some(reason) = closed.borrow_and_update().clone() {
            return match reason {
                CloseReason::Fatal(message) => message,
                CloseReason::Drained => "transport closed unexpectedly".to_string(),
            };
        }
        if closed.changed().await.is_err() {
            // Sender gone without a close reason; nothing more will arrive.
            std::future::pending::<()>().await;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        role = config.role.as_str(),
        environment = config.environment.as_str(),
        http_port = config.server.http_port,
        refresh_interval_minutes = config.pipeline.refresh_interval_minutes,
        consumer_workers = config.pipeline.consumer_workers,
        tracked = %config.pipeline.tracked,
        "Configuration loaded"
    );
    tracing::debug!(
        subject = %config.transport.update_subject,
        queue_group = %config.transport.queue_group,
        quote_api_url = %config.pipeline.quote_api_url,
        "Pipeline endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
