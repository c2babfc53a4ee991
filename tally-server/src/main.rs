use std::sync::Arc;

use anyhow::Context;
use chrono::TimeDelta;
use sqlx::postgres::PgPoolOptions;
use tally_core::consume::VoteConsumer;
use tally_core::publish::VotePublisher;
use tally_core::queue::AmqpTransport;
use tally_core::store::{PostgresParticipantDirectory, PostgresRoundStore};
use tally_core::{RoundService, VotingMetrics};
use tally_server::{config::Config, routes, state::AppState};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .context("failed to connect to postgres")?;
    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("database connected");

    let transport = Arc::new(
        AmqpTransport::connect(&config.amqp_url)
            .await
            .context("failed to connect to rabbitmq")?,
    );
    info!("queue transport connected");

    let metrics = Arc::new(VotingMetrics::new());
    let store = Arc::new(PostgresRoundStore::new(pool.clone()));
    let directory = Arc::new(PostgresParticipantDirectory::new(pool.clone()));

    let publisher = VotePublisher::new(transport.clone(), metrics.clone());
    let service = Arc::new(
        RoundService::new(store.clone(), directory, publisher)
            .with_round_duration(TimeDelta::hours(config.round_duration_hours)),
    );

    // The one vote consumer for the lifetime of the process. On shutdown it
    // stops taking messages; in-flight persistence is not awaited.
    let shutdown = CancellationToken::new();
    let consumer = VoteConsumer::new(transport, store, metrics.clone());
    let worker = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(err) = consumer.run(shutdown).await {
                error!(%err, "votes consumer failed");
            }
        }
    });

    let app = routes::router(AppState { service, metrics });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.port))?;
    info!(port = config.port, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutdown signal received");
                shutdown.cancel();
            }
        })
        .await?;

    worker.await?;
    Ok(())
}
