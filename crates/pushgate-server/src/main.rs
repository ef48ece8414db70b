mod config;

use std::sync::Arc;

use anyhow::Context;
use axum::{Router, middleware};
use clap::Parser;
use pushgate_admin::{AdminState, SelfMetrics, lifecycle_router, track_api_metrics};
use pushgate_aggregate::{Aggregate, spawn_sweeper};
use pushgate_api::api_router;
use tokio::{net::TcpListener, sync::watch, task::JoinSet};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;
    let config = GatewayConfig::from_cli(&cli)?;

    let metrics = SelfMetrics::register()?;
    let aggregate = Arc::new(Aggregate::with_observer(
        config.aggregate.clone(),
        metrics.gateway.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = config.sweep_interval().map(|period| {
        info!(
            ttl = ?config.aggregate.metric_ttl(),
            period = ?period,
            "series expiry enabled"
        );
        spawn_sweeper(
            Arc::clone(&aggregate),
            period,
            wait_for_shutdown(shutdown_rx.clone()),
        )
    });

    let api = api_router(Arc::clone(&aggregate), &config.api).layer(
        middleware::from_fn_with_state(Arc::clone(&metrics.api), track_api_metrics),
    );
    let lifecycle = lifecycle_router(Arc::new(AdminState::new(Arc::clone(&aggregate), &metrics)));

    let api_listener = TcpListener::bind(&config.api_listen)
        .await
        .with_context(|| format!("failed to bind api listener on {}", config.api_listen))?;
    let lifecycle_listener = TcpListener::bind(&config.lifecycle_listen)
        .await
        .with_context(|| {
            format!(
                "failed to bind lifecycle listener on {}",
                config.lifecycle_listen
            )
        })?;

    info!(
        ignored_labels = ?config.aggregate.ignored_labels(),
        "pushgate api listening on {}",
        config.api_listen
    );
    info!("pushgate lifecycle listening on {}", config.lifecycle_listen);

    let mut servers = JoinSet::new();
    servers.spawn(serve(api_listener, api, shutdown_rx.clone()));
    servers.spawn(serve(lifecycle_listener, lifecycle, shutdown_rx));

    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        Some(finished) = servers.join_next() => {
            warn!("listener stopped unexpectedly, shutting down");
            finished??;
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(finished) = servers.join_next().await {
        finished??;
    }
    if let Some(sweeper) = sweeper {
        sweeper.await?;
    }

    info!("pushgate stopped");
    Ok(())
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::from_default_env().add_directive("pushgate=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
