// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use otel_docker_logdriver::config::Config;
use otel_docker_logdriver::driver::Driver;
use otel_docker_logdriver::logger::Formatter;
use otel_docker_logdriver::plugin;
use otel_docker_logdriver::transport::{resolve_transport, RecordEmitter};

/// Bound on the final flush of queued records at teardown.
const TRANSPORT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
pub async fn main() {
    let log_level = env::var("OTEL_LOGDRIVER_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,tonic=off,tower=off,reqwest=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .event_format(Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    otel_docker_logdriver::log_build_info();

    let config = Config::from_env();
    debug!(endpoint = %config.endpoint, "loaded exporter configuration");

    // A half-configured transport must never serve streams: any
    // construction failure aborts startup.
    let transport = match resolve_transport(&config) {
        Ok(transport) => transport,
        Err(e) => {
            error!("Error configuring OTLP transport on plugin startup: {e}");
            std::process::exit(1);
        }
    };

    let emitter: Arc<dyn RecordEmitter> = Arc::new(transport.emitter());
    let driver = Arc::new(Driver::new(emitter));

    let socket_path = PathBuf::from(
        env::var("OTEL_LOGDRIVER_SOCKET").unwrap_or_else(|_| plugin::DEFAULT_SOCKET.to_string()),
    );

    let serve_shutdown = CancellationToken::new();
    let serve_driver = Arc::clone(&driver);
    let serve_token = serve_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = plugin::serve_unix(&socket_path, serve_driver, serve_token).await {
            error!("Error serving plugin handshake: {e}");
            std::process::exit(1);
        }
    });

    wait_for_shutdown_signal().await;

    info!(active_streams = driver.active_streams(), "shutting down");
    serve_shutdown.cancel();

    // One shutdown per process lifetime; enforced by the transport's move
    // semantics.
    if let Err(e) = transport.shutdown(TRANSPORT_SHUTDOWN_TIMEOUT) {
        error!("Error shutting down OTLP transport: {e}");
    }
}

async fn wait_for_shutdown_signal() {
    #[allow(clippy::expect_used)]
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    #[allow(clippy::expect_used)]
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");

    tokio::select! {
        _ = sigint.recv() => debug!("received SIGINT"),
        _ = sigterm.recv() => debug!("received SIGTERM"),
    }
}
