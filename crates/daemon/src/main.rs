// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `orbitmesh-daemon` binary entry point. Loads configuration, builds the
//! control plane, starts its background sweeps, and runs until SIGINT/SIGTERM
//! (§10.6 "Graceful shutdown").
//!
//! The packaged transport is `orbitmesh_adapters::FakeTransport`: no concrete
//! `AgentTransport` (the wire framing a real agent process would dial into)
//! ships in this workspace, since that framing is an external collaborator
//! per the spec this daemon implements. See `DESIGN.md` for the reasoning.

use orbitmesh_adapters::{AgentTransport, FakeTransport};
use orbitmesh_core::SystemClock;
use orbitmesh_daemon::{Config, ControlPlane};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config_path = std::env::var("ORBITMESH_CONFIG").ok().map(PathBuf::from);
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("failed to load configuration: {error}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    let wal_path = std::env::var("ORBITMESH_WAL_PATH").unwrap_or_else(|_| "orbitmesh.wal".to_string());
    let transport: Arc<dyn AgentTransport> = Arc::new(FakeTransport::new());

    let control_plane = match ControlPlane::new(config, SystemClock, transport, std::path::Path::new(&wal_path)) {
        Ok(control_plane) => Arc::new(control_plane),
        Err(error) => {
            eprintln!("failed to build control plane: {error}");
            std::process::exit(1);
        }
    };

    control_plane.start().await;
    tracing::info!("orbitmesh-daemon running");

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received");
    control_plane.shutdown().await;
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(error) => {
                tracing::warn!(%error, "failed to install SIGTERM handler, falling back to Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
