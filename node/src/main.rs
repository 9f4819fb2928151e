// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # E-Delivery Devnet Node
//!
//! Entry point for the `edelivery-node` binary. Parses CLI arguments,
//! initializes logging and metrics, and dispatches to a subcommand:
//!
//! - `run`     — serve the reference ledger and blob store over HTTP
//! - `keygen`  — print a fresh key pair and its address
//! - `demo`    — run a whole exchange in process and print the record
//! - `version` — print build version information

mod api;
mod cli;
mod client;
mod logging;
mod metrics;
mod retry;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use edelivery_contracts::{InMemoryLedger, SystemClock};
use edelivery_protocol::crypto::PartyKeypair;
use edelivery_protocol::storage::{BlobStore, MemoryBlobStore, SledBlobStore};

use cli::{Commands, NodeCli};
use client::DeliveryClient;
use metrics::NodeMetrics;

/// Broadcast channel capacity for live event streaming.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NodeCli::parse();

    match cli.command {
        Commands::Run(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format);
            run_node(args).await
        }
        Commands::Keygen(args) => keygen(args),
        Commands::Demo(args) => {
            logging::init_logging("warn", cli.log_format);
            run_demo(args).await
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Serves the API and the metrics endpoint until a shutdown signal.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let policy = args.policy.to_policy();
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        in_memory = args.in_memory,
        min_deposit = policy.min_deposit,
        verify_response = policy.verify_response,
        lapsed_finish = ?policy.lapsed_finish,
        "starting edelivery-node"
    );

    // --- Blob store ---
    let blobs: Arc<dyn BlobStore> = if args.in_memory {
        Arc::new(MemoryBlobStore::new())
    } else {
        let path = args.data_dir.join("blobs");
        std::fs::create_dir_all(&path)
            .with_context(|| format!("failed to create blob directory: {}", path.display()))?;
        let store = SledBlobStore::open(&path)
            .with_context(|| format!("failed to open blob store at {}", path.display()))?;
        tracing::info!(path = %path.display(), blobs = store.len(), "blob store opened");
        Arc::new(store)
    };

    // --- Ledger ---
    let ledger = Arc::new(InMemoryLedger::new(policy, Arc::new(SystemClock)));

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);

    // --- Application state ---
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            edelivery_protocol::config::PROTOCOL_VERSION,
        ),
        network: args.network.clone(),
        ledger,
        blobs,
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("{}:{}", args.host, args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("{}:{}", args.host, args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("edelivery-node stopped");
    Ok(())
}

/// Prints a fresh key pair.
fn keygen(args: cli::KeygenArgs) -> Result<()> {
    let keypair = PartyKeypair::generate();
    if args.json {
        let out = serde_json::json!({
            "address": keypair.address(),
            "public_key": keypair.public().to_hex(),
            "secret_key": keypair.secret_hex(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("Address     : {}", keypair.address());
        println!("Public key  : {}", keypair.public().to_hex());
        println!("Secret key  : {}", keypair.secret_hex());
    }
    Ok(())
}

/// Runs create → accept → finish → open → settle against in-process
/// adapters and prints what the ledger recorded.
async fn run_demo(args: cli::DemoArgs) -> Result<()> {
    if args.receivers == 0 {
        bail!("the demo needs at least one receiver");
    }

    let ledger = Arc::new(InMemoryLedger::new(
        args.policy.to_policy(),
        Arc::new(SystemClock),
    ));
    let blobs = Arc::new(MemoryBlobStore::new());
    let sender = DeliveryClient::new(ledger.clone(), blobs.clone(), PartyKeypair::generate());
    let receivers: Vec<_> = (0..args.receivers)
        .map(|_| DeliveryClient::new(ledger.clone(), blobs.clone(), PartyKeypair::generate()))
        .collect();

    println!("Sender      : {}", sender.address());
    for (i, r) in receivers.iter().enumerate() {
        println!("Receiver {:<2} : {}", i + 1, r.address());
    }

    let sent = sender
        .send(
            receivers.iter().map(|r| r.address()).collect(),
            args.message.as_bytes(),
            args.term1,
            args.term2,
            args.deposit,
        )
        .await
        .context("create failed")?;
    println!("\nCreated     : {}", sent.id);
    println!("Payload     : {}", sent.payload_hash);
    for r in &receivers {
        let listed = r.my_deliveries().await?;
        let status = r.status(sent.id, r.address()).await?;
        println!("  {} sees {} delivery(ies), status {}", r.address(), listed.len(), status);
    }

    for r in &receivers {
        r.accept(sent.id).await.context("accept failed")?;
    }
    let finished = sender
        .finish_accepted(sent.id, &sent.secret)
        .await
        .context("finish failed")?;
    println!("Finished    : {} receiver(s)", finished.len());

    let view = sender.delivery(sent.id).await?;
    println!("V           : ({}, {})", view.vx, view.vy);
    println!("A           : {}", view.sender_public);
    for state in &view.states {
        println!("\n[{}] {}", state.receiver, state.status);
        for (name, value) in [
            ("Z1", &state.z1),
            ("Z2", &state.z2),
            ("Bx", &state.bx),
            ("By", &state.by),
            ("c", &state.c),
            ("r", &state.r),
        ] {
            println!("  {:<3}: {}", name, value.as_deref().unwrap_or("-"));
        }
    }

    println!();
    for r in &receivers {
        let message = r.open(sent.id).await.context("open failed")?;
        println!(
            "{} opened: {:?}",
            r.address(),
            String::from_utf8_lossy(&message)
        );
    }

    let settlement = receivers[0].settle(sent.id).await.context("settle failed")?;
    println!("\nSettled     : {} paid out", settlement.total());
    for payout in &settlement.payouts {
        println!("  {} ← {} ({:?})", payout.to, payout.amount, payout.reason);
    }
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("edelivery-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol       {}", edelivery_protocol::config::PROTOCOL_VERSION);
    println!("fingerprint    {}", edelivery_protocol::config::PROTOCOL_FINGERPRINT);
    println!("curve          {}", edelivery_protocol::config::CURVE_NAME);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
