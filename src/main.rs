//! squeaknode - a decentralized, pay-to-read social-posting network over
//! Lightning.
//!
//! Wires together the `SqueakCore` protocol engine, the `SentOffersVerifier`
//! background consumer, the `ConnectionManager`, and the admin HTTP surface,
//! then runs until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use squeaknode_core::admin::{AdminHandler, AdminServer};
use squeaknode_core::bitcoin_client::{BitcoinClient, FakeBitcoinClient, RpcBitcoinClient};
use squeaknode_core::connection_manager::ConnectionManager;
use squeaknode_core::lightning_client::{FakeLightningClient, LightningClient, LndRestLightningClient};
use squeaknode_core::sent_offers_verifier::SentOffersVerifier;
use squeaknode_core::squeak_core::SqueakCore;
use squeaknode_core::storage::InMemoryStorage;

/// Command-line arguments for the squeaknode process.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address the admin HTTP surface binds to.
    #[arg(long, default_value = "127.0.0.1:8994")]
    admin_bind: SocketAddr,

    /// Admin login username.
    #[arg(long, default_value = "squeaknode")]
    admin_username: String,

    /// Admin login password.
    #[arg(long, env = "SQUEAKNODE_ADMIN_PASSWORD", default_value = "changeme")]
    admin_password: String,

    /// Disable the admin login requirement (for local development only).
    #[arg(long)]
    admin_login_disabled: bool,

    /// lnd REST base URL, e.g. https://localhost:8080. Omit to run against
    /// an in-memory fake Lightning backend.
    #[arg(long)]
    lnd_rest_url: Option<String>,

    /// lnd admin macaroon, hex-encoded.
    #[arg(long, env = "SQUEAKNODE_LND_MACAROON", default_value = "")]
    lnd_macaroon_hex: String,

    /// bitcoind RPC URL, e.g. http://127.0.0.1:8332. Omit to run against an
    /// in-memory fake chain.
    #[arg(long)]
    bitcoind_rpc_url: Option<String>,

    #[arg(long, default_value = "")]
    bitcoind_rpc_user: String,

    #[arg(long, env = "SQUEAKNODE_BITCOIND_PASSWORD", default_value = "")]
    bitcoind_rpc_password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let bitcoin_client: Arc<dyn BitcoinClient> = match &args.bitcoind_rpc_url {
        Some(url) => Arc::new(
            RpcBitcoinClient::new(url, &args.bitcoind_rpc_user, &args.bitcoind_rpc_password)
                .context("connecting to bitcoind")?,
        ),
        None => {
            info!("no --bitcoind-rpc-url given, running against an in-memory fake chain");
            Arc::new(FakeBitcoinClient::new(0, [0u8; 32]))
        }
    };

    let lightning_client: Arc<dyn LightningClient> = match &args.lnd_rest_url {
        Some(url) => Arc::new(
            LndRestLightningClient::new(url.clone(), args.lnd_macaroon_hex.clone())
                .context("configuring lnd REST client")?,
        ),
        None => {
            info!("no --lnd-rest-url given, running against an in-memory fake lightning node");
            Arc::new(FakeLightningClient::new())
        }
    };

    let storage = Arc::new(InMemoryStorage::new());
    let squeak_core = Arc::new(SqueakCore::new(bitcoin_client.clone(), lightning_client.clone()));
    let connection_manager = Arc::new(ConnectionManager::new());

    let verifier = Arc::new(SentOffersVerifier::new(storage.clone(), squeak_core.clone()));
    let verifier_stop = verifier.stop_handle();
    let verifier_task = {
        let verifier = verifier.clone();
        tokio::spawn(async move { verifier.process_subscribed_invoices().await })
    };

    let admin_handler = Arc::new(AdminHandler::new(
        storage,
        squeak_core,
        connection_manager,
        lightning_client,
        bitcoin_client,
    ));
    let admin_server = Arc::new(AdminServer::new(
        admin_handler,
        args.admin_username.clone(),
        &args.admin_password,
        args.admin_login_disabled,
    ));

    let shutdown = CancellationToken::new();
    let listener = tokio::net::TcpListener::bind(args.admin_bind)
        .await
        .with_context(|| format!("binding admin HTTP surface on {}", args.admin_bind))?;
    info!("admin HTTP surface listening on {}", args.admin_bind);

    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, admin_server.router())
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt, shutting down");
        }
        result = verifier_task => {
            if let Err(e) = result {
                error!("sent offers verifier task panicked: {e}");
            }
        }
    }

    verifier_stop.cancel();
    shutdown.cancel();
    match server_task.await {
        Ok(Err(e)) => error!("admin server task exited with error: {e}"),
        Err(e) => error!("admin server task panicked: {e}"),
        Ok(Ok(())) => {}
    }

    Ok(())
}
