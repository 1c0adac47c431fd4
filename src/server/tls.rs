// TLS Listener (C7, spec §4.7): binds loopback :443, serves the given
// cert/key pair over TLS 1.2+, and drains in-flight connections on
// SIGINT/SIGTERM before terminating.

use crate::error::{ProxyError, Result};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use rustls_pemfile::{certs, private_key};
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

/// The `TlsMaterial` collaborator (spec §1): a cert/key pair in PEM form,
/// handed to the listener at startup. Certificate generation and OS
/// keychain registration are out of scope — the caller supplies files.
pub struct TlsMaterial {
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

impl TlsMaterial {
    pub fn from_files(cert_path: &str, key_path: &str) -> Result<Self> {
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;
        Ok(Self { cert_pem, key_pem })
    }
}

fn build_server_config(material: &TlsMaterial) -> Result<rustls::ServerConfig> {
    let cert_chain = certs(&mut BufReader::new(material.cert_pem.as_slice()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ProxyError::Config(format!("invalid TLS certificate: {e}")))?;

    let key = private_key(&mut BufReader::new(material.key_pem.as_slice()))
        .map_err(|e| ProxyError::Config(format!("invalid TLS private key: {e}")))?
        .ok_or_else(|| ProxyError::Config("no private key found in key file".to_string()))?;

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| ProxyError::Config(format!("invalid TLS certificate/key pair: {e}")))
}

/// Bind and serve `app` over TLS at `addr`. Pre-flight-binds a plain TCP
/// socket first so the common failure modes get the descriptive messages
/// spec §4.7 calls for, rather than whatever generic error axum-server's
/// acceptor loop would otherwise surface.
pub async fn serve(addr: SocketAddr, material: TlsMaterial, app: Router) -> Result<()> {
    match std::net::TcpListener::bind(addr) {
        Ok(probe) => drop(probe),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ProxyError::Config(format!("cannot bind {addr}: port requires root")));
        }
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            return Err(ProxyError::Config(format!("cannot bind {addr}: already running")));
        }
        Err(e) => return Err(ProxyError::Io(e)),
    }

    let server_config = build_server_config(&material)?;
    let tls_config = RustlsConfig::from_config(Arc::new(server_config));

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("received shutdown signal, draining in-flight connections");
        shutdown_handle.graceful_shutdown(Some(Duration::from_secs(30)));
    });

    info!(%addr, "TLS listener bound");
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(ProxyError::Io)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
