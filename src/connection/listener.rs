//! Listener Module
//!
//! Accepts client connections on a plain TCP or a TLS socket and spawns one
//! [`ConnectionHandler`](super::ConnectionHandler) task per client. Both
//! listeners share the same storage engine and statistics.
//!
//! The TLS handshake runs inside the per-connection task so a slow client
//! never stalls the accept loop.

use super::handler::{handle_connection, ConnectionStats};
use crate::commands::CommandHandler;
use crate::storage::StorageEngine;
use std::fs::File;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ServerConfig};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

/// Errors that can occur while setting up a listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Binding the socket or reading a PEM file failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// rustls rejected the certificate or key
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),
}

/// A bound listening socket.
pub enum Listener {
    /// Plain TCP
    Plain(TcpListener),
    /// TCP wrapped in TLS
    Tls {
        listener: TcpListener,
        acceptor: TlsAcceptor,
    },
}

impl Listener {
    /// Binds a plain TCP listener.
    pub async fn bind_plain(addr: &str) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Listener::Plain(listener))
    }

    /// Binds a TLS listener using a PEM certificate chain and private key.
    pub async fn bind_tls(
        addr: &str,
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<Self, ListenerError> {
        let config = load_tls_config(cert_path, key_path)?;
        let listener = TcpListener::bind(addr).await?;
        Ok(Listener::Tls {
            listener,
            acceptor: TlsAcceptor::from(config),
        })
    }

    /// Returns the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().local_addr()
    }

    /// Short name of the transport, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Listener::Plain(_) => "tcp",
            Listener::Tls { .. } => "tls",
        }
    }

    fn tcp(&self) -> &TcpListener {
        match self {
            Listener::Plain(listener) => listener,
            Listener::Tls { listener, .. } => listener,
        }
    }

    /// Spawns the handler task for one accepted socket.
    fn spawn_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) {
        match self {
            Listener::Plain(_) => {
                tokio::spawn(handle_connection(stream, addr, handler, stats));
            }
            Listener::Tls { acceptor, .. } => {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    match acceptor.accept(stream).await {
                        Ok(tls_stream) => {
                            handle_connection(tls_stream, addr, handler, stats).await
                        }
                        Err(e) => warn!(client = %addr, error = %e, "TLS handshake failed"),
                    }
                });
            }
        }
    }
}

/// Builds a rustls server configuration from PEM files.
pub fn load_tls_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<Arc<ServerConfig>, ListenerError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(Arc::new(config))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ListenerError> {
    let mut reader = BufReader::new(File::open(path)?);
    let certs = rustls_pemfile::certs(&mut reader).collect::<Result<Vec<_>, _>>()?;

    if certs.is_empty() {
        return Err(ListenerError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ListenerError> {
    let mut reader = BufReader::new(File::open(path)?);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| ListenerError::NoPrivateKey(path.to_path_buf()))
}

/// Accepts connections until `shutdown` turns true or its sender is dropped.
///
/// Accept errors are logged and the loop keeps going.
pub async fn serve(
    listener: Listener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let kind = listener.kind();
    match listener.local_addr() {
        Ok(addr) => info!(listener = kind, %addr, "Accepting connections"),
        Err(e) => warn!(listener = kind, error = %e, "Could not read local address"),
    }

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        tokio::select! {
            accepted = listener.tcp().accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        debug!(listener = kind, client = %addr, "Accepted connection");
                        let handler = CommandHandler::new(Arc::clone(&storage));
                        listener.spawn_connection(stream, addr, handler, Arc::clone(&stats));
                    }
                    Err(e) => {
                        error!(listener = kind, error = %e, "Failed to accept connection");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(listener = kind, "Listener stopped");
}
