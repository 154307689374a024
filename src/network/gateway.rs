//! Gateway - TCP/TLS listener that accepts incoming connections.
//!
//! The Gateway binds to sockets, completes the WebSocket handshake
//! (extracting `user_id` from the query string), and spawns a Connection
//! task for each client. Supports both plaintext and TLS connections.

use crate::config::{LimitsConfig, TlsConfig};
use crate::db::Database;
use crate::dispatch::MessageDispatcher;
use crate::network::Connection;
use crate::router::EventRouter;
use crate::state::ConnectionRegistry;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::{BufReader, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_tungstenite::accept_hdr_async;
use tracing::{error, info, instrument, warn};

/// The Gateway accepts incoming TCP/TLS connections and spawns handlers.
pub struct Gateway {
    plaintext_listener: TcpListener,
    tls_listener: Option<(TcpListener, TlsAcceptor)>,
    registry: Arc<ConnectionRegistry>,
    router: EventRouter,
    dispatcher: MessageDispatcher,
    db: Database,
    limits: LimitsConfig,
}

impl Gateway {
    /// Bind the gateway to the specified addresses.
    pub async fn bind(
        addr: SocketAddr,
        tls_config: Option<TlsConfig>,
        registry: Arc<ConnectionRegistry>,
        router: EventRouter,
        dispatcher: MessageDispatcher,
        db: Database,
        limits: LimitsConfig,
    ) -> anyhow::Result<Self> {
        let plaintext_listener = TcpListener::bind(addr).await?;
        info!(%addr, "Plaintext listener bound");

        let tls_listener = if let Some(tls_cfg) = tls_config {
            let tls_acceptor = Self::load_tls(&tls_cfg)?;
            let listener = TcpListener::bind(tls_cfg.address).await?;
            info!(address = %tls_cfg.address, "TLS listener bound");
            Some((listener, tls_acceptor))
        } else {
            None
        };

        Ok(Self {
            plaintext_listener,
            tls_listener,
            registry,
            router,
            dispatcher,
            db,
            limits,
        })
    }

    /// Local address of the plaintext listener (for tests binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.plaintext_listener.local_addr()
    }

    /// Load TLS certificates and create TlsAcceptor.
    fn load_tls(config: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
        // Load certificates
        let cert_file = std::fs::read(&config.cert_path)?;
        let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
        let certs: Vec<CertificateDer> = certs(cert_reader).collect::<Result<Vec<_>, _>>()?;

        if certs.is_empty() {
            anyhow::bail!("No certificates found in {}", config.cert_path);
        }

        // Load private key
        let key_file = std::fs::read(&config.key_path)?;
        let key_reader = &mut BufReader::new(Cursor::new(key_file));
        let mut keys: Vec<PrivateKeyDer> = pkcs8_private_keys(key_reader)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(PrivateKeyDer::from)
            .collect();

        if keys.is_empty() {
            anyhow::bail!("No private keys found in {}", config.key_path);
        }

        let key = keys.remove(0);

        // Build TLS server config
        let tls_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        // If TLS is configured, spawn a separate task for the TLS listener
        if let Some((tls_listener, tls_acceptor)) = self.tls_listener {
            let registry = Arc::clone(&self.registry);
            let router = self.router.clone();
            let dispatcher = self.dispatcher.clone();
            let db = self.db.clone();
            let limits = self.limits.clone();

            tokio::spawn(async move {
                loop {
                    match tls_listener.accept().await {
                        Ok((stream, addr)) => {
                            info!(%addr, "TLS connection accepted");

                            let registry = Arc::clone(&registry);
                            let router = router.clone();
                            let dispatcher = dispatcher.clone();
                            let db = db.clone();
                            let limits = limits.clone();
                            let acceptor = tls_acceptor.clone();

                            tokio::spawn(async move {
                                let tls_stream = match acceptor.accept(stream).await {
                                    Ok(tls_stream) => tls_stream,
                                    Err(e) => {
                                        warn!(%addr, error = %e, "TLS handshake failed");
                                        return;
                                    }
                                };

                                let mut user_id = None;
                                let ws = match accept_hdr_async(tls_stream, |req: &http::Request<()>, resp| {
                                    user_id = user_id_from_query(req.uri().query());
                                    Ok(resp)
                                })
                                .await
                                {
                                    Ok(ws) => ws,
                                    Err(e) => {
                                        warn!(%addr, error = %e, "WebSocket handshake failed");
                                        return;
                                    }
                                };

                                let connection = Connection::new(
                                    user_id, addr, registry, router, dispatcher, db, limits,
                                );
                                if let Err(e) = connection.run(ws).await {
                                    error!(%addr, error = %e, "TLS connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept TLS connection");
                        }
                    }
                }
            });
        }

        // Main plaintext listener loop
        loop {
            match self.plaintext_listener.accept().await {
                Ok((stream, addr)) => {
                    info!(%addr, "Connection accepted");

                    let registry = Arc::clone(&self.registry);
                    let router = self.router.clone();
                    let dispatcher = self.dispatcher.clone();
                    let db = self.db.clone();
                    let limits = self.limits.clone();

                    tokio::spawn(async move {
                        let mut user_id = None;
                        let ws = match accept_hdr_async(stream, |req: &http::Request<()>, resp| {
                            user_id = user_id_from_query(req.uri().query());
                            Ok(resp)
                        })
                        .await
                        {
                            Ok(ws) => ws,
                            Err(e) => {
                                warn!(%addr, error = %e, "WebSocket handshake failed");
                                return;
                            }
                        };

                        let connection =
                            Connection::new(user_id, addr, registry, router, dispatcher, db, limits);
                        if let Err(e) = connection.run(ws).await {
                            error!(%addr, error = %e, "Connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Extract `user_id` from a raw query string.
fn user_id_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == "user_id" && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}
