//! Connection broker
//!
//! Owns the QUIC endpoint and the full connection lifecycle: accept,
//! authenticate on the first frame, run the per-connection reader and
//! writer tasks, and tear the session down exactly once on disconnect.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use quinn::Endpoint;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthProvider, Identity};
use crate::error::{HubError, Result};
use crate::protocol::events::{
    ClientEvent, ErrorPayload, OfflinePayload, OnlinePayload, ReadyPayload, ServerEvent,
};
use crate::protocol::frame::FrameCodec;
use crate::server::presence::PresenceStore;
use crate::server::registry::RoomRegistry;
use crate::server::router::EventRouter;
use crate::server::session::Session;
use crate::store::Store;
use crate::ConnectionId;

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Connection idle timeout
    pub idle_timeout: Duration,
    /// How long a new connection may take to present credentials
    pub auth_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4433".parse().unwrap(),
            max_connections: 10_000,
            idle_timeout: Duration::from_secs(300),
            auth_timeout: Duration::from_secs(10),
        }
    }
}

/// The messaging hub's connection broker
pub struct Broker {
    config: BrokerConfig,
    store: Arc<dyn Store>,
    auth: Arc<dyn AuthProvider>,
    registry: Arc<RoomRegistry>,
    presence: Arc<PresenceStore>,
    router: EventRouter,
    sessions: RwLock<HashMap<ConnectionId, Arc<Session>>>,
}

impl Broker {
    /// Create a broker over the given store and auth provider
    pub fn new(config: BrokerConfig, store: Arc<dyn Store>, auth: Arc<dyn AuthProvider>) -> Self {
        let registry = Arc::new(RoomRegistry::new());
        let router = EventRouter::new(Arc::clone(&store), Arc::clone(&registry));

        Self {
            config,
            store,
            auth,
            registry,
            presence: Arc::new(PresenceStore::new()),
            router,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Get the room registry
    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.registry)
    }

    /// Get the presence store
    pub fn presence(&self) -> Arc<PresenceStore> {
        Arc::clone(&self.presence)
    }

    /// Get the domain store
    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Bind the endpoint and serve connections until the endpoint closes
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let endpoint = self.build_endpoint()?;
        info!("Broker listening on {}", endpoint.local_addr()?);

        loop {
            match endpoint.accept().await {
                Some(incoming) => {
                    if self.session_count().await >= self.config.max_connections {
                        warn!("Connection limit reached, refusing connection");
                        incoming.refuse();
                        continue;
                    }

                    let broker = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = broker.handle_incoming(incoming).await {
                            error!("Connection handling failed: {}", e);
                        }
                    });
                }
                None => {
                    warn!("Endpoint stopped accepting connections");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Build the QUIC endpoint with a self-signed development certificate
    fn build_endpoint(&self) -> Result<Endpoint> {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".into()])
                .map_err(|e| HubError::config(format!("Failed to generate certificate: {}", e)))?;

        let cert_der = CertificateDer::from(cert);
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

        let mut server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der)
            .map_err(|e| HubError::config(format!("Failed to configure TLS: {}", e)))?;

        server_config.alpn_protocols = vec![b"huddle".to_vec()];
        server_config.max_early_data_size = 0;

        let mut transport_config = quinn::TransportConfig::default();
        // One bidirectional control stream per connection; allow slack for
        // stream restarts
        transport_config.max_concurrent_bidi_streams(4u32.into());
        transport_config.max_concurrent_uni_streams(0u32.into());
        transport_config.max_idle_timeout(Some(
            self.config
                .idle_timeout
                .try_into()
                .map_err(|_| HubError::config("idle timeout out of range"))?,
        ));

        let mut quic_server_config = quinn::ServerConfig::with_crypto(Arc::new(
            quinn::crypto::rustls::QuicServerConfig::try_from(server_config)
                .map_err(|e| HubError::config(format!("Failed to create QUIC config: {}", e)))?,
        ));
        quic_server_config.transport_config(Arc::new(transport_config));

        Ok(Endpoint::server(quic_server_config, self.config.bind_addr)?)
    }

    /// Handle one incoming connection end to end
    async fn handle_incoming(self: Arc<Self>, incoming: quinn::Incoming) -> Result<()> {
        let connection = incoming.await?;
        let remote_addr = connection.remote_address();
        debug!("New connection from {}", remote_addr);

        let (mut send, mut recv) = connection.accept_bi().await?;
        let mut codec = FrameCodec::new();

        // The first frame must carry credentials; anything else closes the
        // connection before a session exists
        let identity = match self.authenticate(&mut recv, &mut codec).await {
            Ok(identity) => identity,
            Err(err) => {
                warn!("Authentication failed for {}: {}", remote_addr, err);
                let reply = ServerEvent::AuthError(ErrorPayload::from(err)).encode()?;
                let _ = send.write_all(&reply).await;
                connection.close(1u32.into(), b"authentication failed");
                return Ok(());
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let session = Arc::new(Session::new(
            identity.user_id.clone(),
            identity.username.clone(),
            tx,
        ));
        info!(
            conn_id = %session.conn_id,
            user_id = %session.user_id,
            username = %session.username,
            "session established"
        );

        session.send(&ServerEvent::Ready(ReadyPayload {
            user_id: identity.user_id,
            username: identity.username,
        }))?;

        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.conn_id.clone(), Arc::clone(&session));
        }

        if self.presence.connect(&session.user_id, &session.username).await {
            let result = self
                .broadcast_all(
                    &ServerEvent::UserOnline(OnlinePayload {
                        user_id: session.user_id.clone(),
                        username: session.username.clone(),
                        is_online: true,
                    }),
                    Some(&session.conn_id),
                )
                .await;
            if let Err(e) = result {
                warn!("Failed to broadcast online presence: {}", e);
            }
        }

        // Writer task: drains the outbound queue onto the stream. The queue
        // is unbounded, so broadcasters never wait on this peer.
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Err(e) = send.write_all(&frame).await {
                    debug!("Writer stopping: {}", e);
                    break;
                }
            }
        });

        // Inbound loop: events from one connection are handled one at a
        // time, in arrival order
        let mut buf = vec![0u8; 8192];
        loop {
            match codec.decode_next() {
                Ok(Some(body)) => {
                    self.dispatch_frame(&session, &body).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(conn_id = %session.conn_id, "framing error, closing: {}", e);
                    break;
                }
            }

            match recv.read(&mut buf).await {
                Ok(Some(n)) => codec.feed(&buf[..n]),
                Ok(None) => {
                    debug!(conn_id = %session.conn_id, "stream finished");
                    break;
                }
                Err(e) => {
                    debug!(conn_id = %session.conn_id, "read ended: {}", e);
                    break;
                }
            }
        }

        self.close_session(&session).await;
        writer.abort();
        Ok(())
    }

    /// Decode and dispatch one inbound frame body
    ///
    /// A payload that fails to decode is answered with the per-event error
    /// matching its declared type (a truncated `send_message` still gets a
    /// `message_error`); frames with no declared type or no error
    /// counterpart are dropped.
    async fn dispatch_frame(&self, session: &Arc<Session>, body: &[u8]) {
        match ClientEvent::decode(body) {
            Ok(event) => {
                debug!(conn_id = %session.conn_id, event = event.name(), "event received");
                if let Err(e) = self.router.handle(session, event).await {
                    warn!(conn_id = %session.conn_id, "event handling failed: {}", e);
                }
            }
            Err(err) => {
                warn!(conn_id = %session.conn_id, "malformed event: {}", err);
                let reply = ClientEvent::peek_name(body)
                    .and_then(|name| ServerEvent::error_for(&name, err));
                if let Some(reply) = reply {
                    let _ = session.send(&reply);
                }
            }
        }
    }

    /// Read and verify the credentials frame
    async fn authenticate(
        &self,
        recv: &mut quinn::RecvStream,
        codec: &mut FrameCodec,
    ) -> Result<Identity> {
        let body = timeout(self.config.auth_timeout, read_frame(recv, codec))
            .await
            .map_err(|_| HubError::auth("authentication timed out"))??
            .ok_or_else(|| HubError::auth("connection closed before authentication"))?;

        match ClientEvent::decode(&body)? {
            ClientEvent::Authenticate(payload) => self.auth.authenticate(&payload.token).await,
            other => Err(HubError::auth(format!(
                "expected authenticate, got {}",
                other.name()
            ))),
        }
    }

    /// Tear down a session
    ///
    /// Guarded by the session's close flag: concurrent disconnect signals
    /// run this once. Room and presence cleanup go through the registry and
    /// presence store respectively, never through per-session bookkeeping.
    pub async fn close_session(&self, session: &Arc<Session>) {
        if !session.begin_close() {
            return;
        }

        {
            let mut sessions = self.sessions.write().await;
            sessions.remove(&session.conn_id);
        }

        let left = self.registry.leave_all(&session.conn_id).await;
        debug!(
            conn_id = %session.conn_id,
            rooms = left.len(),
            "session closed"
        );

        if let Some(last_seen) = self.presence.disconnect(&session.user_id).await {
            let result = self
                .broadcast_all(
                    &ServerEvent::UserOffline(OfflinePayload {
                        user_id: session.user_id.clone(),
                        username: session.username.clone(),
                        is_online: false,
                        last_seen,
                    }),
                    None,
                )
                .await;
            if let Err(e) = result {
                warn!("Failed to broadcast offline presence: {}", e);
            }
        }
    }

    /// Send an event to every live session, encoding it once
    pub async fn broadcast_all(
        &self,
        event: &ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> Result<usize> {
        let frame = event.encode()?;
        let sessions = self.sessions.read().await;
        let mut delivered = 0;

        for (conn_id, session) in sessions.iter() {
            if exclude == Some(conn_id) {
                continue;
            }
            if session.send_frame(frame.clone()).is_ok() {
                delivered += 1;
            }
        }

        Ok(delivered)
    }
}

/// Read from the stream until one complete frame body is available
async fn read_frame(
    recv: &mut quinn::RecvStream,
    codec: &mut FrameCodec,
) -> Result<Option<Bytes>> {
    let mut buf = vec![0u8; 8192];
    loop {
        if let Some(body) = codec.decode_next()? {
            return Ok(Some(body));
        }
        match recv.read(&mut buf).await? {
            Some(n) => codec.feed(&buf[..n]),
            None => return Ok(None),
        }
    }
}
