//! WebSocket transport: the wire format a [`crate::session::LocalSession`]
//! actually gets driven over in this deployment. JSON-encoded `ClientMsg`
//! frames in, JSON-encoded `ServerMsg` frames out — one WebSocket text frame
//! per message, no further framing needed since `tokio-tungstenite` already
//! delimits frames for us.
//!
//! Grounded in the teacher's `network::Gateway` accept-loop-per-listener
//! shape, narrowed to the one transport this binary drives directly (the
//! long-poll/gRPC session protocols spec.md §4.3 allows are a Non-goal here
//! the way the teacher's Non-goals narrow to one accepted wire format).

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wire_proto::client::{ClientMsg, ServerMsg};

use crate::cluster::Cluster;
use crate::config::{LimitsConfig, WebSocketConfig};
use crate::db::Database;
use crate::hub::Hub;
use crate::session::auth::{AuthRegistry, TokenAuth};
use crate::session::{LocalSession, Protocol, SessionStore};

#[allow(clippy::too_many_arguments)]
pub async fn serve(
    config: WebSocketConfig,
    hub: Arc<Hub>,
    db: Database,
    cluster: Arc<Cluster>,
    auth: Arc<AuthRegistry>,
    token_auth: Arc<TokenAuth>,
    limits: LimitsConfig,
    uid_key: u64,
    sessions: Arc<SessionStore>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(config.address).await?;
    info!(addr = %config.address, "websocket listener bound");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let hub = hub.clone();
        let db = db.clone();
        let cluster = cluster.clone();
        let auth = auth.clone();
        let token_auth = token_auth.clone();
        let limits = limits.clone();
        let sessions = sessions.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_conn(stream, peer_addr, hub, db, cluster, auth, token_auth, limits, uid_key, sessions).await {
                debug!(peer = %peer_addr, error = %e, "websocket connection ended");
            }
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_conn(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Arc<Hub>,
    db: Database,
    cluster: Arc<Cluster>,
    auth: Arc<AuthRegistry>,
    token_auth: Arc<TokenAuth>,
    limits: LimitsConfig,
    uid_key: u64,
    sessions: Arc<SessionStore>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws.split();

    let sid = Uuid::new_v4().to_string();
    let (mut handle, mut outbound_rx) = LocalSession::spawn(
        sid.clone(),
        Protocol::WebSocket,
        peer_addr.to_string(),
        hub,
        db,
        cluster,
        auth,
        token_auth,
        limits,
        uid_key,
        sessions.clone(),
    );

    let writer = async {
        while let Some(srv_msg) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&srv_msg) else { continue };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    };

    let reader = async {
        while let Some(frame) = ws_rx.next().await {
            let frame = match frame {
                Ok(f) => f,
                Err(_) => break,
            };
            match frame {
                Message::Text(text) => match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => {
                        if handle.inbound_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(sid = %sid, error = %e, "malformed client frame, dropped"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    handle.stop();
    sessions.remove(&sid);
    Ok(())
}
