//! # WebSocket Gateway
//!
//! Long-lived per-agent connections. On connect the server replays
//! unacknowledged messages from the agent's durable stream subjects, then
//! pushes live frames as routing delivers them. Clients acknowledge
//! processed offsets; unacked messages are replayed on the next connect.
//!
//! ## Frames
//!
//! Server -> client: `{"type":"envelope", "subject"?, "offset"?, "envelope"}`
//! (subject/offset present on stream-replayed frames).
//! Client -> server: `{"type":"ack", "subject", "offset"}`.

use crate::state::AppState;
use ainp_bus::{Category, Subject};
use ainp_types::{Did, Envelope};
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// Messages replayed per subject on connect.
const RESUME_BATCH: usize = 500;

/// Delivery categories a connected agent resumes from.
const RESUME_CATEGORIES: [Category; 4] = [
    Category::Intents,
    Category::Results,
    Category::Negotiations,
    Category::DiscoverResults,
];

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    did: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Ack { subject: String, offset: u64 },
}

/// `GET /ws?did=...` upgrade handler. A missing or malformed DID closes
/// the socket with policy code 1008 after the handshake.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let did = params.did.and_then(|raw| Did::parse(raw).ok());
    ws.on_upgrade(move |socket| async move {
        match did {
            Some(did) => handle_socket(state, socket, did).await,
            None => reject_socket(socket).await,
        }
    })
}

async fn reject_socket(mut socket: WebSocket) {
    warn!("Socket rejected: missing DID");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "did query parameter required".into(),
        })))
        .await;
}

async fn handle_socket(state: AppState, mut socket: WebSocket, did: Did) {
    info!(agent = %did, "Socket session starting");
    let mut outbound = state.sockets.connect(&did);
    state.discovery.touch(&did);

    // reconnect-resume: replay everything past the durable cursors
    for category in RESUME_CATEGORIES {
        let subject = Subject::for_agent(category, &did);
        for message in state.bus.fetch(&subject, did.as_str(), RESUME_BATCH) {
            let frame = json!({
                "type": "envelope",
                "subject": message.subject,
                "offset": message.offset,
                "envelope": message.envelope,
            });
            if send_json(&mut socket, &frame).await.is_err() {
                state.sockets.disconnect(&did);
                return;
            }
        }
    }

    loop {
        tokio::select! {
            pushed = outbound.recv() => {
                let Some(envelope) = pushed else {
                    // a newer socket for the same agent took over
                    break;
                };
                let frame = live_frame(&envelope);
                if send_json(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Ack { subject, offset }) => {
                                state.bus.ack(&Subject::from_raw(subject), did.as_str(), offset);
                            }
                            Err(err) => {
                                debug!(agent = %did, error = %err, "Unparseable client frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        debug!(agent = %did, error = %err, "Socket read error");
                        break;
                    }
                }
            }
        }
    }

    state.sockets.disconnect(&did);
    info!(agent = %did, "Socket session ended");
}

fn live_frame(envelope: &Envelope) -> serde_json::Value {
    json!({
        "type": "envelope",
        "envelope": envelope,
    })
}

async fn send_json(socket: &mut WebSocket, frame: &serde_json::Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(frame.to_string())).await
}
