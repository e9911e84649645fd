use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use hyper_tungstenite::tungstenite::Message;
use log::{error, info, warn};
use tokio::sync::mpsc;

mod config;
#[cfg(feature = "postgres")]
mod db;
mod error;
mod geo;
mod handler;
mod protocol;
mod state;

use config::Config;
use protocol::PresenceMessage;
use state::AppState;

pub type UserId = i64;
pub type ConnId = String;
pub type RoomId = String;
pub type WebSocketSender = mpsc::UnboundedSender<Message>;
pub type SharedState = Arc<AppState>;

// ============================================
// WebSocket Connection Handler
// ============================================

async fn handle_connection(
    ws: hyper_tungstenite::WebSocketStream<hyper::upgrade::Upgraded>,
    state: SharedState,
) {
    let conn_id: ConnId = uuid::Uuid::new_v4().to_string();
    info!("WebSocket connection {} established", conn_id);

    let (mut ws_sender, mut ws_receiver) = ws.split();

    // Create channel for sending messages to this WebSocket
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Spawn task to forward messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    handler::handle_connect(&conn_id, &state, &tx).await;

    // Events from one connection are handled here in receipt order;
    // different connections interleave freely.
    loop {
        tokio::select! {
            msg_result = ws_receiver.next() => {
                match msg_result {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<PresenceMessage>(&text) {
                            Ok(msg) => {
                                if let Err(e) = handler::handle_message(msg, &conn_id, &state, &tx).await {
                                    warn!("error handling event on {}: {}", conn_id, e);
                                    let error_msg = PresenceMessage::Error {
                                        message: e.to_string(),
                                    };
                                    if let Ok(json) = serde_json::to_string(&error_msg) {
                                        let _ = tx.send(Message::Text(json));
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("failed to parse event on {}: {}", conn_id, e);
                                let error_msg = PresenceMessage::Error {
                                    message: format!("Invalid message format: {}", e),
                                };
                                if let Ok(json) = serde_json::to_string(&error_msg) {
                                    let _ = tx.send(Message::Text(json));
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("connection {} closed by client", conn_id);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error on {}: {}", conn_id, e);
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut send_task => {
                break;
            }
        }
    }

    handler::handle_disconnect(&conn_id, &state).await;
    send_task.abort();
}

// ============================================
// Main Request Handler
// ============================================

async fn handle_request(
    mut req: Request<Body>,
    state: SharedState,
) -> Result<Response<Body>, hyper::Error> {
    let path = req.uri().path();
    let method = req.method().clone();

    // CORS preflight (needed for browser fetch from web clients)
    if method == Method::OPTIONS {
        return Ok(Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .header("Access-Control-Max-Age", "86400")
            .body(Body::empty())
            .unwrap());
    }

    // Health check endpoint
    if path == "/health" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .body(Body::from("ok"))
            .unwrap());
    }

    // WebSocket upgrade
    if hyper_tungstenite::is_upgrade_request(&req) {
        match hyper_tungstenite::upgrade(&mut req, None) {
            Ok((response, websocket)) => {
                tokio::spawn(async move {
                    if let Ok(ws) = websocket.await {
                        handle_connection(ws, state).await;
                    }
                });
                return Ok(response);
            }
            Err(e) => {
                error!("WebSocket upgrade error: {}", e);
                return Ok(Response::builder()
                    .status(StatusCode::BAD_REQUEST)
                    .body(Body::from("Invalid WebSocket upgrade request"))
                    .unwrap());
            }
        }
    }

    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(Body::from(
            "Not found. Use /health for health check or upgrade to WebSocket.",
        ))
        .unwrap())
}

// ============================================
// Main Entry Point
// ============================================

#[tokio::main]
async fn main() {
    // Healthcheck mode: exit 0 if server is running (port in use), exit 1 if not
    if std::env::args().any(|a| a == "--healthcheck") {
        use std::net::TcpListener;
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(_) => std::process::exit(1),  // Port free = server NOT running
            Err(_) => std::process::exit(0), // Port in use = server IS running (healthy)
        }
    }

    env_logger::init();

    let config = Config::load();
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    let state: SharedState = Arc::new(AppState::new(config));

    // Optional Postgres durability
    #[cfg(feature = "postgres")]
    {
        if let Some(db_url) = state.config.database_url.clone() {
            match db::connect(&db_url).await {
                Ok(pool) => {
                    if let Err(e) = db::init_db(&pool).await {
                        warn!("database init failed; continuing without durability: {}", e);
                    } else {
                        state.backends.lock().await.db = Some(pool);
                        info!("Postgres enabled (DATABASE_URL set).");
                    }
                }
                Err(e) => {
                    warn!("failed to connect to Postgres; continuing without durability: {}", e)
                }
            }
        } else {
            info!("Postgres disabled (DATABASE_URL not set).");
        }
    }

    let make_svc = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let state = state.clone();
                handle_request(req, state)
            }))
        }
    });

    let server = Server::bind(&addr).serve(make_svc);

    info!("Presence server listening on http://{}", addr);
    info!("WebSocket endpoint: ws://{}", addr);
    info!("Health check: http://{}/health", addr);

    if let Err(e) = server.await {
        error!("Server error: {}", e);
    }
}
