//! Web server (single port): chat page, health probe, and the per-session WebSocket.

use crate::assistants::AssistantGateway;
use crate::config::{self, Config};
use crate::session::{SessionController, SessionSettings};
use crate::web::protocol::{
    event_frame, CreateAssistantParams, LoadAssistantParams, SendMessageParams, UpdateModelParams,
    UploadFileParams, WsRequest, WsResponse,
};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{Html, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const PROTOCOL_VERSION: u32 = 1;

const SHUTDOWN_EVENT_JSON: &str = r#"{"type":"event","event":"shutdown","payload":{}}"#;

static INDEX_HTML: &str = include_str!("../../assets/index.html");

/// Shared state for the server. Only the gateway client is shared between sessions.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub gateway: Arc<dyn AssistantGateway>,
    pub settings: SessionSettings,
    /// Broadcasts events to every open session (e.g. shutdown).
    pub event_tx: broadcast::Sender<String>,
}

impl ServerState {
    pub fn new(config: Config, gateway: Arc<dyn AssistantGateway>) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            settings: SessionSettings::from_config(&config),
            config: Arc::new(config),
            gateway,
            event_tx,
        }
    }
}

/// Routes: `/` page, `/health` probe, `/ws` session socket.
pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_http))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Run the server on config.server.bind:config.server.port until Ctrl+C / SIGTERM.
pub async fn run_server(config: Config, gateway: Arc<dyn AssistantGateway>) -> Result<()> {
    let bind = config.server.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "binding to {} exposes the chat page (and the provider key behind it) without authentication",
            bind
        );
    }
    let bind_addr = format!("{}:{}", bind, config.server.port);
    let state = ServerState::new(config, gateway);
    let event_tx = state.event_tx.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(event_tx))
        .await
        .context("server exited")?;
    log::info!("server stopped");
    Ok(())
}

/// Completes on SIGINT or SIGTERM, after telling open sessions to close.
async fn shutdown_signal(event_tx: broadcast::Sender<String>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("installing Ctrl+C handler failed: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("installing SIGTERM handler failed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, closing sessions");
    let _ = event_tx.send(SHUTDOWN_EVENT_JSON.to_string());
}

/// GET / serves the chat page.
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /health returns a simple health JSON (for probes).
async fn health_http(State(state): State<ServerState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "protocol": PROTOCOL_VERSION,
        "port": state.config.server.port,
    }))
}

/// GET /ws upgrades to the session WebSocket.
async fn ws_handler(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

type Outbox = mpsc::UnboundedSender<String>;

/// One browser session: a fresh controller, requests handled in order, a writer task draining the
/// outbox so render frames can be pushed while an action is still running.
async fn handle_socket(socket: WebSocket, state: ServerState) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut controller = SessionController::new(state.gateway.clone(), state.settings.clone());
    let mut event_rx = state.event_tx.subscribe();
    log::info!("{}: session opened", controller.id());
    send_snapshot(&out_tx, &controller);

    loop {
        tokio::select! {
            biased;

            event = event_rx.recv() => {
                match event {
                    Ok(text) => {
                        let is_shutdown = text == SHUTDOWN_EVENT_JSON;
                        let _ = out_tx.send(text);
                        if is_shutdown {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("ws client lagged {} broadcast messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = stream.next() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let req: WsRequest = match serde_json::from_str(&text) {
                    Ok(r) => r,
                    Err(e) => {
                        log::debug!("{}: ignoring malformed frame: {}", controller.id(), e);
                        continue;
                    }
                };
                let res = dispatch(&mut controller, &req, &out_tx).await;
                if let Some(ref err) = res.error {
                    log::warn!("{}: {} failed: {}", controller.id(), req.method, err);
                }
                let _ = out_tx.send(serde_json::to_string(&res).unwrap_or_default());
                send_snapshot(&out_tx, &controller);
            }
        }
    }

    log::info!("{}: session closed", controller.id());
    drop(out_tx);
    let _ = writer.await;
}

fn send_snapshot(out: &Outbox, controller: &SessionController) {
    let payload = serde_json::to_value(controller.snapshot()).unwrap_or_default();
    let _ = out.send(event_frame("session.state", payload));
}

fn parse_params<T: DeserializeOwned>(req: &WsRequest) -> Result<T, WsResponse> {
    serde_json::from_value(req.params.clone())
        .map_err(|e| WsResponse::err(&req.id, format!("invalid params: {}", e)))
}

/// Map one request onto a controller action.
async fn dispatch(controller: &mut SessionController, req: &WsRequest, out: &Outbox) -> WsResponse {
    match req.method.as_str() {
        "session.state" => {
            WsResponse::ok(&req.id, serde_json::to_value(controller.snapshot()).unwrap_or_default())
        }
        "assistant.load" => {
            let params: LoadAssistantParams = match parse_params(req) {
                Ok(p) => p,
                Err(res) => return res,
            };
            match controller.load_assistant(&params.assistant_id).await {
                Ok(()) => WsResponse::ok(&req.id, json!({})),
                Err(e) => WsResponse::err(&req.id, e.to_string()),
            }
        }
        "assistant.create" => {
            let params: CreateAssistantParams = match parse_params(req) {
                Ok(p) => p,
                Err(res) => return res,
            };
            match controller.create_assistant(&params.instructions).await {
                Ok(()) => WsResponse::ok(&req.id, json!({})),
                Err(e) => WsResponse::err(&req.id, e.to_string()),
            }
        }
        "assistant.updateModel" => {
            let params: UpdateModelParams = match parse_params(req) {
                Ok(p) => p,
                Err(res) => return res,
            };
            match controller.update_model(&params.model).await {
                Ok(notice) => WsResponse::ok(&req.id, json!({ "notice": notice })),
                Err(e) => WsResponse::err(&req.id, e.to_string()),
            }
        }
        "file.upload" => {
            let params: UploadFileParams = match parse_params(req) {
                Ok(p) => p,
                Err(res) => return res,
            };
            let bytes = match base64::Engine::decode(
                &base64::engine::general_purpose::STANDARD,
                params.data.as_bytes(),
            ) {
                Ok(b) => b,
                Err(_) => return WsResponse::err(&req.id, "invalid file data encoding"),
            };
            match controller.upload_file(&params.file_name, &bytes).await {
                Ok(outcome) => WsResponse::ok(
                    &req.id,
                    json!({ "notice": outcome.notice(&params.file_name) }),
                ),
                Err(e) => WsResponse::err(&req.id, e.to_string()),
            }
        }
        "chat.send" => {
            let params: SendMessageParams = match parse_params(req) {
                Ok(p) => p,
                Err(res) => return res,
            };
            let request_id = req.id.clone();
            let frames = out.clone();
            let mut on_frame = move |text: &str| {
                let _ = frames.send(event_frame(
                    "chat.render",
                    json!({ "requestId": request_id, "text": text }),
                ));
            };
            match controller.send_message(&params.message, &mut on_frame).await {
                Ok(reply) => WsResponse::ok(&req.id, json!({ "reply": reply })),
                Err(e) => WsResponse::err(&req.id, e.to_string()),
            }
        }
        _ => WsResponse::err(&req.id, format!("unknown method: {}", req.method)),
    }
}
