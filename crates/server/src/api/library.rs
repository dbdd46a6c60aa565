use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast;
use tracing::{info, warn};

use catalog::ScanEvent;

use crate::config::resolve_music_root;
use crate::state::AppState;
use crate::utils::{catalog_error, json_error_response, json_ok_response};

/// Kicks off a library scan on the blocking pool. At most one scan runs
/// at a time; a second request is rejected with a conflict, never queued.
pub async fn start_scan(State(state): State<AppState>) -> Response {
    let music_root = {
        let config = state.config.read();
        resolve_music_root(&state.config_path, &config.music_root)
    };
    let music_root = match music_root {
        Some(root) => root,
        None => {
            return json_error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "music_root is not configured",
            )
        }
    };
    if !music_root.exists() {
        return json_error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("music directory not found: {}", music_root.display()),
        );
    }

    if let Err(err) = state.scans.try_start() {
        return catalog_error(err).into_response();
    }

    info!("Library scan started under {}", music_root.display());
    let scan_state = state.clone();
    tokio::spawn(async move {
        let catalog = scan_state.catalog.clone();
        let covers = scan_state.covers.clone();
        let events = scan_state.scan_events.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut emit = |event: ScanEvent| {
                let _ = events.send(event);
            };
            catalog.scan(&covers, &music_root, &mut emit)
        })
        .await;

        match result {
            Ok(Ok(stats)) => {
                info!(
                    "Library scan finished: {} files seen, {} tracks added",
                    stats.files, stats.created
                );
            }
            Ok(Err(err)) => {
                warn!("Library scan failed: {}", err);
                let _ = scan_state.scan_events.send(ScanEvent::Error(err.to_string()));
            }
            Err(err) => {
                warn!("Library scan join error: {}", err);
                let _ = scan_state.scan_events.send(ScanEvent::Error(err.to_string()));
            }
        }
        scan_state.scans.finish();
    });

    json_ok_response()
}

/// WebSocket feed of scan frames: progress, per-track operations, and the
/// terminal finished/error events.
pub async fn updates(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_updates(socket, state))
}

async fn stream_updates(mut socket: WebSocket, state: AppState) {
    let mut events = state.scan_events.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(err) => {
                            warn!("Failed to encode scan frame: {}", err);
                            continue;
                        }
                    };
                    if socket.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Scan update subscriber lagged, {} frames dropped", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = socket.recv() => match message {
                Some(Ok(_)) => continue,
                _ => break,
            },
        }
    }
}
