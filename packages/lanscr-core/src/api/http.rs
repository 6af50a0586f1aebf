//! HTTP route handlers.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::api::{AppState, ClientAddr};
use crate::constants::MULTIPART_BOUNDARY;
use crate::error::Error;
use crate::landing::LANDING_HTML;
use crate::stream::{mjpeg_body, wav_body};

/// Creates the router with the auth gate layered over every route.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/index.html", get(landing))
        .route("/audio", get(stream_audio))
        .route("/control", get(control))
        // Any other path (including /mjpeg) gets the video stream.
        .fallback(stream_mjpeg)
        .layer(middleware::from_fn_with_state(state.clone(), request_gate))
        .with_state(state)
}

/// Checks credentials before any handler runs and logs the request line.
///
/// A denied request receives exactly one 401 with the realm and the
/// connection then closes; no other body is ever written to an unauthorized
/// peer.
async fn request_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(auth) = &state.auth {
        let authorized = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| auth.verify(v))
            .unwrap_or(false);
        if !authorized {
            return Error::Unauthorized.into_response();
        }
    }

    if log::log_enabled!(log::Level::Debug) {
        let remote = req
            .extensions()
            .get::<ClientAddr>()
            .copied()
            .unwrap_or_else(ClientAddr::unknown);
        log::debug!("HTTP {} {} from {}", req.method(), req.uri(), remote.0);
    }

    next.run(req).await
}

async fn landing() -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::PRAGMA, "no-cache")
        .header(header::CONNECTION, "close")
        .body(Body::from(LANDING_HTML))
        .expect("static response")
}

/// `GET /control[?mute=0|1]`: optionally flips the server-wide mute flag,
/// always reports the current state.
async fn control(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if let Some(raw) = query.get("mute") {
        let mute = raw.trim().parse::<i64>().unwrap_or(0) != 0;
        state.audio_muted.store(mute, Ordering::SeqCst);
        log::info!("Server audio mute set to {mute}");
    }

    Json(json!({
        "audioMuted": state.audio_muted.load(Ordering::SeqCst),
        "privateMode": state.auth.is_some(),
        "port": state.port,
    }))
    .into_response()
}

async fn stream_audio(State(state): State<AppState>, client: ClientAddr) -> Response {
    let remote = client.0;

    let Some(factory) = &state.audio else {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Audio disabled",
        )
            .into_response();
    };

    // Every subscriber gets its own loopback session; a failed activation
    // degrades this subscriber only, never the server.
    let source = match factory.open() {
        Ok(source) => source,
        Err(e) => {
            log::warn!("Loopback activation failed for {remote}: {e}");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Audio unavailable",
            )
                .into_response();
        }
    };

    let body = wav_body(
        source,
        Arc::clone(&state.audio_muted),
        state.stop.clone(),
        remote,
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/wav")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::PRAGMA, "no-cache")
        .header(header::CONNECTION, "close")
        .body(body)
        .expect("audio response")
}

async fn stream_mjpeg(State(state): State<AppState>, client: ClientAddr) -> Response {
    let remote = client.0;
    let body = mjpeg_body(
        state.slot.subscribe(),
        Arc::clone(&state.subscribers),
        state.stop.clone(),
        remote,
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONNECTION, "close")
        .header(
            header::CACHE_CONTROL,
            "no-store, no-cache, must-revalidate, max-age=0",
        )
        .header(header::PRAGMA, "no-cache")
        .header(header::EXPIRES, "0")
        .header("X-Accel-Buffering", "no")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(body)
        .expect("mjpeg response")
}
