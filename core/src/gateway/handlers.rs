use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use super::GatewayState;
use crate::substitution;

const DEFAULT_TARGET: &str = "en";

#[derive(Debug, Deserialize)]
struct BackendReply {
    response: Option<String>,
}

fn language_name(code: &str) -> &str {
    match code.to_ascii_lowercase().as_str() {
        "en" => "English",
        "ja" => "Japanese",
        "zh" | "zh-cn" => "Simplified Chinese",
        "zh-tw" => "Traditional Chinese",
        "ko" => "Korean",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        _ => code,
    }
}

/// Instruction sent to the generation backend for one file name.
pub fn build_prompt(text: &str, target: &str) -> String {
    format!(
        "Translate the following file name into {}. \
         Reply with the translated name only, without quotes or explanations.\n\n{}",
        language_name(target),
        text
    )
}

fn failure(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// Pulls `text` and `target` out of the raw body. Anything that is not a JSON
/// object with a non-empty string `text` is rejected.
fn parse_request(body: &[u8]) -> Option<(String, String)> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let text = value.get("text")?.as_str()?;
    if text.trim().is_empty() {
        return None;
    }
    let target = value
        .get("target")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TARGET);
    Some((text.to_string(), target.to_string()))
}

pub(super) async fn health(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    Json(json!({ "ok": true, "model": state.model }))
}

pub(super) async fn translate(State(state): State<Arc<GatewayState>>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4();

    let Some((text, target)) = parse_request(&body) else {
        warn!("[{request_id}] rejected translate request without text");
        return failure(
            StatusCode::BAD_REQUEST,
            json!({ "ok": false, "message": "text is required" }),
        );
    };

    let normalized = substitution::apply(&text, state.substitutions.as_ref());
    let prompt = build_prompt(&normalized, &target);
    info!("[{request_id}] translate {:?} -> {}", normalized, target);

    let sent = state
        .client
        .post(&state.generate_url)
        .json(&json!({ "model": state.model, "prompt": prompt, "stream": false }))
        .send()
        .await;

    let response = match sent {
        Ok(response) => response,
        Err(err) => {
            warn!("[{request_id}] backend unreachable: {err}");
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "ok": false, "message": format!("backend request failed: {err}") }),
            );
        }
    };

    let status = response.status();
    let raw = match response.text().await {
        Ok(raw) => raw,
        Err(err) => {
            warn!("[{request_id}] failed to read backend response: {err}");
            return failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "ok": false, "message": format!("backend response unreadable: {err}") }),
            );
        }
    };

    if !status.is_success() {
        warn!("[{request_id}] backend returned {status}");
        let code =
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return failure(
            code,
            json!({
                "ok": false,
                "message": format!("backend returned {}", status.as_u16()),
                "status": status.as_u16(),
                "body": raw,
            }),
        );
    }

    match serde_json::from_str::<BackendReply>(&raw) {
        Ok(BackendReply {
            response: Some(generated),
        }) => {
            let translated = generated.trim();
            debug!("[{request_id}] translated to {:?}", translated);
            (
                StatusCode::OK,
                Json(json!({ "ok": true, "translated": translated })),
            )
                .into_response()
        }
        _ => {
            warn!("[{request_id}] backend response is not a generation result");
            failure(
                StatusCode::BAD_GATEWAY,
                json!({
                    "ok": false,
                    "message": "invalid backend response",
                    "status": status.as_u16(),
                    "body": raw,
                }),
            )
        }
    }
}
