use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "auth": {
                // The secret never leaves the process
                "jwt_secret": "<redacted>",
                "cookie_name": config.auth.cookie_name
            },
            "engine": {
                "http_url": config.engine.http_url,
                "ws_url": config.engine.ws_url,
                "request_timeout_ms": config.engine.request_timeout_ms
            },
            "audio": {
                "sample_rate": config.audio.sample_rate,
                "channels": config.audio.channels,
                "bit_depth": config.audio.bit_depth,
                "frame_samples": config.audio.frame_samples,
                "capture_queue_frames": config.audio.capture_queue_frames
            },
            "performance": {
                "max_concurrent_sessions": config.performance.max_concurrent_sessions,
                "session_idle_timeout_secs": config.performance.session_idle_timeout_secs
            }
        }
    })))
}

pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;

    state.update_config(current_config.clone())
        .map_err(AppError::ValidationError)?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": {
            "server": {
                "host": current_config.server.host,
                "port": current_config.server.port
            },
            "engine": {
                "http_url": current_config.engine.http_url,
                "ws_url": current_config.engine.ws_url,
                "request_timeout_ms": current_config.engine.request_timeout_ms
            },
            "performance": {
                "max_concurrent_sessions": current_config.performance.max_concurrent_sessions,
                "session_idle_timeout_secs": current_config.performance.session_idle_timeout_secs
            }
        }
    })))
}
