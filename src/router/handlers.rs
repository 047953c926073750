use super::service::RouterService;
use crate::protocol::{Message, Transport};

use axum::{Extension, Json, body::Bytes, http::StatusCode};
use std::sync::Arc;

/// `POST /message` on a router.
pub async fn handle_message<T: Transport>(
    Extension(router): Extension<Arc<RouterService<T>>>,
    body: Bytes,
) -> (StatusCode, Json<Message>) {
    let message = match Message::decode(&body) {
        Ok(message) => message,
        Err(reply) => {
            tracing::warn!("Router :{} rejected request: {:?}", router.port(), reply);
            return (StatusCode::BAD_REQUEST, Json(reply));
        }
    };

    let method = message.method();
    match tokio::time::timeout(router.request_deadline(), router.handle(message)).await {
        Ok(reply @ Message::Error { .. }) => (StatusCode::BAD_GATEWAY, Json(reply)),
        Ok(reply) => (StatusCode::OK, Json(reply)),
        Err(_) => {
            tracing::warn!("Router :{} timed out handling {}", router.port(), method);
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(Message::error(format!("{} exceeded the request deadline", method))),
            )
        }
    }
}
