use super::service::ReplicaNode;
use crate::protocol::{Message, Transport};

use axum::{Extension, Json, body::Bytes, http::StatusCode};
use std::sync::Arc;

/// `POST /message` on a replica.
pub async fn handle_message<T: Transport>(
    Extension(node): Extension<Arc<ReplicaNode<T>>>,
    body: Bytes,
) -> (StatusCode, Json<Message>) {
    let message = match Message::decode(&body) {
        Ok(message) => message,
        Err(reply) => {
            tracing::warn!("Server {} rejected request: {:?}", node.server_id(), reply);
            return (StatusCode::BAD_REQUEST, Json(reply));
        }
    };

    let method = message.method();
    match tokio::time::timeout(node.request_deadline(), node.handle(message)).await {
        Ok(reply @ Message::Error { .. }) => (StatusCode::INTERNAL_SERVER_ERROR, Json(reply)),
        Ok(reply) => (StatusCode::OK, Json(reply)),
        Err(_) => {
            tracing::warn!("Server {} timed out handling {}", node.server_id(), method);
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(Message::error(format!("{} exceeded the request deadline", method))),
            )
        }
    }
}
