use axum::{Json, extract::State};

use crate::{extractors::Delivery, state::AppState, types::WebhookAck};

/// Acknowledges the delivery and hands it to the pipeline.
///
/// Verification, classification and dispatch run after the response is
/// built, so downstream latency never reaches the sender.
pub async fn webhook_handler(
    State(state): State<AppState>,
    Delivery(event): Delivery,
) -> Json<WebhookAck> {
    let ack = WebhookAck {
        delivery_id: event.delivery_id.clone(),
        received: true,
    };
    state.pipeline.accept(event);
    Json(ack)
}
