use serde::{Deserialize, Serialize};

use crate::types::{DeliveryRecord, DispatchAttempt};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub delivery_id: String,
    pub received: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDeliveriesResponse {
    pub deliveries: Vec<DeliveryRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAttemptsResponse {
    pub attempts: Vec<DispatchAttempt>,
}
