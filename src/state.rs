use std::sync::Arc;

use crate::dispatcher::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub inspector_api_token: Option<String>,
}
