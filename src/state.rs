use std::sync::Arc;

use crate::bootstrap::Chatbot;
use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub chatbot: Chatbot,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        let config = Arc::new(config);
        let chatbot = Chatbot::new(config.clone());

        Arc::new(AppState { config, chatbot })
    }
}
