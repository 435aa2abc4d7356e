use std::sync::Arc;

use crate::background::BackgroundTasks;
use crate::config::Config;
use crate::edge_config::EdgeConfigStore;
use crate::flagship::FlagProvider;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub edge_config: Arc<dyn EdgeConfigStore>,
    pub flags: Arc<dyn FlagProvider>,
    pub background: BackgroundTasks,
}
