use std::sync::Arc;

use config::Config;

use crate::frontend::Frontend;

/// Everything a debugging session shares between its driver, IO channel and host
///
/// Built once per session by the host. Clones share the same configuration and frontend.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub frontend: Arc<dyn Frontend>,
}

impl AppContext {
    pub fn new(config: Config, frontend: impl Frontend + 'static) -> Self {
        Self {
            config: Arc::new(config),
            frontend: Arc::new(frontend),
        }
    }

    pub fn settings(&self) -> &config::DriverSettings {
        &self.config.driver
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
