use crate::{
    config::AppConfig, launch::LaunchResolver, mailer::Mailer, progress::ProgressTracker,
    registry::PackageRegistry, store::Store,
};
use std::sync::Arc;

/// Shared handler state; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub registry: Arc<PackageRegistry>,
    pub launcher: Arc<LaunchResolver>,
    pub progress: Arc<ProgressTracker>,
    pub mailer: Arc<dyn Mailer>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            registry: Arc::new(PackageRegistry::new(store.clone(), &config)),
            launcher: Arc::new(LaunchResolver::new(store.clone(), &config)),
            progress: Arc::new(ProgressTracker::new(store.clone())),
            config: Arc::new(config),
            store,
            mailer,
            http: reqwest::Client::new(),
        }
    }
}
