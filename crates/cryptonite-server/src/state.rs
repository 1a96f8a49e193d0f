//! Application state for the bridge server.

use std::sync::Arc;

use cryptonite_core::{
    ClassificationApi, DecisionEngine, DirectiveQueue, EngineConfig, PropertyStore,
};
use tokio::sync::Mutex;

/// Shared application state.
///
/// The engine sits behind an async mutex; handlers release it while the
/// remote classifier is awaited.
#[derive(Clone)]
pub struct AppState {
    /// Decision engine.
    pub engine: Arc<Mutex<DecisionEngine>>,
    /// Platform the engine drives. Drained into every event response.
    pub queue: Arc<DirectiveQueue>,
    /// Remote classification service.
    pub api: Arc<dyn ClassificationApi>,
}

impl AppState {
    /// Creates the state and the engine.
    ///
    /// `extension_origin` is the extension base URL used to resolve
    /// extension-relative paths.
    pub fn new(
        config: EngineConfig,
        props: PropertyStore,
        api: Arc<dyn ClassificationApi>,
        extension_origin: &str,
    ) -> Self {
        let queue = Arc::new(DirectiveQueue::new(extension_origin));
        let engine = DecisionEngine::new(config, props, queue.clone());
        Self::with_engine(engine, queue, api)
    }

    /// Creates state around an existing engine.
    ///
    /// `queue` must be the platform the engine was built with.
    pub fn with_engine(
        engine: DecisionEngine,
        queue: Arc<DirectiveQueue>,
        api: Arc<dyn ClassificationApi>,
    ) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            queue,
            api,
        }
    }
}
