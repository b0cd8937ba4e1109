//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::ChatSettings;
use crate::db::CommerceStore;
use crate::llm::ModelGateway;
use crate::prompt::ContextRenderer;
use crate::session::SessionRegistry;

/// Application state shared across all handlers.
///
/// Cheap to clone. The store and gateway are trait objects so the same router
/// serves `PostgreSQL` in production and the in-memory store in tests.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn CommerceStore>,
    gateway: Arc<dyn ModelGateway>,
    renderer: ContextRenderer,
    chat: ChatSettings,
    sessions: SessionRegistry,
}

impl AppState {
    /// Create a new application state with an empty session registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn CommerceStore>,
        gateway: Arc<dyn ModelGateway>,
        renderer: ContextRenderer,
        chat: ChatSettings,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                gateway,
                renderer,
                chat,
                sessions: SessionRegistry::new(),
            }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn CommerceStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn gateway(&self) -> &dyn ModelGateway {
        self.inner.gateway.as_ref()
    }

    #[must_use]
    pub fn renderer(&self) -> &ContextRenderer {
        &self.inner.renderer
    }

    /// Orchestrator tuning.
    #[must_use]
    pub fn chat_settings(&self) -> &ChatSettings {
        &self.inner.chat
    }

    /// Live chat connections.
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }
}
