//! Process-wide readiness of the translation backend
//!
//! The backend is installed once at startup and then shared by every request.
//! Requests never wait for installation: until it completes they fail with
//! [`TranslationError::CapabilityUnavailable`].

use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::core::client::TranslationBackend;
use crate::core::errors::{Result, TranslationError};
use crate::core::models::LanguagePair;

/// Installation state of the backend
#[derive(Clone)]
pub enum CapabilityState {
    /// Installation has not finished yet
    Pending,
    /// The backend serves the language pair
    Ready(Arc<dyn TranslationBackend>),
    /// Installation failed; the reason is reported to every request
    Failed(String),
}

impl fmt::Debug for CapabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityState::Pending => write!(f, "Pending"),
            CapabilityState::Ready(backend) => write!(f, "Ready({})", backend.name()),
            CapabilityState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

/// Shared readiness flag for the translation backend
#[derive(Debug, Clone)]
pub struct TranslationCapability {
    state: Arc<RwLock<CapabilityState>>,
}

impl Default for TranslationCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationCapability {
    /// Create a capability that is not installed yet
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(CapabilityState::Pending)),
        }
    }

    /// Create a capability that is ready right away, skipping the probe
    pub fn ready(backend: Arc<dyn TranslationBackend>) -> Self {
        Self {
            state: Arc::new(RwLock::new(CapabilityState::Ready(backend))),
        }
    }

    /// Probe the backend for `pair` and mark the capability ready or failed
    pub async fn install(
        &self,
        backend: Arc<dyn TranslationBackend>,
        pair: &LanguagePair,
    ) -> Result<()> {
        info!("Installing translation backend {} for {}", backend.name(), pair);

        let outcome = match backend.supports(pair).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(format!("backend {} has no {} model", backend.name(), pair)),
            Err(e) => Err(format!("backend {} is unreachable: {}", backend.name(), e)),
        };

        let mut state = self.state.write().await;
        match outcome {
            Ok(()) => {
                info!("Translation backend ready");
                *state = CapabilityState::Ready(backend);
                Ok(())
            }
            Err(reason) => {
                warn!("Translation backend installation failed: {}", reason);
                *state = CapabilityState::Failed(reason.clone());
                Err(TranslationError::CapabilityUnavailable { reason })
            }
        }
    }

    /// Get the installed backend without waiting
    pub async fn backend(&self) -> Result<Arc<dyn TranslationBackend>> {
        match &*self.state.read().await {
            CapabilityState::Ready(backend) => Ok(Arc::clone(backend)),
            CapabilityState::Pending => Err(TranslationError::CapabilityUnavailable {
                reason: "translation backend is still being installed".to_string(),
            }),
            CapabilityState::Failed(reason) => Err(TranslationError::CapabilityUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    /// Current state
    pub async fn state(&self) -> CapabilityState {
        self.state.read().await.clone()
    }

    /// Short label for health reports
    pub async fn status(&self) -> &'static str {
        match &*self.state.read().await {
            CapabilityState::Pending => "pending",
            CapabilityState::Ready(_) => "ready",
            CapabilityState::Failed(_) => "unavailable",
        }
    }
}
