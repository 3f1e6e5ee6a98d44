//! Operator identity
//!
//! The signed-in operator's profile is fetched once per process. Concurrent
//! first callers share the same in-flight fetch; a failed fetch is not cached,
//! so the next caller tries again.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::client::{BackendApi, OperatorProfile};

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self) -> Option<OperatorProfile>;
}

#[async_trait]
impl ProfileSource for BackendApi {
    async fn fetch_profile(&self) -> Option<OperatorProfile> {
        self.operator_profile().await
    }
}

#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    #[error("Operator profile unavailable")]
    Unavailable,
}

pub struct OperatorIdentityProvider {
    source: Arc<dyn ProfileSource>,
    profile: OnceCell<OperatorProfile>,
}

impl OperatorIdentityProvider {
    pub fn new(source: Arc<dyn ProfileSource>) -> Self {
        Self {
            source,
            profile: OnceCell::new(),
        }
    }

    /// The operator profile, fetched on first use
    pub async fn current(&self) -> Result<OperatorProfile, IdentityError> {
        self.profile
            .get_or_try_init(|| async {
                let profile = self
                    .source
                    .fetch_profile()
                    .await
                    .ok_or(IdentityError::Unavailable)?;
                info!(email = %profile.email, "Operator identity loaded");
                Ok::<_, IdentityError>(profile)
            })
            .await
            .cloned()
    }

    /// Cached profile without triggering a fetch
    pub fn cached(&self) -> Option<&OperatorProfile> {
        self.profile.get()
    }
}
