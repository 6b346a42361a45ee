// # Leader Election Trait
//
// Exactly one reconciler may be active per deployment. The engine asks at the
// top of every loop iteration and stops for good once the answer is no.

use crate::error::Result;
use async_trait::async_trait;

/// Trait for leader election backends
#[async_trait]
pub trait LeaderElector: Send + Sync {
    /// Whether this process currently holds leadership
    async fn is_leader(&self) -> bool;
}

/// Single-instance deployment: always the leader
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneLeader;

#[async_trait]
impl LeaderElector for StandaloneLeader {
    async fn is_leader(&self) -> bool {
        true
    }
}

/// Factory for creating leader electors
pub trait LeaderElectorFactory: Send + Sync {
    /// Create an elector from configuration
    fn create(&self, config: &crate::config::LeaderConfig) -> Result<Box<dyn LeaderElector>>;
}

pub(crate) struct StandaloneLeaderFactory;

impl LeaderElectorFactory for StandaloneLeaderFactory {
    fn create(&self, _config: &crate::config::LeaderConfig) -> Result<Box<dyn LeaderElector>> {
        Ok(Box::new(StandaloneLeader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn standalone_always_leads() {
        assert!(StandaloneLeader.is_leader().await);
    }
}
