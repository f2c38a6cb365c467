use std::sync::Arc;
use std::time::Duration;

use modelgate_ai::routing::{ModelResolver, ResolverConfig};
use modelgate_ai::{CircuitBreaker, DefaultLlmClientFactory, HistoryCompactor, Orchestrator};
use modelgate_state::StateAdapter;
use tracing::debug;

use crate::config::CliConfig;

/// Services shared by every command, built once per process.
pub struct Gateway {
    pub state: Arc<StateAdapter>,
    pub breaker: Arc<CircuitBreaker>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Gateway {
    pub fn compactor(&self, config: &CliConfig) -> HistoryCompactor {
        HistoryCompactor::new(config.compaction.clone(), self.orchestrator.clone())
    }
}

pub fn resolver_config(config: &CliConfig) -> ResolverConfig {
    ResolverConfig {
        fallback_enabled: config.routing.fallback_enabled,
        pinned_provider: config.routing.pinned_provider,
        ..ResolverConfig::from_env()
    }
}

pub async fn prepare_gateway(config: &CliConfig, timeout: Duration) -> Gateway {
    let state = Arc::new(StateAdapter::connect(&config.state).await);
    debug!(backend = state.backend_name(), "State store ready");

    let breaker = Arc::new(CircuitBreaker::new(state.clone(), config.breaker.clone()));
    let factory = DefaultLlmClientFactory::new(config.api_keys());
    let orchestrator = Orchestrator::new(
        ModelResolver::new(resolver_config(config)),
        breaker.clone(),
        Arc::new(factory),
    )
    .with_default_timeout(timeout);

    Gateway {
        state,
        breaker,
        orchestrator: Arc::new(orchestrator),
    }
}
