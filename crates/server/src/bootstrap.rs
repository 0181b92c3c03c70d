use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tracing::info;

use stocky_agent::{ConversationStore, OpenAiCompletionClient, RpcQueryExecutor};
use stocky_core::config::{AppConfig, ConfigError, LoadOptions};

use crate::gateway::{self, GatewayState};
use crate::health;

pub struct Application {
    pub config: AppConfig,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    // Validation guarantees both secrets are present; the Option is only a
    // loading-phase artifact.
    let api_key = config.llm.api_key.clone().ok_or_else(|| {
        BootstrapError::Config(ConfigError::Validation("llm.api_key is required".to_string()))
    })?;
    let service_key = config.datastore.service_key.clone().ok_or_else(|| {
        BootstrapError::Config(ConfigError::Validation(
            "datastore.service_key is required".to_string(),
        ))
    })?;

    let llm_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.llm.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;
    let datastore_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.datastore.timeout_secs))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let completion = Arc::new(OpenAiCompletionClient::new(
        llm_http,
        config.llm.base_url.clone(),
        api_key,
        config.llm.model.clone(),
        config.llm.system_prompt.clone(),
    ));
    let executor = Arc::new(RpcQueryExecutor::new(
        datastore_http,
        config.datastore.url.clone(),
        service_key,
        config.datastore.rpc_function.clone(),
    ));
    let store = Arc::new(ConversationStore::new(config.conversation.max_turns));

    let state = GatewayState::new(Arc::clone(&store), completion, executor);
    let router = gateway::router(state).merge(health::router(store));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        rpc_function = %config.datastore.rpc_function,
        max_turns = config.conversation.max_turns,
        "application bootstrap finished"
    );

    Ok(Application { config, router })
}

#[cfg(test)]
mod tests {
    use stocky_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[test]
    fn bootstrap_fails_fast_without_required_secrets() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                datastore_url: Some("https://example.supabase.co".to_string()),
                datastore_service_key: Some("service-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        assert!(result.is_err());
        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("llm.api_key"));
    }

    #[test]
    fn bootstrap_wires_the_router_with_valid_overrides() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                llm_api_key: Some("sk-test".to_string()),
                datastore_url: Some("https://example.supabase.co".to_string()),
                datastore_service_key: Some("service-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("bootstrap should succeed with valid overrides");

        assert_eq!(app.config.conversation.max_turns, 10);
        assert_eq!(app.config.datastore.rpc_function, "execute_raw_sql");
    }
}
