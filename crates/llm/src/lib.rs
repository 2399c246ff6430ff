use std::sync::Arc;

mod model;
mod provider;
mod rig_adapter;

pub use model::{DEFAULT_CHAT_MODEL, DEFAULT_TEMPERATURE, ModelOptions};
pub use provider::{
    BoxFuture, LlmProvider, ProviderConfig, ProviderError, ProviderEventStream, ProviderMessage,
    ProviderResult, ProviderStreamHandle, ProviderWorker, RequestId, Role, StreamEventMapped,
    StreamEventPayload, StreamRequest, event_channel,
};
pub use rig_adapter::{DEFAULT_ENDPOINT, RIG_OPENAI_PROVIDER_ID, RigProviderAdapter};

pub fn create_provider(mut config: ProviderConfig) -> ProviderResult<Arc<dyn LlmProvider>> {
    if config.provider_id.trim().is_empty() {
        config.provider_id = RIG_OPENAI_PROVIDER_ID.to_string();
    }

    match config.provider_id.as_str() {
        "openai" | "rig-openai" | "openrouter" => {
            if config.endpoint.is_empty() {
                config.endpoint = DEFAULT_ENDPOINT.to_string();
            }
            Ok(Arc::new(RigProviderAdapter::new(config)?))
        }
        _ => Err(ProviderError::UnsupportedProvider {
            stage: "create-provider",
            provider_id: config.provider_id,
        }),
    }
}
