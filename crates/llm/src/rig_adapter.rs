use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};
use tokio::sync::{mpsc, oneshot};

use super::provider::{
    CompletionsFailedSnafu, EmptyMessageSetSnafu, HttpClientSnafu, LlmProvider,
    MissingApiKeySnafu, ProviderConfig, ProviderError, ProviderMessage, ProviderResult,
    ProviderStreamHandle, ProviderWorker, RequestId, Role, StreamEventMapped, StreamRequest,
    event_channel,
};

pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";

/// OpenAI-compatible gateway hosting the default model.
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    openai::completion::streaming::StreamingCompletionResponse,
>;

/// Streams chat completions from any OpenAI-compatible endpoint through rig.
pub struct RigProviderAdapter {
    config: ProviderConfig,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.trim().is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    // Gateways such as OpenRouter only speak `/chat/completions`, not the Responses API.
    fn build_client(config: &ProviderConfig) -> ProviderResult<openai::CompletionsClient> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        let client = builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })?;
        Ok(client.completions_api())
    }

    fn to_rig_message(message: &ProviderMessage) -> Option<RigMessage> {
        match message.role {
            Role::System => None,
            Role::User => Some(RigMessage::user(message.content.clone())),
            Role::Assistant => Some(RigMessage::assistant(message.content.clone())),
        }
    }

    // Rig exposes a single preamble field, so system-role messages are folded into it.
    fn merged_preamble(messages: &[ProviderMessage]) -> Option<String> {
        let preamble_parts = messages
            .iter()
            .filter(|message| {
                matches!(message.role, Role::System) && !message.content.trim().is_empty()
            })
            .map(|message| message.content.clone())
            .collect::<Vec<_>>();

        if preamble_parts.is_empty() {
            None
        } else {
            Some(preamble_parts.join("\n\n"))
        }
    }

    async fn open_stream(
        config: &ProviderConfig,
        request: &StreamRequest,
    ) -> ProviderResult<RigStreamingResponse> {
        let client = Self::build_client(config)?;
        let model = client.completion_model(request.model_id.clone());

        let mut messages = request
            .messages
            .iter()
            .filter_map(Self::to_rig_message)
            .collect::<Vec<_>>();

        let Some(prompt) = messages.pop() else {
            tracing::warn!(
                request_id = ?request.request_id,
                model_id = %request.model_id,
                total_message_count = request.messages.len(),
                "cannot open stream because no user/assistant messages remain after filtering"
            );
            return EmptyMessageSetSnafu {
                stage: "open-stream-filter-messages",
                request_id: request.request_id,
            }
            .fail();
        };
        let mut builder = model.completion_request(prompt).messages(messages);

        if let Some(preamble) = Self::merged_preamble(&request.messages) {
            builder = builder.preamble(preamble);
        }

        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    fn emit_error_event(
        event_tx: &mpsc::UnboundedSender<StreamEventMapped>,
        request_id: RequestId,
        error: ProviderError,
    ) {
        let _ = event_tx.send(StreamEventMapped::error(request_id, error.to_string()));
    }

    fn map_stream_item<R>(
        request_id: RequestId,
        item: StreamedAssistantContent<R>,
    ) -> Option<StreamEventMapped>
    where
        R: Clone + Unpin,
    {
        match item {
            StreamedAssistantContent::Text(text) if !text.text.is_empty() => {
                Some(StreamEventMapped::delta(request_id, text.text))
            }
            _ => None,
        }
    }

    async fn run_stream_worker(
        config: ProviderConfig,
        request: StreamRequest,
        event_tx: mpsc::UnboundedSender<StreamEventMapped>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let request_id = request.request_id;
        let mut stream = tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!(request_id = ?request_id, "provider stream cancelled before opening");
                return;
            }
            opened = Self::open_stream(&config, &request) => match opened {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::error!(
                        request_id = ?request_id,
                        provider_id = %config.provider_id,
                        model_id = %request.model_id,
                        error = %error,
                        "failed to open provider stream"
                    );
                    Self::emit_error_event(&event_tx, request_id, error);
                    return;
                }
            }
        };

        let mut cancelled = false;
        let mut stream_failed = false;
        let mut fragment_count = 0_usize;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    cancelled = true;
                    // Cancel the upstream rig stream so provider IO stops promptly.
                    tracing::debug!(request_id = ?request_id, "provider stream cancelled");
                    stream.cancel();
                    break;
                }
                next_item = stream.next() => {
                    match next_item {
                        Some(Ok(item)) => {
                            if let Some(mapped) = Self::map_stream_item(request_id, item) {
                                fragment_count += 1;
                                if event_tx.send(mapped).is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Err(source)) => {
                            stream_failed = true;
                            tracing::warn!(
                                request_id = ?request_id,
                                error = %source,
                                "provider stream emitted an error chunk"
                            );
                            let error = ProviderError::CompletionsFailed {
                                stage: "stream-chunk",
                                source,
                            };
                            Self::emit_error_event(&event_tx, request_id, error);
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        if !cancelled && !stream_failed {
            tracing::debug!(request_id = ?request_id, fragment_count, "provider stream finished");
            let _ = event_tx.send(StreamEventMapped::done(request_id));
        }
    }
}

impl LlmProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Rig OpenAI-compatible"
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        ensure!(
            !request.messages.is_empty(),
            EmptyMessageSetSnafu {
                stage: "stream-chat",
                request_id: request.request_id,
            }
        );

        let (event_tx, stream, cancel_rx) = event_channel();
        let worker: ProviderWorker = Box::pin(Self::run_stream_worker(
            self.config.clone(),
            request,
            event_tx,
            cancel_rx,
        ));

        Ok(ProviderStreamHandle { stream, worker })
    }
}
