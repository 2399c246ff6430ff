use std::future::Future;
use std::sync::Arc;

use gatito_llm::{
    LlmProvider, ModelOptions, ProviderStreamHandle, RequestId, StreamEventPayload, StreamRequest,
};

use super::copy::{REPLY_CANCELLED, REPLY_ERROR, TYPING_INDICATOR};
use super::message::ChatContext;
use super::persistence::PersistenceGateway;
use super::renderer::{ChatSurface, MessageHandle, Sender};

/// How a submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank input. Nothing changed.
    Ignored,
    Completed { reply: String },
    Failed { reason: String },
    Cancelled,
}

enum StreamEnd {
    Completed(String),
    Failed(String),
    Cancelled,
}

/// Runs one user turn: history update, streamed reply, persistence.
pub struct ChatOrchestrator {
    provider: Arc<dyn LlmProvider>,
    gateway: PersistenceGateway,
    options: ModelOptions,
}

impl ChatOrchestrator {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        gateway: PersistenceGateway,
        options: ModelOptions,
    ) -> Self {
        Self {
            provider,
            gateway,
            options: options.normalized(),
        }
    }

    /// Submits `input` and streams the reply into `surface`.
    ///
    /// Resolving `cancel` before the reply completes stops the provider stream.
    /// The input stays disabled for the whole exchange.
    pub async fn submit<S, C>(
        &self,
        ctx: &mut ChatContext,
        input: &str,
        surface: &mut S,
        cancel: C,
    ) -> SubmitOutcome
    where
        S: ChatSurface + ?Sized,
        C: Future<Output = ()>,
    {
        let text = input.trim();
        if text.is_empty() {
            return SubmitOutcome::Ignored;
        }

        surface.append(text, Sender::User, false);
        ctx.history.push_user(text);
        surface.set_input_enabled(false);
        let placeholder = surface.append(TYPING_INDICATOR, Sender::Bot, true);

        let request_id = ctx.allocate_request_id();
        tracing::info!(
            request_id = request_id.0,
            model_id = %self.options.model_id,
            message_count = ctx.history.len(),
            "submitting chat request"
        );

        let outcome = match self
            .stream_reply(ctx, request_id, surface, placeholder, cancel)
            .await
        {
            StreamEnd::Completed(reply) => {
                if surface.is_pending(placeholder) {
                    surface.clear_pending(placeholder);
                    surface.update(placeholder, &reply);
                }
                ctx.history.push_assistant(reply.clone());
                if let Err(error) = self.gateway.save(&ctx.history).await {
                    tracing::error!(error = %error, "failed to save chat history");
                }
                SubmitOutcome::Completed { reply }
            }
            StreamEnd::Failed(reason) => {
                tracing::error!(request_id = request_id.0, reason = %reason, "chat reply failed");
                if surface.is_pending(placeholder) {
                    surface.remove(placeholder);
                }
                surface.append(REPLY_ERROR, Sender::Bot, false);
                SubmitOutcome::Failed { reason }
            }
            StreamEnd::Cancelled => {
                tracing::info!(request_id = request_id.0, "chat reply cancelled");
                if surface.is_pending(placeholder) {
                    surface.remove(placeholder);
                }
                surface.append(REPLY_CANCELLED, Sender::Bot, false);
                SubmitOutcome::Cancelled
            }
        };

        surface.set_input_enabled(true);
        surface.focus_input();
        outcome
    }

    async fn stream_reply<S, C>(
        &self,
        ctx: &ChatContext,
        request_id: RequestId,
        surface: &mut S,
        placeholder: MessageHandle,
        cancel: C,
    ) -> StreamEnd
    where
        S: ChatSurface + ?Sized,
        C: Future<Output = ()>,
    {
        let request = StreamRequest::new(
            request_id,
            self.options.model_id.clone(),
            ctx.history.to_provider_messages(),
        )
        .with_options(&self.options);

        let ProviderStreamHandle { mut stream, worker } = match self.provider.stream_chat(request)
        {
            Ok(handle) => handle,
            Err(error) => return StreamEnd::Failed(error.to_string()),
        };
        let worker = tokio::spawn(worker);

        tokio::pin!(cancel);
        let mut buffer = String::new();
        let mut fragment_count = 0_usize;

        let end = loop {
            tokio::select! {
                biased;
                () = &mut cancel => {
                    stream.cancel();
                    break StreamEnd::Cancelled;
                }
                event = stream.recv() => {
                    let Some(event) = event else {
                        break StreamEnd::Failed("stream closed before completion".to_string());
                    };
                    if event.request_id != request_id {
                        tracing::debug!(
                            request_id = request_id.0,
                            stale_request_id = event.request_id.0,
                            "ignoring event from a previous request"
                        );
                        continue;
                    }
                    match event.payload {
                        StreamEventPayload::Delta(text) => {
                            if text.is_empty() {
                                continue;
                            }
                            if fragment_count == 0 {
                                surface.clear_pending(placeholder);
                            }
                            fragment_count += 1;
                            buffer.push_str(&text);
                            surface.update(placeholder, &buffer);
                        }
                        StreamEventPayload::Done => break StreamEnd::Completed(buffer),
                        StreamEventPayload::Error(message) => break StreamEnd::Failed(message),
                    }
                }
            }
        };

        drop(stream);
        if let Err(error) = worker.await {
            tracing::warn!(error = %error, "provider worker did not finish cleanly");
        }
        tracing::debug!(request_id = request_id.0, fragment_count, "chat stream finished");
        end
    }
}
