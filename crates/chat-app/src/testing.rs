//! In-process fakes shared by unit tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use gatito_llm::{
    LlmProvider, ProviderError, ProviderResult, ProviderStreamHandle, ProviderWorker, RequestId,
    StreamEventMapped, StreamRequest, event_channel,
};
use gatito_storage::{
    BoxFuture as StoreFuture, EntryKey, KvRecord, KvStore, MemoryKvStore, OwnerScope,
    StorageError, StorageResult,
};

use crate::auth::{AuthError, AuthResult, AuthService, UserProfile, validate_username};
use crate::chat::renderer::{AuthControl, InputControls, MessageHandle, MessageRenderer, Sender};

pub fn scratch_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    let path = std::env::temp_dir().join(format!(
        "gatito-{name}-{}-{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&path).unwrap();
    path
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    Append {
        handle: MessageHandle,
        content: String,
        sender: Sender,
        typing: bool,
    },
    Update {
        handle: MessageHandle,
        content: String,
    },
    ClearPending(MessageHandle),
    Remove(MessageHandle),
    Clear,
    InputEnabled(bool),
    FocusInput,
    AuthControl(AuthControl),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedElement {
    pub handle: MessageHandle,
    pub sender: Sender,
    pub content: String,
    pub pending: bool,
}

/// Surface that keeps the visible log in memory and records every call.
#[derive(Debug)]
pub struct RecordingSurface {
    pub events: Vec<SurfaceEvent>,
    pub elements: Vec<RenderedElement>,
    pub input_enabled: bool,
    pub auth_control: Option<AuthControl>,
    next_handle: u64,
}

impl Default for RecordingSurface {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            elements: Vec::new(),
            input_enabled: true,
            auth_control: None,
            next_handle: 1,
        }
    }
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The log as a user would read it.
    pub fn visible(&self) -> Vec<(Sender, String)> {
        self.elements
            .iter()
            .map(|element| (element.sender, element.content.clone()))
            .collect()
    }

    fn element_mut(&mut self, handle: MessageHandle) -> Option<&mut RenderedElement> {
        self.elements
            .iter_mut()
            .find(|element| element.handle == handle)
    }
}

impl MessageRenderer for RecordingSurface {
    fn append(&mut self, content: &str, sender: Sender, typing: bool) -> MessageHandle {
        let handle = MessageHandle(self.next_handle);
        self.next_handle += 1;
        self.elements.push(RenderedElement {
            handle,
            sender,
            content: content.to_string(),
            pending: typing,
        });
        self.events.push(SurfaceEvent::Append {
            handle,
            content: content.to_string(),
            sender,
            typing,
        });
        handle
    }

    fn update(&mut self, handle: MessageHandle, content: &str) {
        if let Some(element) = self.element_mut(handle) {
            element.content = content.to_string();
        }
        self.events.push(SurfaceEvent::Update {
            handle,
            content: content.to_string(),
        });
    }

    fn clear_pending(&mut self, handle: MessageHandle) {
        if let Some(element) = self.element_mut(handle) {
            element.pending = false;
        }
        self.events.push(SurfaceEvent::ClearPending(handle));
    }

    fn remove(&mut self, handle: MessageHandle) {
        self.elements.retain(|element| element.handle != handle);
        self.events.push(SurfaceEvent::Remove(handle));
    }

    fn is_pending(&self, handle: MessageHandle) -> bool {
        self.elements
            .iter()
            .any(|element| element.handle == handle && element.pending)
    }

    fn clear(&mut self) {
        self.elements.clear();
        self.events.push(SurfaceEvent::Clear);
    }
}

impl InputControls for RecordingSurface {
    fn set_input_enabled(&mut self, enabled: bool) {
        self.input_enabled = enabled;
        self.events.push(SurfaceEvent::InputEnabled(enabled));
    }

    fn focus_input(&mut self) {
        self.events.push(SurfaceEvent::FocusInput);
    }

    fn set_auth_control(&mut self, control: AuthControl) {
        self.auth_control = Some(control.clone());
        self.events.push(SurfaceEvent::AuthControl(control));
    }
}

/// Auth service whose state is set directly by the test.
#[derive(Debug, Default)]
pub struct StaticAuth {
    current: Mutex<Option<UserProfile>>,
    fail_user: AtomicBool,
    sign_in_calls: AtomicUsize,
}

impl StaticAuth {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(username: &str) -> Self {
        Self {
            current: Mutex::new(Some(UserProfile::new(username))),
            ..Self::default()
        }
    }

    pub fn fail_user(&self, fail: bool) {
        self.fail_user.store(fail, Ordering::SeqCst);
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    fn current(&self) -> Option<UserProfile> {
        self.current
            .lock()
            .map(|current| current.clone())
            .unwrap_or(None)
    }
}

impl AuthService for StaticAuth {
    fn is_signed_in(&self) -> bool {
        self.current().is_some()
    }

    fn user(&self) -> BoxFuture<'_, AuthResult<UserProfile>> {
        Box::pin(async move {
            if self.fail_user.load(Ordering::SeqCst) {
                return Err(AuthError::NotSignedIn {
                    stage: "static-auth-user-failure",
                });
            }
            self.current().ok_or(AuthError::NotSignedIn {
                stage: "static-auth-user",
            })
        })
    }

    fn sign_in<'a>(&'a self, username: &'a str) -> BoxFuture<'a, AuthResult<UserProfile>> {
        Box::pin(async move {
            self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
            let profile = UserProfile::new(validate_username(username)?);
            if let Ok(mut current) = self.current.lock() {
                *current = Some(profile.clone());
            }
            Ok(profile)
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move {
            if let Ok(mut current) = self.current.lock() {
                *current = None;
            }
            Ok(())
        })
    }
}

/// Memory store that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: MemoryKvStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn raw(&self, owner: &str, key: &str) -> Option<String> {
        let owner = OwnerScope::parse(owner).unwrap();
        let key = EntryKey::parse(key).unwrap();
        self.inner.get(&owner, &key).await.unwrap()
    }

    pub async fn put_raw(&self, owner: &str, key: &str, value: &str) {
        let owner = OwnerScope::parse(owner).unwrap();
        let key = EntryKey::parse(key).unwrap();
        self.inner.set(&owner, &key, value.to_string()).await.unwrap();
    }

    fn injected_failure(stage: &'static str) -> StorageError {
        StorageError::InvariantViolation {
            stage,
            details: "injected failure".to_string(),
        }
    }
}

impl KvStore for RecordingStore {
    fn get_record<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
    ) -> StoreFuture<'a, StorageResult<Option<KvRecord>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Box::pin(async { Err(Self::injected_failure("recording-store-get")) });
        }
        self.inner.get_record(owner, key)
    }

    fn set<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
        value: String,
    ) -> StoreFuture<'a, StorageResult<()>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Box::pin(async { Err(Self::injected_failure("recording-store-set")) });
        }
        self.inner.set(owner, key, value)
    }

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerScope,
        key: &'a EntryKey,
    ) -> StoreFuture<'a, StorageResult<bool>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(owner, key)
    }
}

/// One step a scripted reply performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Delta(&'static str),
    Done,
    Error(&'static str),
    /// A fragment tagged with an older request id.
    StaleDelta(&'static str),
    /// Blocks until the consumer cancels.
    WaitForCancel,
}

#[derive(Debug, Clone)]
pub enum Script {
    Reply(Vec<ScriptStep>),
    /// `stream_chat` itself fails before any worker runs.
    OpenError,
}

/// Provider replaying canned streams and recording every request.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<StreamRequest>>,
    cancelled: Arc<AtomicBool>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    pub fn reply(steps: Vec<ScriptStep>) -> Self {
        Self::new(vec![Script::Reply(steps)])
    }

    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl LlmProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "Scripted"
    }

    fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
        let request_id = request.request_id;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.pop_front())
            .unwrap_or(Script::Reply(vec![ScriptStep::Done]));

        let steps = match script {
            Script::OpenError => {
                return Err(ProviderError::UnsupportedProvider {
                    stage: "scripted-open",
                    provider_id: "scripted".to_string(),
                });
            }
            Script::Reply(steps) => steps,
        };

        let (event_tx, stream, cancel_rx) = event_channel();
        let cancelled = self.cancelled.clone();
        let worker: ProviderWorker = Box::pin(async move {
            for step in steps {
                let event = match step {
                    ScriptStep::Delta(text) => StreamEventMapped::delta(request_id, text),
                    ScriptStep::Done => StreamEventMapped::done(request_id),
                    ScriptStep::Error(message) => StreamEventMapped::error(request_id, message),
                    ScriptStep::StaleDelta(text) => {
                        StreamEventMapped::delta(RequestId::new(request_id.0.wrapping_sub(1)), text)
                    }
                    ScriptStep::WaitForCancel => {
                        if cancel_rx.await.is_ok() {
                            cancelled.store(true, Ordering::SeqCst);
                        }
                        return;
                    }
                };
                if event_tx.send(event).is_err() {
                    return;
                }
            }
        });

        Ok(ProviderStreamHandle { stream, worker })
    }
}
