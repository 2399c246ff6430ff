use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use futures::{Stream, StreamExt};
use gatito_llm::create_provider;
use gatito_storage::{KvStore, MemoryKvStore, SqliteKvStore};
use snafu::{OptionExt, ResultExt};

use crate::auth::{LocalAuth, SESSION_FILE_NAME};
use crate::chat::copy::SYSTEM_PROMPT;
use crate::chat::{
    ChatContext, ChatOrchestrator, InputControls, PersistenceGateway, SessionController,
};
use crate::error::{
    AppResult, LoggingSnafu, MissingApiKeySnafu, PersistenceSnafu, ProviderSnafu, SettingsSnafu,
    StorageSnafu, TerminalSnafu,
};
use crate::logging;
use crate::settings::SettingsStore;
use crate::terminal::{EditorAction, TerminalGuard, TerminalSurface, TerminalWidth};

/// Startup options collected from the command line.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub config_path: Option<PathBuf>,
    /// Keep history in memory only.
    pub ephemeral: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Keyboard loop tying the terminal to the session controller and orchestrator.
pub struct ChatApp<W: Write> {
    ctx: ChatContext,
    session: SessionController,
    orchestrator: ChatOrchestrator,
    surface: TerminalSurface<W>,
}

impl<W: Write> ChatApp<W> {
    pub fn new(
        session: SessionController,
        orchestrator: ChatOrchestrator,
        surface: TerminalSurface<W>,
    ) -> Self {
        Self {
            ctx: ChatContext::new(SYSTEM_PROMPT),
            session,
            orchestrator,
            surface,
        }
    }

    pub fn context(&self) -> &ChatContext {
        &self.ctx
    }

    pub fn surface(&self) -> &TerminalSurface<W> {
        &self.surface
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub async fn run<E>(&mut self, events: &mut E) -> AppResult<()>
    where
        E: Stream<Item = io::Result<Event>> + Unpin,
    {
        self.session.initialize(&mut self.ctx, &mut self.surface).await;
        self.surface.focus_input();

        while let Some(event) = events.next().await {
            let event = event.context(TerminalSnafu {
                stage: "read-terminal-event",
            })?;
            let action = match event {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    self.surface.editor_mut().handle_key(key)
                }
                Event::Paste(text) => self.surface.editor_mut().paste(&text),
                Event::Resize(columns, _) => {
                    self.surface.resize(columns);
                    continue;
                }
                _ => continue,
            };
            if self.apply(action, events).await == Flow::Quit {
                break;
            }
        }

        self.surface.finish();
        tracing::info!("chat closed");
        Ok(())
    }

    async fn apply<E>(&mut self, action: EditorAction, events: &mut E) -> Flow
    where
        E: Stream<Item = io::Result<Event>> + Unpin,
    {
        match action {
            EditorAction::None => {}
            EditorAction::Redraw => self.surface.redraw_input(),
            EditorAction::Submit(text) => {
                let mut quit = false;
                let width = self.surface.width();
                let outcome = self
                    .orchestrator
                    .submit(
                        &mut self.ctx,
                        &text,
                        &mut self.surface,
                        wait_for_cancel(events, &mut quit, &width),
                    )
                    .await;
                tracing::debug!(?outcome, "submission finished");
                if quit {
                    return Flow::Quit;
                }
            }
            EditorAction::SignInRequested => {
                if self.session.can_sign_in() {
                    self.surface.editor_mut().begin_sign_in();
                    self.surface.redraw_input();
                }
            }
            EditorAction::SignIn(username) => {
                if let Ok(profile) = self
                    .session
                    .sign_in(&mut self.ctx, &mut self.surface, &username)
                    .await
                {
                    tracing::debug!(username = %profile.username, "session switched to signed-in user");
                }
                self.surface.redraw_input();
            }
            EditorAction::SignInAbandoned => {
                tracing::info!("sign-in prompt dismissed");
                self.surface.redraw_input();
            }
            EditorAction::Quit => return Flow::Quit,
        }
        Flow::Continue
    }
}

/// Resolves when the user cancels a streaming reply with Esc or Ctrl+C.
/// Ctrl+D also cancels and asks the loop to quit afterwards.
///
/// Resizes are recorded in `width` so the input area is redrawn at the right size.
async fn wait_for_cancel<E>(events: &mut E, quit: &mut bool, width: &TerminalWidth)
where
    E: Stream<Item = io::Result<Event>> + Unpin,
{
    while let Some(event) = events.next().await {
        let key = match event {
            Ok(Event::Key(key)) => key,
            Ok(Event::Resize(columns, _)) => {
                width.set(columns);
                continue;
            }
            _ => continue,
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Esc => return,
            KeyCode::Char('c') if control => return,
            KeyCode::Char('d') if control => {
                *quit = true;
                return;
            }
            _ => {}
        }
    }
    futures::future::pending::<()>().await;
}

/// Builds every collaborator from settings and runs the chat until the user quits.
pub async fn launch(options: LaunchOptions) -> AppResult<()> {
    let config_path = options
        .config_path
        .unwrap_or_else(SettingsStore::default_config_path);
    let config_dir = config_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(SettingsStore::default_config_dir);

    let log_path = logging::init(&config_dir).context(LoggingSnafu {
        stage: "launch-init-logging",
    })?;

    let settings_store = SettingsStore::load(config_path.clone()).context(SettingsSnafu {
        stage: "launch-load-settings",
    })?;
    let settings = settings_store.settings();
    tracing::info!(
        config_path = ?settings_store.config_path(),
        log_path = ?log_path,
        provider_id = %settings.provider_id,
        model_id = %settings.model.model_id,
        "starting chat"
    );

    let provider_config = settings.to_provider_config().context(MissingApiKeySnafu {
        stage: "launch-provider-config",
        path: config_path.clone(),
    })?;
    let provider = create_provider(provider_config).context(ProviderSnafu {
        stage: "launch-create-provider",
    })?;

    let store: Arc<dyn KvStore> = if options.ephemeral {
        tracing::info!("history kept in memory for this run");
        Arc::new(MemoryKvStore::new())
    } else {
        let location = settings.database_location(&config_dir);
        Arc::new(SqliteKvStore::open(&location).await.context(StorageSnafu {
            stage: "launch-open-store",
        })?)
    };

    let auth = Arc::new(LocalAuth::load(config_dir.join(SESSION_FILE_NAME)));
    let gateway = PersistenceGateway::new(store, auth.clone(), &settings.history_key).context(
        PersistenceSnafu {
            stage: "launch-persistence-gateway",
        },
    )?;
    let session = SessionController::new(auth, gateway.clone());
    let orchestrator = ChatOrchestrator::new(provider, gateway, settings.model.clone());

    let guard = TerminalGuard::enter().context(TerminalSnafu {
        stage: "launch-enter-raw-mode",
    })?;
    let mut app = ChatApp::new(session, orchestrator, TerminalSurface::stdout());
    let result = app.run(&mut EventStream::new()).await;
    drop(guard);
    result
}
