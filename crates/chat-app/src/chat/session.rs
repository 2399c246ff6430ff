use std::sync::Arc;

use super::copy::GREETING;
use super::message::ChatContext;
use super::persistence::PersistenceGateway;
use super::renderer::{AuthControl, ChatSurface, Sender, render_message};
use crate::auth::{AuthError, AuthResult, AuthService, UserProfile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated(UserProfile),
}

/// Restores the conversation at startup and drives the sign-in control.
pub struct SessionController {
    auth: Arc<dyn AuthService>,
    gateway: PersistenceGateway,
    state: SessionState,
}

impl SessionController {
    pub fn new(auth: Arc<dyn AuthService>, gateway: PersistenceGateway) -> Self {
        Self {
            auth,
            gateway,
            state: SessionState::Anonymous,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn can_sign_in(&self) -> bool {
        matches!(self.state, SessionState::Anonymous)
    }

    pub async fn initialize<S>(&mut self, ctx: &mut ChatContext, surface: &mut S)
    where
        S: ChatSurface + ?Sized,
    {
        if self.auth.is_signed_in() {
            match self.auth.user().await {
                Ok(profile) => {
                    self.enter_authenticated(ctx, surface, profile, true).await;
                    return;
                }
                Err(error) => {
                    tracing::warn!(error = %error, "signed-in user unavailable, continuing anonymously");
                }
            }
        }

        self.state = SessionState::Anonymous;
        surface.set_auth_control(AuthControl::SignIn);
        surface.append(GREETING, Sender::Bot, false);
        tracing::info!("anonymous session started");
    }

    /// Signs in with the label collected by the prompt.
    ///
    /// A stored conversation for that user replaces the visible log. Without
    /// one, the current log and conversation stay as they are and the greeting
    /// is not shown a second time.
    pub async fn sign_in<S>(
        &mut self,
        ctx: &mut ChatContext,
        surface: &mut S,
        username: &str,
    ) -> AuthResult<UserProfile>
    where
        S: ChatSurface + ?Sized,
    {
        if let SessionState::Authenticated(profile) = &self.state {
            tracing::debug!(username = %profile.username, "sign-in ignored, already signed in");
            return Ok(profile.clone());
        }

        let result = self.auth.sign_in(username).await;
        match &result {
            Ok(profile) => {
                self.enter_authenticated(ctx, surface, profile.clone(), false)
                    .await;
            }
            Err(AuthError::SignInAbandoned { .. }) => {
                tracing::info!("sign-in abandoned");
                surface.set_auth_control(AuthControl::SignIn);
            }
            Err(error) => {
                tracing::warn!(error = %error, "sign-in failed");
                surface.set_auth_control(AuthControl::SignIn);
            }
        }
        surface.focus_input();
        result
    }

    async fn enter_authenticated<S>(
        &mut self,
        ctx: &mut ChatContext,
        surface: &mut S,
        profile: UserProfile,
        greet_when_empty: bool,
    ) where
        S: ChatSurface + ?Sized,
    {
        surface.set_auth_control(AuthControl::SignedIn {
            username: profile.username.clone(),
        });
        self.state = SessionState::Authenticated(profile);

        match self.gateway.load().await {
            Some(snapshot) => {
                surface.clear();
                ctx.history.restore(snapshot);
                for message in ctx.history.conversation() {
                    render_message(surface, message);
                }
                tracing::info!(
                    message_count = ctx.history.conversation().len(),
                    "conversation restored"
                );
            }
            None if greet_when_empty => {
                surface.append(GREETING, Sender::Bot, false);
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::copy::SYSTEM_PROMPT;
    use crate::chat::message::Message;
    use crate::chat::persistence::DEFAULT_HISTORY_KEY;
    use crate::chat::renderer::MessageRenderer;
    use crate::testing::{RecordingStore, RecordingSurface, StaticAuth};

    struct Fixture {
        store: Arc<RecordingStore>,
        auth: Arc<StaticAuth>,
        controller: SessionController,
        ctx: ChatContext,
        surface: RecordingSurface,
    }

    fn fixture(auth: StaticAuth) -> Fixture {
        let store = Arc::new(RecordingStore::new());
        let auth = Arc::new(auth);
        let gateway =
            PersistenceGateway::new(store.clone(), auth.clone(), DEFAULT_HISTORY_KEY).unwrap();
        Fixture {
            store,
            controller: SessionController::new(auth.clone(), gateway),
            auth,
            ctx: ChatContext::new(SYSTEM_PROMPT),
            surface: RecordingSurface::new(),
        }
    }

    const STORED: &str =
        r#"[{"role":"user","content":"hola"},{"role":"assistant","content":"hola!"}]"#;

    #[tokio::test]
    async fn anonymous_open_shows_only_the_greeting() {
        let mut f = fixture(StaticAuth::anonymous());

        f.controller.initialize(&mut f.ctx, &mut f.surface).await;

        assert_eq!(f.surface.visible(), vec![(Sender::Bot, GREETING.to_string())]);
        assert_eq!(f.surface.auth_control, Some(AuthControl::SignIn));
        assert_eq!(f.store.read_count(), 0);
        assert!(f.ctx.history.is_empty());
        assert!(f.controller.can_sign_in());
    }

    #[tokio::test]
    async fn authenticated_without_snapshot_shows_only_the_greeting() {
        let mut f = fixture(StaticAuth::signed_in("ana"));

        f.controller.initialize(&mut f.ctx, &mut f.surface).await;

        assert_eq!(f.surface.visible(), vec![(Sender::Bot, GREETING.to_string())]);
        assert_eq!(
            f.surface.auth_control,
            Some(AuthControl::SignedIn {
                username: "ana".to_string()
            })
        );
        assert_eq!(
            f.controller.state(),
            &SessionState::Authenticated(UserProfile::new("ana"))
        );
    }

    #[tokio::test]
    async fn authenticated_with_snapshot_restores_without_greeting() {
        let mut f = fixture(StaticAuth::signed_in("ana"));
        f.store.put_raw("ana", DEFAULT_HISTORY_KEY, STORED).await;

        f.controller.initialize(&mut f.ctx, &mut f.surface).await;

        assert_eq!(
            f.surface.visible(),
            vec![
                (Sender::User, "hola".to_string()),
                (Sender::Bot, "hola!".to_string()),
            ]
        );
        assert_eq!(
            f.ctx.history.messages(),
            &[
                Message::system(SYSTEM_PROMPT),
                Message::user("hola"),
                Message::assistant("hola!"),
            ]
        );
    }

    #[tokio::test]
    async fn unreadable_snapshot_falls_back_to_greeting() {
        let mut f = fixture(StaticAuth::signed_in("ana"));
        f.store.put_raw("ana", DEFAULT_HISTORY_KEY, "not json").await;

        f.controller.initialize(&mut f.ctx, &mut f.surface).await;

        assert_eq!(f.surface.visible(), vec![(Sender::Bot, GREETING.to_string())]);
        assert!(f.ctx.history.is_empty());
    }

    #[tokio::test]
    async fn unavailable_identity_continues_anonymously() {
        let auth = StaticAuth::signed_in("ana");
        auth.fail_user(true);
        let mut f = fixture(auth);

        f.controller.initialize(&mut f.ctx, &mut f.surface).await;

        assert_eq!(f.controller.state(), &SessionState::Anonymous);
        assert_eq!(f.surface.auth_control, Some(AuthControl::SignIn));
        assert_eq!(f.surface.visible(), vec![(Sender::Bot, GREETING.to_string())]);
    }

    #[tokio::test]
    async fn sign_in_without_snapshot_keeps_log_and_skips_second_greeting() {
        let mut f = fixture(StaticAuth::anonymous());
        f.controller.initialize(&mut f.ctx, &mut f.surface).await;
        f.ctx.history.push_user("hey");
        f.surface.append("hey", Sender::User, false);

        let profile = f
            .controller
            .sign_in(&mut f.ctx, &mut f.surface, "ana")
            .await
            .unwrap();

        assert_eq!(profile, UserProfile::new("ana"));
        assert_eq!(
            f.surface.visible(),
            vec![
                (Sender::Bot, GREETING.to_string()),
                (Sender::User, "hey".to_string()),
            ]
        );
        assert_eq!(f.ctx.history.conversation(), &[Message::user("hey")]);
        assert!(!f.controller.can_sign_in());
    }

    #[tokio::test]
    async fn sign_in_with_snapshot_replaces_the_log() {
        let mut f = fixture(StaticAuth::anonymous());
        f.store.put_raw("ana", DEFAULT_HISTORY_KEY, STORED).await;
        f.controller.initialize(&mut f.ctx, &mut f.surface).await;

        f.controller
            .sign_in(&mut f.ctx, &mut f.surface, "ana")
            .await
            .unwrap();

        assert_eq!(
            f.surface.visible(),
            vec![
                (Sender::User, "hola".to_string()),
                (Sender::Bot, "hola!".to_string()),
            ]
        );
        assert_eq!(f.ctx.history.len(), 3);
    }

    #[tokio::test]
    async fn abandoned_sign_in_stays_anonymous() {
        let mut f = fixture(StaticAuth::anonymous());
        f.controller.initialize(&mut f.ctx, &mut f.surface).await;

        let result = f.controller.sign_in(&mut f.ctx, &mut f.surface, "  ").await;

        assert!(matches!(result, Err(AuthError::SignInAbandoned { .. })));
        assert_eq!(f.controller.state(), &SessionState::Anonymous);
        assert_eq!(f.surface.auth_control, Some(AuthControl::SignIn));
        assert_eq!(f.store.read_count(), 0);
    }

    #[tokio::test]
    async fn sign_in_is_a_no_op_when_already_authenticated() {
        let mut f = fixture(StaticAuth::signed_in("ana"));
        f.controller.initialize(&mut f.ctx, &mut f.surface).await;

        let profile = f
            .controller
            .sign_in(&mut f.ctx, &mut f.surface, "luis")
            .await
            .unwrap();

        assert_eq!(profile, UserProfile::new("ana"));
        assert_eq!(f.auth.sign_in_calls(), 0);
    }
}
