use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

pub const SESSION_FILE_NAME: &str = "session.json";

/// Longest accepted username, in characters.
pub const MAX_USERNAME_CHARS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
}

impl UserProfile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display("no user is signed in"))]
    NotSignedIn { stage: &'static str },
    #[snafu(display("sign-in was abandoned"))]
    SignInAbandoned { stage: &'static str },
    #[snafu(display("username '{username}' is not acceptable: {reason}"))]
    InvalidUsername {
        stage: &'static str,
        username: String,
        reason: &'static str,
    },
    #[snafu(display("failed to create session directory at {path:?} on `{stage}`: {source}"))]
    CreateSessionDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize session on `{stage}`: {source}"))]
    SerializeSession {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write session file at {path:?} on `{stage}`: {source}"))]
    WriteSession {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace session file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to remove session file at {path:?} on `{stage}`: {source}"))]
    RemoveSession {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Identity gate in front of the key-value store.
pub trait AuthService: Send + Sync {
    fn is_signed_in(&self) -> bool;
    fn user(&self) -> BoxFuture<'_, AuthResult<UserProfile>>;
    /// Completes an interactive sign-in with the label the user entered.
    /// A blank label means the user abandoned the attempt.
    fn sign_in<'a>(&'a self, username: &'a str) -> BoxFuture<'a, AuthResult<UserProfile>>;
    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>>;
}

/// Checks and normalizes a username typed at the sign-in prompt.
pub fn validate_username(raw: &str) -> AuthResult<String> {
    let username = raw.trim();
    ensure!(
        !username.is_empty(),
        SignInAbandonedSnafu {
            stage: "validate-username",
        }
    );
    ensure!(
        username.chars().count() <= MAX_USERNAME_CHARS,
        InvalidUsernameSnafu {
            stage: "validate-username",
            username: username.to_string(),
            reason: "too long",
        }
    );
    ensure!(
        !username.chars().any(char::is_control),
        InvalidUsernameSnafu {
            stage: "validate-username",
            username: username.to_string(),
            reason: "contains control characters",
        }
    );
    Ok(username.to_string())
}

/// Sign-in kept on this machine. The signed-in identity is recorded in a
/// session file so it survives restarts, the way a browser keeps a session.
pub struct LocalAuth {
    session_path: PathBuf,
    current: ArcSwapOption<UserProfile>,
}

impl LocalAuth {
    pub fn load(session_path: PathBuf) -> Self {
        let current = Self::load_from_disk(&session_path).map(Arc::new);
        Self {
            session_path,
            current: ArcSwapOption::new(current),
        }
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    fn load_from_disk(path: &Path) -> Option<UserProfile> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return None,
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "failed to read session file");
                return None;
            }
        };

        match serde_json::from_str::<UserProfile>(&content) {
            Ok(profile) => match validate_username(&profile.username) {
                Ok(username) => Some(UserProfile::new(username)),
                Err(error) => {
                    tracing::warn!(path = ?path, error = %error, "ignoring invalid session file");
                    None
                }
            },
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "failed to parse session file");
                None
            }
        }
    }

    fn persist(&self, profile: &UserProfile) -> AuthResult<()> {
        if let Some(parent) = self.session_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateSessionDirSnafu {
                stage: "create-session-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(profile).context(SerializeSessionSnafu {
            stage: "serialize-session-json",
        })?;

        let temp_path = self.session_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteSessionSnafu {
            stage: "write-temporary-session-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.session_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-session-file",
            from: temp_path,
            to: self.session_path.clone(),
        })?;

        Ok(())
    }
}

impl AuthService for LocalAuth {
    fn is_signed_in(&self) -> bool {
        self.current.load().is_some()
    }

    fn user(&self) -> BoxFuture<'_, AuthResult<UserProfile>> {
        Box::pin(async move {
            let current = self.current.load_full().context(NotSignedInSnafu {
                stage: "local-auth-user",
            })?;
            Ok(current.as_ref().clone())
        })
    }

    fn sign_in<'a>(&'a self, username: &'a str) -> BoxFuture<'a, AuthResult<UserProfile>> {
        Box::pin(async move {
            let profile = UserProfile::new(validate_username(username)?);
            self.persist(&profile)?;
            self.current.store(Some(Arc::new(profile.clone())));
            tracing::info!(username = %profile.username, "signed in");
            Ok(profile)
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async move {
            match std::fs::remove_file(&self.session_path) {
                Ok(()) => {}
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(AuthError::RemoveSession {
                        stage: "local-auth-sign-out",
                        path: self.session_path.clone(),
                        source,
                    });
                }
            }
            self.current.store(None);
            tracing::info!("signed out");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scratch_dir;

    #[test]
    fn validate_username_trims_and_rejects_blank() {
        assert_eq!(validate_username("  ana ").unwrap(), "ana");
        assert!(matches!(
            validate_username("   "),
            Err(AuthError::SignInAbandoned { .. })
        ));
        assert!(matches!(
            validate_username("a\u{7}b"),
            Err(AuthError::InvalidUsername { .. })
        ));
        assert!(matches!(
            validate_username(&"m".repeat(MAX_USERNAME_CHARS + 1)),
            Err(AuthError::InvalidUsername { .. })
        ));
    }

    #[tokio::test]
    async fn sign_in_persists_session_across_instances() {
        let session_path = scratch_dir("auth-persist").join(SESSION_FILE_NAME);
        let auth = LocalAuth::load(session_path.clone());
        assert!(!auth.is_signed_in());
        assert!(matches!(
            auth.user().await,
            Err(AuthError::NotSignedIn { .. })
        ));

        let profile = auth.sign_in(" ana ").await.unwrap();
        assert_eq!(profile, UserProfile::new("ana"));
        assert!(auth.is_signed_in());

        let reloaded = LocalAuth::load(session_path);
        assert!(reloaded.is_signed_in());
        assert_eq!(reloaded.user().await.unwrap(), UserProfile::new("ana"));

        reloaded.sign_out().await.unwrap();
        assert!(!reloaded.is_signed_in());
        assert!(!reloaded.session_path().exists());
    }

    #[tokio::test]
    async fn abandoned_sign_in_stays_anonymous() {
        let auth = LocalAuth::load(scratch_dir("auth-abandon").join(SESSION_FILE_NAME));

        assert!(matches!(
            auth.sign_in("").await,
            Err(AuthError::SignInAbandoned { .. })
        ));
        assert!(!auth.is_signed_in());
    }

    #[test]
    fn malformed_session_file_is_ignored() {
        let session_path = scratch_dir("auth-malformed").join(SESSION_FILE_NAME);
        std::fs::write(&session_path, "{not json").unwrap();

        assert!(!LocalAuth::load(session_path).is_signed_in());
    }
}
