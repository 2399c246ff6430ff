use super::copy::SIGN_IN_LABEL;
use super::message::{Message, Role};

/// Which side of the log an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    /// System instructions are never rendered.
    pub fn for_role(role: Role) -> Option<Self> {
        match role {
            Role::System => None,
            Role::User => Some(Self::User),
            Role::Assistant => Some(Self::Bot),
        }
    }
}

/// Stable reference to one rendered element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageHandle(pub u64);

/// Append-only message log with a transient typing placeholder.
///
/// Every mutation leaves the log scrolled to its newest entry.
pub trait MessageRenderer {
    /// Appends an element. With `typing` set the element is a pending placeholder.
    fn append(&mut self, content: &str, sender: Sender, typing: bool) -> MessageHandle;
    /// Overwrites the element's content.
    fn update(&mut self, handle: MessageHandle, content: &str);
    fn clear_pending(&mut self, handle: MessageHandle);
    fn remove(&mut self, handle: MessageHandle);
    fn is_pending(&self, handle: MessageHandle) -> bool;
    /// Empties the whole log.
    fn clear(&mut self);
}

/// State of the authentication control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthControl {
    /// Active control inviting the user to sign in.
    SignIn,
    /// Disabled control showing who is signed in.
    SignedIn { username: String },
}

impl AuthControl {
    pub fn label(&self) -> &str {
        match self {
            Self::SignIn => SIGN_IN_LABEL,
            Self::SignedIn { username } => username,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::SignIn)
    }
}

pub trait InputControls {
    fn set_input_enabled(&mut self, enabled: bool);
    fn focus_input(&mut self);
    fn set_auth_control(&mut self, control: AuthControl);
}

/// Everything the session controller and orchestrator need from a UI.
pub trait ChatSurface: MessageRenderer + InputControls {}

impl<T> ChatSurface for T where T: MessageRenderer + InputControls {}

/// Renders a stored message, skipping the system instruction.
pub fn render_message<R>(renderer: &mut R, message: &Message) -> Option<MessageHandle>
where
    R: MessageRenderer + ?Sized,
{
    let sender = Sender::for_role(message.role)?;
    Some(renderer.append(&message.content, sender, false))
}
