pub mod input;
pub mod surface;

pub use input::{EditorAction, EditorMode, InputEditor};
pub use surface::{TerminalGuard, TerminalSurface, TerminalWidth};
