use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What the line editor is collecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Compose,
    SignIn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorAction {
    None,
    /// The buffer changed and the prompt needs repainting.
    Redraw,
    Submit(String),
    SignInRequested,
    SignIn(String),
    SignInAbandoned,
    Quit,
}

/// Multi-line input buffer. Enter submits, Shift+Enter or Alt+Enter breaks the line.
#[derive(Debug, Clone)]
pub struct InputEditor {
    mode: EditorMode,
    buffer: String,
    /// Compose text set aside while the sign-in prompt is open.
    stashed: String,
}

impl Default for InputEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl InputEditor {
    pub fn new() -> Self {
        Self {
            mode: EditorMode::Compose,
            buffer: String::new(),
            stashed: String::new(),
        }
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Number of rows the buffer occupies, which grows with each line break.
    pub fn line_count(&self) -> usize {
        self.buffer.split('\n').count()
    }

    fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    pub fn begin_sign_in(&mut self) {
        if self.mode == EditorMode::SignIn {
            return;
        }
        self.stashed = std::mem::take(&mut self.buffer);
        self.mode = EditorMode::SignIn;
    }

    fn end_sign_in(&mut self) -> String {
        let label = std::mem::replace(&mut self.buffer, std::mem::take(&mut self.stashed));
        self.mode = EditorMode::Compose;
        label
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> EditorAction {
        let control = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('d') if control => EditorAction::Quit,
            KeyCode::Char('c') if control => match self.mode {
                EditorMode::Compose => EditorAction::Quit,
                EditorMode::SignIn => {
                    self.end_sign_in();
                    EditorAction::SignInAbandoned
                }
            },
            KeyCode::Char('l') if control => match self.mode {
                EditorMode::Compose => EditorAction::SignInRequested,
                EditorMode::SignIn => EditorAction::None,
            },
            KeyCode::Char('u') if control => {
                self.buffer.clear();
                EditorAction::Redraw
            }
            KeyCode::Esc => match self.mode {
                EditorMode::Compose => EditorAction::None,
                EditorMode::SignIn => {
                    self.end_sign_in();
                    EditorAction::SignInAbandoned
                }
            },
            KeyCode::Enter => self.handle_enter(key.modifiers),
            KeyCode::Backspace => {
                if self.buffer.pop().is_some() {
                    EditorAction::Redraw
                } else {
                    EditorAction::None
                }
            }
            KeyCode::Char(_) if control || key.modifiers.contains(KeyModifiers::ALT) => {
                EditorAction::None
            }
            KeyCode::Char(character) => {
                self.buffer.push(character);
                EditorAction::Redraw
            }
            _ => EditorAction::None,
        }
    }

    /// Inserts pasted text with its line breaks. The sign-in prompt keeps only the first line.
    pub fn paste(&mut self, text: &str) -> EditorAction {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let inserted = match self.mode {
            EditorMode::Compose => text.as_str(),
            EditorMode::SignIn => text.lines().next().unwrap_or_default(),
        };
        if inserted.is_empty() {
            return EditorAction::None;
        }
        self.buffer.push_str(inserted);
        EditorAction::Redraw
    }

    fn handle_enter(&mut self, modifiers: KeyModifiers) -> EditorAction {
        match self.mode {
            EditorMode::SignIn => EditorAction::SignIn(self.end_sign_in()),
            EditorMode::Compose
                if modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) =>
            {
                self.buffer.push('\n');
                EditorAction::Redraw
            }
            EditorMode::Compose if self.buffer.trim().is_empty() => EditorAction::None,
            EditorMode::Compose => EditorAction::Submit(self.take_buffer()),
        }
    }
}
