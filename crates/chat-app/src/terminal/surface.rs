use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use crossterm::cursor::{MoveLeft, MoveTo, MoveToColumn, MoveUp};
use crossterm::event::{
    DisableBracketedPaste, EnableBracketedPaste, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::style::{Print, PrintStyledContent, Stylize};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{execute, queue};
use unicode_width::UnicodeWidthStr;

use super::input::{EditorMode, InputEditor};
use crate::chat::copy::{BOT_LABEL, SIGN_IN_HINT, SIGN_IN_PROMPT, TYPING_INDICATOR, USER_LABEL};
use crate::chat::renderer::{AuthControl, InputControls, MessageHandle, MessageRenderer, Sender};

const FALLBACK_COLUMNS: u16 = 80;
const PROMPT: &str = "> ";
const CONTINUATION: &str = "  ";

fn clamp_u16(value: usize) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

/// Column count shared with the event reader, so a resize seen while a reply
/// streams still reaches the surface.
#[derive(Debug, Clone)]
pub struct TerminalWidth(Arc<AtomicU16>);

impl TerminalWidth {
    pub fn new(columns: u16) -> Self {
        Self(Arc::new(AtomicU16::new(columns.max(1))))
    }

    pub fn get(&self) -> u16 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, columns: u16) {
        self.0.store(columns.max(1), Ordering::Relaxed);
    }
}

#[derive(Debug, Clone)]
struct Element {
    handle: MessageHandle,
    sender: Sender,
    content: String,
    pending: bool,
}

/// The newest element, still open for in-place streaming.
#[derive(Debug, Clone)]
struct LiveElement {
    handle: MessageHandle,
    printed: String,
    indicator_visible: bool,
}

/// Scrollback renderer for a raw-mode terminal.
///
/// The log is printed top to bottom and the input area is painted below the
/// newest entry whenever input is enabled. While a reply streams the input
/// area is hidden, so fragments are written straight after the text already
/// on screen.
pub struct TerminalSurface<W: Write> {
    out: W,
    editor: InputEditor,
    elements: Vec<Element>,
    next_handle: u64,
    live: Option<LiveElement>,
    input_enabled: bool,
    input_rows: u16,
    auth_control: AuthControl,
    width: TerminalWidth,
}

impl TerminalSurface<io::Stdout> {
    pub fn stdout() -> Self {
        let columns = terminal::size()
            .map(|(columns, _)| columns)
            .unwrap_or(FALLBACK_COLUMNS);
        Self::new(io::stdout(), columns)
    }
}

impl<W: Write> TerminalSurface<W> {
    pub fn new(out: W, columns: u16) -> Self {
        Self {
            out,
            editor: InputEditor::new(),
            elements: Vec::new(),
            next_handle: 1,
            live: None,
            input_enabled: true,
            input_rows: 0,
            auth_control: AuthControl::SignIn,
            width: TerminalWidth::new(columns),
        }
    }

    pub fn editor(&self) -> &InputEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut InputEditor {
        &mut self.editor
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn is_input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn auth_control(&self) -> &AuthControl {
        &self.auth_control
    }

    pub fn width(&self) -> TerminalWidth {
        self.width.clone()
    }

    /// Repaints the input area after the editor changed.
    pub fn redraw_input(&mut self) {
        let result = self.repaint_input();
        self.report("redraw-input", result);
    }

    pub fn resize(&mut self, columns: u16) {
        self.width.set(columns);
        self.redraw_input();
    }

    /// Leaves the cursor on a fresh line below everything drawn.
    pub fn finish(&mut self) {
        let result = self.close_live().and_then(|()| {
            queue!(self.out, Print("\r\n"))?;
            self.out.flush()
        });
        self.report("finish", result);
    }

    fn report(&self, stage: &'static str, result: io::Result<()>) {
        if let Err(error) = result {
            tracing::warn!(stage, error = %error, "terminal write failed");
        }
    }

    fn allocate_handle(&mut self) -> MessageHandle {
        let handle = MessageHandle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    fn element_mut(&mut self, handle: MessageHandle) -> Option<&mut Element> {
        self.elements
            .iter_mut()
            .find(|element| element.handle == handle)
    }

    fn live_for(&mut self, handle: MessageHandle) -> Option<&mut LiveElement> {
        self.live.as_mut().filter(|live| live.handle == handle)
    }

    fn write_text(&mut self, text: &str) -> io::Result<()> {
        for (index, line) in text.split('\n').enumerate() {
            if index > 0 {
                queue!(self.out, Print("\r\n"))?;
            }
            queue!(self.out, Print(line))?;
        }
        Ok(())
    }

    fn write_label(&mut self, sender: Sender) -> io::Result<()> {
        match sender {
            Sender::User => queue!(
                self.out,
                PrintStyledContent(format!("{USER_LABEL}: ").blue().bold())
            ),
            Sender::Bot => queue!(
                self.out,
                PrintStyledContent(format!("{BOT_LABEL}: ").dark_grey().bold())
            ),
        }
    }

    fn close_live(&mut self) -> io::Result<()> {
        if self.live.take().is_some() {
            queue!(self.out, Print("\r\n"))?;
        }
        Ok(())
    }

    fn print_element(
        &mut self,
        handle: MessageHandle,
        content: &str,
        sender: Sender,
        typing: bool,
    ) -> io::Result<()> {
        self.write_label(sender)?;
        if typing {
            queue!(self.out, PrintStyledContent(TYPING_INDICATOR.dim()))?;
        } else {
            self.write_text(content)?;
        }
        self.live = Some(LiveElement {
            handle,
            printed: if typing { String::new() } else { content.to_string() },
            indicator_visible: typing,
        });
        Ok(())
    }

    fn hide_indicator(&mut self, handle: MessageHandle) -> io::Result<()> {
        let Some(live) = self.live_for(handle) else {
            return Ok(());
        };
        if !live.indicator_visible {
            return Ok(());
        }
        live.indicator_visible = false;
        let width = clamp_u16(TYPING_INDICATOR.width());
        queue!(self.out, MoveLeft(width), Clear(ClearType::UntilNewLine))
    }

    fn input_lines(&self) -> Vec<String> {
        let status = match self.editor.mode() {
            EditorMode::SignIn => SIGN_IN_PROMPT.to_string(),
            EditorMode::Compose => match &self.auth_control {
                AuthControl::SignIn => format!("[{SIGN_IN_HINT}] {}", self.auth_control.label()),
                AuthControl::SignedIn { username } => format!("@{username}"),
            },
        };

        let mut lines = vec![status];
        lines.extend(
            self.editor
                .buffer()
                .split('\n')
                .enumerate()
                .map(|(index, line)| {
                    let prefix = if index == 0 { PROMPT } else { CONTINUATION };
                    format!("{prefix}{line}")
                }),
        );
        lines
    }

    fn rows_for(&self, line: &str) -> u16 {
        let width = line.width().max(1);
        clamp_u16(width.div_ceil(usize::from(self.width.get())))
    }

    fn draw_input(&mut self) -> io::Result<()> {
        if !self.input_enabled {
            return Ok(());
        }
        self.close_live()?;

        let lines = self.input_lines();
        let mut rows = 0_u16;
        for (index, line) in lines.iter().enumerate() {
            if index > 0 {
                queue!(self.out, Print("\r\n"))?;
            }
            if index == 0 {
                queue!(self.out, PrintStyledContent(line.as_str().dark_grey()))?;
            } else {
                queue!(self.out, Print(line))?;
            }
            rows = rows.saturating_add(self.rows_for(line));
        }
        self.input_rows = rows;
        Ok(())
    }

    fn erase_input(&mut self) -> io::Result<()> {
        if self.input_rows == 0 {
            return Ok(());
        }
        if self.input_rows > 1 {
            queue!(self.out, MoveUp(self.input_rows - 1))?;
        }
        queue!(self.out, MoveToColumn(0), Clear(ClearType::FromCursorDown))?;
        self.input_rows = 0;
        Ok(())
    }

    fn repaint_input(&mut self) -> io::Result<()> {
        self.erase_input()?;
        self.draw_input()?;
        self.out.flush()
    }

    fn write_append(
        &mut self,
        handle: MessageHandle,
        content: &str,
        sender: Sender,
        typing: bool,
    ) -> io::Result<()> {
        self.erase_input()?;
        self.close_live()?;
        self.print_element(handle, content, sender, typing)?;
        self.draw_input()?;
        self.out.flush()
    }

    fn write_update(&mut self, handle: MessageHandle, content: &str) -> io::Result<()> {
        self.hide_indicator(handle)?;

        let suffix = self
            .live_for(handle)
            .and_then(|live| content.strip_prefix(live.printed.as_str()))
            .map(str::to_string);
        match suffix {
            Some(suffix) => {
                self.write_text(&suffix)?;
                if let Some(live) = self.live_for(handle) {
                    live.printed = content.to_string();
                }
            }
            None => {
                let Some((sender, content)) = self
                    .elements
                    .iter()
                    .find(|element| element.handle == handle)
                    .map(|element| (element.sender, element.content.clone()))
                else {
                    return Ok(());
                };
                self.erase_input()?;
                self.close_live()?;
                self.print_element(handle, &content, sender, false)?;
                self.draw_input()?;
            }
        }
        self.out.flush()
    }

    fn write_remove(&mut self, handle: MessageHandle) -> io::Result<()> {
        let removable = self
            .live_for(handle)
            .is_some_and(|live| live.printed.is_empty());
        if !removable {
            tracing::debug!(handle = handle.0, "removed element stays in scrollback");
            return Ok(());
        }
        self.live = None;
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        self.out.flush()
    }

    fn write_clear(&mut self) -> io::Result<()> {
        self.live = None;
        self.input_rows = 0;
        queue!(
            self.out,
            Clear(ClearType::All),
            Clear(ClearType::Purge),
            MoveTo(0, 0)
        )?;
        self.draw_input()?;
        self.out.flush()
    }
}

impl<W: Write> MessageRenderer for TerminalSurface<W> {
    fn append(&mut self, content: &str, sender: Sender, typing: bool) -> MessageHandle {
        let handle = self.allocate_handle();
        self.elements.push(Element {
            handle,
            sender,
            content: content.to_string(),
            pending: typing,
        });
        let result = self.write_append(handle, content, sender, typing);
        self.report("append", result);
        handle
    }

    fn update(&mut self, handle: MessageHandle, content: &str) {
        let Some(element) = self.element_mut(handle) else {
            return;
        };
        element.content = content.to_string();
        let result = self.write_update(handle, content);
        self.report("update", result);
    }

    fn clear_pending(&mut self, handle: MessageHandle) {
        if let Some(element) = self.element_mut(handle) {
            element.pending = false;
        }
        let result = self.hide_indicator(handle).and_then(|()| self.out.flush());
        self.report("clear-pending", result);
    }

    fn remove(&mut self, handle: MessageHandle) {
        self.elements.retain(|element| element.handle != handle);
        let result = self.write_remove(handle);
        self.report("remove", result);
    }

    fn is_pending(&self, handle: MessageHandle) -> bool {
        self.elements
            .iter()
            .any(|element| element.handle == handle && element.pending)
    }

    fn clear(&mut self) {
        self.elements.clear();
        let result = self.write_clear();
        self.report("clear", result);
    }
}

impl<W: Write> InputControls for TerminalSurface<W> {
    fn set_input_enabled(&mut self, enabled: bool) {
        if enabled == self.input_enabled {
            return;
        }
        let result = if enabled {
            self.input_enabled = true;
            self.draw_input().and_then(|()| self.out.flush())
        } else {
            let erased = self.erase_input().and_then(|()| self.out.flush());
            self.input_enabled = false;
            erased
        };
        self.report("set-input-enabled", result);
    }

    fn focus_input(&mut self) {
        let result = queue!(self.out, crossterm::cursor::Show).and_then(|()| self.out.flush());
        self.report("focus-input", result);
    }

    fn set_auth_control(&mut self, control: AuthControl) {
        self.auth_control = control;
        self.redraw_input();
    }
}

/// Raw mode and bracketed paste for the lifetime of the guard.
///
/// Terminals that understand the kitty keyboard protocol are also asked to
/// disambiguate escape codes. Without that, Shift+Enter arrives as a plain
/// Enter and only Alt+Enter can break a line.
pub struct TerminalGuard {
    keyboard_enhanced: bool,
}

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        // Built before the remaining setup so a failure below still restores the terminal.
        let mut guard = Self {
            keyboard_enhanced: false,
        };

        let mut stdout = io::stdout();
        execute!(stdout, EnableBracketedPaste)?;
        if terminal::supports_keyboard_enhancement().unwrap_or(false) {
            execute!(
                stdout,
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES)
            )?;
            guard.keyboard_enhanced = true;
        } else {
            tracing::info!("terminal lacks keyboard enhancement, Alt+Enter inserts line breaks");
        }
        Ok(guard)
    }

    fn restore(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        if self.keyboard_enhanced {
            execute!(stdout, PopKeyboardEnhancementFlags)?;
        }
        execute!(stdout, DisableBracketedPaste)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(error) = self.restore() {
            tracing::warn!(error = %error, "failed to reset terminal input modes");
        }
        if let Err(error) = terminal::disable_raw_mode() {
            tracing::warn!(error = %error, "failed to restore terminal mode");
        }
    }
}
