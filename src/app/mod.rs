use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::AppConfig;
use crate::journaling::CommitEvent;
use crate::model::NoteField;
use crate::store::NoteStore;
use crate::ui;

mod actions;

pub use actions::{action_for_key, Action, InputMode};

const TITLE_LIMIT: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    List,
    Form(NoteField),
}

pub struct App {
    pub config: Arc<AppConfig>,
    store: NoteStore,
    list_state: ListState,
    selected: usize,
    focus: Focus,
    status_message: Option<String>,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, store: NoteStore) -> Self {
        let tick_rate = config.store.tick_rate();
        Self {
            config,
            store,
            list_state: ListState::default(),
            selected: 0,
            focus: Focus::List,
            status_message: None,
            should_quit: false,
            tick_rate,
        }
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn input_mode(&self) -> InputMode {
        if self.store.pending_delete().is_some() {
            InputMode::ConfirmDelete
        } else if matches!(self.focus, Focus::Form(_)) {
            InputMode::Form
        } else {
            InputMode::List
        }
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        let restored = restore_terminal(&mut terminal);
        self.finish(result, restored)
    }

    /// Closes the store before reporting a loop or terminal-restore failure.
    fn finish(&mut self, result: Result<()>, restored: Result<()>) -> Result<()> {
        self.close();
        restored?;
        result
    }

    /// Commits outstanding edits and tears the store down.
    pub fn close(&mut self) {
        if let Some(CommitEvent::Error { message }) = self.store.flush() {
            tracing::error!(%message, "final commit failed");
        }
        self.store.shutdown();
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        loop {
            terminal
                .draw(|frame| {
                    let screen = ui::Screen {
                        store: &self.store,
                        focus: self.focus,
                        status_message: self.status_message.as_deref(),
                    };
                    if self.store.notes().is_empty() {
                        self.list_state.select(None);
                    } else {
                        self.list_state.select(Some(self.selected));
                    }
                    ui::draw_app(frame, &screen, &mut self.list_state);
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self
                .tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(0));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            if last_tick.elapsed() >= self.tick_rate {
                self.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if let Some(action) = action_for_key(key, self.input_mode()) {
            self.handle_action(action);
        }
    }

    pub fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.should_quit = true,
            Action::Undo => {
                if self.store.undo() {
                    self.focus_draft();
                } else {
                    self.set_status("Nothing to undo");
                }
            }
            Action::Redo => {
                if self.store.redo() {
                    self.focus_draft();
                } else {
                    self.set_status("Nothing to redo");
                }
            }
            Action::Flush => match self.store.flush() {
                Some(CommitEvent::Saved { notes, .. }) => {
                    self.set_status(format!("Saved {notes} note(s)"));
                }
                Some(CommitEvent::Error { message }) => {
                    self.set_status(format!("Save failed: {message}"));
                }
                None => self.set_status("Nothing to save"),
            },
            Action::AdoptExternal => {
                if self.store.adopt_external() {
                    if self.store.draft().is_none() {
                        self.focus = Focus::List;
                    }
                    self.set_status("Loaded the version from the other window");
                }
            }
            Action::SelectNext => self.move_selection(1),
            Action::SelectPrevious => self.move_selection(-1),
            Action::NewNote => {
                self.store.start_new_draft();
                self.focus = Focus::Form(NoteField::Title);
                self.status_message = None;
            }
            Action::OpenSelected => {
                if let Some(note) = self.store.notes().get(self.selected).cloned() {
                    self.store.open_draft(&note);
                    self.focus = Focus::Form(NoteField::Title);
                    self.status_message = None;
                }
            }
            Action::RequestDelete => {
                if let Some(note) = self.store.notes().get(self.selected).cloned() {
                    self.store.request_delete(&note);
                }
            }
            Action::ConfirmDelete => {
                let title = self
                    .store
                    .pending_delete()
                    .map(|note| note.title.clone())
                    .unwrap_or_default();
                if self.store.confirm_delete() {
                    if self.store.draft().is_none() {
                        self.focus = Focus::List;
                    }
                    self.clamp_selection();
                    self.set_status(format!("Deleted \"{title}\""));
                }
            }
            Action::CancelDelete => {
                self.store.cancel_delete();
                self.set_status("Delete canceled");
            }
            Action::SwitchField => {
                if let Focus::Form(field) = self.focus {
                    self.focus = Focus::Form(field.toggle());
                }
            }
            Action::LeaveForm => {
                self.store.close_draft();
                self.focus = Focus::List;
            }
            Action::InsertChar(ch) => self.edit_focused(|value, field| {
                if field == NoteField::Title && value.chars().count() >= TITLE_LIMIT {
                    return false;
                }
                value.push(ch);
                true
            }),
            Action::InsertNewline => match self.focus {
                Focus::Form(NoteField::Title) => self.focus = Focus::Form(NoteField::Content),
                Focus::Form(NoteField::Content) => self.edit_focused(|value, _| {
                    value.push('\n');
                    true
                }),
                Focus::List => {}
            },
            Action::Backspace => self.edit_focused(|value, _| {
                let Some((offset, _)) = value.grapheme_indices(true).next_back() else {
                    return false;
                };
                value.truncate(offset);
                true
            }),
        }
    }

    pub fn on_tick(&mut self) {
        let report = self.store.tick();
        if report.external_applied {
            self.clamp_selection();
            let message = match self.store.conflict() {
                Some(conflict) => format!(
                    "This note was {}; keep typing to keep yours, Ctrl-r to load theirs",
                    conflict.describe()
                ),
                None => "Notes updated from another window".to_string(),
            };
            self.set_status(message);
        }
        if let Some(CommitEvent::Error { message }) = report.commit {
            self.set_status(format!("Save failed: {message}"));
        }
    }

    fn edit_focused(&mut self, apply: impl FnOnce(&mut String, NoteField) -> bool) {
        let Focus::Form(field) = self.focus else {
            return;
        };
        let mut value = self
            .store
            .draft()
            .map(|draft| draft.field(field).to_string())
            .unwrap_or_default();
        if apply(&mut value, field) {
            self.store.edit_field(field, value);
        }
    }

    fn focus_draft(&mut self) {
        if self.store.draft().is_some() && self.focus == Focus::List {
            self.focus = Focus::Form(NoteField::Title);
        }
        self.clamp_selection();
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.store.notes().len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let next = self.selected as isize + delta;
        self.selected = next.clamp(0, len as isize - 1) as usize;
    }

    fn clamp_selection(&mut self) {
        let len = self.store.notes().len();
        self.selected = self.selected.min(len.saturating_sub(1));
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal backend")?;
    terminal.hide_cursor().context("hiding cursor")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageOptions;
    use crossterm::event::{KeyCode, KeyModifiers};
    use tempfile::TempDir;

    fn app(temp: &TempDir) -> anyhow::Result<App> {
        let mut config = AppConfig::default();
        config.storage = StorageOptions::at(temp.path().join("notes.db"));
        let store = NoteStore::open(&config)?;
        Ok(App::new(Arc::new(config), store))
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    #[test]
    fn typing_a_new_note_commits_every_keystroke() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = app(&temp)?;
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.focus(), Focus::Form(NoteField::Title));
        type_text(&mut app, "Hi");
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "there");
        press(&mut app, KeyCode::Backspace);

        let notes = app.store().notes();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Hi");
        assert_eq!(notes[0].content, "ther");
        Ok(())
    }

    #[test]
    fn ctrl_z_undoes_instead_of_typing() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = app(&temp)?;
        press(&mut app, KeyCode::Char('n'));
        type_text(&mut app, "ab");
        app.handle_key(KeyEvent::new(KeyCode::Char('z'), KeyModifiers::CONTROL));
        assert_eq!(app.store().notes()[0].title, "a");
        app.handle_key(KeyEvent::new(
            KeyCode::Char('Z'),
            KeyModifiers::CONTROL | KeyModifiers::SHIFT,
        ));
        assert_eq!(app.store().notes()[0].title, "ab");
        Ok(())
    }

    #[test]
    fn delete_goes_through_the_modal() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = app(&temp)?;
        press(&mut app, KeyCode::Char('n'));
        type_text(&mut app, "x");
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.focus(), Focus::List);

        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.input_mode(), InputMode::ConfirmDelete);
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.store().notes().len(), 1);

        press(&mut app, KeyCode::Char('d'));
        press(&mut app, KeyCode::Char('y'));
        assert!(app.store().notes().is_empty());
        assert_eq!(app.status_message(), Some("Deleted \"x\""));
        Ok(())
    }

    #[test]
    fn quitting_flushes_pending_edits() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = app(&temp)?;
        press(&mut app, KeyCode::Char('n'));
        type_text(&mut app, "keep me");
        app.close();
        assert!(app.store().is_shut_down());

        let reopened = NoteStore::open(&app.config)?;
        assert_eq!(reopened.notes()[0].title, "keep me");
        Ok(())
    }

    #[test]
    fn failed_terminal_restore_still_flushes() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let mut app = app(&temp)?;
        press(&mut app, KeyCode::Char('n'));
        type_text(&mut app, "late edit");

        let outcome = app.finish(Ok(()), Err(anyhow::anyhow!("terminal gone")));
        assert!(outcome.is_err());
        assert!(app.store().is_shut_down());

        let reopened = NoteStore::open(&app.config)?;
        assert_eq!(reopened.notes()[0].title, "late edit");
        Ok(())
    }
}
