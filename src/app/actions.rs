use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What the key handler is currently routing input to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    List,
    Form,
    ConfirmDelete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Undo,
    Redo,
    Flush,
    AdoptExternal,
    SelectNext,
    SelectPrevious,
    NewNote,
    OpenSelected,
    RequestDelete,
    ConfirmDelete,
    CancelDelete,
    SwitchField,
    LeaveForm,
    InsertChar(char),
    InsertNewline,
    Backspace,
}

const COMMAND_MODIFIERS: KeyModifiers = KeyModifiers::CONTROL.union(KeyModifiers::SUPER);

/// Maps a key press to an action. Global shortcuts are checked before the
/// mode-specific bindings so that Ctrl/Cmd+Z never reaches text input.
pub fn action_for_key(key: KeyEvent, mode: InputMode) -> Option<Action> {
    if let Some(action) = global_shortcut(key) {
        return Some(action);
    }
    let plain = !key
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
    match mode {
        InputMode::ConfirmDelete => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => Some(Action::ConfirmDelete),
            KeyCode::Char('n') | KeyCode::Esc => Some(Action::CancelDelete),
            _ => None,
        },
        InputMode::Form => match key.code {
            KeyCode::Esc => Some(Action::LeaveForm),
            KeyCode::Tab | KeyCode::BackTab => Some(Action::SwitchField),
            KeyCode::Enter => Some(Action::InsertNewline),
            KeyCode::Backspace => Some(Action::Backspace),
            KeyCode::Char(ch) if plain => Some(Action::InsertChar(ch)),
            _ => None,
        },
        InputMode::List => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char('n') | KeyCode::Char('a') if plain => Some(Action::NewNote),
            KeyCode::Char('e') | KeyCode::Enter => Some(Action::OpenSelected),
            KeyCode::Char('d') | KeyCode::Delete if plain => Some(Action::RequestDelete),
            _ => None,
        },
    }
}

fn global_shortcut(key: KeyEvent) -> Option<Action> {
    if !key.modifiers.intersects(COMMAND_MODIFIERS) {
        return None;
    }
    match key.code {
        // Terminals disagree on whether Shift reports as a modifier, an
        // uppercase letter, or both.
        KeyCode::Char('z') if key.modifiers.contains(KeyModifiers::SHIFT) => Some(Action::Redo),
        KeyCode::Char('Z') => Some(Action::Redo),
        KeyCode::Char('z') => Some(Action::Undo),
        KeyCode::Char('s') => Some(Action::Flush),
        KeyCode::Char('r') => Some(Action::AdoptExternal),
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn undo_redo_shortcuts_win_in_every_mode() {
        for mode in [InputMode::List, InputMode::Form, InputMode::ConfirmDelete] {
            assert_eq!(
                action_for_key(key(KeyCode::Char('z'), KeyModifiers::CONTROL), mode),
                Some(Action::Undo)
            );
            assert_eq!(
                action_for_key(key(KeyCode::Char('z'), KeyModifiers::SUPER), mode),
                Some(Action::Undo)
            );
            assert_eq!(
                action_for_key(
                    key(
                        KeyCode::Char('Z'),
                        KeyModifiers::CONTROL | KeyModifiers::SHIFT
                    ),
                    mode
                ),
                Some(Action::Redo)
            );
            assert_eq!(
                action_for_key(
                    key(
                        KeyCode::Char('z'),
                        KeyModifiers::SUPER | KeyModifiers::SHIFT
                    ),
                    mode
                ),
                Some(Action::Redo)
            );
        }
    }

    #[test]
    fn plain_letters_are_text_in_the_form() {
        assert_eq!(
            action_for_key(key(KeyCode::Char('z'), KeyModifiers::NONE), InputMode::Form),
            Some(Action::InsertChar('z'))
        );
        assert_eq!(
            action_for_key(key(KeyCode::Char('Q'), KeyModifiers::SHIFT), InputMode::Form),
            Some(Action::InsertChar('Q'))
        );
        assert_eq!(
            action_for_key(key(KeyCode::Char('x'), KeyModifiers::ALT), InputMode::Form),
            None
        );
    }

    #[test]
    fn modal_only_accepts_confirm_or_cancel() {
        let mode = InputMode::ConfirmDelete;
        assert_eq!(
            action_for_key(key(KeyCode::Enter, KeyModifiers::NONE), mode),
            Some(Action::ConfirmDelete)
        );
        assert_eq!(
            action_for_key(key(KeyCode::Esc, KeyModifiers::NONE), mode),
            Some(Action::CancelDelete)
        );
        assert_eq!(
            action_for_key(key(KeyCode::Char('d'), KeyModifiers::NONE), mode),
            None
        );
    }

    #[test]
    fn list_bindings() {
        let mode = InputMode::List;
        assert_eq!(
            action_for_key(key(KeyCode::Char('n'), KeyModifiers::NONE), mode),
            Some(Action::NewNote)
        );
        assert_eq!(
            action_for_key(key(KeyCode::Char('d'), KeyModifiers::NONE), mode),
            Some(Action::RequestDelete)
        );
        assert_eq!(
            action_for_key(key(KeyCode::Char('c'), KeyModifiers::CONTROL), mode),
            Some(Action::Quit)
        );
    }
}
