use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    List,
    Detail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // Navigation
    MoveDown,
    MoveUp,
    PageDown,
    PageUp,

    // List view
    OpenMessage,
    NextMailbox,
    PrevMailbox,
    AllMailboxes,
    NewMailbox,

    // Detail view
    Back,
    /// Zero-based position in the tab bar.
    SelectTab(usize),
    NextTab,
    PrevTab,
    Confirm,
    ViewHtml,

    // Both views
    Delete,

    // System
    Quit,
    Noop,
}

/// Translate a key press into an action for the current view.
pub fn handle(key: KeyEvent, mode: ViewMode) -> Action {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Action::Quit;
    }
    match mode {
        ViewMode::List => handle_list(key),
        ViewMode::Detail => handle_detail(key),
    }
}

fn handle_list(key: KeyEvent) -> Action {
    match (key.code, key.modifiers) {
        (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => Action::MoveDown,
        (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => Action::MoveUp,
        (KeyCode::PageDown, _) | (KeyCode::Char('d'), KeyModifiers::CONTROL) => Action::PageDown,
        (KeyCode::PageUp, _) | (KeyCode::Char('u'), KeyModifiers::CONTROL) => Action::PageUp,
        (KeyCode::Enter, _) => Action::OpenMessage,

        (KeyCode::Tab, _) | (KeyCode::Char(']'), _) => Action::NextMailbox,
        (KeyCode::BackTab, _) | (KeyCode::Char('['), _) => Action::PrevMailbox,
        (KeyCode::Char('a'), KeyModifiers::NONE) => Action::AllMailboxes,
        (KeyCode::Char('n'), KeyModifiers::NONE) => Action::NewMailbox,

        (KeyCode::Char('d'), KeyModifiers::NONE) | (KeyCode::Delete, _) => Action::Delete,

        (KeyCode::Char('q'), KeyModifiers::NONE) | (KeyCode::Esc, _) => Action::Quit,
        _ => Action::Noop,
    }
}

fn handle_detail(key: KeyEvent) -> Action {
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _)
        | (KeyCode::Backspace, _)
        | (KeyCode::Char('q'), KeyModifiers::NONE) => Action::Back,

        (KeyCode::Char(c @ '1'..='9'), _) => Action::SelectTab(c as usize - '1' as usize),
        (KeyCode::Tab, _) | (KeyCode::Right, _) | (KeyCode::Char('l'), KeyModifiers::NONE) => {
            Action::NextTab
        }
        (KeyCode::BackTab, _) | (KeyCode::Left, _) | (KeyCode::Char('h'), KeyModifiers::NONE) => {
            Action::PrevTab
        }

        (KeyCode::Char('j'), KeyModifiers::NONE) | (KeyCode::Down, _) => Action::MoveDown,
        (KeyCode::Char('k'), KeyModifiers::NONE) | (KeyCode::Up, _) => Action::MoveUp,
        (KeyCode::PageDown, _)
        | (KeyCode::Char(' '), _)
        | (KeyCode::Char('d'), KeyModifiers::CONTROL) => Action::PageDown,
        (KeyCode::PageUp, _) | (KeyCode::Char('u'), KeyModifiers::CONTROL) => Action::PageUp,

        (KeyCode::Enter, _) | (KeyCode::Char('o'), KeyModifiers::NONE) => Action::Confirm,
        (KeyCode::Char('v'), KeyModifiers::NONE) => Action::ViewHtml,
        (KeyCode::Char('d'), KeyModifiers::NONE) | (KeyCode::Delete, _) => Action::Delete,
        _ => Action::Noop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn list_keys() {
        assert_eq!(handle(key(KeyCode::Char('j')), ViewMode::List), Action::MoveDown);
        assert_eq!(handle(key(KeyCode::Enter), ViewMode::List), Action::OpenMessage);
        assert_eq!(handle(key(KeyCode::Tab), ViewMode::List), Action::NextMailbox);
        assert_eq!(handle(key(KeyCode::Char('[')), ViewMode::List), Action::PrevMailbox);
        assert_eq!(handle(key(KeyCode::Char('n')), ViewMode::List), Action::NewMailbox);
        assert_eq!(handle(key(KeyCode::Esc), ViewMode::List), Action::Quit);
        assert_eq!(handle(key(KeyCode::Char('1')), ViewMode::List), Action::Noop);
    }

    #[test]
    fn detail_keys() {
        assert_eq!(handle(key(KeyCode::Esc), ViewMode::Detail), Action::Back);
        assert_eq!(handle(key(KeyCode::Char('1')), ViewMode::Detail), Action::SelectTab(0));
        assert_eq!(handle(key(KeyCode::Char('5')), ViewMode::Detail), Action::SelectTab(4));
        assert_eq!(handle(key(KeyCode::Right), ViewMode::Detail), Action::NextTab);
        assert_eq!(handle(key(KeyCode::Down), ViewMode::Detail), Action::MoveDown);
        assert_eq!(handle(key(KeyCode::Enter), ViewMode::Detail), Action::Confirm);
        assert_eq!(handle(key(KeyCode::Char('v')), ViewMode::Detail), Action::ViewHtml);
        assert_eq!(handle(key(KeyCode::Tab), ViewMode::Detail), Action::NextTab);
    }

    #[test]
    fn ctrl_c_always_quits() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(handle(ctrl_c, ViewMode::List), Action::Quit);
        assert_eq!(handle(ctrl_c, ViewMode::Detail), Action::Quit);
    }
}
