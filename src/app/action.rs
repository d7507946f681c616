use crate::app::state::Mode;
use crate::view::SortKey;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    MoveUp,
    MoveDown,
    PageUp,
    PageDown,
    First,
    Last,
    StartFilter,
    FilterInput(char),
    FilterBackspace,
    FilterCommit,
    ClearFilter,
    Sort(SortKey),
    CycleSort,
    ReverseSort,
    RequestKill { force: bool },
    ConfirmKill,
    CancelKill,
    ToggleForce,
    StartConnect,
    ConnectInput(char),
    ConnectBackspace,
    ConnectSubmit,
    CancelConnect,
    Disconnect,
    IntervalUp,
    IntervalDown,
    Refresh,
    ToggleHelp,
}

/// Map a key event to an action based on the current mode.
pub fn map_key_to_action(key: KeyEvent, mode: &Mode) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    // Ctrl+C quits from anywhere
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Action::Quit),
            KeyCode::Char('u') if matches!(mode, Mode::Filter) => Some(Action::ClearFilter),
            _ => None,
        };
    }

    match mode {
        Mode::Normal => map_normal_key(key),
        Mode::Filter => map_filter_key(key),
        Mode::Connect => map_connect_key(key),
        Mode::ConfirmKill { .. } => map_confirm_key(key),
        Mode::Help => map_help_key(key),
    }
}

fn map_normal_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Up | KeyCode::Char('k') => Some(Action::MoveUp),
        KeyCode::Down | KeyCode::Char('j') => Some(Action::MoveDown),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::Home => Some(Action::First),
        KeyCode::End => Some(Action::Last),
        KeyCode::Char('/') => Some(Action::StartFilter),
        KeyCode::Esc => Some(Action::ClearFilter),
        KeyCode::Char('1') | KeyCode::Char('P') => Some(Action::Sort(SortKey::Port)),
        KeyCode::Char('2') | KeyCode::Char('O') => Some(Action::Sort(SortKey::Protocol)),
        KeyCode::Char('3') | KeyCode::Char('I') => Some(Action::Sort(SortKey::Pid)),
        KeyCode::Char('4') | KeyCode::Char('N') => Some(Action::Sort(SortKey::Name)),
        KeyCode::Char('5') | KeyCode::Char('C') => Some(Action::Sort(SortKey::Cpu)),
        KeyCode::Char('6') | KeyCode::Char('M') => Some(Action::Sort(SortKey::Memory)),
        KeyCode::Char('s') => Some(Action::CycleSort),
        KeyCode::Char('r') => Some(Action::ReverseSort),
        KeyCode::Enter | KeyCode::Char('K') => Some(Action::RequestKill { force: false }),
        KeyCode::Char('F') => Some(Action::RequestKill { force: true }),
        KeyCode::Char('c') => Some(Action::StartConnect),
        KeyCode::Char('d') => Some(Action::Disconnect),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(Action::IntervalUp),
        KeyCode::Char('-') => Some(Action::IntervalDown),
        KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        _ => None,
    }
}

fn map_filter_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::ClearFilter),
        KeyCode::Enter => Some(Action::FilterCommit),
        KeyCode::Backspace => Some(Action::FilterBackspace),
        KeyCode::Up => Some(Action::MoveUp),
        KeyCode::Down => Some(Action::MoveDown),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::Char(c) => Some(Action::FilterInput(c)),
        _ => None,
    }
}

fn map_connect_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelConnect),
        KeyCode::Enter => Some(Action::ConnectSubmit),
        KeyCode::Backspace => Some(Action::ConnectBackspace),
        KeyCode::Char(c) => Some(Action::ConnectInput(c)),
        _ => None,
    }
}

fn map_confirm_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(Action::ConfirmKill),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(Action::CancelKill),
        KeyCode::Char('f') => Some(Action::ToggleForce),
        _ => None,
    }
}

fn map_help_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q') | KeyCode::Enter => {
            Some(Action::ToggleHelp)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn make_key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn make_ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    fn confirm_mode() -> Mode {
        Mode::ConfirmKill {
            pid: 42,
            name: "nginx".into(),
            force: false,
        }
    }

    #[test]
    fn test_ctrl_c_quits_in_every_mode() {
        for mode in [Mode::Normal, Mode::Filter, Mode::Connect, Mode::Help, confirm_mode()] {
            assert_eq!(map_key_to_action(make_ctrl('c'), &mode), Some(Action::Quit));
        }
    }

    #[test]
    fn test_release_events_ignored() {
        let mut key = make_key(KeyCode::Char('q'));
        key.kind = KeyEventKind::Release;
        key.state = KeyEventState::NONE;
        assert_eq!(map_key_to_action(key, &Mode::Normal), None);
    }

    #[test]
    fn test_normal_sort_keys() {
        let cases = [
            ('1', SortKey::Port),
            ('P', SortKey::Port),
            ('2', SortKey::Protocol),
            ('O', SortKey::Protocol),
            ('3', SortKey::Pid),
            ('I', SortKey::Pid),
            ('N', SortKey::Name),
            ('C', SortKey::Cpu),
            ('6', SortKey::Memory),
        ];
        for (c, expected) in cases {
            assert_eq!(
                map_key_to_action(make_key(KeyCode::Char(c)), &Mode::Normal),
                Some(Action::Sort(expected)),
                "key {}",
                c
            );
        }
    }

    #[test]
    fn test_normal_commands() {
        let normal = |code| map_key_to_action(make_key(code), &Mode::Normal);
        assert_eq!(normal(KeyCode::Char('q')), Some(Action::Quit));
        assert_eq!(normal(KeyCode::Char('j')), Some(Action::MoveDown));
        assert_eq!(normal(KeyCode::Home), Some(Action::First));
        assert_eq!(normal(KeyCode::Char('/')), Some(Action::StartFilter));
        assert_eq!(normal(KeyCode::Char('c')), Some(Action::StartConnect));
        assert_eq!(normal(KeyCode::Char('d')), Some(Action::Disconnect));
        assert_eq!(normal(KeyCode::Char('K')), Some(Action::RequestKill { force: false }));
        assert_eq!(normal(KeyCode::Char('F')), Some(Action::RequestKill { force: true }));
        assert_eq!(normal(KeyCode::Char('+')), Some(Action::IntervalUp));
        assert_eq!(normal(KeyCode::F(5)), Some(Action::Refresh));
        assert_eq!(normal(KeyCode::Char('x')), None);
    }

    #[test]
    fn test_filter_mode_types_letters() {
        // 'q' and 'j' are pattern characters while filtering
        assert_eq!(
            map_key_to_action(make_key(KeyCode::Char('q')), &Mode::Filter),
            Some(Action::FilterInput('q'))
        );
        assert_eq!(
            map_key_to_action(make_key(KeyCode::Esc), &Mode::Filter),
            Some(Action::ClearFilter)
        );
        assert_eq!(
            map_key_to_action(make_ctrl('u'), &Mode::Filter),
            Some(Action::ClearFilter)
        );
    }

    #[test]
    fn test_confirm_mode() {
        let mode = confirm_mode();
        assert_eq!(
            map_key_to_action(make_key(KeyCode::Char('y')), &mode),
            Some(Action::ConfirmKill)
        );
        assert_eq!(
            map_key_to_action(make_key(KeyCode::Esc), &mode),
            Some(Action::CancelKill)
        );
        assert_eq!(
            map_key_to_action(make_key(KeyCode::Char('f')), &mode),
            Some(Action::ToggleForce)
        );
        assert_eq!(map_key_to_action(make_key(KeyCode::Char('q')), &mode), None);
    }
}
