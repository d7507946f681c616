pub mod popup;
pub mod port_table;
pub mod theme;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::Modifier;
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;

use crate::app::{AppState, Mode, StatusLevel};

pub fn render(frame: &mut Frame, state: &mut AppState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Source / interval / error
            Constraint::Min(3),    // Port table
            Constraint::Length(1), // Filter input
            Constraint::Length(1), // Status line
        ])
        .split(frame.area());

    port_table::render_header(frame, state, chunks[0]);
    port_table::render_table(frame, state, chunks[1]);
    render_filter_line(frame, state, chunks[2]);
    render_status_line(frame, state, chunks[3]);

    match &state.mode {
        Mode::Help => popup::render_help(frame),
        Mode::Connect => popup::render_connect(frame, &state.connect_input),
        Mode::ConfirmKill { pid, name, force } => {
            popup::render_confirm_kill(frame, *pid, name, *force)
        }
        Mode::Normal | Mode::Filter => {}
    }
}

fn render_filter_line(frame: &mut Frame, state: &AppState, area: Rect) {
    let editing = matches!(state.mode, Mode::Filter);
    let pattern = if editing {
        state.filter_input.as_str()
    } else {
        state.view.filter_pattern()
    };

    let mut spans = vec![
        Span::styled("/ ", theme::search_style().add_modifier(Modifier::BOLD)),
        Span::styled(pattern.to_string(), theme::search_style()),
    ];
    if editing {
        spans.push(Span::styled(
            "_",
            theme::search_style().add_modifier(Modifier::SLOW_BLINK),
        ));
    }
    if !pattern.is_empty() && !state.view.filter_is_regex() {
        spans.push(Span::styled("  (substring)", theme::status_style()));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_status_line(frame: &mut Frame, state: &AppState, area: Rect) {
    let mut spans = vec![Span::styled(
        format!("  {}/{}", state.view.match_count(), state.view.total_count()),
        theme::status_style(),
    )];
    match state.status() {
        Some(msg) => {
            let style = match msg.level {
                StatusLevel::Info => theme::normal_style(),
                StatusLevel::Error => theme::error_style(),
            };
            spans.push(Span::styled(format!("  {}", msg.text), style));
        }
        None => spans.push(Span::styled("  ? for help", theme::status_style())),
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
