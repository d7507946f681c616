use ratatui::Frame;
use ratatui::layout::{Constraint, Flex, Layout, Rect};
use ratatui::style::Modifier;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

use super::theme;
use crate::correlate::SUSPICIOUS_LABEL;

const HELP: &[(&str, &str)] = &[
    ("q, Ctrl+C", "quit"),
    ("Up/Down, j/k", "move selection"),
    ("PgUp/PgDn, Home/End", "jump"),
    ("/", "filter (regex, falls back to substring)"),
    ("Esc", "clear filter"),
    ("1-6, P O I N C M", "sort by column, again to reverse"),
    ("s / r", "next sort column / reverse order"),
    ("Enter, K", "kill selected (SIGTERM)"),
    ("F", "force kill selected (SIGKILL)"),
    ("c / d", "connect over SSH / back to localhost"),
    ("+ / -", "refresh slower / faster"),
    ("F5", "refresh now"),
    ("?", "toggle this help"),
    ("red row ending in !", SUSPICIOUS_LABEL),
    ("", "(a heuristic from CPU and parent, not a process state)"),
];

/// A box of the given size centered in `area`, clipped to fit.
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height.min(area.height))])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Length(width.min(area.width))])
        .flex(Flex::Center)
        .areas(row);
    cell
}

fn boxed<'a>(title: &'a str) -> Block<'a> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(theme::popup_border_style())
        .title(Span::styled(title, theme::header_style()))
}

pub fn render_help(frame: &mut Frame) {
    let lines: Vec<Line> = HELP
        .iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(format!(" {:<22}", keys), theme::search_style()),
                Span::styled(*what, theme::normal_style()),
            ])
        })
        .collect();

    let area = centered(frame.area(), 68, HELP.len() as u16 + 2);
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(boxed(" Keys ")), area);
}

pub fn render_confirm_kill(frame: &mut Frame, pid: u32, name: &str, force: bool) {
    let signal = if force { "SIGKILL" } else { "SIGTERM" };
    let lines = vec![
        Line::from(vec![
            Span::raw(" Send "),
            Span::styled(signal, theme::error_style()),
            Span::raw(format!(" to {} (PID {})?", name, pid)),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            " y/Enter confirm   n/Esc cancel   f toggle force",
            theme::status_style(),
        )),
    ];

    let area = centered(frame.area(), 56, 5);
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(boxed(" Kill ")), area);
}

pub fn render_connect(frame: &mut Frame, input: &str) {
    let lines = vec![
        Line::from(vec![
            Span::styled(" > ", theme::search_style().add_modifier(Modifier::BOLD)),
            Span::styled(input, theme::search_style()),
            Span::styled("_", theme::search_style().add_modifier(Modifier::SLOW_BLINK)),
        ]),
        Line::from(Span::styled(
            " [user@]host[:port]   Enter connect   Esc cancel",
            theme::status_style(),
        )),
    ];

    let area = centered(frame.area(), 56, 4);
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(boxed(" Connect ")), area);
}
