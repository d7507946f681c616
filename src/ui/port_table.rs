use ratatui::Frame;
use ratatui::layout::{Constraint, Rect};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Cell, Paragraph, Row, Table};

use crate::app::AppState;
use crate::model::{PortEntry, Source};
use crate::view::SortKey;
use super::theme;

const COLUMNS: [(SortKey, Constraint); 6] = [
    (SortKey::Port, Constraint::Length(8)),
    (SortKey::Protocol, Constraint::Length(7)),
    (SortKey::Pid, Constraint::Length(9)),
    (SortKey::Name, Constraint::Min(16)),
    (SortKey::Cpu, Constraint::Length(8)),
    (SortKey::Memory, Constraint::Length(11)),
];

/// Source, refresh interval and the last scan error, if any.
pub fn render_header(frame: &mut Frame, state: &AppState, area: Rect) {
    let snapshot = state.view.snapshot();
    let remote = matches!(snapshot.source, Source::Remote(_));

    let mut spans = vec![
        Span::styled(" portlens ", theme::header_style()),
        Span::styled(snapshot.source.to_string(), theme::source_style(remote)),
        Span::styled(
            format!("  every {:.1}s", state.interval.as_secs_f32()),
            theme::status_style(),
        ),
    ];
    if let Some(label) = &state.connecting {
        spans.push(Span::styled(
            format!("  connecting to {}...", label),
            theme::search_style(),
        ));
    }
    if let Some(err) = &snapshot.error {
        spans.push(Span::styled(format!("  ! {}", err), theme::error_style()));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

pub fn render_table(frame: &mut Frame, state: &mut AppState, area: Rect) {
    let sort_key = state.view.sort_key();
    let arrow = if state.view.sort_ascending() { "▲" } else { "▼" };

    let header = Row::new(COLUMNS.iter().map(|(key, _)| {
        if *key == sort_key {
            Cell::from(format!("{}{}", key.label(), arrow))
        } else {
            Cell::from(key.label())
        }
    }))
    .style(theme::header_style());

    let rows: Vec<Row> = state.view.rows().map(entry_row).collect();
    let widths = COLUMNS.map(|(_, width)| width);

    let table = Table::new(rows, widths)
        .header(header)
        .row_highlight_style(theme::selected_style())
        .highlight_symbol("> ");

    frame.render_stateful_widget(table, area, &mut state.table_state);
}

fn entry_row(entry: &PortEntry) -> Row<'static> {
    let style = if entry.is_suspicious {
        theme::suspicious_style()
    } else if entry.pid.is_none() {
        theme::unowned_style()
    } else {
        theme::normal_style()
    };

    let cpu = match entry.pid {
        Some(_) => format!("{:.1}", entry.cpu_percent),
        None => "-".to_string(),
    };
    let name = if entry.is_suspicious {
        format!("{} !", entry.name_or_dash())
    } else {
        entry.name_or_dash().to_string()
    };

    Row::new(vec![
        Cell::from(entry.port.to_string()),
        Cell::from(entry.protocol.to_string()),
        Cell::from(entry.pid_display()),
        Cell::from(name),
        Cell::from(cpu),
        Cell::from(entry.memory_display()),
    ])
    .style(style)
}
