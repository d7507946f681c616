use ratatui::style::{Color, Modifier, Style};

pub fn header_style() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

pub fn selected_style() -> Style {
    Style::default()
        .bg(Color::DarkGray)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD)
}

pub fn normal_style() -> Style {
    Style::default().fg(Color::White)
}

/// Rows whose owner could not be resolved.
pub fn unowned_style() -> Style {
    Style::default().fg(Color::Gray)
}

/// High CPU listener with no live parent.
pub fn suspicious_style() -> Style {
    Style::default()
        .fg(Color::LightRed)
        .add_modifier(Modifier::BOLD)
}

pub fn search_style() -> Style {
    Style::default().fg(Color::Green)
}

pub fn status_style() -> Style {
    Style::default().fg(Color::DarkGray)
}

pub fn error_style() -> Style {
    Style::default()
        .fg(Color::Red)
        .add_modifier(Modifier::BOLD)
}

pub fn source_style(remote: bool) -> Style {
    let color = if remote { Color::Magenta } else { Color::Green };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

pub fn popup_border_style() -> Style {
    Style::default().fg(Color::Yellow)
}
