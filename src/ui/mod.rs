mod help;
mod list;

use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Wrap};
use ratatui::Frame;

use crate::app::App;

/// Draw the whole screen. Reads state only.
pub fn render(frame: &mut Frame, app: &App) {
    if app.ui().exiting {
        render_message(frame, "Flushing pending changes... bye!", Color::Cyan);
        return;
    }
    if app.loading && app.notifications.is_empty() {
        render_message(frame, "Loading notifications...", Color::Yellow);
        return;
    }
    if let Some(error) = &app.error {
        render_error(frame, error);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(frame.area());

    list::render_tab_bar(frame, app, chunks[0]);
    list::render_list(frame, app, chunks[1]);
    render_footer(frame, app, chunks[2]);

    if app.ui().show_help {
        help::render(frame);
    }
}

fn render_message(frame: &mut Frame, message: &str, color: Color) {
    let area = help::centered_rect(60, 1, frame.area());
    let text = Paragraph::new(Span::styled(
        message.to_string(),
        Style::default().fg(color).add_modifier(Modifier::BOLD),
    ))
    .alignment(Alignment::Center);
    frame.render_widget(text, area);
}

fn render_error(frame: &mut Frame, error: &str) {
    let mut lines: Vec<Line> = error
        .lines()
        .map(|l| Line::from(Span::styled(l.to_string(), Style::default().fg(Color::Red))))
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "R: retry • q: quit",
        Style::default().fg(Color::DarkGray),
    )));

    let area = help::centered_rect(70, lines.len() as u16 + 2, frame.area());
    let text = Paragraph::new(lines).wrap(Wrap { trim: false });
    frame.render_widget(text, area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1), Constraint::Length(1)])
        .split(area);

    let divider = "─".repeat(area.width as usize);
    frame.render_widget(
        Paragraph::new(Span::styled(divider, Style::default().fg(Color::DarkGray))),
        rows[0],
    );

    let info = match (&app.notice, app.current_tab()) {
        (Some(notice), _) => Span::styled(notice.clone(), Style::default().fg(Color::Red)),
        (None, Some(tab)) => Span::styled(
            list::tab_help(tab.name).unwrap_or_default(),
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        ),
        (None, None) => Span::raw(""),
    };
    frame.render_widget(Paragraph::new(info), rows[1]);

    let keys = &app.ui().keys;
    let queued = app.pending_count();
    let pending = if keys.escape_pending() {
        "Press Esc again to quit".to_string()
    } else if keys.g_pending() {
        "g".to_string()
    } else if app.loading {
        "refreshing…".to_string()
    } else if queued > 0 {
        format!("{} pending", queued)
    } else {
        String::new()
    };

    let hints = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(pending.chars().count() as u16)])
        .split(rows[2]);
    frame.render_widget(
        Paragraph::new(Span::styled(
            "tab/shift+tab switch • ↑/↓ nav • enter open • m/M read/unread • d/y done • ? help",
            Style::default().fg(Color::DarkGray),
        )),
        hints[0],
    );
    frame.render_widget(
        Paragraph::new(Span::styled(pending, Style::default().fg(Color::Yellow))),
        hints[1],
    );
}
