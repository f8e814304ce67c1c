use chrono::{DateTime, Duration, Utc};
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs};
use ratatui::Frame;

use crate::app::App;
use crate::tabs::{ALREADY_REVIEWED, MERGED, NEEDS_YOUR_REVIEW};
use crate::types::{ParsedNotification, Reason, StatusCheckState};

const TITLE_WIDTH: usize = 50;

pub fn render_tab_bar(frame: &mut Frame, app: &App, area: Rect) {
    let tabs = app.tabs();
    let titles: Vec<Line> = tabs
        .iter()
        .map(|t| Line::from(format!("{} ({})", t.name, t.count)))
        .collect();

    let selected = app
        .ui()
        .selected_tab_index
        .min(tabs.len().saturating_sub(1));
    let bar = Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(Color::Gray))
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .divider(Span::styled("│", Style::default().fg(Color::DarkGray)));

    frame.render_widget(bar, area);
}

pub fn render_list(frame: &mut Frame, app: &App, area: Rect) {
    let visible = app.visible();
    let block = Block::default()
        .borders(Borders::TOP)
        .border_style(Style::default().fg(Color::DarkGray));

    if visible.is_empty() {
        let empty = Paragraph::new("Inbox zero. Nothing needs you right now.")
            .block(block)
            .style(Style::default().fg(Color::Gray));
        frame.render_widget(empty, area);
        return;
    }

    let selected = app.ui().selected_index;
    let now = Utc::now();
    let items: Vec<ListItem> = visible
        .iter()
        .enumerate()
        .map(|(i, n)| ListItem::new(row(n, i == selected, now)))
        .collect();

    let list = List::new(items).block(block);
    let mut state = ListState::default();
    state.select(Some(selected.min(visible.len() - 1)));
    frame.render_stateful_widget(list, area, &mut state);
}

fn row(n: &ParsedNotification, is_selected: bool, now: DateTime<Utc>) -> Line<'static> {
    let read = !n.unread;
    let muted = |color: Color| Style::default().fg(if read { Color::Gray } else { color });

    let bullet = if is_selected {
        Span::styled(
            "❯ ",
            Style::default()
                .fg(if read { Color::Gray } else { Color::Cyan })
                .add_modifier(Modifier::BOLD),
        )
    } else if n.unread {
        Span::styled("● ", Style::default().fg(Color::Cyan))
    } else {
        Span::styled("○ ", Style::default().fg(Color::Gray))
    };

    let title_color = if is_selected {
        Color::White
    } else if read {
        Color::Gray
    } else if n.is_closed {
        Color::Red
    } else if n.reason == Reason::Merged {
        Color::Magenta
    } else {
        Color::Reset
    };
    let mut title_style = Style::default().fg(title_color);
    if n.unread {
        title_style = title_style.add_modifier(Modifier::BOLD);
    }

    let mut spans = vec![
        bullet,
        Span::styled(truncate(&n.title, TITLE_WIDTH), title_style),
    ];

    if n.is_closed {
        spans.push(Span::styled(" (closed)", muted(Color::Red)));
    }
    if let Some(author) = &n.author {
        spans.push(Span::styled(
            format!(" @{}", author),
            Style::default()
                .fg(if is_selected { Color::White } else { Color::Gray })
                .add_modifier(Modifier::ITALIC),
        ));
    }

    let mut age = format!(" {}", format_age(n.updated_at, now));
    if now.signed_duration_since(n.created_at) >= Duration::days(14) {
        age.push_str(&format!(", created {}", format_age(n.created_at, now)));
    }
    spans.push(Span::styled(
        age,
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    ));

    if let Some(status) = n.status_check {
        let color = match status {
            StatusCheckState::Success => Color::Green,
            StatusCheckState::Failure => Color::Red,
            StatusCheckState::Pending => Color::Yellow,
        };
        spans.push(Span::styled(format!(" {}", status), muted(color)));
    }
    if let Some(from) = &n.review_requested_from {
        spans.push(Span::styled(format!(" review: {}", from), muted(Color::Yellow)));
    }
    if let Some(team) = &n.team_reviewed_by {
        spans.push(Span::styled(
            format!(" {} {} for {}", team.reviewer, team.state, team.team),
            muted(Color::Cyan),
        ));
    }
    if let Some(by) = &n.replied_by {
        spans.push(Span::styled(format!(" {} replied", by), muted(Color::Magenta)));
    }
    if !n.reason.has_dedicated_tab() {
        spans.push(Span::styled(format!(" [{}]", n.reason), muted(Color::Blue)));
    }

    Line::from(spans)
}

/// One-line description of a tab, shown above the key hints
pub fn tab_help(tab: &str) -> Option<&'static str> {
    match tab {
        NEEDS_YOUR_REVIEW => Some("You or your team's review is showing as pending on these PRs."),
        "replied to you" => Some("Someone replied to one of your comments on these PRs."),
        ALREADY_REVIEWED => Some("You already reviewed these PRs."),
        "team reviewed" => Some("Your review was requested, but a teammate already reviewed."),
        "mention" => Some("You were mentioned in these PRs."),
        "comment" => Some("New comments on PRs you're involved with."),
        MERGED => Some("These PRs have been merged (or closed)."),
        "draft" => Some("These PRs are still drafts."),
        _ => None,
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Compact age: 45s, 12m, 3h, 5d, 2w, 4mo, 1y
pub fn format_age(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(dt).num_seconds().max(0);
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if seconds < 60 {
        format!("{}s", seconds)
    } else if minutes < 60 {
        format!("{}m", minutes)
    } else if hours < 24 {
        format!("{}h", hours)
    } else if days < 7 {
        format!("{}d", days)
    } else if days < 28 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", (days / 30).max(1))
    } else {
        format!("{}y", days / 365)
    }
}
