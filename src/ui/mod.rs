use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use time::{macros::format_description, OffsetDateTime};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::Focus;
use crate::journaling::CommitStatus;
use crate::model::{Note, NoteField};
use crate::store::NoteStore;

/// Everything the renderer reads. Borrowed from the app for one frame.
pub struct Screen<'a> {
    pub store: &'a NoteStore,
    pub focus: Focus,
    pub status_message: Option<&'a str>,
}

pub fn draw_app(frame: &mut Frame, screen: &Screen<'_>, list_state: &mut ListState) {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(frame.size());

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(vertical[0]);

    draw_list(frame, screen, columns[0], list_state);
    draw_form(frame, screen, columns[1]);

    let status = build_status_line(screen);
    frame.render_widget(
        Paragraph::new(status).style(Style::default().fg(Color::Gray)),
        vertical[1],
    );

    if let Some(note) = screen.store.pending_delete() {
        draw_delete_modal(frame, note);
    }
}

fn draw_list(frame: &mut Frame, screen: &Screen<'_>, area: Rect, list_state: &mut ListState) {
    let editing = screen.store.draft().and_then(|draft| draft.id);
    let width = area.width.saturating_sub(6) as usize;
    let items = screen
        .store
        .notes()
        .iter()
        .map(|note| {
            let mut spans = Vec::new();
            if editing == Some(note.id) {
                spans.push(Span::styled(
                    "✎ ",
                    Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD),
                ));
            }
            spans.push(Span::styled(
                truncate_to_width(display_title(&note.title), width),
                Style::default().add_modifier(Modifier::BOLD),
            ));
            let preview = note.content.lines().next().unwrap_or_default();
            ListItem::new(vec![
                Line::from(spans),
                Line::from(Span::styled(
                    truncate_to_width(preview, width),
                    Style::default().fg(Color::Gray),
                )),
            ])
        })
        .collect::<Vec<_>>();

    let border_style = if screen.focus == Focus::List {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    let list = List::new(items)
        .block(
            Block::default()
                .title(format!("Notes ({})", screen.store.notes().len()))
                .borders(Borders::ALL)
                .border_style(border_style),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("▸ ");
    frame.render_stateful_widget(list, area, list_state);
}

fn draw_form(frame: &mut Frame, screen: &Screen<'_>, area: Rect) {
    let Some(draft) = screen.store.draft() else {
        let hint = Paragraph::new(Text::from(vec![
            Line::from("No note open."),
            Line::from(""),
            Line::from(Span::styled(
                "n: new note • Enter: edit selected • d: delete",
                Style::default().fg(Color::Gray),
            )),
        ]))
        .block(Block::default().title("Editor").borders(Borders::ALL));
        frame.render_widget(hint, area);
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let heading = match (draft.id, screen.store.conflict()) {
        (_, Some(conflict)) => format!("Title (note {})", conflict.describe()),
        (Some(id), None) => format!("Title #{id}"),
        (None, None) => "Title (new note)".to_string(),
    };
    for (field, heading, rect) in [
        (NoteField::Title, heading, rows[0]),
        (NoteField::Content, "Content".to_string(), rows[1]),
    ] {
        let focused = screen.focus == Focus::Form(field);
        let mut value = draft.field(field).to_string();
        if focused {
            value.push('▌');
        }
        let border_style = match (focused, screen.store.conflict()) {
            (_, Some(_)) => Style::default().fg(Color::Yellow),
            (true, None) => Style::default().fg(Color::Cyan),
            (false, None) => Style::default(),
        };
        let paragraph = Paragraph::new(value)
            .block(
                Block::default()
                    .title(heading)
                    .borders(Borders::ALL)
                    .border_style(border_style),
            )
            .wrap(Wrap { trim: false });
        frame.render_widget(paragraph, rect);
    }
}

fn draw_delete_modal(frame: &mut Frame, note: &Note) {
    let area = centered_rect(50, 25, frame.size());
    frame.render_widget(Clear, area);
    let paragraph = Paragraph::new(vec![
        Line::from(Span::styled(
            "Delete this note?",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(display_title(&note.title).to_string()),
        Line::from(""),
        Line::from(Span::styled(
            "y/Enter to delete • n/Esc to keep",
            Style::default().fg(Color::Gray),
        )),
    ])
    .block(
        Block::default()
            .title("Confirm delete")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red)),
    )
    .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn build_status_line(screen: &Screen<'_>) -> Text<'static> {
    let store = screen.store;
    let mut spans = vec![
        Span::raw("Undo: "),
        availability(store.can_undo()),
        Span::raw(" | Redo: "),
        availability(store.can_redo()),
    ];

    match store.commit_status() {
        CommitStatus::Clean => spans.push(Span::raw(" | Disk: up to date")),
        CommitStatus::Saved { at, notes } => {
            spans.push(Span::raw(format!(" | Disk: saved {notes} at ")));
            spans.push(Span::styled(
                format_time_short(*at),
                Style::default().fg(Color::Gray),
            ));
        }
        CommitStatus::Pending { since } => {
            spans.push(Span::raw(" | Disk: "));
            spans.push(Span::styled(
                "pending",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::raw(format!(" since {}", format_time_short(*since))));
        }
        CommitStatus::Error { message, .. } => {
            spans.push(Span::raw(" | Disk: "));
            spans.push(Span::styled(
                format!("error ({message})"),
                Style::default().fg(Color::Red),
            ));
        }
    }

    if let Some(message) = screen.status_message {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(
            message.to_string(),
            Style::default().fg(Color::Cyan),
        ));
    }

    let keys = match screen.focus {
        Focus::List => "n new • Enter edit • d delete • j/k move • Ctrl-z/Ctrl-Shift-z undo/redo • q quit",
        Focus::Form(_) => "Tab switch field • Esc close • Ctrl-s save now • Ctrl-r take other window's version",
    };
    Text::from(vec![
        Line::from(spans),
        Line::from(Span::styled(keys, Style::default().fg(Color::DarkGray))),
    ])
}

fn availability(available: bool) -> Span<'static> {
    if available {
        Span::styled("yes", Style::default().fg(Color::Green))
    } else {
        Span::styled("no", Style::default().fg(Color::DarkGray))
    }
}

fn display_title(title: &str) -> &str {
    if title.trim().is_empty() {
        "(untitled)"
    } else {
        title
    }
}

fn truncate_to_width(text: &str, max_width: usize) -> String {
    if text.width() <= max_width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w + 1 > max_width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

fn format_time_short(dt: OffsetDateTime) -> String {
    dt.format(&format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
