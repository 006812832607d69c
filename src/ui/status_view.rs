use ratatui::{
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::app::{AppState, InfoKind, Operation, StatusSnapshot};
use crate::push::{PermissionState, ReadinessState};

/// ステータス・ボタン・情報・購読詳細を描画
pub fn render(frame: &mut Frame, area: Rect, state: &AppState) {
    let details = state.details_json();
    let info_height = if state.info.is_some() { 3 } else { 0 };

    let chunks = Layout::vertical([
        Constraint::Length(6),           // ステータス
        Constraint::Length(3),           // ボタン
        Constraint::Length(info_height), // 情報メッセージ
        Constraint::Min(0),              // 購読詳細
    ])
    .split(area);

    render_status(frame, chunks[0], state.snapshot.as_ref());
    render_buttons(frame, chunks[1], state);
    if let Some(ref info) = state.info {
        let color = match info.kind {
            InfoKind::Success => Color::Green,
            InfoKind::Error => Color::Red,
        };
        let paragraph = Paragraph::new(info.text.as_str())
            .style(Style::default().fg(color))
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color)));
        frame.render_widget(paragraph, chunks[2]);
    }
    if let Some(json) = details {
        let paragraph = Paragraph::new(json).block(
            Block::default()
                .title(" Subscription Details ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        );
        frame.render_widget(paragraph, chunks[3]);
    }
}

fn render_status(frame: &mut Frame, area: Rect, snapshot: Option<&StatusSnapshot>) {
    let lines = match snapshot {
        Some(s) => {
            let support = if s.supported {
                ("Supported", Color::Green)
            } else {
                ("Not Supported", Color::Red)
            };
            let permission = match s.permission {
                PermissionState::Granted => ("Granted", Color::Green),
                PermissionState::Denied => ("Denied", Color::Red),
                PermissionState::Default => ("Not Requested", Color::Yellow),
                PermissionState::Unsupported => ("Unavailable", Color::DarkGray),
            };
            let subscription = if s.subscribed {
                ("Active", Color::Green)
            } else {
                ("Not Subscribed", Color::Red)
            };
            let sdk = match &s.sdk {
                ReadinessState::Ready => ("Ready".to_string(), Color::Green),
                ReadinessState::Failed(cause) => (format!("Failed: {}", cause), Color::Red),
                ReadinessState::Uninitialized | ReadinessState::Initializing => {
                    ("Loading...".to_string(), Color::Yellow)
                }
            };

            vec![
                status_line("Browser Support:     ", support.0, support.1),
                status_line("Permission Status:   ", permission.0, permission.1),
                status_line("Subscription Status: ", subscription.0, subscription.1),
                status_line("SDK Status:          ", &sdk.0, sdk.1),
            ]
        }
        None => vec![Line::from(Span::styled(
            "Checking...",
            Style::default().fg(Color::DarkGray),
        ))],
    };

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .title(" Push Notifications ")
            .title_alignment(Alignment::Center)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(paragraph, area);
}

fn status_line<'a>(label: &'a str, value: &str, color: Color) -> Line<'a> {
    Line::from(vec![
        Span::styled(label, Style::default().fg(Color::Yellow)),
        Span::styled(value.to_string(), Style::default().fg(color)),
    ])
}

fn render_buttons(frame: &mut Frame, area: Rect, state: &AppState) {
    let label = |op: Operation, idle: &'static str| match state.pending {
        Some(pending) if pending == op => pending.pending_label(),
        _ => idle,
    };

    let buttons = [
        (
            "s",
            label(Operation::Subscribe, "Enable Push Notifications"),
            state.can_subscribe(),
        ),
        (
            "u",
            label(Operation::Unsubscribe, "Disable Push Notifications"),
            state.can_unsubscribe(),
        ),
        (
            "t",
            label(Operation::TestNotification, "Show Test Notification"),
            state.can_test(),
        ),
    ];

    let mut spans = Vec::new();
    for (key, text, enabled) in buttons {
        let style = if enabled {
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::styled(format!(" [{}] {} ", key, text), style));
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    frame.render_widget(paragraph, area);
}
