use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::app::AppState;

const HINT: &str = " s/u/t  i/o consent  v page view  r refresh  q quit ";

/// ステータスバーを描画
pub fn render(frame: &mut Frame, area: Rect, state: &AppState) {
    let left_content = match (&state.pending, &state.snapshot) {
        (Some(op), _) => Span::styled(op.pending_label(), Style::default().fg(Color::Cyan)),
        (None, Some(snapshot)) => Span::styled(
            format!(
                " permission: {} | sdk: {} ",
                snapshot.permission,
                snapshot.sdk.label()
            ),
            Style::default().fg(Color::Gray),
        ),
        (None, None) => Span::styled(" checking... ", Style::default().fg(Color::Gray)),
    };

    let help_hint = Span::styled(
        HINT,
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    );

    let hint_width = HINT.len() as u16;

    // 左右に分けて表示
    let left = Paragraph::new(Line::from(left_content));
    let right = Paragraph::new(Line::from(help_hint));

    // 左側
    let left_area = Rect {
        x: area.x,
        y: area.y,
        width: area.width.saturating_sub(hint_width),
        height: area.height,
    };

    // 右側
    let right_area = Rect {
        x: area.x + area.width.saturating_sub(hint_width),
        y: area.y,
        width: hint_width.min(area.width),
        height: area.height,
    };

    frame.render_widget(left, left_area);
    frame.render_widget(right, right_area);
}
