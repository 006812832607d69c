pub mod status_bar;
pub mod status_view;

use ratatui::{
    layout::{Constraint, Layout},
    Frame,
};

use crate::app::AppState;

/// メインUIを描画
pub fn render(frame: &mut Frame, state: &AppState) {
    let area = frame.area();

    // メインレイアウト: ステータス + ステータスバー
    let chunks = Layout::vertical([
        Constraint::Min(5),    // ステータス
        Constraint::Length(1), // ステータスバー
    ])
    .split(area);

    status_view::render(frame, chunks[0], state);
    status_bar::render(frame, chunks[1], state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::StatusSnapshot;
    use crate::push::{PermissionState, ReadinessState};
    use ratatui::{backend::TestBackend, Terminal};
    use std::time::Duration;

    fn rendered(state: &AppState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|frame| render(frame, state)).unwrap();
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_renders_status_lines() {
        let mut state = AppState::new(Duration::from_secs(5));
        state.apply_snapshot(StatusSnapshot {
            supported: true,
            permission: PermissionState::Denied,
            subscribed: false,
            sdk: ReadinessState::Initializing,
            details: None,
        });
        state.show_error("Permission denied");

        let screen = rendered(&state);
        assert!(screen.contains("Not Subscribed"));
        assert!(screen.contains("Loading..."));
        assert!(screen.contains("Permission denied"));
    }

    #[test]
    fn test_renders_placeholder_before_snapshot() {
        let state = AppState::new(Duration::from_secs(5));
        assert!(rendered(&state).contains("Checking..."));
    }
}
