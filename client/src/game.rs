use log::debug;
use shared::{GameStateSnapshot, BOARD_WIDTH};

/// The client's picture of the game: whatever the host sent last.
///
/// Every snapshot replaces the previous one wholesale; nothing is merged or
/// predicted locally.
#[derive(Debug, Clone, Default)]
pub struct ClientView {
    latest: Option<GameStateSnapshot>,
    updates: u64,
}

impl ClientView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, snapshot: GameStateSnapshot) {
        self.updates += 1;
        debug!(
            "Snapshot {}: score {} at {:.2}s",
            self.updates, snapshot.score, snapshot.elapsed_time
        );
        self.latest = Some(snapshot);
    }

    pub fn latest(&self) -> Option<&GameStateSnapshot> {
        self.latest.as_ref()
    }

    pub fn score(&self) -> Option<i32> {
        self.latest.as_ref().map(|snapshot| snapshot.score)
    }

    /// Number of snapshots applied so far
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Text rendering of the board, top row first: `.` empty, `#` filled
    pub fn board_lines(&self) -> Vec<String> {
        let Some(snapshot) = &self.latest else {
            return Vec::new();
        };
        snapshot
            .board
            .iter()
            .map(|row| {
                let mut line = String::with_capacity(BOARD_WIDTH);
                line.extend(row.iter().map(|&cell| if cell == 0 { '.' } else { '#' }));
                line
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::BOARD_HEIGHT;

    #[test]
    fn test_empty_view() {
        let view = ClientView::new();
        assert!(view.latest().is_none());
        assert_eq!(view.score(), None);
        assert!(view.board_lines().is_empty());
    }

    #[test]
    fn test_snapshot_replaces_previous() {
        let mut view = ClientView::new();

        let mut first = GameStateSnapshot {
            score: 10,
            elapsed_time: 1.0,
            ..GameStateSnapshot::default()
        };
        first.board[0][0] = 1;
        view.apply(first);

        view.apply(GameStateSnapshot {
            score: 20,
            elapsed_time: 2.5,
            ..GameStateSnapshot::default()
        });

        let latest = view.latest().unwrap();
        assert_eq!(latest.score, 20);
        assert_approx_eq!(latest.elapsed_time, 2.5);
        assert_eq!(latest.board[0][0], 0);
        assert_eq!(view.updates(), 2);
    }

    #[test]
    fn test_board_lines() {
        let mut view = ClientView::new();
        let mut snapshot = GameStateSnapshot::default();
        snapshot.board[BOARD_HEIGHT - 1][0] = 3;
        snapshot.board[BOARD_HEIGHT - 1][9] = 1;
        view.apply(snapshot);

        let lines = view.board_lines();
        assert_eq!(lines.len(), BOARD_HEIGHT);
        assert_eq!(lines[0], "..........");
        assert_eq!(lines[BOARD_HEIGHT - 1], "#........#");
    }
}
