//! Client-side view of a room's letters.
//!
//! Local edits are shown immediately and tracked as pending writes. A failed write puts the
//! cell back to the last value the server confirmed. Refreshes from the server are merged in
//! with [`GridSync::reconcile`], which never clobbers a write still in flight.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::FilledCell;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CellState {
    #[default]
    Idle,
    Pending {
        seq: u64,
    },
    Confirmed,
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct CellSync {
    // Last value known to be stored on the server.
    confirmed: String,
    displayed: String,
    state: CellState,
    // Value of the edit counter when the server state was last merged in.
    reconciled_at: u64,
}

/// A local write waiting for the server's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub row: i32,
    pub col: i32,
    pub value: String,
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GridSync {
    cells: HashMap<(i32, i32), CellSync>,
    next_seq: u64,
}

impl GridSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// The letter currently shown at (row, col).
    pub fn display(&self, row: i32, col: i32) -> String {
        self.cells
            .get(&(row, col))
            .map(|cell| cell.displayed.clone())
            .unwrap_or_default()
    }

    pub fn state(&self, row: i32, col: i32) -> CellState {
        self.cells
            .get(&(row, col))
            .map(|cell| cell.state.clone())
            .unwrap_or_default()
    }

    pub fn has_pending(&self) -> bool {
        self.cells
            .values()
            .any(|cell| matches!(cell.state, CellState::Pending { .. }))
    }

    /// Shows `value` right away and returns the write to submit.
    pub fn local_edit(&mut self, row: i32, col: i32, value: &str) -> PendingEdit {
        self.next_seq += 1;
        let seq = self.next_seq;
        let cell = self.cells.entry((row, col)).or_default();
        cell.displayed = value.to_string();
        cell.state = CellState::Pending { seq };
        PendingEdit {
            row,
            col,
            value: value.to_string(),
            seq,
        }
    }

    /// Records that the server stored `edit`.
    ///
    /// A refresh merged after the edit was issued is at least as recent as the write, so its
    /// value wins over the edit's. If it predates the write instead, the refresh announcing the
    /// write itself corrects the cell again.
    pub fn confirm(&mut self, edit: &PendingEdit) {
        let cell = self.cells.entry((edit.row, edit.col)).or_default();
        if cell.reconciled_at < edit.seq {
            cell.confirmed = edit.value.clone();
        }
        // A newer edit of the same cell is still in flight; leave it pending.
        if cell.state == (CellState::Pending { seq: edit.seq }) {
            cell.displayed = cell.confirmed.clone();
            cell.state = CellState::Confirmed;
        }
    }

    /// Records that the server rejected `edit` and rolls the cell back.
    pub fn fail(&mut self, edit: &PendingEdit, error: impl Into<String>) {
        let Some(cell) = self.cells.get_mut(&(edit.row, edit.col)) else {
            return;
        };
        if cell.state != (CellState::Pending { seq: edit.seq }) {
            // Superseded by a newer edit whose outcome decides what is shown.
            return;
        }
        cell.displayed = cell.confirmed.clone();
        cell.state = CellState::Failed {
            error: error.into(),
        };
    }

    /// Merges the authoritative list of filled cells fetched from the server. Cells missing
    /// from `authoritative` are empty on the server. Returns whether anything changed.
    pub fn reconcile(&mut self, authoritative: &[FilledCell]) -> bool {
        let fetched: HashMap<(i32, i32), &str> = authoritative
            .iter()
            .map(|cell| ((cell.row, cell.col), cell.value.as_str()))
            .collect();
        for key in fetched.keys() {
            self.cells.entry(*key).or_default();
        }

        let mut changed = false;
        let seq = self.next_seq;
        for (key, cell) in self.cells.iter_mut() {
            let server_value = fetched.get(key).copied().unwrap_or_default();
            cell.reconciled_at = seq;
            if cell.confirmed != server_value {
                cell.confirmed = server_value.to_string();
                // Someone else's write replaced the value that failed to save.
                if matches!(cell.state, CellState::Failed { .. }) {
                    cell.state = CellState::Confirmed;
                }
                changed = true;
            }
            if matches!(cell.state, CellState::Pending { .. }) {
                continue;
            }
            if cell.displayed != cell.confirmed {
                cell.displayed = cell.confirmed.clone();
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(row: i32, col: i32, value: &str) -> FilledCell {
        FilledCell {
            row,
            col,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_local_edit_is_shown_immediately() {
        let mut grid = GridSync::new();
        let edit = grid.local_edit(0, 1, "A");
        assert_eq!(grid.display(0, 1), "A");
        assert_eq!(grid.state(0, 1), CellState::Pending { seq: edit.seq });
        assert!(grid.has_pending());

        grid.confirm(&edit);
        assert_eq!(grid.display(0, 1), "A");
        assert_eq!(grid.state(0, 1), CellState::Confirmed);
        assert!(!grid.has_pending());
    }

    #[test]
    fn test_failed_write_rolls_back_to_confirmed_value() {
        let mut grid = GridSync::new();
        grid.reconcile(&[filled(0, 1, "C")]);
        let edit = grid.local_edit(0, 1, "X");
        grid.fail(&edit, "Storage error");

        assert_eq!(grid.display(0, 1), "C");
        assert_eq!(
            grid.state(0, 1),
            CellState::Failed {
                error: "Storage error".to_string()
            }
        );
    }

    #[test]
    fn test_stale_responses_do_not_override_newer_edit() {
        let mut grid = GridSync::new();
        let first = grid.local_edit(0, 1, "A");
        let second = grid.local_edit(0, 1, "B");

        grid.confirm(&first);
        assert_eq!(grid.state(0, 1), CellState::Pending { seq: second.seq });
        assert_eq!(grid.display(0, 1), "B");

        grid.fail(&second, "offline");
        // Rolled back to what the server last confirmed, i.e. the first edit.
        assert_eq!(grid.display(0, 1), "A");

        let third = grid.local_edit(0, 1, "C");
        grid.fail(&first, "late failure");
        assert_eq!(grid.state(0, 1), CellState::Pending { seq: third.seq });
        assert_eq!(grid.display(0, 1), "C");
    }

    #[test]
    fn test_reconcile_applies_remote_values() {
        let mut grid = GridSync::new();
        assert!(grid.reconcile(&[filled(0, 1, "A"), filled(2, 3, "Z")]));
        assert_eq!(grid.display(0, 1), "A");
        assert_eq!(grid.display(2, 3), "Z");
        assert_eq!(grid.display(4, 4), "");

        // Someone cleared (2, 3): it is no longer in the list.
        assert!(grid.reconcile(&[filled(0, 1, "A")]));
        assert_eq!(grid.display(2, 3), "");
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut grid = GridSync::new();
        let cells = vec![filled(0, 1, "A"), filled(1, 1, "R")];
        grid.reconcile(&cells);
        let snapshot = grid.clone();

        assert!(!grid.reconcile(&cells));
        assert!(!grid.reconcile(&cells));
        assert_eq!(grid, snapshot);
    }

    #[test]
    fn test_confirm_after_newer_refresh_keeps_server_value() {
        let mut grid = GridSync::new();
        let edit = grid.local_edit(0, 1, "A");

        // Our "A" lands, then another player writes "Z"; the refresh for it arrives before the
        // response to our own write.
        grid.reconcile(&[filled(0, 1, "Z")]);
        assert_eq!(grid.display(0, 1), "A");

        grid.confirm(&edit);
        assert_eq!(grid.display(0, 1), "Z");
        assert_eq!(grid.state(0, 1), CellState::Confirmed);
    }

    #[test]
    fn test_stale_refresh_is_corrected_by_the_next_one() {
        let mut grid = GridSync::new();
        let edit = grid.local_edit(0, 1, "A");

        // Fetched before our write was stored.
        grid.reconcile(&[]);
        grid.confirm(&edit);
        assert_eq!(grid.display(0, 1), "");

        // The refresh announcing our own write.
        assert!(grid.reconcile(&[filled(0, 1, "A")]));
        assert_eq!(grid.display(0, 1), "A");
        assert_eq!(grid.state(0, 1), CellState::Confirmed);
    }

    #[test]
    fn test_confirm_without_refresh_keeps_edit() {
        let mut grid = GridSync::new();
        grid.reconcile(&[filled(0, 1, "C")]);
        let edit = grid.local_edit(0, 1, "A");
        grid.confirm(&edit);
        assert_eq!(grid.display(0, 1), "A");

        // A later refresh holding our value changes nothing.
        assert!(!grid.reconcile(&[filled(0, 1, "A")]));
    }

    #[test]
    fn test_remote_write_clears_failed_state() {
        let mut grid = GridSync::new();
        grid.reconcile(&[filled(0, 1, "C")]);
        let edit = grid.local_edit(0, 1, "X");
        grid.fail(&edit, "offline");

        // Nothing changed on the server: the failure stays visible.
        assert!(!grid.reconcile(&[filled(0, 1, "C")]));
        assert!(matches!(grid.state(0, 1), CellState::Failed { .. }));

        assert!(grid.reconcile(&[filled(0, 1, "D")]));
        assert_eq!(grid.display(0, 1), "D");
        assert_eq!(grid.state(0, 1), CellState::Confirmed);
    }

    #[test]
    fn test_reconcile_keeps_pending_edits_visible() {
        let mut grid = GridSync::new();
        let edit = grid.local_edit(0, 1, "B");

        // A refresh triggered by someone else's write arrives before our write lands.
        grid.reconcile(&[filled(0, 1, "A")]);
        assert_eq!(grid.display(0, 1), "B");

        // Our write then fails: back to what the server holds.
        grid.fail(&edit, "timeout");
        assert_eq!(grid.display(0, 1), "A");
    }
}
