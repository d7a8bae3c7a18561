/// Board Store: owns the board list and the active-board pointer.
///
/// The whole list is one shared-store document under [`KEY_BOARDS`]; every
/// mutation round-trips the entire list, so the effective write granularity
/// is "replace the shared record". Older installs kept a single board under
/// [`KEY_LEGACY_TEAM`]; that record is migrated forward on first load and
/// left in place.
use log::{info, warn};

use crate::storage::SharedTier;
use crate::types::{
    default_columns, ensure_columns, Board, BoardListRecord, Column, LegacyTeamRecord, KEY_BOARDS,
    KEY_LEGACY_TEAM,
};

/// Name given to the synthesized first board and to migrated legacy boards.
pub const DEFAULT_BOARD_NAME: &str = "Retrospective";

pub struct BoardStore {
    boards: Vec<Board>,
    active: Option<String>,
}

impl BoardStore {
    /// Load the board list from the shared store.
    ///
    /// An absent or empty record is replaced by either the migrated legacy
    /// single-board record or a synthesized default board; the result is
    /// persisted immediately so other clients see the same list. Legacy data
    /// is only consulted while the new-format key is completely empty;
    /// a board living only under the legacy key is NOT merged in later.
    pub async fn load(shared: &SharedTier) -> Self {
        let mut boards = match shared.get(KEY_BOARDS).await {
            Some(value) => match serde_json::from_value::<BoardListRecord>(value) {
                Ok(record) => record.boards,
                Err(e) => {
                    warn!("malformed board list record, reinitializing: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        let mut needs_persist = false;
        if boards.is_empty() {
            boards.push(Self::migrate_or_default(shared).await);
            needs_persist = true;
        }

        for board in &mut boards {
            ensure_columns(&mut board.team_cards, &board.columns);
        }

        let active = boards.first().map(|b| b.id.clone());
        let store = Self { boards, active };
        if needs_persist {
            store.save(shared).await;
        }
        store
    }

    /// Read the legacy single-board record, or synthesize a default board.
    async fn migrate_or_default(shared: &SharedTier) -> Board {
        if let Some(value) = shared.get(KEY_LEGACY_TEAM).await {
            match serde_json::from_value::<LegacyTeamRecord>(value) {
                Ok(legacy) if !legacy.columns.is_empty() || !legacy.cards.is_empty() => {
                    info!("migrating legacy single-board record into board list");
                    let columns = if legacy.columns.is_empty() {
                        default_columns()
                    } else {
                        legacy.columns
                    };
                    let mut board = Board::new(DEFAULT_BOARD_NAME);
                    board.columns = columns;
                    board.team_cards = legacy.cards;
                    ensure_columns(&mut board.team_cards, &board.columns);
                    return board;
                }
                Ok(_) => {}
                Err(e) => warn!("malformed legacy record, ignoring: {e}"),
            }
        }
        Board::new(DEFAULT_BOARD_NAME)
    }

    /// Persist the full board list as one shared write. In-memory state is
    /// already updated by the time this runs; a failed write is logged and
    /// left for polling to correct.
    pub async fn save(&self, shared: &SharedTier) {
        match serde_json::to_value(BoardListRecord {
            boards: self.boards.clone(),
        }) {
            Ok(value) => shared.set(KEY_BOARDS, value).await,
            Err(e) => warn!("could not serialize board list: {e}"),
        }
    }

    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_board(&self) -> Option<&Board> {
        let id = self.active.as_deref()?;
        self.boards.iter().find(|b| b.id == id)
    }

    pub fn active_board_mut(&mut self) -> Option<&mut Board> {
        let id = self.active.clone()?;
        self.boards.iter_mut().find(|b| b.id == id)
    }

    /// Append a new board with the default schema and make it active.
    pub async fn add_board(&mut self, shared: &SharedTier, name: &str) -> String {
        let name = name.trim();
        let board = Board::new(if name.is_empty() {
            DEFAULT_BOARD_NAME
        } else {
            name
        });
        let id = board.id.clone();
        self.boards.push(board);
        self.active = Some(id.clone());
        self.save(shared).await;
        id
    }

    /// Point the session at another loaded board. No remote I/O; unknown ids
    /// are ignored. Returns true when the active board changed.
    pub fn switch_board(&mut self, id: &str) -> bool {
        if self.active.as_deref() == Some(id) {
            return false;
        }
        if self.boards.iter().any(|b| b.id == id) {
            self.active = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub async fn rename_board(&mut self, shared: &SharedTier, id: &str, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        let Some(board) = self.boards.iter_mut().find(|b| b.id == id) else {
            return;
        };
        if board.name == name {
            return;
        }
        board.name = name.to_string();
        self.save(shared).await;
    }

    /// Delete a board and its shared cards outright. Deleting the active
    /// board moves the pointer to the first remaining board, or clears it
    /// when none remain. Returns true when the active board changed.
    pub async fn delete_board(&mut self, shared: &SharedTier, id: &str) -> bool {
        let before = self.boards.len();
        self.boards.retain(|b| b.id != id);
        if self.boards.len() == before {
            return false;
        }
        let active_changed = self.active.as_deref() == Some(id);
        if active_changed {
            self.active = self.boards.first().map(|b| b.id.clone());
        }
        self.save(shared).await;
        active_changed
    }

    /// Adopt a remotely observed board list wholesale (polling path). Keeps
    /// the active pointer when that board still exists, otherwise falls back
    /// to the first board. Returns true when the active board changed.
    pub fn adopt_remote(&mut self, mut boards: Vec<Board>) -> bool {
        for board in &mut boards {
            ensure_columns(&mut board.team_cards, &board.columns);
        }
        self.boards = boards;
        let still_there = self
            .active
            .as_deref()
            .is_some_and(|id| self.boards.iter().any(|b| b.id == id));
        if !still_there {
            self.active = self.boards.first().map(|b| b.id.clone());
            return true;
        }
        false
    }

    /// Column schema shared operations run against; a fixed fallback while
    /// no board is active.
    pub fn columns(&self) -> Vec<Column> {
        match self.active_board() {
            Some(board) => board.columns.clone(),
            None => default_columns(),
        }
    }
}
