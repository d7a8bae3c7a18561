/// Synchronization engine: sequences the board store and the private overlay
/// against the resolved identity, applies optimistic local mutations, and
/// keeps the shared view fresh by polling.
///
/// Consistency policy is LAST-REMOTE-WRITE-WINS at whole-record granularity:
/// a local edit not yet durably committed can be overwritten by a concurrent
/// remote write observed at the next poll tick. The same mechanism heals a
/// failed shared write by re-adopting whatever the remote store holds. This
/// is the documented trade-off of running without a push channel; there is
/// no version check and no merge.
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::Mutex;
use tokio::time::interval;

use crate::boards::BoardStore;
use crate::export;
use crate::identity::{resolve_identity, IdentityResolver};
use crate::overlay::{remove_card, Overlay};
use crate::storage::{PrivateStore, SharedTier};
use crate::types::{Card, CardCollection, Column, BoardListRecord, Board, KEY_BOARDS};

/// Reference polling period for [`run_poller`].
pub const POLL_PERIOD: Duration = Duration::from_secs(3);

static EMPTY_COLLECTION: CardCollection = CardCollection::new();

pub struct Session {
    shared: SharedTier,
    private: Arc<dyn PrivateStore>,
    user_id: String,
    boards: BoardStore,
    overlay: Overlay,
}

impl Session {
    /// Start a session: resolve identity, load (or synthesize) the board
    /// list, pick the active board, and load its private overlay.
    pub async fn start(
        shared: SharedTier,
        private: Arc<dyn PrivateStore>,
        resolver: &dyn IdentityResolver,
    ) -> Self {
        let user_id = resolve_identity(resolver, private.as_ref());
        debug!("session identity: {user_id}");
        let boards = BoardStore::load(&shared).await;
        let overlay = Self::load_overlay(&boards, private.as_ref(), &user_id);
        Self {
            shared,
            private,
            user_id,
            boards,
            overlay,
        }
    }

    fn load_overlay(boards: &BoardStore, private: &dyn PrivateStore, user_id: &str) -> Overlay {
        match boards.active_id() {
            Some(board_id) => Overlay::load(private, user_id, board_id, &boards.columns()),
            None => Overlay::detached(&boards.columns()),
        }
    }

    fn reload_overlay(&mut self) {
        self.overlay = Self::load_overlay(&self.boards, self.private.as_ref(), &self.user_id);
    }

    // Read accessors ------------------------------------------------------

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn boards(&self) -> &[Board] {
        self.boards.boards()
    }

    pub fn active_board_id(&self) -> Option<&str> {
        self.boards.active_id()
    }

    /// Active board's column schema, or the fallback defaults while no board
    /// is active.
    pub fn columns(&self) -> Vec<Column> {
        self.boards.columns()
    }

    pub fn team_cards(&self) -> &CardCollection {
        match self.boards.active_board() {
            Some(board) => &board.team_cards,
            None => &EMPTY_COLLECTION,
        }
    }

    pub fn my_cards(&self) -> &CardCollection {
        self.overlay.cards()
    }

    /// Markdown rendering of the active board's shared cards.
    pub fn export_markdown(&self) -> String {
        export::to_markdown(&self.columns(), self.team_cards())
    }

    // Board lifecycle ------------------------------------------------------

    pub async fn add_board(&mut self, name: &str) -> String {
        let id = self.boards.add_board(&self.shared, name).await;
        self.reload_overlay();
        id
    }

    pub fn switch_board(&mut self, id: &str) {
        if self.boards.switch_board(id) {
            self.reload_overlay();
        }
    }

    pub async fn rename_board(&mut self, id: &str, name: &str) {
        self.boards.rename_board(&self.shared, id, name).await;
    }

    pub async fn delete_board(&mut self, id: &str) {
        if self.boards.delete_board(&self.shared, id).await {
            self.reload_overlay();
        }
    }

    // Private card operations ---------------------------------------------

    pub fn add_my_card(&mut self, column_id: &str, text: &str) -> String {
        self.overlay.add_card(self.private.as_ref(), column_id, text)
    }

    pub fn edit_my_card(&mut self, column_id: &str, id: &str, text: &str) {
        self.overlay.edit_card(self.private.as_ref(), column_id, id, text);
    }

    pub fn delete_my_card(&mut self, column_id: &str, id: &str) {
        self.overlay.delete_card(self.private.as_ref(), column_id, id);
    }

    pub fn move_my_card(&mut self, from_col: &str, to_col: &str, id: &str) {
        self.overlay.move_card(self.private.as_ref(), from_col, to_col, id);
    }

    pub fn clear_my_column(&mut self, column_id: &str) {
        self.overlay.clear_column(self.private.as_ref(), column_id);
    }

    // Team card operations -------------------------------------------------

    /// Apply a transform to the active board's shared cards; when it reports
    /// a change, persist the full board list. In-memory state is updated
    /// before the write is issued and is not rolled back on failure.
    async fn mutate_team_cards(&mut self, f: impl FnOnce(&mut CardCollection) -> bool) {
        let changed = match self.boards.active_board_mut() {
            Some(board) => f(&mut board.team_cards),
            None => {
                debug!("no active board, shared operation skipped");
                false
            }
        };
        if changed {
            self.boards.save(&self.shared).await;
        }
    }

    /// Add a shared card; returns its id, or `None` while no board is
    /// active.
    pub async fn add_team_card(&mut self, column_id: &str, text: &str) -> Option<String> {
        let card = Card::new(text);
        let id = card.id.clone();
        let mut added = false;
        self.mutate_team_cards(|cards| {
            cards.entry(column_id.to_string()).or_default().push(card);
            added = true;
            true
        })
        .await;
        added.then_some(id)
    }

    /// Replace a shared card's text. Empty text and unknown ids are
    /// rejected locally, before any I/O.
    pub async fn edit_team_card(&mut self, column_id: &str, id: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let text = text.to_string();
        self.mutate_team_cards(|cards| {
            match cards
                .get_mut(column_id)
                .and_then(|col| col.iter_mut().find(|c| c.id == id))
            {
                Some(card) => {
                    card.text = text;
                    true
                }
                None => false,
            }
        })
        .await;
    }

    pub async fn delete_team_card(&mut self, column_id: &str, id: &str) {
        self.mutate_team_cards(|cards| match cards.get_mut(column_id) {
            Some(col) => {
                let before = col.len();
                col.retain(|c| c.id != id);
                col.len() != before
            }
            None => false,
        })
        .await;
    }

    /// Move a shared card between columns, appending at the destination.
    /// No-op when `id` is not found in `from_col`.
    pub async fn move_team_card(&mut self, from_col: &str, to_col: &str, id: &str) {
        self.mutate_team_cards(|cards| match remove_card(cards, from_col, id) {
            Some(card) => {
                cards.entry(to_col.to_string()).or_default().push(card);
                true
            }
            None => false,
        })
        .await;
    }

    /// Rename a column of the active board. Empty and unchanged titles are
    /// rejected before any I/O.
    pub async fn update_column_title(&mut self, column_id: &str, title: &str) {
        let title = title.trim();
        if title.is_empty() {
            return;
        }
        let changed = match self.boards.active_board_mut() {
            Some(board) => match board.columns.iter_mut().find(|c| c.id == column_id) {
                Some(col) if col.title != title => {
                    col.title = title.to_string();
                    true
                }
                _ => false,
            },
            None => false,
        };
        if changed {
            self.boards.save(&self.shared).await;
        }
    }

    // Cross-tier transfers -------------------------------------------------

    /// Move a private card to the shared tier. The copy is inserted into the
    /// shared collection under a FRESH id and persisted first; only then is
    /// the original removed from the overlay. A crash between the two steps
    /// leaves a duplicate rather than losing the note. There is no
    /// cross-tier transaction.
    pub async fn promote_to_team(&mut self, from_col: &str, id: &str, to_col: Option<&str>) {
        if self.boards.active_board().is_none() {
            debug!("no active board, promote skipped");
            return;
        }
        let Some(text) = self
            .overlay
            .cards()
            .get(from_col)
            .and_then(|col| col.iter().find(|c| c.id == id))
            .map(|c| c.text.clone())
        else {
            return;
        };
        let target = to_col.unwrap_or(from_col).to_string();
        self.mutate_team_cards(|cards| {
            cards.entry(target).or_default().push(Card::new(text));
            true
        })
        .await;
        self.overlay.take_card(self.private.as_ref(), from_col, id);
    }

    /// Move a shared card to the private tier: remove from the shared
    /// collection and persist, then insert a fresh-id copy into the overlay.
    /// Same duplicate-over-loss bias as [`Self::promote_to_team`].
    pub async fn demote_to_my_area(&mut self, from_col: &str, id: &str, to_col: Option<&str>) {
        let mut taken = None;
        self.mutate_team_cards(|cards| match remove_card(cards, from_col, id) {
            Some(card) => {
                taken = Some(card);
                true
            }
            None => false,
        })
        .await;
        let Some(card) = taken else {
            return;
        };
        let target = to_col.unwrap_or(from_col);
        self.overlay
            .insert_card(self.private.as_ref(), target, Card::new(card.text));
    }

    // Polling reconciliation -----------------------------------------------

    /// One reconciliation pass: re-read the shared board list and, when it
    /// structurally differs from the in-memory list, adopt it wholesale.
    /// An unsynced local edit made since the last successful persist is
    /// discarded (last-remote-write-wins).
    pub async fn poll_tick(&mut self) {
        let Some(value) = self.shared.get(KEY_BOARDS).await else {
            return;
        };
        let record = match serde_json::from_value::<BoardListRecord>(value) {
            Ok(record) => record,
            Err(e) => {
                warn!("ignoring malformed remote board list: {e}");
                return;
            }
        };
        if record.boards.is_empty() || record.boards == self.boards.boards() {
            return;
        }
        debug!("poll observed a remote change, adopting remote board list");
        if self.boards.adopt_remote(record.boards) {
            self.reload_overlay();
        }
    }
}

/// Drive [`Session::poll_tick`] forever at `period`. The host spawns this on
/// its runtime; dropping the returned future stops polling.
pub async fn run_poller(session: Arc<Mutex<Session>>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a tokio interval fires immediately; skip it so the
    // startup load is not immediately re-run.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        session.lock().await.poll_tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::AnonymousIdentity;
    use crate::storage::memory::{MemoryPrivateStore, MemoryStore};
    use crate::storage::{SharedStore, StorageError};
    use crate::types::default_columns;
    use async_trait::async_trait;
    use serde_json::Value;

    struct Fixture {
        remote: Arc<MemoryStore>,
        session: Session,
    }

    async fn start_session() -> Fixture {
        let remote = Arc::new(MemoryStore::new());
        let shared = SharedTier::remote(remote.clone());
        let private: Arc<dyn PrivateStore> = Arc::new(MemoryPrivateStore::new());
        let session = Session::start(shared, private, &AnonymousIdentity).await;
        Fixture { remote, session }
    }

    async fn remote_record(remote: &MemoryStore) -> BoardListRecord {
        let value = remote.get(KEY_BOARDS).await.unwrap().unwrap();
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_startup_synthesizes_default_board() {
        let f = start_session().await;
        assert_eq!(f.session.boards().len(), 1);
        assert!(f.session.active_board_id().is_some());
        assert_eq!(f.session.columns(), default_columns());
        assert_eq!(f.session.team_cards().len(), 3);
        assert!(f.session.my_cards().values().all(|v| v.is_empty()));
    }

    #[tokio::test]
    async fn test_add_board_then_cards_then_promote_scenario() {
        let mut f = start_session().await;
        let board_id = f.session.add_board("Sprint 1").await;
        assert_eq!(f.session.active_board_id(), Some(board_id.as_str()));
        assert_eq!(f.session.boards().len(), 2);

        let card_id = f
            .session
            .add_team_card("wentWell", "Shipped on time")
            .await
            .unwrap();
        assert_eq!(f.session.team_cards()["wentWell"].len(), 1);
        assert_eq!(f.session.team_cards()["wentWell"][0].text, "Shipped on time");

        let my_id = f.session.add_my_card("wentWell", "note to self");
        f.session.promote_to_team("wentWell", &my_id, Some("wentWell")).await;

        assert!(f.session.my_cards()["wentWell"].is_empty());
        let shared_col = &f.session.team_cards()["wentWell"];
        assert_eq!(shared_col.len(), 2);
        assert_eq!(shared_col[1].text, "note to self");
        assert_ne!(shared_col[1].id, my_id);
        assert_ne!(shared_col[1].id, card_id);

        // The full board list was persisted with the promoted card.
        let record = remote_record(&f.remote).await;
        let board = record.boards.iter().find(|b| b.id == board_id).unwrap();
        assert_eq!(board.team_cards["wentWell"].len(), 2);
    }

    #[tokio::test]
    async fn test_promote_with_unknown_id_is_noop() {
        let mut f = start_session().await;
        f.session.add_my_card("wentWell", "stays private");
        let my_before = f.session.my_cards().clone();
        let team_before = f.session.team_cards().clone();
        f.session.promote_to_team("wentWell", "ghost", None).await;
        assert_eq!(f.session.my_cards(), &my_before);
        assert_eq!(f.session.team_cards(), &team_before);
    }

    #[tokio::test]
    async fn test_demote_moves_text_under_fresh_id() {
        let mut f = start_session().await;
        let id = f.session.add_team_card("toImprove", "too many meetings").await.unwrap();
        f.session.demote_to_my_area("toImprove", &id, None).await;

        assert!(f.session.team_cards()["toImprove"].is_empty());
        let mine = &f.session.my_cards()["toImprove"];
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].text, "too many meetings");
        assert_ne!(mine[0].id, id);
    }

    #[tokio::test]
    async fn test_team_operations_with_missing_ids_are_noops() {
        let mut f = start_session().await;
        f.session.add_team_card("wentWell", "anchor").await;
        let before = f.session.team_cards().clone();

        f.session.edit_team_card("wentWell", "ghost", "new text").await;
        f.session.delete_team_card("wentWell", "ghost").await;
        f.session.move_team_card("wentWell", "toImprove", "ghost").await;
        f.session.move_team_card("noSuchColumn", "toImprove", "ghost").await;
        assert_eq!(f.session.team_cards(), &before);
    }

    #[tokio::test]
    async fn test_edit_team_card_rejects_empty_text() {
        let mut f = start_session().await;
        let id = f.session.add_team_card("wentWell", "original").await.unwrap();
        f.session.edit_team_card("wentWell", &id, "  ").await;
        assert_eq!(f.session.team_cards()["wentWell"][0].text, "original");
    }

    #[tokio::test]
    async fn test_move_team_card_preserves_identity_and_order() {
        let mut f = start_session().await;
        let id = f.session.add_team_card("wentWell", "mover").await.unwrap();
        f.session.add_team_card("toImprove", "resident").await;
        f.session.move_team_card("wentWell", "toImprove", &id).await;

        assert!(f.session.team_cards()["wentWell"].is_empty());
        let dest = &f.session.team_cards()["toImprove"];
        assert_eq!(dest.len(), 2);
        // Within one tier a move keeps the card's identity.
        assert_eq!(dest[1].id, id);
    }

    #[tokio::test]
    async fn test_update_column_title_persists_and_rejects_noise() {
        let mut f = start_session().await;
        f.session.update_column_title("wentWell", "Highlights").await;
        assert_eq!(f.session.columns()[0].title, "Highlights");
        let record = remote_record(&f.remote).await;
        assert_eq!(record.boards[0].columns[0].title, "Highlights");

        // Empty, unchanged and unknown-column updates issue no write.
        f.remote.set(KEY_BOARDS, Value::Null).await.unwrap();
        f.session.update_column_title("wentWell", "  ").await;
        f.session.update_column_title("wentWell", "Highlights").await;
        f.session.update_column_title("noSuchColumn", "X").await;
        assert_eq!(f.remote.get(KEY_BOARDS).await.unwrap(), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_operations_without_active_board_are_noops() {
        let mut f = start_session().await;
        let only = f.session.boards()[0].id.clone();
        f.session.delete_board(&only).await;
        assert!(f.session.active_board_id().is_none());
        assert_eq!(f.session.columns(), default_columns());

        assert!(f.session.add_team_card("wentWell", "dropped").await.is_none());
        assert!(f.session.team_cards().is_empty());
        f.session.update_column_title("wentWell", "X").await;

        // Promote without an active board must not consume the private card.
        let my_id = f.session.add_my_card("wentWell", "kept");
        f.session.promote_to_team("wentWell", &my_id, None).await;
        assert_eq!(f.session.my_cards()["wentWell"].len(), 1);
    }

    #[tokio::test]
    async fn test_switch_board_reloads_overlay() {
        let mut f = start_session().await;
        let first = f.session.boards()[0].id.clone();
        f.session.add_my_card("wentWell", "on first board");
        let second = f.session.add_board("Sprint 2").await;

        assert!(f.session.my_cards()["wentWell"].is_empty());
        f.session.add_my_card("wentWell", "on second board");

        f.session.switch_board(&first);
        assert_eq!(f.session.my_cards()["wentWell"][0].text, "on first board");
        f.session.switch_board(&second);
        assert_eq!(f.session.my_cards()["wentWell"][0].text, "on second board");
    }

    #[tokio::test]
    async fn test_poll_adopts_remote_change_over_unsynced_local_edit() {
        let mut f = start_session().await;
        let board_id = f.session.active_board_id().unwrap().to_string();
        let baseline = remote_record(&f.remote).await;

        // A local edit is made, then a concurrent client replaces the whole
        // shared record without it.
        f.session.add_team_card("wentWell", "local edit").await;
        let mut record = baseline;
        let board = record.boards.iter_mut().find(|b| b.id == board_id).unwrap();
        board
            .team_cards
            .get_mut("wentWell")
            .unwrap()
            .push(Card::new("from another client"));
        let remote_cards = board.team_cards.clone();
        f.remote
            .set(KEY_BOARDS, serde_json::to_value(&record).unwrap())
            .await
            .unwrap();

        // The tick adopts the remote value exactly; the local edit is gone.
        f.session.poll_tick().await;
        assert_eq!(f.session.team_cards(), &remote_cards);
        assert_eq!(f.session.team_cards()["wentWell"].len(), 1);
        assert_eq!(
            f.session.team_cards()["wentWell"][0].text,
            "from another client"
        );

        // A second tick with no remote change is a no-op.
        f.session.poll_tick().await;
        assert_eq!(f.session.team_cards(), &remote_cards);
    }

    #[tokio::test]
    async fn test_poll_reselects_active_when_board_deleted_remotely() {
        let mut f = start_session().await;
        let second = f.session.add_board("Doomed").await;
        f.session.add_my_card("wentWell", "private on doomed");

        let mut record = remote_record(&f.remote).await;
        record.boards.retain(|b| b.id != second);
        f.remote
            .set(KEY_BOARDS, serde_json::to_value(&record).unwrap())
            .await
            .unwrap();

        f.session.poll_tick().await;
        assert_ne!(f.session.active_board_id(), Some(second.as_str()));
        assert!(f.session.active_board_id().is_some());
        // Overlay now belongs to the re-selected board.
        assert!(f.session.my_cards()["wentWell"].is_empty());
    }

    #[tokio::test]
    async fn test_poll_ignores_malformed_or_absent_remote_record() {
        let mut f = start_session().await;
        f.session.add_team_card("wentWell", "survives").await;
        let before = f.session.team_cards().clone();

        f.remote.set(KEY_BOARDS, Value::String("junk".into())).await.unwrap();
        f.session.poll_tick().await;
        assert_eq!(f.session.team_cards(), &before);
    }

    /// Shared store whose writes fail but whose reads keep answering: the
    /// optimistic in-memory edit survives the failed write until polling
    /// re-adopts the remote truth.
    struct ReadOnlyStore(Arc<MemoryStore>);

    #[async_trait]
    impl SharedStore for ReadOnlyStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
            self.0.get(key).await
        }

        async fn set(&self, _key: &str, _value: Value) -> Result<(), StorageError> {
            Err(StorageError::Remote("write rejected".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_write_is_healed_by_next_poll() {
        // Seed a valid record through a writable handle first.
        let backing = Arc::new(MemoryStore::new());
        let seed = SharedTier::remote(backing.clone());
        let seeded = BoardStore::load(&seed).await;
        let baseline = seeded.boards().to_vec();

        let shared = SharedTier::remote(Arc::new(ReadOnlyStore(backing)));
        let private: Arc<dyn PrivateStore> = Arc::new(MemoryPrivateStore::new());
        let mut session = Session::start(shared, private, &AnonymousIdentity).await;

        // The optimistic edit lands in memory even though the write failed.
        session.add_team_card("wentWell", "never committed").await;
        assert_eq!(session.team_cards()["wentWell"].len(), 1);

        // Polling discards the unsaved edit in favor of the remote record.
        session.poll_tick().await;
        assert_eq!(session.boards(), baseline.as_slice());
    }

    #[tokio::test]
    async fn test_local_only_session_keeps_working() {
        let private: Arc<dyn PrivateStore> = Arc::new(MemoryPrivateStore::new());
        let mut session =
            Session::start(SharedTier::negotiate(None).await, private, &AnonymousIdentity).await;
        session.add_team_card("wentWell", "session-local").await;
        assert_eq!(session.team_cards()["wentWell"].len(), 1);
        session.poll_tick().await;
        assert_eq!(session.team_cards()["wentWell"].len(), 1);
    }
}
