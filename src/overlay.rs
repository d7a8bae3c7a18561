/// Private Overlay Store: the per-(user, board) card collection kept on the
/// device and never written to the shared tier.
///
/// All writes are synchronous against the private store; there is no remote
/// round-trip and hence no partial-failure window beyond the local write.
use log::{debug, warn};

use crate::storage::PrivateStore;
use crate::types::{ensure_columns, Card, CardCollection, Column, KEY_MY_PREFIX};

pub struct Overlay {
    /// Private-store key, or `None` for the detached overlay used while no
    /// board is active (mutations then live only in memory).
    key: Option<String>,
    cards: CardCollection,
}

impl Overlay {
    pub fn key_for(user_id: &str, board_id: &str) -> String {
        format!("{KEY_MY_PREFIX}-{user_id}-{board_id}")
    }

    /// Load the overlay for a (user, board) pair. Absent or malformed data
    /// yields the empty default-shaped collection; parse errors never reach
    /// the caller.
    pub fn load(
        private: &dyn PrivateStore,
        user_id: &str,
        board_id: &str,
        columns: &[Column],
    ) -> Self {
        let key = Self::key_for(user_id, board_id);
        let mut cards = match private.get(&key) {
            Some(raw) => match serde_json::from_str::<CardCollection>(&raw) {
                Ok(cards) => cards,
                Err(e) => {
                    warn!("malformed private collection under {key}, resetting: {e}");
                    CardCollection::new()
                }
            },
            None => {
                debug!("no private collection under {key}");
                CardCollection::new()
            }
        };
        ensure_columns(&mut cards, columns);
        Self {
            key: Some(key),
            cards,
        }
    }

    /// Empty overlay with no backing key, for the no-active-board state.
    pub fn detached(columns: &[Column]) -> Self {
        let mut cards = CardCollection::new();
        ensure_columns(&mut cards, columns);
        Self { key: None, cards }
    }

    pub fn cards(&self) -> &CardCollection {
        &self.cards
    }

    fn persist(&self, private: &dyn PrivateStore) {
        let Some(key) = self.key.as_deref() else {
            return;
        };
        match serde_json::to_string(&self.cards) {
            Ok(raw) => {
                if let Err(e) = private.set(key, &raw) {
                    warn!("could not persist private collection under {key}: {e}");
                }
            }
            Err(e) => warn!("could not serialize private collection: {e}"),
        }
    }

    /// Append a new card; blank text is allowed at creation time.
    pub fn add_card(&mut self, private: &dyn PrivateStore, column_id: &str, text: &str) -> String {
        let card = Card::new(text);
        let id = card.id.clone();
        self.cards.entry(column_id.to_string()).or_default().push(card);
        self.persist(private);
        id
    }

    /// Replace a card's text in place. Setting empty text via edit is
    /// rejected; unknown ids are ignored.
    pub fn edit_card(&mut self, private: &dyn PrivateStore, column_id: &str, id: &str, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let Some(card) = self
            .cards
            .get_mut(column_id)
            .and_then(|cards| cards.iter_mut().find(|c| c.id == id))
        else {
            return;
        };
        card.text = text.to_string();
        self.persist(private);
    }

    pub fn delete_card(&mut self, private: &dyn PrivateStore, column_id: &str, id: &str) {
        let Some(cards) = self.cards.get_mut(column_id) else {
            return;
        };
        let before = cards.len();
        cards.retain(|c| c.id != id);
        if cards.len() != before {
            self.persist(private);
        }
    }

    /// Move a card between columns, appending at the destination. No-op when
    /// `id` is not found in `from_col`.
    pub fn move_card(&mut self, private: &dyn PrivateStore, from_col: &str, to_col: &str, id: &str) {
        let Some(card) = remove_card(&mut self.cards, from_col, id) else {
            return;
        };
        self.cards.entry(to_col.to_string()).or_default().push(card);
        self.persist(private);
    }

    /// Drop every card in a column.
    pub fn clear_column(&mut self, private: &dyn PrivateStore, column_id: &str) {
        self.cards.insert(column_id.to_string(), Vec::new());
        self.persist(private);
    }

    /// Take a card out of a column, for cross-tier transfers.
    pub fn take_card(&mut self, private: &dyn PrivateStore, column_id: &str, id: &str) -> Option<Card> {
        let card = remove_card(&mut self.cards, column_id, id)?;
        self.persist(private);
        Some(card)
    }

    /// Insert a tier-local copy of a transferred card.
    pub fn insert_card(&mut self, private: &dyn PrivateStore, column_id: &str, card: Card) {
        self.cards.entry(column_id.to_string()).or_default().push(card);
        self.persist(private);
    }
}

/// Remove and return the card with `id` from `column_id`, if present.
pub fn remove_card(cards: &mut CardCollection, column_id: &str, id: &str) -> Option<Card> {
    let column = cards.get_mut(column_id)?;
    let idx = column.iter().position(|c| c.id == id)?;
    Some(column.remove(idx))
}
