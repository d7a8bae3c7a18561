use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shared-store key holding the board list (new format).
pub const KEY_BOARDS: &str = "retro-v4-boards";
/// Shared-store key of the pre-multi-board record. Read during migration,
/// never written.
pub const KEY_LEGACY_TEAM: &str = "retro-v4-team";
/// Private-store key prefix for per-(user, board) overlay collections.
pub const KEY_MY_PREFIX: &str = "retro-v4-mycards";

/// A board column: a fixed category cards may occupy. Identity is `id`,
/// the title is freely editable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub title: String,
}

/// A single note. Identity is `id`; `text` is arbitrary user content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub text: String,
}

impl Card {
    /// Create a card with a fresh globally unique id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            text: text.into(),
        }
    }
}

/// Column id → ordered card sequence. A missing key reads as an empty
/// column, never as an error.
pub type CardCollection = BTreeMap<String, Vec<Card>>;

/// A named collection of columns and shared cards: the unit of shared
/// persistence and the unit a user switches between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub team_cards: CardCollection,
}

impl Board {
    /// Create a board with the default column schema and empty collections.
    pub fn new(name: impl Into<String>) -> Self {
        let columns = default_columns();
        let team_cards = empty_collection(&columns);
        Self {
            id: new_id(),
            name: name.into(),
            columns,
            team_cards,
        }
    }
}

/// The shared record under [`KEY_BOARDS`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoardListRecord {
    #[serde(default)]
    pub boards: Vec<Board>,
}

/// The pre-multi-board shared record under [`KEY_LEGACY_TEAM`].
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyTeamRecord {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub cards: CardCollection,
}

/// The default three-column schema. Ids are stable across installs; titles
/// are only the initial values and may be edited per board.
pub fn default_columns() -> Vec<Column> {
    vec![
        Column {
            id: "wentWell".to_string(),
            title: "✅ Went well".to_string(),
        },
        Column {
            id: "toImprove".to_string(),
            title: "❌ To improve".to_string(),
        },
        Column {
            id: "actionItems".to_string(),
            title: "📋 Action items".to_string(),
        },
    ]
}

/// An empty collection with one (empty) entry per column.
pub fn empty_collection(columns: &[Column]) -> CardCollection {
    columns
        .iter()
        .map(|c| (c.id.clone(), Vec::new()))
        .collect()
}

/// Ensure `cards` has an entry for every column id. Extra keys are kept.
pub fn ensure_columns(cards: &mut CardCollection, columns: &[Column]) {
    for col in columns {
        cards.entry(col.id.clone()).or_default();
    }
}

/// Generate a fresh id for a card or board.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collection_has_entry_per_column() {
        let cols = default_columns();
        let coll = empty_collection(&cols);
        assert_eq!(coll.len(), 3);
        assert!(coll.values().all(|v| v.is_empty()));
        for col in &cols {
            assert!(coll.contains_key(&col.id));
        }
    }

    #[test]
    fn test_ensure_columns_keeps_existing_and_extra_keys() {
        let cols = default_columns();
        let mut coll = CardCollection::new();
        coll.insert("wentWell".to_string(), vec![Card::new("kept")]);
        coll.insert("orphan".to_string(), vec![Card::new("extra")]);
        ensure_columns(&mut coll, &cols);
        assert_eq!(coll.len(), 4);
        assert_eq!(coll["wentWell"].len(), 1);
        assert_eq!(coll["orphan"].len(), 1);
        assert!(coll["toImprove"].is_empty());
    }

    #[test]
    fn test_board_round_trips_with_camel_case_keys() {
        let board = Board::new("Sprint 1");
        let json = serde_json::to_value(&board).unwrap();
        assert!(json.get("teamCards").is_some());
        let back: Board = serde_json::from_value(json).unwrap();
        assert_eq!(back, board);
    }

    #[test]
    fn test_legacy_record_tolerates_missing_fields() {
        let rec: LegacyTeamRecord = serde_json::from_str("{}").unwrap();
        assert!(rec.columns.is_empty());
        assert!(rec.cards.is_empty());
    }

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
