/// Markdown export: a pure rendering of the shared cards, one section per
/// column in schema order, one bullet per card.
use crate::types::{CardCollection, Column};

pub fn to_markdown(columns: &[Column], team_cards: &CardCollection) -> String {
    let mut lines = Vec::new();
    lines.push("# Retrospective Export".to_string());
    lines.push(String::new());
    for col in columns {
        lines.push(format!("## {}", col.title));
        if let Some(cards) = team_cards.get(&col.id) {
            for card in cards {
                lines.push(format!("- {}", card.text));
            }
        }
        lines.push(String::new());
    }
    lines.join("\n")
}
