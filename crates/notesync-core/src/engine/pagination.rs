//! Page bookkeeping and the local/cloud union.

use std::collections::HashMap;

use crate::models::{NoteId, UniversalNote};

/// Which page `load_more` fetches next, and whether the end was reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Pagination {
    pub next_page: usize,
    pub reached_end: bool,
}

impl Pagination {
    /// State after page 0 has been loaded.
    pub const fn first_page_loaded() -> Self {
        Self {
            next_page: 1,
            reached_end: false,
        }
    }
}

/// Merge local and cloud notes by id. The cloud copy wins on collision and takes the slot where
/// the id first appeared.
pub(crate) fn union_by_id(
    local: Vec<UniversalNote>,
    cloud: Vec<UniversalNote>,
) -> Vec<UniversalNote> {
    let mut merged: Vec<UniversalNote> = Vec::with_capacity(local.len() + cloud.len());
    let mut index: HashMap<NoteId, usize> = HashMap::new();

    for note in local {
        if !index.contains_key(&note.note_id) {
            index.insert(note.note_id.clone(), merged.len());
            merged.push(note);
        }
    }
    for note in cloud {
        match index.get(&note.note_id) {
            Some(&slot) => merged[slot] = note,
            None => {
                index.insert(note.note_id.clone(), merged.len());
                merged.push(note);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateNoteInput;
    use pretty_assertions::assert_eq;

    fn note(id: &str, text: &str) -> UniversalNote {
        let mut input = CreateNoteInput::new(text);
        input.note_id = NoteId::from(id);
        input.into_note()
    }

    #[test]
    fn cloud_copy_wins_in_first_position() {
        let merged = union_by_id(
            vec![note("a", "local a"), note("b", "local b")],
            vec![note("c", "cloud c"), note("a", "cloud a")],
        );

        let texts: Vec<&str> = merged.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["cloud a", "local b", "cloud c"]);
    }

    #[test]
    fn duplicates_within_one_side_collapse() {
        let merged = union_by_id(vec![note("a", "1"), note("a", "2")], Vec::new());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "1");
    }
}
