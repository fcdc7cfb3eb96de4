use super::turn::Turn;

/// Ordered conversation history for one session.
///
/// Append-only, except for [`rollback_last`](Self::rollback_last) which undoes
/// the user turn of a failed exchange, and [`clear`](Self::clear).
#[derive(Debug, Default)]
pub struct TranscriptStore {
    turns: Vec<Turn>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Remove the most recent turn. No-op on an empty store.
    pub fn rollback_last(&mut self) -> Option<Turn> {
        self.turns.pop()
    }

    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
