use annolog_core::OperationGroup;

/// Paired forward/backward groups plus a cursor.
///
/// Entries `[0, cursor)` are applied (undoable); `[cursor, len)` are
/// reverted (redoable). `forward[i]` and `backward[i]` always exist
/// together.
#[derive(Debug, Clone, Default)]
pub struct History {
    forward: Vec<OperationGroup>,
    backward: Vec<OperationGroup>,
    cursor: usize,
    max_depth: Option<usize>,
}

impl History {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            max_depth: max_depth.map(|d| d.max(1)),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.len()
    }

    pub fn forward(&self) -> &[OperationGroup] {
        &self.forward
    }

    pub fn backward(&self) -> &[OperationGroup] {
        &self.backward
    }

    /// Index of the entry `undo` would revert.
    pub fn undo_index(&self) -> Option<usize> {
        self.cursor.checked_sub(1)
    }

    /// Index of the entry `redo` would apply.
    pub fn redo_index(&self) -> Option<usize> {
        self.can_redo().then_some(self.cursor)
    }

    pub fn forward_mut(&mut self, index: usize) -> Option<&mut OperationGroup> {
        self.forward.get_mut(index)
    }

    pub fn backward_mut(&mut self, index: usize) -> Option<&mut OperationGroup> {
        self.backward.get_mut(index)
    }

    /// Every group in both sequences.
    pub fn groups_mut(&mut self) -> impl Iterator<Item = &mut OperationGroup> {
        self.forward.iter_mut().chain(self.backward.iter_mut())
    }

    /// Discard redoable entries. A new edit makes them unreachable.
    pub fn truncate_from_cursor(&mut self) {
        self.forward.truncate(self.cursor);
        self.backward.truncate(self.cursor);
    }

    /// Push a pair at the end; returns its index. The cursor is not moved.
    /// Past `max_depth`, the oldest pair is dropped.
    pub fn append(&mut self, forward: OperationGroup, backward: OperationGroup) -> usize {
        self.forward.push(forward);
        self.backward.push(backward);
        if let Some(max) = self.max_depth
            && self.forward.len() > max
        {
            self.forward.remove(0);
            self.backward.remove(0);
            self.cursor = self.cursor.saturating_sub(1);
        }
        self.forward.len() - 1
    }

    pub fn advance(&mut self) {
        debug_assert!(self.can_redo());
        self.cursor = (self.cursor + 1).min(self.len());
    }

    pub fn retreat(&mut self) {
        debug_assert!(self.can_undo());
        self.cursor = self.cursor.saturating_sub(1);
    }
}
