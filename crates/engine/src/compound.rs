use annolog_core::{Collection, CoreError, EntityId, IdRef, Operation, PlaceholderId};
use tracing::debug;

use crate::history::History;

/// Extra operations folded into the ledger entry of an update.
///
/// Operations refer to the updated entity through [`Compound::subject`];
/// that reference is bound to the id the server confirms.
#[derive(Debug, Clone, Default)]
pub struct Compound {
    subject: PlaceholderId,
    forward: Vec<Operation>,
    backward: Vec<Operation>,
    replace_backward: bool,
}

impl Compound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stands in for the updated entity's id.
    pub fn subject(&self) -> IdRef {
        IdRef::Pending(self.subject)
    }

    /// Run `op` after the update and re-run it on redo.
    pub fn then(mut self, op: Operation) -> Self {
        self.forward.push(op);
        self
    }

    /// Run `op` on undo.
    pub fn undo_with(mut self, op: Operation) -> Self {
        self.backward.push(op);
        self
    }

    /// Undo runs only the `undo_with` operations, not the update's inverse.
    pub fn replacing_backward(mut self) -> Self {
        self.replace_backward = true;
        self
    }

    pub fn forward_ops(&self) -> &[Operation] {
        &self.forward
    }

    pub fn backward_ops(&self) -> &[Operation] {
        &self.backward
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.backward.is_empty()
    }

    pub(crate) fn bind(&mut self, collection: &Collection, id: EntityId) -> usize {
        let subject = self.subject();
        self.forward
            .iter_mut()
            .chain(self.backward.iter_mut())
            .map(|op| op.replace_ref(collection, &subject, id))
            .sum()
    }

    pub(crate) fn into_parts(self) -> (Vec<Operation>, Vec<Operation>, bool) {
        (self.forward, self.backward, self.replace_backward)
    }
}

/// Fold `forward`/`backward` into the entry at `index`. Forward operations
/// are appended; backward operations are appended or, with `replace`, swap
/// out the existing group. An empty replacement leaves the group as is.
pub(crate) fn merge(
    history: &mut History,
    index: usize,
    forward: Vec<Operation>,
    backward: Vec<Operation>,
    replace: bool,
) -> Result<(), CoreError> {
    let missing = || CoreError::InvalidOperation(format!("no ledger entry at {index}"));
    if history.backward_mut(index).is_none() {
        return Err(missing());
    }
    let group = history.forward_mut(index).ok_or_else(missing)?;
    group.extend(forward);

    let group = history.backward_mut(index).ok_or_else(missing)?;
    if replace && !backward.is_empty() {
        group.replace(backward)?;
    } else if replace {
        debug!(index, "empty backward replacement ignored");
    } else {
        group.extend(backward);
    }
    Ok(())
}
