use tracing::debug;

use annolog_core::{Collection, EntityId, IdRef, OperationGroup};

use crate::executor::Response;
use crate::history::History;

/// An identity the server replaced: `from` in `collection` now lives at `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rebind {
    pub collection: Collection,
    pub from: IdRef,
    pub to: EntityId,
}

/// Rewrite every reference to `from` across both sequences. Returns the
/// number of rewritten references.
pub fn reconcile(
    history: &mut History,
    collection: &Collection,
    from: &IdRef,
    to: EntityId,
) -> usize {
    if *from == IdRef::Known(to) {
        return 0;
    }
    let rewritten: usize = history
        .groups_mut()
        .map(|group| group.replace_ref(collection, from, to))
        .sum();
    debug!(%collection, %from, %to, rewritten, "reconciled identity");
    rewritten
}

pub fn apply_rebinds(history: &mut History, rebinds: &[Rebind]) -> usize {
    rebinds
        .iter()
        .map(|r| reconcile(history, &r.collection, &r.from, r.to))
        .sum()
}

/// Rebinds implied by a successful group: each creation that stands in for
/// an older reference hands that reference its new id.
pub fn created_rebinds(group: &OperationGroup, responses: &[Response]) -> Vec<Rebind> {
    group
        .network_ops()
        .zip(responses)
        .filter_map(|(op, response)| {
            let target = op.restores()?;
            Some(Rebind {
                collection: target.collection.clone(),
                from: target.id,
                to: response.id?,
            })
        })
        .collect()
}
