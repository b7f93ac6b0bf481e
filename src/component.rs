use crate::errors::Result;
use crate::pointstore::PointStore;
use crate::sampler::{Offer, TimeDecaySampler};
use crate::tree::CutTree;
use crate::types::CoordFloat;

/// One sampler-plus-tree pair of the ensemble, owned by exactly one worker at
/// a time. The component routes sampler decisions into tree mutations and
/// reports the handle deltas for the coordinator's reference-count pass.
pub(crate) struct Component<F: CoordFloat> {
    tree: CutTree<F>,
    sampler: TimeDecaySampler,
}

impl<F: CoordFloat> Component<F> {
    pub fn new(tree: CutTree<F>, sampler: TimeDecaySampler) -> Self {
        Component { tree, sampler }
    }

    /// Offers the stream position to the sampler; on admission deletes the
    /// evicted point from the tree and inserts the new one. Returns
    /// `(inserted, evicted)` handles — `inserted` is the handle the tree kept,
    /// which differs from the offered one when a duplicate was coalesced.
    pub fn update(
        &mut self,
        handle: usize,
        sequence_index: u64,
        store: &PointStore<F>,
    ) -> Result<(Option<usize>, Option<usize>)> {
        match self.sampler.offer(sequence_index) {
            Offer::Reject => Ok((None, None)),
            Offer::Admit { evicted } => {
                let deleted = match evicted {
                    Some(evicted) => {
                        self.tree.delete(evicted.handle, store)?;
                        Some(evicted.handle)
                    }
                    None => None,
                };
                let inserted = self.tree.insert(handle, store)?;
                self.sampler.confirm(inserted);
                Ok((Some(inserted), deleted))
            }
        }
    }

    pub fn tree(&self) -> &CutTree<F> {
        &self.tree
    }

    pub fn sampler(&self) -> &TimeDecaySampler {
        &self.sampler
    }

    pub fn tree_mass(&self) -> usize {
        self.tree.mass()
    }

    pub fn size_hint(&self) -> usize {
        self.tree.size_hint() + self.sampler.size_hint() + std::mem::size_of::<Component<F>>()
    }
}
