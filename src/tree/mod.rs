//! The two random cut tree back-ends behind one tagged dispatch: a pointer
//! tree owning its nodes (and inline point copies) through `Box` edges, and a
//! compact tree over parallel integer arenas referencing the shared point
//! store.

pub(crate) mod compact;
pub(crate) mod nodestore;
pub(crate) mod pointer;

use crate::boundingbox::BoundingBox;
use crate::errors::Result;
use crate::pointstore::PointStore;
use crate::types::CoordFloat;
use crate::visitor::{MultiVisitor, Visitor};

pub(crate) use compact::CompactTree;
pub(crate) use pointer::PointerTree;

pub(crate) enum CutTree<F: CoordFloat> {
    Pointer(PointerTree<F>),
    Compact(CompactTree<F>),
}

impl<F: CoordFloat> CutTree<F> {
    /// Inserts the point behind `handle`, returning the handle actually
    /// stored at the leaf — an existing one when the tree coalesced a
    /// duplicate.
    pub fn insert(&mut self, handle: usize, store: &PointStore<F>) -> Result<usize> {
        match self {
            CutTree::Pointer(tree) => tree.insert(handle, store),
            CutTree::Compact(tree) => tree.insert(handle, store),
        }
    }

    /// Deletes one instance of the point behind `handle`, returning the
    /// handle the leaf carried.
    pub fn delete(&mut self, handle: usize, store: &PointStore<F>) -> Result<usize> {
        match self {
            CutTree::Pointer(tree) => tree.delete(handle, store),
            CutTree::Compact(tree) => tree.delete(handle, store),
        }
    }

    pub fn mass(&self) -> usize {
        match self {
            CutTree::Pointer(tree) => tree.mass(),
            CutTree::Compact(tree) => tree.mass(),
        }
    }

    pub fn traverse<V: Visitor<F>>(
        &self,
        point: &[F],
        store: &PointStore<F>,
        visitor: &mut V,
    ) -> Result<()> {
        match self {
            CutTree::Pointer(tree) => tree.traverse(point, visitor),
            CutTree::Compact(tree) => tree.traverse(point, store, visitor),
        }
    }

    pub fn traverse_multi<V: MultiVisitor<F>>(
        &self,
        point: &[F],
        missing: &[bool],
        store: &PointStore<F>,
        visitor: &mut V,
    ) -> Result<()> {
        match self {
            CutTree::Pointer(tree) => tree.traverse_multi(point, missing, visitor),
            CutTree::Compact(tree) => tree.traverse_multi(point, missing, store, visitor),
        }
    }

    /// Verifies mass additivity, box minimality and cut placement over the
    /// whole tree.
    pub fn audit(&self, store: &PointStore<F>) -> Result<()> {
        match self {
            CutTree::Pointer(tree) => tree.audit(store),
            CutTree::Compact(tree) => tree.audit(store),
        }
    }

    pub fn root_box(&self, store: &PointStore<F>) -> Option<BoundingBox<F>> {
        match self {
            CutTree::Pointer(tree) => tree.root_box(),
            CutTree::Compact(tree) => tree.root_box(store),
        }
    }

    /// Center of mass of the whole tree, when tracking is enabled.
    pub fn center_of_mass(&self, store: &PointStore<F>) -> Option<Vec<F>> {
        match self {
            CutTree::Pointer(tree) => tree.center_of_mass(),
            CutTree::Compact(tree) => tree.center_of_mass(store),
        }
    }

    pub fn size_hint(&self) -> usize {
        match self {
            CutTree::Pointer(tree) => tree.size_hint(),
            CutTree::Compact(tree) => tree.size_hint(),
        }
    }
}
