use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::boundingbox::BoundingBox;
use crate::cut::Cut;
use crate::errors::{ensure_state, ForestError, Result};
use crate::pointstore::PointStore;
use crate::tree::nodestore::NodeStore;
use crate::types::CoordFloat;
use crate::visitor::{MultiVisitor, NodeView, Visitor};

/// Random cut tree over the arena `NodeStore`, with leaves referencing the
/// shared point store by handle.
///
/// Insertion is bottom-up: starting from the leaf the query routes to, the
/// subtree box is grown toward the root while a fresh cut is drawn at every
/// level; the highest level whose draw separates the query receives the new
/// internal node. This reproduces the random cut distribution without
/// materializing boxes on the way down.
pub(crate) struct CompactTree<F: CoordFloat> {
    store: NodeStore<F>,
    root: usize,
    tree_mass: usize,
    rng: ChaCha20Rng,
}

impl<F: CoordFloat> CompactTree<F> {
    pub fn new(
        dimensions: usize,
        capacity: usize,
        bounding_box_cache_fraction: f64,
        center_of_mass_enabled: bool,
        seed: u64,
    ) -> Self {
        let store = NodeStore::new(
            capacity,
            dimensions,
            bounding_box_cache_fraction,
            center_of_mass_enabled,
        );
        let root = store.null();
        CompactTree {
            store,
            root,
            tree_mass: 0,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn mass(&self) -> usize {
        self.tree_mass
    }

    pub fn insert(&mut self, handle: usize, store: &PointStore<F>) -> Result<usize> {
        if self.root == self.store.null() {
            self.root = self.store.leaf_index(handle);
            self.tree_mass = 1;
            return Ok(handle);
        }
        let point = store.get(handle)?;
        let mut path = self.store.path_from(self.root, &point);
        let (leaf_node, leaf_sibling) = path.pop().expect("path contains at least the root");
        let leaf_handle = self.store.leaf_handle(leaf_node);

        self.tree_mass += 1;
        if store.point_equals(leaf_handle, &point)? {
            self.store.increase_leaf_mass(leaf_node);
            self.store.ancestors_after_add(&mut path, &point, true);
            return Ok(leaf_handle);
        }

        let old_point = store.get(leaf_handle)?;
        let mut saved_parent = path.last().map_or(self.store.null(), |e| e.0);
        let mut saved_node = leaf_node;
        let mut current_box = BoundingBox::from_point(&old_point);
        let mut saved_box = current_box.clone();
        let mut saved_cut: Option<Cut<F>> = None;
        let mut upper_path: Vec<(usize, usize)> = Vec::new();
        let mut node = leaf_node;
        let mut sibling = leaf_sibling;
        let mut parent = saved_parent;
        loop {
            let factor: f64 = self.rng.gen();
            match Cut::random_cut_and_separation(&current_box, factor, &point) {
                Some((cut, true)) => {
                    saved_cut = Some(cut);
                    saved_parent = parent;
                    saved_node = node;
                    saved_box = current_box.clone();
                    upper_path.clear();
                }
                _ => upper_path.push((node, sibling)),
            }
            ensure_state(saved_cut.is_some(), "no separating cut at the leaf")?;
            if parent == self.store.null() {
                break;
            }
            self.store
                .extend_with_subtree(&mut current_box, sibling, store)?;
            let (a, b) = path.pop().expect("parent was recorded on the path");
            node = a;
            sibling = b;
            parent = path.last().map_or(self.store.null(), |e| e.0);
        }

        if saved_parent != self.store.null() {
            while let Some(entry) = upper_path.pop() {
                path.push(entry);
            }
            ensure_state(
                path.last().map(|e| e.0) == Some(saved_parent),
                "saved parent is not on the path",
            )?;
        } else {
            ensure_state(path.is_empty(), "dangling path above a new root")?;
        }

        let Some(cut) = saved_cut else {
            return Err(ForestError::InconsistentState {
                msg: "insertion finished without a cut",
            });
        };
        let merged = self
            .store
            .add_internal(saved_parent, &point, saved_node, handle, cut, &saved_box, store)?;
        if saved_parent != self.store.null() {
            self.store.ancestors_after_add(&mut path, &point, false);
        } else {
            self.root = merged;
        }
        Ok(handle)
    }

    pub fn delete(&mut self, handle: usize, store: &PointStore<F>) -> Result<usize> {
        if self.root == self.store.null() {
            return Err(ForestError::EmptyForest);
        }
        let point = store.get(handle)?;
        let mut path = self.store.path_from(self.root, &point);
        let (leaf_node, leaf_sibling) = path.pop().expect("path contains at least the root");
        let leaf_handle = self.store.leaf_handle(leaf_node);
        if leaf_handle != handle && !store.point_equals(leaf_handle, &point)? {
            return Err(ForestError::InvalidArgument {
                msg: "point to delete was not found in the tree",
            });
        }

        self.tree_mass -= 1;
        if self.store.decrease_leaf_mass(leaf_node) == 0 {
            if path.is_empty() {
                self.root = self.store.null();
            } else {
                let (parent, _) = path.pop().expect("checked non-empty");
                let grand_parent = path.last().map_or(self.store.null(), |e| e.0);
                if grand_parent == self.store.null() {
                    self.root = leaf_sibling;
                } else {
                    self.store.replace_child(grand_parent, parent, leaf_sibling);
                    self.store
                        .ancestors_after_delete(&mut path, &point, store, false)?;
                }
                self.store.free_internal(parent)?;
            }
        } else {
            self.store
                .ancestors_after_delete(&mut path, &point, store, true)?;
        }
        Ok(leaf_handle)
    }

    pub fn traverse<V: Visitor<F>>(
        &self,
        point: &[F],
        store: &PointStore<F>,
        visitor: &mut V,
    ) -> Result<()> {
        if self.root == self.store.null() {
            return Err(ForestError::EmptyForest);
        }
        let path = self.store.path_from(self.root, point);
        let (leaf_node, _) = *path.last().expect("path contains at least the root");
        let leaf_handle = self.store.leaf_handle(leaf_node);
        let leaf_point = store.get(leaf_handle)?;
        let duplicate = leaf_point.as_slice() == point;
        let depth = path.len() - 1;
        let mut bbox = BoundingBox::from_point(&leaf_point);
        {
            let view = NodeView::leaf(
                depth,
                self.store.mass_of(leaf_node),
                leaf_handle,
                &leaf_point,
                duplicate,
                &bbox,
            );
            visitor.accept_leaf(point, &view);
        }
        let shadowing = visitor.use_shadow_box();
        let mut shadow: Option<BoundingBox<F>> = None;
        for i in (0..path.len() - 1).rev() {
            if visitor.is_converged() {
                break;
            }
            let (parent, _) = path[i];
            let (_, sibling) = path[i + 1];
            self.store.extend_with_subtree(&mut bbox, sibling, store)?;
            let mut shadow_probability = 1.0;
            if shadowing {
                match shadow.as_mut() {
                    Some(s) => self.store.extend_with_subtree(s, sibling, store)?,
                    None => shadow = Some(self.store.bounding_box(sibling, store)?),
                }
                if let Some(s) = shadow.as_ref() {
                    shadow_probability = s.separation_probability(point);
                }
            }
            let (cut_dimension, _) = self.store.cut(parent);
            let view = NodeView {
                depth: i,
                mass: self.store.mass_of(parent),
                probability: bbox.separation_probability(point),
                shadow_probability,
                bounding_box: Some(&bbox),
                shadow_box: shadow.as_ref(),
                leaf_handle: usize::MAX,
                leaf_point: None,
                duplicate: false,
                cut_dimension,
            };
            visitor.accept(point, &view);
        }
        Ok(())
    }

    pub fn traverse_multi<V: MultiVisitor<F>>(
        &self,
        point: &[F],
        missing: &[bool],
        store: &PointStore<F>,
        visitor: &mut V,
    ) -> Result<()> {
        if self.root == self.store.null() {
            return Err(ForestError::EmptyForest);
        }
        self.multi_visit(self.root, point, missing, 0, store, visitor)?;
        Ok(())
    }

    fn multi_visit<V: MultiVisitor<F>>(
        &self,
        node: usize,
        point: &[F],
        missing: &[bool],
        depth: usize,
        store: &PointStore<F>,
        visitor: &mut V,
    ) -> Result<BoundingBox<F>> {
        if self.store.is_leaf(node) {
            let leaf_handle = self.store.leaf_handle(node);
            let leaf_point = store.get(leaf_handle)?;
            let duplicate = leaf_point.as_slice() == point;
            let bbox = BoundingBox::from_point(&leaf_point);
            let view = NodeView::leaf(
                depth,
                self.store.mass_of(node),
                leaf_handle,
                &leaf_point,
                duplicate,
                &bbox,
            );
            visitor.accept_leaf(point, &view);
            return Ok(bbox);
        }
        let (cut_dimension, cut_value) = self.store.cut(node);
        let mut bbox;
        if visitor.trigger(cut_dimension) {
            let mut copy = visitor.new_copy();
            bbox = self.multi_visit(self.store.left(node), point, missing, depth + 1, store, visitor)?;
            let right_box =
                self.multi_visit(self.store.right(node), point, missing, depth + 1, store, &mut copy)?;
            visitor.combine(copy);
            bbox.add_box(&right_box);
        } else {
            let (next, sibling) = if point[cut_dimension] <= cut_value {
                (self.store.left(node), self.store.right(node))
            } else {
                (self.store.right(node), self.store.left(node))
            };
            bbox = self.multi_visit(next, point, missing, depth + 1, store, visitor)?;
            self.store.extend_with_subtree(&mut bbox, sibling, store)?;
        }
        let view = NodeView::internal(
            depth,
            self.store.mass_of(node),
            bbox.separation_probability_masked(point, missing),
            cut_dimension,
            &bbox,
        );
        visitor.accept(point, &view);
        Ok(bbox)
    }

    pub fn audit(&self, store: &PointStore<F>) -> Result<()> {
        if self.root == self.store.null() {
            return ensure_state(self.tree_mass == 0, "empty tree with non-zero mass");
        }
        let (mass, _) = self.audit_node(self.root, store)?;
        ensure_state(mass == self.tree_mass, "root mass does not match tree mass")
    }

    fn audit_node(&self, node: usize, store: &PointStore<F>) -> Result<(usize, BoundingBox<F>)> {
        if self.store.is_leaf(node) {
            let handle = self.store.leaf_handle(node);
            ensure_state(store.is_live(handle), "leaf refers to a dead handle")?;
            let point = store.get(handle)?;
            return Ok((self.store.mass_of(node), BoundingBox::from_point(&point)));
        }
        let (left_mass, left_box) = self.audit_node(self.store.left(node), store)?;
        let (right_mass, right_box) = self.audit_node(self.store.right(node), store)?;
        ensure_state(
            self.store.mass_of(node) == left_mass + right_mass,
            "internal mass is not the sum of its children",
        )?;
        let (dimension, value) = self.store.cut(node);
        ensure_state(
            left_box.max_values()[dimension] <= value && value < right_box.min_values()[dimension],
            "cut does not separate its children",
        )?;
        let mut merged = left_box;
        merged.add_box(&right_box);
        self.store.audit_cached_box(node, &merged)?;
        Ok((left_mass + right_mass, merged))
    }

    pub fn root_box(&self, store: &PointStore<F>) -> Option<BoundingBox<F>> {
        if self.root == self.store.null() {
            None
        } else {
            self.store.bounding_box(self.root, store).ok()
        }
    }

    pub fn center_of_mass(&self, store: &PointStore<F>) -> Option<Vec<F>> {
        if self.root == self.store.null() || self.tree_mass == 0 {
            return None;
        }
        let sum = self.store.subtree_point_sum(self.root, store).ok()?;
        let mass = self.tree_mass as f64;
        Some(
            sum.into_iter()
                .map(|s| <F as crate::types::CoordFloat>::from_f64(s.as_f64() / mass))
                .collect(),
        )
    }

    pub fn size_hint(&self) -> usize {
        self.store.size_hint() + std::mem::size_of::<CompactTree<F>>()
    }
}
