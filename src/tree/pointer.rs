use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::boundingbox::BoundingBox;
use crate::cut::Cut;
use crate::errors::{ensure_state, ForestError, Result};
use crate::pointstore::PointStore;
use crate::types::CoordFloat;
use crate::visitor::{MultiVisitor, NodeView, Visitor};

struct Leaf<F: CoordFloat> {
    handle: usize,
    mass: u32,
    point: Vec<F>,
}

struct Internal<F: CoordFloat> {
    left: Box<Node<F>>,
    right: Box<Node<F>>,
    mass: u32,
    cut: Cut<F>,
    bounding_box: BoundingBox<F>,
    point_sum: Option<Vec<F>>,
}

enum Node<F: CoordFloat> {
    Leaf(Leaf<F>),
    Internal(Internal<F>),
}

impl<F: CoordFloat> Node<F> {
    fn mass(&self) -> u32 {
        match self {
            Node::Leaf(leaf) => leaf.mass,
            Node::Internal(internal) => internal.mass,
        }
    }

    fn bounding_box(&self) -> BoundingBox<F> {
        match self {
            Node::Leaf(leaf) => BoundingBox::from_point(&leaf.point),
            Node::Internal(internal) => internal.bounding_box.clone(),
        }
    }

    fn grow_box(&self, bbox: &mut BoundingBox<F>) {
        match self {
            Node::Leaf(leaf) => {
                bbox.add_point(&leaf.point);
            }
            Node::Internal(internal) => {
                bbox.add_box(&internal.bounding_box);
            }
        }
    }

    fn point_sum(&self) -> Vec<F> {
        match self {
            Node::Leaf(leaf) => leaf
                .point
                .iter()
                .map(|&x| x * <F as crate::types::CoordFloat>::from_f64(leaf.mass as f64))
                .collect(),
            Node::Internal(internal) => internal
                .point_sum
                .clone()
                .expect("point sums are tracked on every internal node when enabled"),
        }
    }
}

/// Random cut tree with owned node records: child edges are `Box` ownership,
/// recursion carries the parent context, and leaves keep an inline copy of
/// their point next to the store handle.
///
/// Insertion is top-down: at each node the subtree box is extended by the
/// query and a length-weighted random cut is drawn; if the cut separates the
/// query from the subtree a new internal node is created here, otherwise the
/// walk follows the node's existing cut.
pub(crate) struct PointerTree<F: CoordFloat> {
    root: Option<Box<Node<F>>>,
    tree_mass: usize,
    rng: ChaCha20Rng,
    center_of_mass_enabled: bool,
}

impl<F: CoordFloat> PointerTree<F> {
    pub fn new(seed: u64, center_of_mass_enabled: bool) -> Self {
        PointerTree {
            root: None,
            tree_mass: 0,
            rng: ChaCha20Rng::seed_from_u64(seed),
            center_of_mass_enabled,
        }
    }

    pub fn mass(&self) -> usize {
        self.tree_mass
    }

    pub fn insert(&mut self, handle: usize, store: &PointStore<F>) -> Result<usize> {
        let point = store.get(handle)?;
        match self.root.take() {
            None => {
                self.root = Some(Box::new(Node::Leaf(Leaf {
                    handle,
                    mass: 1,
                    point,
                })));
                self.tree_mass = 1;
                Ok(handle)
            }
            Some(root) => {
                let com = self.center_of_mass_enabled;
                let (root, used) = Self::insert_node(root, &point, handle, &mut self.rng, com);
                self.root = Some(root);
                self.tree_mass += 1;
                Ok(used)
            }
        }
    }

    fn insert_node(
        mut node: Box<Node<F>>,
        point: &[F],
        handle: usize,
        rng: &mut ChaCha20Rng,
        com: bool,
    ) -> (Box<Node<F>>, usize) {
        if let Node::Leaf(leaf) = node.as_mut() {
            if leaf.point.as_slice() == point {
                leaf.mass += 1;
                let used = leaf.handle;
                return (node, used);
            }
        }
        let subtree_box = node.bounding_box();
        let factor: f64 = rng.gen();
        if let Some((cut, true)) = Cut::random_cut_and_separation(&subtree_box, factor, point) {
            let new_leaf = Box::new(Node::Leaf(Leaf {
                handle,
                mass: 1,
                point: point.to_vec(),
            }));
            let mut merged = subtree_box;
            merged.add_point(point);
            let mass = node.mass() + 1;
            let point_sum = com.then(|| {
                let mut sum = node.point_sum();
                for (s, &p) in sum.iter_mut().zip(point) {
                    *s = *s + p;
                }
                sum
            });
            let (left, right) = if cut.is_left_of(point) {
                (new_leaf, node)
            } else {
                (node, new_leaf)
            };
            return (
                Box::new(Node::Internal(Internal {
                    left,
                    right,
                    mass,
                    cut,
                    bounding_box: merged,
                    point_sum,
                })),
                handle,
            );
        }
        match *node {
            Node::Internal(mut internal) => {
                let goes_left = internal.cut.is_left_of(point);
                let used = if goes_left {
                    let (child, used) = Self::insert_node(internal.left, point, handle, rng, com);
                    internal.left = child;
                    used
                } else {
                    let (child, used) = Self::insert_node(internal.right, point, handle, rng, com);
                    internal.right = child;
                    used
                };
                internal.mass += 1;
                internal.bounding_box.add_point(point);
                if let Some(sum) = internal.point_sum.as_mut() {
                    for (s, &p) in sum.iter_mut().zip(point) {
                        *s = *s + p;
                    }
                }
                (Box::new(Node::Internal(internal)), used)
            }
            // a point distinct from a lone leaf always draws a separating cut
            Node::Leaf(_) => unreachable!("non-separating cut at a leaf"),
        }
    }

    pub fn delete(&mut self, handle: usize, store: &PointStore<F>) -> Result<usize> {
        let point = store.get(handle)?;
        let Some(root) = self.root.take() else {
            return Err(ForestError::EmptyForest);
        };
        let present = Self::find_leaf(&root, &point)
            .map_or(false, |leaf| leaf.point.as_slice() == point.as_slice());
        if !present {
            self.root = Some(root);
            return Err(ForestError::InvalidArgument {
                msg: "point to delete was not found in the tree",
            });
        }
        let (root, used) = Self::delete_node(root, &point);
        self.root = root;
        self.tree_mass -= 1;
        Ok(used)
    }

    fn find_leaf<'a>(node: &'a Node<F>, point: &[F]) -> Option<&'a Leaf<F>> {
        match node {
            Node::Leaf(leaf) => Some(leaf),
            Node::Internal(internal) => {
                if internal.cut.is_left_of(point) {
                    Self::find_leaf(&internal.left, point)
                } else {
                    Self::find_leaf(&internal.right, point)
                }
            }
        }
    }

    fn delete_node(node: Box<Node<F>>, point: &[F]) -> (Option<Box<Node<F>>>, usize) {
        match *node {
            Node::Leaf(mut leaf) => {
                if leaf.mass > 1 {
                    leaf.mass -= 1;
                    let used = leaf.handle;
                    (Some(Box::new(Node::Leaf(leaf))), used)
                } else {
                    (None, leaf.handle)
                }
            }
            Node::Internal(internal) => {
                let Internal {
                    left,
                    right,
                    mass,
                    cut,
                    bounding_box: _,
                    mut point_sum,
                } = internal;
                let goes_left = cut.is_left_of(point);
                let (child, used, other) = if goes_left {
                    let (child, used) = Self::delete_node(left, point);
                    (child, used, right)
                } else {
                    let (child, used) = Self::delete_node(right, point);
                    (child, used, left)
                };
                match child {
                    // the last copy below this side is gone: promote the sibling
                    None => (Some(other), used),
                    Some(child) => {
                        let mut bounding_box = child.bounding_box();
                        other.grow_box(&mut bounding_box);
                        if let Some(sum) = point_sum.as_mut() {
                            for (s, &p) in sum.iter_mut().zip(point) {
                                *s = *s - p;
                            }
                        }
                        let (left, right) = if goes_left {
                            (child, other)
                        } else {
                            (other, child)
                        };
                        (
                            Some(Box::new(Node::Internal(Internal {
                                left,
                                right,
                                mass: mass - 1,
                                cut,
                                bounding_box,
                                point_sum,
                            }))),
                            used,
                        )
                    }
                }
            }
        }
    }

    pub fn traverse<V: Visitor<F>>(&self, point: &[F], visitor: &mut V) -> Result<()> {
        let mut node = self.root.as_deref().ok_or(ForestError::EmptyForest)?;
        let mut path: Vec<&Node<F>> = Vec::new();
        loop {
            path.push(node);
            match node {
                Node::Leaf(_) => break,
                Node::Internal(internal) => {
                    node = if internal.cut.is_left_of(point) {
                        internal.left.as_ref()
                    } else {
                        internal.right.as_ref()
                    };
                }
            }
        }
        let leaf = match path.last() {
            Some(Node::Leaf(leaf)) => leaf,
            _ => unreachable!("descent ends at a leaf"),
        };
        let depth = path.len() - 1;
        let duplicate = leaf.point.as_slice() == point;
        let mut bbox = BoundingBox::from_point(&leaf.point);
        {
            let view = NodeView::leaf(
                depth,
                leaf.mass as usize,
                leaf.handle,
                &leaf.point,
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
            let parent = match path[i] {
                Node::Internal(internal) => internal,
                Node::Leaf(_) => unreachable!("leaf on the interior of a path"),
            };
            let sibling: &Node<F> = if std::ptr::eq(parent.left.as_ref(), path[i + 1]) {
                parent.right.as_ref()
            } else {
                parent.left.as_ref()
            };
            sibling.grow_box(&mut bbox);
            let mut shadow_probability = 1.0;
            if shadowing {
                match shadow.as_mut() {
                    Some(s) => sibling.grow_box(s),
                    None => shadow = Some(sibling.bounding_box()),
                }
                if let Some(s) = shadow.as_ref() {
                    shadow_probability = s.separation_probability(point);
                }
            }
            let view = NodeView {
                depth: i,
                mass: parent.mass as usize,
                probability: bbox.separation_probability(point),
                shadow_probability,
                bounding_box: Some(&bbox),
                shadow_box: shadow.as_ref(),
                leaf_handle: usize::MAX,
                leaf_point: None,
                duplicate: false,
                cut_dimension: parent.cut.dimension,
            };
            visitor.accept(point, &view);
        }
        Ok(())
    }

    pub fn traverse_multi<V: MultiVisitor<F>>(
        &self,
        point: &[F],
        missing: &[bool],
        visitor: &mut V,
    ) -> Result<()> {
        let root = self.root.as_deref().ok_or(ForestError::EmptyForest)?;
        Self::multi_visit(root, point, missing, 0, visitor);
        Ok(())
    }

    fn multi_visit<V: MultiVisitor<F>>(
        node: &Node<F>,
        point: &[F],
        missing: &[bool],
        depth: usize,
        visitor: &mut V,
    ) -> BoundingBox<F> {
        match node {
            Node::Leaf(leaf) => {
                let duplicate = leaf.point.as_slice() == point;
                let bbox = BoundingBox::from_point(&leaf.point);
                let view = NodeView::leaf(
                    depth,
                    leaf.mass as usize,
                    leaf.handle,
                    &leaf.point,
                    duplicate,
                    &bbox,
                );
                visitor.accept_leaf(point, &view);
                bbox
            }
            Node::Internal(internal) => {
                let mut bbox;
                if visitor.trigger(internal.cut.dimension) {
                    let mut copy = visitor.new_copy();
                    bbox = Self::multi_visit(&internal.left, point, missing, depth + 1, visitor);
                    let right_box =
                        Self::multi_visit(&internal.right, point, missing, depth + 1, &mut copy);
                    visitor.combine(copy);
                    bbox.add_box(&right_box);
                } else {
                    let (next, sibling) = if internal.cut.is_left_of(point) {
                        (internal.left.as_ref(), internal.right.as_ref())
                    } else {
                        (internal.right.as_ref(), internal.left.as_ref())
                    };
                    bbox = Self::multi_visit(next, point, missing, depth + 1, visitor);
                    sibling.grow_box(&mut bbox);
                }
                let view = NodeView::internal(
                    depth,
                    internal.mass as usize,
                    bbox.separation_probability_masked(point, missing),
                    internal.cut.dimension,
                    &bbox,
                );
                visitor.accept(point, &view);
                bbox
            }
        }
    }

    pub fn audit(&self, store: &PointStore<F>) -> Result<()> {
        match self.root.as_deref() {
            None => ensure_state(self.tree_mass == 0, "empty tree with non-zero mass"),
            Some(root) => {
                let (mass, _) = Self::audit_node(root, store)?;
                ensure_state(mass == self.tree_mass, "root mass does not match tree mass")
            }
        }
    }

    fn audit_node(node: &Node<F>, store: &PointStore<F>) -> Result<(usize, BoundingBox<F>)> {
        match node {
            Node::Leaf(leaf) => {
                ensure_state(store.is_live(leaf.handle), "leaf refers to a dead handle")?;
                ensure_state(leaf.mass >= 1, "leaf with zero mass")?;
                Ok((leaf.mass as usize, BoundingBox::from_point(&leaf.point)))
            }
            Node::Internal(internal) => {
                let (left_mass, left_box) = Self::audit_node(&internal.left, store)?;
                let (right_mass, right_box) = Self::audit_node(&internal.right, store)?;
                ensure_state(
                    internal.mass as usize == left_mass + right_mass,
                    "internal mass is not the sum of its children",
                )?;
                let dim = internal.cut.dimension;
                ensure_state(
                    left_box.max_values()[dim] <= internal.cut.value
                        && internal.cut.value < right_box.min_values()[dim],
                    "cut does not separate its children",
                )?;
                let mut merged = left_box;
                merged.add_box(&right_box);
                ensure_state(
                    merged.min_values() == internal.bounding_box.min_values()
                        && merged.max_values() == internal.bounding_box.max_values(),
                    "cached bounding box is not minimal",
                )?;
                Ok((internal.mass as usize, merged))
            }
        }
    }

    pub fn root_box(&self) -> Option<BoundingBox<F>> {
        self.root.as_deref().map(Node::bounding_box)
    }

    pub fn center_of_mass(&self) -> Option<Vec<F>> {
        if !self.center_of_mass_enabled {
            return None;
        }
        self.root.as_deref().map(|root| {
            let mass = root.mass() as f64;
            root.point_sum()
                .into_iter()
                .map(|s| <F as crate::types::CoordFloat>::from_f64(s.as_f64() / mass))
                .collect()
        })
    }

    pub fn size_hint(&self) -> usize {
        fn count<F: CoordFloat>(node: &Node<F>) -> usize {
            match node {
                Node::Leaf(_) => 1,
                Node::Internal(internal) => 1 + count(&internal.left) + count(&internal.right),
            }
        }
        let nodes = self.root.as_deref().map_or(0, |root| count(root));
        nodes * std::mem::size_of::<Node<F>>() + std::mem::size_of::<PointerTree<F>>()
    }
}
