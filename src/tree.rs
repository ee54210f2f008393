//! Bounding-volume hierarchy over the object list.
//!
//! Every periodic image of every object whose bounding box touches the index
//! bounds becomes one entry. Nodes live in an arena and refer to each other by
//! index; a restricted index is a fresh arena over the same shared objects.

use std::sync::Arc;

use log::debug;
use nalgebra::{Point3, Vector3};

use crate::config;
use crate::geom::{GeomBox, GeometricObject, Lattice};


/// The object found at a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Position of the object in the object list.
    pub id: usize,
    /// Translation of the periodic image containing the point.
    pub shift: Vector3<f64>,
}

#[derive(Debug, Clone)]
struct Entry {
    id: usize,
    /// Index of the shift in [`Lattice::shifts`], unshifted first.
    image: usize,
    shift: Vector3<f64>,
    bounds: GeomBox,
}

impl Entry {
    fn centroid(&self, axis: usize) -> f64 {
        0.5 * (self.bounds.low[axis] + self.bounds.high[axis])
    }

    /// Whether this entry outranks `other` at a shared point.
    fn outranks(&self, other: &Entry) -> bool {
        self.id > other.id || (self.id == other.id && self.image < other.image)
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf { start: usize, len: usize },
    Branch { left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct Node {
    bounds: GeomBox,
    kind: NodeKind,
}

/// Immutable point-location index over a shared object list.
#[derive(Debug, Clone)]
pub struct GeometryIndex {
    objects: Arc<[GeometricObject]>,
    lattice: Lattice,
    bounds: GeomBox,
    entries: Vec<Entry>,
    nodes: Vec<Node>,
    root: Option<usize>,
    depth: usize,
}

impl GeometryIndex {
    /// Builds the index over every image of `objects` that touches `bounds`.
    pub fn build(objects: Arc<[GeometricObject]>, lattice: Lattice, bounds: GeomBox) -> Self {
        let shifts = lattice.shifts();
        let mut entries = Vec::new();
        for (id, object) in objects.iter().enumerate() {
            let object_bounds = object.shape.bounding_box();
            for (image, shift) in shifts.iter().enumerate() {
                let image_bounds = object_bounds.translate(shift);
                if image_bounds.intersects(&bounds) {
                    entries.push(Entry {
                        id,
                        image,
                        shift: *shift,
                        bounds: image_bounds,
                    });
                }
            }
        }

        let mut index = Self {
            objects,
            lattice,
            bounds,
            entries,
            nodes: Vec::new(),
            root: None,
            depth: 0,
        };
        if !index.entries.is_empty() {
            let mut entries = std::mem::take(&mut index.entries);
            let len = entries.len();
            let root = index.build_node(&mut entries, 0, len, 1);
            index.entries = entries;
            index.root = Some(root);
        }

        debug!(
            "geometry index: {} images of {} objects, {} nodes, depth {}",
            index.entries.len(),
            index.objects.len(),
            index.nodes.len(),
            index.depth
        );
        index
    }

    fn build_node(&mut self, entries: &mut [Entry], start: usize, len: usize, depth: usize) -> usize {
        self.depth = self.depth.max(depth);
        let slice = &mut entries[start..start + len];
        let bounds = slice
            .iter()
            .skip(1)
            .fold(slice[0].bounds, |acc, e| acc.union(&e.bounds));

        if len <= config::TREE_LEAF_SIZE || depth >= config::TREE_MAX_DEPTH {
            self.nodes.push(Node {
                bounds,
                kind: NodeKind::Leaf { start, len },
            });
            return self.nodes.len() - 1;
        }

        // split at the median centroid along the longest axis
        let axis = (0..3)
            .max_by(|&a, &b| bounds.extent(a).total_cmp(&bounds.extent(b)))
            .unwrap_or(0);
        slice.sort_by(|a, b| a.centroid(axis).total_cmp(&b.centroid(axis)));
        let half = len / 2;

        let left = self.build_node(entries, start, half, depth + 1);
        let right = self.build_node(entries, start + half, len - half, depth + 1);
        self.nodes.push(Node {
            bounds,
            kind: NodeKind::Branch { left, right },
        });
        self.nodes.len() - 1
    }

    /// Returns a new index over the same objects, limited to `region`.
    pub fn restrict(&self, region: &GeomBox) -> GeometryIndex {
        Self::build(self.objects.clone(), self.lattice.clone(), *region)
    }

    /// The highest-priority object image whose shape contains `p`.
    pub fn query_point(&self, p: &Point3<f64>) -> Option<Hit> {
        let mut best: Option<&Entry> = None;
        let mut stack: Vec<usize> = self.root.into_iter().collect();

        while let Some(node) = stack.pop() {
            let node = &self.nodes[node];
            if !node.bounds.contains(p) {
                continue;
            }
            match node.kind {
                NodeKind::Branch { left, right } => {
                    stack.push(left);
                    stack.push(right);
                }
                NodeKind::Leaf { start, len } => {
                    for entry in &self.entries[start..start + len] {
                        if best.is_some_and(|b| !entry.outranks(b)) || !entry.bounds.contains(p) {
                            continue;
                        }
                        if self.objects[entry.id].shape.contains(&(p - entry.shift)) {
                            best = Some(entry);
                        }
                    }
                }
            }
        }

        best.map(|entry| Hit {
            id: entry.id,
            shift: entry.shift,
        })
    }

    pub fn object(&self, id: usize) -> &GeometricObject {
        &self.objects[id]
    }

    pub fn objects(&self) -> &Arc<[GeometricObject]> {
        &self.objects
    }

    pub fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    pub fn bounds(&self) -> &GeomBox {
        &self.bounds
    }

    /// Number of stored object images.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
