//! Detection of the front and behind materials of a cell.
//!
//! A handful of stencil points around the cell center are located in the
//! geometry index. If they see at most two candidates that agree with each
//! other's priority, the cell is a plain interface between a front object and
//! whatever lies behind it, and can be averaged geometrically. Anything else
//! (three distinct materials, or a dynamic material on either side) is left
//! to numerical integration.

use nalgebra::{Point3, Vector3};

use crate::geom::{Dimensionality, GeomBox, GeometricObject};
use crate::material::MaterialDescriptor;
use crate::tree::GeometryIndex;


/// Stencil offsets in units of the cell half-widths, one table per number of
/// active axes. Columns map onto the active axes in order.
const STENCIL_1D: [[f64; 1]; 3] = [[0.0], [-1.0], [1.0]];
const STENCIL_2D: [[f64; 2]; 5] = [[0.0, 0.0], [-1.0, -1.0], [1.0, 1.0], [-1.0, 1.0], [1.0, -1.0]];
const STENCIL_3D: [[f64; 3]; 9] = [
    [0.0, 0.0, 0.0],
    [1.0, 1.0, 1.0],
    [1.0, 1.0, -1.0],
    [1.0, -1.0, 1.0],
    [1.0, -1.0, -1.0],
    [-1.0, 1.0, 1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [-1.0, -1.0, -1.0],
];

/// Offset vectors (in units of the half-widths) of the stencil for `dims`.
pub fn stencil(dims: Dimensionality) -> Vec<Vector3<f64>> {
    let axes = dims.active_axes();
    let place = |row: &[f64]| {
        let mut v = Vector3::zeros();
        for (&axis, &value) in axes.iter().zip(row) {
            v[axis] = value;
        }
        v
    };
    match axes.len() {
        1 => STENCIL_1D.iter().map(|row| place(&row[..])).collect(),
        2 => STENCIL_2D.iter().map(|row| place(&row[..])).collect(),
        _ => STENCIL_3D.iter().map(|row| place(&row[..])).collect(),
    }
}

/// Result of a successful front detection.
#[derive(Debug, Clone)]
pub struct FrontObject<'a> {
    /// Cell center the detection was made around.
    pub center: Point3<f64>,
    /// The front object, or `None` when the front is the background.
    pub object: Option<&'a GeometricObject>,
    /// Periodic shift of the front object image.
    pub shift: Vector3<f64>,
    pub front: &'a MaterialDescriptor,
    pub behind: &'a MaterialDescriptor,
}

impl FrontObject<'_> {
    /// Whether the cell sees a single material.
    pub fn is_homogeneous(&self) -> bool {
        self.front == self.behind
    }
}

#[derive(Debug, Clone)]
struct Candidate<'a> {
    /// Object identity; `None` is the background, which ranks lowest.
    id: Option<usize>,
    object: Option<&'a GeometricObject>,
    shift: Vector3<f64>,
    material: &'a MaterialDescriptor,
}

impl Candidate<'_> {
    fn same_image(&self, other: &Candidate) -> bool {
        self.id == other.id && self.shift == other.shift
    }
}

/// Where a stencil sample goes.
enum Slot {
    First,
    Second,
    Keep,
}

/// Finds the front and behind materials of `cell`, or `None` when the cell
/// must be averaged by integration.
pub fn front_object<'a>(
    cell: &GeomBox,
    index: &'a GeometryIndex,
    default: &'a MaterialDescriptor,
    dims: Dimensionality,
) -> Option<FrontObject<'a>> {
    let center = cell.center();
    let half = cell.half_widths();

    let mut first: Option<Candidate<'a>> = None;
    let mut second: Option<Candidate<'a>> = None;

    for offset in stencil(dims) {
        let q = center + offset.component_mul(&half);
        let sample = match index.query_point(&q) {
            Some(hit) => {
                let object = index.object(hit.id);
                Candidate {
                    id: Some(hit.id),
                    object: Some(object),
                    shift: hit.shift,
                    material: object.material.or_default(default),
                }
            }
            None => Candidate {
                id: None,
                object: None,
                shift: Vector3::zeros(),
                material: default,
            },
        };

        if first.as_ref().is_some_and(|c| c.same_image(&sample))
            || second.as_ref().is_some_and(|c| c.same_image(&sample))
        {
            continue;
        }

        let slot = match (first.as_ref(), second.as_ref()) {
            (None, _) => Slot::First,
            (Some(_), None) => Slot::Second,
            // a sample outranking both slots replaces the second when the
            // slots do not disagree among themselves
            (Some(c1), Some(c2))
                if sample.id >= c1.id
                    && sample.id >= c2.id
                    && (c1.id == c2.id || c1.material == c2.material) =>
            {
                Slot::Second
            }
            // otherwise it must agree with whichever slot has the lower priority
            (Some(c1), Some(c2))
                if c1.id < c2.id && (c1.id == sample.id || c1.material == sample.material) =>
            {
                Slot::Keep
            }
            (Some(c1), Some(c2))
                if c2.id < c1.id && (c2.id == sample.id || c2.material == sample.material) =>
            {
                Slot::Keep
            }
            (Some(_), Some(_)) => return None,
        };
        match slot {
            Slot::First => first = Some(sample),
            Slot::Second => second = Some(sample),
            Slot::Keep => {}
        }
    }

    let c1 = first?;
    let c2 = second.unwrap_or_else(|| c1.clone());

    if c1.material.is_dynamic() || c2.material.is_dynamic() {
        return None;
    }

    let found = if c1.id >= c2.id {
        FrontObject {
            center,
            object: c1.object,
            shift: c1.shift,
            front: c1.material,
            behind: if c1.id == c2.id { c1.material } else { c2.material },
        }
    } else {
        FrontObject {
            center,
            object: c2.object,
            shift: c2.shift,
            front: c2.material,
            behind: c1.material,
        }
    };
    Some(found)
}
