//! Geometric primitives, boxes and coordinate conventions.
//!
//! Positions are `Point3<f64>` in every coordinate system: one-dimensional
//! problems live on the `z` axis, two-dimensional problems in the `x, y`
//! plane, and cylindrical problems use `x` for the radius and `z` for the
//! axial coordinate. Components that are not active are kept at zero.
//!
//! All shapes are convex, so the intersection of a shape with a line is a
//! single interval. The overlap of a cell with a shape is computed by
//! integrating the chord length through the shape along the last active axis
//! over the remaining active axes.

use anyhow::{anyhow, Result};
use itertools::Itertools;
use nalgebra::{Matrix3, Point3, Vector3};
use serde::Deserialize;

use crate::cubature::{Cubature, IntegrationStatus};
use crate::material::MaterialDescriptor;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::cubature::{AdaptiveCubature, IntegrationStatus};
    use std::f64::consts::PI;

    const TOL: f64 = 1e-6;

    fn unit_cube() -> GeomBox {
        GeomBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn sphere_contains() {
        let sphere = Shape::sphere(Point3::new(1.0, 0.0, 0.0), 0.5);
        assert!(sphere.contains(&Point3::new(1.2, 0.1, 0.0)));
        assert!(!sphere.contains(&Point3::new(0.4, 0.0, 0.0)));
    }

    #[test]
    fn rotated_block_contains() {
        let s = 0.5_f64.sqrt();
        let block = Shape::Block {
            center: Point3::origin(),
            size: Vector3::new(2.0, 0.2, 1.0),
            axes: [Vector3::new(s, s, 0.0), Vector3::new(-s, s, 0.0), Vector3::z()],
        };
        assert!(block.contains(&Point3::new(0.6, 0.6, 0.0)));
        assert!(!block.contains(&Point3::new(0.6, -0.6, 0.0)));
        let bounds = block.bounding_box();
        assert!((bounds.high.x - (s + 0.1 * s)).abs() < TOL);
    }

    #[test]
    fn cylinder_bounding_box_along_z() {
        let cyl = Shape::Cylinder {
            center: Point3::origin(),
            axis: Vector3::z(),
            radius: 1.0,
            height: 4.0,
        };
        let bounds = cyl.bounding_box();
        assert!((bounds.high.z - 2.0).abs() < TOL);
        assert!((bounds.high.x - 1.0).abs() < TOL);
        assert!((bounds.low.y + 1.0).abs() < TOL);
    }

    #[test]
    fn sphere_chord() {
        let sphere = Shape::sphere(Point3::origin(), 1.0);
        let through_center = sphere.chord(&Point3::origin(), 0, -5.0, 5.0);
        assert!((through_center - 2.0).abs() < TOL);
        let clipped = sphere.chord(&Point3::origin(), 0, 0.0, 5.0);
        assert!((clipped - 1.0).abs() < TOL);
        let missed = sphere.chord(&Point3::new(0.0, 2.0, 0.0), 0, -5.0, 5.0);
        assert_eq!(missed, 0.0);
    }

    #[test]
    fn ellipsoid_chord() {
        let ellipsoid = Shape::Ellipsoid {
            center: Point3::origin(),
            semi_axes: Vector3::new(3.0, 1.0, 1.0),
            axes: unit_axes(),
        };
        let chord = ellipsoid.chord(&Point3::origin(), 0, -10.0, 10.0);
        assert!((chord - 6.0).abs() < TOL);
    }

    #[test]
    fn sphere_normal_points_outward() {
        let sphere = Shape::sphere(Point3::origin(), 1.0);
        let n = sphere.normal(&Point3::new(0.0, 0.9, 0.0)).normalize();
        assert!((n - Vector3::y()).norm() < TOL);
    }

    #[test]
    fn block_normal_picks_nearest_face() {
        let block = Shape::block(Point3::origin(), Vector3::new(2.0, 2.0, 2.0));
        let n = block.normal(&Point3::new(0.95, 0.2, -0.1)).normalize();
        assert!((n - Vector3::x()).norm() < TOL);
        let n = block.normal(&Point3::new(0.1, 0.2, -0.99)).normalize();
        assert!((n + Vector3::z()).norm() < TOL);
    }

    #[test]
    fn half_space_overlap_is_exact() {
        // a large block whose +x face cuts the cell at x = 0.3
        let block = Shape::block(Point3::new(-9.7, 0.5, 0.5), Vector3::new(20.0, 20.0, 20.0));
        let cubature = AdaptiveCubature::default();
        let (overlap, _) = block.box_overlap(&unit_cube(), &[0, 1, 2], &cubature, 1e-6, 0);
        assert!((overlap - 0.3).abs() < 1e-9, "overlap: {}", overlap);
    }

    #[test]
    fn disc_overlap_2d() {
        let disc = Shape::Cylinder {
            center: Point3::origin(),
            axis: Vector3::z(),
            radius: 0.5,
            height: 10.0,
        };
        let cell = GeomBox::new(Point3::new(-1.0, -1.0, 0.0), Point3::new(1.0, 1.0, 0.0));
        let cubature = AdaptiveCubature::default();
        let (overlap, status) = disc.box_overlap(&cell, &[0, 1], &cubature, 1e-8, 0);
        assert!((overlap - PI * 0.25 / 4.0).abs() < 1e-5, "overlap: {}", overlap);
        assert_eq!(status, IntegrationStatus::Converged);

        // one rule application is all a budget of one allows
        let (starved, status) = disc.box_overlap(&cell, &[0, 1], &cubature, 1e-12, 1);
        assert_eq!(status, IntegrationStatus::BudgetExhausted);
        assert!((0.0..=1.0).contains(&starved));
    }

    #[test]
    fn overlap_without_intersection_is_zero() {
        let sphere = Shape::sphere(Point3::new(5.0, 5.0, 5.0), 1.0);
        let cubature = AdaptiveCubature::default();
        let (overlap, status) = sphere.box_overlap(&unit_cube(), &[0, 1, 2], &cubature, 1e-6, 0);
        assert_eq!(overlap, 0.0);
        assert_eq!(status, IntegrationStatus::Converged);
    }

    #[test]
    fn shrinking_never_increases_overlap() {
        let cubature = AdaptiveCubature::default();
        let cell = GeomBox::new(Point3::new(0.5, -0.5, -0.5), Point3::new(1.5, 0.5, 0.5));
        let mut previous = f64::INFINITY;
        for radius in [1.4, 1.2, 1.0, 0.8, 0.6] {
            let sphere = Shape::sphere(Point3::origin(), radius);
            let (overlap, _) = sphere.box_overlap(&cell, &[0, 1, 2], &cubature, 1e-7, 0);
            assert!(overlap <= previous + 1e-6, "{} > {}", overlap, previous);
            previous = overlap;
        }
    }

    #[test]
    fn lattice_wraps_into_cell() {
        let lattice = Lattice::new(Point3::origin(), Vector3::new(2.0, 0.0, 0.0), [true, false, false]);
        let p = lattice.wrap(&Point3::new(2.5, 7.0, 0.0));
        assert!((p.x - 0.5).abs() < TOL);
        assert_eq!(p.y, 7.0);
        assert_eq!(lattice.shifts().len(), 3);
    }

    #[test]
    fn cylindrical_active_axes() {
        assert_eq!(Dimensionality::Cylindrical.active_axes(), &[0, 2]);
        assert_eq!(Dimensionality::Cylindrical.integration_order(), [0, 2, 1]);
        let v = Dimensionality::One.project(&Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(v, Vector3::new(0.0, 0.0, 3.0));
    }

    #[test]
    fn degenerate_shapes_are_rejected() {
        assert!(Shape::sphere(Point3::origin(), -1.0).validate().is_err());
        let flat = Shape::Block {
            center: Point3::origin(),
            size: Vector3::new(1.0, 1.0, 1.0),
            axes: [Vector3::x(), Vector3::x(), Vector3::z()],
        };
        assert!(flat.validate().is_err());
    }
}

/// The coordinate system of the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimensionality {
    One,
    Two,
    Three,
    Cylindrical,
}

impl Dimensionality {
    /// Axes that carry a coordinate in this system.
    pub fn active_axes(&self) -> &'static [usize] {
        match self {
            Dimensionality::One => &[2],
            Dimensionality::Two => &[0, 1],
            Dimensionality::Three => &[0, 1, 2],
            Dimensionality::Cylindrical => &[0, 2],
        }
    }

    pub fn dimensions(&self) -> usize {
        self.active_axes().len()
    }

    pub fn is_cylindrical(&self) -> bool {
        *self == Dimensionality::Cylindrical
    }

    /// Order in which axes enter the fallback integration. In cylindrical
    /// coordinates the radius comes first, followed by `z`.
    pub fn integration_order(&self) -> [usize; 3] {
        match self {
            Dimensionality::Cylindrical => [0, 2, 1],
            _ => [0, 1, 2],
        }
    }

    /// Zeroes the components of `v` that are not active.
    pub fn project(&self, v: &Vector3<f64>) -> Vector3<f64> {
        let mut out = Vector3::zeros();
        for &axis in self.active_axes() {
            out[axis] = v[axis];
        }
        out
    }

    pub fn project_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.project(&p.coords))
    }
}

/// Axis-aligned box, closed on both sides. Zero-width boxes are allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeomBox {
    pub low: Point3<f64>,
    pub high: Point3<f64>,
}

impl GeomBox {
    pub fn new(low: Point3<f64>, high: Point3<f64>) -> Self {
        Self { low, high }
    }

    /// A box centred on `center` with half-widths `half`.
    pub fn around(center: &Point3<f64>, half: &Vector3<f64>) -> Self {
        Self::new(center - half, center + half)
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.low, &self.high)
    }

    pub fn half_widths(&self) -> Vector3<f64> {
        (self.high - self.low) * 0.5
    }

    pub fn extent(&self, axis: usize) -> f64 {
        self.high[axis] - self.low[axis]
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        (0..3).all(|i| p[i] >= self.low[i] && p[i] <= self.high[i])
    }

    /// Whether `p` lies inside the box widened by `slack` times its size on each axis.
    pub fn contains_with_slack(&self, p: &Point3<f64>, slack: f64) -> bool {
        (0..3).all(|i| {
            let pad = slack * self.extent(i).abs().max(1.0);
            p[i] >= self.low[i] - pad && p[i] <= self.high[i] + pad
        })
    }

    pub fn intersects(&self, other: &GeomBox) -> bool {
        (0..3).all(|i| self.low[i] <= other.high[i] && other.low[i] <= self.high[i])
    }

    pub fn intersection(&self, other: &GeomBox) -> Option<GeomBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(GeomBox::new(
            self.low.sup(&other.low),
            self.high.inf(&other.high),
        ))
    }

    pub fn union(&self, other: &GeomBox) -> GeomBox {
        GeomBox::new(self.low.inf(&other.low), self.high.sup(&other.high))
    }

    pub fn translate(&self, shift: &Vector3<f64>) -> GeomBox {
        GeomBox::new(self.low + shift, self.high + shift)
    }

    /// Product of the extents along `axes`.
    pub fn measure(&self, axes: &[usize]) -> f64 {
        axes.iter().map(|&axis| self.extent(axis)).product()
    }
}

fn unit_axes() -> [Vector3<f64>; 3] {
    [Vector3::x(), Vector3::y(), Vector3::z()]
}

fn z_axis() -> Vector3<f64> {
    Vector3::z()
}

/// Inverse of the frame whose columns are the normalised `axes`. Maps world
/// offsets to frame coordinates.
fn frame_inverse(axes: &[Vector3<f64>; 3]) -> Option<Matrix3<f64>> {
    Matrix3::from_columns(&[axes[0].normalize(), axes[1].normalize(), axes[2].normalize()])
        .try_inverse()
}

/// Parameter interval of `q0 + t * qd` within `[-half, half]`.
fn slab(q0: f64, qd: f64, half: f64) -> Option<(f64, f64)> {
    if qd == 0.0 {
        return (q0.abs() <= half).then_some((f64::NEG_INFINITY, f64::INFINITY));
    }
    let t0 = (-half - q0) / qd;
    let t1 = (half - q0) / qd;
    Some((t0.min(t1), t0.max(t1)))
}

/// Parameter interval where `a t^2 + 2 b t + c <= 0`, for `a >= 0`.
fn quadratic_interval(a: f64, b: f64, c: f64) -> Option<(f64, f64)> {
    if a == 0.0 {
        return (c <= 0.0).then_some((f64::NEG_INFINITY, f64::INFINITY));
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let s = disc.sqrt();
    Some(((-b - s) / a, (-b + s) / a))
}

fn intersect_intervals(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    let ((a0, a1), (b0, b1)) = (a?, b?);
    let (lo, hi) = (a0.max(b0), a1.min(b1));
    (lo <= hi).then_some((lo, hi))
}

/// A convex shape primitive.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Sphere {
        center: Point3<f64>,
        radius: f64,
    },
    /// Circular cylinder of `height` along `axis`, centred on `center`.
    Cylinder {
        center: Point3<f64>,
        #[serde(default = "z_axis")]
        axis: Vector3<f64>,
        radius: f64,
        height: f64,
    },
    /// Parallelepiped with edge lengths `size` along the frame `axes`.
    Block {
        center: Point3<f64>,
        size: Vector3<f64>,
        #[serde(default = "unit_axes")]
        axes: [Vector3<f64>; 3],
    },
    Ellipsoid {
        center: Point3<f64>,
        semi_axes: Vector3<f64>,
        #[serde(default = "unit_axes")]
        axes: [Vector3<f64>; 3],
    },
}

impl Shape {
    pub fn sphere(center: Point3<f64>, radius: f64) -> Self {
        Shape::Sphere { center, radius }
    }

    /// An axis-aligned block.
    pub fn block(center: Point3<f64>, size: Vector3<f64>) -> Self {
        Shape::Block {
            center,
            size,
            axes: unit_axes(),
        }
    }

    /// Name of the primitive, for log output.
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Sphere { .. } => "sphere",
            Shape::Cylinder { .. } => "cylinder",
            Shape::Block { .. } => "block",
            Shape::Ellipsoid { .. } => "ellipsoid",
        }
    }

    pub fn center(&self) -> Point3<f64> {
        match self {
            Shape::Sphere { center, .. }
            | Shape::Cylinder { center, .. }
            | Shape::Block { center, .. }
            | Shape::Ellipsoid { center, .. } => *center,
        }
    }

    /// Checks that the shape has a non-degenerate extent and frame.
    pub fn validate(&self) -> Result<()> {
        match self {
            Shape::Sphere { radius, .. } => {
                if !(*radius > 0.0) {
                    return Err(anyhow!("sphere radius must be positive, got {}", radius));
                }
            }
            Shape::Cylinder {
                axis,
                radius,
                height,
                ..
            } => {
                if !(*radius > 0.0) || !(*height > 0.0) {
                    return Err(anyhow!(
                        "cylinder radius and height must be positive, got {} and {}",
                        radius,
                        height
                    ));
                }
                if axis.norm() == 0.0 {
                    return Err(anyhow!("cylinder axis must be non-zero"));
                }
            }
            Shape::Block { size, axes, .. } => {
                if size.iter().any(|s| !(*s >= 0.0)) {
                    return Err(anyhow!("block size must be non-negative, got {:?}", size));
                }
                if frame_inverse(axes).is_none() {
                    return Err(anyhow!("block axes are linearly dependent: {:?}", axes));
                }
            }
            Shape::Ellipsoid {
                semi_axes, axes, ..
            } => {
                if semi_axes.iter().any(|s| !(*s > 0.0)) {
                    return Err(anyhow!(
                        "ellipsoid semi-axes must be positive, got {:?}",
                        semi_axes
                    ));
                }
                if frame_inverse(axes).is_none() {
                    return Err(anyhow!("ellipsoid axes are linearly dependent: {:?}", axes));
                }
            }
        }
        Ok(())
    }

    pub fn contains(&self, p: &Point3<f64>) -> bool {
        match self {
            Shape::Sphere { center, radius } => (p - center).norm_squared() <= radius * radius,
            Shape::Cylinder {
                center,
                axis,
                radius,
                height,
            } => {
                let a = axis.normalize();
                let d = p - center;
                let h = d.dot(&a);
                h.abs() <= height * 0.5 && (d - a * h).norm_squared() <= radius * radius
            }
            Shape::Block { center, size, axes } => {
                let Some(inv) = frame_inverse(axes) else {
                    return false;
                };
                let q = inv * (p - center);
                (0..3).all(|i| q[i].abs() <= size[i] * 0.5)
            }
            Shape::Ellipsoid {
                center,
                semi_axes,
                axes,
            } => {
                let Some(inv) = frame_inverse(axes) else {
                    return false;
                };
                let q = (inv * (p - center)).component_div(semi_axes);
                q.norm_squared() <= 1.0
            }
        }
    }

    pub fn bounding_box(&self) -> GeomBox {
        match self {
            Shape::Sphere { center, radius } => {
                GeomBox::around(center, &Vector3::repeat(*radius))
            }
            Shape::Cylinder {
                center,
                axis,
                radius,
                height,
            } => {
                let a = axis.normalize();
                let half = Vector3::from_fn(|i, _| {
                    height * 0.5 * a[i].abs() + radius * (1.0 - a[i] * a[i]).max(0.0).sqrt()
                });
                GeomBox::around(center, &half)
            }
            Shape::Block { center, size, axes } => {
                let half = Vector3::from_fn(|i, _| {
                    (0..3)
                        .map(|j| axes[j].normalize()[i].abs() * size[j] * 0.5)
                        .sum::<f64>()
                });
                GeomBox::around(center, &half)
            }
            Shape::Ellipsoid {
                center,
                semi_axes,
                axes,
            } => {
                let half = Vector3::from_fn(|i, _| {
                    (0..3)
                        .map(|j| (axes[j].normalize()[i] * semi_axes[j]).powi(2))
                        .sum::<f64>()
                        .sqrt()
                });
                GeomBox::around(center, &half)
            }
        }
    }

    /// Outward normal of the boundary nearest to `p`, not normalised.
    pub fn normal(&self, p: &Point3<f64>) -> Vector3<f64> {
        match self {
            Shape::Sphere { center, .. } => p - center,
            Shape::Cylinder {
                center,
                axis,
                radius,
                height,
            } => {
                let a = axis.normalize();
                let d = p - center;
                let h = d.dot(&a);
                let radial = d - a * h;
                let to_side = (radius - radial.norm()).abs();
                let to_cap = (height * 0.5 - h.abs()).abs();
                if to_cap < to_side {
                    a * h.signum()
                } else {
                    radial
                }
            }
            Shape::Block { center, size, axes } => {
                let Some(inv) = frame_inverse(axes) else {
                    return Vector3::zeros();
                };
                let q = inv * (p - center);
                let face = (0..3)
                    .min_by(|&i, &j| {
                        let di = (size[i] * 0.5 - q[i].abs()).abs();
                        let dj = (size[j] * 0.5 - q[j].abs()).abs();
                        di.total_cmp(&dj)
                    })
                    .unwrap_or(0);
                let mut local = Vector3::zeros();
                local[face] = if q[face] < 0.0 { -1.0 } else { 1.0 };
                inv.transpose() * local
            }
            Shape::Ellipsoid {
                center,
                semi_axes,
                axes,
            } => {
                let Some(inv) = frame_inverse(axes) else {
                    return Vector3::zeros();
                };
                let q = inv * (p - center);
                let grad = q.component_div(&semi_axes.component_mul(semi_axes));
                inv.transpose() * grad
            }
        }
    }

    /// Parameter interval of the line `origin + t * dir` inside the shape.
    pub fn line_interval(&self, origin: &Point3<f64>, dir: &Vector3<f64>) -> Option<(f64, f64)> {
        match self {
            Shape::Sphere { center, radius } => {
                let d = origin - center;
                quadratic_interval(
                    dir.norm_squared(),
                    d.dot(dir),
                    d.norm_squared() - radius * radius,
                )
            }
            Shape::Cylinder {
                center,
                axis,
                radius,
                height,
            } => {
                let a = axis.normalize();
                let d = origin - center;
                let axial = slab(d.dot(&a), dir.dot(&a), height * 0.5);
                let dp = d - a * d.dot(&a);
                let up = dir - a * dir.dot(&a);
                let radial =
                    quadratic_interval(up.norm_squared(), dp.dot(&up), dp.norm_squared() - radius * radius);
                intersect_intervals(axial, radial)
            }
            Shape::Block { center, size, axes } => {
                let inv = frame_inverse(axes)?;
                let q0 = inv * (origin - center);
                let qd = inv * dir;
                (0..3).fold(Some((f64::NEG_INFINITY, f64::INFINITY)), |acc, i| {
                    intersect_intervals(acc, slab(q0[i], qd[i], size[i] * 0.5))
                })
            }
            Shape::Ellipsoid {
                center,
                semi_axes,
                axes,
            } => {
                let inv = frame_inverse(axes)?;
                let q0 = (inv * (origin - center)).component_div(semi_axes);
                let qd = (inv * dir).component_div(semi_axes);
                quadratic_interval(qd.norm_squared(), q0.dot(&qd), q0.norm_squared() - 1.0)
            }
        }
    }

    /// Length of the segment `[a, b]` along `axis`, through the point `p`,
    /// that lies inside the shape.
    pub fn chord(&self, p: &Point3<f64>, axis: usize, a: f64, b: f64) -> f64 {
        let mut origin = *p;
        origin[axis] = 0.0;
        let mut dir = Vector3::zeros();
        dir[axis] = 1.0;
        match self.line_interval(&origin, &dir) {
            Some((t0, t1)) => (t1.min(b) - t0.max(a)).max(0.0),
            None => 0.0,
        }
    }

    /// Fraction of `cell` lying inside the shape, measured over `axes`, and
    /// whether the integration converged.
    ///
    /// Axes of zero extent are ignored. The chord length along the last axis
    /// is integrated over the others with `cubature`, bounded by `tol` and
    /// `max_eval` (zero for no limit).
    pub fn box_overlap(
        &self,
        cell: &GeomBox,
        axes: &[usize],
        cubature: &dyn Cubature,
        tol: f64,
        max_eval: usize,
    ) -> (f64, IntegrationStatus) {
        let axes: Vec<usize> = axes
            .iter()
            .copied()
            .filter(|&axis| cell.extent(axis) > 0.0)
            .collect();
        let center = cell.center();

        let Some((&last, rest)) = axes.split_last() else {
            let fill = if self.contains(&center) { 1.0 } else { 0.0 };
            return (fill, IntegrationStatus::Converged);
        };
        let Some(inter) = cell.intersection(&self.bounding_box()) else {
            return (0.0, IntegrationStatus::Converged);
        };
        if rest.iter().any(|&axis| inter.extent(axis) <= 0.0) {
            return (0.0, IntegrationStatus::Converged);
        }

        let (lo, hi) = (inter.low[last], inter.high[last]);
        let (inside, status) = if rest.is_empty() {
            (self.chord(&center, last, lo, hi), IntegrationStatus::Converged)
        } else {
            let xmin: Vec<f64> = rest.iter().map(|&axis| inter.low[axis]).collect();
            let xmax: Vec<f64> = rest.iter().map(|&axis| inter.high[axis]).collect();
            let mut integrand = |x: &[f64]| {
                let mut p = center;
                for (&axis, &value) in rest.iter().zip(x) {
                    p[axis] = value;
                }
                self.chord(&p, last, lo, hi)
            };
            let integral = cubature.integrate(&mut integrand, &xmin, &xmax, tol, max_eval);
            (integral.estimate, integral.status)
        };

        ((inside / cell.measure(&axes)).clamp(0.0, 1.0), status)
    }
}

/// A shape paired with its material. The identity of an object is its
/// position in the object list; later objects take precedence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeometricObject {
    pub shape: Shape,
    #[serde(default = "inherit_default")]
    pub material: MaterialDescriptor,
}

fn inherit_default() -> MaterialDescriptor {
    MaterialDescriptor::InheritDefault
}

impl GeometricObject {
    pub fn new(shape: Shape, material: MaterialDescriptor) -> Self {
        Self { shape, material }
    }
}

/// Rectangular lattice used to replicate objects along periodic axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    pub center: Point3<f64>,
    pub size: Vector3<f64>,
    pub periodic: [bool; 3],
}

impl Lattice {
    pub fn new(center: Point3<f64>, size: Vector3<f64>, periodic: [bool; 3]) -> Self {
        Self {
            center,
            size,
            periodic,
        }
    }

    /// A lattice without periodic axes.
    pub fn aperiodic() -> Self {
        Self::new(Point3::origin(), Vector3::zeros(), [false; 3])
    }

    fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis] && self.size[axis] > 0.0
    }

    /// Translations of the periodic images to consider, unshifted first.
    pub fn shifts(&self) -> Vec<Vector3<f64>> {
        (0..3)
            .map(|axis| {
                if self.is_periodic(axis) {
                    vec![0.0, -self.size[axis], self.size[axis]]
                } else {
                    vec![0.0]
                }
            })
            .multi_cartesian_product()
            .map(|offsets| Vector3::new(offsets[0], offsets[1], offsets[2]))
            .collect()
    }

    /// Folds the periodic coordinates of `p` into the lattice cell.
    pub fn wrap(&self, p: &Point3<f64>) -> Point3<f64> {
        let mut out = *p;
        for axis in 0..3 {
            if self.is_periodic(axis) {
                let size = self.size[axis];
                let low = self.center[axis] - size * 0.5;
                out[axis] -= size * ((out[axis] - low) / size).floor();
            }
        }
        out
    }
}
