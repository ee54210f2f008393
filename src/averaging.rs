//! Subpixel averaging of the permittivity over a grid cell.
//!
//! Cells that see a single interface are averaged geometrically: the fill
//! fraction of the front object weights the front and behind permittivities,
//! and the object's surface normal is reported for anisotropic correction.
//! Every other cell is averaged by integrating `eps` and `1/eps` over the
//! cell, weighted by the radius in cylindrical coordinates.

use anyhow::Result;
use nalgebra::{Point3, Vector3};

use crate::cubature::IntegrationStatus;
use crate::field::MaterialField;
use crate::front::{front_object, stencil, FrontObject};
use crate::geom::GeomBox;


/// How a cell average was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AveragingMethod {
    /// The cell sees one material.
    Homogeneous,
    /// Fill-fraction blend across a single interface.
    Interface,
    /// Numerical integration over the cell.
    Integrated,
}

/// Effective permittivity of a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeanEps {
    pub eps: f64,
    pub inv_eps: f64,
    /// Unit normal of the interface, zero in homogeneous cells.
    pub normal: Vector3<f64>,
    pub method: AveragingMethod,
    /// `BudgetExhausted` when the overlap or fallback integral stopped on
    /// its evaluation budget; the averages are still the best estimates.
    pub status: IntegrationStatus,
}

/// Linear blend by the front share, exact at the ends so that an infinite
/// value on one side does not leak into a cell it does not touch.
fn blend(front: f64, behind: f64, overlap: f64) -> f64 {
    if overlap >= 1.0 {
        front
    } else if overlap <= 0.0 {
        behind
    } else {
        front * overlap + behind * (1.0 - overlap)
    }
}

fn unit_or_zero(v: Vector3<f64>) -> Vector3<f64> {
    v.try_normalize(0.0).unwrap_or_else(Vector3::zeros)
}

/// Budgets of zero or below mean "no limit".
fn eval_budget(max_eval: i64) -> usize {
    usize::try_from(max_eval).unwrap_or(0)
}

impl MaterialField {
    /// Averages `eps` and `1/eps` over `cell` to relative tolerance `tol`,
    /// spending at most about `max_eval` integrand evaluations on the overlap
    /// or the fallback integral.
    pub fn mean_eps(&self, cell: &GeomBox, tol: f64, max_eval: i64) -> Result<MeanEps> {
        let max_eval = eval_budget(max_eval);
        let Some(found) = front_object(cell, self.full_index(), self.default_material(), self.dims())
        else {
            return self.integrated_mean_eps(cell, tol, max_eval);
        };

        let (eps, inv_eps) = found.front.eps_pair()?;
        if found.is_homogeneous() {
            return Ok(MeanEps {
                eps,
                inv_eps,
                normal: Vector3::zeros(),
                method: AveragingMethod::Homogeneous,
                status: IntegrationStatus::Converged,
            });
        }
        let Some(object) = found.object else {
            return self.integrated_mean_eps(cell, tol, max_eval);
        };

        let (eps_behind, inv_behind) = found.behind.eps_pair()?;
        let local = cell.translate(&-found.shift);
        let (overlap, status) = object.shape.box_overlap(
            &local,
            self.dims().active_axes(),
            self.cubature(),
            tol,
            max_eval,
        );

        Ok(MeanEps {
            eps: blend(eps, eps_behind, overlap),
            inv_eps: blend(inv_eps, inv_behind, overlap),
            normal: self.front_normal(&found),
            method: AveragingMethod::Interface,
            status,
        })
    }

    /// Unit normal of the interface crossing `cell`, zero if the cell is
    /// homogeneous.
    pub fn normal_vector(&self, cell: &GeomBox) -> Result<Vector3<f64>> {
        match front_object(cell, self.full_index(), self.default_material(), self.dims()) {
            Some(found) if found.is_homogeneous() => Ok(Vector3::zeros()),
            Some(found) if found.object.is_some() => Ok(self.front_normal(&found)),
            _ => self.default_normal(cell),
        }
    }

    fn front_normal(&self, found: &FrontObject) -> Vector3<f64> {
        let Some(object) = found.object else {
            return Vector3::zeros();
        };
        let normal = object.shape.normal(&(found.center - found.shift));
        unit_or_zero(self.dims().project(&normal))
    }

    /// Shape-agnostic normal estimate: the direction in which `1/eps`
    /// decreases fastest across the corners of the cell.
    pub fn default_normal(&self, cell: &GeomBox) -> Result<Vector3<f64>> {
        let center = cell.center();
        let half = cell.half_widths();
        let mut sum = Vector3::zeros();
        for offset in stencil(self.dims()) {
            let reach = offset.component_mul(&half);
            let Some(direction) = reach.try_normalize(0.0) else {
                continue;
            };
            let (_, inv_eps) = self.material_at(&(center + reach))?.eps_pair()?;
            sum += direction * inv_eps;
        }
        Ok(unit_or_zero(-sum))
    }

    fn integrated_mean_eps(&self, cell: &GeomBox, tol: f64, max_eval: usize) -> Result<MeanEps> {
        let (eps, inv_eps, status) = self.fallback_mean_eps(cell, tol, max_eval)?;
        Ok(MeanEps {
            eps,
            inv_eps,
            normal: self.default_normal(cell)?,
            method: AveragingMethod::Integrated,
            status,
        })
    }

    /// Cell averages of `eps` and `1/eps` by direct integration over the
    /// active axes of non-zero extent, with the combined integration status.
    pub fn fallback_mean_eps(
        &self,
        cell: &GeomBox,
        tol: f64,
        max_eval: usize,
    ) -> Result<(f64, f64, IntegrationStatus)> {
        let dims = self.dims();
        let cylindrical = dims.is_cylindrical();
        let axes: Vec<usize> = dims
            .integration_order()
            .into_iter()
            .filter(|axis| dims.active_axes().contains(axis) && cell.extent(*axis) > 0.0)
            .collect();

        let mut volume = cell.measure(&axes);
        if cylindrical {
            volume *= 0.5 * (cell.low.x + cell.high.x);
        }
        let center = cell.center();
        if axes.is_empty() || volume == 0.0 {
            let (eps, inv_eps) = self.material_at(&center)?.eps_pair()?;
            return Ok((eps, inv_eps, IntegrationStatus::Converged));
        }

        let xmin: Vec<f64> = axes.iter().map(|&axis| cell.low[axis]).collect();
        let xmax: Vec<f64> = axes.iter().map(|&axis| cell.high[axis]).collect();
        let point = |x: &[f64]| {
            let mut p: Point3<f64> = center;
            for (&axis, &value) in axes.iter().zip(x) {
                p[axis] = value;
            }
            p
        };
        let weight = |p: &Point3<f64>| if cylindrical { p.x } else { 1.0 };

        let mut failure = None;
        let mut conductor = false;
        let mut eps_integrand = |x: &[f64]| {
            let p = point(x);
            match self.material_at(&p).and_then(|m| m.eps_pair()) {
                // a conductor anywhere in the cell makes the average -inf
                Ok((eps, _)) if eps == f64::NEG_INFINITY => {
                    conductor = true;
                    0.0
                }
                Ok((eps, _)) => eps * weight(&p),
                Err(err) => {
                    failure.get_or_insert(err);
                    0.0
                }
            }
        };
        let eps_integral = self
            .cubature()
            .integrate(&mut eps_integrand, &xmin, &xmax, tol, max_eval);

        let mut inv_integrand = |x: &[f64]| {
            let p = point(x);
            match self.material_at(&p).and_then(|m| m.eps_pair()) {
                Ok((_, inv_eps)) => inv_eps * weight(&p),
                Err(err) => {
                    failure.get_or_insert(err);
                    0.0
                }
            }
        };
        let inv_integral = self
            .cubature()
            .integrate(&mut inv_integrand, &xmin, &xmax, tol, max_eval);

        if let Some(err) = failure {
            return Err(err.into());
        }
        let eps = if conductor {
            f64::NEG_INFINITY
        } else {
            eps_integral.estimate / volume
        };
        let status = if eps_integral.status == IntegrationStatus::BudgetExhausted {
            eps_integral.status
        } else {
            inv_integral.status
        };
        Ok((eps, inv_integral.estimate / volume, status))
    }
}
