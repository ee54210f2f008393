//! Averaged permittivity on a uniform grid.
//!
//! The grid covers the lattice cell. It is split into slabs along its longest
//! axis; every slab works on its own clone of the field, restricted to the
//! slab, and samples its cells in parallel.

use std::ops::Range;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use log::{debug, info};
use nalgebra::{Point3, Vector3};
use ndarray::{Array3, Array4};
use rayon::prelude::*;

use crate::averaging::AveragingMethod;
use crate::cubature::IntegrationStatus;
use crate::field::MaterialField;
use crate::geom::{Dimensionality, GeomBox};
use crate::settings::Settings;


/// Geometry of the sampling grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub dims: Dimensionality,
    /// Center of the first cell.
    pub origin: Point3<f64>,
    /// Cell widths; zero along inactive axes.
    pub spacing: Vector3<f64>,
    pub shape: [usize; 3],
}

impl GridLayout {
    pub fn from_settings(settings: &Settings) -> Self {
        let dims = settings.dimensions;
        let size = settings.cell_size();
        let cell = settings.cell_bounds();
        let mut shape = [1; 3];
        let mut spacing = Vector3::zeros();
        let mut origin = cell.center();
        for &axis in dims.active_axes() {
            if size[axis] > 0.0 {
                let n = ((size[axis] * settings.resolution).round() as usize).max(1);
                shape[axis] = n;
                spacing[axis] = size[axis] / n as f64;
                origin[axis] = cell.low[axis] + 0.5 * spacing[axis];
            } else {
                spacing[axis] = 1.0 / settings.resolution;
            }
        }
        Self {
            dims,
            origin,
            spacing,
            shape,
        }
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn point(&self, index: [usize; 3]) -> Point3<f64> {
        let mut p = self.origin;
        for axis in 0..3 {
            p[axis] += index[axis] as f64 * self.spacing[axis];
        }
        p
    }

    pub fn cell(&self, index: [usize; 3]) -> GeomBox {
        GeomBox::around(&self.point(index), &(self.spacing * 0.5))
    }

    /// Axis with the most cells, used to split the grid into slabs.
    pub fn longest_axis(&self) -> usize {
        (0..3).max_by_key(|&axis| self.shape[axis]).unwrap_or(0)
    }
}

fn with_axis(mut index: [usize; 3], axis: usize, value: usize) -> [usize; 3] {
    index[axis] = value;
    index
}

/// Splits `0..n` into at most `chunks` contiguous, non-empty ranges.
fn split_slabs(n: usize, chunks: usize) -> Vec<Range<usize>> {
    let chunks = chunks.clamp(1, n.max(1));
    let base = n / chunks;
    let extra = n % chunks;
    let mut start = 0;
    (0..chunks)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
struct CellSample {
    index: [usize; 3],
    eps: f64,
    inv_eps: f64,
    normal: Vector3<f64>,
    method: Option<AveragingMethod>,
    exhausted: bool,
}

/// Averaged permittivity, inverse permittivity and interface normals of a grid.
#[derive(Debug, Clone)]
pub struct EpsGrid {
    pub layout: GridLayout,
    pub eps: Array3<f64>,
    pub inv_eps: Array3<f64>,
    /// Last axis holds the normal components.
    pub normal: Array4<f64>,
    pub interface_cells: usize,
    pub integrated_cells: usize,
    /// Cells whose average stopped on the evaluation budget.
    pub exhausted_cells: usize,
}

fn sample_cell(field: &MaterialField, settings: &Settings, layout: &GridLayout, index: [usize; 3]) -> Result<CellSample> {
    if !settings.enable_averaging {
        let eps = field.eps(&layout.point(index))?;
        return Ok(CellSample {
            index,
            eps,
            inv_eps: 1.0 / eps,
            normal: Vector3::zeros(),
            method: None,
            exhausted: false,
        });
    }
    let mean = field.mean_eps(&layout.cell(index), settings.subpixel_tol, settings.subpixel_maxeval)?;
    Ok(CellSample {
        index,
        eps: mean.eps,
        inv_eps: mean.inv_eps,
        normal: mean.normal,
        method: Some(mean.method),
        exhausted: mean.status == IntegrationStatus::BudgetExhausted,
    })
}

/// Samples the field on the grid described by `settings`.
pub fn sample_grid(field: &MaterialField, settings: &Settings) -> Result<EpsGrid> {
    let layout = GridLayout::from_settings(settings);
    let axis = layout.longest_axis();
    let slabs = split_slabs(layout.shape[axis], settings.num_chunks);
    let bounds = *field.full_index().bounds();
    info!(
        "sampling {} x {} x {} grid in {} slab(s) along axis {}",
        layout.shape[0],
        layout.shape[1],
        layout.shape[2],
        slabs.len(),
        axis
    );

    let pb = ProgressBar::new(layout.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {bar:40.green/blue} {pos:>5}/{len:5} {msg} ETA: {eta_precise}",
        )?
        .progress_chars("█▇▆▅▄▃▂▁"),
    );
    pb.set_message("cells".to_string());

    let samples = slabs
        .par_iter()
        .map(|slab| {
            // the slab plus one cell on either side, within the computational box
            let first = layout.cell(with_axis([0; 3], axis, slab.start));
            let last = layout.cell(with_axis([0; 3], axis, slab.end - 1));
            let mut region = bounds;
            region.low[axis] = (first.low[axis] - layout.spacing[axis]).max(bounds.low[axis]);
            region.high[axis] = (last.high[axis] + layout.spacing[axis]).min(bounds.high[axis]);

            let mut local = field.clone();
            local.restrict_to(&region);
            debug!("slab {:?}: {} object images", slab, local.index().len());

            let mut ranges = [0..layout.shape[0], 0..layout.shape[1], 0..layout.shape[2]];
            ranges[axis] = slab.clone();
            let indices: Vec<[usize; 3]> = ranges
                .into_iter()
                .multi_cartesian_product()
                .map(|i| [i[0], i[1], i[2]])
                .collect();

            let result = indices
                .par_iter()
                .map(|&index| {
                    let sample = sample_cell(&local, settings, &layout, index);
                    pb.inc(1);
                    sample
                })
                .collect::<Result<Vec<_>>>();
            local.release();
            result
        })
        .collect::<Result<Vec<_>>>()?;
    pb.finish_and_clear();

    let shape = (layout.shape[0], layout.shape[1], layout.shape[2]);
    let mut grid = EpsGrid {
        eps: Array3::zeros(shape),
        inv_eps: Array3::zeros(shape),
        normal: Array4::zeros((layout.shape[0], layout.shape[1], layout.shape[2], 3)),
        layout,
        interface_cells: 0,
        integrated_cells: 0,
        exhausted_cells: 0,
    };
    for sample in samples.into_iter().flatten() {
        let [x, y, z] = sample.index;
        grid.eps[[x, y, z]] = sample.eps;
        grid.inv_eps[[x, y, z]] = sample.inv_eps;
        for c in 0..3 {
            grid.normal[[x, y, z, c]] = sample.normal[c];
        }
        match sample.method {
            Some(AveragingMethod::Interface) => grid.interface_cells += 1,
            Some(AveragingMethod::Integrated) => grid.integrated_cells += 1,
            _ => {}
        }
        grid.exhausted_cells += usize::from(sample.exhausted);
    }
    info!(
        "sampled {} cells: {} at interfaces, {} integrated, {} out of budget",
        grid.layout.len(),
        grid.interface_cells,
        grid.integrated_cells,
        grid.exhausted_cells
    );
    Ok(grid)
}
