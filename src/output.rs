use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::dispersion::DispersionTuple;
use crate::field::MaterialField;
use crate::sampler::EpsGrid;


/// Run statistics written next to the sampled grid.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub shape: [usize; 3],
    pub spacing: [f64; 3],
    pub cells: usize,
    pub interface_cells: usize,
    pub integrated_cells: usize,
    pub exhausted_cells: usize,
    pub has_chi2: bool,
    pub has_chi3: bool,
    pub dispersion: Vec<DispersionTuple>,
}

impl Summary {
    pub fn new(grid: &EpsGrid, field: &MaterialField) -> Self {
        Self {
            shape: grid.layout.shape,
            spacing: grid.layout.spacing.into(),
            cells: grid.layout.len(),
            interface_cells: grid.interface_cells,
            integrated_cells: grid.integrated_cells,
            exhausted_cells: grid.exhausted_cells,
            has_chi2: field.has_chi2(),
            has_chi3: field.has_chi3(),
            dispersion: field.dispersion_catalog().iter().copied().collect(),
        }
    }
}

fn write_eps_rows<W: Write>(grid: &EpsGrid, writer: &mut W) -> Result<()> {
    for ((x, y, z), eps) in grid.eps.indexed_iter() {
        let p = grid.layout.point([x, y, z]);
        write!(writer, "{} {} {} {} {} ", p.x, p.y, p.z, eps, grid.inv_eps[[x, y, z]])?;
        writeln!(
            writer,
            "{} {} {}",
            grid.normal[[x, y, z, 0]],
            grid.normal[[x, y, z, 1]],
            grid.normal[[x, y, z, 2]]
        )?;
    }
    Ok(())
}

/// Writes one `x y z eps inv_eps nx ny nz` row per grid cell.
pub fn write_eps_grid(grid: &EpsGrid, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("could not create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    write_eps_rows(grid, &mut writer)?;
    writer.flush()?;
    Ok(())
}

pub fn write_summary(summary: &Summary, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("could not create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Writes `eps.dat` and `summary.json` into `directory`, creating it if needed.
pub fn writeup(directory: &Path, grid: &EpsGrid, field: &MaterialField) -> Result<()> {
    fs::create_dir_all(directory).with_context(|| format!("could not create {:?}", directory))?;
    write_eps_grid(grid, &directory.join("eps.dat"))?;
    write_summary(&Summary::new(grid, field), &directory.join("summary.json"))?;
    Ok(())
}
