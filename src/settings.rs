use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ::config::{Config, Environment, File};
use log::info;
use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config;
use crate::geom::{Dimensionality, GeomBox, GeometricObject, Lattice};
use crate::material::MaterialDescriptor;


/// Runtime configuration for the application.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Settings {
    pub dimensions: Dimensionality,
    /// Lattice cell size. Components at or below `2/1e20` mean "no size".
    pub size: Vector3<f64>,
    #[serde(default = "Point3::origin")]
    pub center: Point3<f64>,
    /// Pixels per unit length.
    pub resolution: f64,
    #[serde(default = "default_true")]
    pub enable_averaging: bool,
    #[serde(default = "default_subpixel_tol")]
    pub subpixel_tol: f64,
    /// Evaluation budget per cell; zero or negative for no limit.
    #[serde(default = "default_subpixel_maxeval")]
    pub subpixel_maxeval: i64,
    #[serde(default)]
    pub ensure_periodicity: bool,
    #[serde(default = "default_num_chunks")]
    pub num_chunks: usize,
    #[serde(default)]
    pub default_material: MaterialDescriptor,
    #[serde(default)]
    pub geometry: Vec<GeometricObject>,
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_subpixel_tol() -> f64 {
    config::DEFAULT_SUBPIXEL_TOL
}

fn default_subpixel_maxeval() -> i64 {
    config::DEFAULT_SUBPIXEL_MAXEVAL
}

fn default_num_chunks() -> usize {
    1
}

fn default_directory() -> PathBuf {
    PathBuf::from("epsgeom_run")
}

impl Settings {
    /// Parses and validates settings from a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text).context("could not parse settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Cell size with "no size" components set to zero and inactive axes dropped.
    pub fn cell_size(&self) -> Vector3<f64> {
        let size = self.size.map(|s| if s <= config::NO_SIZE { 0.0 } else { s });
        self.dimensions.project(&size)
    }

    /// The lattice cell. In cylindrical coordinates the radius runs from the
    /// axis to `size.x`.
    pub fn cell_bounds(&self) -> GeomBox {
        let size = self.cell_size();
        let center = self.dimensions.project_point(&self.center);
        let mut bounds = GeomBox::around(&center, &(size * 0.5));
        if self.dimensions.is_cylindrical() {
            bounds.low.x = 0.0;
            bounds.high.x = size.x;
        }
        bounds
    }

    /// Lattice of the cell; periodic along every sized axis when
    /// `ensure_periodicity` is set. The radius is never periodic.
    pub fn lattice(&self) -> Lattice {
        let size = self.cell_size();
        let cylindrical = self.dimensions.is_cylindrical();
        let periodic = [0, 1, 2]
            .map(|axis| self.ensure_periodicity && size[axis] > 0.0 && !(cylindrical && axis == 0));
        Lattice::new(self.cell_bounds().center(), size, periodic)
    }

    /// The lattice cell padded by one pixel on every active side, except at
    /// the cylinder axis.
    pub fn computational_box(&self) -> GeomBox {
        let pad = self.dimensions.project(&Vector3::repeat(1.0 / self.resolution));
        let cell = self.cell_bounds();
        let mut bounds = GeomBox::new(cell.low - pad, cell.high + pad);
        if self.dimensions.is_cylindrical() {
            bounds.low.x = 0.0;
        }
        bounds
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.resolution > 0.0) {
            return Err(anyhow!("resolution must be positive, got {}", self.resolution));
        }
        if !(self.subpixel_tol > 0.0) {
            return Err(anyhow!(
                "subpixel tolerance must be positive, got {}",
                self.subpixel_tol
            ));
        }
        if self.num_chunks == 0 {
            return Err(anyhow!("number of chunks must be at least 1"));
        }
        if self.size.iter().any(|s| *s < 0.0) {
            return Err(anyhow!("cell size must be non-negative, got {:?}", self.size));
        }
        for (id, object) in self.geometry.iter().enumerate() {
            object
                .shape
                .validate()
                .with_context(|| format!("invalid shape for object {}", id))?;
        }
        Ok(())
    }
}

fn read_config(config_file: &Path, with_env: bool) -> Result<Settings> {
    let mut builder = Config::builder().add_source(File::from(config_file).required(true));
    if with_env {
        builder = builder.add_source(Environment::with_prefix("epsgeom"));
    }
    let settings = builder
        .build()
        .with_context(|| format!("could not load configuration from {:?}", config_file))?;
    settings
        .try_deserialize()
        .with_context(|| format!("could not deserialize configuration from {:?}", config_file))
}

pub fn load_default_config() -> Result<Settings> {
    let root = retrieve_project_root()?;
    let config = read_config(&root.join("config/default.toml"), false)?;
    config.validate()?;
    Ok(config)
}

/// Loads the configuration file, then environment overrides, then the
/// command line overrides in `args`.
pub fn load_config_with_args(args: &CliArgs) -> Result<Settings> {
    let config_file = match &args.config {
        Some(path) => path.clone(),
        None => {
            let root = retrieve_project_root()?;
            let default_config_file = root.join("config/default.toml");
            let local_config = root.join("config/local.toml");
            // prefer a local configuration when one exists
            if local_config.exists() {
                local_config
            } else {
                default_config_file
            }
        }
    };
    info!("using configuration: {:?}", config_file);

    let mut config = read_config(&config_file, true)?;

    if let Some(resolution) = args.resolution {
        config.resolution = resolution;
    }
    if let Some(tol) = args.tol {
        config.subpixel_tol = tol;
    }
    if let Some(maxeval) = args.maxeval {
        config.subpixel_maxeval = maxeval;
    }
    if args.no_averaging {
        config.enable_averaging = false;
    }
    if args.periodic {
        config.ensure_periodicity = true;
    }
    if let Some(chunks) = args.chunks {
        config.num_chunks = chunks;
    }
    if let Some(dir) = &args.dir {
        config.directory = dir.clone();
    }

    config.validate()?;
    info!("{}", config);

    Ok(config)
}

/// Retrieve the project root directory.
/// This function tries to find the project root directory in different ways:
/// 1. If the CARGO_MANIFEST_DIR environment variable is set, use it.
/// 2. If the EPSGEOM_ROOT_DIR environment variable is set, use it.
/// 3. If the "config" subdirectory is found in the executable directory or any of its parents, use it.
fn retrieve_project_root() -> Result<PathBuf> {
    if let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") {
        return Ok(PathBuf::from(manifest_dir));
    }
    if let Ok(path) = env::var("EPSGEOM_ROOT_DIR") {
        return Ok(PathBuf::from(path));
    }

    let exe_path = env::current_exe().context("failed to get current executable path")?;
    exe_path
        .ancestors()
        .skip(1)
        .find(|dir| dir.join("config").is_dir())
        .map(Path::to_path_buf)
        .ok_or_else(|| anyhow!("could not find project root directory"))
}

#[derive(Parser, Debug, Default)]
#[command(version, about = "epsgeom - subpixel-averaged permittivity from geometric objects")]
pub struct CliArgs {
    /// Path to a configuration file. Defaults to config/local.toml if present,
    /// otherwise config/default.toml.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Grid resolution in pixels per unit length.
    #[arg(short, long)]
    pub resolution: Option<f64>,

    /// Relative tolerance of the subpixel averaging.
    #[arg(long)]
    pub tol: Option<f64>,

    /// Maximum number of integrand evaluations per cell. Zero or negative for no limit.
    #[arg(long, allow_negative_numbers = true)]
    pub maxeval: Option<i64>,

    /// Sample eps at cell centers instead of averaging over cells.
    #[arg(long)]
    pub no_averaging: bool,

    /// Replicate objects across the periodic cell boundaries.
    #[arg(long)]
    pub periodic: bool,

    /// Number of slabs the grid is split into. Each slab restricts its own index.
    #[arg(short = 'n', long)]
    pub chunks: Option<usize>,

    /// Output directory.
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings:
  - Dimensions: {:?}
  - Size: {} x {} x {}
  - Resolution: {}
  - Subpixel Averaging: {} (tol {}, maxeval {})
  - Periodic: {}
  - Chunks: {}
  - Objects: {}
  - Default Material: {}
  ",
            self.dimensions,
            self.size.x,
            self.size.y,
            self.size.z,
            self.resolution,
            self.enable_averaging,
            self.subpixel_tol,
            self.subpixel_maxeval,
            self.ensure_periodicity,
            self.num_chunks,
            self.geometry.len(),
            self.default_material.describe(),
        )
    }
}
