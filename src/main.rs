use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;

use epsgeom::field::MaterialField;
use epsgeom::output;
use epsgeom::sampler;
use epsgeom::settings::{self, CliArgs};

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let log_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let settings = settings::load_config_with_args(&args)?;
    let field = MaterialField::from_settings(&settings)?;
    info!(
        "{} dispersion term(s), chi2: {}, chi3: {}",
        field.dispersion_catalog().len(),
        field.has_chi2(),
        field.has_chi3()
    );

    let grid = sampler::sample_grid(&field, &settings)?;
    output::writeup(&settings.directory, &grid, &field)?;
    info!("results written to {:?}", settings.directory);

    Ok(())
}
