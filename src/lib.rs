//! Geometry to material resolution for grid-based electromagnetic solvers.
//!
//! A [`field::MaterialField`] is built once from an ordered list of
//! geometric objects and a default material. It answers point queries for
//! the permittivity, the nonlinear susceptibilities and the local scale of
//! dispersion terms, and averages the permittivity over grid cells with
//! subpixel accuracy.

pub mod averaging;
pub mod config;
pub mod cubature;
pub mod dispersion;
pub mod field;
pub mod front;
pub mod geom;
pub mod material;
pub mod output;
pub mod sampler;
pub mod settings;
pub mod tree;
