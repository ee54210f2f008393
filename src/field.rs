use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use nalgebra::Point3;

use crate::config;
use crate::cubature::{AdaptiveCubature, Cubature};
use crate::dispersion::{DispersionCatalog, DispersionTuple, PolarizabilityRegistry};
use crate::geom::{Dimensionality, GeomBox, GeometricObject, Lattice};
use crate::material::{MaterialDescriptor, MaterialError};
use crate::settings::Settings;
use crate::tree::GeometryIndex;


/// The material of a geometry, queried by position or averaged over cells.
///
/// Clones share the object list and the full index; only the restricted
/// index is private to a clone, so every partition of a domain can restrict
/// and release its own copy.
#[derive(Clone)]
pub struct MaterialField {
    objects: Arc<[GeometricObject]>,
    default_material: MaterialDescriptor,
    dims: Dimensionality,
    tree: Arc<GeometryIndex>,
    restricted: Option<Arc<GeometryIndex>>,
    cubature: Arc<dyn Cubature>,
    has_chi2: bool,
    has_chi3: bool,
}

impl MaterialField {
    /// Builds the field over `objects`. Objects later in the list take
    /// precedence where they overlap earlier ones.
    pub fn new(
        objects: Vec<GeometricObject>,
        default_material: MaterialDescriptor,
        dims: Dimensionality,
        bounds: GeomBox,
        lattice: Lattice,
    ) -> Result<Self> {
        for (id, object) in objects.iter().enumerate() {
            object
                .shape
                .validate()
                .with_context(|| format!("invalid shape for object {}", id))?;
            let b = object.shape.bounding_box();
            if !dims
                .active_axes()
                .iter()
                .all(|&axis| b.low[axis] <= bounds.high[axis] && b.high[axis] >= bounds.low[axis])
            {
                warn!("object {} lies entirely outside the computational cell", id);
            }
            info!(
                "object {}: {} centered at ({}, {}, {}) with {}",
                id,
                object.shape.kind(),
                object.shape.center().x,
                object.shape.center().y,
                object.shape.center().z,
                object.material.describe()
            );
        }

        let scans = |flag: fn(&MaterialDescriptor) -> f64| {
            objects
                .iter()
                .map(|object| &object.material)
                .chain(std::iter::once(&default_material))
                .any(|material| material.as_dielectric().is_some() && flag(material) != 0.0)
        };
        let has_chi2 = scans(MaterialDescriptor::chi2);
        let has_chi3 = scans(MaterialDescriptor::chi3);

        let objects: Arc<[GeometricObject]> = objects.into();
        let tree = GeometryIndex::build(objects.clone(), lattice, bounds);

        Ok(Self {
            objects,
            default_material,
            dims,
            tree: Arc::new(tree),
            restricted: None,
            cubature: Arc::new(AdaptiveCubature),
            has_chi2,
            has_chi3,
        })
    }

    /// Builds the field described by `settings` over its computational box.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            settings.geometry.clone(),
            settings.default_material.clone(),
            settings.dimensions,
            settings.computational_box(),
            settings.lattice(),
        )
    }

    /// Replaces the integrator used for overlaps and fallback averaging.
    pub fn with_cubature(mut self, cubature: Arc<dyn Cubature>) -> Self {
        self.cubature = cubature;
        self
    }

    pub fn dims(&self) -> Dimensionality {
        self.dims
    }

    pub fn default_material(&self) -> &MaterialDescriptor {
        &self.default_material
    }

    pub fn objects(&self) -> &[GeometricObject] {
        &self.objects
    }

    pub(crate) fn cubature(&self) -> &dyn Cubature {
        self.cubature.as_ref()
    }

    /// The index over the whole computational cell.
    pub fn full_index(&self) -> &GeometryIndex {
        &self.tree
    }

    /// The index point queries go through: the restricted one when present.
    pub fn index(&self) -> &GeometryIndex {
        self.restricted.as_deref().unwrap_or(self.tree.as_ref())
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted.is_some()
    }

    /// Narrows point queries to `region`. The full index is kept.
    pub fn restrict_to(&mut self, region: &GeomBox) {
        self.restricted = Some(Arc::new(self.tree.restrict(region)));
    }

    /// Drops the restricted index, returning to whole-cell queries.
    pub fn release(&mut self) {
        self.restricted = None;
    }

    /// Resolves the material at `p` through the active index.
    pub fn material_at(&self, p: &Point3<f64>) -> Result<Cow<'_, MaterialDescriptor>, MaterialError> {
        let index = self.index();
        let p = if index.bounds().contains(p) {
            *p
        } else {
            index.lattice().wrap(p)
        };
        debug_assert!(
            index.bounds().contains_with_slack(&p, config::BOUNDS_SLACK),
            "query point ({}, {}, {}) lies outside the index bounds {:?}",
            p.x,
            p.y,
            p.z,
            index.bounds()
        );

        match index.query_point(&p) {
            Some(hit) => self.objects[hit.id]
                .material
                .resolve(&p, &self.default_material),
            None => self.default_material.resolve(&p, &self.default_material),
        }
    }

    pub fn eps(&self, p: &Point3<f64>) -> Result<f64> {
        Ok(self.material_at(p)?.eps_pair()?.0)
    }

    pub fn has_chi2(&self) -> bool {
        self.has_chi2
    }

    pub fn has_chi3(&self) -> bool {
        self.has_chi3
    }

    pub fn chi2(&self, p: &Point3<f64>) -> Result<f64> {
        Ok(self.material_at(p)?.chi2())
    }

    pub fn chi3(&self, p: &Point3<f64>) -> Result<f64> {
        Ok(self.material_at(p)?.chi3())
    }

    /// Local scale of the dispersion term `tuple` at `p`, zero where the
    /// material does not carry that exact term.
    pub fn sigma(&self, p: &Point3<f64>, tuple: &DispersionTuple) -> Result<f64> {
        Ok(self.material_at(p)?.sigma(tuple))
    }

    /// The distinct dispersion terms of the objects and the default material.
    pub fn dispersion_catalog(&self) -> DispersionCatalog {
        DispersionCatalog::collect(&self.objects, &self.default_material)
    }

    /// Registers every distinct dispersion term on `registry` exactly once.
    pub fn register_dispersion_terms(&self, registry: &mut dyn PolarizabilityRegistry) -> Result<usize> {
        self.dispersion_catalog().register(self, registry)
    }
}
