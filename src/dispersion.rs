//! Deduplication of Lorentzian polarization terms across a geometry.
//!
//! Every distinct `(omega, gamma, delta_epsilon, saturation)` tuple found in
//! the dielectric materials of the objects and the default material is
//! registered exactly once on the consuming solver.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::field::MaterialField;
use crate::geom::GeometricObject;
use crate::material::MaterialDescriptor;

#[cfg(test)]
mod tests {

    use super::*;
    use crate::geom::Shape;
    use crate::material::{Dielectric, Polarizability};
    use nalgebra::Point3;

    fn lossy(terms: &[(f64, f64, f64)]) -> MaterialDescriptor {
        let mut d = Dielectric::new(2.0);
        d.polarizations = terms
            .iter()
            .map(|&(omega, gamma, deps)| Polarizability::new(omega, gamma, deps))
            .collect();
        MaterialDescriptor::Dielectric(d)
    }

    fn sphere(material: MaterialDescriptor) -> GeometricObject {
        GeometricObject::new(Shape::sphere(Point3::origin(), 1.0), material)
    }

    #[test]
    fn shared_tuples_are_collected_once() {
        let objects = vec![
            sphere(lossy(&[(1.0, 0.1, 2.0)])),
            sphere(lossy(&[(1.0, 0.1, 2.0)])),
            sphere(lossy(&[(1.0, 0.1, 2.0)])),
            sphere(lossy(&[(2.0, 0.2, 1.0)])),
        ];
        let catalog = DispersionCatalog::collect(&objects, &MaterialDescriptor::default());
        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains(&DispersionTuple::new(1.0, 0.1, 2.0, 0.0)));
        assert!(catalog.contains(&DispersionTuple::new(2.0, 0.2, 1.0, 0.0)));
    }

    #[test]
    fn default_material_terms_are_included() {
        let objects = vec![sphere(MaterialDescriptor::PerfectConductor)];
        let default = lossy(&[(3.0, 0.0, 1.0), (3.0, 0.0, 1.0)]);
        let catalog = DispersionCatalog::collect(&objects, &default);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn sigma_does_not_split_tuples() {
        let mut a = Polarizability::new(1.0, 0.1, 2.0);
        let mut b = a;
        a.sigma = 0.5;
        b.sigma = 2.0;
        let mut d = Dielectric::new(1.0);
        d.polarizations = vec![a, b];
        let objects = vec![sphere(MaterialDescriptor::Dielectric(d))];
        let catalog = DispersionCatalog::collect(&objects, &MaterialDescriptor::default());
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn signed_zero_is_one_value() {
        let a = DispersionTuple::new(1.0, 0.0, 1.0, 0.0);
        let b = DispersionTuple::new(1.0, -0.0, 1.0, -0.0);
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);
    }
}

/// The value identity of one dispersion term.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DispersionTuple {
    pub omega: f64,
    pub gamma: f64,
    pub delta_epsilon: f64,
    pub saturation: f64,
}

impl DispersionTuple {
    pub fn new(omega: f64, gamma: f64, delta_epsilon: f64, saturation: f64) -> Self {
        Self {
            omega,
            gamma,
            delta_epsilon,
            saturation,
        }
    }

    fn key(&self) -> [f64; 4] {
        // adding zero folds -0.0 into 0.0
        [
            self.omega + 0.0,
            self.gamma + 0.0,
            self.delta_epsilon + 0.0,
            self.saturation + 0.0,
        ]
    }
}

impl PartialEq for DispersionTuple {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DispersionTuple {}

impl PartialOrd for DispersionTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DispersionTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .iter()
            .zip(other.key().iter())
            .map(|(a, b)| a.total_cmp(b))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

/// Receiver of deduplicated dispersion terms, typically the field solver.
///
/// The field is lent for the duration of the call so the receiver can sample
/// the local scale of the term (see [`MaterialField::sigma`]).
pub trait PolarizabilityRegistry {
    fn add_polarizability(&mut self, field: &MaterialField, term: &DispersionTuple) -> Result<()>;
}

/// The set of distinct dispersion terms of a geometry.
#[derive(Debug, Clone, Default)]
pub struct DispersionCatalog {
    tuples: BTreeSet<DispersionTuple>,
}

impl DispersionCatalog {
    /// Collects the terms of every dielectric among `objects` and `default`.
    pub fn collect(objects: &[GeometricObject], default: &MaterialDescriptor) -> Self {
        let mut catalog = Self::default();
        for object in objects {
            catalog.insert_material(&object.material);
        }
        catalog.insert_material(default);
        catalog
    }

    fn insert_material(&mut self, material: &MaterialDescriptor) {
        if let Some(d) = material.as_dielectric() {
            self.tuples
                .extend(d.polarizations.iter().map(|pol| pol.tuple()));
        }
    }

    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    pub fn contains(&self, tuple: &DispersionTuple) -> bool {
        self.tuples.contains(tuple)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DispersionTuple> {
        self.tuples.iter()
    }

    /// Hands every term to `registry` once. Returns the number registered.
    pub fn register(
        self,
        field: &MaterialField,
        registry: &mut dyn PolarizabilityRegistry,
    ) -> Result<usize> {
        for term in &self.tuples {
            info!(
                "polarizability: omega={}, gamma={}, deps={}, esat={}",
                term.omega, term.gamma, term.delta_epsilon, term.saturation
            );
            registry.add_polarizability(field, term)?;
        }
        Ok(self.tuples.len())
    }
}
