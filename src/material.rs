//! Material descriptors and their resolution at a point.
//!
//! A material is one of a closed set of kinds: a fixed dielectric with
//! optional nonlinear susceptibilities and Lorentzian polarization terms, a
//! perfect electric conductor, a placeholder that inherits the default
//! material, or a dynamic material computed by an external
//! [`MaterialFunction`] from the query position.
//!
//! Dynamic materials may return further dynamic materials. Resolution follows
//! such chains iteratively and gives up after
//! [`MAX_MATERIAL_INDIRECTIONS`](crate::config::MAX_MATERIAL_INDIRECTIONS) steps.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use nalgebra::Point3;
use serde::Deserialize;
use thiserror::Error;

use crate::config;
use crate::dispersion::DispersionTuple;


/// Failures while resolving a material at a point.
#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("material function did not resolve to a concrete material after {limit} indirections at ({x}, {y}, {z})")]
    NonConvergent { limit: usize, x: f64, y: f64, z: f64 },

    #[error("material is unresolved ({0}) where a concrete material is required")]
    Unresolved(&'static str),

    #[error("material function failed at ({x}, {y}, {z})")]
    Evaluation {
        x: f64,
        y: f64,
        z: f64,
        #[source]
        source: anyhow::Error,
    },
}

/// One Lorentzian polarization term of a dielectric.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Polarizability {
    pub omega: f64,
    pub gamma: f64,
    pub delta_epsilon: f64,
    #[serde(default)]
    pub saturation: f64,
    /// Local scale of the term inside this material.
    #[serde(default = "default_sigma")]
    pub sigma: f64,
}

fn default_sigma() -> f64 {
    1.0
}

impl Polarizability {
    pub fn new(omega: f64, gamma: f64, delta_epsilon: f64) -> Self {
        Self {
            omega,
            gamma,
            delta_epsilon,
            saturation: 0.0,
            sigma: default_sigma(),
        }
    }

    /// The value-identity of this term, excluding its local scale.
    pub fn tuple(&self) -> DispersionTuple {
        DispersionTuple::new(self.omega, self.gamma, self.delta_epsilon, self.saturation)
    }

    /// Whether this term has exactly the parameters of `tuple`.
    pub fn matches(&self, tuple: &DispersionTuple) -> bool {
        self.omega == tuple.omega
            && self.gamma == tuple.gamma
            && self.delta_epsilon == tuple.delta_epsilon
            && self.saturation == tuple.saturation
    }
}

/// A linear dielectric with optional nonlinear and dispersive terms.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Dielectric {
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default)]
    pub chi2: f64,
    #[serde(default)]
    pub chi3: f64,
    #[serde(default)]
    pub polarizations: Vec<Polarizability>,
}

fn default_epsilon() -> f64 {
    1.0
}

impl Dielectric {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            chi2: 0.0,
            chi3: 0.0,
            polarizations: Vec::new(),
        }
    }
}

/// External evaluator for position-dependent materials.
///
/// Implementations may return [`MaterialDescriptor::InheritDefault`] or
/// another dynamic material; the caller follows the chain. Any closure
/// `Fn(&Point3<f64>) -> MaterialDescriptor` is a material function.
pub trait MaterialFunction: Send + Sync {
    fn material_at(&self, p: &Point3<f64>) -> anyhow::Result<MaterialDescriptor>;
}

impl<F> MaterialFunction for F
where
    F: Fn(&Point3<f64>) -> MaterialDescriptor + Send + Sync,
{
    fn material_at(&self, p: &Point3<f64>) -> anyhow::Result<MaterialDescriptor> {
        Ok(self(p))
    }
}

/// Shared handle to a material function. Two handles are equal only when
/// they refer to the same function object.
#[derive(Clone)]
pub struct MaterialFunctionRef(pub Arc<dyn MaterialFunction>);

impl PartialEq for MaterialFunctionRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for MaterialFunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MaterialFunction({:p})", Arc::as_ptr(&self.0) as *const ())
    }
}

/// The material of a geometric object or of the background.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaterialDescriptor {
    Dielectric(Dielectric),
    PerfectConductor,
    InheritDefault,
    #[serde(skip)]
    Dynamic(MaterialFunctionRef),
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        MaterialDescriptor::Dielectric(Dielectric::new(1.0))
    }
}

impl MaterialDescriptor {
    /// A plain dielectric with no nonlinear or dispersive terms.
    pub fn dielectric(epsilon: f64) -> Self {
        MaterialDescriptor::Dielectric(Dielectric::new(epsilon))
    }

    /// A dynamic material backed by `f`.
    pub fn function<F: MaterialFunction + 'static>(f: F) -> Self {
        MaterialDescriptor::Dynamic(MaterialFunctionRef(Arc::new(f)))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, MaterialDescriptor::Dynamic(_))
    }

    pub fn as_dielectric(&self) -> Option<&Dielectric> {
        match self {
            MaterialDescriptor::Dielectric(d) => Some(d),
            _ => None,
        }
    }

    /// Substitutes `default` for [`MaterialDescriptor::InheritDefault`], without
    /// evaluating dynamic materials.
    pub fn or_default<'a>(&'a self, default: &'a MaterialDescriptor) -> &'a MaterialDescriptor {
        match self {
            MaterialDescriptor::InheritDefault => default,
            other => other,
        }
    }

    /// Resolves this material at `p` into a concrete (dielectric or conductor)
    /// descriptor, following inherited and dynamic materials.
    pub fn resolve<'a>(
        &'a self,
        p: &Point3<f64>,
        default: &'a MaterialDescriptor,
    ) -> Result<Cow<'a, MaterialDescriptor>, MaterialError> {
        let mut current = Cow::Borrowed(self.or_default(default));

        for _ in 0..config::MAX_MATERIAL_INDIRECTIONS {
            let next = match current.as_ref() {
                MaterialDescriptor::Dynamic(func) => {
                    func.0
                        .material_at(p)
                        .map_err(|source| MaterialError::Evaluation {
                            x: p.x,
                            y: p.y,
                            z: p.z,
                            source,
                        })?
                }
                _ => return Ok(current),
            };
            current = match next {
                MaterialDescriptor::InheritDefault => Cow::Borrowed(default),
                concrete => Cow::Owned(concrete),
            };
        }

        match current.as_ref() {
            MaterialDescriptor::Dynamic(_) => Err(MaterialError::NonConvergent {
                limit: config::MAX_MATERIAL_INDIRECTIONS,
                x: p.x,
                y: p.y,
                z: p.z,
            }),
            _ => Ok(current),
        }
    }

    /// Returns `(eps, 1/eps)` of a resolved material.
    pub fn eps_pair(&self) -> Result<(f64, f64), MaterialError> {
        match self {
            MaterialDescriptor::Dielectric(d) => Ok((d.epsilon, 1.0 / d.epsilon)),
            MaterialDescriptor::PerfectConductor => Ok((f64::NEG_INFINITY, -0.0)),
            MaterialDescriptor::InheritDefault => Err(MaterialError::Unresolved("inherit_default")),
            MaterialDescriptor::Dynamic(_) => Err(MaterialError::Unresolved("dynamic")),
        }
    }

    pub fn chi2(&self) -> f64 {
        self.as_dielectric().map_or(0.0, |d| d.chi2)
    }

    pub fn chi3(&self) -> f64 {
        self.as_dielectric().map_or(0.0, |d| d.chi3)
    }

    /// The local scale of the polarization term matching `tuple`, or zero.
    pub fn sigma(&self, tuple: &DispersionTuple) -> f64 {
        self.as_dielectric()
            .and_then(|d| d.polarizations.iter().find(|pol| pol.matches(tuple)))
            .map_or(0.0, |pol| pol.sigma)
    }

    /// A short label for log output.
    pub fn describe(&self) -> String {
        match self {
            MaterialDescriptor::Dielectric(d) => format!("dielectric constant epsilon = {}", d.epsilon),
            MaterialDescriptor::PerfectConductor => "perfect conductor".to_string(),
            MaterialDescriptor::InheritDefault => "default material".to_string(),
            MaterialDescriptor::Dynamic(_) => "material function".to_string(),
        }
    }
}
