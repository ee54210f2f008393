use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use epsgeom::averaging::AveragingMethod;
use epsgeom::dispersion::{DispersionTuple, PolarizabilityRegistry};
use epsgeom::field::MaterialField;
use epsgeom::geom::{Dimensionality, GeomBox, GeometricObject, Lattice, Shape};
use epsgeom::material::{Dielectric, MaterialDescriptor, MaterialError, Polarizability};
use epsgeom::settings;
use epsgeom::tree::GeometryIndex;
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn bounds() -> GeomBox {
    GeomBox::new(Point3::new(-3.0, -3.0, -3.0), Point3::new(3.0, 3.0, 3.0))
}

fn field_3d(objects: Vec<GeometricObject>, default: MaterialDescriptor) -> MaterialField {
    MaterialField::new(objects, default, Dimensionality::Three, bounds(), Lattice::aperiodic()).unwrap()
}

fn lossy(terms: &[(f64, f64, f64)]) -> MaterialDescriptor {
    let mut d = Dielectric::new(2.0);
    d.polarizations = terms
        .iter()
        .map(|&(omega, gamma, deps)| Polarizability::new(omega, gamma, deps))
        .collect();
    MaterialDescriptor::Dielectric(d)
}

#[test]
fn homogeneous_cell_ignores_tolerance_and_budget() {
    let field = field_3d(
        vec![GeometricObject::new(
            Shape::sphere(Point3::origin(), 2.0),
            MaterialDescriptor::dielectric(6.0),
        )],
        MaterialDescriptor::default(),
    );
    let cell = GeomBox::around(&Point3::new(0.3, -0.2, 0.1), &Vector3::repeat(0.05));
    for (tol, budget) in [(1e-2, 1), (1e-8, 0), (0.5, -3)] {
        let mean = field.mean_eps(&cell, tol, budget).unwrap();
        assert_eq!(mean.eps, 6.0);
        assert_eq!(mean.inv_eps, 1.0 / 6.0);
        assert_eq!(mean.normal, Vector3::zeros());
    }
}

#[test]
fn straddling_cell_blends_between_materials() {
    let field = field_3d(
        vec![GeometricObject::new(
            Shape::sphere(Point3::origin(), 1.0),
            MaterialDescriptor::dielectric(8.0),
        )],
        MaterialDescriptor::dielectric(2.0),
    );
    let cell = GeomBox::around(&Point3::new(1.0, 0.0, 0.0), &Vector3::repeat(0.1));
    let mean = field.mean_eps(&cell, 1e-6, 0).unwrap();
    assert_eq!(mean.method, AveragingMethod::Interface);
    assert!(mean.eps > 2.0 && mean.eps < 8.0, "{:?}", mean);

    // recover the fill fraction from eps and check inv_eps uses the same one
    let fill = (mean.eps - 2.0) / 6.0;
    let expected_inv = fill / 8.0 + (1.0 - fill) / 2.0;
    assert!((mean.inv_eps - expected_inv).abs() < 1e-9);
    assert!((fill - 0.5).abs() < 0.1, "fill {}", fill);
    assert!((mean.normal - Vector3::x()).norm() < 1e-9);
}

#[test]
fn planar_interface_is_exact() {
    let field = field_3d(
        vec![GeometricObject::new(
            Shape::block(Point3::new(0.0, 0.0, -2.0), Vector3::new(6.0, 6.0, 4.0)),
            MaterialDescriptor::dielectric(5.0),
        )],
        MaterialDescriptor::dielectric(1.0),
    );
    // the z = 0 face cuts the cell at a quarter of its height
    let cell = GeomBox::new(Point3::new(0.0, 0.0, -0.025), Point3::new(0.1, 0.1, 0.075));
    let mean = field.mean_eps(&cell, 1e-6, 1000).unwrap();
    assert!((mean.eps - (5.0 * 0.25 + 0.75)).abs() < 1e-9, "{:?}", mean);
    assert!((mean.normal - Vector3::z()).norm() < 1e-9);
}

#[test]
fn shrinking_object_never_raises_eps() {
    let cell = GeomBox::around(&Point3::new(0.9, 0.0, 0.0), &Vector3::repeat(0.15));
    let mut previous = f64::INFINITY;
    for radius in [1.05, 1.0, 0.95, 0.9, 0.85, 0.8] {
        let field = field_3d(
            vec![GeometricObject::new(
                Shape::sphere(Point3::origin(), radius),
                MaterialDescriptor::dielectric(10.0),
            )],
            MaterialDescriptor::dielectric(1.0),
        );
        let mean = field.mean_eps(&cell, 1e-7, 0).unwrap();
        assert!(mean.eps <= previous + 1e-6, "{} > {}", mean.eps, previous);
        previous = mean.eps;
    }
}

#[test]
fn identity_order_decides_front() {
    let a = MaterialDescriptor::dielectric(3.0);
    let b = MaterialDescriptor::dielectric(7.0);
    let cube = |center: Point3<f64>, m: MaterialDescriptor| {
        GeometricObject::new(Shape::block(center, Vector3::new(3.0, 3.0, 3.0)), m)
    };
    // the cubes overlap on 0 <= x <= 1
    let lower = Point3::new(-0.5, 0.0, 0.0);
    let upper = Point3::new(1.5, 0.0, 0.0);
    let pixel = Point3::new(0.5, 0.0, 0.0);

    let forward = field_3d(vec![cube(lower, a.clone()), cube(upper, b.clone())], MaterialDescriptor::default());
    let backward = field_3d(vec![cube(upper, b), cube(lower, a)], MaterialDescriptor::default());
    assert_eq!(forward.eps(&pixel).unwrap(), 7.0);
    assert_eq!(backward.eps(&pixel).unwrap(), 3.0);

    // equal materials never override identity order
    let same = MaterialDescriptor::dielectric(4.0);
    let twins = field_3d(
        vec![cube(lower, same.clone()), cube(upper, same)],
        MaterialDescriptor::default(),
    );
    let cell = GeomBox::around(&Point3::new(0.0, 0.0, 0.0), &Vector3::repeat(0.1));
    let mean = twins.mean_eps(&cell, 1e-6, 0).unwrap();
    assert_eq!(mean.eps, 4.0);
}

#[derive(Default)]
struct RecordingRegistry {
    terms: Vec<DispersionTuple>,
    sigma_at_origin: Vec<f64>,
}

impl PolarizabilityRegistry for RecordingRegistry {
    fn add_polarizability(&mut self, field: &MaterialField, term: &DispersionTuple) -> anyhow::Result<()> {
        self.terms.push(*term);
        self.sigma_at_origin.push(field.sigma(&Point3::origin(), term)?);
        Ok(())
    }
}

#[test]
fn dispersion_terms_register_once() {
    let sphere = |x: f64, m: MaterialDescriptor| GeometricObject::new(Shape::sphere(Point3::new(x, 0.0, 0.0), 0.4), m);
    let field = field_3d(
        vec![
            sphere(-2.0, lossy(&[(1.0, 0.1, 2.0)])),
            sphere(-1.0, lossy(&[(1.0, 0.1, 2.0)])),
            sphere(0.0, lossy(&[(1.0, 0.1, 2.0)])),
            sphere(1.0, lossy(&[(2.0, 0.2, 1.0)])),
        ],
        MaterialDescriptor::default(),
    );
    let mut registry = RecordingRegistry::default();
    let count = field.register_dispersion_terms(&mut registry).unwrap();
    assert_eq!(count, 2);
    assert_eq!(registry.terms.len(), 2);
    assert!(registry.terms.contains(&DispersionTuple::new(1.0, 0.1, 2.0, 0.0)));
    assert!(registry.terms.contains(&DispersionTuple::new(2.0, 0.2, 1.0, 0.0)));

    let index = registry
        .terms
        .iter()
        .position(|t| *t == DispersionTuple::new(1.0, 0.1, 2.0, 0.0))
        .unwrap();
    assert_eq!(registry.sigma_at_origin[index], 1.0);
    assert_eq!(registry.sigma_at_origin[1 - index], 0.0);
}

#[test]
fn chi3_flag_requires_nonzero_value() {
    let mut kerr = Dielectric::new(2.0);
    kerr.chi3 = 0.0;
    let objects = vec![GeometricObject::new(
        Shape::sphere(Point3::origin(), 1.0),
        MaterialDescriptor::Dielectric(kerr.clone()),
    )];
    assert!(!field_3d(objects.clone(), MaterialDescriptor::default()).has_chi3());

    // a nonzero chi3 behind a material function is not detected
    let hidden = MaterialDescriptor::function(|_: &Point3<f64>| {
        let mut d = Dielectric::new(2.0);
        d.chi3 = 1.0;
        MaterialDescriptor::Dielectric(d)
    });
    let mut with_function = objects.clone();
    with_function.push(GeometricObject::new(Shape::sphere(Point3::new(2.0, 0.0, 0.0), 0.5), hidden));
    assert!(!field_3d(with_function, MaterialDescriptor::default()).has_chi3());

    kerr.chi3 = 0.3;
    let mut with_kerr = objects;
    with_kerr.push(GeometricObject::new(
        Shape::sphere(Point3::new(-2.0, 0.0, 0.0), 0.5),
        MaterialDescriptor::Dielectric(kerr),
    ));
    let field = field_3d(with_kerr, MaterialDescriptor::default());
    assert!(field.has_chi3());
    assert!(!field.has_chi2());
}

fn random_objects(rng: &mut StdRng, count: usize) -> Vec<GeometricObject> {
    (0..count)
        .map(|i| {
            let center = Point3::new(
                rng.random_range(-2.0..2.0),
                rng.random_range(-2.0..2.0),
                rng.random_range(-2.0..2.0),
            );
            let shape = if i % 2 == 0 {
                Shape::sphere(center, rng.random_range(0.2..0.9))
            } else {
                Shape::block(
                    center,
                    Vector3::new(
                        rng.random_range(0.2..1.5),
                        rng.random_range(0.2..1.5),
                        rng.random_range(0.2..1.5),
                    ),
                )
            };
            GeometricObject::new(shape, MaterialDescriptor::dielectric(1.0 + i as f64))
        })
        .collect()
}

#[test]
fn restrict_and_release_round_trip() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut field = field_3d(random_objects(&mut rng, 30), MaterialDescriptor::default());
    let points: Vec<Point3<f64>> = (0..200)
        .map(|_| {
            Point3::new(
                rng.random_range(-2.5..2.5),
                rng.random_range(-2.5..2.5),
                rng.random_range(-2.5..2.5),
            )
        })
        .collect();
    let before: Vec<f64> = points.iter().map(|p| field.eps(p).unwrap()).collect();

    let region = GeomBox::new(Point3::new(0.0, -3.0, -3.0), Point3::new(3.0, 3.0, 3.0));
    field.restrict_to(&region);
    assert!(field.is_restricted());
    for (p, eps) in points.iter().zip(&before) {
        if region.contains(p) {
            assert_eq!(field.eps(p).unwrap(), *eps);
        }
    }
    field.release();

    assert!(!field.is_restricted());
    let after: Vec<f64> = points.iter().map(|p| field.eps(p).unwrap()).collect();
    assert_eq!(before, after);
}

#[test]
fn index_matches_linear_scan() {
    let mut rng = StdRng::seed_from_u64(42);
    let objects: Arc<[GeometricObject]> = random_objects(&mut rng, 60).into();
    let lattice = Lattice::new(Point3::origin(), Vector3::new(6.0, 6.0, 0.0), [true, true, false]);
    let index = GeometryIndex::build(objects.clone(), lattice.clone(), bounds());

    let shifts = lattice.shifts();
    for _ in 0..2000 {
        let p = Point3::new(
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
        );
        let expected = objects
            .iter()
            .enumerate()
            .filter(|(_, object)| shifts.iter().any(|shift| object.shape.contains(&(p - shift))))
            .map(|(id, _)| id)
            .last();
        assert_eq!(index.query_point(&p).map(|hit| hit.id), expected, "at {:?}", p);
    }
}

#[test]
fn degenerate_cells_reduce_dimension() {
    let ramp = MaterialDescriptor::function(|p: &Point3<f64>| MaterialDescriptor::dielectric(2.0 + p.x * p.x));
    let field = field_3d(
        vec![GeometricObject::new(Shape::block(Point3::origin(), Vector3::new(4.0, 4.0, 4.0)), ramp)],
        MaterialDescriptor::default(),
    );
    let line = GeomBox::new(Point3::new(0.0, 0.5, 0.5), Point3::new(1.0, 0.5, 0.5));
    let mean = field.mean_eps(&line, 1e-8, 0).unwrap();
    assert!((mean.eps - (2.0 + 1.0 / 3.0)).abs() < 1e-8);
    assert!(mean.eps.is_finite() && mean.eps >= 0.0);

    let sheet = GeomBox::new(Point3::new(0.0, 0.0, 0.5), Point3::new(1.0, 1.0, 0.5));
    let mean = field.mean_eps(&sheet, 1e-8, 0).unwrap();
    assert!((mean.eps - (2.0 + 1.0 / 3.0)).abs() < 1e-8);
    assert!(mean.inv_eps.is_finite() && mean.inv_eps > 0.0);
}

#[test]
fn cyclic_material_function_is_an_error() {
    fn endless() -> MaterialDescriptor {
        MaterialDescriptor::function(|_: &Point3<f64>| endless())
    }
    let field = field_3d(
        vec![GeometricObject::new(Shape::sphere(Point3::origin(), 1.0), endless())],
        MaterialDescriptor::default(),
    );
    let err = field.eps(&Point3::origin()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MaterialError>(),
        Some(MaterialError::NonConvergent { .. })
    ));
    let cell = GeomBox::around(&Point3::origin(), &Vector3::repeat(0.1));
    assert!(field.mean_eps(&cell, 1e-4, 100).is_err());
    // outside the object the default applies
    assert_eq!(field.eps(&Point3::new(2.0, 0.0, 0.0)).unwrap(), 1.0);
}

#[test]
fn material_function_calls_are_counted() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let counted = MaterialDescriptor::function(move |_: &Point3<f64>| {
        counter.fetch_add(1, Ordering::SeqCst);
        MaterialDescriptor::dielectric(3.0)
    });
    let field = field_3d(
        vec![GeometricObject::new(Shape::sphere(Point3::origin(), 1.0), counted)],
        MaterialDescriptor::default(),
    );
    assert_eq!(field.eps(&Point3::origin()).unwrap(), 3.0);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn default_config_builds_a_field() {
    let settings = settings::load_default_config().unwrap();
    let field = MaterialField::from_settings(&settings).unwrap();
    assert_eq!(field.objects().len(), settings.geometry.len());
    assert!(field.has_chi3());
    assert_eq!(field.dispersion_catalog().len(), 1);

    // points beyond the padded cell fold back onto the conducting bar
    let bar = field.eps(&Point3::new(1.5, 0.3, 0.0)).unwrap();
    let folded = field.eps(&Point3::new(1.5 + settings.size.x, 0.3, 0.0)).unwrap();
    assert_eq!(bar, f64::NEG_INFINITY);
    assert_eq!(folded, bar);
}
