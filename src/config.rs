/// Maximum number of material-function indirections followed before a
/// dynamic material is declared non-convergent.
pub const MAX_MATERIAL_INDIRECTIONS: usize = 8;
/// Maximum number of object images stored in one leaf of the geometry index.
pub const TREE_LEAF_SIZE: usize = 4;
/// Maximum depth of the geometry index.
pub const TREE_MAX_DEPTH: usize = 32;
/// Evaluation cap applied when the caller asks for an unlimited cubature budget.
pub const UNLIMITED_EVAL_CAP: usize = 10_000_000;
/// Sizes at or below this value are treated as "no size" along that axis.
pub const NO_SIZE: f64 = 2.0 / 1e20;
/// Relative slack allowed when checking that a query point lies inside the index bounds.
pub const BOUNDS_SLACK: f64 = 1e-9;
/// Default relative tolerance for subpixel averaging.
pub const DEFAULT_SUBPIXEL_TOL: f64 = 1e-4;
/// Default evaluation budget for subpixel averaging.
pub const DEFAULT_SUBPIXEL_MAXEVAL: i64 = 100_000;
