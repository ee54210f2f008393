//! Adaptive multidimensional integration.
//!
//! The averaging code only depends on the [`Cubature`] trait; any adaptive
//! integrator can be plugged in. [`AdaptiveCubature`] is the built-in
//! h-adaptive scheme: each region is integrated with the degree-7 Genz-Malik
//! rule, the embedded degree-5 rule provides the error estimate, and the
//! region with the largest error is bisected along the axis with the largest
//! fourth difference until the requested relative tolerance or the
//! evaluation budget is reached.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use log::debug;

use crate::config;


/// Outcome of an adaptive integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationStatus {
    Converged,
    /// The evaluation budget ran out; the estimate is still usable.
    BudgetExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integral {
    pub estimate: f64,
    pub error: f64,
    pub evaluations: usize,
    pub status: IntegrationStatus,
}

/// An adaptive integrator over a box.
pub trait Cubature: Send + Sync {
    /// Integrates `f` over the box `[xmin, xmax]` to relative tolerance `tol`,
    /// using at most about `max_eval` evaluations (zero for no limit).
    fn integrate(
        &self,
        f: &mut dyn FnMut(&[f64]) -> f64,
        xmin: &[f64],
        xmax: &[f64],
        tol: f64,
        max_eval: usize,
    ) -> Integral;
}

/// h-adaptive Genz-Malik cubature.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveCubature;

const LAMBDA2: f64 = 0.377_964_473_009_227_2; // sqrt(9/70)
const LAMBDA4: f64 = 0.948_683_298_050_513_8; // sqrt(9/10)
const LAMBDA5: f64 = 0.688_247_201_611_685_3; // sqrt(9/19)

/// Number of integrand evaluations of one rule application in `n` dimensions.
fn rule_points(n: usize) -> usize {
    1 + 4 * n + 2 * n * (n - 1) + (1 << n)
}

struct Region {
    center: Vec<f64>,
    half: Vec<f64>,
    estimate: f64,
    error: f64,
    split_axis: usize,
}

impl PartialEq for Region {
    fn eq(&self, other: &Self) -> bool {
        self.error == other.error
    }
}

impl Eq for Region {}

impl PartialOrd for Region {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Region {
    fn cmp(&self, other: &Self) -> Ordering {
        self.error.total_cmp(&other.error)
    }
}

impl AdaptiveCubature {
    fn apply_rule(f: &mut dyn FnMut(&[f64]) -> f64, center: Vec<f64>, half: Vec<f64>) -> Region {
        let n = center.len();
        let nf = n as f64;
        let volume: f64 = half.iter().map(|h| 2.0 * h).product();

        let mut x = center.clone();
        let f0 = f(&x);

        let mut sum2 = 0.0;
        let mut sum3 = 0.0;
        let mut split_axis = 0;
        let mut max_diff = f64::NEG_INFINITY;
        for i in 0..n {
            x[i] = center[i] - LAMBDA2 * half[i];
            let a = f(&x);
            x[i] = center[i] + LAMBDA2 * half[i];
            let b = f(&x);
            x[i] = center[i] - LAMBDA4 * half[i];
            let c = f(&x);
            x[i] = center[i] + LAMBDA4 * half[i];
            let d = f(&x);
            x[i] = center[i];
            sum2 += a + b;
            sum3 += c + d;
            // fourth difference decides the split direction
            let diff = (a + b - 2.0 * f0 - (c + d - 2.0 * f0) / 7.0).abs();
            if diff > max_diff {
                max_diff = diff;
                split_axis = i;
            }
        }

        let mut sum4 = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                for (si, sj) in [(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
                    x[i] = center[i] + si * LAMBDA4 * half[i];
                    x[j] = center[j] + sj * LAMBDA4 * half[j];
                    sum4 += f(&x);
                }
                x[i] = center[i];
                x[j] = center[j];
            }
        }

        let mut sum5 = 0.0;
        for corner in 0..(1usize << n) {
            for i in 0..n {
                let sign = if corner & (1 << i) == 0 { -1.0 } else { 1.0 };
                x[i] = center[i] + sign * LAMBDA5 * half[i];
            }
            sum5 += f(&x);
        }

        let w1 = (12824.0 - 9120.0 * nf + 400.0 * nf * nf) / 19683.0;
        let w2 = 980.0 / 6561.0;
        let w3 = (1820.0 - 400.0 * nf) / 19683.0;
        let w4 = 200.0 / 19683.0;
        let w5 = 6859.0 / 19683.0 / (1u64 << n) as f64;
        let e1 = (729.0 - 950.0 * nf + 50.0 * nf * nf) / 729.0;
        let e2 = 245.0 / 486.0;
        let e3 = (265.0 - 100.0 * nf) / 1458.0;
        let e4 = 25.0 / 729.0;

        let estimate = volume * (w1 * f0 + w2 * sum2 + w3 * sum3 + w4 * sum4 + w5 * sum5);
        let lower = volume * (e1 * f0 + e2 * sum2 + e3 * sum3 + e4 * sum4);

        Region {
            center,
            half,
            estimate,
            error: (estimate - lower).abs(),
            split_axis,
        }
    }
}

impl Cubature for AdaptiveCubature {
    fn integrate(
        &self,
        f: &mut dyn FnMut(&[f64]) -> f64,
        xmin: &[f64],
        xmax: &[f64],
        tol: f64,
        max_eval: usize,
    ) -> Integral {
        debug_assert_eq!(xmin.len(), xmax.len(), "integration bounds differ in dimension");

        // release builds integrate over the common leading axes
        let center: Vec<f64> = xmin.iter().zip(xmax).map(|(a, b)| 0.5 * (a + b)).collect();
        let half: Vec<f64> = xmin.iter().zip(xmax).map(|(a, b)| 0.5 * (b - a)).collect();
        let n = center.len();
        if n == 0 || half.iter().any(|h| *h == 0.0) {
            return Integral {
                estimate: 0.0,
                error: 0.0,
                evaluations: 0,
                status: IntegrationStatus::Converged,
            };
        }

        let budget = if max_eval == 0 {
            config::UNLIMITED_EVAL_CAP
        } else {
            max_eval
        };
        let per_rule = rule_points(n);

        let first = Self::apply_rule(f, center, half);
        let mut estimate = first.estimate;
        let mut error = first.error;
        let mut evaluations = per_rule;
        let mut heap = BinaryHeap::new();
        heap.push(first);

        let status = loop {
            if error <= tol * estimate.abs() || !estimate.is_finite() {
                break IntegrationStatus::Converged;
            }
            if evaluations + 2 * per_rule > budget {
                break IntegrationStatus::BudgetExhausted;
            }
            let Some(worst) = heap.pop() else {
                break IntegrationStatus::Converged;
            };

            let axis = worst.split_axis;
            let mut half = worst.half.clone();
            half[axis] *= 0.5;
            let mut left = worst.center.clone();
            left[axis] -= half[axis];
            let mut right = worst.center.clone();
            right[axis] += half[axis];

            let a = Self::apply_rule(f, left, half.clone());
            let b = Self::apply_rule(f, right, half);
            evaluations += 2 * per_rule;

            estimate += a.estimate + b.estimate - worst.estimate;
            error += a.error + b.error - worst.error;
            heap.push(a);
            heap.push(b);
        };

        // recompute sums to shed accumulated round-off
        let (estimate, error) = heap
            .iter()
            .fold((0.0, 0.0), |(v, e), r| (v + r.estimate, e + r.error));

        if status == IntegrationStatus::BudgetExhausted {
            debug!(
                "cubature budget of {} evaluations exhausted (estimate {}, error {})",
                budget, estimate, error
            );
        }

        Integral {
            estimate,
            error,
            evaluations,
            status,
        }
    }
}
