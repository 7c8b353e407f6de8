//! Gauss quadrature on reference domains.
//!
//! Rules for composite reference domains follow the recursive construction of the
//! [`Topology`]. A prism takes the tensor product of the base rule with a Gauss rule along the
//! new axis. A cone collapses the tensor product onto the apex: the base rule is scaled by
//! `1 - t` and weighted by `(1 - t)^d`, with `d` the base dimension.
use crate::topology::Topology;
use crate::Real;
use itertools::izip;
use log::trace;
use nalgebra::{convert, DVector, Scalar};
use std::f64::consts::PI;

/// Weights and points of a rule in one dimension.
pub type Rule1d = (Vec<f64>, Vec<f64>);

// Newton's method for the Legendre roots converges in a handful of iterations from the
// initial guess, this only guards against an endless loop
const MAX_NEWTON_ITERATIONS: usize = 100;

/// Recurrence relation for Legendre polynomials.
///
/// Note: we use a formula for which derivatives are *not* defined at |x| == 1, so it is only
/// suitable for evaluation in the open interval (-1, 1).
#[derive(Debug, Default)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // The current value, i.e. p_n(x)
    p1: f64,
    // The previous value in the recurrence, i.e. p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        // m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        let mut p3;
        for m in 1..=n {
            let m = m as f64;
            p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }

        Self { n, x, p1, p2 }
    }

    fn value(&self) -> f64 {
        self.p1
    }

    fn derivative(&self) -> f64 {
        let Self { n, x, p1, p2 } = &self;
        let n = *n as f64;
        // dp_n/dx (x) = n * (x * p_n(x) - p_{n - 1}(x)) / (x^2 - 1)
        n * (x * p1 - p2) / (x * x - 1.0)
    }
}

/// Gauss quadrature for the interval [-1, 1].
///
/// Returns the [Gauss quadrature rule] with the given number of points. Given `n` points,
/// the rule integrates polynomials of order up to `2 n - 1` exactly.
///
/// # Panics
///
/// Panics if zero points are requested.
///
/// [Gauss quadrature rule]: https://en.wikipedia.org/wiki/Gaussian_quadrature
pub fn gauss(num_points: usize) -> Rule1d {
    let n = num_points;
    assert!(n > 0, "number of points must be positive");

    // Loosely based on the procedure used in
    // Numerical Recipes, The art of Scientific Computing, Third Edition (2007)
    let m = (n + 1) / 2;
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);

    // Only find the first m roots. The remaining roots follow by symmetry
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut recurrence = LegendreRecurrence::evaluate(n, x);
        for _ in 0..MAX_NEWTON_ITERATIONS {
            let dx = -recurrence.value() / recurrence.derivative();
            x += dx;
            recurrence = LegendreRecurrence::evaluate(n, x);
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        let dp = recurrence.derivative();
        points.push(x);
        weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }

    for i in m..n {
        let mirror_idx = n - i - 1;
        points.push(-points[mirror_idx]);
        weights.push(weights[mirror_idx]);
    }

    (weights, points)
}

/// Gauss quadrature for the unit interval [0, 1].
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn gauss_unit_interval(num_points: usize) -> Rule1d {
    let (weights, points) = gauss(num_points);
    (
        weights.into_iter().map(|w| 0.5 * w).collect(),
        points.into_iter().map(|x| 0.5 * (x + 1.0)).collect(),
    )
}

/// A quadrature rule on the reference domain of a topology.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule<T: Scalar> {
    weights: Vec<T>,
    points: Vec<DVector<T>>,
}

impl<T: Real> QuadratureRule<T> {
    /// Builds a rule with `num_points` Gauss points along each prism axis.
    ///
    /// Cone axes use `ceil(d / 2)` additional points to absorb the `(1 - t)^d` weight, so that
    /// the rule integrates polynomials of order `2 num_points - 1` in each collapsed direction
    /// exactly, and the weights sum to the reference volume.
    ///
    /// # Panics
    ///
    /// Panics if zero points are requested.
    pub fn for_topology(topology: &Topology, num_points: usize) -> Self {
        assert!(num_points > 0, "number of points must be positive");
        let rule = build(topology, num_points);
        trace!("Built quadrature rule with {} points for {}", rule.len(), topology);
        rule
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn points(&self) -> &[DVector<T>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Approximates the integral of the given function over the reference domain.
    pub fn integrate(&self, mut f: impl FnMut(&[T]) -> T) -> T {
        izip!(&self.weights, &self.points).fold(T::zero(), |integral, (&w, x)| integral + w * f(x.as_slice()))
    }
}

fn build<T: Real>(topology: &Topology, num_points: usize) -> QuadratureRule<T> {
    match topology {
        Topology::Point => QuadratureRule {
            weights: vec![T::one()],
            points: vec![DVector::zeros(0)],
        },
        Topology::Prism(base) => {
            let base = build::<T>(base, num_points);
            let (weights_1d, points_1d) = gauss_unit_interval(num_points);
            let mut rule = QuadratureRule {
                weights: Vec::with_capacity(base.len() * num_points),
                points: Vec::with_capacity(base.len() * num_points),
            };
            for (&w_base, x_base) in izip!(&base.weights, &base.points) {
                for (&w, &t) in izip!(&weights_1d, &points_1d) {
                    rule.weights.push(w_base * convert(w));
                    rule.points.push(x_base.push(convert(t)));
                }
            }
            rule
        }
        Topology::Cone(base_topology) => {
            let base_dim = base_topology.dimension();
            let base = build::<T>(base_topology, num_points);
            let (weights_1d, points_1d) = gauss_unit_interval(num_points + (base_dim + 1) / 2);
            let mut rule = QuadratureRule {
                weights: Vec::with_capacity(base.len() * weights_1d.len()),
                points: Vec::with_capacity(base.len() * weights_1d.len()),
            };
            for (&w, &t) in izip!(&weights_1d, &points_1d) {
                let h = 1.0 - t;
                let w_scaled: T = convert(w * h.powi(base_dim as i32));
                for (&w_base, x_base) in izip!(&base.weights, &base.points) {
                    rule.weights.push(w_base * w_scaled);
                    rule.points.push((x_base * convert::<f64, T>(h)).push(convert(t)));
                }
            }
            rule
        }
    }
}
