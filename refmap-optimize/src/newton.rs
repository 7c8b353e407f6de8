use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use itertools::iterate;
use log::debug;
use nalgebra::{DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use refmap_traits::Real;
use std::error::Error;

/// Stopping criteria for [`newton`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NewtonSettings<T> {
    /// Maximum number of Newton steps. `None` means no limit.
    pub max_iterations: Option<usize>,
    /// The iteration has converged once `|F(x)|_2 <= tolerance`.
    pub tolerance: T,
}

#[derive(Debug, thiserror::Error)]
pub enum NewtonError {
    /// The procedure failed because the maximum number of iterations was reached.
    #[error("failed to converge within the maximum number of iterations ({0})")]
    MaximumIterationsReached(usize),
    /// The procedure failed because solving the Jacobian system failed.
    #[error("failed to solve Jacobian system: {0}")]
    JacobianError(#[source] Box<dyn Error>),
    /// The line search failed to produce a valid step.
    #[error("line search failed to produce a valid step: {0}")]
    LineSearchError(#[source] Box<dyn Error>),
}

/// Attempts to solve the non-linear equation `F(x) = 0` with full Newton steps.
///
/// No heap allocation is performed: `x` holds the initial guess on entry and the solution on
/// success, while `f` and `dx` are workspace with the same length as `x`.
///
/// Returns the number of iterations performed.
pub fn newton<'a, T, F>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<usize, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    newton_line_search(function, x, f, dx, settings, &mut NoLineSearch)
}

/// Same as [`newton`], but every step is post-processed by the given line search.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn newton_line_search<'a, T, F>(
    mut function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: &mut impl LineSearch<T, F>,
) -> Result<usize, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    let mut x = x.into();
    let mut f = f.into();
    let mut step = dx.into();

    assert_eq!(x.nrows(), f.nrows(), "x and f must have the same length");
    assert_eq!(step.nrows(), f.nrows(), "dx and f must have the same length");

    function.eval_into(&mut f, &DVectorView::from(&x));

    let mut iter = 0;
    while f.norm() > settings.tolerance {
        if settings.max_iterations == Some(iter) {
            return Err(NewtonError::MaximumIterationsReached(iter));
        }

        // J (-dx) = F
        function
            .solve_jacobian_system(&mut step, &DVectorView::from(&x), &DVectorView::from(&f))
            .map_err(NewtonError::JacobianError)?;
        step *= -1.0;

        let alpha = line_search
            .step(
                &mut function,
                DVectorViewMut::from(&mut f),
                DVectorViewMut::from(&mut x),
                DVectorView::from(&step),
            )
            .map_err(NewtonError::LineSearchError)?;
        iter += 1;
        debug!("Newton iteration {}: step length {}, residual {}", iter, alpha, f.norm());
    }

    Ok(iter)
}

/// Decides how far to move along a Newton direction.
///
/// Implementations must leave `x` at the accepted iterate and `f` evaluated at that iterate.
pub trait LineSearch<T: Scalar, F: VectorFunction<T>> {
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>>;
}

/// Always takes the full step.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoLineSearch;

impl<T, F> LineSearch<T, F> for NoLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        x.axpy(T::one(), &direction, T::one());
        function.eval_into(&mut f, &DVectorView::from(&x));
        Ok(T::one())
    }
}

/// Backtracking line search on the merit function `g(x) = |F(x)|^2 / 2` with the Armijo
/// sufficient decrease condition.
///
/// See Nocedal & Wright (2006), Numerical Optimization, Chapter 3.1.
#[derive(Copy, Clone, Debug)]
pub struct BacktrackingLineSearch {
    /// Sufficient decrease parameter in `(0, 1)`.
    pub sufficient_decrease: f64,
    /// The search fails once the step length drops below this value.
    pub min_step_length: f64,
}

impl Default for BacktrackingLineSearch {
    fn default() -> Self {
        Self {
            sufficient_decrease: 1e-4,
            min_step_length: 1e-6,
        }
    }
}

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        // With p the Newton direction, grad g^T p = -2 g(x), so the Armijo condition
        //  g(x + alpha p) <= g(x) + c alpha grad g^T p
        // is approximated by
        //  g(x + alpha p) <= (1 - c alpha) g(x)
        let c = T::from_f64(self.sufficient_decrease).unwrap();
        let alpha_min = T::from_f64(self.min_step_length).unwrap();
        let g_initial = 0.5 * f.norm_squared();

        // Try the full step and a few mild reductions before shrinking geometrically
        let mut alphas = [1.0, 0.75, 0.5]
            .into_iter()
            .chain(iterate(0.25, |alpha: &T| 0.25 * *alpha));

        // x_k = x_0 + alpha_k p, so moving from alpha_{k-1} to alpha_k only needs the difference
        let mut alpha_prev = 0.0;
        loop {
            let alpha = alphas
                .next()
                .ok_or_else(|| Box::<dyn Error>::from("exhausted step lengths"))?;
            x.axpy(alpha - alpha_prev, &direction, T::one());
            function.eval_into(&mut f, &DVectorView::from(&x));

            let g = 0.5 * f.norm_squared();
            if g <= (1.0 - c * alpha) * g_initial {
                return Ok(alpha);
            } else if alpha < alpha_min {
                return Err(Box::from(format!(
                    "step length {} fell below minimum allowed step length {}",
                    alpha, alpha_min
                )));
            }
            alpha_prev = alpha;
        }
    }
}
