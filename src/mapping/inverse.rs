use super::Mapping;
use crate::allocators::WorldAllocator;
use crate::error::MappingError;
use crate::optimize::calculus::VectorFunctionBuilder;
use crate::optimize::newton::{newton_line_search, BacktrackingLineSearch, NewtonError, NewtonSettings, NoLineSearch};
use crate::util::{solve_normal_equations, transpose_mul};
use crate::Real;
use log::{debug, warn};
use nalgebra::{convert, DVector, DVectorView, DVectorViewMut, DefaultAllocator, DimName, OPoint};
use serde::{Deserialize, Serialize};
use std::error::Error;

/// Default tolerance of [`InverseSettings`], relative to the element diameter.
pub const DEFAULT_INVERSE_TOLERANCE: f64 = 1e-12;

/// Settings for the Newton iteration that inverts non-affine mappings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InverseSettings {
    /// The inversion fails once this many Newton steps did not reach the tolerance.
    pub max_iterations: usize,
    /// Convergence tolerance relative to the element diameter.
    pub tolerance: f64,
    /// Whether to damp the Newton steps with a backtracking line search.
    pub line_search: bool,
}

impl Default for InverseSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            tolerance: DEFAULT_INVERSE_TOLERANCE,
            line_search: false,
        }
    }
}

pub(crate) fn inverse<T, D>(
    mapping: &Mapping<T, D>,
    world: &OPoint<T, D>,
    settings: &InverseSettings,
) -> Result<DVector<T>, MappingError>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    let n = mapping.dimension();
    let m = D::dim();

    // Points are affine, so zero-dimensional mappings always take this branch
    if mapping.affine() {
        // x = J^+ (w - p(0)), with J^+ = (J^T J)^{-1} J^T the transpose of the cached matrix
        let origin = vec![T::zero(); n];
        let jit = mapping.jacobian_inverse_transposed(&origin)?;
        let offset = world - mapping.position(&origin);
        return Ok(local_coordinate(transpose_mul(m, n, jit.as_slice(), offset.as_slice())));
    }

    // Square mappings solve p(x) - w = 0 directly. Otherwise we solve the optimality condition
    // J^T (p(x) - w) = 0 of the least-squares problem min |p(x) - w|, which projects w onto the
    // element. Both use the Gauss-Newton system J^T J dx = J^T (p(x) - w), and the residual
    // tolerance scales with the diameter to the power of the residual's length units.
    let square = n == m;
    let diameter = mapping.diameter();
    let scale = if square { diameter } else { diameter * diameter };
    let newton_settings = NewtonSettings {
        max_iterations: Some(settings.max_iterations),
        tolerance: convert::<f64, T>(settings.tolerance) * scale,
    };

    let residual = |x: &[T]| {
        let difference = mapping.position(x) - world;
        if square {
            difference.as_slice().to_vec()
        } else {
            transpose_mul(m, n, mapping.jacobian(x).as_slice(), difference.as_slice())
        }
    };
    let newton_step = |x: &[T], rhs: &[T]| {
        let jacobian = mapping.jacobian(x);
        if square {
            let rhs = transpose_mul(m, n, jacobian.as_slice(), rhs);
            solve_normal_equations(m, n, jacobian.as_slice(), &rhs)
        } else {
            solve_normal_equations(m, n, jacobian.as_slice(), rhs)
        }
    };
    let start = mapping.reference_element().barycenter().as_slice();
    solve(start, residual, newton_step, newton_settings, settings.line_search)
}

fn local_coordinate<T: Real>(x: Vec<T>) -> DVector<T> {
    DVector::from_vec(x)
}

// Newton iteration on local coordinates. `residual` evaluates the function whose root is sought
// and `newton_step` solves the linearized system for the given right-hand side.
fn solve<T, R, S>(
    start: &[T],
    mut residual: R,
    mut newton_step: S,
    newton_settings: NewtonSettings<T>,
    line_search: bool,
) -> Result<DVector<T>, MappingError>
where
    T: Real,
    R: FnMut(&[T]) -> Vec<T>,
    S: FnMut(&[T], &[T]) -> Option<Vec<T>>,
{
    let n = start.len();
    let function = VectorFunctionBuilder::with_dimension(n)
        .with_function(|f: &mut DVectorViewMut<T>, x: &DVectorView<T>| {
            f.copy_from_slice(&residual(x.as_slice()));
        })
        .with_jacobian_solver(
            |sol: &mut DVectorViewMut<T>, x: &DVectorView<T>, rhs: &DVectorView<T>| -> Result<(), Box<dyn Error>> {
                let solution = newton_step(x.as_slice(), rhs.as_slice())
                    .ok_or_else(|| Box::<dyn Error>::from("LU decomposition failed. Jacobian not invertible?"))?;
                sol.copy_from_slice(&solution);
                Ok(())
            },
        );

    let mut x = DVector::from_column_slice(start);
    let mut f = DVector::<T>::zeros(n);
    let mut dx = DVector::<T>::zeros(n);
    let result = if line_search {
        let mut line_search = BacktrackingLineSearch::default();
        newton_line_search(function, &mut x, &mut f, &mut dx, newton_settings, &mut line_search)
    } else {
        newton_line_search(function, &mut x, &mut f, &mut dx, newton_settings, &mut NoLineSearch)
    };

    match result {
        Ok(iterations) if x.iter().all(|x_i| x_i.is_finite()) => {
            debug!("Inverse mapping converged after {} Newton iterations", iterations);
            Ok(x)
        }
        Ok(iterations) => {
            warn!("Inverse mapping produced a non-finite local coordinate after {} iterations", iterations);
            Err(MappingError::InverseDidNotConverge { iterations })
        }
        Err(NewtonError::MaximumIterationsReached(iterations)) => {
            warn!("Inverse mapping did not converge within {} iterations", iterations);
            Err(MappingError::InverseDidNotConverge { iterations })
        }
        Err(NewtonError::JacobianError(err)) => {
            debug!("Inverse mapping failed: {}", err);
            Err(MappingError::SingularJacobian)
        }
        Err(NewtonError::LineSearchError(err)) => {
            warn!("Inverse mapping stalled: {}", err);
            Err(MappingError::InverseStalled)
        }
    }
}
