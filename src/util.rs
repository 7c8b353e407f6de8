//! Determinants and pseudo-inverses of Jacobians with a static number of rows and a runtime
//! number of columns.
use crate::allocators::WorldAllocator;
use crate::Real;
use nalgebra::{DMatrix, DVector, DefaultAllocator, DimName, Dyn, OMatrix};

// The dense helpers below work on column-major slices and carry no `DefaultAllocator` bound, so
// nalgebra's blanket allocator impls for dynamic shapes apply to them.

fn dense_determinant<T: Real>(n: usize, data: &[T]) -> T {
    DMatrix::from_column_slice(n, n, data).determinant()
}

fn dense_gram_determinant<T: Real>(nrows: usize, ncols: usize, data: &[T]) -> T {
    let jacobian = DMatrix::from_column_slice(nrows, ncols, data);
    jacobian.tr_mul(&jacobian).determinant()
}

fn dense_pseudo_inverse_transposed<T: Real>(nrows: usize, ncols: usize, data: &[T]) -> Option<DMatrix<T>> {
    let jacobian = DMatrix::from_column_slice(nrows, ncols, data);
    if nrows == ncols {
        jacobian.try_inverse().map(|inverse| inverse.transpose())
    } else {
        let gram_inverse = jacobian.tr_mul(&jacobian).try_inverse()?;
        Some(jacobian * gram_inverse)
    }
}

/// Computes `J^T v` for a column-major `nrows x ncols` matrix `J`.
pub(crate) fn transpose_mul<T: Real>(nrows: usize, ncols: usize, jacobian: &[T], v: &[T]) -> Vec<T> {
    let jacobian = DMatrix::from_column_slice(nrows, ncols, jacobian);
    let v = DVector::from_column_slice(v);
    jacobian.tr_mul(&v).as_slice().to_vec()
}

/// Solves the normal equations `J^T J y = rhs` for a column-major `nrows x ncols` matrix `J`.
///
/// Returns `None` if `J` does not have full column rank.
pub(crate) fn solve_normal_equations<T: Real>(
    nrows: usize,
    ncols: usize,
    jacobian: &[T],
    rhs: &[T],
) -> Option<Vec<T>> {
    let jacobian = DMatrix::from_column_slice(nrows, ncols, jacobian);
    let rhs = DVector::from_column_slice(rhs);
    let solution = jacobian.tr_mul(&jacobian).lu().solve(&rhs)?;
    Some(solution.as_slice().to_vec())
}

/// Signed determinant of a square Jacobian, or `None` if the Jacobian is not square.
pub fn determinant<T, D>(jacobian: &OMatrix<T, D, Dyn>) -> Option<T>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    let n = jacobian.ncols();
    (n == D::dim()).then(|| dense_determinant(n, jacobian.as_slice()))
}

/// The Gram determinant `det(J^T J)`.
pub fn gram_determinant<T, D>(jacobian: &OMatrix<T, D, Dyn>) -> T
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    dense_gram_determinant(D::dim(), jacobian.ncols(), jacobian.as_slice())
}

/// The factor relating reference and world volume elements.
///
/// This is `|det J|` for square Jacobians and `sqrt(det(J^T J))` otherwise. For a
/// zero-dimensional reference element it is `1`.
pub fn integration_element<T, D>(jacobian: &OMatrix<T, D, Dyn>) -> T
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    let n = jacobian.ncols();
    if n == 0 {
        T::one()
    } else if n == D::dim() {
        dense_determinant(n, jacobian.as_slice()).abs()
    } else {
        // Rounding may push the determinant of a degenerate Gram matrix slightly below zero
        gram_determinant(jacobian).max(T::zero()).sqrt()
    }
}

/// Computes `J (J^T J)^{-1}`, which is the inverse transpose `J^{-T}` for square Jacobians.
///
/// Returns `None` if the Jacobian does not have full column rank.
pub fn pseudo_inverse_transposed<T, D>(jacobian: &OMatrix<T, D, Dyn>) -> Option<OMatrix<T, D, Dyn>>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    let n = jacobian.ncols();
    if n == 0 {
        return Some(OMatrix::zeros_generic(D::name(), Dyn(0)));
    }
    let result = dense_pseudo_inverse_transposed(D::dim(), n, jacobian.as_slice())?;
    Some(OMatrix::from_column_slice_generic(D::name(), Dyn(n), result.as_slice()))
}
