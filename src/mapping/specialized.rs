//! Closed-form evaluation for segments, triangles, quadrilaterals, tetrahedra and hexahedra.
//!
//! Simplices map affinely, `x -> p_0 + sum_i x_i (p_{i + 1} - p_0)`, and cubes map
//! multilinearly, with corner `c` weighted by the product over `k` of `x_k` if bit `k` of `c` is
//! set and `1 - x_k` otherwise. Both agree with the recursive engine.
use crate::allocators::WorldAllocator;
use crate::topology::Topology;
use crate::Real;
use itertools::izip;
use nalgebra::{DefaultAllocator, DimName, Dyn, OMatrix, OPoint, OVector, U1};
use numeric_literals::replace_float_literals;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FastPath {
    Segment,
    Triangle,
    Quadrilateral,
    Tetrahedron,
    Hexahedron,
}

impl FastPath {
    pub fn detect(topology: &Topology) -> Option<Self> {
        match (topology.dimension(), topology.id().map(|id| id >> 1)) {
            (1, _) => Some(Self::Segment),
            (2, Some(0)) => Some(Self::Triangle),
            (2, Some(1)) => Some(Self::Quadrilateral),
            (3, Some(0)) => Some(Self::Tetrahedron),
            (3, Some(3)) => Some(Self::Hexahedron),
            _ => None,
        }
    }

    pub fn position<T, D>(&self, corners: &[OPoint<T, D>], x: &[T]) -> OVector<T, D>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: WorldAllocator<T, D>,
    {
        match self {
            Self::Segment | Self::Triangle | Self::Tetrahedron => simplex_position(corners, x),
            Self::Quadrilateral | Self::Hexahedron => multilinear_position(corners, x),
        }
    }

    pub fn jacobian<T, D>(&self, corners: &[OPoint<T, D>], x: &[T]) -> OMatrix<T, D, Dyn>
    where
        T: Real,
        D: DimName,
        DefaultAllocator: WorldAllocator<T, D>,
    {
        match self {
            Self::Segment | Self::Triangle | Self::Tetrahedron => simplex_jacobian(corners, x.len()),
            Self::Quadrilateral | Self::Hexahedron => multilinear_jacobian(corners, x),
        }
    }
}

fn simplex_position<T, D>(corners: &[OPoint<T, D>], x: &[T]) -> OVector<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    let origin = &corners[0].coords;
    let mut position = origin.clone();
    for (&x_i, corner) in izip!(x, &corners[1..]) {
        position.axpy(x_i, &(&corner.coords - origin), T::one());
    }
    position
}

fn simplex_jacobian<T, D>(corners: &[OPoint<T, D>], dim: usize) -> OMatrix<T, D, Dyn>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    let origin = &corners[0].coords;
    let mut jacobian = OMatrix::zeros_generic(D::name(), Dyn(dim));
    for (i, corner) in corners[1..=dim].iter().enumerate() {
        jacobian.set_column(i, &(&corner.coords - origin));
    }
    jacobian
}

// Weight of the 1D hat function selected by `bit` at x, or its derivative
#[replace_float_literals(T::from_f64(literal).unwrap())]
fn hat<T: Real>(bit: bool, x: T, derivative: bool) -> T {
    match (bit, derivative) {
        (true, false) => x,
        (false, false) => 1.0 - x,
        (true, true) => 1.0,
        (false, true) => -1.0,
    }
}

fn corner_weight<T: Real>(corner: usize, x: &[T], derivative_direction: Option<usize>) -> T {
    x.iter().enumerate().fold(T::one(), |weight, (k, &x_k)| {
        let bit = (corner >> k) & 1 == 1;
        weight * hat(bit, x_k, derivative_direction == Some(k))
    })
}

fn multilinear_position<T, D>(corners: &[OPoint<T, D>], x: &[T]) -> OVector<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    let mut position = OVector::<T, D>::zeros_generic(D::name(), U1);
    for (c, corner) in corners.iter().enumerate() {
        position.axpy(corner_weight(c, x, None), &corner.coords, T::one());
    }
    position
}

fn multilinear_jacobian<T, D>(corners: &[OPoint<T, D>], x: &[T]) -> OMatrix<T, D, Dyn>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    let mut jacobian = OMatrix::zeros_generic(D::name(), Dyn(x.len()));
    for a in 0..x.len() {
        let mut column = jacobian.column_mut(a);
        for (c, corner) in corners.iter().enumerate() {
            column.axpy(corner_weight(c, x, Some(a)), &corner.coords, T::one());
        }
    }
    jacobian
}
