//! Helper traits for allocator trait bounds.
//!
//! Reference dimensions in `refmap` are only known at runtime, while the world dimension is a
//! compile-time `nalgebra` dimension. Most matrices are therefore of the mixed shapes
//! `D x Dyn` (Jacobians) and `Dyn x D` (transposed Jacobians).
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, Dyn, Scalar, U1};

/// An allocator for a single static dimension.
pub trait DimAllocator<T: Scalar, D: DimName>:
    Allocator<T, D>
    + Allocator<T, D, D>
    + Allocator<T, U1, D>
    // Decompositions of square world matrices
    + Allocator<usize, D>
    + Allocator<(usize, usize), D>
{
}

impl<T, D> DimAllocator<T, D> for DefaultAllocator
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: Allocator<T, D>
        + Allocator<T, D, D>
        + Allocator<T, U1, D>
        + Allocator<usize, D>
        + Allocator<(usize, usize), D>,
{
}

/// An allocator for a static world dimension combined with a runtime reference dimension.
pub trait WorldAllocator<T: Scalar, D: DimName>: DimAllocator<T, D> + Allocator<T, D, Dyn> + Allocator<T, Dyn, D> {}

impl<T, D> WorldAllocator<T, D> for DefaultAllocator
where
    T: Scalar,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D> + Allocator<T, D, Dyn> + Allocator<T, Dyn, D>,
{
}

/// An allocator for two static dimensions.
///
/// Used when a mapping into a parent element's reference space (dimension `D1`) is composed
/// with the parent mapping into world space (dimension `D2`).
pub trait BiWorldAllocator<T: Scalar, D1: DimName, D2: DimName>: WorldAllocator<T, D1> + WorldAllocator<T, D2> {}

impl<T, D1, D2> BiWorldAllocator<T, D1, D2> for DefaultAllocator
where
    T: Scalar,
    D1: DimName,
    D2: DimName,
    DefaultAllocator: WorldAllocator<T, D1> + WorldAllocator<T, D2>,
{
}
