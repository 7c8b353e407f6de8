use nalgebra::RealField;

pub use nalgebra;

/// Scalar type for coordinates, Jacobians and determinants.
///
/// Every `refmap` routine is generic over this trait. It is satisfied by `f32` and `f64`.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

pub mod allocators;
