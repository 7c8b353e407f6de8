//! The recursive multilinear mapping engine.
//!
//! A [`GenericMapping`] mirrors the structure of its [`Topology`]: a point maps to its single
//! corner, a prism interpolates linearly between the mapping of its bottom base and the mapping
//! of its top base, and a cone contracts the mapping of its base towards the apex.
use crate::allocators::WorldAllocator;
use crate::error::MappingError;
use crate::topology::Topology;
use crate::Real;
use nalgebra::storage::StorageMut;
use nalgebra::{convert, DefaultAllocator, DimName, Dyn, OMatrix, OPoint, OVector, Vector, U1};
use serde::{Deserialize, Serialize};

/// Squared norms below this value are treated as zero when computing [`MappingFlags`].
pub const ZERO_TOLERANCE: f64 = 1e-12;

/// Structural properties of a mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingFlags {
    /// The mapping has the form `x -> A x + b`.
    pub affine: bool,
    /// The mapping does not depend on the local coordinate.
    pub constant: bool,
    /// The mapping is identically zero.
    pub zero: bool,
}

/// Mapping from the reference domain of a topology into `D`-dimensional world space.
///
/// Evaluation functions take the local coordinate as a slice whose length must equal
/// [`dimension`](Self::dimension). Passing a slice of different length is a programming error and
/// panics.
#[derive(Debug, Clone)]
pub struct GenericMapping<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    dimension: usize,
    node: Node<T, D>,
    flags: MappingFlags,
    declared_affine: bool,
}

#[derive(Debug, Clone)]
enum Node<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    Point {
        coords: OVector<T, D>,
    },
    Cone {
        base: Box<GenericMapping<T, D>>,
        apex: OVector<T, D>,
        /// `apex - base.origin()`
        apex_offset: OVector<T, D>,
    },
    Prism {
        bottom: Box<GenericMapping<T, D>>,
        /// The mapping of the top base minus the mapping of the bottom base.
        top: Box<GenericMapping<T, D>>,
    },
}

/// Checks that `num_corners` corners in `D`-dimensional world space fit the topology.
pub(crate) fn check_corners<D: DimName>(topology: &Topology, num_corners: usize) -> Result<(), MappingError> {
    let dimension = topology.dimension();
    if dimension > D::dim() {
        return Err(MappingError::TopologyExceedsWorld {
            dimension,
            world_dimension: D::dim(),
        });
    }
    let expected = topology.num_corners();
    if num_corners != expected {
        return Err(MappingError::WrongCornerCount {
            expected,
            actual: num_corners,
        });
    }
    Ok(())
}

impl<T, D> GenericMapping<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    pub fn new(topology: &Topology, corners: &[OPoint<T, D>]) -> Result<Self, MappingError> {
        Self::with_declared_affine(topology, corners, false)
    }

    /// Same as [`new`](Self::new), but lets the caller declare the mapping affine.
    ///
    /// A declared affine mapping uses the affine evaluation formulas regardless of the corner
    /// positions. This is only meaningful if the corners actually form an affine image of the
    /// reference element.
    pub fn with_declared_affine(
        topology: &Topology,
        corners: &[OPoint<T, D>],
        declared_affine: bool,
    ) -> Result<Self, MappingError> {
        check_corners::<D>(topology, corners.len())?;
        Ok(Self::build(topology, corners, declared_affine))
    }

    fn build(topology: &Topology, corners: &[OPoint<T, D>], declared_affine: bool) -> Self {
        let node = match topology {
            Topology::Point => Node::Point {
                coords: corners[0].coords.clone(),
            },
            Topology::Cone(base) => {
                let n = base.num_corners();
                let base = Self::build(base, &corners[..n], declared_affine);
                let apex = corners[n].coords.clone();
                let apex_offset = &apex - base.origin();
                Node::Cone {
                    base: Box::new(base),
                    apex,
                    apex_offset,
                }
            }
            Topology::Prism(base) => {
                let n = base.num_corners();
                // The mapping is linear in the corners, so the difference of the top and bottom
                // mappings is the mapping of the corner differences
                let differences: Vec<_> = corners[..n]
                    .iter()
                    .zip(&corners[n..])
                    .map(|(bottom, top)| OPoint::from(&top.coords - &bottom.coords))
                    .collect();
                Node::Prism {
                    bottom: Box::new(Self::build(base, &corners[..n], declared_affine)),
                    top: Box::new(Self::build(base, &differences, declared_affine)),
                }
            }
        };

        let mut mapping = Self {
            dimension: topology.dimension(),
            node,
            flags: MappingFlags::default(),
            declared_affine,
        };
        mapping.update_flags();
        mapping
    }

    /// Dimension of the reference domain.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn flags(&self) -> MappingFlags {
        self.flags
    }

    pub fn affine(&self) -> bool {
        self.flags.affine
    }

    pub fn constant(&self) -> bool {
        self.flags.constant
    }

    pub fn zero(&self) -> bool {
        self.flags.zero
    }

    pub fn declared_affine(&self) -> bool {
        self.declared_affine
    }

    /// The image of the local origin, which is the image of corner 0.
    pub fn origin(&self) -> &OVector<T, D> {
        match &self.node {
            Node::Point { coords } => coords,
            Node::Cone { base, .. } => base.origin(),
            Node::Prism { bottom, .. } => bottom.origin(),
        }
    }

    // Recomputes the flags of this node from the flags of its children
    fn update_flags(&mut self) {
        let tolerance: T = convert(ZERO_TOLERANCE);
        self.flags = match &self.node {
            Node::Point { coords } => MappingFlags {
                affine: true,
                constant: true,
                zero: coords.norm_squared() < tolerance,
            },
            Node::Cone { base, apex_offset, .. } => {
                let collapsed = apex_offset.norm_squared() < tolerance;
                MappingFlags {
                    affine: self.declared_affine || base.flags.affine,
                    constant: collapsed && base.flags.constant,
                    zero: collapsed && base.flags.zero,
                }
            }
            Node::Prism { bottom, top } => MappingFlags {
                affine: self.declared_affine || (top.flags.constant && bottom.flags.affine),
                constant: top.flags.zero && bottom.flags.constant,
                zero: top.flags.zero && bottom.flags.zero,
            },
        };
    }

    pub fn position(&self, x: &[T]) -> OVector<T, D> {
        assert_eq!(x.len(), self.dimension, "Local coordinate has wrong dimension.");
        let mut position = OVector::<T, D>::zeros_generic(D::name(), U1);
        self.add_position(x, T::one(), &mut position);
        position
    }

    /// The `D x dimension` Jacobian matrix of the mapping.
    pub fn jacobian(&self, x: &[T]) -> OMatrix<T, D, Dyn> {
        assert_eq!(x.len(), self.dimension, "Local coordinate has wrong dimension.");
        let mut jacobian = OMatrix::zeros_generic(D::name(), Dyn(self.dimension));
        self.add_jacobian(x, T::one(), &mut jacobian);
        jacobian
    }

    pub fn jacobian_transposed(&self, x: &[T]) -> OMatrix<T, Dyn, D> {
        self.jacobian(x).transpose()
    }

    // out += factor * position(x)
    fn add_position<S>(&self, x: &[T], factor: T, out: &mut Vector<T, D, S>)
    where
        S: StorageMut<T, D>,
    {
        let n = self.dimension;
        match &self.node {
            Node::Point { coords } => out.axpy(factor, coords, T::one()),
            Node::Prism { bottom, top } => {
                let (t, x_base) = (x[n - 1], &x[..n - 1]);
                bottom.add_position(x_base, factor, out);
                top.add_position(x_base, factor * t, out);
            }
            Node::Cone {
                base,
                apex,
                apex_offset,
            } => {
                let (t, x_base) = (x[n - 1], &x[..n - 1]);
                if self.flags.affine {
                    // B(x') + t (p - B(0))
                    base.add_position(x_base, factor, out);
                    out.axpy(factor * t, apex_offset, T::one());
                } else {
                    // (1 - t) B(x' / (1 - t)) + t p
                    let h = T::one() - t;
                    if h == T::zero() {
                        out.axpy(factor, apex, T::one());
                    } else {
                        let x_scaled: Vec<T> = x_base.iter().map(|&x_i| x_i / h).collect();
                        base.add_position(&x_scaled, factor * h, out);
                        out.axpy(factor * t, apex, T::one());
                    }
                }
            }
        }
    }

    // Adds factor * J(x) to the first `dimension` columns of `out`
    fn add_jacobian(&self, x: &[T], factor: T, out: &mut OMatrix<T, D, Dyn>) {
        let n = self.dimension;
        match &self.node {
            Node::Point { .. } => {}
            Node::Prism { bottom, top } => {
                let (t, x_base) = (x[n - 1], &x[..n - 1]);
                bottom.add_jacobian(x_base, factor, out);
                top.add_jacobian(x_base, factor * t, out);
                top.add_position(x_base, factor, &mut out.column_mut(n - 1));
            }
            Node::Cone {
                base,
                apex,
                apex_offset,
            } => {
                let (t, x_base) = (x[n - 1], &x[..n - 1]);
                let h = T::one() - t;
                if self.flags.affine {
                    base.add_jacobian(x_base, factor, out);
                    out.column_mut(n - 1).axpy(factor, apex_offset, T::one());
                } else if h == T::zero() {
                    // Limit along the edge from the base origin to the apex
                    let origin = vec![T::zero(); n - 1];
                    base.add_jacobian(&origin, factor, out);
                    out.column_mut(n - 1).axpy(factor, apex_offset, T::one());
                } else {
                    // With X = x' / h, the derivative of h B(X) + t p is grad B(X) with respect to x'
                    // and p - B(X) + grad B(X) X with respect to t
                    let x_scaled: Vec<T> = x_base.iter().map(|&x_i| x_i / h).collect();
                    let mut base_jacobian = OMatrix::zeros_generic(D::name(), Dyn(n - 1));
                    base.add_jacobian(&x_scaled, T::one(), &mut base_jacobian);

                    let mut last_column = apex - base.position(&x_scaled);
                    for (k, &x_k) in x_scaled.iter().enumerate() {
                        last_column.axpy(x_k, &base_jacobian.column(k), T::one());
                    }

                    let mut base_columns = out.columns_mut(0, n - 1);
                    base_columns += base_jacobian * factor;
                    out.column_mut(n - 1).axpy(factor, &last_column, T::one());
                }
            }
        }
    }

    /// Whether the two mappings were built from the same topology.
    pub fn same_structure(&self, other: &Self) -> bool {
        match (&self.node, &other.node) {
            (Node::Point { .. }, Node::Point { .. }) => true,
            (Node::Cone { base, .. }, Node::Cone { base: other_base, .. }) => base.same_structure(other_base),
            (Node::Prism { bottom, .. }, Node::Prism { bottom: other_bottom, .. }) => {
                bottom.same_structure(other_bottom)
            }
            _ => false,
        }
    }

    /// Replaces the mapping `f` by `f - g`, where `g` is the other mapping.
    ///
    /// Flags are recomputed from the updated corner data.
    pub fn subtract(&mut self, other: &Self) -> Result<(), MappingError> {
        self.checked_axpy(other, -T::one())
    }

    /// Replaces the mapping `f` by `f + g`, where `g` is the other mapping.
    pub fn add(&mut self, other: &Self) -> Result<(), MappingError> {
        self.checked_axpy(other, T::one())
    }

    fn checked_axpy(&mut self, other: &Self, factor: T) -> Result<(), MappingError> {
        if !self.same_structure(other) {
            return Err(MappingError::TopologyMismatch);
        }
        self.axpy(other, factor)
    }

    // self += factor * other, for mappings of identical structure
    fn axpy(&mut self, other: &Self, factor: T) -> Result<(), MappingError> {
        match (&mut self.node, &other.node) {
            (Node::Point { coords }, Node::Point { coords: other_coords }) => {
                coords.axpy(factor, other_coords, T::one());
            }
            (
                Node::Cone {
                    base,
                    apex,
                    apex_offset,
                },
                Node::Cone {
                    base: other_base,
                    apex: other_apex,
                    ..
                },
            ) => {
                base.axpy(other_base, factor)?;
                apex.axpy(factor, other_apex, T::one());
                *apex_offset = &*apex - base.origin();
            }
            (Node::Prism { bottom, top }, Node::Prism { bottom: other_bottom, top: other_top }) => {
                bottom.axpy(other_bottom, factor)?;
                top.axpy(other_top, factor)?;
            }
            _ => return Err(MappingError::TopologyMismatch),
        }
        self.update_flags();
        Ok(())
    }
}
