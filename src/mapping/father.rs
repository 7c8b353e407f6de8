use super::Mapping;
use crate::allocators::BiWorldAllocator;
use crate::error::MappingError;
use crate::quadrature::QuadratureRule;
use crate::topology::Topology;
use crate::util::integration_element;
use crate::Real;
use nalgebra::{DefaultAllocator, DimName, Dyn, OMatrix, OPoint, OVector, U1};

/// A child element embedded in the reference domain of a parent element.
///
/// The child mapping takes its own reference domain into the parent's reference domain, which is
/// `L`-dimensional, and the parent mapping continues into `D`-dimensional world space. This is
/// the geometry of a refined element (or of a face) relative to its father.
#[derive(Debug, Clone)]
pub struct GeometryInFather<'a, T, L, D>
where
    T: Real,
    L: DimName,
    D: DimName,
    DefaultAllocator: BiWorldAllocator<T, L, D>,
{
    parent: &'a Mapping<T, D>,
    child: Mapping<T, L>,
}

impl<'a, T, L, D> GeometryInFather<'a, T, L, D>
where
    T: Real,
    L: DimName,
    D: DimName,
    DefaultAllocator: BiWorldAllocator<T, L, D>,
{
    /// Composes the parent mapping with a child mapping whose corners are given in the parent's
    /// local coordinates.
    ///
    /// Returns an error if `L` differs from the parent's reference dimension.
    pub fn new(parent: &'a Mapping<T, D>, child: Mapping<T, L>) -> Result<Self, MappingError> {
        if parent.dimension() != L::dim() {
            return Err(MappingError::DimensionMismatch {
                expected: parent.dimension(),
                actual: L::dim(),
            });
        }
        Ok(Self { parent, child })
    }

    /// Builds the child from corners given in world space by inverting the parent mapping at
    /// each corner.
    pub fn from_world_corners(
        parent: &'a Mapping<T, D>,
        topology: Topology,
        world_corners: &[OPoint<T, D>],
    ) -> Result<Self, MappingError> {
        if parent.dimension() != L::dim() {
            return Err(MappingError::DimensionMismatch {
                expected: parent.dimension(),
                actual: L::dim(),
            });
        }
        let local_corners = world_corners
            .iter()
            .map(|corner| {
                let local = parent.inverse(corner)?;
                let coords = OVector::<T, L>::from_column_slice_generic(L::name(), U1, local.as_slice());
                Ok::<_, MappingError>(OPoint::from(coords))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(parent, Mapping::new(topology, &local_corners)?)
    }

    pub fn parent(&self) -> &Mapping<T, D> {
        self.parent
    }

    pub fn child(&self) -> &Mapping<T, L> {
        &self.child
    }

    pub fn dimension(&self) -> usize {
        self.child.dimension()
    }

    /// The child's local coordinate mapped through the child and then the parent.
    pub fn position(&self, x: &[T]) -> OPoint<T, D> {
        let local = self.child.position(x);
        self.parent.position(local.coords.as_slice())
    }

    /// The Jacobian of the composition, `J_parent(child(x)) J_child(x)`.
    pub fn jacobian(&self, x: &[T]) -> OMatrix<T, D, Dyn> {
        let local = self.child.position(x);
        self.parent.jacobian(local.coords.as_slice()) * self.child.jacobian(x)
    }

    pub fn integration_element(&self, x: &[T]) -> T {
        integration_element(&self.jacobian(x))
    }

    /// Whether both the parent and the child mapping are affine.
    pub fn affine(&self) -> bool {
        self.parent.affine() && self.child.affine()
    }

    /// World volume of the child element.
    pub fn volume(&self) -> T {
        let num_points = self.child.dimension() + self.parent.dimension() + 1;
        QuadratureRule::for_topology(self.child.topology(), num_points).integrate(|x| self.integration_element(x))
    }
}
