//! Mappings from reference domains to world space.
//!
//! A [`Mapping`] is built from a [`Topology`] and the world coordinates of its corners, listed in
//! the canonical corner order of the topology. It evaluates through the recursive
//! [`GenericMapping`], except for segments, triangles, quadrilaterals, tetrahedra and hexahedra,
//! which are evaluated in closed form.
use crate::allocators::WorldAllocator;
use crate::error::MappingError;
use crate::quadrature::QuadratureRule;
use crate::reference::ReferenceElement;
use crate::topology::Topology;
use crate::util::{determinant, integration_element, pseudo_inverse_transposed};
use crate::Real;
use itertools::Itertools;
use log::trace;
use nalgebra::{DVector, DefaultAllocator, DimName, Dyn, OMatrix, OPoint, OVector, U1};
use once_cell::sync::OnceCell;

mod father;
mod generic;
mod inverse;
mod specialized;

pub use father::GeometryInFather;
pub use generic::{GenericMapping, MappingFlags, ZERO_TOLERANCE};
pub use inverse::{InverseSettings, DEFAULT_INVERSE_TOLERANCE};

use specialized::FastPath;

/// Quantities of an affine mapping that do not depend on the local coordinate.
#[derive(Debug, Clone)]
struct AffineCache<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    jacobian: OMatrix<T, D, Dyn>,
    jacobian_inverse_transposed: Option<OMatrix<T, D, Dyn>>,
    integration_element: T,
}

/// Mapping from the reference domain of a topology into `D`-dimensional world space.
///
/// Local coordinates are passed as slices whose length must equal
/// [`dimension`](Self::dimension). Passing a slice of different length is a programming error and
/// panics, like a dimension mismatch in `nalgebra`.
///
/// Affine mappings compute their constant Jacobian, its pseudo-inverse and the integration
/// element on first use. The cached values are discarded by [`subtract`](Self::subtract) and
/// [`add`](Self::add).
#[derive(Debug, Clone)]
pub struct Mapping<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    topology: Topology,
    corners: Vec<OPoint<T, D>>,
    generic: GenericMapping<T, D>,
    fast_path: Option<FastPath>,
    affine_cache: OnceCell<AffineCache<T, D>>,
    reference: OnceCell<ReferenceElement<T>>,
}

impl<T, D> Mapping<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: WorldAllocator<T, D>,
{
    /// Creates the mapping of the given topology onto the given corners.
    ///
    /// Returns an error if the number of corners does not match the topology, or if the topology
    /// has a higher dimension than the world.
    pub fn new(topology: Topology, corners: &[OPoint<T, D>]) -> Result<Self, MappingError> {
        Self::with_declared_affine(topology, corners, false)
    }

    /// Creates a mapping that the caller declares to be affine.
    ///
    /// The mapping then uses the affine evaluation formulas and caches regardless of the corner
    /// positions, which is only meaningful if the corners actually form an affine image of the
    /// reference element.
    pub fn new_declared_affine(topology: Topology, corners: &[OPoint<T, D>]) -> Result<Self, MappingError> {
        Self::with_declared_affine(topology, corners, true)
    }

    fn with_declared_affine(
        topology: Topology,
        corners: &[OPoint<T, D>],
        declared_affine: bool,
    ) -> Result<Self, MappingError> {
        let generic = GenericMapping::with_declared_affine(&topology, corners, declared_affine)?;
        Ok(Self {
            fast_path: FastPath::detect(&topology),
            topology,
            corners: corners.to_vec(),
            generic,
            affine_cache: OnceCell::new(),
            reference: OnceCell::new(),
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Dimension of the reference domain.
    pub fn dimension(&self) -> usize {
        self.generic.dimension()
    }

    pub fn world_dimension(&self) -> usize {
        D::dim()
    }

    pub fn num_corners(&self) -> usize {
        self.corners.len()
    }

    pub fn corner(&self, index: usize) -> Option<&OPoint<T, D>> {
        self.corners.get(index)
    }

    pub fn corners(&self) -> &[OPoint<T, D>] {
        &self.corners
    }

    /// The recursive mapping backing this mapping.
    pub fn generic(&self) -> &GenericMapping<T, D> {
        &self.generic
    }

    pub fn flags(&self) -> MappingFlags {
        self.generic.flags()
    }

    pub fn affine(&self) -> bool {
        self.generic.affine()
    }

    pub fn constant(&self) -> bool {
        self.generic.constant()
    }

    pub fn zero(&self) -> bool {
        self.generic.zero()
    }

    /// The reference element of the mapping's topology.
    pub fn reference_element(&self) -> &ReferenceElement<T> {
        self.reference
            .get_or_init(|| ReferenceElement::new(&self.topology))
    }

    pub fn position(&self, x: &[T]) -> OPoint<T, D> {
        assert_eq!(x.len(), self.dimension(), "Local coordinate has wrong dimension.");
        let coords = match self.fast_path {
            Some(fast_path) => fast_path.position(&self.corners, x),
            None => self.generic.position(x),
        };
        OPoint::from(coords)
    }

    /// Same as [`position`](Self::position), but returns an error if the local coordinate lies
    /// outside the reference domain by more than the tolerance.
    pub fn checked_position(&self, x: &[T], tolerance: T) -> Result<OPoint<T, D>, MappingError> {
        if x.len() != self.dimension() {
            return Err(MappingError::DimensionMismatch {
                expected: self.dimension(),
                actual: x.len(),
            });
        }
        if !self.reference_element().contains(x, tolerance) {
            return Err(MappingError::OutsideReferenceDomain);
        }
        Ok(self.position(x))
    }

    fn evaluate_jacobian(&self, x: &[T]) -> OMatrix<T, D, Dyn> {
        assert_eq!(x.len(), self.dimension(), "Local coordinate has wrong dimension.");
        match self.fast_path {
            Some(fast_path) => fast_path.jacobian(&self.corners, x),
            None => self.generic.jacobian(x),
        }
    }

    fn affine_cache(&self) -> &AffineCache<T, D> {
        self.affine_cache.get_or_init(|| {
            trace!("Caching affine Jacobian of {} mapping", self.topology);
            let jacobian = self.evaluate_jacobian(&vec![T::zero(); self.dimension()]);
            AffineCache {
                jacobian_inverse_transposed: pseudo_inverse_transposed(&jacobian),
                integration_element: integration_element(&jacobian),
                jacobian,
            }
        })
    }

    /// The `D x dimension` Jacobian matrix.
    pub fn jacobian(&self, x: &[T]) -> OMatrix<T, D, Dyn> {
        if self.affine() {
            assert_eq!(x.len(), self.dimension(), "Local coordinate has wrong dimension.");
            self.affine_cache().jacobian.clone()
        } else {
            self.evaluate_jacobian(x)
        }
    }

    /// The transposed Jacobian matrix, with one row per local direction.
    pub fn jacobian_transposed(&self, x: &[T]) -> OMatrix<T, Dyn, D> {
        self.jacobian(x).transpose()
    }

    /// Signed determinant of the Jacobian.
    ///
    /// Returns an error unless the reference and world dimensions agree.
    pub fn jacobian_determinant(&self, x: &[T]) -> Result<T, MappingError> {
        determinant(&self.jacobian(x)).ok_or(MappingError::DimensionMismatch {
            expected: D::dim(),
            actual: self.dimension(),
        })
    }

    /// Computes `J (J^T J)^{-1}`, which is the inverse transpose of the Jacobian when the
    /// reference and world dimensions agree.
    pub fn jacobian_inverse_transposed(&self, x: &[T]) -> Result<OMatrix<T, D, Dyn>, MappingError> {
        if self.affine() {
            assert_eq!(x.len(), self.dimension(), "Local coordinate has wrong dimension.");
            self.affine_cache()
                .jacobian_inverse_transposed
                .clone()
                .ok_or(MappingError::SingularJacobian)
        } else {
            pseudo_inverse_transposed(&self.evaluate_jacobian(x)).ok_or(MappingError::SingularJacobian)
        }
    }

    /// The factor relating reference and world volume elements, `sqrt(det(J^T J))`.
    pub fn integration_element(&self, x: &[T]) -> T {
        if self.affine() {
            assert_eq!(x.len(), self.dimension(), "Local coordinate has wrong dimension.");
            self.affine_cache().integration_element
        } else {
            integration_element(&self.evaluate_jacobian(x))
        }
    }

    /// Maps the given reference face normal to world space.
    ///
    /// The result is `J^{-T} n`, which is orthogonal to the image of the face. It is neither
    /// normalized nor scaled.
    fn map_normal(&self, reference_normal: &DVector<T>, x: &[T]) -> Result<OVector<T, D>, MappingError> {
        let jit = self.jacobian_inverse_transposed(x)?;
        let mut normal = OVector::<T, D>::zeros_generic(D::name(), U1);
        for (k, &n_k) in reference_normal.iter().enumerate() {
            normal.axpy(n_k, &jit.column(k), T::one());
        }
        Ok(normal)
    }

    /// Outer normal of the given face at the given local coordinate, obtained by mapping the
    /// unit reference normal with the inverse transposed Jacobian.
    pub fn normal(&self, face: usize, x: &[T]) -> Result<OVector<T, D>, MappingError> {
        let reference_normal = self.reference_element().outer_normal(face)?;
        self.map_normal(reference_normal, x)
    }

    /// Outer normal of the given face, scaled such that its length is the face's world volume
    /// element.
    ///
    /// For affine mappings, the integration outer normal of a face has the length of the face's
    /// world volume (length, area).
    pub fn integration_outer_normal(&self, face: usize, x: &[T]) -> Result<OVector<T, D>, MappingError> {
        let reference_normal = self.reference_element().integration_outer_normal(face)?;
        Ok(self.map_normal(&reference_normal, x)? * self.integration_element(x))
    }

    /// Outer normal of the given face with unit length.
    pub fn unit_outer_normal(&self, face: usize, x: &[T]) -> Result<OVector<T, D>, MappingError> {
        self.normal(face, x)?
            .try_normalize(T::zero())
            .ok_or(MappingError::SingularJacobian)
    }

    /// The image of the reference barycenter.
    pub fn center(&self) -> OPoint<T, D> {
        self.position(self.reference_element().barycenter().as_slice())
    }

    /// Volume (length, area, ...) of the element.
    ///
    /// Affine mappings multiply the constant integration element with the reference volume.
    /// Other mappings integrate the integration element with a Gauss rule exact for
    /// multilinear elements whose Jacobian determinant does not change sign.
    pub fn volume(&self) -> T {
        if self.affine() {
            self.affine_cache().integration_element * self.reference_element().volume()
        } else {
            self.volume_with_points(self.dimension() + 1)
        }
    }

    /// Integrates the integration element with a Gauss rule with the given number of points
    /// along each reference axis.
    ///
    /// # Panics
    ///
    /// Panics if zero points are requested.
    pub fn volume_with_points(&self, num_points: usize) -> T {
        QuadratureRule::for_topology(&self.topology, num_points).integrate(|x| self.integration_element(x))
    }

    /// Largest distance between two corners.
    pub fn diameter(&self) -> T {
        self.corners
            .iter()
            .tuple_combinations()
            .map(|(a, b)| (&a.coords - &b.coords).norm())
            .fold(T::zero(), |max, d| max.max(d))
    }

    /// Replaces the mapping `f` by `f - g`, where `g` is the other mapping.
    ///
    /// The corners of `g` are subtracted from the corners of `f`, flags are recomputed and cached
    /// quantities are discarded. The result is typically a displacement field.
    pub fn subtract(&mut self, other: &Self) -> Result<(), MappingError> {
        self.check_same_topology(other)?;
        self.generic.subtract(&other.generic)?;
        for (corner, other_corner) in self.corners.iter_mut().zip(&other.corners) {
            corner.coords -= &other_corner.coords;
        }
        self.affine_cache = OnceCell::new();
        Ok(())
    }

    /// Replaces the mapping `f` by `f + g`, where `g` is the other mapping.
    pub fn add(&mut self, other: &Self) -> Result<(), MappingError> {
        self.check_same_topology(other)?;
        self.generic.add(&other.generic)?;
        for (corner, other_corner) in self.corners.iter_mut().zip(&other.corners) {
            corner.coords += &other_corner.coords;
        }
        self.affine_cache = OnceCell::new();
        Ok(())
    }

    /// Returns the mapping `f - g`, where `f` is this mapping and `g` the other mapping.
    pub fn displacement(&self, other: &Self) -> Result<Self, MappingError> {
        let mut displacement = self.clone();
        displacement.subtract(other)?;
        Ok(displacement)
    }

    fn check_same_topology(&self, other: &Self) -> Result<(), MappingError> {
        if self.topology == other.topology {
            Ok(())
        } else {
            Err(MappingError::TopologyMismatch)
        }
    }

    /// Computes the local coordinate that maps to the given world point.
    ///
    /// Equivalent to [`inverse_with_settings`](Self::inverse_with_settings) with default
    /// settings.
    pub fn inverse(&self, world: &OPoint<T, D>) -> Result<DVector<T>, MappingError> {
        self.inverse_with_settings(world, &InverseSettings::default())
    }

    /// Computes the local coordinate that maps to the given world point.
    ///
    /// Affine mappings are inverted in closed form with the cached pseudo-inverse. Other mappings
    /// use Newton's method started at the reference barycenter. If the reference dimension is
    /// smaller than the world dimension, the result is the local coordinate of the point on the
    /// element closest to the world point.
    pub fn inverse_with_settings(
        &self,
        world: &OPoint<T, D>,
        settings: &InverseSettings,
    ) -> Result<DVector<T>, MappingError> {
        inverse::inverse(self, world, settings)
    }
}
