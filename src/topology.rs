//! Recursive description of element shapes.
//!
//! Every supported element shape is obtained from a single point by repeatedly applying one of
//! two combinators. A *cone* connects all points of its base to a new apex, while a *prism*
//! sweeps its base along a new axis. Triangles and tetrahedra are iterated cones over a point,
//! quadrilaterals and hexahedra are iterated prisms, and mixed compositions give pyramids and
//! triangular prisms.
//!
//! The corner numbering follows the construction: the corners of the base come first, followed
//! by the apex (cone) or by the corners of the swept copy of the base (prism).
use crate::error::MappingError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The shape of a reference element.
///
/// Note that `Cone(Point)` and `Prism(Point)` both describe the segment. They produce identical
/// corners, reference coordinates and sub-entities, and [`is_simplex`](Self::is_simplex) as well as
/// [`is_cube`](Self::is_cube) accept either form. Structural equality still tells them apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topology {
    #[default]
    Point,
    Cone(Box<Topology>),
    Prism(Box<Topology>),
}

impl Topology {
    pub fn point() -> Self {
        Self::Point
    }

    pub fn cone(base: Topology) -> Self {
        Self::Cone(Box::new(base))
    }

    pub fn prism(base: Topology) -> Self {
        Self::Prism(Box::new(base))
    }

    /// The simplex of the given dimension, i.e. `dim` cones over a point.
    pub fn simplex(dim: usize) -> Self {
        (0..dim).fold(Self::point(), |base, _| Self::cone(base))
    }

    /// The cube of the given dimension, i.e. `dim` prisms over a point.
    pub fn cube(dim: usize) -> Self {
        (0..dim).fold(Self::point(), |base, _| Self::prism(base))
    }

    pub fn segment() -> Self {
        Self::simplex(1)
    }

    pub fn triangle() -> Self {
        Self::simplex(2)
    }

    pub fn quadrilateral() -> Self {
        Self::cube(2)
    }

    pub fn tetrahedron() -> Self {
        Self::simplex(3)
    }

    pub fn hexahedron() -> Self {
        Self::cube(3)
    }

    pub fn triangular_prism() -> Self {
        Self::prism(Self::triangle())
    }

    pub fn pyramid() -> Self {
        Self::cone(Self::quadrilateral())
    }

    pub fn dimension(&self) -> usize {
        match self {
            Self::Point => 0,
            Self::Cone(base) | Self::Prism(base) => base.dimension() + 1,
        }
    }

    pub fn num_corners(&self) -> usize {
        match self {
            Self::Point => 1,
            Self::Cone(base) => base.num_corners() + 1,
            Self::Prism(base) => 2 * base.num_corners(),
        }
    }

    /// The topology the outermost combinator was applied to, or `None` for a point.
    pub fn base(&self) -> Option<&Topology> {
        match self {
            Self::Point => None,
            Self::Cone(base) | Self::Prism(base) => Some(base),
        }
    }

    /// Integer identifier of the topology among all topologies of the same dimension.
    ///
    /// Bit `k` is set if the `(k + 1)`-th combinator applied to the point was a prism. Together
    /// with the dimension, the id determines the topology uniquely, see [`from_id`](Self::from_id).
    /// Returns `None` for dimensions above 32, whose ids do not fit into a `u32`.
    pub fn id(&self) -> Option<u32> {
        match self {
            Self::Point => Some(0),
            Self::Cone(base) => base.id(),
            Self::Prism(base) => {
                let bit = 1u32.checked_shl(u32::try_from(base.dimension()).ok()?)?;
                Some(base.id()? | bit)
            }
        }
    }

    /// Reconstructs a topology from its id and dimension.
    pub fn from_id(id: u32, dimension: usize) -> Result<Self, MappingError> {
        let excess_bits = u32::try_from(dimension)
            .ok()
            .filter(|&dim| dim <= u32::BITS)
            .map(|dim| id.checked_shr(dim).unwrap_or(0));
        if excess_bits != Some(0) {
            return Err(MappingError::InvalidTopologyId { id, dimension });
        }
        Ok((0..dimension).fold(Self::point(), |base, k| {
            if id & (1 << k) != 0 {
                Self::prism(base)
            } else {
                Self::cone(base)
            }
        }))
    }

    /// Whether the topology is a simplex (point, segment, triangle, tetrahedron, ...).
    pub fn is_simplex(&self) -> bool {
        match self {
            Self::Point => true,
            Self::Cone(base) => base.is_simplex(),
            // Both combinators turn a point into a segment
            Self::Prism(base) => matches!(**base, Self::Point),
        }
    }

    /// Whether the topology is a cube (point, segment, quadrilateral, hexahedron, ...).
    pub fn is_cube(&self) -> bool {
        match self {
            Self::Point => true,
            Self::Prism(base) => base.is_cube(),
            Self::Cone(base) => matches!(**base, Self::Point),
        }
    }

    /// Number of sub-entities of the given codimension.
    ///
    /// Codimension 0 is the element itself, codimension 1 are its faces and codimension
    /// `dimension()` its corners.
    pub fn num_sub_entities(&self, codim: usize) -> Result<usize, MappingError> {
        self.check_codim(codim)?;
        Ok(self.count(codim))
    }

    /// Indices of the corners of the given sub-entity.
    ///
    /// The corners are listed in the canonical order of the sub-entity's own topology, as returned
    /// by [`sub_entity_topology`](Self::sub_entity_topology).
    pub fn sub_entity_corners(&self, codim: usize, index: usize) -> Result<Vec<usize>, MappingError> {
        self.checked_sub_entity(codim, index)
            .map(|(corners, _)| corners)
    }

    pub fn sub_entity_topology(&self, codim: usize, index: usize) -> Result<Topology, MappingError> {
        self.checked_sub_entity(codim, index)
            .map(|(_, topology)| topology)
    }

    fn check_codim(&self, codim: usize) -> Result<(), MappingError> {
        let dimension = self.dimension();
        if codim > dimension {
            Err(MappingError::InvalidCodimension { codim, dimension })
        } else {
            Ok(())
        }
    }

    fn checked_sub_entity(&self, codim: usize, index: usize) -> Result<(Vec<usize>, Topology), MappingError> {
        let count = self.num_sub_entities(codim)?;
        let out_of_range = MappingError::InvalidSubEntity { codim, index, count };
        if index >= count {
            return Err(out_of_range);
        }
        self.sub_entity(codim, index).ok_or(out_of_range)
    }

    fn count(&self, codim: usize) -> usize {
        match self {
            Self::Point => usize::from(codim == 0),
            Self::Prism(base) => {
                let lifted = if codim <= base.dimension() { base.count(codim) } else { 0 };
                let caps = if codim >= 1 { 2 * base.count(codim - 1) } else { 0 };
                lifted + caps
            }
            Self::Cone(base) => {
                let bottom = if codim >= 1 { base.count(codim - 1) } else { 0 };
                let sides = if codim <= base.dimension() {
                    base.count(codim)
                } else {
                    // The apex
                    usize::from(codim == self.dimension())
                };
                bottom + sides
            }
        }
    }

    // Prism: prisms over the base's sub-entities of the same codimension, then the bottom copies
    // of the base's sub-entities of one codimension less, then their top copies.
    // Cone: the bottom copies first, then cones over the base's sub-entities, or the apex.
    fn sub_entity(&self, codim: usize, index: usize) -> Option<(Vec<usize>, Topology)> {
        match self {
            Self::Point => (codim == 0 && index == 0).then(|| (vec![0], Self::Point)),
            Self::Prism(base) => {
                let n = base.num_corners();
                let mut index = index;
                if codim <= base.dimension() {
                    let count = base.count(codim);
                    if index < count {
                        let (bottom, topology) = base.sub_entity(codim, index)?;
                        let top: Vec<_> = bottom.iter().map(|&c| c + n).collect();
                        return Some(([bottom, top].concat(), Self::prism(topology)));
                    }
                    index -= count;
                }
                if codim == 0 {
                    return None;
                }
                let count = base.count(codim - 1);
                if index < count {
                    base.sub_entity(codim - 1, index)
                } else if index < 2 * count {
                    let (bottom, topology) = base.sub_entity(codim - 1, index - count)?;
                    Some((bottom.iter().map(|&c| c + n).collect(), topology))
                } else {
                    None
                }
            }
            Self::Cone(base) => {
                let apex = base.num_corners();
                let mut index = index;
                if codim >= 1 {
                    let count = base.count(codim - 1);
                    if index < count {
                        return base.sub_entity(codim - 1, index);
                    }
                    index -= count;
                }
                if codim <= base.dimension() {
                    let (mut corners, topology) = base.sub_entity(codim, index)?;
                    corners.push(apex);
                    Some((corners, Self::cone(topology)))
                } else {
                    (codim == self.dimension() && index == 0).then(|| (vec![apex], Self::Point))
                }
            }
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Up to dimension 3 the id (ignoring the first combinator) identifies a named shape
        match (self.dimension(), self.id().map(|id| id >> 1)) {
            (0, _) => write!(f, "point"),
            (1, _) => write!(f, "segment"),
            (2, Some(0)) => write!(f, "triangle"),
            (2, _) => write!(f, "quadrilateral"),
            (3, Some(0)) => write!(f, "tetrahedron"),
            (3, Some(1)) => write!(f, "pyramid"),
            (3, Some(2)) => write!(f, "triangular prism"),
            (3, _) => write!(f, "hexahedron"),
            _ => match self {
                Self::Cone(base) => write!(f, "cone({base})"),
                Self::Prism(base) => write!(f, "prism({base})"),
                Self::Point => write!(f, "point"),
            },
        }
    }
}
