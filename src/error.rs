//! Errors reported by topologies, reference elements and mappings.

/// The error type for all fallible operations in `refmap`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("expected {expected} corners, got {actual}")]
    WrongCornerCount { expected: usize, actual: usize },
    #[error("reference dimension {dimension} exceeds world dimension {world_dimension}")]
    TopologyExceedsWorld { dimension: usize, world_dimension: usize },
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("codimension {codim} is invalid for a topology of dimension {dimension}")]
    InvalidCodimension { codim: usize, dimension: usize },
    #[error("sub-entity {index} of codimension {codim} is out of range ({count} sub-entities)")]
    InvalidSubEntity { codim: usize, index: usize, count: usize },
    #[error("face {face} is out of range ({num_faces} faces)")]
    InvalidFace { face: usize, num_faces: usize },
    #[error("{id} is not a valid topology id in dimension {dimension}")]
    InvalidTopologyId { id: u32, dimension: usize },
    #[error("local coordinate lies outside the reference domain")]
    OutsideReferenceDomain,
    #[error("mappings must share the same topology")]
    TopologyMismatch,
    #[error("Jacobian is singular")]
    SingularJacobian,
    #[error("inverse mapping did not converge within {iterations} iterations")]
    InverseDidNotConverge { iterations: usize },
    #[error("line search could not reduce the inverse mapping residual")]
    InverseStalled,
}
