//! Geometric data of reference domains.
//!
//! The reference domain of a point is `R^0`. A prism over `B` has the reference domain
//! `B x [0, 1]`, and a cone over `B` has the reference domain
//! `{ (x', t) : t in [0, 1], x' in (1 - t) B }`, so that the segment is `[0, 1]`, the triangle
//! has the corners `(0, 0), (1, 0), (0, 1)` and the hexahedron has corner `i + 2j + 4k` at
//! `(i, j, k)`.
//!
//! Faces are numbered like the codimension 1 sub-entities of the
//! [`Topology`](crate::topology::Topology).
use crate::error::MappingError;
use crate::topology::Topology;
use crate::Real;
use nalgebra::{convert, DVector, Scalar};
use numeric_literals::replace_float_literals;

/// A face of a reference domain, lying in the plane `normal . x = offset`.
#[derive(Debug, Clone, PartialEq)]
struct ReferenceFace<T: Scalar> {
    /// Unit outer normal.
    normal: DVector<T>,
    offset: T,
    volume: T,
}

/// Corners, barycenter, volume and faces of the reference domain of a topology.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceElement<T: Scalar> {
    topology: Topology,
    corners: Vec<DVector<T>>,
    barycenter: DVector<T>,
    volume: T,
    faces: Vec<ReferenceFace<T>>,
}

struct Parts<T: Scalar> {
    corners: Vec<DVector<T>>,
    barycenter: DVector<T>,
    volume: T,
    faces: Vec<ReferenceFace<T>>,
}

impl<T: Real> ReferenceElement<T> {
    pub fn new(topology: &Topology) -> Self {
        let Parts {
            corners,
            barycenter,
            volume,
            faces,
        } = build(topology);
        Self {
            topology: topology.clone(),
            corners,
            barycenter,
            volume,
            faces,
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn dimension(&self) -> usize {
        self.barycenter.len()
    }

    pub fn num_corners(&self) -> usize {
        self.corners.len()
    }

    pub fn corners(&self) -> &[DVector<T>] {
        &self.corners
    }

    pub fn corner(&self, index: usize) -> Option<&DVector<T>> {
        self.corners.get(index)
    }

    pub fn barycenter(&self) -> &DVector<T> {
        &self.barycenter
    }

    /// Volume (length, area, ...) of the reference domain.
    pub fn volume(&self) -> T {
        self.volume
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Unit outer normal of the given face.
    pub fn outer_normal(&self, face: usize) -> Result<&DVector<T>, MappingError> {
        self.face(face).map(|f| &f.normal)
    }

    /// The offset `c` of the plane `n . x = c` containing the given face, with `n` the unit outer
    /// normal.
    pub fn face_offset(&self, face: usize) -> Result<T, MappingError> {
        self.face(face).map(|f| f.offset)
    }

    /// Reference volume of the given face.
    pub fn face_volume(&self, face: usize) -> Result<T, MappingError> {
        self.face(face).map(|f| f.volume)
    }

    /// Unit outer normal of the given face, scaled by the face volume.
    ///
    /// The integration outer normals of all faces sum to zero.
    pub fn integration_outer_normal(&self, face: usize) -> Result<DVector<T>, MappingError> {
        self.face(face).map(|f| &f.normal * f.volume)
    }

    /// Whether the given local coordinate lies in the reference domain, up to the tolerance.
    ///
    /// # Panics
    ///
    /// Panics if the coordinate does not have the dimension of the reference element.
    pub fn contains(&self, x: &[T], tolerance: T) -> bool {
        assert_eq!(x.len(), self.dimension(), "Local coordinate has wrong dimension.");
        contains_scaled(&self.topology, x, T::one(), tolerance)
    }

    fn face(&self, face: usize) -> Result<&ReferenceFace<T>, MappingError> {
        self.faces.get(face).ok_or(MappingError::InvalidFace {
            face,
            num_faces: self.faces.len(),
        })
    }
}

fn axis<T: Real>(dim: usize, value: T) -> DVector<T> {
    let mut v = DVector::zeros(dim);
    v[dim - 1] = value;
    v
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn build<T: Real>(topology: &Topology) -> Parts<T> {
    let n = topology.dimension();
    match topology {
        Topology::Point => Parts {
            corners: vec![DVector::zeros(0)],
            barycenter: DVector::zeros(0),
            volume: 1.0,
            faces: Vec::new(),
        },
        Topology::Prism(base) => {
            let base = build::<T>(base);
            let bottom = base.corners.iter().map(|x| x.push(0.0));
            let top = base.corners.iter().map(|x| x.push(1.0));

            // Lifted base faces, then bottom and top
            let mut faces: Vec<_> = base
                .faces
                .iter()
                .map(|face| ReferenceFace {
                    normal: face.normal.push(0.0),
                    offset: face.offset,
                    volume: face.volume,
                })
                .collect();
            faces.push(ReferenceFace {
                normal: axis(n, -1.0),
                offset: 0.0,
                volume: base.volume,
            });
            faces.push(ReferenceFace {
                normal: axis(n, 1.0),
                offset: 1.0,
                volume: base.volume,
            });

            Parts {
                corners: bottom.chain(top).collect(),
                barycenter: base.barycenter.push(0.5),
                volume: base.volume,
                faces,
            }
        }
        Topology::Cone(base_topology) => {
            let base = build::<T>(base_topology);
            let n_real: T = convert(n as f64);

            let mut corners: Vec<_> = base.corners.iter().map(|x| x.push(0.0)).collect();
            corners.push(axis(n, 1.0));

            let mut faces = vec![ReferenceFace {
                normal: axis(n, -1.0),
                offset: 0.0,
                volume: base.volume,
            }];
            if base_topology.dimension() == 0 {
                faces.push(ReferenceFace {
                    normal: axis(n, 1.0),
                    offset: 1.0,
                    volume: 1.0,
                });
            } else {
                // The cone over the base face n_f . x' = c_f lies in the plane
                // n_f . x' + c_f t = c_f, and its height is the distance from the apex to the
                // base face, sqrt(1 + c_f^2)
                for face in &base.faces {
                    let scale = (1.0 + face.offset * face.offset).sqrt();
                    faces.push(ReferenceFace {
                        normal: face.normal.push(face.offset) / scale,
                        offset: face.offset / scale,
                        volume: face.volume * scale / (n_real - 1.0),
                    });
                }
            }

            Parts {
                corners,
                barycenter: (base.barycenter * (n_real / (n_real + 1.0))).push(1.0 / (n_real + 1.0)),
                volume: base.volume / n_real,
                faces,
            }
        }
    }
}

// Within a cone, the cross-section at height t is the base domain scaled by (1 - t)
fn contains_scaled<T: Real>(topology: &Topology, x: &[T], scale: T, tolerance: T) -> bool {
    let (base, (&t, x_base)) = match (topology.base(), x.split_last()) {
        (None, _) => return true,
        (Some(base), Some(split)) => (base, split),
        (Some(_), None) => return false,
    };
    let in_range = t >= -tolerance && t <= scale + tolerance;
    match topology {
        Topology::Cone(_) => in_range && contains_scaled(base, x_base, scale - t, tolerance),
        _ => in_range && contains_scaled(base, x_base, scale, tolerance),
    }
}
