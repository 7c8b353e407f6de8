//! Reference-to-world mappings for finite element geometries.
//!
//! Element shapes are described by a recursive [`Topology`](topology::Topology). For a topology
//! and the world coordinates of its corners, a [`Mapping`](mapping::Mapping) maps the reference
//! domain onto the element and provides Jacobians, integration elements, normals, volumes and
//! the inverse mapping.
pub mod allocators;
pub mod error;
pub mod mapping;
pub mod quadrature;
pub mod reference;
pub mod topology;
pub mod util;

pub mod optimize {
    pub use refmap_optimize::*;
}

#[cfg(feature = "proptest")]
pub mod proptest;

pub extern crate nalgebra;

pub use refmap_traits::Real;
