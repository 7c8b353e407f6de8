//! Strategies for property-based tests of topologies and mappings.
use crate::reference::ReferenceElement;
use crate::topology::Topology;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::allocator::Allocator;
use nalgebra::{DefaultAllocator, DimName, OPoint, OVector, U1};

/// Topologies of dimension at most `max_dim`.
pub fn topology(max_dim: usize) -> impl Strategy<Value = Topology> {
    (0..=max_dim)
        .prop_flat_map(|dim| (Just(dim), 0..(1u32 << dim)))
        .prop_filter_map("topology id must be valid", |(dim, id)| Topology::from_id(id, dim).ok())
}

/// Points in the reference domain of the topology, including its boundary.
pub fn reference_point(topology: &Topology) -> BoxedStrategy<Vec<f64>> {
    reference_point_between(topology, 0.0, 1.0)
}

/// Points well inside the reference domain of the topology.
///
/// The points keep a distance from the boundary, so that finite differences and small
/// perturbations stay inside the domain.
pub fn interior_reference_point(topology: &Topology) -> BoxedStrategy<Vec<f64>> {
    reference_point_between(topology, 0.05, 0.95)
}

// Prism coordinates are drawn from [lo, hi]. Cones draw t from [lo, hi] and scale a point of
// the base by 1 - t
fn reference_point_between(topology: &Topology, lo: f64, hi: f64) -> BoxedStrategy<Vec<f64>> {
    match topology {
        Topology::Point => Just(Vec::new()).boxed(),
        Topology::Prism(base) => (reference_point_between(base, lo, hi), lo..=hi)
            .prop_map(|(mut x, t)| {
                x.push(t);
                x
            })
            .boxed(),
        Topology::Cone(base) => (reference_point_between(base, lo, hi), lo..=hi)
            .prop_map(|(x_base, t)| {
                let mut x: Vec<f64> = x_base.into_iter().map(|x_i| (1.0 - t) * x_i).collect();
                x.push(t);
                x
            })
            .boxed(),
    }
}

pub fn world_point<D>() -> impl Strategy<Value = OPoint<f64, D>>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>,
{
    // Pick a reasonably small range to pick coordinates from,
    // otherwise we can easily get floating point numbers that are
    // so ridiculously large as to break anything we might want to do with them
    vec(-10.0..10.0, D::dim())
        .prop_map(|coords| OPoint::from(OVector::<f64, D>::from_column_slice_generic(D::name(), U1, &coords)))
}

/// The reference corners of the topology embedded in `D`-dimensional space, with every
/// coordinate perturbed by at most `magnitude`.
///
/// For a magnitude well below `1 / 2`, the resulting elements are valid (non-inverted) but
/// generally not affine.
///
/// # Panics
///
/// Panics if the topology has a higher dimension than `D`.
pub fn perturbed_corners<D>(topology: &Topology, magnitude: f64) -> BoxedStrategy<Vec<OPoint<f64, D>>>
where
    D: DimName,
    DefaultAllocator: Allocator<f64, D>,
{
    assert!(
        topology.dimension() <= D::dim(),
        "Topology dimension must not exceed the world dimension."
    );
    let d = D::dim();
    let reference = ReferenceElement::<f64>::new(topology);
    let embedded: Vec<OVector<f64, D>> = reference
        .corners()
        .iter()
        .map(|corner| {
            let mut x = OVector::<f64, D>::zeros_generic(D::name(), U1);
            for (x_k, &corner_k) in x.iter_mut().zip(corner.iter()) {
                *x_k = corner_k;
            }
            x
        })
        .collect();

    vec(-magnitude..=magnitude, embedded.len() * d)
        .prop_map(move |offsets| {
            embedded
                .iter()
                .zip(offsets.chunks(d))
                .map(|(corner, offset)| {
                    let offset = OVector::<f64, D>::from_column_slice_generic(D::name(), U1, offset);
                    OPoint::from(corner + offset)
                })
                .collect()
        })
        .boxed()
}
