use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::storage::Storage;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, Dim, Matrix, Matrix3, Point3, Vector2, Vector3, U2, U3};
use paste::paste;
use proptest::prelude::*;
use rayon::prelude::*;
use refmap::error::MappingError;
use refmap::mapping::{InverseSettings, Mapping, MappingFlags};
use refmap::optimize::calculus::approximate_jacobian_fd;
use refmap::proptest::{interior_reference_point, perturbed_corners, reference_point, topology as any_topology};
use refmap::quadrature::QuadratureRule;
use refmap::reference::ReferenceElement;
use refmap::topology::Topology;
use refmap::util::integration_element;
use util::{assert_approx_matrix_eq, assert_panics, max_abs_diff, points};

/// Central finite difference approximation of the Jacobian with step `h`.
fn fd_jacobian(mapping: &Mapping<f64, U3>, x: &[f64], h: f64) -> DMatrix<f64> {
    let mut x = DVector::from_column_slice(x);
    let f = |x: DVectorView<f64>, mut f: DVectorViewMut<f64>| f.copy_from(&mapping.position(x.as_slice()).coords);
    approximate_jacobian_fd(3, f, &mut x, h)
}

fn to_dmatrix<R, C, S>(matrix: &Matrix<f64, R, C, S>) -> DMatrix<f64>
where
    R: Dim,
    C: Dim,
    S: Storage<f64, R, C>,
{
    DMatrix::from_fn(matrix.nrows(), matrix.ncols(), |i, j| matrix[(i, j)])
}

fn unit_square_scaled(scale: f64) -> Mapping<f64, U2> {
    let corners = points::<U2, 2>(&[[0.0, 0.0], [scale, 0.0], [0.0, scale], [scale, scale]]);
    Mapping::new(Topology::quadrilateral(), &corners).unwrap()
}

/// A convex quadrilateral that is not a parallelogram, with area 7 / 2.
fn generic_quad() -> Mapping<f64, U2> {
    let corners = points::<U2, 2>(&[[0.0, 0.0], [2.0, 0.0], [0.0, 1.0], [3.0, 2.0]]);
    Mapping::new(Topology::quadrilateral(), &corners).unwrap()
}

/// A pyramid over a non-parallelogram base in the plane z = 0, with apex at height 1.
fn generic_pyramid() -> Mapping<f64, U3> {
    let corners = points::<U3, 3>(&[
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [1.2, 1.3, 0.0],
        [0.2, 0.3, 1.0],
    ]);
    Mapping::new(Topology::pyramid(), &corners).unwrap()
}

#[test]
fn triangle_in_the_plane() {
    let corners = points::<U2, 2>(&[[1.0, 1.0], [3.0, 1.0], [1.0, 2.0]]);
    let mapping = Mapping::new(Topology::triangle(), &corners).unwrap();

    assert_eq!(mapping.dimension(), 2);
    assert_eq!(mapping.world_dimension(), 2);
    assert_eq!(mapping.num_corners(), 3);
    assert_eq!(mapping.corner(2), Some(&corners[2]));
    assert_eq!(mapping.corner(3), None);
    assert_eq!(mapping.topology(), &Topology::triangle());
    assert_eq!(
        mapping.flags(),
        MappingFlags {
            affine: true,
            constant: false,
            zero: false
        }
    );

    assert_approx_matrix_eq!(mapping.position(&[0.5, 0.5]).coords, Vector2::new(2.0, 1.5), abstol = 1e-14);
    let expected_jacobian = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 1.0]);
    assert_matrix_eq!(to_dmatrix(&mapping.jacobian(&[0.2, 0.1])), expected_jacobian, comp = abs, tol = 1e-14);
    assert_scalar_eq!(mapping.jacobian_determinant(&[0.2, 0.1]).unwrap(), 2.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(mapping.integration_element(&[0.2, 0.1]), 2.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(mapping.volume(), 1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(mapping.diameter(), 5.0f64.sqrt(), comp = abs, tol = 1e-14);
    assert_approx_matrix_eq!(
        mapping.center().coords,
        Vector2::new(1.0 + 2.0 / 3.0, 1.0 + 1.0 / 3.0),
        abstol = 1e-14
    );

    let jit = mapping.jacobian_inverse_transposed(&[0.2, 0.1]).unwrap();
    let expected_jit = DMatrix::from_row_slice(2, 2, &[0.5, 0.0, 0.0, 1.0]);
    assert_matrix_eq!(to_dmatrix(&jit), expected_jit, comp = abs, tol = 1e-14);
}

#[test]
fn jacobian_transposed_is_transpose() {
    let mapping = generic_quad();
    let x = [0.3, 0.8];
    assert_eq!(mapping.jacobian_transposed(&x), mapping.jacobian(&x).transpose());
}

#[test]
fn parallelogram_is_affine_but_generic_quad_is_not() {
    let corners = points::<U2, 2>(&[[0.0, 0.0], [2.0, 0.0], [1.0, 1.0], [3.0, 1.0]]);
    let parallelogram = Mapping::new(Topology::quadrilateral(), &corners).unwrap();
    assert!(parallelogram.affine());
    assert!(!parallelogram.constant());
    assert_scalar_eq!(parallelogram.volume(), 2.0, comp = abs, tol = 1e-14);

    let quad = generic_quad();
    assert!(!quad.affine());
    assert_scalar_eq!(quad.volume(), 3.5, comp = abs, tol = 1e-13);
    // The Jacobian of a bilinear map varies over the element
    assert_ne!(quad.jacobian(&[0.0, 0.0]), quad.jacobian(&[1.0, 1.0]));
}

#[test]
fn declared_affine_mapping_uses_constant_jacobian() {
    let corners = points::<U2, 2>(&[[0.0, 0.0], [2.0, 0.0], [0.0, 1.0], [3.0, 2.0]]);
    let mapping = Mapping::new_declared_affine(Topology::quadrilateral(), &corners).unwrap();
    assert!(mapping.affine());
    assert!(mapping.generic().declared_affine());
    assert_eq!(mapping.jacobian(&[0.0, 0.0]), mapping.jacobian(&[1.0, 1.0]));
}

#[test]
fn volumes_of_three_dimensional_elements() {
    let reference_tet = points::<U3, 3>(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    let tet = Mapping::new(Topology::tetrahedron(), &reference_tet).unwrap();
    assert_scalar_eq!(tet.volume(), 1.0 / 6.0, comp = abs, tol = 1e-14);

    let box_corners: Vec<_> = (0..8)
        .map(|c| [2.0 * (c & 1) as f64, ((c >> 1) & 1) as f64, 3.0 * ((c >> 2) & 1) as f64])
        .collect();
    let cuboid = Mapping::new(Topology::hexahedron(), &points::<U3, 3>(&box_corners)).unwrap();
    assert!(cuboid.affine());
    assert_scalar_eq!(cuboid.volume(), 6.0, comp = abs, tol = 1e-13);

    // The top face is raised at a single corner, the volume is the mean height
    let heights = [1.0, 1.0, 1.0, 2.0];
    let raised_corners: Vec<_> = (0..8)
        .map(|c| {
            let (i, j, k) = (c & 1, (c >> 1) & 1, (c >> 2) & 1);
            [i as f64, j as f64, k as f64 * heights[i + 2 * j]]
        })
        .collect();
    let raised = Mapping::new(Topology::hexahedron(), &points::<U3, 3>(&raised_corners)).unwrap();
    assert!(!raised.affine());
    assert_scalar_eq!(raised.volume(), 1.25, comp = abs, tol = 1e-13);

    let pyramid = generic_pyramid();
    assert!(!pyramid.affine());
    assert_scalar_eq!(pyramid.volume(), 1.25 / 3.0, comp = abs, tol = 1e-13);
    assert_scalar_eq!(pyramid.volume_with_points(6), 1.25 / 3.0, comp = abs, tol = 1e-13);

    let prism_corners = points::<U3, 3>(&[
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 2.0],
        [1.0, 0.0, 2.0],
        [0.0, 1.0, 2.0],
    ]);
    let prism = Mapping::new(Topology::triangular_prism(), &prism_corners).unwrap();
    assert!(prism.affine());
    assert_scalar_eq!(prism.volume(), 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn triangle_embedded_in_space() {
    let corners = points::<U3, 3>(&[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
    let mapping = Mapping::new(Topology::triangle(), &corners).unwrap();
    assert_eq!(mapping.world_dimension(), 3);
    assert_scalar_eq!(mapping.integration_element(&[0.1, 0.1]), 1.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(mapping.volume(), 0.5, comp = abs, tol = 1e-14);
    assert_eq!(
        mapping.jacobian_determinant(&[0.1, 0.1]),
        Err(MappingError::DimensionMismatch { expected: 3, actual: 2 })
    );
    // Normals stay in the plane of the element
    let normal = mapping.unit_outer_normal(0, &[0.5, 0.0]).unwrap();
    assert_approx_matrix_eq!(normal, Vector3::new(0.0, -1.0, 0.0), abstol = 1e-14);
}

#[test]
fn degenerate_mappings() {
    let origin = points::<U2, 2>(&[[0.0, 0.0], [0.0, 0.0], [0.0, 0.0]]);
    let zero = Mapping::new(Topology::triangle(), &origin).unwrap();
    assert_eq!(
        zero.flags(),
        MappingFlags {
            affine: true,
            constant: true,
            zero: true
        }
    );
    assert_eq!(zero.integration_element(&[0.2, 0.2]), 0.0);
    assert_eq!(zero.volume(), 0.0);
    assert_eq!(
        zero.jacobian_inverse_transposed(&[0.2, 0.2]),
        Err(MappingError::SingularJacobian)
    );
    assert_eq!(zero.normal(0, &[0.5, 0.0]), Err(MappingError::SingularJacobian));

    let collapsed = points::<U2, 2>(&[[1.0, 2.0], [1.0, 2.0], [1.0, 2.0], [1.0, 2.0]]);
    let constant = Mapping::new(Topology::quadrilateral(), &collapsed).unwrap();
    assert!(constant.affine());
    assert!(constant.constant());
    assert!(!constant.zero());
    assert_approx_matrix_eq!(constant.position(&[0.3, 0.9]).coords, Vector2::new(1.0, 2.0), abstol = 1e-14);

    let point = Mapping::new(Topology::point(), &points::<U3, 3>(&[[1.0, 2.0, 3.0]])).unwrap();
    assert!(point.constant() && !point.zero());
    assert_eq!(point.integration_element(&[]), 1.0);
    assert_eq!(point.volume(), 1.0);
    assert_eq!(point.position(&[]), point.corners()[0]);
}

#[test]
fn coincident_corners() {
    let segment = Mapping::new(
        Topology::segment(),
        &points::<U2, 2>(&[[1.0, 1.0], [1.0, 1.0]]),
    )
    .unwrap();
    assert!(segment.constant() && !segment.zero());
    assert_eq!(segment.integration_element(&[0.3]), 0.0);

    // Corners 1 and 3 coincide, which collapses the edge x = 1
    let corners = points::<U2, 2>(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 0.0]]);
    let quad = Mapping::new(Topology::quadrilateral(), &corners).unwrap();
    assert!(!quad.affine() && !quad.constant());
    assert_eq!(quad.integration_element(&[1.0, 0.4]), 0.0);
    assert!(quad.integration_element(&[0.5, 0.4]) > 0.0);
}

#[test]
fn unit_right_triangle() {
    let corners = points::<U2, 2>(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
    let triangle = Mapping::new(Topology::triangle(), &corners).unwrap();
    assert!(triangle.affine());
    assert_approx_matrix_eq!(triangle.position(&[0.5, 0.5]).coords, Vector2::new(0.5, 0.5), abstol = 1e-15);
    for x in [[0.0, 0.0], [0.25, 0.5], [1.0, 0.0]] {
        assert_eq!(triangle.integration_element(&x), 1.0);
    }
}

#[test]
fn invalid_construction_is_reported() {
    let two_corners = points::<U2, 2>(&[[0.0, 0.0], [1.0, 0.0]]);
    assert_eq!(
        Mapping::new(Topology::triangle(), &two_corners).unwrap_err(),
        MappingError::WrongCornerCount { expected: 3, actual: 2 }
    );
    let four_corners = points::<U2, 2>(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]);
    assert_eq!(
        Mapping::new(Topology::tetrahedron(), &four_corners).unwrap_err(),
        MappingError::TopologyExceedsWorld {
            dimension: 3,
            world_dimension: 2
        }
    );
}

#[test]
fn checked_position_validates_local_coordinate() {
    let mapping = unit_square_scaled(2.0);
    assert_approx_matrix_eq!(
        mapping.checked_position(&[0.5, 1.0], 1e-12).unwrap().coords,
        Vector2::new(1.0, 2.0),
        abstol = 1e-14
    );
    assert_eq!(
        mapping.checked_position(&[0.5, 1.1], 1e-12),
        Err(MappingError::OutsideReferenceDomain)
    );
    assert_eq!(
        mapping.checked_position(&[0.5], 1e-12),
        Err(MappingError::DimensionMismatch { expected: 2, actual: 1 })
    );
}

#[test]
fn evaluation_with_wrong_dimension_panics() {
    assert_panics!(generic_quad().position(&[0.5]));
    assert_panics!(generic_quad().jacobian(&[0.5, 0.5, 0.5]));
    assert_panics!(generic_quad().integration_element(&[]));
    assert_panics!(generic_quad().generic().position(&[0.5]));
    // Affine mappings answer from the cache, but still check the local coordinate
    assert_panics!(unit_square_scaled(1.0).jacobian(&[0.5]));
}

#[test]
fn normals_of_square() {
    let mapping = unit_square_scaled(2.0);
    let x = [1.0, 0.5];
    assert_approx_matrix_eq!(mapping.normal(1, &x).unwrap(), Vector2::new(0.5, 0.0), abstol = 1e-14);
    assert_approx_matrix_eq!(mapping.unit_outer_normal(1, &x).unwrap(), Vector2::new(1.0, 0.0), abstol = 1e-14);
    // Length equals the edge length for affine mappings
    assert_approx_matrix_eq!(
        mapping.integration_outer_normal(1, &x).unwrap(),
        Vector2::new(2.0, 0.0),
        abstol = 1e-14
    );
    assert_approx_matrix_eq!(
        mapping.unit_outer_normal(2, &[0.5, 0.0]).unwrap(),
        Vector2::new(0.0, -1.0),
        abstol = 1e-14
    );
    assert_eq!(
        mapping.normal(4, &x),
        Err(MappingError::InvalidFace { face: 4, num_faces: 4 })
    );
}

#[test]
fn integration_outer_normal_of_hypotenuse() {
    let corners = points::<U2, 2>(&[[0.0, 0.0], [2.0, 0.0], [0.0, 2.0]]);
    let triangle = Mapping::new(Topology::triangle(), &corners).unwrap();
    let normal = triangle.integration_outer_normal(2, &[0.5, 0.5]).unwrap();
    assert_approx_matrix_eq!(normal, Vector2::new(2.0, 2.0), abstol = 1e-14);
    assert_scalar_eq!(normal.norm(), 8.0f64.sqrt(), comp = abs, tol = 1e-14);
}

#[test]
fn integration_outer_normals_of_affine_element_sum_to_zero() {
    let corners = points::<U3, 3>(&[
        [0.0, 0.0, 0.0],
        [2.0, 0.1, 0.0],
        [0.3, 1.0, 0.2],
        [2.3, 1.1, 0.2],
        [0.4, 0.2, 1.5],
    ]);
    let pyramid = Mapping::new(Topology::pyramid(), &corners).unwrap();
    assert!(pyramid.affine());
    let x = pyramid.reference_element().barycenter().clone();
    let sum = (0..5)
        .map(|face| pyramid.integration_outer_normal(face, x.as_slice()).unwrap())
        .fold(Vector3::zeros(), |sum, n| sum + n);
    assert_approx_matrix_eq!(sum, Vector3::<f64>::zeros(), abstol = 1e-13);
}

#[test]
fn apex_of_non_affine_pyramid() {
    let pyramid = generic_pyramid();
    assert_approx_matrix_eq!(
        pyramid.position(&[0.0, 0.0, 1.0]).coords,
        Vector3::new(0.2, 0.3, 1.0),
        abstol = 1e-14
    );
    // At the apex the Jacobian is the limit along the edge from corner 0
    let j = pyramid.jacobian(&[0.0, 0.0, 1.0]);
    let j_below = pyramid.jacobian(&[0.0, 0.0, 1.0 - 1e-9]);
    assert!((j - j_below).amax() < 1e-6);
}

#[test]
fn subtract_add_and_displacement() {
    let quad = generic_quad();
    let translated_corners: Vec<_> = quad
        .corners()
        .iter()
        .map(|p| p + Vector2::new(1.0, -1.0))
        .collect();
    let translated = Mapping::new(Topology::quadrilateral(), &translated_corners).unwrap();

    let displacement = translated.displacement(&quad).unwrap();
    assert_eq!(
        displacement.flags(),
        MappingFlags {
            affine: true,
            constant: true,
            zero: false
        }
    );
    assert_approx_matrix_eq!(displacement.position(&[0.7, 0.2]).coords, Vector2::new(1.0, -1.0), abstol = 1e-14);

    let mut sum = quad.clone();
    sum.add(&displacement).unwrap();
    assert!(!sum.affine());
    assert_approx_matrix_eq!(
        sum.position(&[0.7, 0.2]).coords,
        translated.position(&[0.7, 0.2]).coords,
        abstol = 1e-14
    );
    assert_eq!(sum.corners(), translated.corners());

    let mut zero = quad.clone();
    zero.subtract(&quad).unwrap();
    assert!(zero.zero());
}

#[test]
fn subtract_discards_cached_jacobian() {
    let mut square = unit_square_scaled(2.0);
    let j = square.jacobian(&[0.5, 0.5]);
    assert_eq!(j[(0, 0)], 2.0);
    assert_eq!(square.integration_element(&[0.5, 0.5]), 4.0);

    let unit = unit_square_scaled(1.0);
    square.subtract(&unit).unwrap();
    assert!(square.affine());
    assert_eq!(square.jacobian(&[0.5, 0.5])[(0, 0)], 1.0);
    assert_eq!(square.integration_element(&[0.5, 0.5]), 1.0);
    assert_eq!(square.corner(3).unwrap().coords, Vector2::new(1.0, 1.0));
}

#[test]
fn updates_require_same_topology() {
    let mut quad = generic_quad();
    let triangle = Mapping::new(
        Topology::triangle(),
        &points::<U2, 2>(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
    )
    .unwrap();
    let other_quad = Mapping::new(
        Topology::prism(Topology::simplex(1)),
        &points::<U2, 2>(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]),
    )
    .unwrap();
    assert_eq!(quad.subtract(&triangle), Err(MappingError::TopologyMismatch));
    assert_eq!(quad.add(&other_quad), Err(MappingError::TopologyMismatch));
    assert!(quad.displacement(&triangle).is_err());
}

#[test]
fn concurrent_evaluation_matches_sequential() {
    let pyramid = generic_pyramid();
    let square = unit_square_scaled(3.0);
    let xs: Vec<[f64; 3]> = (0..64)
        .map(|i| {
            let t = (i % 8) as f64 / 10.0;
            let s = (i / 8) as f64 / 8.0 * (1.0 - t);
            [s, 0.5 * s, t]
        })
        .collect();

    let parallel: Vec<f64> = xs
        .par_iter()
        .map(|x| pyramid.integration_element(x) + square.integration_element(&x[..2]))
        .collect();
    let sequential: Vec<f64> = xs
        .iter()
        .map(|x| pyramid.integration_element(x) + square.integration_element(&x[..2]))
        .collect();
    assert_eq!(parallel, sequential);
}

#[test]
fn flags_and_settings_serialize() {
    let flags = MappingFlags {
        affine: true,
        constant: false,
        zero: false,
    };
    let json = serde_json::to_string(&flags).unwrap();
    assert_eq!(serde_json::from_str::<MappingFlags>(&json).unwrap(), flags);

    let settings: InverseSettings = serde_json::from_str(r#"{ "max_iterations": 5 }"#).unwrap();
    assert_eq!(settings.max_iterations, 5);
    assert_eq!(settings.tolerance, InverseSettings::default().tolerance);
    assert!(!settings.line_search);
}

proptest! {
    #[test]
    fn corners_are_reproduced(
        (topology, corners) in any_topology(3)
            .prop_flat_map(|topology| (Just(topology.clone()), perturbed_corners::<U3>(&topology, 0.2)))
    ) {
        let mapping = Mapping::new(topology, &corners).unwrap();
        let reference_corners = mapping.reference_element().corners().to_vec();
        for (x, corner) in reference_corners.iter().zip(&corners) {
            let position = mapping.position(x.as_slice());
            prop_assert!(max_abs_diff(position.coords.as_slice(), corner.coords.as_slice()) <= 1e-12);
        }
    }

    #[test]
    fn jacobian_agrees_with_finite_differences(
        (topology, corners, x) in any_topology(3).prop_flat_map(|topology| {
            (
                Just(topology.clone()),
                perturbed_corners::<U3>(&topology, 0.2),
                interior_reference_point(&topology),
            )
        })
    ) {
        let mapping = Mapping::new(topology, &corners).unwrap();
        let jacobian = to_dmatrix(&mapping.jacobian(&x));
        let fd = fd_jacobian(&mapping, &x, 1e-6);
        prop_assert_eq!(jacobian.shape(), fd.shape());
        prop_assert!(max_abs_diff(jacobian.as_slice(), fd.as_slice()) <= 1e-6);

        let generic = to_dmatrix(&mapping.generic().jacobian(&x));
        prop_assert!(max_abs_diff(generic.as_slice(), fd.as_slice()) <= 1e-6);
    }

    #[test]
    fn affine_volume_shortcut_matches_quadrature(
        topology in any_topology(3).prop_filter("needs a volume", |topology| topology.dimension() > 0),
        distortion in prop::collection::vec(-0.3..0.3, 9),
        offset in prop::collection::vec(-5.0..5.0, 3)
    ) {
        // The image of the reference element under x -> A x + b, with A diagonally dominant
        let a = Matrix3::identity() + Matrix3::from_column_slice(&distortion);
        let b = Vector3::from_column_slice(&offset);
        let corners: Vec<Point3<f64>> = embedded_reference_corners(&topology)
            .into_iter()
            .map(|x| Point3::from(a * x + b))
            .collect();

        let mapping = Mapping::new(topology.clone(), &corners).unwrap();
        prop_assert!(mapping.affine());
        // Evaluate the recursive engine pointwise, bypassing the cached affine Jacobian
        let quadrature_volume = QuadratureRule::<f64>::for_topology(&topology, 3)
            .integrate(|x| integration_element(&mapping.generic().jacobian(x)));
        prop_assert!((mapping.volume() - quadrature_volume).abs() <= 1e-10);

        let declared = Mapping::new_declared_affine(topology.clone(), &corners).unwrap();
        prop_assert!((declared.volume() - quadrature_volume).abs() <= 1e-10);

        if topology.dimension() == 3 {
            let reference_volume = mapping.reference_element().volume();
            prop_assert!((mapping.volume() - a.determinant().abs() * reference_volume).abs() <= 1e-10);
        }
    }
}

/// Reference corners of the topology, embedded in 3D.
fn embedded_reference_corners(topology: &Topology) -> Vec<Vector3<f64>> {
    ReferenceElement::<f64>::new(topology)
        .corners()
        .iter()
        .map(|corner| {
            let mut x = Vector3::zeros();
            x.rows_mut(0, corner.len()).copy_from(corner);
            x
        })
        .collect()
}

#[test]
fn finite_difference_error_shrinks_with_step() {
    let steps = [1e-1, 1e-2, 1e-3, 1e-4];
    let error = |mapping: &Mapping<f64, U3>, x: &[f64], h: f64| {
        let jacobian = to_dmatrix(&mapping.jacobian(x));
        max_abs_diff(jacobian.as_slice(), fd_jacobian(mapping, x, h).as_slice())
    };

    // The pyramid over a non-parallelogram base is rational in the height, so central
    // differences converge quadratically
    let pyramid = generic_pyramid();
    assert!(!pyramid.affine());
    let x = [0.2, 0.15, 0.6];
    let errors: Vec<f64> = steps.iter().map(|&h| error(&pyramid, &x, h)).collect();
    assert!(errors[0] > 1e-6, "errors: {:?}", errors);
    for pair in errors.windows(2) {
        // Quadratic convergence gains a factor 100 per decade
        assert!(pair[1] < pair[0] / 30.0, "errors: {:?}", errors);
    }

    // A distorted hexahedron is linear along each reference axis, so central differences are
    // exact up to rounding for every step
    let hexahedron = distorted_hexahedron();
    assert!(!hexahedron.affine());
    let x = [0.3, 0.6, 0.45];
    for &h in &steps {
        assert!(error(&hexahedron, &x, h) <= 1e-10);
    }
}

fn distorted_hexahedron() -> Mapping<f64, U3> {
    let corners = points::<U3, 3>(&[
        [0.0, 0.0, 0.0],
        [1.1, 0.0, 0.1],
        [0.0, 0.9, 0.0],
        [1.2, 1.1, 0.2],
        [0.1, 0.0, 1.0],
        [1.0, 0.1, 1.2],
        [0.0, 1.0, 0.9],
        [1.3, 1.2, 1.1],
    ]);
    Mapping::new(Topology::hexahedron(), &corners).unwrap()
}

macro_rules! fast_path_agrees_with_generic {
    ($name:ident, $topology:expr) => {
        paste! {
            proptest! {
                #[test]
                fn [<fast_path_agrees_with_generic_ $name>](
                    (corners, x) in (perturbed_corners::<U3>(&$topology, 0.3), reference_point(&$topology))
                ) {
                    let mapping = Mapping::new($topology, &corners).unwrap();
                    let generic = mapping.generic();
                    let position = mapping.position(&x);
                    let generic_position = generic.position(&x);
                    prop_assert!(max_abs_diff(position.coords.as_slice(), generic_position.as_slice()) <= 1e-12);

                    let jacobian = mapping.jacobian(&x);
                    let generic_jacobian = generic.jacobian(&x);
                    prop_assert!(max_abs_diff(jacobian.as_slice(), generic_jacobian.as_slice()) <= 1e-12);
                }
            }
        }
    };
}

fast_path_agrees_with_generic!(segment_from_cone, Topology::simplex(1));
fast_path_agrees_with_generic!(segment_from_prism, Topology::cube(1));
fast_path_agrees_with_generic!(triangle, Topology::triangle());
fast_path_agrees_with_generic!(quadrilateral, Topology::quadrilateral());
fast_path_agrees_with_generic!(tetrahedron, Topology::tetrahedron());
fast_path_agrees_with_generic!(hexahedron, Topology::hexahedron());
