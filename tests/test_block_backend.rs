//! Tests for the ndarray block backend against naive reference computations.

use approx::assert_relative_eq;
use itertools::Itertools;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ SeedableRng, rngs::StdRng };
use tensor_backends::{
    backend::BackendError,
    prelude::*,
};

fn rng() -> StdRng { StdRng::seed_from_u64(10546) }

fn real_array(block: &NdBlock) -> &nd::ArrayD<f64> {
    match block {
        NdBlock::F64(a) => a,
        other => panic!("expected a double-precision real block; got {:?}", other.nd_dtype()),
    }
}

fn complex_array(block: &NdBlock) -> &nd::ArrayD<C64> {
    match block {
        NdBlock::C64(a) => a,
        other => panic!("expected a double-precision complex block; got {:?}", other.nd_dtype()),
    }
}

fn random_real(b: &NdarrayBlockBackend, dims: &[usize], rng: &mut StdRng) -> NdBlock {
    b.block_random_gaussian(dims, Dtype::FLOAT64, 1.0, rng).unwrap()
}

#[test]
fn tdot_matches_reference() {
    let b = NdarrayBlockBackend::default();
    let mut rng = rng();
    let x = random_real(&b, &[7, 13, 22], &mut rng);
    let y = random_real(&b, &[13, 22, 11], &mut rng);
    let z = b.block_tdot(&x, &y, &[1, 2], &[0, 1]).unwrap();
    assert_eq!(b.block_shape(&z), vec![7, 11]);

    let (xa, ya, za) = (real_array(&x), real_array(&y), real_array(&z));
    for idx in [0..7, 0..11].into_iter().multi_cartesian_product() {
        let (i, l) = (idx[0], idx[1]);
        let expected: f64
            = [0..13, 0..22].into_iter().multi_cartesian_product()
            .map(|jk| xa[[i, jk[0], jk[1]]] * ya[[jk[0], jk[1], l]])
            .sum();
        assert_relative_eq!(za[[i, l]], expected, epsilon = 1e-10);
    }
}

#[test]
fn full_contraction_gives_scalar() {
    let b = NdarrayBlockBackend::default();
    let mut rng = rng();
    let x = random_real(&b, &[3, 4], &mut rng);
    let y = random_real(&b, &[3, 4], &mut rng);
    let z = b.block_tdot(&x, &y, &[0, 1], &[0, 1]).unwrap();
    assert!(b.block_shape(&z).is_empty());
    let expected: f64
        = real_array(&x).iter().zip(real_array(&y).iter())
        .map(|(p, q)| p * q)
        .sum();
    let item = b.block_item(&z).unwrap();
    assert!(item.is_real());
    assert_relative_eq!(item.re(), expected, epsilon = 1e-12);
}

#[test]
fn tdot_rank_and_axis_errors() {
    let b = NdarrayBlockBackend::default();
    let x = b.zero_block(&[2, 3, 4], Dtype::FLOAT64).unwrap();
    let y = b.zero_block(&[4, 3, 5], Dtype::COMPLEX128).unwrap();
    let z = b.block_tdot(&x, &y, &[1, 2], &[1, 0]).unwrap();
    assert_eq!(b.block_shape(&z), vec![2, 5]);
    assert_eq!(b.block_dtype(&z), Dtype::COMPLEX128);

    let outer = b.block_outer(&x, &y).unwrap();
    assert_eq!(b.block_shape(&outer), vec![2, 3, 4, 4, 3, 5]);

    assert!(matches!(
        b.block_tdot(&x, &y, &[1, 2], &[0, 1]),
        Err(BackendError::ShapeMismatch { .. }),
    ));
    assert!(matches!(
        b.block_tdot(&x, &y, &[1, 1], &[1, 0]),
        Err(BackendError::InvalidAxes { .. }),
    ));
    assert!(matches!(
        b.block_tdot(&x, &y, &[1, 2], &[1]),
        Err(BackendError::InvalidAxes { .. }),
    ));
}

#[test]
fn trace_matches_reference() {
    let b = NdarrayBlockBackend::default();
    let mut rng = rng();
    let x = random_real(&b, &[7, 7, 7], &mut rng);
    let t = b.block_trace(&x, &[0], &[1]).unwrap();
    assert_eq!(b.block_shape(&t), vec![7]);
    let (xa, ta) = (real_array(&x), real_array(&t));
    for k in 0..7 {
        let expected: f64 = (0..7).map(|i| xa[[i, i, k]]).sum();
        assert_relative_eq!(ta[[k]], expected, epsilon = 1e-12);
    }
    let full = b.block_trace(&t, &[], &[]).unwrap();
    assert_eq!(full, t);
}

#[test]
fn combine_then_split_restores_block() {
    let b = NdarrayBlockBackend::default();
    let mut rng = rng();
    let x = random_real(&b, &[2, 4, 7, 5], &mut rng);

    let c = b.block_combine_legs(&x, &[1, 2]).unwrap();
    assert_eq!(b.block_shape(&c), vec![2, 28, 5]);
    assert_eq!(b.block_split_leg(&c, 1, &[4, 7]).unwrap(), x);

    // the fused leg sits where the first combined leg was
    let c = b.block_combine_legs(&x, &[1, 3]).unwrap();
    assert_eq!(b.block_shape(&c), vec![2, 20, 7]);
    let split = b.block_split_leg(&c, 1, &[4, 5]).unwrap();
    assert_eq!(split, b.block_transpose(&x, &[0, 1, 3, 2]).unwrap());

    assert!(matches!(
        b.block_split_leg(&c, 1, &[3, 7]),
        Err(BackendError::InvalidSplit { leg: 1, .. }),
    ));
    assert!(b.block_combine_legs(&x, &[]).is_err());
}

#[test]
fn matrixify_round_trip() {
    let b = NdarrayBlockBackend::default();
    let mut rng = rng();
    let x = random_real(&b, &[2, 3, 4], &mut rng);
    let (m, aux) = b.block_matrixify(&x, &[2, 0], &[1]).unwrap();
    assert_eq!(b.block_shape(&m), vec![8, 3]);
    assert_eq!(b.block_dematrixify(&m, &aux).unwrap(), x);
    assert!(b.block_matrixify(&x, &[0, 1], &[]).is_err());
    assert!(b.block_matrixify(&x, &[0], &[1]).is_err());
}

fn check_svd(b: &NdarrayBlockBackend, a: &NdBlock, algorithm: &str) {
    let shape = b.block_shape(a);
    let k = shape[0].min(shape[1]);
    let (u, s, vh) = b.matrix_svd(a, Some(algorithm)).unwrap();
    assert_eq!(b.block_shape(&u), vec![shape[0], k]);
    assert_eq!(b.block_shape(&s), vec![k]);
    assert_eq!(b.block_shape(&vh), vec![k, shape[1]]);
    assert!(b.block_is_real(&s));

    let svals = b.block_real_entries(&s).unwrap();
    assert!(svals.iter().all(|sv| *sv >= 0.0));
    assert!(svals.iter().tuple_windows().all(|(s1, s2)| s1 >= s2));

    let us = b.block_tdot(&u, &b.block_from_diagonal(&s).unwrap(), &[1], &[0]).unwrap();
    let rec = b.block_tdot(&us, &vh, &[1], &[0]).unwrap();
    assert!(b.block_allclose(&rec, a, 1e-10, 1e-10).unwrap());
}

#[test]
fn svd_reconstructs_matrix() {
    let b = NdarrayBlockBackend::default();
    let mut rng = rng();
    let real = random_real(&b, &[5, 3], &mut rng);
    let cplx = b.block_random_gaussian(&[3, 4], Dtype::COMPLEX128, 1.0, &mut rng).unwrap();
    for algorithm in NdarrayBlockBackend::SVD_ALGORITHMS {
        check_svd(&b, &real, algorithm);
        check_svd(&b, &cplx, algorithm);
    }
    assert!(matches!(
        b.matrix_svd(&real, Some("jacobi")),
        Err(BackendError::UnknownSvdAlgorithm(alg, _)) if alg == "jacobi",
    ));
    let x = random_real(&b, &[2, 2, 2], &mut rng);
    assert!(matches!(b.matrix_svd(&x, None), Err(BackendError::NotAMatrix(3))));
}

#[test]
fn inner_is_conjugate_linear_in_first_argument() {
    let b = NdarrayBlockBackend::default();
    let mut rng = rng();
    let x = b.block_random_gaussian(&[3, 5], Dtype::COMPLEX128, 1.0, &mut rng).unwrap();
    let y = b.block_random_gaussian(&[3, 5], Dtype::COMPLEX128, 1.0, &mut rng).unwrap();
    let c = C64::new(0.3, -1.2);

    let xy = b.block_inner(&x, &y).unwrap();
    let expected: C64
        = complex_array(&x).iter().zip(complex_array(&y).iter())
        .map(|(p, q)| p.conj() * q)
        .sum();
    assert_relative_eq!(xy.re, expected.re, epsilon = 1e-12);
    assert_relative_eq!(xy.im, expected.im, epsilon = 1e-12);

    let cx_y = b.block_inner(&b.block_mul(c.into(), &x), &y).unwrap();
    let x_cy = b.block_inner(&x, &b.block_mul(c.into(), &y)).unwrap();
    let lhs = c.conj() * xy;
    let rhs = c * xy;
    assert_relative_eq!(cx_y.re, lhs.re, epsilon = 1e-12);
    assert_relative_eq!(cx_y.im, lhs.im, epsilon = 1e-12);
    assert_relative_eq!(x_cy.re, rhs.re, epsilon = 1e-12);
    assert_relative_eq!(x_cy.im, rhs.im, epsilon = 1e-12);

    let xx = b.block_inner(&x, &x).unwrap();
    assert_relative_eq!(xx.re, b.block_norm(&x).powi(2), epsilon = 1e-10);
    assert_relative_eq!(xx.im, 0.0, epsilon = 1e-12);
}

#[test]
fn conj_and_realness() {
    let b = NdarrayBlockBackend::default();
    let x: NdBlock = nd::array![C64::new(1.0, 2.0), C64::new(-3.0, 0.5)].into();
    let y = b.block_conj(&x);
    assert_eq!(y, NdBlock::from(nd::array![C64::new(1.0, -2.0), C64::new(-3.0, -0.5)]));
    assert!(!b.block_is_real(&x));
    // complex storage is never reported as real, even with zero imaginary parts
    let z: NdBlock = nd::array![C64::new(1.0, 0.0)].into();
    assert!(!b.block_is_real(&z));
    let r: NdBlock = nd::array![1.0_f64, 2.0].into();
    assert!(b.block_is_real(&r));
    assert_eq!(b.block_conj(&r), r);
}

#[test]
fn squeeze_and_norm() {
    let b = NdarrayBlockBackend::default();
    let x: NdBlock = nd::array![[[3.0_f64], [4.0]]].into();
    assert_eq!(b.block_shape(&x), vec![1, 2, 1]);
    let y = b.block_squeeze_legs(&x, &[0, 2]).unwrap();
    assert_eq!(y, NdBlock::from(nd::array![3.0_f64, 4.0]));
    assert_relative_eq!(b.block_norm(&y), 5.0);
    assert!(b.block_squeeze_legs(&x, &[1]).is_err());
    assert!(matches!(b.block_item(&y), Err(BackendError::NotScalar(2))));
}

#[test]
fn parsing_nested_and_flat_input() {
    let b = NdarrayBlockBackend::default();
    let nested = Nested::from(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    let block = b.parse_block(nested.into(), None).unwrap();
    assert_eq!(block, NdBlock::from(nd::array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]));

    let nested = Nested::from(vec![C64::new(0.0, 1.0), C64::new(1.0, 0.0)]);
    let block = b.parse_block(nested.into(), Some(Dtype::COMPLEX64)).unwrap();
    assert_eq!(b.block_dtype(&block), Dtype::COMPLEX64);

    let ragged = Nested::from(vec![vec![1.0, 2.0], vec![3.0]]);
    assert!(matches!(
        b.parse_block(ragged.into(), None),
        Err(BackendError::Type(_)),
    ));
    let nested = Nested::from(vec![1.0, 2.0]);
    assert!(matches!(
        b.parse_block(nested.into(), Some(Dtype::new(Precision::Half, true))),
        Err(BackendError::UnsupportedDtype(..)),
    ));
}

#[test]
fn identity_and_zero_blocks() {
    let b = NdarrayBlockBackend::default();
    let eye = b.eye_block(&[2, 3], Dtype::FLOAT64).unwrap();
    assert_eq!(b.block_shape(&eye), vec![2, 3, 2, 3]);
    let ea = real_array(&eye);
    for idx in [0..2, 0..3, 0..2, 0..3].into_iter().multi_cartesian_product() {
        let expected = if idx[0] == idx[2] && idx[1] == idx[3] { 1.0 } else { 0.0 };
        assert_eq!(ea[idx.as_slice()], expected);
    }
    let zero = b.zero_block(&[4, 0], Dtype::COMPLEX64).unwrap();
    assert_eq!(b.block_shape(&zero), vec![4, 0]);
    assert_relative_eq!(b.block_norm(&zero), 0.0);
}
