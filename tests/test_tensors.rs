//! Tests for labeled tensors on the default backend.

use approx::assert_relative_eq;
use num_complex::Complex64 as C64;
use rand::{ SeedableRng, rngs::StdRng };
use tensor_backends::{
    backend::BackendError,
    prelude::*,
    tensor::SvdTensors,
};

fn rng() -> StdRng { StdRng::seed_from_u64(10546) }

fn spaces(dims: &[usize]) -> Vec<VectorSpace> {
    dims.iter().map(|d| VectorSpace::non_symmetric(*d)).collect()
}

fn random_tensor(dims: &[usize], labels: &[&str], rng: &mut StdRng) -> Tensor {
    Tensor::random_gaussian(default_backend(), spaces(dims), Dtype::FLOAT64, 1.0, rng)
        .unwrap()
        .with_labels(labels.iter().copied())
        .unwrap()
}

fn square_matrix(rows: Vec<Vec<f64>>, labels: [&str; 2]) -> Tensor {
    let v = VectorSpace::non_symmetric(rows.len());
    Tensor::from_dense_block(
        Nested::from(rows), default_backend(), Some(vec![v.clone(), v.dual()]), None)
        .unwrap()
        .with_labels(labels)
        .unwrap()
}

#[test]
fn construction_and_labels() {
    let t = Tensor::from_nested(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]], default_backend())
        .unwrap();
    assert_eq!(t.shape(), vec![2, 3]);
    assert_eq!(t.rank(), 2);
    assert_eq!(t.size(), 6);
    assert_eq!(t.num_parameters(), 6);
    assert_eq!(t.dtype(), Dtype::FLOAT64);
    assert!(t.is_real());
    assert!(!t.is_fully_labelled());
    t.check_sanity().unwrap();

    let t = t.with_labels(["a", "b"]).unwrap();
    assert!(t.labels_are(["b", "a"]));
    assert!(t.has_labels(["a"]));
    assert!(!t.has_label("c"));

    assert!(matches!(
        t.clone().with_labels(["a", "a"]),
        Err(TensorError::DuplicateLabel(l)) if l == "a",
    ));
    assert!(matches!(
        t.clone().with_labels(["a"]),
        Err(TensorError::LabelCount { expected: 2, got: 1 }),
    ));
    let partial = t.clone().with_labels([Some("a"), None]).unwrap();
    assert!(!partial.is_fully_labelled());

    let legs = spaces(&[3, 2]);
    let res = Tensor::new(t.data().clone(), default_backend(), Some(legs), None);
    assert!(matches!(res, Err(TensorError::Backend(BackendError::IncompatibleLegs(_)))));
}

#[test]
fn leg_lookup() {
    let mut rng = rng();
    let t = random_tensor(&[2, 3, 4], &["a", "b", "c"], &mut rng);
    assert_eq!(t.get_leg_idx("b").unwrap(), 1);
    assert_eq!(t.get_leg_idx(-1).unwrap(), 2);
    assert_eq!(t.get_leg_idx(-3).unwrap(), 0);
    assert_eq!(t.get_leg_idcs(["c", "a"]).unwrap(), vec![2, 0]);
    assert!(matches!(t.get_leg_idx("z"), Err(TensorError::NoSuchLeg(LegRef::Label(_)))));
    assert!(matches!(t.get_leg_idx(3), Err(TensorError::NoSuchLeg(LegRef::Pos(3)))));
    assert!(matches!(t.get_leg_idx(-4), Err(TensorError::NoSuchLeg(_))));
}

#[test]
fn conj_dualizes_legs_and_labels() {
    let t = Tensor::from_nested(
        vec![vec![C64::new(1.0, 1.0), C64::new(0.0, -2.0)]], default_backend())
        .unwrap()
        .with_labels(["a", "b*"])
        .unwrap();
    let c = t.conj();
    assert!(c.labels_are(["a*", "b"]));
    assert!(c.legs().iter().zip(t.legs()).all(|(l1, l2)| l1.is_dual_of(l2)));
    let expected
        = Tensor::from_nested(
            vec![vec![C64::new(1.0, -1.0), C64::new(0.0, 2.0)]], default_backend())
        .unwrap();
    assert_eq!(c.to_dense_block().unwrap(), expected.to_dense_block().unwrap());

    let cc = c.conj();
    assert_eq!(cc.labels(), t.labels());
    assert_eq!(cc.legs(), t.legs());
}

#[test]
fn contraction_requires_dual_legs() {
    let mut rng = rng();
    let t = random_tensor(&[2, 3], &["a", "b"], &mut rng);
    assert!(matches!(
        t.tdot(&t, ["b"], ["b"]),
        Err(TensorError::Backend(BackendError::IncompatibleLegs(_))),
    ));
    let rho = t.tdot(&t.conj(), ["b"], ["b*"]).unwrap();
    assert_eq!(rho.shape(), vec![2, 2]);
    assert!(rho.labels_are(["a", "a*"]));
    assert_relative_eq!(rho.trace_last().unwrap().item().unwrap().re(), t.norm().powi(2), epsilon = 1e-12);

    let full = t.tdot(&t.conj(), ["a", "b"], ["a*", "b*"]).unwrap();
    assert_eq!(full.rank(), 0);
    assert_relative_eq!(full.item().unwrap().re(), t.norm().powi(2), epsilon = 1e-12);

    let o = t.outer(&t.conj()).unwrap();
    assert_eq!(o.shape(), vec![2, 3, 2, 3]);
    assert!(o.labels_are(["a", "b", "a*", "b*"]));
    assert!(matches!(t.outer(&t), Err(TensorError::DuplicateLabel(_))));
}

#[test]
fn identity_map() {
    let eye = Tensor::eye(default_backend(), spaces(&[10, 4]), Dtype::FLOAT64)
        .unwrap()
        .with_labels(["p", "q", "p*", "q*"])
        .unwrap();
    assert_eq!(eye.shape(), vec![10, 4, 10, 4]);
    let tr = eye.trace(["p", "q"], ["p*", "q*"]).unwrap();
    assert_relative_eq!(tr.item().unwrap().re(), 40.0);

    let mut rng = rng();
    let t = random_tensor(&[10, 4], &["p", "q"], &mut rng);
    let same = eye.tdot(&t, ["p*", "q*"], ["p", "q"]).unwrap();
    assert!(same.allclose(&t, 1e-14, 1e-14).unwrap());
}

#[test]
fn transpose_and_trace() {
    let mut rng = rng();
    let t = random_tensor(&[2, 3, 4], &["a", "b", "c"], &mut rng);
    let tt = t.transpose(["c", "a", "b"]).unwrap();
    assert_eq!(tt.shape(), vec![4, 2, 3]);
    assert!(tt.labels_are(["a", "b", "c"]));
    assert_eq!(tt.labels()[0].as_deref(), Some("c"));
    assert!(tt.allclose(&t, 0.0, 0.0).unwrap());
    assert!(t.transpose([0, 1]).is_err());
    assert!(matches!(
        t.trace(["a"], ["b"]),
        Err(TensorError::Backend(BackendError::IncompatibleLegs(_))),
    ));
}

#[test]
fn combine_and_split_legs() {
    let mut rng = rng();
    let t = random_tensor(&[2, 3, 4, 5], &["a", "b", "c", "d"], &mut rng);
    let fused = t.combine_legs(["b", "d"]).unwrap();
    assert_eq!(fused.shape(), vec![2, 15, 4]);
    assert_eq!(fused.labels()[1].as_deref(), Some("(b.d)"));
    assert!(fused.legs()[1].is_product());

    let conj = fused.conj();
    assert_eq!(conj.labels()[1].as_deref(), Some("(b*.d*)"));

    let split = fused.split_leg("(b.d)").unwrap();
    assert_eq!(split.shape(), vec![2, 3, 5, 4]);
    assert_eq!(
        split.labels(),
        &["a", "b", "d", "c"].map(|l| Some(l.to_string())),
    );
    assert!(split.allclose(&t, 0.0, 0.0).unwrap());

    let unlabeled = t.clone().with_labels([Some("a"), None, Some("c"), None]).unwrap();
    let fused = unlabeled.combine_legs([0, 1]).unwrap();
    assert_eq!(fused.labels()[0].as_deref(), Some("(a.?1)"));
    let split = fused.split_leg(0).unwrap();
    assert_eq!(split.labels(), unlabeled.labels());

    assert!(matches!(
        t.split_leg("a"),
        Err(TensorError::Backend(BackendError::InvalidSplit { leg: 0, .. })),
    ));
}

#[test]
fn squeezing() {
    let t = Tensor::zero(default_backend(), spaces(&[1, 3, 1]), Dtype::COMPLEX128)
        .unwrap()
        .with_labels(["a", "b", "c"])
        .unwrap();
    let s = t.squeeze_all().unwrap();
    assert_eq!(s.shape(), vec![3]);
    assert!(s.labels_are(["b"]));
    assert_eq!(t.squeeze_legs(["c"]).unwrap().shape(), vec![1, 3]);
    assert!(matches!(t.squeeze_legs(["b"]), Err(TensorError::NotSqueezable(1, 3))));
    assert!(!s.is_scalar());
    assert!(t.squeeze_legs(["a", "c"]).unwrap().item().is_err());
}

#[test]
fn inner_matches_legs_by_label() {
    let mut rng = rng();
    let t = random_tensor(&[2, 3], &["a", "b"], &mut rng);
    let tt = t.transpose(["b", "a"]).unwrap();
    let ip = t.inner(&tt).unwrap();
    assert_relative_eq!(ip.re, t.norm().powi(2), epsilon = 1e-12);
    assert_relative_eq!(ip.im, 0.0);

    let unlabeled = tt.clone().with_labels([None::<&str>, None]).unwrap();
    assert!(matches!(
        t.inner(&unlabeled),
        Err(TensorError::Backend(BackendError::IncompatibleLegs(_))),
    ));
    let other = t.clone().with_labels(["a", "c"]).unwrap();
    assert!(matches!(t.inner(&other), Err(TensorError::NoSuchLeg(_))));
}

#[test]
fn linear_combinations() {
    let mut rng = rng();
    let t = random_tensor(&[3, 4], &["a", "b"], &mut rng);
    let twice = t.add(&t).unwrap();
    assert!(twice.allclose(&(2.0 * &t), 1e-14, 1e-14).unwrap());
    assert!(twice.allclose(&(&t * 2.0), 1e-14, 1e-14).unwrap());
    assert!((&twice / 2.0).allclose(&t, 1e-14, 1e-14).unwrap());
    assert_relative_eq!(t.sub(&t).unwrap().norm(), 0.0);
    assert_relative_eq!(t.add(&-&t).unwrap().norm(), 0.0);

    let z = t.scale(C64::new(0.0, 1.0));
    assert!(!z.is_real());
    assert_relative_eq!(z.norm(), t.norm(), epsilon = 1e-12);
    let ip = t.inner(&z).unwrap();
    assert_relative_eq!(ip.im, t.norm().powi(2), epsilon = 1e-12);
}

#[test]
fn dtype_conversion() {
    let mut rng = rng();
    let t = random_tensor(&[2, 2], &["a", "b"], &mut rng);
    let c = t.to_dtype(Dtype::COMPLEX64).unwrap();
    assert_eq!(c.dtype(), Dtype::COMPLEX64);
    assert!(!c.is_real());
    assert!(c.legs().iter().all(|leg| !leg.is_real()));
    let r = c.to_dtype(Dtype::FLOAT64).unwrap();
    assert!(r.is_real());
    assert!(r.allclose(&t, 1e-6, 1e-6).unwrap());
}

fn reconstruct(svd: &SvdTensors) -> Tensor {
    svd.u.tdot(&svd.s, ["l"], ["l*"])
        .and_then(|us| us.tdot(&svd.vh, ["r*"], ["r"]))
        .unwrap()
}

#[test]
fn svd_reconstructs_tensor() {
    let mut rng = rng();
    let t = random_tensor(&[2, 3, 4], &["a", "b", "c"], &mut rng);
    let opts = SvdOptions::default().new_labels("l", "r");
    let svd = t.svd(["a", "c"], &opts).unwrap();
    assert_eq!(svd.u.shape(), vec![2, 4, 3]);
    assert!(svd.u.labels_are(["a", "c", "l"]));
    assert_eq!(svd.s.shape(), vec![3, 3]);
    assert!(svd.s.labels_are(["l*", "r*"]));
    assert_eq!(svd.vh.shape(), vec![3, 3]);
    assert!(svd.vh.labels_are(["r", "b"]));
    assert_relative_eq!(svd.trunc_err, 0.0);

    let rec = reconstruct(&svd);
    assert!(rec.labels_are(["a", "c", "b"]));
    assert!(rec.allclose(&t, 1e-10, 1e-10).unwrap());

    let opts = opts.algorithm("gesvd");
    let svd = t.svd(["b"], &opts).unwrap();
    assert!(reconstruct(&svd).allclose(&t, 1e-10, 1e-10).unwrap());

    let bad = SvdOptions::default().algorithm("jacobi");
    assert!(matches!(
        t.svd(["b"], &bad),
        Err(TensorError::Backend(BackendError::UnknownSvdAlgorithm(..))),
    ));
}

#[test]
fn truncated_svd() {
    let mut rng = rng();
    let t = random_tensor(&[6, 5], &["a", "b"], &mut rng);
    let full = t.svd(["a"], &SvdOptions::default().new_labels("l", "r")).unwrap();
    let svals: Vec<f64>
        = match full.s.to_dense_block().unwrap() {
            NdBlock::F64(a) => (0..5).map(|k| a[[k, k]]).collect(),
            other => panic!("expected real singular values; got {:?}", other.nd_dtype()),
        };

    let opts
        = SvdOptions::default()
        .new_labels("l", "r")
        .truncation(Truncation::none().max_singular_values(3));
    let svd = t.svd(["a"], &opts).unwrap();
    assert_eq!(svd.s.shape(), vec![3, 3]);
    assert_eq!(svd.u.shape(), vec![6, 3]);
    assert_eq!(svd.vh.shape(), vec![3, 5]);

    let total: f64 = svals.iter().map(|s| s * s).sum();
    let discarded: f64 = svals[3..].iter().map(|s| s * s).sum();
    assert_relative_eq!(svd.trunc_err, (discarded / total).sqrt(), epsilon = 1e-10);

    // optimal low-rank approximation error
    let rec = reconstruct(&svd);
    assert_relative_eq!(t.sub(&rec).unwrap().norm() / t.norm(), svd.trunc_err, epsilon = 1e-10);

    let opts
        = SvdOptions::default()
        .new_labels("l", "r")
        .truncation(Truncation::none().threshold((svals[1] + svals[2]) / 2.0));
    let svd = t.svd(["a"], &opts).unwrap();
    assert_eq!(svd.s.shape(), vec![2, 2]);

    // relative norm of everything after the first k singular values
    let rel_err = |k: usize| -> f64 {
        (svals[k..].iter().map(|s| s * s).sum::<f64>() / total).sqrt()
    };
    let max_err = (rel_err(2) + rel_err(3)) / 2.0;
    let opts
        = SvdOptions::default()
        .new_labels("l", "r")
        .truncation(Truncation::none().max_err(max_err));
    let svd = t.svd(["a"], &opts).unwrap();
    assert_eq!(svd.s.shape(), vec![3, 3]);
    assert!(svd.trunc_err <= max_err);
    assert_relative_eq!(svd.trunc_err, rel_err(3), epsilon = 1e-10);

    // a threshold that alone keeps one value does not override the error bound
    let opts
        = SvdOptions::default()
        .new_labels("l", "r")
        .truncation(
            Truncation::none()
            .threshold((svals[0] + svals[1]) / 2.0)
            .max_err(max_err)
        );
    let svd = t.svd(["a"], &opts).unwrap();
    assert_eq!(svd.s.shape(), vec![3, 3]);
    assert!(svd.trunc_err <= max_err);
    let rec = reconstruct(&svd);
    assert_relative_eq!(t.sub(&rec).unwrap().norm() / t.norm(), svd.trunc_err, epsilon = 1e-10);

    // ... but the count bound does
    let opts
        = SvdOptions::default()
        .new_labels("l", "r")
        .truncation(
            Truncation::none()
            .max_singular_values(1)
            .threshold((svals[0] + svals[1]) / 2.0)
            .max_err(max_err)
        );
    let svd = t.svd(["a"], &opts).unwrap();
    assert_eq!(svd.s.shape(), vec![1, 1]);
    assert_relative_eq!(svd.trunc_err, rel_err(1), epsilon = 1e-10);

    let opts = SvdOptions::default().truncation(Truncation::none().max_singular_values(0));
    assert!(matches!(
        t.svd(["a"], &opts),
        Err(TensorError::Backend(BackendError::InvalidParameter(_))),
    ));
}

#[test]
fn symmetry_conversions() {
    let mut rng = rng();
    let t = random_tensor(&[3, 3], &["a", "b"], &mut rng);
    assert_eq!(t.symmetry(), &Symmetry::NoSymmetry);
    let same = t.increase_symmetry(&Symmetry::NoSymmetry, 1e-12, 1e-12).unwrap();
    assert_relative_eq!(same.sub(&t).unwrap().norm(), 0.0);
    assert!(t.reduce_symmetry(&Symmetry::NoSymmetry).unwrap().allclose(&t, 0.0, 0.0).unwrap());
    assert!(matches!(
        t.increase_symmetry(&Symmetry::U1, 1e-12, 1e-12),
        Err(TensorError::Backend(BackendError::UnsupportedSymmetry(_))),
    ));
    assert!(t.reduce_symmetry(&Symmetry::ZN(2)).is_err());
}

#[test]
fn matrix_functions() {
    let theta = 0.4_f64;
    let gen = square_matrix(vec![vec![0.0, -theta], vec![theta, 0.0]], ["p", "p*"]);
    let rot = gen.exp(["p"], ["p*"]).unwrap();
    let expected
        = square_matrix(
            vec![vec![theta.cos(), -theta.sin()], vec![theta.sin(), theta.cos()]],
            ["p", "p*"],
        );
    assert!(rot.allclose(&expected, 1e-12, 1e-12).unwrap());
    assert!(rot.labels_are(["p", "p*"]));

    let pos = square_matrix(vec![vec![2.0, 1.0], vec![1.0, 3.0]], ["p", "p*"]);
    let log = pos.log(["p"], ["p*"]).unwrap();
    assert!(log.is_real());
    assert!(log.exp(["p"], ["p*"]).unwrap().allclose(&pos, 1e-10, 1e-10).unwrap());

    let mut rng = rng();
    let t = random_tensor(&[2, 2], &["a", "b"], &mut rng);
    assert!(matches!(
        t.exp(["a"], ["b"]),
        Err(TensorError::Backend(BackendError::IncompatibleLegs(_))),
    ));
}

#[test]
fn random_tensors() {
    let mut rng = rng();
    let t = Tensor::random_gaussian(
        default_backend(), spaces(&[4, 5]), Dtype::COMPLEX128, 0.5, &mut rng)
        .unwrap();
    assert_eq!(t.shape(), vec![4, 5]);
    assert_eq!(t.dtype(), Dtype::COMPLEX128);
    assert!(t.norm() > 0.0);
    let res = Tensor::random_gaussian(
        default_backend(), spaces(&[2]), Dtype::FLOAT64, f64::NAN, &mut rng);
    assert!(matches!(res, Err(TensorError::Backend(BackendError::InvalidParameter(_)))));
}

#[test]
fn display() {
    let t = Tensor::from_nested(vec![vec![1.0, 2.0], vec![3.0, 4.0]], default_backend())
        .unwrap()
        .with_labels([Some("a"), None])
        .unwrap();
    let text = t.to_string();
    assert!(text.starts_with("<Tensor>"));
    assert!(text.contains("NoSymmetryBackend<ndarray>(NoSymmetry)"));
    assert!(text.contains("* Rank: 2"));
    assert!(text.contains("* Data:"));
    assert!(text.lines().any(|line| line.trim_start().starts_with('-')));
}

#[test]
fn backend_selection() {
    let backend = get_backend(&Symmetry::NoSymmetry, "ndarray").unwrap();
    assert_eq!(backend.svd_algorithms(), &["gesdd", "gesvd"]);
    assert!(matches!(
        get_backend(&Symmetry::U1, "ndarray"),
        Err(BackendError::UnsupportedSymmetry(_)),
    ));
    assert!(matches!(
        get_backend(&Symmetry::NoSymmetry, "numpy"),
        Err(BackendError::UnknownBlockBackend(_)),
    ));
}
