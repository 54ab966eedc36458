use crate::errors::{Result, UhfError};
use crate::spin::{Spin2, SpinMatrix};
use ndarray::concatenate;
use ndarray::prelude::*;
use ndarray_linalg::Solve;

/// Pulay DIIS (commutator variant) over spin-paired Fock matrices.
///
/// Each call records the current Fock pair together with the orbital-basis
/// error `F D S - S D F` for both spins, then solves the bordered least
/// squares system for the extrapolation coefficients. Both spin channels
/// share one coefficient vector, so the alpha and beta matrices stay
/// consistent with each other.
pub struct Diis {
    space: usize,
    fock_hist: Vec<Array1<f64>>,
    err_hist: Vec<Array1<f64>>,
}

impl Diis {
    pub fn new(space: usize) -> Self {
        Diis {
            space: space.max(2),
            fock_hist: Vec::new(),
            err_hist: Vec::new(),
        }
    }

    /// Record the current iterate and return the extrapolated Fock pair.
    /// With fewer than two stored iterates, or a (numerically) singular
    /// coefficient system, the input is passed through unchanged.
    pub fn update(
        &mut self,
        s: ArrayView2<f64>,
        dm: &SpinMatrix,
        f: &SpinMatrix,
    ) -> Result<SpinMatrix> {
        let nao = f.nao()?;
        if dm.nao()? != nao || s.dim() != (nao, nao) {
            return Err(UhfError::DimensionMismatch {
                context: "DIIS inputs",
                expected: nao,
                found: dm.nao()?.min(s.dim().0),
            });
        }

        let err_a = commutator(f.alpha.view(), dm.alpha.view(), s);
        let err_b = commutator(f.beta.view(), dm.beta.view(), s);
        let errv = concatenate![Axis(0), flatten(err_a, nao)?, flatten(err_b, nao)?];
        let fockv = concatenate![
            Axis(0),
            flatten(f.alpha.clone(), nao)?,
            flatten(f.beta.clone(), nao)?
        ];
        self.err_hist.push(errv);
        self.fock_hist.push(fockv);
        if self.err_hist.len() > self.space {
            self.err_hist.remove(0);
            self.fock_hist.remove(0);
        }

        if self.err_hist.len() < 2 {
            return Ok(f.clone());
        }
        match self.extrapolate() {
            Some(flat) => unflatten_pair(flat, nao),
            None => Ok(f.clone()),
        }
    }

    /// Solve the bordered Pulay system [Pulay:1980:393]
    ///
    /// ```text
    ///     | B  -1 | | c |   |  0 |
    ///     | -1  0 | | l | = | -1 |
    /// ```
    ///
    /// with B_ij = <e_i, e_j>, and mix the stored Fock vectors with the
    /// resulting coefficients. Returns None if the system is singular.
    fn extrapolate(&self) -> Option<Array1<f64>> {
        let n = self.err_hist.len();
        let mut b: Array2<f64> = Array2::zeros((n + 1, n + 1));
        for i in 0..n {
            for j in 0..=i {
                let bij = self.err_hist[i].dot(&self.err_hist[j]);
                b[[i, j]] = bij;
                b[[j, i]] = bij;
            }
            b[[i, n]] = -1.0;
            b[[n, i]] = -1.0;
        }
        let mut rhs: Array1<f64> = Array1::zeros(n + 1);
        rhs[n] = -1.0;
        let coeff = b.solve_into(rhs).ok()?;

        let mut mixed: Array1<f64> = Array1::zeros(self.fock_hist[0].len());
        for (c, fv) in coeff.iter().take(n).zip(self.fock_hist.iter()) {
            mixed.scaled_add(*c, fv);
        }
        Some(mixed)
    }
}

fn commutator(f: ArrayView2<f64>, d: ArrayView2<f64>, s: ArrayView2<f64>) -> Array2<f64> {
    f.dot(&d).dot(&s) - s.dot(&d).dot(&f)
}

fn flatten(m: Array2<f64>, nao: usize) -> Result<Array1<f64>> {
    m.into_shape(nao * nao)
        .map_err(|e| UhfError::Linalg(e.to_string()))
}

fn unflatten_pair(flat: Array1<f64>, nao: usize) -> Result<SpinMatrix> {
    let half = nao * nao;
    let alpha = flat
        .slice(s![..half])
        .to_owned()
        .into_shape((nao, nao))
        .map_err(|e| UhfError::Linalg(e.to_string()))?;
    let beta = flat
        .slice(s![half..])
        .to_owned()
        .into_shape((nao, nao))
        .map_err(|e| UhfError::Linalg(e.to_string()))?;
    Ok(Spin2::new(alpha, beta))
}

#[test]
fn first_iterate_passes_through() {
    let mut diis = Diis::new(8);
    let s: Array2<f64> = Array2::eye(2);
    let dm = Spin2::new(array![[1.0, 0.0], [0.0, 0.0]], array![[1.0, 0.0], [0.0, 0.0]]);
    let f = Spin2::new(array![[-1.0, 0.3], [0.3, -0.5]], array![[-1.0, 0.1], [0.1, -0.5]]);
    let out = diis.update(s.view(), &dm, &f).unwrap();
    assert_eq!(out, f);
}

#[test]
fn orthogonal_errors_mix_evenly() {
    // two stored iterates with orthonormal error vectors: the bordered
    // system gives c = (1/2, 1/2)
    let mut diis = Diis::new(8);
    let mut e1: Array1<f64> = Array1::zeros(8);
    e1[0] = 1.0;
    let mut e2: Array1<f64> = Array1::zeros(8);
    e2[1] = 1.0;
    diis.err_hist.push(e1);
    diis.err_hist.push(e2);
    diis.fock_hist.push(Array1::ones(8));
    diis.fock_hist.push(Array1::ones(8) * 2.0);
    let mixed = diis.extrapolate().unwrap();
    approx::assert_abs_diff_eq!(mixed, Array1::ones(8) * 1.5, epsilon = 1e-12);
}

#[test]
fn history_is_capped_at_subspace_size() {
    let mut diis = Diis::new(2);
    let s: Array2<f64> = Array2::eye(2);
    for i in 0..4 {
        let x = i as f64 * 0.1;
        let dm = Spin2::new(array![[1.0, x], [x, 0.0]], array![[1.0, 0.0], [0.0, 0.0]]);
        let f = Spin2::new(array![[-1.0, x], [x, -0.5]], array![[-1.0, 0.0], [0.0, -0.5]]);
        let _ = diis.update(s.view(), &dm, &f).unwrap();
    }
    assert_eq!(diis.err_hist.len(), 2);
    assert_eq!(diis.fock_hist.len(), 2);
}

#[test]
fn converged_iterates_reproduce_fock() {
    // identical iterates with vanishing error: B is singular and the update
    // falls back to the unmodified Fock pair
    let mut diis = Diis::new(8);
    let s: Array2<f64> = Array2::eye(2);
    let dm = Spin2::new(array![[1.0, 0.0], [0.0, 0.0]], array![[1.0, 0.0], [0.0, 0.0]]);
    let f = Spin2::new(array![[-1.0, 0.0], [0.0, -0.5]], array![[-1.0, 0.0], [0.0, -0.5]]);
    let _ = diis.update(s.view(), &dm, &f).unwrap();
    let out = diis.update(s.view(), &dm, &f).unwrap();
    approx::assert_abs_diff_eq!(out.alpha, f.alpha, epsilon = 1e-10);
}
