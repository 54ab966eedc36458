use crate::errors::{Result, UhfError};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Ordered pair of per-spin values (alpha first, beta second). Density
/// matrices, Fock matrices, potentials, orbital coefficients, occupation
/// vectors and orbital energies are all carried through the SCF cycle in
/// this canonical spin-paired form.
#[derive(Clone, Debug, PartialEq)]
pub struct Spin2<T> {
    pub alpha: T,
    pub beta: T,
}

impl<T> Spin2<T> {
    pub fn new(alpha: T, beta: T) -> Self {
        Spin2 { alpha, beta }
    }

    /// Apply `f` to both spin channels.
    pub fn map<U, F>(&self, f: F) -> Spin2<U>
    where
        F: Fn(&T) -> U,
    {
        Spin2 {
            alpha: f(&self.alpha),
            beta: f(&self.beta),
        }
    }

    /// Apply a fallible `f` to both spin channels.
    pub fn try_map<U, F>(&self, f: F) -> Result<Spin2<U>>
    where
        F: Fn(&T) -> Result<U>,
    {
        Ok(Spin2 {
            alpha: f(&self.alpha)?,
            beta: f(&self.beta)?,
        })
    }
}

/// Spin-paired square matrix (e.g. density, Fock, effective potential).
pub type SpinMatrix = Spin2<Array2<f64>>;
/// Spin-paired vector (occupations, orbital energies).
pub type SpinVector = Spin2<Array1<f64>>;

impl SpinMatrix {
    /// Broadcast a spin-independent operator matrix (core Hamiltonian,
    /// spin-free potential) into spin-paired form. This is the single place
    /// where the "same matrix for both spins" convention is established.
    pub fn broadcast(m: ArrayView2<f64>) -> SpinMatrix {
        Spin2::new(m.to_owned(), m.to_owned())
    }

    /// Split a spin-summed density matrix into the canonical pair
    /// (dm/2, dm/2), the unpolarized interpretation.
    pub fn from_total(dm: ArrayView2<f64>) -> SpinMatrix {
        let half = dm.mapv(|x| 0.5 * x);
        Spin2::new(half.clone(), half)
    }

    /// Number of atomic orbitals. Fails unless both members are square and
    /// of identical dimension.
    pub fn nao(&self) -> Result<usize> {
        let (n, m) = self.alpha.dim();
        if n != m {
            return Err(UhfError::DimensionMismatch {
                context: "spin pair (alpha not square)",
                expected: n,
                found: m,
            });
        }
        let (nb, mb) = self.beta.dim();
        if nb != n || mb != n {
            return Err(UhfError::DimensionMismatch {
                context: "spin pair (beta)",
                expected: n,
                found: nb,
            });
        }
        Ok(n)
    }

    /// Spin-summed matrix alpha + beta.
    pub fn total(&self) -> Array2<f64> {
        &self.alpha + &self.beta
    }
}

impl SpinVector {
    /// Common length of the two members, typically the number of orbitals.
    pub fn nmo(&self) -> Result<usize> {
        if self.alpha.len() != self.beta.len() {
            return Err(UhfError::DimensionMismatch {
                context: "spin vector pair",
                expected: self.alpha.len(),
                found: self.beta.len(),
            });
        }
        Ok(self.alpha.len())
    }
}

/// Damping and level-shift factors may be given either as one number for
/// both spins or as an explicit (alpha, beta) pair. The variant is resolved
/// into a canonical per-spin pair once, at configuration validation time.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpinParam {
    Scalar(f64),
    PerSpin(f64, f64),
}

impl SpinParam {
    pub fn per_spin(self) -> (f64, f64) {
        match self {
            SpinParam::Scalar(x) => (x, x),
            SpinParam::PerSpin(a, b) => (a, b),
        }
    }
}

impl Default for SpinParam {
    fn default() -> Self {
        SpinParam::Scalar(0.0)
    }
}

#[test]
fn broadcast_duplicates_operator() {
    let h: Array2<f64> = array![[-1.0, 0.1], [0.1, -0.5]];
    let pair = SpinMatrix::broadcast(h.view());
    assert_eq!(pair.alpha, h);
    assert_eq!(pair.beta, h);
    assert_eq!(pair.nao().unwrap(), 2);
}

#[test]
fn from_total_halves_density() {
    let dm: Array2<f64> = array![[2.0, 0.0], [0.0, 2.0]];
    let pair = SpinMatrix::from_total(dm.view());
    assert_eq!(pair.alpha, array![[1.0, 0.0], [0.0, 1.0]]);
    assert_eq!(pair.total(), dm);
}

#[test]
fn mismatched_pair_is_rejected() {
    let pair = Spin2::new(Array2::<f64>::zeros((2, 2)), Array2::<f64>::zeros((3, 3)));
    assert!(pair.nao().is_err());
}

#[test]
fn spin_param_resolves_scalar_and_pair() {
    #[derive(Deserialize)]
    struct Knobs {
        damp: SpinParam,
        level_shift: SpinParam,
    }
    let knobs: Knobs = toml::from_str("damp = 0.4\nlevel_shift = [0.2, 0.0]").unwrap();
    assert_eq!(knobs.damp.per_spin(), (0.4, 0.4));
    assert_eq!(knobs.level_shift.per_spin(), (0.2, 0.0));
}
