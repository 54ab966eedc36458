use crate::errors::{Result, UhfError};
use crate::occupation::make_rdm1;
use crate::spin::{Spin2, SpinMatrix, SpinVector};
use ndarray::prelude::*;
use num_complex::Complex64;

/// Orbitals read back from an earlier calculation, used to seed the SCF
/// density. Restricted orbitals are expanded to a spin pair by splitting
/// each doubly occupied column; complex orbitals are recognized but not
/// supported by the real-arithmetic core.
pub enum GuessOrbitals {
    Restricted {
        mo: Array2<f64>,
        occ: Array1<f64>,
    },
    Unrestricted {
        mo: SpinMatrix,
        occ: SpinVector,
    },
    Complex {
        mo: Array2<Complex64>,
        occ: Array1<f64>,
    },
}

/// Source of stored orbitals, e.g. a checkpoint file of a previous run.
pub trait ChkLoader {
    fn load_scf(&self) -> Result<GuessOrbitals>;
}

/// Spin-paired density from stored orbitals.
///
/// For restricted input the alpha density comes from all columns with
/// occupation > 0 and the beta density from those with occupation > 1,
/// which reproduces the usual ROHF/RHF reading of fractional spin.
pub fn dm_from_chk_orbitals(guess: GuessOrbitals) -> Result<SpinMatrix> {
    match guess {
        GuessOrbitals::Restricted { mo, occ } => {
            if mo.dim().1 != occ.len() {
                return Err(UhfError::DimensionMismatch {
                    context: "stored orbitals vs occupations",
                    expected: occ.len(),
                    found: mo.dim().1,
                });
            }
            let dm = |threshold: f64| {
                let idx: Vec<usize> = occ
                    .iter()
                    .enumerate()
                    .filter(|(_, &o)| o > threshold)
                    .map(|(i, _)| i)
                    .collect();
                let cols = mo.select(Axis(1), &idx);
                cols.dot(&cols.t())
            };
            Ok(Spin2::new(dm(0.0), dm(1.0)))
        }
        GuessOrbitals::Unrestricted { mo, occ } => make_rdm1(&mo, &occ),
        GuessOrbitals::Complex { .. } => Err(UhfError::Unimplemented(
            "complex-orbital checkpoints cannot seed the real-orbital core",
        )),
    }
}

#[test]
fn restricted_orbitals_split_by_occupation() {
    // one doubly and one singly occupied orbital: alpha sees both columns,
    // beta only the first
    let mo: Array2<f64> = Array2::eye(2);
    let occ: Array1<f64> = array![2.0, 1.0];
    let dm = dm_from_chk_orbitals(GuessOrbitals::Restricted { mo, occ }).unwrap();
    assert_eq!(dm.alpha, array![[1.0, 0.0], [0.0, 1.0]]);
    assert_eq!(dm.beta, array![[1.0, 0.0], [0.0, 0.0]]);
}

#[test]
fn unrestricted_orbitals_pass_through_rdm1() {
    let mo = Spin2::new(Array2::<f64>::eye(2), Array2::<f64>::eye(2));
    let occ = Spin2::new(array![1.0, 0.0], array![0.0, 1.0]);
    let dm = dm_from_chk_orbitals(GuessOrbitals::Unrestricted { mo, occ }).unwrap();
    assert_eq!(dm.alpha, array![[1.0, 0.0], [0.0, 0.0]]);
    assert_eq!(dm.beta, array![[0.0, 0.0], [0.0, 1.0]]);
}

#[test]
fn complex_orbitals_are_rejected() {
    let mo = Array2::<Complex64>::zeros((2, 2));
    let occ: Array1<f64> = array![1.0, 0.0];
    let err = dm_from_chk_orbitals(GuessOrbitals::Complex { mo, occ }).unwrap_err();
    assert!(matches!(err, UhfError::Unimplemented(_)));
}
