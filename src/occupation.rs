use crate::defaults;
use crate::errors::{Result, UhfError};
use crate::logging::format_mo_energies;
use crate::spin::{Spin2, SpinMatrix, SpinVector};
use crate::utils::argsort;
use log::{debug, info, warn};
use ndarray::prelude::*;
use ndarray_linalg::{Eigh, UPLO};

/// Aufbau occupation: fill the `nelec` energetically lowest orbitals of
/// each spin with one electron. Ties are resolved by the stable argsort,
/// so degenerate orbitals are filled in input order.
///
/// Near-degenerate frontier orbitals (gap below 1 mHa per spin, or a beta
/// HOMO above the alpha LUMO) are reported as warnings since they usually
/// signal an unstable or symmetry-broken solution.
pub fn get_occ(mo_energy: &SpinVector, nelec: (usize, usize)) -> Result<SpinVector> {
    let nmo = mo_energy.nmo()?;
    let (n_a, n_b) = nelec;
    if n_a > nmo || n_b > nmo {
        return Err(UhfError::DimensionMismatch {
            context: "electron count vs orbital count",
            expected: nmo,
            found: n_a.max(n_b),
        });
    }

    let idx_a = argsort(mo_energy.alpha.as_slice().ok_or_else(not_contiguous)?);
    let idx_b = argsort(mo_energy.beta.as_slice().ok_or_else(not_contiguous)?);

    let mut occ = Spin2::new(Array1::<f64>::zeros(nmo), Array1::<f64>::zeros(nmo));
    for &i in idx_a.iter().take(n_a) {
        occ.alpha[i] = 1.0;
    }
    for &i in idx_b.iter().take(n_b) {
        occ.beta[i] = 1.0;
    }

    report_frontier("alpha", &mo_energy.alpha, &idx_a, n_a);
    report_frontier("beta", &mo_energy.beta, &idx_b, n_b);
    if n_a > 0 && n_a < nmo && n_b > 0 {
        let homo_b = mo_energy.beta[idx_b[n_b - 1]];
        let lumo_a = mo_energy.alpha[idx_a[n_a]];
        if homo_b > lumo_a {
            warn!(
                "beta HOMO {:.15} > alpha LUMO {:.15}, occupation may not be aufbau",
                homo_b, lumo_a
            );
        }
    }
    debug!(
        "alpha mo_energy =\n{}",
        format_mo_energies(mo_energy.alpha.view(), defaults::MO_ENERGY_PRINT_WIDTH)
    );
    debug!(
        "beta  mo_energy =\n{}",
        format_mo_energies(mo_energy.beta.view(), defaults::MO_ENERGY_PRINT_WIDTH)
    );
    Ok(occ)
}

fn report_frontier(label: &str, energies: &Array1<f64>, order: &[usize], nocc: usize) {
    if nocc == 0 || nocc >= order.len() {
        return;
    }
    let homo = energies[order[nocc - 1]];
    let lumo = energies[order[nocc]];
    if homo + defaults::HOMO_LUMO_WARN_GAP > lumo {
        warn!(
            "{} nocc = {}  HOMO {:.15} >= LUMO {:.15}",
            label, nocc, homo, lumo
        );
    } else {
        info!("{} nocc = {}  HOMO = {:.15}  LUMO = {:.15}", label, nocc, homo, lumo);
    }
}

fn not_contiguous() -> UhfError {
    UhfError::Linalg(String::from("orbital energies not contiguous"))
}

/// One-particle density matrices D = C diag(occ) C^T, one per spin.
pub fn make_rdm1(mo_coeff: &SpinMatrix, mo_occ: &SpinVector) -> Result<SpinMatrix> {
    let nmo = mo_occ.nmo()?;
    if mo_coeff.alpha.dim().1 != nmo || mo_coeff.beta.dim().1 != nmo {
        return Err(UhfError::DimensionMismatch {
            context: "orbital coefficients vs occupations",
            expected: nmo,
            found: mo_coeff.alpha.dim().1,
        });
    }
    let dm = |c: &Array2<f64>, occ: &Array1<f64>| (c * occ).dot(&c.t());
    Ok(Spin2::new(
        dm(&mo_coeff.alpha, &mo_occ.alpha),
        dm(&mo_coeff.beta, &mo_occ.beta),
    ))
}

/// Diagonalize the Fock matrix within the occupied and virtual subspaces
/// separately. The resulting orbitals span the same density but carry
/// well-defined orbital energies, which converged level-shifted or DIIS
/// iterations do not guarantee.
pub fn canonicalize(
    mo_coeff: &SpinMatrix,
    mo_occ: &SpinVector,
    fock: &SpinMatrix,
) -> Result<(SpinVector, SpinMatrix)> {
    let e_a = canonicalize_spin(&mo_coeff.alpha, &mo_occ.alpha, &fock.alpha)?;
    let e_b = canonicalize_spin(&mo_coeff.beta, &mo_occ.beta, &fock.beta)?;
    Ok((
        Spin2::new(e_a.0, e_b.0),
        Spin2::new(e_a.1, e_b.1),
    ))
}

fn canonicalize_spin(
    c: &Array2<f64>,
    occ: &Array1<f64>,
    f: &Array2<f64>,
) -> Result<(Array1<f64>, Array2<f64>)> {
    let nmo = occ.len();
    let mut energies: Array1<f64> = Array1::zeros(nmo);
    let mut coeff = c.clone();
    for block in [occupied_indices(occ), virtual_indices(occ)].iter() {
        if block.is_empty() {
            continue;
        }
        let c_sub = c.select(Axis(1), block);
        let f_sub = c_sub.t().dot(f).dot(&c_sub);
        let (e_sub, rot) = f_sub.eigh(UPLO::Upper)?;
        let c_rot = c_sub.dot(&rot);
        for (k, &i) in block.iter().enumerate() {
            energies[i] = e_sub[k];
            coeff.column_mut(i).assign(&c_rot.column(k));
        }
    }
    Ok((energies, coeff))
}

pub(crate) fn occupied_indices(occ: &Array1<f64>) -> Vec<usize> {
    occ.iter()
        .enumerate()
        .filter(|(_, &o)| o > 0.0)
        .map(|(i, _)| i)
        .collect()
}

pub(crate) fn virtual_indices(occ: &Array1<f64>) -> Vec<usize> {
    occ.iter()
        .enumerate()
        .filter(|(_, &o)| o == 0.0)
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn aufbau_fills_lowest_orbitals() {
    let e = Spin2::new(array![0.3, -1.0, -0.5], array![-0.2, 0.1, -0.9]);
    let occ = get_occ(&e, (2, 1)).unwrap();
    assert_eq!(occ.alpha, array![0.0, 1.0, 1.0]);
    assert_eq!(occ.beta, array![0.0, 0.0, 1.0]);
}

#[test]
fn degenerate_orbitals_fill_in_input_order() {
    let e = Spin2::new(array![-0.5, -0.5, 0.2], array![-0.5, -0.5, 0.2]);
    let occ = get_occ(&e, (1, 1)).unwrap();
    assert_eq!(occ.alpha, array![1.0, 0.0, 0.0]);
}

#[test]
fn too_many_electrons_is_an_error() {
    let e = Spin2::new(array![-1.0, 0.0], array![-1.0, 0.0]);
    assert!(get_occ(&e, (3, 0)).is_err());
}

#[test]
fn density_from_occupied_columns() {
    let c = Spin2::new(Array2::<f64>::eye(2), Array2::<f64>::eye(2));
    let occ = Spin2::new(array![1.0, 0.0], array![0.0, 1.0]);
    let dm = make_rdm1(&c, &occ).unwrap();
    assert_eq!(dm.alpha, array![[1.0, 0.0], [0.0, 0.0]]);
    assert_eq!(dm.beta, array![[0.0, 0.0], [0.0, 1.0]]);
}

#[test]
fn density_is_invariant_under_canonicalization() {
    // mix the two occupied orbitals by a rotation; canonicalization with a
    // diagonal Fock matrix must restore sorted subspace energies while the
    // density stays fixed
    let r = std::f64::consts::FRAC_PI_6;
    let c_mixed = array![[r.cos(), -r.sin()], [r.sin(), r.cos()]];
    let c = Spin2::new(c_mixed.clone(), c_mixed);
    let occ = Spin2::new(array![1.0, 1.0], array![1.0, 1.0]);
    let f = Spin2::new(array![[-1.0, 0.0], [0.0, -0.5]], array![[-1.0, 0.0], [0.0, -0.5]]);
    let dm_before = make_rdm1(&c, &occ).unwrap();
    let (e, c_can) = canonicalize(&c, &occ, &f).unwrap();
    let dm_after = make_rdm1(&c_can, &occ).unwrap();
    approx::assert_abs_diff_eq!(dm_before.alpha, dm_after.alpha, epsilon = 1e-10);
    approx::assert_abs_diff_eq!(e.alpha, array![-1.0, -0.5], epsilon = 1e-10);
}
