use crate::constants::AU_TO_DEBYE;
use crate::defaults;
use crate::errors::{Result, Spin, UhfError};
use crate::occupation::occupied_indices;
use crate::spin::{Spin2, SpinMatrix, SpinVector};
use log::debug;
use ndarray::prelude::*;
use ndarray_linalg::SVD;

/// Expectation value of S^2 and the derived multiplicity for a UHF
/// determinant, from the occupied orbital blocks and the AO overlap:
///
/// ```text
///     <S^2> = (n_a + n_b)/2 - sum |<i_a|j_b>|^2 + (n_b - n_a)^2 / 4
/// ```
///
/// An inter-spin overlap larger than the orbitals allow drives <S^2>
/// below -1/4, where the multiplicity is undefined; that is reported as
/// a degeneracy error rather than returned as NaN.
pub fn spin_square(
    mo_a: ArrayView2<f64>,
    mo_b: ArrayView2<f64>,
    s: ArrayView2<f64>,
) -> Result<(f64, f64)> {
    let nocc_a = mo_a.dim().1;
    let nocc_b = mo_b.dim().1;
    let s_ab = mo_a.t().dot(&s).dot(&mo_b);
    let ssxy = (nocc_a + nocc_b) as f64 * 0.5 - s_ab.mapv(|x| x * x).sum();
    let ssz = (nocc_b as f64 - nocc_a as f64).powi(2) * 0.25;
    let ss = ssxy + ssz;
    if ss < -0.25 {
        return Err(UhfError::NumericalDegeneracy { spin_square: ss });
    }
    let multiplicity = ((ss + 0.25).sqrt() - 0.5) * 2.0 + 1.0;
    Ok((ss, multiplicity))
}

/// Overlap between two UHF determinants and the pseudoinverse rotation
/// connecting their occupied spaces. Per spin, the occupied-block overlap
/// O = C1^T S C2 is decomposed as U diag(sigma) V^T; the determinant
/// overlap is the product of all singular values and
///
/// ```text
///     X = U diag(1/sigma) V^T
/// ```
///
/// carries the bra orbitals onto the ket ones.
pub fn det_ovlp(
    mo1: &SpinMatrix,
    mo2: &SpinMatrix,
    occ1: &SpinVector,
    occ2: &SpinVector,
    ovlp: ArrayView2<f64>,
) -> Result<(f64, SpinMatrix)> {
    let mut det = 1.0;
    let mut x: Vec<Array2<f64>> = Vec::with_capacity(2);
    for &spin in [Spin::Alpha, Spin::Beta].iter() {
        let (c1, o1) = spin_channel(mo1, occ1, spin);
        let (c2, o2) = spin_channel(mo2, occ2, spin);
        let n1 = electron_count(o1);
        let n2 = electron_count(o2);
        if n1 != n2 {
            return Err(UhfError::ElectronCountMismatch { bra: n1, ket: n2 });
        }
        if n1 == 0 {
            // empty spin channel: no singular values, unit contribution
            x.push(Array2::zeros((0, 0)));
            continue;
        }
        let c1_occ = occupied_columns(c1, o1);
        let c2_occ = occupied_columns(c2, o2);
        let o = c1_occ.t().dot(&ovlp).dot(&c2_occ);
        let (u_opt, sv, vt_opt) = o.svd(true, true)?;
        let u = u_opt.ok_or_else(missing_svd)?;
        let vt = vt_opt.ok_or_else(missing_svd)?;
        for (i, &v) in sv.iter().enumerate() {
            if v <= defaults::SV_FLOOR {
                return Err(UhfError::SingularOverlap {
                    spin,
                    index: i,
                    value: v,
                });
            }
        }
        det *= sv.iter().product::<f64>();
        let sv_inv = sv.mapv(|v| 1.0 / v);
        x.push((&u * &sv_inv).dot(&vt));
    }
    let x_b = x.pop().ok_or_else(missing_svd)?;
    let x_a = x.pop().ok_or_else(missing_svd)?;
    Ok((det, Spin2::new(x_a, x_b)))
}

/// Asymmetric transition density matrix between two determinants,
/// D = C1_occ X C2_occ^T per spin, with X from `det_ovlp`.
pub fn make_asym_dm(
    mo1: &SpinMatrix,
    mo2: &SpinMatrix,
    occ1: &SpinVector,
    occ2: &SpinVector,
    x: &SpinMatrix,
) -> Result<SpinMatrix> {
    occ1.nmo()?;
    occ2.nmo()?;
    let dm = |c1: &Array2<f64>, o1: &Array1<f64>, c2: &Array2<f64>, o2: &Array1<f64>, xm: &Array2<f64>| {
        let c1_occ = occupied_columns(c1, o1);
        let c2_occ = occupied_columns(c2, o2);
        c1_occ.dot(xm).dot(&c2_occ.t())
    };
    Ok(Spin2::new(
        dm(&mo1.alpha, &occ1.alpha, &mo2.alpha, &occ2.alpha, &x.alpha),
        dm(&mo1.beta, &occ1.beta, &mo2.beta, &occ2.beta, &x.beta),
    ))
}

/// Mulliken population analysis. Per-AO populations are the diagonal of
/// D S for each spin; summing them per atom and subtracting from the
/// nuclear charges gives partial atomic charges.
pub fn mulliken_pop(
    dm: &SpinMatrix,
    s: ArrayView2<f64>,
    ao_to_atom: &[usize],
    atom_charges: ArrayView1<f64>,
) -> Result<(SpinVector, Array1<f64>)> {
    let nao = dm.nao()?;
    if ao_to_atom.len() != nao {
        return Err(UhfError::DimensionMismatch {
            context: "AO-to-atom map",
            expected: nao,
            found: ao_to_atom.len(),
        });
    }
    let natoms = atom_charges.len();
    if let Some(&bad) = ao_to_atom.iter().find(|&&a| a >= natoms) {
        return Err(UhfError::DimensionMismatch {
            context: "AO-to-atom map entry",
            expected: natoms,
            found: bad,
        });
    }
    let pop_a = dm.alpha.dot(&s).diag().to_owned();
    let pop_b = dm.beta.dot(&s).diag().to_owned();
    let mut charges = atom_charges.to_owned();
    for (i, &atom) in ao_to_atom.iter().enumerate() {
        charges[atom] -= pop_a[i] + pop_b[i];
    }
    debug!("mulliken populations (alpha): {}", pop_a);
    debug!("mulliken populations (beta):  {}", pop_b);
    Ok((Spin2::new(pop_a, pop_b), charges))
}

/// Mulliken analysis in an orthogonalized AO basis. The density pair is
/// transformed with C_inv = L^T S for the given orthogonalization
/// coefficients L (e.g. meta-Loewdin), after which the populations are
/// plain diagonal sums.
pub fn mulliken_meta(
    dm: &SpinMatrix,
    s: ArrayView2<f64>,
    orth_coeff: ArrayView2<f64>,
    ao_to_atom: &[usize],
    atom_charges: ArrayView1<f64>,
) -> Result<(SpinVector, Array1<f64>)> {
    let nao = dm.nao()?;
    if orth_coeff.dim() != (nao, nao) {
        return Err(UhfError::DimensionMismatch {
            context: "orthogonalization coefficients",
            expected: nao,
            found: orth_coeff.dim().0,
        });
    }
    let c_inv = orth_coeff.t().dot(&s);
    let transform = |d: &Array2<f64>| c_inv.dot(d).dot(&c_inv.t());
    let dm_orth = Spin2::new(transform(&dm.alpha), transform(&dm.beta));
    let eye: Array2<f64> = Array2::eye(nao);
    mulliken_pop(&dm_orth, eye.view(), ao_to_atom, atom_charges)
}

/// Molecular dipole moment in Debye. `ao_dip` holds the three Cartesian
/// AO dipole integral matrices; the electronic part is contracted with
/// the spin-summed density and subtracted from the nuclear part.
pub fn dip_moment(
    dm: &SpinMatrix,
    ao_dip: &[Array2<f64>; 3],
    atom_charges: ArrayView1<f64>,
    atom_coords: ArrayView2<f64>,
) -> Result<[f64; 3]> {
    let nao = dm.nao()?;
    let natoms = atom_charges.len();
    if atom_coords.dim() != (natoms, 3) {
        return Err(UhfError::DimensionMismatch {
            context: "atom coordinates",
            expected: natoms,
            found: atom_coords.dim().0,
        });
    }
    let dm_tot = dm.total();
    let mut mol_dip = [0.0; 3];
    for (x, component) in ao_dip.iter().enumerate() {
        if component.dim() != (nao, nao) {
            return Err(UhfError::DimensionMismatch {
                context: "dipole integrals",
                expected: nao,
                found: component.dim().0,
            });
        }
        let el = (component * &dm_tot.t()).sum();
        let nucl = atom_charges.dot(&atom_coords.column(x));
        mol_dip[x] = (nucl - el) * AU_TO_DEBYE;
    }
    Ok(mol_dip)
}

fn spin_channel<'a>(
    mo: &'a SpinMatrix,
    occ: &'a SpinVector,
    spin: Spin,
) -> (&'a Array2<f64>, &'a Array1<f64>) {
    match spin {
        Spin::Alpha => (&mo.alpha, &occ.alpha),
        Spin::Beta => (&mo.beta, &occ.beta),
    }
}

fn occupied_columns(c: &Array2<f64>, occ: &Array1<f64>) -> Array2<f64> {
    c.select(Axis(1), &occupied_indices(occ))
}

fn electron_count(occ: &Array1<f64>) -> usize {
    occ.sum().round() as usize
}

fn missing_svd() -> UhfError {
    UhfError::Linalg(String::from("SVD returned no singular vectors"))
}

#[test]
fn single_unpaired_electron_is_a_doublet() {
    let mo_a: Array2<f64> = array![[1.0], [0.0]];
    let mo_b = Array2::<f64>::zeros((2, 0));
    let s: Array2<f64> = Array2::eye(2);
    let (ss, mult) = spin_square(mo_a.view(), mo_b.view(), s.view()).unwrap();
    approx::assert_abs_diff_eq!(ss, 0.75, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(mult, 2.0, epsilon = 1e-12);
}

#[test]
fn identical_closed_shell_orbitals_are_a_singlet() {
    let mo: Array2<f64> = Array2::eye(2);
    let s: Array2<f64> = Array2::eye(2);
    let (ss, mult) = spin_square(mo.view(), mo.view(), s.view()).unwrap();
    approx::assert_abs_diff_eq!(ss, 0.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(mult, 1.0, epsilon = 1e-12);
}

#[test]
fn unphysical_overlap_is_rejected() {
    // inter-spin overlap of 4 for one electron pair drives <S^2> far below
    // the -1/4 bound
    let mo: Array2<f64> = array![[2.0]];
    let s: Array2<f64> = Array2::eye(1);
    let err = spin_square(mo.view(), mo.view(), s.view()).unwrap_err();
    match err {
        UhfError::NumericalDegeneracy { spin_square } => assert!(spin_square < -0.25),
        other => panic!("unexpected error {:?}", other),
    }
}

#[cfg(test)]
fn doublet_pair() -> (SpinMatrix, SpinVector) {
    let mo = Spin2::new(Array2::<f64>::eye(2), Array2::<f64>::eye(2));
    let occ = Spin2::new(array![1.0, 0.0], array![1.0, 0.0]);
    (mo, occ)
}

#[test]
fn identical_determinants_have_unit_overlap() {
    let (mo, occ) = doublet_pair();
    let s: Array2<f64> = Array2::eye(2);
    let (det, x) = det_ovlp(&mo, &mo, &occ, &occ, s.view()).unwrap();
    approx::assert_abs_diff_eq!(det, 1.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(x.alpha, Array2::eye(1), epsilon = 1e-12);
}

#[test]
fn orthogonal_determinants_are_singular() {
    let (mo, occ1) = doublet_pair();
    let occ2 = Spin2::new(array![0.0, 1.0], array![0.0, 1.0]);
    let s: Array2<f64> = Array2::eye(2);
    let err = det_ovlp(&mo, &mo, &occ1, &occ2, s.view()).unwrap_err();
    assert!(matches!(err, UhfError::SingularOverlap { .. }));
}

#[test]
fn electron_counts_must_match_per_spin() {
    let (mo, occ1) = doublet_pair();
    let occ2 = Spin2::new(array![1.0, 1.0], array![1.0, 0.0]);
    let s: Array2<f64> = Array2::eye(2);
    let err = det_ovlp(&mo, &mo, &occ1, &occ2, s.view()).unwrap_err();
    assert!(matches!(
        err,
        UhfError::ElectronCountMismatch { bra: 1, ket: 2 }
    ));
}

#[test]
fn asym_dm_of_identical_determinants_is_the_density() {
    let (mo, occ) = doublet_pair();
    let s: Array2<f64> = Array2::eye(2);
    let (_, x) = det_ovlp(&mo, &mo, &occ, &occ, s.view()).unwrap();
    let dm = make_asym_dm(&mo, &mo, &occ, &occ, &x).unwrap();
    approx::assert_abs_diff_eq!(dm.alpha, array![[1.0, 0.0], [0.0, 0.0]], epsilon = 1e-12);
}

#[test]
fn mulliken_charges_of_a_neutral_symmetric_dimer() {
    let dm = Spin2::new(
        array![[0.5, 0.0], [0.0, 0.5]],
        array![[0.5, 0.0], [0.0, 0.5]],
    );
    let s: Array2<f64> = Array2::eye(2);
    let charges_in: Array1<f64> = array![1.0, 1.0];
    let (pop, chg) = mulliken_pop(&dm, s.view(), &[0, 1], charges_in.view()).unwrap();
    approx::assert_abs_diff_eq!(pop.alpha, array![0.5, 0.5], epsilon = 1e-12);
    approx::assert_abs_diff_eq!(chg, array![0.0, 0.0], epsilon = 1e-12);
}

#[test]
fn meta_analysis_reduces_to_plain_for_orthonormal_aos() {
    let dm = Spin2::new(
        array![[0.6, 0.1], [0.1, 0.4]],
        array![[0.5, 0.0], [0.0, 0.5]],
    );
    let s: Array2<f64> = Array2::eye(2);
    let orth: Array2<f64> = Array2::eye(2);
    let charges_in: Array1<f64> = array![1.0, 1.0];
    let plain = mulliken_pop(&dm, s.view(), &[0, 1], charges_in.view()).unwrap();
    let meta = mulliken_meta(&dm, s.view(), orth.view(), &[0, 1], charges_in.view()).unwrap();
    approx::assert_abs_diff_eq!(plain.1, meta.1, epsilon = 1e-12);
}

#[test]
fn dipole_of_a_point_charge_with_off_center_density() {
    let dm = Spin2::new(array![[1.0]], array![[1.0]]);
    let ao_dip = [array![[0.5]], array![[0.0]], array![[0.0]]];
    let charges: Array1<f64> = array![2.0];
    let coords: Array2<f64> = array![[1.0, 0.0, 0.0]];
    let dip = dip_moment(&dm, &ao_dip, charges.view(), coords.view()).unwrap();
    approx::assert_abs_diff_eq!(dip[0], (2.0 - 1.0) * AU_TO_DEBYE, epsilon = 1e-10);
    approx::assert_abs_diff_eq!(dip[1], 2.0 * 0.0, epsilon = 1e-12);
}
