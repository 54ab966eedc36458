use ndarray::prelude::*;
use uhf_core::analysis::{det_ovlp, spin_square};
use uhf_core::guess::{dm_from_chk_orbitals, ChkLoader, GuessOrbitals};
use uhf_core::occupation::canonicalize;
use uhf_core::scf::{Uhf, UhfConfig};
use uhf_core::veff::{get_veff, EriTensor, Hermiticity};
use uhf_core::{Spin2, SpinMatrix};

/// Two orbitals with a separable repulsion (ij|kl) = delta_ij delta_kl.
fn toy_system() -> (Array2<f64>, Array2<f64>, EriTensor) {
    let _ = env_logger::builder().is_test(true).try_init();
    let h: Array2<f64> = array![[-1.5, 0.2], [0.2, -0.7]];
    let s: Array2<f64> = Array2::eye(2);
    let mut eri = Array4::<f64>::zeros((2, 2, 2, 2));
    for i in 0..2 {
        for k in 0..2 {
            eri[[i, i, k, k]] = 1.0;
        }
    }
    (h, s, EriTensor::new(eri).unwrap())
}

fn occupied_block(c: &Array2<f64>, occ: &Array1<f64>) -> Array2<f64> {
    let idx: Vec<usize> = occ
        .iter()
        .enumerate()
        .filter(|(_, &o)| o > 0.0)
        .map(|(i, _)| i)
        .collect();
    c.select(Axis(1), &idx)
}

#[test]
fn closed_shell_ground_state_is_a_singlet() {
    let (h, s, jk) = toy_system();
    let cfg = UhfConfig::default();
    let mf = Uhf::new(h, s.clone(), &jk, (1, 1), cfg.validate().unwrap()).unwrap();
    let res = mf.kernel(None).unwrap();
    assert!(res.converged);

    let ca = occupied_block(&res.mo_coeff.alpha, &res.mo_occ.alpha);
    let cb = occupied_block(&res.mo_coeff.beta, &res.mo_occ.beta);
    let (ss, mult) = spin_square(ca.view(), cb.view(), s.view()).unwrap();
    approx::assert_abs_diff_eq!(ss, 0.0, epsilon = 1e-8);
    approx::assert_abs_diff_eq!(mult, 1.0, epsilon = 1e-8);
}

#[test]
fn triplet_state_carries_two_unpaired_electrons() {
    let (h, s, jk) = toy_system();
    let cfg = UhfConfig::default();
    let mf = Uhf::new(h, s.clone(), &jk, (2, 0), cfg.validate().unwrap()).unwrap();
    let res = mf.kernel(None).unwrap();
    assert!(res.converged);
    approx::assert_abs_diff_eq!(res.mo_occ.alpha.sum(), 2.0, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(res.mo_occ.beta.sum(), 0.0, epsilon = 1e-12);

    let ca = occupied_block(&res.mo_coeff.alpha, &res.mo_occ.alpha);
    let cb = occupied_block(&res.mo_coeff.beta, &res.mo_occ.beta);
    let (ss, mult) = spin_square(ca.view(), cb.view(), s.view()).unwrap();
    approx::assert_abs_diff_eq!(ss, 2.0, epsilon = 1e-8);
    approx::assert_abs_diff_eq!(mult, 3.0, epsilon = 1e-8);
}

#[test]
fn convergence_aids_reach_the_same_energy() {
    let (h, s, jk) = toy_system();
    let plain: UhfConfig = toml::from_str("use_diis = false").unwrap();
    let aided: UhfConfig =
        toml::from_str("damp = 0.3\nlevel_shift = 0.2\ndiis_start_cycle = 2").unwrap();

    let mf1 = Uhf::new(h.clone(), s.clone(), &jk, (1, 1), plain.validate().unwrap()).unwrap();
    let mf2 = Uhf::new(h, s, &jk, (1, 1), aided.validate().unwrap()).unwrap();
    let r1 = mf1.kernel(None).unwrap();
    let r2 = mf2.kernel(None).unwrap();
    assert!(r1.converged && r2.converged);
    approx::assert_abs_diff_eq!(r1.e_elec, r2.e_elec, epsilon = 1e-6);
}

struct FixedOrbitals;

impl ChkLoader for FixedOrbitals {
    fn load_scf(&self) -> uhf_core::Result<GuessOrbitals> {
        Ok(GuessOrbitals::Restricted {
            mo: Array2::eye(2),
            occ: array![2.0, 0.0],
        })
    }
}

#[test]
fn restricted_checkpoint_seeds_the_density() {
    let (h, s, jk) = toy_system();
    let dm0 = dm_from_chk_orbitals(FixedOrbitals.load_scf().unwrap()).unwrap();
    let cfg = UhfConfig::default();
    let mf = Uhf::new(h, s, &jk, (1, 1), cfg.validate().unwrap()).unwrap();
    let seeded = mf.kernel(Some(dm0)).unwrap();
    let fresh = mf.kernel(None).unwrap();
    assert!(seeded.converged);
    approx::assert_abs_diff_eq!(seeded.e_elec, fresh.e_elec, epsilon = 1e-6);
}

#[test]
fn converged_state_overlaps_itself_completely() {
    let (h, s, jk) = toy_system();
    let cfg = UhfConfig::default();
    let mf = Uhf::new(h, s.clone(), &jk, (1, 1), cfg.validate().unwrap()).unwrap();
    let res = mf.kernel(None).unwrap();
    let (det, _) = det_ovlp(
        &res.mo_coeff,
        &res.mo_coeff,
        &res.mo_occ,
        &res.mo_occ,
        s.view(),
    )
    .unwrap();
    approx::assert_abs_diff_eq!(det, 1.0, epsilon = 1e-8);
}

#[test]
fn canonicalized_orbitals_keep_density_and_potential() {
    let (h, s, jk) = toy_system();
    let cfg = UhfConfig::default();
    let mf = Uhf::new(h.clone(), s.clone(), &jk, (1, 1), cfg.validate().unwrap()).unwrap();
    let res = mf.kernel(None).unwrap();

    let vhf = get_veff(&jk, &res.dm, None, Hermiticity::Hermitian).unwrap();
    let fock = Spin2::new(&h + &vhf.alpha, &h + &vhf.beta);
    let (e_can, c_can) = canonicalize(&res.mo_coeff, &res.mo_occ, &fock).unwrap();

    // same density, and subspace-diagonal energies match the SCF ones
    let dm_can = uhf_core::occupation::make_rdm1(&c_can, &res.mo_occ).unwrap();
    approx::assert_abs_diff_eq!(dm_can.alpha, res.dm.alpha, epsilon = 1e-8);
    approx::assert_abs_diff_eq!(
        e_can.alpha,
        res.mo_energy.alpha,
        epsilon = 1e-4
    );
}

#[test]
fn incremental_potential_matches_full_rebuild_along_the_run() {
    let (h, s, jk) = toy_system();
    let cfg = UhfConfig::default();
    let mf = Uhf::new(h, s, &jk, (1, 1), cfg.validate().unwrap()).unwrap();
    let res = mf.kernel(None).unwrap();

    // the converged density must reproduce its own potential from scratch
    let direct = get_veff(&jk, &res.dm, None, Hermiticity::Hermitian).unwrap();
    let zero: SpinMatrix = Spin2::new(Array2::zeros((2, 2)), Array2::zeros((2, 2)));
    let incremental = get_veff(&jk, &res.dm, Some((&zero, &zero)), Hermiticity::Hermitian).unwrap();
    approx::assert_abs_diff_eq!(direct.alpha, incremental.alpha, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(direct.beta, incremental.beta, epsilon = 1e-12);
}
