use crate::defaults;
use crate::diis::Diis;
use crate::errors::{Result, UhfError};
use crate::fock::get_fock;
use crate::gradient::get_grad;
use crate::logging;
use crate::occupation::{get_occ, make_rdm1};
use crate::spin::{SpinMatrix, SpinParam, SpinVector};
use crate::veff::{get_veff, Hermiticity, JkProvider};
use log::debug;
use ndarray::prelude::*;
use ndarray_linalg::{Eigh, Inverse, SymmetricSqrt, UPLO};
use ndarray_stats::QuantileExt;
use serde::{Deserialize, Serialize};

fn default_version() -> u32 {
    defaults::CONFIG_VERSION
}
fn default_use_diis() -> bool {
    defaults::USE_DIIS
}
fn default_diis_space() -> usize {
    defaults::DIIS_SPACE
}
fn default_diis_start_cycle() -> usize {
    defaults::DIIS_START_CYCLE
}
fn default_conv_tol() -> f64 {
    defaults::CONV_TOL
}
fn default_conv_tol_grad() -> f64 {
    defaults::CONV_TOL_GRAD
}
fn default_max_cycle() -> usize {
    defaults::MAX_CYCLE
}

/// User-facing SCF settings, typically read from a TOML section. Every
/// field has a default, so an empty table is a valid configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UhfConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub damp: SpinParam,
    #[serde(default)]
    pub level_shift: SpinParam,
    #[serde(default = "default_use_diis")]
    pub use_diis: bool,
    #[serde(default = "default_diis_space")]
    pub diis_space: usize,
    #[serde(default = "default_diis_start_cycle")]
    pub diis_start_cycle: usize,
    #[serde(default = "default_conv_tol")]
    pub conv_tol: f64,
    #[serde(default = "default_conv_tol_grad")]
    pub conv_tol_grad: f64,
    #[serde(default = "default_max_cycle")]
    pub max_cycle: usize,
}

impl Default for UhfConfig {
    fn default() -> Self {
        UhfConfig {
            version: default_version(),
            damp: SpinParam::default(),
            level_shift: SpinParam::default(),
            use_diis: default_use_diis(),
            diis_space: default_diis_space(),
            diis_start_cycle: default_diis_start_cycle(),
            conv_tol: default_conv_tol(),
            conv_tol_grad: default_conv_tol_grad(),
            max_cycle: default_max_cycle(),
        }
    }
}

impl UhfConfig {
    /// Check the settings and resolve them into canonical per-spin form.
    pub fn validate(&self) -> Result<ScfParams> {
        if self.version != defaults::CONFIG_VERSION {
            return Err(UhfError::Config(format!(
                "unsupported configuration version {} (expected {})",
                self.version,
                defaults::CONFIG_VERSION
            )));
        }
        if self.max_cycle == 0 {
            return Err(UhfError::Config(String::from("max_cycle must be >= 1")));
        }
        if self.conv_tol <= 0.0 || self.conv_tol_grad <= 0.0 {
            return Err(UhfError::Config(String::from(
                "convergence thresholds must be positive",
            )));
        }
        if self.use_diis && self.diis_space < 2 {
            return Err(UhfError::Config(String::from("diis_space must be >= 2")));
        }
        let damp = self.damp.per_spin();
        let level_shift = self.level_shift.per_spin();
        if damp.0 < 0.0 || damp.1 < 0.0 {
            return Err(UhfError::Config(String::from(
                "damping factors must be non-negative",
            )));
        }
        if level_shift.0 < 0.0 || level_shift.1 < 0.0 {
            return Err(UhfError::Config(String::from(
                "level shifts must be non-negative",
            )));
        }
        Ok(ScfParams {
            damp,
            level_shift,
            use_diis: self.use_diis,
            diis_space: self.diis_space,
            diis_start_cycle: self.diis_start_cycle,
            conv_tol: self.conv_tol,
            conv_tol_grad: self.conv_tol_grad,
            max_cycle: self.max_cycle,
        })
    }
}

/// Validated SCF settings with scalar-or-pair fields resolved.
#[derive(Clone, Copy, Debug)]
pub struct ScfParams {
    pub damp: (f64, f64),
    pub level_shift: (f64, f64),
    pub use_diis: bool,
    pub diis_space: usize,
    pub diis_start_cycle: usize,
    pub conv_tol: f64,
    pub conv_tol_grad: f64,
    pub max_cycle: usize,
}

impl Default for ScfParams {
    fn default() -> Self {
        ScfParams {
            damp: (defaults::DAMP_FACTOR, defaults::DAMP_FACTOR),
            level_shift: (defaults::LEVEL_SHIFT_FACTOR, defaults::LEVEL_SHIFT_FACTOR),
            use_diis: defaults::USE_DIIS,
            diis_space: defaults::DIIS_SPACE,
            diis_start_cycle: defaults::DIIS_START_CYCLE,
            conv_tol: defaults::CONV_TOL,
            conv_tol_grad: defaults::CONV_TOL_GRAD,
            max_cycle: defaults::MAX_CYCLE,
        }
    }
}

/// Split a total electron count into (n_alpha, n_beta) given the spin
/// polarization 2S = n_alpha - n_beta.
pub fn nelec_from_spin(n_electrons: usize, spin: usize) -> Result<(usize, usize)> {
    if spin > n_electrons || (n_electrons + spin) % 2 != 0 {
        return Err(UhfError::Config(format!(
            "electron number {} and spin {} are inconsistent",
            n_electrons, spin
        )));
    }
    let n_a = (n_electrons + spin) / 2;
    Ok((n_a, n_electrons - n_a))
}

/// Final state of an SCF run. Returned for converged and non-converged
/// runs alike; `converged` tells them apart.
pub struct ScfResult {
    pub converged: bool,
    pub cycles: usize,
    pub e_elec: f64,
    pub mo_energy: SpinVector,
    pub mo_coeff: SpinMatrix,
    pub mo_occ: SpinVector,
    pub dm: SpinMatrix,
}

/// Unrestricted Hartree-Fock driver over fixed one-electron integrals and
/// an external two-electron contraction.
pub struct Uhf<'a> {
    h_core: Array2<f64>,
    ovlp: Array2<f64>,
    // Loewdin orthogonalizer S^{-1/2}, computed once
    x: Array2<f64>,
    jk: &'a dyn JkProvider,
    nelec: (usize, usize),
    params: ScfParams,
}

impl<'a> Uhf<'a> {
    pub fn new(
        h_core: Array2<f64>,
        ovlp: Array2<f64>,
        jk: &'a dyn JkProvider,
        nelec: (usize, usize),
        params: ScfParams,
    ) -> Result<Self> {
        let (n, m) = h_core.dim();
        if n != m || ovlp.dim() != (n, n) {
            return Err(UhfError::DimensionMismatch {
                context: "core Hamiltonian vs overlap",
                expected: n,
                found: ovlp.dim().0,
            });
        }
        let x = ovlp.ssqrt(UPLO::Upper)?.inv()?;
        Ok(Uhf {
            h_core,
            ovlp,
            x,
            jk,
            nelec,
            params,
        })
    }

    pub fn nao(&self) -> usize {
        self.h_core.dim().0
    }

    pub fn nelec(&self) -> (usize, usize) {
        self.nelec
    }

    pub fn overlap(&self) -> ArrayView2<f64> {
        self.ovlp.view()
    }

    /// Solve the generalized eigenvalue problem F C = S C e for both spins
    /// via the cached Loewdin orthogonalizer.
    pub fn eig(&self, f: &SpinMatrix) -> Result<(SpinVector, SpinMatrix)> {
        let solve = |fm: &Array2<f64>| -> Result<(Array1<f64>, Array2<f64>)> {
            let f_orth = self.x.t().dot(fm).dot(&self.x);
            let (e, c_orth) = f_orth.eigh(UPLO::Upper)?;
            Ok((e, self.x.dot(&c_orth)))
        };
        let (e_a, c_a) = solve(&f.alpha)?;
        let (e_b, c_b) = solve(&f.beta)?;
        Ok((SpinVector::new(e_a, e_b), SpinMatrix::new(c_a, c_b)))
    }

    /// Electronic energy and its Coulomb part,
    ///
    /// ```text
    ///     E1 = sum H (D_a + D_b)
    ///     Ecoul = [sum V_a D_a + sum V_b D_b] / 2
    /// ```
    pub fn energy_elec(&self, dm: &SpinMatrix, vhf: &SpinMatrix) -> (f64, f64) {
        let e1 = (&self.h_core * &dm.total().t()).sum();
        let ecoul = 0.5
            * ((&vhf.alpha * &dm.alpha.t()).sum() + (&vhf.beta * &dm.beta.t()).sum());
        (e1 + ecoul, ecoul)
    }

    /// Initial density from the core Hamiltonian alone.
    pub fn init_guess_by_1e(&self) -> Result<SpinMatrix> {
        let f = SpinMatrix::broadcast(self.h_core.view());
        let (mo_energy, mo_coeff) = self.eig(&f)?;
        let mo_occ = get_occ(&mo_energy, self.nelec)?;
        make_rdm1(&mo_coeff, &mo_occ)
    }

    /// Run the SCF loop to convergence or `max_cycle`, starting from `dm0`
    /// or the core-Hamiltonian guess. Convergence requires both the energy
    /// change and the orbital gradient norm to drop below their thresholds
    /// in the same cycle.
    pub fn kernel(&self, dm0: Option<SpinMatrix>) -> Result<ScfResult> {
        let timer = crate::utils::Timer::start();
        let mut dm = match dm0 {
            Some(d) => {
                if d.nao()? != self.nao() {
                    return Err(UhfError::DimensionMismatch {
                        context: "initial density",
                        expected: self.nao(),
                        found: d.nao()?,
                    });
                }
                d
            }
            None => self.init_guess_by_1e()?,
        };
        let mut vhf = get_veff(self.jk, &dm, None, Hermiticity::Hermitian)?;
        let (mut e_elec, _) = self.energy_elec(&dm, &vhf);
        let mut diis = if self.params.use_diis {
            Some(Diis::new(self.params.diis_space))
        } else {
            None
        };

        logging::print_scf_header(self.nao(), self.nelec);
        let mut converged = false;
        let mut cycles = 0;
        let mut orbitals: Option<(SpinVector, SpinMatrix, SpinVector)> = None;
        for cycle in 0..self.params.max_cycle {
            let f = get_fock(
                self.h_core.view(),
                self.ovlp.view(),
                &vhf,
                &dm,
                Some(cycle),
                diis.as_mut(),
                self.params.diis_start_cycle,
                self.params.level_shift,
                self.params.damp,
            )?;
            let (mo_energy, mo_coeff) = self.eig(&f)?;
            let mo_occ = get_occ(&mo_energy, self.nelec)?;
            let dm_new = make_rdm1(&mo_coeff, &mo_occ)?;
            vhf = get_veff(self.jk, &dm_new, Some((&dm, &vhf)), Hermiticity::Hermitian)?;
            dm = dm_new;

            let (e_new, _) = self.energy_elec(&dm, &vhf);
            let de = e_new - e_elec;
            e_elec = e_new;

            // gradient from the bare F = H + V, free of damping, DIIS and
            // level-shift artifacts
            let f_plain = get_fock(
                self.h_core.view(),
                self.ovlp.view(),
                &vhf,
                &dm,
                None,
                None,
                self.params.diis_start_cycle,
                (0.0, 0.0),
                (0.0, 0.0),
            )?;
            let grad = get_grad(&mo_coeff, &mo_occ, &f_plain)?;
            let gnorm = grad.dot(&grad).sqrt();
            if let Ok(gmax) = grad.mapv(f64::abs).max() {
                debug!("cycle {}: max |g| = {:e}", cycle + 1, gmax);
            }
            logging::print_scf_cycle(cycle, e_elec, de, gnorm);

            cycles = cycle + 1;
            orbitals = Some((mo_energy, mo_coeff, mo_occ));
            if de.abs() < self.params.conv_tol && gnorm < self.params.conv_tol_grad {
                converged = true;
                break;
            }
        }
        logging::print_scf_end(converged, cycles, e_elec);
        log::info!("{}", timer);

        let (mo_energy, mo_coeff, mo_occ) = orbitals.ok_or_else(|| {
            UhfError::Config(String::from("max_cycle must be >= 1"))
        })?;
        Ok(ScfResult {
            converged,
            cycles,
            e_elec,
            mo_energy,
            mo_coeff,
            mo_occ,
            dm,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spin::Spin2;
    use crate::veff::EriTensor;

    fn zero_eri(nao: usize) -> EriTensor {
        EriTensor::new(Array4::<f64>::zeros((nao, nao, nao, nao))).unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: UhfConfig = toml::from_str("").unwrap();
        let params = cfg.validate().unwrap();
        assert_eq!(params.max_cycle, defaults::MAX_CYCLE);
        assert_eq!(params.diis_space, defaults::DIIS_SPACE);
        assert!(params.use_diis);
        assert_eq!(params.damp, (0.0, 0.0));
    }

    #[test]
    fn per_spin_knobs_parse_from_toml() {
        let cfg: UhfConfig =
            toml::from_str("damp = 0.4\nlevel_shift = [0.2, 0.0]\nmax_cycle = 10").unwrap();
        let params = cfg.validate().unwrap();
        assert_eq!(params.damp, (0.4, 0.4));
        assert_eq!(params.level_shift, (0.2, 0.0));
        assert_eq!(params.max_cycle, 10);
    }

    #[test]
    fn stale_config_version_is_rejected() {
        let cfg: UhfConfig = toml::from_str("version = 99").unwrap();
        assert!(matches!(cfg.validate(), Err(UhfError::Config(_))));
    }

    #[test]
    fn electron_split_honors_spin() {
        assert_eq!(nelec_from_spin(3, 1).unwrap(), (2, 1));
        assert_eq!(nelec_from_spin(4, 0).unwrap(), (2, 2));
        assert!(nelec_from_spin(3, 0).is_err());
        assert!(nelec_from_spin(1, 3).is_err());
    }

    #[test]
    fn loewdin_route_solves_generalized_problem() {
        // with F = S the generalized eigenvalues are all 1
        let s: Array2<f64> = array![[1.0, 0.5], [0.5, 1.0]];
        let jk = zero_eri(2);
        let mf = Uhf::new(s.clone(), s.clone(), &jk, (1, 1), ScfParams::default()).unwrap();
        let f = Spin2::new(s.clone(), s);
        let (e, _) = mf.eig(&f).unwrap();
        approx::assert_abs_diff_eq!(e.alpha, array![1.0, 1.0], epsilon = 1e-10);
    }

    #[test]
    fn core_guess_fills_lowest_orbitals() {
        let h: Array2<f64> = array![[-1.0, 0.0], [0.0, -0.5]];
        let s: Array2<f64> = Array2::eye(2);
        let jk = zero_eri(2);
        let mf = Uhf::new(h, s, &jk, (1, 1), ScfParams::default()).unwrap();
        let dm = mf.init_guess_by_1e().unwrap();
        approx::assert_abs_diff_eq!(dm.alpha, array![[1.0, 0.0], [0.0, 0.0]], epsilon = 1e-10);
    }

    #[test]
    fn non_interacting_system_converges_immediately() {
        let h: Array2<f64> = array![[-1.0, 0.0], [0.0, -0.5]];
        let s: Array2<f64> = Array2::eye(2);
        let jk = zero_eri(2);
        let mf = Uhf::new(h, s, &jk, (1, 1), ScfParams::default()).unwrap();
        let res = mf.kernel(None).unwrap();
        assert!(res.converged);
        approx::assert_abs_diff_eq!(res.e_elec, -2.0, epsilon = 1e-10);
        approx::assert_abs_diff_eq!(res.mo_occ.alpha, array![1.0, 0.0], epsilon = 1e-12);
    }

    #[test]
    fn unconverged_run_is_reported_not_raised() {
        // an on-site repulsion makes the first cycle rotate the density, so
        // one iteration cannot satisfy a 1e-30 energy threshold
        let h: Array2<f64> = array![[-1.0, 0.3], [0.3, -0.5]];
        let s: Array2<f64> = Array2::eye(2);
        let mut eri = Array4::<f64>::zeros((2, 2, 2, 2));
        eri[[0, 0, 0, 0]] = 1.0;
        let jk = EriTensor::new(eri).unwrap();
        let cfg: UhfConfig = toml::from_str("max_cycle = 1\nconv_tol = 1e-30").unwrap();
        let mf = Uhf::new(h, s, &jk, (1, 1), cfg.validate().unwrap()).unwrap();
        let res = mf.kernel(None).unwrap();
        assert!(!res.converged);
        assert_eq!(res.cycles, 1);
    }
}
