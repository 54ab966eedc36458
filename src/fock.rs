use crate::defaults;
use crate::diis::Diis;
use crate::errors::Result;
use crate::spin::{Spin2, SpinMatrix};
use ndarray::prelude::*;

/// Density-based damping of a single-spin Fock matrix,
///
/// ```text
///     F' = F - [(1 - S D) F D S + h.c.] * factor / (factor + 1)
/// ```
///
/// which attenuates the occupied-virtual coupling while leaving the
/// occupied-occupied and virtual-virtual blocks untouched.
pub fn damping(
    s: ArrayView2<f64>,
    d: ArrayView2<f64>,
    f: ArrayView2<f64>,
    factor: f64,
) -> Array2<f64> {
    let nao = s.dim().0;
    let dm_vir: Array2<f64> = Array2::eye(nao) - s.dot(&d);
    let f0 = dm_vir.dot(&f).dot(&d).dot(&s);
    let f0 = (&f0 + &f0.t()) * (factor / (factor + 1.0));
    &f - &f0
}

/// Level shift for a single spin channel,
///
/// ```text
///     F' = F + (S - S D S) * factor
/// ```
///
/// raising the virtual orbital energies by `factor` Hartree while keeping
/// the occupied spectrum in place.
pub fn level_shift(
    s: ArrayView2<f64>,
    d: ArrayView2<f64>,
    f: ArrayView2<f64>,
    factor: f64,
) -> Array2<f64> {
    let dm_vir = (&s - &s.dot(&d).dot(&s)) * factor;
    &f + &dm_vir
}

/// Assemble the spin-paired Fock matrix F = H + V and apply the
/// convergence aids in their fixed order: damping, then DIIS
/// extrapolation, then level shifting.
///
/// `cycle` is the zero-based SCF iteration; `None` marks a one-shot build
/// outside the SCF loop, for which damping and DIIS never apply. Damping
/// is active for cycles before `diis_start_cycle - 1`, DIIS from
/// `diis_start_cycle` on. Damping and shifting are skipped entirely when
/// the summed per-spin magnitude is negligible.
pub fn get_fock(
    h1e: ArrayView2<f64>,
    s1e: ArrayView2<f64>,
    vhf: &SpinMatrix,
    dm: &SpinMatrix,
    cycle: Option<usize>,
    diis: Option<&mut Diis>,
    diis_start_cycle: usize,
    level_shift_factor: (f64, f64),
    damp_factor: (f64, f64),
) -> Result<SpinMatrix> {
    let (dampa, dampb) = damp_factor;
    let (shifta, shiftb) = level_shift_factor;

    let mut f = Spin2::new(&h1e + &vhf.alpha, &h1e + &vhf.beta);

    if let Some(c) = cycle {
        if c + 1 < diis_start_cycle && dampa.abs() + dampb.abs() > defaults::FOCK_CORR_THRESH {
            f = Spin2::new(
                damping(s1e, dm.alpha.view(), f.alpha.view(), dampa),
                damping(s1e, dm.beta.view(), f.beta.view(), dampb),
            );
        }
        if let Some(d) = diis {
            if c >= diis_start_cycle {
                f = d.update(s1e, dm, &f)?;
            }
        }
    }

    if shifta.abs() + shiftb.abs() > defaults::FOCK_CORR_THRESH {
        f = Spin2::new(
            level_shift(s1e, dm.alpha.view(), f.alpha.view(), shifta),
            level_shift(s1e, dm.beta.view(), f.beta.view(), shiftb),
        );
    }
    Ok(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fock_is_core_plus_potential() {
        let h: Array2<f64> = array![[-1.0, 0.0], [0.0, -0.5]];
        let s: Array2<f64> = Array2::eye(2);
        let vhf = Spin2::new(array![[0.2, 0.0], [0.0, 0.1]], Array2::zeros((2, 2)));
        let dm = Spin2::new(Array2::eye(2), Array2::eye(2));
        let f = get_fock(
            h.view(),
            s.view(),
            &vhf,
            &dm,
            None,
            None,
            0,
            (0.0, 0.0),
            (0.0, 0.0),
        )
        .unwrap();
        approx::assert_abs_diff_eq!(f.alpha, array![[-0.8, 0.0], [0.0, -0.4]], epsilon = 1e-12);
        approx::assert_abs_diff_eq!(f.beta, h, epsilon = 1e-12);
    }

    #[test]
    fn damping_attenuates_offdiagonal_block() {
        // s = 1, d = diag(1, 0): the correction picks out the ov coupling
        let s: Array2<f64> = Array2::eye(2);
        let d: Array2<f64> = array![[1.0, 0.0], [0.0, 0.0]];
        let f: Array2<f64> = array![[-1.0, 0.4], [0.4, -0.5]];
        let out = damping(s.view(), d.view(), f.view(), 1.0);
        approx::assert_abs_diff_eq!(out, array![[-1.0, 0.2], [0.2, -0.5]], epsilon = 1e-12);
    }

    #[test]
    fn level_shift_raises_virtual_diagonal() {
        let s: Array2<f64> = Array2::eye(2);
        let d: Array2<f64> = array![[1.0, 0.0], [0.0, 0.0]];
        let f: Array2<f64> = array![[-1.0, 0.0], [0.0, -0.5]];
        let out = level_shift(s.view(), d.view(), f.view(), 0.5);
        approx::assert_abs_diff_eq!(out, array![[-1.0, 0.0], [0.0, 0.0]], epsilon = 1e-12);
    }

    #[test]
    fn damping_window_closes_at_diis_start() {
        let h: Array2<f64> = array![[-1.0, 0.4], [0.4, -0.5]];
        let s: Array2<f64> = Array2::eye(2);
        let vhf = Spin2::new(Array2::zeros((2, 2)), Array2::zeros((2, 2)));
        let dm = Spin2::new(array![[1.0, 0.0], [0.0, 0.0]], array![[1.0, 0.0], [0.0, 0.0]]);
        // cycle 0 with diis_start_cycle = 2 lies inside the damping window
        let early = get_fock(
            h.view(),
            s.view(),
            &vhf,
            &dm,
            Some(0),
            None,
            2,
            (0.0, 0.0),
            (1.0, 1.0),
        )
        .unwrap();
        approx::assert_abs_diff_eq!(
            early.alpha,
            array![[-1.0, 0.2], [0.2, -0.5]],
            epsilon = 1e-12
        );
        // cycle 1 is the last pre-DIIS cycle and no longer damped
        let late = get_fock(
            h.view(),
            s.view(),
            &vhf,
            &dm,
            Some(1),
            None,
            2,
            (0.0, 0.0),
            (1.0, 1.0),
        )
        .unwrap();
        approx::assert_abs_diff_eq!(late.alpha, h, epsilon = 1e-12);
    }

    #[test]
    fn negligible_factors_leave_fock_untouched() {
        let h: Array2<f64> = array![[-1.0, 0.4], [0.4, -0.5]];
        let s: Array2<f64> = Array2::eye(2);
        let vhf = Spin2::new(Array2::zeros((2, 2)), Array2::zeros((2, 2)));
        let dm = Spin2::new(array![[1.0, 0.0], [0.0, 0.0]], array![[1.0, 0.0], [0.0, 0.0]]);
        let f = get_fock(
            h.view(),
            s.view(),
            &vhf,
            &dm,
            Some(0),
            None,
            5,
            (4.0e-5, 4.0e-5),
            (4.0e-5, 4.0e-5),
        )
        .unwrap();
        approx::assert_abs_diff_eq!(f.alpha, h, epsilon = 1e-12);
    }
}
