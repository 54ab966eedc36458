use crate::errors::Result;
use crate::occupation::{occupied_indices, virtual_indices};
use crate::spin::{SpinMatrix, SpinVector};
use ndarray::prelude::*;
use ndarray::concatenate;

/// Occupied-virtual orbital gradient of the SCF energy,
///
/// ```text
///     g_ai = (C_vir^T F C_occ)_ai
/// ```
///
/// flattened per spin and concatenated alpha-first. The norm of this
/// vector is the convergence measure of the SCF loop; at a stationary
/// point it vanishes.
pub fn get_grad(
    mo_coeff: &SpinMatrix,
    mo_occ: &SpinVector,
    fock: &SpinMatrix,
) -> Result<Array1<f64>> {
    mo_occ.nmo()?;
    let g_a = grad_spin(&mo_coeff.alpha, &mo_occ.alpha, &fock.alpha);
    let g_b = grad_spin(&mo_coeff.beta, &mo_occ.beta, &fock.beta);
    Ok(concatenate![Axis(0), g_a, g_b])
}

fn grad_spin(c: &Array2<f64>, occ: &Array1<f64>, f: &Array2<f64>) -> Array1<f64> {
    let occidx = occupied_indices(occ);
    let viridx = virtual_indices(occ);
    let c_occ = c.select(Axis(1), &occidx);
    let c_vir = c.select(Axis(1), &viridx);
    let g = c_vir.t().dot(f).dot(&c_occ);
    Array1::from_iter(g.iter().cloned())
}

#[test]
fn gradient_vanishes_for_eigenvectors() {
    use crate::spin::Spin2;
    let c = Spin2::new(Array2::<f64>::eye(2), Array2::<f64>::eye(2));
    let occ = Spin2::new(array![1.0, 0.0], array![1.0, 0.0]);
    let f = Spin2::new(array![[-1.0, 0.0], [0.0, -0.5]], array![[-0.9, 0.0], [0.0, -0.4]]);
    let g = get_grad(&c, &occ, &f).unwrap();
    assert_eq!(g.len(), 2);
    approx::assert_abs_diff_eq!(g, Array1::zeros(2), epsilon = 1e-12);
}

#[test]
fn gradient_picks_up_ov_coupling() {
    use crate::spin::Spin2;
    let c = Spin2::new(Array2::<f64>::eye(2), Array2::<f64>::eye(2));
    let occ = Spin2::new(array![1.0, 0.0], array![0.0, 1.0]);
    let f = Spin2::new(array![[-1.0, 0.3], [0.3, -0.5]], array![[-1.0, 0.2], [0.2, -0.5]]);
    let g = get_grad(&c, &occ, &f).unwrap();
    // alpha block: F_10, beta block: F_01 (occupied orbital is the second)
    approx::assert_abs_diff_eq!(g, array![0.3, 0.2], epsilon = 1e-12);
}
