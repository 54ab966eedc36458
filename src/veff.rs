use crate::errors::{Result, UhfError};
use crate::spin::{Spin2, SpinMatrix};
use itertools::Itertools;
use ndarray::prelude::*;
use ndarray_einsum_beta::einsum;

/// Symmetry of the density matrices handed to the integral contraction.
/// AO-direct providers exploit this to skip redundant shell quartets; the
/// in-memory provider contracts the full tensor either way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hermiticity {
    NonHermitian,
    Hermitian,
    AntiHermitian,
}

/// External two-electron integral contraction. Given a batch of density
/// matrices, produce the Coulomb matrices J and exchange matrices K,
///
/// ```text
///     J_ij = sum_kl (ij|kl) D_lk        K_ij = sum_kl (il|kj) D_lk
/// ```
///
/// shaped identically to the input batch.
///
/// The incremental (delta-density) mode of `get_veff` relies on this
/// contraction being exactly linear in the density. That holds for plain
/// Coulomb/exchange; a provider with any non-linear density response must
/// not be used through the baseline path.
pub trait JkProvider {
    fn jk(
        &self,
        dms: &[ArrayView2<f64>],
        hermi: Hermiticity,
    ) -> Result<(Vec<Array2<f64>>, Vec<Array2<f64>>)>;
}

/// In-memory 4-index electron repulsion integrals (pq|rs) in chemist
/// notation, contracted with einsum. Suitable for small basis sets where
/// the O(nao^4) tensor fits in memory.
pub struct EriTensor {
    eri: Array4<f64>,
}

impl EriTensor {
    pub fn new(eri: Array4<f64>) -> Result<Self> {
        let (p, q, r, s) = eri.dim();
        if q != p || r != p || s != p {
            return Err(UhfError::DimensionMismatch {
                context: "two-electron integral tensor",
                expected: p,
                found: q.max(r).max(s),
            });
        }
        Ok(EriTensor { eri })
    }

    pub fn nao(&self) -> usize {
        self.eri.dim().0
    }
}

impl JkProvider for EriTensor {
    fn jk(
        &self,
        dms: &[ArrayView2<f64>],
        _hermi: Hermiticity,
    ) -> Result<(Vec<Array2<f64>>, Vec<Array2<f64>>)> {
        let nao = self.nao();
        let mut vj: Vec<Array2<f64>> = Vec::with_capacity(dms.len());
        let mut vk: Vec<Array2<f64>> = Vec::with_capacity(dms.len());
        for dm in dms {
            if dm.dim() != (nao, nao) {
                return Err(UhfError::DimensionMismatch {
                    context: "density matrix vs integral tensor",
                    expected: nao,
                    found: dm.dim().0,
                });
            }
            let j = einsum("ijkl,lk->ij", &[&self.eri.view(), dm])
                .map_err(|e| UhfError::Linalg(e.to_string()))?
                .into_dimensionality::<Ix2>()
                .map_err(|e| UhfError::Linalg(e.to_string()))?;
            let k = einsum("ilkj,lk->ij", &[&self.eri.view(), dm])
                .map_err(|e| UhfError::Linalg(e.to_string()))?
                .into_dimensionality::<Ix2>()
                .map_err(|e| UhfError::Linalg(e.to_string()))?;
            vj.push(j);
            vk.push(k);
        }
        Ok((vj, vk))
    }
}

/// Fold per-spin Coulomb and exchange matrices into the UHF effective
/// potential. Both spins feel the total Coulomb field, each spin only its
/// own exchange:
///
/// ```text
///     V_a = (J_a + J_b) - K_a        V_b = (J_a + J_b) - K_b
/// ```
pub fn make_vhf(vj: &SpinMatrix, vk: &SpinMatrix) -> SpinMatrix {
    let j_tot = vj.total();
    Spin2::new(&j_tot - &vk.alpha, &j_tot - &vk.beta)
}

/// Two-electron contribution to the Fock matrix for a batch of density
/// pairs. With a baseline `(dm_last, vhf_last)` only the potential of the
/// density increment dm - dm_last is contracted and vhf_last is added back,
/// which avoids recontracting integrals when the density changes little
/// between cycles. The spin axis is flattened into the batch axis before
/// the provider call and restored afterwards.
pub fn get_veff_batch(
    jk: &dyn JkProvider,
    dms: &[SpinMatrix],
    baseline: Option<(&[SpinMatrix], &[SpinMatrix])>,
    hermi: Hermiticity,
) -> Result<Vec<SpinMatrix>> {
    if dms.is_empty() {
        return Ok(Vec::new());
    }
    let nao = dms[0].nao()?;
    for dm in dms.iter().skip(1) {
        if dm.nao()? != nao {
            return Err(UhfError::DimensionMismatch {
                context: "density batch",
                expected: nao,
                found: dm.nao()?,
            });
        }
    }

    let ddms: Vec<SpinMatrix> = match baseline {
        Some((dm_last, _)) => {
            if dm_last.len() != dms.len() {
                return Err(UhfError::DimensionMismatch {
                    context: "baseline density batch",
                    expected: dms.len(),
                    found: dm_last.len(),
                });
            }
            dms.iter()
                .zip(dm_last.iter())
                .map(|(dm, dm0)| Spin2::new(&dm.alpha - &dm0.alpha, &dm.beta - &dm0.beta))
                .collect()
        }
        None => dms.to_vec(),
    };

    // (dm_a, dm_b) pairs become [dm_a, dm_b, dm_a, dm_b, ..] for the provider
    let flat: Vec<ArrayView2<f64>> = ddms
        .iter()
        .flat_map(|pair| vec![pair.alpha.view(), pair.beta.view()])
        .collect();
    let (vj, vk) = jk.jk(&flat, hermi)?;
    if vj.len() != flat.len() || vk.len() != flat.len() {
        return Err(UhfError::DimensionMismatch {
            context: "provider J/K batch",
            expected: flat.len(),
            found: vj.len().min(vk.len()),
        });
    }

    let vj_pairs: Vec<SpinMatrix> = vj
        .into_iter()
        .tuples()
        .map(|(a, b)| Spin2::new(a, b))
        .collect();
    let vk_pairs: Vec<SpinMatrix> = vk
        .into_iter()
        .tuples()
        .map(|(a, b)| Spin2::new(a, b))
        .collect();

    let mut vhf: Vec<SpinMatrix> = vj_pairs
        .iter()
        .zip(vk_pairs.iter())
        .map(|(j, k)| make_vhf(j, k))
        .collect();
    if let Some((_, vhf_last)) = baseline {
        if vhf_last.len() != vhf.len() {
            return Err(UhfError::DimensionMismatch {
                context: "baseline potential batch",
                expected: vhf.len(),
                found: vhf_last.len(),
            });
        }
        for (v, v0) in vhf.iter_mut().zip(vhf_last.iter()) {
            v.alpha += &v0.alpha;
            v.beta += &v0.beta;
        }
    }
    Ok(vhf)
}

/// Single-pair convenience wrapper around `get_veff_batch`.
pub fn get_veff(
    jk: &dyn JkProvider,
    dm: &SpinMatrix,
    baseline: Option<(&SpinMatrix, &SpinMatrix)>,
    hermi: Hermiticity,
) -> Result<SpinMatrix> {
    let vhf = match baseline {
        Some((dm_last, vhf_last)) => get_veff_batch(
            jk,
            std::slice::from_ref(dm),
            Some((std::slice::from_ref(dm_last), std::slice::from_ref(vhf_last))),
            hermi,
        )?,
        None => get_veff_batch(jk, std::slice::from_ref(dm), None, hermi)?,
    };
    vhf.into_iter()
        .next()
        .ok_or_else(|| UhfError::Linalg(String::from("empty potential batch")))
}

#[cfg(test)]
fn separable_eri(nao: usize) -> EriTensor {
    // (ij|kl) = delta_ij delta_kl, for which J = tr(D) * 1 and K = D
    let mut eri = Array4::<f64>::zeros((nao, nao, nao, nao));
    for i in 0..nao {
        for k in 0..nao {
            eri[[i, i, k, k]] = 1.0;
        }
    }
    EriTensor::new(eri).unwrap()
}

#[test]
fn jk_of_separable_integrals() {
    let jk = separable_eri(2);
    let dm: Array2<f64> = array![[1.0, 0.2], [0.2, 0.5]];
    let (vj, vk) = jk.jk(&[dm.view()], Hermiticity::Hermitian).unwrap();
    let eye: Array2<f64> = Array2::eye(2);
    approx::assert_abs_diff_eq!(vj[0], eye.mapv(|x| 1.5 * x), epsilon = 1e-12);
    approx::assert_abs_diff_eq!(vk[0], dm, epsilon = 1e-12);
}

#[test]
fn vhf_combination_per_spin() {
    let vj = Spin2::new(array![[1.0, 0.0], [0.0, 1.0]], array![[0.5, 0.0], [0.0, 0.5]]);
    let vk = Spin2::new(array![[0.2, 0.0], [0.0, 0.2]], array![[0.1, 0.0], [0.0, 0.1]]);
    let vhf = make_vhf(&vj, &vk);
    approx::assert_abs_diff_eq!(vhf.alpha, array![[1.3, 0.0], [0.0, 1.3]], epsilon = 1e-12);
    approx::assert_abs_diff_eq!(vhf.beta, array![[1.4, 0.0], [0.0, 1.4]], epsilon = 1e-12);
}

#[test]
fn zero_baseline_matches_direct_potential() {
    let jk = separable_eri(2);
    let dm = Spin2::new(array![[1.0, 0.1], [0.1, 0.0]], array![[0.8, 0.0], [0.0, 0.2]]);
    let zero = Spin2::new(Array2::<f64>::zeros((2, 2)), Array2::<f64>::zeros((2, 2)));
    let direct = get_veff(&jk, &dm, None, Hermiticity::Hermitian).unwrap();
    let incr = get_veff(&jk, &dm, Some((&zero, &zero)), Hermiticity::Hermitian).unwrap();
    approx::assert_abs_diff_eq!(direct.alpha, incr.alpha, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(direct.beta, incr.beta, epsilon = 1e-12);
}

#[test]
fn incremental_update_exploits_linearity() {
    let jk = separable_eri(2);
    let dm0 = Spin2::new(array![[0.9, 0.0], [0.0, 0.1]], array![[0.7, 0.1], [0.1, 0.3]]);
    let dm = Spin2::new(array![[1.0, 0.1], [0.1, 0.0]], array![[0.8, 0.0], [0.0, 0.2]]);
    let vhf0 = get_veff(&jk, &dm0, None, Hermiticity::Hermitian).unwrap();
    let direct = get_veff(&jk, &dm, None, Hermiticity::Hermitian).unwrap();
    let incr = get_veff(&jk, &dm, Some((&dm0, &vhf0)), Hermiticity::Hermitian).unwrap();
    approx::assert_abs_diff_eq!(direct.alpha, incr.alpha, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(direct.beta, incr.beta, epsilon = 1e-12);
}

#[test]
fn batched_pairs_match_single_calls() {
    let jk = separable_eri(2);
    let dm1 = Spin2::new(array![[1.0, 0.0], [0.0, 0.0]], array![[0.0, 0.0], [0.0, 1.0]]);
    let dm2 = Spin2::new(array![[0.5, 0.2], [0.2, 0.5]], array![[0.5, -0.2], [-0.2, 0.5]]);
    let batch = get_veff_batch(
        &jk,
        &[dm1.clone(), dm2.clone()],
        None,
        Hermiticity::Hermitian,
    )
    .unwrap();
    let one = get_veff(&jk, &dm1, None, Hermiticity::Hermitian).unwrap();
    let two = get_veff(&jk, &dm2, None, Hermiticity::Hermitian).unwrap();
    approx::assert_abs_diff_eq!(batch[0].alpha, one.alpha, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(batch[1].beta, two.beta, epsilon = 1e-12);
}
