//! Numeric core of unrestricted Hartree-Fock: effective potential
//! assembly, Fock construction with damping, DIIS and level shifting,
//! aufbau occupation, orbital gradients and the post-SCF analysis toolbox
//! (spin contamination, determinant overlaps, Mulliken populations,
//! dipole moments).
//!
//! Integrals are taken as plain `ndarray` inputs; the two-electron side
//! is abstracted behind [`veff::JkProvider`] so that in-memory tensors
//! and external contraction engines plug in the same way.

pub mod analysis;
pub mod constants;
pub mod defaults;
pub mod diis;
pub mod errors;
pub mod fock;
pub mod gradient;
pub mod guess;
pub mod logging;
pub mod occupation;
pub mod scf;
pub mod spin;
pub mod utils;
pub mod veff;

pub use crate::diis::Diis;
pub use crate::errors::{Result, Spin, UhfError};
pub use crate::scf::{nelec_from_spin, ScfParams, ScfResult, Uhf, UhfConfig};
pub use crate::spin::{Spin2, SpinMatrix, SpinParam, SpinVector};
pub use crate::veff::{EriTensor, Hermiticity, JkProvider};
