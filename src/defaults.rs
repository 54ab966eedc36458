// SCF ITERATION
// stop the SCF loop after this many cycles
pub const MAX_CYCLE: usize = 50;
// convergence threshold for the electronic energy between cycles
pub const CONV_TOL: f64 = 1.0e-7;
// convergence threshold for the norm of the occupied-virtual orbital gradient
pub const CONV_TOL_GRAD: f64 = 1.0e-5;

// CONVERGENCE ACCELERATION
// density-based damping factor, applied per spin before DIIS takes over
pub const DAMP_FACTOR: f64 = 0.0;
// level shift (in Hartree) pushing virtual orbitals up, per spin
pub const LEVEL_SHIFT_FACTOR: f64 = 0.0;
// damping and level shifting are skipped when the summed per-spin magnitude
// drops below this threshold
pub const FOCK_CORR_THRESH: f64 = 1.0e-4;
// first cycle at which DIIS extrapolation is applied
pub const DIIS_START_CYCLE: usize = 0;
// size of the DIIS subspace, number of stored Fock/error pairs
pub const DIIS_SPACE: usize = 8;
pub const USE_DIIS: bool = true;

// DIAGNOSTICS
// HOMO and LUMO closer than this (in Hartree) trigger a warning
pub const HOMO_LUMO_WARN_GAP: f64 = 1.0e-3;
// number of orbital energies per line in the debug table
pub const MO_ENERGY_PRINT_WIDTH: usize = 6;

// ANALYSIS
// singular values of the occupied-block overlap below this floor make the
// pseudoinverse rotation meaningless
pub const SV_FLOOR: f64 = 1.0e-12;

// CONFIGURATION
pub const CONFIG_VERSION: u32 = 1;
