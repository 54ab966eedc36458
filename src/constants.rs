// conversion from atomic units (e * a0) to Debye for dipole moments
pub const AU_TO_DEBYE: f64 = 2.541746;
