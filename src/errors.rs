use ndarray_linalg::error::LinalgError;
use std::fmt;

/// Failure modes of the UHF numeric core. All of these are local,
/// non-recoverable failures that are surfaced to the SCF driver; none of
/// them is silently swallowed or defaulted.
#[derive(Debug, Clone)]
pub enum UhfError {
    /// Input matrices with inconsistent `nao` or spin-pair shape.
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        found: usize,
    },
    /// Determinant overlap between states with unequal total electron count.
    ElectronCountMismatch { bra: usize, ket: usize },
    /// Spin-squared value below the valid domain of the multiplicity formula.
    NumericalDegeneracy { spin_square: f64 },
    /// Occupied-subspace overlap with a (near-)zero singular value; the
    /// pseudoinverse rotation would be garbage.
    SingularOverlap {
        spin: Spin,
        index: usize,
        value: f64,
    },
    /// A code path that exists in the interface but is deliberately not
    /// supported by the real-orbital formalism.
    Unimplemented(&'static str),
    /// Invalid configuration detected at construction time.
    Config(String),
    /// Failure inside the linear-algebra backend (eigensolve, SVD, solve).
    Linalg(String),
}

/// Spin channel label used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spin {
    Alpha,
    Beta,
}

impl fmt::Display for Spin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Spin::Alpha => write!(f, "alpha"),
            Spin::Beta => write!(f, "beta"),
        }
    }
}

impl fmt::Display for UhfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UhfError::DimensionMismatch {
                context,
                expected,
                found,
            } => write!(
                f,
                "dimension mismatch in {}: expected {}, found {}",
                context, expected, found
            ),
            UhfError::ElectronCountMismatch { bra, ket } => write!(
                f,
                "electron numbers are not equal ({} vs {}); electronic coupling does not exist",
                bra, ket
            ),
            UhfError::NumericalDegeneracy { spin_square } => write!(
                f,
                "spin-squared expectation value {} is below -1/4; orbitals are \
                 non-orthonormal or mismatched",
                spin_square
            ),
            UhfError::SingularOverlap { spin, index, value } => write!(
                f,
                "{} occupied-orbital overlap has singular value {:e} at index {}; \
                 the determinants are (numerically) orthogonal",
                spin, value, index
            ),
            UhfError::Unimplemented(what) => write!(f, "not implemented: {}", what),
            UhfError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            UhfError::Linalg(msg) => write!(f, "linear algebra backend failure: {}", msg),
        }
    }
}

impl std::error::Error for UhfError {}

impl From<LinalgError> for UhfError {
    fn from(err: LinalgError) -> Self {
        UhfError::Linalg(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, UhfError>;
