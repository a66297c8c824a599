//! Shared helpers for the bank builder and the crate-wide error type.

use std::error;
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum SpiirError {
    /// A caller-supplied value is out of its valid domain.
    InvalidInput(String),
    /// A waveform or response with zero (or non-finite) energy was about to
    /// be used as a divisor.
    ZeroNorm(&'static str),
    /// The correlation peak is too close to the edge of the search window to
    /// extract a kernel of the requested length.
    InsufficientAutocorrelationData {
        peak: usize,
        length: usize,
        available: usize,
    },
    Generator(String),
    Decomposition(String),
    Optimizer(String),
    Serialization(String),
}

impl fmt::Display for SpiirError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpiirError::InvalidInput(msg) => {
                write!(f, "Invalid input: {}", msg)
            }
            SpiirError::ZeroNorm(what) => {
                write!(f, "Zero norm: {} has no energy", what)
            }
            SpiirError::InsufficientAutocorrelationData {
                peak,
                length,
                available,
            } => write!(
                f,
                "Insufficient autocorrelation data: cannot extract {} \
                 samples around peak {} of {}",
                length, peak, available
            ),
            SpiirError::Generator(msg) => {
                write!(f, "Waveform generator error: {}", msg)
            }
            SpiirError::Decomposition(msg) => {
                write!(f, "IIR decomposition error: {}", msg)
            }
            SpiirError::Optimizer(msg) => write!(f, "Optimizer error: {}", msg),
            SpiirError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
        }
    }
}

impl error::Error for SpiirError {
    fn cause(&self) -> Option<&dyn error::Error> {
        None
    }
}

impl From<serde_cbor::Error> for SpiirError {
    fn from(err: serde_cbor::Error) -> Self {
        SpiirError::Serialization(err.to_string())
    }
}

/// Some basic math functions used elsewhere in the project
pub mod math;
