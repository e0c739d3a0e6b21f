//! Error types shared by the element-level assembly routines.
use crate::constitutive::ConstitutiveError;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Fatal failures of the nonlocal assembly.
///
/// Every variant identifies the offending element (and quadrature point, where applicable)
/// by its index in the element arena. None of these errors are recovered from inside the
/// assembler. They unwind to the caller, which may e.g. reduce the time step and restart
/// from the last committed state.
#[derive(Debug)]
pub enum NonlocalError {
    /// The constitutive model failed to integrate the stress at a quadrature point.
    ConstitutiveIntegrationFailure {
        element: usize,
        point: usize,
        source: ConstitutiveError,
    },
    /// A quadrature point has no neighbors within the internal length.
    DegenerateNeighborhood {
        element: usize,
        point: usize,
        internal_length: f64,
    },
    /// The normalized nonlocal weights of a quadrature point do not sum to one.
    PartitionOfUnityViolation { element: usize, point: usize, sum: f64 },
    /// The damage computed at a quadrature point lies outside [0, 1].
    DamageOutOfRange { element: usize, point: usize, damage: f64 },
    /// A neighbor has not been pre-assembled for the current iterate.
    StalePreAssembly {
        element: usize,
        point: usize,
        expected_iterate: u64,
        found_iterate: u64,
    },
    /// Nonlocal quantities were requested before the neighbor graph was built.
    MissingNeighborGraph { element: usize },
    /// A configuration or initial-condition value is not admissible.
    InvalidParameter { name: &'static str, value: f64 },
    /// An input array has the wrong length.
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// The element map is singular (or inverted) at a quadrature point.
    SingularJacobian { element: usize, point: usize },
    /// Integration point data was produced with a different quadrature rule.
    IntegrationOrderMismatch {
        element: usize,
        expected: usize,
        actual: usize,
    },
}

impl Display for NonlocalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use NonlocalError::*;
        match self {
            ConstitutiveIntegrationFailure { element, point, source } => write!(
                f,
                "Computation of local constitutive relation failed in element {} at integration point {}: {}",
                element, point, source
            ),
            DegenerateNeighborhood {
                element,
                point,
                internal_length,
            } => write!(
                f,
                "No nonlocal neighbors found for integration point {} of element {} (internal length {})",
                point, element, internal_length
            ),
            PartitionOfUnityViolation { element, point, sum } => write!(
                f,
                "Nonlocal weights of integration point {} of element {} sum to {} instead of 1",
                point, element, sum
            ),
            DamageOutOfRange { element, point, damage } => write!(
                f,
                "Damage {} at integration point {} of element {} is outside [0, 1]",
                damage, point, element
            ),
            StalePreAssembly {
                element,
                point,
                expected_iterate,
                found_iterate,
            } => write!(
                f,
                "Integration point {} of element {} was pre-assembled for iterate {} but iterate {} is being assembled",
                point, element, found_iterate, expected_iterate
            ),
            MissingNeighborGraph { element } => {
                write!(f, "Element {} has no nonlocal neighbor table", element)
            }
            InvalidParameter { name, value } => write!(f, "Invalid value {} for parameter '{}'", value, name),
            DimensionMismatch { what, expected, actual } => {
                write!(f, "Expected {} entries for {}, got {}", expected, what, actual)
            }
            SingularJacobian { element, point } => write!(
                f,
                "Singular element Jacobian encountered in element {} at integration point {}",
                element, point
            ),
            IntegrationOrderMismatch {
                element,
                expected,
                actual,
            } => write!(
                f,
                "Integration point data for element {} uses integration order {}, expected {}",
                element, actual, expected
            ),
        }
    }
}

impl Error for NonlocalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NonlocalError::ConstitutiveIntegrationFailure { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub(crate) fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), NonlocalError> {
    if expected == actual {
        Ok(())
    } else {
        Err(NonlocalError::DimensionMismatch { what, expected, actual })
    }
}
