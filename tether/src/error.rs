use core::fmt;

/// Control block or buffer allocation failed.
///
/// Returned by the fallible construction paths. The value or object being
/// wrapped has already been destroyed when this is produced — the failure
/// path never leaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "allocation failed")
    }
}

impl std::error::Error for AllocError {}
