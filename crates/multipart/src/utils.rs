//! Internal helper macros.

/// Returns early with `$error` when `$predicate` does not hold.
///
/// Works like `assert!` but produces an `Err` instead of panicking, which keeps
/// validation code in the builders linear.
///
/// ```ignore
/// ensure!(token.len() <= MAX_BOUNDARY_LEN, MultipartError::invalid_boundary("too long"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
