//! kestrel assertion macros.
//!
//! Those assertions are borrowed from `pretty_assertions` crate and made
//! with small modification which returns `Err(Error)` instead of
//! panicking. The runner recognizes [`Error`] inside the returned
//! `eyre::Report` and reports the test as failed rather than errored.

/// Error produced by the assertion macros. A test body that returns it
/// (wrapped in `eyre::Report`) is classified as an assertion failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("{0}")]
    Check(String),
    #[error("{0}")]
    StrEq(String),
    #[error("{0}")]
    Eq(String),
    #[error("{0}")]
    Ne(String),
}

/// Returns true when `report` was produced by one of the assertion macros.
pub fn is_assertion(report: &eyre::Report) -> bool {
    report.downcast_ref::<Error>().is_some()
}

/// Asserts that a boolean expression is true.
///
/// # Examples
///
/// ```rust,ignore
/// use kestrel::check;
///
/// s.it("is sorted", || {
///     let v = vec![1, 2, 3];
///     check!(v.windows(2).all(|w| w[0] <= w[1]));
///     check!(!v.is_empty(), "vector should have items");
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! check {
    ($cond:expr) => {
        $crate::check!(@ $cond, "", "");
    };
    ($cond:expr, $($arg:tt)+) => {
        $crate::check!(@ $cond, ": ", $($arg)+);
    };
    (@ $cond:expr, $maybe_colon:expr, $($arg:tt)*) => {
        if !$cond {
            let __message = format!("check failed: {}{}{}", stringify!($cond), $maybe_colon, format_args!($($arg)*));
            Err($crate::assertion::Error::Check(__message))?;
        }
    };
}

/// Asserts that two string expressions are equal with a line diff on failure.
///
/// # Examples
///
/// ```rust,ignore
/// use kestrel::check_str_eq;
///
/// s.it("renders the banner", || {
///     check_str_eq!("hello\nworld", render());
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! check_str_eq {
    ($left:expr, $right:expr$(,)?) => ({
        $crate::check_str_eq!(@ $left, $right, "", "");
    });
    ($left:expr, $right:expr, $($arg:tt)*) => ({
        $crate::check_str_eq!(@ $left, $right, ": ", $($arg)+);
    });
    (@ $left:expr, $right:expr, $maybe_colon:expr, $($arg:tt)*) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    let __message = format!("check failed: `(left == right)`{}{}\
                       \n\
                       \n{}\
                       \n",
                       $maybe_colon,
                       format_args!($($arg)*),
                       $crate::pretty_assertions::StrComparison::new(left_val, right_val)
                    );
                    Err($crate::assertion::Error::StrEq(__message))?;
                }
            }
        }
    });
}

/// Asserts that two expressions are equal using `==`, rendering a colored diff
/// of their `Debug` output on failure.
#[macro_export]
macro_rules! check_eq {
    ($left:expr, $right:expr$(,)?) => ({
        $crate::check_eq!(@ $left, $right, "", "");
    });
    ($left:expr, $right:expr, $($arg:tt)*) => ({
        $crate::check_eq!(@ $left, $right, ": ", $($arg)+);
    });
    (@ $left:expr, $right:expr, $maybe_colon:expr, $($arg:tt)*) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    let __message = format!("check failed: `(left == right)`{}{}\
                       \n\
                       \n{}\
                       \n",
                       $maybe_colon,
                       format_args!($($arg)*),
                       $crate::pretty_assertions::Comparison::new(left_val, right_val)
                    );
                    Err($crate::assertion::Error::Eq(__message))?;
                }
            }
        }
    });
}

/// Asserts that two expressions are not equal using `!=`.
#[macro_export]
macro_rules! check_ne {
    ($left:expr, $right:expr$(,)?) => ({
        $crate::check_ne!(@ $left, $right, "", "");
    });
    ($left:expr, $right:expr, $($arg:tt)+) => ({
        $crate::check_ne!(@ $left, $right, ": ", $($arg)+);
    });
    (@ $left:expr, $right:expr, $maybe_colon:expr, $($arg:tt)*) => ({
        match (&($left), &($right)) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    let __message = format!("check failed: `(left != right)`{}{}\
                        \n\
                        \nBoth sides:\
                        \n{:#?}\
                        \n\
                        \n",
                        $maybe_colon,
                        format_args!($($arg)*),
                        left_val
                    );
                    Err($crate::assertion::Error::Ne(__message))?;
                }
            }
        }
    });
}
