//! Error helpers shared by the library crates.
//!
//! Each crate owns its own `thiserror` enum. The [`impl_context!`] macro gives
//! such an enum `.context()` / `.with_context()` adapters without pulling
//! `anyhow` into library code.

/// Error types that can be built from a plain message string.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Generate a crate-local `Context` trait for the named error type.
///
/// The invoking module must define `type Result<T> = std::result::Result<T, $error>`.
///
/// ```ignore
/// // in crates/media/src/error.rs
/// hookrelay_common::impl_context!(Error);
/// ```
#[macro_export]
macro_rules! impl_context {
    ($error:ty) => {
        pub trait Context<T> {
            /// Wrap the failure with a fixed context string.
            fn context(self, context: impl Into<String>) -> Result<T>;

            /// Wrap the failure with a lazily built context string.
            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                let ctx = context.into();
                self.map_err(|source| {
                    <$error as $crate::FromMessage>::from_message(format!("{ctx}: {source}"))
                })
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    <$error as $crate::FromMessage>::from_message(format!("{}: {source}", f().into()))
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.ok_or_else(|| <$error as $crate::FromMessage>::from_message(context.into()))
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <$error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}
