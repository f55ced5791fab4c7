//! # Barton Error
//!
//! Glue shared by the error enums of the Barton crates. Every enum follows one shape: variants
//! carry either a `message` or a `source`, plus an optional `context: Option<Cow<'static, str>>`
//! rendered after the variant title.
//!
//! - [`format_context`] renders the context inside `#[error(...)]` attributes.
//! - [`source_variant!`] wires a wrapped error type into its variant: a `From` impl and, when an
//!   extension trait is named, a `context()` method on `Result<T, Source>`.
//!
//! ```rust
//! use barton_error::{format_context, source_variant};
//! use std::borrow::Cow;
//!
//! #[derive(Debug, thiserror::Error)]
//! pub enum DiskError {
//!     #[error("Disk failure{}: {source}", format_context(.context))]
//!     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
//! }
//!
//! pub trait DiskErrorExt<T> {
//!     fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, DiskError>;
//! }
//!
//! source_variant!(DiskError::Io, std::io::Error, DiskErrorExt);
//!
//! let err = std::fs::read("/nonexistent/disk").context("Reading the disk").unwrap_err();
//! assert!(err.to_string().starts_with("Disk failure (Reading the disk): "));
//! ```

use std::borrow::Cow;

/// Renders `context` as ` (context)`, or nothing when it is absent.
#[must_use]
pub fn format_context(context: &Option<Cow<'static, str>>) -> Cow<'static, str> {
    context.as_ref().map_or(Cow::Borrowed(""), |c| Cow::Owned(format!(" ({c})")))
}

/// Implements `From<$source>` for `$error`, producing `$error::$variant { source, context: None }`.
///
/// With a third argument, also implements the extension trait `$ext<T>` for
/// `Result<T, $source>` so that `.context("...")` converts into the variant with the context set.
#[macro_export]
macro_rules! source_variant {
    ($error:ident :: $variant:ident, $source:ty) => {
        impl ::std::convert::From<$source> for $error {
            #[inline]
            fn from(source: $source) -> Self {
                Self::$variant { source, context: None }
            }
        }
    };
    ($error:ident :: $variant:ident, $source:ty, $ext:ident) => {
        $crate::source_variant!($error::$variant, $source);

        impl<T> $ext<T> for ::std::result::Result<T, $source> {
            #[inline]
            fn context(
                self,
                context: impl Into<::std::borrow::Cow<'static, str>>,
            ) -> ::std::result::Result<T, $error> {
                self.map_err(|source| $error::$variant { source, context: Some(context.into()) })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum RenderError {
        #[error("Format failure{}: {source}", format_context(.context))]
        Format { source: std::fmt::Error, context: Option<Cow<'static, str>> },
    }

    trait RenderErrorExt<T> {
        fn context(self, context: impl Into<Cow<'static, str>>) -> Result<T, RenderError>;
    }

    source_variant!(RenderError::Format, std::fmt::Error, RenderErrorExt);

    #[test]
    fn absent_context_renders_nothing() {
        assert_eq!(format_context(&None), "");
        assert_eq!(format_context(&Some("while saving".into())), " (while saving)");
    }

    #[test]
    fn from_leaves_the_context_empty() {
        let err = RenderError::from(std::fmt::Error);
        assert!(matches!(err, RenderError::Format { context: None, .. }));
        assert!(err.to_string().starts_with("Format failure: "));
    }

    #[test]
    fn context_is_attached_and_rendered() {
        let result: Result<(), std::fmt::Error> = Err(std::fmt::Error);
        let err = result.context("rendering report").unwrap_err();

        assert!(matches!(&err, RenderError::Format { context: Some(c), .. } if c == "rendering report"));
        assert!(err.to_string().starts_with("Format failure (rendering report): "));
    }
}
