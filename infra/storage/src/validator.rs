//! Content validators used by the recovery-aware loader.
//!
//! A validator decides whether the bytes read for a key are well-formed for the caller. The
//! engine always calls [`Validator::validate`] **without** the storage lock held, so a validator
//! may read other keys through the same [`crate::Storage`] handle.

use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::marker::PhantomData;

use quick_xml::Reader;
use quick_xml::events::Event;

/// Why a validator rejected a piece of content.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid JSON: {source}")]
    Json { source: serde_json::Error },

    #[error("Invalid XML: {source}")]
    Xml { source: quick_xml::Error },

    #[error("Rejected: {message}")]
    Rejected { message: Cow<'static, str> },
}

impl From<serde_json::Error> for ValidationError {
    fn from(source: serde_json::Error) -> Self {
        Self::Json { source }
    }
}

impl From<quick_xml::Error> for ValidationError {
    fn from(source: quick_xml::Error) -> Self {
        Self::Xml { source }
    }
}

impl From<&'static str> for ValidationError {
    fn from(message: &'static str) -> Self {
        Self::Rejected { message: Cow::Borrowed(message) }
    }
}

impl From<String> for ValidationError {
    fn from(message: String) -> Self {
        Self::Rejected { message: Cow::Owned(message) }
    }
}

/// Decides whether loaded content is usable and turns it into the caller's representation.
///
/// Any `Fn(&str) -> Result<T, ValidationError>` closure is a validator.
///
/// ```rust
/// use barton_storage::{ValidationError, Validator};
///
/// let non_empty = |content: &str| -> Result<usize, ValidationError> {
///     if content.trim().is_empty() { Err("blank".into()) } else { Ok(content.len()) }
/// };
/// assert_eq!(non_empty.validate("abc").unwrap(), 3);
/// ```
pub trait Validator {
    type Output;

    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing why `content` is not usable.
    fn validate(&self, content: &str) -> Result<Self::Output, ValidationError>;
}

impl<F, T> Validator for F
where
    F: Fn(&str) -> Result<T, ValidationError>,
{
    type Output = T;

    fn validate(&self, content: &str) -> Result<T, ValidationError> {
        self(content)
    }
}

/// Accepts anything that could be read.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyContent;

impl Validator for AnyContent {
    type Output = ();

    fn validate(&self, _content: &str) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Accepts content that deserializes from JSON into `T`.
pub struct Json<T = serde_json::Value>(PhantomData<fn() -> T>);

impl<T> Json<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Json<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Json<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Json<T> {}

impl<T> std::fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Json").field(&std::any::type_name::<T>()).finish()
    }
}

impl<T: DeserializeOwned> Validator for Json<T> {
    type Output = T;

    fn validate(&self, content: &str) -> Result<T, ValidationError> {
        Ok(serde_json::from_str(content)?)
    }
}

/// A well-formed XML document loaded from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// Qualified name of the single root element.
    pub root: String,
    /// The document text as read from disk.
    pub content: String,
}

/// Accepts a well-formed XML document with exactly one root element.
#[derive(Debug, Clone, Copy, Default)]
pub struct Xml;

impl Validator for Xml {
    type Output = XmlDocument;

    fn validate(&self, content: &str) -> Result<XmlDocument, ValidationError> {
        if content.trim().is_empty() {
            return Err("empty document".into());
        }

        let mut reader = Reader::from_str(content);
        let mut open: Vec<Vec<u8>> = Vec::new();
        let mut root: Option<String> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => {
                    let name = start.name().as_ref().to_vec();
                    if open.is_empty() {
                        claim_root(&mut root, &name)?;
                    }
                    open.push(name);
                },
                Event::Empty(empty) => {
                    if open.is_empty() {
                        claim_root(&mut root, empty.name().as_ref())?;
                    }
                },
                Event::End(end) => match open.pop() {
                    Some(name) if name.as_slice() == end.name().as_ref() => {},
                    Some(name) => {
                        return Err(format!(
                            "closing tag does not match <{}>",
                            String::from_utf8_lossy(&name)
                        )
                        .into());
                    },
                    None => return Err("closing tag without an open element".into()),
                },
                Event::Eof => break,
                _ => {},
            }
        }

        if let Some(name) = open.last() {
            return Err(format!("unclosed element <{}>", String::from_utf8_lossy(name)).into());
        }

        root.map(|root| XmlDocument { root, content: content.to_owned() })
            .ok_or_else(|| "document has no root element".into())
    }
}

fn claim_root(root: &mut Option<String>, name: &[u8]) -> Result<(), ValidationError> {
    if root.is_some() {
        return Err("document has more than one root element".into());
    }
    *root = Some(String::from_utf8_lossy(name).into_owned());
    Ok(())
}

/// Formats understood by [`crate::backup::choose_valid_file_to_read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Xml,
}

impl FileFormat {
    pub(crate) fn check(self, content: &str) -> Result<(), ValidationError> {
        match self {
            Self::Json => Json::<serde_json::Value>::new().validate(content).map(drop),
            Self::Xml => Xml.validate(content).map(drop),
        }
    }
}
