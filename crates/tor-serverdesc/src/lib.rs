//! Parse and represent Tor relay server descriptors.
//!
//! A server descriptor is the signed document in which a Tor relay
//! describes itself: its name and addresses, its keys, its bandwidth,
//! and its exit policy.  Descriptors are written in the line-oriented
//! "netdoc" meta-format described in
//! [dir-spec.txt](https://spec.torproject.org/dir-spec), and this crate
//! parses version 1.0 of them.
//!
//! The main entry point is [`parse`], which takes a buffer holding any
//! number of concatenated descriptors (as found in directory archives)
//! and returns an iterator of results.  A malformed descriptor yields a
//! single error, with its line number, and the iterator carries on with
//! the next descriptor.
//!
//! ```
//! use tor_serverdesc::{parse, ErrorKind};
//!
//! let dump = b"router Bad 10.0.0.1 9001 0\n";
//! let results: Vec<_> = parse(dump).collect();
//! assert_eq!(results.len(), 1);
//! let err = results[0].as_ref().unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::FieldFormat);
//! assert_eq!(err.line(), Some(1));
//! ```
//!
//! To parse exactly one descriptor, use [`ServerDesc::parse`].
//!
//! # Limitations
//!
//! This crate never checks signatures or keys on its own.  It exposes
//! the signed text and the raw key material, and
//! [`ServerDesc::check_signature`] runs the checks through a
//! caller-supplied [`CryptoProvider`].
//!
//! Only server descriptors are handled: extra-info documents,
//! microdescriptors, and consensus documents share the meta-format but
//! are out of scope.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

#[macro_use]
mod parse;

pub mod doc;
mod err;
pub mod types;
mod util;

pub use doc::serverdesc::{
    Bandwidth, CryptoProvider, DescAnnotation, ExtraInfoDigest, NtorCrossCert, ServerDesc,
    ServerDescBuilder, ServerDescReader, SignatureError, SignedText, ValidationPolicy,
};
pub use err::{Error, ErrorKind, Pos};

/// Alias for the Result type returned by most objects in this module.
pub type Result<T> = std::result::Result<T, Error>;

/// Indicates whether we should parse an annotated list of objects or a
/// non-annotated list.
#[derive(PartialEq, Debug)]
#[allow(clippy::exhaustive_enums)]
pub enum AllowAnnotations {
    /// Parsing a document where items might be annotated.
    ///
    /// Annotations are a list of zero or more items with keywords
    /// beginning with @ that precede the items that are actually part
    /// of the document.
    AnnotationsAllowed,
    /// Parsing a document where annotations are not allowed.
    AnnotationsNotAllowed,
}

/// Parse every server descriptor in `buf`.
///
/// The descriptors may be preceded by annotations.  The returned
/// iterator yields one result per descriptor, in order; after an
/// error, it skips ahead to the next `router` line or annotation.
pub fn parse(buf: &[u8]) -> ServerDescReader<'_> {
    ServerDescReader::from_bytes(
        buf,
        &AllowAnnotations::AnnotationsAllowed,
        ValidationPolicy::default(),
    )
}
