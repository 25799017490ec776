//! Individual document types that we can parse.
//!
//! Right now there is only one: the relay server descriptor
//! ([serverdesc::ServerDesc]), version 1.0, as described in
//! [dir-spec.txt](https://spec.torproject.org/dir-spec).
//!
//! # Limitations
//!
//! Tor has other documents that share the same meta-format, such as
//! extra-info documents, microdescriptors, and consensus documents.
//! This crate doesn't parse them.

pub mod serverdesc;
