//! Parsing support for the line-oriented document meta-format that
//! server descriptors are written in.

#[macro_use]
pub(crate) mod macros;
pub(crate) mod keyword;
pub(crate) mod parser;
pub(crate) mod rules;
pub(crate) mod tokenize;
