//! The Keyword trait, implemented by every keyword enumeration.

use crate::parse::rules::EntryRule;
use std::hash::Hash;

/// A kind of entry that can appear in a document.
///
/// Keywords are small enumerations, usually declared with
/// `decl_keyword!`.  More than one spelling can map to the same
/// keyword: a server descriptor treats `accept` and `reject` as one
/// keyword so that their relative order is kept.
///
/// Looking up a keyword never fails.  Unknown spellings map to the
/// `UNRECOGNIZED` keyword, or to `ANN_UNRECOGNIZED` if they start
/// with `@`.
pub(crate) trait Keyword: Hash + Eq + Copy + std::fmt::Debug {
    /// Return the keyword for a spelling found in a document.
    fn from_str(s: &str) -> Self;
    /// Return a name for this keyword, for use in error messages.
    fn to_str(self) -> &'static str;
    /// Return a small integer unique to this keyword.
    fn idx(self) -> usize;
    /// Return one more than the largest value of `idx()`.
    fn n_vals() -> usize;
    /// Return the keyword used for unknown entries.
    fn unrecognized() -> Self;
    /// Return the keyword used for unknown annotations.
    fn ann_unrecognized() -> Self;

    /// Return true if this keyword is an annotation.
    fn is_annotation(self) -> bool {
        self == Self::ann_unrecognized() || self.to_str().starts_with('@')
    }
    /// Return true if this keyword is one of the catch-all keywords.
    fn is_unrecognized(self) -> bool {
        self == Self::unrecognized() || self == Self::ann_unrecognized()
    }
    /// Start building a rule for entries with this keyword.
    fn rule(self) -> EntryRule<Self> {
        EntryRule::new(self)
    }
}
