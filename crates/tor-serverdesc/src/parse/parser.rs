//! Check a stream of entries against a set of per-keyword rules.
//!
//! A `RuleSet` says which keywords may appear in one part of a
//! document, and how.  Its `parse_each` method walks the entries in
//! document order, rejects any that break a rule, and hands the rest
//! to a callback.

use crate::parse::keyword::Keyword;
use crate::parse::rules::EntryRule;
use crate::parse::tokenize::Item;
use crate::{Error, Result};

/// The rules for one part of a document, indexed by keyword.
///
/// Keywords without a rule may not appear at all.
#[derive(Clone, Debug)]
pub(crate) struct RuleSet<K: Keyword> {
    /// One slot per keyword index.
    rules: Vec<Option<EntryRule<K>>>,
}

impl<K: Keyword> RuleSet<K> {
    /// Make a RuleSet that allows nothing.
    pub(crate) fn new() -> Self {
        RuleSet {
            rules: vec![None; K::n_vals()],
        }
    }

    /// Allow entries that match `rule`.
    ///
    /// # Panics
    ///
    /// Panics if this set already has a rule for the same keyword.
    pub(crate) fn add(&mut self, rule: EntryRule<K>) {
        let slot = &mut self.rules[rule.kwd().idx()];
        assert!(slot.is_none(), "duplicate rule for {:?}", rule.kwd());
        *slot = Some(rule);
    }

    /// Return the rule for `item`, or an error if its keyword isn't
    /// allowed here.
    fn rule_for(&self, item: &Item<'_, K>) -> Result<&EntryRule<K>> {
        let kwd = item.kwd();
        self.rules
            .get(kwd.idx())
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::UnexpectedToken(kwd.to_str(), item.pos()))
    }

    /// Check that `item` is allowed here, with the arguments and
    /// object its rule asks for.
    pub(crate) fn check_item(&self, item: &Item<'_, K>) -> Result<()> {
        self.rule_for(item)?.check_item(item)
    }

    /// Walk `tokens` until they run out, checking each entry and
    /// passing it to `f`.
    ///
    /// Stops at the first error, whether from the tokenizer, from a
    /// rule, or from `f`.  A repeated entry is reported at its second
    /// occurrence.  Objects on unrecognized entries must still be
    /// valid base64.
    ///
    /// Required entries are not checked here: on success, this returns
    /// how often each keyword appeared, for use with `first_missing`.
    pub(crate) fn parse_each<'a, I, F>(&self, tokens: &mut I, mut f: F) -> Result<Vec<usize>>
    where
        I: Iterator<Item = Result<Item<'a, K>>>,
        F: FnMut(&Item<'a, K>) -> Result<()>,
    {
        let mut seen = vec![0_usize; self.rules.len()];
        for item in tokens {
            let item = item?;
            let rule = self.rule_for(&item)?;
            let count = &mut seen[item.kwd().idx()];
            *count += 1;
            rule.check_occurrence(*count, &item)?;
            rule.check_item(&item)?;
            if item.kwd().is_unrecognized() {
                item.obj_raw()?;
            }
            f(&item)?;
        }
        Ok(seen)
    }

    /// Given the counts from `parse_each`, return the first required
    /// keyword that never appeared.
    pub(crate) fn first_missing(&self, seen: &[usize]) -> Option<K> {
        self.rules
            .iter()
            .flatten()
            .filter(|rule| rule.is_required())
            .map(EntryRule::kwd)
            .find(|kwd| seen.get(kwd.idx()).copied().unwrap_or(0) == 0)
    }
}
