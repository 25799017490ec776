//! Grammar rules for a single keyword: how many arguments its entries
//! take, whether they carry an object, and how often they may appear.

use crate::parse::keyword::Keyword;
use crate::parse::tokenize::Item;
use crate::{Error, Result};

use std::ops::{Bound, RangeBounds};

/// Whether an entry carries an object.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ObjectRule {
    /// It must not.
    Forbidden,
    /// It must.
    Required,
    /// It may.
    Optional,
}

/// The rule for one keyword.
///
/// Start one with `Keyword::rule()`, narrow it with the methods below,
/// and add it to a `RuleSet`:
///
/// ```ignore
/// rules.add(ROUTER.rule().required().args(5..=5));
/// ```
///
/// Unless narrowed, an entry may take any number of arguments, may
/// appear at most once, and may not carry an object.
#[derive(Clone, Debug)]
pub(crate) struct EntryRule<K: Keyword> {
    /// The keyword this rule applies to.
    kwd: K,
    /// Fewest arguments allowed.
    min_args: usize,
    /// Most arguments allowed.
    max_args: usize,
    /// True if the entry must appear at least once.
    required: bool,
    /// True if the entry may appear more than once.
    may_repeat: bool,
    /// What to do about objects.
    object: ObjectRule,
}

impl<K: Keyword> EntryRule<K> {
    /// Return the most permissive rule for `kwd`.
    pub(crate) fn new(kwd: K) -> Self {
        EntryRule {
            kwd,
            min_args: 0,
            max_args: usize::MAX,
            required: false,
            may_repeat: false,
            object: ObjectRule::Forbidden,
        }
    }

    /// Return the keyword this rule applies to.
    pub(crate) fn kwd(&self) -> K {
        self.kwd
    }
    /// Return true if at least one entry must appear.
    pub(crate) fn is_required(&self) -> bool {
        self.required
    }

    /// Require at least one entry.
    pub(crate) fn required(mut self) -> Self {
        self.required = true;
        self
    }
    /// Allow more than one entry.
    pub(crate) fn may_repeat(mut self) -> Self {
        self.may_repeat = true;
        self
    }
    /// Allow no arguments at all.
    pub(crate) fn no_args(self) -> Self {
        self.args(0..=0)
    }
    /// Allow a number of arguments within `r`, like `1..` or `2..=3`.
    pub(crate) fn args<R: RangeBounds<usize>>(mut self, r: R) -> Self {
        self.min_args = match r.start_bound() {
            Bound::Included(n) => *n,
            Bound::Excluded(n) => n + 1,
            Bound::Unbounded => 0,
        };
        self.max_args = match r.end_bound() {
            Bound::Included(n) => *n,
            Bound::Excluded(n) => n.saturating_sub(1),
            Bound::Unbounded => usize::MAX,
        };
        self
    }
    /// Allow, but don't require, an object.
    pub(crate) fn obj_optional(mut self) -> Self {
        self.object = ObjectRule::Optional;
        self
    }
    /// Require an object.
    pub(crate) fn obj_required(mut self) -> Self {
        self.object = ObjectRule::Required;
        self
    }

    /// Check the arguments and object of a single entry.
    pub(crate) fn check_item(&self, item: &Item<'_, K>) -> Result<()> {
        let kwd = self.kwd.to_str();
        let n = item.n_args();
        if n > self.max_args {
            return Err(Error::TooManyArguments(kwd, item.pos()));
        }
        if n < self.min_args {
            return Err(Error::TooFewArguments(kwd, item.pos()));
        }
        match (self.object, item.has_obj()) {
            (ObjectRule::Forbidden, true) => Err(Error::UnexpectedObject(kwd, item.pos())),
            (ObjectRule::Required, false) => Err(Error::MissingObject(kwd, item.pos())),
            _ => Ok(()),
        }
    }

    /// Check that `item` may appear, given that it is the `nth` entry
    /// with this keyword (counting from 1).
    pub(crate) fn check_occurrence(&self, nth: usize, item: &Item<'_, K>) -> Result<()> {
        if nth > 1 && !self.may_repeat {
            Err(Error::DuplicateToken(self.kwd.to_str(), item.pos()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::macros::test::Demo;
    use crate::parse::tokenize::NetDocReader;
    use crate::Pos;

    /// Check the first entry of `s` against `rule`.
    fn check(rule: &EntryRule<Demo>, s: &str) -> Result<()> {
        let mut r: NetDocReader<'_, Demo> = NetDocReader::new(s);
        let item = r.iter().next().unwrap().unwrap();
        rule.check_item(&item).map_err(|e| e.within(s))
    }

    #[test]
    fn arguments() {
        let rule = Demo::PORT.rule().args(1..=2);
        assert!(check(&rule, "port 1\n").is_ok());
        assert!(check(&rule, "port 1 2\n").is_ok());
        assert_eq!(
            check(&rule, "port\n"),
            Err(Error::TooFewArguments("port", Pos::from_line(1, 1)))
        );
        assert_eq!(
            check(&rule, "port 1 2 3\n"),
            Err(Error::TooManyArguments("port", Pos::from_line(1, 1)))
        );

        let rule = Demo::FLAG.rule().args(..1);
        assert!(check(&rule, "flag\n").is_ok());
        assert!(check(&rule, "flag 1\n").is_err());
        assert!(check(&Demo::FLAG.rule().no_args(), "flag 1\n").is_err());
        assert!(check(&Demo::FLAG.rule(), "flag 1 2 3 4 5\n").is_ok());
    }

    #[test]
    fn objects() {
        let with_obj = "key\n-----BEGIN K-----\naGVsbG8=\n-----END K-----\n";
        assert_eq!(
            check(&Demo::KEY.rule(), with_obj),
            Err(Error::UnexpectedObject("key", Pos::from_line(1, 1)))
        );
        assert!(check(&Demo::KEY.rule().obj_optional(), with_obj).is_ok());
        assert!(check(&Demo::KEY.rule().obj_optional(), "key\n").is_ok());
        assert!(check(&Demo::KEY.rule().obj_required(), with_obj).is_ok());
        assert_eq!(
            check(&Demo::KEY.rule().obj_required(), "key\n"),
            Err(Error::MissingObject("key", Pos::from_line(1, 1)))
        );
    }

    #[test]
    fn occurrences() {
        let mut r: NetDocReader<'_, Demo> = NetDocReader::new("allow x\n");
        let item = r.iter().next().unwrap().unwrap();

        let once = Demo::RULE.rule().required();
        assert!(once.is_required());
        assert_eq!(once.kwd(), Demo::RULE);
        assert!(once.check_occurrence(1, &item).is_ok());
        assert!(matches!(
            once.check_occurrence(2, &item),
            Err(Error::DuplicateToken("allow/deny", _))
        ));
        let many = Demo::RULE.rule().may_repeat();
        assert!(!many.is_required());
        assert!(many.check_occurrence(7, &item).is_ok());
    }
}
