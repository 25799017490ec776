//! Checks on a server descriptor beyond what its grammar enforces.

use super::fields::{DescFields, BODY};
use super::RouterLine;
use crate::parse::keyword::Keyword;
use crate::types::misc::is_nickname;
use crate::{Error, Result};

use serde::Deserialize;
use std::time::{Duration, SystemTime};

/// Optional checks to apply to each parsed server descriptor.
///
/// By default, none of these checks are made: a descriptor only has to
/// be well-formed and to contain the entries that every descriptor
/// must have.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct ValidationPolicy {
    /// If present, reject any descriptor published more than this many
    /// seconds after the current time.
    pub max_future_skew_secs: Option<u64>,
    /// If true, reject any descriptor without an ed25519 identity.
    pub require_ed25519: bool,
}

impl ValidationPolicy {
    /// Return a policy that makes no extra checks.
    pub fn new() -> Self {
        Self::default()
    }
    /// Reject descriptors published more than `skew` in the future.
    pub fn reject_future_skew(mut self, skew: Duration) -> Self {
        self.max_future_skew_secs = Some(skew.as_secs());
        self
    }
    /// Reject descriptors without an ed25519 identity.
    pub fn requiring_ed25519(mut self) -> Self {
        self.require_ed25519 = true;
        self
    }
}

/// Check a descriptor's parts for consistency.
///
/// `seen` is the count of each keyword in the body.
pub(super) fn check(
    router: &RouterLine,
    body: &DescFields,
    seen: &[usize],
    policy: &ValidationPolicy,
) -> Result<()> {
    if let Some(kwd) = BODY.rules.first_missing(seen) {
        return Err(Error::MissingToken(kwd.to_str(), router.pos));
    }
    if !is_nickname(&router.nickname) {
        return Err(Error::InvalidValue(
            "router",
            router.nickname_pos,
            "invalid nickname".into(),
        ));
    }
    if router.or_port == 0 {
        return Err(Error::InvalidValue(
            "router",
            router.or_port_pos,
            "ORPort must be nonzero".into(),
        ));
    }

    // The ed25519 identity and the signature made with it come together.
    match (
        body.identity_ed25519.is_some(),
        body.router_sig_ed25519.is_some(),
    ) {
        (true, false) => return Err(Error::MissingToken("router-sig-ed25519", router.pos)),
        (false, true) => return Err(Error::MissingToken("identity-ed25519", router.pos)),
        _ => (),
    }
    if body.master_key_ed25519.is_some() && body.identity_ed25519.is_none() {
        return Err(Error::MissingToken("identity-ed25519", router.pos));
    }
    if policy.require_ed25519 && body.identity_ed25519.is_none() {
        return Err(Error::MissingToken("identity-ed25519", router.pos));
    }

    if let (Some(max), Some(published)) = (policy.max_future_skew_secs, body.published) {
        // A limit too far out to represent is no limit at all.
        let limit = SystemTime::now().checked_add(Duration::from_secs(max));
        if limit.map_or(false, |limit| published > limit) {
            return Err(Error::InvalidValue(
                "published",
                body.published_pos.unwrap_or(router.pos),
                "published too far in the future".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::super::ServerDesc;
    use super::*;
    use crate::Pos;

    const TESTDATA: &str = include_str!("../../../testdata/LetFreedomRing.txt");

    #[test]
    fn future_skew() {
        let text = TESTDATA.replacen("2014-12-05 22:01:13", "2999-01-01 00:00:00", 1);
        assert!(ServerDesc::parse(&text).is_ok());

        let policy = ValidationPolicy::new().reject_future_skew(Duration::from_secs(3600));
        assert!(ServerDesc::parse_with_policy(TESTDATA, &policy).is_ok());
        assert_eq!(
            ServerDesc::parse_with_policy(&text, &policy).err(),
            Some(Error::InvalidValue(
                "published",
                Pos::from_line(5, 1),
                "published too far in the future".into()
            ))
        );
    }

    #[test]
    fn huge_future_skew() {
        let text = TESTDATA.replacen("2014-12-05 22:01:13", "2999-01-01 00:00:00", 1);
        let policy = ValidationPolicy::new().reject_future_skew(Duration::from_secs(u64::MAX));
        assert!(ServerDesc::parse_with_policy(&text, &policy).is_ok());

        let policy = ValidationPolicy {
            max_future_skew_secs: Some(u64::MAX),
            ..ValidationPolicy::default()
        };
        assert!(ServerDesc::parse_with_policy(TESTDATA, &policy).is_ok());
    }

    #[test]
    fn ed25519_required() {
        let policy = ValidationPolicy::new().requiring_ed25519();
        assert_eq!(
            ServerDesc::parse_with_policy(TESTDATA, &policy).err(),
            Some(Error::MissingToken("identity-ed25519", Pos::from_line(2, 1)))
        );
    }

    #[test]
    fn ed25519_pairing() {
        let sig = format!("router-sig-ed25519 {}\nrouter-signature\n", "A".repeat(86));
        let text = TESTDATA.replacen("router-signature\n", &sig, 1);
        assert_eq!(
            ServerDesc::parse(&text).err(),
            Some(Error::MissingToken("identity-ed25519", Pos::from_line(2, 1)))
        );

        let text = TESTDATA.replacen(
            "uptime",
            "master-key-ed25519 AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA\nuptime",
            1,
        );
        assert_eq!(
            ServerDesc::parse(&text).err(),
            Some(Error::MissingToken("identity-ed25519", Pos::from_line(2, 1)))
        );
    }
}
