//! The rule table for the body of a server descriptor.
//!
//! Every keyword that may appear between `router` and
//! `router-signature` has a grammar rule (how many arguments, whether
//! it takes an object, whether it may repeat) and a handler that
//! interprets one entry into [`DescFields`].  Entries are handled one
//! at a time, in the order they appear, so that repeated entries like
//! `accept` and `reject` keep their order.

use super::{Bandwidth, ExtraInfoDigest, NtorCrossCert, ServerKwd};
use crate::parse::keyword::Keyword;
use crate::parse::parser::RuleSet;
use crate::parse::rules::EntryRule;
use crate::parse::tokenize::Item;
use crate::types::family::RelayFamily;
use crate::types::misc::*;
use crate::types::policy::{AddrPolicy, AddrPortPattern, PortPolicy, RuleKind};
use crate::types::protocols::LegacyProtocols;
use crate::{Error, Pos, Result};

use once_cell::sync::Lazy;
use std::convert::TryInto;
use std::net::SocketAddr;
use std::time::SystemTime;
use tracing::debug;

/// Everything we learned from the body of a descriptor, before
/// validation.
#[derive(Debug, Default)]
pub(super) struct DescFields {
    /// Value of `bandwidth`.
    pub(super) bandwidth: Option<Bandwidth>,
    /// Value of `published`.
    pub(super) published: Option<SystemTime>,
    /// Position of the `published` entry.
    pub(super) published_pos: Option<Pos>,
    /// Value of `fingerprint`.
    pub(super) fingerprint: Option<RsaIdentity>,
    /// Object from `onion-key`.
    pub(super) onion_key: Option<Vec<u8>>,
    /// Object from `signing-key`.
    pub(super) signing_key: Option<Vec<u8>>,
    /// Text of `platform`.
    pub(super) platform: Option<String>,
    /// Text of `proto`.
    pub(super) proto: Option<String>,
    /// Value of `protocols`.
    pub(super) protocols: Option<LegacyProtocols>,
    /// Value of `uptime`.
    pub(super) uptime: Option<u64>,
    /// Text of `contact`.
    pub(super) contact: Option<String>,
    /// Members from every `family` entry.
    pub(super) family: RelayFamily,
    /// Rules from every `accept` and `reject` entry.
    pub(super) policy: AddrPolicy,
    /// Value of `ipv6-policy`.
    pub(super) ipv6_policy: Option<PortPolicy>,
    /// Values of every `or-address`.
    pub(super) or_addresses: Vec<SocketAddr>,
    /// Value of `extra-info-digest`.
    pub(super) extra_info_digest: Option<ExtraInfoDigest>,
    /// Versions from `hidden-service-dir`.
    pub(super) hidden_service_dir: Option<Vec<u16>>,
    /// Flag: `hibernating`.
    pub(super) hibernating: bool,
    /// Flag: `caches-extra-info`.
    pub(super) caches_extra_info: bool,
    /// Flag: `allow-single-hop-exits`.
    pub(super) allow_single_hop_exits: bool,
    /// Flag: `eventdns`.
    pub(super) eventdns: bool,
    /// Flag: `tunnelled-dir-server`.
    pub(super) tunnelled_dir_server: bool,
    /// Value of `ntor-onion-key`.
    pub(super) ntor_onion_key: Option<[u8; 32]>,
    /// Object from `identity-ed25519`.
    pub(super) identity_ed25519: Option<Vec<u8>>,
    /// Value of `master-key-ed25519`.
    pub(super) master_key_ed25519: Option<[u8; 32]>,
    /// Value of `router-sig-ed25519`.
    pub(super) router_sig_ed25519: Option<[u8; 64]>,
    /// Position of the `router-sig-ed25519` entry.
    pub(super) ed_sig_pos: Option<Pos>,
    /// Object from `onion-key-crosscert`.
    pub(super) onion_key_crosscert: Option<Vec<u8>>,
    /// Value of `ntor-onion-key-crosscert`.
    pub(super) ntor_onion_key_crosscert: Option<NtorCrossCert>,
    /// Keywords we didn't recognize.
    pub(super) unrecognized: Vec<String>,
}

/// A function that interprets one entry of a descriptor body.
type FieldRule = fn(&mut DescFields, &Item<'_, ServerKwd>) -> Result<()>;

/// Grammar rules for a descriptor body, with a handler for each keyword.
pub(super) struct BodyGrammar {
    /// Shape of each allowed entry.
    pub(super) rules: RuleSet<ServerKwd>,
    /// Handler for each keyword, indexed by keyword index.
    handlers: Vec<Option<FieldRule>>,
}

impl BodyGrammar {
    /// Make a new empty grammar.
    fn new() -> Self {
        BodyGrammar {
            rules: RuleSet::new(),
            handlers: vec![None; ServerKwd::n_vals()],
        }
    }
    /// Allow entries matching `rule`, and interpret them with `handler`.
    fn add(&mut self, rule: EntryRule<ServerKwd>, handler: FieldRule) {
        self.handlers[rule.kwd().idx()] = Some(handler);
        self.rules.add(rule);
    }
}

/// The body grammar for server descriptors.
pub(super) static BODY: Lazy<BodyGrammar> = Lazy::new(|| {
    use ServerKwd::*;

    let mut g = BodyGrammar::new();
    g.add(BANDWIDTH.rule().required().args(3..=3), bandwidth);
    g.add(PUBLISHED.rule().required().args(2..=2), published);
    g.add(FINGERPRINT.rule().required().args(1..), fingerprint);
    g.add(
        ONION_KEY.rule().required().no_args().obj_required(),
        onion_key,
    );
    g.add(
        SIGNING_KEY.rule().required().no_args().obj_required(),
        signing_key,
    );
    g.add(PLATFORM.rule(), platform);
    g.add(PROTO.rule().args(1..), proto);
    g.add(PROTOCOLS.rule().args(1..), protocols);
    g.add(UPTIME.rule().args(1..=1), uptime);
    g.add(HIBERNATING.rule().args(..=1), hibernating);
    g.add(CONTACT.rule(), contact);
    g.add(FAMILY.rule().may_repeat().args(1..), family);
    g.add(POLICY.rule().may_repeat().args(1..=1), policy);
    g.add(IPV6_POLICY.rule().args(2..=2), ipv6_policy);
    g.add(OR_ADDRESS.rule().may_repeat().args(1..=1), or_address);
    g.add(EXTRA_INFO_DIGEST.rule().args(1..=2), extra_info_digest);
    g.add(HIDDEN_SERVICE_DIR.rule(), hidden_service_dir);
    g.add(CACHES_EXTRA_INFO.rule().args(..=1), caches_extra_info);
    g.add(
        ALLOW_SINGLE_HOP_EXITS.rule().args(..=1),
        allow_single_hop_exits,
    );
    g.add(EVENTDNS.rule().args(..=1), eventdns);
    g.add(TUNNELLED_DIR_SERVER.rule().args(..=1), tunnelled_dir_server);
    g.add(NTOR_ONION_KEY.rule().args(1..=1), ntor_onion_key);
    g.add(
        IDENTITY_ED25519.rule().no_args().obj_required(),
        identity_ed25519,
    );
    g.add(MASTER_KEY_ED25519.rule().args(1..=1), master_key_ed25519);
    g.add(
        ONION_KEY_CROSSCERT.rule().no_args().obj_required(),
        onion_key_crosscert,
    );
    g.add(
        NTOR_ONION_KEY_CROSSCERT.rule().args(1..=1).obj_required(),
        ntor_onion_key_crosscert,
    );
    g.add(ROUTER_SIG_ED25519.rule().args(1..=1), router_sig_ed25519);
    g.add(UNRECOGNIZED.rule().may_repeat().obj_optional(), unrecognized);
    g
});

/// Read and interpret body entries from `tokens` until it runs out.
///
/// Returns the fields we found, along with how many times each
/// keyword appeared.
pub(super) fn take<'a, I>(tokens: &mut I) -> Result<(DescFields, Vec<usize>)>
where
    I: Iterator<Item = Result<Item<'a, ServerKwd>>>,
{
    let mut fields = DescFields::default();
    let seen = BODY.rules.parse_each(tokens, |item| {
        // Nothing but the RSA signature may follow the ed25519 one.
        if let Some(p) = fields.ed_sig_pos {
            return Err(Error::MisplacedToken("router-sig-ed25519", p));
        }
        let kwd = item.kwd();
        match BODY.handlers.get(kwd.idx()).copied().flatten() {
            Some(handler) => handler(&mut fields, item)
                .map_err(|e| e.in_keyword(kwd.to_str()).or_at_pos(item.pos())),
            None => Err(Error::Internal(item.pos())),
        }
    })?;
    Ok((fields, seen))
}

/// Decode argument `idx` of `item` as base64 of exactly `N` bytes.
fn b64_array<const N: usize>(item: &Item<'_, ServerKwd>, idx: usize) -> Result<[u8; N]> {
    item.parse_arg::<B64>(idx)?
        .into_array()
        .map_err(|e| e.or_at_pos(item.arg_pos(idx)))
}

/// Interpret the optional argument of a flag entry.
///
/// A bare flag, or `1`, means true; `0` means false.
fn flag(item: &Item<'_, ServerKwd>) -> Result<bool> {
    match item.arg(0) {
        None | Some("1") => Ok(true),
        Some("0") => Ok(false),
        Some(_) => Err(Error::BadArgument(
            None,
            item.arg_pos(0),
            "expected 0 or 1".into(),
        )),
    }
}

/// Handle `bandwidth`.
fn bandwidth(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.bandwidth = Some(Bandwidth {
        avg: item.parse_arg(0)?,
        burst: item.parse_arg(1)?,
        observed: item.parse_arg(2)?,
    });
    Ok(())
}

/// Handle `published`.
fn published(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    let t: Iso8601TimeSp = item.args_as_str().parse()?;
    f.published = Some(t.into());
    f.published_pos = Some(item.pos());
    Ok(())
}

/// Handle `fingerprint`.
fn fingerprint(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    let fp: SpFingerprint = item.args_as_str().parse()?;
    f.fingerprint = Some(fp.into());
    Ok(())
}

/// Handle `onion-key`.
fn onion_key(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.onion_key = Some(item.obj("RSA PUBLIC KEY")?);
    Ok(())
}

/// Handle `signing-key`.
fn signing_key(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.signing_key = Some(item.obj("RSA PUBLIC KEY")?);
    Ok(())
}

/// Handle `platform`.
fn platform(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.platform = Some(item.args_as_str().to_string());
    Ok(())
}

/// Handle `proto`.
fn proto(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.proto = Some(item.args_as_str().to_string());
    Ok(())
}

/// Handle `protocols`.
fn protocols(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.protocols = Some(item.args_as_str().parse()?);
    Ok(())
}

/// Handle `uptime`.
fn uptime(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.uptime = Some(item.parse_arg(0)?);
    Ok(())
}

/// Handle `hibernating`.
fn hibernating(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.hibernating = flag(item)?;
    Ok(())
}

/// Handle `contact`.
fn contact(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.contact = Some(item.args_as_str().to_string());
    Ok(())
}

/// Handle `family`.
fn family(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    let members: RelayFamily = item.args_as_str().parse()?;
    f.family.extend(members);
    Ok(())
}

/// Handle `accept` and `reject`.
fn policy(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    let kind = match item.kwd_str() {
        "accept" => RuleKind::Accept,
        _ => RuleKind::Reject,
    };
    let pat: AddrPortPattern = item
        .required_arg(0)?
        .parse()
        .map_err(|e| Error::BadPolicy(Some(kind.keyword()), item.arg_pos(0), e))?;
    f.policy.push(kind, pat);
    Ok(())
}

/// Handle `ipv6-policy`.
fn ipv6_policy(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    let p: PortPolicy = item
        .args_as_str()
        .parse()
        .map_err(|e| Error::BadPolicy(Some("ipv6-policy"), item.arg_pos(0), e))?;
    f.ipv6_policy = Some(p);
    Ok(())
}

/// Handle `or-address`.
fn or_address(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.or_addresses.push(item.parse_arg(0)?);
    Ok(())
}

/// Handle `extra-info-digest`.
fn extra_info_digest(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    let sha1: [u8; 20] = item
        .parse_arg::<B16>(0)?
        .as_bytes()
        .try_into()
        .map_err(|_| {
            Error::BadArgument(None, item.arg_pos(0), "wrong length for SHA1 digest".into())
        })?;
    let sha256 = match item.arg(1) {
        Some(_) => Some(b64_array(item, 1)?),
        None => None,
    };
    f.extra_info_digest = Some(ExtraInfoDigest { sha1, sha256 });
    Ok(())
}

/// Handle `hidden-service-dir`.
///
/// With no arguments, the relay serves version 2.
fn hidden_service_dir(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    let versions = item
        .args()
        .map(|a| a.parse::<u16>().map_err(|e| Error::from(e).at_pos(Pos::at(a))))
        .collect::<Result<Vec<_>>>()?;
    f.hidden_service_dir = Some(if versions.is_empty() {
        vec![2]
    } else {
        versions
    });
    Ok(())
}

/// Handle `caches-extra-info`.
fn caches_extra_info(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.caches_extra_info = flag(item)?;
    Ok(())
}

/// Handle `allow-single-hop-exits`.
fn allow_single_hop_exits(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.allow_single_hop_exits = flag(item)?;
    Ok(())
}

/// Handle `eventdns`.
fn eventdns(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.eventdns = flag(item)?;
    Ok(())
}

/// Handle `tunnelled-dir-server`.
fn tunnelled_dir_server(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.tunnelled_dir_server = flag(item)?;
    Ok(())
}

/// Handle `ntor-onion-key`.
fn ntor_onion_key(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.ntor_onion_key = Some(b64_array(item, 0)?);
    Ok(())
}

/// Handle `identity-ed25519`.
fn identity_ed25519(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.identity_ed25519 = Some(item.obj("ED25519 CERT")?);
    Ok(())
}

/// Handle `master-key-ed25519`.
fn master_key_ed25519(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.master_key_ed25519 = Some(b64_array(item, 0)?);
    Ok(())
}

/// Handle `onion-key-crosscert`.
fn onion_key_crosscert(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.onion_key_crosscert = Some(item.obj("CROSSCERT")?);
    Ok(())
}

/// Handle `ntor-onion-key-crosscert`.
fn ntor_onion_key_crosscert(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    let sign = match item.required_arg(0)? {
        "0" => 0,
        "1" => 1,
        _ => {
            return Err(Error::BadArgument(
                None,
                item.arg_pos(0),
                "not 0 or 1".into(),
            ))
        }
    };
    let cert = item.obj("ED25519 CERT")?;
    f.ntor_onion_key_crosscert = Some(NtorCrossCert { sign, cert });
    Ok(())
}

/// Handle `router-sig-ed25519`.
fn router_sig_ed25519(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    f.router_sig_ed25519 = Some(b64_array(item, 0)?);
    f.ed_sig_pos = Some(item.pos());
    Ok(())
}

/// Handle any keyword we don't know.
fn unrecognized(f: &mut DescFields, item: &Item<'_, ServerKwd>) -> Result<()> {
    debug!("ignoring unrecognized entry {:?}", item.kwd_str());
    f.unrecognized.push(item.kwd_str().to_string());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::tokenize::NetDocReader;

    /// Run `take` over all of `s`.
    fn take_all(s: &str) -> Result<(DescFields, Vec<usize>)> {
        let mut r: NetDocReader<'_, ServerKwd> = NetDocReader::new(s);
        take(r.iter()).map_err(|e| e.within(s))
    }

    #[test]
    fn every_body_keyword_has_a_handler() {
        let n = (0..ServerKwd::n_vals())
            .filter(|i| BODY.handlers[*i].is_some())
            .count();
        // Everything but the four annotations, router, router-signature,
        // and the unrecognized-annotation keyword.
        assert_eq!(n, ServerKwd::n_vals() - 7);
    }

    #[test]
    fn policy_order() -> Result<()> {
        let (f, seen) = take_all("accept *:80\nreject 10.0.0.0/8:*\naccept *:443\n")?;
        let rules: Vec<String> = f.policy.rules().iter().map(|r| r.to_string()).collect();
        assert_eq!(rules, vec!["accept *:80", "reject 10.0.0.0/8:*", "accept *:443"]);
        assert_eq!(seen[ServerKwd::POLICY.idx()], 3);
        Ok(())
    }

    #[test]
    fn flags() -> Result<()> {
        let (f, _) = take_all("hibernating 0\neventdns\ncaches-extra-info 1\n")?;
        assert!(!f.hibernating);
        assert!(f.eventdns);
        assert!(f.caches_extra_info);
        assert!(!f.tunnelled_dir_server);

        let e = take_all("hibernating yes\n").unwrap_err();
        assert_eq!(
            e,
            Error::BadArgument(Some("hibernating"), Pos::from_line(1, 13), "expected 0 or 1".into())
        );
        Ok(())
    }

    #[test]
    fn digests_and_keys() -> Result<()> {
        let (f, _) = take_all(
            "extra-info-digest 15FA36289DD75D89B389CED0BE23D80FB50629BD \
             AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA\n\
             master-key-ed25519 AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA\n",
        )?;
        let d = f.extra_info_digest.unwrap();
        assert_eq!(d.sha1()[0], 0x15);
        assert_eq!(d.sha256(), Some(&[0_u8; 32]));
        assert_eq!(f.master_key_ed25519, Some([0_u8; 32]));

        let e = take_all("ntor-onion-key AAAA\n").unwrap_err();
        assert_eq!(e.keyword(), Some("ntor-onion-key"));
        assert_eq!(e.pos(), Pos::from_line(1, 16));

        let e = take_all("extra-info-digest 15FA\n").unwrap_err();
        assert_eq!(e.keyword(), Some("extra-info-digest"));
        Ok(())
    }

    #[test]
    fn hidden_service_dir() -> Result<()> {
        let (f, _) = take_all("hidden-service-dir\n")?;
        assert_eq!(f.hidden_service_dir, Some(vec![2]));
        let (f, _) = take_all("hidden-service-dir 2 3\n")?;
        assert_eq!(f.hidden_service_dir, Some(vec![2, 3]));
        assert!(take_all("hidden-service-dir two\n").is_err());
        Ok(())
    }

    #[test]
    fn crosscert_sign() {
        let e = take_all(
            "ntor-onion-key-crosscert 2\n-----BEGIN ED25519 CERT-----\nAQoABhtZAQ==\n-----END ED25519 CERT-----\n",
        )
        .unwrap_err();
        assert_eq!(
            e,
            Error::BadArgument(
                Some("ntor-onion-key-crosscert"),
                Pos::from_line(1, 26),
                "not 0 or 1".into()
            )
        );
    }

    #[test]
    fn unrecognized_kept() -> Result<()> {
        let (f, _) = take_all("frob 1 2\nfrob\nzap\n")?;
        assert_eq!(f.unrecognized, vec!["frob", "frob", "zap"]);
        Ok(())
    }

    #[test]
    fn annotation_in_body() {
        let e = take_all("uptime 10\n@source here\n").unwrap_err();
        assert_eq!(e, Error::UnexpectedToken("@source", Pos::from_line(2, 1)));
    }
}
