//! Parsing implementation for Tor relay server descriptors.
//!
//! A "server descriptor" (also called a "router descriptor") is a
//! signed statement that a relay makes about itself, explaining its
//! keys, its capabilities, its location, and its exit policy.
//!
//! Relays upload their server descriptors to the directory
//! authorities; archives such as CollecTor store them in large files
//! of concatenated descriptors, each possibly preceded by `@`
//! annotations.
//!
//! For full information about the format, see
//! [dir-spec.txt](https://spec.torproject.org/dir-spec).
//!
//! # Ownership
//!
//! A parsed [`ServerDesc`] owns copies of all of its fields, including
//! the text its signature covers.  It never borrows from the buffer it
//! was parsed from, so that buffer can be dropped as soon as parsing is
//! done.  Only the [`ServerDescReader`] borrows the buffer while it
//! runs.
//!
//! # Limitations
//!
//! Keys, certificates, and signatures are kept as opaque bytes.
//! Checking them is up to a [`CryptoProvider`].

mod build;
mod fields;
mod validate;
mod verify;

pub use build::ServerDescBuilder;
pub use validate::ValidationPolicy;
pub use verify::{CryptoProvider, SignatureError};

use crate::parse::keyword::Keyword;
use crate::parse::parser::RuleSet;
use crate::parse::tokenize::{Item, ItemResult, NetDocReader};
use crate::types::family::RelayFamily;
use crate::types::misc::*;
use crate::types::policy::{AddrPolicy, PortPolicy};
use crate::types::protocols::LegacyProtocols;
use crate::types::version::RelayPlatform;
use crate::util::str::{line_end, line_start};
use crate::{AllowAnnotations, Error, Pos, Result};

use once_cell::sync::Lazy;
use std::net::{Ipv4Addr, SocketAddr};
use std::ops::Range;
use std::time::SystemTime;
use tracing::debug;

decl_keyword! {
    /// Keywords that can appear in a server descriptor, or in the
    /// annotations before one.
    pub(crate) ServerKwd {
        "@type" => ANN_TYPE,
        "@source" => ANN_SOURCE,
        "@downloaded-at" => ANN_DOWNLOADED_AT,
        "@purpose" => ANN_PURPOSE,
        "router" => ROUTER,
        "bandwidth" => BANDWIDTH,
        "published" => PUBLISHED,
        "fingerprint" => FINGERPRINT,
        "onion-key" => ONION_KEY,
        "signing-key" => SIGNING_KEY,
        "platform" => PLATFORM,
        "proto" => PROTO,
        "protocols" => PROTOCOLS,
        "uptime" => UPTIME,
        "hibernating" => HIBERNATING,
        "contact" => CONTACT,
        "family" => FAMILY,
        "accept" | "reject" => POLICY,
        "ipv6-policy" => IPV6_POLICY,
        "or-address" => OR_ADDRESS,
        "extra-info-digest" => EXTRA_INFO_DIGEST,
        "hidden-service-dir" => HIDDEN_SERVICE_DIR,
        "caches-extra-info" => CACHES_EXTRA_INFO,
        "allow-single-hop-exits" => ALLOW_SINGLE_HOP_EXITS,
        "eventdns" => EVENTDNS,
        "tunnelled-dir-server" => TUNNELLED_DIR_SERVER,
        "ntor-onion-key" => NTOR_ONION_KEY,
        "identity-ed25519" => IDENTITY_ED25519,
        "master-key-ed25519" => MASTER_KEY_ED25519,
        "onion-key-crosscert" => ONION_KEY_CROSSCERT,
        "ntor-onion-key-crosscert" => NTOR_ONION_KEY_CROSSCERT,
        "router-sig-ed25519" => ROUTER_SIG_ED25519,
        "router-signature" => ROUTER_SIGNATURE,
    }
}

/// Rules for parsing a set of server descriptor annotations.
static ANNOTATION_RULES: Lazy<RuleSet<ServerKwd>> = Lazy::new(|| {
    use ServerKwd::*;

    let mut rules = RuleSet::new();
    rules.add(ANN_TYPE.rule().args(2..=2));
    rules.add(ANN_SOURCE.rule());
    rules.add(ANN_DOWNLOADED_AT.rule().args(2..=2));
    rules.add(ANN_PURPOSE.rule().args(1..));
    rules.add(ANN_UNRECOGNIZED.rule().may_repeat().obj_optional());
    rules
});

/// Rules for the `router` line that starts a descriptor.
static ROUTER_RULES: Lazy<RuleSet<ServerKwd>> = Lazy::new(|| {
    use ServerKwd::*;

    let mut rules = RuleSet::new();
    rules.add(ROUTER.rule().required().args(5..=5));
    rules
});

/// Rules for the `router-signature` entry that ends a descriptor.
static SIGNATURE_RULES: Lazy<RuleSet<ServerKwd>> = Lazy::new(|| {
    use ServerKwd::*;

    let mut rules = RuleSet::new();
    rules.add(ROUTER_SIGNATURE.rule().required().no_args().obj_required());
    rules
});

/// Annotations about a server descriptor, as stored in archives and
/// on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescAnnotation {
    /// The arguments of the `@type` annotation, like
    /// `server-descriptor 1.0`.
    doc_type: Option<String>,
    /// Description of where we got this descriptor.
    source: Option<String>,
    /// When this descriptor was first downloaded.
    downloaded: Option<SystemTime>,
    /// Description of what this descriptor is for.
    purpose: Option<String>,
}

impl DescAnnotation {
    /// Return the declared document type and version, if any.
    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }
    /// Return the `@source` annotation, if any.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
    /// Return the `@downloaded-at` time, if any.
    pub fn downloaded(&self) -> Option<SystemTime> {
        self.downloaded
    }
    /// Return the `@purpose` annotation, if any.
    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    /// Extract a single DescAnnotation (possibly empty) from a reader.
    fn take_from_reader(reader: &mut NetDocReader<'_, ServerKwd>) -> Result<DescAnnotation> {
        use ServerKwd::*;
        let mut items = reader.pause_at(|item| item.is_ok_with_non_annotation());

        let mut ann = DescAnnotation::default();
        ANNOTATION_RULES.parse_each(&mut items, |item| {
            let text = || Some(item.args_as_str().to_string());
            match item.kwd() {
                ANN_TYPE => {
                    check_doc_type(item)?;
                    ann.doc_type = text();
                }
                ANN_SOURCE => ann.source = text(),
                ANN_PURPOSE => ann.purpose = text(),
                ANN_DOWNLOADED_AT => {
                    let t: Iso8601TimeSp = item
                        .args_as_str()
                        .parse()
                        .map_err(|e: Error| e.in_keyword("@downloaded-at"))?;
                    ann.downloaded = Some(t.into());
                }
                _ => (),
            }
            Ok(())
        })?;
        Ok(ann)
    }
}

/// Make sure that an `@type` annotation names a document we can parse.
fn check_doc_type(item: &Item<'_, ServerKwd>) -> Result<()> {
    let name = item.required_arg(0)?;
    let major = item.required_arg(1)?.split('.').next();
    if name == "server-descriptor" && major == Some("1") {
        Ok(())
    } else {
        Err(Error::BadDocumentType(item.pos()))
    }
}

/// The three bandwidth values a relay advertises, in bytes per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[allow(clippy::exhaustive_structs)]
pub struct Bandwidth {
    /// Long-term average rate the relay is willing to sustain.
    pub avg: u64,
    /// Burst rate the relay is willing to sustain in short intervals.
    pub burst: u64,
    /// Bandwidth capacity the relay has observed itself handling.
    pub observed: u64,
}

/// Digests linking a server descriptor to its extra-info document.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExtraInfoDigest {
    /// SHA1 digest of the extra-info document.
    sha1: [u8; 20],
    /// SHA256 digest of the extra-info document, if the relay gave one.
    sha256: Option<[u8; 32]>,
}

impl ExtraInfoDigest {
    /// Construct a new ExtraInfoDigest.
    pub fn new(sha1: [u8; 20], sha256: Option<[u8; 32]>) -> Self {
        ExtraInfoDigest { sha1, sha256 }
    }
    /// Return the SHA1 digest of the extra-info document.
    pub fn sha1(&self) -> &[u8; 20] {
        &self.sha1
    }
    /// Return the SHA256 digest of the extra-info document, if known.
    pub fn sha256(&self) -> Option<&[u8; 32]> {
        self.sha256.as_ref()
    }
}

/// The `ntor-onion-key-crosscert` entry: an ed25519 certificate made
/// with the ntor onion key, and the sign bit needed to check it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NtorCrossCert {
    /// Sign bit of the ed25519 key derived from the ntor key: 0 or 1.
    sign: u8,
    /// The certificate, still encoded.
    cert: Vec<u8>,
}

impl NtorCrossCert {
    /// Construct a new NtorCrossCert.
    ///
    /// Return None if `sign` is neither 0 nor 1.
    pub fn new(sign: u8, cert: Vec<u8>) -> Option<Self> {
        if sign <= 1 {
            Some(NtorCrossCert { sign, cert })
        } else {
            None
        }
    }
    /// Return the sign bit.
    pub fn sign(&self) -> u8 {
        self.sign
    }
    /// Return the encoded certificate.
    pub fn cert(&self) -> &[u8] {
        &self.cert[..]
    }
}

/// The part of a descriptor that its signatures cover.
///
/// This holds a copy of the descriptor text from the start of its
/// `router` line through the end of its `router-signature` line, along
/// with the offset of that text in the buffer it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedText {
    /// The text, from `router` through `router-signature` and its newline.
    text: String,
    /// Offset of `text` within the parsed buffer.
    offset: usize,
    /// Length of the text before the `router-signature` line.
    body_len: usize,
    /// Length of the text through `router-sig-ed25519` and the space
    /// after it, if the descriptor has that entry.
    ed25519_len: Option<usize>,
}

impl SignedText {
    /// Build a SignedText for the descriptor whose `router` item and
    /// `router-signature` item are given, from the buffer `s`.
    fn new(
        s: &str,
        router: &Item<'_, ServerKwd>,
        sig: &Item<'_, ServerKwd>,
        ed_sig: Option<Pos>,
    ) -> Result<Self> {
        let router_off = router
            .offset_in(s)
            .ok_or_else(|| Error::Internal(router.pos()))?;
        let sig_off = sig.offset_in(s).ok_or_else(|| Error::Internal(sig.pos()))?;
        let start = line_start(s, router_off);
        let body_end = line_start(s, sig_off);
        let end = line_end(s, sig_off);
        let ed25519_len = match ed_sig {
            Some(p) => {
                let off = p.offset_within(s).ok_or(Error::Internal(p))?;
                Some(off + "router-sig-ed25519 ".len() - start)
            }
            None => None,
        };
        Ok(SignedText {
            text: s[start..end].to_string(),
            offset: start,
            body_len: body_end - start,
            ed25519_len,
        })
    }

    /// Return the canonical signed region: everything from the start
    /// of the `router` line up to and including the newline before
    /// `router-signature`.
    pub fn signed_region(&self) -> &str {
        &self.text[..self.body_len]
    }
    /// Return the text that a relay digests to make its RSA signature:
    /// everything from the start of the `router` line through the
    /// newline after `router-signature`.
    pub fn rsa_digest_input(&self) -> &str {
        &self.text[..]
    }
    /// Return the text covered by the `router-sig-ed25519` signature,
    /// if there is one: everything through the space after that
    /// keyword.
    ///
    /// (Tor prefixes this text with a fixed string before hashing it.)
    pub fn ed25519_digest_input(&self) -> Option<&str> {
        self.ed25519_len.map(|n| &self.text[..n])
    }
    /// Return the range of bytes in the original buffer that
    /// [`SignedText::rsa_digest_input`] came from.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.text.len()
    }
}

/// The parsed contents of a `router` line.
#[derive(Debug)]
struct RouterLine {
    /// The relay's nickname.
    nickname: String,
    /// The relay's IPv4 address.
    address: Ipv4Addr,
    /// The relay's OR port.
    or_port: u16,
    /// Obsolete SOCKS port; nearly always zero.
    socks_port: u16,
    /// The relay's directory port, or zero.
    dir_port: u16,
    /// Position of the `router` keyword.
    pos: Pos,
    /// Position of the nickname.
    nickname_pos: Pos,
    /// Position of the OR port.
    or_port_pos: Pos,
}

impl RouterLine {
    /// Check and interpret a `router` item.
    fn from_item(item: &Item<'_, ServerKwd>) -> Result<Self> {
        ROUTER_RULES.check_item(item)?;
        let in_router = |e: Error| e.in_keyword("router");
        Ok(RouterLine {
            nickname: item.required_arg(0).map_err(in_router)?.to_string(),
            address: item.parse_arg(1).map_err(in_router)?,
            or_port: item.parse_arg(2).map_err(in_router)?,
            socks_port: item.parse_arg(3).map_err(in_router)?,
            dir_port: item.parse_arg(4).map_err(in_router)?,
            pos: item.pos(),
            nickname_pos: item.arg_pos(0),
            or_port_pos: item.arg_pos(2),
        })
    }
}

/// Information about a relay, parsed from a server descriptor.
///
/// Fields that the descriptor might omit are Options; flags that it
/// might omit are false when absent.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerDesc {
    /// Human-readable nickname for this relay.
    nickname: String,
    /// IPv4 address for this relay.
    address: Ipv4Addr,
    /// IPv4 port where this relay accepts TLS connections.
    or_port: u16,
    /// Obsolete SOCKS port.
    socks_port: u16,
    /// IPv4 port where this relay accepts directory connections, or 0.
    dir_port: u16,
    /// Advertised bandwidth.
    bandwidth: Bandwidth,
    /// Free-text description of the relay's software and OS.
    platform: Option<String>,
    /// Subprotocol versions, as given in the `proto` entry.
    proto: Option<String>,
    /// Link and circuit versions, from the obsolete `protocols` entry.
    protocols: Option<LegacyProtocols>,
    /// When this descriptor was published.
    published: SystemTime,
    /// The relay's RSA identity fingerprint.
    fingerprint: RsaIdentity,
    /// How long the relay has been running, in seconds.
    uptime: Option<u64>,
    /// DER-encoded RSA onion key.
    onion_key: Vec<u8>,
    /// DER-encoded RSA identity key, which signs this descriptor.
    signing_key: Vec<u8>,
    /// Contact information for the relay operator.
    contact: Option<String>,
    /// Declared family members, in order.
    family: RelayFamily,
    /// Exit policy rules, in order.
    policy: AddrPolicy,
    /// IPv6 exit policy summary.
    ipv6_policy: Option<PortPolicy>,
    /// Additional addresses for the OR port.
    or_addresses: Vec<SocketAddr>,
    /// Link to this relay's extra-info document.
    extra_info_digest: Option<ExtraInfoDigest>,
    /// Hidden service directory protocol versions, if the relay is one.
    hidden_service_dir: Option<Vec<u16>>,
    /// True if the relay says it is hibernating.
    hibernating: bool,
    /// True if the relay caches extra-info documents.
    caches_extra_info: bool,
    /// True if the relay allows single-hop exits.
    allow_single_hop_exits: bool,
    /// True if the relay uses eventdns.
    eventdns: bool,
    /// True if the relay answers directory requests over its OR port.
    tunnelled_dir_server: bool,
    /// Curve25519 onion key for the ntor handshake.
    ntor_onion_key: Option<[u8; 32]>,
    /// Encoded ed25519 identity certificate.
    identity_ed25519: Option<Vec<u8>>,
    /// The ed25519 master identity key.
    master_key_ed25519: Option<[u8; 32]>,
    /// Ed25519 signature on this descriptor.
    router_sig_ed25519: Option<[u8; 64]>,
    /// RSA cross-certificate made with the onion key.
    onion_key_crosscert: Option<Vec<u8>>,
    /// Ed25519 cross-certificate made with the ntor onion key.
    ntor_onion_key_crosscert: Option<NtorCrossCert>,
    /// Keywords of entries we didn't recognize, in order.
    unrecognized: Vec<String>,
    /// The RSA signature from the `router-signature` entry.
    router_signature: Vec<u8>,
    /// Annotations that came before this descriptor.
    annotation: DescAnnotation,
    /// The text covered by this descriptor's signatures.
    signed: SignedText,
}

impl ServerDesc {
    /// Return the relay's nickname.
    pub fn nickname(&self) -> &str {
        &self.nickname[..]
    }
    /// Return the relay's IPv4 address.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }
    /// Return the relay's OR port.
    pub fn or_port(&self) -> u16 {
        self.or_port
    }
    /// Return the relay's obsolete SOCKS port.
    pub fn socks_port(&self) -> u16 {
        self.socks_port
    }
    /// Return the relay's directory port, or 0 if it has none.
    pub fn dir_port(&self) -> u16 {
        self.dir_port
    }
    /// Return the relay's advertised bandwidth.
    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }
    /// Return the relay's platform string.
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }
    /// Interpret the relay's platform string.
    pub fn relay_platform(&self) -> Result<Option<RelayPlatform>> {
        self.platform.as_deref().map(str::parse).transpose()
    }
    /// Return the text of the relay's `proto` entry.
    pub fn proto(&self) -> Option<&str> {
        self.proto.as_deref()
    }
    /// Return the relay's legacy link and circuit protocol versions.
    pub fn protocols(&self) -> Option<&LegacyProtocols> {
        self.protocols.as_ref()
    }
    /// Return the time when this descriptor was published.
    pub fn published(&self) -> SystemTime {
        self.published
    }
    /// Return the relay's RSA identity fingerprint.
    pub fn fingerprint(&self) -> &RsaIdentity {
        &self.fingerprint
    }
    /// Return the relay's uptime in seconds, if given.
    pub fn uptime(&self) -> Option<u64> {
        self.uptime
    }
    /// Return the DER-encoded RSA onion key.
    pub fn onion_key(&self) -> &[u8] {
        &self.onion_key[..]
    }
    /// Return the DER-encoded RSA identity key.
    pub fn signing_key(&self) -> &[u8] {
        &self.signing_key[..]
    }
    /// Return the operator's contact information, if given.
    pub fn contact(&self) -> Option<&str> {
        self.contact.as_deref()
    }
    /// Return the relay's declared family.
    pub fn family(&self) -> &RelayFamily {
        &self.family
    }
    /// Return the relay's exit policy.
    pub fn policy(&self) -> &AddrPolicy {
        &self.policy
    }
    /// Return the relay's IPv6 exit policy summary, if given.
    pub fn ipv6_policy(&self) -> Option<&PortPolicy> {
        self.ipv6_policy.as_ref()
    }
    /// Return the relay's additional OR addresses.
    pub fn or_addresses(&self) -> &[SocketAddr] {
        &self.or_addresses[..]
    }
    /// Return the digests of the relay's extra-info document, if given.
    pub fn extra_info_digest(&self) -> Option<&ExtraInfoDigest> {
        self.extra_info_digest.as_ref()
    }
    /// Return true if the relay is a hidden service directory.
    pub fn is_hidden_service_dir(&self) -> bool {
        self.hidden_service_dir.is_some()
    }
    /// Return the hidden service directory versions the relay serves,
    /// if it is a hidden service directory.
    pub fn hidden_service_dir(&self) -> Option<&[u16]> {
        self.hidden_service_dir.as_deref()
    }
    /// Return true if the relay is hibernating.
    pub fn is_hibernating(&self) -> bool {
        self.hibernating
    }
    /// Return true if the relay caches extra-info documents.
    pub fn caches_extra_info(&self) -> bool {
        self.caches_extra_info
    }
    /// Return true if the relay allows single-hop exits.
    pub fn allows_single_hop_exits(&self) -> bool {
        self.allow_single_hop_exits
    }
    /// Return true if the relay uses eventdns.
    pub fn eventdns(&self) -> bool {
        self.eventdns
    }
    /// Return true if the relay is a tunnelled directory server.
    pub fn is_tunnelled_dir_server(&self) -> bool {
        self.tunnelled_dir_server
    }
    /// Return the curve25519 ntor onion key, if given.
    pub fn ntor_onion_key(&self) -> Option<&[u8; 32]> {
        self.ntor_onion_key.as_ref()
    }
    /// Return the encoded ed25519 identity certificate, if given.
    pub fn identity_ed25519(&self) -> Option<&[u8]> {
        self.identity_ed25519.as_deref()
    }
    /// Return the ed25519 master identity key, if given.
    pub fn master_key_ed25519(&self) -> Option<&[u8; 32]> {
        self.master_key_ed25519.as_ref()
    }
    /// Return the ed25519 signature on this descriptor, if given.
    pub fn router_sig_ed25519(&self) -> Option<&[u8; 64]> {
        self.router_sig_ed25519.as_ref()
    }
    /// Return the encoded onion key cross-certificate, if given.
    pub fn onion_key_crosscert(&self) -> Option<&[u8]> {
        self.onion_key_crosscert.as_deref()
    }
    /// Return the ntor onion key cross-certificate, if given.
    pub fn ntor_onion_key_crosscert(&self) -> Option<&NtorCrossCert> {
        self.ntor_onion_key_crosscert.as_ref()
    }
    /// Return the keywords of entries that we didn't recognize.
    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized[..]
    }
    /// Return the RSA signature on this descriptor.
    pub fn router_signature(&self) -> &[u8] {
        &self.router_signature[..]
    }
    /// Return the annotations that came before this descriptor.
    pub fn annotation(&self) -> &DescAnnotation {
        &self.annotation
    }
    /// Return the text covered by this descriptor's signatures.
    pub fn signed_text(&self) -> &SignedText {
        &self.signed
    }

    /// Return a new ServerDescBuilder to construct a descriptor.
    pub fn builder() -> ServerDescBuilder {
        ServerDescBuilder::new()
    }

    /// Try to parse `s` as a single server descriptor, possibly
    /// preceded by annotations.
    ///
    /// Anything after the descriptor's signature is an error.
    pub fn parse(s: &str) -> Result<ServerDesc> {
        Self::parse_with_policy(s, &ValidationPolicy::default())
    }

    /// As [`ServerDesc::parse`], but apply the checks in `policy` too.
    pub fn parse_with_policy(s: &str, policy: &ValidationPolicy) -> Result<ServerDesc> {
        let mut reader = NetDocReader::new(s);
        let result = Self::parse_internal(&mut reader, true, policy).map_err(|e| e.within(s))?;
        reader.should_be_exhausted().map_err(|e| e.within(s))?;
        Ok(result)
    }

    /// Helper: parse one server descriptor from a reader.
    ///
    /// Errors from this function have unresolved positions; callers
    /// resolve them against the whole buffer.
    fn parse_internal(
        r: &mut NetDocReader<'_, ServerKwd>,
        annotated: bool,
        policy: &ValidationPolicy,
    ) -> Result<ServerDesc> {
        use ServerKwd::*;
        let s = r.str();

        let annotation = if annotated {
            match DescAnnotation::take_from_reader(r) {
                Ok(ann) => ann,
                Err(e) => {
                    // The descriptor these annotations belong to goes
                    // down with them.
                    skip_annotated_desc(r);
                    return Err(e);
                }
            }
        } else {
            DescAnnotation::default()
        };

        // The first entry must be `router`.
        let router_item = take_router(r)?;
        let router = RouterLine::from_item(&router_item)?;

        // Everything up to `router-signature` goes through the field
        // rule table, in order.  A `router` line here means that the
        // signature is missing; we leave it for the next descriptor.
        let (body, seen) = {
            let mut items = r.pause_at(|item| item.is_ok_with_kwd_in(&[ROUTER_SIGNATURE, ROUTER]));
            fields::take(&mut items)?
        };

        // The signature ends the descriptor.
        let sig_item = take_signature(r)?;
        SIGNATURE_RULES.check_item(&sig_item)?;
        let router_signature = sig_item.obj("SIGNATURE")?;
        let signed = SignedText::new(s, &router_item, &sig_item, body.ed_sig_pos)?;

        validate::check(&router, &body, &seen, policy)?;

        Self::from_parts(router, body, annotation, router_signature, signed)
    }

    /// Assemble a ServerDesc from its validated parts.
    fn from_parts(
        router: RouterLine,
        body: fields::DescFields,
        annotation: DescAnnotation,
        router_signature: Vec<u8>,
        signed: SignedText,
    ) -> Result<ServerDesc> {
        // validate::check() has made sure these are all present.
        let pos = router.pos;
        let missing = || Error::Internal(pos);
        Ok(ServerDesc {
            bandwidth: body.bandwidth.ok_or_else(missing)?,
            published: body.published.ok_or_else(missing)?,
            fingerprint: body.fingerprint.ok_or_else(missing)?,
            onion_key: body.onion_key.ok_or_else(missing)?,
            signing_key: body.signing_key.ok_or_else(missing)?,
            nickname: router.nickname,
            address: router.address,
            or_port: router.or_port,
            socks_port: router.socks_port,
            dir_port: router.dir_port,
            platform: body.platform,
            proto: body.proto,
            protocols: body.protocols,
            uptime: body.uptime,
            contact: body.contact,
            family: body.family,
            policy: body.policy,
            ipv6_policy: body.ipv6_policy,
            or_addresses: body.or_addresses,
            extra_info_digest: body.extra_info_digest,
            hidden_service_dir: body.hidden_service_dir,
            hibernating: body.hibernating,
            caches_extra_info: body.caches_extra_info,
            allow_single_hop_exits: body.allow_single_hop_exits,
            eventdns: body.eventdns,
            tunnelled_dir_server: body.tunnelled_dir_server,
            ntor_onion_key: body.ntor_onion_key,
            identity_ed25519: body.identity_ed25519,
            master_key_ed25519: body.master_key_ed25519,
            router_sig_ed25519: body.router_sig_ed25519,
            onion_key_crosscert: body.onion_key_crosscert,
            ntor_onion_key_crosscert: body.ntor_onion_key_crosscert,
            unrecognized: body.unrecognized,
            router_signature,
            annotation,
            signed,
        })
    }
}

/// Take the `router` item that must start a descriptor.
///
/// Any other item is left unread.
fn take_router<'a>(r: &mut NetDocReader<'a, ServerKwd>) -> Result<Item<'a, ServerKwd>> {
    let s = r.str();
    let item = match r.iter().peek() {
        Some(Ok(item)) if item.kwd() == ServerKwd::ROUTER => item.clone(),
        Some(Ok(item)) => return Err(Error::UnexpectedToken(item.kwd().to_str(), item.pos())),
        Some(Err(e)) => return Err(e.clone()),
        None => return Err(Error::MissingToken("router", Pos::at_end_of(s))),
    };
    let _ = r.iter().next();
    Ok(item)
}

/// Take the `router-signature` item that must end a descriptor.
///
/// Any other item is left unread.
fn take_signature<'a>(r: &mut NetDocReader<'a, ServerKwd>) -> Result<Item<'a, ServerKwd>> {
    let s = r.str();
    let item = match r.iter().peek() {
        Some(Ok(item)) if item.kwd() == ServerKwd::ROUTER_SIGNATURE => item.clone(),
        Some(Ok(item)) => return Err(Error::MissingToken("router-signature", item.pos())),
        Some(Err(e)) => return Err(e.clone()),
        None => return Err(Error::MissingToken("router-signature", Pos::at_end_of(s))),
    };
    let _ = r.iter().next();
    Ok(item)
}

/// An iterator that parses one or more (possibly annotated) server
/// descriptors from a string.
///
/// After a malformed descriptor, it reports the error and skips ahead
/// to the next `router` line (or annotation, if annotations are
/// allowed), so that one bad descriptor doesn't hide the rest.
#[derive(Clone, Debug)]
pub struct ServerDescReader<'a> {
    /// True iff we accept annotations
    annotated: bool,
    /// Extra checks to apply to every descriptor.
    policy: ValidationPolicy,
    /// Reader that we're extracting items from.
    reader: NetDocReader<'a, ServerKwd>,
    /// An error to report before reading anything.
    pending: Option<Error>,
}

/// Skip this reader forward until the next thing it reads looks like the
/// start of a server descriptor.
///
/// Returns the number of items skipped.
fn advance_to_next_serverdesc(reader: &mut NetDocReader<'_, ServerKwd>, annotated: bool) -> usize {
    use ServerKwd::*;
    let iter = reader.iter();
    let mut skipped = 0;
    loop {
        match iter.peek() {
            Some(Ok(t)) => {
                let kwd = t.kwd();
                if (annotated && kwd.is_annotation()) || kwd == ROUTER {
                    return skipped;
                }
            }
            Some(Err(_)) => {
                // Skip over broken tokens.
            }
            None => {
                return skipped;
            }
        }
        let _ = iter.next();
        skipped += 1;
    }
}

/// Skip the rest of a descriptor whose annotations were rejected.
///
/// Consumes any remaining annotations, then the descriptor that follows
/// them, up to and including its `router-signature`. Stops early before
/// a second `router` line or a new annotation.
fn skip_annotated_desc(reader: &mut NetDocReader<'_, ServerKwd>) {
    use ServerKwd::*;
    let iter = reader.iter();
    let mut in_body = false;
    while let Some(item) = iter.peek() {
        if let Ok(item) = item {
            let kwd = item.kwd();
            if kwd.is_annotation() {
                if in_body {
                    return;
                }
            } else if kwd == ROUTER {
                if in_body {
                    return;
                }
                in_body = true;
            } else if kwd == ROUTER_SIGNATURE {
                let _ = iter.next();
                return;
            } else {
                in_body = true;
            }
        }
        let _ = iter.next();
    }
}

impl<'a> ServerDescReader<'a> {
    /// Construct a ServerDescReader to take server descriptors from a
    /// string.
    pub fn new(s: &'a str, allow: &AllowAnnotations) -> Self {
        Self::with_policy(s, allow, ValidationPolicy::default())
    }

    /// As [`ServerDescReader::new`], but apply `policy` to every
    /// descriptor.
    pub fn with_policy(s: &'a str, allow: &AllowAnnotations, policy: ValidationPolicy) -> Self {
        let reader = NetDocReader::new(s);
        let annotated = allow == &AllowAnnotations::AnnotationsAllowed;
        ServerDescReader {
            annotated,
            policy,
            reader,
            pending: None,
        }
    }

    /// Construct a ServerDescReader to take server descriptors from a
    /// byte buffer.
    ///
    /// If the buffer isn't UTF-8, the reader yields a single error at
    /// the first bad byte.
    pub fn from_bytes(buf: &'a [u8], allow: &AllowAnnotations, policy: ValidationPolicy) -> Self {
        match std::str::from_utf8(buf) {
            Ok(s) => Self::with_policy(s, allow, policy),
            Err(e) => {
                let good = e.valid_up_to();
                let pos = std::str::from_utf8(&buf[..good])
                    .map(|prefix| Pos::from_offset(prefix, good))
                    .unwrap_or_else(|_| Pos::from_byte(good));
                let mut r = Self::with_policy("", allow, policy);
                r.pending = Some(Error::BadUtf8(pos));
                r
            }
        }
    }

    /// Extract a server descriptor from this reader.
    ///
    /// On failure, make sure that at least one token is consumed, and
    /// skip ahead to the next plausible descriptor.
    fn take_serverdesc(&mut self) -> Result<ServerDesc> {
        let pos_orig = self.reader.pos();
        let result = ServerDesc::parse_internal(&mut self.reader, self.annotated, &self.policy);
        if result.is_err() {
            if self.reader.pos() == pos_orig {
                // No tokens were consumed from the reader.  We need
                // to drop at least one token to ensure we aren't in
                // an infinite loop.
                let _ = self.reader.iter().next();
            }
            let skipped = advance_to_next_serverdesc(&mut self.reader, self.annotated);
            debug!("skipped {} entries after a bad server descriptor", skipped);
        }
        result
    }
}

impl<'a> Iterator for ServerDescReader<'a> {
    type Item = Result<ServerDesc>;
    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }
        // Is there a next token? If not, we're done.
        self.reader.iter().peek()?;

        let result = self
            .take_serverdesc()
            .map_err(|e| e.within(self.reader.str()));
        if let Err(e) = &result {
            debug!("rejected server descriptor: {}", e);
        }
        Some(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::family::FamilyMember;
    use crate::types::policy::RuleKind;
    use crate::ErrorKind;
    use hex_literal::hex;
    use std::time::Duration;

    const TESTDATA: &str = include_str!("../../testdata/LetFreedomRing.txt");

    /// Return TESTDATA with `old` replaced by `new`, once.
    fn edited(old: &str, new: &str) -> String {
        assert!(TESTDATA.contains(old));
        TESTDATA.replacen(old, new, 1)
    }

    #[test]
    fn parse_sample() -> Result<()> {
        let sd = ServerDesc::parse(TESTDATA)?;

        assert_eq!(sd.nickname(), "LetFreedomRing");
        assert_eq!(sd.address(), Ipv4Addr::new(24, 233, 74, 111));
        assert_eq!(sd.or_port(), 9001);
        assert_eq!(sd.socks_port(), 0);
        assert_eq!(sd.dir_port(), 0);
        assert_eq!(sd.platform(), Some("Tor 0.2.6.1-alpha on Linux"));
        assert_eq!(
            sd.relay_platform()?,
            Some(RelayPlatform::Tor(
                "0.2.6.1-alpha".parse()?,
                "Linux".to_string()
            ))
        );
        assert_eq!(sd.protocols().map(|p| p.link()), Some(&[1, 2][..]));
        assert_eq!(
            sd.published(),
            SystemTime::UNIX_EPOCH + Duration::from_secs(1417816873)
        );
        assert_eq!(
            sd.fingerprint(),
            &RsaIdentity::from(hex!("DA4DEC93C8D2F187C027A96D3925C1531D90A89E"))
        );
        assert_eq!(sd.uptime(), Some(339587));
        assert_eq!(
            sd.bandwidth(),
            Bandwidth {
                avg: 20480,
                burst: 20480,
                observed: 16996
            }
        );
        assert_eq!(
            sd.extra_info_digest().map(|d| d.sha1()),
            Some(&hex!("15FA36289DD75D89B389CED0BE23D80FB50629BD"))
        );
        assert_eq!(sd.onion_key().len(), 140);
        assert_eq!(&sd.onion_key()[..4], &hex!("30818902"));
        assert_eq!(sd.signing_key().len(), 140);
        assert_eq!(sd.hidden_service_dir(), Some(&[2][..]));
        assert!(sd.is_hidden_service_dir());
        assert_eq!(
            sd.contact(),
            Some("0xCDD0190B Craig Andrews <candrews@integralblue.com>")
        );
        assert_eq!(
            sd.ntor_onion_key().map(|k| &k[..4]),
            Some(&hex!("abc420f4")[..])
        );
        assert_eq!(sd.policy().rules().len(), 14);
        assert_eq!(sd.policy().rules()[0].to_string(), "reject 0.0.0.0/8:*");
        assert_eq!(sd.policy().rules()[7].kind(), RuleKind::Accept);
        assert_eq!(sd.policy().rules()[13].to_string(), "reject *:*");
        assert_eq!(sd.router_signature().len(), 128);

        assert!(!sd.is_hibernating());
        assert!(!sd.caches_extra_info());
        assert!(!sd.allows_single_hop_exits());
        assert!(!sd.eventdns());
        assert!(sd.family().is_empty());
        assert!(sd.unrecognized().is_empty());
        assert_eq!(sd.identity_ed25519(), None);

        assert_eq!(sd.annotation().doc_type(), Some("server-descriptor 1.0"));
        assert_eq!(sd.annotation().source(), None);
        Ok(())
    }

    #[test]
    fn signed_region() -> Result<()> {
        let sd = ServerDesc::parse(TESTDATA)?;
        let st = sd.signed_text();
        let router_at = TESTDATA.find("router ").unwrap();
        let sig_at = TESTDATA.find("router-signature\n").unwrap();

        assert!(st.signed_region().starts_with("router LetFreedomRing "));
        assert!(st.signed_region().ends_with("reject *:*\n"));
        assert_eq!(st.signed_region(), &TESTDATA[router_at..sig_at]);
        assert_eq!(
            st.rsa_digest_input(),
            &TESTDATA[router_at..sig_at + "router-signature\n".len()]
        );
        assert_eq!(st.range().start, router_at);
        assert_eq!(&TESTDATA[st.range()], st.rsa_digest_input());
        assert_eq!(st.ed25519_digest_input(), None);
        Ok(())
    }

    #[test]
    fn flags_and_extras() -> Result<()> {
        let text = edited(
            "hidden-service-dir\n",
            "hidden-service-dir 2 3\nhibernating 1\ncaches-extra-info\neventdns 0\n\
             family Ada $7467A97D19CD2B4F2BC0388AA99C5E67710F847E=fred\nfamily Bob\n\
             or-address [2001:db8::1]:9001\nor-address 10.0.0.1:443\n\
             proto Link=1-4 Relay=1-2\nipv6-policy accept 80,443\nfrobnicate 7\n",
        );
        let sd = ServerDesc::parse(&text)?;
        assert_eq!(sd.hidden_service_dir(), Some(&[2, 3][..]));
        assert!(sd.is_hibernating());
        assert!(sd.caches_extra_info());
        assert!(!sd.eventdns());
        assert!(!sd.is_tunnelled_dir_server());
        assert_eq!(sd.family().members().len(), 3);
        assert_eq!(
            sd.family().members()[2],
            FamilyMember::Nickname("Bob".into())
        );
        assert_eq!(sd.or_addresses().len(), 2);
        assert_eq!(sd.or_addresses()[0], "[2001:db8::1]:9001".parse::<SocketAddr>().unwrap());
        assert_eq!(sd.proto(), Some("Link=1-4 Relay=1-2"));
        assert_eq!(
            sd.ipv6_policy().map(|p| p.to_string()),
            Some("accept 80,443".to_string())
        );
        assert_eq!(sd.unrecognized(), &["frobnicate".to_string()]);
        Ok(())
    }

    #[test]
    fn test_bad() {
        fn check(text: &str, e: Error) {
            let sd = ServerDesc::parse(text);
            assert_eq!(sd.err(), Some(e));
        }

        check(
            &edited("bandwidth 20480 20480 16996\n", "bandwidth 20480 20480 16996\nbandwidth 1 2 3\n"),
            Error::DuplicateToken("bandwidth", Pos::from_line(9, 1)),
        );
        check(
            &edited("router LetFreedomRing", "uptime 5\nrouter LetFreedomRing"),
            Error::UnexpectedToken("uptime", Pos::from_line(2, 1)),
        );
        check(
            &edited("9001 0 0", "0 0 0"),
            Error::InvalidValue("router", Pos::from_line(2, 37), "ORPort must be nonzero".into()),
        );
        check(
            &edited("router LetFreedomRing", "router Let-Freedom-Ring"),
            Error::InvalidValue("router", Pos::from_line(2, 8), "invalid nickname".into()),
        );
        check(
            &edited("server-descriptor 1.0", "server-descriptor 2.0"),
            Error::BadDocumentType(Pos::from_line(1, 1)),
        );
        check(
            &edited(" 0 0\n", " 0\n"),
            Error::TooFewArguments("router", Pos::from_line(2, 1)),
        );
        check(
            &edited("uptime 339587", "uptime forever"),
            Error::BadArgument(
                Some("uptime"),
                Pos::from_line(7, 8),
                "invalid digit found in string".into(),
            ),
        );
        check(
            &edited("accept *:22\n", "accept *:22-21\n"),
            Error::BadPolicy(
                Some("accept"),
                Pos::from_line(32, 8),
                crate::types::policy::PolicyError::InvalidRange,
            ),
        );

        let mut trailing = TESTDATA.to_string();
        trailing.push_str("uptime 5\n");
        check(
            &trailing,
            Error::UnexpectedToken("uptime", Pos::from_line(45, 1)),
        );

        let unsigned = &TESTDATA[..TESTDATA.find("router-signature").unwrap()];
        check(
            unsigned,
            Error::MissingToken("router-signature", Pos::from_line(39, 1)),
        );

        let start = TESTDATA.find("signing-key\n").unwrap();
        let end = TESTDATA.find("hidden-service-dir").unwrap();
        let no_signing_key = format!("{}{}", &TESTDATA[..start], &TESTDATA[end..]);
        check(
            &no_signing_key,
            Error::MissingToken("signing-key", Pos::from_line(2, 1)),
        );
    }

    #[test]
    fn port_zero_in_policy() -> Result<()> {
        let text = edited("reject *:*\n", "reject *:0\naccept 10.0.0.0/8:0-80\nreject *:*\n");
        let sd = ServerDesc::parse(&text)?;
        let rules = sd.policy().rules();
        assert_eq!(rules.len(), 16);
        assert_eq!(rules[13].to_string(), "reject *:0");
        assert_eq!(rules[14].to_string(), "accept 10.0.0.0/8:0-80");
        assert_eq!(rules[15].to_string(), "reject *:*");
        Ok(())
    }

    #[test]
    fn bad_fingerprint() {
        let text = edited("3925 C153", "3925C153");
        let e = ServerDesc::parse(&text).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::FieldFormat);
        assert_eq!(e.keyword(), Some("fingerprint"));
        assert_eq!(e.pos(), Pos::from_line(6, 13));
    }

    #[test]
    fn misplaced_ed_sig() {
        let sig = "A".repeat(86);
        let text = edited(
            "reject *:*\n",
            &format!("router-sig-ed25519 {}\nreject *:*\n", sig),
        );
        let e = ServerDesc::parse(&text).unwrap_err();
        assert_eq!(
            e,
            Error::MisplacedToken("router-sig-ed25519", Pos::from_line(38, 1))
        );
    }

    #[test]
    fn reader_resync() {
        let bad = edited("bandwidth 20480 20480 16996\n", "");
        let s = format!("{}{}{}", bad, TESTDATA, TESTDATA);
        let v: Vec<_> = ServerDescReader::new(&s, &AllowAnnotations::AnnotationsAllowed).collect();
        assert_eq!(v.len(), 3);
        assert_eq!(
            v[0].as_ref().err(),
            Some(&Error::MissingToken("bandwidth", Pos::from_line(2, 1)))
        );
        assert!(v[1].is_ok());
        assert!(v[2].is_ok());
        let second = v[1].as_ref().unwrap();
        assert_eq!(second.signed_text().range().start, bad.len() + "@type server-descriptor 1.0\n".len());
    }

    #[test]
    fn reader_skips_unsupported_type() {
        let v2 = edited("server-descriptor 1.0", "server-descriptor 2.0");
        let v: Vec<_> = ServerDescReader::new(&v2, &AllowAnnotations::AnnotationsAllowed).collect();
        assert_eq!(v.len(), 1);
        assert_eq!(
            v[0].as_ref().err(),
            Some(&Error::BadDocumentType(Pos::from_line(1, 1)))
        );

        let s = format!("{}{}", v2, TESTDATA);
        let v: Vec<_> = ServerDescReader::new(&s, &AllowAnnotations::AnnotationsAllowed).collect();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].as_ref().err().map(Error::kind), Some(ErrorKind::Structure));
        let sd = v[1].as_ref().unwrap();
        assert_eq!(sd.signed_text().range().start, v2.len() + "@type server-descriptor 1.0\n".len());

        // A rejected annotation with a signature-less body still leaves
        // the next descriptor alone.
        let unsigned = &v2[..v2.find("router-signature").unwrap()];
        let s = format!("{}{}", unsigned, TESTDATA);
        let v: Vec<_> = ServerDescReader::new(&s, &AllowAnnotations::AnnotationsAllowed).collect();
        assert_eq!(v.len(), 2);
        assert!(v[0].is_err());
        assert!(v[1].is_ok());
    }

    #[test]
    fn reader_bad_utf8() {
        let mut buf = TESTDATA.as_bytes().to_vec();
        buf.insert(TESTDATA.find("Linux").unwrap(), 0xff);
        let v: Vec<_> =
            ServerDescReader::from_bytes(&buf, &AllowAnnotations::AnnotationsAllowed, ValidationPolicy::default())
                .collect();
        assert_eq!(v.len(), 1);
        assert_eq!(
            v[0].as_ref().err(),
            Some(&Error::BadUtf8(Pos::from_line(3, 31)))
        );
    }

    #[test]
    fn annotations_not_allowed() {
        let v: Vec<_> =
            ServerDescReader::new(TESTDATA, &AllowAnnotations::AnnotationsNotAllowed).collect();
        assert_eq!(v.len(), 2);
        assert_eq!(
            v[0].as_ref().err(),
            Some(&Error::UnexpectedToken("@type", Pos::from_line(1, 1)))
        );
        let sd = v[1].as_ref().unwrap();
        assert_eq!(sd.annotation(), &DescAnnotation::default());
    }
}
