//! Facilities to construct and encode ServerDesc objects.
//!
//! The builder here writes descriptors in the canonical entry order
//! that Tor uses, so that re-encoding a descriptor Tor produced gives
//! back its original text.

use super::{Bandwidth, DescAnnotation, ExtraInfoDigest, NtorCrossCert, ServerDesc};
use crate::types::family::RelayFamily;
use crate::types::misc::{format_time_sp, RsaIdentity};
use crate::types::policy::{AddrPolicy, AddrPortPattern, PortPolicy, RuleKind};
use crate::types::protocols::LegacyProtocols;
use crate::{Error, Result};

use std::net::{Ipv4Addr, SocketAddr};
use std::time::SystemTime;

/// A builder object used to construct a server descriptor.
///
/// Create one of these with [`ServerDesc::builder`] or
/// [`ServerDesc::to_builder`].
///
/// Entries that we didn't recognize when parsing are not kept.
#[derive(Clone, Debug, Default)]
pub struct ServerDescBuilder {
    /// Annotations to write before the descriptor.
    annotation: DescAnnotation,
    /// See [`ServerDesc::nickname`].
    nickname: Option<String>,
    /// See [`ServerDesc::address`].
    address: Option<Ipv4Addr>,
    /// See [`ServerDesc::or_port`].
    or_port: u16,
    /// See [`ServerDesc::socks_port`].
    socks_port: u16,
    /// See [`ServerDesc::dir_port`].
    dir_port: u16,
    /// See [`ServerDesc::bandwidth`].
    bandwidth: Option<Bandwidth>,
    /// See [`ServerDesc::platform`].
    platform: Option<String>,
    /// See [`ServerDesc::proto`].
    proto: Option<String>,
    /// See [`ServerDesc::protocols`].
    protocols: Option<LegacyProtocols>,
    /// See [`ServerDesc::published`].
    published: Option<SystemTime>,
    /// See [`ServerDesc::fingerprint`].
    fingerprint: Option<RsaIdentity>,
    /// See [`ServerDesc::uptime`].
    uptime: Option<u64>,
    /// See [`ServerDesc::onion_key`].
    onion_key: Option<Vec<u8>>,
    /// See [`ServerDesc::signing_key`].
    signing_key: Option<Vec<u8>>,
    /// See [`ServerDesc::contact`].
    contact: Option<String>,
    /// See [`ServerDesc::family`].
    family: RelayFamily,
    /// See [`ServerDesc::policy`].
    policy: AddrPolicy,
    /// See [`ServerDesc::ipv6_policy`].
    ipv6_policy: Option<PortPolicy>,
    /// See [`ServerDesc::or_addresses`].
    or_addresses: Vec<SocketAddr>,
    /// See [`ServerDesc::extra_info_digest`].
    extra_info_digest: Option<ExtraInfoDigest>,
    /// See [`ServerDesc::hidden_service_dir`].
    hidden_service_dir: Option<Vec<u16>>,
    /// See [`ServerDesc::is_hibernating`].
    hibernating: bool,
    /// See [`ServerDesc::caches_extra_info`].
    caches_extra_info: bool,
    /// See [`ServerDesc::allows_single_hop_exits`].
    allow_single_hop_exits: bool,
    /// See [`ServerDesc::eventdns`].
    eventdns: bool,
    /// See [`ServerDesc::is_tunnelled_dir_server`].
    tunnelled_dir_server: bool,
    /// See [`ServerDesc::ntor_onion_key`].
    ntor_onion_key: Option<[u8; 32]>,
    /// See [`ServerDesc::identity_ed25519`].
    identity_ed25519: Option<Vec<u8>>,
    /// See [`ServerDesc::master_key_ed25519`].
    master_key_ed25519: Option<[u8; 32]>,
    /// See [`ServerDesc::router_sig_ed25519`].
    router_sig_ed25519: Option<[u8; 64]>,
    /// See [`ServerDesc::onion_key_crosscert`].
    onion_key_crosscert: Option<Vec<u8>>,
    /// See [`ServerDesc::ntor_onion_key_crosscert`].
    ntor_onion_key_crosscert: Option<NtorCrossCert>,
    /// See [`ServerDesc::router_signature`].
    router_signature: Option<Vec<u8>>,
}

/// Accumulates the text of a descriptor, one entry at a time.
struct Encoder(String);

impl Encoder {
    /// Add an entry with keyword `kwd` and arguments `args`.
    fn item(&mut self, kwd: &str, args: &str) {
        self.0.push_str(kwd);
        if !args.is_empty() {
            self.0.push(' ');
            self.0.push_str(args);
        }
        self.0.push('\n');
    }
    /// Add an object with tag `tag` holding `data`.
    fn object(&mut self, tag: &str, data: &[u8]) {
        let b64 = base64::encode(data);
        self.0.push_str(&format!("-----BEGIN {}-----\n", tag));
        let mut rest = &b64[..];
        while !rest.is_empty() {
            let n = rest.len().min(64);
            self.0.push_str(&rest[..n]);
            self.0.push('\n');
            rest = &rest[n..];
        }
        self.0.push_str(&format!("-----END {}-----\n", tag));
    }
    /// Add a flag entry if `set` is true.
    fn flag(&mut self, kwd: &str, set: bool) {
        if set {
            self.item(kwd, "");
        }
    }
}

impl ServerDescBuilder {
    /// Construct a new ServerDescBuilder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `@type` annotation, like `server-descriptor 1.0`.
    pub fn doc_type(&mut self, doc_type: impl Into<String>) -> &mut Self {
        self.annotation.doc_type = Some(doc_type.into());
        self
    }
    /// Set the `@source` annotation.
    pub fn source(&mut self, source: impl Into<String>) -> &mut Self {
        self.annotation.source = Some(source.into());
        self
    }
    /// Set the `@downloaded-at` annotation.
    pub fn downloaded(&mut self, when: SystemTime) -> &mut Self {
        self.annotation.downloaded = Some(when);
        self
    }
    /// Set the `@purpose` annotation.
    pub fn purpose(&mut self, purpose: impl Into<String>) -> &mut Self {
        self.annotation.purpose = Some(purpose.into());
        self
    }

    /// Set the relay's nickname.
    ///
    /// This value is required.
    pub fn nickname(&mut self, nickname: impl Into<String>) -> &mut Self {
        self.nickname = Some(nickname.into());
        self
    }
    /// Set the relay's IPv4 address.
    ///
    /// This value is required.
    pub fn address(&mut self, address: Ipv4Addr) -> &mut Self {
        self.address = Some(address);
        self
    }
    /// Set the relay's OR port.
    pub fn or_port(&mut self, port: u16) -> &mut Self {
        self.or_port = port;
        self
    }
    /// Set the relay's obsolete SOCKS port.
    pub fn socks_port(&mut self, port: u16) -> &mut Self {
        self.socks_port = port;
        self
    }
    /// Set the relay's directory port.
    pub fn dir_port(&mut self, port: u16) -> &mut Self {
        self.dir_port = port;
        self
    }
    /// Set the relay's advertised bandwidth.
    ///
    /// This value is required.
    pub fn bandwidth(&mut self, bw: Bandwidth) -> &mut Self {
        self.bandwidth = Some(bw);
        self
    }
    /// Set the platform string.
    pub fn platform(&mut self, platform: impl Into<String>) -> &mut Self {
        self.platform = Some(platform.into());
        self
    }
    /// Set the text of the `proto` entry.
    pub fn proto(&mut self, proto: impl Into<String>) -> &mut Self {
        self.proto = Some(proto.into());
        self
    }
    /// Set the legacy link and circuit protocol versions.
    pub fn protocols(&mut self, protocols: LegacyProtocols) -> &mut Self {
        self.protocols = Some(protocols);
        self
    }
    /// Set the publication time.
    ///
    /// This value is required.  Fractions of a second are dropped.
    pub fn published(&mut self, when: SystemTime) -> &mut Self {
        self.published = Some(when);
        self
    }
    /// Set the relay's RSA identity fingerprint.
    ///
    /// This value is required.
    pub fn fingerprint(&mut self, id: RsaIdentity) -> &mut Self {
        self.fingerprint = Some(id);
        self
    }
    /// Set the relay's uptime, in seconds.
    pub fn uptime(&mut self, secs: u64) -> &mut Self {
        self.uptime = Some(secs);
        self
    }
    /// Set the DER-encoded RSA onion key.
    ///
    /// This value is required.
    pub fn onion_key(&mut self, der: Vec<u8>) -> &mut Self {
        self.onion_key = Some(der);
        self
    }
    /// Set the DER-encoded RSA identity key.
    ///
    /// This value is required.
    pub fn signing_key(&mut self, der: Vec<u8>) -> &mut Self {
        self.signing_key = Some(der);
        self
    }
    /// Set the operator's contact information.
    pub fn contact(&mut self, contact: impl Into<String>) -> &mut Self {
        self.contact = Some(contact.into());
        self
    }
    /// Set the relay's declared family.
    pub fn family(&mut self, family: RelayFamily) -> &mut Self {
        self.family = family;
        self
    }
    /// Add a rule at the end of the exit policy.
    pub fn policy_rule(&mut self, kind: RuleKind, pattern: AddrPortPattern) -> &mut Self {
        self.policy.push(kind, pattern);
        self
    }
    /// Set the IPv6 exit policy summary.
    pub fn ipv6_policy(&mut self, policy: PortPolicy) -> &mut Self {
        self.ipv6_policy = Some(policy);
        self
    }
    /// Add an extra OR address.
    pub fn or_address(&mut self, addr: SocketAddr) -> &mut Self {
        self.or_addresses.push(addr);
        self
    }
    /// Set the digests of the relay's extra-info document.
    pub fn extra_info_digest(&mut self, digest: ExtraInfoDigest) -> &mut Self {
        self.extra_info_digest = Some(digest);
        self
    }
    /// Mark the relay as a hidden service directory for `versions`.
    ///
    /// An empty list means version 2, as a bare `hidden-service-dir`
    /// entry does.
    pub fn hidden_service_dir(&mut self, mut versions: Vec<u16>) -> &mut Self {
        if versions.is_empty() {
            versions.push(2);
        }
        self.hidden_service_dir = Some(versions);
        self
    }
    /// Set whether the relay is hibernating.
    pub fn hibernating(&mut self, val: bool) -> &mut Self {
        self.hibernating = val;
        self
    }
    /// Set whether the relay caches extra-info documents.
    pub fn caches_extra_info(&mut self, val: bool) -> &mut Self {
        self.caches_extra_info = val;
        self
    }
    /// Set whether the relay allows single-hop exits.
    pub fn allow_single_hop_exits(&mut self, val: bool) -> &mut Self {
        self.allow_single_hop_exits = val;
        self
    }
    /// Set whether the relay uses eventdns.
    pub fn eventdns(&mut self, val: bool) -> &mut Self {
        self.eventdns = val;
        self
    }
    /// Set whether the relay is a tunnelled directory server.
    pub fn tunnelled_dir_server(&mut self, val: bool) -> &mut Self {
        self.tunnelled_dir_server = val;
        self
    }
    /// Set the curve25519 ntor onion key.
    pub fn ntor_onion_key(&mut self, key: [u8; 32]) -> &mut Self {
        self.ntor_onion_key = Some(key);
        self
    }
    /// Set the encoded ed25519 identity certificate.
    pub fn identity_ed25519(&mut self, cert: Vec<u8>) -> &mut Self {
        self.identity_ed25519 = Some(cert);
        self
    }
    /// Set the ed25519 master identity key.
    pub fn master_key_ed25519(&mut self, key: [u8; 32]) -> &mut Self {
        self.master_key_ed25519 = Some(key);
        self
    }
    /// Set the ed25519 signature.
    pub fn router_sig_ed25519(&mut self, sig: [u8; 64]) -> &mut Self {
        self.router_sig_ed25519 = Some(sig);
        self
    }
    /// Set the encoded onion key cross-certificate.
    pub fn onion_key_crosscert(&mut self, cert: Vec<u8>) -> &mut Self {
        self.onion_key_crosscert = Some(cert);
        self
    }
    /// Set the ntor onion key cross-certificate.
    pub fn ntor_onion_key_crosscert(&mut self, cert: NtorCrossCert) -> &mut Self {
        self.ntor_onion_key_crosscert = Some(cert);
        self
    }
    /// Set the RSA signature.
    ///
    /// This value is required.
    pub fn router_signature(&mut self, sig: Vec<u8>) -> &mut Self {
        self.router_signature = Some(sig);
        self
    }

    /// Encode this descriptor as text.
    ///
    /// Fails if a required value is missing.  The output is not
    /// checked any further: use [`ServerDescBuilder::build`] for that.
    pub fn encode(&self) -> Result<String> {
        let nickname = self
            .nickname
            .as_ref()
            .ok_or(Error::CannotBuild("Missing nickname"))?;
        let address = self
            .address
            .ok_or(Error::CannotBuild("Missing address"))?;
        let bw = self
            .bandwidth
            .ok_or(Error::CannotBuild("Missing bandwidth"))?;
        let published = self
            .published
            .ok_or(Error::CannotBuild("Missing publication time"))?;
        let fingerprint = self
            .fingerprint
            .ok_or(Error::CannotBuild("Missing fingerprint"))?;
        let onion_key = self
            .onion_key
            .as_ref()
            .ok_or(Error::CannotBuild("Missing onion key"))?;
        let signing_key = self
            .signing_key
            .as_ref()
            .ok_or(Error::CannotBuild("Missing signing key"))?;
        let signature = self
            .router_signature
            .as_ref()
            .ok_or(Error::CannotBuild("Missing signature"))?;

        let mut e = Encoder(String::new());
        let ann = &self.annotation;
        if let Some(t) = &ann.doc_type {
            e.item("@type", t);
        }
        if let Some(src) = &ann.source {
            e.item("@source", src);
        }
        if let Some(t) = ann.downloaded {
            e.item("@downloaded-at", &format_time_sp(t));
        }
        if let Some(p) = &ann.purpose {
            e.item("@purpose", p);
        }

        e.item(
            "router",
            &format!(
                "{} {} {} {} {}",
                nickname, address, self.or_port, self.socks_port, self.dir_port
            ),
        );
        if let Some(cert) = &self.identity_ed25519 {
            e.item("identity-ed25519", "");
            e.object("ED25519 CERT", cert);
        }
        if let Some(k) = &self.master_key_ed25519 {
            e.item(
                "master-key-ed25519",
                &base64::encode_config(k, base64::STANDARD_NO_PAD),
            );
        }
        if let Some(p) = &self.platform {
            e.item("platform", p);
        }
        if let Some(p) = &self.proto {
            e.item("proto", p);
        }
        if let Some(p) = &self.protocols {
            e.item("protocols", &p.to_string());
        }
        e.item("published", &format_time_sp(published));
        e.item("fingerprint", &fingerprint.to_spaced());
        if let Some(u) = self.uptime {
            e.item("uptime", &u.to_string());
        }
        e.item(
            "bandwidth",
            &format!("{} {} {}", bw.avg, bw.burst, bw.observed),
        );
        if let Some(d) = &self.extra_info_digest {
            let mut args = hex::encode_upper(d.sha1);
            if let Some(sha256) = &d.sha256 {
                args.push(' ');
                args.push_str(&base64::encode_config(sha256, base64::STANDARD_NO_PAD));
            }
            e.item("extra-info-digest", &args);
        }
        e.item("onion-key", "");
        e.object("RSA PUBLIC KEY", onion_key);
        e.item("signing-key", "");
        e.object("RSA PUBLIC KEY", signing_key);
        if let Some(cert) = &self.onion_key_crosscert {
            e.item("onion-key-crosscert", "");
            e.object("CROSSCERT", cert);
        }
        if let Some(cc) = &self.ntor_onion_key_crosscert {
            e.item("ntor-onion-key-crosscert", &cc.sign.to_string());
            e.object("ED25519 CERT", &cc.cert);
        }
        if let Some(v) = &self.hidden_service_dir {
            if v[..] == [2] {
                e.item("hidden-service-dir", "");
            } else {
                let v: Vec<String> = v.iter().map(u16::to_string).collect();
                e.item("hidden-service-dir", &v.join(" "));
            }
        }
        if self.hibernating {
            e.item("hibernating", "1");
        }
        if !self.family.is_empty() {
            e.item("family", &self.family.to_string());
        }
        if let Some(c) = &self.contact {
            e.item("contact", c);
        }
        if let Some(k) = &self.ntor_onion_key {
            e.item("ntor-onion-key", &base64::encode(k));
        }
        for addr in &self.or_addresses {
            e.item("or-address", &addr.to_string());
        }
        e.flag("caches-extra-info", self.caches_extra_info);
        e.flag("allow-single-hop-exits", self.allow_single_hop_exits);
        if self.eventdns {
            e.item("eventdns", "1");
        }
        e.flag("tunnelled-dir-server", self.tunnelled_dir_server);
        for rule in self.policy.rules() {
            e.0.push_str(&rule.to_string());
            e.0.push('\n');
        }
        if let Some(p) = &self.ipv6_policy {
            e.item("ipv6-policy", &p.to_string());
        }
        if let Some(sig) = &self.router_sig_ed25519 {
            e.item(
                "router-sig-ed25519",
                &base64::encode_config(&sig[..], base64::STANDARD_NO_PAD),
            );
        }
        e.item("router-signature", "");
        e.object("SIGNATURE", signature);
        Ok(e.0)
    }

    /// Encode this descriptor, then parse the result.
    ///
    /// This makes sure that the descriptor is one that we would accept.
    pub fn build(&self) -> Result<ServerDesc> {
        ServerDesc::parse(&self.encode()?)
    }
}

impl ServerDesc {
    /// Return a builder holding every value in this descriptor.
    pub fn to_builder(&self) -> ServerDescBuilder {
        ServerDescBuilder {
            annotation: self.annotation.clone(),
            nickname: Some(self.nickname.clone()),
            address: Some(self.address),
            or_port: self.or_port,
            socks_port: self.socks_port,
            dir_port: self.dir_port,
            bandwidth: Some(self.bandwidth),
            platform: self.platform.clone(),
            proto: self.proto.clone(),
            protocols: self.protocols.clone(),
            published: Some(self.published),
            fingerprint: Some(self.fingerprint),
            uptime: self.uptime,
            onion_key: Some(self.onion_key.clone()),
            signing_key: Some(self.signing_key.clone()),
            contact: self.contact.clone(),
            family: self.family.clone(),
            policy: self.policy.clone(),
            ipv6_policy: self.ipv6_policy.clone(),
            or_addresses: self.or_addresses.clone(),
            extra_info_digest: self.extra_info_digest.clone(),
            hidden_service_dir: self.hidden_service_dir.clone(),
            hibernating: self.hibernating,
            caches_extra_info: self.caches_extra_info,
            allow_single_hop_exits: self.allow_single_hop_exits,
            eventdns: self.eventdns,
            tunnelled_dir_server: self.tunnelled_dir_server,
            ntor_onion_key: self.ntor_onion_key,
            identity_ed25519: self.identity_ed25519.clone(),
            master_key_ed25519: self.master_key_ed25519,
            router_sig_ed25519: self.router_sig_ed25519,
            onion_key_crosscert: self.onion_key_crosscert.clone(),
            ntor_onion_key_crosscert: self.ntor_onion_key_crosscert.clone(),
            router_signature: Some(self.router_signature.clone()),
        }
    }
}
