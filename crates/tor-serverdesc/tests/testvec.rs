use hex_literal::hex;
use tor_serverdesc::types::policy::RuleKind;
use tor_serverdesc::types::RsaIdentity;
use tor_serverdesc::{parse, Error, ErrorKind, ServerDesc};

const SAMPLE: &str = include_str!("../testdata/LetFreedomRing.txt");

/// Return SAMPLE with `old` replaced by `new`, once.
fn edited(old: &str, new: &str) -> String {
    assert!(SAMPLE.contains(old));
    SAMPLE.replacen(old, new, 1)
}

/// Parse every descriptor in `s`.
fn parse_all(s: &str) -> Vec<Result<ServerDesc, Error>> {
    parse(s.as_bytes()).collect()
}

#[test]
fn two_descriptors() {
    let dump = format!("{}{}", SAMPLE, SAMPLE);
    let v = parse_all(&dump);
    assert_eq!(v.len(), 2);
    let first = v[0].as_ref().unwrap();
    let second = v[1].as_ref().unwrap();
    assert_eq!(first.nickname(), "LetFreedomRing");
    assert!(first.signed_text().range().end < second.signed_text().range().start);
    assert_eq!(
        second.signed_text().range().start,
        SAMPLE.len() + "@type server-descriptor 1.0\n".len()
    );
}

#[test]
fn bad_then_good() {
    let bad = edited(
        "bandwidth 20480 20480 16996\n",
        "bandwidth 20480 20480 16996\nbandwidth 1 1 1\n",
    );
    let dump = format!("{}{}", bad, SAMPLE);
    let v = parse_all(&dump);
    assert_eq!(v.len(), 2);

    let e = v[0].as_ref().unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Structure);
    assert_eq!(e.keyword(), Some("bandwidth"));
    assert_eq!(e.line(), Some(9));

    let sd = v[1].as_ref().unwrap();
    assert_eq!(sd.bandwidth().observed, 16996);
}

#[test]
fn not_a_descriptor() {
    let v = parse_all("hello world\nthis is not\na server descriptor\n");
    assert_eq!(v.len(), 1);
    let e = v[0].as_ref().unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Structure);
    assert_eq!(e.line(), Some(1));

    assert!(parse_all("").is_empty());
    assert!(parse_all("\n\n  \n").is_empty());
}

#[test]
fn bad_utf8() {
    let v: Vec<_> = parse(b"router \xff\n").collect();
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].as_ref().unwrap_err().kind(), ErrorKind::Lex);
}

#[test]
fn fingerprints() {
    let short = edited(
        "DA4D EC93 C8D2 F187 C027 A96D 3925 C153 1D90 A89E",
        "AAAA BBBB",
    );
    let e = ServerDesc::parse(&short).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::FieldFormat);
    assert_eq!(e.keyword(), Some("fingerprint"));
    assert_eq!(e.line(), Some(6));

    let other = edited(
        "DA4D EC93 C8D2 F187 C027 A96D 3925 C153 1D90 A89E",
        "AAAA BBBB CCCC DDDD EEEE FFFF 0000 1111 2222 3333",
    );
    let sd = ServerDesc::parse(&other).unwrap();
    assert_eq!(
        sd.fingerprint(),
        &RsaIdentity::from(hex!("AAAABBBBCCCCDDDDEEEEFFFF0000111122223333"))
    );
    assert_eq!(
        sd.fingerprint().to_string(),
        "$AAAABBBBCCCCDDDDEEEEFFFF0000111122223333"
    );
}

#[test]
fn policy_keeps_order() {
    let start = SAMPLE.find("reject 0.0.0.0/8").unwrap();
    let end = SAMPLE.find("router-signature").unwrap();
    let text = format!(
        "{}accept *:80\nreject *:*\naccept *:443\n{}",
        &SAMPLE[..start],
        &SAMPLE[end..]
    );
    let sd = ServerDesc::parse(&text).unwrap();
    let rules: Vec<_> = sd.policy().rules().iter().map(|r| r.to_string()).collect();
    assert_eq!(rules, vec!["accept *:80", "reject *:*", "accept *:443"]);
    assert_eq!(sd.policy().rules()[1].kind(), RuleKind::Reject);
    assert_eq!(sd.policy().rules()[1].pattern().ports(), None);
}

#[test]
fn flags() {
    let sd = ServerDesc::parse(SAMPLE).unwrap();
    assert!(!sd.is_hibernating());
    assert!(!sd.caches_extra_info());
    assert!(!sd.allows_single_hop_exits());
    assert!(sd.is_hidden_service_dir());

    let text = edited(
        "hidden-service-dir\n",
        "hibernating\nallow-single-hop-exits\ncaches-extra-info\n",
    );
    let sd = ServerDesc::parse(&text).unwrap();
    assert!(sd.is_hibernating());
    assert!(sd.allows_single_hop_exits());
    assert!(sd.caches_extra_info());
    assert!(!sd.is_hidden_service_dir());
}

#[test]
fn annotations() {
    let text = format!(
        "@downloaded-at 2014-12-06 00:00:00\n@source \"198.51.100.7\"\n@purpose general\n@frobnicate yes\n{}",
        SAMPLE
    );
    let sd = ServerDesc::parse(&text).unwrap();
    let ann = sd.annotation();
    assert_eq!(ann.source(), Some("\"198.51.100.7\""));
    assert_eq!(ann.purpose(), Some("general"));
    assert!(ann.downloaded().is_some());
    assert_eq!(ann.doc_type(), Some("server-descriptor 1.0"));

    let text = format!("@downloaded-at 2014-12-06\n{}", SAMPLE);
    let e = ServerDesc::parse(&text).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::FieldFormat);
    assert_eq!(e.line(), Some(1));
}

#[test]
fn bad_objects() {
    // Not base64 at all: the object stops at the bad line.
    let bad = edited(
        "hidden-service-dir\n",
        "frob\n-----BEGIN FROB-----\n!!!!\n-----END FROB-----\nhidden-service-dir\n",
    );
    let dump = format!("{}{}", bad, SAMPLE);
    let v = parse_all(&dump);
    assert_eq!(v.len(), 2);
    let e = v[0].as_ref().unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Lex);
    assert_eq!(e.line(), Some(24));
    assert!(v[1].is_ok());

    // Plausible characters, but not valid base64, on an unknown keyword.
    let bad = edited(
        "hidden-service-dir\n",
        "frob\n-----BEGIN FROB-----\nMi\n-----END FROB-----\nhidden-service-dir\n",
    );
    let e = ServerDesc::parse(&bad).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Lex);
    assert_eq!(e.line(), Some(24));

    // A mismatched END tag.
    let bad = edited("-----END SIGNATURE-----", "-----END SIGNATURES-----");
    let e = ServerDesc::parse(&bad).unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Lex);
    assert_eq!(e.line(), Some(44));
}

#[test]
fn round_trip() {
    let sd = ServerDesc::parse(SAMPLE).unwrap();
    let text = sd.to_builder().encode().unwrap();
    assert_eq!(text, SAMPLE);
    assert_eq!(ServerDesc::parse(&text).unwrap(), sd);
}
