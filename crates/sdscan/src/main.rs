//! Scan files of Tor server descriptors, and report what we find.
//!
//! Every malformed descriptor is logged with its file and line number;
//! at the end we print how many descriptors parsed, how many errors of
//! each kind we saw, and the average advertised bandwidth.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

mod cmdline;

use cmdline::CmdLine;

use tor_serverdesc::{AllowAnnotations, ErrorKind, ServerDesc, ServerDescReader, ValidationPolicy};

use anyhow::{Context, Result};
use argh::FromArgs;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

#[derive(FromArgs, Debug, Clone, Default)]
/// Parse files of concatenated Tor server descriptors, report every
/// malformed descriptor, and summarize the rest.
struct Args {
    /// override the default location(s) for the configuration file
    #[argh(option, short = 'f')]
    rc: Vec<String>,
    /// override a configuration option (uses toml syntax)
    #[argh(option, short = 'c')]
    cfg: Vec<String>,
    /// reject "@" annotation lines before descriptors
    #[argh(switch)]
    no_annotations: bool,
    /// files of server descriptors to scan
    #[argh(positional)]
    files: Vec<String>,
}

/// Default options to use for our configuration.
const SDSCAN_DEFAULTS: &str = include_str!("./sdscan_defaults.toml");

/// Structure to hold our configuration options, whether from a
/// configuration file or the command line.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct ScanConfig {
    /// Whether to log at trace level.
    trace: bool,
    /// Whether descriptors may be preceded by annotations.
    annotations: bool,
    /// Extra checks to make on each descriptor.
    validation: ValidationPolicy,
}

impl ScanConfig {
    /// Return the annotation setting to hand to the parser.
    fn allow_annotations(&self) -> AllowAnnotations {
        if self.annotations {
            AllowAnnotations::AnnotationsAllowed
        } else {
            AllowAnnotations::AnnotationsNotAllowed
        }
    }
}

/// Build our configuration from the defaults, any `-f` files, and any
/// `-c` options, in that order.
fn load_config(args: &Args) -> Result<ScanConfig> {
    let mut cfg = config::Config::new();
    cfg.merge(config::File::from_str(
        SDSCAN_DEFAULTS,
        config::FileFormat::Toml,
    ))?;

    for path in &args.rc {
        let f: config::File<_> = Path::new(path).into();
        cfg.merge(f.format(config::FileFormat::Toml).required(true))?;
    }

    let mut cmdline = CmdLine::new();
    for opt in &args.cfg {
        cmdline.push_toml_line(opt.as_str());
    }
    if args.no_annotations {
        cmdline.push_flag("annotations", false);
    }
    cfg.merge(cmdline)?;

    Ok(cfg.try_into()?)
}

/// Running totals from scanning descriptors.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Summary {
    /// Number of descriptors that parsed.
    good: usize,
    /// Number of errors, by kind.
    errors: HashMap<ErrorKind, usize>,
    /// Sum of the average bandwidth of every good descriptor.
    bandwidth_sum: u128,
}

/// The error kinds, in the order we report them.
const KINDS: [ErrorKind; 4] = [
    ErrorKind::Lex,
    ErrorKind::FieldFormat,
    ErrorKind::Structure,
    ErrorKind::Validation,
];

impl Summary {
    /// Count one parsed descriptor.
    fn add_good(&mut self, desc: &ServerDesc) {
        self.good += 1;
        self.bandwidth_sum += u128::from(desc.bandwidth().avg);
    }
    /// Count one error.
    fn add_error(&mut self, kind: ErrorKind) {
        *self.errors.entry(kind).or_insert(0) += 1;
    }
    /// Add everything in `other` to this summary.
    fn absorb(&mut self, other: &Summary) {
        self.good += other.good;
        self.bandwidth_sum += other.bandwidth_sum;
        for (kind, n) in &other.errors {
            *self.errors.entry(*kind).or_insert(0) += n;
        }
    }
    /// Return the total number of errors.
    fn n_errors(&self) -> usize {
        self.errors.values().sum()
    }
    /// Return the number of errors of a given kind.
    fn n_errors_of(&self, kind: ErrorKind) -> usize {
        self.errors.get(&kind).copied().unwrap_or(0)
    }
    /// Return the mean average-bandwidth of the good descriptors, in
    /// bytes per second.
    fn mean_bandwidth(&self) -> Option<u128> {
        if self.good == 0 {
            None
        } else {
            Some(self.bandwidth_sum / self.good as u128)
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} descriptors, {} errors",
            self.good,
            self.n_errors()
        )?;
        if self.n_errors() > 0 {
            let parts: Vec<_> = KINDS
                .iter()
                .filter(|k| self.n_errors_of(**k) > 0)
                .map(|k| format!("{} {}", self.n_errors_of(*k), k))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        if let Some(bw) = self.mean_bandwidth() {
            write!(f, "; mean bandwidth {} B/s", bw)?;
        }
        Ok(())
    }
}

/// Scan every descriptor in `buf`, logging each error under `name`.
fn scan(name: &str, buf: &[u8], config: &ScanConfig) -> Summary {
    let mut summary = Summary::default();
    let reader = ServerDescReader::from_bytes(
        buf,
        &config.allow_annotations(),
        config.validation.clone(),
    );
    for result in reader {
        match result {
            Ok(desc) => summary.add_good(&desc),
            Err(e) => {
                match e.line() {
                    Some(line) => warn!("{}:{}: {}", name, line, e),
                    None => warn!("{}: {}", name, e),
                }
                summary.add_error(e.kind());
            }
        }
    }
    summary
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    let config = load_config(&args)?;

    let level = if config.trace {
        tracing::Level::TRACE
    } else {
        tracing::Level::DEBUG
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut total = Summary::default();
    for name in &args.files {
        let buf = std::fs::read(name).with_context(|| format!("Unable to read {}", name))?;
        let summary = scan(name, &buf, &config);
        info!("{}: {}", name, summary);
        total.absorb(&summary);
    }
    println!("{}", total);
    Ok(())
}
