//! A configuration source made from `-c` options on the command line.

use config::{ConfigError, Source, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Alias for the Result type from config.
type Result<T> = std::result::Result<T, ConfigError>;

/// A set of toml lines from the command line, to be layered over the
/// configuration files.
///
/// Each line is one `key=value` setting; a bare word on the right-hand
/// side is quoted for convenience, so `-c validation.require_ed25519=true`
/// and `-c validation.max_future_skew_secs=3600` both work.
#[derive(Debug, Clone, Default)]
pub(crate) struct CmdLine {
    /// The toml lines, in the order given.
    lines: Vec<String>,
}

impl CmdLine {
    /// Make a new empty set of overrides.
    pub(crate) fn new() -> Self {
        Self::default()
    }
    /// Add one line of toml.
    pub(crate) fn push_toml_line<S: Into<String>>(&mut self, line: S) {
        self.lines.push(line.into());
    }
    /// Set the boolean option `key` to `value`.
    pub(crate) fn push_flag(&mut self, key: &str, value: bool) {
        self.lines.push(format!("{}={}", key, value));
    }

    /// Rewrite a toml error message so that it names the offending
    /// line rather than a line number inside our concatenated string.
    fn describe_error(&self, msg: &str, pos: Option<(usize, usize)>) -> String {
        /// Matches the location suffix that the toml crate appends.
        static LOCATION: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"^(.*?) at line [0-9]+ column [0-9]+$").expect("Can't compile regex")
        });
        let msg = LOCATION
            .captures(msg)
            .and_then(|c| c.get(1))
            .map_or(msg, |m| m.as_str());

        match pos.and_then(|(line, _)| self.lines.get(line)) {
            Some(line) => format!("{} in option {:?}", msg, line),
            None => format!("{} in command-line options", msg),
        }
    }

    /// Join our lines into one toml document.
    fn to_toml(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match quote_bareword(line) {
                Some(quoted) => out.push_str(&quoted),
                None => out.push_str(line),
            }
            out.push('\n');
        }
        out
    }
}

impl Source for CmdLine {
    fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
        Box::new(self.clone())
    }

    fn collect(&self) -> Result<HashMap<String, Value>> {
        let value: toml::Value = toml::from_str(&self.to_toml())
            .map_err(|e| ConfigError::Message(self.describe_error(&e.to_string(), e.line_col())))?;

        value
            .try_into()
            .map_err(|e| ConfigError::Foreign(Box::new(e)))
    }
}

/// If `s` looks like "dotted.key=bareword", return it with the bareword
/// quoted.  Otherwise return None.
///
/// Quoting numbers and booleans is harmless: config converts strings to
/// whatever type the deserializer asks for.
fn quote_bareword(s: &str) -> Option<String> {
    /// Matches a key=bareword line.
    static BAREWORD: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r#"(?x:
               ^
                [ \t]*
                # first capture group: the dotted key
                ((?:[a-zA-Z0-9_\-]+\.)*
                 [a-zA-Z0-9_\-]+)
                [ \t]*=[ \t]*
                # second group: one bareword without hyphens
                ([a-zA-Z0-9_]+)
                [ \t]*
                $)"#,
        )
        .expect("Built-in regex compilation failed")
    });

    BAREWORD
        .captures(s)
        .map(|c| format!("{}=\"{}\"", &c[1], &c[2]))
}
