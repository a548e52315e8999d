// src/core/options.rs

//! Raw build-option parsing.
//!
//! Two pure parsers live here: the comma-list grammar used by the CLI's
//! `-o` flag, and the scraper that turns `configure --help` output into
//! the set of switches a package's configure script understands.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::models::{ConfigureOption, ConfigureOptionKind};

lazy_static! {
    static ref HELP_OPTION_RE: Regex =
        Regex::new(r"--(enable|disable|with|without)-([A-Za-z0-9][A-Za-z0-9_-]*)")
            .expect("static pattern");
}

#[derive(Error, Debug)]
pub enum OptionParseError {
    #[error("configure script declares option '{0}' more than once with conflicting kinds")]
    DuplicateConfigureOption(String),
}

/// One token of a raw comma-separated option list.
///
/// The raw user-supplied spelling is retained for diagnostics: a bad token
/// inside a comma list should be reported both as itself and as the user
/// typed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionToken {
    Enable { name: String, raw: String },
    Negate { name: String, raw: String },
    Assign { name: String, value: String, raw: String },
}

impl OptionToken {
    pub fn name(&self) -> &str {
        match self {
            Self::Enable { name, .. } | Self::Negate { name, .. } | Self::Assign { name, .. } => {
                name
            }
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            Self::Enable { raw, .. } | Self::Negate { raw, .. } | Self::Assign { raw, .. } => raw,
        }
    }
}

/// Split a comma-separated option list into tokens.
///
/// Grammar per token: `name` enables, `-name` negates, `name=value`
/// assigns. Empty tokens (doubled or trailing commas) are skipped.
pub fn tokenize_options(raw: &str) -> Vec<OptionToken> {
    let mut tokens = Vec::new();
    for piece in raw.split(',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let raw_form = piece.to_string();
        if let Some(rest) = piece.strip_prefix('-') {
            tokens.push(OptionToken::Negate {
                name: rest.to_string(),
                raw: raw_form,
            });
        } else if let Some((name, value)) = piece.split_once('=') {
            tokens.push(OptionToken::Assign {
                name: name.to_string(),
                value: value.to_string(),
                raw: raw_form,
            });
        } else {
            tokens.push(OptionToken::Enable {
                name: piece.to_string(),
                raw: raw_form,
            });
        }
    }
    tokens
}

/// Scrape `configure --help` output for the switches the script exposes.
///
/// `--enable-X`/`--disable-X` yield an [`ConfigureOptionKind::Enable`]
/// option (default on for `disable` spellings, off for `enable` ones);
/// `--with-X`/`--without-X` yield a [`ConfigureOptionKind::With`] option.
/// The autoconf placeholders `FEATURE` and `PACKAGE` are skipped. Seeing
/// the same name under both kinds is an error.
pub fn parse_configure_help(help: &str) -> Result<BTreeMap<String, ConfigureOption>, OptionParseError> {
    let mut options: BTreeMap<String, ConfigureOption> = BTreeMap::new();
    for caps in HELP_OPTION_RE.captures_iter(help) {
        let (verb, name) = match (caps.get(1), caps.get(2)) {
            (Some(v), Some(n)) => (v.as_str(), n.as_str()),
            _ => continue,
        };
        if name == "FEATURE" || name == "PACKAGE" {
            continue;
        }
        let (kind, default) = match verb {
            "enable" => (ConfigureOptionKind::Enable, false),
            "disable" => (ConfigureOptionKind::Enable, true),
            "with" => (ConfigureOptionKind::With, false),
            "without" => (ConfigureOptionKind::With, true),
            _ => continue,
        };
        match options.get(name) {
            Some(existing) if existing.kind != kind => {
                return Err(OptionParseError::DuplicateConfigureOption(name.to_string()));
            }
            Some(_) => {}
            None => {
                options.insert(
                    name.to_string(),
                    ConfigureOption {
                        kind,
                        name: name.to_string(),
                        default,
                    },
                );
            }
        }
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_covers_all_three_forms() {
        let tokens = tokenize_options("cuda,mpi,-ibverbs,opt=5");
        assert_eq!(
            tokens,
            vec![
                OptionToken::Enable { name: "cuda".into(), raw: "cuda".into() },
                OptionToken::Enable { name: "mpi".into(), raw: "mpi".into() },
                OptionToken::Negate { name: "ibverbs".into(), raw: "-ibverbs".into() },
                OptionToken::Assign { name: "opt".into(), value: "5".into(), raw: "opt=5".into() },
            ]
        );
    }

    #[test]
    fn tokenizer_skips_empty_pieces() {
        assert!(tokenize_options("").is_empty());
        assert_eq!(tokenize_options("cuda,,smp,").len(), 2);
    }

    const HELP: &str = "\
Optional Features:
  --disable-FEATURE       do not include FEATURE
  --enable-rtc            use real-time clock timers
  --disable-sanitizer     turn off the address sanitizer
Optional Packages:
  --with-PACKAGE[=ARG]    use PACKAGE
  --with-cuda             compile with CUDA support
  --without-fftw          do not use FFTW
";

    #[test]
    fn help_scraper_classifies_switches() {
        let options = parse_configure_help(HELP).unwrap();
        assert_eq!(options["rtc"].kind, ConfigureOptionKind::Enable);
        assert!(!options["rtc"].default);
        assert_eq!(options["sanitizer"].kind, ConfigureOptionKind::Enable);
        assert!(options["sanitizer"].default);
        assert_eq!(options["cuda"].kind, ConfigureOptionKind::With);
        assert_eq!(options["fftw"].kind, ConfigureOptionKind::With);
        assert!(!options.contains_key("FEATURE"));
        assert!(!options.contains_key("PACKAGE"));
    }

    #[test]
    fn conflicting_kinds_for_one_name_error() {
        let err = parse_configure_help("--enable-cuda --with-cuda");
        assert!(matches!(
            err,
            Err(OptionParseError::DuplicateConfigureOption(name)) if name == "cuda"
        ));
    }
}
