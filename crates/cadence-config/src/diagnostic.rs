// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment errors are turned into miette reports that point at the offending
//! line of `cadence.toml`. Unknown keys get a "did you mean" suggestion from
//! the keys of their own table, or a hint when the key exists in a different
//! table (`default_max_retries` under `[engine]` instead of `[retry]`, say).

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Jaro-Winkler score above which a known key is offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Keys accepted by each table of `cadence.toml`.
pub const SECTIONS: &[(&str, &[&str])] = &[
    (
        "engine",
        &[
            "instance_id",
            "log_level",
            "tick_interval_secs",
            "claim_batch_size",
            "claim_lease_secs",
            "delivery_timeout_secs",
            "max_concurrent_deliveries",
        ],
    ),
    ("storage", &["database_path", "wal_mode", "busy_timeout_ms"]),
    (
        "retry",
        &["base_delay_secs", "max_delay_secs", "default_max_retries"],
    ),
    ("reconnect", &["interval_secs", "ceiling_secs"]),
    (
        "trust",
        &[
            "auto_promote",
            "edit_window",
            "smart_min_clean_approvals",
            "smart_max_edit_rate",
            "full_min_clean_approvals",
            "full_max_edit_rate",
            "auto_cleared_edit_limit",
        ],
    ),
    (
        "safety",
        &[
            "window_size",
            "max_failure_rate",
            "max_negative_rate",
            "min_success_signal_rate",
            "channels",
        ],
    ),
    ("metrics", &["enabled", "listen_address"]),
    (
        "platforms",
        &[
            "platform",
            "url",
            "health_url",
            "auth_token",
            "external_id_field",
        ],
    ),
];

/// A configuration problem, renderable by miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {}", table_label(section))]
    #[diagnostic(
        code(cadence::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), misplaced.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Dotted table path, empty for the top level.
        section: String,
        suggestion: Option<String>,
        /// Another table that does accept this key.
        misplaced: Option<String>,
        valid_keys: String,
        #[label("not a {} key", table_label(section))]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(cadence::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(cadence::config::missing_key),
        help("every [[platforms]] entry needs `platform` and `url`")
    )]
    MissingKey { key: String },

    /// A value that parsed but breaks a rule (rates, delays, leases).
    #[error("invalid configuration: {message}")]
    #[diagnostic(code(cadence::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(cadence::config::other))]
    Other(String),
}

fn table_label(section: &str) -> String {
    if section.is_empty() {
        "the top level".to_string()
    } else {
        format!("[{section}]")
    }
}

fn unknown_key_help(suggestion: Option<&str>, misplaced: Option<&str>, valid_keys: &str) -> String {
    match (misplaced, suggestion) {
        (Some(table), _) => format!("this key belongs in [{table}]"),
        (None, Some(s)) => format!("did you mean `{s}`? valid keys: {valid_keys}"),
        (None, None) => format!("valid keys: {valid_keys}"),
    }
}

/// The table, other than `current`, whose keys include `key`.
pub fn owning_section(key: &str, current: &str) -> Option<&'static str> {
    SECTIONS
        .iter()
        .find(|(name, keys)| *name != current && keys.contains(&key))
        .map(|(name, _)| *name)
}

/// Best Jaro-Winkler match for `unknown` among `valid_keys`.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Convert a figment error (which may hold several) into diagnostics.
///
/// `toml_sources` pairs a file path with its content, for source spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.clone();
            let source = source_for(&error, toml_sources);
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let section = table_path(&path);
                    let suggestion = suggest_key(field, expected);
                    let misplaced = owning_section(field, &section).map(str::to_string);
                    let (span, src) = span_in(source, &path, field);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section,
                        suggestion,
                        misplaced,
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: dotted(&path, field),
                },
                Kind::InvalidType(actual, expected) => {
                    let (parents, field) = match path.split_last() {
                        Some((last, parents)) => (parents.to_vec(), last.clone()),
                        None => (Vec::new(), String::new()),
                    };
                    let (span, src) = span_in(source, &parents, &field);
                    ConfigError::InvalidType {
                        key: path.join("."),
                        detail: format!("found {actual}"),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Table path of an error, with array indices dropped (`platforms.0` -> `platforms`).
fn table_path(path: &[String]) -> String {
    path.iter()
        .filter(|p| p.parse::<usize>().is_err())
        .cloned()
        .collect::<Vec<_>>()
        .join(".")
}

fn dotted(path: &[String], field: &str) -> String {
    let table = table_path(path);
    if table.is_empty() {
        field.to_string()
    } else {
        format!("{table}.{field}")
    }
}

fn source_for<'a>(
    error: &figment::Error,
    toml_sources: &'a [(String, String)],
) -> Option<(&'a str, &'a str)> {
    let file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|source| match source {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });
    let found = file.and_then(|file| toml_sources.iter().find(|(p, _)| *p == file));
    found
        .or_else(|| toml_sources.first())
        .map(|(p, c)| (p.as_str(), c.as_str()))
}

fn span_in(
    source: Option<(&str, &str)>,
    path: &[String],
    field: &str,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some((name, content)) = source else {
        return (None, None);
    };
    match find_key_offset(content, path, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.to_string())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` inside the table at `path`.
///
/// Matches `[a.b]` and `[[a]]` headers and only searches up to the next
/// header. Top-level keys are searched before the first header.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let table = table_path(path);
    let mut in_table = table.is_empty();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            let name = trimmed.trim_start_matches('[').trim_end_matches(']').trim();
            in_table = name == table;
        } else if in_table
            && let Some(rest) = trimmed.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            let indent = line.len() - line.trim_start().len();
            return Some(offset + indent);
        }
        offset += line.len();
    }
    None
}

/// Print every error to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
    let plural = if errors.len() == 1 { "" } else { "s" };
    eprintln!("cadence: {} configuration error{plural}", errors.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_engine_key() {
        let engine = SECTIONS[0].1;
        assert_eq!(
            suggest_key("tick_intervl_secs", engine),
            Some("tick_interval_secs".to_string())
        );
    }

    #[test]
    fn distant_key_has_no_suggestion() {
        assert_eq!(suggest_key("zzzzzz", &["window_size", "max_failure_rate"]), None);
    }

    #[test]
    fn key_from_another_table_is_located() {
        assert_eq!(owning_section("default_max_retries", "engine"), Some("retry"));
        assert_eq!(owning_section("window_size", "safety"), None);
        assert_eq!(owning_section("no_such_key", "engine"), None);
    }

    #[test]
    fn offset_is_scoped_to_its_table() {
        let content = "[engine]\nlog_level = \"info\"\n\n[retry]\nlog_level = 5\n";
        let path = vec!["retry".to_string()];
        let offset = find_key_offset(content, &path, "log_level").unwrap();
        assert_eq!(offset, content.rfind("log_level").unwrap());
    }

    #[test]
    fn offset_in_array_table() {
        let content = "[[platforms]]\nplatform = \"social-post\"\nurll = \"x\"\n";
        let path = vec!["platforms".to_string(), "0".to_string()];
        let offset = find_key_offset(content, &path, "urll").unwrap();
        assert_eq!(&content[offset..offset + 4], "urll");
    }

    #[test]
    fn missing_key_in_other_table_is_not_found() {
        let content = "[engine]\nlog_level = \"info\"\n";
        assert_eq!(
            find_key_offset(content, &["retry".to_string()], "log_level"),
            None
        );
    }

    #[test]
    fn help_points_at_owning_table() {
        assert_eq!(
            unknown_key_help(Some("log_levels"), Some("retry"), "log_level"),
            "this key belongs in [retry]"
        );
    }
}
