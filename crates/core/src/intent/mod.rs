//! Pattern-based intent classification.
//!
//! Rules are static data: an ordered table of `(kind, patterns, extractor)`
//! entries evaluated by straightforward iteration. Rule order is the
//! priority order - the first pattern that matches wins, even when a later
//! rule would cover more of the input. When nothing matches, a looser
//! keyword pass produces a low-confidence partial match before giving up
//! with `IntentKind::Unknown`.

mod catalog;
mod rules;

use std::collections::BTreeMap;

use serde::Serialize;

pub use catalog::{examples_for, suggestions_for};

/// Base score for any full pattern match.
const BASE_CONFIDENCE: f64 = 0.7;
/// Fraction of the input a match must cover to earn the coverage boost.
const COVERAGE_THRESHOLD: f64 = 0.7;
const COVERAGE_BOOST: f64 = 0.2;
const PARAMETER_BOOST: f64 = 0.1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Deploy,
    PipelineStatus,
    CreateWorkItem,
    SystemCommand,
    ResourceCheck,
    GitOperations,
    Help,
    Unknown,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::PipelineStatus => "pipeline_status",
            Self::CreateWorkItem => "create_work_item",
            Self::SystemCommand => "system_command",
            Self::ResourceCheck => "resource_check",
            Self::GitOperations => "git_operations",
            Self::Help => "help",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Extracted parameter bag. Keys are the wire-facing argument names; a
/// `None` value records that a pattern looked for the field but the input
/// did not carry it.
pub type Parameters = BTreeMap<String, Option<String>>;

#[derive(Clone, Debug, PartialEq)]
pub struct IntentMatch {
    pub kind: IntentKind,
    pub parameters: Parameters,
    pub confidence: f64,
    pub original_text: String,
    pub matched_rule: Option<&'static str>,
}

impl IntentMatch {
    fn unknown(text: &str) -> Self {
        Self {
            kind: IntentKind::Unknown,
            parameters: Parameters::new(),
            confidence: 0.0,
            original_text: text.to_owned(),
            matched_rule: None,
        }
    }

    /// Parameter value, flattened through the `None` placeholder.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|value| value.as_deref())
    }
}

/// All classifiable intent kinds, in rule priority order.
pub fn available_intents() -> &'static [IntentKind] {
    &[
        IntentKind::Deploy,
        IntentKind::PipelineStatus,
        IntentKind::CreateWorkItem,
        IntentKind::SystemCommand,
        IntentKind::ResourceCheck,
        IntentKind::GitOperations,
        IntentKind::Help,
    ]
}

/// Required argument names per intent kind, checked by the orchestrator
/// before any remote call is issued.
pub fn required_parameters(kind: IntentKind) -> &'static [&'static str] {
    match kind {
        IntentKind::Deploy => &["version", "environment"],
        IntentKind::PipelineStatus => &["pipelineId"],
        IntentKind::CreateWorkItem => &["title"],
        IntentKind::SystemCommand => &["command"],
        IntentKind::GitOperations => &["operation"],
        IntentKind::ResourceCheck | IntentKind::Help | IntentKind::Unknown => &[],
    }
}

/// Classify free text into the best-matching intent.
///
/// Deterministic for a given rule table and input; no side effects.
pub fn classify(text: &str) -> IntentMatch {
    let normalized = text.trim();
    if normalized.is_empty() {
        return IntentMatch::unknown(normalized);
    }

    for rule in rules::rule_table() {
        for pattern in &rule.patterns {
            if let Some(captures) = pattern.regex.captures(normalized) {
                let parameters = (rule.extract)(&captures, normalized);
                return IntentMatch {
                    kind: rule.kind,
                    confidence: score_confidence(&captures, normalized),
                    parameters,
                    original_text: normalized.to_owned(),
                    matched_rule: Some(pattern.id),
                };
            }
        }
    }

    rules::keyword_fallback(normalized).unwrap_or_else(|| IntentMatch::unknown(normalized))
}

fn score_confidence(captures: &regex::Captures<'_>, text: &str) -> f64 {
    let mut confidence = BASE_CONFIDENCE;

    let matched_len = captures
        .get(0)
        .map(|full| full.as_str().chars().count())
        .unwrap_or_default() as f64;
    let input_len = text.chars().count().max(1) as f64;
    if matched_len / input_len >= COVERAGE_THRESHOLD {
        confidence += COVERAGE_BOOST;
    }

    let captured_parameter =
        captures.get(1).map(|group| !group.as_str().is_empty()).unwrap_or(false);
    if captured_parameter {
        confidence += PARAMETER_BOOST;
    }

    confidence.min(1.0)
}
