//! The ordered rule table and its parameter extractors.
//!
//! Patterns are bilingual (English/Polish) and kept as plain strings so the
//! table reads as data. Extractors are pure functions from a regex match to
//! a parameter bag; secondary extractors scan the whole input for fields
//! the primary pattern does not carry (service name, assignee, commit
//! message and so on).

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::{IntentKind, IntentMatch, Parameters};

pub(crate) struct IntentRule {
    pub kind: IntentKind,
    pub patterns: Vec<RulePattern>,
    pub extract: Extractor,
}

pub(crate) struct RulePattern {
    pub id: &'static str,
    pub regex: Regex,
}

type Extractor = fn(&Captures<'_>, &str) -> Parameters;

pub(crate) fn rule_table() -> &'static [IntentRule] {
    static RULES: Lazy<Vec<IntentRule>> = Lazy::new(build_rules);
    &RULES
}

fn build_rules() -> Vec<IntentRule> {
    vec![
        rule(
            IntentKind::Deploy,
            &[
                ("deploy/to", r"(?i)deploy\s+(?:version\s+)?v?(\d+\.\d+\.\d+|\w+)\s+(?:to|do)\s+(\w+)"),
                ("deploy/pl", r"(?i)wdróż\s+(?:wersję\s+)?v?(\d+\.\d+\.\d+|\w+)\s+(?:na|do)\s+(\w+)"),
                ("deploy/of", r"(?i)deployment\s+(?:of\s+)?v?(\d+\.\d+\.\d+|\w+)\s+(?:to|do)\s+(\w+)"),
                ("deploy/start", r"(?i)(?:uruchom|start)\s+deploy(?:ment)?\s+v?(\d+\.\d+\.\d+|\w+)\s+(\w+)"),
            ],
            extract_deploy,
        ),
        rule(
            IntentKind::PipelineStatus,
            &[
                ("pipeline/status-first", r"(?i)(?:status|sprawdź)\s+pipeline\s+#?(\d+)"),
                ("pipeline/id-first", r"(?i)pipeline\s+#?(\d+)\s+status"),
                ("pipeline/question", r"(?i)(?:jak|what)\s+(?:is\s+)?(?:status|stan)\s+pipeline\s+#?(\d+)"),
                ("pipeline/build", r"(?i)build\s+#?(\d+)\s+(?:status|stan)"),
            ],
            extract_pipeline_status,
        ),
        rule(
            IntentKind::CreateWorkItem,
            &[
                ("workitem/create", r"(?i)(?:utwórz|create|add)\s+(?:zadanie|task|work[\s-]?item)[\s:]+(.+)"),
                ("workitem/new", r"(?i)(?:nowe|new)\s+(?:zadanie|task)[\s:]+(.+)"),
                ("workitem/typed", r"(?i)(?:dodaj|add)\s+(?:bug|feature|story)[\s:]+(.+)"),
                ("workitem/report", r"(?i)(?:zgłoś|report)\s+(?:bug|błąd)[\s:]+(.+)"),
            ],
            extract_work_item,
        ),
        rule(
            IntentKind::SystemCommand,
            &[
                ("command/run", r"(?i)(?:uruchom|run|execute)\s+(.+)"),
                ("command/exec", r"(?i)(?:wykonaj|exec)\s+(?:komendę?\s+)?(.+)"),
                ("command/labeled", r"(?i)command[\s:]+(.+)"),
                ("command/cmd", r"(?i)cmd[\s:]+(.+)"),
                ("command/powershell", r"(?i)powershell[\s:]+(.+)"),
            ],
            extract_system_command,
        ),
        rule(
            IntentKind::ResourceCheck,
            &[
                ("resources/check", r"(?i)(?:sprawdź|check)\s+(?:zasoby|resources?)(?:\s+(\w+))?"),
                ("resources/status", r"(?i)(?:status|stan)\s+(?:zasobów|resources?)(?:\s+(\w+))?"),
                ("resources/usage", r"(?i)(?:wykorzystanie|usage)\s+(?:zasobów|resources?)(?:\s+(\w+))?"),
                ("resources/infra", r"(?i)(?:jak|how)\s+(?:wygląda|looks?)\s+(?:infrastruktura|infrastructure)"),
            ],
            extract_resource_check,
        ),
        rule(
            IntentKind::GitOperations,
            &[
                ("git/verb", r"(?i)git\s+(status|commit|push|pull|log)(?:\s+(.+))?"),
                ("git/check", r"(?i)(?:sprawdź|check)\s+git\s+(?:status|stan)"),
                ("git/commit", r#"(?i)(?:commit|zapisz)\s+(?:zmiany|changes?)(?:\s+["'](.+)["'])?"#),
                ("git/push", r"(?i)(?:push|wyślij)\s+(?:na|to)\s+(\w+)"),
            ],
            extract_git_operation,
        ),
        rule(
            IntentKind::Help,
            &[
                ("help/exact", r"(?i)^(?:help|pomoc|\?)$"),
                ("help/howto", r"(?i)(?:jak|how)\s+(?:mogę|can\s+i)\s+(?:użyć|use)"),
                ("help/what", r"(?i)(?:co|what)\s+(?:potrafisz|can\s+you\s+do)"),
                ("help/commands", r"(?i)(?:komendy|commands?|funkcje|functions?)"),
            ],
            extract_help,
        ),
    ]
}

fn rule(kind: IntentKind, patterns: &[(&'static str, &str)], extract: Extractor) -> IntentRule {
    let patterns = patterns
        .iter()
        .map(|(id, source)| RulePattern {
            id,
            regex: Regex::new(source).expect("static intent pattern must compile"),
        })
        .collect();
    IntentRule { kind, patterns, extract }
}

/// Looser keyword scan used when no full pattern matched. Returns a
/// low-confidence match with whatever parameters can still be salvaged.
pub(crate) fn keyword_fallback(text: &str) -> Option<IntentMatch> {
    let lowered = text.to_lowercase();

    if lowered.contains("deploy") || lowered.contains("wdróż") {
        return Some(IntentMatch {
            kind: IntentKind::Deploy,
            parameters: partial_deploy_parameters(text),
            confidence: 0.5,
            original_text: text.to_owned(),
            matched_rule: Some("partial_deploy"),
        });
    }

    if lowered.contains("pipeline") || lowered.contains("build") {
        return Some(IntentMatch {
            kind: IntentKind::PipelineStatus,
            parameters: partial_pipeline_parameters(text),
            confidence: 0.5,
            original_text: text.to_owned(),
            matched_rule: Some("partial_pipeline"),
        });
    }

    if ["zadanie", "task", "bug", "feature"].iter().any(|keyword| lowered.contains(keyword)) {
        let mut parameters = Parameters::new();
        parameters.insert("title".to_owned(), Some(text.to_owned()));
        return Some(IntentMatch {
            kind: IntentKind::CreateWorkItem,
            parameters,
            confidence: 0.4,
            original_text: text.to_owned(),
            matched_rule: Some("partial_workitem"),
        });
    }

    None
}

fn partial_deploy_parameters(text: &str) -> Parameters {
    static VERSION: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"v?(\d+\.\d+\.\d+)").expect("static intent pattern must compile")
    });
    static ENVIRONMENT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)staging|production|prod|development|dev|test")
            .expect("static intent pattern must compile")
    });

    let mut parameters = Parameters::new();
    parameters.insert(
        "version".to_owned(),
        VERSION.captures(text).map(|captures| captures[1].to_owned()),
    );
    parameters.insert(
        "environment".to_owned(),
        ENVIRONMENT.find(text).map(|found| found.as_str().to_lowercase()),
    );
    parameters
}

fn partial_pipeline_parameters(text: &str) -> Parameters {
    static PIPELINE_ID: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"#?(\d+)").expect("static intent pattern must compile"));

    let mut parameters = Parameters::new();
    parameters.insert(
        "pipelineId".to_owned(),
        PIPELINE_ID.captures(text).map(|captures| captures[1].to_owned()),
    );
    parameters
}

fn extract_deploy(captures: &Captures<'_>, text: &str) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert("version".to_owned(), group(captures, 1));
    parameters.insert("environment".to_owned(), group(captures, 2));
    parameters.insert("service".to_owned(), scan(text, r"(?i)(?:service|serwis)[\s:]+(\w+)"));
    parameters
}

fn extract_pipeline_status(captures: &Captures<'_>, text: &str) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert("pipelineId".to_owned(), group(captures, 1));
    parameters.insert("project".to_owned(), scan(text, r"(?i)(?:project|projekt)[\s:]+(\w+)"));
    parameters
}

fn extract_work_item(captures: &Captures<'_>, text: &str) -> Parameters {
    static MENTION: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"@\w+").expect("static intent pattern must compile"));

    let full_title = group(captures, 1).unwrap_or_default();
    let title = MENTION.replace_all(&full_title, "").trim().to_owned();

    let mut parameters = Parameters::new();
    parameters.insert("title".to_owned(), (!title.is_empty()).then_some(title));
    parameters.insert("type".to_owned(), Some(work_item_type(text).to_owned()));
    parameters.insert("assignee".to_owned(), extract_assignee(&full_title));
    parameters
        .insert("description".to_owned(), scan(&full_title, r"(?i)(?:description|opis)[\s:]+(.+)"));
    parameters
}

fn extract_system_command(captures: &Captures<'_>, _text: &str) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert(
        "command".to_owned(),
        group(captures, 1).map(|command| command.trim().to_owned()),
    );
    parameters
}

fn extract_resource_check(captures: &Captures<'_>, text: &str) -> Parameters {
    let mut parameters = Parameters::new();
    parameters.insert("resourceType".to_owned(), Some("all".to_owned()));
    let resource_group = group(captures, 1).or_else(|| {
        scan(text, r"(?i)(?:resource[-\s]?group|grupa[-\s]?zasobów)[\s:]+(\w+)")
    });
    parameters.insert("resourceGroup".to_owned(), resource_group);
    parameters
}

fn extract_git_operation(captures: &Captures<'_>, text: &str) -> Parameters {
    const KNOWN_OPERATIONS: [&str; 5] = ["status", "commit", "push", "pull", "log"];

    let operation = group(captures, 1)
        .map(|value| value.to_lowercase())
        .filter(|value| KNOWN_OPERATIONS.contains(&value.as_str()))
        .unwrap_or_else(|| infer_git_operation(text));

    let message =
        group(captures, 2).or_else(|| scan(text, r#"["']([^"']+)["']"#));

    let mut parameters = Parameters::new();
    parameters.insert("operation".to_owned(), Some(operation));
    parameters.insert("path".to_owned(), scan(text, r"(?:in|w)\s+([\w/\\.-]+)"));
    parameters.insert("message".to_owned(), message);
    parameters
}

fn extract_help(_captures: &Captures<'_>, _text: &str) -> Parameters {
    Parameters::new()
}

fn infer_git_operation(text: &str) -> String {
    let lowered = text.to_lowercase();
    if lowered.contains("commit") || lowered.contains("zapisz") {
        "commit".to_owned()
    } else if lowered.contains("push") || lowered.contains("wyślij") {
        "push".to_owned()
    } else {
        "status".to_owned()
    }
}

fn work_item_type(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    if lowered.contains("bug") || lowered.contains("błąd") {
        "Bug"
    } else if lowered.contains("feature") || lowered.contains("funkcja") {
        "Feature"
    } else if lowered.contains("story") || lowered.contains("historia") {
        "User Story"
    } else if lowered.contains("epic") {
        "Epic"
    } else {
        "Task"
    }
}

fn extract_assignee(text: &str) -> Option<String> {
    static MENTION: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"@(\w+)").expect("static intent pattern must compile"));
    static ASSIGN_TO: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)(?:assign|przypisz)\s+(?:to|do)\s+(\w+)")
            .expect("static intent pattern must compile")
    });

    MENTION
        .captures(text)
        .or_else(|| ASSIGN_TO.captures(text))
        .map(|captures| format!("{}@company.com", &captures[1]))
}

fn group(captures: &Captures<'_>, index: usize) -> Option<String> {
    captures
        .get(index)
        .map(|found| found.as_str().to_owned())
        .filter(|value| !value.is_empty())
}

/// One-off secondary scan over the whole input for a single capture group.
fn scan(text: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()
        .and_then(|regex| regex.captures(text).map(|captures| captures[1].to_owned()))
}
