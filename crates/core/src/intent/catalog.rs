//! Static suggestion and example catalogues used by help surfaces and by
//! the "did you mean" path when classification confidence is too low.

use super::IntentKind;

/// Up to three example commands loosely related to the given text.
///
/// Families are keyed on the same keywords the fallback classifier uses;
/// when nothing is related, a default starter set is returned.
pub fn suggestions_for(text: &str) -> Vec<&'static str> {
    let lowered = text.to_lowercase();
    let mut suggestions = Vec::new();

    if contains_any(&lowered, &["deploy", "wdróż", "version"]) {
        suggestions.push("deploy v1.2.3 do staging");
        suggestions.push("wdróż wersję v2.0.0 na prod");
    }
    if contains_any(&lowered, &["pipeline", "build", "status"]) {
        suggestions.push("status pipeline 123");
        suggestions.push("sprawdź pipeline 456");
    }
    if contains_any(&lowered, &["task", "zadanie", "bug"]) {
        suggestions.push("utwórz zadanie: Fix login issue");
        suggestions.push("dodaj bug: Button not working");
    }
    if contains_any(&lowered, &["run", "uruchom", "command"]) {
        suggestions.push("uruchom docker ps");
        suggestions.push("wykonaj ls -la");
    }

    if suggestions.is_empty() {
        suggestions.extend([
            "help - pokaż dostępne komendy",
            "deploy v1.0.0 do staging",
            "status pipeline 123",
            "utwórz zadanie: Task description",
        ]);
    }

    suggestions.truncate(3);
    suggestions
}

/// Curated example commands per intent kind, for help output.
pub fn examples_for(kind: IntentKind) -> &'static [&'static str] {
    match kind {
        IntentKind::Deploy => &[
            "deploy v1.2.3 do staging",
            "wdróż wersję v2.0.0 na prod",
            "deployment of v1.5.0 to test",
        ],
        IntentKind::PipelineStatus => {
            &["status pipeline 123", "sprawdź pipeline 456", "pipeline 789 status"]
        }
        IntentKind::CreateWorkItem => &[
            "utwórz zadanie: Fix login bug",
            "nowe zadanie: Add user authentication",
            "dodaj bug: Button not responding",
        ],
        IntentKind::SystemCommand => {
            &["uruchom docker ps", "wykonaj ls -la", "run kubectl get pods"]
        }
        IntentKind::ResourceCheck => {
            &["sprawdź zasoby", "status zasobów produkcji", "wykorzystanie infrastruktury"]
        }
        IntentKind::GitOperations => {
            &["git status", "commit zmiany \"Update README\"", "sprawdź git status"]
        }
        IntentKind::Help => &["help", "pomoc", "co potrafisz?"],
        IntentKind::Unknown => &[],
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}
