//! Content-quality metrics derived from a draft.
//!
//! Everything here is a pure function of its input; callers recompute on every
//! draft change.

use crate::models::DocumentDraft;
use serde::Serialize;

pub const DEFAULT_WORDS_PER_MINUTE: usize = 200;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ChecklistItem {
    pub label: String,
    pub passed: bool,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ScoreReport {
    /// Always within `0..=100`.
    pub score: u8,
    pub checklist: Vec<ChecklistItem>,
}

/// Everything the composer sidebar shows for the current draft.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct DraftMetrics {
    pub word_count: usize,
    pub reading_time_minutes: usize,
    pub keyword_density: f64,
    pub report: ScoreReport,
}

impl DraftMetrics {
    pub fn compute(draft: &DocumentDraft, words_per_minute: usize) -> Self {
        let word_count = word_count(&draft.body);
        Self {
            word_count,
            reading_time_minutes: reading_time_minutes(word_count, words_per_minute),
            keyword_density: keyword_density(&draft.body, &draft.focus_keyword),
            report: ScoreReport {
                score: seo_score(draft),
                checklist: checklist(draft),
            },
        }
    }
}

pub fn word_count(body: &str) -> usize {
    body.split_whitespace().count()
}

pub fn reading_time_minutes(word_count: usize, words_per_minute: usize) -> usize {
    let wpm = words_per_minute.max(1);
    word_count.div_ceil(wpm)
}

/// URL-safe slug: lowercase ASCII letters, digits and single hyphens between words.
///
/// Idempotent: the output contains nothing a second pass would change.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;

    for c in lowered.chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            continue;
        }
        if pending_space {
            out.push('-');
            pending_space = false;
        }
        out.push(c);
    }

    out.trim_matches('-').to_string()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Percentage of body words containing the focus keyword, rounded to two decimals.
pub fn keyword_density(body: &str, focus_keyword: &str) -> f64 {
    let keyword = focus_keyword.trim().to_lowercase();
    if keyword.is_empty() || body.trim().is_empty() {
        return 0.0;
    }

    let mut total = 0usize;
    let mut hits = 0usize;
    for word in body.split_whitespace() {
        total += 1;
        if word.to_lowercase().contains(&keyword) {
            hits += 1;
        }
    }
    if total == 0 {
        return 0.0;
    }

    let density = 100.0 * hits as f64 / total as f64;
    (density * 100.0).round() / 100.0
}

/// Lowercased keyword with whitespace runs joined by `-`; punctuation is kept.
fn hyphenate_keyword(focus_keyword: &str) -> String {
    focus_keyword
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn keyword_in_slug(slug: &str, focus_keyword: &str) -> bool {
    let hyphenated = hyphenate_keyword(focus_keyword);
    !hyphenated.is_empty() && slug.contains(&hyphenated)
}

pub fn seo_score(draft: &DocumentDraft) -> u8 {
    let mut score: u32 = 0;

    let title_len = draft.title.chars().count();
    if title_len > 30 && title_len < 60 {
        score += 20;
    }
    if draft.body.chars().count() > 800 {
        score += 20;
    }
    let meta_len = draft.meta_description.chars().count();
    if meta_len > 100 && meta_len < 160 {
        score += 20;
    }
    if !draft.cover_image_url.trim().is_empty() {
        score += 15;
    }
    if draft.tags.len() >= 3 {
        score += 10;
    }

    let keyword = draft.focus_keyword.trim();
    if !keyword.is_empty() {
        if contains_ci(&draft.body, keyword) {
            score += 5;
        }
        if contains_ci(&draft.title, keyword) {
            score += 5;
        }
        if keyword_in_slug(&draft.slug, keyword) {
            score += 5;
        }
    }

    score.min(100) as u8
}

pub fn checklist(draft: &DocumentDraft) -> Vec<ChecklistItem> {
    let keyword = draft.focus_keyword.trim();
    let has_keyword = !keyword.is_empty();
    let meta_len = draft.meta_description.chars().count();

    vec![
        ChecklistItem {
            label: "Focus keyword appears in the title".to_string(),
            passed: has_keyword && contains_ci(&draft.title, keyword),
        },
        ChecklistItem {
            label: "Focus keyword appears in the URL slug".to_string(),
            passed: has_keyword && keyword_in_slug(&draft.slug, keyword),
        },
        ChecklistItem {
            label: "Article has at least 800 words".to_string(),
            passed: word_count(&draft.body) >= 800,
        },
        ChecklistItem {
            label: "Meta description is between 120 and 160 characters".to_string(),
            passed: (120..=160).contains(&meta_len),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn sized(prefix: &str, len: usize) -> String {
        let mut s = prefix.to_string();
        while s.chars().count() < len {
            s.push('x');
        }
        s
    }

    fn full_marks_draft() -> DocumentDraft {
        // 45-char title with the keyword, 900-char body, 130-char meta description.
        let title = sized("Rust ownership explained ", 45);
        DocumentDraft {
            slug: slugify(&title),
            title,
            body: sized("Notes on rust ownership. ", 900),
            meta_description: sized("A tour of the borrow checker ", 130),
            cover_image_url: "https://img.example/cover.png".to_string(),
            tags: ["rust", "memory", "tutorial"]
                .iter()
                .map(|s| s.to_string())
                .collect::<BTreeSet<_>>(),
            focus_keyword: "rust".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust   2024: what's new?  "), "rust-2024-whats-new");
        assert_eq!(slugify("--Already-slugged--"), "already-slugged");
        assert_eq!(slugify("日本語"), "");
    }

    #[test]
    fn test_slugify_idempotent() {
        let inputs = [
            "Hello, World!",
            "  a - b  ",
            "Tabs\tand\nnewlines",
            "Ünïcödé Tïtle",
            "---",
            "",
            "C++ & Rust: A Comparison",
        ];
        for s in inputs {
            let once = slugify(s);
            assert_eq!(slugify(&once), once, "not idempotent for {s:?}");
            assert_eq!(slugify(s), once, "not deterministic for {s:?}");
        }
    }

    #[test]
    fn test_word_count_and_reading_time() {
        assert_eq!(word_count("  one two\tthree\n\nfour "), 4);
        assert_eq!(word_count(""), 0);
        assert_eq!(reading_time_minutes(0, 200), 0);
        assert_eq!(reading_time_minutes(1, 200), 1);
        assert_eq!(reading_time_minutes(200, 200), 1);
        assert_eq!(reading_time_minutes(201, 200), 2);
    }

    #[test]
    fn test_keyword_density() {
        assert_eq!(keyword_density("", "rust"), 0.0);
        assert_eq!(keyword_density("rust is fun", ""), 0.0);
        assert_eq!(keyword_density("Rust is fun with rustaceans", "rust"), 40.0);
        // 1 of 3 words -> 33.333.. -> 33.33
        assert_eq!(keyword_density("rust and go", "RUST"), 33.33);
    }

    #[test]
    fn test_seo_score_empty_draft_is_zero() {
        assert_eq!(seo_score(&DocumentDraft::default()), 0);
    }

    #[test]
    fn test_seo_score_full_marks() {
        let draft = full_marks_draft();
        assert_eq!(draft.title.chars().count(), 45);
        assert_eq!(seo_score(&draft), 100);
    }

    #[test]
    fn test_seo_score_boundaries_are_strict() {
        let mut draft = DocumentDraft {
            title: sized("", 30),
            body: sized("", 800),
            meta_description: sized("", 100),
            ..Default::default()
        };
        assert_eq!(seo_score(&draft), 0);

        draft.title = sized("", 31);
        draft.body = sized("", 801);
        draft.meta_description = sized("", 159);
        assert_eq!(seo_score(&draft), 60);

        draft.title = sized("", 60);
        assert_eq!(seo_score(&draft), 40);
    }

    #[test]
    fn test_seo_score_keyword_checks_ignore_case() {
        let draft = DocumentDraft {
            title: "Learning RUST".to_string(),
            body: "some rust text".to_string(),
            slug: "learning-rust".to_string(),
            focus_keyword: "Rust".to_string(),
            ..Default::default()
        };
        assert_eq!(seo_score(&draft), 15);
    }

    #[test]
    fn test_keyword_in_slug_joins_words_but_keeps_punctuation() {
        assert_eq!(hyphenate_keyword("  Rust   Async "), "rust-async");
        assert!(keyword_in_slug("learning-rust-async-today", "Rust Async"));
        assert!(!keyword_in_slug("css-tricks", "C++"));
        assert!(!keyword_in_slug("nodejs-tips", "node.js"));

        let draft = DocumentDraft {
            focus_keyword: "C++".to_string(),
            slug: "css-tricks".to_string(),
            ..Default::default()
        };
        assert_eq!(seo_score(&draft), 0);
        assert!(!checklist(&draft)[1].passed);
    }

    #[test]
    fn test_checklist_order_and_values() {
        let mut draft = full_marks_draft();
        let items = checklist(&draft);
        let labels: Vec<&str> = items.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Focus keyword appears in the title",
                "Focus keyword appears in the URL slug",
                "Article has at least 800 words",
                "Meta description is between 120 and 160 characters",
            ]
        );
        assert!(items[0].passed);
        assert!(items[1].passed);
        // 900 chars, but nowhere near 800 words.
        assert!(!items[2].passed);
        assert!(items[3].passed);

        draft.focus_keyword.clear();
        let items = checklist(&draft);
        assert!(!items[0].passed);
        assert!(!items[1].passed);
    }

    #[test]
    fn test_draft_metrics_compute() {
        let draft = DocumentDraft {
            body: "word ".repeat(401),
            ..Default::default()
        };
        let m = DraftMetrics::compute(&draft, DEFAULT_WORDS_PER_MINUTE);
        assert_eq!(m.word_count, 401);
        assert_eq!(m.reading_time_minutes, 3);
        assert_eq!(m.keyword_density, 0.0);
        assert_eq!(m.report.checklist.len(), 4);
    }
}
