//! Fenced-code extraction from model responses.
//!
//! A response may wrap code in a fence tagged with a language hint, an
//! untagged fence, or no fence at all. Extraction is an ordered list of
//! matcher strategies tried in priority order, each independently testable.

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCode {
    pub code: String,
    /// Which strategy matched, for telemetry.
    pub strategy: &'static str,
}

struct Matcher {
    name: &'static str,
    regex: Regex,
}

pub struct CodeExtractor {
    matchers: Vec<Matcher>,
}

impl CodeExtractor {
    /// Build an extractor trying the given language hints most-specific
    /// first, then any tagged fence, then an untagged fence.
    pub fn with_language_hints(hints: &[&str]) -> Self {
        let mut matchers = Vec::new();
        for hint in hints {
            matchers.push(Matcher {
                name: "tagged_fence",
                regex: Regex::new(&format!(r"(?s)```{}[ \t]*\n(.*?)```", regex::escape(hint)))
                    .expect("static fence pattern"),
            });
        }
        matchers.push(Matcher {
            name: "any_tagged_fence",
            regex: Regex::new(r"(?s)```[A-Za-z0-9_+-]+[ \t]*\n(.*?)```")
                .expect("static fence pattern"),
        });
        matchers.push(Matcher {
            name: "untagged_fence",
            regex: Regex::new(r"(?s)```[ \t]*\n(.*?)```").expect("static fence pattern"),
        });
        Self { matchers }
    }

    /// Extractor for generated page code.
    pub fn for_page_code() -> Self {
        Self::with_language_hints(&["tsx", "typescript", "ts", "jsx", "javascript"])
    }

    /// Extractor for JSON artifacts (themes).
    pub fn for_json() -> Self {
        Self::with_language_hints(&["json"])
    }

    /// Extract code from a response, falling back to the raw text when no
    /// fence is found at all.
    pub fn extract(&self, response: &str) -> ExtractedCode {
        for matcher in &self.matchers {
            if let Some(captures) = matcher.regex.captures(response) {
                if let Some(body) = captures.get(1) {
                    return ExtractedCode {
                        code: body.as_str().trim().to_string(),
                        strategy: matcher.name,
                    };
                }
            }
        }
        ExtractedCode {
            code: response.trim().to_string(),
            strategy: "raw",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
