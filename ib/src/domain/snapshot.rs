//! Page snapshot and executor result types
//!
//! The snapshot is the executor's bounded view of the live page; the
//! [`BrowserResult`] is the only information that crosses back to the
//! planner. Raw DOM never crosses that boundary.

use serde::{Deserialize, Serialize};

/// Interactive-element cap per snapshot
pub const MAX_ELEMENTS: usize = 100;

/// Visible-text cap per element
pub const MAX_ELEMENT_TEXT: usize = 50;

/// Body-text excerpt cap
pub const MAX_CONTENT_SNIPPET: usize = 1500;

/// One visible interactive element. The index is stable within its
/// snapshot and is the only way actions reference elements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub index: usize,
    /// Lowercase tag name ("a", "button", "input", ...)
    pub tag: String,
    /// Visible text, placeholder, or accessible label
    pub text: String,
}

/// Ephemeral structured view of the page fed to the executor's LLM call.
/// A fresh snapshot is required for every decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub interactive_elements: Vec<InteractiveElement>,
    /// First [`MAX_CONTENT_SNIPPET`] characters of visible body text
    pub content_snippet: String,
}

impl PageSnapshot {
    /// Serialize for the decision prompt: one element per line plus the
    /// content excerpt.
    pub fn render(&self) -> String {
        let mut out = format!("URL: {}\nTitle: {}\n\nInteractive elements:\n", self.url, self.title);
        for el in &self.interactive_elements {
            out.push_str(&format!("  [{}] <{}> {}\n", el.index, el.tag, el.text));
        }
        out.push_str("\nPage text:\n");
        out.push_str(&self.content_snippet);
        out
    }
}

/// What the executor hands back to the planner after a task segment:
/// a natural-language summary, any structured extractions, and the URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserResult {
    pub summary: String,
    #[serde(default)]
    pub extracted: serde_json::Value,
    pub url: String,
}

impl BrowserResult {
    /// Serialize for the planner's next plan-step message
    pub fn render(&self) -> String {
        let mut out = format!("Result: {}\nURL: {}", self.summary, self.url);
        if !self.extracted.is_null() && self.extracted != serde_json::json!({}) {
            out.push_str(&format!("\nExtracted: {}", self.extracted));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_render_lists_elements() {
        let snapshot = PageSnapshot {
            url: "https://example.com".to_string(),
            title: "Example".to_string(),
            interactive_elements: vec![
                InteractiveElement {
                    index: 0,
                    tag: "a".to_string(),
                    text: "More information".to_string(),
                },
                InteractiveElement {
                    index: 1,
                    tag: "button".to_string(),
                    text: "Accept".to_string(),
                },
            ],
            content_snippet: "Example Domain".to_string(),
        };

        let rendered = snapshot.render();
        assert!(rendered.contains("[0] <a> More information"));
        assert!(rendered.contains("[1] <button> Accept"));
        assert!(rendered.contains("Example Domain"));
    }

    #[test]
    fn test_browser_result_render_hides_empty_extraction() {
        let result = BrowserResult {
            summary: "found it".to_string(),
            extracted: serde_json::json!({}),
            url: "https://example.com".to_string(),
        };
        assert!(!result.render().contains("Extracted"));

        let result = BrowserResult {
            extracted: serde_json::json!({"price": "42"}),
            ..result
        };
        assert!(result.render().contains("Extracted"));
    }
}
