//! Prompt templates for task breakdown.
//!
//! Templates are plain text files under `config/prompts/`.  A missing or
//! empty file falls back to the built-in text so the server always has a
//! usable prompt.  Placeholders use `{{key}}` syntax.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::PromptStyle;

const SEPARATOR: &str = "\n\n";

const BUILTIN_A: &str = r#"You are an expert at breaking down tasks into clear, actionable steps.

Break the following task into 3-7 concrete subtasks that someone can start on right away.

TASK: {{task_title}}
DETAILS: {{task_description}}

Rules:
- Each subtask title is one short, actionable sentence.
- Give each subtask an "id" ("1", "2", ...) and an "estimatedTime" such as "15 minutes" or "1-2 hours".
- "dependsOn" lists the ids of subtasks that must be finished first (empty array if none).
- Include a "link" to a helpful resource when one clearly applies, otherwise null.

Respond with a JSON array only, no prose:
[
  {"id": "1", "title": "...", "estimatedTime": "...", "dependsOn": [], "link": null}
]"#;

const BUILTIN_B: &str = r#"Break this task into 3-5 simple steps that make it feel easy to start.

TASK: {{task_title}}
DETAILS: {{task_description}}

Keep every step short.  If the task is already a single simple action, answer
exactly "No breakdown needed" instead of a list.

Otherwise respond with a JSON array only:
[
  {"id": "1", "title": "...", "estimatedTime": "...", "dependsOn": []}
]"#;

/// The breakdown templates available to the server.
#[derive(Debug, Clone)]
pub struct Prompts {
    detailed: String,
    minimal: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self { detailed: BUILTIN_A.to_string(), minimal: BUILTIN_B.to_string() }
    }
}

impl Prompts {
    /// Load `breakdown_a.txt` and `breakdown_b.txt` from `dir`.
    pub fn load(dir: &Path) -> Self {
        Self {
            detailed: read_template(dir, "breakdown_a.txt", BUILTIN_A),
            minimal: read_template(dir, "breakdown_b.txt", BUILTIN_B),
        }
    }

    pub fn template(&self, style: PromptStyle) -> &str {
        match style {
            PromptStyle::A => &self.detailed,
            PromptStyle::B => &self.minimal,
        }
    }

    /// Render the breakdown prompt for one task.
    pub fn render(&self, style: PromptStyle, title: &str, description: Option<&str>) -> String {
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or("No description provided");
        PromptBuilder::new()
            .append(self.template(style))
            .var("task_title", title.trim())
            .var("task_description", description)
            .build()
    }
}

fn read_template(dir: &Path, filename: &str, fallback: &str) -> String {
    let path = dir.join(filename);
    match fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            tracing::warn!("prompt: '{}' is empty, using built-in template", path.display());
            fallback.to_string()
        }
        Err(_) => {
            tracing::debug!("prompt: '{}' not found, using built-in template", path.display());
            fallback.to_string()
        }
    }
}

/// Joins text fragments and substitutes `{{key}}` placeholders.
#[derive(Debug, Default)]
pub struct PromptBuilder {
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment.  Blank fragments are skipped.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Join the fragments with blank lines and substitute variables.
    ///
    /// Substitution is a single left-to-right pass, so a value that itself
    /// contains `{{...}}` is never expanded again.  Unknown placeholders are
    /// left as they are.
    pub fn build(self) -> String {
        let joined = self.parts.join(SEPARATOR);
        let mut out = String::with_capacity(joined.len());
        let mut rest = joined.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let key = after[..end].trim();
                    match self.vars.get(key) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[start..start + 2 + end + 2]),
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}
