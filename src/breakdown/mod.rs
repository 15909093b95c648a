//! AI task breakdown: prompt selection, model call, reply parsing and the
//! canned fallbacks used when the model is unhelpful.

pub mod estimate;
pub mod parse;
pub mod prompt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{LlmProvider, ProviderError};
use crate::model::{NewSubtask, Task};

pub use estimate::{format_total_time, parse_estimated_time, total_with_buffer};
pub use parse::parse_subtasks;
pub use prompt::{PromptBuilder, Prompts};

const SYSTEM_PROMPT: &str =
    "You are an AI assistant that helps break down tasks into small, actionable subtasks.";
const SUGGESTION_SYSTEM_PROMPT: &str =
    "You are an AI assistant that helps users complete tasks efficiently.";

pub const DEFAULT_TIP: &str = "Start with just 5 minutes of focused work to build momentum.";
pub const DEFAULT_SUGGESTION: &str = "Focus on completing your next pending subtask to make progress.";
const TIP_MAX_CHARS: usize = 100;

#[derive(Debug, Error)]
pub enum BreakdownError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("failed to parse task breakdown response: {0}")]
    Parse(String),
}

/// Which breakdown template to use.
///
/// `A` asks for 3-7 detailed steps with estimates and dependencies; `B` asks
/// for 3-5 minimal steps and may answer that no breakdown is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PromptStyle {
    #[default]
    A,
    B,
}

impl PromptStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "A" | "a" => Some(PromptStyle::A),
            "B" | "b" => Some(PromptStyle::B),
            _ => None,
        }
    }
}

/// Ask the model to break a task into subtasks.
pub async fn generate(
    llm: &LlmProvider,
    prompts: &Prompts,
    style: PromptStyle,
    title: &str,
    description: Option<&str>,
) -> Result<Vec<NewSubtask>, BreakdownError> {
    let prompt = prompts.render(style, title, description);
    debug!(provider = llm.name(), ?style, title, "requesting task breakdown");
    let reply = llm.complete(&prompt, Some(SYSTEM_PROMPT)).await?;
    parse_subtasks(&reply)
}

/// Generic first steps used when the model reply cannot be parsed.
pub fn fallback_subtasks() -> Vec<NewSubtask> {
    vec![
        NewSubtask {
            title: "Break down the task into smaller steps".into(),
            ..NewSubtask::default()
        },
        NewSubtask {
            title: "Set a timer for 25 minutes and focus on just the first step".into(),
            link: Some("https://pomofocus.io/".into()),
            ..NewSubtask::default()
        },
        NewSubtask {
            title: "Take a short break, then continue with the next step".into(),
            ..NewSubtask::default()
        },
    ]
}

/// Formatted total of the estimates plus the buffer, `None` when none of
/// them is recognizable.
pub fn total_estimate<'a, I>(estimates: I, buffer_percent: u32) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let minutes = total_with_buffer(estimates.into_iter().flatten(), buffer_percent);
    Some(format_total_time(minutes)).filter(|s| !s.is_empty())
}

/// One short motivational tip for getting started on `title`.
pub async fn tip(llm: &LlmProvider, title: &str) -> String {
    let prompt = format!(
        "Based on this task: \"{}\", provide a single, short, helpful tip for getting started \
         or staying motivated. Keep it under {TIP_MAX_CHARS} characters.",
        title.trim()
    );
    match llm.complete(&prompt, None).await {
        Ok(reply) => clean_tip(&reply).unwrap_or_else(|| DEFAULT_TIP.to_string()),
        Err(e) => {
            warn!(error = %e, "tip generation failed");
            DEFAULT_TIP.to_string()
        }
    }
}

fn clean_tip(reply: &str) -> Option<String> {
    let text = reply.trim().trim_matches('"').trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(TIP_MAX_CHARS).collect())
}

/// Build the progress summary sent to the model for a suggestion.
pub fn suggestion_prompt(task: &Task) -> String {
    let (done, total) = task.progress();
    let percent = if total > 0 { done * 100 / total } else { 0 };
    let steps = task
        .subtasks
        .iter()
        .map(|s| {
            let state = s.status.as_str();
            match s.description.as_deref() {
                Some(d) if !d.is_empty() => format!("- {} ({state}): {d}", s.title),
                _ => format!("- {} ({state})", s.title),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Task: {}\n\nDescription: {}\n\nProgress: {percent}% complete ({done}/{total} subtasks)\n\n\
         Subtasks:\n{steps}\n\nBased on the current progress, provide a helpful suggestion for what \
         the user should focus on next to make progress on this task. Keep your suggestion concise \
         and actionable.",
        task.title,
        task.description.as_deref().unwrap_or("No description"),
    )
}

/// What the user should focus on next; canned text when the model fails.
pub async fn suggestion(llm: &LlmProvider, task: &Task) -> String {
    let prompt = suggestion_prompt(task);
    match llm.complete(&prompt, Some(SUGGESTION_SYSTEM_PROMPT)).await {
        Ok(reply) if !reply.trim().is_empty() => reply.trim().to_string(),
        Ok(_) => DEFAULT_SUGGESTION.to_string(),
        Err(e) => {
            warn!(error = %e, "suggestion generation failed");
            DEFAULT_SUGGESTION.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::providers::dummy::DummyProvider;
    use crate::model::{Priority, Subtask, TaskStatus};

    fn dummy(reply: Option<&str>) -> LlmProvider {
        LlmProvider::Dummy(DummyProvider::new(reply.map(str::to_string)))
    }

    fn task_with(statuses: &[TaskStatus]) -> Task {
        Task {
            id: "t1".into(),
            user_id: "u1".into(),
            title: "Write report".into(),
            description: None,
            status: TaskStatus::InProgress,
            completed: false,
            priority: Priority::Medium,
            due_date: None,
            total_estimated_time: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: None,
            completed_at: None,
            subtasks: statuses
                .iter()
                .enumerate()
                .map(|(i, st)| Subtask {
                    id: format!("s{i}"),
                    task_id: "t1".into(),
                    title: format!("Step {i}"),
                    description: None,
                    link: None,
                    status: *st,
                    estimated_time: None,
                    depends_on: Vec::new(),
                    position: i as i64,
                    created_at: "2026-01-01T00:00:00.000Z".into(),
                    updated_at: None,
                    completed_at: None,
                })
                .collect(),
        }
    }

    #[test]
    fn style_parse() {
        assert_eq!(PromptStyle::parse("A"), Some(PromptStyle::A));
        assert_eq!(PromptStyle::parse(" b "), Some(PromptStyle::B));
        assert_eq!(PromptStyle::parse("C"), None);
    }

    #[tokio::test]
    async fn generate_parses_model_reply() {
        let llm = dummy(Some(r#"[{"title":"Outline","estimatedTime":"20 minutes"}]"#));
        let subtasks = generate(&llm, &Prompts::default(), PromptStyle::A, "Write report", None)
            .await
            .unwrap();
        assert_eq!(subtasks.len(), 1);
        assert_eq!(subtasks[0].title, "Outline");
    }

    #[tokio::test]
    async fn generate_reports_unparseable_reply() {
        let llm = dummy(Some("I cannot help with that."));
        let err = generate(&llm, &Prompts::default(), PromptStyle::B, "x", None).await.unwrap_err();
        assert!(matches!(err, BreakdownError::Parse(_)));
    }

    #[test]
    fn fallback_has_pomodoro_link() {
        let fb = fallback_subtasks();
        assert_eq!(fb.len(), 3);
        assert_eq!(fb[1].link.as_deref(), Some("https://pomofocus.io/"));
    }

    #[test]
    fn total_estimate_includes_buffer() {
        let subtasks = vec![
            NewSubtask { title: "a".into(), estimated_time: Some("30 minutes".into()), ..Default::default() },
            NewSubtask { title: "b".into(), estimated_time: Some("1 hour".into()), ..Default::default() },
        ];
        let estimates = |subs: &[NewSubtask]| -> Option<String> {
            total_estimate(subs.iter().map(|s| s.estimated_time.as_deref()), 20)
        };
        assert_eq!(estimates(&subtasks).as_deref(), Some("~1.8 hrs"));
        assert_eq!(estimates(&fallback_subtasks()), None);
    }

    #[tokio::test]
    async fn tip_is_trimmed_and_truncated() {
        let long = format!("\"{}\"", "x".repeat(150));
        let t = tip(&dummy(Some(&long)), "Run").await;
        assert_eq!(t.chars().count(), 100);
        assert!(!t.starts_with('"'));

        assert_eq!(tip(&dummy(Some("   ")), "Run").await, DEFAULT_TIP);
    }

    #[test]
    fn suggestion_prompt_reports_progress() {
        let task = task_with(&[TaskStatus::Completed, TaskStatus::Pending, TaskStatus::Pending, TaskStatus::Completed]);
        let prompt = suggestion_prompt(&task);
        assert!(prompt.contains("50% complete (2/4 subtasks)"));
        assert!(prompt.contains("- Step 1 (pending)"));
        assert!(prompt.contains("No description"));
    }

    #[tokio::test]
    async fn suggestion_uses_model_reply() {
        let task = task_with(&[]);
        assert_eq!(suggestion(&dummy(Some(" Do step 1. ")), &task).await, "Do step 1.");
        assert_eq!(suggestion(&dummy(Some("")), &task).await, DEFAULT_SUGGESTION);
    }
}
