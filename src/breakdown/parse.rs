//! Lenient parsing of model replies into subtasks.

use serde::Deserialize;

use super::BreakdownError;
use crate::model::NewSubtask;

/// Title used when the model says the task needs no breakdown.
pub const NO_BREAKDOWN_TITLE: &str = "No breakdown needed / Simple task";

const NO_BREAKDOWN_MARKERS: [&str; 2] = ["no breakdown needed", "task seems straightforward"];

#[derive(Debug, Deserialize)]
struct RawSubtask {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    links: Option<Vec<Option<String>>>,
    #[serde(default, rename = "estimatedTime", alias = "estimated_time")]
    estimated_time: Option<Scalar>,
    #[serde(default, rename = "dependsOn", alias = "depends_on")]
    depends_on: Option<Vec<Scalar>>,
}

/// Models emit ids and estimates as either strings or bare numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Number(n) => n.to_string(),
        }
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty() && v != "null")
}

impl RawSubtask {
    fn into_new(self) -> Option<NewSubtask> {
        let title = non_empty(self.title)?;
        let link = non_empty(self.link).or_else(|| {
            self.links
                .unwrap_or_default()
                .into_iter()
                .find_map(non_empty)
        });
        Some(NewSubtask {
            title,
            description: non_empty(self.description),
            link,
            estimated_time: self.estimated_time.map(Scalar::into_string).filter(|s| !s.is_empty()),
            depends_on: self
                .depends_on
                .unwrap_or_default()
                .into_iter()
                .map(Scalar::into_string)
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

/// Remove markdown code fences the model may wrap its JSON in.
fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```JSON", "").replace("```", "").trim().to_string()
}

/// The slice from the first `[` to the last `]`, if any.
fn json_array_slice(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn says_no_breakdown(text: &str) -> bool {
    let lower = text.to_lowercase();
    NO_BREAKDOWN_MARKERS.iter().any(|m| lower.contains(m))
}

/// Parse a model reply into subtasks.
///
/// Items without a title are dropped.  When no usable item remains and the
/// reply declares the task simple, a single placeholder subtask is returned.
pub fn parse_subtasks(text: &str) -> Result<Vec<NewSubtask>, BreakdownError> {
    let cleaned = strip_fences(text);

    let parsed = json_array_slice(&cleaned)
        .map(|slice| serde_json::from_str::<Vec<RawSubtask>>(slice));

    let failure = match parsed {
        Some(Ok(items)) => {
            let subtasks: Vec<NewSubtask> = items.into_iter().filter_map(RawSubtask::into_new).collect();
            if !subtasks.is_empty() {
                return Ok(subtasks);
            }
            "reply contained no subtasks with a title".to_string()
        }
        Some(Err(e)) => format!("invalid JSON array: {e}"),
        None => "no JSON array found in reply".to_string(),
    };

    if says_no_breakdown(&cleaned) {
        return Ok(vec![NewSubtask {
            title: NO_BREAKDOWN_TITLE.to_string(),
            ..NewSubtask::default()
        }]);
    }

    tracing::warn!(reply_len = text.len(), reason = %failure, "could not parse breakdown reply");
    Err(BreakdownError::Parse(failure))
}
