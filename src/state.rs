use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys owned by the agent runtime. They survive every edit but never show up in a draft.
pub const RESERVED_FIELDS: [&str; 2] = ["messages", "running"];

/// The shared agent state document.
///
/// Known fields are typed; anything else the agent puts in its state lands in `extra` and is
/// written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_plan: Option<LearningPlan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_results: Option<Vec<SearchResultBundle>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningPlan {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub duration_weeks: i64,
    #[serde(default)]
    pub weekly_plans: Vec<WeekPlan>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeekPlan {
    #[serde(default)]
    pub week_number: i64,
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub checkpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub frequency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(default, alias = "title")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    App,
    Podcast,
    Book,
    Documentation,
    #[default]
    #[serde(other)]
    Other,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Podcast => "podcast",
            Self::Book => "book",
            Self::Documentation => "documentation",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResultBundle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_questions: Option<Value>,
    #[serde(default)]
    pub images: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    #[serde(default)]
    pub results: Vec<SearchResultItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResultItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_content: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentState {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// The document as the user may edit it: reserved fields removed.
    pub fn editable(&self) -> AgentState {
        AgentState {
            running: None,
            messages: None,
            ..self.clone()
        }
    }

    /// Pretty JSON of [`AgentState::editable`], the draft's text form.
    pub fn editable_json(&self) -> String {
        serde_json::to_string_pretty(&self.editable()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Replace reserved fields with the ones carried by `source`.
    pub fn with_reserved_from(mut self, source: &AgentState) -> AgentState {
        self.running = source.running;
        self.messages = source.messages.clone();
        for key in RESERVED_FIELDS {
            self.extra.remove(key);
        }
        self
    }

    pub fn learning_plan(&self) -> Option<&LearningPlan> {
        self.learning_plan.as_ref()
    }

    /// Search bundles, `None` when absent or empty.
    pub fn search_results(&self) -> Option<&[SearchResultBundle]> {
        self.search_results
            .as_deref()
            .filter(|bundles| !bundles.is_empty())
    }
}

impl LearningPlan {
    pub fn week(&self, week: usize) -> Option<&WeekPlan> {
        week.checked_sub(1).and_then(|idx| self.weekly_plans.get(idx))
    }
}

impl Resource {
    /// Link target as a browser would open it; bare hosts get an https scheme.
    pub fn display_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(normalize_link)
    }
}

impl SearchResultBundle {
    pub fn answer_text(&self) -> Option<&str> {
        meaningful_text(self.answer.as_deref())
    }

    /// Follow-up questions flattened to lines. The agent sends either one string or a list.
    pub fn follow_up_lines(&self) -> Vec<String> {
        match &self.follow_up_questions {
            Some(Value::String(text)) => meaningful_text(Some(text))
                .map(|text| vec![text.to_string()])
                .unwrap_or_default(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => meaningful_text(Some(text)).map(ToString::to_string),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other.to_string()],
        }
    }
}

impl SearchResultItem {
    pub fn body(&self) -> Option<&str> {
        meaningful_text(self.content.as_deref()).or(meaningful_text(self.raw_content.as_deref()))
    }

    pub fn display_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(normalize_link)
    }

    pub fn is_video(&self) -> bool {
        self.url
            .as_deref()
            .is_some_and(|url| url.contains("youtube.com") || url.contains("youtu.be"))
    }
}

fn meaningful_text(text: Option<&str>) -> Option<&str> {
    text.filter(|value| !value.trim().is_empty() && *value != "null")
}

fn normalize_link(url: &str) -> String {
    if url.starts_with("http") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}
