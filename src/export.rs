use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::info;

use crate::state::{AgentState, LearningPlan, SearchResultBundle};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no learning plan to export")]
    NoLearningPlan,
    #[error("no search results to export")]
    NoSearchResults,
    #[error("failed to format export date: {0}")]
    Date(#[from] time::error::Format),
    #[error("failed to write export '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Plan,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDocument {
    pub file_name: String,
    pub contents: String,
}

pub fn plan_markdown(plan: &LearningPlan) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "# {}\n\nDuration: {} weeks\n\n",
        plan.topic, plan.duration_weeks
    );
    for week in &plan.weekly_plans {
        let _ = write!(out, "## Week {}: {}\n\n", week.week_number, week.focus);

        out.push_str("### Activities\n");
        for activity in &week.activities {
            let _ = writeln!(out, "- {} ({})", activity.description, activity.frequency);
        }
        out.push('\n');

        if !week.resources.is_empty() {
            out.push_str("### Resources\n");
            for resource in &week.resources {
                let _ = write!(out, "- {} ({})", resource.name, resource.kind.as_str());
                if let Some(url) = resource.url.as_deref().filter(|url| !url.is_empty()) {
                    let _ = write!(out, ": {url}");
                }
                out.push('\n');
            }
            out.push('\n');
        }

        if !week.checkpoint.is_empty() {
            let _ = write!(out, "### Checkpoint\n{}\n\n", week.checkpoint);
        }
    }
    out
}

/// Topic with each whitespace run collapsed to `_` and every character that could leave the
/// export directory or break a file name replaced by `_`.
pub fn plan_file_name(plan: &LearningPlan) -> String {
    let mut name = String::with_capacity(plan.topic.len());
    let mut in_space = false;
    for ch in plan.topic.chars() {
        if ch.is_whitespace() {
            if !in_space {
                name.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if is_file_name_safe(ch) {
            name.push(ch);
        } else {
            name.push('_');
        }
    }
    name.push_str("_learning_plan.md");
    name
}

fn is_file_name_safe(ch: char) -> bool {
    !ch.is_control() && !matches!(ch, '/' | '\\' | '.' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

pub fn search_markdown(bundles: &[SearchResultBundle]) -> String {
    let mut out = String::from("# Search Results\n\n");
    for (idx, bundle) in bundles.iter().enumerate() {
        let _ = write!(out, "## Search {}", idx + 1);
        if let Some(query) = bundle.query.as_deref().filter(|query| !query.is_empty()) {
            let _ = write!(out, ": {query}");
        }
        out.push_str("\n\n");

        if let Some(answer) = bundle.answer_text() {
            let _ = write!(out, "### Answer\n{answer}\n\n");
        }

        if !bundle.results.is_empty() {
            out.push_str("### Sources\n");
            for (source_idx, source) in bundle.results.iter().enumerate() {
                let title = source
                    .title
                    .as_deref()
                    .filter(|title| !title.is_empty())
                    .unwrap_or("Untitled");
                let _ = writeln!(out, "#### Source {}: {title}", source_idx + 1);
                if let Some(url) = source.url.as_deref().filter(|url| !url.is_empty()) {
                    let _ = writeln!(out, "URL: {url}");
                }
                if let Some(body) = source.body() {
                    let _ = write!(out, "\n{body}\n\n");
                }
            }
        }

        let follow_ups = bundle.follow_up_lines();
        if !follow_ups.is_empty() {
            let _ = write!(out, "### Follow-up Questions\n{}\n\n", follow_ups.join("\n"));
        }
    }
    out
}

pub fn search_file_name(date: Date) -> Result<String, ExportError> {
    let stamp = date.format(format_description!("[year]-[month]-[day]"))?;
    Ok(format!("search_results_{stamp}.md"))
}

/// Build the document for `kind` from the state, dated `today` where a date is needed.
pub fn build(
    kind: ExportKind,
    state: &AgentState,
    today: Date,
) -> Result<ExportDocument, ExportError> {
    match kind {
        ExportKind::Plan => {
            let plan = state.learning_plan().ok_or(ExportError::NoLearningPlan)?;
            Ok(ExportDocument {
                file_name: plan_file_name(plan),
                contents: plan_markdown(plan),
            })
        }
        ExportKind::Search => {
            let bundles = state.search_results().ok_or(ExportError::NoSearchResults)?;
            Ok(ExportDocument {
                file_name: search_file_name(today)?,
                contents: search_markdown(bundles),
            })
        }
    }
}

/// Write the export into `dir`, creating it if needed. Returns the written path.
pub fn export_to_dir(
    kind: ExportKind,
    state: &AgentState,
    dir: &Path,
) -> Result<PathBuf, ExportError> {
    let document = build(kind, state, OffsetDateTime::now_utc().date())?;
    fs::create_dir_all(dir).map_err(|source| ExportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(&document.file_name);
    fs::write(&path, document.contents).map_err(|source| ExportError::Write {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), ?kind, "export written");
    Ok(path)
}

#[cfg(test)]
#[path = "../tests/unit/export_tests.rs"]
mod tests;
