use std::collections::HashSet;

use serde_json::Value;

use crate::state::{AgentState, LearningPlan, SearchResultBundle, SearchResultItem, WeekPlan};
use crate::text_layout::{wrap_prefixed, wrap_word_with_positions, wrap_words};

pub const PLAN_PLACEHOLDER: &str = "No learning plan available.";
pub const SEARCH_PLACEHOLDER: &str = "No search results available";
pub const SEARCH_HEADER: &str = "Search Results";

const WEEK_CHIP_GAP: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StateTab {
    #[default]
    Visual,
    Json,
}

impl StateTab {
    pub fn toggled(self) -> Self {
        match self {
            Self::Visual => Self::Json,
            Self::Json => Self::Visual,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Visual => "Visual",
            Self::Json => "JSON",
        }
    }
}

/// Which week of the plan is on screen. 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeekSelection {
    active: Option<usize>,
}

impl WeekSelection {
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Follow the plan: pick week 1 the first time weeks appear, keep the choice while they stay,
    /// forget it when the plan goes away.
    pub fn reconcile(&mut self, plan: Option<&LearningPlan>) {
        let week_count = plan.map(|plan| plan.weekly_plans.len());
        self.active = match (self.active, week_count) {
            (_, None) => None,
            (None, Some(count)) if count > 0 => Some(1),
            (Some(week), Some(count)) if count > 0 => Some(week.min(count)),
            (active, Some(_)) => active,
        };
    }

    pub fn select(&mut self, week: usize, plan: Option<&LearningPlan>) -> bool {
        let count = plan.map_or(0, |plan| plan.weekly_plans.len());
        if week == 0 || week > count {
            return false;
        }
        self.active = Some(week);
        true
    }

    pub fn next(&mut self, plan: Option<&LearningPlan>) -> bool {
        let target = self.active.map_or(1, |week| week + 1);
        self.select(target, plan)
    }

    pub fn previous(&mut self, plan: Option<&LearningPlan>) -> bool {
        let target = self.active.map_or(1, |week| week.saturating_sub(1));
        self.select(target, plan)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneToggleLine {
    pub line_index: usize,
    pub key: String,
}

/// A clickable "Week N" label inside the week selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekChip {
    pub line_index: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub week: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneBlockView {
    pub lines: Vec<String>,
    pub toggles: Vec<PaneToggleLine>,
    pub week_chips: Vec<WeekChip>,
}

impl PaneBlockView {
    pub fn toggle_at(&self, line_index: usize) -> Option<&str> {
        let line = self.lines.get(line_index)?;
        if !(line.contains("[+]") || line.contains("[-]")) {
            return None;
        }
        self.toggles
            .iter()
            .find(|toggle| toggle.line_index == line_index)
            .map(|toggle| toggle.key.as_str())
    }

    pub fn week_at(&self, line_index: usize, col: usize) -> Option<usize> {
        self.week_chips
            .iter()
            .find(|chip| {
                chip.line_index == line_index && col >= chip.start_col && col < chip.end_col
            })
            .map(|chip| chip.week)
    }

    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn push_toggle(&mut self, line: String, key: String) {
        self.toggles.push(PaneToggleLine {
            line_index: self.lines.len(),
            key,
        });
        self.lines.push(line);
    }
}

pub fn search_toggle_key(bundle_idx: usize) -> String {
    format!("search:{bundle_idx}")
}

pub fn source_toggle_key(bundle_idx: usize, source_idx: usize) -> String {
    format!("source:{bundle_idx}:{source_idx}")
}

/// Every toggle key the current document can produce, for pruning stale expansion state.
pub fn toggle_keys(state: &AgentState) -> HashSet<String> {
    let mut keys = HashSet::new();
    for (bundle_idx, bundle) in state.search_results().unwrap_or_default().iter().enumerate() {
        keys.insert(search_toggle_key(bundle_idx));
        for source_idx in 0..bundle.results.len() {
            keys.insert(source_toggle_key(bundle_idx, source_idx));
        }
    }
    keys
}

fn toggle_label(expanded: bool) -> &'static str {
    if expanded { "[-]" } else { "[+]" }
}

/// The Visual tab: plan panel then search panel.
pub fn visual_view(
    state: &AgentState,
    weeks: &WeekSelection,
    expanded: &HashSet<String>,
    width: u16,
) -> PaneBlockView {
    let width = width.max(8) as usize;
    let mut view = PaneBlockView::default();
    render_plan(&mut view, state.learning_plan(), weeks.active(), width);
    view.push(String::new());
    view.push("─".repeat(width));
    view.push(String::new());
    render_search(&mut view, state.search_results(), expanded, width);
    view
}

/// The JSON tab: the draft text wrapped the same way the edit cursor is laid out.
pub fn json_view(draft_text: &str, width: u16) -> PaneBlockView {
    let rendered = wrap_word_with_positions(draft_text, width).rendered;
    PaneBlockView {
        lines: rendered.split('\n').map(ToString::to_string).collect(),
        ..PaneBlockView::default()
    }
}

fn render_plan(
    view: &mut PaneBlockView,
    plan: Option<&LearningPlan>,
    active_week: Option<usize>,
    width: usize,
) {
    let Some(plan) = plan else {
        view.push(PLAN_PLACEHOLDER);
        return;
    };

    view.lines.extend(wrap_words(&plan.topic, width));
    view.push(format!("Duration: {} weeks", plan.duration_weeks));
    view.push(String::new());

    render_week_selector(view, plan.weekly_plans.len(), active_week, width);

    let Some((week, week_plan)) = active_week.and_then(|week| plan.week(week).map(|p| (week, p)))
    else {
        return;
    };
    view.push(String::new());
    render_week(view, week, week_plan, width);
}

fn render_week_selector(
    view: &mut PaneBlockView,
    week_count: usize,
    active_week: Option<usize>,
    width: usize,
) {
    let mut line = String::new();
    for week in 1..=week_count {
        let label = if active_week == Some(week) {
            format!("[Week {week}]")
        } else {
            format!(" Week {week} ")
        };
        let label_len = label.chars().count();
        let mut col = line.chars().count();
        if col > 0 && col + WEEK_CHIP_GAP + label_len > width {
            view.push(std::mem::take(&mut line));
            col = 0;
        }
        if col > 0 {
            line.push_str(&" ".repeat(WEEK_CHIP_GAP));
            col += WEEK_CHIP_GAP;
        }
        view.week_chips.push(WeekChip {
            line_index: view.lines.len(),
            start_col: col,
            end_col: col + label_len,
            week,
        });
        line.push_str(&label);
    }
    if !line.is_empty() {
        view.push(line);
    }
}

fn render_week(view: &mut PaneBlockView, week: usize, plan: &WeekPlan, width: usize) {
    view.lines.extend(wrap_words(&format!("Week {week}: {}", plan.focus), width));
    view.push(String::new());

    view.push(format!("Activities ({})", plan.activities.len()));
    for activity in &plan.activities {
        view.lines.extend(wrap_prefixed("  ✓ ", &activity.description, width));
        if !activity.frequency.trim().is_empty() {
            view.push(format!("    [{}]", activity.frequency));
        }
    }

    if !plan.resources.is_empty() {
        view.push(String::new());
        view.push(format!("Resources ({})", plan.resources.len()));
        for resource in &plan.resources {
            view.lines.extend(wrap_prefixed(
                "  ▪ ",
                &format!("{} ({})", resource.name, resource.kind.as_str()),
                width,
            ));
            if let Some(url) = resource.display_url() {
                view.push(format!("    {url}"));
            }
        }
    }

    if !plan.checkpoint.trim().is_empty() {
        view.push(String::new());
        view.push("Checkpoint");
        view.lines.extend(wrap_prefixed("  ", &plan.checkpoint, width));
    }
}

fn render_search(
    view: &mut PaneBlockView,
    bundles: Option<&[SearchResultBundle]>,
    expanded: &HashSet<String>,
    width: usize,
) {
    let Some(bundles) = bundles else {
        view.push(SEARCH_PLACEHOLDER);
        return;
    };
    view.push(SEARCH_HEADER);
    for (bundle_idx, bundle) in bundles.iter().enumerate() {
        view.push(String::new());
        render_bundle(view, bundle_idx, bundle, expanded, width);
    }
}

fn render_bundle(
    view: &mut PaneBlockView,
    bundle_idx: usize,
    bundle: &SearchResultBundle,
    expanded: &HashSet<String>,
    width: usize,
) {
    let key = search_toggle_key(bundle_idx);
    let open = expanded.contains(&key);
    let mut header = format!("{} Result {}", toggle_label(open), bundle_idx + 1);
    if let Some(query) = bundle.query.as_deref().filter(|query| !query.is_empty()) {
        header.push_str(": ");
        header.push_str(query);
    }
    if let Some(seconds) = bundle.response_time.filter(|seconds| *seconds != 0.0) {
        header.push_str(&format!("  ({seconds}s)"));
    }
    view.push_toggle(header, key);
    if !open {
        return;
    }

    if let Some(answer) = bundle.answer_text() {
        view.push("    Answer");
        view.lines.extend(wrap_prefixed("      ", answer, width));
    }

    if !bundle.results.is_empty() {
        view.push(format!("    Sources ({})", bundle.results.len()));
        for (source_idx, item) in bundle.results.iter().enumerate() {
            render_source(view, bundle_idx, source_idx, item, expanded, width);
        }
    }

    let follow_ups = bundle.follow_up_lines();
    if !follow_ups.is_empty() {
        view.push("    Follow-up Questions");
        for question in &follow_ups {
            view.lines.extend(wrap_prefixed("      - ", question, width));
        }
    }

    if !bundle.images.is_empty() {
        view.push("    Images");
        for image in &bundle.images {
            let shown = match image {
                Value::String(url) if url.starts_with("http") => url.clone(),
                other => other.to_string(),
            };
            view.lines.extend(wrap_prefixed("      - ", &shown, width));
        }
    }
}

fn render_source(
    view: &mut PaneBlockView,
    bundle_idx: usize,
    source_idx: usize,
    item: &SearchResultItem,
    expanded: &HashSet<String>,
    width: usize,
) {
    let key = source_toggle_key(bundle_idx, source_idx);
    let open = expanded.contains(&key);
    let glyph = if item.is_video() { "▶" } else { "◍" };
    let title = item
        .title
        .as_deref()
        .filter(|title| !title.trim().is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("Result {}", source_idx + 1));
    let mut line = format!("      {} {glyph} {title}", toggle_label(open));
    if let Some(score) = item.score {
        line.push_str(&format!("  {score:.2}"));
    }
    view.push_toggle(line, key);
    if !open {
        return;
    }
    if let Some(url) = item.display_url() {
        view.lines.extend(wrap_prefixed("          ", &url, width));
    }
    if let Some(body) = item.body() {
        view.lines.extend(wrap_prefixed("          ", body, width));
    }
}

#[cfg(test)]
#[path = "../tests/unit/view_tests.rs"]
mod tests;
