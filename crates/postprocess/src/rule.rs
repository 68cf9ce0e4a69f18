//! Regex rule model.
//!
//! Rules are authored as plain JSON alongside presets. A rule is off unless
//! it says `"enabled": true` — the opposite default from world-book entries,
//! because a half-written find/replace doing live rewrites is worse than a
//! lore entry that quietly participates.

use loreloom_core::fragment::TriggerMode;
use loreloom_core::message::View;
use serde::{Deserialize, Serialize};

/// Which side of macro expansion a rule runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Placement {
    #[default]
    #[serde(rename = "before_macro")]
    BeforeMacro,
    #[serde(rename = "after_macro")]
    AfterMacro,
}

fn both_views() -> Vec<View> {
    vec![View::UserView, View::AssistantView]
}

/// A single find/replace rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegexRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub placement: Placement,

    #[serde(default)]
    pub find_regex: String,

    /// Replacement template; `$N` back-references are accepted.
    #[serde(default)]
    pub replace_with: String,

    /// Views the rule applies to. Omitted means both.
    #[serde(default = "both_views")]
    pub views: Vec<View>,

    #[serde(default)]
    pub mode: TriggerMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Substring trigger keys for conditional rules without a condition.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,

    /// Inclusive depth window; messages outside it are left alone.
    #[serde(default)]
    pub min_depth: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u64>,

    /// Source-type selectors (full type or coarse category). Empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,
}

impl RegexRule {
    /// Whether the rule participates in a pass at all, before trigger
    /// evaluation: enabled, right placement, a pattern to run, and the
    /// requested view in scope.
    pub fn applies_to(&self, placement: Placement, view: View) -> bool {
        self.enabled
            && self.placement == placement
            && !self.find_regex.is_empty()
            && self.views.contains(&view)
    }

    pub fn depth_in_window(&self, depth: usize) -> bool {
        let depth = depth as u64;
        depth >= self.min_depth && self.max_depth.is_none_or(|max| depth <= max)
    }

    pub fn targets_match(&self, kind: &loreloom_core::message::SourceKind) -> bool {
        self.targets.is_empty() || self.targets.iter().any(|t| kind.matches_target(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreloom_core::message::SourceKind;
    use serde_json::json;

    #[test]
    fn disabled_by_default() {
        let rule: RegexRule = serde_json::from_value(json!({"find_regex": "a"})).unwrap();
        assert!(!rule.enabled);
        assert!(!rule.applies_to(Placement::BeforeMacro, View::UserView));
    }

    #[test]
    fn omitted_views_means_both() {
        let rule: RegexRule =
            serde_json::from_value(json!({"enabled": true, "find_regex": "a"})).unwrap();
        assert!(rule.applies_to(Placement::BeforeMacro, View::UserView));
        assert!(rule.applies_to(Placement::BeforeMacro, View::AssistantView));
        assert!(!rule.applies_to(Placement::AfterMacro, View::UserView));
    }

    #[test]
    fn depth_window_bounds_are_inclusive() {
        let rule: RegexRule = serde_json::from_value(json!({
            "enabled": true, "find_regex": "a", "min_depth": 1, "max_depth": 3
        }))
        .unwrap();
        assert!(!rule.depth_in_window(0));
        assert!(rule.depth_in_window(1));
        assert!(rule.depth_in_window(3));
        assert!(!rule.depth_in_window(4));
    }

    #[test]
    fn unbounded_max_depth() {
        let rule: RegexRule =
            serde_json::from_value(json!({"enabled": true, "find_regex": "a"})).unwrap();
        assert!(rule.depth_in_window(0));
        assert!(rule.depth_in_window(10_000));
    }

    #[test]
    fn empty_targets_match_everything() {
        let rule: RegexRule =
            serde_json::from_value(json!({"enabled": true, "find_regex": "a"})).unwrap();
        assert!(rule.targets_match(&SourceKind::HistoryUser));
        assert!(rule.targets_match(&SourceKind::CharDescription));

        let scoped: RegexRule = serde_json::from_value(json!({
            "enabled": true, "find_regex": "a", "targets": ["world_book"]
        }))
        .unwrap();
        assert!(scoped.targets_match(&SourceKind::WorldBookInChat));
        assert!(!scoped.targets_match(&SourceKind::HistoryUser));
    }
}
