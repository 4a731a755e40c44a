use std::path::Path;

use crate::decision::Verdict;
use crate::error::Result;

use super::{segment, DirConstraint, RuleSet};

/// Decide whether a shell command may run.
///
/// Deny rules are tried first against every segment; a hit denies the
/// whole command. Otherwise each segment needs a matching allow rule (the
/// first one in file order) whose directory constraint holds. Anything
/// else is denied with the rule set's default reason.
pub fn check_command(
    command: Option<&str>,
    rules: &RuleSet,
    project_root: Option<&Path>,
    cwd: Option<&Path>,
) -> Verdict {
    let default_deny = || Verdict::deny(rules.default_reason.clone(), None);

    let Some(command) = command.filter(|c| !c.is_empty()) else {
        return default_deny();
    };
    let segmentation = segment(command);
    if !segmentation.parsed && rules.strict_parsing {
        tracing::debug!(command, "unparseable command denied under strict parsing");
        return default_deny();
    }
    let segments = segmentation.commands;
    if segments.is_empty() {
        return default_deny();
    }

    for rule in &rules.deny {
        if segments.iter().any(|s| rule.matches(s)) && rule.dir_satisfied(project_root, cwd) {
            let reason = rule.reason.as_deref().unwrap_or(&rules.default_reason);
            return Verdict::deny(reason, Some(rule.name.clone()));
        }
    }

    let mut last_rule = None;
    for segment in &segments {
        let Some(rule) = rules.allow.iter().find(|r| r.matches(segment)) else {
            return default_deny();
        };
        if !rule.dir_satisfied(project_root, cwd) {
            let reason = rule.reason.as_deref().unwrap_or(&rules.default_reason);
            return Verdict::deny(reason, Some(rule.name.clone()));
        }
        last_rule = Some(rule.name.clone());
    }

    Verdict::allow(last_rule)
}

/// Evaluate a `dir` spec such as `project_root` or `!project_root`.
///
/// Unknown specs are an error; unknown paths satisfy any spec.
pub fn check_dir_constraint(
    spec: &str,
    project_root: Option<&Path>,
    cwd: Option<&Path>,
) -> Result<bool> {
    Ok(DirConstraint::parse(spec)?.is_satisfied(project_root, cwd))
}
