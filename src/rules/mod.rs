//! Declarative allow/deny rules for shell commands.
//!
//! A rule file is TOML with a `deny` and an `allow` array of tables.
//! Rules are compiled once when the file is loaded and never change
//! afterwards.

pub mod check;
pub mod segment;
pub mod shell;

pub use check::{check_command, check_dir_constraint};
pub use segment::{extract_commands, segment, Segmentation};

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{AgentError, Result};

pub const DEFAULT_REASON: &str = "try another approach";

/// Where a rule applies relative to the project root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirConstraint {
    /// `project_root`: cwd is the root or below it.
    InsideProject,
    /// `!project_root`
    OutsideProject,
}

impl DirConstraint {
    pub fn parse(spec: &str) -> Result<Self> {
        let negate = spec.starts_with('!');
        match spec.trim_start_matches('!') {
            "project_root" if negate => Ok(DirConstraint::OutsideProject),
            "project_root" => Ok(DirConstraint::InsideProject),
            _ => Err(AgentError::UnknownDirConstraint {
                spec: spec.to_string(),
            }),
        }
    }

    /// Always true when either path is unknown.
    pub fn is_satisfied(&self, project_root: Option<&Path>, cwd: Option<&Path>) -> bool {
        let (Some(root), Some(cwd)) = (project_root, cwd) else {
            return true;
        };
        let inside = cwd.starts_with(root);
        match self {
            DirConstraint::InsideProject => inside,
            DirConstraint::OutsideProject => !inside,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    /// The rule matches a segment when any of these does.
    pub matchers: Vec<Regex>,
    pub reason: Option<String>,
    pub dir: Option<DirConstraint>,
    pub roles: Option<Vec<String>>,
}

impl Rule {
    pub fn matches(&self, segment: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(segment))
    }

    pub fn dir_satisfied(&self, project_root: Option<&Path>, cwd: Option<&Path>) -> bool {
        self.dir
            .map_or(true, |dir| dir.is_satisfied(project_root, cwd))
    }
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub deny: Vec<Rule>,
    pub allow: Vec<Rule>,
    pub default_reason: String,
    /// Deny lines the shell parser cannot read instead of splitting them
    /// on operators.
    pub strict_parsing: bool,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            deny: Vec::new(),
            allow: Vec::new(),
            default_reason: DEFAULT_REASON.into(),
            strict_parsing: false,
        }
    }
}

impl RuleSet {
    pub fn len(&self) -> usize {
        self.deny.len() + self.allow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Load and compile a rule file.
///
/// Rules restricted to `roles` are kept only when `role` is one of them;
/// with no role, every role-restricted rule is dropped.
pub fn load_rules(path: &Path, role: Option<&str>) -> Result<RuleSet> {
    if !path.exists() {
        return Err(AgentError::RulesNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    parse_rules(&contents, role).map_err(|e| match e {
        AgentError::RulesParse { reason, .. } => AgentError::RulesParse {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

/// Compile rules from TOML text. See [`load_rules`].
pub fn parse_rules(contents: &str, role: Option<&str>) -> Result<RuleSet> {
    let table: toml::Table = toml::from_str(contents).map_err(|e| AgentError::RulesParse {
        path: PathBuf::from("<inline>"),
        reason: e.to_string(),
    })?;

    let default_reason = match table.get("default_reason") {
        None => DEFAULT_REASON.to_string(),
        Some(toml::Value::String(s)) => s.clone(),
        Some(other) => return Err(top_level_error("default_reason", "a string", other)),
    };
    let strict_parsing = match table.get("strict_parsing") {
        None => false,
        Some(toml::Value::Boolean(b)) => *b,
        Some(other) => return Err(top_level_error("strict_parsing", "a boolean", other)),
    };

    Ok(RuleSet {
        deny: compile_section(&table, "deny", role)?,
        allow: compile_section(&table, "allow", role)?,
        default_reason,
        strict_parsing,
    })
}

fn top_level_error(key: &str, expected: &str, got: &toml::Value) -> AgentError {
    AgentError::RulesParse {
        path: PathBuf::from("<inline>"),
        reason: format!("'{key}' must be {expected}, got {}", got.type_str()),
    }
}

fn compile_section(table: &toml::Table, section: &str, role: Option<&str>) -> Result<Vec<Rule>> {
    let entries = match table.get(section) {
        None => return Ok(Vec::new()),
        Some(toml::Value::Array(entries)) => entries,
        Some(other) => {
            return Err(AgentError::RulesParse {
                path: PathBuf::from("<inline>"),
                reason: format!("'{section}' must be a list of tables, got {}", other.type_str()),
            })
        }
    };

    let mut rules = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let rule = compile_rule(entry, section, index)?;
        let visible = match (&rule.roles, role) {
            (None, _) => true,
            (Some(roles), Some(role)) => roles.iter().any(|r| r == role),
            (Some(_), None) => false,
        };
        if visible {
            rules.push(rule);
        }
    }
    Ok(rules)
}

fn compile_rule(entry: &toml::Value, section: &str, index: usize) -> Result<Rule> {
    let invalid = |name: &str, reason: String| AgentError::InvalidRule {
        section: section.to_string(),
        index,
        name: name.to_string(),
        reason,
    };

    let Some(table) = entry.as_table() else {
        return Err(invalid(
            "",
            format!("must be a table, got {}", entry.type_str()),
        ));
    };
    let name = match table.get("name") {
        Some(toml::Value::String(name)) => name.clone(),
        Some(other) => {
            return Err(invalid(
                "",
                format!("'name' must be a string, got {}", other.type_str()),
            ))
        }
        None => return Err(invalid("", "missing required key 'name'".into())),
    };

    let string_list = |key: &str| -> Result<Option<Vec<String>>> {
        let Some(value) = table.get(key) else {
            return Ok(None);
        };
        let Some(items) = value.as_array() else {
            return Err(invalid(
                &name,
                format!("'{key}' must be a list, got {}", value.type_str()),
            ));
        };
        items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    invalid(
                        &name,
                        format!("'{key}' entries must be strings, got {}", item.type_str()),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    };
    let optional_string = |key: &str| -> Result<Option<String>> {
        match table.get(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(invalid(
                &name,
                format!("'{key}' must be a string, got {}", other.type_str()),
            )),
        }
    };

    let commands = string_list("commands")?;
    let patterns = string_list("patterns")?;
    if commands.is_none() && patterns.is_none() {
        return Err(invalid(
            &name,
            "must have 'commands' and/or 'patterns'".into(),
        ));
    }

    let mut matchers = Vec::new();
    for command in commands.iter().flatten() {
        let pattern = format!(r"^{}\b", regex::escape(command));
        let compiled = Regex::new(&pattern).map_err(|e| {
            invalid(&name, format!("invalid command name {command:?}: {e}"))
        })?;
        matchers.push(compiled);
    }
    for pattern in patterns.iter().flatten() {
        let compiled = Regex::new(pattern)
            .map_err(|e| invalid(&name, format!("invalid regex {pattern:?}: {e}")))?;
        matchers.push(compiled);
    }

    let dir = optional_string("dir")?
        .map(|spec| DirConstraint::parse(&spec).map_err(|e| invalid(&name, e.to_string())))
        .transpose()?;

    Ok(Rule {
        reason: optional_string("reason")?,
        roles: string_list("roles")?,
        dir,
        matchers,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_matches_whole_leading_word() {
        let rules = parse_rules(
            "[[deny]]\nname = \"rm\"\ncommands = [\"rm\"]\n",
            None,
        )
        .unwrap();
        let rule = &rules.deny[0];
        assert!(rule.matches("rm -rf build"));
        assert!(rule.matches("rm"));
        assert!(!rule.matches("rmdir build"));
        assert!(!rule.matches("echo rm"));
    }

    #[test]
    fn test_dir_constraint_parse() {
        assert_eq!(
            DirConstraint::parse("project_root").unwrap(),
            DirConstraint::InsideProject
        );
        assert_eq!(
            DirConstraint::parse("!project_root").unwrap(),
            DirConstraint::OutsideProject
        );
        assert!(matches!(
            DirConstraint::parse("home"),
            Err(AgentError::UnknownDirConstraint { .. })
        ));
    }
}
