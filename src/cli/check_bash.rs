use std::io::Read;
use std::path::{Path, PathBuf};

use super::hooks::write_log;
use super::CheckBashArgs;
use crate::backend::SHELL_TOOL;
use crate::decision::{Decision, HookInput, HookOutput};
use crate::error::{AgentError, Result};
use crate::rules;

/// Read one PreToolUse event from stdin and print the decision.
///
/// Any failure goes to stderr with exit status 2, which the agent CLI shows
/// to the model as a hook error.
pub fn run(args: &CheckBashArgs) -> Result<()> {
    let mut stdin = String::new();
    let outcome = std::io::stdin()
        .read_to_string(&mut stdin)
        .map_err(AgentError::from)
        .and_then(|_| decide(args, &stdin));

    match outcome {
        Ok(output) => {
            println!("{}", serde_json::to_string(&output)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("check-bash error: {e}");
            std::process::exit(2);
        }
    }
}

/// Decide one hook event.
pub fn decide(args: &CheckBashArgs, event: &str) -> Result<HookOutput> {
    if !args.rules.exists() {
        return Err(AgentError::RulesNotFound {
            path: args.rules.clone(),
        });
    }
    let input: HookInput = serde_json::from_str(event)?;
    if input.tool_name.as_deref().is_some_and(|t| t != SHELL_TOOL) {
        return Ok(HookOutput::pre_tool_use(Decision::Allow, None));
    }

    let cwd = PathBuf::from(input.cwd.as_deref().unwrap_or("."));
    let project_root = args.project_root.clone().unwrap_or_else(|| cwd.clone());
    let command = input.command().unwrap_or_default();

    let rules = rules::load_rules(&args.rules, args.role.as_deref())?;
    let verdict = rules::check_command(Some(command), &rules, Some(&project_root), Some(&cwd));

    if let Some(log) = &args.debug_log {
        write_log(log, command, verdict.decision, &verdict.reason);
    }

    if verdict.is_allowed() {
        return Ok(HookOutput::pre_tool_use(Decision::Allow, None));
    }
    let reason = format!(
        "Blocked: {}. Rules: {}",
        verdict.reason,
        display_relative(&args.rules, &project_root)
    );
    Ok(HookOutput::pre_tool_use(Decision::Deny, Some(reason)))
}

/// `path` relative to `root` when it lies inside it, as given otherwise.
fn display_relative(path: &Path, root: &Path) -> String {
    let relative = match (path.canonicalize(), root.canonicalize()) {
        (Ok(path), Ok(root)) => path.strip_prefix(&root).ok().map(Path::to_path_buf),
        _ => None,
    };
    relative
        .unwrap_or_else(|| path.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}
