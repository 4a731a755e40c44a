use std::sync::LazyLock;

use regex::Regex;

use super::shell;

static QUOTED_HEREDOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<<(-?)\s*['"](\w+)['"]"#).expect("static regex"));
static OPERATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:&&|\|\|?|;)\s*").expect("static regex"));
static ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*=").expect("static regex"));

/// Segments of one command line and how they were obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmentation {
    pub commands: Vec<String>,
    /// False when the shell parser rejected the line and the regex
    /// splitter produced `commands` instead.
    pub parsed: bool,
}

/// Split a compound command line into its simple commands.
///
/// Leading `VAR=value` assignments are dropped from each segment. A blank
/// line yields no segments.
pub fn segment(command: &str) -> Segmentation {
    if command.trim().is_empty() {
        return Segmentation {
            commands: Vec::new(),
            parsed: true,
        };
    }
    match shell::simple_commands(command) {
        Ok(spans) => Segmentation {
            commands: spans
                .into_iter()
                .map(|span| String::from_utf8_lossy(&command.as_bytes()[span]).into_owned())
                .collect(),
            parsed: true,
        },
        Err(e) => {
            tracing::debug!(error = %e, "shell parse failed, splitting on operators");
            Segmentation {
                commands: split_on_operators(command),
                parsed: false,
            }
        }
    }
}

pub fn extract_commands(command: &str) -> Vec<String> {
    segment(command).commands
}

/// Regex splitter used when the shell parser gives up.
///
/// Quoted operators are split like real ones.
pub fn split_on_operators(command: &str) -> Vec<String> {
    let normalized = QUOTED_HEREDOC.replace_all(command, "<<${1}${2}");
    let flat = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
    OPERATOR
        .split(&flat)
        .filter_map(|segment| {
            let words: Vec<&str> = segment
                .split_whitespace()
                .skip_while(|w| ASSIGNMENT.is_match(w))
                .collect();
            (!words.is_empty()).then(|| words.join(" "))
        })
        .collect()
}

/// Undo terminal line wrapping in a command scraped from a pane.
///
/// A wrapped line breaks mid-word, which shows up as segments starting
/// with a flag or a single character. When that happens the line breaks
/// are dropped and the joined text is returned instead.
pub fn unwrap_screen_command(command: &str) -> String {
    if !command.contains('\n') {
        return command.to_string();
    }
    let segments = segment(command);
    let wrapped = segments.commands.is_empty()
        || segments.commands.iter().any(|cmd| {
            cmd.split_whitespace()
                .next()
                .is_some_and(|first| first.starts_with('-') || first.chars().count() <= 1)
        });
    if wrapped {
        command.replace('\n', "")
    } else {
        command.to_string()
    }
}
