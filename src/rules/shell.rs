//! Locate the simple commands in a bash command line.
//!
//! The line is parsed with tree-sitter-bash and every `command` node in the
//! tree is reported, including those inside command/process substitutions
//! and unquoted heredoc bodies. Commands found inside a construct are
//! reported after the command that contains them. Nothing is expanded.
//!
//! A tree with `ERROR` or `MISSING` nodes is a [`ParseError`]; callers
//! decide whether to fall back to a cruder splitter or to refuse.

use std::ops::Range;

use tree_sitter::{Node, Parser};

/// Byte range of one simple command in the source line.
///
/// Starts at the first word or redirection that is not a `VAR=value`
/// assignment and ends after the last word or redirection of the command.
/// A heredoc contributes its `<<DELIM` operator, not its body.
pub type Span = Range<usize>;

const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("shell syntax error at byte {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Parse `src` and return the span of every simple command in it.
pub fn simple_commands(src: &str) -> Result<Vec<Span>, ParseError> {
    parse_at(src, 0)
}

fn parse_at(src: &str, depth: usize) -> Result<Vec<Span>, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_bash::LANGUAGE.into())
        .map_err(|e| ParseError::new(0, format!("bash grammar unavailable: {e}")))?;
    let tree = parser
        .parse(src, None)
        .ok_or_else(|| ParseError::new(0, "parser returned no tree"))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(first_error(root).unwrap_or_else(|| ParseError::new(0, "syntax error")));
    }

    let mut spans = Vec::new();
    collect(root, src, depth, &mut spans)?;
    Ok(spans)
}

fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn first_error(node: Node<'_>) -> Option<ParseError> {
    if node.is_missing() {
        return Some(ParseError::new(
            node.start_byte(),
            format!("missing `{}`", node.kind()),
        ));
    }
    if node.is_error() {
        return Some(ParseError::new(node.start_byte(), "unexpected input"));
    }
    children(node)
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

fn collect(node: Node<'_>, src: &str, depth: usize, out: &mut Vec<Span>) -> Result<(), ParseError> {
    if depth > MAX_DEPTH {
        return Err(ParseError::new(node.start_byte(), "nesting too deep"));
    }

    match node.kind() {
        "command" => out.extend(command_span(node)),
        // `export`, `declare`, `local`, `unset` and `[ ... ]` run as commands.
        "declaration_command" | "unset_command" => out.push(node.byte_range()),
        "test_command" if node.child(0).is_some_and(|open| open.kind() == "[") => {
            out.push(node.byte_range())
        }
        "heredoc_body" => {
            for child in children(node) {
                collect(child, src, depth + 1, out)?;
            }
            return heredoc_backticks(node, src, depth, out);
        }
        _ => {}
    }

    for child in children(node) {
        collect(child, src, depth + 1, out)?;
    }
    Ok(())
}

fn command_span(command: Node<'_>) -> Option<Span> {
    let start = children(command)
        .into_iter()
        .find(|child| child.kind() != "variable_assignment")?
        .start_byte();
    Some(start..redirected_end(command))
}

/// End of `command` including the redirections of an enclosing
/// `redirected_statement`. Heredocs count up to their start delimiter.
fn redirected_end(command: Node<'_>) -> usize {
    let mut end = command.end_byte();
    let Some(parent) = command.parent() else {
        return end;
    };
    let is_body = parent
        .child_by_field_name("body")
        .is_some_and(|body| body.id() == command.id());
    if parent.kind() != "redirected_statement" || !is_body {
        return end;
    }

    for redirect in children(parent) {
        match redirect.kind() {
            "file_redirect" | "herestring_redirect" => end = end.max(redirect.end_byte()),
            "heredoc_redirect" => {
                for part in children(redirect) {
                    if matches!(
                        part.kind(),
                        "heredoc_start" | "file_redirect" | "herestring_redirect"
                    ) {
                        end = end.max(part.end_byte());
                    }
                }
            }
            _ => {}
        }
    }
    end
}

/// Backtick substitutions left as plain text in an unquoted heredoc body.
fn heredoc_backticks(
    body: Node<'_>,
    src: &str,
    depth: usize,
    out: &mut Vec<Span>,
) -> Result<(), ParseError> {
    let quoted = body
        .parent()
        .and_then(|redirect| {
            children(redirect)
                .into_iter()
                .find(|part| part.kind() == "heredoc_start")
        })
        .is_some_and(|start| src[start.byte_range()].contains(['\'', '"', '\\']));
    if quoted {
        return Ok(());
    }

    for content in children(body) {
        if content.kind() != "heredoc_content" {
            continue;
        }
        let base = content.start_byte();
        for inner in backtick_ranges(&src[content.byte_range()]) {
            let offset = base + inner.start;
            let nested = parse_at(&src[offset..base + inner.end], depth + 1)
                .map_err(|e| ParseError::new(offset + e.offset, e.message))?;
            out.extend(nested.into_iter().map(|span| span.start + offset..span.end + offset));
        }
    }
    Ok(())
}

/// Ranges between unescaped backtick pairs, exclusive of the backticks.
fn backtick_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut open = None;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '`' => match open.take() {
                Some(start) => ranges.push(start..i),
                None => open = Some(i + 1),
            },
            _ => {}
        }
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<&str> {
        simple_commands(src)
            .unwrap()
            .into_iter()
            .map(|span| &src[span])
            .collect()
    }

    #[test]
    fn test_lists_and_pipelines() {
        assert_eq!(
            texts("cd /tmp && ls -la | grep foo; echo done"),
            vec!["cd /tmp", "ls -la", "grep foo", "echo done"]
        );
    }

    #[test]
    fn test_redirects_stay_with_command() {
        assert_eq!(
            texts("make 2>&1 > build.log && cat < in.txt"),
            vec!["make 2>&1 > build.log", "cat < in.txt"]
        );
    }

    #[test]
    fn test_assignments_skipped_by_position() {
        assert_eq!(texts(r#"A=1 B="x && y" env"#), vec!["env"]);
        assert!(texts("A=1").is_empty());
    }

    #[test]
    fn test_substitution_commands_follow_outer() {
        assert_eq!(
            texts("echo $(rm -rf x) `id`"),
            vec!["echo $(rm -rf x) `id`", "rm -rf x", "id"]
        );
        assert_eq!(texts("diff <(ls a) <(ls b)")[1..], ["ls a", "ls b"]);
    }

    #[test]
    fn test_compound_commands() {
        assert_eq!(
            texts("if test -f x; then cat x; else touch x; fi"),
            vec!["test -f x", "cat x", "touch x"]
        );
        assert_eq!(texts("for f in *.rs; do wc -l $f; done"), vec!["wc -l $f"]);
        assert_eq!(
            texts("case $x in a|b) echo ab ;; *) echo other ;; esac"),
            vec!["echo ab", "echo other"]
        );
        assert_eq!(texts("( cd sub && make ) > out"), vec!["cd sub", "make"]);
        assert_eq!(texts("f() { echo hi; }"), vec!["echo hi"]);
        assert_eq!(texts("[[ -n $(whoami) ]] && ls"), vec!["whoami", "ls"]);
    }

    #[test]
    fn test_declarations_are_commands() {
        assert_eq!(
            texts("declare -a x=(1 2) && ls"),
            vec!["declare -a x=(1 2)", "ls"]
        );
        assert_eq!(texts("export PATH=$(pwd)/bin"), vec!["export PATH=$(pwd)/bin", "pwd"]);
    }

    #[test]
    fn test_quoted_heredoc_body_is_skipped() {
        let src = "cat <<'EOF' > out.txt\nrm -rf /\n$(id)\nEOF\necho next";
        assert_eq!(texts(src), vec!["cat <<'EOF' > out.txt", "echo next"]);
    }

    #[test]
    fn test_unquoted_heredoc_substitutions_are_commands() {
        assert_eq!(
            texts("cat <<EOF\n$(sudo rm -rf /)\nEOF"),
            vec!["cat <<EOF", "sudo rm -rf /"]
        );
        assert_eq!(
            texts("cat <<-EOF\n\t`sudo id`\n\tEOF"),
            vec!["cat <<-EOF", "sudo id"]
        );
    }

    #[test]
    fn test_backtick_ranges() {
        assert_eq!(backtick_ranges("a `id` b `ls -l`"), vec![3..5, 10..15]);
        assert_eq!(backtick_ranges(r"escaped \`id\` and `x"), Vec::<std::ops::Range<usize>>::new());
    }

    #[test]
    fn test_comments_and_continuations() {
        assert_eq!(
            texts("ls \\\n  -la # trailing && comment"),
            vec!["ls \\\n  -la"]
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert!(simple_commands("echo 'unterminated").is_err());
        assert!(simple_commands("if true; then echo").is_err());
        assert!(simple_commands("echo )").is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let deep = format!("{}x{}", "$(".repeat(200), ")".repeat(200));
        assert!(simple_commands(&deep).is_err());
    }
}
