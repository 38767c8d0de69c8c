//! Instruction extraction from README-style documents
//!
//! Turns free-form markdown into an ordered list of [`Instruction`]s:
//! bullets become prose, fenced shell blocks and inline code spans that look
//! like commands become executable instructions.

use std::path::Path;

use tracing::debug;

use docproof_common::Instruction;

/// Characters used for directory-tree and diagram art.
pub const BOX_DRAWING_CHARS: &[char] = &[
    '│', '├', '└', '─', '┌', '┐', '┘', '┴', '┬', '┼', '╰', '╯', '╭', '╮',
];

/// Fence languages treated as shell. The empty string is an untagged fence.
pub const SHELL_LANGUAGES: &[&str] = &["bash", "sh", "shell", ""];

const FENCE: &str = "```";

/// Decides whether a snippet of text is worth executing.
pub trait CommandHeuristic {
    fn looks_like_command(&self, text: &str) -> bool;
}

impl<F> CommandHeuristic for F
where
    F: Fn(&str) -> bool,
{
    fn looks_like_command(&self, text: &str) -> bool {
        self(text)
    }
}

/// The built-in command heuristic.
///
/// Checks run in a fixed order: empty, box drawing, bare `.`/`..`, comment,
/// leading long flag, bare `ls`/`cd`, then the first character of the first
/// token.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHeuristic;

impl CommandHeuristic for DefaultHeuristic {
    fn looks_like_command(&self, text: &str) -> bool {
        let stripped = text.trim();
        if stripped.is_empty() {
            return false;
        }
        if contains_box_char(stripped) {
            return false;
        }
        if stripped == "." || stripped == ".." {
            return false;
        }
        if stripped.starts_with('#') {
            return false;
        }

        let first_token = match stripped.split_whitespace().next() {
            Some(token) => token,
            None => return false,
        };
        if first_token.starts_with("--") {
            return false;
        }
        if (first_token == "ls" || first_token == "cd") && stripped == first_token {
            return true;
        }

        first_token
            .chars()
            .next()
            .map(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '$' | '-'))
            .unwrap_or(false)
    }
}

pub fn contains_box_char(text: &str) -> bool {
    text.contains(BOX_DRAWING_CHARS)
}

/// Content of a `- `, `* ` or `1. ` list item, trimmed.
fn bullet_content(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = match trimmed.strip_prefix(|c: char| c == '-' || c == '*') {
        Some(rest) => rest,
        None => {
            let digits = trimmed.len()
                - trimmed
                    .trim_start_matches(|c: char| c.is_ascii_digit())
                    .len();
            if digits == 0 {
                return None;
            }
            trimmed[digits..].strip_prefix('.')?
        }
    };

    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Non-empty single-backtick spans, left to right.
fn inline_code_spans(line: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut rest = line;

    while let Some(open) = rest.find('`') {
        let after = &rest[open + 1..];
        match after.find('`') {
            // "``" has no content; the second backtick may open a span
            Some(0) => rest = after,
            Some(close) => {
                spans.push(&after[..close]);
                rest = &after[close + 1..];
            }
            None => break,
        }
    }

    spans
}

/// Logical commands in a fenced block body.
///
/// Every line is its own command unless it ends in a backslash, in which case
/// it is joined with the next line by a single space. Blank lines end a
/// pending continuation; comment and box-drawing lines are dropped without
/// ending it.
fn split_fenced_commands(lines: &[&str]) -> Vec<String> {
    let mut commands = Vec::new();
    let mut current = String::new();

    for raw in lines {
        let line = raw.trim();
        if line.is_empty() {
            if !current.trim().is_empty() {
                commands.push(current.trim().to_string());
            }
            current.clear();
            continue;
        }
        if contains_box_char(line) || line.starts_with('#') {
            continue;
        }

        match line.strip_suffix('\\') {
            Some(head) => {
                current.push_str(head.trim_end());
                current.push(' ');
            }
            None => {
                current.push_str(line);
                commands.push(current.trim().to_string());
                current.clear();
            }
        }
    }

    if !current.trim().is_empty() {
        commands.push(current.trim().to_string());
    }

    commands
}

struct OpenFence<'a> {
    language: String,
    lines: Vec<&'a str>,
}

/// Extracts instructions from document text.
#[derive(Debug, Clone, Default)]
pub struct InstructionExtractor<H = DefaultHeuristic> {
    heuristic: H,
}

impl InstructionExtractor<DefaultHeuristic> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<H: CommandHeuristic> InstructionExtractor<H> {
    /// Extractor using a custom command predicate.
    pub fn with_heuristic(heuristic: H) -> Self {
        Self { heuristic }
    }

    fn accepts(&self, snippet: &str) -> bool {
        snippet.contains(char::is_whitespace) && self.heuristic.looks_like_command(snippet)
    }

    /// Extract instructions in source order. Pure and deterministic.
    pub fn extract(&self, text: &str) -> Vec<Instruction> {
        let mut instructions = Vec::new();
        let mut fence: Option<OpenFence<'_>> = None;
        let mut last_bullet: Option<String> = None;

        for line in text.lines() {
            let stripped = line.trim();

            if let Some(tag) = stripped.strip_prefix(FENCE) {
                match fence.take() {
                    None => {
                        fence = Some(OpenFence {
                            language: tag.trim().to_lowercase(),
                            lines: Vec::new(),
                        });
                    }
                    Some(block) => {
                        if SHELL_LANGUAGES.contains(&block.language.as_str()) {
                            self.push_fenced(
                                &mut instructions,
                                &block.lines,
                                last_bullet.as_deref(),
                            );
                        }
                    }
                }
                continue;
            }

            if let Some(block) = fence.as_mut() {
                block.lines.push(line.trim_end());
                continue;
            }

            if let Some(content) = bullet_content(line) {
                instructions.push(Instruction::prose(content));
                for snippet in inline_code_spans(content) {
                    let snippet = snippet.trim();
                    if self.accepts(snippet) {
                        let text = format!("{} :: {}", content, snippet);
                        instructions.push(Instruction::command(&text, snippet, Some(content)));
                    }
                }
                last_bullet = Some(content.to_string());
                continue;
            }

            for snippet in inline_code_spans(line) {
                let snippet = snippet.trim();
                if self.accepts(snippet) {
                    instructions.push(Instruction::command(
                        snippet,
                        snippet,
                        last_bullet.as_deref(),
                    ));
                }
            }
        }

        if let Some(block) = fence {
            debug!("Discarding unterminated code fence ({} lines)", block.lines.len());
        }

        instructions
    }

    fn push_fenced(
        &self,
        instructions: &mut Vec<Instruction>,
        lines: &[&str],
        context: Option<&str>,
    ) {
        for command in split_fenced_commands(lines) {
            if !self.heuristic.looks_like_command(&command) {
                continue;
            }
            let text = match context {
                Some(context) => format!("{} :: {}", context, command),
                None => command.clone(),
            };
            instructions.push(Instruction::command(&text, &command, context));
        }
    }

    /// Read and extract a document from disk.
    pub fn extract_file(&self, path: &Path) -> std::io::Result<Vec<Instruction>> {
        Ok(self.extract(&read_document(path)?))
    }
}

/// Read a document as UTF-8, falling back to Latin-1 when it does not decode.
pub fn read_document(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!("{} is not valid UTF-8, reading as Latin-1", path.display());
            decode_latin1(e.as_bytes())
        }
    })
}

/// Latin-1 maps every byte to the code point of the same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
