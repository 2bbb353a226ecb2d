use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::error::{PatchError, Result};

/// Reserved entry inside a diff archive holding the removal/move instructions.
pub const CONTROL_ENTRY: &str = "META-INF/INDEX.JD";

const VERSION_LINE: &str = "version 1.0";
const REMOVE_KEYWORD: &str = "remove";
const MOVE_KEYWORD: &str = "move";

/// A rename instruction: carry the base entry `from` into the output as `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveInstruction {
    pub from: String,
    pub to: String,
}

/// Parsed control record of a diff archive.
///
/// The on-disk form is UTF-8 text: a `version 1.0` header line followed by
/// `remove <path>` and `move <old> <new>` instructions, one per line. Literal
/// spaces inside move paths are escaped as `\ `; the old/new names are split
/// at the last unescaped whitespace. Blank lines and unknown keywords are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlRecord {
    pub removed: BTreeSet<String>,
    pub moved: Vec<MoveInstruction>,
}

impl ControlRecord {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.moved.is_empty()
    }

    /// Parse the text payload of a control-record entry.
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        match lines.next() {
            Some(first) if first.trim_end() == VERSION_LINE => {}
            Some(first) => {
                return Err(PatchError::MalformedControlRecord(format!(
                    "expected '{VERSION_LINE}' header, found '{}'",
                    first.trim_end()
                )));
            }
            None => {
                return Err(PatchError::MalformedControlRecord(
                    "control record is empty".to_string(),
                ));
            }
        }

        let mut record = ControlRecord::default();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (keyword, rest) = match line.split_once(char::is_whitespace) {
                Some((k, r)) => (k, r.trim()),
                None => (line, ""),
            };
            match keyword {
                REMOVE_KEYWORD => {
                    if rest.is_empty() {
                        return Err(PatchError::MalformedControlRecord(format!(
                            "remove instruction without a path: '{line}'"
                        )));
                    }
                    record.removed.insert(rest.to_string());
                }
                MOVE_KEYWORD => {
                    record.moved.push(parse_move(rest)?);
                }
                _ => {
                    log::warn!("Ignoring unknown control-record instruction '{line}'");
                }
            }
        }
        Ok(record)
    }

    /// Render the record back to its text form, header included.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(VERSION_LINE);
        out.push('\n');
        for path in &self.removed {
            let _ = writeln!(out, "{REMOVE_KEYWORD} {path}");
        }
        for mv in &self.moved {
            let _ = writeln!(
                out,
                "{MOVE_KEYWORD} {} {}",
                escape_spaces(&mv.from),
                escape_spaces(&mv.to)
            );
        }
        out
    }
}

/// Split a move definition at its last unescaped whitespace.
fn parse_move(rest: &str) -> Result<MoveInstruction> {
    let bytes = rest.as_bytes();
    let mut split = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_whitespace() && i > 0 && bytes[i - 1] != b'\\' {
            split = Some(i);
        }
    }
    let split = split.ok_or_else(|| {
        PatchError::MalformedControlRecord(format!("invalid move definition: '{rest}'"))
    })?;
    let from = unescape_spaces(&rest[..split]);
    let to = unescape_spaces(rest[split + 1..].trim());
    if from.is_empty() || to.is_empty() {
        return Err(PatchError::MalformedControlRecord(format!(
            "invalid move definition: '{rest}'"
        )));
    }
    Ok(MoveInstruction { from, to })
}

fn escape_spaces(path: &str) -> String {
    path.replace(' ', "\\ ")
}

fn unescape_spaces(path: &str) -> String {
    path.replace("\\ ", " ")
}
