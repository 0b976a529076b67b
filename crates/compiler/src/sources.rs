//! Multi-file source bundle and diagnostic formatting.
//!
//! The parser sees all input files as one concatenated document with flat
//! line numbers. The bundle keeps an ordered list of (file, flat range)
//! segments so diagnostics can be mapped back to their file, and renders
//! caret-pointed messages from the original (uncleaned) source lines.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static LINE_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"//.*").unwrap());
static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/\*(?s:.)*?\*/").unwrap());

#[derive(Debug)]
struct SourceFile {
    name: String,
    lines: Vec<String>,
}

/// Flat segment: file index plus half-open flat line index range (0-based).
#[derive(Debug)]
struct Segment {
    file: usize,
    start: usize,
    end: usize,
}

#[derive(Debug)]
pub struct SourceBundle {
    files: Vec<SourceFile>,
    segments: Vec<Segment>,
    total_lines: usize,
    /// (file, function) of the most recent message, for the one-per-run
    /// `In function "..."` preamble
    last_context: Option<(String, String)>,
}

impl Default for SourceBundle {
    fn default() -> Self {
        SourceBundle {
            files: Vec::new(),
            segments: Vec::new(),
            total_lines: 0,
            last_context: None,
        }
    }
}

impl SourceBundle {
    pub fn new() -> Self {
        SourceBundle::default()
    }

    /// Append a source file read from disk.
    pub fn add_file(&mut self, path: &Path) -> Result<(), String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        self.add_source(&path.display().to_string(), &text);
        Ok(())
    }

    /// Append a source unit that is already in memory (the embedded header).
    pub fn add_source(&mut self, name: &str, text: &str) {
        let mut lines: Vec<String> = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        // a trailing newline does not start another source line
        if text.ends_with('\n') {
            lines.pop();
        }
        let start = self.total_lines;
        self.total_lines += lines.len();
        self.segments.push(Segment {
            file: self.files.len(),
            start,
            end: self.total_lines,
        });
        self.files.push(SourceFile {
            name: name.to_string(),
            lines,
        });
    }

    /// The concatenated text handed to the parser, with line and block
    /// comments stripped while preserving the line count.
    pub fn combined(&self) -> String {
        let mut text = String::new();
        for file in &self.files {
            for line in &file.lines {
                text.push_str(line);
                text.push('\n');
            }
        }
        let text = LINE_COMMENT.replace_all(&text, "");
        let text = BLOCK_COMMENT.replace_all(&text, |caps: &regex::Captures<'_>| {
            caps[0].chars().filter(|c| *c == '\n').collect::<String>()
        });
        text.into_owned()
    }

    /// Map a flat 1-based line number back to (file name, file-local line).
    /// Returns `None` for the file when the line is out of range.
    pub fn map_coord(&self, flat_line: usize) -> (Option<&str>, usize) {
        let flat_idx = flat_line.wrapping_sub(1);
        for segment in &self.segments {
            if flat_idx >= segment.start && flat_idx < segment.end {
                let row = flat_line - segment.start;
                return (Some(&self.files[segment.file].name), row);
            }
        }
        (None, flat_line)
    }

    /// Format a source-located diagnostic with the offending line and a
    /// caret, prefixed by a function-context preamble when the (file,
    /// function) context changed since the previous message.
    pub fn format_message(
        &mut self,
        flat_line: usize,
        column: usize,
        message: &str,
        ctx_func: Option<&str>,
    ) -> String {
        let (file, row) = self.map_coord(flat_line);
        let Some(file) = file else {
            return format!(":{}:{}: {}", flat_line, column, message);
        };
        let file = file.to_string();
        let mut out = String::new();
        if let Some(func) = ctx_func {
            let context = (file.clone(), func.to_string());
            if self.last_context.as_ref() != Some(&context) {
                self.last_context = Some(context);
                out.push_str(&format!("{}: In function \"{}\":\n", file, func));
            }
        }
        let src_line = self
            .files
            .iter()
            .find(|f| f.name == file)
            .and_then(|f| f.lines.get(row - 1))
            .cloned()
            .unwrap_or_default();
        let pointer_indent: String = src_line
            .chars()
            .take(column.saturating_sub(1))
            .map(|c| if c == '\t' { '\t' } else { ' ' })
            .collect();
        out.push_str(&format!(
            "{}:{}:{}: {}\n{}\n{}^^^",
            file, row, column, message, src_line, pointer_indent
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_map_coord_across_files() {
        let mut bundle = SourceBundle::new();
        bundle.add_source("a.c", "line1\nline2\n");
        bundle.add_source("b.c", "line3\n");
        assert_eq!(bundle.map_coord(1), (Some("a.c"), 1));
        assert_eq!(bundle.map_coord(2), (Some("a.c"), 2));
        assert_eq!(bundle.map_coord(3), (Some("b.c"), 1));
        assert_eq!(bundle.map_coord(4), (None, 4));
    }

    #[test]
    fn test_combined_strips_comments_preserving_lines() {
        let mut bundle = SourceBundle::new();
        bundle.add_source("a.c", "int a; // trailing\n/* one\ntwo */ int b;\n");
        let text = bundle.combined();
        assert_eq!(text, "int a; \n\n int b;\n");
    }

    #[test]
    fn test_format_message_with_caret() {
        let mut bundle = SourceBundle::new();
        bundle.add_source("a.c", "int a;\nint @;\n");
        let msg = bundle.format_message(2, 5, "error: unexpected character '@'", None);
        assert_eq!(msg, "a.c:2:5: error: unexpected character '@'\nint @;\n    ^^^");
    }

    #[test]
    fn test_format_message_function_preamble_once_per_run() {
        let mut bundle = SourceBundle::new();
        bundle.add_source("a.c", "int a;\nint b;\n");
        let first = bundle.format_message(1, 1, "warning: w1", Some("main"));
        let second = bundle.format_message(2, 1, "warning: w2", Some("main"));
        assert!(first.starts_with("a.c: In function \"main\":\n"));
        assert!(!second.contains("In function"));
    }

    #[test]
    fn test_add_file_reads_from_disk() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "int x;").unwrap();
        let mut bundle = SourceBundle::new();
        bundle.add_file(tmp.path()).unwrap();
        assert_eq!(bundle.combined(), "int x;\n");
    }

    #[test]
    fn test_add_file_missing_is_an_error() {
        let mut bundle = SourceBundle::new();
        let err = bundle.add_file(Path::new("/no/such/file.c")).unwrap_err();
        assert!(err.contains("/no/such/file.c"));
    }
}
