//! Front-end diagnostics: the `MessageList` sink every fallible pass writes
//! to instead of throwing. A compilation aborts on the first
//! `Error`; `Note`s are attached to point back at a prior definition.

use std::fmt;
use std::rc::Rc;

/// A position in a source file. Immutable once produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub path: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(path: Rc<str>, line: u32, column: u32) -> Self {
        Self { path, line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.line, self.column)
    }
}

/// Severity of a [`Message`]. Only `Error` aborts the pass that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Note => "note",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// The offending source embedded in a message: either one line with a caret
/// under the offending column, or a span of several lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSnapshot {
    Line { text: String, caret_column: u32 },
    MultiLine { lines: Vec<String>, start_line: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub level: Level,
    pub location: Location,
    pub text: String,
    pub source: Option<SourceSnapshot>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}: {}", self.location, self.level, self.text)?;
        match &self.source {
            Some(SourceSnapshot::Line { text, caret_column }) => {
                writeln!(f, "  {text}")?;
                writeln!(f, "  {}^", " ".repeat((*caret_column as usize).saturating_sub(1)))
            }
            Some(SourceSnapshot::MultiLine { lines, start_line }) => {
                for (i, line) in lines.iter().enumerate() {
                    writeln!(f, "  {:>4} | {line}", *start_line + i as u32)?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}

/// Sink every parse/semantic pass writes diagnostics to. Failures *must*
/// have added at least one `Error`-level message before returning `false`.
#[derive(Debug, Default)]
pub struct MessageList {
    messages: Vec<Message>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, level: Level, location: Location, text: impl Into<String>) {
        self.messages.push(Message {
            level,
            location,
            text: text.into(),
            source: None,
        });
    }

    pub fn note(&mut self, location: Location, text: impl Into<String>) {
        self.push(Level::Note, location, text);
    }

    pub fn warning(&mut self, location: Location, text: impl Into<String>) {
        self.push(Level::Warning, location, text);
    }

    pub fn error(&mut self, location: Location, text: impl Into<String>) {
        self.push(Level::Error, location, text);
    }

    pub fn error_with_source(
        &mut self,
        location: Location,
        text: impl Into<String>,
        line_text: impl Into<String>,
    ) {
        let caret_column = location.column;
        self.messages.push(Message {
            level: Level::Error,
            location,
            text: text.into(),
            source: Some(SourceSnapshot::Line { text: line_text.into(), caret_column }),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.level == Level::Error)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.level == Level::Error)
    }
}

impl fmt::Display for MessageList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.messages {
            write!(f, "{m}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::new(Rc::from("test.tl"), 1, 1)
    }

    #[test]
    fn has_errors_is_false_until_an_error_level_message_is_pushed() {
        let mut messages = MessageList::new();
        assert!(!messages.has_errors());
        messages.note(loc(), "just a note");
        assert!(!messages.has_errors());
        messages.error(loc(), "boom");
        assert!(messages.has_errors());
    }

    #[test]
    fn display_renders_a_caret_under_the_offending_column() {
        let mut messages = MessageList::new();
        messages.error_with_source(Location::new(Rc::from("a.tl"), 2, 5), "bad token", "let x = @");
        let rendered = messages.to_string();
        assert!(rendered.contains("a.tl:2:5"));
        assert!(rendered.contains("let x = @"));
    }
}
