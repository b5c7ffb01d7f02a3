//! Date-windowed test-issue classification.
//!
//! A rule file is read line by line:
//!
//! | Line | Meaning |
//! |------|---------|
//! | blank | ignored |
//! | `# ...` | comment, ignored |
//! | `@start=YYYY-MM-DD` / `@end=YYYY-MM-DD` | bound of the window for the next pattern |
//! | anything else | root symbol pattern (regular expression) |
//!
//! ```text
//! # NASDAQ test issues
//! ZXZZT
//! @start=2020-01-01
//! @end=2020-12-31
//! ZVZZT
//! ```
//!
//! Every pattern is anchored on both ends and extended with [`SUFFIX_GRAMMAR`],
//! so a root such as `ZVZZT` also matches `ZVZZTp`, `ZVZZT.WS` and friends.
//! A window applies to exactly one pattern and then resets to "always valid".

use std::fmt::{Display, Formatter};
use std::path::Path;

use regex::Regex;
use thiserror::Error;
use time::Date;

use crate::domain::{format_date, parse_date};

/// Optional share-class and corporate-action decorations appended to every root.
///
/// In order: class share (`.A`), preferred (`p`, `pA`), warrants (`.WS`, `.WS.A`),
/// units (`.U`), rights (`r`, `.RT`), when-issued (`w`, `.WI`).
pub const SUFFIX_GRAMMAR: &str = r"(?:\.[A-Z])?(?:p[A-Z]?)?(?:\.WS(?:\.[A-Z])?)?(?:\.U)?(?:r|\.RT)?(?:w|\.WI)?";

const COMMENT_MARKER: char = '#';
const DIRECTIVE_MARKER: char = '@';

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: directive must look like '@start=YYYY-MM-DD' or '@end=YYYY-MM-DD': '{text}'")]
    MalformedDirective { line: usize, text: String },

    #[error("line {line}: unknown directive key '{key}', expected 'start' or 'end'")]
    UnknownDirective { line: usize, key: String },

    #[error("line {line}: invalid date '{value}'")]
    InvalidDate { line: usize, value: String },

    #[error("line {line}: window start {start} is after end {end}")]
    InvertedWindow {
        line: usize,
        start: String,
        end: String,
    },

    #[error("line {line}: invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        line: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Inclusive span of days during which a rule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityWindow {
    pub start: Date,
    pub end: Date,
}

impl ValidityWindow {
    pub const ALWAYS: Self = Self {
        start: Date::MIN,
        end: Date::MAX,
    };

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

impl Default for ValidityWindow {
    fn default() -> Self {
        Self::ALWAYS
    }
}

impl Display for ValidityWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let start = if self.start == Date::MIN {
            String::from("*")
        } else {
            format_date(self.start)
        };
        let end = if self.end == Date::MAX {
            String::from("*")
        } else {
            format_date(self.end)
        };
        write!(f, "[{start}, {end}]")
    }
}

/// A compiled pattern and the window it is valid for.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pattern: String,
    regex: Regex,
    window: ValidityWindow,
    line: usize,
}

impl ClassificationRule {
    fn compile(pattern: &str, window: ValidityWindow, line: usize) -> Result<Self, RuleError> {
        let regex = Regex::new(&format!("^(?:{pattern})(?:{SUFFIX_GRAMMAR})$")).map_err(
            |source| RuleError::InvalidPattern {
                line,
                pattern: pattern.to_owned(),
                source,
            },
        )?;
        Ok(Self {
            pattern: pattern.to_owned(),
            regex,
            window,
            line,
        })
    }

    /// The root pattern as written in the rule file.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub const fn window(&self) -> ValidityWindow {
        self.window
    }

    /// 1-based line of the pattern in its source.
    pub const fn line(&self) -> usize {
        self.line
    }

    pub fn applies(&self, symbol: &str, as_of: Date) -> bool {
        self.window.contains(as_of) && self.regex.is_match(symbol)
    }
}

/// Bounds collected from directives, waiting for the next pattern line.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PendingWindow {
    start: Option<Date>,
    end: Option<Date>,
}

impl PendingWindow {
    /// Resolves the key before the date, so an unknown key wins over a bad value.
    fn set(&mut self, key: &str, value: &str, line: usize) -> Result<(), RuleError> {
        let slot = match key {
            "start" => &mut self.start,
            "end" => &mut self.end,
            other => {
                return Err(RuleError::UnknownDirective {
                    line,
                    key: other.to_owned(),
                })
            }
        };
        let date = parse_date(value).map_err(|_| RuleError::InvalidDate {
            line,
            value: value.to_owned(),
        })?;
        *slot = Some(date);
        Ok(())
    }

    /// Resolves the window and resets to "always valid".
    fn take(&mut self, line: usize) -> Result<ValidityWindow, RuleError> {
        let pending = std::mem::take(self);
        let window = ValidityWindow {
            start: pending.start.unwrap_or(Date::MIN),
            end: pending.end.unwrap_or(Date::MAX),
        };
        if window.start > window.end {
            return Err(RuleError::InvertedWindow {
                line,
                start: format_date(window.start),
                end: format_date(window.end),
            });
        }
        Ok(window)
    }
}

enum Line<'a> {
    Blank,
    Comment,
    Directive { key: &'a str, value: &'a str },
    Pattern(&'a str),
}

fn classify_line(raw: &str, line: usize) -> Result<Line<'_>, RuleError> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(Line::Blank);
    }
    if text.starts_with(COMMENT_MARKER) {
        return Ok(Line::Comment);
    }
    if let Some(directive) = text.strip_prefix(DIRECTIVE_MARKER) {
        let (key, value) =
            directive
                .split_once('=')
                .ok_or_else(|| RuleError::MalformedDirective {
                    line,
                    text: text.to_owned(),
                })?;
        return Ok(Line::Directive {
            key: key.trim(),
            value: value.trim(),
        });
    }
    Ok(Line::Pattern(text))
}

/// Ordered, read-only list of classification rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ClassificationRule>,
}

impl RuleSet {
    /// Parses rule text. Any malformed line fails the whole load.
    pub fn parse(source: &str) -> Result<Self, RuleError> {
        let mut rules = Vec::new();
        let mut pending = PendingWindow::default();

        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            match classify_line(raw, line)? {
                Line::Blank | Line::Comment => {}
                Line::Directive { key, value } => pending.set(key, value, line)?,
                Line::Pattern(pattern) => {
                    let window = pending.take(line)?;
                    rules.push(ClassificationRule::compile(pattern, window, line)?);
                }
            }
        }

        Ok(Self { rules })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&source)
    }

    /// First rule, in file order, whose window contains `as_of` and whose
    /// pattern fully matches `symbol`.
    pub fn matching_rule(&self, symbol: &str, as_of: Date) -> Option<&ClassificationRule> {
        self.rules.iter().find(|rule| rule.applies(symbol, as_of))
    }

    pub fn is_excluded(&self, symbol: &str, as_of: Date) -> bool {
        self.matching_rule(symbol, as_of).is_some()
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn window_applies_to_next_pattern_only() {
        let rules = RuleSet::parse("@start=2020-01-01\n@end=2020-12-31\nAAA\nBBB\n")
            .expect("rules should parse");

        assert_eq!(rules.len(), 2);
        assert_eq!(
            rules.rules()[0].window(),
            ValidityWindow {
                start: date!(2020 - 01 - 01),
                end: date!(2020 - 12 - 31),
            }
        );
        assert_eq!(rules.rules()[1].window(), ValidityWindow::ALWAYS);
    }

    #[test]
    fn comments_do_not_touch_pending_window() {
        let rules = RuleSet::parse("@end=2010-01-01\n# keeps window\n\nAAA\n")
            .expect("rules should parse");

        assert_eq!(rules.rules()[0].window().end, date!(2010 - 01 - 01));
        assert_eq!(rules.rules()[0].window().start, Date::MIN);
        assert_eq!(rules.rules()[0].line(), 4);
    }

    #[test]
    fn trailing_directive_without_pattern_is_ignored() {
        let rules = RuleSet::parse("AAA\n@start=2020-01-01\n").expect("rules should parse");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.rules()[0].window(), ValidityWindow::ALWAYS);
    }

    #[test]
    fn suffix_grammar_extends_roots() {
        let rules = RuleSet::parse("ABC\n").expect("rules should parse");
        let day = date!(2021 - 06 - 01);

        for symbol in ["ABC", "ABCp", "ABCpA", "ABC.A", "ABC.WS", "ABC.WS.A", "ABC.U", "ABCr", "ABCw"] {
            assert!(rules.is_excluded(symbol, day), "{symbol} should match");
        }
        for symbol in ["ABCD", "XABC", "abc", "ABC.", "ABCpa", "AB"] {
            assert!(!rules.is_excluded(symbol, day), "{symbol} should not match");
        }
    }

    #[test]
    fn malformed_lines_fail_with_line_numbers() {
        let err = RuleSet::parse("AAA\n@start=2020-13-01\n").expect_err("bad date");
        assert!(matches!(err, RuleError::InvalidDate { line: 2, .. }));

        let err = RuleSet::parse("@begin=2020-01-01\nAAA\n").expect_err("bad key");
        assert!(matches!(err, RuleError::UnknownDirective { line: 1, .. }));

        let err = RuleSet::parse("@begin=soon\nAAA\n").expect_err("bad key and value");
        assert!(matches!(err, RuleError::UnknownDirective { line: 1, .. }));

        let err = RuleSet::parse("@start\nAAA\n").expect_err("missing value");
        assert!(matches!(err, RuleError::MalformedDirective { line: 1, .. }));

        let err = RuleSet::parse("\n\nAB(C\n").expect_err("bad regex");
        assert!(matches!(err, RuleError::InvalidPattern { line: 3, .. }));

        let err = RuleSet::parse("@start=2021-01-01\n@end=2020-01-01\nAAA\n")
            .expect_err("inverted window");
        assert!(matches!(err, RuleError::InvertedWindow { line: 3, .. }));
    }

    #[test]
    fn window_display_uses_wildcards_for_open_bounds() {
        let window = ValidityWindow {
            start: date!(2020 - 01 - 01),
            end: Date::MAX,
        };
        assert_eq!(window.to_string(), "[2020-01-01, *]");
    }
}
