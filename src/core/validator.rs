/// Constraint validation — an independent pass over a finished line sequence.

use rustc_hash::FxHashSet;
use std::fmt;

use crate::core::rules::{RuleTable, Sense};
use crate::schema::prompt::Prompt;

/// One broken constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    LineCount { count: usize, min: usize, max: usize },
    PromptMissing { text: String },
    PromptRepeated { text: String, count: usize },
    PromptInTitle { text: String },
    SensoryCoverage { found: Vec<Sense>, required: usize },
    QuestionCount { count: usize },
    QuestionNotAtLineEnd { line: usize },
    DuplicateLine { line: usize, text: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineCount { count, min, max } => {
                write!(f, "{count} lines, expected {min}..={max}")
            }
            Self::PromptMissing { text } => write!(f, "prompt '{text}' is missing"),
            Self::PromptRepeated { text, count } => {
                write!(f, "prompt '{text}' appears {count} times")
            }
            Self::PromptInTitle { text } => write!(f, "title contains prompt '{text}'"),
            Self::SensoryCoverage { found, required } => write!(
                f,
                "{} sensory categories present, need {required}",
                found.len()
            ),
            Self::QuestionCount { count } => write!(f, "{count} question marks, expected 1"),
            Self::QuestionNotAtLineEnd { line } => {
                write!(f, "line {line} has a '?' that does not end the line")
            }
            Self::DuplicateLine { line, text } => write!(f, "line {line} repeats '{text}'"),
        }
    }
}

/// Checks a line sequence (title first) against the poem constraint set.
pub struct PoemValidator<'a> {
    rules: &'a RuleTable,
    min_lines: usize,
    max_lines: usize,
    min_senses: usize,
}

impl<'a> PoemValidator<'a> {
    pub fn new(rules: &'a RuleTable, min_lines: usize, max_lines: usize, min_senses: usize) -> Self {
        Self {
            rules,
            min_lines,
            max_lines,
            min_senses,
        }
    }

    /// Every violated constraint; empty when the poem conforms.
    pub fn check(&self, lines: &[String], prompts: &[Prompt]) -> Vec<Violation> {
        let mut violations = Vec::new();

        if !(self.min_lines..=self.max_lines).contains(&lines.len()) {
            violations.push(Violation::LineCount {
                count: lines.len(),
                min: self.min_lines,
                max: self.max_lines,
            });
        }

        for prompt in prompts {
            let count: usize = lines.iter().map(|l| l.matches(prompt.text.as_str()).count()).sum();
            match count {
                0 => violations.push(Violation::PromptMissing {
                    text: prompt.text.clone(),
                }),
                1 => {}
                n => violations.push(Violation::PromptRepeated {
                    text: prompt.text.clone(),
                    count: n,
                }),
            }
            if lines.first().is_some_and(|title| title.contains(prompt.text.as_str())) {
                violations.push(Violation::PromptInTitle {
                    text: prompt.text.clone(),
                });
            }
        }

        let found = self.senses_present(lines);
        if found.len() < self.min_senses {
            violations.push(Violation::SensoryCoverage {
                found,
                required: self.min_senses,
            });
        }

        let count: usize = lines.iter().map(|l| l.matches('?').count()).sum();
        if count != 1 {
            violations.push(Violation::QuestionCount { count });
        }
        for (i, line) in lines.iter().enumerate() {
            if line.contains('?') && !line.trim_end().ends_with('?') {
                violations.push(Violation::QuestionNotAtLineEnd { line: i });
            }
        }

        let mut seen = FxHashSet::default();
        for (i, line) in lines.iter().enumerate() {
            if !seen.insert(line.trim()) {
                violations.push(Violation::DuplicateLine {
                    line: i,
                    text: line.trim().to_string(),
                });
            }
        }

        violations
    }

    /// Sensory categories with at least one bank phrase somewhere in `lines`.
    pub fn senses_present(&self, lines: &[String]) -> Vec<Sense> {
        let lowered: Vec<String> = lines.iter().map(|l| l.to_lowercase()).collect();
        Sense::ALL
            .iter()
            .copied()
            .filter(|sense| {
                self.rules.senses.bank(*sense).iter().any(|phrase| {
                    let phrase = phrase.to_lowercase();
                    lowered.iter().any(|line| contains_phrase(line, &phrase))
                })
            })
            .collect()
    }
}

/// Whole-word substring search: `needle` must not be glued to letters or
/// digits on either side.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Lowercase alphabetic words of a line.
pub fn words(line: &str) -> FxHashSet<String> {
    line.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}
