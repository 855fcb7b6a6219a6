/// Poem rule table — line templates with typed slots, plus the word banks that fill them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::core::composer::PoemError;

/// The five sensory categories a poem draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sense {
    Sound,
    Smell,
    Touch,
    Taste,
    Sight,
}

impl Sense {
    pub const ALL: [Sense; 5] = [
        Sense::Sound,
        Sense::Smell,
        Sense::Touch,
        Sense::Taste,
        Sense::Sight,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sound => "sound",
            Self::Smell => "smell",
            Self::Touch => "touch",
            Self::Taste => "taste",
            Self::Sight => "sight",
        }
    }

    pub fn from_name(name: &str) -> Option<Sense> {
        Self::ALL.iter().copied().find(|s| s.name() == name)
    }
}

impl fmt::Display for Sense {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What kind of text fills an open slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotKind {
    /// One of the session's prompts, verbatim: `{prompt}`.
    Prompt,
    /// A sensory phrase: `{sense}` (line's sense) or `{sense:smell}`.
    Sensory(Option<Sense>),
    /// A filler phrase: `{filler}`.
    Filler,
    /// An interrogative tail ending in `?`: `{question}`.
    Question,
}

/// A segment of a parsed line template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Segment {
    Literal(String),
    Slot(SlotKind),
}

/// A parsed line template — a sequence of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTemplate {
    pub segments: Vec<Segment>,
}

impl LineTemplate {
    /// Parse a template string.
    ///
    /// Syntax:
    /// - `{prompt}`, `{filler}`, `{question}` → the matching slot
    /// - `{sense}` / `{sense:<name>}` → sensory slot
    /// - `{{` / `}}` → literal braces
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<LineTemplate, PoemError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '{' if i + 1 < len && chars[i + 1] == '{' => {
                    literal_buf.push('{');
                    i += 2;
                }
                '{' => {
                    if !literal_buf.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal_buf)));
                    }
                    let start = i + 1;
                    let mut end = start;
                    while end < len && chars[end] != '}' {
                        if chars[end] == '{' {
                            return Err(PoemError::Template(format!(
                                "nested braces in '{input}'"
                            )));
                        }
                        end += 1;
                    }
                    if end == len {
                        return Err(PoemError::Template(format!("unclosed brace in '{input}'")));
                    }
                    let content: String = chars[start..end].iter().collect();
                    segments.push(Segment::Slot(Self::parse_slot(&content)?));
                    i = end + 1;
                }
                '}' if i + 1 < len && chars[i + 1] == '}' => {
                    literal_buf.push('}');
                    i += 2;
                }
                '}' => {
                    return Err(PoemError::Template(format!(
                        "unmatched closing brace in '{input}'"
                    )));
                }
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        if !literal_buf.is_empty() {
            segments.push(Segment::Literal(literal_buf));
        }
        if segments.is_empty() {
            return Err(PoemError::Template("empty template".to_string()));
        }

        Ok(LineTemplate { segments })
    }

    fn parse_slot(content: &str) -> Result<SlotKind, PoemError> {
        match content {
            "prompt" => return Ok(SlotKind::Prompt),
            "filler" => return Ok(SlotKind::Filler),
            "question" => return Ok(SlotKind::Question),
            "sense" => return Ok(SlotKind::Sensory(None)),
            _ => {}
        }
        if let Some(name) = content.strip_prefix("sense:") {
            return Sense::from_name(name)
                .map(|s| SlotKind::Sensory(Some(s)))
                .ok_or_else(|| PoemError::Template(format!("unknown sense '{name}'")));
        }
        Err(PoemError::Template(format!("unknown slot '{{{content}}}'")))
    }

    pub fn slots(&self) -> impl Iterator<Item = SlotKind> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Slot(kind) => Some(*kind),
            Segment::Literal(_) => None,
        })
    }

    pub fn count_slots(&self, wanted: SlotKind) -> usize {
        self.slots().filter(|k| *k == wanted).count()
    }

    pub fn has_sensory_slot(&self) -> bool {
        self.slots().any(|k| matches!(k, SlotKind::Sensory(_)))
    }

    /// True when every sensory slot can take `sense`.
    pub fn accepts_sense(&self, sense: Sense) -> bool {
        self.slots().all(|k| match k {
            SlotKind::Sensory(Some(bound)) => bound == sense,
            _ => true,
        })
    }

    fn literal_text(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Literal(text) => Some(text.as_str()),
            Segment::Slot(_) => None,
        })
    }

    fn ends_with_question_slot(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Slot(SlotKind::Question)))
    }
}

/// Sensory phrase banks, one per category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SenseBanks {
    #[serde(default)]
    pub sound: Vec<String>,
    #[serde(default)]
    pub smell: Vec<String>,
    #[serde(default)]
    pub touch: Vec<String>,
    #[serde(default)]
    pub taste: Vec<String>,
    #[serde(default)]
    pub sight: Vec<String>,
}

impl SenseBanks {
    pub fn bank(&self, sense: Sense) -> &[String] {
        match sense {
            Sense::Sound => &self.sound,
            Sense::Smell => &self.smell,
            Sense::Touch => &self.touch,
            Sense::Taste => &self.taste,
            Sense::Sight => &self.sight,
        }
    }
}

/// Line templates grouped by the role a line plays in the poem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateGroups {
    pub title: Vec<LineTemplate>,
    pub prompt: Vec<LineTemplate>,
    pub sensory: Vec<LineTemplate>,
    pub filler: Vec<LineTemplate>,
    pub question: Vec<LineTemplate>,
}

/// The declarative rule table driving the composer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleTable {
    pub templates: TemplateGroups,
    pub senses: SenseBanks,
    pub fillers: Vec<String>,
    pub questions: Vec<String>,
}

// The RON file stores templates as plain strings.

#[derive(Debug, Deserialize)]
struct RonTemplates {
    title: Vec<String>,
    prompt: Vec<String>,
    sensory: Vec<String>,
    filler: Vec<String>,
    question: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Rules")]
struct RonRules {
    templates: RonTemplates,
    senses: SenseBanks,
    fillers: Vec<String>,
    questions: Vec<String>,
}

fn parse_all(sources: Vec<String>) -> Result<Vec<LineTemplate>, PoemError> {
    sources.iter().map(|s| LineTemplate::parse(s)).collect()
}

impl RuleTable {
    /// Load a rule table from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<RuleTable, PoemError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a rule table from a RON string. Does not lint.
    pub fn parse_ron(input: &str) -> Result<RuleTable, PoemError> {
        let raw: RonRules = ron::from_str(input)?;
        Ok(RuleTable {
            templates: TemplateGroups {
                title: parse_all(raw.templates.title)?,
                prompt: parse_all(raw.templates.prompt)?,
                sensory: parse_all(raw.templates.sensory)?,
                filler: parse_all(raw.templates.filler)?,
                question: parse_all(raw.templates.question)?,
            },
            senses: raw.senses,
            fillers: raw.fillers,
            questions: raw.questions,
        })
    }

    /// The sense whose bank contains `phrase`, if any.
    pub fn sense_of(&self, phrase: &str) -> Option<Sense> {
        Sense::ALL
            .iter()
            .copied()
            .find(|s| self.senses.bank(*s).iter().any(|p| p == phrase))
    }

    /// Check the table can always produce a conforming poem. Returns every
    /// problem found; an empty list means the table is usable.
    pub fn lint(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let groups = &self.templates;

        for (name, group) in [
            ("title", &groups.title),
            ("prompt", &groups.prompt),
            ("sensory", &groups.sensory),
            ("filler", &groups.filler),
            ("question", &groups.question),
        ] {
            if group.is_empty() {
                problems.push(format!("no {name} templates"));
            }
            for template in group {
                if template.literal_text().any(|t| t.contains('?')) {
                    problems.push(format!("{name} template {:?} has a literal '?'", template.segments));
                }
                if name != "question" && template.count_slots(SlotKind::Question) > 0 {
                    problems.push(format!("{name} template {:?} has a question slot", template.segments));
                }
                if name != "prompt" && template.count_slots(SlotKind::Prompt) > 0 {
                    problems.push(format!("{name} template {:?} has a prompt slot", template.segments));
                }
            }
        }
        for template in &groups.prompt {
            if template.count_slots(SlotKind::Prompt) != 1 {
                problems.push(format!(
                    "prompt template {:?} must have exactly one prompt slot",
                    template.segments
                ));
            }
        }
        for template in &groups.question {
            if template.count_slots(SlotKind::Question) != 1 || !template.ends_with_question_slot() {
                problems.push(format!(
                    "question template {:?} must end with its only question slot",
                    template.segments
                ));
            }
        }
        for template in &groups.sensory {
            if !template.has_sensory_slot() {
                problems.push(format!(
                    "sensory template {:?} has no sense slot",
                    template.segments
                ));
            }
        }
        for sense in Sense::ALL {
            if !groups.sensory.iter().any(|t| t.accepts_sense(sense)) {
                problems.push(format!("no sensory template can carry {sense}"));
            }
        }

        for sense in Sense::ALL {
            let bank = self.senses.bank(sense);
            if bank.is_empty() {
                problems.push(format!("{sense} bank is empty"));
            }
            for phrase in bank {
                check_phrase(&mut problems, sense.name(), phrase);
                for other in Sense::ALL.iter().filter(|o| **o > sense) {
                    if self.senses.bank(*other).contains(phrase) {
                        problems.push(format!("'{phrase}' is in both {sense} and {other} banks"));
                    }
                }
            }
        }
        if self.fillers.is_empty() {
            problems.push("filler bank is empty".to_string());
        }
        for phrase in &self.fillers {
            check_phrase(&mut problems, "filler", phrase);
        }
        if self.questions.is_empty() {
            problems.push("question bank is empty".to_string());
        }
        for tail in &self.questions {
            if tail.matches('?').count() != 1 || !tail.trim_end().ends_with('?') {
                problems.push(format!("question '{tail}' must end with its only '?'"));
            }
            if tail.contains('\n') {
                problems.push(format!("question '{tail}' spans lines"));
            }
        }

        problems
    }
}

fn check_phrase(problems: &mut Vec<String>, bank: &str, phrase: &str) {
    if phrase.trim().is_empty() {
        problems.push(format!("{bank} bank has an empty phrase"));
    }
    if phrase.contains('?') {
        problems.push(format!("{bank} phrase '{phrase}' contains '?'"));
    }
    if phrase.contains('\n') {
        problems.push(format!("{bank} phrase '{phrase}' spans lines"));
    }
}
