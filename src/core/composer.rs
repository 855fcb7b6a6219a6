/// Poem composer — seeded template-and-slot composition with validate-and-retry.
///
/// Each attempt plans the poem's shape (length, prompt lines, the question
/// line, which lines carry which sense), fills every template slot from the
/// rule table's banks, then hands the finished lines to the validator. A
/// failed attempt re-seeds with a prime offset and starts over.

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::rules::{LineTemplate, RuleTable, Segment, Sense, SlotKind};
use crate::core::validator::{words, PoemValidator};
use crate::schema::poem::Poem;
use crate::schema::prompt::Prompt;

#[derive(Debug, Error)]
pub enum PoemError {
    #[error("invalid prompts: {0}")]
    InvalidPrompts(String),
    #[error("no conforming poem after {attempts} attempts")]
    CompositionInfeasible { attempts: u32 },
    #[error("rule table unusable: {0}")]
    Rules(String),
    #[error("template parse error: {0}")]
    Template(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Number of prompts every poem weaves in.
pub const PROMPTS_PER_POEM: usize = 4;

/// Bounds every poem must honour. Configuration may narrow them, never widen.
pub const MIN_POEM_LINES: usize = 15;
pub const MAX_POEM_LINES: usize = 19;
pub const MIN_SENSES: usize = 3;

/// Unused bank entries considered when picking a phrase; the one sharing the
/// fewest words with the previous line wins.
const PHRASE_CANDIDATES: usize = 4;

/// Redraws of the prompt line positions looking for a non-adjacent spread.
const SPREAD_TRIES: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposerConfig {
    /// Inclusive bounds on line count, title included.
    #[serde(default = "default_min_lines")]
    pub min_lines: usize,
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Distinct sensory categories every poem must touch.
    #[serde(default = "default_min_senses")]
    pub min_senses: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_min_lines() -> usize {
    MIN_POEM_LINES
}

fn default_max_lines() -> usize {
    MAX_POEM_LINES
}

fn default_min_senses() -> usize {
    MIN_SENSES
}

fn default_max_attempts() -> u32 {
    32
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            min_lines: default_min_lines(),
            max_lines: default_max_lines(),
            min_senses: default_min_senses(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// The role a line plays in the planned poem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineRole {
    Title,
    Prompt(usize),
    Question,
    Sensory(Sense),
    Free,
}

/// Composes poems from a linted rule table.
#[derive(Debug, Clone)]
pub struct PoemComposer {
    rules: RuleTable,
    config: ComposerConfig,
}

impl PoemComposer {
    /// Lint the rule table and check the config leaves room for every
    /// required line.
    pub fn new(rules: RuleTable, config: ComposerConfig) -> Result<Self, PoemError> {
        let problems = rules.lint();
        if !problems.is_empty() {
            return Err(PoemError::Rules(problems.join("; ")));
        }
        if config.min_lines < MIN_POEM_LINES || config.max_lines > MAX_POEM_LINES {
            return Err(PoemError::Rules(format!(
                "line range {}..={} must lie within {MIN_POEM_LINES}..={MAX_POEM_LINES}",
                config.min_lines, config.max_lines
            )));
        }
        if config.min_senses < MIN_SENSES {
            return Err(PoemError::Rules(format!(
                "at least {MIN_SENSES} sensory categories are required, got {}",
                config.min_senses
            )));
        }
        if config.min_lines > config.max_lines {
            return Err(PoemError::Rules(format!(
                "line range {}..={} is empty",
                config.min_lines, config.max_lines
            )));
        }
        if config.min_senses > Sense::ALL.len() {
            return Err(PoemError::Rules(format!(
                "{} sensory categories requested, only {} exist",
                config.min_senses,
                Sense::ALL.len()
            )));
        }
        // title + prompts + question + one line per required sense
        let floor = 1 + PROMPTS_PER_POEM + 1 + config.min_senses;
        if config.min_lines < floor {
            return Err(PoemError::Rules(format!(
                "at least {floor} lines are needed, min_lines is {}",
                config.min_lines
            )));
        }
        if config.max_attempts == 0 {
            return Err(PoemError::Rules("max_attempts must be at least 1".to_string()));
        }
        Ok(Self { rules, config })
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    pub fn validator(&self) -> PoemValidator<'_> {
        PoemValidator::new(
            &self.rules,
            self.config.min_lines,
            self.config.max_lines,
            self.config.min_senses,
        )
    }

    /// Compose a poem weaving in exactly four distinct prompts.
    ///
    /// The same prompts and seed always yield the same poem.
    pub fn compose(&self, prompts: &[Prompt], seed: u64) -> Result<Poem, PoemError> {
        check_prompts(prompts)?;
        let validator = self.validator();

        for attempt in 0..self.config.max_attempts {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(attempt as u64 * 7919));
            let lines = self.draft(prompts, &mut rng);
            let violations = validator.check(&lines, prompts);
            if violations.is_empty() {
                debug!(attempt, lines = lines.len(), "poem composed");
                return Ok(Poem {
                    title: lines[0].clone(),
                    lines,
                });
            }
            debug!(
                attempt,
                violations = %violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; "),
                "poem draft rejected"
            );
        }

        Err(PoemError::CompositionInfeasible {
            attempts: self.config.max_attempts,
        })
    }

    /// One full draft: plan the roles, then fill each line.
    fn draft(&self, prompts: &[Prompt], rng: &mut StdRng) -> Vec<String> {
        let roles = self.plan(rng);
        let mut filler = Filler::new(&self.rules);
        let mut lines: Vec<String> = Vec::with_capacity(roles.len());

        for role in roles {
            let group = match role {
                LineRole::Title => &self.rules.templates.title,
                LineRole::Prompt(_) => &self.rules.templates.prompt,
                LineRole::Question => &self.rules.templates.question,
                LineRole::Sensory(_) => &self.rules.templates.sensory,
                LineRole::Free => {
                    if rng.gen_bool(0.5) {
                        &self.rules.templates.sensory
                    } else {
                        &self.rules.templates.filler
                    }
                }
            };
            let line_sense = match role {
                LineRole::Sensory(sense) => sense,
                _ => *Sense::ALL.choose(rng).unwrap_or(&Sense::Sight),
            };
            let mut candidates: Vec<&LineTemplate> =
                group.iter().filter(|t| t.accepts_sense(line_sense)).collect();
            if candidates.is_empty() {
                candidates = group.iter().collect();
            }
            let prompt = match role {
                LineRole::Prompt(i) => Some(prompts[i].text.as_str()),
                _ => None,
            };

            // A few refills if the line collides with one already written.
            let mut line = String::new();
            for _ in 0..4 {
                let Some(template) = candidates.choose(rng) else {
                    break;
                };
                let previous = lines.last().map(String::as_str).unwrap_or("");
                line = filler.fill(template, prompt, line_sense, previous, rng);
                if !lines.iter().any(|l| l.trim() == line.trim()) {
                    break;
                }
            }
            lines.push(line);
        }

        lines
    }

    /// Decide how long the poem is and what each line is for.
    fn plan(&self, rng: &mut StdRng) -> Vec<LineRole> {
        let total = rng.gen_range(self.config.min_lines..=self.config.max_lines);
        let body = total - 1;
        let mut roles = vec![LineRole::Free; total];
        roles[0] = LineRole::Title;

        // Prompt lines: four distinct body slots, spread apart when possible.
        let mut spots = index::sample(rng, body, PROMPTS_PER_POEM).into_vec();
        for _ in 0..SPREAD_TRIES {
            spots.sort_unstable();
            if spots.windows(2).all(|w| w[1] - w[0] > 1) {
                break;
            }
            spots = index::sample(rng, body, PROMPTS_PER_POEM).into_vec();
        }
        let mut order: Vec<usize> = (0..PROMPTS_PER_POEM).collect();
        order.shuffle(rng);
        for (spot, prompt) in spots.iter().zip(order) {
            roles[spot + 1] = LineRole::Prompt(prompt);
        }

        // The question avoids the closing line when it can.
        let mut open: Vec<usize> = (1..total).filter(|i| roles[*i] == LineRole::Free).collect();
        let question_pool: Vec<usize> = open.iter().copied().filter(|i| *i != total - 1).collect();
        let question = question_pool
            .choose(rng)
            .or_else(|| open.choose(rng))
            .copied();
        if let Some(q) = question {
            roles[q] = LineRole::Question;
            open.retain(|i| *i != q);
        }

        // Required senses, each on its own line.
        let mut senses = Sense::ALL.to_vec();
        senses.shuffle(rng);
        open.shuffle(rng);
        for (line, sense) in open.iter().zip(senses.into_iter().take(self.config.min_senses)) {
            roles[*line] = LineRole::Sensory(sense);
        }

        roles
    }
}

/// Fills template slots from the banks, drawing without replacement within
/// one poem and steering away from the previous line's vocabulary.
struct Filler<'r> {
    rules: &'r RuleTable,
    used: FxHashSet<&'r str>,
}

impl<'r> Filler<'r> {
    fn new(rules: &'r RuleTable) -> Self {
        Self {
            rules,
            used: FxHashSet::default(),
        }
    }

    fn fill(
        &mut self,
        template: &LineTemplate,
        prompt: Option<&str>,
        line_sense: Sense,
        previous: &str,
        rng: &mut StdRng,
    ) -> String {
        let rules = self.rules;
        let avoid = words(previous);
        let mut out = String::new();
        let mut starts_with_prompt = false;

        for (i, segment) in template.segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(SlotKind::Prompt) => {
                    if i == 0 {
                        starts_with_prompt = true;
                    }
                    out.push_str(prompt.unwrap_or_default());
                }
                Segment::Slot(SlotKind::Sensory(bound)) => {
                    let bank = rules.senses.bank(bound.unwrap_or(line_sense));
                    out.push_str(self.pick(bank, &avoid, rng));
                }
                Segment::Slot(SlotKind::Filler) => {
                    out.push_str(self.pick(&rules.fillers, &avoid, rng));
                }
                Segment::Slot(SlotKind::Question) => {
                    out.push_str(self.pick(&rules.questions, &avoid, rng));
                }
            }
        }

        let out = out.trim().to_string();
        if starts_with_prompt {
            out
        } else {
            capitalize(&out)
        }
    }

    fn pick(&mut self, bank: &'r [String], avoid: &FxHashSet<String>, rng: &mut StdRng) -> &'r str {
        let fresh: Vec<&'r String> = bank.iter().filter(|p| !self.used.contains(p.as_str())).collect();
        let pool: Vec<&'r String> = if fresh.is_empty() { bank.iter().collect() } else { fresh };

        let best: Option<&'r String> = pool
            .choose_multiple(rng, PHRASE_CANDIDATES)
            .copied()
            .min_by_key(|p| words(p).intersection(avoid).count());
        let best = best.map(String::as_str).unwrap_or_default();
        self.used.insert(best);
        best
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Reject prompt sets no poem could satisfy.
fn check_prompts(prompts: &[Prompt]) -> Result<(), PoemError> {
    if prompts.len() != PROMPTS_PER_POEM {
        return Err(PoemError::InvalidPrompts(format!(
            "expected {PROMPTS_PER_POEM} prompts, got {}",
            prompts.len()
        )));
    }
    for (i, prompt) in prompts.iter().enumerate() {
        let text = prompt.text.as_str();
        if text.trim().is_empty() {
            return Err(PoemError::InvalidPrompts(format!("prompt {:?} is empty", prompt.id)));
        }
        if text.contains('?') || text.contains('\n') {
            return Err(PoemError::InvalidPrompts(format!(
                "prompt '{text}' contains '?' or a line break"
            )));
        }
        for other in &prompts[i + 1..] {
            if other.text == prompt.text {
                return Err(PoemError::InvalidPrompts(format!("prompt '{text}' is repeated")));
            }
            if other.text.contains(text) || text.contains(other.text.as_str()) {
                return Err(PoemError::InvalidPrompts(format!(
                    "prompts '{text}' and '{}' overlap",
                    other.text
                )));
            }
        }
    }
    Ok(())
}
