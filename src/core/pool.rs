/// Prompt pair pool and image corpus — the static catalog every session draws from.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::schema::prompt::{ImageId, ImageInfo, ImagePairing, Prompt, PromptId};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

fn invalid(msg: impl Into<String>) -> PoolError {
    PoolError::InvalidConfiguration(msg.into())
}

/// Source of natural image proportions. Resolution of the image bytes
/// themselves is someone else's job.
pub trait ImageCorpus {
    /// Width divided by height, if the image is known.
    fn aspect_ratio(&self, id: &ImageId) -> Option<f64>;

    /// Every known image, in a stable order.
    fn image_ids(&self) -> Vec<ImageId>;

    fn info(&self, id: &ImageId) -> Option<ImageInfo> {
        self.aspect_ratio(id).map(|aspect_ratio| ImageInfo {
            id: id.clone(),
            aspect_ratio,
        })
    }
}

/// In-memory corpus backed by a map of aspect ratios.
#[derive(Debug, Clone, Default)]
pub struct StaticCorpus {
    ratios: FxHashMap<ImageId, f64>,
}

impl StaticCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<ImageId>, aspect_ratio: f64) -> Result<(), PoolError> {
        let id = id.into();
        if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 {
            return Err(invalid(format!(
                "image '{}' has unusable aspect ratio {}",
                id, aspect_ratio
            )));
        }
        self.ratios.insert(id, aspect_ratio);
        Ok(())
    }

    /// Register an image from its pixel dimensions.
    pub fn insert_dimensions(
        &mut self,
        id: impl Into<ImageId>,
        width: u32,
        height: u32,
    ) -> Result<(), PoolError> {
        let id = id.into();
        if height == 0 {
            return Err(invalid(format!("image '{}' has zero height", id)));
        }
        self.insert(id, width as f64 / height as f64)
    }

    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }

    /// Load a corpus from a RON file mapping image id to aspect ratio.
    pub fn load_from_ron(path: &Path) -> Result<StaticCorpus, PoolError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<StaticCorpus, PoolError> {
        let raw: FxHashMap<String, f64> = ron::from_str(input)?;
        let mut corpus = StaticCorpus::new();
        for (id, ratio) in raw {
            corpus.insert(ImageId(id), ratio)?;
        }
        Ok(corpus)
    }
}

impl ImageCorpus for StaticCorpus {
    fn aspect_ratio(&self, id: &ImageId) -> Option<f64> {
        self.ratios.get(id).copied()
    }

    fn image_ids(&self) -> Vec<ImageId> {
        let mut ids: Vec<ImageId> = self.ratios.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// The catalog of prompts, each bound to a disjoint pair of images.
#[derive(Debug, Clone)]
pub struct PromptPairPool {
    prompts: Vec<Prompt>,
    pairings: Vec<ImagePairing>,
}

#[derive(Debug, Deserialize)]
struct RonPool {
    prompts: Vec<RonPrompt>,
}

#[derive(Debug, Deserialize)]
struct RonPrompt {
    text: String,
    images: (String, String),
}

impl PromptPairPool {
    /// Build a pool, checking the structural invariants: unique non-empty
    /// prompt texts, exactly one pairing per prompt, two distinct images per
    /// pairing and no image shared between pairings.
    pub fn new(prompts: Vec<Prompt>, pairings: Vec<ImagePairing>) -> Result<Self, PoolError> {
        let mut texts = FxHashSet::default();
        let mut ids = FxHashSet::default();
        for prompt in &prompts {
            if prompt.text.trim().is_empty() {
                return Err(invalid(format!("prompt {:?} has empty text", prompt.id)));
            }
            if !texts.insert(prompt.text.as_str()) {
                return Err(invalid(format!("duplicate prompt text '{}'", prompt.text)));
            }
            if !ids.insert(prompt.id) {
                return Err(invalid(format!("duplicate prompt id {:?}", prompt.id)));
            }
        }

        let mut bound = FxHashSet::default();
        let mut seen_images = FxHashSet::default();
        for pairing in &pairings {
            if !ids.contains(&pairing.prompt_id) {
                return Err(invalid(format!(
                    "pairing references unknown prompt {:?}",
                    pairing.prompt_id
                )));
            }
            if !bound.insert(pairing.prompt_id) {
                return Err(invalid(format!(
                    "prompt {:?} is bound to more than one pairing",
                    pairing.prompt_id
                )));
            }
            if pairing.image_a == pairing.image_b {
                return Err(invalid(format!(
                    "pairing for prompt {:?} offers '{}' twice",
                    pairing.prompt_id, pairing.image_a
                )));
            }
            for image in pairing.images() {
                if !seen_images.insert(image) {
                    return Err(invalid(format!(
                        "image '{}' appears in more than one pairing",
                        image
                    )));
                }
            }
        }
        if let Some(orphan) = prompts.iter().find(|p| !bound.contains(&p.id)) {
            return Err(invalid(format!(
                "prompt '{}' has no image pairing",
                orphan.text
            )));
        }

        Ok(Self { prompts, pairings })
    }

    /// Bind each prompt to two images drawn without replacement from the corpus.
    pub fn draw_from_corpus(
        prompt_texts: &[&str],
        corpus: &dyn ImageCorpus,
        rng: &mut StdRng,
    ) -> Result<Self, PoolError> {
        let mut images = corpus.image_ids();
        let needed = prompt_texts.len() * 2;
        if images.len() < needed {
            return Err(invalid(format!(
                "corpus holds {} images, {} prompts need {}",
                images.len(),
                prompt_texts.len(),
                needed
            )));
        }
        images.shuffle(rng);

        let mut drawn = images.into_iter();
        let mut prompts = Vec::with_capacity(prompt_texts.len());
        let mut pairings = Vec::with_capacity(prompt_texts.len());
        for (i, text) in prompt_texts.iter().enumerate() {
            let prompt = Prompt::new(i as u32, *text);
            let (Some(image_a), Some(image_b)) = (drawn.next(), drawn.next()) else {
                return Err(invalid("corpus exhausted while drawing pairs"));
            };
            pairings.push(ImagePairing {
                prompt_id: prompt.id,
                image_a,
                image_b,
            });
            prompts.push(prompt);
        }
        Self::new(prompts, pairings)
    }

    /// Load a pool from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<PromptPairPool, PoolError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a pool from a RON string. Prompt ids follow file order.
    pub fn parse_ron(input: &str) -> Result<PromptPairPool, PoolError> {
        let raw: RonPool = ron::from_str(input)?;
        let mut prompts = Vec::with_capacity(raw.prompts.len());
        let mut pairings = Vec::with_capacity(raw.prompts.len());
        for (i, entry) in raw.prompts.into_iter().enumerate() {
            let prompt = Prompt::new(i as u32, entry.text);
            pairings.push(ImagePairing {
                prompt_id: prompt.id,
                image_a: ImageId(entry.images.0),
                image_b: ImageId(entry.images.1),
            });
            prompts.push(prompt);
        }
        Self::new(prompts, pairings)
    }

    /// Fail unless the pool can feed `rounds` rounds.
    pub fn ensure_rounds(&self, rounds: usize) -> Result<(), PoolError> {
        if self.pairings.len() < rounds {
            return Err(invalid(format!(
                "pool holds {} pairings, a session needs {}",
                self.pairings.len(),
                rounds
            )));
        }
        Ok(())
    }

    /// Fail if any pairing names an image the corpus does not know.
    pub fn validate_against(&self, corpus: &dyn ImageCorpus) -> Result<(), PoolError> {
        for pairing in &self.pairings {
            for image in pairing.images() {
                if corpus.aspect_ratio(image).is_none() {
                    return Err(invalid(format!(
                        "image '{}' is missing from the corpus",
                        image
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn pairings(&self) -> &[ImagePairing] {
        &self.pairings
    }

    pub fn prompt(&self, id: PromptId) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.pairings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairings.is_empty()
    }
}
