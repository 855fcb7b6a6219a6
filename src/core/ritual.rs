/// The ritual facade: session lifecycle, live round layouts, the closing
/// collage and the keepsake poem.
///
/// Built via `Ritual::builder()`. Every random draw is seeded from the
/// session's seed, so a session replays identically from the same seed.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog;
use crate::core::composer::{PoemComposer, PoemError};
use crate::core::config::{ConfigError, RitualConfig};
use crate::core::layout::{self, LayoutError};
use crate::core::pool::{ImageCorpus, PoolError, PromptPairPool, StaticCorpus};
use crate::core::rules::RuleTable;
use crate::core::session::{
    Keepsake, Phase, SampledPrompt, SelectionEngine, SessionError, SessionId, SessionState,
};
use crate::core::store::{InMemorySessionStore, SessionStore};
use crate::schema::placement::{Placement, SizedImage};
use crate::schema::poem::Poem;
use crate::schema::prompt::{ImageId, ImageInfo, ImagePairing, Prompt};

#[derive(Debug, Error)]
pub enum RitualError {
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("poem error: {0}")]
    Poem(#[from] PoemError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Stream offsets added to a session seed, one per consumer.
const ROUND_STREAM: u64 = 7919;
const COLLAGE_STREAM: u64 = 104_729;
const DECOR_STREAM: u64 = 1_299_709;
const POEM_STREAM: u64 = 15_485_863;

/// Spreads consecutive session numbers across the seed space.
const SESSION_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Aspect ratio assumed for an image the corpus does not know.
const SQUARE: f64 = 1.0;

/// What the participant sees for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// Zero-based.
    pub index: usize,
    pub total: usize,
    pub prompt: Prompt,
    pub pairing: ImagePairing,
    pub placements: Vec<Placement>,
}

/// Everything a completed session leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub collage: Vec<Placement>,
    pub decor: Vec<Placement>,
    pub sources: Vec<SampledPrompt>,
    pub poem: Poem,
}

pub struct Ritual<S = InMemorySessionStore> {
    engine: SelectionEngine,
    corpus: Arc<dyn ImageCorpus + Send + Sync>,
    composer: PoemComposer,
    config: RitualConfig,
    store: S,
    seed: u64,
    next_session: AtomicU64,
}

/// Builder for constructing a `Ritual`.
pub struct RitualBuilder<S = InMemorySessionStore> {
    theme_dir: Option<PathBuf>,
    seed: u64,
    /// Directly provided pool (for testing without files).
    pool: Option<PromptPairPool>,
    corpus: Option<Arc<dyn ImageCorpus + Send + Sync>>,
    rules: Option<RuleTable>,
    config: Option<RitualConfig>,
    store: S,
}

impl Ritual<InMemorySessionStore> {
    pub fn builder() -> RitualBuilder<InMemorySessionStore> {
        RitualBuilder {
            theme_dir: None,
            seed: 0,
            pool: None,
            corpus: None,
            rules: None,
            config: None,
            store: InMemorySessionStore::new(),
        }
    }
}

impl<S: SessionStore> Ritual<S> {
    pub fn config(&self) -> &RitualConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pool(&self) -> &PromptPairPool {
        self.engine.pool()
    }

    /// Open a new session with a freshly shuffled round order.
    pub fn start_session(&self) -> Result<SessionId, RitualError> {
        let number = self.next_session.fetch_add(1, Ordering::Relaxed);
        let id = SessionId(number);
        let seed = self.seed.wrapping_add(number.wrapping_mul(SESSION_MIX));
        let state = self.engine.start_session(id, seed)?;
        self.store.put(id, state);
        Ok(id)
    }

    /// Snapshot of a session's state.
    pub fn session(&self, id: SessionId) -> Result<SessionState, RitualError> {
        self.store
            .get(id)
            .ok_or(RitualError::Session(SessionError::NotFound(id)))
    }

    pub fn end_session(&self, id: SessionId) -> Option<SessionState> {
        let state = self.store.evict(id);
        if state.is_some() {
            debug!(session = %id, "session ended");
        }
        state
    }

    /// The round on offer, laid out on the live canvas. The layout is
    /// computed once per round and kept until a choice is made.
    /// Returns `None` once the session is complete.
    pub fn current_round(&self, id: SessionId) -> Result<Option<Round>, RitualError> {
        self.store
            .update(id, |state| self.round_for(state))
            .ok_or(RitualError::Session(SessionError::NotFound(id)))?
    }

    fn round_for(&self, state: &mut SessionState) -> Result<Option<Round>, RitualError> {
        let Some(pairing) = self.engine.current_round(state).cloned() else {
            return Ok(None);
        };
        let prompt = self
            .engine
            .prompt(pairing.prompt_id)
            .cloned()
            .ok_or_else(|| {
                PoolError::InvalidConfiguration(format!(
                    "pairing names unknown prompt {:?}",
                    pairing.prompt_id
                ))
            })?;

        if state.offered.is_empty() {
            let images: Vec<ImageInfo> = pairing.images().into_iter().map(|i| self.info(i)).collect();
            let round_seed = state
                .seed
                .wrapping_add((state.round() as u64 + 1).wrapping_mul(ROUND_STREAM));
            let mut rng = StdRng::seed_from_u64(round_seed);
            state.offered = layout::place_non_overlapping(&images, &self.config.live, &mut rng)?;
            debug!(session = %state.session_id, round = state.round(), "round laid out");
        }

        Ok(Some(Round {
            index: state.round(),
            total: state.total_rounds(),
            prompt,
            pairing,
            placements: state.offered.clone(),
        }))
    }

    /// Record the participant's pick for the current round.
    pub fn choose(&self, id: SessionId, image: &ImageId) -> Result<Phase, RitualError> {
        let phase = self
            .store
            .update(id, |state| self.engine.choose(state, image))
            .ok_or(SessionError::NotFound(id))??;
        Ok(phase)
    }

    /// The chosen images, shuffled and assigned to the collage grid at the
    /// sizes they had when picked.
    pub fn collage(&self, id: SessionId) -> Result<Vec<Placement>, RitualError> {
        let state = self.session(id)?;
        let mut images = self.sized_selections(&state);
        let mut rng = StdRng::seed_from_u64(state.seed.wrapping_add(COLLAGE_STREAM));
        images.shuffle(&mut rng);
        Ok(layout::place_grid(&images, &self.config.collage)?)
    }

    /// The chosen images scattered with a slight rotation on the decor canvas.
    pub fn scatter_decor(&self, id: SessionId) -> Result<Vec<Placement>, RitualError> {
        let state = self.session(id)?;
        let images: Vec<ImageInfo> = state.chosen_images().map(|i| self.info(i)).collect();
        let mut rng = StdRng::seed_from_u64(state.seed.wrapping_add(DECOR_STREAM));
        Ok(layout::place_non_overlapping(&images, &self.config.decor, &mut rng)?)
    }

    /// The session's poem. Composed on first request after completion and
    /// returned unchanged on every later call.
    pub fn poem(&self, id: SessionId) -> Result<Poem, RitualError> {
        let keepsake = self
            .store
            .update(id, |state| self.keepsake_for(state))
            .ok_or(SessionError::NotFound(id))??;
        Ok(keepsake.poem)
    }

    fn keepsake_for(&self, state: &mut SessionState) -> Result<Keepsake, RitualError> {
        if let Some(keepsake) = &state.keepsake {
            return Ok(keepsake.clone());
        }
        let mut rng = StdRng::seed_from_u64(state.seed.wrapping_add(POEM_STREAM));
        let sources = self.engine.sample_poem_prompts(state, &mut rng)?;
        let prompts: Vec<Prompt> = sources.iter().map(|s| s.prompt.clone()).collect();
        let poem = self.composer.compose(&prompts, rng.gen())?;

        info!(
            session = %state.session_id,
            lines = poem.line_count(),
            title = %poem.title,
            "poem composed"
        );
        let keepsake = Keepsake { sources, poem };
        state.keepsake = Some(keepsake.clone());
        Ok(keepsake)
    }

    /// Collage, decor and poem of a completed session.
    pub fn summary(&self, id: SessionId) -> Result<SessionSummary, RitualError> {
        let poem = self.poem(id)?;
        let state = self.session(id)?;
        let sources = state
            .keepsake
            .map(|k| k.sources)
            .unwrap_or_default();
        Ok(SessionSummary {
            session_id: id,
            collage: self.collage(id)?,
            decor: self.scatter_decor(id)?,
            sources,
            poem,
        })
    }

    fn info(&self, id: &ImageId) -> ImageInfo {
        self.corpus.info(id).unwrap_or_else(|| ImageInfo {
            id: id.clone(),
            aspect_ratio: SQUARE,
        })
    }

    fn sized_selections(&self, state: &SessionState) -> Vec<SizedImage> {
        state
            .selections
            .iter()
            .map(|s| match &s.placement {
                Some(placement) => SizedImage::from(placement),
                None => {
                    let info = self.info(&s.chosen_image);
                    SizedImage {
                        id: s.chosen_image.clone(),
                        width: self.config.fallback_size,
                        height: self.config.fallback_size / info.aspect_ratio,
                    }
                }
            })
            .collect()
    }
}

impl<S: SessionStore> RitualBuilder<S> {
    /// Directory holding any of `pool.ron`, `corpus.ron`, `rules.ron` and
    /// `ritual.ron`. Missing files fall back to the built-in theme.
    pub fn theme_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.theme_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Seed from the thread RNG, for installations that should not repeat.
    pub fn entropy_seed(mut self) -> Self {
        self.seed = rand::thread_rng().gen();
        self
    }

    pub fn with_pool(mut self, pool: PromptPairPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_corpus(mut self, corpus: impl ImageCorpus + Send + Sync + 'static) -> Self {
        self.corpus = Some(Arc::new(corpus));
        self
    }

    pub fn with_rules(mut self, rules: RuleTable) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_config(mut self, config: RitualConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Swap in another session store.
    pub fn with_store<T: SessionStore>(self, store: T) -> RitualBuilder<T> {
        RitualBuilder {
            theme_dir: self.theme_dir,
            seed: self.seed,
            pool: self.pool,
            corpus: self.corpus,
            rules: self.rules,
            config: self.config,
            store,
        }
    }

    pub fn build(self) -> Result<Ritual<S>, RitualError> {
        let dir = self.theme_dir.as_deref();

        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => match theme_file(dir, "ritual.ron") {
                Some(path) => RitualConfig::load_from_ron(&path)?,
                None => catalog::default_config()?,
            },
        };
        let pool = match self.pool {
            Some(pool) => pool,
            None => match theme_file(dir, "pool.ron") {
                Some(path) => PromptPairPool::load_from_ron(&path)?,
                None => catalog::default_pool()?,
            },
        };
        let corpus: Arc<dyn ImageCorpus + Send + Sync> = match self.corpus {
            Some(corpus) => corpus,
            None => match theme_file(dir, "corpus.ron") {
                Some(path) => Arc::new(StaticCorpus::load_from_ron(&path)?),
                None => Arc::new(catalog::default_corpus()?),
            },
        };
        let rules = match self.rules {
            Some(rules) => rules,
            None => match theme_file(dir, "rules.ron") {
                Some(path) => RuleTable::load_from_ron(&path)?,
                None => catalog::default_rules()?,
            },
        };

        pool.validate_against(corpus.as_ref())?;
        let engine = SelectionEngine::new(Arc::new(pool), config.rounds)?;
        let composer = PoemComposer::new(rules, config.poem.clone())?;

        info!(
            seed = self.seed,
            rounds = config.rounds,
            pairings = engine.pool().len(),
            "ritual ready"
        );
        Ok(Ritual {
            engine,
            corpus,
            composer,
            config,
            store: self.store,
            seed: self.seed,
            next_session: AtomicU64::new(0),
        })
    }
}

fn theme_file(dir: Option<&Path>, name: &str) -> Option<PathBuf> {
    let path = dir?.join(name);
    path.exists().then_some(path)
}
