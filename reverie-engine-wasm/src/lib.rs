//! WASM bindings for reverie-engine — powers the in-browser ritual demo.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use wasm_bindgen::prelude::*;

use reverie_engine::core::config::RitualConfig;
use reverie_engine::core::pool::{PromptPairPool, StaticCorpus};
use reverie_engine::core::ritual::Ritual;
use reverie_engine::core::rules::RuleTable;
use reverie_engine::core::session::{SessionId, SessionState};
use reverie_engine::core::store::SessionStore;
use reverie_engine::schema::placement::Placement;
use reverie_engine::schema::prompt::ImageId;

// ---------------------------------------------------------------------------
// Session store without wall-clock access (no `Instant` on wasm32)
// ---------------------------------------------------------------------------
#[derive(Default)]
struct PageStore {
    sessions: Mutex<HashMap<SessionId, SessionState>>,
}

impl SessionStore for PageStore {
    fn get(&self, id: SessionId) -> Option<SessionState> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get(&id).cloned()
    }

    fn put(&self, id: SessionId, state: SessionState) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(id, state);
    }

    fn evict(&self, id: SessionId) -> Option<SessionState> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(&id)
    }

    fn update<R>(&self, id: SessionId, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.get_mut(&id).map(f)
    }
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Serialize)]
struct RoundInfo {
    index: usize,
    total: usize,
    prompt: String,
    images: Vec<Placement>,
}

#[derive(serde::Serialize)]
struct PoemInfo {
    title: String,
    lines: Vec<String>,
    prompts: Vec<String>,
}

fn js_err(context: &str, e: impl std::fmt::Display) -> JsError {
    JsError::new(&format!("{context}: {e}"))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| js_err("Serialization error", e))
}

// ---------------------------------------------------------------------------
// RitualDemo — the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct RitualDemo {
    ritual: Ritual<PageStore>,
    session: SessionId,
}

#[wasm_bindgen]
impl RitualDemo {
    /// Start a demo on the built-in theme.
    #[wasm_bindgen(constructor)]
    pub fn new(seed: u64) -> Result<RitualDemo, JsError> {
        let ritual = Ritual::builder()
            .with_store(PageStore::default())
            .seed(seed)
            .build()
            .map_err(|e| js_err("Ritual build error", e))?;
        Self::open(ritual)
    }

    /// Start a demo on a theme supplied as RON sources.
    pub fn with_theme(
        pool_ron: &str,
        corpus_ron: &str,
        rules_ron: &str,
        ritual_ron: &str,
        seed: u64,
    ) -> Result<RitualDemo, JsError> {
        let pool = PromptPairPool::parse_ron(pool_ron).map_err(|e| js_err("Pool parse error", e))?;
        let corpus = StaticCorpus::parse_ron(corpus_ron).map_err(|e| js_err("Corpus parse error", e))?;
        let rules = RuleTable::parse_ron(rules_ron).map_err(|e| js_err("Rules parse error", e))?;
        let config = RitualConfig::parse_ron(ritual_ron).map_err(|e| js_err("Config parse error", e))?;

        let ritual = Ritual::builder()
            .with_store(PageStore::default())
            .with_pool(pool)
            .with_corpus(corpus)
            .with_rules(rules)
            .with_config(config)
            .seed(seed)
            .build()
            .map_err(|e| js_err("Ritual build error", e))?;
        Self::open(ritual)
    }

    /// The current round as JSON, or `"null"` once every round is played.
    pub fn round(&self) -> Result<String, JsError> {
        let round = self
            .ritual
            .current_round(self.session)
            .map_err(|e| js_err("Round error", e))?
            .map(|r| RoundInfo {
                index: r.index,
                total: r.total,
                prompt: r.prompt.text,
                images: r.placements,
            });
        to_json(&round)
    }

    /// Pick an image of the current round. Returns true when the session
    /// is complete.
    pub fn choose(&self, image_id: &str) -> Result<bool, JsError> {
        let phase = self
            .ritual
            .choose(self.session, &ImageId::from(image_id))
            .map_err(|e| js_err("Choice error", e))?;
        Ok(phase == reverie_engine::core::session::Phase::Complete)
    }

    /// JSON array of collage placements.
    pub fn collage(&self) -> Result<String, JsError> {
        let collage = self
            .ritual
            .collage(self.session)
            .map_err(|e| js_err("Collage error", e))?;
        to_json(&collage)
    }

    /// JSON array of rotated decor placements.
    pub fn decor(&self) -> Result<String, JsError> {
        let decor = self
            .ritual
            .scatter_decor(self.session)
            .map_err(|e| js_err("Decor error", e))?;
        to_json(&decor)
    }

    /// The session's poem as JSON.
    pub fn poem(&self) -> Result<String, JsError> {
        let summary = self
            .ritual
            .summary(self.session)
            .map_err(|e| js_err("Poem error", e))?;
        to_json(&PoemInfo {
            title: summary.poem.title,
            lines: summary.poem.lines,
            prompts: summary.sources.into_iter().map(|s| s.prompt.text).collect(),
        })
    }

    /// Throw away the current session and begin another.
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.ritual.end_session(self.session);
        self.session = self
            .ritual
            .start_session()
            .map_err(|e| js_err("Session error", e))?;
        Ok(())
    }
}

impl RitualDemo {
    fn open(ritual: Ritual<PageStore>) -> Result<RitualDemo, JsError> {
        let session = ritual
            .start_session()
            .map_err(|e| js_err("Session error", e))?;
        Ok(RitualDemo { ritual, session })
    }
}
