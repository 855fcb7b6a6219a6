/// Selection engine — one session's walk through its shuffled pairings.
///
/// A session fixes its round order at start. Each choice consumes the head
/// pairing, so a prompt, its chosen image and its rejected sibling can never
/// be offered again; pool consumption is the whole exclusion mechanism.

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::composer::PROMPTS_PER_POEM;
use crate::core::pool::{PoolError, PromptPairPool};
use crate::schema::placement::Placement;
use crate::schema::poem::Poem;
use crate::schema::prompt::{ImageId, ImagePairing, Prompt, PromptId};

/// Rounds a session must offer at least; a pool shorter than this cannot
/// start one.
pub const MIN_ROUNDS: usize = 15;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("image '{image}' is not offered in round {round}")]
    InvalidChoice { image: ImageId, round: usize },
    #[error("session is already complete")]
    SessionComplete,
    #[error("session not found: {0}")]
    NotFound(SessionId),
    #[error("session still has {remaining} rounds to play")]
    NotComplete { remaining: usize },
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),
}

/// Newtype wrapper for session IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Selecting,
    Complete,
}

/// One recorded choice. Its index in `SessionState::selections` is the round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub prompt_id: PromptId,
    pub chosen_image: ImageId,
    pub rejected_image: ImageId,
    /// Where the chosen image sat when it was picked, if the round was laid out.
    pub placement: Option<Placement>,
}

/// A prompt drawn for the poem, with the image it was chosen alongside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledPrompt {
    pub prompt: Prompt,
    pub image_id: ImageId,
}

/// The poem a completed session produced, with the prompts it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keepsake {
    pub sources: Vec<SampledPrompt>,
    pub poem: Poem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    /// Root of every random stream this session draws from.
    pub seed: u64,
    pub remaining_pairings: VecDeque<ImagePairing>,
    pub selections: Vec<Selection>,
    pub phase: Phase,
    /// Live layout of the current round, once computed.
    #[serde(default)]
    pub offered: Vec<Placement>,
    #[serde(default)]
    pub keepsake: Option<Keepsake>,
}

impl SessionState {
    /// Zero-based index of the round being played (or played last).
    pub fn round(&self) -> usize {
        self.selections.len()
    }

    pub fn total_rounds(&self) -> usize {
        self.selections.len() + self.remaining_pairings.len()
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    pub fn chosen_images(&self) -> impl Iterator<Item = &ImageId> {
        self.selections.iter().map(|s| &s.chosen_image)
    }
}

/// Drives sessions over a shared, immutable pool.
#[derive(Debug, Clone)]
pub struct SelectionEngine {
    pool: Arc<PromptPairPool>,
    rounds: usize,
}

impl SelectionEngine {
    pub fn new(pool: Arc<PromptPairPool>, rounds: usize) -> Result<Self, PoolError> {
        if rounds < MIN_ROUNDS {
            return Err(PoolError::InvalidConfiguration(format!(
                "a session needs at least {MIN_ROUNDS} rounds, got {rounds}"
            )));
        }
        pool.ensure_rounds(rounds)?;
        Ok(Self { pool, rounds })
    }

    pub fn pool(&self) -> &PromptPairPool {
        &self.pool
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn prompt(&self, id: PromptId) -> Option<&Prompt> {
        self.pool.prompt(id)
    }

    /// Open a session whose round order is a uniform shuffle of the pool,
    /// fixed for the session's lifetime.
    pub fn start_session(&self, session_id: SessionId, seed: u64) -> Result<SessionState, PoolError> {
        self.pool.ensure_rounds(self.rounds)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut order: Vec<ImagePairing> = self.pool.pairings().to_vec();
        order.shuffle(&mut rng);
        order.truncate(self.rounds);

        info!(session = %session_id, rounds = self.rounds, "session started");
        Ok(SessionState {
            session_id,
            seed,
            remaining_pairings: order.into(),
            selections: Vec::with_capacity(self.rounds),
            phase: Phase::Selecting,
            offered: Vec::new(),
            keepsake: None,
        })
    }

    /// The pairing on offer, or `None` once the session is complete.
    pub fn current_round<'s>(&self, state: &'s SessionState) -> Option<&'s ImagePairing> {
        match state.phase {
            Phase::Selecting => state.remaining_pairings.front(),
            Phase::Complete => None,
        }
    }

    /// Record a pick from the current pairing and retire the pairing.
    ///
    /// On error the state is left exactly as it was.
    pub fn choose(&self, state: &mut SessionState, picked: &ImageId) -> Result<Phase, SessionError> {
        if state.phase == Phase::Complete {
            return Err(SessionError::SessionComplete);
        }
        let round = state.round();
        let Some(current) = state.remaining_pairings.front() else {
            return Err(SessionError::SessionComplete);
        };
        let Some(rejected) = current.sibling_of(picked) else {
            return Err(SessionError::InvalidChoice {
                image: picked.clone(),
                round,
            });
        };

        let selection = Selection {
            prompt_id: current.prompt_id,
            chosen_image: picked.clone(),
            rejected_image: rejected.clone(),
            placement: state.offered.iter().find(|p| &p.image_id == picked).cloned(),
        };
        debug!(
            session = %state.session_id,
            round,
            chosen = %selection.chosen_image,
            rejected = %selection.rejected_image,
            "choice recorded"
        );

        state.selections.push(selection);
        state.remaining_pairings.pop_front();
        state.offered.clear();
        if state.remaining_pairings.is_empty() {
            state.phase = Phase::Complete;
            info!(session = %state.session_id, "session complete");
        }
        Ok(state.phase)
    }

    /// Draw the poem's prompts uniformly, without replacement, from the
    /// session's recorded selections.
    pub fn sample_poem_prompts(
        &self,
        state: &SessionState,
        rng: &mut StdRng,
    ) -> Result<Vec<SampledPrompt>, SessionError> {
        if state.phase != Phase::Complete {
            return Err(SessionError::NotComplete {
                remaining: state.remaining_pairings.len(),
            });
        }
        let amount = PROMPTS_PER_POEM.min(state.selections.len());
        index::sample(rng, state.selections.len(), amount)
            .into_iter()
            .map(|i| {
                let selection = &state.selections[i];
                self.prompt(selection.prompt_id)
                    .map(|prompt| SampledPrompt {
                        prompt: prompt.clone(),
                        image_id: selection.chosen_image.clone(),
                    })
                    .ok_or_else(|| {
                        SessionError::Pool(PoolError::InvalidConfiguration(format!(
                            "selection in round {i} names unknown prompt {:?}",
                            selection.prompt_id
                        )))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use rustc_hash::FxHashSet;

    fn engine() -> SelectionEngine {
        SelectionEngine::new(Arc::new(catalog::default_pool().unwrap()), 15).unwrap()
    }

    fn play_first_images(engine: &SelectionEngine, state: &mut SessionState) {
        while let Some(pairing) = engine.current_round(state).cloned() {
            engine.choose(state, &pairing.image_a).unwrap();
        }
    }

    #[test]
    fn start_session_has_fifteen_rounds() {
        let state = engine().start_session(SessionId(1), 7).unwrap();
        assert_eq!(state.remaining_pairings.len(), 15);
        assert!(state.selections.is_empty());
        assert_eq!(state.phase, Phase::Selecting);
    }

    #[test]
    fn round_order_is_fixed_by_the_seed() {
        let engine = engine();
        let a = engine.start_session(SessionId(1), 99).unwrap();
        let b = engine.start_session(SessionId(2), 99).unwrap();
        assert_eq!(a.remaining_pairings, b.remaining_pairings);
        let c = engine.start_session(SessionId(3), 100).unwrap();
        assert_ne!(a.remaining_pairings, c.remaining_pairings);
    }

    #[test]
    fn every_prompt_shown_once_in_shuffled_order() {
        let engine = engine();
        let mut state = engine.start_session(SessionId(1), 3).unwrap();
        let planned: Vec<PromptId> = state.remaining_pairings.iter().map(|p| p.prompt_id).collect();

        let mut shown = Vec::new();
        while let Some(pairing) = engine.current_round(&state).cloned() {
            shown.push(pairing.prompt_id);
            engine.choose(&mut state, &pairing.image_b).unwrap();
        }
        assert_eq!(shown, planned);
        let unique: FxHashSet<_> = shown.iter().collect();
        assert_eq!(unique.len(), 15);
        assert_eq!(state.phase, Phase::Complete);
    }

    #[test]
    fn choice_records_pick_and_sibling() {
        let engine = engine();
        let mut state = engine.start_session(SessionId(1), 5).unwrap();
        let pairing = engine.current_round(&state).cloned().unwrap();
        assert_eq!(engine.choose(&mut state, &pairing.image_b).unwrap(), Phase::Selecting);
        let s = &state.selections[0];
        assert_eq!(s.prompt_id, pairing.prompt_id);
        assert_eq!(s.chosen_image, pairing.image_b);
        assert_eq!(s.rejected_image, pairing.image_a);
        assert_eq!(s.placement, None);
        assert_eq!(state.remaining_pairings.len(), 14);
    }

    #[test]
    fn choice_keeps_the_live_placement() {
        let engine = engine();
        let mut state = engine.start_session(SessionId(1), 5).unwrap();
        let pairing = engine.current_round(&state).cloned().unwrap();
        let placement = Placement {
            image_id: pairing.image_a.clone(),
            x: 10.0,
            y: 20.0,
            width: 120.0,
            height: 90.0,
            rotation_degrees: 0.0,
        };
        state.offered = vec![placement.clone()];
        engine.choose(&mut state, &pairing.image_a).unwrap();
        assert_eq!(state.selections[0].placement, Some(placement));
        assert!(state.offered.is_empty());
    }

    #[test]
    fn invalid_choice_leaves_state_untouched() {
        let engine = engine();
        let mut state = engine.start_session(SessionId(1), 5).unwrap();
        let before = state.clone();
        let err = engine.choose(&mut state, &ImageId::from("not_offered.png")).unwrap_err();
        assert!(matches!(err, SessionError::InvalidChoice { round: 0, .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn image_from_a_later_round_is_invalid_now() {
        let engine = engine();
        let mut state = engine.start_session(SessionId(1), 5).unwrap();
        let later = state.remaining_pairings[3].image_a.clone();
        assert!(matches!(
            engine.choose(&mut state, &later),
            Err(SessionError::InvalidChoice { .. })
        ));
    }

    #[test]
    fn complete_session_rejects_further_choices() {
        let engine = engine();
        let mut state = engine.start_session(SessionId(1), 11).unwrap();
        play_first_images(&engine, &mut state);
        assert!(engine.current_round(&state).is_none());

        let last = state.selections.last().unwrap().chosen_image.clone();
        let before = state.selections.clone();
        for _ in 0..2 {
            assert!(matches!(
                engine.choose(&mut state, &last),
                Err(SessionError::SessionComplete)
            ));
        }
        assert_eq!(state.selections, before);
    }

    #[test]
    fn rejected_images_never_return() {
        let engine = engine();
        for seed in 0..20 {
            let mut state = engine.start_session(SessionId(seed), seed).unwrap();
            let mut retired: FxHashSet<ImageId> = FxHashSet::default();
            while let Some(pairing) = engine.current_round(&state).cloned() {
                assert!(!retired.contains(&pairing.image_a));
                assert!(!retired.contains(&pairing.image_b));
                let pick = if seed % 2 == 0 { &pairing.image_a } else { &pairing.image_b };
                engine.choose(&mut state, pick).unwrap();
                retired.insert(pairing.image_a.clone());
                retired.insert(pairing.image_b.clone());
            }
        }
    }

    #[test]
    fn too_few_pairings_is_invalid_configuration() {
        let pool = PromptPairPool::new(
            vec![Prompt::new(0, "Blue rain")],
            vec![ImagePairing {
                prompt_id: PromptId(0),
                image_a: "a".into(),
                image_b: "b".into(),
            }],
        )
        .unwrap();
        let err = SelectionEngine::new(Arc::new(pool), 15).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    #[test]
    fn poem_prompts_need_a_complete_session() {
        let engine = engine();
        let state = engine.start_session(SessionId(1), 1).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            engine.sample_poem_prompts(&state, &mut rng),
            Err(SessionError::NotComplete { remaining: 15 })
        ));
    }

    #[test]
    fn unknown_prompt_in_selection_is_a_pool_error() {
        let engine = engine();
        let mut state = engine.start_session(SessionId(1), 4).unwrap();
        play_first_images(&engine, &mut state);
        for selection in &mut state.selections {
            selection.prompt_id = PromptId(999);
        }
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            engine.sample_poem_prompts(&state, &mut rng),
            Err(SessionError::Pool(PoolError::InvalidConfiguration(_)))
        ));
    }

    #[test]
    fn fewer_rounds_than_a_session_needs_rejected() {
        let pool = Arc::new(catalog::default_pool().unwrap());
        let err = SelectionEngine::new(pool, 5).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration(_)));
    }

    #[test]
    fn poem_prompts_are_four_distinct_selections() {
        let engine = engine();
        let mut state = engine.start_session(SessionId(1), 21).unwrap();
        play_first_images(&engine, &mut state);
        let mut rng = StdRng::seed_from_u64(0);
        let sampled = engine.sample_poem_prompts(&state, &mut rng).unwrap();
        assert_eq!(sampled.len(), 4);
        let ids: FxHashSet<_> = sampled.iter().map(|s| s.prompt.id).collect();
        assert_eq!(ids.len(), 4);
        for s in &sampled {
            assert!(state
                .selections
                .iter()
                .any(|sel| sel.prompt_id == s.prompt.id && sel.chosen_image == s.image_id));
        }
    }
}
