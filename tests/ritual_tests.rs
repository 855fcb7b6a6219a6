/// Ritual integration tests — whole sessions through the public facade.

use reverie_engine::core::config::{ConfigError, RitualConfig};
use reverie_engine::core::layout::GridSpec;
use reverie_engine::core::layout::is_overlap_free;
use reverie_engine::core::pool::{PoolError, PromptPairPool, StaticCorpus};
use reverie_engine::core::ritual::{Ritual, RitualError};
use reverie_engine::core::session::{Phase, SessionError, SessionId};
use reverie_engine::core::store::{InMemorySessionStore, SessionStore};
use reverie_engine::schema::prompt::ImageId;
use rustc_hash::FxHashSet;
use std::path::Path;
use std::sync::Arc;
use std::thread;

fn play(ritual: &Ritual, id: SessionId, pick_second: bool) -> Vec<ImageId> {
    let mut shown = Vec::new();
    while let Some(round) = ritual.current_round(id).unwrap() {
        shown.push(round.pairing.image_a.clone());
        shown.push(round.pairing.image_b.clone());
        let pick = if pick_second {
            round.pairing.image_b
        } else {
            round.pairing.image_a
        };
        ritual.choose(id, &pick).unwrap();
    }
    shown
}

#[test]
fn fifteen_rounds_then_complete() {
    let ritual = Ritual::builder().seed(42).build().unwrap();
    let id = ritual.start_session().unwrap();

    let mut prompts = FxHashSet::default();
    let mut rounds = 0;
    while let Some(round) = ritual.current_round(id).unwrap() {
        assert_eq!(round.index, rounds);
        assert_eq!(round.total, 15);
        assert!(prompts.insert(round.prompt.id), "prompt shown twice");
        let phase = ritual.choose(id, &round.pairing.image_a).unwrap();
        rounds += 1;
        assert_eq!(phase == Phase::Complete, rounds == 15);
    }
    assert_eq!(rounds, 15);
    assert_eq!(prompts.len(), 15);
}

#[test]
fn no_image_is_offered_twice() {
    let ritual = Ritual::builder().seed(3).build().unwrap();
    for pick_second in [false, true] {
        let id = ritual.start_session().unwrap();
        let shown = play(&ritual, id, pick_second);
        let unique: FxHashSet<_> = shown.iter().collect();
        assert_eq!(shown.len(), 30);
        assert_eq!(unique.len(), 30);
    }
}

#[test]
fn every_live_round_is_overlap_free() {
    let ritual = Ritual::builder().seed(17).build().unwrap();
    for _ in 0..10 {
        let id = ritual.start_session().unwrap();
        while let Some(round) = ritual.current_round(id).unwrap() {
            assert!(is_overlap_free(&round.placements));
            let usable = ritual.config().live.canvas.usable();
            for p in &round.placements {
                assert!(usable.contains(&p.rect()));
            }
            ritual.choose(id, &round.pairing.image_b).unwrap();
        }
    }
}

#[test]
fn invalid_choice_does_not_advance() {
    let ritual = Ritual::builder().seed(5).build().unwrap();
    let id = ritual.start_session().unwrap();
    let before = ritual.session(id).unwrap();
    let err = ritual
        .choose(id, &ImageId::from("spare_moth.png"))
        .unwrap_err();
    assert!(matches!(
        err,
        RitualError::Session(SessionError::InvalidChoice { round: 0, .. })
    ));
    assert_eq!(ritual.session(id).unwrap().selections, before.selections);
    assert_eq!(
        ritual.session(id).unwrap().remaining_pairings,
        before.remaining_pairings
    );
}

#[test]
fn summary_after_a_full_session() {
    let ritual = Ritual::builder().seed(2024).build().unwrap();
    let id = ritual.start_session().unwrap();
    play(&ritual, id, false);

    let summary = ritual.summary(id).unwrap();
    assert_eq!(summary.collage.len(), 15);
    assert!(is_overlap_free(&summary.collage));
    assert_eq!(summary.decor.len(), 15);
    assert!(is_overlap_free(&summary.decor));
    assert_eq!(summary.sources.len(), 4);
    assert!((15..=19).contains(&summary.poem.line_count()));
    assert_eq!(summary.poem.lines[0], summary.poem.title);

    // Asking again changes nothing.
    assert_eq!(ritual.summary(id).unwrap(), summary);
}

#[test]
fn concurrent_sessions_stay_independent() {
    let ritual = Arc::new(Ritual::builder().seed(8).build().unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let ritual = Arc::clone(&ritual);
            thread::spawn(move || {
                let id = ritual.start_session().unwrap();
                play(&ritual, id, i % 2 == 0);
                ritual.poem(id).unwrap();
                id
            })
        })
        .collect();
    let ids: Vec<SessionId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let unique: FxHashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), 4);
    for id in ids {
        let state = ritual.session(id).unwrap();
        assert_eq!(state.phase, Phase::Complete);
        assert!(state.keepsake.is_some());
    }
}

#[test]
fn theme_dir_overrides_embedded_data() {
    let ritual = Ritual::builder()
        .theme_dir("tests/fixtures/alt_theme")
        .seed(1)
        .build()
        .unwrap();
    assert_eq!(ritual.config().rounds, 15);
    assert_eq!(ritual.pool().len(), 16);

    let id = ritual.start_session().unwrap();
    let shown = play(&ritual, id, true);
    assert_eq!(shown.len(), 30);

    let summary = ritual.summary(id).unwrap();
    assert_eq!(summary.collage.len(), 15);
    assert!(is_overlap_free(&summary.collage));
    assert!((16..=18).contains(&summary.poem.line_count()));

    assert_eq!(summary.sources.len(), 4);
    let text = summary.poem.to_text();
    let state = ritual.session(id).unwrap();
    for source in &summary.sources {
        assert_eq!(text.matches(&source.prompt.text).count(), 1, "{}", source.prompt.text);
        assert!(!summary.poem.title.contains(&source.prompt.text));
        assert!(state
            .selections
            .iter()
            .any(|s| s.prompt_id == source.prompt.id && s.chosen_image == source.image_id));
    }
}

#[test]
fn theme_with_too_few_pairings_is_rejected() {
    let result = Ritual::builder()
        .theme_dir("tests/fixtures/short_theme")
        .build();
    assert!(matches!(
        result,
        Err(RitualError::Pool(PoolError::InvalidConfiguration(_)))
    ));
}

#[test]
fn config_cannot_shrink_the_session() {
    let mut config = RitualConfig::default();
    config.rounds = 5;
    config.collage = GridSpec::new(1, 5);
    let result = Ritual::builder().with_config(config).build();
    assert!(matches!(
        result,
        Err(RitualError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn missing_theme_dir_falls_back_to_defaults() {
    let ritual = Ritual::builder()
        .theme_dir("tests/fixtures/does_not_exist")
        .build()
        .unwrap();
    assert_eq!(ritual.pool().len(), 15);
}

#[test]
fn pool_sharing_an_image_is_rejected() {
    let err = PromptPairPool::load_from_ron(Path::new("tests/fixtures/bad_pool.ron")).unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfiguration(_)));
}

#[test]
fn pool_smaller_than_a_session_is_rejected() {
    let pool = PromptPairPool::parse_ron(
        r#"(prompts: [(text: "Blue rain", images: ("umbrella_field.png", "drowned_piano.png"))])"#,
    )
    .unwrap();
    let result = Ritual::builder().with_pool(pool).build();
    assert!(matches!(
        result,
        Err(RitualError::Pool(PoolError::InvalidConfiguration(_)))
    ));
}

#[test]
fn pool_images_must_be_in_the_corpus() {
    let mut corpus = StaticCorpus::new();
    corpus.insert("umbrella_field.png", 1.5).unwrap();
    let result = Ritual::builder().with_corpus(corpus).build();
    assert!(matches!(
        result,
        Err(RitualError::Pool(PoolError::InvalidConfiguration(_)))
    ));
}

#[test]
fn bad_config_file_is_reported() {
    let err = RitualConfig::parse_ron("RitualConfig(rounds: 40)")
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn custom_store_is_used() {
    let ritual = Ritual::builder()
        .with_store(InMemorySessionStore::new())
        .seed(9)
        .build()
        .unwrap();
    let id = ritual.start_session().unwrap();
    assert!(ritual.store().get(id).is_some());
    assert_eq!(ritual.store().len(), 1);
    ritual.end_session(id);
    assert!(ritual.store().is_empty());
}
