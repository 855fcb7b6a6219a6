/// Rules Linter — checks a theme directory can drive a complete ritual.
///
/// Usage: rules_linter <theme_dir> [--trials <n>]
///
/// Loads whichever of pool.ron, corpus.ron, rules.ron and ritual.ron the
/// directory holds, lints the rule table, then composes poems over random
/// prompt draws to report how often composition succeeds.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use reverie_engine::catalog;
use reverie_engine::core::composer::{PoemComposer, PROMPTS_PER_POEM};
use reverie_engine::core::config::RitualConfig;
use reverie_engine::core::pool::{PromptPairPool, StaticCorpus};
use reverie_engine::core::rules::{RuleTable, Sense};
use reverie_engine::schema::prompt::Prompt;
use std::path::Path;
use std::process;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: rules_linter <theme_dir> [--trials <n>]");
        process::exit(0);
    }

    let theme_dir = Path::new(&args[1]);
    let mut trials: u64 = 200;

    let mut i = 2;
    while i < args.len() {
        if args[i] == "--trials" && i + 1 < args.len() {
            i += 1;
            trials = args[i].parse().unwrap_or(200);
        }
        i += 1;
    }

    if !theme_dir.is_dir() {
        eprintln!("ERROR: '{}' is not a directory", theme_dir.display());
        process::exit(1);
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let rules = match load_or_default(theme_dir, "rules.ron", RuleTable::load_from_ron, catalog::default_rules) {
        Ok(rules) => rules,
        Err(e) => fail(&format!("Failed to load rules: {}", e)),
    };
    let config = match load_or_default(theme_dir, "ritual.ron", RitualConfig::load_from_ron, catalog::default_config) {
        Ok(config) => config,
        Err(e) => fail(&format!("Failed to load ritual config: {}", e)),
    };
    let pool = match load_or_default(theme_dir, "pool.ron", PromptPairPool::load_from_ron, catalog::default_pool) {
        Ok(pool) => pool,
        Err(e) => fail(&format!("Failed to load pool: {}", e)),
    };
    let corpus = match load_or_default(theme_dir, "corpus.ron", StaticCorpus::load_from_ron, catalog::default_corpus) {
        Ok(corpus) => corpus,
        Err(e) => fail(&format!("Failed to load corpus: {}", e)),
    };

    println!(
        "Loaded {} prompts, {} images, {} fillers, {} questions",
        pool.len(),
        corpus.len(),
        rules.fillers.len(),
        rules.questions.len()
    );
    for sense in Sense::ALL {
        let size = rules.senses.bank(sense).len();
        if size < 4 {
            warnings.push(format!("{sense} bank has only {size} phrases"));
        }
    }
    if rules.fillers.len() < config.poem.max_lines * 2 {
        warnings.push(format!(
            "{} fillers may run short for {}-line poems",
            rules.fillers.len(),
            config.poem.max_lines
        ));
    }

    errors.extend(rules.lint());
    if let Err(e) = pool.ensure_rounds(config.rounds) {
        errors.push(e.to_string());
    }
    if let Err(e) = pool.validate_against(&corpus) {
        errors.push(e.to_string());
    }

    if errors.is_empty() {
        match PoemComposer::new(rules, config.poem.clone()) {
            Ok(composer) => run_trials(&composer, pool.prompts(), trials, &mut warnings),
            Err(e) => errors.push(e.to_string()),
        }
    }

    println!("\n=== Rules Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if !errors.is_empty() {
        process::exit(1);
    }
}

fn load_or_default<T, E>(
    dir: &Path,
    name: &str,
    load: impl Fn(&Path) -> Result<T, E>,
    fallback: impl Fn() -> Result<T, E>,
) -> Result<T, E> {
    let path = dir.join(name);
    if path.exists() {
        load(&path)
    } else {
        println!("{} not found, using built-in '{}' theme", name, catalog::DEFAULT_THEME);
        fallback()
    }
}

fn run_trials(composer: &PoemComposer, prompts: &[Prompt], trials: u64, warnings: &mut Vec<String>) {
    if prompts.len() < PROMPTS_PER_POEM {
        warnings.push(format!("only {} prompts, skipping composition trials", prompts.len()));
        return;
    }
    let mut failures = 0;
    let mut total_lines = 0;
    for seed in 0..trials {
        let mut rng = StdRng::seed_from_u64(seed);
        let drawn: Vec<Prompt> = prompts
            .choose_multiple(&mut rng, PROMPTS_PER_POEM)
            .cloned()
            .collect();
        match composer.compose(&drawn, seed) {
            Ok(poem) => total_lines += poem.line_count(),
            Err(_) => failures += 1,
        }
    }
    let succeeded = trials - failures;
    println!(
        "Composed {}/{} poems, {:.1} lines on average",
        succeeded,
        trials,
        if succeeded > 0 { total_lines as f64 / succeeded as f64 } else { 0.0 }
    );
    if failures > 0 {
        warnings.push(format!("{} of {} compositions failed", failures, trials));
    }
}

fn fail(message: &str) -> ! {
    eprintln!("ERROR: {}", message);
    process::exit(1);
}
