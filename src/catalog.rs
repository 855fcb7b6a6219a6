//! Built-in default theme, compiled into the library so a ritual can run
//! without any files on disk.

use crate::core::composer::PoemError;
use crate::core::config::{ConfigError, RitualConfig};
use crate::core::pool::{PoolError, PromptPairPool, StaticCorpus};
use crate::core::rules::RuleTable;

pub const DEFAULT_THEME: &str = "default";

// ---------------------------------------------------------------------------
// Embedded theme data
// ---------------------------------------------------------------------------
pub const POOL: &str = include_str!("../ritual_data/default/pool.ron");
pub const CORPUS: &str = include_str!("../ritual_data/default/corpus.ron");
pub const RULES: &str = include_str!("../ritual_data/default/rules.ron");
pub const RITUAL: &str = include_str!("../ritual_data/default/ritual.ron");

pub fn default_pool() -> Result<PromptPairPool, PoolError> {
    PromptPairPool::parse_ron(POOL)
}

pub fn default_corpus() -> Result<StaticCorpus, PoolError> {
    StaticCorpus::parse_ron(CORPUS)
}

pub fn default_rules() -> Result<RuleTable, PoemError> {
    RuleTable::parse_ron(RULES)
}

pub fn default_config() -> Result<RitualConfig, ConfigError> {
    RitualConfig::parse_ron(RITUAL)
}
