//! Compiler options.

use bon::bon;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Number of shards of the target.
    pub shards: u32,
    pub tiles_per_shard: usize,
    /// Do not create host streams; inputs keep whatever the device holds.
    pub synthetic_data: bool,
    /// Module default for stochastic rounding.
    pub stochastic_rounding: bool,
    /// Keep single-tile constants as they are instead of spreading them out.
    pub no_constant_expansion: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[bon]
impl CompilerOptions {
    #[builder]
    pub fn builder(
        #[builder(default = 1)] shards: u32,
        #[builder(default = 4)] tiles_per_shard: usize,
        #[builder(default = false)] synthetic_data: bool,
        #[builder(default = false)] stochastic_rounding: bool,
        #[builder(default = false)] no_constant_expansion: bool,
    ) -> Self {
        Self { shards, tiles_per_shard, synthetic_data, stochastic_rounding, no_constant_expansion }
    }

    /// Create options from `STRATA_*` environment variables.
    pub fn from_env() -> Self {
        let shards = std::env::var("STRATA_SHARDS").ok().and_then(|s| s.parse().ok()).unwrap_or(1);
        let tiles_per_shard = std::env::var("STRATA_TILES_PER_SHARD").ok().and_then(|s| s.parse().ok()).unwrap_or(4);
        let synthetic_data = std::env::var("STRATA_SYNTHETIC_DATA").is_ok();
        let stochastic_rounding = std::env::var("STRATA_STOCHASTIC_ROUNDING").is_ok();
        let no_constant_expansion = std::env::var("STRATA_NO_CONSTANT_EXPANSION").is_ok();

        Self::builder()
            .shards(shards)
            .tiles_per_shard(tiles_per_shard)
            .synthetic_data(synthetic_data)
            .stochastic_rounding(stochastic_rounding)
            .no_constant_expansion(no_constant_expansion)
            .build()
    }
}
