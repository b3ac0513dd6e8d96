//! Sleep cycle - periodic maintenance over the memory store
//!
//! Four phases, modeled on memory consolidation during sleep:
//!
//! 1. **Sync**: admit incoming writes through the Write Guard and apply
//!    the resulting add/update/merge/skip decisions
//! 2. **Decay**: Ebbinghaus forgetting curve over every non-P0 memory,
//!    clocked from the most recent recall
//! 3. **Tidy**: archive transient memories whose vitality collapsed,
//!    clean orphan paths, prune snapshot history
//! 4. **Govern**: integrity sweep for orphan paths, dangling links, and
//!    empty memories
//!
//! Each phase runs inside a single transaction; a crash mid-phase leaves
//! the store in the pre-phase state. Phases are individually safe to
//! repeat and may be chained in any order by the caller.

mod phases;

pub use phases::{
    boot, decay, govern, run_all, sync, tidy, BootResult, DecayReport, GovernReport, SleepReport,
    SyncOutcome, SyncReport, TidyReport,
};

/// Vitality below this counts as "forgotten" in decay reports and makes
/// P3 memories eligible for archival.
pub const VITALITY_THRESHOLD: f64 = 0.05;

/// Per-memory snapshot cap enforced by the tidy phase.
pub const MAX_SNAPSHOTS_PER_MEMORY: i64 = 10;

/// Decay updates smaller than this are suppressed as noise.
pub const DECAY_NOISE: f64 = 0.001;

/// Access-strengthening growth factor used by boot (gentler than the
/// recall default).
pub const BOOT_GROWTH: f64 = 1.1;

/// URIs every boot tries to surface, before `system://boot` extras.
pub const DEFAULT_BOOT_URIS: &[&str] = &[
    "core://agent/identity",
    "core://agent/persona",
    "core://agent/instructions",
    "core://user/profile",
];

/// URI of the memory whose content lists additional boot URIs, one per
/// line.
pub const BOOT_MANIFEST_URI: &str = "system://boot";
