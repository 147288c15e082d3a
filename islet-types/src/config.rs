//! World configuration: freeze thresholds, the sleep table, and parallel
//! dispatch knobs.
//!
//! The compile-time tuning constants of the dynamics core live in [`consts`];
//! the runtime-tunable pieces live in [`WorldConfig`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Compile-time tuning constants of the dynamics update.
pub mod consts {
    /// Extra solver rows reserved per contact that opted into continuous
    /// collision, covering probe-discovered contact points.
    pub const CCD_EXTRA_CONTACT_COUNT: usize = 24;

    /// Minimum row budget of an island flagged as continuous-collision.
    pub const CCD_MIN_CLUSTER_ROWS: usize = 64;

    /// Maximum candidate contacts requested from a continuous-collision probe.
    pub const CCD_MAX_PROBE_CONTACTS: usize = 6;

    /// Scale applied to the smaller of the two shape bounding radii to get
    /// the per-contact travel budget of the CCD predicate.
    pub const CCD_MIN_RADIUS_SCALE: f64 = 0.25;

    /// Squared relative angular rate above which a contact is probed for
    /// continuous collision regardless of linear travel.
    pub const CCD_OMEGA_MAG2_THRESHOLD: f64 = 1.0;

    /// Joint count above which a single island is worth solving with
    /// intra-island parallelism.
    pub const PARALLEL_JOINT_COUNT_CUT_OFF: usize = 256;

    /// Islands at or below this joint count get a 20x tighter acceleration
    /// freeze threshold, so small stacks do not pop asleep prematurely.
    pub const SMALL_ISLAND_COUNT: usize = 32;

    /// Number of rows in the sleep table.
    pub const SLEEP_ENTRIES: usize = 8;

    /// Step-epoch advance per tick. Two marks per step lets the builder
    /// distinguish "seen" (mark - 1) from "claimed" (mark).
    pub const BODY_EPOCH_STEP: u32 = 2;

    /// Strong velocity drag applied to 1-2 body islands that are not in
    /// equilibrium.
    pub const FREEZING_VELOCITY_DRAG: f64 = 0.9;

    /// Mild velocity drag applied to bodies that reached equilibrium.
    pub const EQUILIBRIUM_VELOCITY_DRAG: f64 = 0.9999;

    /// Squared velocity below which a dragged component is clamped to zero.
    pub const VELOC_TOL_SQUARED: f64 = 1.0e-8;

    /// SIMD lane count; solver row counts are rounded up to this block.
    pub const ROW_BLOCK: usize = 4;

    /// Positive-semidefinite damping tolerance used when converting joint
    /// stiffness into a row regularizer.
    pub const PSD_DAMP_TOL: f64 = 1.0e-2;

    /// Smallest row regularizer; keeps the solver matrix invertible.
    pub const MIN_ROW_STIFFNESS: f64 = 1.0e-5;

    /// Default lower friction bound of a solver row.
    pub const MIN_BOUND: f64 = -1.0e20;

    /// Default upper friction bound of a solver row.
    pub const MAX_BOUND: f64 = 1.0e20;

    /// Upper bound on the rows a single joint may contribute.
    pub const CONSTRAINT_MAX_ROWS: usize = 64;

    /// Reference rate (Hz) converting sleep counters into table steps.
    pub const SLEEP_STEP_RATE: f64 = 60.0;
}

/// One row of the sleep table: motion ceilings (squared magnitudes) paired
/// with the quiet-step count that unlocks them.
///
/// Rows are monotone: later rows allow more residual motion but demand a
/// longer quiet streak before an island may retire.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SleepEntry {
    /// Squared linear acceleration ceiling.
    pub max_accel: f64,
    /// Squared angular acceleration ceiling.
    pub max_alpha: f64,
    /// Squared linear velocity ceiling.
    pub max_veloc: f64,
    /// Squared angular velocity ceiling.
    pub max_omega: f64,
    /// Time-scaled quiet steps required before this row applies.
    pub steps: u32,
}

impl SleepEntry {
    /// Create a sleep-table row.
    #[must_use]
    pub const fn new(max_accel: f64, max_alpha: f64, max_veloc: f64, max_omega: f64, steps: u32) -> Self {
        Self {
            max_accel,
            max_alpha,
            max_veloc,
            max_omega,
            steps,
        }
    }

    /// True when every island maximum is strictly below this row's ceilings.
    #[must_use]
    pub fn admits(&self, max_accel: f64, max_alpha: f64, max_veloc: f64, max_omega: f64) -> bool {
        max_accel < self.max_accel
            && max_alpha < self.max_alpha
            && max_veloc < self.max_veloc
            && max_omega < self.max_omega
    }

    /// True when any island maximum exceeds this row's ceilings.
    #[must_use]
    pub fn exceeded_by(&self, max_accel: f64, max_alpha: f64, max_veloc: f64, max_omega: f64) -> bool {
        max_accel > self.max_accel
            || max_alpha > self.max_alpha
            || max_veloc > self.max_veloc
            || max_omega > self.max_omega
    }
}

/// Default sleep table: ceilings double-ish per row while the required quiet
/// streak doubles. The last row doubles as the outer gate - exceeding it
/// resets every sleep counter in the island.
pub const DEFAULT_SLEEP_TABLE: [SleepEntry; consts::SLEEP_ENTRIES] = [
    SleepEntry::new(1.0e-4, 1.0e-4, 1.0e-6, 1.0e-6, 1),
    SleepEntry::new(2.0e-4, 2.0e-4, 4.0e-6, 4.0e-6, 8),
    SleepEntry::new(4.0e-4, 4.0e-4, 1.6e-5, 1.6e-5, 16),
    SleepEntry::new(8.0e-4, 8.0e-4, 6.4e-5, 6.4e-5, 32),
    SleepEntry::new(1.6e-3, 1.6e-3, 2.56e-4, 2.56e-4, 64),
    SleepEntry::new(3.2e-3, 3.2e-3, 1.0e-3, 1.0e-3, 128),
    SleepEntry::new(6.4e-3, 6.4e-3, 4.0e-3, 4.0e-3, 256),
    SleepEntry::new(1.28e-2, 1.28e-2, 1.6e-2, 1.6e-2, 512),
];

/// Parallel dispatch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParallelDynamicsConfig {
    /// Enable intra-island parallel solving for the largest islands.
    ///
    /// Islands-across-threads dispatch is always available; this knob only
    /// gates promoting a single huge island to a parallel solve of its own.
    pub enabled: bool,

    /// Worker count for island dispatch. `0` means use the rayon pool size.
    pub worker_threads: usize,
}

impl Default for ParallelDynamicsConfig {
    fn default() -> Self {
        Self {
            // Intra-island solving reorders force accumulation, which can
            // differ in the last bits from the sequential solve. Opt in.
            enabled: false,
            worker_threads: 0,
        }
    }
}

impl ParallelDynamicsConfig {
    /// Fully sequential dispatch: one worker, no promotion.
    #[must_use]
    pub const fn sequential() -> Self {
        Self {
            enabled: false,
            worker_threads: 1,
        }
    }

    /// Promotion enabled with an explicit worker count.
    #[must_use]
    pub const fn with_workers(workers: usize) -> Self {
        Self {
            enabled: true,
            worker_threads: workers,
        }
    }
}

/// Configuration of a dynamics world.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldConfig {
    /// Squared acceleration below which a body counts as kinematically
    /// still. Scaled down 20x for small islands.
    pub freeze_accel2: f64,
    /// Squared velocity below which a body counts as kinematically still.
    pub freeze_speed2: f64,
    /// The sleep table; see [`SleepEntry`].
    pub sleep_table: [SleepEntry; consts::SLEEP_ENTRIES],
    /// Parallel dispatch knobs.
    pub parallel: ParallelDynamicsConfig,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            freeze_accel2: 1.0e-2,
            freeze_speed2: 3.0e-4,
            sleep_table: DEFAULT_SLEEP_TABLE,
            parallel: ParallelDynamicsConfig::default(),
        }
    }
}

impl WorldConfig {
    /// Configuration with parallel promotion enabled for `workers` threads.
    #[must_use]
    pub fn parallel(workers: usize) -> Self {
        Self {
            parallel: ParallelDynamicsConfig::with_workers(workers),
            ..Default::default()
        }
    }

    /// Validate threshold positivity and sleep-table monotonicity.
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.freeze_accel2 > 0.0 && self.freeze_accel2.is_finite()) {
            return Err(crate::DynamicsError::invalid_config(
                "freeze_accel2 must be positive and finite",
            ));
        }
        if !(self.freeze_speed2 > 0.0 && self.freeze_speed2.is_finite()) {
            return Err(crate::DynamicsError::invalid_config(
                "freeze_speed2 must be positive and finite",
            ));
        }

        for pair in self.sleep_table.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.steps <= a.steps {
                return Err(crate::DynamicsError::invalid_config(
                    "sleep table steps must be strictly increasing",
                ));
            }
            if b.max_accel < a.max_accel
                || b.max_alpha < a.max_alpha
                || b.max_veloc < a.max_veloc
                || b.max_omega < a.max_omega
            {
                return Err(crate::DynamicsError::invalid_config(
                    "sleep table ceilings must be non-decreasing",
                ));
            }
        }

        Ok(())
    }
}
