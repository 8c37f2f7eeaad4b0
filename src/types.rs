use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SiteId(pub u64);

/// Identifier of one rupture occurrence in a stochastic event set.
/// Ordinals are assigned by the hazard side when the catalog is built and
/// stay stable for the whole calculation; loss tables key on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct EventId(pub u64);

/// Intensity measure type. Spectral acceleration periods are stored in
/// hundredths of a second (e.g. `Sa { period_cs: 30 }` is SA(0.30)) so the
/// type stays `Eq + Hash` and can key hazard lookup tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Imt {
    Pga,
    Pgv,
    Sa { period_cs: u32 },
}

impl fmt::Display for Imt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imt::Pga => write!(f, "PGA"),
            Imt::Pgv => write!(f, "PGV"),
            Imt::Sa { period_cs } => {
                write!(f, "SA({}.{:02})", period_cs / 100, period_cs % 100)
            }
        }
    }
}

/// The loss categories a portfolio can carry. Each asset declares a
/// replacement value per category; vulnerability functions are registered
/// per (taxonomy, loss type) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LossType {
    Structural,
    Nonstructural,
    Contents,
    BusinessInterruption,
    Occupants,
}

/// Width of the loss-type axis in fixed-shape tables and records.
pub const N_LOSS_TYPES: usize = LossType::ALL.len();

impl LossType {
    pub const ALL: [LossType; 5] = [
        LossType::Structural,
        LossType::Nonstructural,
        LossType::Contents,
        LossType::BusinessInterruption,
        LossType::Occupants,
    ];

    /// Column index in fixed-width loss records.
    pub fn index(self) -> usize {
        match self {
            LossType::Structural => 0,
            LossType::Nonstructural => 1,
            LossType::Contents => 2,
            LossType::BusinessInterruption => 3,
            LossType::Occupants => 4,
        }
    }

    /// Occupant losses are head counts, not currency; no deductible or
    /// limit applies to them, so the insured transform skips this type.
    pub fn insurable(self) -> bool {
        !matches!(self, LossType::Occupants)
    }
}

impl fmt::Display for LossType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LossType::Structural => "structural",
            LossType::Nonstructural => "nonstructural",
            LossType::Contents => "contents",
            LossType::BusinessInterruption => "business_interruption",
            LossType::Occupants => "occupants",
        };
        write!(f, "{label}")
    }
}

/// One sampled path through the hazard logic tree. Output tables are keyed
/// by the ordinal; the weight feeds the across-realization statistics and
/// the path string is carried through for reporting only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Realization {
    pub ordinal: usize,
    pub weight: f64,
    pub path: String,
}

impl Realization {
    pub fn new(ordinal: usize, weight: f64, path: impl Into<String>) -> Self {
        Realization {
            ordinal,
            weight,
            path: path.into(),
        }
    }
}
