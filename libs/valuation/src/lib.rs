//! Valuation engine.
//!
//! Pure functions over one fiscal year of fundamental data, optional prior
//! years, and pre-resolved sector multiples. No I/O and no shared state, so
//! the engine is safe to run concurrently for different securities; callers
//! serialize per-security updates themselves.
//!
//! Every model degrades independently: missing inputs or a non-convergent
//! parameterization make that one estimate unavailable (`None`) and never
//! abort the others. Final figures are rounded to 2 decimal places half-up,
//! intermediate per-share figures to 4.

use rust_decimal::{Decimal, RoundingStrategy};
use tickflow_types::YearData;
use tracing::warn;

mod models;

pub use models::{composite_fair_value, dcf, ddm, pbv, pcf, pe, ps, ri};

/// Sector multiples resolved by the caller (sector averages with configured
/// defaults filled in). The engine only checks that any are present before
/// running the relative models; it never resolves fallbacks itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndustryMultiples {
    pub pe: Option<Decimal>,
    pub pb: Option<Decimal>,
    pub pcf: Option<Decimal>,
    pub ps: Option<Decimal>,
}

impl IndustryMultiples {
    pub fn is_empty(&self) -> bool {
        self.pe.is_none() && self.pb.is_none() && self.pcf.is_none() && self.ps.is_none()
    }
}

/// The derived valuation block for one year, produced as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValuationOutputs {
    pub ddm: Option<Decimal>,
    pub dcf: Option<Decimal>,
    pub ri: Option<Decimal>,
    pub pe: Option<Decimal>,
    pub pbv: Option<Decimal>,
    pub pcf: Option<Decimal>,
    pub ps: Option<Decimal>,
    pub composite: Option<Decimal>,
}

impl ValuationOutputs {
    /// Overwrite the derived block of `target` in full.
    pub fn apply_to(&self, target: &mut YearData) {
        target.ddm = self.ddm;
        target.dcf = self.dcf;
        target.ri = self.ri;
        target.pe = self.pe;
        target.pbv = self.pbv;
        target.pcf = self.pcf;
        target.ps = self.ps;
        target.composite = self.composite;
    }

    fn estimates(&self) -> Vec<Decimal> {
        [
            self.ddm, self.dcf, self.ri, self.pe, self.pbv, self.pcf, self.ps,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Run every model for `current` and combine the available estimates.
///
/// `history` is all strictly earlier years, ascending; `previous` is the
/// latest of those. Relative models are skipped entirely when the caller
/// supplies no multiples at all.
pub fn calculate_all(
    current: &YearData,
    previous: Option<&YearData>,
    history: &[&YearData],
    multiples: &IndustryMultiples,
    projection_years: u32,
) -> ValuationOutputs {
    let mut outputs = ValuationOutputs {
        ddm: ddm(current),
        dcf: dcf(history, current, projection_years),
        ri: ri(current, previous, projection_years),
        ..Default::default()
    };

    if multiples.is_empty() {
        warn!("no industry multiples available, skipping relative valuation");
    } else {
        outputs.pe = pe(current);
        outputs.pbv = pbv(current);
        outputs.pcf = pcf(current);
        outputs.ps = ps(current);
    }

    outputs.composite = composite_fair_value(&outputs.estimates());
    outputs
}

pub(crate) fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub(crate) fn round4(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

pub(crate) fn round6(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero)
}

/// (1 + rate)^periods without pulling in the maths feature.
pub(crate) fn compound(rate: Decimal, periods: u32) -> Decimal {
    let base = Decimal::ONE + rate;
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor *= base;
    }
    factor
}
