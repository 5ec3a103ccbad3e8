//! The individual valuation models.

use crate::{compound, round2, round4, round6};
use rust_decimal::Decimal;
use tickflow_types::YearData;
use tracing::warn;

/// Default FCFF growth assumption when history is too short to estimate one.
const DEFAULT_FCFF_GROWTH: Decimal = Decimal::from_parts(5, 0, 0, false, 2); // 0.05
/// Conservative terminal growth for the DCF terminal value.
const TERMINAL_GROWTH: Decimal = Decimal::from_parts(3, 0, 0, false, 2); // 0.03
/// Per-period decay applied to projected abnormal earnings.
const RI_PERSISTENCE: Decimal = Decimal::from_parts(60, 0, 0, false, 2); // 0.60
/// Estimated growth bounds: [-50%, +100%].
const GROWTH_FLOOR: Decimal = Decimal::from_parts(5, 0, 0, true, 1); // -0.5
const GROWTH_CAP: Decimal = Decimal::ONE;

/// Dividend discount model (Gordon growth): `D0*(1+g) / (k-g)`.
///
/// Unavailable when any input is missing or `k <= g` (the model does not
/// converge).
pub fn ddm(data: &YearData) -> Option<Decimal> {
    let dividend = data.dividend_per_share?;
    let cost_of_equity = data.cost_of_equity?;
    let growth = data.dividend_growth_rate?;

    if cost_of_equity <= growth {
        warn!(
            %cost_of_equity,
            %growth,
            "cost of equity must exceed growth rate for DDM"
        );
        return None;
    }

    let next_dividend = dividend * (Decimal::ONE + growth);
    Some(round2(next_dividend / (cost_of_equity - growth)))
}

/// Discounted free cash flow.
///
/// Projects FCFF forward at the mean historical growth rate (clamped to
/// [-50%, +100%], 5% default with fewer than two history points), discounts
/// each period at WACC, and adds a Gordon terminal value at a fixed 3%
/// terminal growth. Unavailable when inputs are missing or `WACC <= 3%`.
pub fn dcf(history: &[&YearData], current: &YearData, projection_years: u32) -> Option<Decimal> {
    let free_cash_flow = current.free_cash_flow?;
    let wacc = current.wacc?;
    let shares = shares_decimal(current)?;

    let growth = average_fcff_growth(history);

    let mut pv_cash_flows = Decimal::ZERO;
    let mut last_fcff = free_cash_flow;
    for year in 1..=projection_years {
        let projected = last_fcff * (Decimal::ONE + growth);
        pv_cash_flows += round6(projected / compound(wacc, year));
        last_fcff = projected;
    }

    if wacc <= TERMINAL_GROWTH {
        warn!(%wacc, "WACC must exceed terminal growth rate for DCF");
        return None;
    }

    let terminal_fcff = last_fcff * (Decimal::ONE + TERMINAL_GROWTH);
    let terminal_value = round2(terminal_fcff / (wacc - TERMINAL_GROWTH));
    let pv_terminal = round2(terminal_value / compound(wacc, projection_years));

    let enterprise_value = pv_cash_flows + pv_terminal;
    Some(round2(enterprise_value / shares))
}

/// Mean period-over-period FCFF growth across consecutive history pairs with
/// a positive prior value.
fn average_fcff_growth(history: &[&YearData]) -> Decimal {
    if history.len() < 2 {
        return DEFAULT_FCFF_GROWTH;
    }

    let mut total = Decimal::ZERO;
    let mut valid_periods = 0u32;
    for pair in history.windows(2) {
        if let (Some(previous), Some(current)) = (pair[0].free_cash_flow, pair[1].free_cash_flow) {
            if previous > Decimal::ZERO {
                total += round4((current - previous) / previous);
                valid_periods += 1;
            }
        }
    }

    if valid_periods == 0 {
        return DEFAULT_FCFF_GROWTH;
    }

    let average = round4(total / Decimal::from(valid_periods));
    if average > GROWTH_CAP {
        warn!(%average, "capping extreme FCFF growth estimate at +100%");
        GROWTH_CAP
    } else if average < GROWTH_FLOOR {
        warn!(%average, "capping extreme FCFF growth estimate at -50%");
        GROWTH_FLOOR
    } else {
        average
    }
}

/// Residual income (Ohlson). Abnormal earnings against the prior period's
/// tangible book value decay at a fixed persistence factor and are discounted
/// at the cost of equity.
pub fn ri(current: &YearData, previous: Option<&YearData>, projection_years: u32) -> Option<Decimal> {
    let net_income = current.net_income?;
    let total_equity = current.total_equity?;
    let intangibles = current.intangibles?;
    let cost_of_equity = current.cost_of_equity?;
    let shares = shares_decimal(current)?;

    let current_book_value = total_equity - intangibles;

    // Prior tangible book value; the current one stands in when there is no
    // prior period.
    let previous_book_value = previous
        .and_then(|prior| Some(prior.total_equity? - prior.intangibles?))
        .unwrap_or(current_book_value);

    let capital_charge = previous_book_value * cost_of_equity;
    let abnormal_earnings = net_income - capital_charge;

    let mut pv_abnormal = Decimal::ZERO;
    let mut last_ae = abnormal_earnings;
    for year in 1..=projection_years {
        let projected = last_ae * RI_PERSISTENCE;
        pv_abnormal += round2(projected / compound(cost_of_equity, year));
        last_ae = projected;
    }

    let equity_value = current_book_value + pv_abnormal;
    Some(round2(equity_value / shares))
}

/// Price / earnings per share.
pub fn pe(data: &YearData) -> Option<Decimal> {
    relative_multiple(data, data.net_income?, "EPS")
}

/// Price / tangible book value per share.
pub fn pbv(data: &YearData) -> Option<Decimal> {
    let tangible_book = data.total_equity? - data.intangibles?;
    relative_multiple(data, tangible_book, "book value per share")
}

/// Price / operating cash flow per share.
pub fn pcf(data: &YearData) -> Option<Decimal> {
    relative_multiple(data, data.operating_cash_flow?, "cash flow per share")
}

/// Price / revenue per share.
pub fn ps(data: &YearData) -> Option<Decimal> {
    relative_multiple(data, data.revenue?, "sales per share")
}

fn relative_multiple(data: &YearData, numerator: Decimal, metric: &str) -> Option<Decimal> {
    let shares = shares_decimal(data)?;
    let price = data.price_end_year?;

    let per_share = round4(numerator / shares);
    if per_share <= Decimal::ZERO {
        warn!(metric, %per_share, "per-share denominator is zero or negative");
        return None;
    }

    Some(round2(price / per_share))
}

/// Median of the available estimates; the mean of the two middle values on an
/// even count. Unavailable on an empty set.
pub fn composite_fair_value(estimates: &[Decimal]) -> Option<Decimal> {
    if estimates.is_empty() {
        return None;
    }

    let mut sorted = estimates.to_vec();
    sorted.sort();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some(round2((sorted[mid - 1] + sorted[mid]) / Decimal::TWO))
    } else {
        Some(sorted[mid])
    }
}

fn shares_decimal(data: &YearData) -> Option<Decimal> {
    let shares = data.shares_outstanding?;
    if shares == 0 {
        return None;
    }
    Some(Decimal::from(shares))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn year(build: impl FnOnce(&mut YearData)) -> YearData {
        let mut data = YearData::default();
        build(&mut data);
        data
    }

    #[test]
    fn ddm_gordon_growth_value() {
        let data = year(|d| {
            d.dividend_per_share = Some(dec!(1.00));
            d.cost_of_equity = Some(dec!(0.10));
            d.dividend_growth_rate = Some(dec!(0.03));
        });
        // 1.03 / 0.07
        assert_eq!(ddm(&data), Some(dec!(14.71)));
    }

    #[test]
    fn ddm_unavailable_when_model_does_not_converge() {
        let data = year(|d| {
            d.dividend_per_share = Some(dec!(1.00));
            d.cost_of_equity = Some(dec!(0.08));
            d.dividend_growth_rate = Some(dec!(0.08));
        });
        assert_eq!(ddm(&data), None);
    }

    #[test]
    fn ddm_unavailable_on_missing_inputs() {
        let data = year(|d| {
            d.dividend_per_share = Some(dec!(1.00));
            d.cost_of_equity = Some(dec!(0.10));
        });
        assert_eq!(ddm(&data), None);
    }

    #[test]
    fn dcf_flat_history_projects_at_zero_growth() {
        let history: Vec<YearData> = (0..3)
            .map(|_| year(|d| d.free_cash_flow = Some(dec!(100))))
            .collect();
        let refs: Vec<&YearData> = history.iter().collect();
        let current = year(|d| {
            d.free_cash_flow = Some(dec!(100));
            d.wacc = Some(dec!(0.10));
            d.shares_outstanding = Some(100);
        });

        // Five flat 100s discounted at 10% plus the discounted terminal value
        // (103 / 0.07 at year five), over 100 shares.
        assert_eq!(dcf(&refs, &current, 5), Some(dec!(12.93)));
    }

    #[test]
    fn dcf_unavailable_when_wacc_at_or_below_terminal_growth() {
        let current = year(|d| {
            d.free_cash_flow = Some(dec!(100));
            d.wacc = Some(dec!(0.03));
            d.shares_outstanding = Some(100);
        });
        assert_eq!(dcf(&[], &current, 5), None);
    }

    #[test]
    fn growth_estimate_defaults_and_clamps() {
        assert_eq!(average_fcff_growth(&[]), dec!(0.05));

        let short = [year(|d| d.free_cash_flow = Some(dec!(100)))];
        let refs: Vec<&YearData> = short.iter().collect();
        assert_eq!(average_fcff_growth(&refs), dec!(0.05));

        // 100 -> 300 is +200%, clamped to +100%.
        let explosive = [
            year(|d| d.free_cash_flow = Some(dec!(100))),
            year(|d| d.free_cash_flow = Some(dec!(300))),
        ];
        let refs: Vec<&YearData> = explosive.iter().collect();
        assert_eq!(average_fcff_growth(&refs), dec!(1.0));

        // Non-positive prior periods are skipped entirely.
        let negative_prior = [
            year(|d| d.free_cash_flow = Some(dec!(-10))),
            year(|d| d.free_cash_flow = Some(dec!(100))),
        ];
        let refs: Vec<&YearData> = negative_prior.iter().collect();
        assert_eq!(average_fcff_growth(&refs), dec!(0.05));
    }

    #[test]
    fn ri_with_prior_tangible_book_value() {
        let previous = year(|d| {
            d.total_equity = Some(dec!(1050));
            d.intangibles = Some(dec!(50));
        });
        let current = year(|d| {
            d.net_income = Some(dec!(120));
            d.total_equity = Some(dec!(1100));
            d.intangibles = Some(dec!(100));
            d.cost_of_equity = Some(dec!(0.10));
            d.shares_outstanding = Some(100);
        });

        // Abnormal earnings 20, decayed at 60% and discounted at 10% over
        // five periods, on a tangible book of 1000.
        assert_eq!(ri(&current, Some(&previous), 5), Some(dec!(10.23)));
    }

    #[test]
    fn ri_uses_current_book_value_without_prior_period() {
        let current = year(|d| {
            d.net_income = Some(dec!(120));
            d.total_equity = Some(dec!(1100));
            d.intangibles = Some(dec!(100));
            d.cost_of_equity = Some(dec!(0.10));
            d.shares_outstanding = Some(100);
        });
        // Same as above: the proxy prior book value is also 1000.
        assert_eq!(ri(&current, None, 5), Some(dec!(10.23)));
    }

    #[test]
    fn pe_value_and_zero_eps_unavailability() {
        let data = year(|d| {
            d.net_income = Some(dec!(100));
            d.shares_outstanding = Some(100);
            d.price_end_year = Some(dec!(20));
        });
        assert_eq!(pe(&data), Some(dec!(20.00)));

        let zero_eps = year(|d| {
            d.net_income = Some(dec!(0));
            d.shares_outstanding = Some(100);
            d.price_end_year = Some(dec!(20));
        });
        assert_eq!(pe(&zero_eps), None);
    }

    #[test]
    fn pbv_uses_tangible_book_value() {
        let data = year(|d| {
            d.total_equity = Some(dec!(1100));
            d.intangibles = Some(dec!(100));
            d.shares_outstanding = Some(100);
            d.price_end_year = Some(dec!(20));
        });
        // Tangible BVPS = 10.0000, P/BV = 2.00
        assert_eq!(pbv(&data), Some(dec!(2.00)));
    }

    #[test]
    fn one_failing_multiple_does_not_abort_the_others() {
        let data = year(|d| {
            d.net_income = Some(dec!(0)); // PE unavailable
            d.revenue = Some(dec!(500));
            d.shares_outstanding = Some(100);
            d.price_end_year = Some(dec!(20));
        });
        assert_eq!(pe(&data), None);
        assert_eq!(ps(&data), Some(dec!(4.00)));
    }

    #[test]
    fn composite_median_odd_and_even() {
        assert_eq!(
            composite_fair_value(&[dec!(10.00), dec!(12.00), dec!(14.00)]),
            Some(dec!(12.00))
        );
        assert_eq!(
            composite_fair_value(&[dec!(10.00), dec!(12.00)]),
            Some(dec!(11.00))
        );
        assert_eq!(composite_fair_value(&[]), None);
    }
}
