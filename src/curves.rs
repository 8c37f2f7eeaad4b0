//! Loss exceedance curves built from per-event losses.
//!
//! The pipeline bins a sample of event losses into an evenly spaced range,
//! counts exceedances per bin edge, divides by the stochastic catalog
//! duration to get annual rates, and converts rates to probabilities of
//! exceedance over the investigation window under a Poisson occurrence
//! assumption. Curve abscissae are bin midpoints, not edges.

use serde::Serialize;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CurveError {
    /// Stochastic event-set duration must be strictly positive.
    InvalidTses(f64),
}

impl fmt::Display for CurveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveError::InvalidTses(v) => {
                write!(f, "tses must be strictly positive, got {v}")
            }
        }
    }
}

impl Error for CurveError {}

/// A loss exceedance curve.
///
/// `losses` ascend and `poes` are non-increasing, from near 1 at small
/// losses down to near 0 at the largest observed loss. Losses are absolute
/// monetary amounts or ratios depending on what was fed in; the curve
/// itself does not care.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossCurve {
    pub losses: Vec<f64>,
    pub poes: Vec<f64>,
    pub average_loss: f64,
}

impl LossCurve {
    /// Build a curve from raw per-event losses.
    ///
    /// `tses` is the total stochastic event-set duration in years,
    /// `time_span` the investigation window in years.
    pub fn build(
        event_losses: &[f64],
        tses: f64,
        time_span: f64,
        curve_resolution: usize,
    ) -> Result<Self, CurveError> {
        let (losses, poes) = event_based(event_losses, tses, time_span, curve_resolution)?;
        let average_loss = average_loss(&losses, &poes);
        Ok(LossCurve {
            losses,
            poes,
            average_loss,
        })
    }

    /// A curve with no support; conditional lookups on it return 0.
    pub fn empty() -> Self {
        LossCurve {
            losses: Vec::new(),
            poes: Vec::new(),
            average_loss: 0.0,
        }
    }

    /// Loss value whose probability of exceedance equals `probability`.
    pub fn conditional_loss(&self, probability: f64) -> f64 {
        conditional_loss_ratio(&self.losses, &self.poes, probability)
    }
}

/// Turn per-event losses into a loss exceedance curve of `curve_resolution`
/// points.
///
/// An empty sample, or one with no positive loss, yields a flat curve of
/// `curve_resolution` zero bins rather than an error: a rupture catalog
/// that produced no damage is a legitimate outcome. Zero losses are
/// excluded from the first bin's exceedance count; they stand for events
/// whose ground motion never reached the asset.
pub fn event_based(
    losses: &[f64],
    tses: f64,
    time_span: f64,
    curve_resolution: usize,
) -> Result<(Vec<f64>, Vec<f64>), CurveError> {
    if tses <= 0.0 {
        return Err(CurveError::InvalidTses(tses));
    }
    let max = losses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= 0.0 {
        // covers the empty sample as well
        return Ok((vec![0.0; curve_resolution], vec![0.0; curve_resolution]));
    }
    let mut sorted = losses.to_vec();
    sorted.sort_unstable_by(f64::total_cmp);

    let edges = linspace(sorted[0], max, curve_resolution + 1);
    let counts = cumulative_counts(&sorted, &edges);
    let rates = rates_of_exceedance(&counts, tses)?;
    let poes = probs_of_exceedance(&rates, time_span);
    Ok((midpoints(&edges), poes))
}

/// Discrete integral of a loss curve: trapezoids between consecutive bins
/// plus a triangular correction from zero loss up to the first bin.
pub fn average_loss(losses: &[f64], poes: &[f64]) -> f64 {
    assert_eq!(
        losses.len(),
        poes.len(),
        "curve with {} losses but {} poes",
        losses.len(),
        poes.len(),
    );
    if losses.is_empty() {
        return 0.0;
    }
    let mut total = losses[0] * poes[0] / 2.0;
    for (l, p) in losses.windows(2).zip(poes.windows(2)) {
        total += (l[1] - l[0]) * (p[0] + p[1]) / 2.0;
    }
    total
}

/// Inverse-interpolate a curve: the loss whose probability of exceedance
/// equals `probability`.
///
/// A probability rarer than anything on the curve clamps to the largest
/// documented loss; one more frequent than the curve's top returns 0.
/// Tied probability levels collapse to the largest loss at that level
/// before interpolating, so flat stretches of the curve do not produce a
/// zero-width bracket. Expects `poes` non-increasing along ascending
/// `losses`.
pub fn conditional_loss_ratio(losses: &[f64], poes: &[f64], probability: f64) -> f64 {
    if losses.is_empty() {
        return 0.0;
    }
    let mut pairs: Vec<(f64, f64)> = Vec::with_capacity(losses.len());
    for (&loss, &poe) in losses.iter().zip(poes) {
        if let Some(last) = pairs.last_mut()
            && last.0 == poe
        {
            // later entry carries the larger loss
            last.1 = loss;
        } else {
            pairs.push((poe, loss));
        }
    }
    let (min_poe, max_loss) = pairs[pairs.len() - 1];
    let (max_poe, _) = pairs[0];
    if probability < min_poe {
        return max_loss;
    }
    if probability > max_poe {
        return 0.0;
    }

    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let idx = pairs.partition_point(|&(p, _)| p < probability);
    if idx == 0 {
        return pairs[0].1;
    }
    let (p0, l0) = pairs[idx - 1];
    let (p1, l1) = pairs[idx];
    l0 + (probability - p0) / (p1 - p0) * (l1 - l0)
}

/// Conditional losses for a batch of probabilities over a batch of curves,
/// shaped (probabilities x curves).
pub fn loss_map_matrix(poes: &[f64], curves: &[LossCurve]) -> Vec<Vec<f64>> {
    poes.iter()
        .map(|&p| curves.iter().map(|c| c.conditional_loss(p)).collect())
        .collect()
}

/// `n` evenly spaced values from `lo` to `hi` inclusive.
fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![lo; n];
    }
    let step = (hi - lo) / (n - 1) as f64;
    (0..n)
        .map(|i| if i == n - 1 { hi } else { lo + step * i as f64 })
        .collect()
}

/// Reverse cumulative histogram: for each bin edge but the last, how many
/// losses reach it. Zero and negative losses never count, even at the
/// bottom edge. `sorted` must be ascending.
fn cumulative_counts(sorted: &[f64], edges: &[f64]) -> Vec<f64> {
    let n = sorted.len();
    let zeros = sorted.partition_point(|&v| v <= 0.0);
    let mut counts: Vec<f64> = edges[..edges.len().saturating_sub(1)]
        .iter()
        .map(|&edge| (n - sorted.partition_point(|&v| v < edge)) as f64)
        .collect();
    if let Some(first) = counts.first_mut() {
        *first -= zeros as f64;
    }
    counts
}

fn rates_of_exceedance(counts: &[f64], tses: f64) -> Result<Vec<f64>, CurveError> {
    if tses <= 0.0 {
        return Err(CurveError::InvalidTses(tses));
    }
    Ok(counts.iter().map(|&c| c / tses).collect())
}

fn probs_of_exceedance(rates: &[f64], time_span: f64) -> Vec<f64> {
    rates
        .iter()
        .map(|&r| 1.0 - (-r * time_span).exp())
        .collect()
}

fn midpoints(edges: &[f64]) -> Vec<f64> {
    edges.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Imt;
    use crate::vulnerability::VulnerabilityFunction;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual} (tol {tol})"
        );
    }

    // Reference data computed by hand for a 216-event ground motion field
    // run through a mean-based vulnerability function.
    const EVENT_RATIOS: [f64; 216] = [
        0.0605584, 0.273100266666667, 0.095856, 0.0184384, 0.270366933333333,
        0.0, 0.025248, 0.0795669333333333, 0.0529024, 0.0,
        0.0154928, 0.0022208, 0.0109232, 0.0, 0.0,
        0.0, 0.0175088, 0.0230517333333333, 0.0030048, 0.0,
        0.0475973333333333, 0.0, 0.007944, 0.0021312, 0.0,
        0.0172848, 0.0090864, 0.0365850666666667, 0.0, 0.0,
        0.0238096, 0.0, 0.0, 0.0, 0.0,
        0.0078208, 0.0115952, 0.0, 0.0, 0.0,
        0.0, 0.0619504, 0.0, 0.0118976, 0.0329968,
        0.0, 0.002456, 0.0, 0.0, 0.0,
        0.0, 0.0114608, 0.002176, 0.0131856, 0.0,
        0.0, 0.18608, 0.0, 0.004136, 0.019648,
        0.104992, 0.0, 0.0, 0.0049872, 0.0,
        0.0, 0.0, 0.0061296, 0.0, 0.0450453333333333,
        0.0143728, 0.0, 0.0054688, 0.0, 0.0,
        0.0, 0.0083808, 0.0, 0.0020192, 0.0,
        0.0112816, 0.0110128, 0.106928, 0.0, 0.0,
        0.0113376, 0.0, 0.011808, 0.0, 0.427215466666667,
        0.0036656, 0.0, 0.161776, 0.0212384, 0.0107216,
        0.0, 0.0039232, 0.0, 0.0697610666666667, 0.0,
        0.009064, 0.0, 0.0, 0.0455712, 0.0,
        0.005088, 0.0027808, 0.0136896, 0.0, 0.0,
        0.0118752, 0.0, 0.092528, 0.045896, 0.006768,
        0.0, 0.0, 0.0043824, 0.0, 0.0232218666666667,
        0.0, 0.0053008, 0.0, 0.0, 0.0,
        0.0, 0.0095344, 0.0, 0.0, 0.0268101333333333,
        0.0369098666666667, 0.0, 0.0012576, 0.0, 0.0,
        0.0, 0.0, 0.0, 0.0, 0.290899733333333,
        0.0, 0.0, 0.0, 0.0, 0.0348064,
        0.0279392, 0.00296, 0.0171504, 0.014776, 0.0,
        0.0087056, 0.0062752, 0.0, 0.0052224, 0.0029376,
        0.0, 0.0, 0.0, 0.0259749333333333, 0.0101504,
        0.0032624, 0.0, 0.0080448, 0.0, 0.0216528,
        0.0, 0.0, 0.0, 0.0578208, 0.093984,
        0.0, 0.0345898666666667, 0.0106544, 0.0031392, 0.0,
        0.0, 0.0016496, 0.0238405333333333, 0.0, 0.0238714666666667,
        0.0189648, 0.016232, 0.0, 0.0, 0.0293466666666667,
        0.0142608, 0.0, 0.0017952, 0.0119984, 0.0,
        0.0, 0.0, 0.0, 0.0501648, 0.0020976,
        0.005032, 0.001504, 0.0, 0.146192, 0.0,
        0.0032512, 0.0, 0.0, 0.0344970666666667, 0.0,
        0.0, 0.0087952, 0.0146976, 0.0030608, 0.0,
        0.0, 0.0015824, 0.08104, 0.0, 0.003072,
        0.0199728,
    ];

    const CUM_HISTOGRAM: [f64; 24] = [
        112.0, 46.0, 26.0, 18.0, 14.0, 12.0, 8.0, 7.0,
        7.0, 6.0, 5.0, 4.0, 4.0, 4.0, 4.0, 4.0,
        2.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0,
    ];

    const EXPECTED_RATES: [f64; 24] = [
        0.12444444, 0.05111111, 0.02888889, 0.02, 0.01555556,
        0.01333333, 0.00888889, 0.00777778, 0.00777778, 0.00666667,
        0.00555556, 0.00444444, 0.00444444, 0.00444444, 0.00444444,
        0.00444444, 0.00222222, 0.00111111, 0.00111111, 0.00111111,
        0.00111111, 0.00111111, 0.00111111, 0.00111111,
    ];

    const EXPECTED_POES: [f64; 24] = [
        0.99801517, 0.92235092, 0.76412292, 0.63212056, 0.54057418,
        0.48658288, 0.35881961, 0.32219042, 0.32219042, 0.28346869,
        0.24253487, 0.1992626, 0.1992626, 0.1992626, 0.1992626,
        0.1992626, 0.10516068, 0.05404053, 0.05404053, 0.05404053,
        0.05404053, 0.05404053, 0.05404053, 0.05404053,
    ];

    // 900 years of stochastic event sets behind the 216-event sample.
    const TSES: f64 = 900.0;
    const TIME_SPAN: f64 = 50.0;

    fn sorted_ratios() -> Vec<f64> {
        let mut v = EVENT_RATIOS.to_vec();
        v.sort_unstable_by(f64::total_cmp);
        v
    }

    // ── Binning ─────────────────────────────────────────────────────────

    #[test]
    fn loss_range_splits_evenly() {
        let range = linspace(0.0, 2.0, 5);
        let expected = [0.0, 0.5, 1.0, 1.5, 2.0];
        assert_eq!(range.len(), expected.len());
        for (got, want) in range.iter().zip(expected) {
            assert_close(*got, want, 1e-9);
        }
    }

    #[test]
    fn range_endpoints_are_exact() {
        let range = linspace(0.1, 0.7, 7);
        assert_eq!(range[0], 0.1);
        assert_eq!(range[6], 0.7);
    }

    #[test]
    fn cumulative_counts_match_reference() {
        let sorted = sorted_ratios();
        let max = sorted[sorted.len() - 1];
        let edges = linspace(sorted[0], max, 25);
        let counts = cumulative_counts(&sorted, &edges);
        assert_eq!(counts, CUM_HISTOGRAM.to_vec());
    }

    #[test]
    fn exceedance_rates_match_reference() {
        let rates = rates_of_exceedance(&CUM_HISTOGRAM, TSES).unwrap();
        for (got, want) in rates.iter().zip(EXPECTED_RATES) {
            assert_close(*got, want, 1e-6);
        }
    }

    #[test]
    fn exceedance_probabilities_match_reference() {
        let rates = rates_of_exceedance(&CUM_HISTOGRAM, TSES).unwrap();
        let poes = probs_of_exceedance(&rates, TIME_SPAN);
        for (got, want) in poes.iter().zip(EXPECTED_POES) {
            assert_close(*got, want, 1e-4);
        }
    }

    #[test]
    fn tses_must_be_strictly_positive() {
        let losses = [0.1, 0.2];
        assert_eq!(
            event_based(&losses, 0.0, TIME_SPAN, 4),
            Err(CurveError::InvalidTses(0.0))
        );
        assert_eq!(
            event_based(&losses, -10.0, TIME_SPAN, 4),
            Err(CurveError::InvalidTses(-10.0))
        );
    }

    #[test]
    fn full_pipeline_matches_reference() {
        let (losses, poes) = event_based(&EVENT_RATIOS, TSES, TIME_SPAN, 24).unwrap();
        assert_eq!(losses.len(), 24);
        let max = 0.427215466666667;
        let width = max / 24.0;
        for (i, l) in losses.iter().enumerate() {
            assert_close(*l, width * (i as f64 + 0.5), 1e-9);
        }
        for (got, want) in poes.iter().zip(EXPECTED_POES) {
            assert_close(*got, want, 1e-4);
        }
    }

    // ── Ground motion to curve, end to end ──────────────────────────────

    // A 100-point mean-based vulnerability function and one ground motion
    // field of 20 events; expected curve computed by hand.
    fn hundred_point_function() -> VulnerabilityFunction {
        let imls = vec![
            0.0, 0.04, 0.08, 0.12, 0.16, 0.2, 0.24, 0.28, 0.32, 0.36,
            0.4, 0.44, 0.48, 0.53, 0.57, 0.61, 0.65, 0.69, 0.73, 0.77,
            0.81, 0.85, 0.89, 0.93, 0.97, 1.01, 1.05, 1.09, 1.13, 1.17,
            1.21, 1.25, 1.29, 1.33, 1.37, 1.41, 1.45, 1.49, 1.54, 1.58,
            1.62, 1.66, 1.7, 1.74, 1.78, 1.82, 1.86, 1.9, 1.94, 1.98,
            2.02, 2.06, 2.1, 2.14, 2.18, 2.22, 2.26, 2.3, 2.34, 2.38,
            2.42, 2.46, 2.51, 2.55, 2.59, 2.63, 2.67, 2.71, 2.75, 2.79,
            2.83, 2.87, 2.91, 2.95, 2.99, 3.03, 3.07, 3.11, 3.15, 3.19,
            3.23, 3.27, 3.31, 3.35, 3.39, 3.43, 3.47, 3.52, 3.56, 3.6,
            3.64, 3.68, 3.72, 3.76, 3.8, 3.84, 3.88, 3.92, 3.96, 4.0,
        ];
        let ratios = vec![
            0.0, 0.0, 0.0, 0.01, 0.04, 0.07, 0.11, 0.15, 0.2, 0.25,
            0.3, 0.35, 0.39, 0.43, 0.47, 0.51, 0.55, 0.58, 0.61, 0.64,
            0.67, 0.69, 0.71, 0.73, 0.75, 0.77, 0.79, 0.8, 0.81, 0.83,
            0.84, 0.85, 0.86, 0.87, 0.88, 0.89, 0.89, 0.9, 0.91, 0.91,
            0.92, 0.92, 0.93, 0.93, 0.94, 0.94, 0.94, 0.95, 0.95, 0.95,
            0.95, 0.96, 0.96, 0.96, 0.96, 0.97, 0.97, 0.97, 0.97, 0.97,
            0.97, 0.98, 0.98, 0.98, 0.98, 0.98, 0.98, 0.98, 0.98, 0.98,
            0.98, 0.99, 0.99, 0.99, 0.99, 0.99, 0.99, 0.99, 0.99, 0.99,
            0.99, 0.99, 0.99, 0.99, 0.99, 0.99, 0.99, 0.99, 0.99, 0.99,
            0.99, 0.99, 0.99, 0.99, 0.99, 1.0, 1.0, 1.0, 1.0, 1.0,
        ];
        let covs = vec![0.0; 100];
        VulnerabilityFunction::new(Imt::Pga, imls, ratios, covs).unwrap()
    }

    #[test]
    fn curve_from_ground_motion_matches_reference() {
        let gmvs: [f32; 20] = [
            0.1439, 0.1821, 0.5343, 0.171, 0.2177, 0.6039, 0.0618, 0.186,
            0.5512, 1.2602, 0.2824, 0.2693, 0.1705, 0.8453, 0.6355, 0.0721,
            0.2475, 0.1601, 0.3544, 0.1756,
        ];
        let vf = hundred_point_function();
        let ratios = vf.evaluate(&gmvs, &vec![0.0; gmvs.len()]);
        let (losses, poes) = event_based(&ratios, 200.0, 50.0, 5).unwrap();

        let expected_losses = [0.085255, 0.255765, 0.426275, 0.596785, 0.767295];
        let expected_poes = [0.988891, 0.82622606, 0.77686984, 0.52763345, 0.39346934];
        for (got, want) in losses.iter().zip(expected_losses) {
            assert_close(*got, want, 1e-5);
        }
        for (got, want) in poes.iter().zip(expected_poes) {
            assert_close(*got, want, 1e-4);
        }
    }

    // ── Degenerate samples ──────────────────────────────────────────────

    #[test]
    fn no_events_give_flat_zero_curve() {
        let (losses, poes) = event_based(&[], TSES, TIME_SPAN, 24).unwrap();
        assert_eq!(losses, vec![0.0; 24]);
        assert_eq!(poes, vec![0.0; 24]);
    }

    #[test]
    fn all_zero_losses_give_flat_zero_curve() {
        let zeros = [0.0; 10];
        let (losses, poes) = event_based(&zeros, TSES, TIME_SPAN, 24).unwrap();
        assert_eq!(losses, vec![0.0; 24]);
        assert_eq!(poes, vec![0.0; 24]);
    }

    #[test]
    fn negative_losses_count_as_no_damage() {
        let (losses, poes) = event_based(&[-1.0, -0.5, 0.0], TSES, TIME_SPAN, 8).unwrap();
        assert_eq!(losses, vec![0.0; 8]);
        assert_eq!(poes, vec![0.0; 8]);
    }

    #[test]
    fn single_distinct_loss_gives_flat_curve() {
        let (losses, poes) = event_based(&[3.0, 3.0, 3.0, 3.0], 10.0, 5.0, 6).unwrap();
        assert_eq!(losses, vec![3.0; 6]);
        let expected = 1.0 - (-(4.0 / 10.0) * 5.0_f64).exp();
        for p in &poes {
            assert_close(*p, expected, 1e-12);
        }
    }

    // ── Average loss ────────────────────────────────────────────────────

    #[test]
    fn average_loss_integrates_the_curve() {
        assert_close(average_loss(&[0.0, 1.0], &[1.0, 0.0]), 0.5, 1e-12);
        assert_close(average_loss(&[1.0, 2.0], &[1.0, 1.0]), 1.5, 1e-12);
        assert_close(average_loss(&[2.0, 4.0], &[0.5, 0.25]), 1.25, 1e-12);
    }

    #[test]
    fn average_loss_of_empty_curve_is_zero() {
        assert_eq!(average_loss(&[], &[]), 0.0);
    }

    #[test]
    fn average_loss_of_flat_zero_curve_is_zero() {
        let curve = LossCurve::build(&[], TSES, TIME_SPAN, 12).unwrap();
        assert_eq!(curve.average_loss, 0.0);
    }

    #[test]
    fn single_asset_scenario_curve() {
        // one asset worth 1000 hit by five events losing
        // 5%, 5%, 20%, 50% and 50% of its value
        let event_losses = [50.0, 50.0, 200.0, 500.0, 500.0];
        let curve = LossCurve::build(&event_losses, 50.0, 1.0, 5).unwrap();

        assert_eq!(curve.losses, vec![95.0, 185.0, 275.0, 365.0, 455.0]);
        for w in curve.poes.windows(2) {
            assert!(w[0] >= w[1], "poes must not increase: {:?}", curve.poes);
        }
        assert_close(curve.poes[0], 1.0 - (-0.1_f64).exp(), 1e-12);
        assert_close(curve.average_loss, 22.866107, 1e-4);
        assert!(curve.average_loss > 0.0);
        assert!(curve.average_loss < 500.0);
    }

    // ── Conditional loss ────────────────────────────────────────────────

    #[test]
    fn conditional_loss_interpolates_between_levels() {
        let losses = [0.1, 0.2, 0.3, 0.4];
        let poes = [0.9, 0.6, 0.3, 0.1];
        assert_close(conditional_loss_ratio(&losses, &poes, 0.45), 0.25, 1e-12);
        assert_close(conditional_loss_ratio(&losses, &poes, 0.3), 0.3, 1e-12);
    }

    #[test]
    fn conditional_loss_clamps_rare_probabilities_to_max_loss() {
        let losses = [0.1, 0.2, 0.3, 0.4];
        let poes = [0.9, 0.6, 0.3, 0.1];
        assert_eq!(conditional_loss_ratio(&losses, &poes, 0.05), 0.4);
    }

    #[test]
    fn conditional_loss_is_zero_for_frequent_probabilities() {
        let losses = [0.1, 0.2, 0.3, 0.4];
        let poes = [0.9, 0.6, 0.3, 0.1];
        assert_eq!(conditional_loss_ratio(&losses, &poes, 0.95), 0.0);
    }

    #[test]
    fn conditional_loss_hits_curve_endpoints_exactly() {
        let losses = [0.1, 0.2, 0.3, 0.4];
        let poes = [0.9, 0.6, 0.3, 0.1];
        assert_close(conditional_loss_ratio(&losses, &poes, 0.9), 0.1, 1e-12);
        assert_close(conditional_loss_ratio(&losses, &poes, 0.1), 0.4, 1e-12);
    }

    #[test]
    fn tied_probability_levels_keep_the_largest_loss() {
        let losses = [0.1, 0.2, 0.3];
        let poes = [0.8, 0.5, 0.5];
        assert_close(conditional_loss_ratio(&losses, &poes, 0.5), 0.3, 1e-12);
        assert_close(conditional_loss_ratio(&losses, &poes, 0.65), 0.2, 1e-12);
    }

    #[test]
    fn conditional_loss_of_empty_curve_is_zero() {
        assert_eq!(conditional_loss_ratio(&[], &[], 0.1), 0.0);
    }

    #[test]
    fn conditional_loss_of_flat_zero_curve_is_zero() {
        let curve = LossCurve::build(&[], TSES, TIME_SPAN, 8).unwrap();
        assert_eq!(curve.conditional_loss(0.1), 0.0);
    }

    #[test]
    fn loss_map_matrix_is_poes_by_curves() {
        let a = LossCurve {
            losses: vec![0.1, 0.2, 0.3, 0.4],
            poes: vec![0.9, 0.6, 0.3, 0.1],
            average_loss: 0.0,
        };
        let b = LossCurve {
            losses: vec![1.0, 2.0, 3.0, 4.0],
            poes: vec![0.9, 0.6, 0.3, 0.1],
            average_loss: 0.0,
        };
        let matrix = loss_map_matrix(&[0.45, 0.05], &[a, b]);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix[0].len(), 2);
        assert_close(matrix[0][0], 0.25, 1e-12);
        assert_close(matrix[0][1], 2.5, 1e-12);
        assert_eq!(matrix[1][0], 0.4);
        assert_eq!(matrix[1][1], 4.0);
    }

    // ── Properties ──────────────────────────────────────────────────────

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn loss_samples() -> impl Strategy<Value = Vec<f64>> {
            proptest::collection::vec(0.0f64..1e6, 1..200)
        }

        proptest! {
            #[test]
            fn curve_shape_is_always_valid(
                losses in loss_samples(),
                tses in 1.0f64..1e4,
                time_span in 1.0f64..100.0,
                resolution in 1usize..64,
            ) {
                let (xs, poes) =
                    event_based(&losses, tses, time_span, resolution).unwrap();
                prop_assert_eq!(xs.len(), resolution);
                prop_assert_eq!(poes.len(), resolution);
                for w in xs.windows(2) {
                    prop_assert!(w[0] <= w[1]);
                }
                for w in poes.windows(2) {
                    prop_assert!(w[0] >= w[1] - 1e-12);
                }
                for p in &poes {
                    prop_assert!((0.0..=1.0).contains(p));
                }
            }

            #[test]
            fn conditional_loss_stays_on_the_curve(
                losses in loss_samples(),
                probability in 0.0f64..1.0,
            ) {
                let curve = LossCurve::build(&losses, 100.0, 50.0, 16).unwrap();
                let max_loss = curve.losses[curve.losses.len() - 1];
                let value = curve.conditional_loss(probability);
                prop_assert!(value >= 0.0);
                prop_assert!(value <= max_loss + 1e-9);
            }
        }
    }
}
