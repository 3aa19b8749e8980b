//! Hypothesis-test inversion: scan POI values and locate `CLs(mu) = 1 - CL`.
//!
//! Two modes:
//! - a fixed linear grid, evaluated in parallel, with crossings found by
//!   linear interpolation between neighbouring points of each CLs curve;
//! - adaptive bisection on the observed curve and on each expected band,
//!   with the bracket widened by doubling when needed.
//!
//! Points whose calculator call failed or whose fits did not converge are
//! kept in the result but never used for interpolation.

use crate::calculator::{Cls, HypoTestCalculator, HypoTestResult, EXPECTED_BANDS};
use lim_core::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// POI values to test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanGrid {
    /// `points` equally spaced values in `[min, max]`.
    Fixed {
        /// Number of grid points (>= 2).
        points: usize,
        /// First value.
        min: f64,
        /// Last value.
        max: f64,
    },
    /// Bisection on each curve between `lo` and `hi`.
    Adaptive {
        /// Lower bracket.
        lo: f64,
        /// Initial upper bracket (widened if it does not bracket the crossing).
        hi: f64,
        /// Relative tolerance on the bracket width.
        rtol: f64,
        /// Maximum number of bisection steps per curve.
        max_iter: usize,
    },
}

impl ScanGrid {
    /// Check the grid parameters.
    pub fn validate(&self) -> Result<()> {
        match *self {
            ScanGrid::Fixed { points, min, max } => {
                if points < 2 {
                    return Err(Error::Validation(format!("grid needs >= 2 points, got {points}")));
                }
                if !(min.is_finite() && max.is_finite()) || max <= min {
                    return Err(Error::Validation(format!("invalid grid range [{min}, {max}]")));
                }
            }
            ScanGrid::Adaptive { lo, hi, rtol, max_iter } => {
                if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
                    return Err(Error::Validation(format!("invalid bracket lo={lo} hi={hi}")));
                }
                if rtol.is_nan() || rtol <= 0.0 || max_iter == 0 {
                    return Err(Error::Validation("rtol and max_iter must be > 0".to_string()));
                }
            }
        }
        Ok(())
    }

    /// Grid values of a fixed grid.
    pub fn values(&self) -> Option<Vec<f64>> {
        match *self {
            ScanGrid::Fixed { points, min, max } => {
                let step = (max - min) / (points - 1) as f64;
                Some((0..points).map(|i| if i + 1 == points { max } else { min + step * i as f64 }).collect())
            }
            ScanGrid::Adaptive { .. } => None,
        }
    }
}

impl Default for ScanGrid {
    fn default() -> Self {
        ScanGrid::Fixed { points: 41, min: 0.0, max: 5.0 }
    }
}

/// Inverter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InverterConfig {
    /// Target confidence level; the crossing is at `CLs = 1 - confidence_level`.
    pub confidence_level: f64,
    /// Values to test.
    pub grid: ScanGrid,
    /// Evaluate fixed-grid points in parallel.
    pub parallel: bool,
}

impl Default for InverterConfig {
    fn default() -> Self {
        Self { confidence_level: 0.95, grid: ScanGrid::default(), parallel: true }
    }
}

/// Health of one scan point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    /// Usable for interpolation.
    Ok,
    /// Some fit did not converge; excluded from interpolation.
    Degraded,
    /// The calculator returned an error.
    Failed(String),
}

/// One tested POI value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanPoint {
    /// Tested POI value.
    pub mu: f64,
    /// Observed statistic.
    pub t_obs: f64,
    /// `P(t >= t_obs | null)`.
    pub p_sb: f64,
    /// `1 - CLb`.
    pub p_b: f64,
    /// `P(t >= t_obs | alt)`.
    pub clb: f64,
    /// Observed CLs.
    pub cls: Cls,
    /// Expected CLs per band.
    pub expected_cls: [Cls; 5],
    /// Point health.
    pub status: PointStatus,
    /// Calculator warnings.
    pub warnings: Vec<String>,
}

impl ScanPoint {
    fn from_result(r: HypoTestResult) -> Self {
        let status = if r.is_degraded() { PointStatus::Degraded } else { PointStatus::Ok };
        Self {
            mu: r.mu_test,
            t_obs: r.t_obs,
            p_sb: r.p_sb,
            p_b: r.p_b,
            clb: r.clb,
            cls: r.cls,
            expected_cls: r.expected_cls,
            status,
            warnings: r.warnings,
        }
    }

    fn failed(mu: f64, err: &Error) -> Self {
        Self {
            mu,
            t_obs: f64::NAN,
            p_sb: f64::NAN,
            p_b: f64::NAN,
            clb: f64::NAN,
            cls: Cls::Undefined,
            expected_cls: [Cls::Undefined; 5],
            status: PointStatus::Failed(err.to_string()),
            warnings: Vec::new(),
        }
    }

    /// `true` if the point enters interpolation.
    pub fn is_usable(&self) -> bool {
        self.status == PointStatus::Ok
    }

    /// CLs on curve `band` (`None` = observed, `Some(i)` = `EXPECTED_BANDS[i]`).
    pub fn curve_value(&self, band: Option<usize>) -> Cls {
        match band {
            None => self.cls,
            Some(i) => self.expected_cls[i],
        }
    }
}

/// Where a CLs curve crosses the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    /// Exactly one crossing.
    Unique(f64),
    /// Several crossings (non-monotonic curve).
    Ambiguous {
        /// Lowest crossing.
        first: f64,
        /// All crossings in ascending order.
        all: Vec<f64>,
    },
    /// The curve never crosses the target within the scanned range.
    NotFound,
}

impl Crossing {
    /// Classify a list of crossings.
    pub fn from_crossings(mut xs: Vec<f64>) -> Self {
        xs.sort_by(f64::total_cmp);
        match xs.len() {
            0 => Crossing::NotFound,
            1 => Crossing::Unique(xs[0]),
            _ => Crossing::Ambiguous { first: xs[0], all: xs },
        }
    }

    /// The crossing if unique.
    pub fn unique(&self) -> Option<f64> {
        match self {
            Crossing::Unique(x) => Some(*x),
            _ => None,
        }
    }

    fn all(&self) -> Vec<f64> {
        match self {
            Crossing::Unique(x) => vec![*x],
            Crossing::Ambiguous { all, .. } => all.clone(),
            Crossing::NotFound => Vec::new(),
        }
    }
}

/// All crossings of `target` by the piecewise-linear curve through `curve`.
///
/// `curve` must be sorted by `x`. A point exactly on the target counts once.
pub fn find_crossings(curve: &[(f64, f64)], target: f64) -> Vec<f64> {
    let mut out = Vec::new();
    for w in curve.windows(2) {
        let (x0, y0) = w[0];
        let (x1, y1) = w[1];
        let d0 = y0 - target;
        let d1 = y1 - target;
        if d0 == 0.0 {
            if out.last() != Some(&x0) {
                out.push(x0);
            }
            continue;
        }
        if d0 * d1 < 0.0 {
            let t = d0 / (d0 - d1);
            out.push(x0 + t * (x1 - x0));
        }
    }
    if let Some(&(x, y)) = curve.last() {
        if y == target && out.last() != Some(&x) {
            out.push(x);
        }
    }
    out
}

/// A bisection root, downgraded to [`Crossing::Ambiguous`] when the evaluated
/// curve crosses more than once. The visible crossing nearest the root is
/// replaced by the root itself.
fn with_visible_crossings(solved: Crossing, mut visible: Vec<f64>) -> Crossing {
    match solved {
        Crossing::Unique(root) if visible.len() > 1 => {
            let nearest = visible
                .iter()
                .enumerate()
                .min_by(|a, b| (a.1 - root).abs().total_cmp(&(b.1 - root).abs()))
                .map(|(i, _)| i);
            if let Some(i) = nearest {
                visible[i] = root;
            }
            Crossing::from_crossings(visible)
        }
        other => other,
    }
}

/// Result of an inversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Confidence level of the limits.
    pub confidence_level: f64,
    /// Tested points in ascending POI order.
    pub points: Vec<ScanPoint>,
    /// Observed crossing.
    pub observed: Crossing,
    /// Expected crossings per band (index as [`EXPECTED_BANDS`]).
    pub expected: [Crossing; 5],
    /// Indices into `points` excluded from interpolation.
    pub degraded: Vec<usize>,
}

impl ScanResult {
    /// Target CLs value.
    pub fn alpha(&self) -> f64 {
        1.0 - self.confidence_level
    }

    /// Usable `(mu, CLs)` pairs of one curve.
    pub fn curve(&self, band: Option<usize>) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .filter(|p| p.is_usable())
            .filter_map(|p| p.curve_value(band).as_option().map(|v| (p.mu, v)))
            .collect()
    }

    fn limit_of(&self, crossing: &Crossing, band: Option<usize>) -> Result<f64> {
        crossing.unique().ok_or_else(|| Error::NonMonotonicScan {
            crossings: crossing.all(),
            curve: self.curve(band),
        })
    }

    /// Observed upper limit, or [`Error::NonMonotonicScan`] without a unique crossing.
    pub fn upper_limit(&self) -> Result<f64> {
        self.limit_of(&self.observed, None)
    }

    /// Expected limit at band index `i` (0 = -2 sigma, 4 = +2 sigma).
    pub fn expected_limit(&self, i: usize) -> Result<f64> {
        if i >= EXPECTED_BANDS.len() {
            return Err(Error::Validation(format!("expected band index out of range: {i}")));
        }
        self.limit_of(&self.expected[i], Some(i))
    }

    /// All five expected limits.
    pub fn expected_limits(&self) -> Result<[f64; 5]> {
        let mut out = [0.0; 5];
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.expected_limit(i)?;
        }
        Ok(out)
    }
}

/// Runs a calculator across POI values and inverts the result.
pub struct HypoTestInverter<'c> {
    calculator: &'c dyn HypoTestCalculator,
    config: InverterConfig,
}

impl<'c> HypoTestInverter<'c> {
    /// Inverter over `calculator`.
    pub fn new(calculator: &'c dyn HypoTestCalculator, config: InverterConfig) -> Result<Self> {
        let cl = config.confidence_level;
        if !(cl > 0.0 && cl < 1.0) {
            return Err(Error::Validation(format!("confidence level must be in (0, 1), got {cl}")));
        }
        config.grid.validate()?;
        Ok(Self { calculator, config })
    }

    /// The configuration.
    pub fn config(&self) -> &InverterConfig {
        &self.config
    }

    /// One calculator call. Errors become failed points, except cancellation.
    fn test_point(&self, mu: f64) -> Result<ScanPoint> {
        match self.calculator.hypotest(mu) {
            Ok(r) => Ok(ScanPoint::from_result(r)),
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                log::warn!("inverter: hypotest failed at mu={mu}: {e}");
                Ok(ScanPoint::failed(mu, &e))
            }
        }
    }

    /// Scan and locate the observed and expected crossings.
    ///
    /// Cancellation from a toy calculator aborts the scan with [`Error::Cancelled`].
    pub fn run(&self) -> Result<ScanResult> {
        let points = match self.config.grid {
            ScanGrid::Fixed { .. } => self.run_grid()?,
            ScanGrid::Adaptive { lo, hi, rtol, max_iter } => {
                return self.run_adaptive(lo, hi, rtol, max_iter);
            }
        };
        Ok(self.assemble(points, None))
    }

    fn run_grid(&self) -> Result<Vec<ScanPoint>> {
        let values = self.config.grid.values().unwrap_or_default();
        if self.config.parallel {
            values.par_iter().map(|&mu| self.test_point(mu)).collect()
        } else {
            values.iter().map(|&mu| self.test_point(mu)).collect()
        }
    }

    fn assemble(&self, mut points: Vec<ScanPoint>, solved: Option<(Crossing, [Crossing; 5])>) -> ScanResult {
        points.sort_by(|a, b| a.mu.total_cmp(&b.mu));
        let degraded: Vec<usize> =
            points.iter().enumerate().filter(|(_, p)| !p.is_usable()).map(|(i, _)| i).collect();
        let mut result = ScanResult {
            confidence_level: self.config.confidence_level,
            points,
            observed: Crossing::NotFound,
            expected: std::array::from_fn(|_| Crossing::NotFound),
            degraded,
        };
        let alpha = result.alpha();
        match solved {
            Some((observed, expected)) => {
                // Bisection tracks one bracket; the evaluated points may show more crossings.
                let visible = find_crossings(&result.curve(None), alpha);
                result.observed = with_visible_crossings(observed, visible);
                for (i, solved) in expected.into_iter().enumerate() {
                    let visible = find_crossings(&result.curve(Some(i)), alpha);
                    result.expected[i] = with_visible_crossings(solved, visible);
                }
            }
            None => {
                result.observed = Crossing::from_crossings(find_crossings(&result.curve(None), alpha));
                result.expected = std::array::from_fn(|i| {
                    Crossing::from_crossings(find_crossings(&result.curve(Some(i)), alpha))
                });
            }
        }
        if !matches!(result.observed, Crossing::Unique(_)) {
            log::warn!("inverter: observed CLs curve has no unique crossing: {:?}", result.observed);
        }
        if !result.degraded.is_empty() {
            log::warn!("inverter: {} degraded scan points", result.degraded.len());
        }
        result
    }

    fn run_adaptive(&self, lo: f64, hi: f64, rtol: f64, max_iter: usize) -> Result<ScanResult> {
        let alpha = 1.0 - self.config.confidence_level;
        let (poi_lo, poi_hi) = self.calculator.poi_bounds();
        let lo = lo.max(poi_lo);
        let hi = hi.min(poi_hi);
        if hi <= lo {
            return Err(Error::Validation(format!("bracket [{lo}, {hi}] is empty inside the POI range")));
        }

        let mut memo: Vec<ScanPoint> = Vec::new();
        let observed = self.bisect_curve(&mut memo, None, alpha, lo, hi, poi_hi, rtol, max_iter)?;
        let mut expected: [Crossing; 5] = std::array::from_fn(|_| Crossing::NotFound);
        for (i, slot) in expected.iter_mut().enumerate() {
            *slot = self.bisect_curve(&mut memo, Some(i), alpha, lo, hi, poi_hi, rtol, max_iter)?;
        }
        Ok(self.assemble(memo, Some((observed, expected))))
    }

    fn evaluate_memo(&self, memo: &mut Vec<ScanPoint>, mu: f64) -> Result<ScanPoint> {
        if let Some(p) = memo.iter().find(|p| p.mu == mu) {
            return Ok(p.clone());
        }
        let p = self.test_point(mu)?;
        memo.push(p.clone());
        Ok(p)
    }

    /// Bisection for one curve: widen `hi` by doubling the bracket (up to 50 times, capped at the
    /// POI upper bound) until `CLs(hi) <= alpha`, then halve until the
    /// relative width drops below `rtol`.
    #[allow(clippy::too_many_arguments)]
    fn bisect_curve(
        &self,
        memo: &mut Vec<ScanPoint>,
        band: Option<usize>,
        alpha: f64,
        lo: f64,
        mut hi: f64,
        hi_cap: f64,
        rtol: f64,
        max_iter: usize,
    ) -> Result<Crossing> {
        let value_at = |memo: &mut Vec<ScanPoint>, mu: f64| -> Result<Option<f64>> {
            let p = self.evaluate_memo(memo, mu)?;
            if !p.is_usable() {
                return Ok(None);
            }
            Ok(p.curve_value(band).as_option())
        };

        let Some(f_lo) = value_at(memo, lo)? else {
            log::warn!("inverter: unusable lower bracket at mu={lo} (band {band:?})");
            return Ok(Crossing::NotFound);
        };
        if f_lo < alpha {
            log::warn!("inverter: CLs({lo})={f_lo} already below {alpha} (band {band:?})");
            return Ok(Crossing::NotFound);
        }

        let mut f_hi = value_at(memo, hi)?;
        let mut expand = 0usize;
        while matches!(f_hi, Some(v) if v > alpha) && expand < 50 && hi < hi_cap {
            hi = (lo + 2.0 * (hi - lo)).min(hi_cap);
            f_hi = value_at(memo, hi)?;
            expand += 1;
        }
        match f_hi {
            Some(v) if v <= alpha => {}
            _ => {
                log::warn!("inverter: failed to bracket crossing below mu={hi} (band {band:?})");
                return Ok(Crossing::NotFound);
            }
        }

        let (mut a, mut b) = (lo, hi);
        for _ in 0..max_iter {
            let mid = 0.5 * (a + b);
            match value_at(memo, mid)? {
                Some(v) if v > alpha => a = mid,
                Some(_) => b = mid,
                None => {
                    log::warn!("inverter: unusable point at mu={mid} during bisection (band {band:?})");
                    return Ok(Crossing::NotFound);
                }
            }
            if (b - a).abs() / b.abs().max(1.0) < rtol {
                break;
            }
        }
        Ok(Crossing::Unique(0.5 * (a + b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    /// Calculator with analytic CLs curves: observed `exp(-mu)`, band `i`
    /// `exp(-mu / (i + 1))`.
    struct Analytic {
        fail_at: Option<f64>,
    }

    impl HypoTestCalculator for Analytic {
        fn hypotest(&self, mu_test: f64) -> Result<HypoTestResult> {
            if self.fail_at == Some(mu_test) {
                return Err(Error::Computation("synthetic failure".to_string()));
            }
            let cls = (-mu_test).exp();
            Ok(HypoTestResult {
                mu_test,
                t_obs: mu_test,
                mu_hat: 0.0,
                p_sb: cls * 0.5,
                p_b: 0.5,
                clb: 0.5,
                cls: Cls::Value(cls),
                expected_cls: std::array::from_fn(|i| Cls::Value((-mu_test / (i as f64 + 1.0)).exp())),
                converged: true,
                warnings: Vec::new(),
                null_distribution: None,
                alt_distribution: None,
            })
        }

        fn poi_bounds(&self) -> (f64, f64) {
            (0.0, 100.0)
        }
    }

    #[test]
    fn grid_crossing_interpolates() {
        let calc = Analytic { fail_at: None };
        let cfg = InverterConfig {
            confidence_level: 0.95,
            grid: ScanGrid::Fixed { points: 301, min: 0.0, max: 6.0 },
            parallel: true,
        };
        let r = HypoTestInverter::new(&calc, cfg).unwrap().run().unwrap();
        assert_relative_eq!(r.upper_limit().unwrap(), 20f64.ln(), epsilon = 1e-3);
        // Band 4 reaches 0.05 only at 5 ln 20 > 6.
        assert_eq!(r.expected[4], Crossing::NotFound);
        assert!(matches!(r.expected_limit(4), Err(Error::NonMonotonicScan { .. })));
        assert_relative_eq!(r.expected_limit(1).unwrap(), 2.0 * 20f64.ln(), epsilon = 1e-3);
    }

    #[test]
    fn adaptive_bisection_widens_bracket() {
        let calc = Analytic { fail_at: None };
        let cfg = InverterConfig {
            confidence_level: 0.95,
            grid: ScanGrid::Adaptive { lo: 0.0, hi: 1.0, rtol: 1e-8, max_iter: 200 },
            parallel: false,
        };
        let r = HypoTestInverter::new(&calc, cfg).unwrap().run().unwrap();
        assert_relative_eq!(r.upper_limit().unwrap(), 20f64.ln(), epsilon = 1e-6);
        let exp = r.expected_limits().unwrap();
        for (i, v) in exp.iter().enumerate() {
            assert_relative_eq!(*v, (i as f64 + 1.0) * 20f64.ln(), epsilon = 1e-5);
        }
        assert!(r.points.windows(2).all(|w| w[0].mu < w[1].mu));
    }

    /// Observed CLs dips below 0.05 on `[0.75, 1.25]`, recovers to 0.3, and
    /// drops again from `mu = 3`. Expected bands are `exp(-mu / 3)`.
    struct Bumpy;

    impl HypoTestCalculator for Bumpy {
        fn hypotest(&self, mu_test: f64) -> Result<HypoTestResult> {
            let cls = match mu_test {
                m if m < 0.75 => 1.0,
                m if m <= 1.25 => 0.01,
                m if m < 3.0 => 0.3,
                _ => 0.01,
            };
            Ok(HypoTestResult {
                mu_test,
                t_obs: mu_test,
                mu_hat: 0.0,
                p_sb: cls * 0.5,
                p_b: 0.5,
                clb: 0.5,
                cls: Cls::Value(cls),
                expected_cls: std::array::from_fn(|_| Cls::Value((-mu_test / 3.0).exp())),
                converged: true,
                warnings: Vec::new(),
                null_distribution: None,
                alt_distribution: None,
            })
        }

        fn poi_bounds(&self) -> (f64, f64) {
            (0.0, 100.0)
        }
    }

    #[test]
    fn adaptive_reports_ambiguous_when_evaluated_curve_recrosses() {
        let cfg = InverterConfig {
            confidence_level: 0.95,
            grid: ScanGrid::Adaptive { lo: 0.0, hi: 1.0, rtol: 1e-6, max_iter: 100 },
            parallel: false,
        };
        let r = HypoTestInverter::new(&Bumpy, cfg).unwrap().run().unwrap();

        let visible = find_crossings(&r.curve(None), r.alpha());
        assert_eq!(visible.len(), 3);
        match &r.observed {
            Crossing::Ambiguous { first, all } => {
                assert_relative_eq!(*first, 0.75, epsilon = 1e-5);
                assert_eq!(all.len(), 3);
                assert!(all[1] > 1.0 && all[1] < 2.0);
                assert!(all[2] > 3.0);
            }
            c => panic!("expected ambiguous crossing, got {c:?}"),
        }
        match r.upper_limit() {
            Err(Error::NonMonotonicScan { crossings, curve }) => {
                assert_eq!(crossings.len(), 3);
                assert_eq!(curve.len(), r.points.len());
            }
            other => panic!("expected NonMonotonicScan, got {other:?}"),
        }
        // Expected bands are monotone and keep their bisection roots.
        for v in r.expected_limits().unwrap() {
            assert_relative_eq!(v, 3.0 * 20f64.ln(), epsilon = 1e-4);
        }
    }

    #[test]
    fn failed_points_are_listed_and_skipped() {
        let calc = Analytic { fail_at: Some(1.5) };
        let cfg = InverterConfig {
            confidence_level: 0.95,
            grid: ScanGrid::Fixed { points: 7, min: 0.0, max: 6.0 },
            parallel: false,
        };
        let r = HypoTestInverter::new(&calc, cfg).unwrap().run().unwrap();
        // Grid: 0, 1, 2, ...; no point at 1.5 so nothing fails.
        assert!(r.degraded.is_empty());

        let cfg = InverterConfig {
            confidence_level: 0.95,
            grid: ScanGrid::Fixed { points: 5, min: 0.0, max: 6.0 },
            parallel: false,
        };
        let r = HypoTestInverter::new(&calc, cfg).unwrap().run().unwrap();
        assert_eq!(r.degraded, vec![1]);
        assert!(matches!(r.points[1].status, PointStatus::Failed(_)));
        assert_eq!(r.curve(None).len(), 4);
        assert!(r.upper_limit().is_ok());
    }

    #[test]
    fn crossings_classified() {
        let curve = [(0.0, 1.0), (1.0, 0.01), (2.0, 0.2), (3.0, 0.01)];
        let xs = find_crossings(&curve, 0.05);
        assert_eq!(xs.len(), 3);
        match Crossing::from_crossings(xs) {
            Crossing::Ambiguous { first, all } => {
                assert!(first < 1.0);
                assert_eq!(all.len(), 3);
            }
            c => panic!("expected ambiguous crossing, got {c:?}"),
        }
        assert_eq!(find_crossings(&[(0.0, 0.5), (1.0, 0.05), (2.0, 0.01)], 0.05), vec![1.0]);
        assert!(find_crossings(&[(0.0, 0.5), (1.0, 0.4)], 0.05).is_empty());
    }

    #[test]
    fn invalid_configs_rejected() {
        let calc = Analytic { fail_at: None };
        let bad_cl = InverterConfig { confidence_level: 1.0, ..Default::default() };
        assert!(HypoTestInverter::new(&calc, bad_cl).is_err());
        let bad_grid = InverterConfig {
            grid: ScanGrid::Fixed { points: 1, min: 0.0, max: 1.0 },
            ..Default::default()
        };
        assert!(HypoTestInverter::new(&calc, bad_grid).is_err());
    }

    proptest! {
        #[test]
        fn monotone_curve_has_unique_crossing(
            rate in 0.2f64..5.0,
            n in 5usize..60,
            alpha in 0.01f64..0.3,
        ) {
            let xmax = 2.0 * (1.0 / alpha).ln() / rate;
            let curve: Vec<(f64, f64)> = (0..n)
                .map(|i| {
                    let x = xmax * i as f64 / (n - 1) as f64;
                    (x, (-rate * x).exp())
                })
                .collect();
            let xs = find_crossings(&curve, alpha);
            prop_assert_eq!(xs.len(), 1);
            let exact = (1.0 / alpha).ln() / rate;
            let step = xmax / (n - 1) as f64;
            prop_assert!((xs[0] - exact).abs() <= step);
        }

        #[test]
        fn crossings_lie_inside_scanned_range(ys in proptest::collection::vec(0.0f64..1.0, 2..40)) {
            let curve: Vec<(f64, f64)> = ys.iter().enumerate().map(|(i, &y)| (i as f64, y)).collect();
            for x in find_crossings(&curve, 0.05) {
                prop_assert!(x >= 0.0 && x <= (ys.len() - 1) as f64);
            }
        }
    }
}
