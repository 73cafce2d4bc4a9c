use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineConfig, Trace};
use crate::scan_interface::OffsetRange;
use crate::status::{FitStatus, ForcedFallback};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};

/// Half-open sample range `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

impl IndexRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockSide {
    Left,
    Right,
}

/// Off-source sample ranges on one side of the beam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineBlock {
    pub side: BlockSide,
    pub ranges: Vec<IndexRange>,
}

impl BaselineBlock {
    pub fn new(side: BlockSide) -> Self {
        Self {
            side,
            ranges: Vec::new(),
        }
    }

    pub fn from_ranges(side: BlockSide, ranges: impl IntoIterator<Item = IndexRange>) -> Self {
        let mut block = Self::new(side);
        for range in ranges {
            block.insert(range);
        }
        block
    }

    /// Add a range, merging it with any range it touches.
    pub fn insert(&mut self, range: IndexRange) {
        if range.is_empty() {
            return;
        }
        self.ranges.push(range);
        self.ranges.sort_by_key(|r| r.start);
        let mut merged: Vec<IndexRange> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if r.start <= last.end => last.end = last.end.max(r.end),
                _ => merged.push(r),
            }
        }
        self.ranges = merged;
    }

    pub fn indices(&self) -> Vec<usize> {
        self.ranges.iter().flat_map(|r| r.start..r.end).collect()
    }

    pub fn len(&self) -> usize {
        self.ranges.iter().map(IndexRange::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        self.ranges.iter().any(|r| r.contains(index))
    }

    pub fn first(&self) -> Option<usize> {
        self.ranges.first().map(|r| r.start)
    }

    pub fn last(&self) -> Option<usize> {
        self.ranges.last().map(|r| r.end - 1)
    }
}

/// Baseline blocks either side of the beam, and how they were found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineSelection {
    pub left: BaselineBlock,
    pub right: BaselineBlock,
    pub sidelobes: bool,
    pub warnings: Vec<FitStatus>,
}

impl BaselineSelection {
    pub fn new(left: BaselineBlock, right: BaselineBlock) -> Self {
        Self {
            left,
            right,
            sidelobes: false,
            warnings: Vec::new(),
        }
    }

    /// Sorted, de-duplicated union of both blocks.
    pub fn combined(&self) -> Vec<usize> {
        let mut indices = self.left.indices();
        indices.extend(self.right.indices());
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    pub fn contains(&self, index: usize) -> bool {
        self.left.contains(index) || self.right.contains(index)
    }

    /// First and last baseline sample.
    pub fn extent(&self) -> Option<(usize, usize)> {
        let combined = self.combined();
        Some((*combined.first()?, *combined.last()?))
    }

    /// Most recent fallback taken, or `Ok`.
    pub fn status(&self) -> FitStatus {
        self.warnings.last().cloned().unwrap_or_default()
    }
}

/// Local minima and maxima of a smoothed trace, from sign changes of its
/// first difference.
pub fn local_extrema(spline: &[f64]) -> (Vec<usize>, Vec<usize>) {
    let signs: Vec<i8> = spline
        .windows(2)
        .map(|w| {
            let d = w[1] - w[0];
            if d > 0.0 {
                1
            } else if d < 0.0 {
                -1
            } else {
                0
            }
        })
        .collect();
    let mut minima = Vec::new();
    let mut maxima = Vec::new();
    for (i, pair) in signs.windows(2).enumerate() {
        let change = pair[1] - pair[0];
        if change > 0 {
            minima.push(i + 1);
        } else if change < 0 {
            maxima.push(i + 1);
        }
    }
    (minima, maxima)
}

/// Drop minima inside a `window`-sample band centred on any maximum.
pub fn discard_minima_near_maxima(minima: &[usize], maxima: &[usize], window: usize) -> Vec<usize> {
    let half = window / 2;
    minima
        .iter()
        .copied()
        .filter(|&m| {
            !maxima
                .iter()
                .any(|&peak| m + half >= peak && m < peak + half)
        })
        .collect()
}

/// Compare the maxima either side of the central one against `ratio` of its
/// height. Reaching the threshold exactly counts as a sidelobe.
pub fn detect_sidelobes(
    spline: &[f64],
    maxima: &[usize],
    peak_position: usize,
    ratio: f64,
) -> Option<FitStatus> {
    let (central_idx, &central) = maxima
        .iter()
        .enumerate()
        .min_by_key(|(_, m)| m.abs_diff(peak_position))?;
    let central_value = spline[central];
    let threshold = ratio * central_value;

    let neighbours = [
        central_idx.checked_sub(1).map(|i| maxima[i]),
        maxima.get(central_idx + 1).copied(),
    ];
    neighbours
        .iter()
        .flatten()
        .map(|&m| spline[m])
        .filter(|&value| value >= threshold)
        .fold(None, |largest: Option<f64>, value| {
            Some(largest.map_or(value, |l| l.max(value)))
        })
        .map(|sidelobe| FitStatus::LargeSidelobes {
            central: central_value,
            sidelobe,
        })
}

/// Block of `2 * half` samples centred on `centre`, shifted back inside
/// `0..n` rather than clipped.
fn block_around(centre: usize, half: usize, n: usize) -> IndexRange {
    let width = (2 * half).min(n);
    let start = centre.saturating_sub(half).min(n - width);
    IndexRange::new(start, start + width)
}

fn half_block(n: usize, fraction: f64) -> usize {
    (((n as f64 * fraction) as usize) / 2).max(1)
}

/// Locate baseline blocks either side of the beam from the spline's nulls.
pub fn locate_baseline(
    trace: &Trace,
    spline: &[f64],
    peak_centre: f64,
    half_fnbw: f64,
    config: &PipelineConfig,
    logger: &LogManager,
) -> Result<BaselineSelection, FitStatus> {
    let n = trace.len();
    let peak_position = trace
        .first_at_or_after(peak_centre)
        .ok_or(FitStatus::CenterNotFound)?;

    let low = (n as f64 * config.peak_range_low) as usize;
    let high = (n as f64 * config.peak_range_high) as usize;
    if peak_position < low || peak_position > high {
        logger.record(&format!(
            "peak at sample {} outside {}..{}",
            peak_position, low, high
        ));
        return Err(FitStatus::PeakOutOfRange {
            index: peak_position,
            low,
            high,
        });
    }

    let left_fnbw = trace.first_at_or_after(peak_centre - half_fnbw).unwrap_or(0);
    let right_fnbw = trace.first_at_or_after(peak_centre + half_fnbw).unwrap_or(n);
    if left_fnbw == 0 || right_fnbw == n {
        return Err(FitStatus::FnbwOutOfScan);
    }
    logger.debug(&format!(
        "FNBW points at samples {} and {}",
        left_fnbw, right_fnbw
    ));

    let (raw_minima, maxima) = local_extrema(spline);
    if maxima.is_empty() {
        return Err(FitStatus::NoExtrema);
    }
    let mut warnings = Vec::new();
    let mut minima = discard_minima_near_maxima(&raw_minima, &maxima, config.extrema_exclusion);
    logger.debug(&format!("local minima {:?}, maxima {:?}", minima, maxima));
    if minima.is_empty() {
        logger.warn("no local minima found, falling back to FNBW points");
        warnings.push(FitStatus::NoLocalMinima);
        minima = vec![left_fnbw, right_fnbw];
    }

    let mut sidelobes = false;
    if let Some(status) = detect_sidelobes(spline, &maxima, peak_position, config.sidelobe_ratio) {
        logger.record(&status.to_string());
        sidelobes = true;
        warnings.push(status);
    }

    let half = half_block(n, config.baseline_fraction);
    let spline_peak = StatsHelper::argmax(spline).ok_or(FitStatus::NoExtrema)?;
    if spline_peak < left_fnbw || spline_peak > right_fnbw {
        logger.warn("spline maximum lies outside the FNBW window");
        warnings.push(FitStatus::PeakInBaseline { index: spline_peak });
        let mut left = BaselineBlock::new(BlockSide::Left);
        let mut right = BaselineBlock::new(BlockSide::Right);
        for &m in &raw_minima {
            let block = block_around(m, half, n);
            if m < n / 2 {
                left.insert(block);
            } else {
                right.insert(block);
            }
        }
        if left.is_empty() && right.is_empty() {
            return Err(FitStatus::BaselineNotFound);
        }
        return Ok(BaselineSelection {
            left,
            right,
            sidelobes: true,
            warnings,
        });
    }

    let split = minima.partition_point(|&m| m <= peak_position);
    let (left_minima, right_minima) = minima.split_at(split);

    let left_centres: Vec<usize> = if left_minima.is_empty() {
        logger.record("no minimum left of peak, using FNBW point");
        warnings.push(FitStatus::LeftMinimumMissing {
            fallback: left_fnbw,
        });
        vec![left_fnbw]
    } else if sidelobes {
        left_minima.to_vec()
    } else {
        left_minima.last().copied().into_iter().collect()
    };
    let right_centres: Vec<usize> = if right_minima.is_empty() {
        logger.record("no minimum right of peak, using FNBW point");
        warnings.push(FitStatus::RightMinimumMissing {
            fallback: right_fnbw,
        });
        vec![right_fnbw]
    } else if sidelobes {
        right_minima.to_vec()
    } else {
        right_minima.first().copied().into_iter().collect()
    };

    let left = BaselineBlock::from_ranges(
        BlockSide::Left,
        left_centres.iter().map(|&c| block_around(c, half, n)),
    );
    let right = BaselineBlock::from_ranges(
        BlockSide::Right,
        right_centres.iter().map(|&c| block_around(c, half, n)),
    );
    logger.debug(&format!(
        "baseline blocks left {:?}, right {:?}",
        left.ranges, right.ranges
    ));

    Ok(BaselineSelection {
        left,
        right,
        sidelobes,
        warnings,
    })
}

/// Every sample beyond the nominal first nulls at `-half_fnbw` and `+half_fnbw`.
pub fn theoretical_baseline(trace: &Trace, half_fnbw: f64) -> Result<BaselineSelection, FitStatus> {
    let offsets = trace.offsets();
    let left_end = offsets.iter().take_while(|&&x| x <= -half_fnbw).count();
    let right_start = trace.first_at_or_after(half_fnbw).unwrap_or(offsets.len());
    if left_end == 0 || right_start == offsets.len() {
        return Err(FitStatus::BaselineNotFound);
    }
    let mut selection = BaselineSelection::new(
        BaselineBlock::from_ranges(BlockSide::Left, [IndexRange::new(0, left_end)]),
        BaselineBlock::from_ranges(
            BlockSide::Right,
            [IndexRange::new(right_start, offsets.len())],
        ),
    );
    selection.warnings.push(FitStatus::TheoreticalBaseline);
    Ok(selection)
}

/// Fallback chain for a forced fit: search for minima around zero offset,
/// then take every sample beyond the FNBW points.
pub fn forced_baseline(
    trace: &Trace,
    spline: &[f64],
    half_fnbw: f64,
    config: &PipelineConfig,
    logger: &LogManager,
) -> Result<BaselineSelection, FitStatus> {
    match locate_baseline(trace, spline, 0.0, half_fnbw, config, logger) {
        Ok(mut selection) if !selection.left.is_empty() && !selection.right.is_empty() => {
            logger.warn("forcing the fit with minima around zero offset");
            selection.sidelobes = false;
            selection.warnings.push(FitStatus::ForcedBaseline {
                fallback: ForcedFallback::CentredAtZero,
            });
            return Ok(selection);
        }
        Ok(_) => logger.debug("minima around zero offset leave one side empty"),
        Err(status) => logger.debug(&format!("minima around zero offset: {}", status)),
    }

    logger.warn("forcing the fit with the FNBW points");
    let mut selection = theoretical_baseline(trace, half_fnbw)?;
    selection.warnings.push(FitStatus::ForcedBaseline {
        fallback: ForcedFallback::FnbwPoints,
    });
    Ok(selection)
}

/// Baseline taken from caller-supplied offset ranges; samples left of
/// `centre` go to the left block.
pub fn hinted_baseline(
    trace: &Trace,
    ranges: &[OffsetRange],
    centre: f64,
) -> Result<BaselineSelection, FitStatus> {
    let offsets = trace.offsets();
    let mut left = BaselineBlock::new(BlockSide::Left);
    let mut right = BaselineBlock::new(BlockSide::Right);
    for i in ranges.iter().flat_map(|r| r.indices(offsets)) {
        let block = if offsets[i] < centre { &mut left } else { &mut right };
        block.insert(IndexRange::new(i, i + 1));
    }
    if left.is_empty() || right.is_empty() {
        return Err(FitStatus::BaselineNotFound);
    }
    Ok(BaselineSelection::new(left, right))
}

/// Fixed edge blocks used for twin-horn scans.
pub fn edge_baseline(n: usize, fraction: f64) -> Result<BaselineSelection, FitStatus> {
    let width = (n as f64 * fraction) as usize;
    if width == 0 || 2 * width > n {
        return Err(FitStatus::BaselineNotFound);
    }
    Ok(BaselineSelection::new(
        BaselineBlock::from_ranges(BlockSide::Left, [IndexRange::new(0, width)]),
        BaselineBlock::from_ranges(BlockSide::Right, [IndexRange::new(n - width, n)]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::spline::SplineSmoother;
    use crate::test_support::{beam, beam_trace};

    #[test]
    fn extrema_follow_sign_changes() {
        let spline = [0.0, 1.0, 2.0, 1.0, 0.5, 0.7, 0.9, 0.2];
        let (minima, maxima) = local_extrema(&spline);
        assert_eq!(minima, vec![4]);
        assert_eq!(maxima, vec![2, 6]);
    }

    #[test]
    fn minima_next_to_maxima_are_ignored() {
        let kept = discard_minima_near_maxima(&[10, 76, 130], &[100], 50);
        assert_eq!(kept, vec![10, 130]);
        let kept = discard_minima_near_maxima(&[74, 75, 124, 125], &[100], 50);
        assert_eq!(kept, vec![74, 125]);
    }

    #[test]
    fn sidelobe_at_exactly_half_peak_is_flagged() {
        let mut spline = vec![0.0; 9];
        spline[2] = 0.5;
        spline[4] = 1.0;
        spline[6] = 0.25;
        let status = detect_sidelobes(&spline, &[2, 4, 6], 4, 0.5);
        assert_eq!(
            status,
            Some(FitStatus::LargeSidelobes {
                central: 1.0,
                sidelobe: 0.5
            })
        );

        spline[2] = 0.4999;
        assert_eq!(detect_sidelobes(&spline, &[2, 4, 6], 4, 0.5), None);
        assert_eq!(detect_sidelobes(&spline, &[4], 4, 0.5), None);
    }

    #[test]
    fn blocks_shift_inside_the_scan() {
        assert_eq!(block_around(3, 10, 100), IndexRange::new(0, 20));
        assert_eq!(block_around(97, 10, 100), IndexRange::new(80, 100));
        assert_eq!(block_around(50, 10, 100), IndexRange::new(40, 60));
    }

    #[test]
    fn block_insert_merges_overlaps() {
        let block = BaselineBlock::from_ranges(
            BlockSide::Left,
            [
                IndexRange::new(10, 20),
                IndexRange::new(0, 5),
                IndexRange::new(15, 30),
            ],
        );
        assert_eq!(
            block.ranges,
            vec![IndexRange::new(0, 5), IndexRange::new(10, 30)]
        );
        assert_eq!(block.len(), 25);
        assert_eq!(block.last(), Some(29));
    }

    fn beam_with_sidelobes(sidelobe: f64) -> Trace {
        let main = beam(1.0, 0.0, 0.8, 0.0, 0.0);
        let (x, _) = beam_trace(&main, -1.5, 1.5, 601);
        let y: Vec<f64> = x
            .iter()
            .map(|&v| main.eval(v) + sidelobe * (-((v.abs() - 1.1) / 0.25).powi(2)).exp())
            .collect();
        Trace::new(x, y).unwrap()
    }

    fn locate(trace: &Trace) -> Result<BaselineSelection, FitStatus> {
        let config = PipelineConfig::default();
        let spline = SplineSmoother::from_config(&config).smooth(trace.amplitudes());
        locate_baseline(
            trace,
            &spline.values,
            0.0,
            1.0,
            &config,
            &LogManager::new(),
        )
    }

    #[test]
    fn beam_with_nulls_gets_blocks_either_side() {
        let trace = beam_with_sidelobes(0.08);
        let selection = locate(&trace).unwrap();
        assert!(!selection.sidelobes);
        assert!(selection.warnings.is_empty());
        assert_eq!(selection.left.len(), 30);
        assert_eq!(selection.right.len(), 30);
        let left_last = selection.left.last().unwrap();
        let right_first = selection.right.first().unwrap();
        assert!(trace.offsets()[left_last] < -0.6);
        assert!(trace.offsets()[right_first] > 0.6);
        assert!(trace.offsets()[selection.left.first().unwrap()] > -1.1);
    }

    #[test]
    fn large_sidelobes_widen_the_baseline() {
        let trace = beam_with_sidelobes(0.6);
        let selection = locate(&trace).unwrap();
        assert!(selection.sidelobes);
        assert!(matches!(
            selection.status(),
            FitStatus::LargeSidelobes { .. }
        ));
        assert_eq!(selection.left.ranges.len(), 2);
        assert_eq!(selection.right.ranges.len(), 2);
        assert_eq!(selection.left.first(), Some(0));
        assert_eq!(selection.right.last(), Some(600));
    }

    #[test]
    fn peak_outside_central_half_is_rejected() {
        let (x, y) = beam_trace(&beam(1.0, -1.2, 0.5, 0.0, 0.0), -1.5, 1.5, 601);
        let trace = Trace::new(x, y).unwrap();
        let config = PipelineConfig::default();
        let spline = SplineSmoother::from_config(&config).smooth(trace.amplitudes());
        let err = locate_baseline(
            &trace,
            &spline.values,
            -1.2,
            0.5,
            &config,
            &LogManager::new(),
        )
        .unwrap_err();
        assert_eq!(err.code(), 20);
    }

    #[test]
    fn theoretical_baseline_uses_samples_beyond_nulls() {
        let x: Vec<f64> = (0..21).map(|i| -1.0 + i as f64 * 0.1).collect();
        let trace = Trace::new(x, vec![0.0; 21]).unwrap();
        let selection = theoretical_baseline(&trace, 0.55).unwrap();
        assert_eq!(selection.left.ranges, vec![IndexRange::new(0, 5)]);
        assert_eq!(selection.right.ranges, vec![IndexRange::new(16, 21)]);
        assert_eq!(selection.status(), FitStatus::TheoreticalBaseline);
    }

    #[test]
    fn forced_baseline_retries_around_zero_offset() {
        let trace = beam_with_sidelobes(0.08);
        let config = PipelineConfig::default();
        let spline = SplineSmoother::from_config(&config).smooth(trace.amplitudes());
        let selection =
            forced_baseline(&trace, &spline.values, 1.0, &config, &LogManager::new()).unwrap();
        assert!(!selection.left.is_empty());
        assert!(!selection.right.is_empty());
        assert!(!selection.sidelobes);
        assert_eq!(
            selection.status(),
            FitStatus::ForcedBaseline {
                fallback: ForcedFallback::CentredAtZero
            }
        );
    }

    #[test]
    fn forced_baseline_falls_back_to_fnbw_points() {
        // a ramp has no maxima, so the minima search cannot run
        let (x, y) = beam_trace(&beam(0.0, 0.0, 0.8, 1.0, 0.2), -1.5, 1.5, 601);
        let trace = Trace::new(x, y).unwrap();
        let config = PipelineConfig::default();
        let spline = SplineSmoother::from_config(&config).smooth(trace.amplitudes());
        let logger = LogManager::new();
        assert_eq!(
            locate_baseline(&trace, &spline.values, 0.0, 1.0, &config, &logger).unwrap_err(),
            FitStatus::NoExtrema
        );

        let selection = forced_baseline(&trace, &spline.values, 1.0, &config, &logger).unwrap();
        assert_eq!(
            selection.status(),
            FitStatus::ForcedBaseline {
                fallback: ForcedFallback::FnbwPoints
            }
        );
        assert!(selection.warnings.contains(&FitStatus::TheoreticalBaseline));
        assert!((100..=101).contains(&selection.left.len()));
        assert!((100..=101).contains(&selection.right.len()));

        assert_eq!(
            forced_baseline(&trace, &spline.values, 2.0, &config, &logger).unwrap_err(),
            FitStatus::BaselineNotFound
        );
    }

    #[test]
    fn hinted_ranges_split_at_centre() {
        let x: Vec<f64> = (0..21).map(|i| -1.0 + i as f64 * 0.1).collect();
        let trace = Trace::new(x, vec![0.0; 21]).unwrap();
        let ranges = [OffsetRange::new(-1.0, -0.75), OffsetRange::new(0.65, 1.0)];
        let selection = hinted_baseline(&trace, &ranges, 0.0).unwrap();
        assert_eq!(selection.left.ranges, vec![IndexRange::new(0, 3)]);
        assert_eq!(selection.right.ranges, vec![IndexRange::new(17, 21)]);
        assert!(selection.warnings.is_empty());

        let one_sided = [OffsetRange::new(0.5, 1.0)];
        assert_eq!(
            hinted_baseline(&trace, &one_sided, 0.0).unwrap_err(),
            FitStatus::BaselineNotFound
        );
    }

    #[test]
    fn edge_baseline_takes_fixed_fraction() {
        let selection = edge_baseline(500, 0.04).unwrap();
        assert_eq!(selection.left.ranges, vec![IndexRange::new(0, 20)]);
        assert_eq!(selection.right.ranges, vec![IndexRange::new(480, 500)]);
        assert!(edge_baseline(10, 0.04).is_err());
    }
}
