//! # BLS Pulse Search
//!
//! Single-event Box Least Squares search over the phase bins of one segment,
//! after Kovács, Zucker & Mazeh (2002). For every start bin `i` the search
//! extends a window `[i, j]` over the duration range and keeps the end bin
//! maximising the signal residue
//!
//! ```text
//! srsq = s^2 / (r * (n - r))
//! ```
//!
//! where `s` is the summed flux of the non-empty bins in the window, `r` their
//! summed weight and `n` the total weight of the segment. The sum over the
//! minimum window is built once per start, keeping the cost at
//! O(nbins * window) instead of O(nbins * window^2).
//!
//! Three acceptance rules share the same scan:
//! - **single**: any improvement (the older kernel).
//! - **directional**: the window's most extreme flux and its flux sum must
//!   carry the requested sign, and the window may not hold every sample.
//! - **compound**: dip and blip trackers fed from one pass.
//!
//! ## Parameters
//! - **min_dur**: Bins folded in before the first candidate end. Defaults to 1.
//! - **max_dur**: Furthest end bin offset. Defaults to `nbins`.
//! - **total_weight**: `n`; defaults to the summed bin weights.
//! - **bound**: Whether end offset `max_dur` itself is scanned. Defaults to
//!   `DurationBound::Inclusive`.
//!
//! ## Errors
//! - **EmptyInputData**: bls_pulse: No bins supplied.
//! - **DataLengthMismatch**: bls_pulse: Bin columns differ in length.
//! - **InvalidDurationWindow**: bls_pulse: `min_dur > max_dur` or `min_dur >= nbins`.
//! - **InvalidDurationDays**: bls_pulse: Day-based window is not positive and increasing.
//! - **InvalidTotalWeight**: bls_pulse: `n` is negative or not finite.
//! - **InvalidBufferSize**: bls_pulse: Output arrays are not `nbins - min_dur` long.
//!
//! ## Returns
//! - **`Ok(PulseEvents)`** with one event per start bin. Starts without an
//!   accepted window report `srsq = 0` and `depth = NaN`.

use crate::transit::phase_bin::{
    check_geometry, PhaseBinError, PhaseBinParams, PhaseBinStream, PhaseBins, SegmentSpan,
};
use crate::utilities::enums::{Direction, DurationBound, Kernel, NanPolicy};
use crate::utilities::helpers::{extreme, resolve_kernel};
use crate::utilities::light_curve::LightCurve;
use log::debug;
#[cfg(feature = "python")]
use crate::utilities::helpers::validate_kernel;
#[cfg(feature = "python")]
use numpy::{IntoPyArray, PyReadonlyArray1};
#[cfg(feature = "python")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyDict};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Best event for one start bin.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseEvent {
    pub srsq: f64,
    pub duration: f64,
    pub depth: f64,
    pub midtime: f64,
}

impl PulseEvent {
    /// True when some window was accepted for this start.
    #[inline]
    pub fn is_detection(&self) -> bool {
        self.srsq > 0.0 && !self.depth.is_nan()
    }
}

/// Per-start event arrays; index `i` of every field is start bin `i`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PulseEvents {
    pub srsq: Vec<f64>,
    pub duration: Vec<f64>,
    pub depth: Vec<f64>,
    pub midtime: Vec<f64>,
}

impl PulseEvents {
    pub fn new(len: usize) -> Self {
        Self {
            srsq: vec![f64::NAN; len],
            duration: vec![f64::NAN; len],
            depth: vec![f64::NAN; len],
            midtime: vec![f64::NAN; len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.srsq.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.srsq.is_empty()
    }

    pub fn event(&self, i: usize) -> Option<PulseEvent> {
        if i >= self.len() {
            return None;
        }
        Some(PulseEvent {
            srsq: self.srsq[i],
            duration: self.duration[i],
            depth: self.depth[i],
            midtime: self.midtime[i],
        })
    }

    fn check_len(&self, expected: usize) -> Result<(), BlsPulseError> {
        for got in [
            self.srsq.len(),
            self.duration.len(),
            self.depth.len(),
            self.midtime.len(),
        ] {
            if got != expected {
                return Err(BlsPulseError::InvalidBufferSize { expected, got });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompoundEvents {
    pub dip: PulseEvents,
    pub blip: PulseEvents,
}

/// Writable view over the four event columns of one segment.
struct EventSlots<'a> {
    srsq: &'a mut [f64],
    duration: &'a mut [f64],
    depth: &'a mut [f64],
    midtime: &'a mut [f64],
}

impl EventSlots<'_> {
    #[inline(always)]
    fn put(&mut self, i: usize, time: &[f64], best: &Best) {
        let t0 = time[i];
        let t1 = time[best.end];
        self.srsq[i] = best.srsq;
        self.duration[i] = t1 - t0;
        self.depth[i] = best.depth;
        self.midtime[i] = (t1 + t0) / 2.0;
    }
}

#[inline(always)]
fn slots_of(ev: &mut PulseEvents) -> EventSlots<'_> {
    EventSlots {
        srsq: &mut ev.srsq,
        duration: &mut ev.duration,
        depth: &mut ev.depth,
        midtime: &mut ev.midtime,
    }
}

/// Acceptance rule for a candidate window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Any improvement of the statistic.
    Unchecked,
    /// `sign * d >= 0`, `sign * s >= 0` and `r != n`.
    Signed(Direction),
}

impl Gate {
    #[inline(always)]
    fn accepts(self, d: f64, s: f64, r: f64, n: f64) -> bool {
        match self {
            Gate::Unchecked => true,
            Gate::Signed(dir) => {
                let sign = dir.sign();
                sign * d >= 0.0 && sign * s >= 0.0 && r != n
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Best {
    srsq: f64,
    end: usize,
    depth: f64,
}

#[derive(Debug, Clone, Copy)]
struct SearchCtx<'a> {
    time: &'a [f64],
    flux: &'a [f64],
    samples: &'a [f64],
    nbins: usize,
    min_dur: usize,
    max_dur: usize,
    n: f64,
    bound: DurationBound,
}

impl<'a> SearchCtx<'a> {
    fn from_bins(bins: &'a PhaseBins, window: DurationWindow, n: f64, bound: DurationBound) -> Self {
        Self {
            time: bins.time(),
            flux: bins.flux(),
            samples: bins.samples(),
            nbins: bins.nbins(),
            min_dur: window.min,
            max_dur: window.max,
            n,
            bound,
        }
    }

    #[inline(always)]
    fn starts(&self) -> usize {
        self.nbins - self.min_dur
    }

    /// Best window starting at bin `i` for each of the `N` gates.
    #[inline(always)]
    fn scan_start<const N: usize>(&self, i: usize, gates: &[Gate; N]) -> [Best; N] {
        let mut best = [Best {
            srsq: 0.0,
            end: i,
            depth: f64::NAN,
        }; N];

        let flux = self.flux;
        let samples = self.samples;
        if samples[i] == 0.0 {
            return best;
        }

        let mut s = 0.0f64;
        let mut r = 0.0f64;
        // One extreme per tracker, all seeded and fed identically.
        let mut d = [flux[i]; N];

        for k in i..i + self.min_dur {
            if samples[k] == 0.0 {
                continue;
            }
            s += flux[k];
            r += samples[k];
            for dt in d.iter_mut() {
                *dt = extreme(*dt, flux[k]);
            }
        }

        let first = (i + self.min_dur).min(self.nbins);
        let stop = self.bound.end_exclusive(i, self.max_dur, self.nbins);
        for j in first..stop {
            if samples[j] == 0.0 {
                continue;
            }
            s += flux[j];
            r += samples[j];
            let srsq = (s * s) / (r * (self.n - r));

            for t in 0..N {
                d[t] = extreme(d[t], flux[j]);
                if srsq > best[t].srsq && gates[t].accepts(d[t], s, r, self.n) {
                    best[t] = Best {
                        srsq,
                        end: j,
                        depth: d[t],
                    };
                }
            }
        }
        best
    }
}

fn run_search<const N: usize>(
    ctx: &SearchCtx,
    gates: &[Gate; N],
    slots: &mut [EventSlots; N],
    kernel: Kernel,
) {
    let starts = ctx.starts();
    match kernel {
        Kernel::Parallel => {
            let bests: Vec<[Best; N]> = (0..starts)
                .into_par_iter()
                .map(|i| ctx.scan_start(i, gates))
                .collect();
            for (i, best) in bests.iter().enumerate() {
                for (slot, b) in slots.iter_mut().zip(best.iter()) {
                    slot.put(i, ctx.time, b);
                }
            }
        }
        _ => {
            for i in 0..starts {
                let best = ctx.scan_start(i, gates);
                for (slot, b) in slots.iter_mut().zip(best.iter()) {
                    slot.put(i, ctx.time, b);
                }
            }
        }
    }
}

fn search_into<const N: usize>(
    ctx: &SearchCtx,
    gates: [Gate; N],
    outs: [&mut PulseEvents; N],
    kernel: Kernel,
) -> Result<(), BlsPulseError> {
    let starts = ctx.starts();
    for out in outs.iter() {
        out.check_len(starts)?;
    }
    let mut slots = outs.map(slots_of);
    let chosen = resolve_kernel(kernel, starts);
    run_search(ctx, &gates, &mut slots, chosen);
    Ok(())
}

/// Inclusive duration range in bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DurationWindow {
    pub min: usize,
    pub max: usize,
}

impl DurationWindow {
    /// Converts a duration range in time units to whole bins, rounding the
    /// minimum down (at least 1) and the maximum up (at least 1, at most
    /// `nbins`).
    pub fn from_days(
        min_days: f64,
        max_days: f64,
        nbins: usize,
        segsize: f64,
    ) -> Result<Self, BlsPulseError> {
        check_geometry(nbins, segsize)?;
        if min_days.is_nan() || min_days <= 0.0 || !max_days.is_finite() || max_days <= min_days {
            return Err(BlsPulseError::InvalidDurationDays {
                min: min_days,
                max: max_days,
            });
        }
        let per_bin = nbins as f64 / segsize;
        let min = ((min_days * per_bin).floor() as usize).max(1);
        let max = ((max_days * per_bin).ceil() as usize).min(nbins).max(1);
        Ok(Self { min, max })
    }

    pub fn check(&self, nbins: usize) -> Result<(), BlsPulseError> {
        if self.min > self.max || self.min >= nbins {
            return Err(BlsPulseError::InvalidDurationWindow {
                min: self.min,
                max: self.max,
                nbins,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BlsPulseError {
    #[error("bls_pulse: Empty input data.")]
    EmptyInputData,
    #[error("bls_pulse: Data length mismatch: time={time_len}, flux={flux_len}, samples={samples_len}")]
    DataLengthMismatch {
        time_len: usize,
        flux_len: usize,
        samples_len: usize,
    },
    #[error("bls_pulse: Invalid duration window: min = {min}, max = {max}, nbins = {nbins}")]
    InvalidDurationWindow { min: usize, max: usize, nbins: usize },
    #[error("bls_pulse: Invalid duration in days: min = {min}, max = {max}")]
    InvalidDurationDays { min: f64, max: f64 },
    #[error("bls_pulse: Invalid total weight: n = {n}")]
    InvalidTotalWeight { n: f64 },
    #[error("bls_pulse: Invalid buffer size: expected = {expected}, got = {got}")]
    InvalidBufferSize { expected: usize, got: usize },
    #[error(transparent)]
    PhaseBin(#[from] PhaseBinError),
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlsPulseParams {
    pub min_dur: Option<usize>,
    pub max_dur: Option<usize>,
    pub total_weight: Option<f64>,
    pub bound: Option<DurationBound>,
}

impl Default for BlsPulseParams {
    fn default() -> Self {
        Self {
            min_dur: Some(1),
            max_dur: None,
            total_weight: None,
            bound: Some(DurationBound::Inclusive),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum BlsPulseData<'a> {
    Bins(&'a PhaseBins),
    Slices {
        time: &'a [f64],
        flux: &'a [f64],
        samples: &'a [f64],
    },
}

#[derive(Debug, Clone)]
pub struct BlsPulseInput<'a> {
    pub data: BlsPulseData<'a>,
    pub params: BlsPulseParams,
}

impl<'a> BlsPulseInput<'a> {
    #[inline]
    pub fn from_bins(bins: &'a PhaseBins, params: BlsPulseParams) -> Self {
        Self {
            data: BlsPulseData::Bins(bins),
            params,
        }
    }

    #[inline]
    pub fn from_slices(
        time: &'a [f64],
        flux: &'a [f64],
        samples: &'a [f64],
        params: BlsPulseParams,
    ) -> Self {
        Self {
            data: BlsPulseData::Slices {
                time,
                flux,
                samples,
            },
            params,
        }
    }

    #[inline]
    pub fn with_default_bins(bins: &'a PhaseBins) -> Self {
        Self::from_bins(bins, BlsPulseParams::default())
    }

    #[inline]
    pub fn get_min_dur(&self) -> usize {
        self.params.min_dur.unwrap_or(1)
    }

    #[inline]
    pub fn get_max_dur(&self, nbins: usize) -> usize {
        self.params.max_dur.unwrap_or(nbins)
    }

    #[inline]
    pub fn get_bound(&self) -> DurationBound {
        self.params.bound.unwrap_or_default()
    }

    fn columns(&self) -> (&'a [f64], &'a [f64], &'a [f64]) {
        match self.data {
            BlsPulseData::Bins(b) => (b.time(), b.flux(), b.samples()),
            BlsPulseData::Slices {
                time,
                flux,
                samples,
            } => (time, flux, samples),
        }
    }

    /// Number of start bins, the required length of each output array.
    pub fn output_len(&self) -> Result<usize, BlsPulseError> {
        prepare(self).map(|ctx| ctx.starts())
    }
}

fn prepare<'a>(input: &BlsPulseInput<'a>) -> Result<SearchCtx<'a>, BlsPulseError> {
    let (time, flux, samples) = input.columns();
    let nbins = time.len();
    if flux.len() != nbins || samples.len() != nbins {
        return Err(BlsPulseError::DataLengthMismatch {
            time_len: nbins,
            flux_len: flux.len(),
            samples_len: samples.len(),
        });
    }
    if nbins == 0 {
        return Err(BlsPulseError::EmptyInputData);
    }

    let window = DurationWindow {
        min: input.get_min_dur(),
        max: input.get_max_dur(nbins),
    };
    window.check(nbins)?;

    let n = input
        .params
        .total_weight
        .unwrap_or_else(|| samples.iter().sum());
    if !n.is_finite() || n < 0.0 {
        return Err(BlsPulseError::InvalidTotalWeight { n });
    }

    Ok(SearchCtx {
        time,
        flux,
        samples,
        nbins,
        min_dur: window.min,
        max_dur: window.max,
        n,
        bound: input.get_bound(),
    })
}

#[inline]
pub fn bls_pulse_single(input: &BlsPulseInput) -> Result<PulseEvents, BlsPulseError> {
    bls_pulse_single_with_kernel(input, Kernel::Auto)
}

pub fn bls_pulse_single_with_kernel(
    input: &BlsPulseInput,
    kernel: Kernel,
) -> Result<PulseEvents, BlsPulseError> {
    let ctx = prepare(input)?;
    let mut out = PulseEvents::new(ctx.starts());
    search_into(&ctx, [Gate::Unchecked], [&mut out], kernel)?;
    Ok(out)
}

pub fn bls_pulse_single_into(
    input: &BlsPulseInput,
    out: &mut PulseEvents,
    kernel: Kernel,
) -> Result<(), BlsPulseError> {
    let ctx = prepare(input)?;
    search_into(&ctx, [Gate::Unchecked], [out], kernel)
}

#[inline]
pub fn bls_pulse_directional(
    input: &BlsPulseInput,
    direction: Direction,
) -> Result<PulseEvents, BlsPulseError> {
    bls_pulse_directional_with_kernel(input, direction, Kernel::Auto)
}

pub fn bls_pulse_directional_with_kernel(
    input: &BlsPulseInput,
    direction: Direction,
    kernel: Kernel,
) -> Result<PulseEvents, BlsPulseError> {
    let ctx = prepare(input)?;
    let mut out = PulseEvents::new(ctx.starts());
    search_into(&ctx, [Gate::Signed(direction)], [&mut out], kernel)?;
    Ok(out)
}

pub fn bls_pulse_directional_into(
    input: &BlsPulseInput,
    direction: Direction,
    out: &mut PulseEvents,
    kernel: Kernel,
) -> Result<(), BlsPulseError> {
    let ctx = prepare(input)?;
    search_into(&ctx, [Gate::Signed(direction)], [out], kernel)
}

#[inline]
pub fn bls_pulse_compound(input: &BlsPulseInput) -> Result<CompoundEvents, BlsPulseError> {
    bls_pulse_compound_with_kernel(input, Kernel::Auto)
}

pub fn bls_pulse_compound_with_kernel(
    input: &BlsPulseInput,
    kernel: Kernel,
) -> Result<CompoundEvents, BlsPulseError> {
    let ctx = prepare(input)?;
    let mut dip = PulseEvents::new(ctx.starts());
    let mut blip = PulseEvents::new(ctx.starts());
    search_into(
        &ctx,
        [Gate::Signed(Direction::Dip), Gate::Signed(Direction::Blip)],
        [&mut dip, &mut blip],
        kernel,
    )?;
    Ok(CompoundEvents { dip, blip })
}

pub fn bls_pulse_compound_into(
    input: &BlsPulseInput,
    dip: &mut PulseEvents,
    blip: &mut PulseEvents,
    kernel: Kernel,
) -> Result<(), BlsPulseError> {
    let ctx = prepare(input)?;
    search_into(
        &ctx,
        [Gate::Signed(Direction::Dip), Gate::Signed(Direction::Blip)],
        [dip, blip],
        kernel,
    )
}

#[derive(Copy, Clone, Debug)]
pub struct BlsPulseBuilder {
    min_dur: Option<usize>,
    max_dur: Option<usize>,
    total_weight: Option<f64>,
    bound: Option<DurationBound>,
    kernel: Kernel,
}

impl Default for BlsPulseBuilder {
    fn default() -> Self {
        Self {
            min_dur: None,
            max_dur: None,
            total_weight: None,
            bound: None,
            kernel: Kernel::Auto,
        }
    }
}

impl BlsPulseBuilder {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn min_dur(mut self, n: usize) -> Self {
        self.min_dur = Some(n);
        self
    }

    #[inline(always)]
    pub fn max_dur(mut self, n: usize) -> Self {
        self.max_dur = Some(n);
        self
    }

    #[inline(always)]
    pub fn window(mut self, w: DurationWindow) -> Self {
        self.min_dur = Some(w.min);
        self.max_dur = Some(w.max);
        self
    }

    #[inline(always)]
    pub fn total_weight(mut self, n: f64) -> Self {
        self.total_weight = Some(n);
        self
    }

    #[inline(always)]
    pub fn bound(mut self, b: DurationBound) -> Self {
        self.bound = Some(b);
        self
    }

    #[inline(always)]
    pub fn kernel(mut self, k: Kernel) -> Self {
        self.kernel = k;
        self
    }

    #[inline(always)]
    fn params(&self) -> BlsPulseParams {
        BlsPulseParams {
            min_dur: self.min_dur,
            max_dur: self.max_dur,
            total_weight: self.total_weight,
            bound: self.bound,
        }
    }

    pub fn apply_single(self, bins: &PhaseBins) -> Result<PulseEvents, BlsPulseError> {
        let input = BlsPulseInput::from_bins(bins, self.params());
        bls_pulse_single_with_kernel(&input, self.kernel)
    }

    pub fn apply_directional(
        self,
        bins: &PhaseBins,
        direction: Direction,
    ) -> Result<PulseEvents, BlsPulseError> {
        let input = BlsPulseInput::from_bins(bins, self.params());
        bls_pulse_directional_with_kernel(&input, direction, self.kernel)
    }

    pub fn apply_compound(self, bins: &PhaseBins) -> Result<CompoundEvents, BlsPulseError> {
        let input = BlsPulseInput::from_bins(bins, self.params());
        bls_pulse_compound_with_kernel(&input, self.kernel)
    }

    pub fn apply_slices(
        self,
        time: &[f64],
        flux: &[f64],
        samples: &[f64],
        direction: Direction,
    ) -> Result<PulseEvents, BlsPulseError> {
        let input = BlsPulseInput::from_slices(time, flux, samples, self.params());
        bls_pulse_directional_with_kernel(&input, direction, self.kernel)
    }
}

/// What the batch search runs on every segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BatchMode {
    Directional(Direction),
    Compound,
}

impl Default for BatchMode {
    fn default() -> Self {
        BatchMode::Compound
    }
}

/// Batch search settings. Flux is expected baseline-subtracted (mean removed
/// or detrended): the dip and blip gates compare against zero.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlsPulseBatchParams {
    pub nbins: Option<usize>,
    pub segsize: Option<f64>,
    pub min_dur: Option<usize>,
    pub max_dur: Option<usize>,
    /// Duration range in time units; takes precedence over `min_dur`/`max_dur`.
    pub window_days: Option<(f64, f64)>,
    pub bound: Option<DurationBound>,
    pub nan_policy: Option<NanPolicy>,
    pub mode: Option<BatchMode>,
}

impl Default for BlsPulseBatchParams {
    fn default() -> Self {
        Self {
            nbins: Some(1000),
            segsize: None,
            min_dur: Some(1),
            max_dur: None,
            window_days: None,
            bound: Some(DurationBound::Inclusive),
            nan_policy: Some(NanPolicy::Skip),
            mode: Some(BatchMode::Compound),
        }
    }
}

impl BlsPulseBatchParams {
    fn resolve_window(&self, nbins: usize, segsize: f64) -> Result<DurationWindow, BlsPulseError> {
        let window = match self.window_days {
            Some((lo, hi)) => DurationWindow::from_days(lo, hi, nbins, segsize)?,
            None => DurationWindow {
                min: self.min_dur.unwrap_or(1),
                max: self.max_dur.unwrap_or(nbins),
            },
        };
        window.check(nbins)?;
        Ok(window)
    }
}

/// Row-major event matrix: row `r` is segment `r`, column `i` start bin `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct PulseEventMatrix {
    pub srsq: Vec<f64>,
    pub duration: Vec<f64>,
    pub depth: Vec<f64>,
    pub midtime: Vec<f64>,
    pub rows: usize,
    pub cols: usize,
}

impl PulseEventMatrix {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            srsq: vec![f64::NAN; rows * cols],
            duration: vec![f64::NAN; rows * cols],
            depth: vec![f64::NAN; rows * cols],
            midtime: vec![f64::NAN; rows * cols],
            rows,
            cols,
        }
    }

    pub fn row(&self, r: usize) -> Option<PulseEvents> {
        if r >= self.rows {
            return None;
        }
        let span = r * self.cols..(r + 1) * self.cols;
        Some(PulseEvents {
            srsq: self.srsq[span.clone()].to_vec(),
            duration: self.duration[span.clone()].to_vec(),
            depth: self.depth[span.clone()].to_vec(),
            midtime: self.midtime[span].to_vec(),
        })
    }

    pub fn event(&self, r: usize, i: usize) -> Option<PulseEvent> {
        if r >= self.rows || i >= self.cols {
            return None;
        }
        let k = r * self.cols + i;
        Some(PulseEvent {
            srsq: self.srsq[k],
            duration: self.duration[k],
            depth: self.depth[k],
            midtime: self.midtime[k],
        })
    }

    fn rows_mut(&mut self) -> impl Iterator<Item = EventSlots<'_>> {
        let cols = self.cols;
        self.srsq
            .chunks_mut(cols)
            .zip(self.duration.chunks_mut(cols))
            .zip(self.depth.chunks_mut(cols))
            .zip(self.midtime.chunks_mut(cols))
            .map(|(((srsq, duration), depth), midtime)| EventSlots {
                srsq,
                duration,
                depth,
                midtime,
            })
    }

    fn par_rows_mut(&mut self) -> impl IndexedParallelIterator<Item = EventSlots<'_>> {
        let cols = self.cols;
        self.srsq
            .par_chunks_mut(cols)
            .zip(self.duration.par_chunks_mut(cols))
            .zip(self.depth.par_chunks_mut(cols))
            .zip(self.midtime.par_chunks_mut(cols))
            .map(|(((srsq, duration), depth), midtime)| EventSlots {
                srsq,
                duration,
                depth,
                midtime,
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvents {
    Directional(PulseEventMatrix),
    Compound {
        dip: PulseEventMatrix,
        blip: PulseEventMatrix,
    },
}

#[derive(Debug, Clone)]
pub struct BlsPulseBatchOutput {
    pub spans: Vec<SegmentSpan>,
    pub events: BatchEvents,
    pub window: DurationWindow,
    pub rows: usize,
    pub cols: usize,
}

#[inline]
pub fn bls_pulse_batch(
    lc: LightCurve,
    params: &BlsPulseBatchParams,
) -> Result<BlsPulseBatchOutput, BlsPulseError> {
    bls_pulse_batch_with_kernel(lc, params, Kernel::Auto)
}

#[inline]
pub fn bls_pulse_batch_with_kernel(
    lc: LightCurve,
    params: &BlsPulseBatchParams,
    kernel: Kernel,
) -> Result<BlsPulseBatchOutput, BlsPulseError> {
    bls_pulse_batch_inner(lc, params, kernel)
}

#[inline(always)]
pub fn bls_pulse_batch_slice(
    lc: LightCurve,
    params: &BlsPulseBatchParams,
) -> Result<BlsPulseBatchOutput, BlsPulseError> {
    bls_pulse_batch_inner(lc, params, Kernel::Scalar)
}

#[inline(always)]
pub fn bls_pulse_batch_par_slice(
    lc: LightCurve,
    params: &BlsPulseBatchParams,
) -> Result<BlsPulseBatchOutput, BlsPulseError> {
    bls_pulse_batch_inner(lc, params, Kernel::Parallel)
}

fn bls_pulse_batch_inner(
    lc: LightCurve,
    params: &BlsPulseBatchParams,
    kernel: Kernel,
) -> Result<BlsPulseBatchOutput, BlsPulseError> {
    let nbins = params.nbins.unwrap_or(1000);
    let segsize = params.segsize.ok_or(PhaseBinError::MissingSegmentSize)?;
    check_geometry(nbins, segsize)?;
    let window = params.resolve_window(nbins, segsize)?;
    let bound = params.bound.unwrap_or_default();
    let mode = params.mode.unwrap_or_default();

    let mut stream = PhaseBinStream::try_new(
        lc,
        PhaseBinParams {
            nbins: Some(nbins),
            segsize: Some(segsize),
            nan_policy: params.nan_policy,
        },
    )?;
    let rows = stream.segment_count()?;
    let cols = nbins - window.min;

    // Binning stays sequential: each segment resumes from the previous cursor.
    let mut spans = Vec::with_capacity(rows);
    let mut bins = Vec::with_capacity(rows);
    for _ in 0..rows {
        let mut b = PhaseBins::new(nbins);
        spans.push(stream.advance(&mut b)?);
        bins.push(b);
    }

    let parallel = resolve_kernel(kernel, rows * cols).is_parallel();
    debug!(
        "bls_pulse: batch of {} segments x {} starts, window {}..={} bins, {:?}, parallel = {}",
        rows, cols, window.min, window.max, mode, parallel
    );

    let ctx_for = |row: usize| {
        let b = &bins[row];
        SearchCtx::from_bins(b, window, b.total_weight(), bound)
    };

    let events = match mode {
        BatchMode::Directional(direction) => {
            let gates = [Gate::Signed(direction)];
            let mut m = PulseEventMatrix::new(rows, cols);
            let do_row = |row: usize, slot: EventSlots| {
                run_search(&ctx_for(row), &gates, &mut [slot], Kernel::Scalar);
            };
            if parallel {
                m.par_rows_mut()
                    .enumerate()
                    .for_each(|(row, slot)| do_row(row, slot));
            } else {
                for (row, slot) in m.rows_mut().enumerate() {
                    do_row(row, slot);
                }
            }
            BatchEvents::Directional(m)
        }
        BatchMode::Compound => {
            let gates = [Gate::Signed(Direction::Dip), Gate::Signed(Direction::Blip)];
            let mut dip = PulseEventMatrix::new(rows, cols);
            let mut blip = PulseEventMatrix::new(rows, cols);
            let do_row = |row: usize, a: EventSlots, b: EventSlots| {
                run_search(&ctx_for(row), &gates, &mut [a, b], Kernel::Scalar);
            };
            if parallel {
                dip.par_rows_mut()
                    .zip(blip.par_rows_mut())
                    .enumerate()
                    .for_each(|(row, (a, b))| do_row(row, a, b));
            } else {
                for (row, (a, b)) in dip.rows_mut().zip(blip.rows_mut()).enumerate() {
                    do_row(row, a, b);
                }
            }
            BatchEvents::Compound { dip, blip }
        }
    };

    Ok(BlsPulseBatchOutput {
        spans,
        events,
        window,
        rows,
        cols,
    })
}

#[derive(Clone, Debug, Default)]
pub struct BlsPulseBatchBuilder {
    params: BlsPulseBatchParams,
    kernel: Kernel,
}

impl BlsPulseBatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kernel(mut self, k: Kernel) -> Self {
        self.kernel = k;
        self
    }

    pub fn nbins(mut self, n: usize) -> Self {
        self.params.nbins = Some(n);
        self
    }

    pub fn segsize(mut self, s: f64) -> Self {
        self.params.segsize = Some(s);
        self
    }

    pub fn window(mut self, min_dur: usize, max_dur: usize) -> Self {
        self.params.min_dur = Some(min_dur);
        self.params.max_dur = Some(max_dur);
        self.params.window_days = None;
        self
    }

    pub fn window_days(mut self, min_days: f64, max_days: f64) -> Self {
        self.params.window_days = Some((min_days, max_days));
        self
    }

    pub fn bound(mut self, b: DurationBound) -> Self {
        self.params.bound = Some(b);
        self
    }

    pub fn nan_policy(mut self, p: NanPolicy) -> Self {
        self.params.nan_policy = Some(p);
        self
    }

    pub fn mode(mut self, m: BatchMode) -> Self {
        self.params.mode = Some(m);
        self
    }

    pub fn apply(self, lc: LightCurve) -> Result<BlsPulseBatchOutput, BlsPulseError> {
        bls_pulse_batch_with_kernel(lc, &self.params, self.kernel)
    }

    pub fn apply_slices(
        self,
        time: &[f64],
        flux: &[f64],
        fluxerr: &[f64],
    ) -> Result<BlsPulseBatchOutput, BlsPulseError> {
        let lc = LightCurve::new(time, flux, fluxerr).map_err(PhaseBinError::from)?;
        self.apply(lc)
    }
}

#[cfg(feature = "python")]
fn events_dict<'py>(py: Python<'py>, ev: PulseEvents) -> PyResult<Bound<'py, PyDict>> {
    let dict = PyDict::new(py);
    dict.set_item("srsq", ev.srsq.into_pyarray(py))?;
    dict.set_item("duration", ev.duration.into_pyarray(py))?;
    dict.set_item("depth", ev.depth.into_pyarray(py))?;
    dict.set_item("midtime", ev.midtime.into_pyarray(py))?;
    Ok(dict)
}

#[cfg(feature = "python")]
fn py_params(
    min_dur: usize,
    max_dur: usize,
    total_weight: Option<f64>,
    inclusive: bool,
) -> BlsPulseParams {
    BlsPulseParams {
        min_dur: Some(min_dur),
        max_dur: Some(max_dur),
        total_weight,
        bound: Some(if inclusive {
            DurationBound::Inclusive
        } else {
            DurationBound::Exclusive
        }),
    }
}

/// `direction=None` runs the unchecked search; `-1`, `0` and `1` select dip,
/// best and blip.
#[cfg(feature = "python")]
#[pyfunction(name = "bls_pulse")]
#[pyo3(signature = (time, flux, samples, min_dur, max_dur, direction=None, total_weight=None, inclusive=true, kernel=None))]
pub fn bls_pulse_py<'py>(
    py: Python<'py>,
    time: PyReadonlyArray1<'py, f64>,
    flux: PyReadonlyArray1<'py, f64>,
    samples: PyReadonlyArray1<'py, f64>,
    min_dur: usize,
    max_dur: usize,
    direction: Option<i32>,
    total_weight: Option<f64>,
    inclusive: bool,
    kernel: Option<&str>,
) -> PyResult<Bound<'py, PyDict>> {
    let (t, f, w) = (time.as_slice()?, flux.as_slice()?, samples.as_slice()?);
    let kern = validate_kernel(kernel)?;
    let dir = match direction {
        None => None,
        Some(d) => Some(Direction::from_sign(d).ok_or_else(|| {
            PyValueError::new_err(format!("bls_pulse: Unknown direction: {}", d))
        })?),
    };
    let input = BlsPulseInput::from_slices(t, f, w, py_params(min_dur, max_dur, total_weight, inclusive));

    let events = py
        .allow_threads(|| match dir {
            None => bls_pulse_single_with_kernel(&input, kern),
            Some(d) => bls_pulse_directional_with_kernel(&input, d, kern),
        })
        .map_err(|e| PyValueError::new_err(e.to_string()))?;
    events_dict(py, events)
}

#[cfg(feature = "python")]
#[pyfunction(name = "bls_pulse_compound")]
#[pyo3(signature = (time, flux, samples, min_dur, max_dur, total_weight=None, inclusive=true, kernel=None))]
pub fn bls_pulse_compound_py<'py>(
    py: Python<'py>,
    time: PyReadonlyArray1<'py, f64>,
    flux: PyReadonlyArray1<'py, f64>,
    samples: PyReadonlyArray1<'py, f64>,
    min_dur: usize,
    max_dur: usize,
    total_weight: Option<f64>,
    inclusive: bool,
    kernel: Option<&str>,
) -> PyResult<Bound<'py, PyDict>> {
    let (t, f, w) = (time.as_slice()?, flux.as_slice()?, samples.as_slice()?);
    let kern = validate_kernel(kernel)?;
    let input = BlsPulseInput::from_slices(t, f, w, py_params(min_dur, max_dur, total_weight, inclusive));

    let CompoundEvents { dip, blip } = py
        .allow_threads(|| bls_pulse_compound_with_kernel(&input, kern))
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let dict = PyDict::new(py);
    dict.set_item("dip", events_dict(py, dip)?)?;
    dict.set_item("blip", events_dict(py, blip)?)?;
    Ok(dict)
}
