//! # Phase Binning
//!
//! Folds one segment (trial period) of a time-ordered light curve into `nbins`
//! equal-width phase bins holding the mean time, mean flux, mean flux error
//! and sample count of the points that fall into each bin.
//!
//! Segment `n` covers `[n * segsize, (n + 1) * segsize)`. Binning resumes from
//! a cursor into the sample stream, so walking segments `0, 1, 2, ...` touches
//! every sample once: the total cost across all segments is O(nsamples).
//!
//! ## Parameters
//! - **nbins**: Number of phase bins per segment. Defaults to 1000.
//! - **segsize**: Segment length in time units. Required.
//! - **nan_policy**: `Skip` excludes NaN-flux samples, `Propagate` bins them.
//!   Defaults to `Skip`.
//!
//! ## Errors
//! - **InvalidBinCount**: phase_bin: `nbins` is zero.
//! - **InvalidSegmentSize**: phase_bin: `segsize` is not finite or not positive.
//! - **InvalidBufferSize**: phase_bin: output bins do not hold `nbins` bins.
//! - **CursorOutOfRange**: phase_bin: cursor is past the end of the stream.
//! - **SampleBeforeSegment**: phase_bin: the cursor points at a sample earlier
//!   than the segment start.
//!
//! ## Returns
//! - **`Ok(SegmentSpan)`** describing the consumed samples; bins with no
//!   samples hold `NaN` in every mean field.

use crate::utilities::enums::NanPolicy;
use crate::utilities::helpers::alloc_zeroed;
use crate::utilities::light_curve::{LightCurve, LightCurveError};
use aligned_vec::AVec;
use log::{debug, trace};
#[cfg(feature = "python")]
use numpy::{IntoPyArray, PyReadonlyArray1};
#[cfg(feature = "python")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyDict};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_NBINS: usize = 1000;

/// One phase bin viewed as a record.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseBin {
    pub time: f64,
    pub flux: f64,
    pub fluxerr: f64,
    pub samples: f64,
}

/// Structure-of-arrays storage for `nbins` phase bins.
///
/// Index `j` of `time`, `flux`, `fluxerr` and `samples` always refers to the
/// same bin. `samples` is a weight stored as `f64` because it feeds directly
/// into the floating-point search statistic.
#[derive(Debug, Clone)]
pub struct PhaseBins {
    time: AVec<f64>,
    flux: AVec<f64>,
    fluxerr: AVec<f64>,
    samples: AVec<f64>,
}

impl PhaseBins {
    /// Zeroed accumulators for `nbins` bins.
    pub fn new(nbins: usize) -> Self {
        Self {
            time: alloc_zeroed(nbins),
            flux: alloc_zeroed(nbins),
            fluxerr: alloc_zeroed(nbins),
            samples: alloc_zeroed(nbins),
        }
    }

    /// Builds bins from already-binned columns.
    pub fn from_slices(
        time: &[f64],
        flux: &[f64],
        fluxerr: &[f64],
        samples: &[f64],
    ) -> Result<Self, PhaseBinError> {
        let nbins = time.len();
        for got in [flux.len(), fluxerr.len(), samples.len()] {
            if got != nbins {
                return Err(PhaseBinError::InvalidBufferSize {
                    expected: nbins,
                    got,
                });
            }
        }
        let mut bins = Self::new(nbins);
        bins.time.copy_from_slice(time);
        bins.flux.copy_from_slice(flux);
        bins.fluxerr.copy_from_slice(fluxerr);
        bins.samples.copy_from_slice(samples);
        Ok(bins)
    }

    #[inline(always)]
    pub fn nbins(&self) -> usize {
        self.time.len()
    }

    #[inline(always)]
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    #[inline(always)]
    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    #[inline(always)]
    pub fn fluxerr(&self) -> &[f64] {
        &self.fluxerr
    }

    #[inline(always)]
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    #[inline]
    pub fn bin(&self, j: usize) -> Option<PhaseBin> {
        if j >= self.nbins() {
            return None;
        }
        Some(PhaseBin {
            time: self.time[j],
            flux: self.flux[j],
            fluxerr: self.fluxerr[j],
            samples: self.samples[j],
        })
    }

    #[inline(always)]
    pub fn is_empty_bin(&self, j: usize) -> bool {
        self.samples[j] == 0.0
    }

    /// Sum of the per-bin weights, the `n` of the search statistic.
    pub fn total_weight(&self) -> f64 {
        self.samples.iter().sum()
    }

    /// Number of bins holding at least one sample.
    pub fn occupied(&self) -> usize {
        self.samples.iter().filter(|&&w| w > 0.0).count()
    }

    /// Resets every accumulator to zero.
    pub fn clear(&mut self) {
        self.time.fill(0.0);
        self.flux.fill(0.0);
        self.fluxerr.fill(0.0);
        self.samples.fill(0.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = PhaseBin> + '_ {
        (0..self.nbins()).map(move |j| PhaseBin {
            time: self.time[j],
            flux: self.flux[j],
            fluxerr: self.fluxerr[j],
            samples: self.samples[j],
        })
    }
}

/// Which samples one binning call consumed.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentSpan {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    /// Cursor on entry.
    pub first_sample: usize,
    /// Cursor on exit; the first sample of the next segment.
    pub next_sample: usize,
    /// Samples that contributed to a bin.
    pub accepted: usize,
}

#[derive(Debug, Error)]
pub enum PhaseBinError {
    #[error(transparent)]
    LightCurve(#[from] LightCurveError),
    #[error("phase_bin: Invalid bin count: nbins = {nbins}")]
    InvalidBinCount { nbins: usize },
    #[error("phase_bin: Invalid segment size: segsize = {segsize}")]
    InvalidSegmentSize { segsize: f64 },
    #[error("phase_bin: Segment size not provided.")]
    MissingSegmentSize,
    #[error("phase_bin: Invalid buffer size: expected = {expected}, got = {got}")]
    InvalidBufferSize { expected: usize, got: usize },
    #[error("phase_bin: Cursor out of range: cursor = {cursor}, samples = {nsamples}")]
    CursorOutOfRange { cursor: usize, nsamples: usize },
    #[error("phase_bin: Sample {index} at time {time} precedes segment start {start}")]
    SampleBeforeSegment { index: usize, time: f64, start: f64 },
    #[error("phase_bin: Too many segments: segsize = {segsize}, last time = {last_time}")]
    TooManySegments { segsize: f64, last_time: f64 },
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseBinParams {
    pub nbins: Option<usize>,
    pub segsize: Option<f64>,
    pub nan_policy: Option<NanPolicy>,
}

impl Default for PhaseBinParams {
    fn default() -> Self {
        Self {
            nbins: Some(DEFAULT_NBINS),
            segsize: None,
            nan_policy: Some(NanPolicy::Skip),
        }
    }
}

impl PhaseBinParams {
    #[inline]
    pub fn get_nbins(&self) -> usize {
        self.nbins.unwrap_or(DEFAULT_NBINS)
    }

    #[inline]
    pub fn get_nan_policy(&self) -> NanPolicy {
        self.nan_policy.unwrap_or_default()
    }

    fn validated(&self) -> Result<(usize, f64, NanPolicy), PhaseBinError> {
        let nbins = self.get_nbins();
        let segsize = self.segsize.ok_or(PhaseBinError::MissingSegmentSize)?;
        check_geometry(nbins, segsize)?;
        Ok((nbins, segsize, self.get_nan_policy()))
    }
}

#[derive(Debug, Clone)]
pub enum PhaseBinData<'a> {
    LightCurve(LightCurve<'a>),
    Slices {
        time: &'a [f64],
        flux: &'a [f64],
        fluxerr: &'a [f64],
    },
}

#[derive(Debug, Clone)]
pub struct PhaseBinInput<'a> {
    pub data: PhaseBinData<'a>,
    pub params: PhaseBinParams,
}

impl<'a> PhaseBinInput<'a> {
    #[inline]
    pub fn from_light_curve(lc: LightCurve<'a>, params: PhaseBinParams) -> Self {
        Self {
            data: PhaseBinData::LightCurve(lc),
            params,
        }
    }

    #[inline]
    pub fn from_slices(
        time: &'a [f64],
        flux: &'a [f64],
        fluxerr: &'a [f64],
        params: PhaseBinParams,
    ) -> Self {
        Self {
            data: PhaseBinData::Slices {
                time,
                flux,
                fluxerr,
            },
            params,
        }
    }

    pub fn light_curve(&self) -> Result<LightCurve<'a>, PhaseBinError> {
        match &self.data {
            PhaseBinData::LightCurve(lc) => Ok(*lc),
            PhaseBinData::Slices {
                time,
                flux,
                fluxerr,
            } => Ok(LightCurve::new(time, flux, fluxerr)?),
        }
    }
}

/// Every segment of a light curve, binned.
#[derive(Debug, Clone)]
pub struct PhaseBinOutput {
    pub spans: Vec<SegmentSpan>,
    pub bins: Vec<PhaseBins>,
}

#[inline]
pub(crate) fn check_geometry(nbins: usize, segsize: f64) -> Result<(), PhaseBinError> {
    if nbins == 0 {
        return Err(PhaseBinError::InvalidBinCount { nbins });
    }
    if !segsize.is_finite() || segsize <= 0.0 {
        return Err(PhaseBinError::InvalidSegmentSize { segsize });
    }
    Ok(())
}

/// Bins every segment needed to cover the light curve.
pub fn phase_bin(input: &PhaseBinInput) -> Result<PhaseBinOutput, PhaseBinError> {
    let lc = input.light_curve()?;
    let mut stream = PhaseBinStream::try_new(lc, input.params.clone())?;
    let count = stream.segment_count()?;

    let mut spans = Vec::with_capacity(count);
    let mut bins = Vec::with_capacity(count);
    for _ in 0..count {
        let mut out = PhaseBins::new(stream.nbins());
        spans.push(stream.advance(&mut out)?);
        bins.push(out);
    }
    Ok(PhaseBinOutput { spans, bins })
}

/// Accumulates segment `segment` into `out`, starting at `*cursor`.
///
/// `out` is only added to, never cleared: zero it first unless accumulating
/// on purpose. On success `*cursor` holds the first sample of the next
/// segment and every bin of `out` holds a mean (or NaN when empty). On error
/// the contents of `out` are unspecified.
pub fn bin_segment_into(
    lc: &LightCurve,
    nbins: usize,
    segsize: f64,
    segment: usize,
    cursor: &mut usize,
    policy: NanPolicy,
    out: &mut PhaseBins,
) -> Result<SegmentSpan, PhaseBinError> {
    check_geometry(nbins, segsize)?;
    if out.nbins() != nbins {
        return Err(PhaseBinError::InvalidBufferSize {
            expected: nbins,
            got: out.nbins(),
        });
    }
    let nsamples = lc.len();
    if *cursor > nsamples {
        return Err(PhaseBinError::CursorOutOfRange {
            cursor: *cursor,
            nsamples,
        });
    }

    // Both edges come from a product so that one segment's end is exactly
    // the next segment's start.
    let start = segment as f64 * segsize;
    let end = (segment + 1) as f64 * segsize;
    let first = *cursor;

    let (next, accepted) = bin_segment_scalar(
        lc.time(),
        lc.flux(),
        lc.fluxerr(),
        start,
        end,
        segsize / nbins as f64,
        first,
        policy,
        out,
    )?;
    finalize_means(out);
    *cursor = next;

    Ok(SegmentSpan {
        index: segment,
        start,
        end,
        first_sample: first,
        next_sample: next,
        accepted,
    })
}

#[inline]
fn bin_segment_scalar(
    time: &[f64],
    flux: &[f64],
    fluxerr: &[f64],
    start: f64,
    end: f64,
    binsize: f64,
    from: usize,
    policy: NanPolicy,
    out: &mut PhaseBins,
) -> Result<(usize, usize), PhaseBinError> {
    let nsamples = time.len();
    let last_bin = out.nbins() - 1;
    let mut accepted = 0usize;
    let mut i = from;

    loop {
        if policy == NanPolicy::Skip {
            while i < nsamples && flux[i].is_nan() {
                i += 1;
            }
        }
        if i >= nsamples || time[i] >= end {
            break;
        }

        let t = time[i];
        if t < start {
            return Err(PhaseBinError::SampleBeforeSegment {
                index: i,
                time: t,
                start,
            });
        }
        // t just below `end` can round up to nbins.
        let j = (((t - start) / binsize).floor() as usize).min(last_bin);

        out.time[j] += t;
        out.flux[j] += flux[i];
        out.fluxerr[j] += fluxerr[i];
        out.samples[j] += 1.0;

        accepted += 1;
        i += 1;
    }

    Ok((i, accepted))
}

/// Turns per-bin sums into means; empty bins become 0/0 = NaN.
#[inline]
fn finalize_means(out: &mut PhaseBins) {
    for j in 0..out.nbins() {
        let w = out.samples[j];
        out.time[j] /= w;
        out.flux[j] /= w;
        out.fluxerr[j] /= w;
    }
}

/// Walks a light curve one segment at a time.
///
/// The stream owns the sample cursor and the segment counter; `advance` is
/// the only operation that moves them.
#[derive(Debug, Clone)]
pub struct PhaseBinStream<'a> {
    lc: LightCurve<'a>,
    nbins: usize,
    segsize: f64,
    policy: NanPolicy,
    cursor: usize,
    segment: usize,
}

impl<'a> PhaseBinStream<'a> {
    pub fn try_new(lc: LightCurve<'a>, params: PhaseBinParams) -> Result<Self, PhaseBinError> {
        let (nbins, segsize, policy) = params.validated()?;
        Ok(Self {
            lc,
            nbins,
            segsize,
            policy,
            cursor: 0,
            segment: 0,
        })
    }

    /// Clears `out` and bins the next segment into it.
    ///
    /// Once the stream is exhausted every further call yields all-empty bins.
    pub fn advance(&mut self, out: &mut PhaseBins) -> Result<SegmentSpan, PhaseBinError> {
        if out.nbins() != self.nbins {
            return Err(PhaseBinError::InvalidBufferSize {
                expected: self.nbins,
                got: out.nbins(),
            });
        }
        out.clear();
        let span = bin_segment_into(
            &self.lc,
            self.nbins,
            self.segsize,
            self.segment,
            &mut self.cursor,
            self.policy,
            out,
        )?;
        self.segment += 1;

        trace!(
            "phase_bin: segment {} [{}, {}) consumed samples {}..{} ({} binned)",
            span.index,
            span.start,
            span.end,
            span.first_sample,
            span.next_sample,
            span.accepted
        );
        if self.is_exhausted() && span.first_sample < span.next_sample {
            debug!(
                "phase_bin: sample stream exhausted after segment {} ({} samples)",
                span.index,
                self.lc.len()
            );
        }
        Ok(span)
    }

    #[inline(always)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Index of the segment the next `advance` will bin.
    #[inline(always)]
    pub fn segment(&self) -> usize {
        self.segment
    }

    #[inline(always)]
    pub fn nbins(&self) -> usize {
        self.nbins
    }

    #[inline(always)]
    pub fn segsize(&self) -> f64 {
        self.segsize
    }

    #[inline(always)]
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.lc.len()
    }

    /// Segments needed to cover the light curve. Fails when that many
    /// segments of `nbins` bins cannot be indexed.
    pub fn segment_count(&self) -> Result<usize, PhaseBinError> {
        self.lc
            .segment_count(self.segsize)
            .filter(|count| count.checked_mul(self.nbins).is_some())
            .ok_or(PhaseBinError::TooManySegments {
                segsize: self.segsize,
                last_time: self.lc.time()[self.lc.len() - 1],
            })
    }
}

#[derive(Copy, Clone, Debug)]
pub struct PhaseBinBuilder {
    nbins: Option<usize>,
    segsize: Option<f64>,
    nan_policy: Option<NanPolicy>,
}

impl Default for PhaseBinBuilder {
    fn default() -> Self {
        Self {
            nbins: None,
            segsize: None,
            nan_policy: None,
        }
    }
}

impl PhaseBinBuilder {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn nbins(mut self, n: usize) -> Self {
        self.nbins = Some(n);
        self
    }

    #[inline(always)]
    pub fn segsize(mut self, s: f64) -> Self {
        self.segsize = Some(s);
        self
    }

    #[inline(always)]
    pub fn nan_policy(mut self, p: NanPolicy) -> Self {
        self.nan_policy = Some(p);
        self
    }

    #[inline(always)]
    fn params(&self) -> PhaseBinParams {
        PhaseBinParams {
            nbins: self.nbins,
            segsize: self.segsize,
            nan_policy: self.nan_policy,
        }
    }

    pub fn apply(self, lc: LightCurve) -> Result<PhaseBinOutput, PhaseBinError> {
        phase_bin(&PhaseBinInput::from_light_curve(lc, self.params()))
    }

    pub fn apply_slices(
        self,
        time: &[f64],
        flux: &[f64],
        fluxerr: &[f64],
    ) -> Result<PhaseBinOutput, PhaseBinError> {
        phase_bin(&PhaseBinInput::from_slices(time, flux, fluxerr, self.params()))
    }

    pub fn into_stream(self, lc: LightCurve) -> Result<PhaseBinStream, PhaseBinError> {
        PhaseBinStream::try_new(lc, self.params())
    }
}

#[cfg(feature = "python")]
#[pyfunction(name = "phase_bin_segment")]
#[pyo3(signature = (time, flux, fluxerr, nbins, segsize, segment, cursor=0, skip_nan=true))]
pub fn phase_bin_segment_py<'py>(
    py: Python<'py>,
    time: PyReadonlyArray1<'py, f64>,
    flux: PyReadonlyArray1<'py, f64>,
    fluxerr: PyReadonlyArray1<'py, f64>,
    nbins: usize,
    segsize: f64,
    segment: usize,
    cursor: usize,
    skip_nan: bool,
) -> PyResult<Bound<'py, PyDict>> {
    let (t, f, e) = (time.as_slice()?, flux.as_slice()?, fluxerr.as_slice()?);
    let policy = if skip_nan {
        NanPolicy::Skip
    } else {
        NanPolicy::Propagate
    };

    let (bins, span) = py
        .allow_threads(|| -> Result<(PhaseBins, SegmentSpan), PhaseBinError> {
            let lc = LightCurve::new(t, f, e)?;
            let mut out = PhaseBins::new(nbins);
            let mut c = cursor;
            let span = bin_segment_into(&lc, nbins, segsize, segment, &mut c, policy, &mut out)?;
            Ok((out, span))
        })
        .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let dict = PyDict::new(py);
    dict.set_item("time", bins.time().to_vec().into_pyarray(py))?;
    dict.set_item("flux", bins.flux().to_vec().into_pyarray(py))?;
    dict.set_item("fluxerr", bins.fluxerr().to_vec().into_pyarray(py))?;
    dict.set_item("samples", bins.samples().to_vec().into_pyarray(py))?;
    dict.set_item("cursor", span.next_sample)?;
    Ok(dict)
}
