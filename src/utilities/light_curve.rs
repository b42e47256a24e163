use thiserror::Error;

/// Borrowed view of a time-ordered sample stream.
///
/// `time[k]`, `flux[k]` and `fluxerr[k]` describe the same sample. Times are
/// expected to be zero-based (the first segment starts at `0.0`) and are
/// checked to be non-decreasing when the view is built.
#[derive(Debug, Clone, Copy)]
pub struct LightCurve<'a> {
    time: &'a [f64],
    flux: &'a [f64],
    fluxerr: &'a [f64],
}

#[derive(Debug, Error, PartialEq)]
pub enum LightCurveError {
    #[error("light_curve: Empty sample stream.")]
    EmptyInputData,
    #[error("light_curve: Data length mismatch: time={time_len}, flux={flux_len}, fluxerr={fluxerr_len}")]
    DataLengthMismatch {
        time_len: usize,
        flux_len: usize,
        fluxerr_len: usize,
    },
    #[error("light_curve: Time is not sorted at index {index} ({prev} > {next})")]
    UnsortedTime { index: usize, prev: f64, next: f64 },
    #[error("light_curve: Time is not finite at index {index}")]
    NonFiniteTime { index: usize },
}

impl<'a> LightCurve<'a> {
    pub fn new(
        time: &'a [f64],
        flux: &'a [f64],
        fluxerr: &'a [f64],
    ) -> Result<Self, LightCurveError> {
        if time.len() != flux.len() || time.len() != fluxerr.len() {
            return Err(LightCurveError::DataLengthMismatch {
                time_len: time.len(),
                flux_len: flux.len(),
                fluxerr_len: fluxerr.len(),
            });
        }
        if time.is_empty() {
            return Err(LightCurveError::EmptyInputData);
        }
        if let Some(index) = time.iter().position(|t| !t.is_finite()) {
            return Err(LightCurveError::NonFiniteTime { index });
        }
        if let Some(w) = time.windows(2).position(|w| w[0] > w[1]) {
            return Err(LightCurveError::UnsortedTime {
                index: w + 1,
                prev: time[w],
                next: time[w + 1],
            });
        }
        Ok(Self {
            time,
            flux,
            fluxerr,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    #[inline(always)]
    pub fn time(&self) -> &'a [f64] {
        self.time
    }

    #[inline(always)]
    pub fn flux(&self) -> &'a [f64] {
        self.flux
    }

    #[inline(always)]
    pub fn fluxerr(&self) -> &'a [f64] {
        self.fluxerr
    }

    /// Time span covered, `time[last] - time[0]`.
    pub fn baseline(&self) -> f64 {
        self.time[self.time.len() - 1] - self.time[0]
    }

    /// Number of `segsize`-long segments needed to cover every sample,
    /// `floor(time[last] / segsize) + 1`, or `None` when that does not fit
    /// in a `usize`.
    pub fn segment_count(&self, segsize: f64) -> Option<usize> {
        let last = self.time[self.time.len() - 1].max(0.0);
        let ratio = (last / segsize).floor();
        if !ratio.is_finite() || ratio < 0.0 || ratio >= usize::MAX as f64 {
            return None;
        }
        (ratio as usize).checked_add(1)
    }

    /// Number of samples whose flux is NaN.
    pub fn nan_count(&self) -> usize {
        self.flux.iter().filter(|f| f.is_nan()).count()
    }
}
