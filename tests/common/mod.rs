/// Shared fixtures for the integration tests.
use bls_pulse::{LightCurve, LightCurveError};

/// Synthetic light curve with one box-shaped event per period.
pub struct SyntheticCurve {
    pub time: Vec<f64>,
    pub flux: Vec<f64>,
    pub fluxerr: Vec<f64>,
    pub period: f64,
    /// Phase interval `[start, end)` holding the event.
    pub event: (f64, f64),
    pub depth: f64,
}

impl SyntheticCurve {
    /// `periods` periods of length `period`, sampled every `cadence` at
    /// half-cadence offsets so that no sample sits on a bin edge. Every
    /// `nan_every`-th flux is NaN (0 disables the gaps).
    pub fn boxed(
        periods: usize,
        period: f64,
        cadence: f64,
        event: (f64, f64),
        depth: f64,
        nan_every: usize,
    ) -> Self {
        let n = (periods as f64 * period / cadence).round() as usize;
        let mut time = Vec::with_capacity(n);
        let mut flux = Vec::with_capacity(n);
        for i in 0..n {
            let t = i as f64 * cadence + cadence / 2.0;
            let phase = t % period;
            let f = if nan_every > 0 && i % nan_every == nan_every - 1 {
                f64::NAN
            } else if phase >= event.0 && phase < event.1 {
                depth
            } else {
                0.0
            };
            time.push(t);
            flux.push(f + 0.0005 * (i as f64 * 0.37).sin());
        }
        let fluxerr = vec![0.001; n];
        Self {
            time,
            flux,
            fluxerr,
            period,
            event,
            depth,
        }
    }

    pub fn light_curve(&self) -> Result<LightCurve<'_>, LightCurveError> {
        LightCurve::new(&self.time, &self.flux, &self.fluxerr)
    }

    /// Absolute mid-time of the event in segment `segment`.
    pub fn event_center(&self, segment: usize) -> f64 {
        segment as f64 * self.period + (self.event.0 + self.event.1) / 2.0
    }
}

/// Compare two arrays with a tolerance
pub fn assert_array_close(actual: &[f64], expected: &[f64], rtol: f64, atol: f64, name: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{}: Length mismatch: actual {} vs expected {}",
        name,
        actual.len(),
        expected.len()
    );

    for (i, (&a, &e)) in actual.iter().zip(expected.iter()).enumerate() {
        if a.is_nan() && e.is_nan() {
            continue;
        }

        let diff = (a - e).abs();
        let tol = atol + rtol * e.abs();

        assert!(
            diff <= tol,
            "{}: Value mismatch at index {}: actual {} vs expected {} (diff: {}, tol: {})",
            name,
            i,
            a,
            e,
            diff,
            tol
        );
    }
}

/// Index of the largest value; the first one wins ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}
