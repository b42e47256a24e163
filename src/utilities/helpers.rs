use crate::utilities::enums::Kernel;
use aligned_vec::{AVec, CACHELINE_ALIGN};
use std::sync::OnceLock;

/// Below this many start bins the rayon fan-out costs more than it saves.
pub const PARALLEL_MIN_BINS: usize = 512;

static POOL_IS_PARALLEL: OnceLock<bool> = OnceLock::new();

#[inline(always)]
fn pool_is_parallel() -> bool {
    *POOL_IS_PARALLEL.get_or_init(|| rayon::current_num_threads() > 1)
}

#[inline(always)]
pub fn detect_best_kernel(work: usize) -> Kernel {
    if work >= PARALLEL_MIN_BINS && pool_is_parallel() {
        Kernel::Parallel
    } else {
        Kernel::Scalar
    }
}

#[inline(always)]
pub fn resolve_kernel(kernel: Kernel, work: usize) -> Kernel {
    match kernel {
        Kernel::Auto => detect_best_kernel(work),
        k => k,
    }
}

/// Cache-line aligned buffer of `len` zeros.
#[inline]
pub fn alloc_zeroed(len: usize) -> AVec<f64> {
    let mut v: AVec<f64> = AVec::with_capacity(CACHELINE_ALIGN, len);
    for _ in 0..len {
        v.push(0.0);
    }
    v
}

/// The value of larger magnitude; ties (and NaN comparisons) keep `b`.
#[inline(always)]
pub fn extreme(a: f64, b: f64) -> f64 {
    if a.abs() > b.abs() {
        a
    } else {
        b
    }
}

/// Bitwise equality that treats any two NaNs as equal.
#[inline]
pub fn same_f64(a: f64, b: f64) -> bool {
    (a.is_nan() && b.is_nan()) || a.to_bits() == b.to_bits()
}

#[cfg(feature = "python")]
pub fn validate_kernel(kernel: Option<&str>) -> pyo3::PyResult<Kernel> {
    use pyo3::exceptions::PyValueError;
    match kernel.map(|k| k.to_ascii_lowercase()) {
        None => Ok(Kernel::Auto),
        Some(k) => match k.as_str() {
            "auto" => Ok(Kernel::Auto),
            "scalar" => Ok(Kernel::Scalar),
            "parallel" => Ok(Kernel::Parallel),
            other => Err(PyValueError::new_err(format!("Unknown kernel: {}", other))),
        },
    }
}
