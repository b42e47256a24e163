use pyo3::prelude::*;

use crate::transit::bls_pulse::{bls_pulse_compound_py, bls_pulse_py};
use crate::transit::phase_bin::phase_bin_segment_py;

#[pymodule]
fn bls_pulse(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(phase_bin_segment_py, m)?)?;

    m.add_function(wrap_pyfunction!(bls_pulse_py, m)?)?;
    m.add_function(wrap_pyfunction!(bls_pulse_compound_py, m)?)?;
    Ok(())
}
