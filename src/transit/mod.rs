pub mod bls_pulse;
pub mod phase_bin;

pub use bls_pulse::{
    bls_pulse_batch, bls_pulse_compound, bls_pulse_directional, bls_pulse_single, BatchEvents,
    BatchMode, BlsPulseBatchBuilder, BlsPulseBuilder, BlsPulseError, BlsPulseInput,
    BlsPulseParams, CompoundEvents, DurationWindow, PulseEvent, PulseEvents,
};
pub use phase_bin::{
    bin_segment_into, phase_bin, PhaseBinBuilder, PhaseBinError, PhaseBinInput, PhaseBinParams,
    PhaseBinStream, PhaseBins, SegmentSpan,
};
