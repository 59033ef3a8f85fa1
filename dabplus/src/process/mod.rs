//! Decoding pipelines for the FIC and DAB+ sub-channels.

/// Fast Information Channel decoding.
///
/// Provides the [`FicDecoder`](fic::FicDecoder) maintaining the ensemble and
/// service directory, readable from other threads through
/// [`FicHandle`](fic::FicHandle).
pub mod fic;

/// DAB+ superframe synchronization.
///
/// Provides the [`SuperframeFilter`](superframe::SuperframeFilter) turning
/// transport frames into access units and ancillary data.
pub mod superframe;

/// Reed-Solomon correction of superframes.
pub mod rs;

/// Audio codec backends fed by the superframe filter.
pub mod codec;
