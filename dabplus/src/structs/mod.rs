//! Data structures for DAB signaling and DAB+ audio framing.

pub mod fig;
pub mod label;
pub mod pad;
pub mod service;
pub mod superframe_format;
