//! Utility functions and supporting infrastructure.
//!
//! Provides bitstream I/O, CRC validation and error types shared by the
//! signaling and superframe decoders.

pub mod bitstream_io;
pub mod crc;
pub mod errors;
