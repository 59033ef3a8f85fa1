//! Decoder for DAB signaling and DAB+ audio sub-channels.
//!
//! ## Technical Overview
//!
//! ### Fast Information Channel
//!
//! The FIC carries the multiplex configuration in 32 byte Fast Information
//! Blocks (FIBs), each holding a list of Fast Information Groups (FIGs). The
//! decoder collects the ensemble identity and label, the sub-channel
//! organization and the services with their audio components and labels.
//!
//! ### DAB+ Audio
//!
//! A DAB+ sub-channel is a sequence of transport frames of `3 * bitrate`
//! bytes every 24 ms. Five frames form a superframe:
//!
//! - **Fire code**: protects the superframe header and marks its start
//! - **Header**: audio format and the start offsets of the access units (AUs)
//! - **AUs**: HE-AAC v2 raw data blocks, each followed by a CRC-16
//! - **RS parity**: RS(120,110) over column interleaved codewords
//!
//! ## Quick Start
//!
//! 1. Feed the FIC into [`process::fic::FicDecoder`] and pick a service
//! 2. Derive the frame length from its sub-channel organization
//! 3. Feed the sub-channel into [`process::superframe::SuperframeFilter`]
//!
//! ```rust,no_run
//! use dabplus::process::codec::{Codec, CodecBackend};
//! use dabplus::process::fic::{FicDecoder, FicDecoderConfig, FicDecoderObserver};
//! use dabplus::process::superframe::{AssemblerConfig, SubchannelSinkObserver, SuperframeFilter};
//!
//! struct Observer;
//! impl FicDecoderObserver for Observer {}
//! impl SubchannelSinkObserver for Observer {}
//!
//! let mut fic_decoder = FicDecoder::new(FicDecoderConfig::default(), Observer);
//! fic_decoder.process(&std::fs::read("ensemble.fic")?);
//!
//! let service = fic_decoder.services().into_iter().find(|s| s.audio.dab_plus);
//! if let Some(frame_len) = service.and_then(|s| s.subchannel.frame_len()) {
//!     let config = AssemblerConfig::new(frame_len);
//!     let mut filter = SuperframeFilter::new(config, Codec::new(CodecBackend::Adts), Observer)?;
//!
//!     for frame in std::fs::read("subchannel.dabp")?.chunks_exact(frame_len) {
//!         filter.feed(frame)?;
//!     }
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Version of this library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Decoding pipelines.
///
/// 1. **FIC** ([`process::fic`]): Signaling and service directory.
///
/// 2. **Superframes** ([`process::superframe`]): Synchronization and AU extraction.
///
/// 3. **Error Correction** ([`process::rs`]) and **Codecs** ([`process::codec`]):
///    Collaborators of the superframe filter.
pub mod process;

/// Data structures of DAB signaling and DAB+ framing.
///
/// - **FIGs** ([`structs::fig`]): FIG headers and records
/// - **Services** ([`structs::service`]): Ensemble, services and sub-channels
/// - **Labels** ([`structs::label`]): Character sets and short labels
/// - **Superframe Format** ([`structs::superframe_format`]): Header and AU layout
/// - **PAD** ([`structs::pad`]): Programme Associated Data
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading
/// - **CRC Validation** ([`utils::crc`]): Error detection
/// - **Error Handling** ([`utils::errors`]): Error types
pub mod utils;
