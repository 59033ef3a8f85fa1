//! Audio codec boundary of the superframe filter.
//!
//! The filter hands each CRC-checked access unit to an [`AudioCodec`]. Two
//! backends are built in: [`AdtsCodec`] wraps AUs into ADTS frames for
//! external AAC decoders and players, [`RawCodec`] passes AUs through
//! together with the AudioSpecificConfig. Further decoders (e.g. bindings to
//! a native HE-AAC library) plug in through [`Codec::External`].

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::{Result, bail};
use log::debug;

use crate::process::superframe::SubchannelSinkObserver;
use crate::structs::superframe_format::SuperframeFormat;
use crate::utils::errors::{CodecError, ConfigError};

/// Output parameters announced to the sink when a format is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    pub format: SuperframeFormat,
    pub sample_rate: u32,
    pub channels: u8,
    pub asc: [u8; 2],
    pub description: String,
}

impl From<&SuperframeFormat> for AudioConfig {
    fn from(format: &SuperframeFormat) -> Self {
        Self {
            format: *format,
            sample_rate: format.sample_rate(),
            channels: format.output_channels(),
            asc: format.audio_specific_config(),
            description: format.to_string(),
        }
    }
}

/// One unit of codec output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioFrame<'a> {
    /// Interleaved PCM samples. The in-tree backends pass AUs on undecoded,
    /// PCM comes from decoders plugged in as [`Codec::External`].
    Pcm {
        samples: &'a [i16],
        channels: u8,
        sample_rate: u32,
    },
    /// An AU with ADTS header.
    Adts(&'a [u8]),
    /// An AU as carried in the superframe, without CRC.
    Raw(&'a [u8]),
}

pub trait AudioCodec {
    fn name(&self) -> &'static str;

    /// (Re)initializes the codec for `format` and announces the output to `sink`.
    fn configure(
        &mut self,
        format: &SuperframeFormat,
        sink: &mut dyn SubchannelSinkObserver,
    ) -> Result<()>;

    /// Decodes one AU (without CRC) and hands the output to `sink`.
    ///
    /// Errors are reported per AU; the codec has to accept further AUs after
    /// a failure.
    fn decode_frame(
        &mut self,
        au_index: usize,
        au: &[u8],
        sink: &mut dyn SubchannelSinkObserver,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecBackend {
    #[default]
    Adts,
    Raw,
}

impl FromStr for CodecBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "adts" => Ok(Self::Adts),
            "raw" => Ok(Self::Raw),
            _ => Err(ConfigError::UnknownCodecBackend(s.to_string())),
        }
    }
}

impl Display for CodecBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecBackend::Adts => write!(f, "adts"),
            CodecBackend::Raw => write!(f, "raw"),
        }
    }
}

/// The codec used by a superframe filter.
pub enum Codec {
    Adts(AdtsCodec),
    Raw(RawCodec),
    External(Box<dyn AudioCodec + Send>),
}

impl Codec {
    pub fn new(backend: CodecBackend) -> Self {
        match backend {
            CodecBackend::Adts => Self::Adts(AdtsCodec::default()),
            CodecBackend::Raw => Self::Raw(RawCodec::default()),
        }
    }

    fn inner(&mut self) -> &mut dyn AudioCodec {
        match self {
            Codec::Adts(codec) => codec,
            Codec::Raw(codec) => codec,
            Codec::External(codec) => codec.as_mut(),
        }
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(CodecBackend::default())
    }
}

impl AudioCodec for Codec {
    fn name(&self) -> &'static str {
        match self {
            Codec::Adts(codec) => codec.name(),
            Codec::Raw(codec) => codec.name(),
            Codec::External(codec) => codec.name(),
        }
    }

    fn configure(
        &mut self,
        format: &SuperframeFormat,
        sink: &mut dyn SubchannelSinkObserver,
    ) -> Result<()> {
        self.inner().configure(format, sink)
    }

    fn decode_frame(
        &mut self,
        au_index: usize,
        au: &[u8],
        sink: &mut dyn SubchannelSinkObserver,
    ) -> Result<()> {
        self.inner().decode_frame(au_index, au, sink)
    }
}

/// Length of an ADTS header without CRC.
pub const ADTS_HEADER_LEN: usize = 7;

/// Largest value of the 13-bit ADTS frame length field.
const ADTS_MAX_FRAME_LEN: usize = 0x1FFF;

/// Buffer fullness value signaling a variable bitrate stream.
const ADTS_BUFFER_FULLNESS_VBR: u16 = 0x7FF;

/// Wraps AUs into ADTS frames (MPEG-4, AAC LC, no CRC).
///
/// SBR and PS stay implicitly signaled. ADTS cannot carry the 960 sample
/// transform flag; decoders detect it from the frame duration.
#[derive(Debug, Default)]
pub struct AdtsCodec {
    sr_index: u8,
    channel_config: u8,
    configured: bool,
    frame: Vec<u8>,
}

impl AdtsCodec {
    fn write_header(&mut self, au_len: usize) -> Result<()> {
        let frame_len = ADTS_HEADER_LEN + au_len;
        if frame_len > ADTS_MAX_FRAME_LEN {
            bail!(CodecError::AccessUnitTooLong(au_len));
        }

        // AAC LC, coded as object type - 1
        const PROFILE: u8 = 1;
        let fullness = ADTS_BUFFER_FULLNESS_VBR;

        self.frame.clear();
        self.frame.extend_from_slice(&[
            0xFF,
            // syncword low nibble, MPEG-4, layer 0, protection absent
            0xF1,
            PROFILE << 6 | self.sr_index << 2 | (self.channel_config >> 2) & 0x01,
            (self.channel_config & 0x03) << 6 | (frame_len >> 11) as u8 & 0x03,
            (frame_len >> 3) as u8,
            ((frame_len & 0x07) as u8) << 5 | (fullness >> 6) as u8 & 0x1F,
            ((fullness & 0x3F) as u8) << 2,
        ]);

        Ok(())
    }
}

impl AudioCodec for AdtsCodec {
    fn name(&self) -> &'static str {
        "adts"
    }

    fn configure(
        &mut self,
        format: &SuperframeFormat,
        sink: &mut dyn SubchannelSinkObserver,
    ) -> Result<()> {
        self.sr_index = format.core_sample_rate_index();
        self.channel_config = format
            .channel_configuration()
            .unwrap_or(if format.aac_channel_mode { 2 } else { 1 });
        self.configured = true;

        debug!(
            "ADTS: sampling frequency index {}, channel configuration {}",
            self.sr_index, self.channel_config
        );
        sink.start_audio(&AudioConfig::from(format));

        Ok(())
    }

    fn decode_frame(
        &mut self,
        au_index: usize,
        au: &[u8],
        sink: &mut dyn SubchannelSinkObserver,
    ) -> Result<()> {
        if !self.configured {
            bail!(CodecError::NotConfigured(self.name()));
        }

        self.write_header(au.len())?;
        self.frame.extend_from_slice(au);
        sink.put_audio(au_index, AudioFrame::Adts(&self.frame));

        Ok(())
    }
}

/// Passes AUs through unchanged.
#[derive(Debug, Default)]
pub struct RawCodec {
    configured: bool,
}

impl AudioCodec for RawCodec {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn configure(
        &mut self,
        format: &SuperframeFormat,
        sink: &mut dyn SubchannelSinkObserver,
    ) -> Result<()> {
        self.configured = true;
        sink.start_audio(&AudioConfig::from(format));
        Ok(())
    }

    fn decode_frame(
        &mut self,
        au_index: usize,
        au: &[u8],
        sink: &mut dyn SubchannelSinkObserver,
    ) -> Result<()> {
        if !self.configured {
            bail!(CodecError::NotConfigured(self.name()));
        }

        sink.put_audio(au_index, AudioFrame::Raw(au));
        Ok(())
    }
}

#[cfg(test)]
#[derive(Default)]
struct FrameCollector {
    configs: Vec<AudioConfig>,
    frames: Vec<(usize, Vec<u8>)>,
    pcm: Vec<(usize, Vec<i16>, u8)>,
}

#[cfg(test)]
impl SubchannelSinkObserver for FrameCollector {
    fn start_audio(&mut self, config: &AudioConfig) {
        self.configs.push(config.clone());
    }

    fn put_audio(&mut self, au_index: usize, frame: AudioFrame<'_>) {
        match frame {
            AudioFrame::Adts(data) | AudioFrame::Raw(data) => {
                self.frames.push((au_index, data.to_vec()))
            }
            AudioFrame::Pcm {
                samples, channels, ..
            } => self.pcm.push((au_index, samples.to_vec(), channels)),
        }
    }
}

#[test]
fn adts_header_fields() -> Result<()> {
    let mut sink = FrameCollector::default();
    let mut codec = Codec::new(CodecBackend::Adts);

    // HE-AAC, 48 kHz, stereo core
    let format = SuperframeFormat::from(0b0111_0000);
    codec.configure(&format, &mut sink)?;
    assert_eq!(sink.configs[0].description, "HE-AAC, 48 kHz Stereo");
    assert_eq!(sink.configs[0].channels, 2);

    codec.decode_frame(2, &[0xAB; 100], &mut sink)?;
    let (au_index, frame) = &sink.frames[0];
    assert_eq!(*au_index, 2);
    assert_eq!(frame.len(), 107);
    // 24 kHz core (index 6), channel configuration 2, frame length 107
    assert_eq!(frame[..7], [0xFF, 0xF1, 0x58, 0x80, 0x0D, 0x7F, 0xFC]);
    assert_eq!(frame[7..], [0xAB; 100]);

    let err = codec.decode_frame(0, &[0; 8190], &mut sink).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CodecError>(),
        Some(CodecError::AccessUnitTooLong(8190))
    ));
    Ok(())
}

#[test]
fn raw_passthrough_and_backend_selection() -> Result<()> {
    assert_eq!("ADTS".parse::<CodecBackend>()?, CodecBackend::Adts);
    assert_eq!("raw".parse::<CodecBackend>()?, CodecBackend::Raw);
    assert!(matches!(
        "mp2".parse::<CodecBackend>(),
        Err(ConfigError::UnknownCodecBackend(_))
    ));

    let mut sink = FrameCollector::default();
    let mut codec = Codec::new(CodecBackend::Raw);
    assert_eq!(codec.name(), "raw");

    let err = codec.decode_frame(0, &[1, 2, 3], &mut sink).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CodecError>(),
        Some(CodecError::NotConfigured("raw"))
    ));

    codec.configure(&SuperframeFormat::from(0x00), &mut sink)?;
    assert_eq!(sink.configs[0].asc, [0x12, 0x8C]);
    codec.decode_frame(1, &[1, 2, 3], &mut sink)?;
    assert_eq!(sink.frames, vec![(1, vec![1, 2, 3])]);
    Ok(())
}

#[test]
fn external_decoder_delivers_pcm() -> Result<()> {
    /// Decodes every AU to silence of the configured layout.
    #[derive(Default)]
    struct Silence {
        config: Option<AudioConfig>,
    }

    impl AudioCodec for Silence {
        fn name(&self) -> &'static str {
            "silence"
        }

        fn configure(
            &mut self,
            format: &SuperframeFormat,
            sink: &mut dyn SubchannelSinkObserver,
        ) -> Result<()> {
            let config = AudioConfig::from(format);
            sink.start_audio(&config);
            self.config = Some(config);
            Ok(())
        }

        fn decode_frame(
            &mut self,
            au_index: usize,
            _au: &[u8],
            sink: &mut dyn SubchannelSinkObserver,
        ) -> Result<()> {
            let Some(config) = &self.config else {
                bail!(CodecError::NotConfigured("silence"));
            };
            let samples = vec![0i16; 4 * config.channels as usize];
            sink.put_audio(au_index, AudioFrame::Pcm {
                samples: &samples,
                channels: config.channels,
                sample_rate: config.sample_rate,
            });
            Ok(())
        }
    }

    let mut sink = FrameCollector::default();
    let mut codec = Codec::External(Box::new(Silence::default()));
    assert_eq!(codec.name(), "silence");

    codec.configure(&SuperframeFormat::from(0b0111_0000), &mut sink)?;
    codec.decode_frame(1, &[0xAB; 10], &mut sink)?;

    assert!(sink.frames.is_empty());
    assert_eq!(sink.pcm, vec![(1, vec![0; 8], 2)]);
    Ok(())
}
