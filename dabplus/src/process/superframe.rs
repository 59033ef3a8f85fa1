//! DAB+ superframe synchronization and access unit extraction.
//!
//! Five consecutive transport frames of a DAB+ sub-channel form a superframe.
//! The filter keeps a window of the last five frames, RS corrects a copy of it
//! and checks whether the copy starts with a superframe header. After the
//! configured number of passing checks the stream is synchronized: every
//! following superframe has its format derived and its access units handed to
//! the codec.

use anyhow::{Result, bail};
use log::{debug, info, trace, warn};

use crate::process::codec::{AudioCodec, AudioConfig, AudioFrame, Codec};
use crate::process::rs::{
    self, CodewordCorrector, CorrectionStats, RS_CODEWORD_LEN, RS_DATA_LEN, RsCorrector,
};
use crate::structs::pad::AncillaryData;
use crate::structs::service::FRAME_BYTES_PER_KBPS;
use crate::structs::superframe_format::{AuTable, HEADER_LEN, SuperframeFormat};
use crate::utils::crc::{CRC_CCITT_ALG, CRC_FIRE_CODE_ALG, Crc16};
use crate::utils::errors::{ConfigError, SuperframeError};

/// Transport frames per superframe.
pub const FRAMES_PER_SUPERFRAME: usize = 5;

/// Shortest transport frame holding a complete superframe header.
pub const MIN_FRAME_LEN: usize = 10;

pub const DEFAULT_SYNC_THRESHOLD: usize = 2;

static FIRE_CODE: Crc16 = Crc16::new(&CRC_FIRE_CODE_ALG);
static AU_CRC: Crc16 = Crc16::new(&CRC_CCITT_ALG);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Bytes per transport frame.
    pub frame_len: usize,
    /// Consecutive passing superframe checks needed to synchronize.
    pub sync_threshold: usize,
}

impl AssemblerConfig {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len,
            sync_threshold: DEFAULT_SYNC_THRESHOLD,
        }
    }

    /// Configuration for a DAB+ sub-channel of `bitrate` kbit/s.
    pub fn from_bitrate(bitrate: u16) -> Self {
        Self::new(bitrate as usize * FRAME_BYTES_PER_KBPS)
    }

    pub fn superframe_len(&self) -> usize {
        self.frame_len * FRAMES_PER_SUPERFRAME
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_len < MIN_FRAME_LEN {
            return Err(ConfigError::FrameLengthTooShort(self.frame_len));
        }
        if self.superframe_len() % RS_CODEWORD_LEN != 0 {
            return Err(ConfigError::FrameLengthNotAllowed(self.frame_len));
        }
        if self.sync_threshold == 0 {
            return Err(ConfigError::ZeroSyncThreshold);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsynchronized,
    /// `passes` consecutive windows passed the check, fewer than the threshold.
    SyncChecking {
        passes: usize,
    },
    Synchronized,
}

/// Counters over the lifetime of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuperframeStats {
    pub superframes: u64,
    pub sync_losses: u64,
    pub rs_corrected_symbols: u64,
    pub rs_uncorrectable_codewords: u64,
    pub degraded_superframes: u64,
    pub aus: u64,
    pub au_crc_errors: u64,
    pub pads: u64,
    pub codec_errors: u64,
}

/// Outcome of one processed superframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperframeStatus {
    /// Number of the superframe since the filter was created, starting at 0.
    pub index: u64,
    pub correction: CorrectionStats,
    pub num_aus: usize,
    pub au_crc_errors: usize,
    pub codec_errors: usize,
}

impl SuperframeStatus {
    /// Uncorrectable codewords were passed on as received.
    pub fn is_degraded(&self) -> bool {
        self.correction.is_degraded()
    }
}

/// Receiver of the filter and codec output.
///
/// All methods default to doing nothing.
pub trait SubchannelSinkObserver {
    fn format_change(&mut self, _format: &SuperframeFormat) {}
    fn start_audio(&mut self, _config: &AudioConfig) {}
    fn put_audio(&mut self, _au_index: usize, _frame: AudioFrame<'_>) {}
    /// Called for each AU with a valid CRC, before the AU is decoded.
    fn process_pad(&mut self, _au_index: usize, _pad: Option<&AncillaryData>) {}
    fn sync_change(&mut self, _state: SyncState) {}
    fn superframe_status(&mut self, _status: &SuperframeStatus) {}
}

/// Reassembles transport frames into superframes and dispatches their AUs.
///
/// # Example
///
/// ```rust,no_run
/// use dabplus::process::codec::{Codec, CodecBackend};
/// use dabplus::process::superframe::{AssemblerConfig, SubchannelSinkObserver, SuperframeFilter};
///
/// struct Sink;
/// impl SubchannelSinkObserver for Sink {}
///
/// let config = AssemblerConfig::from_bitrate(96);
/// let mut filter = SuperframeFilter::new(config, Codec::new(CodecBackend::Adts), Sink)?;
///
/// let subchannel = std::fs::read("subchannel.dabp")?;
/// for frame in subchannel.chunks_exact(config.frame_len) {
///     filter.feed(frame)?;
/// }
/// println!("{:?}", filter.stats());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct SuperframeFilter<O, C = RsCorrector> {
    config: AssemblerConfig,
    corrector: C,
    codec: Codec,
    observer: O,

    sf_raw: Vec<u8>,
    sf: Vec<u8>,
    frame_count: usize,

    state: SyncState,
    format_raw: Option<u8>,
    format: Option<SuperframeFormat>,
    au_table: Option<AuTable>,

    stats: SuperframeStats,
}

impl<O> SuperframeFilter<O, RsCorrector>
where
    O: SubchannelSinkObserver,
{
    pub fn new(config: AssemblerConfig, codec: Codec, observer: O) -> Result<Self, ConfigError> {
        Self::with_corrector(config, RsCorrector::default(), codec, observer)
    }
}

impl<O, C> SuperframeFilter<O, C>
where
    O: SubchannelSinkObserver,
    C: CodewordCorrector,
{
    pub fn with_corrector(
        config: AssemblerConfig,
        corrector: C,
        codec: Codec,
        observer: O,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let sf_len = config.superframe_len();
        Ok(Self {
            config,
            corrector,
            codec,
            observer,
            sf_raw: vec![0; sf_len],
            sf: vec![0; sf_len],
            frame_count: 0,
            state: SyncState::Unsynchronized,
            format_raw: None,
            format: None,
            au_table: None,
            stats: SuperframeStats::default(),
        })
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Format of the current stream, `None` while not synchronized.
    pub fn format(&self) -> Option<&SuperframeFormat> {
        self.format.as_ref()
    }

    /// AU boundaries of the last processed superframe.
    pub fn au_table(&self) -> Option<&AuTable> {
        self.au_table.as_ref()
    }

    pub fn stats(&self) -> &SuperframeStats {
        &self.stats
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Drops the buffered frames and the synchronization, e.g. after a retune.
    pub fn reset(&mut self) {
        self.frame_count = 0;
        self.format_raw = None;
        self.format = None;
        self.au_table = None;
        self.set_state(SyncState::Unsynchronized);
    }

    /// Feeds the next transport frame of the sub-channel.
    ///
    /// Fails only if `frame` does not have the configured length; the frame is
    /// dropped in that case and the filter state is unchanged.
    pub fn feed(&mut self, frame: &[u8]) -> Result<()> {
        let frame_len = self.config.frame_len;
        if frame.len() != frame_len {
            bail!(SuperframeError::FrameLengthMismatch {
                found: frame.len(),
                expected: frame_len,
            });
        }

        let offset = self.frame_count * frame_len;
        self.sf_raw[offset..offset + frame_len].copy_from_slice(frame);
        self.frame_count += 1;

        if self.frame_count < FRAMES_PER_SUPERFRAME {
            return Ok(());
        }

        // correct a copy, the raw window stays available for resync
        self.sf.copy_from_slice(&self.sf_raw);
        let correction = rs::decode_superframe(&mut self.corrector, &mut self.sf);

        match self.check_sync() {
            Ok(table) => {
                self.sync_passed(correction, table);
                self.frame_count = 0;
            }
            Err(e) => {
                trace!("Superframe check failed: {e}");
                self.sync_failed();

                // slide the window by one frame
                self.sf_raw.copy_within(frame_len.., 0);
                self.frame_count -= 1;
            }
        }

        Ok(())
    }

    fn payload_len(&self) -> usize {
        rs::columns(self.config.superframe_len()) * RS_DATA_LEN
    }

    /// Checks the corrected window for a superframe header and reads its AU table.
    fn check_sync(&self) -> Result<AuTable> {
        let header = &self.sf[..HEADER_LEN];
        let format = SuperframeFormat::from(header[2]);

        // rejects all-zero headers, which pass the fire code
        let table = AuTable::read(&format, header, self.payload_len())?;

        let calculated = FIRE_CODE.checksum(&header[2..]);
        let read = u16::from_be_bytes([header[0], header[1]]);
        if calculated != read {
            bail!(SuperframeError::FireCodeMismatch { calculated, read });
        }

        Ok(table)
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            self.state = state;
            self.observer.sync_change(state);
        }
    }

    fn sync_passed(&mut self, correction: CorrectionStats, table: AuTable) {
        let threshold = self.config.sync_threshold;
        let passes = match self.state {
            SyncState::Unsynchronized => 1,
            SyncState::SyncChecking { passes } => passes + 1,
            SyncState::Synchronized => threshold,
        };

        if passes < threshold {
            debug!("Superframe check passed ({passes}/{threshold})");
            self.set_state(SyncState::SyncChecking { passes });
            return;
        }

        if self.state != SyncState::Synchronized {
            info!("Superframe sync acquired");
            self.set_state(SyncState::Synchronized);
        }

        self.process_superframe(correction, table);
    }

    fn sync_failed(&mut self) {
        match self.state {
            SyncState::Unsynchronized => return,
            SyncState::SyncChecking { passes } => {
                debug!("Superframe check failed after {passes} passes");
            }
            SyncState::Synchronized => {
                warn!("Superframe sync lost");
                self.stats.sync_losses += 1;
            }
        }

        self.format_raw = None;
        self.format = None;
        self.au_table = None;
        self.set_state(SyncState::Unsynchronized);
    }

    fn process_superframe(&mut self, correction: CorrectionStats, table: AuTable) {
        let mut status = SuperframeStatus {
            index: self.stats.superframes,
            correction,
            num_aus: table.num_aus(),
            au_crc_errors: 0,
            codec_errors: 0,
        };
        self.stats.superframes += 1;
        self.stats.rs_corrected_symbols += status.correction.corrected_symbols as u64;
        self.stats.rs_uncorrectable_codewords += status.correction.uncorrectable as u64;
        if status.is_degraded() {
            debug!(
                "Superframe #{}: {} of {} RS codewords uncorrectable",
                status.index, status.correction.uncorrectable, status.correction.codewords
            );
            self.stats.degraded_superframes += 1;
        }

        // AU starts are signaled per superframe, the format only on change
        let format_raw = self.sf[2];
        if self.format.is_none() || self.format_raw != Some(format_raw) {
            let format = SuperframeFormat::from(format_raw);
            info!("Superframe format: {format}");

            self.format_raw = Some(format_raw);
            self.format = Some(format);
            self.observer.format_change(&format);
            if let Err(e) = self.codec.configure(&format, &mut self.observer) {
                warn!("Codec '{}' rejected format: {e}", self.codec.name());
                self.stats.codec_errors += 1;
            }
        }

        self.au_table = Some(table);

        for i in 0..table.num_aus() {
            let au = &self.sf[table.range(i)];

            if let Err((calculated, read)) = AU_CRC.verify_trailing(au) {
                debug!(
                    "Superframe #{}: {}",
                    status.index,
                    SuperframeError::AuCrcMismatch {
                        au: i,
                        calculated,
                        read
                    }
                );
                status.au_crc_errors += 1;
                continue;
            }

            let au = &au[..au.len() - 2];
            let pad = AncillaryData::extract(au);
            if pad.is_some() {
                self.stats.pads += 1;
            }
            self.observer.process_pad(i, pad.as_ref());

            if let Err(e) = self.codec.decode_frame(i, au, &mut self.observer) {
                debug!("Superframe #{} AU #{i}: {e}", status.index);
                status.codec_errors += 1;
            }
        }

        self.stats.aus += (status.num_aus - status.au_crc_errors) as u64;
        self.stats.au_crc_errors += status.au_crc_errors as u64;
        self.stats.codec_errors += status.codec_errors as u64;

        self.observer.superframe_status(&status);
    }
}

#[cfg(test)]
use crate::process::codec::CodecBackend;
#[cfg(test)]
use crate::structs::superframe_format::pack_au_starts;

#[cfg(test)]
const TEST_FRAME_LEN: usize = 360;

#[cfg(test)]
const TEST_PAYLOAD_LEN: usize = 1650;

/// Builds an RS protected 120 kbit/s superframe. AU 0 carries 4 bytes of PAD.
#[cfg(test)]
fn build_superframe(format_byte: u8, seq: u8) -> Vec<u8> {
    let layout = SuperframeFormat::from(format_byte).au_layout();
    let starts: Vec<usize> = (0..=layout.num_aus)
        .map(|i| match i {
            0 => layout.first_au_start,
            _ => i * TEST_PAYLOAD_LEN / layout.num_aus,
        })
        .collect();

    let mut payload = vec![0u8; TEST_PAYLOAD_LEN];
    payload[2] = format_byte;
    let packed = pack_au_starts(&starts[1..layout.num_aus]);
    payload[3..3 + packed.len()].copy_from_slice(&packed);

    for (i, pair) in starts.windows(2).enumerate() {
        let (start, end) = (pair[0], pair[1]);
        for (j, byte) in payload[start..end - 2].iter_mut().enumerate() {
            *byte = (j as u8).wrapping_mul(31) ^ seq ^ (i as u8) << 4;
        }
        payload[start] = if i == 0 { 0x80 } else { 0x00 };
        if i == 0 {
            payload[start + 1..start + 6].copy_from_slice(&[4, seq, 0xEE, 0x00, 0x02]);
        }
        let crc = AU_CRC.checksum(&payload[start..end - 2]);
        payload[end - 2..end].copy_from_slice(&crc.to_be_bytes());
    }

    let fire_code = FIRE_CODE.checksum(&payload[2..HEADER_LEN]);
    payload[..2].copy_from_slice(&fire_code.to_be_bytes());

    rs::rs_encode_superframe(&payload)
}

#[cfg(test)]
#[derive(Default)]
struct Recorder {
    formats: Vec<SuperframeFormat>,
    configs: Vec<AudioConfig>,
    frames: Vec<(usize, Vec<u8>)>,
    pads: Vec<(usize, Option<AncillaryData>)>,
    states: Vec<SyncState>,
    statuses: Vec<SuperframeStatus>,
}

#[cfg(test)]
impl SubchannelSinkObserver for Recorder {
    fn format_change(&mut self, format: &SuperframeFormat) {
        self.formats.push(*format);
    }

    fn start_audio(&mut self, config: &AudioConfig) {
        self.configs.push(config.clone());
    }

    fn put_audio(&mut self, au_index: usize, frame: AudioFrame<'_>) {
        if let AudioFrame::Raw(data) = frame {
            self.frames.push((au_index, data.to_vec()));
        }
    }

    fn process_pad(&mut self, au_index: usize, pad: Option<&AncillaryData>) {
        self.pads.push((au_index, pad.cloned()));
    }

    fn sync_change(&mut self, state: SyncState) {
        self.states.push(state);
    }

    fn superframe_status(&mut self, status: &SuperframeStatus) {
        self.statuses.push(*status);
    }
}

#[cfg(test)]
struct NoCorrection;

#[cfg(test)]
impl CodewordCorrector for NoCorrection {
    fn correct(&mut self, _codeword: &mut [u8; RS_CODEWORD_LEN]) -> Option<usize> {
        Some(0)
    }
}

#[cfg(test)]
struct Uncorrectable;

#[cfg(test)]
impl CodewordCorrector for Uncorrectable {
    fn correct(&mut self, _codeword: &mut [u8; RS_CODEWORD_LEN]) -> Option<usize> {
        None
    }
}

#[cfg(test)]
fn raw_filter() -> Result<SuperframeFilter<Recorder>> {
    Ok(SuperframeFilter::new(
        AssemblerConfig::new(TEST_FRAME_LEN),
        Codec::new(CodecBackend::Raw),
        Recorder::default(),
    )?)
}

#[cfg(test)]
fn feed_superframe<O, C>(filter: &mut SuperframeFilter<O, C>, sf: &[u8]) -> Result<()>
where
    O: SubchannelSinkObserver,
    C: CodewordCorrector,
{
    for frame in sf.chunks(TEST_FRAME_LEN) {
        filter.feed(frame)?;
    }
    Ok(())
}

#[test]
fn config_validation() {
    assert_eq!(AssemblerConfig::from_bitrate(96).frame_len, 288);
    assert!(AssemblerConfig::from_bitrate(96).validate().is_ok());

    assert!(matches!(
        AssemblerConfig::new(6).validate(),
        Err(ConfigError::FrameLengthTooShort(6))
    ));
    assert!(matches!(
        AssemblerConfig::new(100).validate(),
        Err(ConfigError::FrameLengthNotAllowed(100))
    ));

    let config = AssemblerConfig {
        frame_len: 360,
        sync_threshold: 0,
    };
    assert!(matches!(
        SuperframeFilter::new(config, Codec::default(), Recorder::default()),
        Err(ConfigError::ZeroSyncThreshold)
    ));
}

#[test]
fn sync_acquisition_needs_threshold_passes() -> Result<()> {
    let mut filter = raw_filter()?;

    feed_superframe(&mut filter, &build_superframe(0x00, 1))?;
    assert_eq!(filter.state(), SyncState::SyncChecking { passes: 1 });
    assert!(filter.observer().frames.is_empty());
    assert!(filter.format().is_none());

    feed_superframe(&mut filter, &build_superframe(0x00, 2))?;
    assert_eq!(filter.state(), SyncState::Synchronized);

    let recorder = filter.observer();
    assert_eq!(recorder.formats, vec![SuperframeFormat::from(0x00)]);
    assert_eq!(recorder.configs[0].description, "AAC-LC, 32 kHz Mono");
    assert_eq!(
        recorder.frames.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
    // AU 0 spans 8..412, without CRC
    assert_eq!(recorder.frames[0].1.len(), 402);
    assert_eq!(recorder.frames[0].1[..3], [0x80, 4, 2]);

    let pad = recorder.pads[0].1.as_ref().unwrap();
    assert_eq!(pad.xpad, [2, 0xEE]);
    assert_eq!(pad.fpad, [0x00, 0x02]);
    assert!(recorder.pads[1..].iter().all(|(_, pad)| pad.is_none()));

    assert_eq!(filter.stats().superframes, 1);
    assert_eq!(filter.stats().aus, 4);
    assert_eq!(filter.stats().pads, 1);
    assert_eq!(filter.au_table().map(|t| t.starts().to_vec()), Some(vec![8, 412, 825, 1237, 1650]));
    Ok(())
}

#[test]
fn sync_found_in_misaligned_stream() -> Result<()> {
    let mut filter = raw_filter()?;

    // two frames of silence ahead of the first superframe
    for _ in 0..2 {
        filter.feed(&[0u8; TEST_FRAME_LEN])?;
    }
    for seq in 0..3 {
        feed_superframe(&mut filter, &build_superframe(0x00, seq))?;
    }

    assert_eq!(filter.state(), SyncState::Synchronized);
    assert_eq!(filter.stats().superframes, 2);
    assert_eq!(filter.observer().frames.len(), 8);
    assert_eq!(filter.observer().frames[4].1[2], 2);
    Ok(())
}

#[test]
fn sync_threshold_of_one_processes_first_superframe() -> Result<()> {
    let config = AssemblerConfig {
        frame_len: TEST_FRAME_LEN,
        sync_threshold: 1,
    };
    let mut filter =
        SuperframeFilter::new(config, Codec::new(CodecBackend::Raw), Recorder::default())?;

    feed_superframe(&mut filter, &build_superframe(0x60, 0))?;
    assert_eq!(filter.state(), SyncState::Synchronized);
    // HE-AAC 48 kHz: 3 AUs
    assert_eq!(filter.observer().frames.len(), 3);
    assert_eq!(filter.observer().states, vec![SyncState::Synchronized]);
    Ok(())
}

#[test]
fn sync_loss_and_recovery() -> Result<()> {
    let mut filter = raw_filter()?;
    feed_superframe(&mut filter, &build_superframe(0x00, 0))?;
    feed_superframe(&mut filter, &build_superframe(0x00, 1))?;

    // a zeroed frame is beyond what RS can repair
    let mut broken = build_superframe(0x00, 2);
    broken[..TEST_FRAME_LEN].fill(0);
    feed_superframe(&mut filter, &broken)?;
    assert_eq!(filter.state(), SyncState::Unsynchronized);
    assert!(filter.format().is_none());
    assert_eq!(filter.stats().sync_losses, 1);

    feed_superframe(&mut filter, &build_superframe(0x00, 3))?;
    feed_superframe(&mut filter, &build_superframe(0x00, 4))?;
    assert_eq!(filter.state(), SyncState::Synchronized);

    let recorder = filter.observer();
    assert_eq!(
        recorder.states,
        vec![
            SyncState::SyncChecking { passes: 1 },
            SyncState::Synchronized,
            SyncState::Unsynchronized,
            SyncState::SyncChecking { passes: 1 },
            SyncState::Synchronized,
        ]
    );
    // format is announced again after resync
    assert_eq!(recorder.formats.len(), 2);
    assert_eq!(recorder.frames.len(), 8);
    assert_eq!(recorder.frames[4].1[2], 4);
    Ok(())
}

#[test]
fn correctable_header_damage_keeps_sync() -> Result<()> {
    let mut filter = raw_filter()?;
    feed_superframe(&mut filter, &build_superframe(0x00, 0))?;
    feed_superframe(&mut filter, &build_superframe(0x00, 1))?;

    let mut sf = build_superframe(0x00, 2);
    sf[1] ^= 0x01;
    sf[4] ^= 0x80;
    feed_superframe(&mut filter, &sf)?;
    assert_eq!(filter.state(), SyncState::Synchronized);

    feed_superframe(&mut filter, &build_superframe(0x00, 3))?;

    let recorder = filter.observer();
    assert_eq!(filter.stats().sync_losses, 0);
    assert_eq!(recorder.frames.len(), 12);
    assert_eq!(recorder.frames[4].1[2], 2);
    assert_eq!(recorder.statuses[1].correction.corrected_symbols, 2);
    Ok(())
}

#[test]
fn bad_au_table_is_a_sync_failure() -> Result<()> {
    let mut filter = raw_filter()?;
    feed_superframe(&mut filter, &build_superframe(0x00, 0))?;
    feed_superframe(&mut filter, &build_superframe(0x00, 1))?;

    // AU starts out of order, with a matching fire code
    let mut payload = vec![0u8; TEST_PAYLOAD_LEN];
    payload[3..8].copy_from_slice(&pack_au_starts(&[825, 412, 1237]));
    let fire_code = FIRE_CODE.checksum(&payload[2..HEADER_LEN]);
    payload[..2].copy_from_slice(&fire_code.to_be_bytes());
    feed_superframe(&mut filter, &rs::rs_encode_superframe(&payload))?;

    assert_eq!(filter.state(), SyncState::Unsynchronized);
    assert_eq!(filter.stats().sync_losses, 1);
    assert!(filter.au_table().is_none());
    assert_eq!(filter.observer().frames.len(), 4);
    Ok(())
}

#[test]
fn wrong_frame_length_is_rejected() -> Result<()> {
    let mut filter = raw_filter()?;
    let sf = build_superframe(0x00, 0);
    filter.feed(&sf[..TEST_FRAME_LEN])?;

    let err = filter.feed(&sf[..TEST_FRAME_LEN - 1]).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SuperframeError>(),
        Some(SuperframeError::FrameLengthMismatch {
            found: 359,
            expected: 360
        })
    ));

    for frame in sf.chunks(TEST_FRAME_LEN).skip(1) {
        filter.feed(frame)?;
    }
    assert_eq!(filter.state(), SyncState::SyncChecking { passes: 1 });
    Ok(())
}

#[test]
fn au_with_bad_crc_is_skipped() -> Result<()> {
    let mut filter = SuperframeFilter::with_corrector(
        AssemblerConfig::new(TEST_FRAME_LEN),
        NoCorrection,
        Codec::new(CodecBackend::Raw),
        Recorder::default(),
    )?;

    feed_superframe(&mut filter, &build_superframe(0x00, 0))?;
    let mut sf = build_superframe(0x00, 1);
    sf[900] ^= 0x01;
    feed_superframe(&mut filter, &sf)?;

    let recorder = filter.observer();
    assert_eq!(
        recorder.frames.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
        vec![0, 1, 3]
    );
    assert_eq!(recorder.pads.len(), 3);
    assert_eq!(recorder.statuses[0].au_crc_errors, 1);
    assert_eq!(filter.stats().au_crc_errors, 1);
    assert_eq!(filter.stats().aus, 3);
    Ok(())
}

#[test]
fn rs_repairs_damaged_aus() -> Result<()> {
    let mut filter = raw_filter()?;

    feed_superframe(&mut filter, &build_superframe(0x00, 0))?;
    let mut sf = build_superframe(0x00, 1);
    for byte in &mut sf[500..530] {
        *byte = !*byte;
    }
    feed_superframe(&mut filter, &sf)?;

    let status = filter.observer().statuses[0];
    assert_eq!(status.correction.corrected_symbols, 30);
    assert!(!status.is_degraded());
    assert_eq!(status.au_crc_errors, 0);
    assert_eq!(filter.observer().frames.len(), 4);
    Ok(())
}

#[test]
fn uncorrectable_superframe_is_processed_degraded() -> Result<()> {
    let mut filter = SuperframeFilter::with_corrector(
        AssemblerConfig::new(TEST_FRAME_LEN),
        Uncorrectable,
        Codec::new(CodecBackend::Raw),
        Recorder::default(),
    )?;

    feed_superframe(&mut filter, &build_superframe(0x00, 0))?;
    feed_superframe(&mut filter, &build_superframe(0x00, 1))?;

    let status = filter.observer().statuses[0];
    assert!(status.is_degraded());
    assert_eq!(status.correction.uncorrectable, 15);
    assert_eq!(filter.stats().degraded_superframes, 1);
    // data was intact, so all AUs still pass
    assert_eq!(filter.observer().frames.len(), 4);
    Ok(())
}

#[test]
fn format_change_while_synchronized() -> Result<()> {
    let mut filter = raw_filter()?;

    feed_superframe(&mut filter, &build_superframe(0x00, 0))?;
    feed_superframe(&mut filter, &build_superframe(0x00, 1))?;
    feed_superframe(&mut filter, &build_superframe(0x38, 2))?;

    let recorder = filter.observer();
    assert_eq!(recorder.formats.len(), 2);
    assert_eq!(recorder.configs[1].description, "HE-AAC v2, 32 kHz Stereo");
    // 4 AUs, then 2 AUs with SBR at 32 kHz
    assert_eq!(recorder.frames.len(), 6);
    assert_eq!(filter.au_table().map(|t| t.num_aus()), Some(2));
    Ok(())
}

#[test]
fn codec_errors_are_counted() -> Result<()> {
    struct Failing;

    impl AudioCodec for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn configure(
            &mut self,
            _format: &SuperframeFormat,
            _sink: &mut dyn SubchannelSinkObserver,
        ) -> Result<()> {
            Ok(())
        }

        fn decode_frame(
            &mut self,
            _au_index: usize,
            _au: &[u8],
            _sink: &mut dyn SubchannelSinkObserver,
        ) -> Result<()> {
            bail!("corrupt bitstream")
        }
    }

    let mut filter = SuperframeFilter::new(
        AssemblerConfig::new(TEST_FRAME_LEN),
        Codec::External(Box::new(Failing)),
        Recorder::default(),
    )?;
    feed_superframe(&mut filter, &build_superframe(0x00, 0))?;
    feed_superframe(&mut filter, &build_superframe(0x00, 1))?;
    feed_superframe(&mut filter, &build_superframe(0x00, 2))?;

    assert_eq!(filter.stats().codec_errors, 8);
    assert_eq!(filter.state(), SyncState::Synchronized);
    // PAD is extracted regardless of the codec
    assert_eq!(filter.stats().pads, 2);
    Ok(())
}
