//! DAB+ superframe header structures.
//!
//! ## Header Layout
//!
//! ```text
//! | byte 0..2  | byte 2      | byte 3..     |
//! | fire code  | format bits | AU start[1..] as 12-bit fields |
//! ```
//!
//! The format byte carries (MSB first) one reserved bit, the DAC rate
//! (48/32 kHz), SBR, the AAC channel mode, PS and a 3-bit MPEG Surround
//! configuration.
//!
//! ## Access Units
//!
//! The number of AUs and the offset of the first AU only depend on DAC rate
//! and SBR and are fixed by the standard. The remaining start offsets are
//! signaled per superframe. The table is terminated by a pseudo start at the
//! end of the RS-payload part of the superframe.

use std::fmt::{Display, Formatter};

use anyhow::{Result, bail};

use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::SuperframeError;

/// Maximum number of AUs in a superframe.
pub const MAX_AUS: usize = 6;

/// Number of header bytes covered by the fire code, starting at byte 2.
pub const FIRE_CODE_DATA_LEN: usize = 9;

/// Bytes of one header needed to check sync: fire code plus protected bytes.
pub const HEADER_LEN: usize = 2 + FIRE_CODE_DATA_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuperframeFormat {
    /// 48 kHz (set) or 32 kHz (clear) output sample rate.
    pub dac_rate: bool,
    pub sbr_flag: bool,
    /// Stereo (set) or mono (clear) AAC core.
    pub aac_channel_mode: bool,
    pub ps_flag: bool,
    pub mpeg_surround_config: u8,
}

impl From<u8> for SuperframeFormat {
    fn from(data: u8) -> Self {
        Self {
            dac_rate: data & 0x40 != 0,
            sbr_flag: data & 0x20 != 0,
            aac_channel_mode: data & 0x10 != 0,
            ps_flag: data & 0x08 != 0,
            mpeg_surround_config: data & 0x07,
        }
    }
}

/// Number of AUs and offset of the first AU for one DAC rate/SBR combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuLayout {
    pub num_aus: usize,
    pub first_au_start: usize,
}

/// AU layout indexed by `[dac_rate][sbr_flag]`.
pub const AU_LAYOUT: [[AuLayout; 2]; 2] = [
    // 32 kHz
    [
        AuLayout {
            num_aus: 4,
            first_au_start: 8,
        },
        AuLayout {
            num_aus: 2,
            first_au_start: 5,
        },
    ],
    // 48 kHz
    [
        AuLayout {
            num_aus: 6,
            first_au_start: 11,
        },
        AuLayout {
            num_aus: 3,
            first_au_start: 6,
        },
    ],
];

impl SuperframeFormat {
    pub fn au_layout(&self) -> AuLayout {
        AU_LAYOUT[self.dac_rate as usize][self.sbr_flag as usize]
    }

    /// Output sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        if self.dac_rate { 48_000 } else { 32_000 }
    }

    /// Sample rate of the AAC core in Hz, half the output rate with SBR.
    pub fn core_sample_rate(&self) -> u32 {
        self.sample_rate() >> self.sbr_flag as u32
    }

    /// MPEG-4 sampling frequency index of the AAC core.
    pub fn core_sample_rate_index(&self) -> u8 {
        match (self.dac_rate, self.sbr_flag) {
            (true, true) => 6,   // 24 kHz
            (true, false) => 3,  // 48 kHz
            (false, true) => 8,  // 16 kHz
            (false, false) => 5, // 32 kHz
        }
    }

    /// MPEG-4 channel configuration, `None` for unknown surround configurations.
    pub fn channel_configuration(&self) -> Option<u8> {
        match self.mpeg_surround_config {
            0 => Some(if self.aac_channel_mode { 2 } else { 1 }),
            1 => Some(6),
            2 => Some(7),
            _ => None,
        }
    }

    /// Channels of the decoded output, PS upmixes a mono core to stereo.
    pub fn output_channels(&self) -> u8 {
        match self.channel_configuration() {
            Some(6) => 6,
            Some(7) => 8,
            _ if self.aac_channel_mode || self.ps_flag => 2,
            _ => 1,
        }
    }

    /// AudioSpecificConfig selecting AAC LC with the 960 sample transform.
    ///
    /// SBR and PS are left to implicit signaling.
    pub fn audio_specific_config(&self) -> [u8; 2] {
        const AOT_AAC_LC: u8 = 0b00010;
        const GA_SPECIFIC_960: u8 = 0b100;

        let sr_index = self.core_sample_rate_index();
        let ch_config = self
            .channel_configuration()
            .unwrap_or(if self.aac_channel_mode { 2 } else { 1 });

        [
            AOT_AAC_LC << 3 | sr_index >> 1,
            (sr_index & 0x01) << 7 | ch_config << 3 | GA_SPECIFIC_960,
        ]
    }
}

impl Display for SuperframeFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let codec = match (self.sbr_flag, self.ps_flag) {
            (true, true) => "HE-AAC v2",
            (true, false) => "HE-AAC",
            (false, _) => "AAC-LC",
        };
        let stereo_mode = if self.aac_channel_mode || self.ps_flag {
            "Stereo"
        } else {
            "Mono"
        };
        let surround_mode = match self.mpeg_surround_config {
            0 => None,
            1 => Some("Surround 5.1"),
            2 => Some("Surround 7.1"),
            _ => Some("Surround (unknown)"),
        };

        write!(f, "{codec}, {} kHz ", self.sample_rate() / 1000)?;
        match surround_mode {
            Some(surround_mode) => write!(f, "{surround_mode} (Core: {stereo_mode})"),
            None => write!(f, "{stereo_mode}"),
        }
    }
}

/// Byte offsets of the AUs within a corrected superframe.
///
/// Holds `num_aus + 1` entries; the last one marks the end of the last AU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuTable {
    starts: [usize; MAX_AUS + 1],
    num_aus: usize,
}

impl AuTable {
    /// Builds the table from a superframe header.
    ///
    /// `payload_len` is the superframe length without RS parity, i.e. the
    /// end of the last AU.
    pub fn read(format: &SuperframeFormat, header: &[u8], payload_len: usize) -> Result<Self> {
        let layout = format.au_layout();
        let mut starts = [0usize; MAX_AUS + 1];

        starts[0] = layout.first_au_start;
        starts[layout.num_aus] = payload_len;

        let reader = &mut BsIoSliceReader::from_slice(header.get(3..).unwrap_or_default());
        for start in starts.iter_mut().take(layout.num_aus).skip(1) {
            *start = reader.get_n::<u16>(12)? as usize;
        }

        if matches!(header.get(3..5), Some([0, 0])) {
            bail!(SuperframeError::ZeroAuStart);
        }

        for i in 0..layout.num_aus {
            if starts[i] >= starts[i + 1] {
                bail!(SuperframeError::AuStartOrder {
                    index: i,
                    start: starts[i],
                    next_index: i + 1,
                    next: starts[i + 1],
                });
            }
        }

        Ok(Self {
            starts,
            num_aus: layout.num_aus,
        })
    }

    pub fn num_aus(&self) -> usize {
        self.num_aus
    }

    /// All `num_aus + 1` boundaries.
    pub fn starts(&self) -> &[usize] {
        &self.starts[..=self.num_aus]
    }

    /// Byte range of AU `index` including its CRC.
    pub fn range(&self, index: usize) -> std::ops::Range<usize> {
        self.starts[index]..self.starts[index + 1]
    }
}

#[cfg(test)]
pub(crate) fn pack_au_starts(starts: &[usize]) -> Vec<u8> {
    let mut bits = Vec::new();
    for &start in starts {
        for bit in (0..12).rev() {
            bits.push(((start >> bit) & 1) as u8);
        }
    }
    bits.resize(bits.len().div_ceil(8) * 8, 0);
    bits.chunks(8)
        .map(|byte| byte.iter().fold(0, |acc, b| acc << 1 | b))
        .collect()
}

#[cfg(test)]
fn header_for(format_byte: u8, au_starts: &[usize]) -> Vec<u8> {
    let mut header = vec![0, 0, format_byte];
    header.extend(pack_au_starts(au_starts));
    header.resize(HEADER_LEN, 0);
    header
}

#[test]
fn au_table_all_format_combinations() -> Result<()> {
    // (dac_rate, sbr, channel mode, ps) -> AU starts including end sentinel,
    // for a 120 kbit/s superframe (1800 bytes, 15 columns, payload 1650).
    #[rustfmt::skip]
    let cases: [(bool, bool, bool, bool, &[usize]); 16] = [
        (false, false, false, false, &[8, 400, 800, 1200, 1650]),
        (false, false, false, true,  &[8, 400, 800, 1200, 1650]),
        (false, false, true,  false, &[8, 400, 800, 1200, 1650]),
        (false, false, true,  true,  &[8, 400, 800, 1200, 1650]),
        (false, true,  false, false, &[5, 800, 1650]),
        (false, true,  false, true,  &[5, 800, 1650]),
        (false, true,  true,  false, &[5, 800, 1650]),
        (false, true,  true,  true,  &[5, 800, 1650]),
        (true,  false, false, false, &[11, 275, 550, 825, 1100, 1375, 1650]),
        (true,  false, false, true,  &[11, 275, 550, 825, 1100, 1375, 1650]),
        (true,  false, true,  false, &[11, 275, 550, 825, 1100, 1375, 1650]),
        (true,  false, true,  true,  &[11, 275, 550, 825, 1100, 1375, 1650]),
        (true,  true,  false, false, &[6, 550, 1100, 1650]),
        (true,  true,  false, true,  &[6, 550, 1100, 1650]),
        (true,  true,  true,  false, &[6, 550, 1100, 1650]),
        (true,  true,  true,  true,  &[6, 550, 1100, 1650]),
    ];

    for (dac_rate, sbr_flag, aac_channel_mode, ps_flag, expected) in cases {
        let format_byte = (dac_rate as u8) << 6
            | (sbr_flag as u8) << 5
            | (aac_channel_mode as u8) << 4
            | (ps_flag as u8) << 3;
        let format = SuperframeFormat::from(format_byte);
        assert_eq!(format.au_layout().num_aus + 1, expected.len());

        let header = header_for(format_byte, &expected[1..expected.len() - 1]);
        let table = AuTable::read(&format, &header, 1650)?;
        assert_eq!(table.starts(), expected, "format {format_byte:#04X}");
    }
    Ok(())
}

#[test]
fn au_table_rejects_bad_offsets() {
    let format = SuperframeFormat::from(0x00);

    let header = header_for(0x00, &[0, 0, 0]);
    let err = AuTable::read(&format, &header, 1650).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SuperframeError>(),
        Some(SuperframeError::ZeroAuStart)
    ));

    let header = header_for(0x00, &[400, 300, 800]);
    let err = AuTable::read(&format, &header, 1650).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SuperframeError>(),
        Some(SuperframeError::AuStartOrder { index: 1, .. })
    ));

    // last AU would extend past the payload
    let header = header_for(0x00, &[400, 800, 1700]);
    assert!(AuTable::read(&format, &header, 1650).is_err());
}

#[test]
fn format_description_and_asc() {
    let format = SuperframeFormat::from(0b0110_1000);
    assert_eq!(format.to_string(), "HE-AAC v2, 48 kHz Stereo");
    assert_eq!(format.core_sample_rate(), 24_000);
    assert_eq!(format.output_channels(), 2);
    // AAC LC, index 6, mono core, 960 transform
    assert_eq!(format.audio_specific_config(), [0x13, 0x0C]);

    let format = SuperframeFormat::from(0b0001_0000);
    assert_eq!(format.to_string(), "AAC-LC, 32 kHz Stereo");
    assert_eq!(format.audio_specific_config(), [0x12, 0x94]);

    let format = SuperframeFormat::from(0b0100_0001);
    assert_eq!(format.to_string(), "AAC-LC, 48 kHz Surround 5.1 (Core: Mono)");
    assert_eq!(format.output_channels(), 6);
}
