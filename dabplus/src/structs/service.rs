//! Ensemble and service directory entries.
//!
//! ## Sub-channel Protection
//!
//! **UEP** (short form): size, protection level and bitrate come from a fixed
//! 64 entry table.
//! **EEP** (long form): size and level are signaled, the bitrate follows from
//! the size and the per-level capacity factor of option A or B.

use std::fmt::{Display, Formatter};

use crate::structs::label::FicLabel;

/// Bytes of one DAB+ transport frame per kbit/s of sub-channel bitrate (24 ms).
pub const FRAME_BYTES_PER_KBPS: usize = 3;

/// Unequal error protection table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UepEntry {
    pub size_cu: u16,
    pub protection_level: u8,
    pub bitrate: u16,
}

const fn uep(size_cu: u16, protection_level: u8, bitrate: u16) -> UepEntry {
    UepEntry {
        size_cu,
        protection_level,
        bitrate,
    }
}

/// Sub-channel size, protection level and bitrate by UEP table index.
#[rustfmt::skip]
pub const UEP_TABLE: [UepEntry; 64] = [
    uep(16, 5, 32),   uep(21, 4, 32),   uep(24, 3, 32),   uep(29, 2, 32),
    uep(35, 1, 32),   uep(24, 5, 48),   uep(29, 4, 48),   uep(35, 3, 48),
    uep(42, 2, 48),   uep(52, 1, 48),   uep(29, 5, 56),   uep(35, 4, 56),
    uep(42, 3, 56),   uep(52, 2, 56),   uep(32, 5, 64),   uep(42, 4, 64),
    uep(48, 3, 64),   uep(58, 2, 64),   uep(70, 1, 64),   uep(40, 5, 80),
    uep(52, 4, 80),   uep(58, 3, 80),   uep(70, 2, 80),   uep(84, 1, 80),
    uep(48, 5, 96),   uep(58, 4, 96),   uep(70, 3, 96),   uep(84, 2, 96),
    uep(104, 1, 96),  uep(58, 5, 112),  uep(70, 4, 112),  uep(84, 3, 112),
    uep(104, 2, 112), uep(64, 5, 128),  uep(84, 4, 128),  uep(96, 3, 128),
    uep(116, 2, 128), uep(140, 1, 128), uep(80, 5, 160),  uep(104, 4, 160),
    uep(116, 3, 160), uep(140, 2, 160), uep(168, 1, 160), uep(96, 5, 192),
    uep(116, 4, 192), uep(140, 3, 192), uep(168, 2, 192), uep(208, 1, 192),
    uep(116, 5, 224), uep(140, 4, 224), uep(168, 3, 224), uep(208, 2, 224),
    uep(232, 1, 224), uep(128, 5, 256), uep(168, 4, 256), uep(192, 3, 256),
    uep(232, 2, 256), uep(280, 1, 256), uep(160, 5, 320), uep(208, 4, 320),
    uep(280, 2, 320), uep(192, 5, 384), uep(280, 3, 384), uep(416, 1, 384),
];

/// Capacity units per 8 kbit/s (option A) for protection levels 1-A to 4-A.
const EEP_A_FACTORS: [u16; 4] = [12, 8, 6, 4];

/// Capacity units per 32 kbit/s (option B) for protection levels 1-B to 4-B.
const EEP_B_FACTORS: [u16; 4] = [27, 21, 18, 15];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EepProfile {
    A,
    B,
    Reserved(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protection {
    Uep { table_index: u8, level: u8 },
    Eep { profile: EepProfile, level: u8 },
}

impl Display for Protection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Protection::Uep { level, .. } => write!(f, "UEP {level}"),
            Protection::Eep {
                profile: EepProfile::A,
                level,
            } => write!(f, "EEP {level}-A"),
            Protection::Eep {
                profile: EepProfile::B,
                level,
            } => write!(f, "EEP {level}-B"),
            Protection::Eep {
                profile: EepProfile::Reserved(option),
                level,
            } => write!(f, "EEP {level} (option {option})"),
        }
    }
}

/// Sub-channel organization from FIG 0/1, keyed by sub-channel id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubchannelOrga {
    pub subchid: u8,
    pub start_cu: u16,
    pub size_cu: u16,
    pub protection: Protection,
    /// kbit/s, 0 when not derivable.
    pub bitrate: u16,
    /// FEC scheme from FIG 0/14, if signaled.
    pub fec_scheme: Option<u8>,
}

impl SubchannelOrga {
    /// Short form organization from the UEP table.
    pub fn uep(subchid: u8, start_cu: u16, table_index: u8) -> Self {
        let entry = UEP_TABLE[(table_index & 0x3F) as usize];
        Self {
            subchid,
            start_cu,
            size_cu: entry.size_cu,
            protection: Protection::Uep {
                table_index,
                level: entry.protection_level,
            },
            bitrate: entry.bitrate,
            fec_scheme: None,
        }
    }

    /// Long form organization; `level_index` is the signaled 0-based level.
    pub fn eep(subchid: u8, start_cu: u16, option: u8, level_index: u8, size_cu: u16) -> Self {
        let level = (level_index & 0x03) as usize;
        let (profile, bitrate) = match option {
            0 => (EepProfile::A, size_cu / EEP_A_FACTORS[level] * 8),
            1 => (EepProfile::B, size_cu / EEP_B_FACTORS[level] * 32),
            other => (EepProfile::Reserved(other), 0),
        };

        Self {
            subchid,
            start_cu,
            size_cu,
            protection: Protection::Eep {
                profile,
                level: level as u8 + 1,
            },
            bitrate,
            fec_scheme: None,
        }
    }

    /// Transport frame length in bytes for a DAB+ stream in this sub-channel.
    pub fn frame_len(&self) -> Option<usize> {
        (self.bitrate != 0).then(|| self.bitrate as usize * FRAME_BYTES_PER_KBPS)
    }
}

/// Audio service component binding from FIG 0/2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioService {
    pub subchid: u8,
    pub dab_plus: bool,
}

/// The ensemble identity. `eid == 0` means not yet known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ensemble {
    pub eid: u16,
    pub label: Option<FicLabel>,
}

impl Ensemble {
    pub fn is_set(&self) -> bool {
        self.eid != 0
    }
}

/// A complete service: both the sub-channel organization and the audio
/// binding referring to it are known.
///
/// [`Service::default`] (SId 0) stands for "no service".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Service {
    pub sid: u16,
    pub subchannel: SubchannelOrga,
    pub audio: AudioService,
    pub label: Option<FicLabel>,
}

impl Default for Service {
    fn default() -> Self {
        Self {
            sid: 0,
            subchannel: SubchannelOrga::uep(0, 0, 0),
            audio: AudioService::default(),
            label: None,
        }
    }
}

impl Service {
    pub fn is_none(&self) -> bool {
        self.sid == 0
    }

    /// Label text without trailing padding, or the SId in hex.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.text().trim_end().to_string(),
            None => format!("{:#06X}", self.sid),
        }
    }
}

#[test]
fn subchannel_bitrates() {
    let uep = SubchannelOrga::uep(3, 84, 33);
    assert_eq!(uep.size_cu, 64);
    assert_eq!(uep.bitrate, 128);
    assert_eq!(uep.protection.to_string(), "UEP 5");

    // 3-A at 96 kbit/s
    let eep = SubchannelOrga::eep(1, 0, 0, 2, 72);
    assert_eq!(eep.bitrate, 96);
    assert_eq!(eep.frame_len(), Some(288));
    assert_eq!(eep.protection.to_string(), "EEP 3-A");

    // 2-B at 64 kbit/s
    let eep = SubchannelOrga::eep(1, 0, 1, 1, 42);
    assert_eq!(eep.bitrate, 64);

    let reserved = SubchannelOrga::eep(1, 0, 5, 0, 42);
    assert_eq!(reserved.bitrate, 0);
    assert_eq!(reserved.frame_len(), None);
}

#[test]
fn uep_table_rates_are_ordered() {
    for pair in UEP_TABLE.windows(2) {
        assert!(pair[0].bitrate <= pair[1].bitrate);
    }
    assert_eq!(UEP_TABLE[63], uep(416, 1, 384));
}

#[test]
fn no_service_sentinel() {
    let service = Service::default();
    assert!(service.is_none());
    assert_eq!(service.display_name(), "0x0000");
}
