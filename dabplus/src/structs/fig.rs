//! Fast Information Group (FIG) structures.
//!
//! ## Framing
//!
//! A FIB holds 30 bytes of FIGs followed by a CRC-16. Each FIG starts with a
//! header byte carrying its type (3 bits) and data length (5 bits); the byte
//! 0xFF ends the FIG list early.
//!
//! ## Supported Types
//!
//! - **FIG 0/0**: ensemble information, change announcement and CIF count
//! - **FIG 0/1**: sub-channel organization
//! - **FIG 0/2**: service and service component definition
//! - **FIG 0/14**: FEC sub-channel organization
//! - **FIG 1/0**, **FIG 1/1**: ensemble and programme service labels

use anyhow::{Result, bail};

use crate::structs::label::{FicLabel, LABEL_LEN};
use crate::structs::service::SubchannelOrga;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::FicError;

/// Size of one Fast Information Block including CRC.
pub const FIB_LEN: usize = 32;

/// Size of the FIG area of a FIB.
pub const FIB_DATA_LEN: usize = 30;

/// Header value terminating the FIG list of a FIB.
pub const FIG_END_MARKER: u8 = 0xFF;

/// ASCTy for MPEG-1 Layer II audio.
pub const ASCTY_DAB: u8 = 0;

/// ASCTy for HE-AAC v2 (DAB+) audio.
pub const ASCTY_DAB_PLUS: u8 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FigHeader {
    pub fig_type: u8,
    pub len: usize,
}

impl From<u8> for FigHeader {
    fn from(data: u8) -> Self {
        Self {
            fig_type: data >> 5,
            len: (data & 0x1F) as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fig0Header {
    /// Current/next: the record describes the next configuration.
    pub cn: bool,
    /// Other ensemble.
    pub oe: bool,
    /// Programme/data: the record uses 32-bit data service ids.
    pub pd: bool,
    pub extension: u8,
}

impl From<u8> for Fig0Header {
    fn from(data: u8) -> Self {
        Self {
            cn: data & 0x80 != 0,
            oe: data & 0x40 != 0,
            pd: data & 0x20 != 0,
            extension: data & 0x1F,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fig1Header {
    pub charset: u8,
    pub oe: bool,
    pub extension: u8,
}

impl From<u8> for Fig1Header {
    fn from(data: u8) -> Self {
        Self {
            charset: data >> 4,
            oe: data & 0x08 != 0,
            extension: data & 0x07,
        }
    }
}

/// FIG 0/0 ensemble information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsembleInfo {
    pub eid: u16,
    pub change_flags: u8,
    pub alarm: bool,
    /// Modulo-5000 CIF counter.
    pub cif_count: u16,
    /// Low part of the CIF count at which a signaled reconfiguration takes effect.
    pub occurrence_change: Option<u8>,
}

impl EnsembleInfo {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let eid = reader.get_n(16)?;
        let change_flags: u8 = reader.get_n(2)?;
        let alarm = reader.get()?;
        let cif_count_high: u16 = reader.get_n(5)?;
        let cif_count_low: u16 = reader.get_n(8)?;

        let occurrence_change = if change_flags != 0 {
            Some(reader.get_n(8)?)
        } else {
            None
        };

        Ok(Self {
            eid,
            change_flags,
            alarm,
            cif_count: cif_count_high * 250 + cif_count_low,
            occurrence_change,
        })
    }
}

impl SubchannelOrga {
    /// Reads one FIG 0/1 sub-channel entry (3 or 4 bytes).
    ///
    /// A rejected short form entry is still consumed.
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let subchid = reader.get_n(6)?;
        let start_cu = reader.get_n(10)?;
        let long_form = reader.get()?;

        if long_form {
            let option = reader.get_n(3)?;
            let level_index = reader.get_n(2)?;
            let size_cu = reader.get_n(10)?;

            Ok(Self::eep(subchid, start_cu, option, level_index, size_cu))
        } else {
            let table_switch = reader.get()?;
            let table_index = reader.get_n(6)?;

            if table_switch {
                bail!(FicError::ReservedTableSwitch(subchid));
            }

            Ok(Self::uep(subchid, start_cu, table_index))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceComponent {
    /// MSC stream mode audio.
    StreamAudio {
        ascty: u8,
        subchid: u8,
        primary: bool,
        ca: bool,
    },
    /// Stream data, FIDC or packet data components.
    Other { tmid: u8 },
}

/// One FIG 0/2 service entry of a programme service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub sid: u16,
    pub components: Vec<ServiceComponent>,
}

impl ServiceEntry {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let sid = reader.get_n(16)?;

        // local flag, CAId
        reader.skip_n(4)?;
        let num_components: u8 = reader.get_n(4)?;

        let mut components = Vec::with_capacity(num_components as usize);
        for _ in 0..num_components {
            let tmid = reader.get_n(2)?;
            let component = if tmid == 0 {
                ServiceComponent::StreamAudio {
                    ascty: reader.get_n(6)?,
                    subchid: reader.get_n(6)?,
                    primary: reader.get()?,
                    ca: reader.get()?,
                }
            } else {
                reader.skip_n(14)?;
                ServiceComponent::Other { tmid }
            };
            components.push(component);
        }

        Ok(Self { sid, components })
    }
}

/// One FIG 0/14 entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FecEntry {
    pub subchid: u8,
    pub fec_scheme: u8,
}

impl FecEntry {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        Ok(Self {
            subchid: reader.get_n(6)?,
            fec_scheme: reader.get_n(2)?,
        })
    }
}

/// A FIG 1/0 or FIG 1/1 label record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRecord {
    /// EId for extension 0, SId for extension 1.
    pub id: u16,
    pub label: FicLabel,
}

impl LabelRecord {
    /// Identifier length plus label field plus short label mask.
    pub const FIELD_LEN: usize = 2 + LABEL_LEN + 2;

    /// Reads a label record from the FIG 1 data following its header byte.
    pub fn read(header: &Fig1Header, data: &[u8]) -> Result<Self> {
        if data.len() != Self::FIELD_LEN {
            bail!(FicError::LabelLengthMismatch {
                extension: header.extension,
                len: data.len(),
                expected: Self::FIELD_LEN,
            });
        }

        let reader = &mut BsIoSliceReader::from_slice(data);
        let id = reader.get_n(16)?;

        let mut label = FicLabel {
            charset: header.charset,
            ..Default::default()
        };
        reader.get_bytes(&mut label.label)?;
        label.short_label_mask = reader.get_n(16)?;

        Ok(Self { id, label })
    }
}

#[test]
fn fig_headers() {
    let header = FigHeader::from(0b001_10101);
    assert_eq!(header.fig_type, 1);
    assert_eq!(header.len, 21);

    let fig0 = Fig0Header::from(0b1010_0010);
    assert!(fig0.cn && !fig0.oe && fig0.pd);
    assert_eq!(fig0.extension, 2);

    let fig1 = Fig1Header::from(0b1111_1001);
    assert_eq!(fig1.charset, 0b1111);
    assert!(fig1.oe);
    assert_eq!(fig1.extension, 1);
}

#[test]
fn read_ensemble_info() -> Result<()> {
    // EId 0x10CE, change flags 01, CIF count 3 * 250 + 17, occurrence change 42
    let data = [0x10, 0xCE, 0b0100_0011, 17, 42];
    let info = EnsembleInfo::read(&mut BsIoSliceReader::from_slice(&data))?;
    assert_eq!(info.eid, 0x10CE);
    assert_eq!(info.change_flags, 1);
    assert!(!info.alarm);
    assert_eq!(info.cif_count, 767);
    assert_eq!(info.occurrence_change, Some(42));
    Ok(())
}

#[test]
fn read_subchannel_forms() -> Result<()> {
    // SubChId 5, start 300, short form, table index 33
    let short = [0x15, 0x2C, 0x21];
    let orga = SubchannelOrga::read(&mut BsIoSliceReader::from_slice(&short))?;
    assert_eq!((orga.subchid, orga.start_cu, orga.bitrate), (5, 300, 128));

    // SubChId 2, start 0, long form option A, level index 2, size 72
    let long = [0x08, 0x00, 0b1000_1000, 72];
    let orga = SubchannelOrga::read(&mut BsIoSliceReader::from_slice(&long))?;
    assert_eq!((orga.subchid, orga.size_cu, orga.bitrate), (2, 72, 96));

    let reserved = [0x08, 0x00, 0b0100_0001];
    let err = SubchannelOrga::read(&mut BsIoSliceReader::from_slice(&reserved)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FicError>(),
        Some(FicError::ReservedTableSwitch(2))
    ));
    Ok(())
}

#[test]
fn read_service_entry() -> Result<()> {
    // SId 0xD210, two components: DAB+ audio on SubChId 4 (primary), packet data
    let data = [0xD2, 0x10, 0x02, 0x3F, 0x12, 0xC0, 0x00];
    let entry = ServiceEntry::read(&mut BsIoSliceReader::from_slice(&data))?;
    assert_eq!(entry.sid, 0xD210);
    assert_eq!(
        entry.components,
        vec![
            ServiceComponent::StreamAudio {
                ascty: ASCTY_DAB_PLUS,
                subchid: 4,
                primary: true,
                ca: false,
            },
            ServiceComponent::Other { tmid: 3 },
        ]
    );
    Ok(())
}

#[test]
fn read_label_record() -> Result<()> {
    let header = Fig1Header::from(0x01);
    let mut data = vec![0xD2, 0x10];
    data.extend_from_slice(b"Example Radio   ");
    data.extend_from_slice(&[0xFE, 0x00]);

    let record = LabelRecord::read(&header, &data)?;
    assert_eq!(record.id, 0xD210);
    assert_eq!(record.label.text(), "Example Radio   ");
    assert_eq!(record.label.short_text(), "Example");

    assert!(LabelRecord::read(&header, &data[..19]).is_err());
    Ok(())
}
