//! Programme Associated Data carried in DAB+ access units.
//!
//! PAD travels in a data stream element (DSE) placed at the very start of an
//! AU. The element header is followed by a count byte and, for a count of
//! 255, an escape byte adding to it. The last two PAD bytes are the F-PAD,
//! everything before them is X-PAD.

/// AAC syntactic element id of a data stream element.
pub const ID_DSE: u8 = 4;

/// Size of the fixed PAD field.
pub const FPAD_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncillaryData {
    pub xpad: Vec<u8>,
    pub fpad: [u8; FPAD_LEN],
}

impl AncillaryData {
    /// Extracts PAD from an AU without its CRC.
    ///
    /// Returns `None` when the AU does not start with a DSE or the signaled
    /// PAD does not fit into the AU.
    pub fn extract(au: &[u8]) -> Option<Self> {
        if au.len() < 3 || au[0] >> 5 != ID_DSE {
            return None;
        }

        let (pad_start, pad_len) = match au[1] {
            255 => (3, 255 + au[2] as usize),
            count => (2, count as usize),
        };

        if pad_len < FPAD_LEN || au.len() < pad_start + pad_len {
            return None;
        }

        let pad = &au[pad_start..pad_start + pad_len];
        let (xpad, fpad) = pad.split_at(pad_len - FPAD_LEN);

        Some(Self {
            xpad: xpad.to_vec(),
            fpad: [fpad[0], fpad[1]],
        })
    }

    /// Total PAD bytes, X-PAD plus F-PAD.
    pub fn pad_len(&self) -> usize {
        self.xpad.len() + FPAD_LEN
    }
}

#[test]
fn extract_short_and_escaped_pad() {
    let au = [0x80, 4, 0xAA, 0xBB, 0x00, 0x02, 0x21, 0x42];
    let pad = AncillaryData::extract(&au).unwrap();
    assert_eq!(pad.xpad, [0xAA, 0xBB]);
    assert_eq!(pad.fpad, [0x00, 0x02]);
    assert_eq!(pad.pad_len(), 4);

    // count 255 plus escape count 3
    let mut au = vec![0x80, 255, 3];
    au.extend((0..258).map(|i| i as u8));
    au.push(0x99);
    let pad = AncillaryData::extract(&au).unwrap();
    assert_eq!(pad.xpad.len(), 256);
    assert_eq!(pad.fpad, [0, 1]);
}

#[test]
fn no_pad_without_dse() {
    // single channel element first
    assert_eq!(AncillaryData::extract(&[0x00, 4, 1, 2, 3, 4]), None);
    // too short to hold a DSE header
    assert_eq!(AncillaryData::extract(&[0x80, 2]), None);
    // F-PAD incomplete
    assert_eq!(AncillaryData::extract(&[0x80, 1, 0x00]), None);
    // signaled PAD longer than the AU
    assert_eq!(AncillaryData::extract(&[0x80, 8, 0x00, 0x00]), None);
}
