//! CRC validation utilities for DAB bitstreams.
//!
//! Provides the CRC-16 variants protecting Fast Information Blocks, DAB+
//! superframe headers and DAB+ access units. All variants process data MSB
//! first without reflection.

/// CRC algorithm specification with polynomial, initial value and final XOR.
pub struct Algorithm {
    poly: u16,
    init: u16,
    xorout: u16,
}

/// CRC-16/CCITT for FIB and access unit validation.
///
/// The register starts inverted and the result is inverted again.
pub const CRC_CCITT_ALG: Algorithm = Algorithm {
    poly: 0x1021,
    init: 0xFFFF,
    xorout: 0xFFFF,
};

/// Fire code for DAB+ superframe header validation.
pub const CRC_FIRE_CODE_ALG: Algorithm = Algorithm {
    poly: 0x782F,
    init: 0x0000,
    xorout: 0x0000,
};

/// Shifts `len` bits of the upper byte of `value` through the CRC register.
#[inline(always)]
pub const fn crc16(poly: u16, mut value: u16, len: usize) -> u16 {
    value <<= 8;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 15) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc16(poly, i as u16, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc16 {
    pub poly: u16,
    pub init: u16,
    pub xorout: u16,
    table: [u16; 256],
}

impl Crc16 {
    pub const fn new(algorithm: &Algorithm) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            xorout: algorithm.xorout,
            table: crc16_table(algorithm.poly),
        }
    }

    const fn table_entry(&self, index: u16) -> u16 {
        self.table[(index & 0xFF) as usize]
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u16, bytes: &[u8]) -> u16 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table_entry((crc >> 8) ^ bytes[i] as u16) ^ (crc << 8);
            i += 1;
        }

        crc
    }

    /// Complete checksum over `bytes` including initial value and final XOR.
    #[inline(always)]
    pub const fn checksum(&self, bytes: &[u8]) -> u16 {
        self.update(self.init, bytes) ^ self.xorout
    }

    /// Checks `bytes` against the big-endian checksum stored in its last two bytes.
    pub fn verify_trailing(&self, bytes: &[u8]) -> Result<(), (u16, u16)> {
        let Some(split) = bytes.len().checked_sub(2) else {
            return Err((0, 0));
        };

        let (data, stored) = bytes.split_at(split);
        let read = u16::from_be_bytes([stored[0], stored[1]]);
        let calculated = self.checksum(data);

        if read == calculated {
            Ok(())
        } else {
            Err((calculated, read))
        }
    }
}

#[test]
fn crc_check_values() {
    let ccitt = Crc16::new(&CRC_CCITT_ALG);
    assert_eq!(ccitt.checksum(b"123456789"), 0xD64E);

    let fire_code = Crc16::new(&CRC_FIRE_CODE_ALG);
    assert_eq!(fire_code.checksum(b"123456789"), 0xF8FA);
}

#[test]
fn crc_verify_trailing() {
    let ccitt = Crc16::new(&CRC_CCITT_ALG);

    let mut block = b"123456789".to_vec();
    block.extend_from_slice(&0xD64Eu16.to_be_bytes());
    assert!(ccitt.verify_trailing(&block).is_ok());

    block[0] ^= 0x01;
    let (calculated, read) = ccitt.verify_trailing(&block).unwrap_err();
    assert_eq!(read, 0xD64E);
    assert_ne!(calculated, read);

    assert!(ccitt.verify_trailing(&[0x00]).is_err());
}
