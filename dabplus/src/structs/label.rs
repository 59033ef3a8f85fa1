//! Label structures carried in FIG 1.
//!
//! A label is a fixed 16 byte character field in one of the broadcast
//! character sets plus a mask selecting the characters of the short label.
//! Conversion to Rust strings follows the EBU Latin based repertoire
//! (ETSI TS 101 756), UTF-8 and UCS-2.

use log::debug;

/// Number of character bytes in a label field.
pub const LABEL_LEN: usize = 16;

/// EBU Latin based repertoire.
pub const CHARSET_EBU_LATIN: u8 = 0b0000;

/// ISO/IEC 10646 using UCS-2 big endian.
pub const CHARSET_UCS2: u8 = 0b0110;

/// ISO/IEC 10646 using UTF-8.
pub const CHARSET_UTF8: u8 = 0b1111;

/// Codes removed before display: null, preferred line break, end of headline
/// and preferred word break.
const CONTROL_CODES: [u8; 4] = [0x00, 0x0A, 0x0B, 0x1F];

#[rustfmt::skip]
const EBU_VALUES_0X00_TO_0X1F: [Option<char>; 32] = [
    None, Some('Ę'), Some('Į'), Some('Ų'), Some('Ă'), Some('Ė'), Some('Ď'), Some('Ș'),
    Some('Ț'), Some('Ċ'), None, None, Some('Ġ'), Some('Ĺ'), Some('Ż'), Some('Ń'),
    Some('ą'), Some('ę'), Some('į'), Some('ų'), Some('ă'), Some('ė'), Some('ď'), Some('ș'),
    Some('ț'), Some('ċ'), Some('Ň'), Some('Ě'), Some('ġ'), Some('ĺ'), Some('ż'), None,
];

// Starts five codes before 0x80.
#[rustfmt::skip]
const EBU_VALUES_0X7B_TO_0XFF: [char; 133] = [
                                       '«', 'ů', '»', 'Ľ', 'Ħ',
    'á', 'à', 'é', 'è', 'í', 'ì', 'ó', 'ò', 'ú', 'ù', 'Ñ', 'Ç', 'Ş', 'ß', '¡', 'Ÿ',
    'â', 'ä', 'ê', 'ë', 'î', 'ï', 'ô', 'ö', 'û', 'ü', 'ñ', 'ç', 'ş', 'ğ', 'ı', 'ÿ',
    'Ķ', 'Ņ', '©', 'Ģ', 'Ğ', 'ě', 'ň', 'ő', 'Ő', '€', '£', '$', 'Ā', 'Ē', 'Ī', 'Ū',
    'ķ', 'ņ', 'Ļ', 'ģ', 'ļ', 'İ', 'ń', 'ű', 'Ű', '¿', 'ľ', '°', 'ā', 'ē', 'ī', 'ū',
    'Á', 'À', 'É', 'È', 'Í', 'Ì', 'Ó', 'Ò', 'Ú', 'Ù', 'Ř', 'Č', 'Š', 'Ž', 'Ð', 'Ŀ',
    'Â', 'Ä', 'Ê', 'Ë', 'Î', 'Ï', 'Ô', 'Ö', 'Û', 'Ü', 'ř', 'č', 'š', 'ž', 'đ', 'ŀ',
    'Ã', 'Å', 'Æ', 'Œ', 'ŷ', 'Ý', 'Õ', 'Ø', 'Þ', 'Ŋ', 'Ŕ', 'Ć', 'Ś', 'Ź', 'Ť', 'ð',
    'ã', 'å', 'æ', 'œ', 'ŵ', 'ý', 'õ', 'ø', 'þ', 'ŋ', 'ŕ', 'ć', 'ś', 'ź', 'ť', 'ħ',
];

/// Converts one EBU Latin code to its character, `None` for codes without one.
pub fn convert_ebu_char(value: u8) -> Option<char> {
    match value {
        0x00..=0x1F => EBU_VALUES_0X00_TO_0X1F[value as usize],
        0x7B..=0xFF => Some(EBU_VALUES_0X7B_TO_0XFF[(value - 0x7B) as usize]),
        0x24 => Some('ł'),
        0x5C => Some('Ů'),
        0x5E => Some('Ł'),
        0x60 => Some('Ą'),
        _ => Some(value as char),
    }
}

/// Converts a character field in the given charset, dropping control codes.
pub fn convert_text(data: &[u8], charset: u8) -> String {
    characters(data, charset).into_iter().flatten().collect()
}

/// Converted characters by source character position.
///
/// Control codes keep their position with `None` so that short label masks
/// still line up.
fn characters(data: &[u8], charset: u8) -> Vec<Option<char>> {
    match charset {
        CHARSET_EBU_LATIN => data
            .iter()
            .map(|&c| {
                if CONTROL_CODES.contains(&c) {
                    None
                } else {
                    convert_ebu_char(c)
                }
            })
            .collect(),
        CHARSET_UTF8 => String::from_utf8_lossy(data)
            .chars()
            .map(|c| match u8::try_from(c) {
                Ok(b) if CONTROL_CODES.contains(&b) => None,
                _ => Some(c),
            })
            .collect(),
        CHARSET_UCS2 => {
            let units = data
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));

            char::decode_utf16(units)
                .map(|c| match c {
                    Ok(c) if (c as u32) < 0x100 && CONTROL_CODES.contains(&(c as u8)) => None,
                    Ok(c) => Some(c),
                    Err(_) => Some(char::REPLACEMENT_CHARACTER),
                })
                .collect()
        }
        _ => {
            debug!("Unsupported label charset {charset:#06b}");
            Vec::new()
        }
    }
}

/// Label as broadcast in FIG 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FicLabel {
    pub charset: u8,
    pub label: [u8; LABEL_LEN],
    pub short_label_mask: u16,
}

impl FicLabel {
    /// Full label text. Trailing padding is kept.
    pub fn text(&self) -> String {
        convert_text(&self.label, self.charset)
    }

    /// Characters selected by the short label mask, first character = bit 15.
    pub fn short_text(&self) -> String {
        characters(&self.label, self.charset)
            .into_iter()
            .take(LABEL_LEN)
            .enumerate()
            .filter(|(i, _)| self.short_label_mask & (0x8000 >> i) != 0)
            .filter_map(|(_, c)| c)
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn ebu_label(text: &str, short_label_mask: u16) -> FicLabel {
    let mut label = [b' '; LABEL_LEN];
    label[..text.len()].copy_from_slice(text.as_bytes());
    FicLabel {
        charset: CHARSET_EBU_LATIN,
        label,
        short_label_mask,
    }
}

#[test]
fn ebu_full_range() {
    let low: String = (0x00..=0x1Fu8).filter_map(convert_ebu_char).collect();
    assert_eq!(low, "ĘĮŲĂĖĎȘȚĊĠĹŻŃąęįųăėďșțċŇĚġĺż");
    for value in [0x00, 0x0A, 0x0B, 0x1F] {
        assert_eq!(convert_ebu_char(value), None);
    }

    let high: String = (0x7B..=0xFFu8).filter_map(convert_ebu_char).collect();
    assert_eq!(
        high,
        concat!(
            "«ů»ĽĦ",
            "áàéèíìóòúùÑÇŞß¡Ÿ",
            "âäêëîïôöûüñçşğıÿ",
            "ĶŅ©ĢĞěňőŐ€£$ĀĒĪŪ",
            "ķņĻģļİńűŰ¿ľ°āēīū",
            "ÁÀÉÈÍÌÓÒÚÙŘČŠŽÐĿ",
            "ÂÄÊËÎÏÔÖÛÜřčšžđŀ",
            "ÃÅÆŒŷÝÕØÞŊŔĆŚŹŤð",
            "ãåæœŵýõøþŋŕćśźťħ",
        )
    );

    for value in 0x20..=0x7Au8 {
        let expected = match value {
            0x24 => 'ł',
            0x5C => 'Ů',
            0x5E => 'Ł',
            0x60 => 'Ą',
            _ => value as char,
        };
        assert_eq!(convert_ebu_char(value), Some(expected), "code {value:#04X}");
    }
}

#[test]
fn label_text_and_short_label() {
    let label = ebu_label("Radio Example", 0b1111_1000_0000_0000);
    assert_eq!(label.text(), "Radio Example   ");
    assert_eq!(label.short_text(), "Radio");

    let mut label = ebu_label("AB", 0b1100_0000_0000_0000);
    label.label[1] = 0x0A;
    label.label[2] = 0x81;
    assert_eq!(label.text(), "Aà             ");
    assert_eq!(label.short_text(), "A");
}

#[test]
fn utf8_and_ucs2_labels() {
    assert_eq!(convert_text("Grüß\u{0a}".as_bytes(), CHARSET_UTF8), "Grüß");
    assert_eq!(convert_text(&[0x00, 0x41, 0x20, 0xAC], CHARSET_UCS2), "A€");
    assert_eq!(convert_text(b"Radio", 0b0001), "");
}
