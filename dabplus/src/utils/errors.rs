#[derive(thiserror::Error, Debug)]
pub enum FicError {
    #[error("FIC data length {0} is not a multiple of the FIB size")]
    NonIntegerFibCount(usize),

    #[error("FIB CRC failed. Calculated {calculated:#06X}, Read {read:#06X}")]
    FibCrcMismatch { calculated: u16, read: u16 },

    #[error("FIG {fig_type} declares {len} bytes, only {remaining} remain in FIB")]
    FigTooLong {
        fig_type: u8,
        len: usize,
        remaining: usize,
    },

    #[error("Empty FIG {0}")]
    EmptyFig(u8),

    #[error("FIG 1/{extension} has {len} field bytes (expected: {expected})")]
    LabelLengthMismatch {
        extension: u8,
        len: usize,
        expected: usize,
    },

    #[error("Reserved UEP table switch in FIG 0/1 for SubChId {0}")]
    ReservedTableSwitch(u8),
}

#[derive(thiserror::Error, Debug)]
pub enum SuperframeError {
    #[error("Transport frame has {found} bytes, expected {expected}")]
    FrameLengthMismatch { found: usize, expected: usize },

    #[error("Superframe fire code failed. Calculated {calculated:#06X}, Read {read:#06X}")]
    FireCodeMismatch { calculated: u16, read: u16 },

    #[error("First AU start is zero")]
    ZeroAuStart,

    #[error("AU start offsets out of order: au_start[{index}] = {start} >= au_start[{next_index}] = {next}")]
    AuStartOrder {
        index: usize,
        start: usize,
        next_index: usize,
        next: usize,
    },

    #[error("AU #{au} CRC failed. Calculated {calculated:#06X}, Read {read:#06X}")]
    AuCrcMismatch { au: usize, calculated: u16, read: u16 },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Frame length {0} is too short")]
    FrameLengthTooShort(usize),

    #[error("Frame length {0} does not yield whole RS codewords per superframe")]
    FrameLengthNotAllowed(usize),

    #[error("Sync threshold must be at least 1")]
    ZeroSyncThreshold,

    #[error("Unknown codec backend '{0}'")]
    UnknownCodecBackend(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("Codec '{0}' was used before a format was configured")]
    NotConfigured(&'static str),

    #[error("Access unit of {0} bytes does not fit into an ADTS frame")]
    AccessUnitTooLong(usize),

    #[error("Decoder '{name}' failed: {message}")]
    Decoder { name: &'static str, message: String },
}
