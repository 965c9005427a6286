use std::{
    num::{ParseFloatError, ParseIntError, TryFromIntError},
    str::Utf8Error,
};
use thiserror::Error;

pub type XcfResult<T> = std::result::Result<T, XcfError>;

#[derive(Debug, Error)]
pub enum XcfError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Htslib(#[from] rust_htslib::errors::Error),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    #[error(transparent)]
    ParseInt(#[from] ParseIntError),
    #[error(transparent)]
    ParseFloat(#[from] ParseFloatError),
    #[error(transparent)]
    TryFromInt(#[from] TryFromIntError),
    #[error("Sample list in [{right}] clashes with already-attached [{left}]")]
    Incompatible { left: String, right: String },
    #[error("INFO/{field} field with the expected number of entries is missing in [{path}]")]
    MissingIndex { field: String, path: String },
    #[error("Sample index {idx} does not fit the 27-bit sparse genotype index")]
    EncodingOverflow { idx: u32 },
    #[error("Missing genotype in a haplotype encoding at {chrom}:{pos}")]
    MissingInPhased { chrom: String, pos: u32 },
    #[error("Chunks disagree on REF/ALT at {chrom}:{pos}")]
    IncompatibleShard { chrom: String, pos: u32 },
    #[error("Chunks are not in ascending start position order")]
    ShardsOutOfOrder,
    #[error("Three chunks overlap at position {pos}")]
    TooManyOverlappingShards { pos: u32 },
    #[error("Sample lists differ between [{left}] and [{right}]")]
    SampleMismatch { left: String, right: String },
}

impl XcfError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[macro_export]
macro_rules! xcf_error {
    ($($arg:tt)*) => {
        $crate::error::XcfError::message(format!($($arg)*))
    };
}
