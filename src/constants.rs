/// SEEK offsets are split into two 30-bit integers so byte offsets up to
/// ~2^60 survive the round-trip through an int32 INFO field.
pub const MOD30BITS: u64 = 1 << 30;

/// Variants below this minor allele frequency default to sparse encodings.
pub const DEFAULT_MIN_MAF: f32 = 0.001;

/// htslib sentinel for a missing float value in BCF records.
pub const MISSING_FLOAT: f32 = f32::from_bits(0x7F80_0001);

pub const PROGRESS_STRIDE_CONVERT: u64 = 10_000;
pub const PROGRESS_STRIDE_SCAN: u64 = 100_000;
