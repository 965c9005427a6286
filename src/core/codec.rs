use crate::{
    constants::MISSING_FLOAT,
    core::{
        containers::{bitvector::Bitvector, sparse::SparseGenotype},
        genotype::{Genotype, GenotypeVector},
    },
    error::XcfError,
    utils::util::Result,
};

/// On-wire record flavours. The numeric codes are the first integer of the
/// `INFO/SEEK` tuple and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Void,
    BcfGenotype,
    SparseGenotype,
    SparseHaplotype,
    BinaryGenotype,
    BinaryHaplotype,
    SparsePhaseProbs,
}

impl RecordType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Void),
            1 => Some(Self::BcfGenotype),
            2 => Some(Self::SparseGenotype),
            3 => Some(Self::SparseHaplotype),
            4 => Some(Self::BinaryGenotype),
            5 => Some(Self::BinaryHaplotype),
            6 => Some(Self::SparsePhaseProbs),
            _ => None,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Void => 0,
            Self::BcfGenotype => 1,
            Self::SparseGenotype => 2,
            Self::SparseHaplotype => 3,
            Self::BinaryGenotype => 4,
            Self::BinaryHaplotype => 5,
            Self::SparsePhaseProbs => 6,
        }
    }

    /// Haplotype-family records carry phase and permit no missing data.
    pub fn is_haplotype(self) -> bool {
        matches!(
            self,
            Self::SparseHaplotype | Self::BinaryHaplotype | Self::SparsePhaseProbs
        )
    }

    pub fn is_genotype(self) -> bool {
        matches!(
            self,
            Self::BcfGenotype | Self::SparseGenotype | Self::BinaryGenotype
        )
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Void => "VOID",
            Self::BcfGenotype => "BCFVCF_GENOTYPE",
            Self::SparseGenotype => "SPARSE_GENOTYPE",
            Self::SparseHaplotype => "SPARSE_HAPLOTYPE",
            Self::BinaryGenotype => "BINARY_GENOTYPE",
            Self::BinaryHaplotype => "BINARY_HAPLOTYPE",
            Self::SparsePhaseProbs => "SPARSE_PHASEPROBS",
        };
        f.write_str(name)
    }
}

/// Output families selectable on the command line. The dense variants pin
/// the record type; the sparse variants fall back to the dense encoding for
/// common variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Bcf,
    BinaryGenotypes,
    BinaryHaplotypes,
    SparseGenotypes,
    SparseHaplotypes,
    PhaseProbs,
}

impl OutputFormat {
    pub fn is_xcf(self) -> bool {
        self != Self::Bcf
    }

    pub fn is_genotype_family(self) -> bool {
        matches!(self, Self::BinaryGenotypes | Self::SparseGenotypes)
    }

    /// Picks the record type for one site given its rarity and whether
    /// per-sample phasing probabilities are available.
    pub fn target_type(self, rare: bool, has_probs: bool) -> RecordType {
        match self {
            Self::Bcf => RecordType::BcfGenotype,
            Self::BinaryGenotypes => RecordType::BinaryGenotype,
            Self::BinaryHaplotypes => RecordType::BinaryHaplotype,
            Self::SparseGenotypes => {
                if rare {
                    RecordType::SparseGenotype
                } else {
                    RecordType::BinaryGenotype
                }
            }
            Self::SparseHaplotypes => {
                if rare {
                    RecordType::SparseHaplotype
                } else {
                    RecordType::BinaryHaplotype
                }
            }
            Self::PhaseProbs => match (rare, has_probs) {
                (true, true) => RecordType::SparsePhaseProbs,
                (true, false) => RecordType::SparseHaplotype,
                (false, _) => RecordType::BinaryHaplotype,
            },
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "bcf" => Ok(Self::Bcf),
            "bg" => Ok(Self::BinaryGenotypes),
            "bh" => Ok(Self::BinaryHaplotypes),
            "sg" => Ok(Self::SparseGenotypes),
            "sh" => Ok(Self::SparseHaplotypes),
            "pp" => Ok(Self::PhaseProbs),
            _ => Err(format!(
                "Invalid format: {s}. Must be one of bcf, bg, bh, sg, sh, pp."
            )),
        }
    }
}

#[inline]
fn read_u32s(payload: &[u8]) -> impl Iterator<Item = u32> + '_ {
    payload
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn check_dense_len(payload: &[u8], n_samples: usize) -> Result<()> {
    let expected = (2 * n_samples).div_ceil(8);
    if payload.len() != expected {
        return Err(crate::xcf_error!(
            "Dense record has {} bytes, expected {} for {} samples",
            payload.len(),
            expected,
            n_samples
        ));
    }
    Ok(())
}

/// Decodes one record payload into the caller's genotype vector. The vector
/// length fixes the sample count; `af` resolves the implicit major allele of
/// the sparse encodings.
pub fn decode_into(
    rec_type: RecordType,
    payload: &[u8],
    af: f32,
    gv: &mut GenotypeVector,
) -> Result<()> {
    match rec_type {
        RecordType::BinaryGenotype => decode_binary_genotypes(payload, gv),
        RecordType::BinaryHaplotype => decode_binary_haplotypes(payload, gv),
        RecordType::SparseGenotype => decode_sparse_genotypes(payload, af, gv),
        RecordType::SparseHaplotype => decode_sparse_haplotypes(payload, af, gv),
        RecordType::SparsePhaseProbs => {
            if payload.len() % 8 != 0 {
                return Err(crate::xcf_error!(
                    "Phase-prob record has {} bytes, expected a multiple of 8",
                    payload.len()
                ));
            }
            decode_sparse_genotypes(&payload[..payload.len() / 2], af, gv)
        }
        RecordType::Void | RecordType::BcfGenotype => Err(crate::xcf_error!(
            "Record type [{rec_type}] carries no side-car payload to decode"
        )),
    }
}

fn decode_binary_genotypes(payload: &[u8], gv: &mut GenotypeVector) -> Result<()> {
    check_dense_len(payload, gv.len())?;
    for (i, gt) in gv.as_mut_slice().iter_mut().enumerate() {
        let byte0 = payload[(2 * i) / 8];
        let byte1 = payload[(2 * i + 1) / 8];
        let a0 = (byte0 >> (7 - (2 * i) % 8)) & 1 != 0;
        let a1 = (byte1 >> (7 - (2 * i + 1) % 8)) & 1 != 0;
        *gt = match (a0, a1) {
            (true, false) => Genotype::missing(),
            (false, true) => Genotype::het_unphased(),
            (a, _) => Genotype::hom(a),
        };
    }
    Ok(())
}

fn decode_binary_haplotypes(payload: &[u8], gv: &mut GenotypeVector) -> Result<()> {
    check_dense_len(payload, gv.len())?;
    for (i, gt) in gv.as_mut_slice().iter_mut().enumerate() {
        let a0 = (payload[(2 * i) / 8] >> (7 - (2 * i) % 8)) & 1 != 0;
        let a1 = (payload[(2 * i + 1) / 8] >> (7 - (2 * i + 1) % 8)) & 1 != 0;
        *gt = Genotype {
            a0,
            a1,
            missing: false,
            phased: true,
        };
    }
    Ok(())
}

fn decode_sparse_genotypes(payload: &[u8], af: f32, gv: &mut GenotypeVector) -> Result<()> {
    let major = af > 0.5;
    gv.fill_hom(major);
    for value in read_u32s(payload) {
        let sg = SparseGenotype::unpack(value);
        let i = sg.idx as usize;
        if i >= gv.len() {
            return Err(crate::xcf_error!(
                "Sparse genotype index {i} out of range for {} samples",
                gv.len()
            ));
        }
        let gt = if sg.mis {
            Genotype::missing()
        } else {
            Genotype {
                a0: sg.al0,
                a1: sg.al1,
                missing: false,
                phased: sg.pha,
            }
        };
        gv.set(i, gt);
    }
    Ok(())
}

fn decode_sparse_haplotypes(payload: &[u8], af: f32, gv: &mut GenotypeVector) -> Result<()> {
    let major = af > 0.5;
    let minor = !major;
    gv.fill_hom(major);
    for hap in read_u32s(payload) {
        let i = (hap / 2) as usize;
        if i >= gv.len() {
            return Err(crate::xcf_error!(
                "Sparse haplotype index {hap} out of range for {} samples",
                gv.len()
            ));
        }
        let mut gt = gv.get(i);
        if hap % 2 == 0 {
            gt.a0 = minor;
        } else {
            gt.a1 = minor;
        }
        gt.phased = true;
        gv.set(i, gt);
    }
    Ok(())
}

/// Decodes a SPARSE_PHASEPROBS record: genotypes into `gv` and per-sample
/// probabilities into `probs` (htslib missing-float where no entry exists).
pub fn decode_phase_probs(
    payload: &[u8],
    af: f32,
    gv: &mut GenotypeVector,
    probs: &mut Vec<f32>,
) -> Result<()> {
    if payload.len() % 8 != 0 {
        return Err(crate::xcf_error!(
            "Phase-prob record has {} bytes, expected a multiple of 8",
            payload.len()
        ));
    }
    let half = payload.len() / 2;
    decode_sparse_genotypes(&payload[..half], af, gv)?;
    probs.clear();
    probs.resize(gv.len(), MISSING_FLOAT);
    let entries = read_u32s(&payload[..half]);
    let floats = payload[half..]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
    for (value, prob) in entries.zip(floats) {
        let sg = SparseGenotype::unpack(value);
        probs[sg.idx as usize] = prob;
    }
    Ok(())
}

/// Per-site encoder. Owns the scratch buffers (a 2N-bit dense buffer and a
/// 2N-entry sparse buffer) so a tool allocates once and reuses them for
/// every site it writes.
pub struct Encoder {
    n_samples: usize,
    bits: Bitvector,
    payload: Vec<u8>,
}

impl Encoder {
    pub fn new(n_samples: usize) -> Self {
        Self {
            n_samples,
            bits: Bitvector::new(2 * n_samples),
            payload: Vec::with_capacity(8 * n_samples),
        }
    }

    /// Encodes `gv` as `target`, returning the wire payload. `chrom`/`pos`
    /// only feed error messages.
    pub fn encode(
        &mut self,
        gv: &GenotypeVector,
        target: RecordType,
        af: f32,
        probs: Option<&[f32]>,
        chrom: &str,
        pos: u32,
    ) -> Result<&[u8]> {
        debug_assert_eq!(gv.len(), self.n_samples);
        if target.is_haplotype() && gv.has_missing() {
            return Err(XcfError::MissingInPhased {
                chrom: chrom.to_string(),
                pos,
            });
        }
        match target {
            RecordType::BinaryGenotype => self.encode_binary_genotypes(gv),
            RecordType::BinaryHaplotype => self.encode_binary_haplotypes(gv),
            RecordType::SparseGenotype => self.encode_sparse_genotypes(gv, af)?,
            RecordType::SparseHaplotype => self.encode_sparse_haplotypes(gv, af),
            RecordType::SparsePhaseProbs => {
                let probs = probs.ok_or_else(|| {
                    crate::xcf_error!("Phase probabilities required at {chrom}:{pos}")
                })?;
                self.encode_sparse_phaseprobs(gv, af, probs)?;
            }
            RecordType::Void | RecordType::BcfGenotype => {
                return Err(crate::xcf_error!(
                    "Record type [{target}] has no side-car encoding"
                ));
            }
        }
        Ok(&self.payload)
    }

    fn encode_binary_genotypes(&mut self, gv: &GenotypeVector) {
        self.bits.fill(false);
        for (i, gt) in gv.iter().enumerate() {
            let (b0, b1) = if gt.missing {
                (true, false)
            } else if gt.is_het() {
                (false, true)
            } else {
                (gt.a0, gt.a1)
            };
            self.bits.set(2 * i, b0);
            self.bits.set(2 * i + 1, b1);
        }
        self.payload.clear();
        self.payload.extend_from_slice(self.bits.as_bytes());
    }

    fn encode_binary_haplotypes(&mut self, gv: &GenotypeVector) {
        self.bits.fill(false);
        for (i, gt) in gv.iter().enumerate() {
            self.bits.set(2 * i, gt.a0);
            self.bits.set(2 * i + 1, gt.a1);
        }
        self.payload.clear();
        self.payload.extend_from_slice(self.bits.as_bytes());
    }

    fn encode_sparse_genotypes(&mut self, gv: &GenotypeVector, af: f32) -> Result<()> {
        let minor = !(af > 0.5);
        self.payload.clear();
        for (i, gt) in gv.iter().enumerate() {
            if gt.missing || gt.a0 == minor || gt.a1 == minor {
                let sg = SparseGenotype::new(
                    i as u32,
                    gt.is_het(),
                    gt.missing,
                    !gt.missing && gt.a0,
                    !gt.missing && gt.a1,
                    gt.phased,
                )?;
                self.payload.extend_from_slice(&sg.pack().to_le_bytes());
            }
        }
        Ok(())
    }

    fn encode_sparse_haplotypes(&mut self, gv: &GenotypeVector, af: f32) {
        let minor = !(af > 0.5);
        self.payload.clear();
        for (i, gt) in gv.iter().enumerate() {
            if gt.a0 == minor {
                self.payload
                    .extend_from_slice(&(2 * i as u32).to_le_bytes());
            }
            if gt.a1 == minor {
                self.payload
                    .extend_from_slice(&(2 * i as u32 + 1).to_le_bytes());
            }
        }
    }

    fn encode_sparse_phaseprobs(
        &mut self,
        gv: &GenotypeVector,
        af: f32,
        probs: &[f32],
    ) -> Result<()> {
        let minor = !(af > 0.5);
        self.payload.clear();
        let mut kept = Vec::with_capacity(gv.len());
        for (i, gt) in gv.iter().enumerate() {
            if gt.a0 == minor || gt.a1 == minor {
                let sg =
                    SparseGenotype::new(i as u32, gt.is_het(), false, gt.a0, gt.a1, gt.phased)?;
                self.payload.extend_from_slice(&sg.pack().to_le_bytes());
                kept.push(i);
            }
        }
        for i in kept {
            self.payload.extend_from_slice(&probs[i].to_le_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gv_from(gts: &[Genotype]) -> GenotypeVector {
        let mut gv = GenotypeVector::new(gts.len());
        for (i, gt) in gts.iter().enumerate() {
            gv.set(i, *gt);
        }
        gv
    }

    #[test]
    fn test_rare_site_encodes_one_sparse_genotype() {
        // [0/0, 0/0, 0/1, 0/0] with AC=1/AN=8
        let gv = gv_from(&[
            Genotype::hom(false),
            Genotype::hom(false),
            Genotype::het_unphased(),
            Genotype::hom(false),
        ]);
        let mut enc = Encoder::new(4);
        let payload = enc
            .encode(&gv, RecordType::SparseGenotype, 1.0 / 8.0, None, "chr1", 1)
            .unwrap();
        assert_eq!(payload.len(), 4);
        let sg = SparseGenotype::unpack(u32::from_le_bytes(payload.try_into().unwrap()));
        assert_eq!(
            sg,
            SparseGenotype {
                idx: 2,
                het: true,
                mis: false,
                al0: false,
                al1: true,
                pha: false
            }
        );
    }

    #[test]
    fn test_common_site_encodes_binary_genotype_bits() {
        // [0/0, 0/1, 1/1, ./.] -> bits 00 01 11 10 -> 0x1E
        let gv = gv_from(&[
            Genotype::hom(false),
            Genotype::het_unphased(),
            Genotype::hom(true),
            Genotype::missing(),
        ]);
        let mut enc = Encoder::new(4);
        let payload = enc
            .encode(&gv, RecordType::BinaryGenotype, 0.5, None, "chr1", 1)
            .unwrap();
        assert_eq!(payload, &[0x1E]);
    }

    #[test]
    fn test_binary_haplotype_bit_pattern() {
        // [(0,1), (1,1), (0,0)] -> bits 01 11 00 00 -> 0x70
        let gv = gv_from(&[
            Genotype {
                a0: false,
                a1: true,
                missing: false,
                phased: true,
            },
            Genotype::hom(true),
            Genotype::hom(false),
        ]);
        let mut enc = Encoder::new(3);
        let payload = enc
            .encode(&gv, RecordType::BinaryHaplotype, 0.5, None, "chr1", 1)
            .unwrap();
        assert_eq!(payload, &[0x70]);
    }

    #[test]
    fn test_missing_rejected_in_haplotype_encodings() {
        let gv = gv_from(&[Genotype::hom(false), Genotype::missing()]);
        let mut enc = Encoder::new(2);
        for target in [
            RecordType::BinaryHaplotype,
            RecordType::SparseHaplotype,
            RecordType::SparsePhaseProbs,
        ] {
            let err = enc
                .encode(&gv, target, 0.1, None, "chr1", 42)
                .expect_err("missing data must be rejected");
            assert!(matches!(err, XcfError::MissingInPhased { pos: 42, .. }));
        }
    }

    #[test]
    fn test_binary_genotype_round_trip() {
        let gv = gv_from(&[
            Genotype::hom(false),
            Genotype::het_unphased(),
            Genotype::hom(true),
            Genotype::missing(),
            Genotype::hom(false),
        ]);
        let mut enc = Encoder::new(5);
        let payload = enc
            .encode(&gv, RecordType::BinaryGenotype, 0.3, None, "chr1", 1)
            .unwrap()
            .to_vec();
        let mut back = GenotypeVector::new(5);
        decode_into(RecordType::BinaryGenotype, &payload, 0.3, &mut back).unwrap();
        for (a, b) in gv.iter().zip(back.iter()) {
            assert_eq!(a.dosage(), b.dosage());
            assert_eq!(a.missing, b.missing);
        }
    }

    #[test]
    fn test_sparse_and_dense_genotypes_decode_identically() {
        let gv = gv_from(&[
            Genotype::hom(false),
            Genotype::het_unphased(),
            Genotype::missing(),
            Genotype::hom(false),
            Genotype::hom(true),
        ]);
        let af = 3.0 / 8.0;
        let mut enc = Encoder::new(5);
        let sparse = enc
            .encode(&gv, RecordType::SparseGenotype, af, None, "chr1", 1)
            .unwrap()
            .to_vec();
        let dense = enc
            .encode(&gv, RecordType::BinaryGenotype, af, None, "chr1", 1)
            .unwrap()
            .to_vec();

        let mut from_sparse = GenotypeVector::new(5);
        let mut from_dense = GenotypeVector::new(5);
        decode_into(RecordType::SparseGenotype, &sparse, af, &mut from_sparse).unwrap();
        decode_into(RecordType::BinaryGenotype, &dense, af, &mut from_dense).unwrap();
        for (a, b) in from_sparse.iter().zip(from_dense.iter()) {
            assert_eq!(a.dosage(), b.dosage());
            assert_eq!(a.missing, b.missing);
        }
    }

    #[test]
    fn test_sparse_haplotype_round_trip_with_hom_minor() {
        // Sample 1 is hom-minor: indices 2 and 3 are both stored.
        let gv = gv_from(&[
            Genotype::hom(false),
            Genotype::hom(true),
            Genotype {
                a0: true,
                a1: false,
                missing: false,
                phased: true,
            },
            Genotype::hom(false),
        ]);
        let af = 3.0 / 8.0;
        let mut enc = Encoder::new(4);
        let payload = enc
            .encode(&gv, RecordType::SparseHaplotype, af, None, "chr1", 1)
            .unwrap()
            .to_vec();
        let stored: Vec<u32> = payload
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
            .collect();
        assert_eq!(stored, vec![2, 3, 4]);

        let mut back = GenotypeVector::new(4);
        decode_into(RecordType::SparseHaplotype, &payload, af, &mut back).unwrap();
        assert_eq!(back.get(1), Genotype::hom(true));
        assert_eq!(back.get(2).a0, true);
        assert_eq!(back.get(2).a1, false);
        assert_eq!(back.get(0), Genotype::hom(false));
    }

    #[test]
    fn test_sparse_haplotype_uses_alt_when_alt_is_major() {
        // AF > 0.5: stored indices carry the REF (minor) allele.
        let gv = gv_from(&[
            Genotype::hom(true),
            Genotype {
                a0: false,
                a1: true,
                missing: false,
                phased: true,
            },
        ]);
        let af = 3.0 / 4.0;
        let mut enc = Encoder::new(2);
        let payload = enc
            .encode(&gv, RecordType::SparseHaplotype, af, None, "chr1", 1)
            .unwrap()
            .to_vec();
        let stored: Vec<u32> = payload
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes(b.try_into().unwrap()))
            .collect();
        assert_eq!(stored, vec![2]);
        let mut back = GenotypeVector::new(2);
        decode_into(RecordType::SparseHaplotype, &payload, af, &mut back).unwrap();
        assert_eq!(back.get(0), Genotype::hom(true));
        assert!(!back.get(1).a0);
        assert!(back.get(1).a1);
    }

    #[test]
    fn test_phase_probs_round_trip() {
        let gv = gv_from(&[
            Genotype::hom(false),
            Genotype {
                a0: false,
                a1: true,
                missing: false,
                phased: true,
            },
            Genotype::hom(false),
        ]);
        let af = 1.0 / 6.0;
        let probs = [0.0, 0.87, 0.0];
        let mut enc = Encoder::new(3);
        let payload = enc
            .encode(
                &gv,
                RecordType::SparsePhaseProbs,
                af,
                Some(&probs),
                "chr1",
                1,
            )
            .unwrap()
            .to_vec();
        assert_eq!(payload.len(), 8);

        let mut back = GenotypeVector::new(3);
        let mut back_probs = Vec::new();
        decode_phase_probs(&payload, af, &mut back, &mut back_probs).unwrap();
        assert!(back.get(1).is_het());
        assert_eq!(back_probs[1], 0.87);
        assert!(back_probs[0].is_nan());
    }

    #[test]
    fn test_target_type_selection() {
        use OutputFormat::*;
        assert_eq!(
            BinaryGenotypes.target_type(true, false),
            RecordType::BinaryGenotype
        );
        assert_eq!(
            SparseGenotypes.target_type(true, false),
            RecordType::SparseGenotype
        );
        assert_eq!(
            SparseGenotypes.target_type(false, false),
            RecordType::BinaryGenotype
        );
        assert_eq!(
            PhaseProbs.target_type(true, true),
            RecordType::SparsePhaseProbs
        );
        assert_eq!(
            PhaseProbs.target_type(true, false),
            RecordType::SparseHaplotype
        );
        assert_eq!(
            PhaseProbs.target_type(false, true),
            RecordType::BinaryHaplotype
        );
    }
}
