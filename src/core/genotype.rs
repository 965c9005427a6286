/// One diploid genotype. `a0`/`a1` are the alleles on haplotypes 0 and 1;
/// when `phased` is false the order of the two alleles carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Genotype {
    pub a0: bool,
    pub a1: bool,
    pub missing: bool,
    pub phased: bool,
}

impl Genotype {
    pub fn hom(allele: bool) -> Self {
        Self {
            a0: allele,
            a1: allele,
            missing: false,
            phased: true,
        }
    }

    pub fn het_unphased() -> Self {
        Self {
            a0: false,
            a1: true,
            missing: false,
            phased: false,
        }
    }

    pub fn missing() -> Self {
        Self {
            a0: false,
            a1: false,
            missing: true,
            phased: false,
        }
    }

    #[inline]
    pub fn is_het(&self) -> bool {
        !self.missing && self.a0 != self.a1
    }

    /// Alt-allele dosage, `None` when missing.
    #[inline]
    pub fn dosage(&self) -> Option<u8> {
        if self.missing {
            None
        } else {
            Some(u8::from(self.a0) + u8::from(self.a1))
        }
    }
}

/// Length-N genotype vector for one site, reused across sites by the
/// consumers that own it.
#[derive(Debug, Clone, Default)]
pub struct GenotypeVector {
    gts: Vec<Genotype>,
}

impl GenotypeVector {
    pub fn new(n_samples: usize) -> Self {
        Self {
            gts: vec![Genotype::default(); n_samples],
        }
    }

    pub fn len(&self) -> usize {
        self.gts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gts.is_empty()
    }

    pub fn resize(&mut self, n_samples: usize) {
        self.gts.resize(n_samples, Genotype::default());
    }

    /// Resets every sample to homozygous for the given allele; the baseline
    /// state sparse decoders overlay their entries onto.
    pub fn fill_hom(&mut self, allele: bool) {
        self.gts.fill(Genotype::hom(allele));
    }

    #[inline]
    pub fn get(&self, i: usize) -> Genotype {
        self.gts[i]
    }

    #[inline]
    pub fn set(&mut self, i: usize, gt: Genotype) {
        self.gts[i] = gt;
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Genotype> {
        self.gts.iter()
    }

    pub fn as_slice(&self) -> &[Genotype] {
        &self.gts
    }

    pub fn as_mut_slice(&mut self) -> &mut [Genotype] {
        &mut self.gts
    }

    /// Alt-allele count over the non-missing samples.
    pub fn allele_count(&self) -> u32 {
        self.gts
            .iter()
            .filter_map(|gt| gt.dosage())
            .map(u32::from)
            .sum()
    }

    /// Number of called alleles (two per non-missing sample).
    pub fn allele_number(&self) -> u32 {
        2 * self.gts.iter().filter(|gt| !gt.missing).count() as u32
    }

    pub fn has_missing(&self) -> bool {
        self.gts.iter().any(|gt| gt.missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_over_vector() {
        let mut gv = GenotypeVector::new(4);
        gv.set(0, Genotype::hom(false));
        gv.set(1, Genotype::het_unphased());
        gv.set(2, Genotype::hom(true));
        gv.set(3, Genotype::missing());
        assert_eq!(gv.allele_count(), 3);
        assert_eq!(gv.allele_number(), 6);
        assert!(gv.has_missing());
    }

    #[test]
    fn test_fill_hom_is_phased() {
        let mut gv = GenotypeVector::new(2);
        gv.fill_hom(true);
        assert_eq!(gv.get(1).dosage(), Some(2));
        assert!(gv.get(1).phased);
    }
}
