use crate::utils::util::Result;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Exact two-sided Hardy-Weinberg p-value and one-sided excess-het p-value
/// (Wigginton 2005, PMID:15789306), over allele counts `nref`/`nalt` and
/// `nhet` het genotypes. `probs` is scratch, resized to `nrare + 1` and
/// retained across sites by the caller.
pub fn hwe_exact(
    nref: i32,
    nalt: i32,
    nhet: i32,
    probs: &mut Vec<f64>,
) -> Result<(f32, f32)> {
    if nref == 0 || nalt == 0 {
        return Ok((1.0, 1.0));
    }
    let ngt = (nref + nalt) / 2;
    let nrare = nref.min(nalt);

    // Odd/even number of rare alleles iff odd/even number of hets.
    if (nrare & 1) ^ (nhet & 1) != 0 {
        return Err(crate::xcf_error!(
            "nrare/nhet should be both odd or even: nrare={nrare} nref={nref} nalt={nalt} nhet={nhet}"
        ));
    }
    if nrare < nhet {
        return Err(crate::xcf_error!(
            "Fewer rare alleles than hets? nrare={nrare} nref={nref} nalt={nalt} nhet={nhet}"
        ));
    }
    if (nref + nalt) & 1 != 0 {
        return Err(crate::xcf_error!(
            "Expected diploid genotypes: nref={nref} nalt={nalt}"
        ));
    }

    probs.clear();
    probs.resize(nrare as usize + 1, 0.0);

    // Start at the distribution midpoint, parity-matched to nrare.
    let mut mid = (f64::from(nrare) * f64::from(nref + nalt - nrare) / f64::from(nref + nalt))
        as i32;
    if (nrare & 1) ^ (mid & 1) != 0 {
        mid += 1;
    }

    let mut hom_r = (nrare - mid) / 2;
    let mut hom_c = ngt - mid - hom_r;
    probs[mid as usize] = 1.0;
    let mut sum = 1.0;

    let mut het = mid;
    while het > 1 {
        probs[het as usize - 2] = probs[het as usize] * f64::from(het) * f64::from(het - 1)
            / (4.0 * f64::from(hom_r + 1) * f64::from(hom_c + 1));
        sum += probs[het as usize - 2];
        // Two fewer hets: one more rare and one more common homozygote.
        hom_r += 1;
        hom_c += 1;
        het -= 2;
    }

    hom_r = (nrare - mid) / 2;
    hom_c = ngt - mid - hom_r;
    het = mid;
    while het <= nrare - 2 {
        probs[het as usize + 2] = probs[het as usize] * 4.0 * f64::from(hom_r) * f64::from(hom_c)
            / (f64::from(het + 2) * f64::from(het + 1));
        sum += probs[het as usize + 2];
        hom_r -= 1;
        hom_c -= 1;
        het += 2;
    }

    for p in probs.iter_mut() {
        *p /= sum;
    }

    let p_obs = probs[nhet as usize];
    let exc_het: f64 = probs[nhet as usize..].iter().sum();
    let hwe: f64 = probs.iter().filter(|&&p| p <= p_obs).sum();
    Ok((hwe.min(1.0) as f32, exc_het.min(1.0) as f32))
}

/// One-degree-of-freedom chi-square Hardy-Weinberg p-value over genotype
/// counts in samples.
pub fn hwe_chisq(an: i32, fcnt0: i32, nhom0: i32, nhom1: i32, nhet: i32) -> f32 {
    let ng = f64::from(an / 2);
    let p = f64::from(fcnt0) / f64::from(an);
    let q = 1.0 - p;
    let exp_hom_ref = p * p * ng;
    let exp_hom_alt = q * q * ng;
    let exp_het = 2.0 * p * q * ng;
    if exp_hom_ref == 0.0 || exp_hom_alt == 0.0 || exp_het == 0.0 {
        return 1.0;
    }

    let chi_square = (f64::from(nhom0) - exp_hom_ref).powi(2) / exp_hom_ref
        + (f64::from(nhet) - exp_het).powi(2) / exp_het
        + (f64::from(nhom1) - exp_hom_alt).powi(2) / exp_hom_alt;

    let dist = ChiSquared::new(1.0).expect("chi-square with one degree of freedom");
    (1.0 - dist.cdf(chi_square)) as f32
}

/// Inbreeding coefficient `1 - nhet / (2 p q N)` from the allele count of
/// the reference allele.
pub fn inbreeding_coefficient(an: i32, fcnt0: i32, nhet: i32) -> f32 {
    let ng = f64::from(an / 2);
    let p = f64::from(fcnt0) / f64::from(an);
    let q = 1.0 - p;
    let exp_het = 2.0 * p * q * ng;
    (1.0 - f64::from(nhet) / exp_het) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hwe_exact_two_samples() {
        // nref=nalt=2: possible het counts are 0 and 2 with probabilities
        // 1/3 and 2/3 after normalization.
        let mut probs = Vec::new();
        let (hwe, exc) = hwe_exact(2, 2, 2, &mut probs).unwrap();
        assert!((hwe - 1.0).abs() < 1e-6);
        assert!((exc - 2.0 / 3.0).abs() < 1e-6);

        let (hwe, exc) = hwe_exact(2, 2, 0, &mut probs).unwrap();
        assert!((hwe - 1.0 / 3.0).abs() < 1e-6);
        assert!((exc - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hwe_exact_is_one_for_degenerate_sites() {
        let mut probs = Vec::new();
        assert_eq!(hwe_exact(0, 8, 0, &mut probs).unwrap(), (1.0, 1.0));
        assert_eq!(hwe_exact(8, 0, 0, &mut probs).unwrap(), (1.0, 1.0));
    }

    #[test]
    fn test_hwe_exact_five_sample_site() {
        // Genotypes [0/0, 0/1, 1/1, 0/0, ./.]: nref=5, nalt=3, nhet=1.
        // Reachable het counts are 1 (p=3/7) and 3 (p=4/7).
        let mut probs = Vec::new();
        let (hwe, exc) = hwe_exact(5, 3, 1, &mut probs).unwrap();
        assert!((hwe - 3.0 / 7.0).abs() < 1e-6);
        assert!((exc - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_hwe_exact_parity_mismatch_is_rejected() {
        let mut probs = Vec::new();
        assert!(hwe_exact(5, 3, 2, &mut probs).is_err());
    }

    #[test]
    fn test_hwe_bounds_hold_over_a_grid() {
        let mut probs = Vec::new();
        for nhom0 in 0..6 {
            for nhom1 in 0..6 {
                for nhet in 0..6 {
                    let nref = 2 * nhom0 + nhet;
                    let nalt = 2 * nhom1 + nhet;
                    if nref == 0 || nalt == 0 {
                        continue;
                    }
                    let (hwe, exc) = hwe_exact(nref, nalt, nhet, &mut probs).unwrap();
                    assert!((0.0..=1.0).contains(&hwe), "hwe={hwe}");
                    assert!((0.0..=1.0).contains(&exc), "exc={exc}");
                }
            }
        }
    }

    #[test]
    fn test_chisq_is_high_for_hw_proportions() {
        // 25 hom-ref, 50 het, 25 hom-alt is exactly HW at p=0.5.
        let p = hwe_chisq(200, 100, 25, 25, 50);
        assert!(p > 0.99, "p={p}");
        // All-het is a strong departure.
        let p = hwe_chisq(200, 100, 0, 0, 100);
        assert!(p < 1e-6, "p={p}");
    }

    #[test]
    fn test_inbreeding_coefficient_signs() {
        // Fewer hets than expected: positive coefficient.
        assert!(inbreeding_coefficient(200, 100, 10) > 0.0);
        // More hets than expected: negative coefficient.
        assert!(inbreeding_coefficient(200, 100, 100) < 0.0);
        // Exactly expected: zero.
        assert!(inbreeding_coefficient(200, 100, 50).abs() < 1e-6);
    }
}
