use crate::{core::genotype::GenotypeVector, io::pedigree::Pedigree};

/// One child with at least one genotyped parent.
#[derive(Debug, Clone)]
pub struct Trio {
    pub kid: usize,
    pub father: Option<usize>,
    pub mother: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct TrioSet {
    pub trios: Vec<Trio>,
}

/// Site-level Mendel tallies over all trios/duos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MendelCounts {
    /// Trios violating Mendelian inheritance.
    pub n_err: u32,
    /// Trios with every pedigree member non-missing at this site.
    pub n_total: u32,
    /// Of those, trios where not every member is homozygous-major.
    pub n_minor: u32,
}

impl TrioSet {
    /// Collects trios from the pedigree's father/mother columns; parents
    /// that are `NA` or absent from the sample list are dropped, and a
    /// child with no resolvable parent forms no trio.
    pub fn from_pedigree(pedigree: &Pedigree) -> Self {
        let index = pedigree.name_index();
        let resolve = |name: &str| -> Option<usize> {
            if name == "NA" {
                None
            } else {
                index.get(name).copied()
            }
        };
        let trios = (0..pedigree.len())
            .filter_map(|kid| {
                let father = resolve(&pedigree.fathers[kid]);
                let mother = resolve(&pedigree.mothers[kid]);
                (father.is_some() || mother.is_some()).then_some(Trio {
                    kid,
                    father,
                    mother,
                })
            })
            .collect();
        Self { trios }
    }

    pub fn len(&self) -> usize {
        self.trios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trios.is_empty()
    }

    /// Scores one site. A trio only counts when every member present in
    /// the pedigree has a called genotype.
    pub fn score_site(&self, gv: &GenotypeVector, major_dosage: u8) -> MendelCounts {
        let mut counts = MendelCounts::default();
        for trio in &self.trios {
            let Some(kid) = gv.get(trio.kid).dosage() else {
                continue;
            };
            let father = match trio.father {
                Some(i) => match gv.get(i).dosage() {
                    Some(d) => Some(d),
                    None => continue,
                },
                None => None,
            };
            let mother = match trio.mother {
                Some(i) => match gv.get(i).dosage() {
                    Some(d) => Some(d),
                    None => continue,
                },
                None => None,
            };

            counts.n_total += 1;
            let all_major = kid == major_dosage
                && father.map_or(true, |d| d == major_dosage)
                && mother.map_or(true, |d| d == major_dosage);
            if !all_major {
                counts.n_minor += 1;
            }
            let error = match (father, mother) {
                (Some(f), Some(m)) => trio_error(kid, f, m),
                (Some(p), None) | (None, Some(p)) => duo_error(kid, p),
                (None, None) => unreachable!("trios have at least one parent"),
            };
            if error {
                counts.n_err += 1;
            }
        }
        counts
    }
}

/// Full-trio Mendel violation over dosages in {0,1,2}.
fn trio_error(kid: u8, father: u8, mother: u8) -> bool {
    match kid {
        0 => father == 2 || mother == 2,
        2 => father == 0 || mother == 0,
        _ => (father == 0 && mother == 0) || (father == 2 && mother == 2),
    }
}

/// Duo Mendel violation: the parent must be able to transmit one of the
/// child's alleles.
fn duo_error(kid: u8, parent: u8) -> bool {
    (kid == 0 && parent == 2) || (kid == 2 && parent == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::genotype::Genotype;

    /// Reference predicate: a trio is consistent iff the kid's alleles can
    /// be split so each parent can transmit one of them.
    fn trio_consistent(kid: u8, father: u8, mother: u8) -> bool {
        let can_give = |parent: u8, allele: u8| match parent {
            0 => allele == 0,
            2 => allele == 1,
            _ => true,
        };
        let splits: &[(u8, u8)] = match kid {
            0 => &[(0, 0)],
            1 => &[(0, 1), (1, 0)],
            _ => &[(1, 1)],
        };
        splits
            .iter()
            .any(|&(a, b)| can_give(father, a) && can_give(mother, b))
    }

    #[test]
    fn test_trio_table_matches_reference_for_all_27_combinations() {
        for kid in 0..3u8 {
            for father in 0..3u8 {
                for mother in 0..3u8 {
                    assert_eq!(
                        trio_error(kid, father, mother),
                        !trio_consistent(kid, father, mother),
                        "kid={kid} father={father} mother={mother}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_duo_table() {
        assert!(duo_error(0, 2));
        assert!(duo_error(2, 0));
        for (kid, parent) in [(0, 0), (0, 1), (1, 0), (1, 1), (1, 2), (2, 1), (2, 2)] {
            assert!(!duo_error(kid, parent), "kid={kid} parent={parent}");
        }
    }

    fn gv_of_dosages(dosages: &[Option<u8>]) -> GenotypeVector {
        let mut gv = GenotypeVector::new(dosages.len());
        for (i, d) in dosages.iter().enumerate() {
            let gt = match d {
                None => Genotype::missing(),
                Some(0) => Genotype::hom(false),
                Some(1) => Genotype::het_unphased(),
                _ => Genotype::hom(true),
            };
            gv.set(i, gt);
        }
        gv
    }

    fn pedigree() -> Pedigree {
        Pedigree {
            names: vec!["dad".into(), "mom".into(), "kid".into(), "duo_kid".into()],
            fathers: vec!["NA".into(), "NA".into(), "dad".into(), "dad".into()],
            mothers: vec!["NA".into(), "NA".into(), "mom".into(), "NA".into()],
            populations: vec!["NA".into(); 4],
        }
    }

    #[test]
    fn test_trio_set_resolution() {
        let trios = TrioSet::from_pedigree(&pedigree());
        assert_eq!(trios.len(), 2);
        assert_eq!(trios.trios[0].kid, 2);
        assert_eq!(trios.trios[0].father, Some(0));
        assert_eq!(trios.trios[0].mother, Some(1));
        assert_eq!(trios.trios[1].kid, 3);
        assert_eq!(trios.trios[1].mother, None);
    }

    #[test]
    fn test_score_site_counts_errors_and_minor_trios() {
        let trios = TrioSet::from_pedigree(&pedigree());
        // dad=0/0, mom=0/0, kid=0/1 (error), duo_kid=0/0 (consistent, all major)
        let gv = gv_of_dosages(&[Some(0), Some(0), Some(1), Some(0)]);
        let counts = trios.score_site(&gv, 0);
        assert_eq!(
            counts,
            MendelCounts {
                n_err: 1,
                n_total: 2,
                n_minor: 1
            }
        );
    }

    #[test]
    fn test_score_site_skips_trios_with_missing_members() {
        let trios = TrioSet::from_pedigree(&pedigree());
        // mom missing: the full trio is not countable, the duo still is.
        let gv = gv_of_dosages(&[Some(2), None, Some(0), Some(0)]);
        let counts = trios.score_site(&gv, 0);
        assert_eq!(counts.n_total, 1);
        assert_eq!(counts.n_err, 1); // duo: dad=2/2 cannot father a 0/0 kid
    }
}
