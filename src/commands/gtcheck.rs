use crate::{
    cli::GtcheckArgs,
    constants::PROGRESS_STRIDE_SCAN,
    core::{
        codec::{self, RecordType},
        genotype::GenotypeVector,
    },
    io::{
        xcf_reader::XcfReader,
        xcf_writer::{companion_header, HeaderLayout, WriterMode, XcfWriter},
    },
    utils::util::Result,
};

/// Per-file, per-site genotype summary.
#[derive(Debug, Clone, Default)]
struct GtSummary {
    nhom: [i32; 2],
    nhet: i32,
    mis: i32,
    is_phased: bool,
    /// Per-sample dosage, -1 for missing (deep check only).
    dosages: Vec<i8>,
}

impl GtSummary {
    fn reset(&mut self) {
        self.nhom = [0, 0];
        self.nhet = 0;
        self.mis = 0;
        self.is_phased = false;
        self.dosages.clear();
    }

    fn an(&self) -> i32 {
        2 * (self.nhom[0] + self.nhom[1] + self.nhet)
    }

    fn nalt(&self) -> i32 {
        2 * self.nhom[1] + self.nhet
    }

    fn from_vector(&mut self, gv: &GenotypeVector, is_phased: bool, deep: bool) {
        self.reset();
        self.is_phased = is_phased;
        for gt in gv.iter() {
            match gt.dosage() {
                None => self.mis += 1,
                Some(1) => self.nhet += 1,
                Some(d) => self.nhom[usize::from(d == 2)] += 1,
            }
            if deep {
                self.dosages.push(gt.dosage().map_or(-1, |d| d as i8));
            }
        }
    }
}

#[derive(Debug, Default)]
struct ComparisonStats {
    n_total: u64,
    n_equal: u64,
    n_mismatch: u64,
}

impl ComparisonStats {
    fn add(&mut self, has_diff: bool) {
        self.n_total += 1;
        if has_diff {
            self.n_mismatch += 1;
        } else {
            self.n_equal += 1;
        }
    }

    fn report(&self) {
        log::info!("== Genotype Comparison Report ==");
        log::info!("Total variants compared : {}", self.n_total);
        log::info!("Matching records        : {}", self.n_equal);
        log::info!("Mismatching records     : {}", self.n_mismatch);
        if self.n_total > 0 {
            log::info!(
                "Matching %              : {:.2}%",
                100.0 * self.n_equal as f64 / self.n_total as f64
            );
        }
    }
}

const DIFF_HEADER_LINES: &[&str] = &[
    r#"##INFO=<ID=FD,Number=.,Type=String,Description="Names of the summary fields that differ">"#,
    r#"##INFO=<ID=AN_F1,Number=1,Type=Integer,Description="Allele number in file 1">"#,
    r#"##INFO=<ID=AN_F2,Number=1,Type=Integer,Description="Allele number in file 2">"#,
    r#"##INFO=<ID=AC_F1,Number=1,Type=Integer,Description="ALT allele count in file 1">"#,
    r#"##INFO=<ID=AC_F2,Number=1,Type=Integer,Description="ALT allele count in file 2">"#,
    r#"##INFO=<ID=NMISS_F1,Number=1,Type=Integer,Description="Missing genotypes in file 1">"#,
    r#"##INFO=<ID=NMISS_F2,Number=1,Type=Integer,Description="Missing genotypes in file 2">"#,
    r#"##INFO=<ID=NHOMREF_F1,Number=1,Type=Integer,Description="Hom-ref genotypes in file 1">"#,
    r#"##INFO=<ID=NHOMREF_F2,Number=1,Type=Integer,Description="Hom-ref genotypes in file 2">"#,
    r#"##INFO=<ID=NHET_F1,Number=1,Type=Integer,Description="Het genotypes in file 1">"#,
    r#"##INFO=<ID=NHET_F2,Number=1,Type=Integer,Description="Het genotypes in file 2">"#,
    r#"##INFO=<ID=NHOMALT_F1,Number=1,Type=Integer,Description="Hom-alt genotypes in file 1">"#,
    r#"##INFO=<ID=NHOMALT_F2,Number=1,Type=Integer,Description="Hom-alt genotypes in file 2">"#,
];

/// Site-by-site comparison of two XCF files with identical sample lists;
/// sites whose summaries diverge are written to a differences BCF.
pub fn gtcheck(args: GtcheckArgs) -> Result<()> {
    let mut reader = XcfReader::open(None, args.threads);
    for input in &args.inputs {
        let idx = reader.add_file(input)?;
        log::info!(
            "Opening file [{}] (type = {:?})",
            input,
            reader.file_kind(idx)
        );
        if reader.n_samples(idx) == 0 {
            return Err(crate::xcf_error!("[{input}] has no samples"));
        }
    }
    // The reader rejects sample clashes on add_file; both files line up.
    let n_samples = reader.n_samples(0);
    let sample_names = reader.pedigree(0).names.clone();

    let mut header = companion_header(
        reader.header_view(0),
        &format!("{} {}", env!("CARGO_PKG_NAME"), *crate::cli::FULL_VERSION),
        false,
        HeaderLayout::SideCar,
        None,
    )?;
    for line in DIFF_HEADER_LINES {
        header.push_record(line.as_bytes());
    }
    let mut writer = XcfWriter::new(&args.output, header, args.threads, WriterMode::CompanionOnly)?;

    let mut gv = GenotypeVector::new(n_samples);
    let mut payload = Vec::new();
    let mut sides = [GtSummary::default(), GtSummary::default()];
    let mut stats = ComparisonStats::default();
    let mut n_records = 0u64;

    while reader.next()? {
        n_records += 1;
        if n_records % PROGRESS_STRIDE_SCAN == 0 {
            log::info!("Number of XCF records processed: N={n_records}");
        }
        if !(reader.has_record(0) && reader.has_record(1)) {
            continue;
        }
        for file in 0..2 {
            parse_side(
                &mut reader,
                file,
                &mut gv,
                &mut payload,
                &mut sides[file],
                args.deep_check,
            )?;
        }
        let diff_fields = compare_sides(&sides, args.deep_check, &sample_names);
        let has_diff = !diff_fields.is_empty();
        if has_diff {
            write_difference(&mut writer, &reader, &sides, &diff_fields)?;
        }
        stats.add(has_diff);
    }

    log::info!(
        "Number of variants processed in both files: N={n_records} (shared: {})",
        stats.n_total
    );
    stats.report();
    writer.close()
}

fn parse_side(
    reader: &mut XcfReader,
    file: usize,
    gv: &mut GenotypeVector,
    payload: &mut Vec<u8>,
    summary: &mut GtSummary,
    deep: bool,
) -> Result<()> {
    let rec_type = reader.record_type(file);
    let is_phased = match rec_type {
        RecordType::BcfGenotype => {
            reader.read_genotype_vector(file, gv)?;
            // Phase is declared by the first called genotype.
            gv.iter().find(|gt| !gt.missing).map_or(false, |gt| gt.phased)
        }
        RecordType::BinaryGenotype | RecordType::SparseGenotype => {
            reader.read_payload(file, payload)?;
            codec::decode_into(rec_type, payload, reader.af(file), gv)?;
            false
        }
        RecordType::BinaryHaplotype
        | RecordType::SparseHaplotype
        | RecordType::SparsePhaseProbs => {
            reader.read_payload(file, payload)?;
            codec::decode_into(rec_type, payload, reader.af(file), gv)?;
            true
        }
        RecordType::Void => {
            return Err(crate::xcf_error!(
                "Void record cannot be compared at {}:{}",
                reader.site().chrom,
                reader.site().pos
            ));
        }
    };
    summary.from_vector(gv, is_phased, deep);
    Ok(())
}

/// Summary comparison. Equal phasedness compares exactly; a phased/unphased
/// pair allows each count to exceed the unphased side by at most its
/// missing-genotype count (missing entries may have been imputed).
fn compare_sides(sides: &[GtSummary; 2], deep: bool, sample_names: &[String]) -> Vec<String> {
    let mut diff = Vec::new();
    if sides[0].is_phased == sides[1].is_phased {
        if sides[0].an() != sides[1].an() {
            diff.push("AN".to_string());
        }
        if sides[0].nalt() != sides[1].nalt() {
            diff.push("AC".to_string());
        }
        if sides[0].mis != sides[1].mis {
            diff.push("NMISS".to_string());
        }
        if sides[0].nhom[0] != sides[1].nhom[0] {
            diff.push("NHOM0".to_string());
        }
        if sides[0].nhet != sides[1].nhet {
            diff.push("NHET".to_string());
        }
        if sides[0].nhom[1] != sides[1].nhom[1] {
            diff.push("NHOM1".to_string());
        }
    } else {
        let (hap, gt) = if sides[0].is_phased { (0, 1) } else { (1, 0) };
        let mis = sides[gt].mis;
        let checks = [
            ("AC", sides[hap].nalt() - sides[gt].nalt(), 2 * mis),
            ("NHOM0", sides[hap].nhom[0] - sides[gt].nhom[0], mis),
            ("NHET", sides[hap].nhet - sides[gt].nhet, mis),
            ("NHOM1", sides[hap].nhom[1] - sides[gt].nhom[1], mis),
        ];
        for (name, delta, bound) in checks {
            if delta < 0 || delta > bound {
                diff.push(name.to_string());
            }
        }
    }

    if deep {
        for (i, name) in sample_names.iter().enumerate() {
            let (d0, d1) = (sides[0].dosages[i], sides[1].dosages[i]);
            if d0 < 0 || d1 < 0 {
                continue;
            }
            if d0 != d1 {
                diff.push(format!("MISMATCH_GT({name})"));
                break;
            }
        }
    }
    diff
}

fn write_difference(
    writer: &mut XcfWriter,
    reader: &XcfReader,
    sides: &[GtSummary; 2],
    diff_fields: &[String],
) -> Result<()> {
    let site = reader.site();
    writer.stage_bare(
        &site.chrom,
        site.pos,
        &site.rsid,
        &site.ref_allele,
        &site.alt_allele,
    )?;
    let record = writer.staged_record_mut();
    record.push_info_string(b"FD", &[diff_fields.join(",").as_bytes()])?;
    for (file, suffix) in [(0usize, "F1"), (1usize, "F2")] {
        let s = &sides[file];
        record.push_info_integer(format!("AN_{suffix}").as_bytes(), &[s.an()])?;
        record.push_info_integer(format!("AC_{suffix}").as_bytes(), &[s.nalt()])?;
        record.push_info_integer(format!("NMISS_{suffix}").as_bytes(), &[s.mis])?;
        record.push_info_integer(format!("NHOMREF_{suffix}").as_bytes(), &[s.nhom[0]])?;
        record.push_info_integer(format!("NHET_{suffix}").as_bytes(), &[s.nhet])?;
        record.push_info_integer(format!("NHOMALT_{suffix}").as_bytes(), &[s.nhom[1]])?;
    }
    writer.write_staged()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(nhom0: i32, nhet: i32, nhom1: i32, mis: i32, phased: bool) -> GtSummary {
        GtSummary {
            nhom: [nhom0, nhom1],
            nhet,
            mis,
            is_phased: phased,
            dosages: Vec::new(),
        }
    }

    #[test]
    fn test_identical_summaries_do_not_differ() {
        let sides = [summary(3, 2, 1, 0, true), summary(3, 2, 1, 0, true)];
        assert!(compare_sides(&sides, false, &[]).is_empty());
    }

    #[test]
    fn test_exact_comparison_flags_each_field() {
        let sides = [summary(3, 2, 1, 0, false), summary(2, 2, 1, 1, false)];
        let diff = compare_sides(&sides, false, &[]);
        assert!(diff.contains(&"AN".to_string()));
        assert!(diff.contains(&"NHOM0".to_string()));
        assert!(diff.contains(&"NMISS".to_string()));
        assert!(!diff.contains(&"NHET".to_string()));
    }

    #[test]
    fn test_tolerant_comparison_allows_imputed_missing() {
        // Unphased side has 2 missing samples; the phased side may have up
        // to 2 extra genotypes in any class.
        let sides = [summary(4, 2, 2, 0, true), summary(3, 2, 1, 2, false)];
        assert!(compare_sides(&sides, false, &[]).is_empty());
        // Beyond the bound: flags.
        let sides = [summary(6, 2, 2, 0, true), summary(3, 2, 1, 2, false)];
        assert!(!compare_sides(&sides, false, &[]).is_empty());
    }

    #[test]
    fn test_deep_check_reports_first_mismatching_sample() {
        let mut a = summary(1, 1, 0, 0, true);
        let mut b = summary(1, 1, 0, 0, true);
        a.dosages = vec![0, 1, 2];
        b.dosages = vec![0, 2, 1];
        let names = vec!["s0".to_string(), "s1".to_string(), "s2".to_string()];
        let diff = compare_sides(&[a, b], true, &names);
        assert_eq!(diff, vec!["MISMATCH_GT(s1)".to_string()]);
    }

    #[test]
    fn test_deep_check_skips_missing() {
        let mut a = summary(1, 0, 0, 1, false);
        let mut b = summary(1, 1, 0, 0, false);
        a.dosages = vec![0, -1];
        b.dosages = vec![0, 1];
        let names = vec!["s0".to_string(), "s1".to_string()];
        let diff = compare_sides(&[a, b], true, &names);
        // Count fields differ but no per-sample mismatch is reported.
        assert!(diff.iter().all(|d| !d.starts_with("MISMATCH_GT")));
    }
}
