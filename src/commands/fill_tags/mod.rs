pub mod mendel;
pub mod stats;

use crate::{
    cli::FillTagsArgs,
    constants::{MISSING_FLOAT, PROGRESS_STRIDE_SCAN},
    core::{
        codec::{self, RecordType},
        containers::sparse::SparseGenotype,
        genotype::GenotypeVector,
    },
    io::{
        pedigree::Pedigree,
        xcf_reader::{FileKind, XcfReader},
        xcf_writer::{companion_header, HeaderLayout, WriterMode, XcfWriter},
    },
    utils::util::{companion_bin, companion_fam, Result},
};
use mendel::TrioSet;

/// Which INFO tags the aggregator derives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSet {
    pub an: bool,
    pub ac: bool,
    pub ac_hom: bool,
    pub ac_het: bool,
    pub af: bool,
    pub maf: bool,
    pub ns: bool,
    pub hwe: bool,
    pub exc_het: bool,
    pub ic: bool,
    pub end: bool,
    pub vtype: bool,
    pub mendel: bool,
}

const TAG_DESCRIPTION: &str = "\
INFO/AC        Number:A  Type:Integer  ..  Allele count in genotypes
INFO/AC_Hom    Number:A  Type:Integer  ..  Allele counts in homozygous genotypes
INFO/AC_Het    Number:A  Type:Integer  ..  Allele counts in heterozygous genotypes
INFO/AF        Number:A  Type:Float    ..  Allele frequency
INFO/AN        Number:1  Type:Integer  ..  Total number of alleles in called genotypes
INFO/ExcHet    Number:A  Type:Float    ..  Excess of heterozygosity P-value; 1=good, 0=bad
INFO/END       Number:1  Type:Integer  ..  End position of the variant
INFO/HWE       Number:A  Type:Float    ..  Exact Hardy-Weinberg Equilibrium P-value; 1=good, 0=bad
INFO/IC        Number:A  Type:Float    ..  Inbreeding coefficient
INFO/MAF       Number:1  Type:Float    ..  Frequency of the second most common allele
INFO/MENDEL    ..  Mendel error counts and rates over trios/duos
INFO/NS        Number:1  Type:Integer  ..  Number of samples with data
INFO/TYPE      Number:.  Type:String   ..  The record type (REF,SNP,MNP,INDEL,...)";

impl TagSet {
    pub fn parse(spec: &str) -> Result<Self> {
        let mut tags = TagSet::default();
        for raw in spec.split(',').filter(|t| !t.is_empty()) {
            let tag = raw.strip_prefix("INFO/").unwrap_or(raw);
            match tag {
                "AN" => tags.an = true,
                "AC" => tags.ac = true,
                "AC_Hom" => tags.ac_hom = true,
                "AC_Het" => tags.ac_het = true,
                "AF" => tags.af = true,
                "MAF" => tags.maf = true,
                "NS" => tags.ns = true,
                "HWE" => tags.hwe = true,
                "ExcHet" => tags.exc_het = true,
                "IC" => tags.ic = true,
                "END" => tags.end = true,
                "TYPE" => tags.vtype = true,
                "MENDEL" => tags.mendel = true,
                "all" => {
                    tags = TagSet {
                        an: true,
                        ac: true,
                        ac_hom: true,
                        ac_het: true,
                        af: true,
                        maf: true,
                        ns: true,
                        hwe: true,
                        exc_het: true,
                        ic: true,
                        mendel: true,
                        ..tags
                    };
                }
                _ => {
                    return Err(crate::xcf_error!(
                        "Unsupported tag in tag list: {raw}.\nAccepted options:\n{TAG_DESCRIPTION}"
                    ));
                }
            }
        }
        if tags == TagSet::default() {
            return Err(crate::xcf_error!("At least one tag has to be specified"));
        }
        Ok(tags)
    }

    fn needs_counts(&self) -> bool {
        self.an
            || self.ac
            || self.ac_hom
            || self.ac_het
            || self.af
            || self.maf
            || self.ns
            || self.hwe
            || self.exc_het
            || self.ic
    }
}

/// Per-(sub-population, site) genotype tallies, in samples.
#[derive(Debug, Clone, Copy, Default)]
struct AlleleCount {
    nhom: [i32; 2],
    nhet: i32,
    ns: i32,
    mis: i32,
}

impl AlleleCount {
    fn reset(&mut self) {
        *self = Self::default();
    }

    #[inline]
    fn add(&mut self, a0: bool, a1: bool) {
        if a0 == a1 {
            self.nhom[usize::from(a0)] += 1;
        } else {
            self.nhet += 1;
        }
        self.ns += 1;
    }

    #[inline]
    fn add_missing(&mut self) {
        self.mis += 1;
    }

    /// Attributes the samples a sparse record left implicit to the
    /// homozygous-major genotype in bulk.
    fn close_sparse(&mut self, pop_size: i32, major: bool) {
        self.nhom[usize::from(major)] += pop_size - self.ns - self.mis;
        self.ns = pop_size - self.mis;
    }
}

/// Sample <-> sub-population maps drawn from the pedigree's population
/// column; the implicit all-samples population has the empty name and comes
/// last.
struct Populations {
    names: Vec<String>,
    pop2samples: Vec<Vec<u32>>,
    samples2pop: Vec<Vec<u32>>,
}

fn build_populations(pedigree: &Pedigree) -> Populations {
    let n = pedigree.len();
    let mut names: Vec<String> = Vec::new();
    let mut pop2samples: Vec<Vec<u32>> = Vec::new();
    let mut samples2pop: Vec<Vec<u32>> = vec![Vec::new(); n];

    for (i, spec) in pedigree.populations.iter().enumerate() {
        if spec.is_empty() || spec == "NA" {
            continue;
        }
        for pop in spec.split(',').filter(|p| !p.is_empty()) {
            let id = match names.iter().position(|name| name == pop) {
                Some(id) => id,
                None => {
                    names.push(pop.to_string());
                    pop2samples.push(Vec::new());
                    names.len() - 1
                }
            };
            pop2samples[id].push(i as u32);
            samples2pop[i].push(id as u32);
        }
    }

    let all = names.len();
    names.push(String::new());
    pop2samples.push((0..n as u32).collect());
    for pops in samples2pop.iter_mut() {
        pops.push(all as u32);
    }

    Populations {
        names,
        pop2samples,
        samples2pop,
    }
}

fn tag_name(base: &str, pop: &str) -> String {
    if pop.is_empty() {
        base.to_string()
    } else {
        format!("{base}_{pop}")
    }
}

/// INFO definitions for every enabled tag and sub-population.
fn tag_header_lines(tags: &TagSet, pop_names: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut push = |base: &str, number: &str, ty: &str, desc: &str| {
        for pop in pop_names {
            let suffix = if pop.is_empty() {
                String::new()
            } else {
                format!(" in {pop}")
            };
            lines.push(format!(
                "##INFO=<ID={},Number={number},Type={ty},Description=\"{desc}{suffix}\">",
                tag_name(base, pop)
            ));
        }
    };
    if tags.ns {
        push("NS", "1", "Integer", "Number of samples with data");
    }
    if tags.an {
        push(
            "AN",
            "1",
            "Integer",
            "Total number of alleles in called genotypes",
        );
    }
    if tags.ac {
        push("AC", "A", "Integer", "Allele count in genotypes");
    }
    if tags.ac_hom {
        push(
            "AC_Hom",
            "A",
            "Integer",
            "Allele counts in homozygous genotypes",
        );
    }
    if tags.ac_het {
        push(
            "AC_Het",
            "A",
            "Integer",
            "Allele counts in heterozygous genotypes",
        );
    }
    if tags.af {
        push("AF", "A", "Float", "Allele frequency");
    }
    if tags.maf {
        push(
            "MAF",
            "1",
            "Float",
            "Frequency of the second most common allele",
        );
    }
    if tags.ic {
        push("IC", "A", "Float", "Inbreeding coefficient");
    }
    if tags.hwe {
        push(
            "HWE",
            "A",
            "Float",
            "Exact Hardy-Weinberg Equilibrium P-value (PMID:15789306); 1=good, 0=bad",
        );
        push(
            "HWE_CHISQ",
            "A",
            "Float",
            "Chi-squared Hardy-Weinberg Equilibrium P-value; 1=good, 0=bad",
        );
    }
    if tags.exc_het {
        push(
            "ExcHet",
            "A",
            "Float",
            "Excess of heterozygosity P-value; 1=good, 0=bad",
        );
    }
    if tags.end {
        lines.push(
            "##INFO=<ID=END,Number=1,Type=Integer,Description=\"End position of the variant\">"
                .to_string(),
        );
    }
    if tags.vtype {
        lines.push(
            "##INFO=<ID=TYPE,Number=.,Type=String,Description=\"The record type\">".to_string(),
        );
    }
    if tags.mendel {
        for (id, ty, desc) in [
            ("MERR_CNT", "Integer", "Number of Mendel errors in duos/trios"),
            (
                "MTOT_ALL",
                "Integer",
                "Number of trios/duos with all members genotyped",
            ),
            (
                "MTOT_MINOR",
                "Integer",
                "Number of genotyped trios/duos with a non-major member",
            ),
            ("MERR_RATE_ALL", "Float", "Mendel error rate (MERR_CNT/MTOT_ALL)"),
            (
                "MERR_RATE_MINOR",
                "Float",
                "Mendel error rate over non-major trios (MERR_CNT/MTOT_MINOR)",
            ),
        ] {
            lines.push(format!(
                "##INFO=<ID={id},Number=1,Type={ty},Description=\"{desc}\">"
            ));
        }
    }
    lines
}

/// Single-pass aggregator: decodes each record, accumulates per-population
/// allele/genotype counts, derives the requested INFO tags and republishes
/// the record (side-car bytes copied verbatim at the end).
pub fn fill_tags(args: FillTagsArgs) -> Result<()> {
    let tags = TagSet::parse(&args.tags)?;

    let mut reader = XcfReader::open(None, args.threads);
    let input = reader.add_file(&args.input)?;
    if reader.file_kind(input) != FileKind::Binary {
        return Err(crate::xcf_error!("[{}] is not a XCF file", args.input));
    }
    let n_samples = reader.n_samples(input);
    let pedigree = reader.pedigree(input).clone();
    let pops = build_populations(&pedigree);
    log::info!("#samples = {n_samples}, #pops = {}", pops.names.len());

    let trios = if tags.mendel {
        let trios = TrioSet::from_pedigree(&pedigree);
        log::info!("#trios/duos = {}", trios.len());
        trios
    } else {
        TrioSet::default()
    };

    let mut header = companion_header(
        reader.header_view(input),
        &format!("{} {}", env!("CARGO_PKG_NAME"), *crate::cli::FULL_VERSION),
        true,
        HeaderLayout::SideCar,
        None,
    )?;
    for line in tag_header_lines(&tags, &pops.names) {
        header.push_record(line.as_bytes());
    }
    let mut writer = XcfWriter::new(&args.output, header, args.threads, WriterMode::CompanionOnly)?;

    let mut counts = vec![AlleleCount::default(); pops.names.len()];
    let mut payload = Vec::new();
    let mut gv = GenotypeVector::new(n_samples);
    let mut hwe_probs = Vec::new();
    let mut n_lines = 0u64;

    while reader.next()? {
        if !reader.has_record(input) {
            continue;
        }
        let rec_type = reader.record_type(input);
        let af = reader.af(input);
        let major = af > 0.5;

        for count in counts.iter_mut() {
            count.reset();
        }
        let aggregated = match rec_type {
            RecordType::BcfGenotype | RecordType::Void => {
                log::warn!(
                    "Unrecognized genotype record type [{rec_type}] at {}:{}",
                    reader.site().chrom,
                    reader.site().pos
                );
                false
            }
            _ => {
                reader.read_payload(input, &mut payload)?;
                aggregate(rec_type, &payload, major, &pops, &mut counts)?;
                true
            }
        };

        let mendel_counts = (tags.mendel && aggregated && !trios.is_empty())
            .then(|| -> Result<mendel::MendelCounts> {
                codec::decode_into(rec_type, &payload, af, &mut gv)?;
                Ok(trios.score_site(&gv, if major { 2 } else { 0 }))
            })
            .transpose()?;

        let record = reader.take_record(input).ok_or_else(|| {
            crate::xcf_error!("Missing companion record at {}", reader.site().pos)
        })?;
        let site = reader.site().clone();
        writer.stage_taken(record)?;
        push_tags(
            &mut writer,
            &tags,
            &pops,
            &counts,
            &mut hwe_probs,
            &site,
            mendel_counts,
        )?;
        writer.write_staged()?;

        n_lines += 1;
        if n_lines % PROGRESS_STRIDE_SCAN == 0 {
            log::info!("Number of XCF records processed: N={n_lines}");
        }
    }
    log::info!("Number of XCF records processed: N={n_lines}");

    let out_path = writer.path().to_string();
    writer.close()?;

    if !args.out_only_bcf && out_path != "-" {
        std::fs::copy(companion_bin(&args.input), companion_bin(&out_path))?;
        std::fs::copy(companion_fam(&args.input), companion_fam(&out_path))?;
    }
    Ok(())
}

/// Walks one record payload into the per-population counters. Dense records
/// visit all samples; sparse records visit stored entries and attribute the
/// remainder in bulk.
fn aggregate(
    rec_type: RecordType,
    payload: &[u8],
    major: bool,
    pops: &Populations,
    counts: &mut [AlleleCount],
) -> Result<()> {
    let read_bit = |i: usize| (payload[i / 8] >> (7 - i % 8)) & 1 != 0;
    match rec_type {
        RecordType::BinaryGenotype => {
            for (i, pops_of) in pops.samples2pop.iter().enumerate() {
                let a0 = read_bit(2 * i);
                let a1 = read_bit(2 * i + 1);
                let missing = a0 && !a1;
                for &p in pops_of {
                    if missing {
                        counts[p as usize].add_missing();
                    } else {
                        counts[p as usize].add(a0, a1);
                    }
                }
            }
        }
        RecordType::BinaryHaplotype => {
            for (i, pops_of) in pops.samples2pop.iter().enumerate() {
                let a0 = read_bit(2 * i);
                let a1 = read_bit(2 * i + 1);
                for &p in pops_of {
                    counts[p as usize].add(a0, a1);
                }
            }
        }
        RecordType::SparseGenotype | RecordType::SparsePhaseProbs => {
            let n_bytes = match rec_type {
                RecordType::SparsePhaseProbs => payload.len() / 2,
                _ => payload.len(),
            };
            for chunk in payload[..n_bytes].chunks_exact(4) {
                let sg = SparseGenotype::unpack(u32::from_le_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3],
                ]));
                for &p in &pops.samples2pop[sg.idx as usize] {
                    if sg.mis {
                        counts[p as usize].add_missing();
                    } else {
                        counts[p as usize].add(sg.al0, sg.al1);
                    }
                }
            }
            close_sparse(pops, counts, major);
        }
        RecordType::SparseHaplotype => {
            let indices: Vec<u32> = payload
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            let minor = !major;
            let mut r = 0;
            while r < indices.len() {
                let hap = indices[r];
                let sample = (hap / 2) as usize;
                // Ascending order: adjacent even/odd indices of one sample
                // mean homozygous-minor.
                let hom_minor =
                    hap % 2 == 0 && r + 1 < indices.len() && indices[r + 1] == hap + 1;
                for &p in &pops.samples2pop[sample] {
                    counts[p as usize].add(minor, if hom_minor { minor } else { major });
                }
                r += if hom_minor { 2 } else { 1 };
            }
            close_sparse(pops, counts, major);
        }
        RecordType::BcfGenotype | RecordType::Void => {
            return Err(crate::xcf_error!(
                "Record type [{rec_type}] has no side-car payload"
            ));
        }
    }
    Ok(())
}

fn close_sparse(pops: &Populations, counts: &mut [AlleleCount], major: bool) {
    for (p, samples) in pops.pop2samples.iter().enumerate() {
        counts[p].close_sparse(samples.len() as i32, major);
    }
}

fn variant_type(ref_allele: &[u8], alt_allele: &[u8]) -> &'static str {
    let symbolic = alt_allele.first() == Some(&b'<')
        || alt_allele.contains(&b'[')
        || alt_allele.contains(&b']');
    if symbolic {
        return "OTHER";
    }
    match (ref_allele.len(), alt_allele.len()) {
        (1, 1) if ref_allele == alt_allele => "REF",
        (1, 1) => "SNP",
        (r, a) if r == a => "MNP",
        _ => "INDEL",
    }
}

#[allow(clippy::too_many_arguments)]
fn push_tags(
    writer: &mut XcfWriter,
    tags: &TagSet,
    pops: &Populations,
    counts: &[AlleleCount],
    hwe_probs: &mut Vec<f64>,
    site: &crate::io::xcf_reader::Site,
    mendel_counts: Option<mendel::MendelCounts>,
) -> Result<()> {
    if tags.needs_counts() {
        for (p, count) in counts.iter().enumerate() {
            let pop = &pops.names[p];
            let nhom0 = count.nhom[0];
            let nhom1 = count.nhom[1];
            let nhet = count.nhet;
            let nref = 2 * nhom0 + nhet;
            let nalt = 2 * nhom1 + nhet;
            let an = nref + nalt;
            let (hwe, exc_het) = if tags.hwe || tags.exc_het {
                stats::hwe_exact(nref, nalt, nhet, hwe_probs)?
            } else {
                (1.0, 1.0)
            };

            let record = writer.staged_record_mut();
            if tags.ns {
                record.push_info_integer(tag_name("NS", pop).as_bytes(), &[count.ns])?;
            }
            if tags.an {
                record.push_info_integer(tag_name("AN", pop).as_bytes(), &[an])?;
            }
            if tags.ac {
                record.push_info_integer(tag_name("AC", pop).as_bytes(), &[nalt])?;
            }
            if tags.ac_hom {
                record.push_info_integer(tag_name("AC_Hom", pop).as_bytes(), &[2 * nhom1])?;
            }
            if tags.ac_het {
                record.push_info_integer(tag_name("AC_Het", pop).as_bytes(), &[nhet])?;
            }
            if tags.af || tags.maf {
                let af = if an > 0 {
                    nalt as f32 / an as f32
                } else {
                    MISSING_FLOAT
                };
                if tags.af {
                    record.push_info_float(tag_name("AF", pop).as_bytes(), &[af])?;
                }
                if tags.maf {
                    let maf = if an > 0 { af.min(1.0 - af) } else { af };
                    record.push_info_float(tag_name("MAF", pop).as_bytes(), &[maf])?;
                }
            }
            if tags.ic {
                let ic = if nref > 0 && nalt > 0 {
                    stats::inbreeding_coefficient(an, nref, nhet)
                } else {
                    MISSING_FLOAT
                };
                record.push_info_float(tag_name("IC", pop).as_bytes(), &[ic])?;
            }
            if tags.hwe {
                record.push_info_float(tag_name("HWE", pop).as_bytes(), &[hwe])?;
                let chisq = if nref > 0 && nalt > 0 {
                    stats::hwe_chisq(an, nref, nhom0, nhom1, nhet)
                } else {
                    1.0
                };
                record.push_info_float(tag_name("HWE_CHISQ", pop).as_bytes(), &[chisq])?;
            }
            if tags.exc_het {
                record.push_info_float(tag_name("ExcHet", pop).as_bytes(), &[exc_het])?;
            }
        }
    }

    let record = writer.staged_record_mut();
    if tags.end {
        let end = record.pos() + record.rlen();
        record.push_info_integer(b"END", &[end as i32])?;
    }
    if tags.vtype {
        let vtype = variant_type(&site.ref_allele, &site.alt_allele);
        record.push_info_string(b"TYPE", &[vtype.as_bytes()])?;
    }
    if let Some(mc) = mendel_counts {
        record.push_info_integer(b"MERR_CNT", &[mc.n_err as i32])?;
        record.push_info_integer(b"MTOT_ALL", &[mc.n_total as i32])?;
        record.push_info_integer(b"MTOT_MINOR", &[mc.n_minor as i32])?;
        let rate_all = if mc.n_total > 0 {
            mc.n_err as f32 / mc.n_total as f32
        } else {
            MISSING_FLOAT
        };
        let rate_minor = if mc.n_minor > 0 {
            mc.n_err as f32 / mc.n_minor as f32
        } else {
            MISSING_FLOAT
        };
        record.push_info_float(b"MERR_RATE_ALL", &[rate_all])?;
        record.push_info_float(b"MERR_RATE_MINOR", &[rate_minor])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::Encoder;
    use crate::core::genotype::Genotype;

    fn single_pop(n: usize) -> Populations {
        let ped = Pedigree::from_names((0..n).map(|i| format!("s{i}")).collect());
        build_populations(&ped)
    }

    #[test]
    fn test_tag_set_parse() {
        let tags = TagSet::parse("AN,AC,INFO/HWE").unwrap();
        assert!(tags.an && tags.ac && tags.hwe);
        assert!(!tags.maf);
        let all = TagSet::parse("all").unwrap();
        assert!(all.an && all.maf && all.mendel);
        assert!(!all.end && !all.vtype);
        assert!(TagSet::parse("BOGUS").is_err());
        assert!(TagSet::parse("").is_err());
    }

    #[test]
    fn test_build_populations_appends_all() {
        let mut ped = Pedigree::from_names(vec!["a".into(), "b".into(), "c".into()]);
        ped.populations = vec!["EUR".into(), "EUR,FIN".into(), "NA".into()];
        let pops = build_populations(&ped);
        assert_eq!(pops.names, vec!["EUR".to_string(), "FIN".to_string(), String::new()]);
        assert_eq!(pops.pop2samples[0], vec![0, 1]);
        assert_eq!(pops.pop2samples[1], vec![1]);
        assert_eq!(pops.pop2samples[2], vec![0, 1, 2]);
        assert_eq!(pops.samples2pop[2], vec![2]);
    }

    /// spec S5: [0/0, 0/1, 1/1, 0/0, ./.] over the ALL population.
    #[test]
    fn test_aggregate_dense_genotypes() {
        let pops = single_pop(5);
        let mut gv = GenotypeVector::new(5);
        gv.set(0, Genotype::hom(false));
        gv.set(1, Genotype::het_unphased());
        gv.set(2, Genotype::hom(true));
        gv.set(3, Genotype::hom(false));
        gv.set(4, Genotype::missing());
        let mut enc = Encoder::new(5);
        let payload = enc
            .encode(&gv, RecordType::BinaryGenotype, 3.0 / 8.0, None, "1", 1)
            .unwrap()
            .to_vec();

        let mut counts = vec![AlleleCount::default(); 1];
        aggregate(RecordType::BinaryGenotype, &payload, false, &pops, &mut counts).unwrap();
        let c = counts[0];
        assert_eq!(c.ns, 4);
        assert_eq!(c.mis, 1);
        assert_eq!(c.nhom, [2, 1]);
        assert_eq!(c.nhet, 1);
        // Derived: AN=8, AC=3, AC_Hom=2, AC_Het=1.
        assert_eq!(2 * (c.nhom[0] + c.nhom[1] + c.nhet), 8);
        assert_eq!(2 * c.nhom[1] + c.nhet, 3);
    }

    #[test]
    fn test_aggregate_sparse_matches_dense() {
        let pops = single_pop(6);
        let mut gv = GenotypeVector::new(6);
        gv.fill_hom(false);
        gv.set(1, Genotype::het_unphased());
        gv.set(3, Genotype::missing());
        gv.set(4, Genotype::hom(true));
        let af = 3.0 / 10.0;
        let mut enc = Encoder::new(6);

        let dense = enc
            .encode(&gv, RecordType::BinaryGenotype, af, None, "1", 1)
            .unwrap()
            .to_vec();
        let mut dense_counts = vec![AlleleCount::default(); 1];
        aggregate(RecordType::BinaryGenotype, &dense, false, &pops, &mut dense_counts).unwrap();

        let sparse = enc
            .encode(&gv, RecordType::SparseGenotype, af, None, "1", 1)
            .unwrap()
            .to_vec();
        let mut sparse_counts = vec![AlleleCount::default(); 1];
        aggregate(RecordType::SparseGenotype, &sparse, false, &pops, &mut sparse_counts).unwrap();

        assert_eq!(dense_counts[0].nhom, sparse_counts[0].nhom);
        assert_eq!(dense_counts[0].nhet, sparse_counts[0].nhet);
        assert_eq!(dense_counts[0].ns, sparse_counts[0].ns);
        assert_eq!(dense_counts[0].mis, sparse_counts[0].mis);
    }

    #[test]
    fn test_aggregate_sparse_haplotypes_with_hom_minor_pair() {
        let pops = single_pop(4);
        // Haplotype indices 2,3 (sample 1 hom-minor) and 6 (sample 3 het).
        let mut payload = Vec::new();
        for hap in [2u32, 3, 6] {
            payload.extend_from_slice(&hap.to_le_bytes());
        }
        let mut counts = vec![AlleleCount::default(); 1];
        aggregate(RecordType::SparseHaplotype, &payload, false, &pops, &mut counts).unwrap();
        let c = counts[0];
        assert_eq!(c.ns, 4);
        assert_eq!(c.mis, 0);
        assert_eq!(c.nhom, [2, 1]);
        assert_eq!(c.nhet, 1);
    }

    #[test]
    fn test_variant_type() {
        assert_eq!(variant_type(b"A", b"T"), "SNP");
        assert_eq!(variant_type(b"A", b"A"), "REF");
        assert_eq!(variant_type(b"AT", b"GC"), "MNP");
        assert_eq!(variant_type(b"AT", b"A"), "INDEL");
        assert_eq!(variant_type(b"A", b"<DEL>"), "OTHER");
    }
}
