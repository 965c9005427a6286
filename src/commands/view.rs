use crate::{
    cli::ViewArgs,
    constants::PROGRESS_STRIDE_CONVERT,
    core::{
        codec::{self, Encoder, OutputFormat, RecordType},
        genotype::GenotypeVector,
    },
    io::{
        pedigree::Pedigree,
        xcf_reader::{FileKind, Region, XcfReader},
        xcf_writer::{companion_header, HeaderLayout, WriterMode, XcfWriter},
    },
    utils::util::{companion_bin, Result},
};

/// Converts between BCF and the XCF encodings: BCF->XCF (encode), XCF->BCF
/// (decode into FORMAT/GT) and XCF->XCF (re-encode, optionally subsetting
/// samples).
pub fn view(args: ViewArgs) -> Result<()> {
    let region = args.region.as_deref().map(Region::parse).transpose()?;
    if region.is_none() {
        log::warn!(
            "--region not specified; reading without an index. \
             Multi-chromosome inputs should be processed per region."
        );
    }

    let input_is_xcf = args.input != "-" && companion_bin(&args.input).exists();

    if args.format.is_xcf() && args.output == "-" {
        return Err(crate::xcf_error!(
            "Only BCF format [bcf] is supported on stdout"
        ));
    }
    if (args.samples.is_some() || args.samples_file.is_some())
        && !(input_is_xcf && args.format.is_xcf())
    {
        return Err(crate::xcf_error!(
            "--samples/--samples-file are only supported for XCF to XCF conversion"
        ));
    }

    match (input_is_xcf, args.format) {
        (false, OutputFormat::Bcf) => Err(crate::xcf_error!(
            "Input [{}] carries no XCF side-car; nothing to convert to BCF",
            args.input
        )),
        (false, _) => bcf_to_xcf(&args, region),
        (true, OutputFormat::Bcf) => xcf_to_bcf(&args, region),
        (true, _) => xcf_to_xcf(&args, region),
    }
}

fn source_line() -> String {
    format!("{} {}", env!("CARGO_PKG_NAME"), *crate::cli::FULL_VERSION)
}

fn bcf_to_xcf(args: &ViewArgs, region: Option<Region>) -> Result<()> {
    log::info!("Converting from BCF to XCF [{:?}]", args.format);

    let mut reader = XcfReader::open(region, args.threads);
    let input = reader.add_file(&args.input)?;
    if reader.file_kind(input) != FileKind::Bcf {
        return Err(crate::xcf_error!("[{}] is not a BCF file", args.input));
    }
    let n_samples = reader.n_samples(input);
    let pedigree = reader.pedigree(input).clone();
    log::info!("#samples = {n_samples}");

    let header = companion_header(
        reader.header_view(input),
        &source_line(),
        args.keep_info,
        HeaderLayout::SideCar,
        None,
    )?;
    let mut writer = XcfWriter::new(
        &args.output,
        header,
        args.threads,
        WriterMode::SideCar(&pedigree),
    )?;

    let mut encoder = Encoder::new(n_samples);
    let mut gv = GenotypeVector::new(n_samples);
    let mut probs = Vec::new();
    let mut n_types = [0u64; 7];
    let mut n_pp_kept = 0u64;
    let mut n_pp_lost = 0u64;

    while reader.next()? {
        if !reader.has_record(input) {
            continue;
        }
        let af = reader.af(input);
        let maf = af.min(1.0 - af);
        let rare = maf < args.maf;

        reader.read_genotype_vector(input, &mut gv)?;
        let has_probs = args.format == OutputFormat::PhaseProbs
            && reader.read_phase_probs(input, &mut probs)?;

        let target = args.format.target_type(rare, has_probs);
        if args.format == OutputFormat::PhaseProbs && rare {
            if target == RecordType::SparsePhaseProbs {
                n_pp_kept += 1;
            } else {
                n_pp_lost += 1;
            }
        }
        n_types[target.code() as usize] += 1;

        let site = reader.site().clone();
        let payload = encoder.encode(
            &gv,
            target,
            af,
            has_probs.then_some(probs.as_slice()),
            &site.chrom,
            site.pos,
        )?;
        writer.stage_site(
            &site.chrom,
            site.pos,
            &site.rsid,
            &site.ref_allele,
            &site.alt_allele,
            reader.ac(input),
            reader.an(input),
        )?;
        writer.write_record(target, payload)?;

        let n_lines: u64 = n_types.iter().sum();
        if n_lines % PROGRESS_STRIDE_CONVERT == 0 {
            log_type_counts(&n_types);
        }
    }
    log_type_counts(&n_types);
    if n_pp_lost > 0 {
        log::warn!(
            "Phase probabilities were dropped for {n_pp_lost} rare variants \
             (kept for {n_pp_kept}); consider raising --maf"
        );
    }
    writer.close()
}

fn log_type_counts(n_types: &[u64; 7]) {
    log::info!(
        "Records processed: [{} G, {} H, {} SG, {} SH, {} PP]",
        n_types[RecordType::BinaryGenotype.code() as usize],
        n_types[RecordType::BinaryHaplotype.code() as usize],
        n_types[RecordType::SparseGenotype.code() as usize],
        n_types[RecordType::SparseHaplotype.code() as usize],
        n_types[RecordType::SparsePhaseProbs.code() as usize],
    );
}

fn xcf_to_bcf(args: &ViewArgs, region: Option<Region>) -> Result<()> {
    log::info!("Converting from XCF to BCF");

    let mut reader = XcfReader::open(region, args.threads);
    let input = reader.add_file(&args.input)?;
    if reader.file_kind(input) != FileKind::Binary {
        return Err(crate::xcf_error!("[{}] is not a XCF file", args.input));
    }
    let n_samples = reader.n_samples(input);
    let sample_names = reader.pedigree(input).names.clone();
    log::info!("#samples = {n_samples}");

    let header = companion_header(
        reader.header_view(input),
        &source_line(),
        args.keep_info,
        HeaderLayout::Embedded,
        Some(&sample_names),
    )?;
    let mut writer = XcfWriter::new(
        &args.output,
        header,
        args.threads,
        WriterMode::EmbeddedGenotypes,
    )?;

    let mut gv = GenotypeVector::new(n_samples);
    let mut payload = Vec::new();
    let mut probs = Vec::new();
    let mut n_lines = 0u64;

    while reader.next()? {
        if !reader.has_record(input) {
            continue;
        }
        let rec_type = reader.record_type(input);
        let af = reader.af(input);
        let with_probs = match rec_type {
            RecordType::SparsePhaseProbs => {
                reader.read_payload(input, &mut payload)?;
                codec::decode_phase_probs(&payload, af, &mut gv, &mut probs)?;
                // Phasing confidence is published rounded to 3 decimals.
                for p in probs.iter_mut() {
                    if !p.is_nan() {
                        *p = (*p * 1000.0).round() / 1000.0;
                    }
                }
                true
            }
            RecordType::BinaryGenotype
            | RecordType::BinaryHaplotype
            | RecordType::SparseGenotype
            | RecordType::SparseHaplotype => {
                reader.read_payload(input, &mut payload)?;
                codec::decode_into(rec_type, &payload, af, &mut gv)?;
                false
            }
            RecordType::BcfGenotype | RecordType::Void => {
                log::warn!(
                    "Unrecognized genotype record type [{rec_type}] at {}:{}",
                    reader.site().chrom,
                    reader.site().pos
                );
                continue;
            }
        };

        let site = reader.site().clone();
        writer.stage_site(
            &site.chrom,
            site.pos,
            &site.rsid,
            &site.ref_allele,
            &site.alt_allele,
            reader.ac(input),
            reader.an(input),
        )?;
        writer.write_embedded_genotypes(&gv, with_probs.then_some(probs.as_slice()))?;

        n_lines += 1;
        if n_lines % PROGRESS_STRIDE_CONVERT == 0 {
            log::info!("Number of XCF records processed: N={n_lines}");
        }
    }
    log::info!("Number of records processed: N={n_lines}");
    writer.close()
}

/// Sample subset of an XCF->XCF conversion.
struct Subset {
    keep: Vec<usize>,
    pedigree: Pedigree,
}

fn resolve_subset(args: &ViewArgs, pedigree: &Pedigree) -> Result<Option<Subset>> {
    let spec = match (&args.samples, &args.samples_file) {
        (Some(list), None) => list.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        (None, None) => return Ok(None),
        (Some(_), Some(_)) => {
            return Err(crate::xcf_error!(
                "Options --samples and --samples-file cannot be both specified"
            ));
        }
    };
    if spec.is_empty() {
        return Err(crate::xcf_error!("Sample option is empty"));
    }

    let (exclude, names) = match spec.strip_prefix('^') {
        Some(rest) => (true, rest),
        None => (false, spec.as_str()),
    };
    let index = pedigree.name_index();
    let mut selected = Vec::new();
    for name in names.split(',').filter(|n| !n.is_empty()) {
        match index.get(name) {
            Some(&i) => selected.push(i),
            None if args.force_samples => {
                log::warn!("Subset sample does not exist in input: {name}... skipping");
            }
            None => {
                return Err(crate::xcf_error!(
                    "Subset sample does not exist in input: {name}. \
                     Use \"--force-samples\" to ignore this error."
                ));
            }
        }
    }

    let keep: Vec<usize> = if exclude {
        let drop: std::collections::HashSet<usize> = selected.into_iter().collect();
        (0..pedigree.len()).filter(|i| !drop.contains(i)).collect()
    } else {
        let mut keep: Vec<usize> = {
            let set: std::collections::BTreeSet<usize> = selected.into_iter().collect();
            set.into_iter().collect()
        };
        keep.dedup();
        keep
    };

    if keep.is_empty() {
        return Err(crate::xcf_error!("Subsetting has removed all samples"));
    }
    if keep.len() == pedigree.len() {
        log::warn!("No individual to remove. Proceeding without subsampling.");
        return Ok(None);
    }
    let sub = pedigree.subset(&keep);
    Ok(Some(Subset { keep, pedigree: sub }))
}

fn xcf_to_xcf(args: &ViewArgs, region: Option<Region>) -> Result<()> {
    log::info!("Converting from XCF to XCF [{:?}]", args.format);

    let mut reader = XcfReader::open(region, args.threads);
    let input = reader.add_file(&args.input)?;
    if reader.file_kind(input) != FileKind::Binary {
        return Err(crate::xcf_error!("[{}] is not a XCF file", args.input));
    }
    let n_full = reader.n_samples(input);
    let full_pedigree = reader.pedigree(input).clone();
    let subset = resolve_subset(args, &full_pedigree)?;
    let out_pedigree = match &subset {
        Some(sub) => {
            log::info!("#samples to subsample = {}", sub.pedigree.len());
            sub.pedigree.clone()
        }
        None => full_pedigree,
    };
    let n_out = out_pedigree.len();

    let header = companion_header(
        reader.header_view(input),
        &source_line(),
        args.keep_info,
        HeaderLayout::SideCar,
        None,
    )?;
    let mut writer = XcfWriter::new(
        &args.output,
        header,
        args.threads,
        WriterMode::SideCar(&out_pedigree),
    )?;

    let mut gv_full = GenotypeVector::new(n_full);
    let mut gv_out = GenotypeVector::new(n_out);
    let mut encoder = Encoder::new(n_out);
    let mut payload = Vec::new();
    let mut probs_full = Vec::new();
    let mut probs_out = Vec::new();
    let mut n_comm = 0u64;
    let mut n_rare = 0u64;

    while reader.next()? {
        if !reader.has_record(input) {
            continue;
        }
        let rec_type = reader.record_type(input);
        let af_full = reader.af(input);

        let has_probs = match rec_type {
            RecordType::SparsePhaseProbs => {
                reader.read_payload(input, &mut payload)?;
                codec::decode_phase_probs(&payload, af_full, &mut gv_full, &mut probs_full)?;
                true
            }
            RecordType::BinaryGenotype
            | RecordType::BinaryHaplotype
            | RecordType::SparseGenotype
            | RecordType::SparseHaplotype => {
                reader.read_payload(input, &mut payload)?;
                codec::decode_into(rec_type, &payload, af_full, &mut gv_full)?;
                false
            }
            RecordType::BcfGenotype | RecordType::Void => {
                log::warn!(
                    "Unrecognized genotype record type [{rec_type}] at {}:{}",
                    reader.site().chrom,
                    reader.site().pos
                );
                continue;
            }
        };

        // Cross-family re-encoding is only defined genotype->haplotype when
        // no data is missing; the encoder enforces that below.
        let (ac, an) = match &subset {
            Some(sub) => {
                for (j, &i) in sub.keep.iter().enumerate() {
                    gv_out.set(j, gv_full.get(i));
                }
                if has_probs {
                    probs_out.clear();
                    probs_out.extend(sub.keep.iter().map(|&i| probs_full[i]));
                }
                (gv_out.allele_count(), gv_out.allele_number())
            }
            None => {
                gv_out.clone_from(&gv_full);
                if has_probs {
                    probs_out.clone_from(&probs_full);
                }
                (reader.ac(input), reader.an(input))
            }
        };
        let af = if an > 0 { ac as f32 / an as f32 } else { 0.0 };
        let maf = af.min(1.0 - af);
        let rare = maf < args.maf;
        let target = args.format.target_type(rare, has_probs);
        if rare {
            n_rare += 1;
        } else {
            n_comm += 1;
        }

        let site = reader.site().clone();
        let out_payload = encoder.encode(
            &gv_out,
            target,
            af,
            has_probs.then_some(probs_out.as_slice()),
            &site.chrom,
            site.pos,
        )?;
        writer.stage_site(
            &site.chrom,
            site.pos,
            &site.rsid,
            &site.ref_allele,
            &site.alt_allele,
            ac,
            an,
        )?;
        writer.write_record(target, out_payload)?;

        if (n_comm + n_rare) % PROGRESS_STRIDE_CONVERT == 0 {
            log::info!("Records processed: Nc={n_comm} / Nr={n_rare}");
        }
    }
    log::info!("Number of records processed: Nc={n_comm} / Nr={n_rare}");
    writer.close()
}
