use crate::{
    core::{
        codec::{self, RecordType},
        containers::sparse::SparseGenotype,
        genotype::GenotypeVector,
    },
    error::XcfError,
    io::{
        pedigree::Pedigree,
        xcf_reader::{FileKind, Region, XcfReader},
        xcf_writer::{companion_header, HeaderLayout, WriterMode, XcfWriter},
    },
    utils::util::{companion_fam, Result},
};
use rust_htslib::bcf::{self, Read};

/// Ligation of overlapping phased chunks into one continuous XCF.
///
/// Consecutive chunk pairs are scanned over their overlap to estimate a
/// per-sample phase-swap vector; records from the right chunk (and every
/// later one) are re-emitted with haplotype labels flipped for the swapped
/// samples, so phase is continuous across chunk boundaries.
pub fn ligate(inputs: &[String], output: &str, out_only_bcf: bool, threads: usize) -> Result<()> {
    log::info!("Ligating {} chunks", inputs.len());
    let shards = preflight(inputs)?;
    let n_samples = shards.pedigree.len();
    log::info!("#samples = {n_samples}");

    let first = bcf::Reader::from_path(&inputs[0])
        .map_err(|e| crate::xcf_error!("Failed to open: {}: {e}", inputs[0]))?;
    let header = companion_header(
        first.header(),
        &format!("{} {}", env!("CARGO_PKG_NAME"), *crate::cli::FULL_VERSION),
        true,
        HeaderLayout::SideCar,
        None,
    )?;
    drop(first);

    let mode = if out_only_bcf {
        WriterMode::CompanionOnly
    } else {
        WriterMode::SideCar(&shards.pedigree)
    };
    let mut writer = XcfWriter::new(output, header, threads, mode)?;

    let mut n_variants = 0u64;
    for group in &shards.groups {
        n_variants += ligate_group(&mut writer, group, n_samples, threads)?;
    }
    if n_variants == 0 {
        return Err(crate::xcf_error!("No variants to be ligated in files"));
    }
    writer.close()?;
    log::info!("Writing completed [L={n_variants}]");
    Ok(())
}

struct Chunk {
    path: String,
    chrom: String,
    start_pos: u32,
}

struct ShardSet {
    pedigree: Pedigree,
    /// Chunks grouped by chromosome, in input order.
    groups: Vec<Vec<Chunk>>,
}

/// Opens every chunk once to check sample/pedigree identity, grab the first
/// record position, and validate ordering.
fn preflight(inputs: &[String]) -> Result<ShardSet> {
    let pedigree = Pedigree::read(&companion_fam(&inputs[0]))?;
    let mut groups: Vec<Vec<Chunk>> = Vec::new();

    for input in inputs {
        let ped = Pedigree::read(&companion_fam(input))?;
        if pedigree.names != ped.names {
            return Err(XcfError::SampleMismatch {
                left: inputs[0].clone(),
                right: input.clone(),
            });
        }
        if pedigree.fathers != ped.fathers
            || pedigree.mothers != ped.mothers
            || pedigree.populations != ped.populations
        {
            return Err(crate::xcf_error!(
                "Pedigree parent/population fields differ between [{}] and [{input}]",
                inputs[0]
            ));
        }

        let mut reader = bcf::Reader::from_path(input)
            .map_err(|e| crate::xcf_error!("Failed to open: {input}: {e}"))?;
        let mut record = reader.empty_record();
        let (chrom, start_pos) = match reader.read(&mut record) {
            Some(Ok(())) => {
                let rid = record
                    .rid()
                    .ok_or_else(|| crate::xcf_error!("Record without contig in [{input}]"))?;
                (
                    String::from_utf8_lossy(reader.header().rid2name(rid)?).into_owned(),
                    (record.pos() + 1) as u32,
                )
            }
            _ => return Err(crate::xcf_error!("Empty file detected: {input}")),
        };

        let same_chrom = groups.last().is_some_and(|g| g[0].chrom == chrom);
        let chunk = Chunk {
            path: input.clone(),
            chrom,
            start_pos,
        };
        if same_chrom {
            let group = groups.last_mut().expect("checked non-empty");
            if group.last().map(|c| c.start_pos) > Some(start_pos) {
                return Err(XcfError::ShardsOutOfOrder);
            }
            group.push(chunk);
        } else {
            groups.push(vec![chunk]);
        }
    }

    Ok(ShardSet { pedigree, groups })
}

/// Single-chunk cursor: a one-file reader with an explicit `has` flag so
/// the merge loop can peek the current site before consuming it.
struct ShardCursor {
    reader: XcfReader,
    payload: Vec<u8>,
    has: bool,
}

impl ShardCursor {
    fn open(path: &str, threads: usize) -> Result<Self> {
        let mut reader = XcfReader::open(None, threads);
        let idx = reader.add_file(path)?;
        if reader.file_kind(idx) != FileKind::Binary {
            return Err(crate::xcf_error!("[{path}] is not a XCF file"));
        }
        let mut cursor = Self {
            reader,
            payload: Vec::new(),
            has: false,
        };
        cursor.advance()?;
        Ok(cursor)
    }

    fn advance(&mut self) -> Result<()> {
        self.has = self.reader.next()?;
        Ok(())
    }

    fn pos(&self) -> u32 {
        self.reader.site().pos
    }
}

/// Emits the cursor's current record, flipping haplotype labels of swapped
/// samples on the way out.
fn emit(
    writer: &mut XcfWriter,
    cursor: &mut ShardCursor,
    swap: &[bool],
    any_swap: bool,
) -> Result<()> {
    let rec_type = cursor.reader.record_type(0);
    match rec_type {
        RecordType::BcfGenotype | RecordType::Void => {
            return Err(crate::xcf_error!(
                "Unsupported record type [{rec_type}] at {}:{}",
                cursor.reader.site().chrom,
                cursor.reader.site().pos
            ));
        }
        _ => {}
    }
    let mut payload = std::mem::take(&mut cursor.payload);
    cursor.reader.read_payload(0, &mut payload)?;
    if any_swap {
        apply_swap(rec_type, &mut payload, swap);
    }
    let site = cursor.reader.site();
    writer.stage_site(
        &site.chrom,
        site.pos,
        &site.rsid,
        &site.ref_allele,
        &site.alt_allele,
        cursor.reader.ac(0),
        cursor.reader.an(0),
    )?;
    writer.write_record(rec_type, &payload)?;
    cursor.payload = payload;
    Ok(())
}

/// Per-sample haplotype label flip on a raw record payload.
fn apply_swap(rec_type: RecordType, payload: &mut [u8], swap: &[bool]) {
    match rec_type {
        RecordType::BinaryHaplotype => {
            for (sample, _) in swap.iter().enumerate().filter(|(_, &s)| s) {
                let (h0, h1) = (2 * sample, 2 * sample + 1);
                let b0 = payload[h0 / 8] >> (7 - h0 % 8) & 1;
                let b1 = payload[h1 / 8] >> (7 - h1 % 8) & 1;
                if b0 != b1 {
                    payload[h0 / 8] ^= 1 << (7 - h0 % 8);
                    payload[h1 / 8] ^= 1 << (7 - h1 % 8);
                }
            }
        }
        RecordType::SparseHaplotype => {
            let mut indices: Vec<u32> = payload
                .chunks_exact(4)
                .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            for hap in indices.iter_mut() {
                if swap[(*hap / 2) as usize] {
                    *hap ^= 1;
                }
            }
            indices.sort_unstable();
            for (slot, hap) in payload.chunks_exact_mut(4).zip(indices) {
                slot.copy_from_slice(&hap.to_le_bytes());
            }
        }
        RecordType::SparseGenotype | RecordType::SparsePhaseProbs => {
            // Only the leading genotype entries carry phase; probabilities
            // describe the genotype, not its orientation.
            let n_entries = match rec_type {
                RecordType::SparsePhaseProbs => payload.len() / 8,
                _ => payload.len() / 4,
            };
            for slot in payload[..4 * n_entries].chunks_exact_mut(4) {
                let mut sg =
                    SparseGenotype::unpack(u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]));
                if swap[sg.idx as usize] && sg.pha && sg.het {
                    std::mem::swap(&mut sg.al0, &mut sg.al1);
                    slot.copy_from_slice(&sg.pack().to_le_bytes());
                }
            }
        }
        // Unphased dense genotypes carry no haplotype labels.
        _ => {}
    }
}

/// Scans the overlap of a chunk pair and decides, per sample, whether the
/// right chunk's haplotype labels must be flipped to match the left chunk's
/// orientation (which already includes the accumulated swap).
fn scan_overlap(
    left: &str,
    right: &str,
    chrom: &str,
    overlap_start: u32,
    swap_cur: &[bool],
    n_samples: usize,
    threads: usize,
) -> Result<(Vec<bool>, usize)> {
    let region = Region {
        chrom: chrom.to_string(),
        start: Some(u64::from(overlap_start)),
        end: None,
    };
    let mut reader = XcfReader::open(Some(region), threads);
    reader.add_file(left)?;
    reader.add_file(right)?;

    let mut gv_left = GenotypeVector::new(n_samples);
    let mut gv_right = GenotypeVector::new(n_samples);
    let mut payload = Vec::new();
    let mut n_match = vec![0u32; n_samples];
    let mut n_mism = vec![0u32; n_samples];
    let mut n_shared = 0usize;
    let mut n_total = 0usize;
    let mut last_pos = overlap_start;

    while reader.next()? {
        if !reader.has_record(0) && reader.region_done(0) {
            break;
        }
        n_total += 1;
        if !(reader.has_record(0) && reader.has_record(1)) {
            continue;
        }
        for (file, gv) in [(0, &mut gv_left), (1, &mut gv_right)] {
            let rec_type = reader.record_type(file);
            let af = reader.af(file);
            reader.read_payload(file, &mut payload)?;
            codec::decode_into(rec_type, &payload, af, gv)?;
        }
        last_pos = reader.site().pos;
        n_shared += 1;

        for s in 0..n_samples {
            let a = gv_left.get(s);
            let b = gv_right.get(s);
            if a.missing || b.missing || !a.is_het() || !b.is_het() || !a.phased || !b.phased {
                continue;
            }
            let left_hap0 = a.a0 != swap_cur[s];
            if left_hap0 == b.a0 {
                n_match[s] += 1;
            } else {
                n_mism[s] += 1;
            }
        }
    }

    if n_shared == 0 {
        return Err(crate::xcf_error!(
            "Overlap is empty between [{left}] and [{right}]"
        ));
    }

    let mut swap_next = vec![false; n_samples];
    let mut n_swapped = 0usize;
    let mut informative_sum = 0u64;
    let mut phaseq_sum = 0f64;
    for s in 0..n_samples {
        swap_next[s] = n_match[s] < n_mism[s];
        n_swapped += usize::from(swap_next[s]);
        informative_sum += u64::from(n_match[s] + n_mism[s]);
        // Entropy-inspired quality; the factor 0.7 shifts and scales to (0,1).
        let q = if n_match[s] > 0 && n_mism[s] > 0 {
            let f = f64::from(n_match[s]) / f64::from(n_match[s] + n_mism[s]);
            99.0 * (0.7 + f * f.ln() + (1.0 - f) * (1.0 - f).ln()) / 0.7
        } else {
            99.0
        };
        phaseq_sum += q;
    }
    log::info!(
        "Buf [{chrom}:{overlap_start}-{last_pos}] [L_isec={n_shared} / L_tot={n_total}] \
         [Avg #hets={:.2}] [Switch rate={:.4}] [Avg phaseQ={:.2}]",
        informative_sum as f64 / n_samples as f64,
        n_swapped as f64 / n_samples as f64,
        phaseq_sum / n_samples as f64,
    );
    Ok((swap_next, n_shared))
}

/// Ligates one per-chromosome run of chunks into the writer; returns the
/// number of emitted sites.
fn ligate_group(
    writer: &mut XcfWriter,
    chunks: &[Chunk],
    n_samples: usize,
    threads: usize,
) -> Result<u64> {
    let mut cur = ShardCursor::open(&chunks[0].path, threads)?;
    let mut swap_cur = vec![false; n_samples];
    let mut any_swap_cur = false;
    let mut n_variants = 0u64;

    for j in 1..chunks.len() {
        let next_start = chunks[j].start_pos;
        log::info!(
            "Cnk {} [{}:{}-]",
            j - 1,
            chunks[j - 1].chrom,
            chunks[j - 1].start_pos
        );

        // Left chunk alone, before the overlap begins.
        while cur.has && cur.pos() < next_start {
            emit(writer, &mut cur, &swap_cur, any_swap_cur)?;
            cur.advance()?;
            n_variants += 1;
        }

        let (swap_next, n_shared) = scan_overlap(
            &chunks[j - 1].path,
            &chunks[j].path,
            &chunks[j].chrom,
            next_start,
            &swap_cur,
            n_samples,
            threads,
        )?;
        let any_swap_next = swap_next.iter().any(|&s| s);
        let mut nxt = ShardCursor::open(&chunks[j].path, threads)?;
        let half = n_shared / 2;
        // The A/B handoff is decided by how many *shared* sites have been
        // emitted; sites present in only one chunk pass through without
        // moving the split point.
        let mut n_isec = 0usize;

        // Overlap: the first half (by shared-site count) comes from the
        // left chunk, the rest from the right one with its swap applied.
        while cur.has {
            let min_pos = if nxt.has {
                cur.pos().min(nxt.pos())
            } else {
                cur.pos()
            };
            if let Some(third) = chunks.get(j + 1) {
                if third.start_pos <= min_pos {
                    return Err(XcfError::TooManyOverlappingShards { pos: min_pos });
                }
            }
            if nxt.has && nxt.pos() == cur.pos() {
                let (cur_site, nxt_site) = (cur.reader.site(), nxt.reader.site());
                if cur_site.ref_allele != nxt_site.ref_allele
                    || cur_site.alt_allele != nxt_site.alt_allele
                {
                    return Err(XcfError::IncompatibleShard {
                        chrom: cur_site.chrom.clone(),
                        pos: cur_site.pos,
                    });
                }
                if n_isec >= half {
                    emit(writer, &mut nxt, &swap_next, any_swap_next)?;
                } else {
                    emit(writer, &mut cur, &swap_cur, any_swap_cur)?;
                }
                cur.advance()?;
                nxt.advance()?;
                n_isec += 1;
            } else if nxt.has && nxt.pos() < cur.pos() {
                emit(writer, &mut nxt, &swap_next, any_swap_next)?;
                nxt.advance()?;
            } else {
                emit(writer, &mut cur, &swap_cur, any_swap_cur)?;
                cur.advance()?;
            }
            n_variants += 1;
        }

        // Handoff: the right chunk becomes the left of the next pair.
        cur = nxt;
        swap_cur = swap_next;
        any_swap_cur = any_swap_next;
    }

    while cur.has {
        emit(writer, &mut cur, &swap_cur, any_swap_cur)?;
        cur.advance()?;
        n_variants += 1;
    }
    log::info!(
        "Cnk {} [{}] done [L={n_variants}]",
        chunks.len() - 1,
        chunks[0].chrom
    );
    Ok(n_variants)
}
