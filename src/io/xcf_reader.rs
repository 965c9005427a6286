use crate::{
    constants::MOD30BITS,
    core::{
        codec::RecordType,
        genotype::{Genotype, GenotypeVector},
    },
    error::XcfError,
    io::pedigree::Pedigree,
    utils::util::{companion_bin, companion_fam, Result},
};
use rust_htslib::bcf::{self, header::HeaderRecord, record::GenotypeAllele, Read};
use std::{
    collections::HashMap,
    fs::File,
    io::{Read as ReadIo, Seek, SeekFrom},
};

/// Genomic region filter, `chrom[:begin[-end]]` with 1-based inclusive
/// bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl Region {
    pub fn parse(spec: &str) -> Result<Self> {
        let (chrom, range) = match spec.split_once(':') {
            Some((chrom, range)) => (chrom, Some(range)),
            None => (spec, None),
        };
        if chrom.is_empty() {
            return Err(crate::xcf_error!("Empty chromosome in region [{spec}]"));
        }
        let (start, end) = match range {
            None => (None, None),
            Some(range) => match range.split_once('-') {
                Some((s, e)) => (Some(s.parse()?), Some(e.parse()?)),
                None => (Some(range.parse()?), None),
            },
        };
        Ok(Self {
            chrom: chrom.to_string(),
            start,
            end,
        })
    }

    fn contains(&self, chrom: &str, pos: u32) -> bool {
        if chrom != self.chrom {
            return false;
        }
        if let Some(start) = self.start {
            if u64::from(pos) < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if u64::from(pos) > end {
                return false;
            }
        }
        true
    }
}

/// What backs the genotype data of an attached file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Companion BCF with `INFO/SEEK` and an external `.bin` side-car.
    Binary,
    /// Plain BCF carrying FORMAT/GT itself.
    Bcf,
    /// Site-only BCF: no samples, no side-car.
    Void,
}

/// Metadata of the site the reader currently exposes.
#[derive(Debug, Clone, Default)]
pub struct Site {
    pub chrom: String,
    pub rank: usize,
    pub pos: u32,
    pub rsid: String,
    pub ref_allele: Vec<u8>,
    pub alt_allele: Vec<u8>,
}

enum BcfSource {
    Indexed(bcf::IndexedReader),
    Plain(bcf::Reader),
}

impl BcfSource {
    fn header(&self) -> &bcf::header::HeaderView {
        match self {
            Self::Indexed(r) => r.header(),
            Self::Plain(r) => r.header(),
        }
    }

    fn empty_record(&self) -> bcf::Record {
        match self {
            Self::Indexed(r) => r.empty_record(),
            Self::Plain(r) => r.empty_record(),
        }
    }

    fn read(&mut self, record: &mut bcf::Record) -> Option<rust_htslib::errors::Result<()>> {
        match self {
            Self::Indexed(r) => r.read(record),
            Self::Plain(r) => r.read(record),
        }
    }

    fn set_threads(&mut self, n: usize) -> rust_htslib::errors::Result<()> {
        match self {
            Self::Indexed(r) => r.set_threads(n),
            Self::Plain(r) => r.set_threads(n),
        }
    }
}

struct XcfFile {
    path: String,
    kind: FileKind,
    source: BcfSource,
    pedigree: Pedigree,
    bin: Option<File>,
    bin_cursor: u64,
    pending: Option<bcf::Record>,
    pending_key: (usize, u32),
    exhausted: bool,
    // Per-site state, refreshed by next()
    has_record: bool,
    current: Option<bcf::Record>,
    rec_type: RecordType,
    seek: u64,
    nbytes: u32,
    ac: u32,
    an: u32,
}

/// Synchronized reader over N XCF/BCF inputs.
///
/// Files advance in lock-step over the union of their biallelic sites,
/// ordered by (contig, position). For each site the reader exposes, per
/// file, whether a record exists, the `INFO/SEEK` envelope, AC/AN, and a
/// payload read that seeks the side-car lazily.
pub struct XcfReader {
    files: Vec<XcfFile>,
    region: Option<Region>,
    threads: usize,
    contig_ranks: HashMap<String, usize>,
    site: Site,
}

impl XcfReader {
    pub fn open(region: Option<Region>, threads: usize) -> Self {
        Self {
            files: Vec::new(),
            region,
            threads,
            contig_ranks: HashMap::new(),
            site: Site::default(),
        }
    }

    pub fn n_files(&self) -> usize {
        self.files.len()
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    /// Attaches one XCF triple (or plain BCF, or `-` for stdin) and returns
    /// its index. Sample lists must agree with already-attached files.
    pub fn add_file(&mut self, path: &str) -> Result<usize> {
        if self.files.iter().any(|f| f.path == "-") || (path == "-" && !self.files.is_empty()) {
            return Err(crate::xcf_error!(
                "Cannot use stdin in combination with other files"
            ));
        }

        let source = self.open_source(path)?;
        let header = source.header();

        let has_seek = header_has_info(header, "SEEK");
        let n_samples = header.sample_count() as usize;

        let (kind, pedigree, bin) = match (has_seek, n_samples) {
            (true, 0) => {
                let bin_path = companion_bin(path);
                let bin = File::open(&bin_path).map_err(|e| {
                    crate::xcf_error!(
                        "Cannot open file [{}] for reading: {e}",
                        bin_path.display()
                    )
                })?;
                let pedigree = Pedigree::read(&companion_fam(path))?;
                (FileKind::Binary, pedigree, Some(bin))
            }
            (false, 1_usize..) => {
                let names = header
                    .samples()
                    .iter()
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .collect();
                (FileKind::Bcf, Pedigree::from_names(names), None)
            }
            (false, 0) => (FileKind::Void, Pedigree::default(), None),
            (true, _) => {
                return Err(crate::xcf_error!(
                    "Binary file found for a non-empty BCF file [{path}]"
                ));
            }
        };

        if let Some(other) = self
            .files
            .iter()
            .find(|f| !f.pedigree.is_empty() && !pedigree.is_empty())
        {
            if other.pedigree.names != pedigree.names {
                return Err(XcfError::Incompatible {
                    left: other.path.clone(),
                    right: path.to_string(),
                });
            }
        }

        // Register contigs in encounter order so pending records from
        // different files compare consistently.
        for record in header.header_records() {
            if let HeaderRecord::Contig { values, .. } = record {
                if let Some(id) = values.get("ID") {
                    let next = self.contig_ranks.len();
                    self.contig_ranks.entry(id.clone()).or_insert(next);
                }
            }
        }

        self.files.push(XcfFile {
            path: path.to_string(),
            kind,
            source,
            pedigree,
            bin,
            bin_cursor: 0,
            pending: None,
            pending_key: (0, 0),
            exhausted: false,
            has_record: false,
            current: None,
            rec_type: RecordType::Void,
            seek: 0,
            nbytes: 0,
            ac: 0,
            an: 0,
        });

        let index = self.files.len() - 1;
        self.pull_next(index)?;
        Ok(index)
    }

    fn open_source(&self, path: &str) -> Result<BcfSource> {
        let mut source = if path == "-" {
            BcfSource::Plain(
                bcf::Reader::from_stdin()
                    .map_err(|e| crate::xcf_error!("Opening stdin: {e}"))?,
            )
        } else if let Some(region) = &self.region {
            let mut reader = bcf::IndexedReader::from_path(path)
                .map_err(|e| crate::xcf_error!("Opening [{path}]: {e}"))?;
            let rid = reader
                .header()
                .name2rid(region.chrom.as_bytes())
                .map_err(|_| {
                    crate::xcf_error!(
                        "Impossible to jump to region [{}] in [{path}]",
                        region.chrom
                    )
                })?;
            let start = region.start.unwrap_or(1).saturating_sub(1);
            reader.fetch(rid, start, region.end).map_err(|e| {
                crate::xcf_error!("Impossible to jump to region in [{path}]: {e}")
            })?;
            BcfSource::Indexed(reader)
        } else {
            BcfSource::Plain(
                bcf::Reader::from_path(path)
                    .map_err(|e| crate::xcf_error!("Opening [{path}]: {e}"))?,
            )
        };
        if self.threads > 1 {
            source.set_threads(self.threads)?;
        }
        Ok(source)
    }

    /// Detaches a file; the reader continues over the remaining ones.
    pub fn remove_file(&mut self, file: usize) {
        self.files.remove(file);
    }

    /// Pulls the next biallelic in-region record of one file into `pending`.
    fn pull_next(&mut self, file: usize) -> Result<()> {
        loop {
            let f = &mut self.files[file];
            let mut record = f.source.empty_record();
            match f.source.read(&mut record) {
                None => {
                    f.pending = None;
                    f.exhausted = true;
                    return Ok(());
                }
                Some(Err(e)) => {
                    return Err(crate::xcf_error!(
                        "Error reading record from [{}]: {e}",
                        f.path
                    ));
                }
                Some(Ok(())) => {}
            }
            if record.allele_count() != 2 {
                log::debug!("Skipping non-biallelic record in [{}]", f.path);
                continue;
            }
            let rid = record
                .rid()
                .ok_or_else(|| crate::xcf_error!("Record without contig in [{}]", f.path))?;
            let chrom =
                String::from_utf8_lossy(f.source.header().rid2name(rid)?).into_owned();
            let pos = (record.pos() + 1) as u32;
            if let Some(region) = &self.region {
                if !region.contains(&chrom, pos) {
                    continue;
                }
            }
            let next = self.contig_ranks.len();
            let rank = *self
                .contig_ranks
                .entry(chrom)
                .or_insert(next);
            let f = &mut self.files[file];
            f.pending = Some(record);
            f.pending_key = (rank, pos);
            return Ok(());
        }
    }

    /// Advances to the next site in the union; returns false when every
    /// file is exhausted. Site metadata comes from the first file holding
    /// the site.
    pub fn next(&mut self) -> Result<bool> {
        for f in &mut self.files {
            f.has_record = false;
            f.current = None;
            f.rec_type = RecordType::Void;
            f.seek = 0;
            f.nbytes = 0;
            f.ac = 0;
            f.an = 0;
        }

        let Some(min_key) = self
            .files
            .iter()
            .filter(|f| f.pending.is_some())
            .map(|f| f.pending_key)
            .min()
        else {
            return Ok(false);
        };

        let mut site_set = false;
        for i in 0..self.files.len() {
            let f = &self.files[i];
            if f.pending.is_none() || f.pending_key != min_key {
                continue;
            }
            let record = f.pending.as_ref().expect("pending checked above");
            let rid = record
                .rid()
                .ok_or_else(|| crate::xcf_error!("Record without contig in [{}]", f.path))?;
            let alleles = record.alleles();
            if !site_set {
                self.site = Site {
                    chrom: String::from_utf8_lossy(f.source.header().rid2name(rid)?).into_owned(),
                    rank: min_key.0,
                    pos: min_key.1,
                    rsid: String::from_utf8_lossy(&record.id()).into_owned(),
                    ref_allele: alleles[0].to_vec(),
                    alt_allele: alleles[1].to_vec(),
                };
                site_set = true;
            } else if alleles[0] != self.site.ref_allele.as_slice()
                || alleles[1] != self.site.alt_allele.as_slice()
            {
                // Same position, different variant: keep it for a later round.
                continue;
            }
            self.extract_record(i)?;
            self.pull_next(i)?;
        }
        Ok(true)
    }

    /// Reads AC/AN and the SEEK envelope of the pending record, then parks
    /// the record as `current` for GT/FORMAT access.
    fn extract_record(&mut self, file: usize) -> Result<()> {
        let f = &mut self.files[file];
        let record = f.pending.take().expect("caller checked pending");

        {
            let ac = record.info(b"AC").integer()?;
            let an = record.info(b"AN").integer()?;
            f.ac = match ac {
                Some(v) if v.len() == 1 => v[0] as u32,
                _ => {
                    return Err(XcfError::MissingIndex {
                        field: "AC".to_string(),
                        path: f.path.clone(),
                    });
                }
            };
            f.an = match an {
                Some(v) if v.len() == 1 => v[0] as u32,
                _ => {
                    return Err(XcfError::MissingIndex {
                        field: "AN".to_string(),
                        path: f.path.clone(),
                    });
                }
            };
            match f.kind {
                FileKind::Binary => {
                    let seek = record.info(b"SEEK").integer()?;
                    let values = match seek {
                        Some(v) if v.len() == 4 => v,
                        _ => {
                            return Err(XcfError::MissingIndex {
                                field: "SEEK".to_string(),
                                path: f.path.clone(),
                            });
                        }
                    };
                    f.rec_type = RecordType::from_code(values[0]).ok_or_else(|| {
                        crate::xcf_error!(
                            "Unknown record type [{}] in [{}]",
                            values[0],
                            f.path
                        )
                    })?;
                    f.seek = values[1] as u64 * MOD30BITS + values[2] as u64;
                    f.nbytes = values[3] as u32;
                }
                FileKind::Bcf => {
                    f.rec_type = RecordType::BcfGenotype;
                }
                FileKind::Void => {
                    f.rec_type = RecordType::Void;
                }
            }
        }

        f.has_record = true;
        f.current = Some(record);
        Ok(())
    }

    pub fn has_record(&self, file: usize) -> bool {
        self.files[file].has_record
    }

    /// True once the file has no further sites in the region.
    pub fn region_done(&self, file: usize) -> bool {
        self.files[file].pending.is_none() && self.files[file].exhausted
    }

    pub fn file_kind(&self, file: usize) -> FileKind {
        self.files[file].kind
    }

    pub fn record_type(&self, file: usize) -> RecordType {
        self.files[file].rec_type
    }

    pub fn record_size(&self, file: usize) -> u32 {
        self.files[file].nbytes
    }

    pub fn record_seek(&self, file: usize) -> u64 {
        self.files[file].seek
    }

    pub fn ac(&self, file: usize) -> u32 {
        self.files[file].ac
    }

    pub fn an(&self, file: usize) -> u32 {
        self.files[file].an
    }

    pub fn af(&self, file: usize) -> f32 {
        self.files[file].ac as f32 / self.files[file].an as f32
    }

    pub fn n_samples(&self, file: usize) -> usize {
        self.files[file].pedigree.len()
    }

    pub fn pedigree(&self, file: usize) -> &Pedigree {
        &self.files[file].pedigree
    }

    pub fn header_view(&self, file: usize) -> &bcf::header::HeaderView {
        self.files[file].source.header()
    }

    /// Materializes the side-car payload of the current record. The side-car
    /// cursor only seeks when the requested offset differs from it.
    pub fn read_payload(&mut self, file: usize, buffer: &mut Vec<u8>) -> Result<usize> {
        let f = &mut self.files[file];
        if !f.has_record {
            return Ok(0);
        }
        let bin = f.bin.as_mut().ok_or_else(|| {
            crate::xcf_error!("File [{}] has no binary side-car to read", f.path)
        })?;
        if f.bin_cursor != f.seek {
            bin.seek(SeekFrom::Start(f.seek))?;
        }
        buffer.resize(f.nbytes as usize, 0);
        bin.read_exact(buffer)?;
        f.bin_cursor = f.seek + u64::from(f.nbytes);
        Ok(buffer.len())
    }

    /// Decodes FORMAT/GT of the current record into a genotype vector
    /// (companion-BCF inputs only).
    pub fn read_genotype_vector(&self, file: usize, gv: &mut GenotypeVector) -> Result<()> {
        let f = &self.files[file];
        let record = f
            .current
            .as_ref()
            .ok_or_else(|| crate::xcf_error!("No record available in [{}]", f.path))?;
        let genotypes = record.genotypes()?;
        gv.resize(f.pedigree.len());
        for i in 0..f.pedigree.len() {
            let gt = genotypes.get(i);
            if gt.len() != 2 {
                return Err(crate::xcf_error!(
                    "Non-diploid genotype for sample {} in [{}]",
                    f.pedigree.names[i],
                    f.path
                ));
            }
            let missing = gt[0].index().is_none() || gt[1].index().is_none();
            let phased = matches!(
                gt[1],
                GenotypeAllele::Phased(_) | GenotypeAllele::PhasedMissing
            );
            gv.set(
                i,
                Genotype {
                    a0: gt[0].index() == Some(1),
                    a1: gt[1].index() == Some(1),
                    missing,
                    phased: phased && !missing,
                },
            );
        }
        Ok(())
    }

    /// Per-sample FORMAT/PP floats of the current record; false when the
    /// record carries none.
    pub fn read_phase_probs(&self, file: usize, probs: &mut Vec<f32>) -> Result<bool> {
        let f = &self.files[file];
        let record = f
            .current
            .as_ref()
            .ok_or_else(|| crate::xcf_error!("No record available in [{}]", f.path))?;
        let values = match record.format(b"PP").float() {
            Ok(values) => values,
            Err(_) => return Ok(false),
        };
        if values.len() != f.pedigree.len() {
            return Ok(false);
        }
        probs.clear();
        for sample in values.iter() {
            probs.push(sample[0]);
        }
        Ok(true)
    }

    /// Hands out ownership of the current companion record, e.g. to
    /// republish it through a writer. GT/PP reads are impossible afterwards.
    pub fn take_record(&mut self, file: usize) -> Option<bcf::Record> {
        self.files[file].current.take()
    }

    pub fn current_rlen(&self, file: usize) -> Option<i64> {
        self.files[file].current.as_ref().map(|r| r.rlen())
    }

    /// Repositions every indexed file at (chrom, pos); side-car cursors are
    /// left alone and reseek lazily on the next payload read.
    pub fn seek(&mut self, chrom: &str, pos: u32) -> Result<()> {
        for i in 0..self.files.len() {
            let f = &mut self.files[i];
            match &mut f.source {
                BcfSource::Indexed(reader) => {
                    let rid = reader.header().name2rid(chrom.as_bytes())?;
                    reader.fetch(rid, u64::from(pos.saturating_sub(1)), None)?;
                    f.pending = None;
                    f.exhausted = false;
                }
                BcfSource::Plain(_) => {
                    return Err(crate::xcf_error!(
                        "Cannot seek in non-indexed input [{}]",
                        f.path
                    ));
                }
            }
            self.pull_next(i)?;
        }
        Ok(())
    }
}

fn header_has_info(header: &bcf::header::HeaderView, id: &str) -> bool {
    header.header_records().iter().any(|record| {
        matches!(record, HeaderRecord::Info { values, .. } if values.get("ID").map(String::as_str) == Some(id))
    })
}
