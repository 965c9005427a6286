use crate::{
    constants::MOD30BITS,
    core::{codec::RecordType, genotype::GenotypeVector},
    io::pedigree::Pedigree,
    utils::util::{companion_bin, companion_fam, file_date, Result},
};
use rust_htslib::bcf::{self, header::HeaderRecord, record::GenotypeAllele};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Which genotype stream the writer produces.
pub enum WriterMode<'a> {
    /// Genotypes go into the companion BCF as FORMAT/GT (plain BCF output).
    EmbeddedGenotypes,
    /// Genotypes go into the `.bin` side-car; samples into `.fam`.
    SideCar(&'a Pedigree),
    /// Companion BCF only: records carry INFO (possibly SEEK) but no
    /// side-car bytes are written and the `.fam` is left to the caller.
    CompanionOnly,
}

/// Dual-stream XCF writer.
///
/// Owns the companion BCF handle and the monotone byte cursor into the
/// side-car. Each site is a two-step protocol: stage the VCF-level metadata,
/// then emit exactly one record flavour, which appends the payload and
/// freezes its `INFO/SEEK` envelope.
pub struct XcfWriter {
    bcf_path: String,
    writer: bcf::Writer,
    record: bcf::Record,
    staged: bool,
    embedded: bool,
    bin: Option<BufWriter<File>>,
    bin_seek: u64,
    build_index: bool,
    threads: usize,
}

impl XcfWriter {
    /// Creates the output triple. Unknown companion extensions get `.bcf`
    /// appended; `-` writes uncompressed BCF to stdout.
    pub fn new(
        output: &str,
        header: bcf::Header,
        threads: usize,
        mode: WriterMode<'_>,
    ) -> Result<Self> {
        let (path, uncompressed, format) = resolve_output(output);

        let mut writer = if path == "-" {
            bcf::Writer::from_stdout(&header, uncompressed, format)
        } else {
            bcf::Writer::from_path(&path, &header, uncompressed, format)
        }
        .map_err(|e| crate::xcf_error!("Could not open [{path}]: {e}"))?;
        if threads > 1 {
            writer.set_threads(threads)?;
        }

        let (embedded, bin) = match mode {
            WriterMode::EmbeddedGenotypes => (true, None),
            WriterMode::CompanionOnly => (false, None),
            WriterMode::SideCar(pedigree) => {
                let bin_path = companion_bin(&path);
                let bin = File::create(&bin_path).map_err(|e| {
                    crate::xcf_error!(
                        "Cannot open file [{}] for writing: {e}",
                        bin_path.display()
                    )
                })?;
                pedigree.write(&companion_fam(&path))?;
                (false, Some(BufWriter::new(bin)))
            }
        };

        let build_index = path != "-" && !uncompressed;
        let record = writer.empty_record();
        Ok(Self {
            bcf_path: path,
            writer,
            record,
            staged: false,
            embedded,
            bin,
            bin_seek: 0,
            build_index,
            threads,
        })
    }

    pub fn path(&self) -> &str {
        &self.bcf_path
    }

    pub fn header_view(&self) -> &bcf::header::HeaderView {
        self.writer.header()
    }

    pub fn bin_cursor(&self) -> u64 {
        self.bin_seek
    }

    /// Stages chrom/pos/id/alleles plus AC/AN for the next record.
    pub fn stage_site(
        &mut self,
        chrom: &str,
        pos: u32,
        rsid: &str,
        ref_allele: &[u8],
        alt_allele: &[u8],
        ac: u32,
        an: u32,
    ) -> Result<()> {
        self.stage_bare(chrom, pos, rsid, ref_allele, alt_allele)?;
        self.record.push_info_integer(b"AC", &[ac as i32])?;
        self.record.push_info_integer(b"AN", &[an as i32])?;
        Ok(())
    }

    /// Stages site coordinates without AC/AN (difference reports).
    pub fn stage_bare(
        &mut self,
        chrom: &str,
        pos: u32,
        rsid: &str,
        ref_allele: &[u8],
        alt_allele: &[u8],
    ) -> Result<()> {
        self.record = self.writer.empty_record();
        let rid = self.writer.header().name2rid(chrom.as_bytes())?;
        self.record.set_rid(Some(rid));
        self.record.set_pos(i64::from(pos) - 1);
        let id: &[u8] = if rsid.is_empty() { b"." } else { rsid.as_bytes() };
        self.record.set_id(id)?;
        self.record.set_alleles(&[ref_allele, alt_allele])?;
        self.staged = true;
        Ok(())
    }

    /// Extra INFO fields go onto the staged record through this.
    pub fn staged_record_mut(&mut self) -> &mut bcf::Record {
        &mut self.record
    }

    /// Appends `payload` to the side-car and flushes the staged record with
    /// `INFO/SEEK` pointing at it. Without a side-car stream the cursor
    /// still advances so SEEK stays consistent with what would be written.
    pub fn write_record(&mut self, rec_type: RecordType, payload: &[u8]) -> Result<()> {
        debug_assert!(self.staged, "write_record without staged site");
        if self.embedded {
            return Err(crate::xcf_error!(
                "Cannot write a side-car record into a genotype BCF output"
            ));
        }
        if let Some(bin) = &mut self.bin {
            bin.write_all(payload)?;
        }
        let seek = self.bin_seek;
        self.bin_seek += payload.len() as u64;
        self.push_seek(rec_type, seek, payload.len() as u32)?;
        self.flush_staged()
    }

    /// Flushes the staged record with a caller-provided SEEK tuple; the
    /// payload was placed by the caller and the cursor is not touched.
    pub fn write_seek_record(
        &mut self,
        rec_type: RecordType,
        seek: u64,
        nbytes: u32,
    ) -> Result<()> {
        self.push_seek(rec_type, seek, nbytes)?;
        self.flush_staged()
    }

    fn push_seek(&mut self, rec_type: RecordType, seek: u64, nbytes: u32) -> Result<()> {
        let values = [
            rec_type.code(),
            (seek / MOD30BITS) as i32,
            (seek % MOD30BITS) as i32,
            nbytes as i32,
        ];
        self.record.push_info_integer(b"SEEK", &values)?;
        Ok(())
    }

    /// Writes FORMAT/GT (and FORMAT/PP when given) into the staged record
    /// of a genotype BCF output.
    pub fn write_embedded_genotypes(
        &mut self,
        gv: &GenotypeVector,
        probs: Option<&[f32]>,
    ) -> Result<()> {
        debug_assert!(self.staged, "write_embedded_genotypes without staged site");
        if !self.embedded {
            return Err(crate::xcf_error!(
                "Cannot write FORMAT/GT into a side-car output"
            ));
        }
        let mut alleles = Vec::with_capacity(2 * gv.len());
        for gt in gv.iter() {
            if gt.missing {
                alleles.push(GenotypeAllele::UnphasedMissing);
                alleles.push(GenotypeAllele::UnphasedMissing);
            } else if gt.phased {
                alleles.push(GenotypeAllele::Phased(i32::from(gt.a0)));
                alleles.push(GenotypeAllele::Phased(i32::from(gt.a1)));
            } else {
                alleles.push(GenotypeAllele::Unphased(i32::from(gt.a0)));
                alleles.push(GenotypeAllele::Unphased(i32::from(gt.a1)));
            }
        }
        self.record.push_genotypes(&alleles)?;
        if let Some(probs) = probs {
            self.record.push_format_float(b"PP", probs)?;
        }
        self.flush_staged()
    }

    /// Flushes the staged record as-is (INFO-only outputs).
    pub fn write_staged(&mut self) -> Result<()> {
        self.flush_staged()
    }

    fn flush_staged(&mut self) -> Result<()> {
        self.writer
            .write(&self.record)
            .map_err(|e| crate::xcf_error!("Failing to write BCF record: {e}"))?;
        self.staged = false;
        Ok(())
    }

    /// Stages a record taken from a reader, translated into this writer's
    /// header. Existing INFO (including SEEK) is preserved; callers may
    /// push further fields before flushing.
    pub fn stage_taken(&mut self, mut record: bcf::Record) -> Result<()> {
        self.writer.translate(&mut record);
        self.record = record;
        self.staged = true;
        Ok(())
    }

    /// Bulk-appends another side-car onto this one, returning the new
    /// cursor. Without a side-car stream the cursor advances by the source
    /// length.
    pub fn append_side_car_from(&mut self, path: &Path) -> Result<u64> {
        match &mut self.bin {
            Some(bin) => {
                let mut source = File::open(path).map_err(|e| {
                    crate::xcf_error!("Cannot open file [{}] for reading: {e}", path.display())
                })?;
                let copied = std::io::copy(&mut source, bin)?;
                self.bin_seek += copied;
            }
            None => {
                self.bin_seek += std::fs::metadata(path)?.len();
            }
        }
        Ok(self.bin_seek)
    }

    /// Finishes both streams and builds the `.csi` index for compressed
    /// file outputs.
    pub fn close(self) -> Result<()> {
        let Self {
            bcf_path,
            writer,
            bin,
            build_index,
            threads,
            ..
        } = self;
        if let Some(mut bin) = bin {
            bin.flush()?;
            let file = bin.into_inner().map_err(|e| {
                crate::xcf_error!("Failed to flush binary side-car: {e}")
            })?;
            file.sync_all().ok();
        }
        // The BCF handle must be closed before indexing.
        drop(writer);
        if build_index {
            bcf::index::build(
                &bcf_path,
                None,
                threads.max(1) as u32,
                bcf::index::Type::Csi(14),
            )
            .map_err(|e| crate::xcf_error!("Writing .csi index for [{bcf_path}]: {e}"))?;
        }
        Ok(())
    }
}

fn resolve_output(output: &str) -> (String, bool, bcf::Format) {
    if output == "-" {
        return (output.to_string(), true, bcf::Format::Bcf);
    }
    if output.ends_with(".bcf") {
        (output.to_string(), false, bcf::Format::Bcf)
    } else if output.ends_with(".vcf.gz") {
        (output.to_string(), false, bcf::Format::Vcf)
    } else if output.ends_with(".vcf") {
        (output.to_string(), true, bcf::Format::Vcf)
    } else {
        log::warn!(
            "Filename extension of [{output}] not recognized. Adding .bcf extension."
        );
        (format!("{output}.bcf"), false, bcf::Format::Bcf)
    }
}

/// Which FORMAT definitions a new companion header carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// `INFO/SEEK` side-car layout, no FORMAT fields.
    SideCar,
    /// FORMAT/GT + FORMAT/PP for genotype BCF outputs.
    Embedded,
}

const INFO_AC: &[u8] = br#"##INFO=<ID=AC,Number=A,Type=Integer,Description="ALT allele count">"#;
const INFO_AN: &[u8] = br#"##INFO=<ID=AN,Number=1,Type=Integer,Description="Number of alleles">"#;
const INFO_SEEK: &[u8] =
    br#"##INFO=<ID=SEEK,Number=4,Type=Integer,Description="SEEK binary file information">"#;
const FORMAT_GT: &[u8] =
    br#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Phased genotypes">"#;
const FORMAT_PP: &[u8] =
    br#"##FORMAT=<ID=PP,Number=1,Type=Float,Description="Phasing confidence">"#;

/// Builds the companion BCF header, either cloning the input header
/// (keeping its INFO and contig definitions, dropping FORMAT and samples)
/// or starting minimal with only the contigs and the fixed fields.
pub fn companion_header(
    input: &bcf::header::HeaderView,
    source: &str,
    clone: bool,
    layout: HeaderLayout,
    samples: Option<&[String]>,
) -> Result<bcf::Header> {
    let mut header = if clone {
        let mut header = bcf::Header::from_template_subset(input, &[])
            .map_err(|e| crate::xcf_error!("Failed to subset header template: {e}"))?;
        for record in input.header_records() {
            if let HeaderRecord::Format { values, .. } = record {
                if let Some(id) = values.get("ID") {
                    header.remove_format(id.as_bytes());
                }
            }
        }
        header
    } else {
        let mut header = bcf::Header::new();
        for record in input.header_records() {
            if let HeaderRecord::Contig { values, .. } = record {
                let Some(id) = values.get("ID") else { continue };
                let line = match values.get("length") {
                    Some(length) => format!("##contig=<ID={id},length={length}>"),
                    None => format!("##contig=<ID={id}>"),
                };
                header.push_record(line.as_bytes());
            }
        }
        header
    };

    header.push_record(format!("##fileDate={}", file_date()).as_bytes());
    header.push_record(format!("##source={source}").as_bytes());

    if !header_defines_info(input, clone, "AC") {
        header.push_record(INFO_AC);
    }
    if !header_defines_info(input, clone, "AN") {
        header.push_record(INFO_AN);
    }
    match layout {
        HeaderLayout::SideCar => {
            if !header_defines_info(input, clone, "SEEK") {
                header.push_record(INFO_SEEK);
            }
        }
        HeaderLayout::Embedded => {
            header.push_record(FORMAT_GT);
            header.push_record(FORMAT_PP);
            if let Some(samples) = samples {
                for sample in samples {
                    header.push_sample(sample.as_bytes());
                }
            }
        }
    }
    Ok(header)
}

fn header_defines_info(input: &bcf::header::HeaderView, cloned: bool, id: &str) -> bool {
    cloned
        && input.header_records().iter().any(|record| {
            matches!(record, HeaderRecord::Info { values, .. }
                if values.get("ID").map(String::as_str) == Some(id))
        })
}
