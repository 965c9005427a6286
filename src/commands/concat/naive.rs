use crate::{
    io::{
        pedigree::Pedigree,
        xcf_reader::{FileKind, XcfReader},
        xcf_writer::{companion_header, HeaderLayout, WriterMode, XcfWriter},
    },
    utils::util::{companion_bin, companion_fam, Result},
};
use rust_htslib::bcf::{self, header::HeaderRecord, Read};

/// Blind concatenation: headers must be dictionary-compatible; records are
/// re-emitted with their SEEK offsets rebased and the side-cars appended
/// byte for byte.
pub fn naive(inputs: &[String], output: &str, out_only_bcf: bool, threads: usize) -> Result<()> {
    check_headers(inputs)?;
    log::info!("Concatenating {} files", inputs.len());

    let first = bcf::Reader::from_path(&inputs[0])
        .map_err(|e| crate::xcf_error!("Failed to open: {}: {e}", inputs[0]))?;
    let pedigree = Pedigree::read(&companion_fam(&inputs[0]))?;
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
        WriterMode::SideCar(&pedigree)
    };
    let mut writer = XcfWriter::new(output, header, threads, mode)?;

    let mut offset = 0u64;
    for input in inputs {
        log::info!("  * Concatenating {input}");
        let mut reader = XcfReader::open(None, threads);
        let idx = reader.add_file(input)?;
        if reader.file_kind(idx) != FileKind::Binary {
            return Err(crate::xcf_error!("[{input}] is not a XCF file"));
        }

        while reader.next()? {
            if !reader.has_record(idx) {
                continue;
            }
            let site = reader.site();
            writer.stage_site(
                &site.chrom,
                site.pos,
                &site.rsid,
                &site.ref_allele,
                &site.alt_allele,
                reader.ac(idx),
                reader.an(idx),
            )?;
            writer.write_seek_record(
                reader.record_type(idx),
                reader.record_seek(idx) + offset,
                reader.record_size(idx),
            )?;
        }

        offset = writer.append_side_car_from(&companion_bin(input))?;
    }
    writer.close()?;
    log::info!("Writing completed.");
    Ok(())
}

/// Checks that every input shares the first file's header dictionary
/// (FILTER/INFO/FORMAT/contig IDs in identical order) and its sample list.
fn check_headers(inputs: &[String]) -> Result<()> {
    log::info!("Checking the headers of {} files", inputs.len());
    let first = bcf::Reader::from_path(&inputs[0])
        .map_err(|e| crate::xcf_error!("Failed to open: {}: {e}", inputs[0]))?;
    let expected_dict = header_dictionary(first.header());
    let expected_samples = Pedigree::read(&companion_fam(&inputs[0]))?;
    drop(first);

    for input in &inputs[1..] {
        let reader = bcf::Reader::from_path(input)
            .map_err(|e| crate::xcf_error!("Failed to open: {input}: {e}"))?;
        let samples = Pedigree::read(&companion_fam(input))?;
        if expected_samples.names != samples.names {
            return Err(crate::xcf_error!(
                "Cannot concatenate, different samples in {} vs {input}",
                inputs[0]
            ));
        }
        if header_dictionary(reader.header()) != expected_dict {
            return Err(crate::xcf_error!(
                "Cannot use --naive, incompatible header dictionaries in {} vs {input}",
                inputs[0]
            ));
        }
    }
    log::info!("Done, the headers are compatible.");
    Ok(())
}

fn header_dictionary(header: &bcf::header::HeaderView) -> Vec<(String, String)> {
    let mut dict = Vec::new();
    for record in header.header_records() {
        let (kind, values) = match &record {
            HeaderRecord::Filter { values, .. } => ("FILTER", values),
            HeaderRecord::Info { values, .. } => ("INFO", values),
            HeaderRecord::Format { values, .. } => ("FORMAT", values),
            HeaderRecord::Contig { values, .. } => ("contig", values),
            _ => continue,
        };
        if let Some(id) = values.get("ID") {
            dict.push((kind.to_string(), id.clone()));
        }
    }
    dict
}
