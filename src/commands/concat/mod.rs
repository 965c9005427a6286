mod ligate;
mod naive;

use crate::{cli::ConcatArgs, utils::util::Result};
use std::path::PathBuf;

/// Concatenates XCF shards, either blindly (`--naive`, non-overlapping
/// shards) or by ligating overlapping phased chunks (`--ligate`).
pub fn concat(args: ConcatArgs) -> Result<()> {
    let inputs = args.process_input_paths()?;
    if inputs.len() < 2 {
        log::warn!("Only one input file; the output will be a plain copy");
    }
    let inputs: Vec<String> = inputs
        .iter()
        .map(|p: &PathBuf| p.to_string_lossy().into_owned())
        .collect();
    if args.ligate {
        ligate::ligate(&inputs, &args.output, args.out_only_bcf, args.threads)
    } else {
        naive::naive(&inputs, &args.output, args.out_only_bcf, args.threads)
    }
}
