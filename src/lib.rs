pub mod cli;
pub mod commands;
pub mod error;

pub mod core {
    pub mod codec;
    pub mod genotype;
    pub mod containers {
        pub mod bitvector;
        pub mod sparse;
    }
}

pub mod io {
    pub mod pedigree;
    pub mod xcf_reader;
    pub mod xcf_writer;
}

pub mod utils {
    pub mod util;
}

pub mod constants;

pub use constants::*;
