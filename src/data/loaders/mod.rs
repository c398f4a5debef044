// mod.rs - Input file loaders

pub mod tsv;

pub use tsv::{load_exposures, load_genotypes, LoadedGenotypes};
