// mod.rs - Data structures module

pub mod exposure;
pub mod genotype;
pub mod loaders;

// Re-export main types for convenience
pub use exposure::ExposureMatrix;
pub use genotype::{
    DenseGenotypeMatrix, GenotypeMatrix, GenotypeStore, SnpMetadata, SnpRole, MISSING_GENOTYPE,
};
