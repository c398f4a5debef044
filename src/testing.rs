// testing.rs - Synthetic case-parent triads for unit tests

use crate::data::{DenseGenotypeMatrix, ExposureMatrix, GenotypeStore, SnpMetadata};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SimulationParams {
    pub n_families: usize,
    pub n_snps: usize,
    pub maf: f64,
    /// Children carrying at least one minor allele at every causal SNP get the relative risk
    pub causal: Vec<usize>,
    pub baseline_risk: f64,
    pub relative_risk: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            n_families: 1000,
            n_snps: 10,
            maf: 0.4,
            causal: vec![2, 5, 8],
            baseline_risk: 0.05,
            relative_risk: 8.0,
        }
    }
}

fn parent_genotype(rng: &mut StdRng, maf: f64) -> u8 {
    (rng.gen_bool(maf) as u8) + (rng.gen_bool(maf) as u8)
}

fn transmit(rng: &mut StdRng, parent: u8) -> u8 {
    match parent {
        0 => 0,
        2 => 1,
        _ => rng.gen_bool(0.5) as u8,
    }
}

/// One affected child per family by rejection sampling. `risk_active` says
/// whether the causal effect applies to this family.
fn sample_family(
    rng: &mut StdRng,
    params: &SimulationParams,
    risk_active: bool,
) -> (Vec<u8>, Vec<u8>) {
    loop {
        let mut child = Vec::with_capacity(params.n_snps);
        let mut complement = Vec::with_capacity(params.n_snps);
        for _ in 0..params.n_snps {
            let mother = parent_genotype(rng, params.maf);
            let father = parent_genotype(rng, params.maf);
            let c = transmit(rng, mother) + transmit(rng, father);
            child.push(c);
            complement.push(mother + father - c);
        }
        let carrier = params.causal.iter().all(|&j| child[j] >= 1);
        let risk = if carrier && risk_active {
            (params.baseline_risk * params.relative_risk).min(1.0)
        } else {
            params.baseline_risk
        };
        if rng.gen_bool(risk) {
            return (child, complement);
        }
    }
}

pub fn simulate_triads(params: &SimulationParams, seed: u64) -> GenotypeStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut case = Vec::with_capacity(params.n_families * params.n_snps);
    let mut comp = Vec::with_capacity(params.n_families * params.n_snps);
    for _ in 0..params.n_families {
        let (c, p) = sample_family(&mut rng, params, true);
        case.extend(c);
        comp.extend(p);
    }
    GenotypeStore::new(
        DenseGenotypeMatrix::from_raw(params.n_families, params.n_snps, case).unwrap(),
        DenseGenotypeMatrix::from_raw(params.n_families, params.n_snps, comp).unwrap(),
        SnpMetadata::independent(params.n_snps),
    )
    .unwrap()
}

/// Binary exposure, half the families exposed; the causal effect only acts
/// in exposed families.
pub fn simulate_exposed_triads(
    params: &SimulationParams,
    seed: u64,
) -> (GenotypeStore, ExposureMatrix) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut case = Vec::with_capacity(params.n_families * params.n_snps);
    let mut comp = Vec::with_capacity(params.n_families * params.n_snps);
    let mut exposure_rows = Vec::with_capacity(params.n_families);
    for _ in 0..params.n_families {
        let exposed = rng.gen_bool(0.5);
        let (c, p) = sample_family(&mut rng, params, exposed);
        case.extend(c);
        comp.extend(p);
        exposure_rows.push(vec![exposed as u8]);
    }
    let store = GenotypeStore::new(
        DenseGenotypeMatrix::from_raw(params.n_families, params.n_snps, case).unwrap(),
        DenseGenotypeMatrix::from_raw(params.n_families, params.n_snps, comp).unwrap(),
        SnpMetadata::independent(params.n_snps),
    )
    .unwrap();
    (store, ExposureMatrix::from_rows(&exposure_rows).unwrap())
}
