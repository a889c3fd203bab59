mod chained;
mod param_gen;
mod random;

use rand::{SeedableRng, rngs::StdRng};

pub use chained::ChainedParamGen;
pub use param_gen::ParamGen;
pub use random::RandParamGen;

/// Creates the random number generator for a seed, or from the OS if there's none.
///
/// # Arguments
/// * `seed` - An optional seed for reproducible runs.
pub fn generate_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
