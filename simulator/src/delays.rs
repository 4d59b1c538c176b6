use rand_distr::{Distribution, Exp, Gamma};

use plasma_common::{
    config::{DELAY_GAMMA_ALPHA, DELAY_GAMMA_BETA},
    SimTime,
};
use plasma_kernel::ReversibleRng;

/// Network propagation delay in ms, gamma distributed.
pub fn gamma_delay(rng: &mut ReversibleRng) -> SimTime {
    // constant shape and scale, the construction cannot fail
    let gamma = Gamma::new(DELAY_GAMMA_ALPHA, DELAY_GAMMA_BETA).unwrap();
    gamma.sample(rng)
}

/// Exponential delay with the given mean in ms.
pub fn exponential_delay(rng: &mut ReversibleRng, mean_ms: f64) -> SimTime {
    let exp = Exp::new(1.0 / mean_ms).unwrap();
    exp.sample(rng)
}
