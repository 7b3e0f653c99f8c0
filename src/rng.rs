use rand::SeedableRng;

#[cfg(test)]
pub use rand_chacha::ChaCha8Rng as Rng;

#[cfg(not(test))]
pub use rand::rngs::StdRng as Rng;

/// Seeded for reproducible runs, entropy otherwise.
pub fn new_rng(seed: Option<u64>) -> Rng {
    match seed {
        Some(seed) => Rng::seed_from_u64(seed),
        None => Rng::from_os_rng(),
    }
}
