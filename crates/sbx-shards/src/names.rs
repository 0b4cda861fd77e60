//! Chunk object naming
//!
//! Dispersal depends on chunk names being unpredictable: a name must not be
//! derivable from file metadata or from sibling chunk names. 128 random
//! bits, hex-encoded, with a uniform `.dat` suffix so the store reveals
//! nothing about content or ordering.

use rand::Rng;

/// Random bytes per chunk name (hex-doubled in the final string).
const NAME_BYTES: usize = 16;

/// Generate a fresh chunk object name.
pub fn chunk_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; NAME_BYTES];
    rng.fill_bytes(&mut bytes);
    format!("{}.dat", hex::encode(&bytes))
}

mod hex {
    pub fn encode(data: &[u8]) -> String {
        use std::fmt::Write;
        let mut s = String::with_capacity(data.len() * 2);
        for byte in data {
            let _ = write!(s, "{byte:02x}");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn test_name_shape() {
        let name = chunk_name(&mut StdRng::seed_from_u64(1));
        assert!(name.ends_with(".dat"));
        assert_eq!(name.len(), NAME_BYTES * 2 + 4);
        assert!(name[..NAME_BYTES * 2]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_names_do_not_collide() {
        let mut rng = rand::thread_rng();
        let names: HashSet<String> = (0..10_000).map(|_| chunk_name(&mut rng)).collect();
        assert_eq!(names.len(), 10_000);
    }
}
