// Test data generators

use crate::error::{Result, TestkitError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed shared by every generated array, so runs are reproducible.
pub const ARRAY_SEED: u64 = 0;

/// `length` values drawn from `0..range` with a fixed seed.
///
/// Two calls with the same arguments return the same array.
pub fn random_int_array(length: usize, range: i32) -> Result<Vec<i32>> {
    if range <= 0 {
        return Err(TestkitError::InvalidArgument(format!(
            "range must be positive, got {range}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(ARRAY_SEED);
    Ok((0..length).map(|_| rng.random_range(0..range)).collect())
}

/// Current epoch milliseconds as text.
pub fn random_string() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// `name` with a `-<epoch millis>` suffix.
pub fn random_suffix(name: &str) -> String {
    format!("{}-{}", name, random_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_is_deterministic() {
        let a = random_int_array(64, 1000).unwrap();
        let b = random_int_array(64, 1000).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.iter().all(|v| (0..1000).contains(v)));
    }

    #[test]
    fn test_array_rejects_empty_range() {
        assert!(random_int_array(4, 0).is_err());
        assert!(random_int_array(4, -5).is_err());
        assert_eq!(random_int_array(0, 1).unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn test_suffix_format() {
        let name = random_suffix("bench");
        let (prefix, millis) = name.split_once('-').unwrap();
        assert_eq!(prefix, "bench");
        assert!(millis.parse::<i64>().unwrap() > 0);
    }
}
