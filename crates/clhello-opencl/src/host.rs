//! Host-side input generation and result validation.

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Element count of the default run.
pub const DEFAULT_COUNT: usize = 1024;

/// Seed of the default run's input data.
pub const DEFAULT_SEED: u64 = 1;

/// `count` pseudo-random floats in `[0, 1)`, reproducible for a given seed.
pub fn random_input(count: usize, seed: u64) -> Vec<f32> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(|_| rng.gen::<f32>()).collect()
}

/// How many device results matched the host recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    pub correct: usize,
    pub total: usize,
}

impl Validation {
    pub fn is_exact(&self) -> bool {
        self.correct == self.total
    }

    pub fn mismatches(&self) -> usize {
        self.total - self.correct
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Computed '{}/{}' correct values!", self.correct, self.total)
    }
}

/// Count indices where `output[i]` is exactly `input[i] * input[i]`.
///
/// Missing output elements count as wrong.
pub fn validate_squares(input: &[f32], output: &[f32]) -> Validation {
    let correct = input.iter().zip(output).filter(|&(x, y)| *y == x * x).count();
    Validation { correct, total: input.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn summary_line_format() {
        let v = Validation { correct: 1024, total: 1024 };
        assert_eq!(v.to_string(), "Computed '1024/1024' correct values!");
        assert!(v.is_exact());
    }

    #[test]
    fn wrong_values_are_counted() {
        let input = [1.0, 2.0, 3.0];
        let output = [1.0, 5.0, 9.0];
        let v = validate_squares(&input, &output);
        assert_eq!(v, Validation { correct: 2, total: 3 });
        assert_eq!(v.mismatches(), 1);
    }

    #[test]
    fn short_output_counts_as_wrong() {
        let v = validate_squares(&[2.0, 3.0], &[4.0]);
        assert_eq!(v, Validation { correct: 1, total: 2 });
    }

    #[test]
    fn input_is_reproducible() {
        assert_eq!(random_input(64, 7), random_input(64, 7));
        assert_ne!(random_input(64, 7), random_input(64, 8));
    }

    proptest! {
        #[test]
        fn random_input_is_unit_interval(count in 0usize..2048, seed in any::<u64>()) {
            let data = random_input(count, seed);
            prop_assert_eq!(data.len(), count);
            prop_assert!(data.iter().all(|&x| (0.0..1.0).contains(&x)));
        }

        #[test]
        fn host_squares_always_validate(data in proptest::collection::vec(-1.0e3f32..1.0e3, 0..512)) {
            let squared: Vec<f32> = data.iter().map(|x| x * x).collect();
            let v = validate_squares(&data, &squared);
            prop_assert!(v.is_exact());
            prop_assert_eq!(v.total, data.len());
        }
    }
}
