//! Runtime invariant assertions for guess generation.
//!
//! Debug-mode checks for the properties the generators promise: preterminal
//! emission never increases in probability, and mixed-radix counters stay
//! inside their glossary buckets. Active only under `debug_assertions`; in
//! release builds every function compiles to a no-op.

/// Asserts that emission probabilities never increase.
///
/// `previous` is the probability of the last emitted preterminal (or
/// infinity before the first emission).
///
/// # Panics
///
/// Panics in debug builds if `current > previous`.
#[inline]
pub fn assert_monotonic_emission(previous: f64, current: f64) {
    #[cfg(debug_assertions)]
    {
        debug_assert!(
            current <= previous,
            "Invariant violation: emission probability rose from {previous} to {current}"
        );
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = (previous, current);
    }
}

/// Asserts that every counter digit addresses a real glossary entry.
///
/// # Panics
///
/// Panics in debug builds if any index is out of bounds for its bucket.
#[inline]
pub fn assert_counter_in_bounds(indices: &[usize], bucket_lens: &[usize]) {
    #[cfg(debug_assertions)]
    {
        debug_assert_eq!(
            indices.len(),
            bucket_lens.len(),
            "Invariant violation: {} counter digits for {} slots",
            indices.len(),
            bucket_lens.len()
        );
        for (slot, (&idx, &len)) in indices.iter().zip(bucket_lens).enumerate() {
            debug_assert!(
                idx < len,
                "Invariant violation: slot {slot} index {idx} >= bucket size {len}"
            );
        }
    }
    #[cfg(not(debug_assertions))]
    {
        let _ = (indices, bucket_lens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_non_increasing_probabilities() {
        assert_monotonic_emission(f64::INFINITY, 0.9);
        assert_monotonic_emission(0.9, 0.9);
        assert_monotonic_emission(0.9, 0.1);
    }

    #[test]
    #[should_panic(expected = "Invariant violation")]
    #[cfg(debug_assertions)]
    fn rejects_rising_probability() {
        assert_monotonic_emission(0.1, 0.2);
    }

    #[test]
    fn accepts_in_bounds_counter() {
        assert_counter_in_bounds(&[0, 1], &[1, 2]);
    }

    #[test]
    #[should_panic(expected = "Invariant violation")]
    #[cfg(debug_assertions)]
    fn rejects_out_of_bounds_counter() {
        assert_counter_in_bounds(&[2], &[2]);
    }
}
