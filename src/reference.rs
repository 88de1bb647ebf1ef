use crate::permutation::Permutation;

/// Every chase starts at the first element.
pub const CHASE_START: u32 = 0;

/// Follows `table` from `start` for `steps` dereferences and returns where it ends.
///
/// Returns `None` if the walk reaches an address outside `table`.
pub fn chase_steps(table: &[u32], start: u32, steps: usize) -> Option<u32> {
    if start as usize >= table.len() {
        return None;
    }
    let mut current = start;
    for _ in 0..steps {
        current = *table.get(current as usize)?;
    }
    Some(current)
}

/// The address the compute engine must report after walking `permutation` once per element,
/// starting at [`CHASE_START`].
pub fn reference_chase(permutation: &Permutation) -> u32 {
    let table = permutation.as_slice();
    let mut current = CHASE_START;
    for _ in 0..table.len() {
        current = table[current as usize];
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{permutation::Pattern, sampler::UniformSampler};

    #[test]
    fn hand_built() {
        // 0 -> 2 -> 1 -> 0 and 3 -> 3
        let p = Permutation::try_from(vec![2u32, 0, 1, 3]).unwrap();
        assert_eq!(chase_steps(p.as_slice(), 0, 1), Some(2));
        assert_eq!(chase_steps(p.as_slice(), 0, 2), Some(1));
        assert_eq!(chase_steps(p.as_slice(), 3, 4), Some(3));
        assert_eq!(reference_chase(&p), 2);
    }

    #[test]
    fn single_element() {
        let p = Permutation::try_from(vec![0u32]).unwrap();
        assert_eq!(reference_chase(&p), 0);
    }

    #[test]
    fn zero_steps_stays_put() {
        assert_eq!(chase_steps(&[1, 0], 1, 0), Some(1));
    }

    #[test]
    fn out_of_range_is_none() {
        assert_eq!(chase_steps(&[1, 0], 2, 0), None);
        assert_eq!(chase_steps(&[1, 0], 7, 3), None);
        assert_eq!(chase_steps(&[], 0, 0), None);
        // 0 -> 5 leaves the table
        assert_eq!(chase_steps(&[5, 0], 0, 2), None);
    }

    #[test]
    fn idempotent() {
        let mut sampler = UniformSampler::seeded(5);
        for n in [1, 17, 1024, 8192] {
            let p = Permutation::generate(Pattern::Shuffle, n, &mut sampler).unwrap();
            let first = reference_chase(&p);
            for _ in 0..3 {
                assert_eq!(reference_chase(&p), first);
            }
            assert_eq!(chase_steps(p.as_slice(), CHASE_START, n), Some(first));
            assert!((first as usize) < n);
        }
    }

    #[test]
    fn full_cycle_returns_to_start() {
        let mut sampler = UniformSampler::seeded(8);
        let p = Permutation::generate(Pattern::Cycle, 4096, &mut sampler).unwrap();
        assert_eq!(reference_chase(&p), 0);
        assert_ne!(chase_steps(p.as_slice(), 0, 4095), Some(0));
    }
}
