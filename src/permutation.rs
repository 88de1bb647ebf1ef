use crate::sampler::UniformSampler;
use rand::RngCore;
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermutationError {
    #[error("a permutation needs at least one element")]
    Empty,
    #[error("{0} elements do not fit a 32-bit element count")]
    TooLarge(usize),
    #[error("not a permutation of 0..{len}: value {value} at index {index}")]
    NotBijection { len: usize, index: usize, value: u32 },
    #[error("start address {start} outside a permutation of {len} elements")]
    StartOutOfRange { start: u32, len: usize },
}

/// The layout of the chase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pattern {
    /// A uniformly random permutation (Fisher–Yates).
    #[default]
    Shuffle,
    /// A random permutation consisting of a single cycle through every element.
    Cycle,
}

impl Pattern {
    pub fn name(self) -> &'static str {
        match self {
            Pattern::Shuffle => "shuffle",
            Pattern::Cycle => "cycle",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shuffle" => Ok(Pattern::Shuffle),
            "cycle" => Ok(Pattern::Cycle),
            _ => Err(format!("unknown pattern {s:?}, expected shuffle or cycle")),
        }
    }
}

/// A bijection on `0..len`, used as the table the chase walks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    table: Vec<u32>,
}

fn check_len(n: usize) -> Result<u32, PermutationError> {
    if n == 0 {
        return Err(PermutationError::Empty);
    }
    u32::try_from(n).map_err(|_| PermutationError::TooLarge(n))
}

impl Permutation {
    pub fn generate<R: RngCore>(
        pattern: Pattern,
        n: usize,
        sampler: &mut UniformSampler<R>,
    ) -> Result<Self, PermutationError> {
        match pattern {
            Pattern::Shuffle => Self::shuffled(n, sampler),
            Pattern::Cycle => Self::single_cycle(n, sampler),
        }
    }

    /// Builds a uniformly random permutation of `0..n`.
    ///
    /// Starts from the identity and, for each position but the last, swaps in an element
    /// drawn uniformly from the not-yet-placed tail.
    pub fn shuffled<R: RngCore>(
        n: usize,
        sampler: &mut UniformSampler<R>,
    ) -> Result<Self, PermutationError> {
        let len = check_len(n)?;
        let mut table: Vec<u32> = (0..len).collect();
        for i in 0..len - 1 {
            let j = i + sampler.draw(len - i);
            if i != j {
                table.swap(i as usize, j as usize);
            }
        }
        Ok(Permutation { table })
    }

    /// Builds a random permutation of `0..n` that is one cycle of length `n`.
    ///
    /// A chase through it from any start visits every element before returning.
    pub fn single_cycle<R: RngCore>(
        n: usize,
        sampler: &mut UniformSampler<R>,
    ) -> Result<Self, PermutationError> {
        let order = Self::shuffled(n, sampler)?.table;
        let mut table = vec![0u32; n];
        for i in 0..n {
            table[order[i] as usize] = order[(i + 1) % n];
        }
        Ok(Permutation { table })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// The element count as passed to the compute engine.
    pub fn count(&self) -> u32 {
        self.table.len() as u32
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.table
    }

    /// Number of distinct addresses a chase starting at `start` passes through.
    pub fn cycle_len(&self, start: u32) -> Result<usize, PermutationError> {
        if start as usize >= self.table.len() {
            return Err(PermutationError::StartOutOfRange {
                start,
                len: self.table.len(),
            });
        }
        let mut len = 1;
        let mut current = self.table[start as usize];
        while current != start {
            current = self.table[current as usize];
            len += 1;
        }
        Ok(len)
    }
}

impl TryFrom<Vec<u32>> for Permutation {
    type Error = PermutationError;

    fn try_from(table: Vec<u32>) -> Result<Self, Self::Error> {
        check_len(table.len())?;
        if let Some((index, value)) = first_violation(&table) {
            return Err(PermutationError::NotBijection {
                len: table.len(),
                index,
                value,
            });
        }
        Ok(Permutation { table })
    }
}

impl From<Permutation> for Vec<u32> {
    fn from(p: Permutation) -> Self {
        p.table
    }
}

fn first_violation(table: &[u32]) -> Option<(usize, u32)> {
    let mut seen = vec![false; table.len()];
    for (index, &value) in table.iter().enumerate() {
        match seen.get_mut(value as usize) {
            Some(s) if !*s => *s = true,
            _ => return Some((index, value)),
        }
    }
    None
}

/// Returns `true` if `table` contains every value in `0..table.len()` exactly once.
pub fn is_bijection(table: &[u32]) -> bool {
    first_violation(table).is_none()
}
