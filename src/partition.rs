use std::{fmt, str::FromStr};
use thiserror::Error;

/// Number of independently addressable memory partitions (HBM pseudo-channels).
pub const PARTITION_COUNT: usize = 32;

/// Marks a placement word as an explicit memory-topology index rather than a DDR bank flag.
pub const MEM_TOPOLOGY: u32 = 1 << 31;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("partition {0} out of range, expected 0..{PARTITION_COUNT}")]
    OutOfRange(usize),
    #[error("invalid partition {0:?}")]
    Parse(String),
}

/// One memory partition a buffer is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Partition(u8);

impl Partition {
    pub const FIRST: Partition = Partition(0);

    pub fn new(index: usize) -> Result<Self, PartitionError> {
        if index < PARTITION_COUNT {
            Ok(Partition(index as u8))
        } else {
            Err(PartitionError::OutOfRange(index))
        }
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Placement word handed to the runtime when allocating on this partition.
    pub fn topology_flags(self) -> u32 {
        u32::from(self.0) | MEM_TOPOLOGY
    }

    pub fn all() -> impl Iterator<Item = Partition> {
        (0..PARTITION_COUNT as u8).map(Partition)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HBM[{}]", self.0)
    }
}

impl FromStr for Partition {
    type Err = PartitionError;

    /// Accepts `7` as well as `HBM[7]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("HBM[")
            .and_then(|x| x.strip_suffix(']'))
            .unwrap_or(s);
        let index = digits
            .trim()
            .parse()
            .map_err(|_| PartitionError::Parse(s.to_string()))?;
        Partition::new(index)
    }
}

/// Which partition each chase buffer is placed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub permutation: Partition,
    pub state: Partition,
}

impl Default for PartitionPlan {
    fn default() -> Self {
        PartitionPlan {
            permutation: Partition::FIRST,
            state: Partition::FIRST,
        }
    }
}

impl fmt::Display for PartitionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.permutation.index(), self.state.index())
    }
}

#[test]
fn test_partition_range() {
    assert_eq!(Partition::new(0).map(Partition::index), Ok(0));
    assert_eq!(Partition::new(31).map(Partition::index), Ok(31));
    assert_eq!(Partition::new(32), Err(PartitionError::OutOfRange(32)));
    assert_eq!(Partition::all().count(), PARTITION_COUNT);
    assert_eq!(Partition::all().last(), Partition::new(31).ok());
}

#[test]
fn test_partition_flags() {
    assert_eq!(Partition::FIRST.topology_flags(), 0x8000_0000);
    assert_eq!(Partition::new(31).unwrap().topology_flags(), 0x8000_001f);
}

#[test]
fn test_partition_parse() {
    let cases = [
        ("0", Ok(0)),
        ("17", Ok(17)),
        ("HBM[5]", Ok(5)),
        ("32", Err(PartitionError::OutOfRange(32))),
        ("-1", Err(PartitionError::Parse("-1".into()))),
        ("HBM[x]", Err(PartitionError::Parse("HBM[x]".into()))),
    ];
    for (input, expected) in cases {
        assert_eq!(
            input.parse::<Partition>().map(Partition::index),
            expected,
            "{input}"
        );
    }
    assert_eq!(
        Partition::new(12).unwrap().to_string().parse::<Partition>(),
        Partition::new(12)
    );
}
