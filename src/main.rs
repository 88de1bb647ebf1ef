//! Runs the pointer-chasing sweep on the first device that accepts the given image.

use clap::{Parser, ValueEnum};
use hbm_chase::{
    BinaryImage, ChaseDriver, DeviceCandidate, Partition, PartitionPlan, Pattern, Reporter,
    SetupError, Sweep, SweepSummary, UniformSampler, counters_from_env,
    device::{KERNEL_NAME, program_first, sim},
    sweep::DEFAULT_SIZES,
};
use std::{path::PathBuf, process::ExitCode};

/// Pointer-chasing latency benchmark for partitioned accelerator memory
#[derive(Parser)]
#[command(name = "hbm-chase")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Compute-engine binary image containing the `pointer_chasing` kernel
    #[arg(value_name = "XCLBIN")]
    image: PathBuf,

    /// Permutation sizes to chase through, one trial each
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_SIZES)]
    sizes: Vec<usize>,

    /// Seed for the permutation generator (fresh entropy if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Permutation shape: shuffle or cycle
    #[arg(long, default_value = "shuffle")]
    pattern: Pattern,

    /// Memory partition holding the permutation table
    #[arg(long, default_value = "0")]
    array_bank: Partition,

    /// Memory partition holding the chase state
    #[arg(long, default_value = "0")]
    state_bank: Partition,

    /// Device runtime to use (opencl by default when built with the `opencl` feature)
    #[arg(long, value_enum, default_value_t)]
    backend: Backend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Simulated 32-partition device
    Sim,
    /// OpenCL accelerator devices (needs the `opencl` feature)
    Opencl,
}

impl Default for Backend {
    fn default() -> Self {
        if cfg!(feature = "opencl") {
            Backend::Opencl
        } else {
            Backend::Sim
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let image = match BinaryImage::load(&cli.image) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let summary = match cli.backend {
        Backend::Sim => bench(&cli, sim::candidates(), &image),
        Backend::Opencl => opencl(&cli, &image),
    };
    match summary {
        Ok(summary) => {
            eprintln!(
                "{} trial(s): {} matched, {} mismatched, {} failed",
                summary.outcomes.len(),
                summary.matched(),
                summary.mismatches(),
                summary.failures()
            );
            if summary.failures() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "opencl")]
fn opencl(cli: &Cli, image: &BinaryImage) -> Result<SweepSummary, SetupError> {
    let candidates =
        hbm_chase::device::opencl::candidates().map_err(SetupError::Enumerate)?;
    bench(cli, candidates, image)
}

#[cfg(not(feature = "opencl"))]
fn opencl(_cli: &Cli, _image: &BinaryImage) -> Result<SweepSummary, SetupError> {
    eprintln!("this binary was built without the `opencl` feature");
    Err(SetupError::NoDevices)
}

fn bench<C: DeviceCandidate>(
    cli: &Cli,
    candidates: Vec<C>,
    image: &BinaryImage,
) -> Result<SweepSummary, SetupError> {
    let device = program_first(candidates, image, KERNEL_NAME)?;
    let plan = PartitionPlan {
        permutation: cli.array_bank,
        state: cli.state_bank,
    };
    let mut driver = ChaseDriver::with_counters(device, plan, counters_from_env());
    let mut sampler = match cli.seed {
        Some(seed) => UniformSampler::seeded(seed),
        None => UniformSampler::from_entropy(),
    };
    let mut reporter = Reporter::from_env(driver.counter_names());
    let sweep = Sweep::new(cli.sizes.clone(), cli.pattern);
    let summary = sweep.run(&mut driver, &mut sampler, &mut reporter);
    drop(reporter);
    Ok(summary)
}

#[test]
fn test_cli_defaults() {
    let cli = Cli::try_parse_from(["hbm-chase", "chase.xclbin"]).unwrap();
    assert_eq!(cli.image, PathBuf::from("chase.xclbin"));
    assert_eq!(cli.sizes, DEFAULT_SIZES);
    assert_eq!(cli.seed, None);
    assert_eq!(cli.pattern, Pattern::Shuffle);
    assert_eq!(cli.array_bank, Partition::FIRST);
    assert_eq!(cli.state_bank, Partition::FIRST);
    let expected = if cfg!(feature = "opencl") {
        Backend::Opencl
    } else {
        Backend::Sim
    };
    assert_eq!(cli.backend, expected);
}

#[test]
fn test_cli_options() {
    let cli = Cli::try_parse_from([
        "hbm-chase",
        "chase.xclbin",
        "--sizes",
        "64,64,32",
        "--seed",
        "7",
        "--pattern",
        "cycle",
        "--array-bank",
        "HBM[3]",
        "--state-bank",
        "31",
        "--backend",
        "sim",
    ])
    .unwrap();
    assert_eq!(cli.sizes, [64, 64, 32]);
    assert_eq!(cli.seed, Some(7));
    assert_eq!(cli.pattern, Pattern::Cycle);
    assert_eq!(cli.array_bank.index(), 3);
    assert_eq!(cli.state_bank.index(), 31);
    assert_eq!(cli.backend, Backend::Sim);
    assert!(Cli::try_parse_from(["hbm-chase", "x", "--state-bank", "32"]).is_err());
}
