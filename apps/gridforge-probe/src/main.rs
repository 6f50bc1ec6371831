//! GridForge probe
//!
//! Sets up a world, registers partitions from a saved configuration set,
//! toggles a blocker and runs line traces, logging what happens along the way.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p gridforge-probe -- [OPTIONS]
//! ```
//!
//! ## Options
//!
//! - `--config <FILE>`: Saved configuration set to load (default: built-in demo)
//! - `--cell-size <N>`: Cell edge length (default: 1)
//! - `--hash-size <N>`: Spatial hash bucket size (default: 50)
//! - `--write-demo <FILE>`: Write the demo configuration set and exit
//! - `-h, --help`: Print help message
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use gridforge_core::constants::{DEFAULT_SCAN_CELL_SIZE, DEFAULT_SPATIAL_HASH_CELL_SIZE};
use gridforge_grid::{
    line_of_sight, trace_line, trace_lines_par, Blocker, BoundingArea, ConfigurationSet, Fixed64,
    GridConfiguration, GridWorld, Vector3d, WorldConfig,
};
use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct ProbeArgs {
    config: Option<PathBuf>,
    cell_size: f64,
    hash_size: i32,
    write_demo: Option<PathBuf>,
}

impl Default for ProbeArgs {
    fn default() -> Self {
        Self {
            config: None,
            cell_size: 1.0,
            hash_size: DEFAULT_SPATIAL_HASH_CELL_SIZE,
            write_demo: None,
        }
    }
}

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }
    let args = parse_args()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Some(path) = &args.write_demo {
        demo_set()
            .write_to(path)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote demo configuration set to {}", path.display());
        return Ok(());
    }

    run(&args)
}

fn parse_args() -> anyhow::Result<ProbeArgs> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ProbeArgs::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--config", Some(v)) => parsed.config = Some(PathBuf::from(v)),
            ("--write-demo", Some(v)) => parsed.write_demo = Some(PathBuf::from(v)),
            ("--cell-size", Some(v)) => {
                parsed.cell_size = v.parse().with_context(|| format!("invalid cell size {v:?}"))?;
            }
            ("--hash-size", Some(v)) => {
                parsed.hash_size = v.parse().with_context(|| format!("invalid hash size {v:?}"))?;
            }
            (flag @ ("--config" | "--write-demo" | "--cell-size" | "--hash-size"), None) => {
                bail!("{flag} expects a value");
            }
            (other, _) => bail!("unknown argument {other:?}, see --help"),
        }
        i += 2;
    }

    Ok(parsed)
}

fn print_help() {
    eprintln!(
        "GridForge probe

USAGE:
    cargo run -p gridforge-probe -- [OPTIONS]

OPTIONS:
    --config <FILE>       Saved configuration set to load (default: built-in demo)
    --cell-size <N>       Cell edge length (default: 1)
    --hash-size <N>       Spatial hash bucket size (default: 50)
    --write-demo <FILE>   Write the demo configuration set and exit
    -h, --help            Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG              Set log level (e.g., info, debug, trace)"
    );
}

/// Two adjacent floors and one record with inverted bounds.
fn demo_set() -> ConfigurationSet {
    let mut set = ConfigurationSet::new();
    set.save(Vector3d::ZERO, Vector3d::from_ints(31, 3, 31));
    set.save(Vector3d::from_ints(32, 0, 0), Vector3d::from_ints(63, 3, 31));
    set.push(GridConfiguration::new(
        Vector3d::from_ints(0, 10, 0),
        Vector3d::from_ints(8, 2, 8),
        DEFAULT_SCAN_CELL_SIZE,
    ));
    set
}

fn run(args: &ProbeArgs) -> anyhow::Result<()> {
    let mut world = GridWorld::new();
    world.setup(WorldConfig {
        cell_size: Fixed64::from_f64(args.cell_size),
        spatial_hash_cell_size: args.hash_size,
    })?;

    let set = match &args.config {
        Some(path) => ConfigurationSet::read_from(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => demo_set(),
    };
    let results = set.apply(&mut world);
    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(
        "Registered {} of {} partitions ({} rejected)",
        results.len() - failed,
        results.len(),
        failed
    );
    if world.partition_count() == 0 {
        warn!("No partitions registered, nothing to probe");
        world.reset();
        return Ok(());
    }

    // Hosts that read from other threads own the locking.
    let world = Arc::new(RwLock::new(world));

    let extent = world
        .read()
        .partitions()
        .map(|p| p.bounds())
        .reduce(|a, b| a.union(&b))
        .context("no partition bounds")?;
    let center = extent.center();
    let mut blocker = Blocker::bounds(BoundingArea::from_corners(
        center - Vector3d::from_ints(2, 0, 2),
        center + Vector3d::from_ints(2, 0, 2),
    ));
    let covered = {
        let mut guard = world.write();
        blocker.activate(&mut guard)?;
        blocker.cached_cells().map_or(0, <[_]>::len)
    };
    info!("Blocker at {} covers {} cells", center, covered);

    let start = extent.min;
    let end = Vector3d::new(extent.max.x, extent.min.y, extent.max.z);
    {
        let guard = world.read();
        for (i, covered) in trace_line(&guard, start, end).enumerate() {
            info!(
                "Trace group {}: partition {} with {} cells",
                i,
                covered.partition,
                covered.cells.len()
            );
        }
        let through = Vector3d::new(extent.min.x, center.y, center.z);
        let across = Vector3d::new(extent.max.x, center.y, center.z);
        info!(
            "Line of sight through blocker: {}",
            line_of_sight(&guard, through, across)
        );
    }

    let segments: Vec<_> = (0..64)
        .map(|i| {
            let t = Fixed64::from_int(i) / Fixed64::from_int(63);
            let z = extent.min.z + (extent.max.z - extent.min.z) * t;
            (
                Vector3d::new(extent.min.x, extent.min.y, z),
                Vector3d::new(extent.max.x, extent.min.y, extent.max.z - (z - extent.min.z)),
            )
        })
        .collect();
    let batch = trace_lines_par(&world.read(), &segments);
    let cells: usize = batch
        .par_iter()
        .map(|groups| groups.iter().map(|g| g.cells.len()).sum::<usize>())
        .sum();
    info!("Traced {} segments covering {} cells", segments.len(), cells);

    let visible = (0..segments.len())
        .into_par_iter()
        .filter(|&i| {
            let (a, b) = segments[i];
            line_of_sight(&world.read(), a, b)
        })
        .count();
    info!("{} of {} segments are unobstructed", visible, segments.len());

    {
        let mut guard = world.write();
        blocker.deactivate(&mut guard)?;
        guard.reset();
    }
    info!("World reset");
    Ok(())
}
