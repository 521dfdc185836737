//! polysched Command Line Interface
//!
//! Usage:
//!   polysched [OPTIONS] <DOMAINS> [DEPENDENCES]
//!   polysched --help
//!
//! Examples:
//!   polysched domains.isl deps.isl                   # Schedule with defaults
//!   polysched --fuse=nofuse domains.isl deps.isl     # One loop nest per SCC
//!   polysched --diamond --tile-size=64 heat.isl d.isl  # Diamond tiling
//!   polysched --emit=all -vv domains.isl deps.isl    # Everything, with debug logs

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info};
use polysched::frontend::{parse_dependences, parse_domains, print_domains, print_parallel_loops, print_schedule};
use polysched::options::{CutStrategy, FusionPolicy, SchedulerOptions, SolverKind};
use polysched::transform::Schedule;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// polysched - Polyhedral affine scheduler
#[derive(Parser, Debug)]
#[command(name = "polysched")]
#[command(author = "polysched Contributors")]
#[command(version)]
#[command(about = "Computes affine schedules for statements in isl notation", long_about = None)]
struct Cli {
    /// Statement domains (isl union set)
    #[arg(value_name = "DOMAINS")]
    domains: PathBuf,

    /// Flow dependences (isl union map); none when omitted
    #[arg(value_name = "DEPENDENCES")]
    dependences: Option<PathBuf>,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Fusion policy: nofuse, maxfuse, smartfuse, typedfuse, hybridfuse
    #[arg(long, default_value = "smartfuse")]
    fuse: FusionPolicy,

    /// Skip the tiling-legality pass
    #[arg(long)]
    no_tile: bool,

    /// Tile size recorded for tilable rows
    #[arg(long, default_value = "32", value_parser = clap::value_parser!(i64).range(1..))]
    tile_size: i64,

    /// Also record second-level tile sizes
    #[arg(long)]
    l2tile: bool,

    /// First schedule row to tile (0-based)
    #[arg(long, value_name = "ROW")]
    ft: Option<usize>,

    /// Last schedule row to tile (0-based, inclusive)
    #[arg(long, value_name = "ROW")]
    lt: Option<usize>,

    /// Look for diamond (concurrent start-up) tiling
    #[arg(long)]
    diamond: bool,

    /// Diamond tiling against every row of the band
    #[arg(long)]
    full_diamond: bool,

    /// Do not mark parallel rows
    #[arg(long)]
    no_parallel: bool,

    /// Bound on every schedule coefficient
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(i64).range(1..))]
    coeff_bound: i64,

    /// Allow negative iterator coefficients
    #[arg(long)]
    negative_coeffs: bool,

    /// Forbid parameter coefficients in hyperplanes
    #[arg(long)]
    no_param_coeffs: bool,

    /// Keep input (read-after-read) dependences
    #[arg(long)]
    rar: bool,

    /// Reduce dependences to last writers
    #[arg(long)]
    last_writer: bool,

    /// Do not coalesce dependences between the same statements
    #[arg(long)]
    no_coalesce: bool,

    /// Drop the dependence-distance bounding function
    #[arg(long)]
    no_dep_bound: bool,

    /// Keep the original loop order instead of searching hyperplanes
    #[arg(long)]
    identity: bool,

    /// Cut strategy: eager, delayed
    #[arg(long, default_value = "eager")]
    cut: CutStrategy,

    /// Solver backend: exact, lp, glpk, gurobi
    #[arg(long, default_value = "exact")]
    solver: SolverKind,

    /// Maximum number of scheduling rounds
    #[arg(long, default_value = "64")]
    max_rounds: usize,

    /// Wall-clock budget in seconds
    #[arg(long, value_name = "SECONDS")]
    time_budget: Option<f64>,

    /// Solve clusters of a round in parallel
    #[arg(long)]
    parallel_solve: bool,

    /// Print iterators as functions of the schedule
    #[arg(long)]
    remap: bool,

    /// Skip the final legality replay
    #[arg(long)]
    no_verify: bool,

    /// What to emit
    #[arg(long, default_value = "schedule")]
    emit: EmitKind,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmitKind {
    /// Schedules and parallel rows
    Schedule,
    /// Parsed domains
    Domains,
    /// Parsed dependences
    Deps,
    /// Bands and scheduling statistics
    Stats,
    /// All of the above
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("polysched v{}", polysched::VERSION);
    debug!("Input files: {:?} {:?}", cli.domains, cli.dependences);

    let domain_text = fs::read_to_string(&cli.domains)
        .with_context(|| format!("Failed to read domains: {:?}", cli.domains))?;
    let dep_text = match &cli.dependences {
        Some(path) => fs::read_to_string(path).with_context(|| format!("Failed to read dependences: {:?}", path))?,
        None => "{ }".to_string(),
    };

    let program = parse_domains(&domain_text).with_context(|| "Failed to parse domains")?;
    let deps = parse_dependences(&dep_text, &program).with_context(|| "Failed to parse dependences")?;

    let options = build_options(&cli);
    debug!("Scheduler options: {:?}", options);
    options.validate().with_context(|| "Invalid options")?;

    let mut out = String::new();
    if matches!(cli.emit, EmitKind::Domains | EmitKind::All) {
        writeln!(out, "domains: {}", print_domains(&program))?;
    }
    if matches!(cli.emit, EmitKind::Deps | EmitKind::All) {
        for dep in &deps {
            writeln!(out, "dependence: {}", dep.description())?;
        }
    }
    if matches!(cli.emit, EmitKind::Domains | EmitKind::Deps) {
        return write_output(&cli.output, &out);
    }

    info!("Scheduling {} statements, {} dependences...", program.statements.len(), deps.len());
    let schedule = polysched::schedule(&program, &deps, &options).with_context(|| "Scheduling failed")?;
    info!("Scheduling complete in {} rounds", schedule.stats.rounds);

    if matches!(cli.emit, EmitKind::Schedule | EmitKind::All) {
        write_schedule(&mut out, &schedule)?;
    }
    if matches!(cli.emit, EmitKind::Stats | EmitKind::All) {
        write_stats(&mut out, &schedule)?;
    }
    write_output(&cli.output, &out)
}

fn build_options(cli: &Cli) -> SchedulerOptions {
    let mut options = SchedulerOptions::new()
        .fuse(cli.fuse)
        .tile(!cli.no_tile)
        .tile_size(cli.tile_size)
        .diamond_tile(cli.diamond || cli.full_diamond)
        .full_diamond_tile(cli.full_diamond)
        .l2_tile(cli.l2tile)
        .tile_depths(cli.ft, cli.lt)
        .identity(cli.identity)
        .cut(cli.cut)
        .parallel(!cli.no_parallel)
        .coeff_bound(cli.coeff_bound)
        .negative_coeffs(cli.negative_coeffs)
        .param_coeffs(!cli.no_param_coeffs)
        .rar(cli.rar)
        .last_writer(cli.last_writer)
        .coalesce(!cli.no_coalesce)
        .no_dep_bound(cli.no_dep_bound)
        .solver(cli.solver)
        .max_rounds(cli.max_rounds)
        .parallel_solve(cli.parallel_solve)
        .remapping(cli.remap)
        .verify(!cli.no_verify);
    if let Some(secs) = cli.time_budget {
        options = options.time_budget(Duration::from_secs_f64(secs.max(0.0)));
    }
    options
}

fn write_schedule(out: &mut String, schedule: &Schedule) -> Result<()> {
    writeln!(out, "{}", print_schedule(schedule))?;
    writeln!(out, "parallel loops: {}", print_parallel_loops(schedule))?;
    if let Some(remapping) = &schedule.remapping {
        for remap in &remapping.stmts {
            let stmt = schedule.stmt(remap.id).map(|s| s.name.as_str()).unwrap_or("?");
            for (k, (row, div)) in remap.inverse.iter().zip(&remap.divisors).enumerate() {
                writeln!(out, "remap {} iterator {}: {:?} / {}", stmt, k, row, div)?;
            }
        }
    }
    Ok(())
}

fn write_stats(out: &mut String, schedule: &Schedule) -> Result<()> {
    for band in &schedule.bands {
        writeln!(
            out,
            "band rows {:?}: {:?} sizes {:?}{}{}",
            band.rows(),
            band.tiling,
            band.tile_sizes,
            if band.l2_tile_sizes.is_empty() { String::new() } else { format!(" l2 {:?}", band.l2_tile_sizes) },
            band.diamond_factor.map(|k| format!(" diamond k = {}", k)).unwrap_or_default()
        )?;
    }
    for sat in &schedule.satisfaction {
        let level = sat.level.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string());
        writeln!(out, "dependence {} -> {} ({:?}) satisfied at row {}", sat.source, sat.target, sat.kind, level)?;
    }
    writeln!(out, "{:#?}", schedule.stats)?;
    Ok(())
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => fs::write(p, content).with_context(|| format!("Failed to write output: {:?}", p)),
        None => {
            print!("{}", content);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(["polysched"].iter().chain(args).chain(["d.isl"].iter()))
    }

    #[test]
    fn test_defaults_match_library() {
        let options = build_options(&cli(&[]).unwrap());
        assert_eq!(options, SchedulerOptions::default());
    }

    #[test]
    fn test_tiling_and_search_flags() {
        let parsed = cli(&["--identity", "--l2tile", "--ft", "1", "--lt", "2", "--cut", "delayed"]).unwrap();
        let options = build_options(&parsed);
        assert!(options.identity && options.l2_tile);
        assert_eq!((options.first_tile_depth, options.last_tile_depth), (Some(1), Some(2)));
        assert_eq!(options.cut, CutStrategy::Delayed);
    }

    #[test]
    fn test_non_positive_sizes_rejected() {
        for args in [["--tile-size", "0"], ["--tile-size", "-4"], ["--coeff-bound", "0"], ["--coeff-bound", "-1"]] {
            assert!(cli(&args).is_err(), "{:?} accepted", args);
        }
        assert!(build_options(&cli(&["--ft", "3", "--lt", "1"]).unwrap()).validate().is_err());
    }
}
