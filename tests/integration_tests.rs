//! Integration tests for the scheduling pipeline.

use polysched::prelude::*;
use polysched::frontend::{print_parallel_loops, parse_union};

const PAIR_DOMAINS: &str = "[N] -> { S0[i, j] : 0 <= i, j < N; S1[i, j] : 0 <= i, j < N }";
const PAIR_DEPS: &str = "[N] -> { S0[i, j] -> S1[i + 1, j] }";

const JACOBI_DOMAINS: &str = "[T, N] -> { S0[t, i] : 0 <= t < T and 1 <= i < N - 1 }";
const JACOBI_DEPS: &str = "[T, N] -> { S0[t, i] -> S0[t + 1, i - 1]; S0[t, i] -> S0[t + 1, i]; S0[t, i] -> S0[t + 1, i + 1] }";

fn setup(domains: &str, deps: &str) -> (PolyProgram, Vec<Dependence>) {
    let program = parse_domains(domains).expect("Failed to parse domains");
    let deps = parse_dependences(deps, &program).expect("Failed to parse dependences");
    (program, deps)
}

/// Every point of a statement domain inside `[0, bound)^depth`.
fn points(stmt: &PolyStmt, params: &[i64], bound: i64) -> Vec<Vec<i64>> {
    let mut out = vec![Vec::new()];
    for _ in 0..stmt.depth() {
        out = out
            .into_iter()
            .flat_map(|p| {
                (0..bound).map(move |v| {
                    let mut q = p.clone();
                    q.push(v);
                    q
                })
            })
            .collect();
    }
    out.into_iter().filter(|p| stmt.domain.contains(p, params)).collect()
}

/// Dependent instance pairs with their schedule vectors.
fn dependent_pairs(
    schedule: &Schedule,
    deps: &[Dependence],
    params: &[i64],
    bound: i64,
) -> Vec<(Vec<i64>, Vec<i64>)> {
    let mut pairs = Vec::new();
    for dep in deps {
        let src = schedule.stmt(dep.source).unwrap();
        let tgt = schedule.stmt(dep.target).unwrap();
        for s in points(src, params, bound) {
            for t in points(tgt, params, bound) {
                if dep.relation.contains(&s, &t, params) {
                    pairs.push((
                        src.schedule.apply(&s, params).unwrap(),
                        tgt.schedule.apply(&t, params).unwrap(),
                    ));
                }
            }
        }
    }
    pairs
}

/// Every dependent pair is ordered lexicographically by the schedule.
fn assert_legal(schedule: &Schedule, deps: &[Dependence], params: &[i64], bound: i64) {
    let pairs = dependent_pairs(schedule, deps, params, bound);
    assert!(!pairs.is_empty(), "no dependent pairs in the sampled box");
    for (s, t) in pairs {
        assert!(t > s, "schedule {:?} does not follow {:?}", t, s);
    }
}

/// Rows of a tilable band are non-negative on every pair still open at the
/// start of the band.
fn assert_bands_sound(schedule: &Schedule, deps: &[Dependence], params: &[i64], bound: i64) {
    let pairs = dependent_pairs(schedule, deps, params, bound);
    for band in schedule.bands.iter().filter(|b| b.is_tilable()) {
        for (s, t) in &pairs {
            if s[..band.start] != t[..band.start] {
                continue;
            }
            for r in band.rows() {
                assert!(t[r] >= s[r], "row {} of band {:?} reverses {:?} -> {:?}", r, band.rows(), s, t);
            }
        }
    }
}

#[test]
fn test_max_fuse_shares_one_band() {
    let out = schedule_str(PAIR_DOMAINS, PAIR_DEPS, &SchedulerOptions::max_fuse()).unwrap();
    assert_eq!(out.schedules, "[N] -> { S0[i, j] -> [i + 1, j, 0]; S1[i, j] -> [i, j, 1] }");
    assert!(out.remapping.is_none());
}

#[test]
fn test_no_fuse_leads_with_scalar_row() {
    let out = schedule_str(PAIR_DOMAINS, PAIR_DEPS, &SchedulerOptions::no_fuse()).unwrap();
    assert_eq!(out.schedules, "[N] -> { S0[i, j] -> [0, i, j]; S1[i, j] -> [1, i, j] }");
    assert_eq!(out.parallel_loops, "1,2");
}

#[test]
fn test_fusion_monotonicity() {
    let (program, deps) = setup(PAIR_DOMAINS, PAIR_DEPS);
    let fused = schedule(&program, &deps, &SchedulerOptions::max_fuse()).unwrap();
    let distributed = schedule(&program, &deps, &SchedulerOptions::no_fuse()).unwrap();
    assert!(distributed.n_rows() >= fused.n_rows());
    assert_eq!(distributed.row_kinds[0], RowKind::Scalar);
    assert_eq!(fused.row_kinds[0], RowKind::Hyperplane);
    for sched in [&fused, &distributed] {
        assert_legal(sched, &deps, &[4], 4);
    }
}

#[test]
fn test_single_statement_identity() {
    let out = schedule_str("[N, M] -> { S0[i, j] : 0 <= i < N and 0 <= j < M }", "{ }", &SchedulerOptions::default())
        .unwrap();
    assert_eq!(out.schedules, "[N, M] -> { S0[i, j] -> [i, j] }");
    assert_eq!(out.parallel_loops, "0,1");

    let program = parse_domains("[N, M] -> { S0[i, j] : 0 <= i < N and 0 <= j < M }").unwrap();
    let sched = schedule(&program, &[], &SchedulerOptions::default()).unwrap();
    assert_eq!(sched.bands.len(), 1);
    assert_eq!(sched.bands[0].tiling, TileKind::Rectangular);
    assert_eq!(sched.bands[0].tile_sizes, vec![32, 32]);
}

#[test]
fn test_stencil_carries_on_both_rows() {
    let (program, deps) = setup(
        "[N] -> { S0[i, j] : 1 <= i, j < N }",
        "[N] -> { S0[i, j] -> S0[i + 1, j]; S0[i, j] -> S0[i, j + 1] }",
    );
    let sched = schedule(&program, &deps, &SchedulerOptions::default()).unwrap();
    assert_eq!(polysched::frontend::print_schedule(&sched), "[N] -> { S0[i, j] -> [i, j] }");
    assert_eq!(print_parallel_loops(&sched), "");
    assert_legal(&sched, &deps, &[5], 5);
    assert_bands_sound(&sched, &deps, &[5], 5);
}

#[test]
fn test_jacobi_skews_inner_row() {
    let (program, deps) = setup(JACOBI_DOMAINS, JACOBI_DEPS);
    let sched = schedule(&program, &deps, &SchedulerOptions::default()).unwrap();
    assert_eq!(polysched::frontend::print_schedule(&sched), "[T, N] -> { S0[t, i] -> [t, t + i] }");
    assert_eq!(sched.parallel, vec![false, true]);
    assert_eq!(sched.bands.len(), 1);
    assert_eq!(sched.bands[0].tiling, TileKind::Rectangular);
    assert!(sched.satisfaction.iter().all(|s| s.level == Some(0)));
    assert_legal(&sched, &deps, &[4, 6], 6);
    assert_bands_sound(&sched, &deps, &[4, 6], 6);
}

#[test]
fn test_jacobi_diamond_tiling() {
    let (program, deps) = setup(JACOBI_DOMAINS, JACOBI_DEPS);
    let options = SchedulerOptions::default().diamond_tile(true).remapping(true);
    let sched = schedule(&program, &deps, &options).unwrap();
    assert_eq!(polysched::frontend::print_schedule(&sched), "[T, N] -> { S0[t, i] -> [t - i, t + i] }");
    assert_eq!(sched.bands[0].tiling, TileKind::Diamond);
    assert_eq!(sched.bands[0].diamond_factor, Some(2));
    assert_legal(&sched, &deps, &[4, 6], 6);
    assert_bands_sound(&sched, &deps, &[4, 6], 6);

    // the remapping inverts the skewed rows
    let params = [4, 6];
    let remapping = sched.remapping.as_ref().unwrap();
    let stmt = sched.stmt(StmtId(0)).unwrap();
    let remap = remapping.get(StmtId(0)).unwrap();
    for point in points(stmt, &params, 6) {
        let image = stmt.schedule.apply(&point, &params).unwrap();
        assert_eq!(remap.apply(&image, &params).unwrap(), Some(point));
    }
}

#[test]
fn test_pairwise_infeasible_fusion_terminates() {
    // each statement reads its predecessor backwards
    let (program, deps) = setup(
        "[N] -> { S0[i] : 0 <= i < N; S1[i] : 0 <= i < N; S2[i] : 0 <= i < N }",
        "[N] -> { S0[i] -> S1[i'] : i + i' = N - 1; S1[i] -> S2[i'] : i + i' = N - 1 }",
    );
    let options = SchedulerOptions::max_fuse().param_coeffs(false);
    let sched = schedule(&program, &deps, &options).unwrap();
    assert_eq!(
        polysched::frontend::print_schedule(&sched),
        "[N] -> { S0[i] -> [0, i]; S1[i] -> [1, i]; S2[i] -> [2, i] }"
    );
    assert_eq!(sched.stats.cluster_splits, 2);
    assert_legal(&sched, &deps, &[5], 5);
}

#[test]
fn test_every_dependence_gets_a_level() {
    for options in [SchedulerOptions::default(), SchedulerOptions::no_fuse(), SchedulerOptions::max_fuse()] {
        let (program, deps) = setup(PAIR_DOMAINS, PAIR_DEPS);
        let sched = schedule(&program, &deps, &options).unwrap();
        assert!(!sched.satisfaction.is_empty());
        for sat in &sched.satisfaction {
            let level = sat.level.expect("dependence left unsatisfied");
            assert!(level < sched.n_rows());
        }
        for stmt in &sched.statements {
            assert_eq!(stmt.schedule.n_out(), sched.n_rows());
        }
    }
}

#[test]
fn test_deterministic() {
    let options = SchedulerOptions::default().parallel_solve(true);
    let first = schedule_str(JACOBI_DOMAINS, JACOBI_DEPS, &options).unwrap();
    for _ in 0..3 {
        let again = schedule_str(JACOBI_DOMAINS, JACOBI_DEPS, &options).unwrap();
        assert_eq!(again.schedules, first.schedules);
        assert_eq!(again.parallel_loops, first.parallel_loops);
    }
}

#[test]
fn test_parse_errors_surface() {
    let err = schedule_str("[N] -> { S0[i] : 0 <= i < N", "{ }", &SchedulerOptions::default()).unwrap_err();
    assert!(matches!(err, PolySchedError::Parse(ref e) if e.kind == ParseErrorKind::UnexpectedEof));

    let err = schedule_str("{ S0[i] : 0 <= i < 4 }", "{ S0[i] -> S7[i] }", &SchedulerOptions::default()).unwrap_err();
    assert!(matches!(err, PolySchedError::Input(ref e) if e.kind == InputErrorKind::UnknownStatement));

    let err = schedule_str("{ }", "{ }", &SchedulerOptions::default()).unwrap_err();
    assert!(matches!(err, PolySchedError::Input(ref e) if e.kind == InputErrorKind::EmptyProgram));
}

#[test]
fn test_empty_domain_rejected() {
    let err = schedule_str("{ S0[i] : 4 <= i < 2 }", "{ }", &SchedulerOptions::default()).unwrap_err();
    assert!(matches!(err, PolySchedError::Input(ref e) if e.kind == InputErrorKind::EmptyDomain));
}

#[test]
fn test_union_text_keeps_pieces() {
    let text = parse_union(JACOBI_DEPS).unwrap();
    assert_eq!(text.params, Some(vec!["T".to_string(), "N".to_string()]));
    assert_eq!(text.pieces.len(), 3);
    assert!(text.pieces.iter().all(|p| p.is_relation()));
}

#[test]
fn test_options_round_trip_through_setters() {
    let options = SchedulerOptions::no_fuse().tile_size(16).coeff_bound(4);
    assert_eq!(options.fuse, FusionPolicy::NoFuse);
    assert_eq!(options.tile_size, 16);
    let (program, deps) = setup(PAIR_DOMAINS, PAIR_DEPS);
    let sched = Scheduler::new(options).schedule(&program, &deps).unwrap();
    assert!(sched.bands.iter().filter(|b| b.is_tilable()).all(|b| b.tile_sizes.iter().all(|&s| s == 16)));
}

const CHAIN_DOMAINS: &str = "[N] -> { S0[i] : 0 <= i < N; S1[i] : 0 <= i < N }";

#[test]
fn test_smart_fuse_keeps_parallel_loops() {
    // each side is parallel alone, any fused row carries the dependence
    let deps_text = "[N] -> { S0[i] -> S1[i'] : i <= i' < N }";
    let out = schedule_str(CHAIN_DOMAINS, deps_text, &SchedulerOptions::default()).unwrap();
    assert_eq!(out.schedules, "[N] -> { S0[i] -> [0, i]; S1[i] -> [1, i] }");
    assert_eq!(out.parallel_loops, "1");

    let (program, deps) = setup(CHAIN_DOMAINS, deps_text);
    for fuse in [FusionPolicy::SmartFuse, FusionPolicy::TypedFuse, FusionPolicy::HybridFuse] {
        let sched = schedule(&program, &deps, &SchedulerOptions::default().fuse(fuse)).unwrap();
        assert_eq!(sched.row_kinds[0], RowKind::Scalar, "{} fused across a parallel loop", fuse);
        assert_eq!(sched.parallel, vec![false, true]);
        assert_legal(&sched, &deps, &[4], 4);
    }
}

#[test]
fn test_smart_and_hybrid_fuse_shifted_pair() {
    let (program, deps) = setup(PAIR_DOMAINS, PAIR_DEPS);
    for fuse in [FusionPolicy::SmartFuse, FusionPolicy::HybridFuse] {
        let sched = schedule(&program, &deps, &SchedulerOptions::default().fuse(fuse)).unwrap();
        assert_eq!(sched.row_kinds[0], RowKind::Hyperplane);
        assert_legal(&sched, &deps, &[4], 4);
        assert_bands_sound(&sched, &deps, &[4], 4);
    }
}

#[test]
fn test_negative_coefficients_reverse_consumer() {
    let deps_text = "[N] -> { S0[i] -> S1[i'] : i + i' = N - 1 }";
    let options = SchedulerOptions::max_fuse().negative_coeffs(true);
    let out = schedule_str(CHAIN_DOMAINS, deps_text, &options).unwrap();
    assert_eq!(out.schedules, "[N] -> { S0[i] -> [i + 1, 0]; S1[i] -> [-i + N, 1] }");
    assert_eq!(out.parallel_loops, "0");

    let (program, deps) = setup(CHAIN_DOMAINS, deps_text);
    let sched = schedule(&program, &deps, &options).unwrap();
    assert_legal(&sched, &deps, &[5], 5);

    let (program, deps) = setup(JACOBI_DOMAINS, JACOBI_DEPS);
    let sched = schedule(&program, &deps, &SchedulerOptions::default().negative_coeffs(true)).unwrap();
    assert_legal(&sched, &deps, &[4, 6], 6);
    assert_bands_sound(&sched, &deps, &[4, 6], 6);
}

#[test]
fn test_without_dependence_bound() {
    for (domains, deps_text, params, bound) in
        [(JACOBI_DOMAINS, JACOBI_DEPS, vec![4, 6], 6), (PAIR_DOMAINS, PAIR_DEPS, vec![4], 4)]
    {
        let (program, deps) = setup(domains, deps_text);
        let sched = schedule(&program, &deps, &SchedulerOptions::default().no_dep_bound(true)).unwrap();
        assert_legal(&sched, &deps, &params, bound);
        assert_bands_sound(&sched, &deps, &params, bound);
    }
}

#[test]
fn test_lp_backend_schedules() {
    let options = SchedulerOptions::default().solver(SolverKind::Lp);
    for (domains, deps_text, params, bound) in
        [(JACOBI_DOMAINS, JACOBI_DEPS, vec![4, 6], 6), (PAIR_DOMAINS, PAIR_DEPS, vec![4], 4)]
    {
        let (program, deps) = setup(domains, deps_text);
        let sched = schedule(&program, &deps, &options).unwrap();
        assert!(sched.satisfaction.iter().all(|s| s.level.is_some()));
        assert_legal(&sched, &deps, &params, bound);
        assert_bands_sound(&sched, &deps, &params, bound);
    }
}

#[test]
fn test_last_writer_keeps_dropped_pairs_ordered() {
    // the distance-1 flow is implied by the self chain and the distance-0 flow
    let (program, deps) = setup(
        CHAIN_DOMAINS,
        "[N] -> { S0[i] -> S0[i + 1]; S0[i] -> S1[i]; S0[i] -> S1[i + 1] }",
    );
    for options in [SchedulerOptions::default(), SchedulerOptions::no_fuse(), SchedulerOptions::max_fuse()] {
        let sched = schedule(&program, &deps, &options.last_writer(true)).unwrap();
        assert_eq!(sched.stats.dependences.transitively_reduced, 1);
        assert_legal(&sched, &deps, &[5], 5);
    }
}

#[test]
fn test_identity_schedule() {
    let options = SchedulerOptions::default().identity(true);
    let out = schedule_str(JACOBI_DOMAINS, JACOBI_DEPS, &options).unwrap();
    assert_eq!(out.schedules, "[T, N] -> { S0[t, i] -> [t, i] }");
    assert_eq!(out.parallel_loops, "1");

    let (program, deps) = setup(JACOBI_DOMAINS, JACOBI_DEPS);
    let sched = schedule(&program, &deps, &options).unwrap();
    assert_eq!(sched.bands[0].tiling, TileKind::None);
    assert_legal(&sched, &deps, &[4, 6], 6);
}

#[test]
fn test_forced_tile_depths_and_second_level() {
    let (program, deps) = setup(JACOBI_DOMAINS, JACOBI_DEPS);
    let options = SchedulerOptions::default().tile_depths(Some(1), Some(1)).l2_tile(true);
    let sched = schedule(&program, &deps, &options).unwrap();
    assert_eq!(polysched::frontend::print_schedule(&sched), "[T, N] -> { S0[t, i] -> [t, t + i] }");
    assert_eq!(sched.bands.iter().map(Band::rows).collect::<Vec<_>>(), vec![0..1, 1..2]);
    assert_eq!(sched.bands[0].tiling, TileKind::None);
    assert_eq!(sched.bands[1].tiling, TileKind::Rectangular);
    assert_eq!(sched.bands[1].l2_tile_sizes, vec![256]);
    assert_bands_sound(&sched, &deps, &[4, 6], 6);
}

#[test]
fn test_invalid_option_values() {
    for options in [SchedulerOptions::default().coeff_bound(0), SchedulerOptions::default().tile_size(0)] {
        let err = schedule_str(PAIR_DOMAINS, PAIR_DEPS, &options).unwrap_err();
        assert!(matches!(err, PolySchedError::Input(ref e) if e.kind == InputErrorKind::InvalidOption));
    }
}

#[test]
fn test_remap_rejects_wrong_lengths() {
    let options = SchedulerOptions::default().remapping(true);
    let (program, deps) = setup(PAIR_DOMAINS, PAIR_DEPS);
    let sched = schedule(&program, &deps, &options).unwrap();
    let remap = sched.remapping.as_ref().unwrap().get(StmtId(0)).unwrap();
    let image = sched.stmt(StmtId(0)).unwrap().schedule.apply(&[1, 2], &[4]).unwrap();
    assert_eq!(remap.apply(&image, &[4]).unwrap(), Some(vec![1, 2]));
    assert!(remap.apply(&image[1..], &[4]).is_err());
    assert!(remap.apply(&image, &[]).is_err());
}
