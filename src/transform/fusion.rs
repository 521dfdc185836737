//! Fusion clusters.
//!
//! Every round the SCCs of the open-dependence graph, in topological order,
//! are grouped into clusters whose statements get a common hyperplane.
//!
//! ```text
//! SCCs:       [S0] [S1 S2] [S3]        depths 2, 2, 1
//! nofuse:     [S0] [S1 S2] [S3]
//! maxfuse:    [S0 S1 S2 S3]
//! smartfuse:  [S0 S1 S2] [S3]      unless fusing loses a parallel row
//! ```
//!
//! A cluster with no legal hyperplane is split in half and each half retried,
//! down to single SCCs.

use crate::options::FusionPolicy;
use crate::polyhedral::expr::AffineExpr;
use crate::utils::errors::PolyResult;
use log::debug;
use rayon::prelude::*;

/// A contiguous run of SCCs solved together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub sccs: Vec<Vec<usize>>,
}

impl Cluster {
    pub fn new(sccs: Vec<Vec<usize>>) -> Self {
        Self { sccs }
    }

    pub fn single(scc: Vec<usize>) -> Self {
        Self { sccs: vec![scc] }
    }

    /// Member statements in ascending order.
    pub fn statements(&self) -> Vec<usize> {
        let mut stmts: Vec<usize> = self.sccs.iter().flatten().copied().collect();
        stmts.sort_unstable();
        stmts
    }

    pub fn is_single_scc(&self) -> bool {
        self.sccs.len() == 1
    }

    /// Halves in topological order.
    fn split(&self) -> (Cluster, Cluster) {
        let mid = self.sccs.len() / 2;
        (Cluster::new(self.sccs[..mid].to_vec()), Cluster::new(self.sccs[mid..].to_vec()))
    }
}

/// Loop depth of an SCC: its deepest statement.
pub fn scc_depth(scc: &[usize], depths: &[usize]) -> usize {
    scc.iter().map(|&s| depths[s]).max().unwrap_or(0)
}

/// Runs of consecutive SCCs with equal loop depth.
fn smart_runs(sccs: &[Vec<usize>], depths: &[usize]) -> Vec<Cluster> {
    let mut out: Vec<Cluster> = Vec::new();
    let mut last_depth = None;
    for scc in sccs {
        let depth = scc_depth(scc, depths);
        match out.last_mut() {
            Some(run) if last_depth == Some(depth) => run.sccs.push(scc.clone()),
            _ => out.push(Cluster::single(scc.clone())),
        }
        last_depth = Some(depth);
    }
    out
}

/// Break a run of SCCs wherever fusing would cost parallelism.
///
/// Smart fusion only refuses a merge when both sides admit a parallel
/// hyperplane on their own and the union does not. Typed fusion also keeps
/// a parallel SCC apart from a sequential one, so every cluster is of one
/// type.
fn guard_run<F>(run: Cluster, typed: bool, admits_parallel: &mut F) -> PolyResult<Vec<Cluster>>
where
    F: FnMut(&[usize]) -> PolyResult<bool>,
{
    if run.is_single_scc() {
        return Ok(vec![run]);
    }
    let mut sccs = run.sccs.into_iter();
    let Some(first) = sccs.next() else {
        return Ok(Vec::new());
    };
    let mut cur_parallel = admits_parallel(&first)?;
    let mut current = Cluster::single(first);
    let mut out = Vec::new();

    for scc in sccs {
        let next_parallel = admits_parallel(&scc)?;
        let keep_apart = if cur_parallel && next_parallel {
            let mut merged = current.statements();
            merged.extend(scc.iter().copied());
            !admits_parallel(&merged)?
        } else {
            typed && cur_parallel != next_parallel
        };
        if keep_apart {
            let policy = if typed { "typed" } else { "smart" };
            debug!("{} fusion: keeping {:?} apart from {:?}", policy, scc, current.statements());
            out.push(std::mem::replace(&mut current, Cluster::single(scc)));
            cur_parallel = next_parallel;
        } else {
            // a union is never more parallel than its parts
            current.sccs.push(scc);
            cur_parallel = cur_parallel && next_parallel;
        }
    }
    out.push(current);
    Ok(out)
}

/// Candidate clusters for one round.
///
/// `outer` is true while no hyperplane row has been emitted.
/// `admits_parallel` answers whether a set of statements has a common
/// hyperplane that carries none of their dependences; it is consulted by
/// every policy that fuses on depth.
pub fn candidate_clusters<F>(
    policy: FusionPolicy,
    sccs: &[Vec<usize>],
    depths: &[usize],
    outer: bool,
    mut admits_parallel: F,
) -> PolyResult<Vec<Cluster>>
where
    F: FnMut(&[usize]) -> PolyResult<bool>,
{
    if sccs.is_empty() {
        return Ok(Vec::new());
    }
    let typed = match policy {
        FusionPolicy::NoFuse => return Ok(sccs.iter().cloned().map(Cluster::single).collect()),
        FusionPolicy::MaxFuse => return Ok(vec![Cluster::new(sccs.to_vec())]),
        FusionPolicy::HybridFuse if !outer => return Ok(vec![Cluster::new(sccs.to_vec())]),
        FusionPolicy::SmartFuse => false,
        FusionPolicy::TypedFuse | FusionPolicy::HybridFuse => true,
    };
    let mut clusters = Vec::new();
    for run in smart_runs(sccs, depths) {
        clusters.extend(guard_run(run, typed, &mut admits_parallel)?);
    }
    Ok(clusters)
}

/// One cluster of the final partition and its rows, `None` when even this
/// cluster has no legal hyperplane.
#[derive(Debug, Clone)]
pub struct Solved {
    pub cluster: Cluster,
    pub rows: Option<Vec<(usize, AffineExpr)>>,
}

fn solve_split<F>(cluster: Cluster, solve: &F) -> PolyResult<Vec<Solved>>
where
    F: Fn(&Cluster) -> PolyResult<Option<Vec<(usize, AffineExpr)>>> + Sync,
{
    if let Some(rows) = solve(&cluster)? {
        return Ok(vec![Solved { cluster, rows: Some(rows) }]);
    }
    if cluster.is_single_scc() {
        return Ok(vec![Solved { cluster, rows: None }]);
    }
    let (left, right) = cluster.split();
    debug!("splitting cluster {:?} into {:?} / {:?}", cluster.sccs, left.sccs, right.sccs);
    let mut out = solve_split(left, solve)?;
    out.extend(solve_split(right, solve)?);
    Ok(out)
}

/// Solve every cluster, splitting infeasible ones. The result lists the
/// final partition in cluster order whether or not the clusters ran on the
/// rayon pool.
pub fn solve_partition<F>(clusters: Vec<Cluster>, solve: &F, parallel: bool) -> PolyResult<Vec<Solved>>
where
    F: Fn(&Cluster) -> PolyResult<Option<Vec<(usize, AffineExpr)>>> + Sync,
{
    let parts: Vec<Vec<Solved>> = if parallel && clusters.len() > 1 {
        clusters
            .into_par_iter()
            .map(|c| solve_split(c, solve))
            .collect::<PolyResult<Vec<_>>>()?
    } else {
        clusters
            .into_iter()
            .map(|c| solve_split(c, solve))
            .collect::<PolyResult<Vec<_>>>()?
    };
    Ok(parts.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sccs() -> Vec<Vec<usize>> {
        vec![vec![0], vec![1, 2], vec![3]]
    }

    const DEPTHS: [usize; 4] = [2, 2, 2, 1];

    fn never(_: &[usize]) -> PolyResult<bool> {
        panic!("parallel check not expected")
    }

    #[test]
    fn test_policies() {
        let s = sccs();
        let none = candidate_clusters(FusionPolicy::NoFuse, &s, &DEPTHS, true, never).unwrap();
        assert_eq!(none.len(), 3);
        let max = candidate_clusters(FusionPolicy::MaxFuse, &s, &DEPTHS, true, never).unwrap();
        assert_eq!(max.len(), 1);
        assert_eq!(max[0].statements(), vec![0, 1, 2, 3]);
        let smart = candidate_clusters(FusionPolicy::SmartFuse, &s, &DEPTHS, true, |_: &[usize]| Ok(true)).unwrap();
        assert_eq!(smart.iter().map(Cluster::statements).collect::<Vec<_>>(), vec![vec![0, 1, 2], vec![3]]);
        let hybrid_inner = candidate_clusters(FusionPolicy::HybridFuse, &s, &DEPTHS, false, never).unwrap();
        assert_eq!(hybrid_inner.len(), 1);
    }

    #[test]
    fn test_typed_fusion_keeps_parallel_sccs_apart() {
        // {0} and {1, 2} are parallel alone but not together
        let s = sccs();
        let typed = candidate_clusters(FusionPolicy::TypedFuse, &s, &DEPTHS, true, |stmts: &[usize]| {
            Ok(!(stmts.contains(&0) && stmts.contains(&1)))
        })
        .unwrap();
        assert_eq!(typed.iter().map(Cluster::statements).collect::<Vec<_>>(), vec![vec![0], vec![1, 2], vec![3]]);

        let fused = candidate_clusters(FusionPolicy::TypedFuse, &s, &DEPTHS, true, |_: &[usize]| Ok(true)).unwrap();
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_smart_fusion_keeps_parallel_rows() {
        // {0} and {1, 2} are parallel alone but not together
        let s = sccs();
        let smart = candidate_clusters(FusionPolicy::SmartFuse, &s, &DEPTHS, true, |stmts: &[usize]| {
            Ok(!(stmts.contains(&0) && stmts.contains(&1)))
        })
        .unwrap();
        assert_eq!(smart.iter().map(Cluster::statements).collect::<Vec<_>>(), vec![vec![0], vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_typed_fusion_separates_types() {
        // {1, 2} is sequential: smart fusion still fuses it with {0}
        let s = sccs();
        let sequential = |stmts: &[usize]| -> PolyResult<bool> { Ok(!stmts.contains(&1)) };
        let smart = candidate_clusters(FusionPolicy::SmartFuse, &s, &DEPTHS, true, sequential).unwrap();
        assert_eq!(smart.iter().map(Cluster::statements).collect::<Vec<_>>(), vec![vec![0, 1, 2], vec![3]]);
        let typed = candidate_clusters(FusionPolicy::TypedFuse, &s, &DEPTHS, true, sequential).unwrap();
        assert_eq!(typed.iter().map(Cluster::statements).collect::<Vec<_>>(), vec![vec![0], vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_split_until_feasible() {
        // any cluster holding both 0 and 2 is infeasible
        let solve = |c: &Cluster| -> PolyResult<Option<Vec<(usize, AffineExpr)>>> {
            let stmts = c.statements();
            if stmts.contains(&0) && stmts.contains(&2) {
                return Ok(None);
            }
            Ok(Some(stmts.iter().map(|&s| (s, AffineExpr::zero(1, 0))).collect()))
        };
        let clusters = vec![Cluster::new(vec![vec![0], vec![1], vec![2]])];
        for parallel in [false, true] {
            let out = solve_partition(clusters.clone(), &solve, parallel).unwrap();
            let parts: Vec<Vec<usize>> = out.iter().map(|s| s.cluster.statements()).collect();
            assert_eq!(parts, vec![vec![0], vec![1, 2]]);
            assert!(out.iter().all(|s| s.rows.is_some()));
        }
    }

    #[test]
    fn test_singleton_failure_is_reported() {
        let solve = |c: &Cluster| -> PolyResult<Option<Vec<(usize, AffineExpr)>>> {
            Ok((!c.statements().contains(&1)).then(Vec::new))
        };
        let clusters: Vec<Cluster> = sccs().into_iter().map(Cluster::single).collect();
        let out = solve_partition(clusters, &solve, true).unwrap();
        let failed: HashSet<Vec<usize>> =
            out.iter().filter(|s| s.rows.is_none()).map(|s| s.cluster.statements()).collect();
        assert_eq!(failed, HashSet::from([vec![1, 2]]));
        assert_eq!(out.len(), 3);
    }
}
