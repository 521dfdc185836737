//! Polyhedral scheduler.
//!
//! Rows are found one at a time, outermost first. Every round:
//!
//! 1. rebuilds the graph of open dependences and orders its SCCs
//! 2. groups the SCCs into clusters according to the fusion policy
//! 3. solves the lexmin hyperplane problem of every cluster, splitting
//!    clusters that have none
//! 4. emits a scalar cut when two clusters are not yet separated, and one
//!    hyperplane per cluster otherwise
//!
//! until every dependence is satisfied and every statement has full rank.
//! With `identity` set the search is skipped: the original iterators become
//! the rows and a trailing cut orders the statements, provided that is
//! legal.
//! Bands are then checked for tilability, parallel rows are marked, and the
//! whole schedule is replayed against every dependence.

use crate::analysis::{materialize, Dependence, DependenceGraph, DependenceKind, DependenceRelation, MaterializeStats};
use crate::ir::pir::{PolyProgram, PolyStmt, StmtId};
use crate::options::{CutStrategy, SchedulerOptions};
use crate::polyhedral::expr::AffineExpr;
use crate::polyhedral::map::AffineMap;
use crate::solver::{self, IlpProblem, Solver};
use crate::transform::farkas::{iterator_rank, ConstraintBuilder, DepView, ProblemMode, StmtView};
use crate::transform::fusion::{self, Cluster};
use crate::transform::remap::Remapping;
use crate::transform::satisfaction::{self, row_effect, DepState, RowEffect};
use crate::transform::tiling::{self, DepEnds};
use crate::utils::errors::{PolyResult, PolySchedError, ScheduleError, ScheduleErrorKind};
use log::{debug, info, trace};
use serde::{Serialize, Deserialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub use crate::transform::tiling::{Band, TileKind};

/// Kind of a schedule row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowKind {
    /// Constant per statement, distributes clusters
    Scalar,
    /// Affine in the iterators
    Hyperplane,
}

/// Row at which a dependence got fully ordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepSatisfaction {
    pub source: StmtId,
    pub target: StmtId,
    pub kind: DependenceKind,
    pub level: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleStats {
    pub rounds: usize,
    pub hyperplanes: usize,
    pub cuts: usize,
    /// Bands ended early because no permutable row was left
    pub band_breaks: usize,
    pub cluster_splits: usize,
    pub solver_calls: usize,
    pub dependences: MaterializeStats,
    pub elapsed: Duration,
}

/// A computed schedule, owned by the caller.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub parameters: Vec<String>,
    /// Statements in id order, each with its rows
    pub statements: Vec<PolyStmt>,
    pub row_kinds: Vec<RowKind>,
    /// Per row: hyperplane that carries no dependence
    pub parallel: Vec<bool>,
    pub bands: Vec<Band>,
    /// One entry per materialized dependence
    pub satisfaction: Vec<DepSatisfaction>,
    pub remapping: Option<Remapping>,
    pub stats: ScheduleStats,
}

impl Schedule {
    pub fn n_rows(&self) -> usize {
        self.row_kinds.len()
    }

    pub fn stmt(&self, id: StmtId) -> Option<&PolyStmt> {
        self.statements.iter().find(|s| s.id == id)
    }

    /// Rows of one statement.
    pub fn rows(&self, id: StmtId) -> Option<&[AffineExpr]> {
        self.stmt(id).map(|s| s.schedule.outputs.as_slice())
    }

    /// Indices of the parallel rows.
    pub fn parallel_rows(&self) -> Vec<usize> {
        self.parallel.iter().enumerate().filter(|(_, &p)| p).map(|(r, _)| r).collect()
    }
}

/// Polyhedral scheduler.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    options: SchedulerOptions,
}

impl Scheduler {
    pub fn new(options: SchedulerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Schedule a program.
    pub fn schedule(&self, program: &PolyProgram, deps: &[Dependence]) -> PolyResult<Schedule> {
        let started = Instant::now();
        self.options.validate()?;
        program.validate()?;
        let solver = solver::backend(self.options.solver)?;
        let (deps, stats) = materialize(program, deps, &self.options)?;
        info!(
            "scheduling {} statements with {} dependences ({}, {} solver)",
            program.statements.len(),
            deps.len(),
            self.options.fuse,
            solver.name()
        );
        let mut driver = Driver::new(program, &deps, &self.options, solver, started)?;
        driver.run()?;
        driver.finish(program, stats)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundState {
    Active(usize),
    AllSatisfied,
    Stuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Cut,
    Hyperplane,
    BandEnded,
    Stuck,
    Done,
}

struct Driver<'a> {
    options: &'a SchedulerOptions,
    deps: &'a [Dependence],
    solver: Box<dyn Solver>,
    builder: ConstraintBuilder,
    n_param: usize,
    stmts: Vec<PolyStmt>,
    states: Vec<DepState>,
    /// Values of the scalar rows so far, per statement
    cut_values: Vec<Vec<i64>>,
    row_kinds: Vec<RowKind>,
    bands: Vec<Band>,
    band_start: usize,
    stats: ScheduleStats,
    solver_calls: AtomicUsize,
    started: Instant,
}

impl<'a> Driver<'a> {
    fn new(
        program: &PolyProgram,
        deps: &'a [Dependence],
        options: &'a SchedulerOptions,
        solver: Box<dyn Solver>,
        started: Instant,
    ) -> PolyResult<Self> {
        let n_param = program.n_param();
        let stmts: Vec<PolyStmt> = program
            .statements
            .iter()
            .map(|s| {
                let mut s = s.clone();
                s.schedule = AffineMap::empty(s.depth(), n_param);
                s
            })
            .collect();
        let mut states = Vec::with_capacity(deps.len());
        for dep in deps {
            match (program.stmt_index(dep.source), program.stmt_index(dep.target)) {
                (Some(src), Some(tgt)) => states.push(DepState::new(src, tgt, &dep.relation)),
                _ => return Err(PolySchedError::Internal(format!("unresolved {}", dep.description()))),
            }
        }
        Ok(Self {
            options,
            deps,
            solver,
            builder: ConstraintBuilder::new(n_param, options),
            n_param,
            cut_values: vec![Vec::new(); stmts.len()],
            stmts,
            states,
            row_kinds: Vec::new(),
            bands: Vec::new(),
            band_start: 0,
            stats: ScheduleStats::default(),
            solver_calls: AtomicUsize::new(0),
            started,
        })
    }

    fn n_rows(&self) -> usize {
        self.row_kinds.len()
    }

    fn band_width(&self) -> usize {
        self.n_rows() - self.band_start
    }

    fn is_full_rank(&self, s: usize) -> bool {
        let stmt = &self.stmts[s];
        iterator_rank(stmt.depth(), &stmt.schedule.outputs) == stmt.depth()
    }

    fn open_dependences(&self) -> usize {
        self.states.iter().filter(|d| !d.is_satisfied()).count()
    }

    fn is_done(&self) -> bool {
        self.open_dependences() == 0 && (0..self.stmts.len()).all(|s| self.is_full_rank(s))
    }

    fn check_budget(&self) -> PolyResult<()> {
        if let Some(budget) = self.options.time_budget {
            if self.started.elapsed() >= budget {
                return Err(ScheduleError::new(
                    ScheduleErrorKind::TimeBudgetExceeded,
                    format!("time budget of {:?} exhausted after {} rows", budget, self.n_rows()),
                )
                .into());
            }
        }
        Ok(())
    }

    fn run(&mut self) -> PolyResult<()> {
        if self.options.identity {
            return self.run_identity();
        }
        let mut state = RoundState::Active(self.options.max_rounds);
        loop {
            state = match state {
                RoundState::AllSatisfied => break,
                RoundState::Stuck => {
                    return Err(ScheduleError::new(
                        ScheduleErrorKind::NoLegalSchedule,
                        format!(
                            "no legal hyperplane or cut after {} rows, {} dependences open",
                            self.n_rows(),
                            self.open_dependences()
                        ),
                    )
                    .into());
                }
                RoundState::Active(0) if !self.is_done() => {
                    return Err(ScheduleError::new(
                        ScheduleErrorKind::IterationCapExceeded,
                        format!(
                            "{} rounds used with {} dependences open",
                            self.options.max_rounds,
                            self.open_dependences()
                        ),
                    )
                    .into());
                }
                RoundState::Active(remaining) => {
                    self.check_budget()?;
                    self.stats.rounds += 1;
                    let step = self.round()?;
                    info!(
                        "round {}: {:?}, {} rows, {} dependences open",
                        self.stats.rounds,
                        step,
                        self.n_rows(),
                        self.open_dependences()
                    );
                    match step {
                        Step::Done => RoundState::AllSatisfied,
                        Step::Stuck => RoundState::Stuck,
                        Step::Cut | Step::Hyperplane | Step::BandEnded => {
                            RoundState::Active(remaining.saturating_sub(1))
                        }
                    }
                }
            };
        }
        self.end_band();
        Ok(())
    }

    fn no_legal_schedule(&self, k: usize, what: &str) -> PolySchedError {
        ScheduleError::new(
            ScheduleErrorKind::NoLegalSchedule,
            format!("{} at row {} violates {}", what, self.n_rows(), self.deps[k].description()),
        )
        .into()
    }

    /// Iterator `k` becomes row `k` of every statement (zero past its depth),
    /// then cuts in statement order separate what is still open.
    fn run_identity(&mut self) -> PolyResult<()> {
        let n_param = self.n_param;
        let max_depth = self.stmts.iter().map(PolyStmt::depth).max().unwrap_or(0);
        for k in 0..max_depth {
            self.check_budget()?;
            let rows: Vec<AffineExpr> = self
                .stmts
                .iter()
                .map(|s| {
                    if k < s.depth() {
                        AffineExpr::var(k, s.depth(), n_param)
                    } else {
                        AffineExpr::zero(s.depth(), n_param)
                    }
                })
                .collect();
            if let Some(dep) = self.first_violation(&rows)? {
                return Err(self.no_legal_schedule(dep, "identity row"));
            }
            let row = self.n_rows();
            for (stmt, r) in self.stmts.iter_mut().zip(rows) {
                stmt.schedule.push_row(r);
            }
            self.row_kinds.push(RowKind::Hyperplane);
            self.advance_all(row)?;
            self.stats.hyperplanes += 1;
        }

        let order: Vec<Cluster> = (0..self.stmts.len()).map(|s| Cluster::single(vec![s])).collect();
        while self.open_dependences() > 0 && self.needs_cut(&order) {
            let rows: Vec<AffineExpr> = self
                .cut_values_for(&order)
                .into_iter()
                .zip(&self.stmts)
                .map(|(v, stmt)| AffineExpr::constant(v, stmt.depth(), n_param))
                .collect();
            if let Some(dep) = self.first_violation(&rows)? {
                return Err(self.no_legal_schedule(dep, "statement order"));
            }
            self.emit_cut(&order)?;
        }
        if self.open_dependences() > 0 {
            return Err(ScheduleError::new(
                ScheduleErrorKind::NoLegalSchedule,
                format!("identity schedule leaves {} dependences open", self.open_dependences()),
            )
            .into());
        }
        self.end_band();
        Ok(())
    }

    fn round(&mut self) -> PolyResult<Step> {
        if self.is_done() {
            return Ok(Step::Done);
        }
        let edges = self
            .states
            .iter()
            .filter(|d| !d.is_satisfied() && d.src != d.tgt)
            .map(|d| (d.src, d.tgt));
        let sccs = DependenceGraph::from_edges(self.stmts.len(), edges).ordered_sccs();
        let per_scc: Vec<Cluster> = sccs.iter().cloned().map(Cluster::single).collect();

        if (0..self.stmts.len()).all(|s| self.is_full_rank(s)) {
            return self.distribute(&per_scc);
        }

        let outer = !self.row_kinds.contains(&RowKind::Hyperplane);
        let depths: Vec<usize> = self.stmts.iter().map(PolyStmt::depth).collect();
        let candidate = fusion::candidate_clusters(self.options.fuse, &sccs, &depths, outer, |stmts: &[usize]| {
            self.admits_parallel(stmts)
        })?;
        debug!(
            "candidate clusters: {:?}",
            candidate.iter().map(Cluster::statements).collect::<Vec<_>>()
        );
        if self.needs_cut(&candidate) {
            self.emit_cut(&candidate)?;
            return Ok(Step::Cut);
        }

        let n_candidates = candidate.len();
        let solved = fusion::solve_partition(
            candidate,
            &|c: &Cluster| self.solve_cluster(c, ProblemMode::Hyperplane),
            self.options.parallel_solve,
        )?;
        self.stats.cluster_splits += solved.len().saturating_sub(n_candidates);

        if solved.iter().any(|s| s.rows.is_none()) {
            if self.band_width() > 0 {
                return Ok(self.break_band());
            }
            if self.needs_cut(&per_scc) {
                self.emit_cut(&per_scc)?;
                return Ok(Step::Cut);
            }
            return Ok(Step::Stuck);
        }

        let partition: Vec<Cluster> = solved.iter().map(|s| s.cluster.clone()).collect();
        if self.needs_cut(&partition) {
            self.emit_cut(&partition)?;
            return Ok(Step::Cut);
        }
        let rows = solved.into_iter().filter_map(|s| s.rows).flatten().collect();
        self.emit_hyperplanes(rows)
    }

    /// Every statement has full rank but dependences are open: distribute
    /// the SCCs, or order what is left within them.
    fn distribute(&mut self, per_scc: &[Cluster]) -> PolyResult<Step> {
        if self.needs_cut(per_scc) {
            self.emit_cut(per_scc)?;
            return Ok(Step::Cut);
        }
        if self.band_width() > 0 {
            return Ok(self.break_band());
        }
        let mut rows = Vec::new();
        for cluster in per_scc {
            match self.solve_cluster(cluster, ProblemMode::Carrying)? {
                Some(r) => rows.extend(r),
                None => return Ok(Step::Stuck),
            }
        }
        self.emit_hyperplanes(rows)
    }

    fn views(&self, stmts: &[usize]) -> Vec<StmtView<'_>> {
        stmts.iter().map(|&s| StmtView::of(s, &self.stmts[s])).collect()
    }

    /// Dependences open at band start with both ends in `stmts`.
    fn band_deps(&self, stmts: &[usize]) -> Vec<DepView<'_>> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, d)| d.active_in_band() && stmts.contains(&d.src) && stmts.contains(&d.tgt))
            .map(|(id, d)| DepView { id, src: d.src, tgt: d.tgt, residual: &d.band_residual })
            .collect()
    }

    fn lexmin(&self, problem: &IlpProblem) -> PolyResult<Option<Vec<i64>>> {
        self.solver_calls.fetch_add(1, Ordering::Relaxed);
        trace!(
            "{}: {} unknowns, {} constraints, {} objectives",
            self.solver.name(),
            problem.n_vars(),
            problem.constraints.len(),
            problem.objectives.len()
        );
        self.solver.lexmin(problem)
    }

    fn admits_parallel(&self, stmts: &[usize]) -> PolyResult<bool> {
        let (_, problem) = self
            .builder
            .cluster_problem(&self.views(stmts), &self.band_deps(stmts), ProblemMode::Parallel)?;
        Ok(self.lexmin(&problem)?.is_some())
    }

    fn solve_cluster(&self, cluster: &Cluster, mode: ProblemMode) -> PolyResult<Option<Vec<(usize, AffineExpr)>>> {
        let stmts = cluster.statements();
        let (layout, problem) = self.builder.cluster_problem(&self.views(&stmts), &self.band_deps(&stmts), mode)?;
        let Some(solution) = self.lexmin(&problem)? else {
            debug!("no hyperplane for cluster {:?}", stmts);
            return Ok(None);
        };
        Ok(Some(layout.blocks.iter().map(|b| (b.stmt, layout.row_of(b, &solution))).collect()))
    }

    /// Two clusters hold statements that no scalar row has separated yet.
    fn needs_cut(&self, partition: &[Cluster]) -> bool {
        let members: Vec<Vec<usize>> = partition.iter().map(Cluster::statements).collect();
        members.iter().enumerate().any(|(a, left)| {
            members[a + 1..].iter().any(|right| {
                left.iter()
                    .any(|&s| right.iter().any(|&t| self.cut_values[s] == self.cut_values[t]))
            })
        })
    }

    /// Close the current band and start a new one at the next row.
    fn end_band(&mut self) {
        let width = self.band_width();
        if width > 0 {
            debug!("band rows {}..{}", self.band_start, self.band_start + width);
            self.bands.push(Band::new(self.band_start, width));
        }
        self.band_start = self.n_rows();
        for state in &mut self.states {
            state.start_band();
        }
        self.builder.start_band(self.band_start);
    }

    fn break_band(&mut self) -> Step {
        if self.band_width() == 0 {
            return Step::Stuck;
        }
        self.end_band();
        self.stats.band_breaks += 1;
        Step::BandEnded
    }

    /// Update every dependence with row `row`; returns whether any pair got
    /// strictly ordered.
    fn advance_all(&mut self, row: usize) -> PolyResult<bool> {
        let mut carried = false;
        for (k, state) in self.states.iter_mut().enumerate() {
            let relation = &self.deps[k].relation;
            let diff = relation.difference(
                &self.stmts[state.src].schedule.outputs[row],
                &self.stmts[state.tgt].schedule.outputs[row],
            );
            match state.advance(row, &diff)? {
                RowEffect::Violated => {
                    return Err(PolySchedError::Internal(format!(
                        "row {} violates {}",
                        row,
                        self.deps[k].description()
                    )));
                }
                RowEffect::Carried => carried = true,
                RowEffect::Weak | RowEffect::Done => {}
            }
        }
        Ok(carried)
    }

    /// Scalar value of every statement on the next cut row. A delayed cut
    /// only tells apart runs of clusters with different loop depth, and
    /// falls back to one value per cluster once that separates nothing new.
    fn cut_values_for(&self, partition: &[Cluster]) -> Vec<i64> {
        let mut values = vec![0i64; self.stmts.len()];
        if self.options.cut == CutStrategy::Delayed {
            let mut group = 0i64;
            let mut last_depth = None;
            for cluster in partition {
                let stmts = cluster.statements();
                let depth = stmts.iter().map(|&s| self.stmts[s].depth()).max().unwrap_or(0);
                if matches!(last_depth, Some(d) if d != depth) {
                    group += 1;
                }
                last_depth = Some(depth);
                for s in stmts {
                    values[s] = group;
                }
            }
            if self.separates_new_pair(&values) {
                return values;
            }
        }
        for (pos, cluster) in partition.iter().enumerate() {
            for s in cluster.statements() {
                values[s] = pos as i64;
            }
        }
        values
    }

    fn separates_new_pair(&self, values: &[i64]) -> bool {
        let n = self.stmts.len();
        (0..n).any(|s| (s + 1..n).any(|t| self.cut_values[s] == self.cut_values[t] && values[s] != values[t]))
    }

    /// Index of the first open dependence that `rows` would reverse.
    fn first_violation(&self, rows: &[AffineExpr]) -> PolyResult<Option<usize>> {
        for (k, state) in self.states.iter().enumerate() {
            if state.is_satisfied() {
                continue;
            }
            let diff = self.deps[k].relation.difference(&rows[state.src], &rows[state.tgt]);
            if row_effect(&state.residual, &diff)? == RowEffect::Violated {
                return Ok(Some(k));
            }
        }
        Ok(None)
    }

    fn emit_cut(&mut self, partition: &[Cluster]) -> PolyResult<()> {
        self.end_band();
        let row = self.n_rows();
        let n_param = self.n_param;
        let values = self.cut_values_for(partition);
        for (s, stmt) in self.stmts.iter_mut().enumerate() {
            stmt.schedule.push_row(AffineExpr::constant(values[s], stmt.depth(), n_param));
            self.cut_values[s].push(values[s]);
        }
        self.row_kinds.push(RowKind::Scalar);
        self.advance_all(row)?;
        self.stats.cuts += 1;
        debug!("cut at row {}: {:?}", row, values);
        self.end_band();
        Ok(())
    }

    fn carries_any(&self, rows: &[AffineExpr]) -> PolyResult<bool> {
        for (k, state) in self.states.iter().enumerate() {
            if state.is_satisfied() {
                continue;
            }
            let diff = self.deps[k].relation.difference(&rows[state.src], &rows[state.tgt]);
            if row_effect(&state.residual, &diff)? == RowEffect::Carried {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn emit_hyperplanes(&mut self, rows: Vec<(usize, AffineExpr)>) -> PolyResult<Step> {
        let mut by_stmt: Vec<Option<AffineExpr>> = vec![None; self.stmts.len()];
        for (s, row) in rows {
            by_stmt[s] = Some(row);
        }
        let rows = by_stmt
            .into_iter()
            .zip(&self.stmts)
            .map(|(r, stmt)| r.ok_or_else(|| PolySchedError::Internal(format!("no row found for {}", stmt.id))))
            .collect::<PolyResult<Vec<_>>>()?;

        let gains_rank = self.stmts.iter().zip(&rows).any(|(stmt, row)| {
            let rank = iterator_rank(stmt.depth(), &stmt.schedule.outputs);
            if rank == stmt.depth() {
                return false;
            }
            let mut extended = stmt.schedule.outputs.clone();
            extended.push(row.clone());
            iterator_rank(stmt.depth(), &extended) > rank
        });
        if !gains_rank && !self.carries_any(&rows)? {
            debug!("row {} makes no progress", self.n_rows());
            return Ok(self.break_band());
        }

        let row = self.n_rows();
        for (stmt, r) in self.stmts.iter_mut().zip(rows) {
            trace!("{} row {}: {}", stmt.id, row, r.to_string_with_names(&stmt.iterator_names(), &[]));
            stmt.schedule.push_row(r);
        }
        self.row_kinds.push(RowKind::Hyperplane);
        self.advance_all(row)?;
        self.stats.hyperplanes += 1;
        Ok(Step::Hyperplane)
    }

    fn finish(mut self, program: &PolyProgram, dependences: MaterializeStats) -> PolyResult<Schedule> {
        let deps = self.deps;
        let ends: Vec<DepEnds<'a>> = deps
            .iter()
            .zip(&self.states)
            .map(|(d, s)| DepEnds { relation: &d.relation, src: s.src, tgt: s.tgt })
            .collect();
        if self.options.tile {
            tiling::tile_bands(&mut self.bands, &mut self.stmts, &ends, self.options)?;
        }

        let n_rows = self.n_rows();
        let relations: Vec<&DependenceRelation> = ends.iter().map(|e| e.relation).collect();
        let pairs: Vec<(usize, usize)> = ends.iter().map(|e| (e.src, e.tgt)).collect();
        let rows: Vec<&[AffineExpr]> = self.stmts.iter().map(|s| s.schedule.outputs.as_slice()).collect();
        let replay = satisfaction::replay(&relations, &pairs, &rows, n_rows)?;
        if self.options.verify && !replay.is_complete() {
            let what = match replay.violation {
                Some((k, r)) => format!("row {} violates {}", r, deps[k].description()),
                None => "a dependence is never fully ordered".to_string(),
            };
            return Err(ScheduleError::new(ScheduleErrorKind::VerificationFailed, what).into());
        }

        let parallel = (0..n_rows)
            .map(|r| self.options.parallel && self.row_kinds[r] == RowKind::Hyperplane && !replay.carried[r])
            .collect();
        let satisfaction = deps
            .iter()
            .zip(&replay.levels)
            .map(|(d, &level)| DepSatisfaction { source: d.source, target: d.target, kind: d.kind, level })
            .collect();
        let remapping = if self.options.remapping {
            Some(Remapping::build(&self.stmts, program.n_param())?)
        } else {
            None
        };

        self.stats.solver_calls = self.solver_calls.load(Ordering::Relaxed);
        self.stats.dependences = dependences;
        self.stats.elapsed = self.started.elapsed();
        info!(
            "schedule: {} rows ({} hyperplanes, {} cuts), {} bands, {} solver calls in {:?}",
            n_rows,
            self.stats.hyperplanes,
            self.stats.cuts,
            self.bands.len(),
            self.stats.solver_calls,
            self.stats.elapsed
        );

        Ok(Schedule {
            parameters: program.parameters.clone(),
            statements: self.stmts,
            row_kinds: self.row_kinds,
            parallel,
            bands: self.bands,
            satisfaction,
            remapping,
            stats: self.stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SolverKind;
    use crate::polyhedral::{Constraint, ConstraintSystem, IntegerSet, Space};
    use crate::utils::errors::{InputErrorKind, SolverErrorKind};

    /// `0 <= i_k <= N - 1` for every iterator.
    fn box_domain(depth: usize) -> IntegerSet {
        let mut sys = ConstraintSystem::new(depth, 1);
        for k in 0..depth {
            sys.add(Constraint::lower_bound(k, 0, depth, 1));
            let mut upper = AffineExpr::param(0, depth, 1) - AffineExpr::var(k, depth, 1);
            upper.constant = -1;
            sys.add(Constraint::ge_zero(upper));
        }
        IntegerSet::from_constraints(Space::set_with_params(depth, 1), sys)
    }

    fn program(depths: &[usize]) -> PolyProgram {
        let mut p = PolyProgram::new("test".to_string()).with_parameters(vec!["N".to_string()]);
        for (k, &d) in depths.iter().enumerate() {
            p.add_statement(PolyStmt::new(StmtId(k as u64), format!("S{}", k), box_domain(d)));
        }
        p
    }

    fn rows_of(schedule: &Schedule, id: u64) -> Vec<Vec<i64>> {
        schedule.rows(StmtId(id)).unwrap().iter().map(|r| r.to_row()).collect()
    }

    /// `S_src(i) -> S_tgt(N - 1 - i)` on 1-d statements.
    fn reversal(src: u64, tgt: u64) -> Dependence {
        let mut sys = ConstraintSystem::new(2, 1);
        // s + t - N + 1 = 0
        sys.add(Constraint::eq_zero(AffineExpr::from_row(&[1, 1, -1, 1], 2, 1)));
        Dependence::new(StmtId(src), StmtId(tgt), DependenceKind::Flow, DependenceRelation::new(1, 1, sys))
    }

    #[test]
    fn test_single_statement_identity() {
        let schedule = Scheduler::default().schedule(&program(&[2]), &[]).unwrap();
        assert_eq!(rows_of(&schedule, 0), vec![vec![1, 0, 0, 0], vec![0, 1, 0, 0]]);
        assert_eq!(schedule.parallel, vec![true, true]);
        assert_eq!(schedule.bands.len(), 1);
        assert_eq!(schedule.bands[0].tiling, TileKind::Rectangular);
        assert_eq!(schedule.stats.cuts, 0);
    }

    #[test]
    fn test_pairwise_infeasible_fusion_splits_to_singletons() {
        let deps = vec![reversal(0, 1), reversal(1, 2)];
        let options = SchedulerOptions::max_fuse().param_coeffs(false);
        let schedule = Scheduler::new(options).schedule(&program(&[1, 1, 1]), &deps).unwrap();
        assert_eq!(schedule.row_kinds, vec![RowKind::Scalar, RowKind::Hyperplane]);
        for id in 0..3u64 {
            assert_eq!(rows_of(&schedule, id), vec![vec![0, 0, id as i64], vec![1, 0, 0]]);
        }
        assert_eq!(schedule.stats.cluster_splits, 2);
        assert!(schedule.satisfaction.iter().all(|s| s.level == Some(0)));
    }

    #[test]
    fn test_contradictory_self_dependences_have_no_schedule() {
        let deps = vec![
            Dependence::uniform(StmtId(0), StmtId(0), DependenceKind::Flow, &[1], 1),
            Dependence::uniform(StmtId(0), StmtId(0), DependenceKind::Anti, &[-1], 1),
        ];
        let err = Scheduler::default().schedule(&program(&[1]), &deps).unwrap_err();
        match err {
            PolySchedError::Schedule(e) => assert_eq!(e.kind, ScheduleErrorKind::NoLegalSchedule),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_round_cap() {
        let options = SchedulerOptions::default().max_rounds(1);
        let err = Scheduler::new(options).schedule(&program(&[2]), &[]).unwrap_err();
        match err {
            PolySchedError::Schedule(e) => assert_eq!(e.kind, ScheduleErrorKind::IterationCapExceeded),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_zero_time_budget() {
        let options = SchedulerOptions::default().time_budget(Duration::ZERO);
        let err = Scheduler::new(options).schedule(&program(&[1]), &[]).unwrap_err();
        match err {
            PolySchedError::Schedule(e) => assert_eq!(e.kind, ScheduleErrorKind::TimeBudgetExceeded),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unlinked_backend_fails_before_scheduling() {
        let options = SchedulerOptions::default().solver(SolverKind::Gurobi);
        let err = Scheduler::new(options).schedule(&program(&[1]), &[]).unwrap_err();
        match err {
            PolySchedError::Solver(e) => assert_eq!(e.kind, SolverErrorKind::BackendUnavailable),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_invalid_options_rejected_before_scheduling() {
        for options in [SchedulerOptions::default().coeff_bound(0), SchedulerOptions::default().tile_size(-1)] {
            match Scheduler::new(options).schedule(&program(&[1]), &[]) {
                Err(PolySchedError::Input(e)) => assert_eq!(e.kind, InputErrorKind::InvalidOption),
                other => panic!("unexpected result {:?}", other),
            }
        }
    }

    #[test]
    fn test_identity_keeps_loop_order() {
        let deps: Vec<Dependence> = [[1, -1], [1, 0], [1, 1]]
            .iter()
            .map(|d| Dependence::uniform(StmtId(0), StmtId(0), DependenceKind::Flow, d, 1))
            .collect();
        let options = SchedulerOptions::default().identity(true);
        let schedule = Scheduler::new(options).schedule(&program(&[2]), &deps).unwrap();
        assert_eq!(rows_of(&schedule, 0), vec![vec![1, 0, 0, 0], vec![0, 1, 0, 0]]);
        assert_eq!(schedule.parallel, vec![false, true]);
        assert_eq!(schedule.bands.len(), 1);
        // [t, i] is not permutable under the (1, -1) dependence
        assert_eq!(schedule.bands[0].tiling, TileKind::None);
        assert_eq!(schedule.stats.solver_calls, 0);
    }

    #[test]
    fn test_identity_orders_statements_by_position() {
        let forward = vec![Dependence::uniform(StmtId(0), StmtId(1), DependenceKind::Flow, &[0], 1)];
        let options = SchedulerOptions::default().identity(true);
        let schedule = Scheduler::new(options.clone()).schedule(&program(&[1, 1]), &forward).unwrap();
        assert_eq!(schedule.row_kinds, vec![RowKind::Hyperplane, RowKind::Scalar]);
        assert_eq!(rows_of(&schedule, 0), vec![vec![1, 0, 0], vec![0, 0, 0]]);
        assert_eq!(rows_of(&schedule, 1), vec![vec![1, 0, 0], vec![0, 0, 1]]);

        let backward = vec![Dependence::uniform(StmtId(1), StmtId(0), DependenceKind::Flow, &[0], 1)];
        match Scheduler::new(options.clone()).schedule(&program(&[1, 1]), &backward) {
            Err(PolySchedError::Schedule(e)) => assert_eq!(e.kind, ScheduleErrorKind::NoLegalSchedule),
            other => panic!("unexpected result {:?}", other),
        }
        let reversed = vec![Dependence::uniform(StmtId(0), StmtId(0), DependenceKind::Flow, &[-1], 1)];
        assert!(Scheduler::new(options).schedule(&program(&[1]), &reversed).is_err());
    }

    #[test]
    fn test_delayed_cut_separates_depths_first() {
        // S0[i, j] -> S1[i, j] and S1[i, j] -> S2[i]
        let mut same = ConstraintSystem::new(4, 1);
        same.add(Constraint::eq_zero(AffineExpr::from_row(&[1, 0, -1, 0, 0, 0], 4, 1)));
        same.add(Constraint::eq_zero(AffineExpr::from_row(&[0, 1, 0, -1, 0, 0], 4, 1)));
        let mut outer = ConstraintSystem::new(3, 1);
        outer.add(Constraint::eq_zero(AffineExpr::from_row(&[1, 0, -1, 0, 0], 3, 1)));
        let deps = vec![
            Dependence::new(StmtId(0), StmtId(1), DependenceKind::Flow, DependenceRelation::new(2, 2, same)),
            Dependence::new(StmtId(1), StmtId(2), DependenceKind::Flow, DependenceRelation::new(2, 1, outer)),
        ];
        let p = program(&[2, 2, 1]);
        let cut_value = |schedule: &Schedule, id: u64, row: usize| rows_of(schedule, id)[row].last().copied();

        let eager = Scheduler::new(SchedulerOptions::no_fuse()).schedule(&p, &deps).unwrap();
        assert_eq!(eager.stats.cuts, 1);
        assert_eq!((0..3).map(|id| cut_value(&eager, id, 0)).collect::<Vec<_>>(), vec![Some(0), Some(1), Some(2)]);

        let options = SchedulerOptions::no_fuse().cut(CutStrategy::Delayed);
        let delayed = Scheduler::new(options).schedule(&p, &deps).unwrap();
        assert_eq!(delayed.stats.cuts, 2);
        assert_eq!(delayed.row_kinds[..2], [RowKind::Scalar, RowKind::Scalar]);
        assert_eq!((0..3).map(|id| cut_value(&delayed, id, 0)).collect::<Vec<_>>(), vec![Some(0), Some(0), Some(1)]);
        assert_eq!((0..3).map(|id| cut_value(&delayed, id, 1)).collect::<Vec<_>>(), vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_parallel_solve_matches_sequential() {
        let deps = vec![Dependence::uniform(StmtId(0), StmtId(1), DependenceKind::Flow, &[1, 0], 1)];
        let p = program(&[2, 2]);
        let seq = Scheduler::new(SchedulerOptions::no_fuse()).schedule(&p, &deps).unwrap();
        let par = Scheduler::new(SchedulerOptions::no_fuse().parallel_solve(true)).schedule(&p, &deps).unwrap();
        for id in 0..2 {
            assert_eq!(rows_of(&seq, id), rows_of(&par, id));
        }
    }
}
