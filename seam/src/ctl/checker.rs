use crate::cfg::SmplCfg;
use crate::ctl::env::{Binding, Environment};
use crate::ctl::formula::{BranchKind, BranchPattern, Formula, StatementPattern};
use crate::ctl::witness::Witness;
use crate::metavar::{MetavarTable, TypeContext};
use crate::pattern::Matcher;
use itertools::Itertools;
use seam_java::{NodeId, NodeKind, Stmt};
use std::collections::BTreeMap;
use tracing::trace;

/// One satisfying assignment: the formula holds at `state` under `env`,
/// proven by `witnesses`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultRow {
    pub state: NodeId,
    pub env: Environment,
    pub witnesses: Vec<Witness>,
}

impl ResultRow {
    fn plain(state: NodeId) -> Self {
        Self {
            state,
            env: Environment::new(),
            witnesses: Vec::new(),
        }
    }
}

/// Evaluates CTL-VW formulas against the adapted CFG of one target method.
/// Boolean connectives follow standard CTL fixpoint semantics over the
/// finite state space; the variable/witness extensions thread binding
/// environments through every operation and materialize witnesses at each
/// `ExistsVar`. `AllNext` requires at least one successor.
pub struct ModelChecker<'a> {
    model: &'a SmplCfg,
    matcher: Matcher<'a>,
}

impl<'a> ModelChecker<'a> {
    pub fn new(model: &'a SmplCfg, metavars: &'a MetavarTable, types: &'a TypeContext) -> Self {
        Self {
            model,
            matcher: Matcher::new(metavars, types),
        }
    }

    /// All states satisfying `formula`, sorted by state id
    pub fn check(&self, formula: &Formula) -> Vec<ResultRow> {
        let mut rows = self.sat(formula);
        rows.sort_by_key(|r| r.state);
        trace!(rows = rows.len(), "model check complete");
        rows
    }

    fn sat(&self, formula: &Formula) -> Vec<ResultRow> {
        match formula {
            Formula::True => self.model.states().map(ResultRow::plain).collect(),
            Formula::Proposition(label) => self
                .model
                .states()
                .filter(|s| self.model.tag(*s).map(|t| t.label) == Some(*label))
                .map(ResultRow::plain)
                .collect(),
            Formula::Statement(pattern) => self.sat_statement(pattern),
            Formula::Branch(pattern) => self.sat_branch(pattern),
            Formula::Not(inner) => self.negate(self.sat(inner)),
            Formula::And(a, b) => join(&self.sat(a), &self.sat(b)),
            Formula::Or(a, b) => {
                let mut rows = self.sat(a);
                for r in self.sat(b) {
                    push_unique(&mut rows, r);
                }
                rows
            }
            Formula::AllNext(inner) => self.pre_all(&self.sat(inner)),
            Formula::ExistsNext(inner) => self.pre_exists(&self.sat(inner)),
            Formula::AllUntil(lhs, rhs) => self.until(&self.sat(lhs), self.sat(rhs), true),
            Formula::ExistsUntil(lhs, rhs) => self.until(&self.sat(lhs), self.sat(rhs), false),
            Formula::ExistsVar(name, inner) => self.quantify(name, self.sat(inner)),
            Formula::SetEnv(name, value) => self
                .model
                .states()
                .map(|s| {
                    let mut env = Environment::new();
                    env.bind(name, value.clone());
                    ResultRow {
                        state: s,
                        env,
                        witnesses: Vec::new(),
                    }
                })
                .collect(),
        }
    }

    fn sat_statement(&self, pattern: &StatementPattern) -> Vec<ResultRow> {
        let mut rows = Vec::new();
        for s in self.model.states() {
            let node = self.model.node(s);
            if node.kind != NodeKind::Statement {
                continue;
            }
            let Some(stmt) = &node.stmt else { continue };
            if let Some(env) = self.matcher.match_stmt(&pattern.stmt, stmt) {
                rows.push(ResultRow {
                    state: s,
                    env,
                    witnesses: Vec::new(),
                });
            }
        }
        rows
    }

    fn sat_branch(&self, pattern: &BranchPattern) -> Vec<ResultRow> {
        let mut rows = Vec::new();
        for s in self.model.states() {
            let node = self.model.node(s);
            if node.kind != NodeKind::Branch {
                continue;
            }
            let (cond, kind) = match &node.stmt {
                Some(Stmt::If { cond, .. }) => (cond, BranchKind::If),
                Some(Stmt::While { cond, .. }) => (cond, BranchKind::While),
                _ => continue,
            };
            if kind != pattern.kind {
                continue;
            }
            if let Some(env) = self.matcher.match_cond(&pattern.cond, cond) {
                rows.push(ResultRow {
                    state: s,
                    env,
                    witnesses: Vec::new(),
                });
            }
        }
        rows
    }

    /// Complement a result set. States absent from the input satisfy the
    /// negation outright; states present satisfy it under the negation of
    /// each of their environments, which is where negative bindings come
    /// from. Witnesses do not survive negation.
    fn negate(&self, rows: Vec<ResultRow>) -> Vec<ResultRow> {
        let mut by_state: BTreeMap<NodeId, Vec<Environment>> = BTreeMap::new();
        for row in rows {
            by_state.entry(row.state).or_default().push(row.env);
        }
        let mut out = Vec::new();
        for s in self.model.states() {
            match by_state.get(&s) {
                None => out.push(ResultRow::plain(s)),
                Some(envs) => {
                    if envs.iter().any(Environment::is_empty) {
                        // satisfied unconditionally; the negation fails
                        continue;
                    }
                    // conjunction over rows of the disjunction of
                    // single-binding negations
                    let mut partial = vec![Environment::new()];
                    for env in envs {
                        let negs = env.negations();
                        let mut next = Vec::new();
                        for p in &partial {
                            for n in &negs {
                                if let Some(u) = p.compatible_union(n) {
                                    if !next.contains(&u) {
                                        next.push(u);
                                    }
                                }
                            }
                        }
                        partial = next;
                        if partial.is_empty() {
                            break;
                        }
                    }
                    for env in partial {
                        push_unique(
                            &mut out,
                            ResultRow {
                                state: s,
                                env,
                                witnesses: Vec::new(),
                            },
                        );
                    }
                }
            }
        }
        out
    }

    /// Predecessors of satisfying states (pre-image under one transition)
    fn pre_exists(&self, rows: &[ResultRow]) -> Vec<ResultRow> {
        let mut out = Vec::new();
        for row in rows {
            for p in self.model.predecessors(row.state) {
                push_unique(
                    &mut out,
                    ResultRow {
                        state: p,
                        env: row.env.clone(),
                        witnesses: row.witnesses.clone(),
                    },
                );
            }
        }
        out
    }

    /// States all of whose successors satisfy the input with pairwise
    /// compatible environments; requires at least one successor
    fn pre_all(&self, rows: &[ResultRow]) -> Vec<ResultRow> {
        let mut by_state: BTreeMap<NodeId, Vec<&ResultRow>> = BTreeMap::new();
        for row in rows {
            by_state.entry(row.state).or_default().push(row);
        }
        let mut out = Vec::new();
        for s in self.model.states() {
            let succs = self.model.successors(s);
            if succs.is_empty() {
                continue;
            }
            let Some(choices) = succs
                .iter()
                .map(|t| by_state.get(t).cloned())
                .collect::<Option<Vec<_>>>()
            else {
                continue;
            };
            for combo in choices.into_iter().multi_cartesian_product() {
                let mut env = Environment::new();
                let mut witnesses = Vec::new();
                let mut ok = true;
                for row in combo {
                    match env.compatible_union(&row.env) {
                        Some(u) => {
                            env = u;
                            witnesses.extend(row.witnesses.iter().cloned());
                        }
                        None => {
                            ok = false;
                            break;
                        }
                    }
                }
                if ok {
                    push_unique(
                        &mut out,
                        ResultRow {
                            state: s,
                            env,
                            witnesses,
                        },
                    );
                }
            }
        }
        out
    }

    /// Least fixpoint of `rhs or (lhs and pre(X))`
    fn until(&self, lhs: &[ResultRow], rhs: Vec<ResultRow>, universal: bool) -> Vec<ResultRow> {
        let mut x = Vec::new();
        for r in rhs {
            push_unique(&mut x, r);
        }
        loop {
            let pre = if universal {
                self.pre_all(&x)
            } else {
                self.pre_exists(&x)
            };
            let step = join(lhs, &pre);
            let mut changed = false;
            for r in step {
                if !x.contains(&r) {
                    x.push(r);
                    changed = true;
                }
            }
            if !changed {
                return x;
            }
        }
    }

    /// Close the scope of one quantified variable: strip its binding from
    /// each row and record a witness for positively bound rows
    fn quantify(&self, name: &str, rows: Vec<ResultRow>) -> Vec<ResultRow> {
        let mut out = Vec::new();
        for mut row in rows {
            match row.env.remove(name) {
                Some(Binding::Bound(value)) => {
                    let w = Witness::new(
                        row.state,
                        name.to_string(),
                        value,
                        std::mem::take(&mut row.witnesses),
                    );
                    row.witnesses = vec![w];
                }
                Some(Binding::Forbidden(_)) | None => {}
            }
            push_unique(&mut out, row);
        }
        out
    }
}

/// Join two result sets on state with compatible environments
fn join(a: &[ResultRow], b: &[ResultRow]) -> Vec<ResultRow> {
    let mut out = Vec::new();
    for ra in a {
        for rb in b.iter().filter(|r| r.state == ra.state) {
            if let Some(env) = ra.env.compatible_union(&rb.env) {
                let mut witnesses = ra.witnesses.clone();
                witnesses.extend(rb.witnesses.iter().cloned());
                push_unique(
                    &mut out,
                    ResultRow {
                        state: ra.state,
                        env,
                        witnesses,
                    },
                );
            }
        }
    }
    out
}

fn push_unique(rows: &mut Vec<ResultRow>, row: ResultRow) {
    if !rows.contains(&row) {
        rows.push(row);
    }
}
