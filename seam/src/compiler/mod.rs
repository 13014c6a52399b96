pub mod anchors;

use crate::cfg::{SmplCfg, TagLabel};
use crate::ctl::formula::{BranchKind, BranchPattern, Formula, StatementPattern, optimize};
use crate::error::SeamError;
use crate::metavar::MetavarTable;
use crate::operations::{
    AnchoredOperations, BlockType, InsertAnchor, METHOD_BODY_ANCHOR, Operation,
};
use crate::pattern::{expr_metavar_refs, metavar_refs};
use crate::smpl::{
    DOTS_MARKER, EXPRESSION_MATCH_MARKER, WHEN_ANY, WHEN_EXISTS, WHEN_NOT_EQUAL,
};
use seam_java::{Expr, NodeId, NodeKind, Stmt};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Compile the deletions-view CFG into a CTL-VW formula, attaching the
/// anchored edit operations to the atoms they belong to. The operations map
/// is consumed: each anchored list is emitted into exactly one operations
/// slot, and whatever queues up before the first anchorable atom (the
/// method-body anchor entry) rides the first slot emitted.
pub fn compile_formula(
    cfg: &SmplCfg,
    metavars: &MetavarTable,
    mut ops: AnchoredOperations,
) -> Result<Formula, SeamError> {
    let queued = ops.take(METHOD_BODY_ANCHOR);
    let mut compiler = FormulaCompiler {
        cfg,
        metavars,
        ops,
        queued,
    };
    let entry = cfg.entry()?;
    let mut path = HashSet::new();
    let compiled = compiler.compile_node(entry, &mut path, &BTreeSet::new())?;

    // an empty match context matches nothing
    let mut formula = compiled.unwrap_or_else(|| Formula::not(Formula::True));
    if !compiler.queued.is_empty() {
        // no atom was emitted to carry these; attach them at the root
        formula = Formula::and(
            formula,
            Formula::operations_slot(std::mem::take(&mut compiler.queued)),
        );
    }
    if !compiler.ops.is_empty() {
        warn!(
            remaining = compiler.ops.total_operations(),
            "anchored operations left unconsumed by the formula compiler"
        );
    }
    let formula = optimize(formula);
    debug!(formula = %formula, "compiled formula");
    Ok(formula)
}

struct FormulaCompiler<'a> {
    cfg: &'a SmplCfg,
    metavars: &'a MetavarTable,
    ops: AnchoredOperations,
    /// operations waiting for the next emitted slot
    queued: Vec<Operation>,
}

/// Constraints parsed off a dots marker call
#[derive(Default)]
struct DotsSpec {
    not_equals: Vec<Expr>,
    exists: bool,
}

impl<'a> FormulaCompiler<'a> {
    fn compile_node(
        &mut self,
        id: NodeId,
        path: &mut HashSet<NodeId>,
        quantified: &BTreeSet<String>,
    ) -> Result<Option<Formula>, SeamError> {
        if path.contains(&id) {
            // a loop back edge; the walk stops here
            return Ok(None);
        }
        match self.cfg.node(id).kind {
            NodeKind::Exit => Ok(None),
            NodeKind::Statement => self.compile_statement(id, path, quantified),
            NodeKind::Branch => self.compile_branch(id, path, quantified),
            NodeKind::BlockBegin => self.compile_block_begin(id, path, quantified),
            NodeKind::Converge => self.compile_converge(id, path, quantified),
            NodeKind::Begin | NodeKind::BlockEnd => Err(SeamError::UnexpectedNode(id)),
        }
    }

    fn sole_successor(&self, id: NodeId) -> Result<NodeId, SeamError> {
        self.cfg
            .successors(id)
            .first()
            .copied()
            .ok_or(SeamError::MissingSuccessor(id))
    }

    fn compile_statement(
        &mut self,
        id: NodeId,
        path: &mut HashSet<NodeId>,
        quantified: &BTreeSet<String>,
    ) -> Result<Option<Formula>, SeamError> {
        let node = self.cfg.node(id);
        let stmt = node
            .stmt
            .clone()
            .ok_or(SeamError::UnexpectedNode(id))?;
        let next = self.sole_successor(id)?;

        if stmt.bare_call_name() == Some(DOTS_MARKER) {
            return self.compile_dots(id, &stmt, next, path, quantified);
        }

        // unwrap the expression-match marker into a plain expression pattern
        let pattern_stmt = match stmt.bare_call_name() {
            Some(EXPRESSION_MATCH_MARKER) => {
                let args = stmt.bare_call_args().unwrap_or_default();
                match args {
                    [expr] => Stmt::Expr {
                        expr: expr.clone(),
                        line: stmt.line(),
                    },
                    _ => return Err(SeamError::UnexpectedNode(id)),
                }
            }
            _ => stmt.clone(),
        };

        let refs = metavar_refs(&pattern_stmt, self.metavars);
        let used: Vec<String> = refs
            .iter()
            .filter(|r| !quantified.contains(*r))
            .cloned()
            .collect();
        let mut inner_quantified = quantified.clone();
        inner_quantified.extend(used.iter().cloned());

        let line = stmt.line();
        let mut slot_ops = std::mem::take(&mut self.queued);
        slot_ops.extend(self.ops.take(line));

        let atom = Formula::Statement(StatementPattern {
            stmt: pattern_stmt,
            metavars: refs,
        });
        let mut f = if slot_ops.is_empty() {
            atom
        } else {
            Formula::and(atom, Formula::operations_slot(slot_ops))
        };

        path.insert(id);
        let inner = self.compile_node(next, path, &inner_quantified)?;
        path.remove(&id);
        if let Some(inner) = inner {
            f = Formula::and(f, Formula::all_next(inner));
        }
        Ok(Some(quantify(f, &used)))
    }

    fn compile_dots(
        &mut self,
        id: NodeId,
        stmt: &Stmt,
        next: NodeId,
        path: &mut HashSet<NodeId>,
        quantified: &BTreeSet<String>,
    ) -> Result<Option<Formula>, SeamError> {
        let spec = dots_spec(stmt)?;
        let mut used: Vec<String> = Vec::new();
        for e in &spec.not_equals {
            for r in expr_metavar_refs(e, self.metavars) {
                if !quantified.contains(&r) && !used.contains(&r) {
                    used.push(r);
                }
            }
        }
        used.sort_unstable();
        let mut inner_quantified = quantified.clone();
        inner_quantified.extend(used.iter().cloned());

        path.insert(id);
        let inner = self.compile_node(next, path, &inner_quantified)?;
        path.remove(&id);

        let Some(inner) = inner else {
            // dots with nothing behind them constrain nothing
            return Ok(Some(Formula::True));
        };

        let mut guard = Formula::True;
        for e in &spec.not_equals {
            let refs = expr_metavar_refs(e, self.metavars);
            let atom = Formula::Statement(StatementPattern {
                stmt: Stmt::Expr {
                    expr: e.clone(),
                    line: stmt.line(),
                },
                metavars: refs,
            });
            guard = Formula::and(guard, Formula::not(atom));
        }
        let f = if spec.exists {
            Formula::exists_until(guard, inner)
        } else {
            Formula::all_until(guard, inner)
        };
        Ok(Some(quantify(f, &used)))
    }

    fn compile_branch(
        &mut self,
        id: NodeId,
        path: &mut HashSet<NodeId>,
        quantified: &BTreeSet<String>,
    ) -> Result<Option<Formula>, SeamError> {
        let node = self.cfg.node(id);
        let stmt = node
            .stmt
            .clone()
            .ok_or(SeamError::MalformedBranch(id))?;
        let succs = self.cfg.successors(id);
        if succs.len() != 2 {
            return Err(SeamError::MalformedBranch(id));
        }
        let (cond, kind) = match &stmt {
            Stmt::If { cond, .. } => (cond.clone(), BranchKind::If),
            Stmt::While { cond, .. } => (cond.clone(), BranchKind::While),
            _ => return Err(SeamError::MalformedBranch(id)),
        };

        let refs = expr_metavar_refs(&cond, self.metavars);
        let used: Vec<String> = refs
            .iter()
            .filter(|r| !quantified.contains(*r))
            .cloned()
            .collect();
        let mut inner_quantified = quantified.clone();
        inner_quantified.extend(used.iter().cloned());

        let line = stmt.line();
        let mut slot_ops = std::mem::take(&mut self.queued);
        slot_ops.extend(
            self.ops
                .take_where(line, |op| !matches!(op, Operation::InsertIntoBlock { .. })),
        );

        let atom = Formula::Branch(BranchPattern {
            cond,
            kind,
            metavars: refs,
        });
        let mut f = if slot_ops.is_empty() {
            atom
        } else {
            Formula::and(atom, Formula::operations_slot(slot_ops))
        };

        path.insert(id);
        let lhs = self.compile_node(succs[0], path, &inner_quantified)?;
        let rhs = self.compile_node(succs[1], path, &inner_quantified)?;
        path.remove(&id);
        let inner = match (lhs, rhs) {
            (Some(a), Some(b)) => Some(Formula::or(a, b)),
            (Some(a), None) | (None, Some(a)) => Some(a),
            (None, None) => None,
        };
        if let Some(inner) = inner {
            f = Formula::and(f, Formula::all_next(inner));
        }
        Ok(Some(quantify(f, &used)))
    }

    fn compile_block_begin(
        &mut self,
        id: NodeId,
        path: &mut HashSet<NodeId>,
        quantified: &BTreeSet<String>,
    ) -> Result<Option<Formula>, SeamError> {
        let tag = self
            .cfg
            .tag(id)
            .cloned()
            .ok_or(SeamError::UnexpectedNode(id))?;
        let block_type = match tag.label {
            TagLabel::TrueBranch => BlockType::TrueBranch,
            TagLabel::FalseBranch => BlockType::FalseBranch,
            _ => return Err(SeamError::UnexpectedNode(id)),
        };
        let anchor_line = tag.anchor.line();
        let next = self.sole_successor(id)?;

        let mut top_ops = std::mem::take(&mut self.queued);
        top_ops.extend(self.ops.take_where(anchor_line, |op| {
            matches!(
                op,
                Operation::InsertIntoBlock { block, anchor: InsertAnchor::Top, .. }
                    if *block == block_type
            )
        }));

        let mut f = Formula::Proposition(tag.label);
        if !top_ops.is_empty() {
            f = Formula::and(f, Formula::operations_slot(top_ops));
        }

        path.insert(id);
        let inner = self.compile_node(next, path, quantified)?;
        path.remove(&id);
        if let Some(inner) = inner {
            f = Formula::and(f, Formula::all_next(inner));
        }

        let bottom_ops = self.ops.take_where(anchor_line, |op| {
            matches!(
                op,
                Operation::InsertIntoBlock { block, anchor: InsertAnchor::Bottom, .. }
                    if *block == block_type
            )
        });
        if !bottom_ops.is_empty() {
            f = Formula::and(f, Formula::operations_slot(bottom_ops));
        }
        Ok(Some(f))
    }

    fn compile_converge(
        &mut self,
        id: NodeId,
        path: &mut HashSet<NodeId>,
        quantified: &BTreeSet<String>,
    ) -> Result<Option<Formula>, SeamError> {
        let next = self.sole_successor(id)?;
        let mut f = Formula::Proposition(TagLabel::After);
        let slot_ops = std::mem::take(&mut self.queued);
        if !slot_ops.is_empty() {
            f = Formula::and(f, Formula::operations_slot(slot_ops));
        }
        path.insert(id);
        let inner = self.compile_node(next, path, quantified)?;
        path.remove(&id);
        if let Some(inner) = inner {
            f = Formula::and(f, Formula::all_next(inner));
        }
        Ok(Some(f))
    }
}

/// Wrap `f` in `ExistsVar` binders for the newly used metavariables, in
/// reverse sort order so the formula reads in sorted order outside-in
fn quantify(mut f: Formula, used: &[String]) -> Formula {
    let mut sorted: Vec<&String> = used.iter().collect();
    sorted.sort_unstable();
    for v in sorted.into_iter().rev() {
        f = Formula::exists_var(v.clone(), f);
    }
    f
}

fn dots_spec(stmt: &Stmt) -> Result<DotsSpec, SeamError> {
    let mut spec = DotsSpec::default();
    for arg in stmt.bare_call_args().unwrap_or_default() {
        match arg {
            Expr::Call {
                receiver: None,
                name,
                args,
            } => match (name.as_str(), args.as_slice()) {
                (WHEN_NOT_EQUAL, [e]) => spec.not_equals.push(e.clone()),
                (WHEN_ANY, []) => {
                    // `when any` lifts the shortest-path restriction, which
                    // this compiler does not separately encode
                }
                (WHEN_EXISTS, []) => spec.exists = true,
                _ => return Err(SeamError::UnknownDotsConstraint(arg.to_string())),
            },
            _ => return Err(SeamError::UnknownDotsConstraint(arg.to_string())),
        }
    }
    Ok(spec)
}
