use crate::cfg::TagLabel;
use crate::ctl::env::BindingValue;
use crate::operations::Operation;
use seam_java::{Expr, Stmt};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Reserved environment variable carrying the edit-operation payload of one
/// operations slot
pub const OPERATIONS_VAR: &str = "_v";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BranchKind {
    If,
    While,
}

/// A statement atom: matches CFG statement states whose statement unifies
/// with `stmt` under the rule's metavariable constraints
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StatementPattern {
    pub stmt: Stmt,
    /// Metavariables referenced by the pattern, sorted
    pub metavars: Vec<String>,
}

/// A branch atom: matches CFG branch states of the given kind whose
/// condition unifies with `cond`
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BranchPattern {
    pub cond: Expr,
    pub kind: BranchKind,
    pub metavars: Vec<String>,
}

/// CTL-VW: computation tree logic over CFG states, extended with
/// metavariable quantification (`ExistsVar`), environment injection
/// (`SetEnv`) and witness collection. A closed sum type so the optimiser
/// and the model checker match exhaustively.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Formula {
    True,
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    AllNext(Box<Formula>),
    ExistsNext(Box<Formula>),
    AllUntil(Box<Formula>, Box<Formula>),
    ExistsUntil(Box<Formula>, Box<Formula>),
    /// Quantify a metavariable over the sub-formula; satisfying bindings
    /// surface as witnesses
    ExistsVar(String, Box<Formula>),
    /// Unconditionally bind a variable to a literal value
    SetEnv(String, BindingValue),
    Proposition(TagLabel),
    Statement(StatementPattern),
    Branch(BranchPattern),
}

impl Formula {
    pub fn not(inner: Formula) -> Formula {
        Formula::Not(Box::new(inner))
    }

    pub fn and(lhs: Formula, rhs: Formula) -> Formula {
        Formula::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Formula, rhs: Formula) -> Formula {
        Formula::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn all_next(inner: Formula) -> Formula {
        Formula::AllNext(Box::new(inner))
    }

    pub fn exists_next(inner: Formula) -> Formula {
        Formula::ExistsNext(Box::new(inner))
    }

    pub fn all_until(lhs: Formula, rhs: Formula) -> Formula {
        Formula::AllUntil(Box::new(lhs), Box::new(rhs))
    }

    pub fn exists_until(lhs: Formula, rhs: Formula) -> Formula {
        Formula::ExistsUntil(Box::new(lhs), Box::new(rhs))
    }

    pub fn exists_var<T: Into<String>>(name: T, inner: Formula) -> Formula {
        Formula::ExistsVar(name.into(), Box::new(inner))
    }

    /// The operations slot carrying `ops`:
    /// `ExistsVar("_v", SetEnv("_v", ops))`
    pub fn operations_slot(ops: Vec<Operation>) -> Formula {
        Formula::exists_var(
            OPERATIONS_VAR,
            Formula::SetEnv(OPERATIONS_VAR.to_string(), BindingValue::Ops(ops)),
        )
    }

    /// Whether this formula is an operations slot with an empty payload
    fn is_empty_slot(&self) -> bool {
        match self {
            Formula::ExistsVar(v, inner) if v == OPERATIONS_VAR => matches!(
                inner.as_ref(),
                Formula::SetEnv(v2, BindingValue::Ops(ops)) if v2 == OPERATIONS_VAR && ops.is_empty()
            ),
            _ => false,
        }
    }

    /// All operation payloads embedded in the formula, in syntactic order
    pub fn embedded_operations(&self) -> Vec<&[Operation]> {
        let mut out = Vec::new();
        self.visit(&mut |f| {
            if let Formula::SetEnv(_, BindingValue::Ops(ops)) = f {
                out.push(ops.as_slice());
            }
        });
        out
    }

    /// Pre-order traversal over every sub-formula
    pub fn visit<'a, F: FnMut(&'a Formula)>(&'a self, f: &mut F) {
        f(self);
        match self {
            Formula::True | Formula::SetEnv(..) | Formula::Proposition(_) => {}
            Formula::Statement(_) | Formula::Branch(_) => {}
            Formula::Not(a) | Formula::AllNext(a) | Formula::ExistsNext(a) => a.visit(f),
            Formula::ExistsVar(_, a) => a.visit(f),
            Formula::And(a, b)
            | Formula::Or(a, b)
            | Formula::AllUntil(a, b)
            | Formula::ExistsUntil(a, b) => {
                a.visit(f);
                b.visit(f);
            }
        }
    }
}

/// Eliminate empty operations slots: `And(L, ExistsVar("_v", SetEnv("_v",
/// [])))` rewrites to `L`. Applied bottom-up, so the result is a fixed point
/// of the rewrite; running the optimiser on its own output is the identity.
pub fn optimize(formula: Formula) -> Formula {
    match formula {
        Formula::And(lhs, rhs) => {
            let lhs = optimize(*lhs);
            let rhs = optimize(*rhs);
            if rhs.is_empty_slot() {
                lhs
            } else {
                Formula::and(lhs, rhs)
            }
        }
        Formula::Or(lhs, rhs) => Formula::or(optimize(*lhs), optimize(*rhs)),
        Formula::Not(a) => Formula::not(optimize(*a)),
        Formula::AllNext(a) => Formula::all_next(optimize(*a)),
        Formula::ExistsNext(a) => Formula::exists_next(optimize(*a)),
        Formula::AllUntil(a, b) => Formula::all_until(optimize(*a), optimize(*b)),
        Formula::ExistsUntil(a, b) => Formula::exists_until(optimize(*a), optimize(*b)),
        Formula::ExistsVar(v, a) => Formula::exists_var(v, optimize(*a)),
        leaf => leaf,
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Formula::True => write!(f, "T"),
            Formula::Not(a) => write!(f, "!({a})"),
            Formula::And(a, b) => write!(f, "({a} & {b})"),
            Formula::Or(a, b) => write!(f, "({a} | {b})"),
            Formula::AllNext(a) => write!(f, "AX({a})"),
            Formula::ExistsNext(a) => write!(f, "EX({a})"),
            Formula::AllUntil(a, b) => write!(f, "AU({a}, {b})"),
            Formula::ExistsUntil(a, b) => write!(f, "EU({a}, {b})"),
            Formula::ExistsVar(v, a) => write!(f, "E({v}, {a})"),
            Formula::SetEnv(v, val) => write!(f, "set({v}, {val})"),
            Formula::Proposition(label) => write!(f, "{label}"),
            Formula::Statement(p) => write!(f, "stmt<{}>", p.stmt),
            Formula::Branch(p) => write!(f, "branch<{}>", p.cond),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimizer_drops_empty_slots() {
        let atom = Formula::Proposition(TagLabel::After);
        let with_slot = Formula::and(atom.clone(), Formula::operations_slot(vec![]));
        assert_eq!(optimize(with_slot), atom);
    }

    #[test]
    fn optimizer_keeps_loaded_slots() {
        let atom = Formula::Proposition(TagLabel::After);
        let with_slot = Formula::and(
            atom.clone(),
            Formula::operations_slot(vec![Operation::Delete]),
        );
        assert_eq!(optimize(with_slot.clone()), with_slot);
    }

    #[test]
    fn optimizer_is_idempotent() {
        let f = Formula::all_until(
            Formula::True,
            Formula::and(
                Formula::Proposition(TagLabel::After),
                Formula::operations_slot(vec![]),
            ),
        );
        let once = optimize(f);
        let twice = optimize(once.clone());
        assert_eq!(once, twice);
    }
}
