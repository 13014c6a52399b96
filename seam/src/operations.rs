use seam_java::{Method, Stmt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Anchor value standing in for the method body itself; real statement
/// anchors are 1-based source lines, so zero is free to take
pub const METHOD_BODY_ANCHOR: usize = 0;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    MethodBody,
    TrueBranch,
    FalseBranch,
}

/// Whether a block-edge insertion goes at the top or the bottom of the block
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum InsertAnchor {
    Top,
    Bottom,
}

/// A code edit to perform at a matched location. Operations ride inside
/// formulas as environment payloads and surface to callers through the
/// witnesses of a successful match.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Remove the matched statement
    Delete,
    /// Insert a statement immediately before the matched statement
    Prepend(Stmt),
    /// Insert a statement immediately after the matched statement
    Append(Stmt),
    /// Replace the matched statement
    Replace(Stmt),
    /// Insert a statement at a block edge of the matched branch or method
    InsertIntoBlock {
        block: BlockType,
        anchor: InsertAnchor,
        stmt: Stmt,
    },
    /// Replace the matched method's header with the given method's header
    MethodHeaderReplace(Method),
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Delete => write!(f, "delete"),
            Operation::Prepend(s) => write!(f, "prepend {s}"),
            Operation::Append(s) => write!(f, "append {s}"),
            Operation::Replace(s) => write!(f, "replace with {s}"),
            Operation::InsertIntoBlock {
                block,
                anchor,
                stmt,
            } => {
                write!(f, "insert {stmt} at {anchor:?} of {block:?}")
            }
            Operation::MethodHeaderReplace(m) => {
                write!(f, "replace method header with {} {}(...)", m.ret, m.name)
            }
        }
    }
}

/// Edit operations keyed by the source line they anchor to (or
/// [`METHOD_BODY_ANCHOR`]). Insertion order within one anchor is the order
/// the edits must be applied in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchoredOperations {
    map: BTreeMap<usize, Vec<Operation>>,
}

impl AnchoredOperations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, anchor: usize, op: Operation) {
        self.map.entry(anchor).or_default().push(op);
    }

    pub fn get(&self, anchor: usize) -> Option<&[Operation]> {
        self.map.get(&anchor).map(|v| v.as_slice())
    }

    /// Remove and return all operations anchored at `anchor`
    pub fn take(&mut self, anchor: usize) -> Vec<Operation> {
        self.map.remove(&anchor).unwrap_or_default()
    }

    /// Remove and return the operations at `anchor` satisfying `pred`,
    /// preserving their relative order and leaving the rest in place
    pub fn take_where<F: Fn(&Operation) -> bool>(
        &mut self,
        anchor: usize,
        pred: F,
    ) -> Vec<Operation> {
        let mut taken = Vec::new();
        let mut now_empty = false;
        if let Some(ops) = self.map.get_mut(&anchor) {
            let mut kept = Vec::new();
            for op in ops.drain(..) {
                if pred(&op) {
                    taken.push(op);
                } else {
                    kept.push(op);
                }
            }
            now_empty = kept.is_empty();
            *ops = kept;
        }
        if now_empty {
            self.map.remove(&anchor);
        }
        taken
    }

    pub fn anchors(&self) -> impl Iterator<Item = usize> + '_ {
        self.map.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[Operation])> {
        self.map.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn total_operations(&self) -> usize {
        self.map.values().map(Vec::len).sum()
    }

    /// Collapse `{Delete, Append(x)}` / `{Delete, Prepend(x)}` pairs (in
    /// either order) into a single `Replace(x)` at the same anchor
    pub fn collapse_replacements(&mut self) {
        for ops in self.map.values_mut() {
            if ops.len() != 2 {
                continue;
            }
            let replacement = match (&ops[0], &ops[1]) {
                (Operation::Delete, Operation::Append(x))
                | (Operation::Delete, Operation::Prepend(x))
                | (Operation::Append(x), Operation::Delete)
                | (Operation::Prepend(x), Operation::Delete) => Operation::Replace(x.clone()),
                _ => continue,
            };
            *ops = vec![replacement];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seam_java::parse_method;

    fn stmt(src: &str) -> Stmt {
        let full = format!("void m() {{ {src} }}");
        parse_method(&full).unwrap().body.stmts.remove(0)
    }

    #[test]
    fn collapse_delete_append_pair() {
        let mut ops = AnchoredOperations::new();
        ops.push(4, Operation::Delete);
        ops.push(4, Operation::Append(stmt("bar(x);")));
        ops.collapse_replacements();
        assert_eq!(ops.get(4), Some(&[Operation::Replace(stmt("bar(x);"))][..]));
    }

    #[test]
    fn collapse_ignores_larger_groups() {
        let mut ops = AnchoredOperations::new();
        ops.push(4, Operation::Delete);
        ops.push(4, Operation::Append(stmt("a();")));
        ops.push(4, Operation::Append(stmt("b();")));
        ops.collapse_replacements();
        assert_eq!(ops.get(4).unwrap().len(), 3);
    }

    #[test]
    fn take_where_preserves_order() {
        let mut ops = AnchoredOperations::new();
        ops.push(2, Operation::Delete);
        ops.push(2, Operation::Append(stmt("a();")));
        ops.push(2, Operation::Append(stmt("b();")));
        let taken = ops.take_where(2, |o| matches!(o, Operation::Append(_)));
        assert_eq!(taken.len(), 2);
        assert_eq!(ops.get(2), Some(&[Operation::Delete][..]));
    }
}
