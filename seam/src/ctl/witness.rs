use crate::ctl::env::BindingValue;
use crate::operations::Operation;
use seam_java::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A proof object recording how an `ExistsVar` quantifier was satisfied:
/// at which state the variable got its binding, and the nested witnesses of
/// the quantifiers inside its scope.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Witness {
    pub state: NodeId,
    pub metavar: String,
    pub binding: BindingValue,
    pub nested: Vec<Witness>,
}

impl Witness {
    pub fn new(state: NodeId, metavar: String, binding: BindingValue, nested: Vec<Witness>) -> Self {
        Self {
            state,
            metavar,
            binding,
            nested,
        }
    }
}

impl Display for Witness {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<{}, {} = {}",
            self.state, self.metavar, self.binding
        )?;
        if !self.nested.is_empty() {
            write!(f, ", [")?;
            for (i, w) in self.nested.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{w}")?;
            }
            write!(f, "]")?;
        }
        write!(f, ">")
    }
}

/// Walk a witness forest and collect the edit-operation payloads bound to
/// the operations-slot variable, paired with the state they anchor to.
/// These are the match-site/edit tuples a transformation backend consumes.
pub fn collect_operations(witnesses: &[Witness]) -> Vec<(NodeId, Vec<Operation>)> {
    let mut out = Vec::new();
    collect_into(witnesses, &mut out);
    out
}

fn collect_into(witnesses: &[Witness], out: &mut Vec<(NodeId, Vec<Operation>)>) {
    for w in witnesses {
        if let BindingValue::Ops(ops) = &w.binding {
            let entry = (w.state, ops.clone());
            if !out.contains(&entry) {
                out.push(entry);
            }
        }
        collect_into(&w.nested, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_operations_from_nested_witnesses() {
        let inner = Witness::new(
            3,
            "_v".to_string(),
            BindingValue::Ops(vec![Operation::Delete]),
            vec![],
        );
        let outer = Witness::new(
            3,
            "x".to_string(),
            BindingValue::Name("y".to_string()),
            vec![inner],
        );
        let ops = collect_operations(&[outer]);
        assert_eq!(ops, vec![(3, vec![Operation::Delete])]);
    }
}
