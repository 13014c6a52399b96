use crate::operations::Operation;
use seam_java::Expr;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A value a metavariable can be bound to
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum BindingValue {
    /// An identifier name
    Name(String),
    /// A type name
    Ty(String),
    /// A whole expression (also covers constants, which bind literals)
    Expr(Expr),
    /// An edit-operation payload; carried by the `_v` operations slots
    Ops(Vec<Operation>),
}

impl Display for BindingValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingValue::Name(n) => write!(f, "{n}"),
            BindingValue::Ty(t) => write!(f, "{t}"),
            BindingValue::Expr(e) => write!(f, "{e}"),
            BindingValue::Ops(ops) => {
                write!(f, "[")?;
                for (i, op) in ops.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{op}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Binding {
    /// The variable equals this value
    Bound(BindingValue),
    /// The variable must not equal any of these values
    Forbidden(Vec<BindingValue>),
}

/// A metavariable environment: an ordered collection of name -> binding
/// pairs. Composition is by *compatible union*: two environments compose iff
/// they agree on every variable bound by both.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Environment {
    entries: Vec<(String, Binding)>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.entries.iter().map(|(n, b)| (n.as_str(), b))
    }

    /// Bind `name` to `value`, composing with any existing binding.
    /// Returns `false` when the new value is incompatible (already bound to
    /// a different value, or the value is forbidden).
    pub fn bind(&mut self, name: &str, value: BindingValue) -> bool {
        let Some(idx) = self.entries.iter().position(|(n, _)| n == name) else {
            self.entries.push((name.to_string(), Binding::Bound(value)));
            return true;
        };
        let compatible = match &self.entries[idx].1 {
            Binding::Bound(existing) => return *existing == value,
            Binding::Forbidden(set) => !set.contains(&value),
        };
        if compatible {
            self.entries[idx].1 = Binding::Bound(value);
        }
        compatible
    }

    fn insert(&mut self, name: &str, binding: Binding) -> bool {
        match binding {
            Binding::Bound(v) => self.bind(name, v),
            Binding::Forbidden(values) => {
                let Some(idx) = self.entries.iter().position(|(n, _)| n == name) else {
                    self.entries
                        .push((name.to_string(), Binding::Forbidden(values)));
                    return true;
                };
                match &mut self.entries[idx].1 {
                    Binding::Bound(v) => !values.contains(v),
                    Binding::Forbidden(set) => {
                        for v in values {
                            if !set.contains(&v) {
                                set.push(v);
                            }
                        }
                        true
                    }
                }
            }
        }
    }

    /// Compose two environments; `None` when they disagree on a variable
    pub fn compatible_union(&self, other: &Environment) -> Option<Environment> {
        let mut out = self.clone();
        for (name, binding) in &other.entries {
            if !out.insert(name, binding.clone()) {
                return None;
            }
        }
        Some(out)
    }

    /// Remove and return the binding of `name`
    pub fn remove(&mut self, name: &str) -> Option<Binding> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    /// The negation of this environment, as a disjunction of single-entry
    /// environments: `not {x = a, y = b}` is `{x != a} or {y != b}`, and
    /// `not {x != a}` is `{x = a}`. The negation of the empty environment is
    /// unsatisfiable, encoded as an empty vec.
    pub fn negations(&self) -> Vec<Environment> {
        let mut out = Vec::new();
        for (name, binding) in &self.entries {
            match binding {
                Binding::Bound(v) => {
                    let mut env = Environment::new();
                    env.entries
                        .push((name.clone(), Binding::Forbidden(vec![v.clone()])));
                    out.push(env);
                }
                Binding::Forbidden(values) => {
                    for v in values {
                        let mut env = Environment::new();
                        env.entries
                            .push((name.clone(), Binding::Bound(v.clone())));
                        out.push(env);
                    }
                }
            }
        }
        out
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, (name, binding)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match binding {
                Binding::Bound(v) => write!(f, "{name} = {v}")?,
                Binding::Forbidden(vs) => {
                    write!(f, "{name} != ")?;
                    for (j, v) in vs.iter().enumerate() {
                        if j > 0 {
                            write!(f, "|")?;
                        }
                        write!(f, "{v}")?;
                    }
                }
            }
        }
        write!(f, "}}")
    }
}
