use crate::ctl::env::BindingValue;
use crate::error::SeamError;
use regex::Regex;
use seam_java::{Block, Expr, Method, Stmt};
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};

/// Declared types visible inside one target method: parameters plus local
/// declarations. Feeds the typed-identifier constraint.
#[derive(Clone, Debug, Default)]
pub struct TypeContext {
    types: HashMap<String, String>,
}

impl TypeContext {
    pub fn of_method(method: &Method) -> Self {
        let mut types = HashMap::new();
        for p in &method.params {
            types.insert(p.name.clone(), p.ty.name.clone());
        }
        collect_locals(&method.body, &mut types);
        Self { types }
    }

    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.types.get(name).map(String::as_str)
    }
}

fn collect_locals(block: &Block, types: &mut HashMap<String, String>) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Local { ty, name, .. } => {
                types.insert(name.clone(), ty.name.clone());
            }
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                collect_locals(then_block, types);
                if let Some(e) = else_block {
                    collect_locals(e, types);
                }
            }
            Stmt::While { body, .. } => collect_locals(body, types),
            _ => {}
        }
    }
}

/// The unification predicate attached to one declared metavariable
#[derive(Clone)]
pub enum MetavarConstraint {
    /// Binds any identifier reference
    Identifier,
    /// Binds a type name
    Type,
    /// Binds literals only
    Constant,
    /// Binds any whole expression
    Expression,
    /// Binds identifiers declared with the given type name
    TypedIdentifier(String),
    /// Defers to `inner`, then requires the stringified binding to match
    Regex {
        /// The source pattern as written in the patch
        pattern: String,
        regex: Regex,
        inner: Box<MetavarConstraint>,
    },
}

impl Debug for MetavarConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MetavarConstraint::Identifier => write!(f, "Identifier"),
            MetavarConstraint::Type => write!(f, "Type"),
            MetavarConstraint::Constant => write!(f, "Constant"),
            MetavarConstraint::Expression => write!(f, "Expression"),
            MetavarConstraint::TypedIdentifier(t) => write!(f, "TypedIdentifier({t})"),
            MetavarConstraint::Regex { pattern, inner, .. } => {
                write!(f, "Regex({pattern:?}, {inner:?})")
            }
        }
    }
}

impl PartialEq for MetavarConstraint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (MetavarConstraint::Identifier, MetavarConstraint::Identifier)
            | (MetavarConstraint::Type, MetavarConstraint::Type)
            | (MetavarConstraint::Constant, MetavarConstraint::Constant)
            | (MetavarConstraint::Expression, MetavarConstraint::Expression) => true,
            (MetavarConstraint::TypedIdentifier(a), MetavarConstraint::TypedIdentifier(b)) => {
                a == b
            }
            (
                MetavarConstraint::Regex {
                    pattern: pa,
                    inner: ia,
                    ..
                },
                MetavarConstraint::Regex {
                    pattern: pb,
                    inner: ib,
                    ..
                },
            ) => pa == pb && ia == ib,
            _ => false,
        }
    }
}

impl Display for MetavarConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl MetavarConstraint {
    /// Wrap `inner` in a regex constraint, compiling the pattern up front
    pub fn regex<T: AsRef<str>>(pattern: T, inner: MetavarConstraint) -> Result<Self, SeamError> {
        Ok(MetavarConstraint::Regex {
            pattern: pattern.as_ref().to_string(),
            regex: Regex::new(pattern.as_ref())?,
            inner: Box::new(inner),
        })
    }

    /// Try to bind this constraint against a target expression
    pub fn match_expr(&self, target: &Expr, types: &TypeContext) -> Option<BindingValue> {
        let candidate = match self {
            MetavarConstraint::Identifier => match target {
                Expr::Name(n) => Some(BindingValue::Name(n.clone())),
                _ => None,
            },
            MetavarConstraint::TypedIdentifier(ty) => match target {
                Expr::Name(n) if types.type_of(n) == Some(ty.as_str()) => {
                    Some(BindingValue::Name(n.clone()))
                }
                _ => None,
            },
            MetavarConstraint::Type => match target {
                Expr::Name(n) => Some(BindingValue::Ty(n.clone())),
                _ => None,
            },
            MetavarConstraint::Constant => match target {
                Expr::Lit(_) => Some(BindingValue::Expr(target.clone())),
                _ => None,
            },
            MetavarConstraint::Expression => Some(BindingValue::Expr(target.clone())),
            MetavarConstraint::Regex { regex, inner, .. } => {
                let v = inner.match_expr(target, types)?;
                return check_regex(regex, v);
            }
        };
        candidate
    }

    /// Try to bind this constraint against a name position (a declared
    /// variable, a method name in a call, a field name)
    pub fn match_name(&self, target: &str, types: &TypeContext) -> Option<BindingValue> {
        match self {
            MetavarConstraint::Identifier => Some(BindingValue::Name(target.to_string())),
            MetavarConstraint::TypedIdentifier(ty) => {
                if types.type_of(target) == Some(ty.as_str()) {
                    Some(BindingValue::Name(target.to_string()))
                } else {
                    None
                }
            }
            MetavarConstraint::Regex { regex, inner, .. } => {
                let v = inner.match_name(target, types)?;
                check_regex(regex, v)
            }
            _ => None,
        }
    }

    /// Try to bind this constraint against a type name
    pub fn match_type(&self, target: &str) -> Option<BindingValue> {
        match self {
            MetavarConstraint::Type => Some(BindingValue::Ty(target.to_string())),
            MetavarConstraint::Regex { regex, inner, .. } => {
                let v = inner.match_type(target)?;
                check_regex(regex, v)
            }
            _ => None,
        }
    }

    /// Whether an existing binding can stand for `candidate`: bindings of
    /// one metavariable must be equal across all its uses
    pub fn merge(existing: &BindingValue, candidate: &BindingValue) -> bool {
        existing == candidate
    }
}

fn check_regex(regex: &Regex, value: BindingValue) -> Option<BindingValue> {
    if regex.is_match(&value.to_string()) {
        Some(value)
    } else {
        None
    }
}

/// The declared metavariables of one rule, in declaration order. Order
/// matters twice: regex constraints attach to the most recently declared
/// variable, and quantifier emission sorts within an atom but follows
/// first-use order across the formula.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetavarTable {
    entries: Vec<(String, MetavarConstraint)>,
}

impl MetavarTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare<T: Into<String>>(&mut self, name: T, constraint: MetavarConstraint) {
        self.entries.push((name.into(), constraint));
    }

    pub fn get(&self, name: &str) -> Option<&MetavarConstraint> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Wrap the named variable's constraint in a regex constraint
    pub fn constrain_regex(&mut self, name: &str, pattern: &str) -> Result<(), SeamError> {
        let Some(idx) = self.entries.iter().position(|(n, _)| n == name) else {
            return Err(SeamError::UnknownMetavarKind(format!(
                "constraint on undeclared metavariable {name}"
            )));
        };
        let inner = self.entries[idx].1.clone();
        self.entries[idx].1 = MetavarConstraint::regex(pattern, inner)?;
        Ok(())
    }

    pub fn last_declared(&self) -> Option<&str> {
        self.entries.last().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetavarConstraint)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
