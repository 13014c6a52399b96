pub mod checker;
pub mod env;
pub mod formula;
pub mod witness;

pub use checker::{ModelChecker, ResultRow};
pub use env::{Binding, BindingValue, Environment};
pub use formula::{
    BranchKind, BranchPattern, Formula, OPERATIONS_VAR, StatementPattern, optimize,
};
pub use witness::{Witness, collect_operations};
