pub mod cfg;
pub mod compiler;
pub mod ctl;
mod error;
pub mod metavar;
pub mod operations;
pub mod pattern;
pub mod problem;
pub mod rule;
pub mod smpl;

pub use seam_java as java;

pub use cfg::{NodeTag, SmplCfg, TagLabel};
pub use ctl::{
    Binding, BindingValue, Environment, Formula, ModelChecker, ResultRow, Witness,
    collect_operations,
};
pub use error::SeamError;
pub use metavar::{MetavarConstraint, MetavarTable};
pub use operations::{AnchoredOperations, BlockType, InsertAnchor, Operation};
pub use rule::{Rule, compile};
