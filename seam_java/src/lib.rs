pub mod ast;
pub mod cfg;
pub(crate) mod error;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use cfg::{Cfg, CfgBuilder, CfgNode, NodeId, NodeKind};
pub use error::SeamJavaError;
pub use parser::{parse_class, parse_method};
