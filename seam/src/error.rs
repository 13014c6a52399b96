use crate::problem::Problem;
use seam_java::{NodeId, SeamJavaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeamError {
    /// The patch text did not match the surface grammar. The wrapped pest
    /// error carries the offending position and the expected-token set.
    #[error("patch syntax error: {0}")]
    PatchSyntax(Box<pest::error::Error<crate::smpl::lexer::Rule>>),
    /// The patch input was empty
    #[error("empty patch input")]
    EmptyMatchContext,
    /// A rewritten patch view failed to parse as host-language source
    #[error("rewritten patch view failed to parse: {0}")]
    Java(#[from] SeamJavaError),
    /// Structured diagnostics of severity `Error` were raised
    #[error("patch has errors: {}", .0.iter().map(|p| p.to_string()).collect::<Vec<_>>().join("; "))]
    Problems(Vec<Problem>),
    /// The deletions view contained more than one candidate rule method
    #[error("deletions view contains multiple rule methods")]
    MultipleRuleMethods,
    /// No rule method could be located in a patch view
    #[error("unable to locate the rule method in the {0} view")]
    MissingRuleMethod(&'static str),
    /// An addition was interleaved around dots in a way that defies anchoring
    #[error("unanchorable statement near line {0}")]
    UnanchorableStatement(usize),
    /// A metavariable declaration used a kind the engine does not know
    #[error("unknown metavariable kind: {0}")]
    UnknownMetavarKind(String),
    /// A dots statement carried a constraint form the engine does not know
    #[error("unknown dots constraint: {0}")]
    UnknownDotsConstraint(String),
    /// A `when matches` constraint carried an invalid regular expression
    #[error("invalid when-matches pattern: {0}")]
    InvalidRegex(#[from] regex::Error),
    /// Surface syntax that is recognised but whose semantics are not
    /// implemented (disjunctions, optional dots)
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    /// The CFG handed to the adapter was already simplified; the adapter
    /// needs the block bracketing nodes to do its own elision
    #[error("refusing to adapt a simplified control flow graph")]
    SimplifiedCfg,
    /// A branch node did not have exactly two successors
    #[error("branch node {0} does not have exactly two successors")]
    MalformedBranch(NodeId),
    /// A statement node had no successor
    #[error("statement node {0} has no successor")]
    MissingSuccessor(NodeId),
    /// The formula compiler reached a node kind it cannot handle
    #[error("unexpected node {0} during formula compilation")]
    UnexpectedNode(NodeId),
}

impl From<pest::error::Error<crate::smpl::lexer::Rule>> for SeamError {
    fn from(value: pest::error::Error<crate::smpl::lexer::Rule>) -> Self {
        SeamError::PatchSyntax(Box::new(value))
    }
}
