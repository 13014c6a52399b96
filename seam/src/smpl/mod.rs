pub mod lexer;
pub mod rewriter;
pub mod separator;

/// Name of the class the rewriter emits
pub const RULE_CLASS_NAME: &str = "RewrittenSmPLRule";
/// Field carrying the rule name, when the patch header declared one
pub const RULE_NAME_FIELD: &str = "__SmPLRuleName__";
/// Method holding the metavariable declaration markers
pub const METAVARS_METHOD: &str = "__SmPLMetavars__";
/// Name of the synthesized rule method when the patch has no header
pub const RULE_METHOD_NAME: &str = "method";
/// Return type of the synthesized rule method
pub const UNSPECIFIED_TYPE: &str = "__SmPLUnspecified__";
/// Marker call replacing statement-level dots
pub const DOTS_MARKER: &str = "__SmPLDots__";
/// Marker statement standing in for deleted lines in the additions view
pub const DELETION_MARKER: &str = "__SmPLDeletion__";
/// Condition name of the synthesized wrapper branch
pub const IMPLICIT_DOTS_MARKER: &str = "__SmPLImplicitDots__";
/// Marker call wrapping expression-only patch lines
pub const EXPRESSION_MATCH_MARKER: &str = "__SmPLExpressionMatch__";
/// Parameter standing in for dots in a parameter list
pub const PARAMETER_DOTS_NAME: &str = "__SmPLParameterDots__";
/// Dots constraint marker calls
pub const WHEN_NOT_EQUAL: &str = "whenNotEqual";
pub const WHEN_ANY: &str = "whenAny";
pub const WHEN_EXISTS: &str = "whenExists";
/// Generic metavariable kind keywords
pub const METAVAR_KINDS: &[&str] = &["identifier", "type", "constant", "expression"];
