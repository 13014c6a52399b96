use crate::cfg::SmplCfg;
use crate::compiler::anchors::resolve_anchors;
use crate::compiler::compile_formula;
use crate::ctl::checker::{ModelChecker, ResultRow};
use crate::ctl::formula::Formula;
use crate::error::SeamError;
use crate::metavar::{MetavarConstraint, MetavarTable, TypeContext};
use crate::pattern::Matcher;
use crate::problem::ProblemSink;
use crate::smpl::lexer::lex;
use crate::smpl::rewriter::rewrite;
use crate::smpl::separator::separate;
use crate::smpl::{METAVARS_METHOD, RULE_NAME_FIELD};
use seam_java::{CfgBuilder, Class, Expr, Literal, Method, Stmt, parse_class};
use tracing::{debug, instrument};

/// A compiled semantic patch rule: everything the model checker needs to
/// find match sites in target methods and report the edits to perform
#[derive(Clone, Debug)]
pub struct Rule {
    pub name: Option<String>,
    /// The original patch text
    pub source: String,
    /// The deletions-view rule method (the match context)
    pub rule_method: Method,
    pub formula: Formula,
    pub metavars: MetavarTable,
    /// Whole methods the patch adds to the target class
    pub added_methods: Vec<Method>,
    /// Whether the patch declared its own method header; when set, the
    /// header is unified against each target before the formula runs
    pub matches_on_method_header: bool,
}

/// Compile a patch text into a [`Rule`], running the full pipeline: lexing,
/// rewriting, view separation, host parsing, anchor resolution, CFG
/// adaptation and formula compilation.
#[instrument(skip_all)]
pub fn compile(patch: &str) -> Result<Rule, SeamError> {
    let tokens = lex(patch)?;
    let mut sink = ProblemSink::new();
    let rewritten = rewrite(&tokens, &mut sink)?;
    if sink.has_errors() {
        return Err(SeamError::Problems(sink.into_problems()));
    }

    let views = separate(&rewritten);
    let dels_class = parse_class(&views.dels)?;
    let adds_class = parse_class(&views.adds)?;

    let metavars = build_metavars(&dels_class)?;
    let name = rule_name(&dels_class).or(rewritten.rule_name);

    let dels_method = locate_rule_method(&dels_class)?;
    let adds_method = adds_class
        .method(&dels_method.name)
        .ok_or(SeamError::MissingRuleMethod("additions"))?;
    let added_methods: Vec<Method> = adds_class
        .methods
        .iter()
        .filter(|m| m.name != METAVARS_METHOD && m.name != dels_method.name)
        .cloned()
        .collect();

    let anchored = resolve_anchors(adds_method, dels_method, &views.common)?;

    let cfg = CfgBuilder::new().build(dels_method);
    let adapted = SmplCfg::adapt(&cfg)?;
    let formula = compile_formula(&adapted, &metavars, anchored)?;

    debug!(
        rule = name.as_deref().unwrap_or("<anonymous>"),
        metavars = metavars.len(),
        added_methods = added_methods.len(),
        "compiled rule"
    );
    Ok(Rule {
        name,
        source: patch.to_string(),
        rule_method: dels_method.clone(),
        formula,
        metavars,
        added_methods,
        matches_on_method_header: rewritten.matches_on_method_header,
    })
}

impl Rule {
    /// Evaluate this rule against one target method, returning the
    /// satisfying states with their environments and witnesses
    pub fn check(&self, target: &Method) -> Result<Vec<ResultRow>, SeamError> {
        let cfg = CfgBuilder::new().build(target);
        let model = SmplCfg::adapt(&cfg)?;
        let types = TypeContext::of_method(target);

        let header_env = if self.matches_on_method_header {
            let matcher = Matcher::new(&self.metavars, &types);
            match matcher.match_header(&self.rule_method, target) {
                Some(env) => Some(env),
                None => return Ok(Vec::new()),
            }
        } else {
            None
        };

        let checker = ModelChecker::new(&model, &self.metavars, &types);
        let mut rows = checker.check(&self.formula);
        if let Some(header_env) = header_env {
            rows = rows
                .into_iter()
                .filter_map(|mut row| {
                    row.env = row.env.compatible_union(&header_env)?;
                    Some(row)
                })
                .collect();
        }
        Ok(rows)
    }
}

/// Read the rule-name field the rewriter plants on the rule class
fn rule_name(class: &Class) -> Option<String> {
    class.fields.iter().find_map(|f| {
        if f.name != RULE_NAME_FIELD {
            return None;
        }
        match &f.init {
            Some(Expr::Lit(Literal::Str(s))) => Some(s.clone()),
            _ => None,
        }
    })
}

/// The deletions view must contain exactly one method besides the
/// metavariable declarations
fn locate_rule_method(class: &Class) -> Result<&Method, SeamError> {
    let mut candidates = class.methods.iter().filter(|m| m.name != METAVARS_METHOD);
    let first = candidates
        .next()
        .ok_or(SeamError::MissingRuleMethod("deletions"))?;
    if candidates.next().is_some() {
        return Err(SeamError::MultipleRuleMethods);
    }
    Ok(first)
}

/// Interpret the `__SmPLMetavars__` marker method into the constraint table
fn build_metavars(class: &Class) -> Result<MetavarTable, SeamError> {
    let mut table = MetavarTable::new();
    let Some(method) = class.method(METAVARS_METHOD) else {
        return Ok(table);
    };
    for stmt in &method.body.stmts {
        match stmt {
            Stmt::Local { ty, name, .. } => {
                table.declare(name, MetavarConstraint::TypedIdentifier(ty.name.clone()));
            }
            Stmt::Expr {
                expr:
                    Expr::Call {
                        receiver: None,
                        name,
                        args,
                    },
                ..
            } => match (name.as_str(), args.as_slice()) {
                ("identifier", [Expr::Name(v)]) => {
                    table.declare(v, MetavarConstraint::Identifier)
                }
                ("type", [Expr::Name(v)]) => table.declare(v, MetavarConstraint::Type),
                ("constant", [Expr::Name(v)]) => table.declare(v, MetavarConstraint::Constant),
                ("expression", [Expr::Name(v)]) => {
                    table.declare(v, MetavarConstraint::Expression)
                }
                ("constraint", [Expr::Lit(Literal::Str(kind)), Expr::Lit(Literal::Str(pat))]) => {
                    if kind != "regex-match" {
                        return Err(SeamError::UnknownMetavarKind(kind.clone()));
                    }
                    let Some(last) = table.last_declared().map(str::to_string) else {
                        return Err(SeamError::UnknownMetavarKind(
                            "constraint without a preceding declaration".to_string(),
                        ));
                    };
                    table.constrain_regex(&last, pat)?;
                }
                (other, _) => return Err(SeamError::UnknownMetavarKind(other.to_string())),
            },
            other => {
                return Err(SeamError::UnknownMetavarKind(other.to_string()));
            }
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_rule_carries_its_name() {
        let rule = compile("@ rename_foo @\nidentifier x;\n@@\n- foo(x);\n+ bar(x);\n").unwrap();
        assert_eq!(rule.name.as_deref(), Some("rename_foo"));
        assert_eq!(rule.source.lines().count(), 5);
    }

    #[test]
    fn metavars_come_from_the_dsl() {
        let rule = compile("@@\nidentifier x;\nexpression e;\nList l;\n@@\nfoo(x, e, l);\n")
            .unwrap();
        assert_eq!(rule.metavars.get("x"), Some(&MetavarConstraint::Identifier));
        assert_eq!(rule.metavars.get("e"), Some(&MetavarConstraint::Expression));
        assert_eq!(
            rule.metavars.get("l"),
            Some(&MetavarConstraint::TypedIdentifier("List".to_string()))
        );
    }

    #[test]
    fn regex_constraint_lands_on_its_variable() {
        let rule =
            compile("@@\nidentifier x;\nx when matches \"^get.*\"\n@@\nfoo(x);\n").unwrap();
        assert_eq!(
            rule.metavars.get("x"),
            Some(
                &MetavarConstraint::regex("^get.*", MetavarConstraint::Identifier).unwrap()
            )
        );
    }

    #[test]
    fn context_only_patch_has_no_operations() {
        let rule = compile("@@ @@\na();\nb();\n").unwrap();
        assert!(rule.formula.embedded_operations().is_empty());
    }

    #[test]
    fn empty_body_matches_nothing() {
        let rule = compile("@@ @@\n").unwrap();
        assert_eq!(rule.formula, Formula::not(Formula::True));
        assert!(rule.formula.embedded_operations().is_empty());
    }

    #[test]
    fn header_patch_gates_on_method_name() {
        let rule = compile(
            "@@ @@\npublic void run(...) {\n- work();\n+ rest();\n}\n",
        )
        .unwrap();
        assert!(rule.matches_on_method_header);
        let target = seam_java::parse_method("public void run(int n) { work(); }").unwrap();
        assert!(!rule.check(&target).unwrap().is_empty());
        let other = seam_java::parse_method("public void walk(int n) { work(); }").unwrap();
        assert!(rule.check(&other).unwrap().is_empty());
    }
}
