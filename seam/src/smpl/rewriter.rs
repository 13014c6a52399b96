use crate::error::SeamError;
use crate::problem::ProblemSink;
use crate::smpl::lexer::{Token, TokenKind};
use crate::smpl::{
    DOTS_MARKER, EXPRESSION_MATCH_MARKER, IMPLICIT_DOTS_MARKER, METAVARS_METHOD, METAVAR_KINDS,
    PARAMETER_DOTS_NAME, RULE_CLASS_NAME, RULE_METHOD_NAME, RULE_NAME_FIELD, UNSPECIFIED_TYPE,
    WHEN_ANY, WHEN_EXISTS, WHEN_NOT_EQUAL,
};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::debug;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Marker {
    Addition,
    Deletion,
}

/// The host-language source produced from a patch, with enough line-level
/// bookkeeping for the separator to split it into the two views
#[derive(Clone, Debug)]
pub struct RewrittenSource {
    pub text: String,
    pub rule_name: Option<String>,
    pub matches_on_method_header: bool,
    /// Rewritten line number -> the marker the patch line carried
    pub markers: BTreeMap<usize, Marker>,
    /// Deleted lines that must be blanked in the additions view instead of
    /// becoming deletion anchors: dots lines, method headers, bare braces
    pub blank_on_delete: BTreeSet<usize>,
}

#[derive(Clone, Debug)]
enum LineContent {
    Blank,
    Code(String),
    Dots(String),
}

#[derive(Clone, Debug)]
struct BodyLine {
    marker: Option<Marker>,
    content: LineContent,
    patch_line: usize,
}

#[derive(Clone, Debug)]
struct MetavarDecl {
    kind: String,
    name: String,
    regexes: Vec<String>,
}

fn method_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*((public|private|protected|static|final)\s+)+[A-Za-z_$][A-Za-z0-9_$]*\s+[A-Za-z_$][A-Za-z0-9_$]*\s*\(.*\)\s*\{\s*$",
        )
        .expect("header regex is valid")
    })
}

/// Transform a token stream into host-language source for one
/// `RewrittenSmPLRule` class
pub fn rewrite(tokens: &[Token], sink: &mut ProblemSink) -> Result<RewrittenSource, SeamError> {
    let mut rule_name = None;
    let mut decls: Vec<MetavarDecl> = Vec::new();
    let mut body: Vec<BodyLine> = Vec::new();

    let mut current_kind: Option<String> = None;
    let mut pending_marker: Option<Marker> = None;
    let mut line_has_content = false;

    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        match token.kind {
            TokenKind::Rulename => rule_name = Some(token.text.clone()),
            TokenKind::MetavarType => current_kind = Some(token.text.clone()),
            TokenKind::MetavarIdentifier => {
                if matches!(iter.peek(), Some(t) if t.kind == TokenKind::WhenMatches) {
                    // a constraint subject, not a declaration; the regex
                    // token that follows carries the pattern
                    let regex = iter.next().expect("peeked").text.clone();
                    attach_regex(&mut decls, Some(&token.text), &regex, token.line, sink)?;
                } else {
                    let kind = current_kind.clone().ok_or_else(|| {
                        SeamError::UnknownMetavarKind(format!(
                            "declaration of {} has no kind",
                            token.text
                        ))
                    })?;
                    decls.push(MetavarDecl {
                        kind,
                        name: token.text.clone(),
                        regexes: Vec::new(),
                    });
                }
            }
            TokenKind::WhenMatches => {
                // a bare clause applies to the most recent declaration
                attach_regex(&mut decls, None, &token.text, token.line, sink)?;
            }
            TokenKind::Code => {
                body.push(BodyLine {
                    marker: pending_marker.take(),
                    content: LineContent::Code(token.text.clone()),
                    patch_line: token.line,
                });
                line_has_content = true;
            }
            TokenKind::Dots => {
                body.push(BodyLine {
                    marker: pending_marker.take(),
                    content: LineContent::Dots(token.text.clone()),
                    patch_line: token.line,
                });
                line_has_content = true;
            }
            TokenKind::OptDotsBegin | TokenKind::OptDotsEnd => {
                return Err(SeamError::NotImplemented("optional dots"));
            }
            TokenKind::DisjunctionBegin
            | TokenKind::DisjunctionContinue
            | TokenKind::DisjunctionEnd => {
                return Err(SeamError::NotImplemented("pattern disjunction"));
            }
            TokenKind::Addition => pending_marker = Some(Marker::Addition),
            TokenKind::Deletion => pending_marker = Some(Marker::Deletion),
            TokenKind::Newline => {
                if !line_has_content {
                    body.push(BodyLine {
                        marker: pending_marker.take(),
                        content: LineContent::Blank,
                        patch_line: token.line,
                    });
                }
                pending_marker = None;
                line_has_content = false;
            }
        }
    }

    if body
        .iter()
        .all(|l| matches!(l.content, LineContent::Blank) || l.marker == Some(Marker::Addition))
    {
        sink.warn("patch has no match context", None);
    }

    let matches_on_method_header = matches!(
        body.iter().find(|l| !matches!(l.content, LineContent::Blank)),
        Some(BodyLine { content: LineContent::Code(text), .. })
            if method_header_regex().is_match(text)
    );

    let mut emitter = Emitter::default();
    emitter.line(format!("class {RULE_CLASS_NAME} {{"));
    if let Some(name) = &rule_name {
        emitter.line(format!("String {RULE_NAME_FIELD} = {name:?};"));
    }
    emitter.line(format!("void {METAVARS_METHOD}() {{"));
    for decl in &decls {
        if METAVAR_KINDS.contains(&decl.kind.as_str()) {
            emitter.line(format!("{}({});", decl.kind, decl.name));
        } else {
            // a non-generic kind is a typed-identifier declaration
            emitter.line(format!("{} {};", decl.kind, decl.name));
        }
        for regex in &decl.regexes {
            emitter.line(format!("constraint(\"regex-match\", {regex:?});"));
        }
    }
    emitter.line("}".to_string());

    if !matches_on_method_header {
        emitter.line(format!(
            "{UNSPECIFIED_TYPE} {RULE_METHOD_NAME}(Object {PARAMETER_DOTS_NAME}) {{"
        ));
        emitter.line(format!("if ({IMPLICIT_DOTS_MARKER}) {{"));
    }
    for line in &body {
        emit_body_line(line, &mut emitter, sink)?;
    }
    if !matches_on_method_header {
        emitter.line("}".to_string());
        emitter.line("}".to_string());
    }
    emitter.line("}".to_string());

    debug!(
        lines = emitter.lines.len(),
        metavars = decls.len(),
        matches_on_method_header,
        "rewrote patch"
    );
    Ok(RewrittenSource {
        text: emitter.lines.join("\n") + "\n",
        rule_name,
        matches_on_method_header,
        markers: emitter.markers,
        blank_on_delete: emitter.blank_on_delete,
    })
}

fn attach_regex(
    decls: &mut [MetavarDecl],
    subject: Option<&str>,
    regex: &str,
    line: usize,
    sink: &mut ProblemSink,
) -> Result<(), SeamError> {
    let target = match subject {
        Some(name) => decls.iter_mut().rev().find(|d| d.name == name),
        None => decls.last_mut(),
    };
    match target {
        Some(decl) => {
            decl.regexes.push(regex.to_string());
            Ok(())
        }
        None => {
            sink.error(
                format!(
                    "when-matches constraint on undeclared metavariable{}",
                    subject.map(|s| format!(" {s}")).unwrap_or_default()
                ),
                Some(line),
            );
            Ok(())
        }
    }
}

#[derive(Default)]
struct Emitter {
    lines: Vec<String>,
    markers: BTreeMap<usize, Marker>,
    blank_on_delete: BTreeSet<usize>,
}

impl Emitter {
    fn line(&mut self, text: String) {
        self.lines.push(text);
    }

    fn current(&self) -> usize {
        self.lines.len()
    }
}

fn emit_body_line(
    line: &BodyLine,
    emitter: &mut Emitter,
    sink: &mut ProblemSink,
) -> Result<(), SeamError> {
    let (text, blank_on_delete) = match &line.content {
        LineContent::Blank => (String::new(), false),
        LineContent::Dots(tail) => {
            if line.marker == Some(Marker::Deletion) {
                sink.warn("deleting a dots line has no effect", Some(line.patch_line));
            }
            let args = parse_dots_constraints(tail)?;
            (format!("{DOTS_MARKER}({});", args.join(", ")), true)
        }
        LineContent::Code(code) => {
            let trimmed = code.trim();
            if method_header_regex().is_match(code) {
                (rewrite_parameter_dots(code), true)
            } else if trimmed == "{" || trimmed.starts_with('}') {
                (code.clone(), true)
            } else if trimmed.ends_with(';') || trimmed.ends_with('{') {
                (code.clone(), false)
            } else {
                // an expression at statement position; wrap it so the host
                // parser accepts the line
                (format!("{EXPRESSION_MATCH_MARKER}({trimmed});"), false)
            }
        }
    };

    match line.marker {
        // a marker on an otherwise blank line marks nothing
        None | Some(_) if text.is_empty() => emitter.line(text),
        None => emitter.line(text),
        Some(marker) => {
            let c = match marker {
                Marker::Addition => '+',
                Marker::Deletion => '-',
            };
            emitter.line(format!("{c} {text}"));
            let n = emitter.current();
            emitter.markers.insert(n, marker);
            if blank_on_delete {
                emitter.blank_on_delete.insert(n);
            }
        }
    }
    Ok(())
}

/// Replace dots inside a parameter list with the marker parameter
fn rewrite_parameter_dots(header: &str) -> String {
    header.replacen("...", &format!("Object {PARAMETER_DOTS_NAME}"), 1)
}

/// Parse the constraint tail of a dots line into marker-call arguments
fn parse_dots_constraints(tail: &str) -> Result<Vec<String>, SeamError> {
    let tail = tail.trim();
    if tail.is_empty() {
        return Ok(Vec::new());
    }
    let mut args = Vec::new();
    for clause in tail.split("when").map(str::trim) {
        if clause.is_empty() {
            continue;
        }
        if let Some(expr) = clause.strip_prefix("!=") {
            args.push(format!("{WHEN_NOT_EQUAL}({})", expr.trim()));
        } else if clause == "any" {
            args.push(format!("{WHEN_ANY}()"));
        } else if clause == "exists" {
            args.push(format!("{WHEN_EXISTS}()"));
        } else {
            return Err(SeamError::UnknownDotsConstraint(clause.to_string()));
        }
    }
    if args.is_empty() {
        return Err(SeamError::UnknownDotsConstraint(tail.to_string()));
    }
    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smpl::lexer::lex;

    fn rewrite_patch(patch: &str) -> RewrittenSource {
        let mut sink = ProblemSink::new();
        rewrite(&lex(patch).unwrap(), &mut sink).unwrap()
    }

    #[test]
    fn wraps_body_without_header() {
        let out = rewrite_patch("@@ identifier x; @@\n- foo(x);\n+ bar(x);\n");
        assert!(!out.matches_on_method_header);
        assert!(out.text.contains("class RewrittenSmPLRule {"));
        assert!(out.text.contains("identifier(x);"));
        assert!(out.text.contains("if (__SmPLImplicitDots__) {"));
        assert!(out.text.contains("- foo(x);"));
        assert!(out.text.contains("+ bar(x);"));
    }

    #[test]
    fn records_markers_against_rewritten_lines() {
        let out = rewrite_patch("@@ @@\n- foo();\n+ bar();\n");
        let marks: Vec<Marker> = out.markers.values().copied().collect();
        assert_eq!(marks, vec![Marker::Deletion, Marker::Addition]);
        for (line, _) in &out.markers {
            let text = out.text.lines().nth(line - 1).unwrap();
            assert!(text.starts_with(['+', '-']));
        }
    }

    #[test]
    fn rule_name_becomes_a_field() {
        let out = rewrite_patch("@ rule1 @\n@@\nfoo();\n");
        assert_eq!(out.rule_name.as_deref(), Some("rule1"));
        assert!(out.text.contains("String __SmPLRuleName__ = \"rule1\";"));
    }

    #[test]
    fn dots_become_marker_calls() {
        let out = rewrite_patch("@@ @@\na();\n... when != b(x) when any\nc();\n");
        assert!(out
            .text
            .contains("__SmPLDots__(whenNotEqual(b(x)), whenAny());"));
    }

    #[test]
    fn typed_metavar_is_a_local_declaration() {
        let out = rewrite_patch("@@ List l; @@\nfoo(l);\n");
        assert!(out.text.contains("List l;"));
    }

    #[test]
    fn regex_constraint_follows_its_variable() {
        let out =
            rewrite_patch("@@\nidentifier x;\nx when matches \"^get.*\"\n@@\nfoo(x);\n");
        let idx_decl = out.text.find("identifier(x);").unwrap();
        let idx_con = out
            .text
            .find("constraint(\"regex-match\", \"^get.*\");")
            .unwrap();
        assert!(idx_con > idx_decl);
    }

    #[test]
    fn expression_lines_are_wrapped() {
        let out = rewrite_patch("@@ identifier x; @@\nx\n");
        assert!(out.text.contains("__SmPLExpressionMatch__(x);"));
    }

    #[test]
    fn declared_method_header_is_kept() {
        let out = rewrite_patch("@@ @@\npublic void run(...) {\nwork();\n}\n");
        assert!(out.matches_on_method_header);
        assert!(!out.text.contains(IMPLICIT_DOTS_MARKER));
        assert!(out
            .text
            .contains("public void run(Object __SmPLParameterDots__) {"));
    }

    #[test]
    fn disjunction_is_not_implemented() {
        let mut sink = ProblemSink::new();
        let err = rewrite(&lex("@@ @@\n(\na();\n)\n").unwrap(), &mut sink).unwrap_err();
        assert!(matches!(err, SeamError::NotImplemented(_)));
    }

    #[test]
    fn unknown_dots_constraint_is_rejected() {
        let mut sink = ProblemSink::new();
        let err = rewrite(&lex("@@ @@\n... when sideways\n").unwrap(), &mut sink).unwrap_err();
        assert!(matches!(err, SeamError::UnknownDotsConstraint(_)));
    }
}
