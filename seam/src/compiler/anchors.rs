use crate::error::SeamError;
use crate::operations::{
    AnchoredOperations, BlockType, InsertAnchor, METHOD_BODY_ANCHOR, Operation,
};
use crate::smpl::{DELETION_MARKER, DOTS_MARKER, IMPLICIT_DOTS_MARKER};
use seam_java::{Block, Expr, Method, Stmt};
use std::collections::BTreeSet;
use tracing::debug;

/// Resolve every addition of the patch to its anchor by walking the
/// additions view, then append deletions from the deletions view and
/// collapse delete/insert pairs into replacements.
pub fn resolve_anchors(
    adds: &Method,
    dels: &Method,
    common: &BTreeSet<usize>,
) -> Result<AnchoredOperations, SeamError> {
    let mut map = AnchoredOperations::new();

    let body = unwrap_implicit(&adds.body);
    walk_block(
        body,
        BlockType::MethodBody,
        METHOD_BODY_ANCHOR,
        common,
        &mut map,
    )?;

    let mut deleted_lines = Vec::new();
    collect_statement_lines(unwrap_implicit(&dels.body), &mut deleted_lines);
    for line in deleted_lines {
        if !common.contains(&line) {
            map.push(line, Operation::Delete);
        }
    }

    map.collapse_replacements();

    if !dels.header_eq(adds) {
        map.push(
            METHOD_BODY_ANCHOR,
            Operation::MethodHeaderReplace(adds.clone()),
        );
    }
    debug!(operations = map.total_operations(), "resolved anchors");
    Ok(map)
}

/// Step inside the synthesized `if (__SmPLImplicitDots__)` wrapper when
/// present; the wrapped block is the real patch body
fn unwrap_implicit(body: &Block) -> &Block {
    if let [
        Stmt::If {
            cond: Expr::Name(n),
            then_block,
            else_block: None,
            ..
        },
    ] = body.stmts.as_slice()
    {
        if n == IMPLICIT_DOTS_MARKER {
            return then_block;
        }
    }
    body
}

fn is_marker_call(stmt: &Stmt, marker: &str) -> bool {
    stmt.bare_call_name() == Some(marker)
}

fn walk_block(
    block: &Block,
    block_type: BlockType,
    block_anchor: usize,
    common: &BTreeSet<usize>,
    map: &mut AnchoredOperations,
) -> Result<(), SeamError> {
    // last anchorable statement of this block, zero when none seen yet
    let mut element_anchor = METHOD_BODY_ANCHOR;
    // additions pending since the last dots; they attach to the next
    // concrete anchor, and a second dots makes them unanchorable
    let mut pending: Vec<Stmt> = Vec::new();
    // additions that can only attach to the block edge
    let mut edge: Vec<(InsertAnchor, Stmt)> = Vec::new();
    let mut after_dots = false;

    for stmt in &block.stmts {
        let line = stmt.line();
        let anchorable = is_marker_call(stmt, DELETION_MARKER) || common.contains(&line);
        if anchorable {
            if is_marker_call(stmt, DOTS_MARKER) {
                if !pending.is_empty() {
                    return Err(SeamError::UnanchorableStatement(line));
                }
                after_dots = true;
                element_anchor = METHOD_BODY_ANCHOR;
            } else {
                element_anchor = line;
                for s in pending.drain(..) {
                    map.push(line, Operation::Prepend(s));
                }
                after_dots = false;
                match stmt {
                    Stmt::If {
                        then_block,
                        else_block,
                        ..
                    } => {
                        walk_block(then_block, BlockType::TrueBranch, line, common, map)?;
                        if let Some(e) = else_block {
                            walk_block(e, BlockType::FalseBranch, line, common, map)?;
                        }
                    }
                    Stmt::While { body, .. } => {
                        walk_block(body, BlockType::TrueBranch, line, common, map)?;
                    }
                    _ => {}
                }
            }
        } else {
            // an added statement
            if element_anchor != METHOD_BODY_ANCHOR {
                map.push(element_anchor, Operation::Append(stmt.clone()));
            } else if after_dots {
                pending.push(stmt.clone());
            } else {
                edge.push((InsertAnchor::Top, stmt.clone()));
            }
        }
    }

    for (anchor, stmt) in edge {
        map.push(
            block_anchor,
            Operation::InsertIntoBlock {
                block: block_type,
                anchor,
                stmt,
            },
        );
    }
    for stmt in pending {
        map.push(
            block_anchor,
            Operation::InsertIntoBlock {
                block: block_type,
                anchor: InsertAnchor::Bottom,
                stmt,
            },
        );
    }
    Ok(())
}

/// Source lines of every concrete statement in the deletions view, branch
/// statements included; dots markers carry no code and are skipped
fn collect_statement_lines(block: &Block, out: &mut Vec<usize>) {
    for stmt in &block.stmts {
        if is_marker_call(stmt, DOTS_MARKER) {
            continue;
        }
        out.push(stmt.line());
        match stmt {
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                collect_statement_lines(then_block, out);
                if let Some(e) = else_block {
                    collect_statement_lines(e, out);
                }
            }
            Stmt::While { body, .. } => collect_statement_lines(body, out),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ProblemSink;
    use crate::smpl::lexer::lex;
    use crate::smpl::rewriter::rewrite;
    use crate::smpl::separator::separate;

    fn resolve(patch: &str) -> (AnchoredOperations, String) {
        let mut sink = ProblemSink::new();
        let src = rewrite(&lex(patch).unwrap(), &mut sink).unwrap();
        let views = separate(&src);
        let dels = seam_java::parse_class(&views.dels).unwrap();
        let adds = seam_java::parse_class(&views.adds).unwrap();
        let dels_m = dels.method("method").unwrap();
        let adds_m = adds.method("method").unwrap();
        let map = resolve_anchors(adds_m, dels_m, &views.common).unwrap();
        (map, views.dels)
    }

    fn line_of(view: &str, needle: &str) -> usize {
        view.lines().position(|l| l.contains(needle)).unwrap() + 1
    }

    #[test]
    fn delete_and_add_collapse_to_replace() {
        let (map, dels) = resolve("@@ identifier x; @@\n- foo(x);\n+ bar(x);\n");
        let line = line_of(&dels, "foo(x);");
        let ops = map.get(line).unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::Replace(s) if s.to_string() == "bar(x);"));
    }

    #[test]
    fn addition_after_dots_prepends_to_next_anchor() {
        let (map, dels) = resolve("@@ @@\na();\n...\n+ b();\nc();\n");
        let line = line_of(&dels, "c();");
        let ops = map.get(line).unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::Prepend(s) if s.to_string() == "b();"));
    }

    #[test]
    fn addition_at_branch_top_inserts_into_block() {
        let (map, dels) = resolve("@@ @@\nif (cond) {\n+ log();\nwork();\n}\n");
        let line = line_of(&dels, "if (cond) {");
        let ops = map.get(line).unwrap();
        assert!(matches!(
            &ops[0],
            Operation::InsertIntoBlock {
                block: BlockType::TrueBranch,
                anchor: InsertAnchor::Top,
                stmt,
            } if stmt.to_string() == "log();"
        ));
    }

    #[test]
    fn addition_between_context_lines_appends() {
        let (map, dels) = resolve("@@ @@\na();\n+ x();\nb();\n");
        let line = line_of(&dels, "a();");
        let ops = map.get(line).unwrap();
        assert!(matches!(&ops[0], Operation::Append(s) if s.to_string() == "x();"));
    }

    #[test]
    fn addition_at_method_top_anchors_to_body() {
        let (map, _) = resolve("@@ @@\n+ init();\na();\n");
        let ops = map.get(METHOD_BODY_ANCHOR).unwrap();
        assert!(matches!(
            &ops[0],
            Operation::InsertIntoBlock {
                block: BlockType::MethodBody,
                anchor: InsertAnchor::Top,
                ..
            }
        ));
    }

    #[test]
    fn trailing_addition_after_dots_goes_to_block_bottom() {
        let (map, _) = resolve("@@ @@\na();\n...\n+ done();\n");
        let ops = map.get(METHOD_BODY_ANCHOR).unwrap();
        assert!(matches!(
            &ops[0],
            Operation::InsertIntoBlock {
                block: BlockType::MethodBody,
                anchor: InsertAnchor::Bottom,
                ..
            }
        ));
    }

    #[test]
    fn addition_between_two_dots_is_unanchorable() {
        let mut sink = ProblemSink::new();
        let src = rewrite(
            &lex("@@ @@\na();\n...\n+ b();\n...\nc();\n").unwrap(),
            &mut sink,
        )
        .unwrap();
        let views = separate(&src);
        let dels = seam_java::parse_class(&views.dels).unwrap();
        let adds = seam_java::parse_class(&views.adds).unwrap();
        let err = resolve_anchors(
            adds.method("method").unwrap(),
            dels.method("method").unwrap(),
            &views.common,
        )
        .unwrap_err();
        assert!(matches!(err, SeamError::UnanchorableStatement(_)));
    }

    #[test]
    fn two_deletions_around_dots_stay_deletions() {
        let (map, dels) = resolve("@@ @@\n- a();\n...\n- b();\n");
        let la = line_of(&dels, "a();");
        let lb = line_of(&dels, "b();");
        assert_eq!(map.get(la), Some(&[Operation::Delete][..]));
        assert_eq!(map.get(lb), Some(&[Operation::Delete][..]));
    }

    #[test]
    fn context_only_patch_yields_no_operations() {
        let (map, _) = resolve("@@ @@\na();\nb();\n");
        assert!(map.is_empty());
    }
}
