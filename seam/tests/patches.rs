//! End-to-end pipeline coverage: patch text in, compiled rules out, checked
//! against small target methods with the model checker.

use seam::ctl::OPERATIONS_VAR;
use seam::java::parse_method;
use seam::{
    BindingValue, BlockType, Formula, InsertAnchor, MetavarConstraint, Operation, Rule, TagLabel,
    collect_operations, compile,
};

fn ops_of(rule: &Rule, target_src: &str) -> Vec<Vec<Operation>> {
    let target = parse_method(target_src).unwrap();
    let rows = rule.check(&target).unwrap();
    rows.iter()
        .flat_map(|r| collect_operations(&r.witnesses))
        .map(|(_, ops)| ops)
        .collect()
}

/// Each metavariable binds at most once along any root-to-leaf path
fn check_single_quantification(f: &Formula, bound: &mut Vec<String>) {
    match f {
        Formula::ExistsVar(v, inner) => {
            assert!(
                !bound.contains(v),
                "metavariable {v} quantified twice on one path"
            );
            bound.push(v.clone());
            check_single_quantification(inner, bound);
            bound.pop();
        }
        Formula::Not(a) | Formula::AllNext(a) | Formula::ExistsNext(a) => {
            check_single_quantification(a, bound)
        }
        Formula::And(a, b)
        | Formula::Or(a, b)
        | Formula::AllUntil(a, b)
        | Formula::ExistsUntil(a, b) => {
            check_single_quantification(a, bound);
            check_single_quantification(b, bound);
        }
        _ => {}
    }
}

/// Every embedded operation payload sits inside a well-formed slot
/// conjunction `And(_, ExistsVar("_v", SetEnv("_v", ops)))`
fn count_slots(f: &Formula) -> (usize, usize) {
    let mut slots = 0;
    let mut payloads = 0;
    f.visit(&mut |sub| {
        if let Formula::SetEnv(v, BindingValue::Ops(_)) = sub {
            assert_eq!(v, OPERATIONS_VAR);
            payloads += 1;
        }
        if let Formula::And(_, rhs) = sub {
            if let Formula::ExistsVar(v, inner) = rhs.as_ref() {
                if v == OPERATIONS_VAR
                    && matches!(inner.as_ref(), Formula::SetEnv(v2, BindingValue::Ops(_)) if v2 == OPERATIONS_VAR)
                {
                    slots += 1;
                }
            }
        }
    });
    (slots, payloads)
}

#[test]
fn simple_replace() {
    let rule = compile("@@ identifier x; @@\n- foo(x);\n+ bar(x);\n").unwrap();
    assert_eq!(rule.metavars.get("x"), Some(&MetavarConstraint::Identifier));

    // formula shape: ExistsVar("x", And(Statement(foo(x)), slot[Replace]))
    let Formula::ExistsVar(v, inner) = &rule.formula else {
        panic!("expected a quantifier at the root, got {}", rule.formula);
    };
    assert_eq!(v, "x");
    let Formula::And(atom, slot) = inner.as_ref() else {
        panic!("expected a slot conjunction, got {inner}");
    };
    assert!(matches!(atom.as_ref(), Formula::Statement(p) if p.stmt.to_string() == "foo(x);"));
    let Formula::ExistsVar(sv, setenv) = slot.as_ref() else {
        panic!("expected an operations slot, got {slot}");
    };
    assert_eq!(sv, OPERATIONS_VAR);
    let Formula::SetEnv(_, BindingValue::Ops(ops)) = setenv.as_ref() else {
        panic!("expected an operations payload");
    };
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0], Operation::Replace(s) if s.to_string() == "bar(x);"));

    // and against a concrete target the replace surfaces as a witness
    let all_ops = ops_of(&rule, "void m() { foo(queue); done(); }");
    assert_eq!(all_ops.len(), 1);
    assert!(matches!(
        &all_ops[0][0],
        Operation::Replace(s) if s.to_string() == "bar(x);"
    ));
}

#[test]
fn dots_with_append() {
    let rule = compile("@@ @@\na();\n...\n+ b();\nc();\n").unwrap();

    // formula shape: Statement(a) & AX(AU(True, Statement(c) & slot[Prepend]))
    let Formula::And(atom_a, ax) = &rule.formula else {
        panic!("unexpected shape {}", rule.formula);
    };
    assert!(matches!(atom_a.as_ref(), Formula::Statement(p) if p.stmt.to_string() == "a();"));
    let Formula::AllNext(until) = ax.as_ref() else {
        panic!("expected AX, got {ax}");
    };
    let Formula::AllUntil(guard, inner) = until.as_ref() else {
        panic!("expected AU, got {until}");
    };
    assert_eq!(guard.as_ref(), &Formula::True);
    let Formula::And(atom_c, slot) = inner.as_ref() else {
        panic!("expected slot conjunction, got {inner}");
    };
    assert!(matches!(atom_c.as_ref(), Formula::Statement(p) if p.stmt.to_string() == "c();"));
    let (slots, payloads) = count_slots(&rule.formula);
    assert_eq!((slots, payloads), (1, 1));
    assert!(format!("{slot}").contains("prepend b();"));

    // the dots really do skip intervening statements
    let ops = ops_of(&rule, "void m() { a(); x(); y(); c(); }");
    assert_eq!(ops.len(), 1);
    assert!(matches!(&ops[0][0], Operation::Prepend(s) if s.to_string() == "b();"));

    // but the chain must still reach c()
    assert!(ops_of(&rule, "void m() { a(); x(); }").is_empty());
}

#[test]
fn if_branch_insertion() {
    let rule = compile("@@ @@\nif (cond) {\n+ log();\nwork();\n}\n").unwrap();
    let embedded = rule.formula.embedded_operations();
    assert_eq!(embedded.len(), 1);
    assert!(matches!(
        &embedded[0][0],
        Operation::InsertIntoBlock {
            block: BlockType::TrueBranch,
            anchor: InsertAnchor::Top,
            stmt,
        } if stmt.to_string() == "log();"
    ));

    // the slot rides the trueBranch proposition
    let mut on_true_branch = false;
    rule.formula.visit(&mut |f| {
        if let Formula::And(lhs, _) = f {
            if matches!(lhs.as_ref(), Formula::Proposition(TagLabel::TrueBranch)) {
                on_true_branch = true;
            }
        }
    });
    assert!(on_true_branch);

    let ops = ops_of(&rule, "void m() { if (cond) { work(); } }");
    assert_eq!(ops.len(), 1);

    // an if with a different body shape does not match
    assert!(ops_of(&rule, "void m() { if (cond) { rest(); } }").is_empty());
}

#[test]
fn metavariable_quantified_at_first_use() {
    let rule = compile("@@ identifier f; @@\nf(1);\nf(2);\n").unwrap();
    // quantified exactly once, at the root (the first statement atom)
    let Formula::ExistsVar(v, inner) = &rule.formula else {
        panic!("expected root quantifier, got {}", rule.formula);
    };
    assert_eq!(v, "f");
    let mut binders = 0;
    inner.visit(&mut |f| {
        if matches!(f, Formula::ExistsVar(name, _) if name == "f") {
            binders += 1;
        }
    });
    assert_eq!(binders, 0, "f must not be re-quantified");

    // consistent binding across both uses
    let target = parse_method("void m() { update(1); update(2); }").unwrap();
    let rows = rule.check(&target).unwrap();
    assert!(rows
        .iter()
        .any(|r| r.witnesses.iter().any(|w| w.metavar == "f"
            && w.binding == BindingValue::Name("update".to_string()))));

    // inconsistent call names do not match
    let target = parse_method("void m() { update(1); refresh(2); }").unwrap();
    assert!(rule.check(&target).unwrap().is_empty());
}

#[test]
fn deletes_around_dots() {
    let rule = compile("@@ @@\n- a();\n...\n- b();\n").unwrap();
    let embedded = rule.formula.embedded_operations();
    assert_eq!(embedded.len(), 2);
    assert!(embedded.iter().all(|ops| ops == &[Operation::Delete]));

    let mut saw_until = false;
    rule.formula.visit(&mut |f| {
        if matches!(f, Formula::AllUntil(..)) {
            saw_until = true;
        }
    });
    assert!(saw_until);

    let target = parse_method("void m() { a(); keep(); b(); }").unwrap();
    let rows = rule.check(&target).unwrap();
    assert!(!rows.is_empty());
    let sites: Vec<_> = rows
        .iter()
        .flat_map(|r| collect_operations(&r.witnesses))
        .collect();
    // two distinct states carry a delete each
    assert_eq!(sites.len(), 2);
    assert_ne!(sites[0].0, sites[1].0);
}

#[test]
fn regex_constrained_metavariable() {
    let rule = compile("@@\nidentifier x;\nx when matches \"^get.*\"\n@@\n- x();\n").unwrap();
    assert_eq!(
        rule.metavars.get("x"),
        Some(&MetavarConstraint::regex("^get.*", MetavarConstraint::Identifier).unwrap())
    );
    assert!(!ops_of(&rule, "void m() { getName(); }").is_empty());
    assert!(ops_of(&rule, "void m() { setName(); }").is_empty());
}

#[test]
fn when_not_equal_guards_the_dots() {
    let rule = compile("@@ @@\na();\n... when != stop()\nb();\n").unwrap();
    let mut guard_negated = false;
    rule.formula.visit(&mut |f| {
        if let Formula::AllUntil(guard, _) = f {
            if matches!(guard.as_ref(), Formula::And(_, n) if matches!(n.as_ref(), Formula::Not(_)))
            {
                guard_negated = true;
            }
        }
    });
    assert!(guard_negated);

    let target = parse_method("void m() { a(); go(); b(); }").unwrap();
    assert!(!rule.check(&target).unwrap().is_empty());
    let blocked = parse_method("void m() { a(); stop(); b(); }").unwrap();
    assert!(rule.check(&blocked).unwrap().is_empty());
}

#[test]
fn universal_invariants_hold_across_patches() {
    let patches = [
        "@@ identifier x; @@\n- foo(x);\n+ bar(x);\n",
        "@@ @@\na();\n...\n+ b();\nc();\n",
        "@@ @@\nif (cond) {\n+ log();\nwork();\n}\n",
        "@@ identifier f; @@\nf(1);\nf(2);\n",
        "@@ @@\n- a();\n...\n- b();\n",
        "@@ identifier x, y; @@\nif (x > y) {\n- swap(x, y);\n+ order(x, y);\n}\n",
    ];
    for patch in patches {
        let rule = compile(patch).unwrap();
        check_single_quantification(&rule.formula, &mut Vec::new());
        let (slots, payloads) = count_slots(&rule.formula);
        assert_eq!(slots, payloads, "stray operations payload in {patch}");
        // optimisation is a fixed point on compiler output
        let optimized = seam::ctl::optimize(rule.formula.clone());
        assert_eq!(optimized, rule.formula, "optimizer not idempotent for {patch}");
    }
}

#[test]
fn anchor_map_accounts_for_every_addition() {
    let patch = "@@ @@\na();\n+ one();\nb();\n+ two();\nc();\n";
    let rule = compile(patch).unwrap();
    let embedded = rule.formula.embedded_operations();
    let mut added: Vec<String> = embedded
        .iter()
        .flat_map(|ops| ops.iter())
        .filter_map(|op| match op {
            Operation::Append(s) | Operation::Prepend(s) => Some(s.to_string()),
            _ => None,
        })
        .collect();
    added.sort();
    assert_eq!(added, vec!["one();".to_string(), "two();".to_string()]);
}

#[test]
fn additions_only_patch_keeps_operations_reachable() {
    // a patch with no deletions still produces anchored additions
    let rule = compile("@@ @@\nstart();\n+ audit();\n").unwrap();
    let embedded = rule.formula.embedded_operations();
    assert_eq!(embedded.len(), 1);
    assert!(matches!(
        &embedded[0][0],
        Operation::Append(s) if s.to_string() == "audit();"
    ));
    let ops = ops_of(&rule, "void m() { start(); finish(); }");
    assert_eq!(ops.len(), 1);
}

#[test]
fn method_body_top_insertion_rides_first_slot() {
    let rule = compile("@@ @@\n+ init();\nwork();\n").unwrap();
    let embedded = rule.formula.embedded_operations();
    assert_eq!(embedded.len(), 1);
    assert!(matches!(
        &embedded[0][0],
        Operation::InsertIntoBlock {
            block: BlockType::MethodBody,
            anchor: InsertAnchor::Top,
            ..
        }
    ));
}

#[test]
fn loops_in_targets_do_not_diverge() {
    let target =
        parse_method("void m() { open(); while (more()) { step(); } close(); }").unwrap();
    // universal dots refuse the path that can loop forever, but the
    // fixpoint still terminates on the cyclic model
    let au_rule = compile("@@ @@\nopen();\n...\nclose();\n").unwrap();
    assert!(au_rule.check(&target).unwrap().is_empty());
    // existential dots match through the loop
    let eu_rule = compile("@@ @@\nopen();\n... when exists\nclose();\n").unwrap();
    assert!(!eu_rule.check(&target).unwrap().is_empty());
}

#[test]
fn when_not_equal_with_metavariable_uses_negative_bindings() {
    let rule = compile("@@ identifier x; @@\nfree(x);\n... when != use(x)\nfree(x);\n").unwrap();
    // a use of the same variable between the two frees blocks the match
    let blocked = parse_method("void m() { free(p); use(p); free(p); }").unwrap();
    assert!(rule.check(&blocked).unwrap().is_empty());
    // a use of a different variable does not
    let ok = parse_method("void m() { free(p); use(q); free(p); }").unwrap();
    assert!(!rule.check(&ok).unwrap().is_empty());
}

#[test]
fn while_patterns_match_loops() {
    let rule = compile("@@ identifier i; @@\nwhile (i < limit) {\n+ tick();\nstep(i);\n}\n")
        .unwrap();
    let ops = ops_of(&rule, "void m() { while (n < limit) { step(n); } }");
    assert_eq!(ops.len(), 1);
    assert!(matches!(
        &ops[0][0],
        Operation::InsertIntoBlock {
            block: BlockType::TrueBranch,
            anchor: InsertAnchor::Top,
            ..
        }
    ));
}

#[test]
fn typed_metavariable_restricts_matches() {
    let rule = compile("@@ List l; @@\n- l.clear();\n").unwrap();
    assert!(!ops_of(&rule, "void m(List items) { items.clear(); }").is_empty());
    assert!(ops_of(&rule, "void m(Set items) { items.clear(); }").is_empty());
}

#[test]
fn constant_metavariable_binds_literals() {
    let rule = compile("@@ constant c; @@\n- retry(c);\n+ retryWithBackoff(c);\n").unwrap();
    assert!(!ops_of(&rule, "void m() { retry(3); }").is_empty());
    assert!(ops_of(&rule, "void m() { retry(count); }").is_empty());
}
