use crate::ctl::env::Environment;
use crate::metavar::{MetavarTable, TypeContext};
use crate::smpl::PARAMETER_DOTS_NAME;
use seam_java::{Expr, Method, Stmt, TypeRef};

/// Unifies pattern fragments (statements and expressions carrying
/// metavariable holes) against target AST fragments, producing binding
/// environments. A metavariable bound once must bind equal across all its
/// uses; the environment enforces that.
pub struct Matcher<'a> {
    metavars: &'a MetavarTable,
    types: &'a TypeContext,
}

impl<'a> Matcher<'a> {
    pub fn new(metavars: &'a MetavarTable, types: &'a TypeContext) -> Self {
        Self { metavars, types }
    }

    pub fn match_stmt(&self, pattern: &Stmt, target: &Stmt) -> Option<Environment> {
        let mut env = Environment::new();
        self.unify_stmt(pattern, target, &mut env).then_some(env)
    }

    pub fn match_cond(&self, pattern: &Expr, target: &Expr) -> Option<Environment> {
        let mut env = Environment::new();
        self.unify_expr(pattern, target, &mut env).then_some(env)
    }

    /// Unify a rule method's header against a target method's header:
    /// return type, name and parameters, with metavariable holes allowed in
    /// all three. A lone dots parameter in the pattern accepts any target
    /// parameter list. Modifiers are not compared.
    pub fn match_header(&self, pattern: &Method, target: &Method) -> Option<Environment> {
        let mut env = Environment::new();
        if !self.unify_type(&pattern.ret, &target.ret, &mut env)
            || !self.unify_name(&pattern.name, &target.name, &mut env)
        {
            return None;
        }
        let dots_params = matches!(
            pattern.params.as_slice(),
            [p] if p.name == PARAMETER_DOTS_NAME
        );
        if !dots_params {
            if pattern.params.len() != target.params.len() {
                return None;
            }
            for (p, t) in pattern.params.iter().zip(target.params.iter()) {
                if !self.unify_type(&p.ty, &t.ty, &mut env)
                    || !self.unify_name(&p.name, &t.name, &mut env)
                {
                    return None;
                }
            }
        }
        Some(env)
    }

    fn unify_stmt(&self, pattern: &Stmt, target: &Stmt, env: &mut Environment) -> bool {
        match (pattern, target) {
            (Stmt::Expr { expr: p, .. }, Stmt::Expr { expr: t, .. }) => {
                self.unify_expr(p, t, env)
            }
            (
                Stmt::Local {
                    ty: pt,
                    name: pn,
                    init: pi,
                    ..
                },
                Stmt::Local {
                    ty: tt,
                    name: tn,
                    init: ti,
                    ..
                },
            ) => {
                self.unify_type(pt, tt, env)
                    && self.unify_name(pn, tn, env)
                    && self.unify_opt_expr(pi.as_ref(), ti.as_ref(), env)
            }
            (Stmt::Return { value: p, .. }, Stmt::Return { value: t, .. }) => {
                self.unify_opt_expr(p.as_ref(), t.as_ref(), env)
            }
            _ => false,
        }
    }

    fn unify_opt_expr(
        &self,
        pattern: Option<&Expr>,
        target: Option<&Expr>,
        env: &mut Environment,
    ) -> bool {
        match (pattern, target) {
            (None, None) => true,
            (Some(p), Some(t)) => self.unify_expr(p, t, env),
            _ => false,
        }
    }

    fn unify_expr(&self, pattern: &Expr, target: &Expr, env: &mut Environment) -> bool {
        // a name that is a declared metavariable is a hole
        if let Expr::Name(n) = pattern {
            if let Some(constraint) = self.metavars.get(n) {
                return match constraint.match_expr(target, self.types) {
                    Some(value) => env.bind(n, value),
                    None => false,
                };
            }
        }
        match (pattern, target) {
            (Expr::Name(p), Expr::Name(t)) => p == t,
            (Expr::Lit(p), Expr::Lit(t)) => p == t,
            (
                Expr::Call {
                    receiver: pr,
                    name: pn,
                    args: pa,
                },
                Expr::Call {
                    receiver: tr,
                    name: tn,
                    args: ta,
                },
            ) => {
                self.unify_opt_receiver(pr.as_deref(), tr.as_deref(), env)
                    && self.unify_name(pn, tn, env)
                    && pa.len() == ta.len()
                    && pa
                        .iter()
                        .zip(ta.iter())
                        .all(|(p, t)| self.unify_expr(p, t, env))
            }
            (
                Expr::Field {
                    receiver: pr,
                    name: pn,
                },
                Expr::Field {
                    receiver: tr,
                    name: tn,
                },
            ) => self.unify_name(pn, tn, env) && self.unify_expr(pr, tr, env),
            (
                Expr::New {
                    class: pc,
                    args: pa,
                },
                Expr::New {
                    class: tc,
                    args: ta,
                },
            ) => {
                self.unify_type(pc, tc, env)
                    && pa.len() == ta.len()
                    && pa
                        .iter()
                        .zip(ta.iter())
                        .all(|(p, t)| self.unify_expr(p, t, env))
            }
            (
                Expr::Unary {
                    op: po,
                    operand: pe,
                },
                Expr::Unary {
                    op: to,
                    operand: te,
                },
            ) => po == to && self.unify_expr(pe, te, env),
            (
                Expr::Binary {
                    op: po,
                    lhs: pl,
                    rhs: pr,
                },
                Expr::Binary {
                    op: to,
                    lhs: tl,
                    rhs: tr,
                },
            ) => po == to && self.unify_expr(pl, tl, env) && self.unify_expr(pr, tr, env),
            (
                Expr::Assign {
                    target: pt,
                    value: pv,
                },
                Expr::Assign {
                    target: tt,
                    value: tv,
                },
            ) => self.unify_expr(pt, tt, env) && self.unify_expr(pv, tv, env),
            _ => false,
        }
    }

    fn unify_opt_receiver(
        &self,
        pattern: Option<&Expr>,
        target: Option<&Expr>,
        env: &mut Environment,
    ) -> bool {
        match (pattern, target) {
            (None, None) => true,
            (Some(p), Some(t)) => self.unify_expr(p, t, env),
            _ => false,
        }
    }

    fn unify_name(&self, pattern: &str, target: &str, env: &mut Environment) -> bool {
        if let Some(constraint) = self.metavars.get(pattern) {
            match constraint.match_name(target, self.types) {
                Some(value) => env.bind(pattern, value),
                None => false,
            }
        } else {
            pattern == target
        }
    }

    fn unify_type(&self, pattern: &TypeRef, target: &TypeRef, env: &mut Environment) -> bool {
        if let Some(constraint) = self.metavars.get(&pattern.name) {
            match constraint.match_type(&target.name) {
                Some(value) => env.bind(&pattern.name, value),
                None => false,
            }
        } else {
            pattern.name == target.name
        }
    }
}

/// The declared metavariables a statement references, sorted and deduped
pub fn metavar_refs(stmt: &Stmt, metavars: &MetavarTable) -> Vec<String> {
    let mut out = Vec::new();
    refs_in_stmt(stmt, metavars, &mut out);
    out.sort_unstable();
    out.dedup();
    out
}

/// The declared metavariables an expression references, sorted and deduped
pub fn expr_metavar_refs(expr: &Expr, metavars: &MetavarTable) -> Vec<String> {
    let mut out = Vec::new();
    refs_in_expr(expr, metavars, &mut out);
    out.sort_unstable();
    out.dedup();
    out
}

fn refs_in_stmt(stmt: &Stmt, metavars: &MetavarTable, out: &mut Vec<String>) {
    match stmt {
        Stmt::Expr { expr, .. } => refs_in_expr(expr, metavars, out),
        Stmt::Local { ty, name, init, .. } => {
            note(&ty.name, metavars, out);
            note(name, metavars, out);
            if let Some(init) = init {
                refs_in_expr(init, metavars, out);
            }
        }
        Stmt::Return { value, .. } => {
            if let Some(v) = value {
                refs_in_expr(v, metavars, out);
            }
        }
        Stmt::If { cond, .. } | Stmt::While { cond, .. } => {
            refs_in_expr(cond, metavars, out);
        }
    }
}

fn refs_in_expr(expr: &Expr, metavars: &MetavarTable, out: &mut Vec<String>) {
    match expr {
        Expr::Name(n) => note(n, metavars, out),
        Expr::Lit(_) => {}
        Expr::Call {
            receiver,
            name,
            args,
        } => {
            note(name, metavars, out);
            if let Some(r) = receiver {
                refs_in_expr(r, metavars, out);
            }
            for a in args {
                refs_in_expr(a, metavars, out);
            }
        }
        Expr::Field { receiver, name } => {
            note(name, metavars, out);
            refs_in_expr(receiver, metavars, out);
        }
        Expr::New { class, args } => {
            note(&class.name, metavars, out);
            for a in args {
                refs_in_expr(a, metavars, out);
            }
        }
        Expr::Unary { operand, .. } => refs_in_expr(operand, metavars, out),
        Expr::Binary { lhs, rhs, .. } => {
            refs_in_expr(lhs, metavars, out);
            refs_in_expr(rhs, metavars, out);
        }
        Expr::Assign { target, value } => {
            refs_in_expr(target, metavars, out);
            refs_in_expr(value, metavars, out);
        }
    }
}

fn note(name: &str, metavars: &MetavarTable, out: &mut Vec<String>) {
    if metavars.contains(name) {
        out.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctl::env::{Binding, BindingValue};
    use crate::metavar::MetavarConstraint;
    use seam_java::parse_method;

    fn stmt(src: &str) -> Stmt {
        let full = format!("void m() {{ {src} }}");
        parse_method(&full).unwrap().body.stmts.remove(0)
    }

    fn table() -> MetavarTable {
        let mut t = MetavarTable::new();
        t.declare("x", MetavarConstraint::Identifier);
        t.declare("e", MetavarConstraint::Expression);
        t
    }

    #[test]
    fn identifier_hole_binds_target_name() {
        let types = TypeContext::default();
        let table = table();
        let m = Matcher::new(&table, &types);
        let env = m.match_stmt(&stmt("foo(x);"), &stmt("foo(y);")).unwrap();
        assert_eq!(
            env.get("x"),
            Some(&Binding::Bound(BindingValue::Name("y".to_string())))
        );
    }

    #[test]
    fn bound_metavariable_must_repeat() {
        let types = TypeContext::default();
        let table = table();
        let m = Matcher::new(&table, &types);
        assert!(m.match_stmt(&stmt("f(x, x);"), &stmt("f(a, a);")).is_some());
        assert!(m.match_stmt(&stmt("f(x, x);"), &stmt("f(a, b);")).is_none());
    }

    #[test]
    fn expression_hole_binds_whole_argument() {
        let types = TypeContext::default();
        let table = table();
        let m = Matcher::new(&table, &types);
        let env = m
            .match_stmt(&stmt("foo(e);"), &stmt("foo(a + b);"))
            .unwrap();
        assert!(matches!(
            env.get("e"),
            Some(Binding::Bound(BindingValue::Expr(_)))
        ));
    }

    #[test]
    fn call_name_can_be_a_metavariable() {
        let types = TypeContext::default();
        let table = table();
        let m = Matcher::new(&table, &types);
        let env = m.match_stmt(&stmt("x(1);"), &stmt("update(1);")).unwrap();
        assert_eq!(
            env.get("x"),
            Some(&Binding::Bound(BindingValue::Name("update".to_string())))
        );
    }

    #[test]
    fn construction_unifies_class_through_type_metavariable() {
        let types = TypeContext::default();
        let mut table = MetavarTable::new();
        table.declare("T", crate::metavar::MetavarConstraint::Type);
        let m = Matcher::new(&table, &types);
        let env = m
            .match_stmt(&stmt("cache(new T(1));"), &stmt("cache(new Entry(1));"))
            .unwrap();
        assert_eq!(
            env.get("T"),
            Some(&Binding::Bound(BindingValue::Ty("Entry".to_string())))
        );
        assert!(m
            .match_stmt(&stmt("cache(new T(1));"), &stmt("cache(make(1));"))
            .is_none());
    }

    #[test]
    fn structure_must_agree() {
        let types = TypeContext::default();
        let table = table();
        let m = Matcher::new(&table, &types);
        assert!(m.match_stmt(&stmt("foo(x);"), &stmt("bar(y);")).is_none());
        assert!(m.match_stmt(&stmt("foo(x);"), &stmt("foo(y, z);")).is_none());
        assert!(m.match_stmt(&stmt("foo(x);"), &stmt("return y;")).is_none());
    }

    #[test]
    fn refs_are_sorted_and_deduped() {
        let table = table();
        let refs = metavar_refs(&stmt("f(x, e, x);"), &table);
        assert_eq!(refs, vec!["e".to_string(), "x".to_string()]);
    }
}
