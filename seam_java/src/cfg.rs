use crate::ast::{Block, BlockId, Method, Stmt};
use serde::{Deserialize, Serialize};
use tracing::trace;

pub type NodeId = usize;

/// Node kinds of the un-simplified control flow graph. Block bracketing
/// nodes (`BlockBegin`/`BlockEnd`) are kept in the output; consumers that
/// want a simplified graph elide them on their side.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Begin,
    Exit,
    Statement,
    Branch,
    BlockBegin,
    BlockEnd,
    Converge,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Present on `Statement` and `Branch` nodes
    pub stmt: Option<Stmt>,
    /// Present on `BlockBegin` nodes: the block being opened
    pub block: Option<BlockId>,
    pub successors: Vec<NodeId>,
}

/// A control flow graph over one method body. Nodes live in an arena and
/// reference each other by id; ids double as arena indices.
#[derive(Clone, Debug, Default)]
pub struct Cfg {
    nodes: Vec<CfgNode>,
    begin: NodeId,
    exit: NodeId,
}

impl Cfg {
    pub fn node(&self, id: NodeId) -> &CfgNode {
        &self.nodes[id]
    }

    pub fn begin(&self) -> &CfgNode {
        &self.nodes[self.begin]
    }

    pub fn exit_id(&self) -> NodeId {
        self.exit
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfgNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Builds [`Cfg`] values for method bodies. The node-id counter is scoped to
/// the builder, so a fresh builder restarts ids at zero; tests that need
/// reproducible ids construct one builder per graph.
#[derive(Debug, Default)]
pub struct CfgBuilder {
    nodes: Vec<CfgNode>,
    exit: NodeId,
}

impl CfgBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(mut self, method: &Method) -> Cfg {
        let begin = self.alloc(NodeKind::Begin, None, None);
        let exit = self.alloc(NodeKind::Exit, None, None);
        self.exit = exit;

        let body_begin = self.alloc(NodeKind::BlockBegin, None, Some(method.body.id));
        self.connect(begin, body_begin);
        let last = self.build_stmts(&method.body, body_begin);
        let body_end = self.alloc(NodeKind::BlockEnd, None, None);
        if let Some(last) = last {
            self.connect(last, body_end);
        }
        self.connect(body_end, exit);

        trace!(method = %method.name, nodes = self.nodes.len(), "built cfg");
        Cfg {
            nodes: self.nodes,
            begin,
            exit,
        }
    }

    fn alloc(&mut self, kind: NodeKind, stmt: Option<Stmt>, block: Option<BlockId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(CfgNode {
            id,
            kind,
            stmt,
            block,
            successors: Vec::new(),
        });
        id
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        self.nodes[from].successors.push(to);
    }

    /// Chain the statements of `block` after `entry`; returns the node the
    /// block's fall-through continues from, or `None` when the block ends in
    /// a `return`.
    fn build_stmts(&mut self, block: &Block, entry: NodeId) -> Option<NodeId> {
        let mut cur = Some(entry);
        for stmt in &block.stmts {
            match stmt {
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    let branch = self.alloc(NodeKind::Branch, Some(stmt.clone()), None);
                    if let Some(c) = cur {
                        self.connect(c, branch);
                    }
                    // the convergence node is allocated immediately after its
                    // branch; downstream lookups rely on this id adjacency
                    let converge = self.alloc(NodeKind::Converge, None, None);

                    let then_end = self.build_branch_arm(then_block, branch);
                    self.connect(then_end, converge);
                    match else_block {
                        Some(e) => {
                            let else_end = self.build_branch_arm(e, branch);
                            self.connect(else_end, converge);
                        }
                        None => self.connect(branch, converge),
                    }
                    cur = Some(converge);
                }
                Stmt::While { body, .. } => {
                    let branch = self.alloc(NodeKind::Branch, Some(stmt.clone()), None);
                    if let Some(c) = cur {
                        self.connect(c, branch);
                    }
                    let converge = self.alloc(NodeKind::Converge, None, None);

                    let body_end = self.build_branch_arm(body, branch);
                    // the back edge
                    self.connect(body_end, branch);
                    self.connect(branch, converge);
                    cur = Some(converge);
                }
                Stmt::Return { .. } => {
                    let node = self.alloc(NodeKind::Statement, Some(stmt.clone()), None);
                    if let Some(c) = cur {
                        self.connect(c, node);
                    }
                    self.connect(node, self.exit);
                    cur = None;
                }
                _ => {
                    let node = self.alloc(NodeKind::Statement, Some(stmt.clone()), None);
                    if let Some(c) = cur {
                        self.connect(c, node);
                    }
                    cur = Some(node);
                }
            }
        }
        cur
    }

    /// Build one arm of a branch: `BlockBegin -> stmts -> BlockEnd`.
    /// Returns the arm's `BlockEnd` node, which the caller wires onward.
    fn build_branch_arm(&mut self, block: &Block, branch: NodeId) -> NodeId {
        let begin = self.alloc(NodeKind::BlockBegin, None, Some(block.id));
        self.connect(branch, begin);
        let last = self.build_stmts(block, begin);
        let end = self.alloc(NodeKind::BlockEnd, None, None);
        if let Some(last) = last {
            self.connect(last, end);
        }
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_method;

    fn build(src: &str) -> Cfg {
        CfgBuilder::new().build(&parse_method(src).unwrap())
    }

    fn kinds_of(cfg: &Cfg, kind: NodeKind) -> Vec<NodeId> {
        cfg.nodes()
            .filter(|n| n.kind == kind)
            .map(|n| n.id)
            .collect()
    }

    #[test]
    fn straight_line_shape() {
        let cfg = build("void m() { a(); b(); }");
        // Begin -> BlockBegin -> a -> b -> BlockEnd -> Exit
        let begin = cfg.begin();
        assert_eq!(begin.kind, NodeKind::Begin);
        let bb = cfg.node(begin.successors[0]);
        assert_eq!(bb.kind, NodeKind::BlockBegin);
        let a = cfg.node(bb.successors[0]);
        assert_eq!(a.kind, NodeKind::Statement);
        let b = cfg.node(a.successors[0]);
        assert_eq!(b.kind, NodeKind::Statement);
        let be = cfg.node(b.successors[0]);
        assert_eq!(be.kind, NodeKind::BlockEnd);
        assert_eq!(cfg.node(be.successors[0]).kind, NodeKind::Exit);
    }

    #[test]
    fn branch_has_two_successors_and_adjacent_converge() {
        let cfg = build("void m() { if (c) { a(); } else { b(); } d(); }");
        let branches = kinds_of(&cfg, NodeKind::Branch);
        assert_eq!(branches.len(), 1);
        let branch = cfg.node(branches[0]);
        assert_eq!(branch.successors.len(), 2);
        let converge = cfg.node(branch.id + 1);
        assert_eq!(converge.kind, NodeKind::Converge);
        // both arms reach the converge through their BlockEnd
        for arm in &branch.successors {
            assert_eq!(cfg.node(*arm).kind, NodeKind::BlockBegin);
        }
    }

    #[test]
    fn if_without_else_falls_to_converge() {
        let cfg = build("void m() { if (c) { a(); } d(); }");
        let branch = cfg.node(kinds_of(&cfg, NodeKind::Branch)[0]);
        let converge = kinds_of(&cfg, NodeKind::Converge)[0];
        assert!(branch.successors.contains(&converge));
    }

    #[test]
    fn while_has_back_edge() {
        let cfg = build("void m() { while (c) { a(); } }");
        let branch = cfg.node(kinds_of(&cfg, NodeKind::Branch)[0]);
        // some node inside the body points back at the branch
        let back = cfg
            .nodes()
            .any(|n| n.id != branch.id && n.successors.contains(&branch.id));
        assert!(back);
    }

    #[test]
    fn return_jumps_to_exit() {
        let cfg = build("void m() { if (c) { return; } a(); }");
        let exit = cfg.exit_id();
        let ret = cfg
            .nodes()
            .find(|n| matches!(n.stmt, Some(Stmt::Return { .. })))
            .unwrap();
        assert_eq!(ret.successors, vec![exit]);
    }

    #[test]
    fn fresh_builders_restart_ids() {
        let a = build("void m() { a(); }");
        let b = build("void m() { a(); }");
        let ids_a: Vec<_> = a.nodes().map(|n| n.id).collect();
        let ids_b: Vec<_> = b.nodes().map(|n| n.id).collect();
        assert_eq!(ids_a, ids_b);
        assert_eq!(a.begin().id, 0);
    }
}
