use crate::error::SeamError;
use crate::smpl::IMPLICIT_DOTS_MARKER;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use seam_java::{BlockId, Cfg, NodeId, NodeKind, Stmt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use tracing::trace;

/// Labels attached by the adapter to branch-related nodes. Rendered with
/// the spelling the formula propositions use.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TagLabel {
    Branch,
    TrueBranch,
    FalseBranch,
    After,
}

impl Display for TagLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TagLabel::Branch => write!(f, "branch"),
            TagLabel::TrueBranch => write!(f, "trueBranch"),
            TagLabel::FalseBranch => write!(f, "falseBranch"),
            TagLabel::After => write!(f, "after"),
        }
    }
}

/// A tag tying a CFG node to the branch statement it belongs to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeTag {
    pub label: TagLabel,
    pub anchor: Stmt,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmplNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub stmt: Option<Stmt>,
    pub block: Option<BlockId>,
}

impl SmplNode {
    pub fn line(&self) -> Option<usize> {
        self.stmt.as_ref().map(Stmt::line)
    }
}

/// The adapted control flow graph the matcher works on: the generic graph
/// with block bracketing elided, branches tagged and the synthetic
/// implicit-dots wrapper unwrapped. Backed by a petgraph digraph plus an
/// id-indexed arena, so nodes are addressed by their original ids.
#[derive(Debug)]
pub struct SmplCfg {
    graph: DiGraph<NodeId, ()>,
    nodes: BTreeMap<NodeId, SmplNode>,
    indices: HashMap<NodeId, NodeIndex>,
    tags: HashMap<NodeId, NodeTag>,
    begin: NodeId,
    exit: NodeId,
}

impl SmplCfg {
    /// Adapt an un-simplified generic CFG. Rejects graphs whose block
    /// bracketing was already removed; the adapter owns that elision.
    pub fn adapt(cfg: &Cfg) -> Result<Self, SeamError> {
        if !cfg.nodes().any(|n| n.kind == NodeKind::BlockBegin) {
            return Err(SeamError::SimplifiedCfg);
        }

        let mut nodes: BTreeMap<NodeId, SmplNode> = cfg
            .nodes()
            .map(|n| {
                (
                    n.id,
                    SmplNode {
                        id: n.id,
                        kind: n.kind,
                        stmt: n.stmt.clone(),
                        block: n.block,
                    },
                )
            })
            .collect();
        let mut edges: Vec<(NodeId, NodeId)> = cfg
            .nodes()
            .flat_map(|n| n.successors.iter().map(move |s| (n.id, *s)))
            .collect();
        let begin = cfg.begin().id;
        let exit = cfg.exit_id();

        // the method body block, sole successor of Begin
        let outer = successors_in(&edges, begin)
            .first()
            .copied()
            .ok_or(SeamError::MissingSuccessor(begin))?;
        if nodes[&outer].kind != NodeKind::BlockBegin {
            return Err(SeamError::UnexpectedNode(outer));
        }
        remove_bridging(&mut nodes, &mut edges, outer);

        let block_ends: Vec<NodeId> = nodes
            .values()
            .filter(|n| n.kind == NodeKind::BlockEnd)
            .map(|n| n.id)
            .collect();
        for id in block_ends {
            remove_bridging(&mut nodes, &mut edges, id);
        }

        unwrap_implicit_dots(&mut nodes, &mut edges)?;

        let tags = tag_branches(&nodes, &edges)?;

        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for id in nodes.keys() {
            indices.insert(*id, graph.add_node(*id));
        }
        for (from, to) in &edges {
            graph.add_edge(indices[from], indices[to], ());
        }
        trace!(
            states = nodes.len(),
            tags = tags.len(),
            "adapted cfg"
        );
        Ok(Self {
            graph,
            nodes,
            indices,
            tags,
            begin,
            exit,
        })
    }

    pub fn node(&self, id: NodeId) -> &SmplNode {
        &self.nodes[&id]
    }

    pub fn tag(&self, id: NodeId) -> Option<&NodeTag> {
        self.tags.get(&id)
    }

    pub fn begin_id(&self) -> NodeId {
        self.begin
    }

    pub fn exit_id(&self) -> NodeId {
        self.exit
    }

    /// The node the walk starts from: the sole successor of Begin
    pub fn entry(&self) -> Result<NodeId, SeamError> {
        self.successors(self.begin)
            .first()
            .copied()
            .ok_or(SeamError::MissingSuccessor(self.begin))
    }

    /// All state ids, ascending
    pub fn states(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .graph
            .neighbors_directed(self.indices[&id], Direction::Outgoing)
            .map(|idx| self.graph[idx])
            .collect();
        // petgraph iterates neighbors newest-first; restore insertion order
        out.reverse();
        out
    }

    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .graph
            .neighbors_directed(self.indices[&id], Direction::Incoming)
            .map(|idx| self.graph[idx])
            .collect();
        out.reverse();
        out
    }

    pub fn graph(&self) -> &DiGraph<NodeId, ()> {
        &self.graph
    }
}

fn successors_in(edges: &[(NodeId, NodeId)], id: NodeId) -> Vec<NodeId> {
    edges
        .iter()
        .filter(|(from, _)| *from == id)
        .map(|(_, to)| *to)
        .collect()
}

fn predecessors_in(edges: &[(NodeId, NodeId)], id: NodeId) -> Vec<NodeId> {
    edges
        .iter()
        .filter(|(_, to)| *to == id)
        .map(|(from, _)| *from)
        .collect()
}

fn add_edge(edges: &mut Vec<(NodeId, NodeId)>, from: NodeId, to: NodeId) {
    if !edges.contains(&(from, to)) {
        edges.push((from, to));
    }
}

/// Drop a node, preserving reachability by bridging incoming x outgoing
fn remove_bridging(
    nodes: &mut BTreeMap<NodeId, SmplNode>,
    edges: &mut Vec<(NodeId, NodeId)>,
    id: NodeId,
) {
    let preds = predecessors_in(edges, id);
    let succs = successors_in(edges, id);
    edges.retain(|(from, to)| *from != id && *to != id);
    nodes.remove(&id);
    for p in &preds {
        for s in &succs {
            add_edge(edges, *p, *s);
        }
    }
}

fn is_implicit_dots(stmt: Option<&Stmt>) -> bool {
    matches!(
        stmt.and_then(Stmt::branch_cond),
        Some(seam_java::Expr::Name(n)) if n == IMPLICIT_DOTS_MARKER
    )
}

/// Remove the synthesized `if (__SmPLImplicitDots__)` wrapper branch, its
/// body block-begin and its convergence node, splicing the wrapped body
/// straight between Begin and Exit. Target-method graphs have no marker and
/// pass through untouched.
fn unwrap_implicit_dots(
    nodes: &mut BTreeMap<NodeId, SmplNode>,
    edges: &mut Vec<(NodeId, NodeId)>,
) -> Result<(), SeamError> {
    let Some(branch) = nodes
        .values()
        .find(|n| n.kind == NodeKind::Branch && is_implicit_dots(n.stmt.as_ref()))
        .map(|n| n.id)
    else {
        return Ok(());
    };

    let succs = successors_in(edges, branch);
    let body_begin = succs
        .iter()
        .copied()
        .find(|s| nodes[s].kind == NodeKind::BlockBegin)
        .ok_or(SeamError::MalformedBranch(branch))?;
    let converge = succs
        .iter()
        .copied()
        .find(|s| nodes[s].kind == NodeKind::Converge)
        .ok_or(SeamError::MalformedBranch(branch))?;

    let body_entry = successors_in(edges, body_begin);
    let after = successors_in(edges, converge);
    let branch_preds = predecessors_in(edges, branch);
    let converge_preds: Vec<NodeId> = predecessors_in(edges, converge)
        .into_iter()
        .filter(|p| *p != branch && *p != body_begin)
        .collect();

    for id in [branch, body_begin, converge] {
        edges.retain(|(from, to)| *from != id && *to != id);
        nodes.remove(&id);
    }
    for p in &branch_preds {
        for t in &body_entry {
            if *t == converge {
                // empty wrapped body: fall through to whatever followed
                for a in &after {
                    add_edge(edges, *p, *a);
                }
            } else {
                add_edge(edges, *p, *t);
            }
        }
    }
    for q in &converge_preds {
        for a in &after {
            add_edge(edges, *q, *a);
        }
    }
    Ok(())
}

/// Tag every branch, its convergence node and the block-begin of each arm
fn tag_branches(
    nodes: &BTreeMap<NodeId, SmplNode>,
    edges: &[(NodeId, NodeId)],
) -> Result<HashMap<NodeId, NodeTag>, SeamError> {
    let mut tags = HashMap::new();
    for node in nodes.values().filter(|n| n.kind == NodeKind::Branch) {
        let anchor = node
            .stmt
            .clone()
            .ok_or(SeamError::MalformedBranch(node.id))?;
        let succs = successors_in(edges, node.id);
        if succs.len() != 2 {
            return Err(SeamError::MalformedBranch(node.id));
        }
        tags.insert(
            node.id,
            NodeTag {
                label: TagLabel::Branch,
                anchor: anchor.clone(),
            },
        );

        // the branch's own convergence node: allocated immediately after
        // the branch, so it is the lowest converge id above the branch id
        let converge = nodes
            .range(node.id + 1..)
            .find(|(_, n)| n.kind == NodeKind::Converge)
            .map(|(id, _)| *id)
            .ok_or(SeamError::MalformedBranch(node.id))?;
        tags.insert(
            converge,
            NodeTag {
                label: TagLabel::After,
                anchor: anchor.clone(),
            },
        );

        for s in succs {
            let sn = &nodes[&s];
            if sn.kind != NodeKind::BlockBegin {
                continue;
            }
            let label = match (&anchor, sn.block) {
                (Stmt::If { then_block, .. }, Some(b)) if b == then_block.id => {
                    TagLabel::TrueBranch
                }
                (
                    Stmt::If {
                        else_block: Some(e),
                        ..
                    },
                    Some(b),
                ) if b == e.id => TagLabel::FalseBranch,
                (Stmt::While { body, .. }, Some(b)) if b == body.id => TagLabel::TrueBranch,
                _ => return Err(SeamError::UnexpectedNode(s)),
            };
            tags.insert(
                s,
                NodeTag {
                    label,
                    anchor: anchor.clone(),
                },
            );
        }
    }
    Ok(tags)
}
