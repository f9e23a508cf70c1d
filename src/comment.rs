use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::reaction::{self, Engagement, Reactable, ReactionKind, ReactionState};
use crate::user::UserRef;

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommentId(String);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    pub author: UserRef,
    pub content: String,
    pub create_at: i64,
    #[serde(flatten)]
    pub engagement: Engagement,
    /// Replies in arrival order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Rc<Comment>>,
}

impl CommentId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        CommentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Comment {
    pub fn new(id: CommentId, parent_id: Option<CommentId>, author: UserRef, content: String) -> Self {
        Comment {
            id,
            parent_id,
            author,
            content,
            create_at: 0,
            engagement: Engagement::default(),
            children: Vec::new(),
        }
    }
}

impl Reactable for Comment {
    fn engagement(&self) -> &Engagement {
        &self.engagement
    }

    fn engagement_mut(&mut self) -> &mut Engagement {
        &mut self.engagement
    }
}

/// Build a reply forest from a flat list.
///
/// A reply whose parent is not in `flat` becomes a root, so nothing is
/// dropped when the parent lives on another page. Nodes caught in a parent
/// cycle are unreachable from any root; they are surfaced as roots where the
/// cycle is first met. Every input node appears exactly once in the output.
pub fn build_tree(flat: Vec<Comment>) -> Vec<Rc<Comment>> {
    let mut index: HashMap<CommentId, usize> = HashMap::with_capacity(flat.len());
    for (pos, comment) in flat.iter().enumerate() {
        index.entry(comment.id.clone()).or_insert(pos);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); flat.len()];
    let mut roots = Vec::new();
    for (pos, comment) in flat.iter().enumerate() {
        match comment.parent_id.as_ref().and_then(|parent| index.get(parent)) {
            Some(&parent) if parent != pos => children[parent].push(pos),
            Some(_) => roots.push(pos),
            None => {
                if let Some(ref parent) = comment.parent_id {
                    debug!(comment = %comment.id, parent = %parent, "parent not loaded, keeping reply as root");
                }
                roots.push(pos);
            }
        }
    }

    let mut nodes: Vec<Option<Comment>> = flat
        .into_iter()
        .map(|mut comment| {
            comment.children.clear();
            Some(comment)
        })
        .collect();

    let mut forest = Vec::with_capacity(roots.len());
    for pos in roots {
        if let Some(node) = materialize(pos, &mut nodes, &children) {
            forest.push(node);
        }
    }
    for pos in 0..nodes.len() {
        if let Some(node) = materialize(pos, &mut nodes, &children) {
            debug!(comment = %node.id, "reply sits on a parent cycle, keeping it as root");
            forest.push(node);
        }
    }
    forest
}

fn materialize(
    root: usize,
    nodes: &mut [Option<Comment>],
    children: &[Vec<usize>],
) -> Option<Rc<Comment>> {
    let node = nodes[root].take()?;
    // (node under construction, its index, next child to visit)
    let mut stack: Vec<(Comment, usize, usize)> = vec![(node, root, 0)];
    loop {
        let (pos, next) = match stack.last() {
            Some(&(_, pos, next)) => (pos, next),
            None => return None,
        };
        match children[pos].get(next) {
            Some(&child) => {
                if let Some(top) = stack.last_mut() {
                    top.2 += 1;
                }
                if let Some(node) = nodes[child].take() {
                    stack.push((node, child, 0));
                }
            }
            None => {
                let (done, _, _) = stack.pop()?;
                let done = Rc::new(done);
                match stack.last_mut() {
                    Some(parent) => parent.0.children.push(done),
                    None => return Some(done),
                }
            }
        }
    }
}

/// Rebuild the path to the first node with id `target` and apply `f` to a
/// copy of it. Returns `None` when no such node exists.
///
/// Recurses once per level, so the stack grows with the depth of the thread.
pub fn update_node(
    roots: &[Rc<Comment>],
    target: &CommentId,
    f: &mut dyn FnMut(&mut Comment),
) -> Option<Vec<Rc<Comment>>> {
    for (pos, node) in roots.iter().enumerate() {
        let replacement = if node.id == *target {
            let mut copy = (**node).clone();
            f(&mut copy);
            Some(copy)
        } else {
            update_node(&node.children, target, f).map(|children| {
                let mut copy = (**node).clone();
                copy.children = children;
                copy
            })
        };

        if let Some(copy) = replacement {
            let mut rebuilt = roots.to_vec();
            rebuilt[pos] = Rc::new(copy);
            return Some(rebuilt);
        }
    }
    None
}

/// Append `reply` under `target`. Returns the input unchanged when `target`
/// is not in the tree.
pub fn insert_reply(roots: &[Rc<Comment>], target: &CommentId, reply: Comment) -> Vec<Rc<Comment>> {
    let mut reply = Some(reply);
    let updated = update_node(roots, target, &mut |node| {
        if let Some(reply) = reply.take() {
            node.children.push(Rc::new(reply));
        }
    });
    updated.unwrap_or_else(|| {
        debug!(comment = %target, "reply target not in tree");
        roots.to_vec()
    })
}

/// Toggle `kind` on the node `target` using the ledger transition.
pub fn update_reaction(roots: &[Rc<Comment>], target: &CommentId, kind: ReactionKind) -> Vec<Rc<Comment>> {
    update_node(roots, target, &mut |node| {
        reaction::apply_toggle(node, kind);
    })
    .unwrap_or_else(|| {
        debug!(comment = %target, kind = %kind, "reaction target not in tree");
        roots.to_vec()
    })
}

/// Overwrite `kind` on the node `target` with a known state.
pub fn set_reaction(
    roots: &[Rc<Comment>],
    target: &CommentId,
    kind: ReactionKind,
    state: ReactionState,
) -> Vec<Rc<Comment>> {
    update_node(roots, target, &mut |node| node.engagement.set(kind, state))
        .unwrap_or_else(|| roots.to_vec())
}

pub fn find<'a>(roots: &'a [Rc<Comment>], target: &CommentId) -> Option<&'a Rc<Comment>> {
    for node in roots {
        if node.id == *target {
            return Some(node);
        }
        if let Some(found) = find(&node.children, target) {
            return Some(found);
        }
    }
    None
}

/// Number of nodes in the forest.
pub fn len(roots: &[Rc<Comment>]) -> usize {
    roots.iter().map(|node| 1 + len(&node.children)).sum()
}

/// Depth-first `(node, depth)` pairs in display order.
pub fn flatten(roots: &[Rc<Comment>]) -> Vec<(Rc<Comment>, usize)> {
    fn collect(nodes: &[Rc<Comment>], depth: usize, out: &mut Vec<(Rc<Comment>, usize)>) {
        for node in nodes {
            out.push((Rc::clone(node), depth));
            collect(&node.children, depth + 1, out);
        }
    }

    let mut out = Vec::new();
    collect(roots, 0, &mut out);
    out
}
