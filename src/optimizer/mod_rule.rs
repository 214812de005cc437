//! Chain rewrite engine.
//!
//! A [`ModRule`] matches a straight run of vertices, one predicate per
//! vertex, and replaces the run with a new chain built from the matched
//! vertices. Every peephole optimization and block fusion is a `ModRule`.
//!
//! # Matching
//!
//! Starting at a candidate head, the engine follows `children[0]` while the
//! current vertex has exactly one child. A vertex in the middle of a match
//! that has other predecessors merging into it is *extracted*: the suffix
//! from that vertex on is cloned onto a private path so the rewrite does not
//! change what the other predecessors execute.
//!
//! # Splicing
//!
//! The replacement head takes over the matched head's incoming edges and the
//! replacement tail takes over the matched tail's outgoing edges, in order,
//! so decision edges keep their meaning. An empty replacement connects the
//! predecessors straight to the single successor; a matched chain with no
//! successor is replaced by a `Nop` carrying its source positions.
//!
//! A matched chain whose first vertex is the root hands the root to the
//! replacement head (or to the single successor when the replacement is
//! empty). A chain with the root at a later position is refused, as the
//! replacement head would run the vertices matched before the root first.
//!
//! Extraction is refused when a vertex to be cloned lies on a cycle: each
//! clone would peel one more iteration off the loop.
//!
//! A rewrite is also refused (reported as no match) when it would not change
//! anything, when it would turn a vertex into its own successor, or when the
//! chain exits through a split and the rule does not allow that.

use tracing::trace;

use crate::ir::position::merge_positions;
use crate::ir::{GraphError, GraphResult};
use crate::ir::{Graph, Op, Vec2i, Vertex, VertexId};

/// Predicate over a single vertex
pub type Matcher = Box<dyn Fn(&Vertex) -> bool>;

/// Builds one replacement vertex from the matched chain and the union of its
/// source positions; `None` aborts the rewrite as an invalid splice
pub type Replacer = Box<dyn Fn(&[Vertex], &[Vec2i]) -> Option<Vertex>>;

/// A chain-matching rewrite rule
pub struct ModRule {
    name: &'static str,
    matchers: Vec<Matcher>,
    replacers: Vec<Replacer>,
    allow_split_exit: bool,
    extract: bool,
}

impl std::fmt::Debug for ModRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModRule")
            .field("name", &self.name)
            .field("matchers", &self.matchers.len())
            .field("replacers", &self.replacers.len())
            .field("allow_split_exit", &self.allow_split_exit)
            .field("extract", &self.extract)
            .finish()
    }
}

/// What a successful match will be replaced with
struct Plan {
    chain: Vec<VertexId>,
    replacement: Vec<Vertex>,
    /// First chain index whose vertex has predecessors outside the chain
    extract_from: Option<usize>,
}

impl ModRule {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            matchers: Vec::new(),
            replacers: Vec::new(),
            allow_split_exit: false,
            extract: true,
        }
    }

    /// Append a predicate for the next vertex of the chain
    pub fn matching(mut self, matcher: impl Fn(&Vertex) -> bool + 'static) -> Self {
        self.matchers.push(Box::new(matcher));
        self
    }

    /// Append a builder for the next vertex of the replacement
    pub fn emit(
        mut self,
        replacer: impl Fn(&[Vertex], &[Vec2i]) -> Option<Vertex> + 'static,
    ) -> Self {
        self.replacers.push(Box::new(replacer));
        self
    }

    /// Allow the last matched vertex to be a decision or random branch
    pub fn allow_split_exit(mut self) -> Self {
        self.allow_split_exit = true;
        self
    }

    /// Refuse chains with merging predecessors instead of cloning them
    pub fn without_extraction(mut self) -> Self {
        self.extract = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Scan the graph once and apply the rule wherever it matches.
    ///
    /// Each vertex is tried as a chain head at most once per scan; vertices
    /// consumed by an earlier rewrite in the same scan are skipped. Returns
    /// the number of rewrites applied.
    pub fn apply(&self, graph: &mut Graph) -> GraphResult<usize> {
        if self.matchers.is_empty() {
            return Ok(0);
        }
        let mut applied = 0;
        for head in graph.walk() {
            if !graph.contains(head) {
                continue;
            }
            let Some(chain) = self.match_chain(graph, head)? else {
                continue;
            };
            let Some(plan) = self.plan(graph, chain)? else {
                continue;
            };
            self.rewrite(graph, plan)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Run [`ModRule::apply`] until a scan changes nothing
    pub fn apply_exhaustively(&self, graph: &mut Graph, max_scans: usize) -> GraphResult<usize> {
        let mut total = 0;
        for _ in 0..max_scans {
            let applied = self.apply(graph)?;
            if applied == 0 {
                break;
            }
            total += applied;
        }
        Ok(total)
    }

    fn match_chain(&self, graph: &Graph, head: VertexId) -> GraphResult<Option<Vec<VertexId>>> {
        if !(self.matchers[0])(graph.vertex(head)?) {
            return Ok(None);
        }
        let mut chain = vec![head];
        for matcher in &self.matchers[1..] {
            let current = graph.vertex(chain[chain.len() - 1])?;
            if current.is_code_path_split() || current.children.len() != 1 {
                return Ok(None);
            }
            let next = current.children[0];
            if chain.contains(&next) || !matcher(graph.vertex(next)?) {
                return Ok(None);
            }
            chain.push(next);
        }
        Ok(Some(chain))
    }

    /// Decide whether the matched chain can be rewritten, without mutating
    fn plan(&self, graph: &Graph, chain: Vec<VertexId>) -> GraphResult<Option<Plan>> {
        let head = chain[0];
        let tail = chain[chain.len() - 1];

        if let Some(root) = graph.root() {
            if chain[1..].contains(&root) {
                return Ok(None);
            }
        }

        let extract_from =
            (1..chain.len()).find(|&i| graph.get(chain[i]).map_or(0, |v| v.parents.len()) != 1);
        if let Some(split) = extract_from {
            if !self.extract {
                return Ok(None);
            }
            if chain[split..].iter().any(|&id| graph.is_on_cycle(id)) {
                return Ok(None);
            }
        }

        let exits = graph.vertex(tail)?.children.clone();
        if exits.len() > 1 && !self.allow_split_exit {
            return Ok(None);
        }

        let matched: Vec<Vertex> = chain
            .iter()
            .map(|&id| graph.vertex(id).map(Vertex::detached))
            .collect::<GraphResult<_>>()?;
        let mut positions = Vec::new();
        for vertex in &matched {
            merge_positions(&mut positions, &vertex.positions);
        }

        let mut replacement = Vec::with_capacity(self.replacers.len());
        for replacer in &self.replacers {
            let vertex = replacer(&matched, &positions).ok_or_else(|| GraphError::InvalidSplice {
                rule: self.name,
                reason: "replacement builder rejected the matched chain".to_string(),
            })?;
            replacement.push(vertex.with_direction(matched[0].direction));
        }

        if replacement.is_empty() {
            match exits.len() {
                0 => replacement.push(
                    Vertex::new(Op::Nop, positions).with_direction(matched[0].direction),
                ),
                1 => {}
                _ => return Ok(None),
            }
        }

        let unchanged = replacement.len() == matched.len()
            && replacement
                .iter()
                .zip(&matched)
                .all(|(new, old)| new.kind == old.kind);
        if unchanged {
            return Ok(None);
        }

        if exits.contains(&head) && replacement.len() <= 1 {
            return Ok(None);
        }

        if let Some((last, interior)) = replacement.split_last() {
            if interior.iter().any(Vertex::is_code_path_split) {
                return Err(GraphError::InvalidSplice {
                    rule: self.name,
                    reason: "branching vertex inside replacement chain".to_string(),
                });
            }
            let carried = last.required_children().unwrap_or(1);
            let fits = match last.required_children() {
                Some(required) => required == exits.len(),
                None => exits.len() <= 1,
            };
            if !fits {
                return Err(GraphError::InvalidSplice {
                    rule: self.name,
                    reason: format!(
                        "{} can carry {} exit(s), matched chain has {}",
                        last.kind.name(),
                        carried,
                        exits.len()
                    ),
                });
            }
        }

        Ok(Some(Plan {
            chain,
            replacement,
            extract_from,
        }))
    }

    fn rewrite(&self, graph: &mut Graph, mut plan: Plan) -> GraphResult<()> {
        if let Some(split) = plan.extract_from {
            extract_suffix(graph, &mut plan.chain, split)?;
        }

        let head = plan.chain[0];
        let tail = plan.chain[plan.chain.len() - 1];
        let parents = graph.vertex(head)?.parents.clone();
        let exits = graph.vertex(tail)?.children.clone();
        let was_root = graph.root() == Some(head);
        let matched = plan.chain.len();
        let replaced = plan.replacement.len();

        for &id in &plan.chain {
            graph.remove_vertex(id);
        }

        if plan.replacement.is_empty() {
            // Only reachable with exactly one exit that is not the head.
            let exit = exits[0];
            let outer: Vec<VertexId> = parents.iter().copied().filter(|&p| p != tail).collect();
            for &parent in dedup(&outer).iter() {
                graph.retarget_child(parent, head, exit)?;
            }
            let exit_vertex = graph.vertex_mut(exit)?;
            exit_vertex.parents.retain(|p| *p != tail);
            exit_vertex.parents.extend(outer.iter().copied());
            if was_root {
                graph.set_root(exit)?;
            }
        } else {
            let ids: Vec<VertexId> = plan
                .replacement
                .into_iter()
                .map(|vertex| graph.add_vertex(vertex))
                .collect();
            for pair in ids.windows(2) {
                graph.connect(pair[0], pair[1])?;
            }
            let new_head = ids[0];
            let new_tail = ids[ids.len() - 1];

            for &parent in &parents {
                if parent == tail {
                    continue;
                }
                graph.vertex_mut(new_head)?.parents.push(parent);
            }
            for &parent in dedup(&parents).iter() {
                if parent != tail {
                    graph.retarget_child(parent, head, new_head)?;
                }
            }

            for &exit in &exits {
                if exit == head {
                    graph.vertex_mut(new_tail)?.children.push(new_head);
                    graph.vertex_mut(new_head)?.parents.push(new_tail);
                } else {
                    graph.vertex_mut(new_tail)?.children.push(exit);
                }
            }
            for &exit in dedup(&exits).iter() {
                if exit != head {
                    graph.retarget_parent(exit, tail, new_tail)?;
                }
            }

            if was_root {
                graph.set_root(new_head)?;
            }
        }

        trace!(
            target: "befungraph::optimizer::mod_rule",
            rule = self.name,
            head = %head,
            matched,
            replaced,
            "Applied rewrite"
        );
        Ok(())
    }
}

/// Clone `chain[split..]` onto a private path hanging off `chain[split - 1]`
fn extract_suffix(graph: &mut Graph, chain: &mut [VertexId], split: usize) -> GraphResult<()> {
    let anchor = chain[split - 1];
    let original_tail = chain[chain.len() - 1];
    let mut previous = anchor;

    for index in split..chain.len() {
        let original = chain[index];
        let copy = graph.vertex(original)?.detached();
        let id = graph.add_vertex(copy);
        if index == split {
            graph.retarget_child(anchor, original, id)?;
            let parents = &mut graph.vertex_mut(original)?.parents;
            if let Some(position) = parents.iter().position(|p| *p == anchor) {
                parents.remove(position);
            }
            graph.vertex_mut(id)?.parents.push(anchor);
        } else {
            graph.connect(previous, id)?;
        }
        chain[index] = id;
        previous = id;
    }

    let exits = graph.vertex(original_tail)?.children.clone();
    for exit in exits {
        graph.connect(previous, exit)?;
    }

    trace!(
        target: "befungraph::optimizer::mod_rule",
        anchor = %anchor,
        cloned = chain.len() - split,
        "Extracted shared chain suffix"
    );
    Ok(())
}

fn dedup(ids: &[VertexId]) -> Vec<VertexId> {
    let mut out: Vec<VertexId> = Vec::with_capacity(ids.len());
    for &id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}
