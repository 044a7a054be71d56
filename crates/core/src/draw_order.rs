//! Draw ordering across components that sample each other's output.
//!
//! Components are ordered by ascending sort order, then any component that
//! samples another's output is moved after its producer. The producer rule
//! wins over sort order. Dependency cycles cannot be satisfied; the resolver
//! stops after a bounded number of moves and logs the cycle.

use std::collections::BTreeSet;

use crate::component::ComponentId;

/// What the resolver needs to know about one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawNode {
    pub id: ComponentId,
    pub sort_order: i32,
    /// Components whose output this one samples.
    pub consumes: BTreeSet<ComponentId>,
}

impl DrawNode {
    pub fn new(id: impl Into<ComponentId>, sort_order: i32) -> Self {
        Self {
            id: id.into(),
            sort_order,
            consumes: BTreeSet::new(),
        }
    }

    pub fn consuming(mut self, producer: impl Into<ComponentId>) -> Self {
        self.consumes.insert(producer.into());
        self
    }
}

/// The resolved order, if it had to give up on a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    pub order: Vec<ComponentId>,
    /// A producer/consumer pair still out of order when resolution stopped.
    pub cycle: Option<(ComponentId, ComponentId)>,
}

/// Orders `nodes`, producers first.
pub fn resolve(nodes: &[DrawNode]) -> ResolvedOrder {
    let mut order: Vec<&DrawNode> = nodes.iter().collect();
    order.sort_by_key(|n| n.sort_order);

    let limit = order.len() * order.len() + 1;
    let mut moves = 0;
    let cycle = loop {
        let Some((consumer, producer)) = first_violation(&order) else {
            break None;
        };
        if moves == limit {
            let pair = (order[producer].id.clone(), order[consumer].id.clone());
            log::warn!(
                "draw order cycle: {} and {} sample each other's output",
                pair.0,
                pair.1
            );
            break Some(pair);
        }
        let node = order.remove(producer);
        order.insert(consumer, node);
        moves += 1;
    };

    ResolvedOrder {
        order: order.into_iter().map(|n| n.id.clone()).collect(),
        cycle,
    }
}

/// The first `(consumer, producer)` index pair with the producer after its
/// consumer.
fn first_violation(order: &[&DrawNode]) -> Option<(usize, usize)> {
    for (i, consumer) in order.iter().enumerate() {
        if consumer.consumes.is_empty() {
            continue;
        }
        for (j, producer) in order.iter().enumerate().skip(i + 1) {
            if consumer.consumes.contains(&producer.id) {
                return Some((i, j));
            }
        }
    }
    None
}

/// Caches the resolved order until something that affects it changes.
#[derive(Debug, Clone)]
pub struct DrawOrderResolver {
    order: Vec<ComponentId>,
    dirty: bool,
}

impl Default for DrawOrderResolver {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            dirty: true,
        }
    }
}

impl DrawOrderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces a re-sort on the next [`order`](Self::order) call.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The draw order, rebuilt from `nodes` only when dirty.
    pub fn order(&mut self, nodes: impl FnOnce() -> Vec<DrawNode>) -> &[ComponentId] {
        if self.dirty {
            self.order = resolve(&nodes()).order;
            self.dirty = false;
        }
        &self.order
    }
}
