//! Hierarchy closures and the set queries the merge eligibility check is
//! built on.
//!
//! All queries are pure and recomputed per call: the graph mutates between
//! merges, so caching here would observe stale hierarchies.

use std::collections::{HashSet, VecDeque};

use crate::graph::{ClassGraph, ClassId};

/// The class itself, its superclass chain, and every interface transitively
/// implemented by any of those.
#[must_use]
pub fn hierarchy_closure(graph: &ClassGraph, class: ClassId) -> HashSet<ClassId> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(class);

    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        let node = &graph[current];
        if let Some(sup) = node.super_class {
            queue.push_back(sup);
        }
        queue.extend(node.interfaces.iter().copied());
    }

    seen
}

/// The class itself plus its superclass chain, interfaces excluded.
#[must_use]
pub fn superclass_closure(graph: &ClassGraph, class: ClassId) -> HashSet<ClassId> {
    let mut seen = HashSet::new();
    let mut current = Some(class);
    while let Some(id) = current {
        if !seen.insert(id) {
            break;
        }
        current = graph[id].super_class;
    }
    seen
}

/// Returns whether `class` extends or implements `other`, directly or
/// transitively. Reflexive: a class extends-or-implements itself.
#[must_use]
pub fn extends_or_implements(graph: &ClassGraph, class: ClassId, other: ClassId) -> bool {
    hierarchy_closure(graph, class).contains(&other)
}

/// Interfaces `class` implements only indirectly: the interfaces of its
/// direct superclass and the super-interfaces of its direct interfaces,
/// transitively through interface extends. The direct superclass and the
/// directly implemented interfaces themselves are not in the set.
///
/// Used as the cycle guard: merging `source` into a `target` found in this
/// set would make the result implement itself. A directly implemented
/// interface is a valid target; the merge executor never copies it back.
#[must_use]
pub fn indirect_interfaces(graph: &ClassGraph, class: ClassId) -> HashSet<ClassId> {
    let node = &graph[class];
    let mut set = HashSet::new();
    let mut queue: VecDeque<ClassId> = VecDeque::new();
    for &root in node.super_class.iter().chain(node.interfaces.iter()) {
        queue.extend(graph[root].interfaces.iter().copied());
    }
    while let Some(current) = queue.pop_front() {
        if !set.insert(current) {
            continue;
        }
        queue.extend(graph[current].interfaces.iter().copied());
    }
    set
}

/// Members of the full hierarchy closure (including `class` itself) that
/// declare a static initializer.
///
/// Merging must not change which static initializers can run or their
/// relative order, so both sides of a merge must observe the same set. A
/// class with its own `<clinit>` is a member of its own set and therefore
/// never merges.
#[must_use]
pub fn initialized_ancestors(graph: &ClassGraph, class: ClassId) -> HashSet<ClassId> {
    hierarchy_closure(graph, class)
        .into_iter()
        .filter(|&id| graph[id].has_static_initializer())
        .collect()
}

/// Members of the full hierarchy closure used as the right-hand operand of
/// a runtime type check anywhere in the program. The per-class fact comes
/// from an upstream analysis, supplied as a predicate.
#[must_use]
pub fn type_checked_ancestors(
    graph: &ClassGraph,
    class: ClassId,
    is_type_checked: impl Fn(ClassId) -> bool,
) -> HashSet<ClassId> {
    hierarchy_closure(graph, class)
        .into_iter()
        .filter(|&id| is_type_checked(id))
        .collect()
}

/// Members of the superclass chain (interfaces excluded) matched as an
/// exception-handler type anywhere in the program.
#[must_use]
pub fn caught_ancestors(
    graph: &ClassGraph,
    class: ClassId,
    is_caught: impl Fn(ClassId) -> bool,
) -> HashSet<ClassId> {
    superclass_closure(graph, class)
        .into_iter()
        .filter(|&id| is_caught(id))
        .collect()
}
