//! The class-collapsing optimizer core: decide whether one class can be
//! absorbed into another without changing any externally observable
//! behavior, and perform the structural merge when it can.
//!
//! Eligibility failure is the normal outcome and stays silent; an internal
//! fault during execution is loud, carries both class names, and leaves the
//! target in an unspecified state (the run should abort, not retry).

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use jfold_classgraph::{
    caught_ancestors, extends_or_implements, hierarchy_closure, indirect_interfaces,
    initialized_ancestors, superclass_closure, type_checked_ancestors, AccessFlags, ClassGraph,
    ClassId, Member,
};

use crate::facts::FactStore;

/// The INTERFACE|ABSTRACT shape bits: combined with AND when merging.
const SHAPE_MASK: u16 = AccessFlags::INTERFACE | AccessFlags::ABSTRACT;
/// Bits combined with OR when merging.
const UNION_MASK: u16 = AccessFlags::PUBLIC | AccessFlags::ANNOTATION | AccessFlags::ENUM;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Permit merging across packages/visibility by rewriting access
    /// modifiers later.
    pub allow_access_modification: bool,
    /// Permit merges that introduce abstract methods without a counterpart
    /// on the other side.
    pub merge_interfaces_aggressively: bool,
}

/// Fault raised by a [`MemberTransplanter`].
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransplantError {
    message: String,
}

impl TransplantError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        TransplantError {
            message: message.into(),
        }
    }
}

/// Re-homes a member's constant-data references into the merge target.
///
/// Contract: after a successful transplant, every reference the member
/// holds resolves correctly relative to `target`.
pub trait MemberTransplanter {
    fn transplant(&self, member: &Member, target: ClassId) -> Result<Member, TransplantError>;
}

/// Transplanter for graphs whose members carry owned data: cloning the
/// member and re-homing its owner is sufficient.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectTransplanter;

impl MemberTransplanter for DirectTransplanter {
    fn transplant(&self, member: &Member, target: ClassId) -> Result<Member, TransplantError> {
        let mut member = member.clone();
        member.owner = target;
        Ok(member)
    }
}

/// Internal fault during a merge attempt.
///
/// An ineligible pair is NOT an error; [`ClassMerger::try_merge`] returns
/// `Ok(false)` for that. On `Err` the target's state is unspecified and the
/// optimization run should abort.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("class graph has {classes} classes but the fact store has {facts} records")]
    FactsOutOfSync { classes: usize, facts: usize },

    #[error("class id {class} is out of bounds for a graph of {classes} classes")]
    UnknownClass { class: usize, classes: usize },

    #[error(
        "failed to transplant `{member}{descriptor}` from `{source}` into `{target}`: {reason}"
    )]
    Transplant {
        source: String,
        target: String,
        member: String,
        descriptor: String,
        #[source]
        reason: TransplantError,
    },
}

/// Observer invoked once per successful merge with `(source, target)`.
pub type MergeObserver<'a> = Box<dyn FnMut(ClassId, ClassId) + 'a>;

/// Decides merge eligibility and performs the structural merge.
///
/// Single-threaded by design: every merge mutates shared graph state that
/// the next eligibility check must observe fully applied. Driving the graph
/// to a fixpoint is the caller's job.
pub struct ClassMerger<'a> {
    options: MergeOptions,
    transplanter: &'a dyn MemberTransplanter,
    observer: Option<MergeObserver<'a>>,
}

impl<'a> ClassMerger<'a> {
    #[must_use]
    pub fn new(options: MergeOptions) -> Self {
        ClassMerger {
            options,
            transplanter: &DirectTransplanter,
            observer: None,
        }
    }

    /// Replaces the default clone-and-re-home transplanter, for graphs whose
    /// members reference external constant data.
    #[must_use]
    pub fn with_transplanter(mut self, transplanter: &'a dyn MemberTransplanter) -> Self {
        self.transplanter = transplanter;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: impl FnMut(ClassId, ClassId) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Attempts to merge `source` into `target`.
    ///
    /// `Ok(true)`: merged, `target` mutated in place and `source` redirected.
    /// `Ok(false)`: pair ineligible, nothing changed.
    /// `Err(_)`: internal fault, `target` state unspecified.
    pub fn try_merge(
        &mut self,
        graph: &mut ClassGraph,
        facts: &mut FactStore,
        source: ClassId,
        target: ClassId,
    ) -> Result<bool, MergeError> {
        check_consistent(graph, facts, source, target)?;
        if !self.can_merge(graph, facts, source, target) {
            trace!(
                source = %graph[source].name,
                target = %graph[target].name,
                "merge rejected"
            );
            return Ok(false);
        }
        self.merge(graph, facts, source, target)?;
        Ok(true)
    }

    /// The safety predicate: every condition protects one externally
    /// observable contract (type-check results, catch matching, static-init
    /// timing, visibility, dispatch, instantiation/field exposure).
    /// Intentionally conservative: a missed merge is fine, an unsound merge
    /// is not.
    ///
    /// Requires a fact store covering the graph; `try_merge` validates that.
    #[must_use]
    pub fn can_merge(
        &self,
        graph: &ClassGraph,
        facts: &FactStore,
        source: ClassId,
        target: ClassId,
    ) -> bool {
        if source == target {
            return false;
        }
        // Classes that must be preserved never merge.
        if facts.is_kept(source) || facts.is_kept(target) {
            return false;
        }
        // Each class is a merge source at most once, and a class that was
        // itself merged away can no longer absorb others.
        if facts.redirect_target(source).is_some() || facts.redirect_target(target).is_some() {
            return false;
        }
        // Annotation introspection makes merged annotations observable.
        if graph[source].is_annotation() {
            return false;
        }
        if !self.access_compatible(graph, facts, source, target) {
            return false;
        }
        if !shape_compatible(graph, source, target) {
            return false;
        }
        // Neither side may end up implementing itself.
        if indirect_interfaces(graph, source).contains(&target) {
            return false;
        }
        if extends_or_implements(graph, target, source) {
            return false;
        }
        // Both sides must observe the same static-initialization triggers,
        // the same type-check outcomes, and the same catch matches.
        if initialized_ancestors(graph, source) != initialized_ancestors(graph, target) {
            return false;
        }
        if type_checked_ancestors(graph, source, |id| facts.is_type_checked(id))
            != type_checked_ancestors(graph, target, |id| facts.is_type_checked(id))
        {
            return false;
        }
        if caught_ancestors(graph, source, |id| facts.is_caught(id))
            != caught_ancestors(graph, target, |id| facts.is_caught(id))
        {
            return false;
        }
        // Two reflectively used classes double the ambiguity risk.
        if facts.is_class_literal(source) && facts.is_class_literal(target) {
            return false;
        }
        if introduces_unwanted_fields(graph, facts, source, target)
            || introduces_unwanted_fields(graph, facts, target, source)
        {
            return false;
        }
        // Shared concrete signatures would collide in the member union.
        if has_clashing_methods(graph, source, target) {
            return false;
        }
        if !self.options.merge_interfaces_aggressively
            && (introduces_unwanted_abstract_methods(graph, source, target)
                || introduces_unwanted_abstract_methods(graph, target, source))
        {
            return false;
        }
        if overrides_any_methods(graph, source, target)
            || overrides_any_methods(graph, target, source)
        {
            return false;
        }
        if shadows_any_methods(graph, source, target)
            || shadows_any_methods(graph, target, source)
        {
            return false;
        }
        true
    }

    /// Access compatibility: modification allowed globally, or both public
    /// with a source that neither produces nor invokes package-visible
    /// members, or same package.
    fn access_compatible(
        &self,
        graph: &ClassGraph,
        facts: &FactStore,
        source: ClassId,
        target: ClassId,
    ) -> bool {
        if self.options.allow_access_modification {
            return true;
        }
        let src = &graph[source];
        let tgt = &graph[target];
        if src.access_flags.is_public()
            && tgt.access_flags.is_public()
            && !facts.produces_package_visible_members(source)
            && !facts.invokes_package_visible_members(source)
        {
            return true;
        }
        src.package_name() == tgt.package_name()
    }

    /// The structural union, applied in place to `target`. Redirection is
    /// recorded last so no reader ever observes a redirected source whose
    /// members have not moved yet.
    fn merge(
        &mut self,
        graph: &mut ClassGraph,
        facts: &mut FactStore,
        source: ClassId,
        target: ClassId,
    ) -> Result<(), MergeError> {
        debug!(
            source = %graph[source].name,
            target = %graph[target].name,
            source_interface = graph[source].is_interface(),
            target_interface = graph[target].is_interface(),
            "merging class"
        );

        // Shape bits are ANDed, visibility/annotation/enum bits are ORed,
        // everything else keeps the target's value.
        let src_flags = graph[source].access_flags.raw();
        let tgt_flags = graph[target].access_flags.raw();
        graph[target].access_flags = AccessFlags(
            (tgt_flags & !(SHAPE_MASK | UNION_MASK))
                | ((src_flags & tgt_flags) & SHAPE_MASK)
                | ((src_flags | tgt_flags) & UNION_MASK),
        );

        // Copy over the interfaces that aren't present yet and that would
        // not create a hierarchy loop.
        let source_interfaces = graph[source].interfaces.clone();
        for iface in source_interfaces {
            if iface == target
                || extends_or_implements(graph, target, iface)
                || extends_or_implements(graph, iface, target)
            {
                continue;
            }
            graph[target].interfaces.push(iface);
        }

        // Move the class members, re-homed into the target's constant data.
        let fields = graph[source].fields.clone();
        for member in fields {
            let transplanted = self.transplant(graph, source, target, &member)?;
            graph[target].fields.push(transplanted);
        }
        let methods = graph[source].methods.clone();
        for member in methods {
            let transplanted = self.transplant(graph, source, target, &member)?;
            graph[target].methods.push(transplanted);
        }

        // Attributes are copied verbatim; the writer tolerates duplicates.
        let attributes = graph[source].attributes.clone();
        graph[target].attributes.extend(attributes);

        facts.merge_into(source, target);

        // The permanent record for the downstream reference rewriter.
        facts.set_redirect_target(source, target);

        if let Some(observer) = self.observer.as_mut() {
            observer(source, target);
        }
        Ok(())
    }

    fn transplant(
        &self,
        graph: &ClassGraph,
        source: ClassId,
        target: ClassId,
        member: &Member,
    ) -> Result<Member, MergeError> {
        self.transplanter
            .transplant(member, target)
            .map_err(|reason| MergeError::Transplant {
                source: graph[source].name.clone(),
                target: graph[target].name.clone(),
                member: member.name.clone(),
                descriptor: member.descriptor.clone(),
                reason,
            })
    }
}

fn check_consistent(
    graph: &ClassGraph,
    facts: &FactStore,
    source: ClassId,
    target: ClassId,
) -> Result<(), MergeError> {
    if facts.len() != graph.len() {
        return Err(MergeError::FactsOutOfSync {
            classes: graph.len(),
            facts: facts.len(),
        });
    }
    for class in [source, target] {
        if graph.get(class).is_none() {
            return Err(MergeError::UnknownClass {
                class: class.idx(),
                classes: graph.len(),
            });
        }
    }
    Ok(())
}

/// Both are classes, both are interfaces, or both are abstract classes --
/// or `source` is the sole known subclass of `target` with `target` (or
/// `target`'s superclass) as its direct superclass, which lets a
/// single-implementation pair collapse across the shape boundary.
fn shape_compatible(graph: &ClassGraph, source: ClassId, target: ClassId) -> bool {
    let src = &graph[source];
    let tgt = &graph[target];
    if src.access_flags.raw() & SHAPE_MASK == tgt.access_flags.raw() & SHAPE_MASK {
        return true;
    }
    is_only_subclass(graph, source, target)
        && (src.super_class == Some(target)
            || (src.super_class.is_some() && src.super_class == tgt.super_class))
}

/// Whether `sub` is the single known subclass/implementor of `of`.
///
/// Reads the best-effort subclass set, which may be stale after earlier
/// merges in the same run; a stale answer only costs merge opportunities.
fn is_only_subclass(graph: &ClassGraph, sub: ClassId, of: ClassId) -> bool {
    graph[of].subclasses.len() == 1 && graph[of].subclasses[0] == sub
}

/// Whether folding `class` into `other` would hand unwanted fields to
/// `other`'s instances or to sibling subclasses.
fn introduces_unwanted_fields(
    graph: &ClassGraph,
    facts: &FactStore,
    class: ClassId,
    other: ClassId,
) -> bool {
    !graph[class].fields.is_empty()
        && (facts.is_instantiated(other)
            || (!graph[other].subclasses.is_empty() && !is_only_subclass(graph, class, other)))
}

/// Whether any method of `a` has a same-signature, non-abstract counterpart
/// declared directly on `b`. Covers constructors and every other shared
/// concrete signature; such members would collide in the union.
fn has_clashing_methods(graph: &ClassGraph, a: ClassId, b: ClassId) -> bool {
    graph[a].methods.iter().any(|m| {
        graph[b]
            .find_method(&m.name, &m.descriptor)
            .is_some_and(|found| !found.access_flags.is_abstract())
    })
}

/// Whether `class` brings abstract methods that cannot be matched to an
/// abstract counterpart anywhere along `target`'s hierarchy.
fn introduces_unwanted_abstract_methods(
    graph: &ClassGraph,
    class: ClassId,
    target: ClassId,
) -> bool {
    let tgt = &graph[target];
    // An abstract target with at most `class` as a subclass can take on new
    // abstract methods without breaking any concrete instance.
    if tgt.access_flags.has(SHAPE_MASK)
        && (tgt.subclasses.is_empty() || is_only_subclass(graph, class, target))
    {
        return false;
    }

    let abstract_methods: Vec<&Member> = graph[class]
        .methods
        .iter()
        .filter(|m| m.access_flags.is_abstract())
        .collect();
    if abstract_methods.is_empty() {
        return false;
    }

    let mut matched: HashSet<(ClassId, &str, &str)> = HashSet::new();
    for id in hierarchy_closure(graph, target) {
        for m in &graph[id].methods {
            if m.access_flags.is_abstract() && abstract_methods.iter().any(|a| a.same_signature(m))
            {
                matched.insert((id, m.name.as_str(), m.descriptor.as_str()));
            }
        }
    }
    matched.len() < abstract_methods.len()
}

/// Whether a concrete, non-private, non-static method of `class` has a
/// same-signature concrete counterpart on `target` or its superclasses --
/// merging would silently change dispatch.
fn overrides_any_methods(graph: &ClassGraph, class: ClassId, target: ClassId) -> bool {
    const EXCLUDED: u16 = AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::ABSTRACT;
    let target_chain: Vec<ClassId> = superclass_closure(graph, target).into_iter().collect();
    graph[class].methods.iter().any(|m| {
        if m.access_flags.has(EXCLUDED) || m.is_constructor() || m.is_class_initializer() {
            return false;
        }
        // `class` may itself sit on `target`'s chain (child-into-parent
        // pairs); a method is never an override of its own declaration.
        target_chain.iter().any(|&id| {
            id != class
                && graph[id]
                    .find_method(&m.name, &m.descriptor)
                    .is_some_and(|found| !found.access_flags.has(EXCLUDED))
        })
    })
}

/// Whether a private or static method of `class` (or of any of its known
/// subclasses) matches a non-private method reachable on `target`'s
/// hierarchy -- merging would silently change resolution.
fn shadows_any_methods(graph: &ClassGraph, class: ClassId, target: ClassId) -> bool {
    let target_closure: Vec<ClassId> = hierarchy_closure(graph, target).into_iter().collect();
    // Skip the candidate's own declaring class: on related pairs the
    // closure can contain it, and a method does not shadow itself.
    let shadowed = |m: &Member| {
        target_closure.iter().any(|&id| {
            id != m.owner
                && graph[id]
                    .find_method(&m.name, &m.descriptor)
                    .is_some_and(|found| !found.access_flags.is_private())
        })
    };

    for id in subclass_closure(graph, class) {
        for m in &graph[id].methods {
            let candidate = (m.access_flags.is_private() && !m.is_constructor())
                || (m.access_flags.is_static() && !m.is_class_initializer());
            if candidate && shadowed(m) {
                return true;
            }
        }
    }
    false
}

/// `class` plus its known subclasses, transitively, through the
/// best-effort (possibly stale) back-reference sets.
fn subclass_closure(graph: &ClassGraph, class: ClassId) -> Vec<ClassId> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(class);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        order.push(current);
        queue.extend(graph[current].subclasses.iter().copied());
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PUBLIC: AccessFlags = AccessFlags(AccessFlags::PUBLIC);
    const PACKAGE: AccessFlags = AccessFlags(0);
    const IFACE: AccessFlags =
        AccessFlags(AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT);

    fn method(owner: ClassId, name: &str, descriptor: &str, flags: u16) -> Member {
        Member {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags: AccessFlags(flags),
            owner,
        }
    }

    fn field(owner: ClassId, name: &str, descriptor: &str) -> Member {
        Member {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags: AccessFlags(AccessFlags::PRIVATE),
            owner,
        }
    }

    /// Object plus two unrelated public classes in the same package.
    fn siblings() -> (ClassGraph, ClassId, ClassId) {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        let a = graph.add_class("pkg/A", PUBLIC, Some(object), vec![]);
        let b = graph.add_class("pkg/B", PUBLIC, Some(object), vec![]);
        (graph, a, b)
    }

    #[test]
    fn unrelated_empty_classes_merge() {
        let (mut graph, a, b) = siblings();
        let mut facts = FactStore::for_graph(&graph);
        let mut merger = ClassMerger::new(MergeOptions::default());
        assert!(merger.try_merge(&mut graph, &mut facts, a, b).unwrap());
        assert_eq!(facts.resolve(a), b);
    }

    #[test]
    fn self_merge_is_rejected() {
        let (graph, a, _b) = siblings();
        let facts = FactStore::for_graph(&graph);
        let merger = ClassMerger::new(MergeOptions::default());
        assert!(!merger.can_merge(&graph, &facts, a, a));
    }

    #[test]
    fn kept_classes_never_merge() {
        let (graph, a, b) = siblings();
        let mut facts = FactStore::for_graph(&graph);
        facts.facts_mut(b).kept = true;
        let merger = ClassMerger::new(MergeOptions::default());
        assert!(!merger.can_merge(&graph, &facts, a, b));
        assert!(!merger.can_merge(&graph, &facts, b, a));
    }

    #[test]
    fn annotation_sources_never_merge() {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        let ann = graph.add_class(
            "pkg/Marker",
            AccessFlags(IFACE.raw() | AccessFlags::ANNOTATION),
            Some(object),
            vec![],
        );
        let other = graph.add_class("pkg/Other", IFACE, Some(object), vec![]);
        let facts = FactStore::for_graph(&graph);
        let merger = ClassMerger::new(MergeOptions::default());
        assert!(!merger.can_merge(&graph, &facts, ann, other));
    }

    #[test]
    fn package_private_classes_merge_only_within_their_package() {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        let a = graph.add_class("pkg/A", PACKAGE, Some(object), vec![]);
        let near = graph.add_class("pkg/B", PACKAGE, Some(object), vec![]);
        let far = graph.add_class("other/C", PACKAGE, Some(object), vec![]);
        let facts = FactStore::for_graph(&graph);

        let merger = ClassMerger::new(MergeOptions::default());
        assert!(merger.can_merge(&graph, &facts, a, near));
        assert!(!merger.can_merge(&graph, &facts, a, far));

        let permissive = ClassMerger::new(MergeOptions {
            allow_access_modification: true,
            ..MergeOptions::default()
        });
        assert!(permissive.can_merge(&graph, &facts, a, far));
    }

    #[test]
    fn public_cross_package_merge_requires_no_package_visible_traffic() {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        let a = graph.add_class("pkg/A", PUBLIC, Some(object), vec![]);
        let b = graph.add_class("other/B", PUBLIC, Some(object), vec![]);
        let mut facts = FactStore::for_graph(&graph);
        let merger = ClassMerger::new(MergeOptions::default());
        assert!(merger.can_merge(&graph, &facts, a, b));

        facts.facts_mut(a).invokes_package_visible = true;
        assert!(!merger.can_merge(&graph, &facts, a, b));
    }

    #[test]
    fn shape_mismatch_needs_the_sole_subclass_escape_hatch() {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        let abstract_base = graph.add_class(
            "pkg/Base",
            AccessFlags(AccessFlags::PUBLIC | AccessFlags::ABSTRACT),
            Some(object),
            vec![],
        );
        let only = graph.add_class("pkg/Only", PUBLIC, Some(abstract_base), vec![]);
        let facts = FactStore::for_graph(&graph);
        let merger = ClassMerger::new(MergeOptions::default());

        // Concrete class into its abstract superclass: shapes differ, but
        // `only` is the sole known subclass with `base` as direct super.
        assert!(merger.can_merge(&graph, &facts, only, abstract_base));

        // A second subclass closes the hatch.
        let mut graph2 = graph.clone();
        graph2.add_class("pkg/Second", PUBLIC, Some(abstract_base), vec![]);
        let facts2 = FactStore::for_graph(&graph2);
        assert!(!merger.can_merge(&graph2, &facts2, only, abstract_base));
    }

    #[test]
    fn hierarchy_cycles_are_refused() {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        let i = graph.add_class("pkg/I", IFACE, Some(object), vec![]);
        let j = graph.add_class("pkg/J", IFACE, Some(object), vec![i]);
        let c = graph.add_class("pkg/C", IFACE, Some(object), vec![j]);
        let facts = FactStore::for_graph(&graph);
        let merger = ClassMerger::new(MergeOptions::default());

        // `c` indirectly implements `i` through `j`: the merged class would
        // implement itself.
        assert!(!merger.can_merge(&graph, &facts, c, i));
        // `j` extends `i` directly: a plain sub-interface collapse, allowed.
        assert!(merger.can_merge(&graph, &facts, j, i));
        // The reverse direction would turn `i` into its own sub-interface.
        assert!(!merger.can_merge(&graph, &facts, i, j));
    }

    #[test]
    fn both_class_literals_refuse() {
        let (graph, a, b) = siblings();
        let mut facts = FactStore::for_graph(&graph);
        facts.facts_mut(a).class_literal = true;
        let merger = ClassMerger::new(MergeOptions::default());
        assert!(merger.can_merge(&graph, &facts, a, b));

        facts.facts_mut(b).class_literal = true;
        assert!(!merger.can_merge(&graph, &facts, a, b));
    }

    #[test]
    fn clashing_concrete_signatures_refuse() {
        let (mut graph, a, b) = siblings();
        let m = method(a, "run", "()V", AccessFlags::PUBLIC);
        graph[a].methods.push(m);
        let m = method(b, "run", "()V", AccessFlags::PUBLIC | AccessFlags::STATIC);
        graph[b].methods.push(m);
        let facts = FactStore::for_graph(&graph);
        let merger = ClassMerger::new(MergeOptions::default());
        assert!(!merger.can_merge(&graph, &facts, a, b));
    }

    #[test]
    fn overriding_a_concrete_method_refuses() {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        let base = graph.add_class("pkg/Base", PUBLIC, Some(object), vec![]);
        let m = method(base, "size", "()I", AccessFlags::PUBLIC);
        graph[base].methods.push(m);
        let derived = graph.add_class("pkg/Derived", PUBLIC, Some(base), vec![]);
        let sibling = graph.add_class("pkg/Sibling", PUBLIC, Some(base), vec![]);
        let m = method(sibling, "size", "()I", AccessFlags::PUBLIC);
        graph[sibling].methods.push(m);
        let facts = FactStore::for_graph(&graph);
        let merger = ClassMerger::new(MergeOptions::default());

        // `sibling.size()` overrides `base.size()`, reachable from `derived`.
        assert!(!merger.can_merge(&graph, &facts, sibling, derived));
    }

    #[test]
    fn private_shadowing_refuses() {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        let a = graph.add_class("pkg/A", PUBLIC, Some(object), vec![]);
        let m = method(a, "helper", "()V", AccessFlags::PRIVATE);
        graph[a].methods.push(m);
        // The non-private counterpart sits on `b`'s superclass, so only the
        // shadowing check can see it.
        let base = graph.add_class("pkg/BBase", PUBLIC, Some(object), vec![]);
        let m = method(base, "helper", "()V", AccessFlags::PUBLIC);
        graph[base].methods.push(m);
        let b = graph.add_class("pkg/B", PUBLIC, Some(base), vec![]);
        let facts = FactStore::for_graph(&graph);
        let merger = ClassMerger::new(MergeOptions::default());
        assert!(!merger.can_merge(&graph, &facts, a, b));
    }

    #[test]
    fn static_shadowing_through_a_subclass_refuses() {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        let a = graph.add_class("pkg/A", PUBLIC, Some(object), vec![]);
        let sub = graph.add_class("pkg/ASub", PUBLIC, Some(a), vec![]);
        let m = method(sub, "of", "()V", AccessFlags::PUBLIC | AccessFlags::STATIC);
        graph[sub].methods.push(m);
        let b = graph.add_class("pkg/B", PUBLIC, Some(object), vec![]);
        let m = method(b, "of", "()V", AccessFlags::PUBLIC);
        graph[b].methods.push(m);
        let facts = FactStore::for_graph(&graph);
        let merger = ClassMerger::new(MergeOptions::default());

        // The shadowing member lives on `a`'s subclass, not on `a` itself.
        assert!(!merger.can_merge(&graph, &facts, a, b));
    }

    #[test]
    fn flag_combination_law_holds() {
        let mut graph = ClassGraph::new();
        let object = graph.add_class("java/lang/Object", PUBLIC, None, vec![]);
        // Abstract target absorbing its sole concrete subclass: the one
        // eligible pairing whose shape bits differ.
        let base = graph.add_class(
            "pkg/Base",
            AccessFlags(AccessFlags::ABSTRACT | AccessFlags::SYNTHETIC),
            Some(object),
            vec![],
        );
        let only = graph.add_class(
            "pkg/Only",
            AccessFlags(AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::ENUM),
            Some(base),
            vec![],
        );
        let mut facts = FactStore::for_graph(&graph);
        let mut merger = ClassMerger::new(MergeOptions::default());
        assert!(merger.try_merge(&mut graph, &mut facts, only, base).unwrap());

        let flags = graph[base].access_flags;
        // ABSTRACT only on the target: ANDed away.
        assert!(!flags.is_abstract());
        // PUBLIC and ENUM from the source: ORed in.
        assert!(flags.is_public());
        assert!(flags.is_enum());
        // Unrelated target bits survive untouched, and unrelated source
        // bits are not copied.
        assert!(flags.has(AccessFlags::SYNTHETIC));
        assert!(!flags.has(AccessFlags::FINAL));
    }

    #[test]
    fn transplant_faults_carry_both_class_names() {
        struct FailingTransplanter;
        impl MemberTransplanter for FailingTransplanter {
            fn transplant(&self, _: &Member, _: ClassId) -> Result<Member, TransplantError> {
                Err(TransplantError::new("constant pool exhausted"))
            }
        }

        let (mut graph, a, b) = siblings();
        let m = method(a, "run", "()V", AccessFlags::PUBLIC);
        graph[a].methods.push(m);
        let mut facts = FactStore::for_graph(&graph);
        let transplanter = FailingTransplanter;
        let mut merger =
            ClassMerger::new(MergeOptions::default()).with_transplanter(&transplanter);

        let err = merger.try_merge(&mut graph, &mut facts, a, b).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("pkg/A"), "{message}");
        assert!(message.contains("pkg/B"), "{message}");
        assert!(message.contains("run()V"), "{message}");
    }

    #[test]
    fn out_of_sync_fact_store_is_a_fault() {
        let (mut graph, a, _b) = siblings();
        let mut facts = FactStore::for_graph(&graph);
        let late = graph.add_class("pkg/Late", PUBLIC, None, vec![]);
        let mut merger = ClassMerger::new(MergeOptions::default());
        let err = merger.try_merge(&mut graph, &mut facts, a, late).unwrap_err();
        assert!(matches!(err, MergeError::FactsOutOfSync { .. }));
    }

    #[test]
    fn unwanted_fields_are_checked_in_both_directions() {
        let (mut graph, a, b) = siblings();
        let f = field(b, "cache", "I");
        graph[b].fields.push(f);
        let mut facts = FactStore::for_graph(&graph);
        facts.facts_mut(a).instantiated = true;
        let merger = ClassMerger::new(MergeOptions::default());

        // The distilled direction: source fields vs. instantiated target.
        assert!(!merger.can_merge(&graph, &facts, b, a));
        // And the reverse: target fields joining an instantiated source.
        assert!(!merger.can_merge(&graph, &facts, a, b));
    }

    #[test]
    fn observer_fires_once_per_merge() {
        let (mut graph, a, b) = siblings();
        let mut facts = FactStore::for_graph(&graph);
        let mut merges: Vec<(ClassId, ClassId)> = Vec::new();
        {
            let mut merger = ClassMerger::new(MergeOptions::default())
                .with_observer(|source, target| merges.push((source, target)));
            assert!(merger.try_merge(&mut graph, &mut facts, a, b).unwrap());
            // Ineligible second attempt: no notification.
            assert!(!merger.try_merge(&mut graph, &mut facts, a, b).unwrap());
        }
        assert_eq!(merges, vec![(a, b)]);
    }
}
