//! Per-class facts consumed and produced by the merger.
//!
//! All boolean facts are computed by upstream whole-program analyses and
//! supplied here as plain data; only `redirect_target` is owned and written
//! by this crate.

use serde::{Deserialize, Serialize};

use jfold_classgraph::{ClassGraph, ClassId};

/// The facts recorded for one class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFacts {
    /// The class must never be eliminated or merged away.
    pub kept: bool,
    /// At least one `new` site targets this class directly.
    pub instantiated: bool,
    pub produces_package_visible: bool,
    pub invokes_package_visible: bool,
    /// The class is the operand of a `.class` construct.
    pub class_literal: bool,
    /// The class is the right-hand operand of a runtime type check.
    pub type_checked: bool,
    /// The class is matched as an exception-handler type.
    pub caught: bool,
    /// Set once, by a successful merge that consumed this class as source.
    redirect_target: Option<ClassId>,
}

/// Fact records for every class in a [`ClassGraph`], indexed by [`ClassId`].
///
/// Build the store with [`FactStore::for_graph`] after the graph is fully
/// constructed; the merger refuses to run against a store that does not
/// cover the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactStore {
    facts: Vec<ClassFacts>,
}

impl FactStore {
    /// One default (all-false) record per class in the graph.
    #[must_use]
    pub fn for_graph(graph: &ClassGraph) -> Self {
        FactStore {
            facts: vec![ClassFacts::default(); graph.len()],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Mutable access for drivers loading upstream analysis results.
    #[must_use]
    pub fn facts_mut(&mut self, class: ClassId) -> &mut ClassFacts {
        &mut self.facts[class.idx()]
    }

    #[must_use]
    pub fn is_kept(&self, class: ClassId) -> bool {
        self.facts[class.idx()].kept
    }

    #[must_use]
    pub fn is_instantiated(&self, class: ClassId) -> bool {
        self.facts[class.idx()].instantiated
    }

    #[must_use]
    pub fn produces_package_visible_members(&self, class: ClassId) -> bool {
        self.facts[class.idx()].produces_package_visible
    }

    #[must_use]
    pub fn invokes_package_visible_members(&self, class: ClassId) -> bool {
        self.facts[class.idx()].invokes_package_visible
    }

    #[must_use]
    pub fn is_class_literal(&self, class: ClassId) -> bool {
        self.facts[class.idx()].class_literal
    }

    #[must_use]
    pub fn is_type_checked(&self, class: ClassId) -> bool {
        self.facts[class.idx()].type_checked
    }

    #[must_use]
    pub fn is_caught(&self, class: ClassId) -> bool {
        self.facts[class.idx()].caught
    }

    /// The class this one was merged into, if any. One step only; see
    /// [`FactStore::resolve`] for the terminal representative.
    #[must_use]
    pub fn redirect_target(&self, class: ClassId) -> Option<ClassId> {
        self.facts[class.idx()].redirect_target
    }

    pub(crate) fn set_redirect_target(&mut self, class: ClassId, target: ClassId) {
        self.facts[class.idx()].redirect_target = Some(target);
    }

    /// Follows the redirection chain to its terminal node, returning `class`
    /// itself if it was never merged away.
    ///
    /// Chains are finite and acyclic because a class is chosen as a merge
    /// source at most once. No path compression: chains stay short in
    /// practice.
    #[must_use]
    pub fn resolve(&self, class: ClassId) -> ClassId {
        let mut current = class;
        while let Some(next) = self.facts[current.idx()].redirect_target {
            current = next;
        }
        current
    }

    /// The terminal merge target of `class`, or `None` if the class was
    /// never merged away. Consumed by the downstream reference rewriter.
    #[must_use]
    pub fn final_target(&self, class: ClassId) -> Option<ClassId> {
        self.facts[class.idx()].redirect_target?;
        Some(self.resolve(class))
    }

    /// OR-propagation of the externally computed facts after a merge: a
    /// fact true for either class is true for the merged entity.
    pub(crate) fn merge_into(&mut self, source: ClassId, target: ClassId) {
        let source_facts = self.facts[source.idx()].clone();
        let target_facts = &mut self.facts[target.idx()];
        target_facts.kept |= source_facts.kept;
        target_facts.instantiated |= source_facts.instantiated;
        target_facts.produces_package_visible |= source_facts.produces_package_visible;
        target_facts.invokes_package_visible |= source_facts.invokes_package_visible;
        target_facts.class_literal |= source_facts.class_literal;
        target_facts.type_checked |= source_facts.type_checked;
        target_facts.caught |= source_facts.caught;
    }
}
