//! Conversion path planner.
//!
//! Finds the lowest-cost chain of registered rules from any available
//! representation kind to a requested one.
//!
//! ## Algorithm
//!
//! Dijkstra over the rule graph. A virtual source reaches every available
//! kind at cost 0; edge weight is the rule's declared cost. An edge is only
//! usable when every parameter it requires is explicitly set or carries a
//! default.
//!
//! ## Determinism Guarantees
//!
//! - Every candidate remembers which `available` entry its path starts from;
//!   the frontier orders by cost, then start index, then a monotone sequence
//!   number assigned in push order (edges are pushed in registration order).
//! - Among equal-cost paths the one starting from the earliest available kind
//!   always wins, regardless of hop count; ties beyond that resolve to the
//!   earliest-registered rules.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};
use std::sync::Arc;

use crate::registry::{ConversionRule, ConversionRuleRegistry};
use crate::types::params::{ConversionParameterSet, ParamName};
use crate::types::representation::RepresentationKind;

/// Error type for planning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// The rule graph has no chain from any available kind to the target.
    /// A normal, expected outcome, not a system fault.
    #[error("no conversion path to {target}")]
    NoPath {
        /// The unreachable kind.
        target: RepresentationKind,
    },
    /// A path exists, but a rule on it requires a parameter with no default
    /// and no explicit value. Surfaced distinctly so a caller can prompt for
    /// exactly that parameter.
    #[error("conversion rule '{rule}' requires unset parameter '{parameter}'")]
    MissingParameter {
        /// Rule that needs the parameter.
        rule: String,
        /// The unset parameter.
        parameter: ParamName,
    },
}

/// A planned chain of conversion rules.
///
/// An empty chain means the target was already available.
#[derive(Clone)]
pub struct ConversionPath {
    start: RepresentationKind,
    steps: Vec<Arc<dyn ConversionRule>>,
    total_cost: u64,
}

impl ConversionPath {
    /// The available kind the chain starts from.
    pub fn start(&self) -> RepresentationKind {
        self.start
    }

    /// The rules to run, in order.
    pub fn steps(&self) -> &[Arc<dyn ConversionRule>] {
        &self.steps
    }

    /// The kind the chain produces.
    pub fn target(&self) -> RepresentationKind {
        self.steps.last().map_or(self.start, |r| r.target_kind())
    }

    /// Sum of step costs.
    pub fn total_cost(&self) -> u64 {
        self.total_cost
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the target was already available.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl std::fmt::Debug for ConversionPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let steps: Vec<&str> = self.steps.iter().map(|r| r.name()).collect();
        f.debug_struct("ConversionPath")
            .field("start", &self.start)
            .field("steps", &steps)
            .field("total_cost", &self.total_cost)
            .finish()
    }
}

/// Frontier candidate: a partial path ending at `kind`.
struct Candidate {
    cost: u64,
    start_index: usize,
    seq: u64,
    kind: RepresentationKind,
    start: RepresentationKind,
    steps: Vec<Arc<dyn ConversionRule>>,
}

// Min-heap by (cost, start_index, seq); BinaryHeap is a max-heap, so the
// ordering is reversed here.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.cost, other.start_index, other.seq).cmp(&(self.cost, self.start_index, self.seq))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.start_index == other.start_index && self.seq == other.seq
    }
}

impl Eq for Candidate {}

/// Lowest-cost path planner over the shared rule registry.
pub struct ConversionPathPlanner {
    registry: Arc<ConversionRuleRegistry>,
}

impl ConversionPathPlanner {
    /// Create a planner over a shared registry.
    pub fn new(registry: Arc<ConversionRuleRegistry>) -> Self {
        Self { registry }
    }

    /// Plan the cheapest chain from any of `available` to `target`.
    ///
    /// When the strict search (which skips rules with unmet required
    /// parameters) fails, a relaxed search distinguishes "a path would exist
    /// if a parameter were supplied" from "no path at all".
    pub fn plan(
        &self,
        available: &[RepresentationKind],
        target: RepresentationKind,
        params: &ConversionParameterSet,
    ) -> Result<ConversionPath, PlanError> {
        if let Some(path) = self.search(available, target, params, false) {
            return Ok(path);
        }

        if let Some(path) = self.search(available, target, params, true) {
            for rule in path.steps() {
                for spec in rule.parameters() {
                    if spec.default.is_none() && !params.contains(&spec.name) {
                        return Err(PlanError::MissingParameter {
                            rule: rule.name().to_string(),
                            parameter: spec.name,
                        });
                    }
                }
            }
        }

        Err(PlanError::NoPath { target })
    }

    /// Dijkstra search. `relaxed` ignores parameter availability, used only
    /// to diagnose a failed strict search.
    fn search(
        &self,
        available: &[RepresentationKind],
        target: RepresentationKind,
        params: &ConversionParameterSet,
        relaxed: bool,
    ) -> Option<ConversionPath> {
        let mut seq: u64 = 0;
        let mut settled: BTreeSet<RepresentationKind> = BTreeSet::new();
        let mut frontier: BinaryHeap<Candidate> = BinaryHeap::new();

        for (start_index, &kind) in available.iter().enumerate() {
            frontier.push(Candidate {
                cost: 0,
                start_index,
                seq,
                kind,
                start: kind,
                steps: Vec::new(),
            });
            seq += 1;
        }

        while let Some(candidate) = frontier.pop() {
            if settled.contains(&candidate.kind) {
                continue;
            }
            settled.insert(candidate.kind);

            if candidate.kind == target {
                return Some(ConversionPath {
                    start: candidate.start,
                    steps: candidate.steps,
                    total_cost: candidate.cost,
                });
            }

            for rule in self.registry.rules_from(candidate.kind) {
                if settled.contains(&rule.target_kind()) {
                    continue;
                }
                if !relaxed && !rule_usable(&rule, params) {
                    continue;
                }
                let mut steps = candidate.steps.clone();
                steps.push(Arc::clone(&rule));
                frontier.push(Candidate {
                    cost: candidate.cost + rule.cost(),
                    start_index: candidate.start_index,
                    seq,
                    kind: rule.target_kind(),
                    start: candidate.start,
                    steps,
                });
                seq += 1;
            }
        }

        None
    }
}

/// An edge is usable when every required parameter has an explicit value or
/// a default.
fn rule_usable(rule: &Arc<dyn ConversionRule>, params: &ConversionParameterSet) -> bool {
    rule.parameters()
        .iter()
        .all(|spec| spec.default.is_some() || params.contains(&spec.name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ConversionFailure;
    use crate::types::geometry::Volume;
    use crate::types::params::ParameterSpec;
    use crate::types::representation::Representation;

    use crate::types::representation::RepresentationKind::{
        ClosedSurfaceModel, IndexedLabelmap, PlanarContour, RibbonModel,
    };

    struct StubRule {
        name: &'static str,
        source: RepresentationKind,
        target: RepresentationKind,
        cost: u64,
        params: Vec<ParameterSpec>,
    }

    impl ConversionRule for StubRule {
        fn name(&self) -> &str {
            self.name
        }
        fn source_kind(&self) -> RepresentationKind {
            self.source
        }
        fn target_kind(&self) -> RepresentationKind {
            self.target
        }
        fn cost(&self) -> u64 {
            self.cost
        }
        fn parameters(&self) -> Vec<ParameterSpec> {
            self.params.clone()
        }
        fn convert(
            &self,
            _source: &Representation,
            _params: &ConversionParameterSet,
        ) -> Result<Representation, ConversionFailure> {
            Ok(Representation::IndexedLabelmap(Volume::filled([1, 1, 1], 1)))
        }
    }

    fn add_rule(
        registry: &ConversionRuleRegistry,
        name: &'static str,
        source: RepresentationKind,
        target: RepresentationKind,
        cost: u64,
    ) {
        add_rule_with_params(registry, name, source, target, cost, Vec::new());
    }

    fn add_rule_with_params(
        registry: &ConversionRuleRegistry,
        name: &'static str,
        source: RepresentationKind,
        target: RepresentationKind,
        cost: u64,
        params: Vec<ParameterSpec>,
    ) {
        registry
            .register(Arc::new(StubRule {
                name,
                source,
                target,
                cost,
                params,
            }))
            .unwrap();
    }

    fn planner(registry: ConversionRuleRegistry) -> ConversionPathPlanner {
        ConversionPathPlanner::new(Arc::new(registry))
    }

    #[test]
    fn test_two_hop_beats_expensive_direct_edge() {
        let registry = ConversionRuleRegistry::new();
        add_rule(&registry, "a_to_b", RibbonModel, IndexedLabelmap, 1);
        add_rule(&registry, "b_to_c", IndexedLabelmap, ClosedSurfaceModel, 1);
        add_rule(&registry, "a_to_c", RibbonModel, ClosedSurfaceModel, 5);

        let planner = planner(registry);
        let params = ConversionParameterSet::new();
        let path = planner
            .plan(&[RibbonModel], ClosedSurfaceModel, &params)
            .unwrap();

        assert_eq!(path.total_cost(), 2);
        assert_eq!(path.len(), 2);
        assert_eq!(path.steps()[0].name(), "a_to_b");
        assert_eq!(path.steps()[1].name(), "b_to_c");
    }

    #[test]
    fn test_target_already_available_is_empty_path() {
        let registry = ConversionRuleRegistry::new();
        let planner = planner(registry);
        let params = ConversionParameterSet::new();
        let path = planner
            .plan(&[IndexedLabelmap], IndexedLabelmap, &params)
            .unwrap();
        assert!(path.is_empty());
        assert_eq!(path.total_cost(), 0);
        assert_eq!(path.target(), IndexedLabelmap);
    }

    #[test]
    fn test_no_path_is_a_normal_outcome() {
        let registry = ConversionRuleRegistry::new();
        add_rule(&registry, "a_to_b", RibbonModel, IndexedLabelmap, 1);

        let planner = planner(registry);
        let params = ConversionParameterSet::new();
        let err = planner
            .plan(&[PlanarContour], RibbonModel, &params)
            .unwrap_err();
        assert_eq!(err, PlanError::NoPath { target: RibbonModel });
    }

    #[test]
    fn test_equal_cost_prefers_earlier_available_kind() {
        let registry = ConversionRuleRegistry::new();
        add_rule(&registry, "from_ribbon", RibbonModel, ClosedSurfaceModel, 2);
        add_rule(&registry, "from_labelmap", IndexedLabelmap, ClosedSurfaceModel, 2);

        let planner = planner(registry);
        let params = ConversionParameterSet::new();

        let path = planner
            .plan(&[IndexedLabelmap, RibbonModel], ClosedSurfaceModel, &params)
            .unwrap();
        assert_eq!(path.start(), IndexedLabelmap);
        assert_eq!(path.steps()[0].name(), "from_labelmap");

        let path = planner
            .plan(&[RibbonModel, IndexedLabelmap], ClosedSurfaceModel, &params)
            .unwrap();
        assert_eq!(path.start(), RibbonModel);
        assert_eq!(path.steps()[0].name(), "from_ribbon");
    }

    #[test]
    fn test_equal_cost_multi_hop_from_earlier_kind_beats_later_one_hop() {
        let registry = ConversionRuleRegistry::new();
        add_rule(&registry, "ribbon_to_contour", RibbonModel, PlanarContour, 1);
        add_rule(&registry, "contour_to_closed", PlanarContour, ClosedSurfaceModel, 1);
        add_rule(&registry, "labelmap_to_closed", IndexedLabelmap, ClosedSurfaceModel, 2);

        let planner = planner(registry);
        let params = ConversionParameterSet::new();

        // Both paths cost 2; the one starting from the earlier available kind
        // must win even though the later one needs fewer hops.
        let path = planner
            .plan(&[RibbonModel, IndexedLabelmap], ClosedSurfaceModel, &params)
            .unwrap();
        assert_eq!(path.start(), RibbonModel);
        assert_eq!(path.total_cost(), 2);
        let names: Vec<&str> = path.steps().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["ribbon_to_contour", "contour_to_closed"]);
    }

    #[test]
    fn test_unset_required_parameter_excludes_edge() {
        let registry = ConversionRuleRegistry::new();
        add_rule_with_params(
            &registry,
            "needs_ref_volume",
            PlanarContour,
            IndexedLabelmap,
            1,
            vec![ParameterSpec::required("reference_volume")],
        );

        let planner = planner(registry);
        let params = ConversionParameterSet::new();
        let err = planner
            .plan(&[PlanarContour], IndexedLabelmap, &params)
            .unwrap_err();
        assert_eq!(
            err,
            PlanError::MissingParameter {
                rule: "needs_ref_volume".to_string(),
                parameter: ParamName::new("reference_volume"),
            }
        );

        // Supplying the value makes the same edge usable.
        let mut params = ConversionParameterSet::new();
        params.set_explicit(ParamName::new("reference_volume"), 1.0);
        let path = planner
            .plan(&[PlanarContour], IndexedLabelmap, &params)
            .unwrap();
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn test_defaulted_parameter_keeps_edge_usable() {
        let registry = ConversionRuleRegistry::new();
        add_rule_with_params(
            &registry,
            "rasterize",
            RibbonModel,
            IndexedLabelmap,
            1,
            vec![ParameterSpec::with_default(
                "rasterization_oversampling_factor",
                2.0,
            )],
        );

        let planner = planner(registry);
        let params = ConversionParameterSet::new();
        assert!(planner.plan(&[RibbonModel], IndexedLabelmap, &params).is_ok());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let registry = ConversionRuleRegistry::new();
        add_rule(&registry, "a_to_b", RibbonModel, IndexedLabelmap, 1);
        add_rule(&registry, "b_to_c", IndexedLabelmap, ClosedSurfaceModel, 1);
        add_rule(&registry, "a_to_c", RibbonModel, ClosedSurfaceModel, 2);

        let planner = planner(registry);
        let params = ConversionParameterSet::new();
        let first = planner
            .plan(&[RibbonModel], ClosedSurfaceModel, &params)
            .unwrap();
        for _ in 0..10 {
            let again = planner
                .plan(&[RibbonModel], ClosedSurfaceModel, &params)
                .unwrap();
            assert_eq!(again.total_cost(), first.total_cost());
            let names: Vec<&str> = again.steps().iter().map(|r| r.name()).collect();
            let first_names: Vec<&str> = first.steps().iter().map(|r| r.name()).collect();
            assert_eq!(names, first_names);
        }
    }
}
