//! Property-based invariant tests for change propagation through binding
//! graphs.
//!
//! Random DAGs of modular-sum bindings over three source properties are
//! driven by random assignments and source drops, and checked against a
//! recomputed model:
//!
//! 1. After every operation each live property reads the model value.
//! 2. A property emits `value_changed` exactly once per operation if its
//!    value changed, and never otherwise.
//! 3. Every `value_changed` handler observes the whole graph already
//!    consistent with the operation.
//! 4. Dropping a source detaches exactly the properties bound to it and
//!    freezes them at their last value.
//! 5. Assigning a bound property detaches it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use proptest::prelude::*;
use weft_reactive::{Property, PropertyRef, make_binding};

const SOURCES: usize = 3;

#[derive(Debug, Clone)]
struct NodeSpec {
    inputs: Vec<usize>,
    modulus: i64,
}

#[derive(Debug, Clone)]
enum Op {
    Set(usize, i64),
    DropSource(usize),
}

fn node_strategy() -> impl Strategy<Value = NodeSpec> {
    (prop::collection::vec(any::<usize>(), 1..=3), 2i64..9)
        .prop_map(|(inputs, modulus)| NodeSpec { inputs, modulus })
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        8 => (any::<usize>(), -20i64..20).prop_map(|(i, v)| Op::Set(i, v)),
        1 => (0..SOURCES).prop_map(Op::DropSource),
    ]
}

fn eval(spec: &NodeSpec, values: &[i64]) -> i64 {
    spec.inputs
        .iter()
        .map(|&i| values[i])
        .sum::<i64>()
        .rem_euclid(spec.modulus)
}

// ── Graph under test ─────────────────────────────────────────────────────

struct Graph {
    specs: Vec<NodeSpec>,
    nodes: Vec<Option<Property<i64>>>,
    model: Vec<i64>,
    frozen: Vec<bool>,
    changes: Vec<Rc<Cell<u32>>>,
    expected: Rc<RefCell<Vec<i64>>>,
    failures: Rc<RefCell<Vec<String>>>,
}

impl Graph {
    fn build(sources: [i64; SOURCES], raw: Vec<NodeSpec>) -> Self {
        let specs: Vec<NodeSpec> = raw
            .into_iter()
            .enumerate()
            .map(|(k, mut spec)| {
                for input in &mut spec.inputs {
                    *input %= SOURCES + k;
                }
                spec
            })
            .collect();

        let mut nodes: Vec<Option<Property<i64>>> =
            sources.iter().map(|&v| Some(Property::new(v))).collect();
        let mut model = sources.to_vec();
        for spec in &specs {
            let node = Property::new(0);
            node.bind(binding_for(spec, &nodes));
            model.push(eval(spec, &model));
            nodes.push(Some(node));
        }

        let handles: Rc<Vec<PropertyRef<i64>>> = Rc::new(
            nodes
                .iter()
                .flatten()
                .map(Property::track)
                .collect(),
        );
        let expected = Rc::new(RefCell::new(model.clone()));
        let failures = Rc::new(RefCell::new(Vec::new()));
        let mut changes = Vec::new();
        for (index, node) in nodes.iter().flatten().enumerate() {
            let count = Rc::new(Cell::new(0));
            let counter = Rc::clone(&count);
            let handles = Rc::clone(&handles);
            let expected = Rc::clone(&expected);
            let failures = Rc::clone(&failures);
            let _ = node.value_changed().connect(move |_| {
                counter.set(counter.get() + 1);
                let expected = expected.borrow();
                for (i, handle) in handles.iter().enumerate() {
                    if let Some(seen) = handle.get() {
                        if seen != expected[i] {
                            failures.borrow_mut().push(format!(
                                "handler of node {index} saw node {i} = {seen}, expected {}",
                                expected[i]
                            ));
                        }
                    }
                }
            });
            changes.push(count);
        }

        let frozen = vec![false; specs.len()];
        Self {
            specs,
            nodes,
            model,
            frozen,
            changes,
            expected,
            failures,
        }
    }

    fn recompute(&self, model: &mut [i64], frozen: &[bool]) {
        for (k, spec) in self.specs.iter().enumerate() {
            if !frozen[k] {
                model[SOURCES + k] = eval(spec, model);
            }
        }
    }

    /// Apply `op` to the model and to the graph. Returns the pre-op model.
    fn apply(&mut self, op: &Op) -> Vec<i64> {
        let before = self.model.clone();
        let mut model = self.model.clone();
        let mut frozen = self.frozen.clone();
        for count in &self.changes {
            count.set(0);
        }
        match *op {
            Op::Set(raw, value) => {
                let index = raw % self.nodes.len();
                if self.nodes[index].is_none() {
                    return before;
                }
                model[index] = value;
                if index >= SOURCES {
                    frozen[index - SOURCES] = true;
                }
                self.recompute(&mut model, &frozen);
                *self.expected.borrow_mut() = model.clone();
                if let Some(node) = &self.nodes[index] {
                    node.set(value);
                }
            }
            Op::DropSource(source) => {
                if self.nodes[source].is_none() {
                    return before;
                }
                for (k, spec) in self.specs.iter().enumerate() {
                    if spec.inputs.contains(&source) {
                        frozen[k] = true;
                    }
                }
                *self.expected.borrow_mut() = model.clone();
                self.nodes[source] = None;
            }
        }
        self.model = model;
        self.frozen = frozen;
        before
    }
}

fn binding_for(
    spec: &NodeSpec,
    nodes: &[Option<Property<i64>>],
) -> Box<dyn weft_reactive::ValueProvider<i64>> {
    let m = spec.modulus;
    let input = |i: usize| {
        nodes[spec.inputs[i]]
            .as_ref()
            .expect("inputs are alive while building")
    };
    match spec.inputs.len() {
        1 => make_binding(move |a: &i64| a.rem_euclid(m), (input(0),)),
        2 => make_binding(
            move |a: &i64, b: &i64| (a + b).rem_euclid(m),
            (input(0), input(1)),
        ),
        _ => make_binding(
            move |a: &i64, b: &i64, c: &i64| (a + b + c).rem_euclid(m),
            (input(0), input(1), input(2)),
        ),
    }
}

#[test]
fn operations_on_dropped_nodes_report_no_changes() {
    let specs = vec![NodeSpec {
        inputs: vec![0],
        modulus: 2,
    }];
    let mut graph = Graph::build([0, 0, 0], specs);
    graph.apply(&Op::DropSource(2));
    graph.apply(&Op::Set(3, 1));
    assert_eq!(graph.changes[3].get(), 1);

    let before = graph.apply(&Op::Set(2, 0));
    assert_eq!(before, graph.model);
    assert!(graph.changes.iter().all(|count| count.get() == 0));
    let before = graph.apply(&Op::DropSource(2));
    assert_eq!(before, graph.model);
    assert!(graph.changes.iter().all(|count| count.get() == 0));
}

// ── Properties ───────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn propagation_matches_model(
        sources in prop::array::uniform3(-20i64..20),
        specs in prop::collection::vec(node_strategy(), 1..12),
        ops in prop::collection::vec(op_strategy(), 1..24),
    ) {
        let mut graph = Graph::build(sources, specs);

        for (i, node) in graph.nodes.iter().enumerate() {
            if let Some(node) = node {
                prop_assert_eq!(node.get(), graph.model[i], "initial value of node {}", i);
            }
        }

        for op in &ops {
            let before = graph.apply(op);

            let failures = graph.failures.borrow().clone();
            prop_assert!(failures.is_empty(), "after {:?}: {:?}", op, failures);

            for (i, node) in graph.nodes.iter().enumerate() {
                let Some(node) = node else { continue };
                let count = graph.changes[i].get();
                let changed = before[i] != graph.model[i];
                prop_assert_eq!(
                    count,
                    u32::from(changed),
                    "node {} change notifications after {:?}", i, op
                );
                prop_assert_eq!(node.get(), graph.model[i], "node {} after {:?}", i, op);
                if i >= SOURCES {
                    prop_assert_eq!(node.is_bound(), !graph.frozen[i - SOURCES]);
                }
            }
        }
    }
}
