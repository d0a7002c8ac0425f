//! Graphviz export of a resolved graph.

use crate::graph::resolve::{Binding, ResolvedGraph};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Render the graph as a DOT digraph.
///
/// Steps are clustered by the rule that contributed them; raw inputs are
/// drawn as notes feeding the steps that consume them.
pub fn to_dot(graph: &ResolvedGraph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {} {{", quote(&format!("sub-{}", graph.subject_id)));
    let _ = writeln!(out, "  rankdir=LR;");
    let _ = writeln!(out, "  node [shape=box, fontname=\"Helvetica\"];");

    let mut by_rule: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for step in graph.steps() {
        by_rule.entry(step.rule.as_str()).or_default().push(step.id());
    }

    for (i, (rule, steps)) in by_rule.iter().enumerate() {
        let _ = writeln!(out, "  subgraph cluster_{} {{", i);
        let _ = writeln!(out, "    label={};", quote(rule));
        for id in steps {
            if let Some(step) = graph.step(id) {
                let label = format!("{}\\n{}", id, step.descriptor.operation.name);
                let style = if step.descriptor.always_run {
                    ", style=bold"
                } else {
                    ""
                };
                let _ = writeln!(out, "    {} [label=\"{}\"{}];", quote(id), label, style);
            }
        }
        let _ = writeln!(out, "  }}");
    }

    let mut raw_nodes: BTreeSet<&str> = BTreeSet::new();
    for step in graph.steps() {
        for (slot, binding) in &step.bindings {
            if let Binding::Raw { key, .. } = binding {
                if raw_nodes.insert(key.as_str()) {
                    let _ = writeln!(
                        out,
                        "  {} [shape=note, label={}];",
                        quote(&format!("raw:{}", key)),
                        quote(key)
                    );
                }
                let _ = writeln!(
                    out,
                    "  {} -> {} [label={}];",
                    quote(&format!("raw:{}", key)),
                    quote(step.id()),
                    quote(slot)
                );
            }
        }
    }

    for edge in graph.edges() {
        let _ = writeln!(
            out,
            "  {} -> {} [label={}];",
            quote(&edge.producer.step),
            quote(&edge.consumer.step),
            quote(&format!("{} → {}", edge.producer.slot, edge.consumer.slot))
        );
    }

    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::RawValue;
    use crate::graph::fragment::Fragment;
    use crate::graph::model::Graph;
    use crate::graph::resolve::resolve;
    use crate::steps::{SlotKind, StepDescriptor};

    #[test]
    fn dot_contains_nodes_edges_and_raw_inputs() {
        let mut vars = BTreeMap::new();
        vars.insert("work_dir".to_string(), "/w".to_string());

        let step = |id: &str| {
            StepDescriptor::builder(id, "n4")
                .input("in_file", SlotKind::Volume)
                .output("out_file", SlotKind::Volume, "${step_dir}/o.nii.gz")
                .build()
                .unwrap()
        };
        let mut f = Fragment::new();
        f.raw("t1w:0", RawValue::Path("/raw/T1w.nii.gz".into()));
        f.add_step(step("a")).from_raw("a", "in_file", "t1w:0");
        f.add_step(step("b")).from_step("b", "in_file", "a", "out_file");
        let mut graph = Graph::new("01", vars);
        graph.add_fragment("anat_preproc", f).unwrap();

        let dot = to_dot(&resolve(graph).unwrap());
        assert!(dot.starts_with("digraph \"sub-01\" {"));
        assert!(dot.contains("label=\"anat_preproc\""));
        assert!(dot.contains("\"raw:t1w:0\" -> \"a\""));
        assert!(dot.contains("\"a\" -> \"b\" [label=\"out_file → in_file\"]"));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }
}
