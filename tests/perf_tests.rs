//! Per-node performance counters

mod common;

use common::{relu_chain, vector};
use cpuforge::{ExecStatus, Graph, GraphConfig};

#[test]
fn test_counters_cover_every_node() -> anyhow::Result<()> {
    let mut graph = Graph::new();
    graph.build(&relu_chain(4, 3))?;
    assert!(graph
        .perf_counters()?
        .values()
        .all(|p| p.status == ExecStatus::NotRun));

    graph.push_input("x", &vector(&[1.0, -1.0, 2.0, -2.0]))?;
    graph.infer()?;
    let perf = graph.perf_counters()?;

    assert_eq!(perf.len(), graph.nodes().len());
    for node in graph.nodes() {
        let info = &perf[node.name()];
        assert_eq!(info.status, ExecStatus::Executed);
        assert_eq!(info.layer_type, node.kind().type_name());
        assert_eq!(info.exec_type, node.exec_type());
    }
    let mut indices: Vec<usize> = perf.values().map(|p| p.execution_index).collect();
    indices.sort_unstable();
    assert_eq!(indices, (0..graph.nodes().len()).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_perf_count_off_keeps_status_only() -> anyhow::Result<()> {
    let mut graph = Graph::new().with_config(GraphConfig::new().with_perf_count(false));
    graph.build(&relu_chain(4, 2))?;
    graph.infer()?;
    let perf = graph.perf_counters()?;
    assert!(!perf.is_empty());
    assert!(perf.values().all(|p| p.is_executed() && p.real_time == 0));
    Ok(())
}

#[test]
fn test_counters_serialize() -> anyhow::Result<()> {
    let mut graph = Graph::new();
    graph.build(&relu_chain(2, 1))?;
    graph.infer()?;
    let json = serde_json::to_value(graph.perf_counters()?)?;
    assert_eq!(json["relu_1"]["layer_type"], "ReLU");
    assert_eq!(json["relu_1"]["status"], "Executed");
    Ok(())
}
