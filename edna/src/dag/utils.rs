use std::collections::BTreeMap;
use std::ops::Index;

use daggy::{Dag, NodeIndex};
use serde::Serialize;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct JsonNode<N>
where
    N: Serialize,
{
    id: String,
    detail: N,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct JsonEdge<E>
where
    E: Serialize,
{
    /// source JsonNode id
    source: String,
    /// target JsonNode id
    target: String,
    detail: E,
}

/// Serializable view of a daggy `Dag`, nodes ordered by index.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub(crate) struct JsonDag<N, E>
where
    N: Clone + Serialize,
    E: Clone + Serialize,
{
    nodes: Vec<JsonNode<N>>,
    edges: Vec<JsonEdge<E>>,
}

impl<'a, N, E> From<&'a Dag<N, E>> for JsonDag<N, E>
where
    N: Clone + Serialize,
    E: Clone + Serialize,
{
    fn from(dag: &'a Dag<N, E, u32>) -> Self {
        let mut node_map = BTreeMap::new();
        for n in 0..dag.node_count() {
            let node_index = NodeIndex::new(n);
            node_map.insert(n, JsonDag::create_json_node(dag, node_index));
        }

        let edges = dag
            .raw_edges()
            .iter()
            .map(|edge| JsonEdge {
                source: edge.source().index().to_string(),
                target: edge.target().index().to_string(),
                detail: edge.weight.clone(),
            })
            .collect();

        let nodes = node_map.into_iter().map(|(_, node)| node).collect();

        JsonDag { nodes, edges }
    }
}

impl<N, E> JsonDag<N, E>
where
    N: Clone + Serialize,
    E: Clone + Serialize,
{
    fn create_json_node(dag: &Dag<N, E>, node_index: NodeIndex) -> JsonNode<N> {
        let n = dag.index(node_index);
        let id = node_index.index().to_string();

        JsonNode {
            id,
            detail: n.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use daggy::Dag;

    use crate::dag::utils::JsonDag;

    #[test]
    pub fn json_dag_test() {
        let mut dag: Dag<String, u8> = Dag::new();
        let a = dag.add_node("ingest".to_string());
        let b = dag.add_node("count".to_string());
        let c = dag.add_node("emit".to_string());
        dag.add_node("lonely".to_string());
        dag.add_edge(a, b, 1).unwrap();
        dag.add_edge(b, c, 2).unwrap();

        let json_dag = JsonDag::from(&dag);
        assert_eq!(json_dag.nodes.len(), 4);
        assert_eq!(json_dag.nodes[3].id, "3");
        assert_eq!(json_dag.nodes[3].detail, "lonely");

        let edges = &json_dag.edges;
        assert_eq!(edges.len(), 2);
        assert_eq!((edges[1].source.as_str(), edges[1].target.as_str()), ("1", "2"));
        assert_eq!(edges[1].detail, 2);

        let json = serde_json::to_string(&json_dag).unwrap();
        assert!(json.contains("\"detail\":\"lonely\""));
    }
}
