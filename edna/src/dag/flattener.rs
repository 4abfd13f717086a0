use std::collections::HashSet;

use crate::api::runtime::NodeId;
use crate::dag::stream_graph::StreamGraph;
use crate::dag::DagError;

/// Merges the graphs of several streams into one `StreamGraph`.
///
/// Streams forked from a common prefix share node references, the merged graph
/// keeps exactly one copy of every node id.
pub struct StreamGraphFlattener;

impl StreamGraphFlattener {
    pub fn flatten<'a, I>(stream_graphs: I) -> Result<StreamGraph, DagError>
    where
        I: IntoIterator<Item = &'a StreamGraph>,
    {
        let stream_graphs: Vec<&StreamGraph> = stream_graphs.into_iter().collect();
        let mut flattened = StreamGraph::new();

        // nodes first: an edge of one graph may target a node first introduced by another
        for stream_graph in &stream_graphs {
            for node in stream_graph.nodes() {
                if flattened.contains_node_id(node.node_id()) {
                    continue;
                }

                let node_index = flattened.add_node(node.clone())?;
                if !node.is_emit() {
                    flattened.add_placeholder_edge(node_index)?;
                }
            }
        }

        let mut unresolved_sources = HashSet::new();
        for stream_graph in &stream_graphs {
            StreamGraphFlattener::resolve_edges(
                stream_graph,
                &mut flattened,
                &mut unresolved_sources,
            )?;
        }

        // release the reserved slots nobody claimed
        for node_index in 0..flattened.len() {
            let node_id = flattened.node(node_index)?.node_id();
            if !unresolved_sources.contains(&node_id) {
                flattened.release_placeholders(node_index);
            }
        }

        debug!(
            "flattened {} stream graphs into {} nodes",
            stream_graphs.len(),
            flattened.len()
        );
        Ok(flattened)
    }

    fn resolve_edges(
        stream_graph: &StreamGraph,
        flattened: &mut StreamGraph,
        unresolved_sources: &mut HashSet<NodeId>,
    ) -> Result<(), DagError> {
        for source_index in 0..stream_graph.len() {
            let source_id = stream_graph.node(source_index)?.node_id();
            let flattened_source = flattened.node_index_by_id(source_id)?;

            for target_index in stream_graph.edges(source_index) {
                let target_index = match target_index {
                    Some(target_index) => *target_index,
                    None => {
                        unresolved_sources.insert(source_id);
                        continue;
                    }
                };

                let target_id = stream_graph.node(target_index)?.node_id();
                let flattened_target = flattened.node_index_by_id(target_id)?;

                // shared prefix, already resolved by an earlier graph
                if flattened.has_edge(flattened_source, flattened_target) {
                    continue;
                }

                let free_slot = flattened
                    .edges(flattened_source)
                    .iter()
                    .position(|x| x.is_none());
                match free_slot {
                    Some(slot) => {
                        flattened.update_placeholder_edge(flattened_source, flattened_target, slot)?
                    }
                    None => flattened.add_edge(flattened_source, flattened_target)?,
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::api::runtime::IdAllocator;
    use crate::dag::flattener::StreamGraphFlattener;
    use crate::dag::stream_graph::StreamGraph;
    use crate::test_utils::{emit_node, filter_node, ingest_node, map_node};

    /// ingest -> map, then two branches: `-> emit` and `-> filter -> emit`.
    fn forked_graphs() -> (StreamGraph, StreamGraph) {
        let mut ids = IdAllocator::new();

        let mut prefix = StreamGraph::new();
        prefix.add_node_to_head(ingest_node(&mut ids, &[])).unwrap();
        prefix.add_node_to_head(map_node(&mut ids)).unwrap();

        let mut left = prefix.clone();
        left.add_node_to_head(emit_node(&mut ids).0).unwrap();

        let mut right = prefix;
        right.add_node_to_head(filter_node(&mut ids)).unwrap();
        right.add_node_to_head(emit_node(&mut ids).0).unwrap();

        (left, right)
    }

    #[test]
    pub fn flatten_shared_nodes_test() {
        let (left, right) = forked_graphs();
        assert_eq!(left.len() + right.len(), 7);

        let flattened = StreamGraphFlattener::flatten(vec![&left, &right]).unwrap();
        assert_eq!(flattened.len(), 5);
        assert!(flattened.verify_graph());
        assert_eq!(flattened.roots(), &[0]);

        // nodes are moved by identity, never copied
        assert!(Rc::ptr_eq(
            flattened.node(0).unwrap(),
            left.node(0).unwrap()
        ));
        assert!(Rc::ptr_eq(
            flattened.node(0).unwrap(),
            right.node(0).unwrap()
        ));

        let map_index = flattened
            .node_index_by_id(left.node(1).unwrap().node_id())
            .unwrap();
        assert_eq!(flattened.children(map_index).len(), 2);
        assert_eq!(flattened.children(0), vec![map_index]);
    }

    #[test]
    pub fn flatten_idempotence_test() {
        let (left, _right) = forked_graphs();

        let flattened = StreamGraphFlattener::flatten(vec![&left, &left, &left]).unwrap();
        assert_eq!(flattened.len(), left.len());
        assert_eq!(flattened.children(0), vec![1]);
        assert_eq!(flattened.children(1), vec![2]);
    }

    #[test]
    pub fn flatten_resolves_every_placeholder_test() {
        let (left, right) = forked_graphs();
        assert_eq!(left.unresolved_edge_count(), 0);
        assert_eq!(right.unresolved_edge_count(), 0);

        let flattened = StreamGraphFlattener::flatten(vec![&right, &left]).unwrap();
        assert_eq!(flattened.unresolved_edge_count(), 0);
        for node_index in 0..flattened.len() {
            assert!(flattened.edges(node_index).iter().all(|x| x.is_some()));
        }
    }

    #[test]
    pub fn flatten_keeps_open_placeholder_test() {
        let mut ids = IdAllocator::new();
        let mut graph = StreamGraph::new();
        let ingest = graph.add_node(ingest_node(&mut ids, &[])).unwrap();
        graph.add_placeholder_edge(ingest).unwrap();

        let flattened = StreamGraphFlattener::flatten(vec![&graph]).unwrap();
        assert_eq!(flattened.unresolved_edge_count(), 1);
        assert!(!flattened.verify_graph());
    }
}
