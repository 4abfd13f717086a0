use std::fmt::{Display, Formatter};

/// Logical (stream graph) node id.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct NodeId(pub u32);

/// Physical graph node id.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct PhysicalNodeId(pub u32);

#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct StreamId(pub u32);

#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct TaskId(pub u32);

/// Address of an inter-task buffer, the in-process counterpart of a port.
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct ChannelAddress(pub u32);

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for PhysicalNodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for ChannelAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic id counters scoped to one streaming context.
///
/// Graph construction is single threaded, the allocator is handed to each
/// planning stage as `&mut`.
#[derive(Debug, Default)]
pub struct IdAllocator {
    stream_node: u32,
    physical_node: u32,
    data_stream: u32,
    task: u32,
    channel_address: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        IdAllocator::default()
    }

    pub fn next_node_id(&mut self) -> NodeId {
        let id = NodeId(self.stream_node);
        self.stream_node += 1;
        id
    }

    pub fn next_physical_node_id(&mut self) -> PhysicalNodeId {
        let id = PhysicalNodeId(self.physical_node);
        self.physical_node += 1;
        id
    }

    pub fn next_stream_id(&mut self) -> StreamId {
        let id = StreamId(self.data_stream);
        self.data_stream += 1;
        id
    }

    /// Number of stream ids handed out so far.
    pub fn stream_count(&self) -> u32 {
        self.data_stream
    }

    pub fn next_task_id(&mut self) -> TaskId {
        let id = TaskId(self.task);
        self.task += 1;
        id
    }

    pub fn next_channel_address(&mut self) -> ChannelAddress {
        let id = ChannelAddress(self.channel_address);
        self.channel_address += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use crate::api::runtime::{IdAllocator, NodeId, PhysicalNodeId};

    #[test]
    pub fn id_allocator_test() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.next_node_id(), NodeId(0));
        assert_eq!(ids.next_node_id(), NodeId(1));

        // counters are independent
        assert_eq!(ids.next_physical_node_id(), PhysicalNodeId(0));
        assert_eq!(ids.next_node_id(), NodeId(2));
        assert_eq!(ids.next_stream_id().0, 0);
        assert_eq!(ids.next_task_id().0, 0);
        assert_eq!(ids.next_channel_address().0, 0);
        assert_eq!(ids.next_channel_address().0, 1);
    }
}
