//! Process elements: what a graph node stands for
//!
//! A node is only a position in the arena. The element it wraps carries
//! the logical identity (an [`ElementId`]) and the BPMN-style kind.

use serde::{Deserialize, Serialize};

// ── Identifiers ──────────────────────────────────────────────────────

/// Logical identity of a process element.
///
/// Allocated sequentially by the owning graph, so two runs over the same
/// input produce the same identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ── Gateway flags ────────────────────────────────────────────────────

/// Exclusive (exactly one branch) or parallel (all branches)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GatewayKind {
    Exclusive,
    Parallel,
}

/// Split (one in, many out) or merge (many in, one out)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GatewayRole {
    Split,
    Merge,
}

/// Why a task exists
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TaskTag {
    /// A declared activity
    Activity,
    /// Inserted to force converging flows through one point
    Synchronization,
    /// Stand-in for a severed edge target during reduction
    Dummy,
}

// ── Element ──────────────────────────────────────────────────────────

/// The kind of process element a node wraps
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// The single entry point of a control-flow graph
    Start,
    /// A terminal event
    End,
    /// An activity or an internal placeholder task
    Task { name: String, tag: TaskTag },
    /// A split or merge gateway
    Gateway { kind: GatewayKind, role: GatewayRole },
    /// A bare sequence-flow placeholder
    SequenceFlow,
}

/// A process element: identity plus kind
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
}

impl Element {
    pub fn new(id: ElementId, kind: ElementKind) -> Self {
        Self { id, kind }
    }

    /// Name of the wrapped task, if this is a task
    pub fn task_name(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Task { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Name of the wrapped task, only for declared activities
    pub fn activity_name(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Task {
                name,
                tag: TaskTag::Activity,
            } => Some(name),
            _ => None,
        }
    }

    pub fn is_task(&self) -> bool {
        matches!(self.kind, ElementKind::Task { .. })
    }

    /// Synchronization and dummy tasks
    pub fn is_placeholder(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Task {
                tag: TaskTag::Synchronization | TaskTag::Dummy,
                ..
            }
        )
    }

    pub fn is_start(&self) -> bool {
        self.kind == ElementKind::Start
    }

    pub fn is_end(&self) -> bool {
        self.kind == ElementKind::End
    }

    /// Gateway flags, if this is a gateway
    pub fn gateway(&self) -> Option<(GatewayKind, GatewayRole)> {
        match self.kind {
            ElementKind::Gateway { kind, role } => Some((kind, role)),
            _ => None,
        }
    }

    pub fn is_gateway(&self) -> bool {
        self.gateway().is_some()
    }

    pub fn is_split(&self) -> bool {
        matches!(self.gateway(), Some((_, GatewayRole::Split)))
    }

    pub fn is_merge(&self) -> bool {
        matches!(self.gateway(), Some((_, GatewayRole::Merge)))
    }

    pub fn is_gateway_of(&self, kind: GatewayKind, role: GatewayRole) -> bool {
        self.gateway() == Some((kind, role))
    }

    /// The exported node tag
    pub fn node_kind(&self) -> NodeKind {
        match &self.kind {
            ElementKind::Start => NodeKind::Start,
            ElementKind::End => NodeKind::End,
            ElementKind::Task { .. } | ElementKind::SequenceFlow => NodeKind::Task,
            ElementKind::Gateway { kind, role } => match (kind, role) {
                (GatewayKind::Exclusive, GatewayRole::Split) => NodeKind::ExclusiveSplit,
                (GatewayKind::Exclusive, GatewayRole::Merge) => NodeKind::ExclusiveMerge,
                (GatewayKind::Parallel, GatewayRole::Split) => NodeKind::ParallelSplit,
                (GatewayKind::Parallel, GatewayRole::Merge) => NodeKind::ParallelMerge,
            },
        }
    }
}

impl std::fmt::Display for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ElementKind::Task { name, .. } => write!(f, "{}", name),
            _ => write!(f, "{}:{}", self.node_kind(), self.id),
        }
    }
}

// ── Node Kind ────────────────────────────────────────────────────────

/// The tag a node carries in the exported control-flow graph
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Start,
    End,
    Task,
    ExclusiveSplit,
    ExclusiveMerge,
    ParallelSplit,
    ParallelMerge,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            NodeKind::Start => "start",
            NodeKind::End => "end",
            NodeKind::Task => "task",
            NodeKind::ExclusiveSplit => "xor-split",
            NodeKind::ExclusiveMerge => "xor-merge",
            NodeKind::ParallelSplit => "and-split",
            NodeKind::ParallelMerge => "and-merge",
        };
        write!(f, "{}", label)
    }
}
