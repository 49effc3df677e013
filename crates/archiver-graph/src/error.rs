use std::fmt::Debug;

/// Graph invariant violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError<N: Debug> {
    /// Edge would close a cycle; the offending cycle in traversal order
    #[error("cyclic dependency: {cycle:?}")]
    CyclicDependency {
        /// Nodes of the cycle, first and last equal
        cycle: Vec<N>,
    },
}

impl<N: Debug> GraphError<N> {
    /// Nodes of the rejected cycle, starting and ending at the same node
    #[must_use]
    pub fn cycle(&self) -> &[N] {
        match self {
            Self::CyclicDependency { cycle } => cycle,
        }
    }
}
