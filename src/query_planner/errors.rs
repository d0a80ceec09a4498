use std::fmt::Display;

use thiserror::Error;

use crate::graph_catalog::errors::{GraphCatalogError, ProbeError};

/// Planner pass names, for error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Validation,
    PatternConstruction,
    PredicateAttachment,
    CardinalityEstimation,
    JoinOrdering,
    Emission,
}

impl Display for Pass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pass::Validation => write!(f, "Validation"),
            Pass::PatternConstruction => write!(f, "PatternConstruction"),
            Pass::PredicateAttachment => write!(f, "PredicateAttachment"),
            Pass::CardinalityEstimation => write!(f, "CardinalityEstimation"),
            Pass::JoinOrdering => write!(f, "JoinOrdering"),
            Pass::Emission => write!(f, "Emission"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Alias `{alias}` does not bind a node table or node view.")]
    NotANodeTable { alias: String },

    #[error("Edge column `{column}` is not declared on node table `{table}`.")]
    UnknownEdgeColumn { column: String, table: String },

    #[error("Edge column `{column}` on `{table}` cannot bind any concrete source table.")]
    UnboundEdge { column: String, table: String },

    #[error("Invalid path length range [{min}..{max}] on edge `{column}`: the lower bound must not exceed the upper bound.")]
    InvalidPathLength { column: String, min: u32, max: u32 },

    #[error("Edge column `{column}` declares sink `{sink}`, which is not a node table.")]
    UnknownSinkTable { column: String, sink: String },

    #[error("Node `{alias}` cannot terminate edge `{column}`: none of its candidate tables appear in the edge's declared sink set.")]
    UnreachableSink { alias: String, column: String },

    #[error("Edge alias `{alias}` is bound more than once in the MATCH pattern.")]
    DuplicateEdgeAlias { alias: String },

    #[error("Ambiguous edge reference `{name}`: candidate aliases are {candidates}.")]
    AmbiguousEdgeReference { name: String, candidates: String },

    #[error("{pass}: no complete join plan exists for the component containing `{alias}`; this indicates a planner defect.")]
    NoCompletePlan { pass: Pass, alias: String },

    #[error("{pass}: {source}")]
    Catalog {
        pass: Pass,
        #[source]
        source: GraphCatalogError,
    },

    #[error("{pass}: {source}")]
    Probe {
        pass: Pass,
        #[source]
        source: ProbeError,
    },
}

impl PlannerError {
    pub fn probe(pass: Pass, source: ProbeError) -> Self {
        PlannerError::Probe { pass, source }
    }
}
