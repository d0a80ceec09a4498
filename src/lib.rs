//! sqlgraph - Graph-pattern query planning for SQL-extended relational engines
//!
//! This crate rewrites `MATCH` clauses over node tables and edge columns into
//! plain relational queries:
//! - Graph catalog metadata loaded from the host engine
//! - Pattern validation and lowering into a match graph
//! - Statistics-driven cardinality estimation
//! - Dynamic-programming join-order selection
//! - In-place AST rewriting

pub mod graph_catalog;
pub mod query_planner;
pub mod sql_ast;
pub mod utils;
