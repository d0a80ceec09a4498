use async_trait::async_trait;
use mockall::mock;

use sqlgraph::graph_catalog::errors::ProbeError;
use sqlgraph::graph_catalog::probe::{
    CardinalityRow, CatalogProbe, CatalogRow, EdgeDegreeRow,
};
use sqlgraph::query_planner::config::PlannerConfig;
use sqlgraph::query_planner::errors::PlannerError;
use sqlgraph::query_planner::estimator::CardinalityEstimator;
use sqlgraph::query_planner::pattern_builder::build_match_graph;
use sqlgraph::query_planner::scope::OuterScope;
use sqlgraph::sql_ast::EdgePattern;
use sqlgraph::utils::Ident;

use crate::fixtures::{
    degree_row, hop, named_from, path, query_block, sample_metadata, select_columns, StaticProbe,
};

#[tokio::test]
async fn view_nodes_sum_their_concrete_tables() {
    let metadata = sample_metadata();
    let mut block = query_block(
        select_columns(&[("v", "age")]),
        vec![named_from("People", "v"), named_from("Person", "b")],
        None,
        vec![path(vec![hop("v", EdgePattern::aliased("Knows", "e"))], "b")],
    );
    let mut graph = build_match_graph(&mut block, &metadata, &OuterScope::root()).unwrap();

    let mut probe = StaticProbe::uniform(&["b"], &["Person", "Employee"], 100);
    // One probe row per concrete table behind the view, same alias tag.
    probe.cardinalities.push(CardinalityRow {
        alias: "v".to_string(),
        estimated_rows: 60.0,
    });
    probe.cardinalities.push(CardinalityRow {
        alias: "v".to_string(),
        estimated_rows: 40.0,
    });

    let config = PlannerConfig::default();
    CardinalityEstimator::new(&probe, &metadata, &config)
        .annotate(&mut graph)
        .await
        .unwrap();

    let v = graph.node_by_alias(&Ident::new("v")).unwrap();
    assert_eq!(graph.node(v).estimated_rows, 100.0);
    assert_eq!(graph.node(v).table_row_count, 200);
}

#[tokio::test]
async fn edge_degree_scales_by_blob_size_over_sample_rows() {
    let metadata = sample_metadata();
    let mut block = query_block(
        select_columns(&[("a", "name")]),
        vec![named_from("Person", "a"), named_from("Person", "b")],
        None,
        vec![path(vec![hop("a", EdgePattern::aliased("Knows", "e"))], "b")],
    );
    let mut graph = build_match_graph(&mut block, &metadata, &OuterScope::root()).unwrap();

    // Eight sampled ids against a recorded sample of four rows: degree
    // doubles.
    let probe = StaticProbe::uniform(&["a", "b"], &["Person"], 100).with_degree(
        "dbo_Person_Knows_Sampling",
        degree_row(&[1, 2, 3, 4, 5, 6, 7, 8], 4, 1.5),
    );
    let config = PlannerConfig::default();
    CardinalityEstimator::new(&probe, &metadata, &config)
        .annotate(&mut graph)
        .await
        .unwrap();

    let e = graph.edge_by_alias(&Ident::new("e")).unwrap();
    let stats = &graph.edge(e).statistics;
    assert_eq!(stats.average_degree, 3.0);
    assert_eq!(stats.row_count, 8);
    assert!(!stats.histogram.is_empty());
}

#[tokio::test]
async fn path_degree_applies_the_length_bounds() {
    let metadata = sample_metadata();
    let mut block = query_block(
        select_columns(&[("a", "name")]),
        vec![named_from("Person", "a"), named_from("Person", "b")],
        None,
        vec![path(
            vec![hop(
                "a",
                EdgePattern::path("Knows", Some(Ident::new("p")), 1, Some(3)),
            )],
            "b",
        )],
    );
    let mut graph = build_match_graph(&mut block, &metadata, &OuterScope::root()).unwrap();

    let probe = StaticProbe::uniform(&["a", "b"], &["Person"], 100).with_degree(
        "dbo_Person_Knows_Sampling",
        degree_row(&[1, 2, 3, 4], 4, 2.0),
    );
    let config = PlannerConfig::default();
    CardinalityEstimator::new(&probe, &metadata, &config)
        .annotate(&mut graph)
        .await
        .unwrap();

    let p = graph.edge_by_alias(&Ident::new("p")).unwrap();
    // 2^3 - 2^0
    assert_eq!(graph.edge(p).statistics.average_degree, 7.0);
}

#[tokio::test]
async fn zero_min_path_over_a_sparse_edge_keeps_the_geometric_mass() {
    let metadata = sample_metadata();
    let mut block = query_block(
        select_columns(&[("a", "name")]),
        vec![named_from("Person", "a"), named_from("Person", "b")],
        None,
        vec![path(
            vec![hop(
                "a",
                EdgePattern::path("Knows", Some(Ident::new("p")), 0, Some(3)),
            )],
            "b",
        )],
    );
    let mut graph = build_match_graph(&mut block, &metadata, &OuterScope::root()).unwrap();

    // Two sampled ids against a recorded sample of four rows scale the
    // degree down to 0.5.
    let probe = StaticProbe::uniform(&["a", "b"], &["Person"], 100).with_degree(
        "dbo_Person_Knows_Sampling",
        degree_row(&[1, 2], 4, 1.0),
    );
    let config = PlannerConfig::default();
    CardinalityEstimator::new(&probe, &metadata, &config)
        .annotate(&mut graph)
        .await
        .unwrap();

    let p = graph.edge_by_alias(&Ident::new("p")).unwrap();
    // 0.5^0 * (3 - 0 + 1)
    assert_eq!(graph.edge(p).statistics.average_degree, 4.0);
}

#[tokio::test]
async fn missing_density_falls_back_to_the_configured_default() {
    let metadata = sample_metadata();
    let mut block = query_block(
        select_columns(&[("a", "name")]),
        vec![named_from("Person", "a"), named_from("Person", "b")],
        None,
        vec![path(vec![hop("a", EdgePattern::aliased("Knows", "e"))], "b")],
    );
    let mut graph = build_match_graph(&mut block, &metadata, &OuterScope::root()).unwrap();

    let mut probe = StaticProbe::uniform(&["a", "b"], &["Person"], 100);
    probe.densities.clear();
    let config = PlannerConfig::default();
    CardinalityEstimator::new(&probe, &metadata, &config)
        .annotate(&mut graph)
        .await
        .unwrap();

    let a = graph.node_by_alias(&Ident::new("a")).unwrap();
    assert_eq!(
        graph.node(a).global_node_id_density,
        config.default_density
    );
}

mock! {
    Probe {}

    #[async_trait]
    impl CatalogProbe for Probe {
        async fn catalog_rows(&self, sql: &str) -> Result<Vec<CatalogRow>, ProbeError>;
        async fn estimate_node_rows(&self, sql: &str) -> Result<Vec<CardinalityRow>, ProbeError>;
        async fn node_table_row_count(&self, schema: &str, table: &str) -> Result<u64, ProbeError>;
        async fn edge_degree(&self, sql: &str) -> Result<Option<EdgeDegreeRow>, ProbeError>;
        async fn primary_key_density(&self, schema: &str, table: &str) -> Result<Option<f64>, ProbeError>;
    }
}

#[tokio::test]
async fn probe_failures_propagate_as_infrastructure_errors() {
    let metadata = sample_metadata();
    let mut block = query_block(
        select_columns(&[("a", "name")]),
        vec![named_from("Person", "a"), named_from("Person", "b")],
        None,
        vec![path(vec![hop("a", EdgePattern::aliased("Knows", "e"))], "b")],
    );
    let mut graph = build_match_graph(&mut block, &metadata, &OuterScope::root()).unwrap();

    let mut probe = MockProbe::new();
    probe
        .expect_estimate_node_rows()
        .returning(|_| Err(ProbeError::Malformed("connection severed".to_string())));

    let config = PlannerConfig::default();
    let err = CardinalityEstimator::new(&probe, &metadata, &config)
        .annotate(&mut graph)
        .await
        .unwrap_err();
    assert!(matches!(err, PlannerError::Probe { .. }));
}
