use std::sync::Arc;

use sqlgraph::query_planner::{OuterScope, PlannerConfig, QueryPlanner};
use sqlgraph::sql_ast::{EdgePattern, Expr, SelectItem};
use sqlgraph::utils::Ident;

use crate::fixtures::{
    degree_row, hop, named_from, path, query_block, sample_metadata, select_columns, StaticProbe,
};

fn planner() -> QueryPlanner {
    QueryPlanner::new(Arc::new(sample_metadata()), PlannerConfig::default())
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[tokio::test]
async fn two_hop_simple_path_plans_into_one_join_tree() {
    init_logging();
    let mut block = query_block(
        select_columns(&[("a", "name"), ("c", "name")]),
        vec![
            named_from("Person", "a"),
            named_from("Person", "b"),
            named_from("Person", "c"),
        ],
        None,
        vec![path(
            vec![
                hop("a", EdgePattern::aliased("Knows", "e")),
                hop("b", EdgePattern::aliased("Knows", "f")),
            ],
            "c",
        )],
    );

    let probe = StaticProbe::uniform(&["a", "b", "c"], &["Person"], 100)
        .with_degree("dbo_Person_Knows_Sampling", degree_row(&[1, 2, 3, 4], 4, 1.0));
    planner()
        .plan_query_block(&mut block, &probe, &OuterScope::root())
        .await
        .unwrap();

    assert!(block.match_clause.is_none());
    assert_eq!(block.from.len(), 1);
    let from_sql = block.from[0].to_string();
    for fragment in [
        "dbo.Person AS [a]",
        "dbo.Person AS [b]",
        "dbo.Person AS [c]",
        "AS [e]",
        "AS [f]",
        "e.Sink = b.GlobalNodeId",
        "f.Sink = c.GlobalNodeId",
    ] {
        assert!(from_sql.contains(fragment), "missing `{fragment}` in {from_sql}");
    }
}

#[tokio::test]
async fn triangle_closes_the_cycle_without_downsize_guards() {
    init_logging();
    let mut block = query_block(
        select_columns(&[("a", "name")]),
        vec![
            named_from("Person", "a"),
            named_from("Person", "b"),
            named_from("Person", "c"),
        ],
        None,
        vec![
            path(vec![hop("a", EdgePattern::aliased("Knows", "e1"))], "b"),
            path(vec![hop("b", EdgePattern::aliased("Knows", "e2"))], "c"),
            path(vec![hop("c", EdgePattern::aliased("Knows", "e3"))], "a"),
        ],
    );

    let probe = StaticProbe::uniform(&["a", "b", "c"], &["Person"], 100)
        .with_degree("dbo_Person_Knows_Sampling", degree_row(&[1, 2, 3, 4], 4, 2.0));
    planner()
        .plan_query_block(&mut block, &probe, &OuterScope::root())
        .await
        .unwrap();

    assert!(block.match_clause.is_none());
    assert_eq!(block.from.len(), 1);
    let from_sql = block.from[0].to_string();
    // All three nodes and all three decoded edges are in one tree, and one
    // edge closes the cycle onto an already materialized node.
    for alias in ["[a]", "[b]", "[c]", "[e1]", "[e2]", "[e3]"] {
        assert!(from_sql.contains(alias), "missing `{alias}` in {from_sql}");
    }
    assert!(!from_sql.contains("DownSizeFunction"));
}

#[tokio::test]
async fn variable_length_path_projects_through_the_decoder() {
    init_logging();
    let mut block = query_block(
        sqlgraph::sql_ast::SelectClause {
            distinct: false,
            items: vec![SelectItem::QualifiedStar(Ident::new("p"))],
        },
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

    let probe = StaticProbe::uniform(&["a", "b"], &["Person"], 100)
        .with_degree("dbo_Person_Knows_Sampling", degree_row(&[1, 2, 3, 4], 4, 2.0));
    planner()
        .plan_query_block(&mut block, &probe, &OuterScope::root())
        .await
        .unwrap();

    let SelectItem::Expr { expr, .. } = &block.select.items[0] else {
        panic!("expected rewritten projection");
    };
    assert_eq!(
        expr.to_string(),
        "dbo.dbo_Person_Knows_PathMessageDecoder(p.PathMessage, b._NodeType, b._NodeId)"
    );
    // The variable-length edge materializes through the path decoder with
    // its bounds.
    let from_sql = block.from[0].to_string();
    assert!(from_sql.contains("dbo.dbo_Person_Knows_PathDecoder(a.Knows, 1, 3) AS [p]"));
}

#[tokio::test]
async fn disconnected_components_plan_independently() {
    init_logging();
    let mut block = query_block(
        select_columns(&[("a", "name"), ("c", "name")]),
        vec![
            named_from("Person", "a"),
            named_from("Person", "b"),
            named_from("Person", "c"),
            named_from("Person", "d"),
        ],
        None,
        vec![
            path(vec![hop("a", EdgePattern::aliased("Knows", "e"))], "b"),
            path(vec![hop("c", EdgePattern::aliased("Knows", "f"))], "d"),
        ],
    );

    let probe = StaticProbe::uniform(&["a", "b", "c", "d"], &["Person"], 100)
        .with_degree("dbo_Person_Knows_Sampling", degree_row(&[1, 2, 3, 4], 4, 1.0));
    planner()
        .plan_query_block(&mut block, &probe, &OuterScope::root())
        .await
        .unwrap();

    assert!(block.match_clause.is_none());
    assert_eq!(block.from.len(), 2);
    assert!(block.where_clause.is_none());
    let first = block.from[0].to_string();
    let second = block.from[1].to_string();
    assert!(first.contains("[a]") && !first.contains("[c]"));
    assert!(second.contains("[c]") && !second.contains("[a]"));
}

#[tokio::test]
async fn external_alias_joins_back_through_node_identity() {
    init_logging();
    let mut block = query_block(
        select_columns(&[("y", "name")]),
        vec![named_from("Person", "x"), named_from("Person", "y")],
        None,
        vec![path(vec![hop("x", EdgePattern::aliased("Knows", "e"))], "y")],
    );

    let probe = StaticProbe::uniform(&["x_inner", "y"], &["Person"], 100)
        .with_degree("dbo_Person_Knows_Sampling", degree_row(&[1, 2, 3, 4], 4, 1.0));
    let outer = OuterScope::root().child([Ident::new("x")]);
    planner()
        .plan_query_block(&mut block, &probe, &outer)
        .await
        .unwrap();

    // x leaves the inner FROM; its replacement joins back on GlobalNodeId.
    assert_eq!(block.from.len(), 1);
    let from_sql = block.from[0].to_string();
    assert!(from_sql.contains("dbo.Person AS [x_inner]"));
    assert!(!from_sql.contains("AS [x]"));
    let where_sql = block.where_clause.as_ref().unwrap().to_string();
    assert!(where_sql.contains("x.GlobalNodeId = x_inner.GlobalNodeId"));
}

#[tokio::test]
async fn node_predicates_survive_into_the_emitted_where_clause() {
    init_logging();
    let mut block = query_block(
        select_columns(&[("b", "name")]),
        vec![named_from("Person", "a"), named_from("Person", "b")],
        Some(Expr::binary(
            sqlgraph::sql_ast::BinaryOp::Gt,
            Expr::column(&["a", "age"]),
            Expr::integer(30),
        )),
        vec![path(vec![hop("a", EdgePattern::aliased("Knows", "e"))], "b")],
    );

    let probe = StaticProbe::uniform(&["a", "b"], &["Person"], 100)
        .with_degree("dbo_Person_Knows_Sampling", degree_row(&[1, 2, 3, 4], 4, 1.0));
    planner()
        .plan_query_block(&mut block, &probe, &OuterScope::root())
        .await
        .unwrap();

    let where_sql = block.where_clause.as_ref().unwrap().to_string();
    assert!(where_sql.contains("a.age > 30"));
}

#[tokio::test]
async fn planning_is_idempotent_on_its_own_output() -> anyhow::Result<()> {
    init_logging();
    let mut block = query_block(
        select_columns(&[("a", "name")]),
        vec![named_from("Person", "a"), named_from("Person", "b")],
        None,
        vec![path(vec![hop("a", EdgePattern::aliased("Knows", "e"))], "b")],
    );

    let probe = StaticProbe::uniform(&["a", "b"], &["Person"], 100)
        .with_degree("dbo_Person_Knows_Sampling", degree_row(&[1, 2, 3, 4], 4, 1.0));
    let planner = planner();
    planner
        .plan_query_block(&mut block, &probe, &OuterScope::root())
        .await?;
    assert!(block.match_clause.is_none());

    let emitted = block.clone();
    planner
        .plan_query_block(&mut block, &probe, &OuterScope::root())
        .await?;
    assert_eq!(block, emitted);
    Ok(())
}

#[tokio::test]
async fn a_beam_of_one_still_completes() {
    init_logging();
    let config = PlannerConfig {
        max_states: 1,
        ..PlannerConfig::default()
    };
    let planner = QueryPlanner::new(Arc::new(sample_metadata()), config);

    let mut block = query_block(
        select_columns(&[("a", "name"), ("c", "name")]),
        vec![
            named_from("Person", "a"),
            named_from("Person", "b"),
            named_from("Person", "c"),
        ],
        None,
        vec![path(
            vec![
                hop("a", EdgePattern::aliased("Knows", "e")),
                hop("b", EdgePattern::aliased("Knows", "f")),
            ],
            "c",
        )],
    );
    let probe = StaticProbe::uniform(&["a", "b", "c"], &["Person"], 100)
        .with_degree("dbo_Person_Knows_Sampling", degree_row(&[1, 2, 3, 4], 4, 1.0));
    planner
        .plan_query_block(&mut block, &probe, &OuterScope::root())
        .await
        .unwrap();
    assert!(block.match_clause.is_none());
    assert_eq!(block.from.len(), 1);
}

#[tokio::test]
async fn split_nodes_replicate_their_predicates() {
    init_logging();
    // b's two outgoing edges force the planner back through b: whichever
    // seed materializes one of them, the other lands on a split copy.
    let mut block = query_block(
        select_columns(&[("a", "name"), ("c", "name"), ("d", "model")]),
        vec![
            named_from("Person", "a"),
            named_from("Person", "b"),
            named_from("Person", "c"),
            named_from("Device", "d"),
        ],
        Some(Expr::binary(
            sqlgraph::sql_ast::BinaryOp::Gt,
            Expr::column(&["b", "age"]),
            Expr::integer(30),
        )),
        vec![
            path(
                vec![
                    hop("a", EdgePattern::aliased("Knows", "e")),
                    hop("b", EdgePattern::aliased("Knows", "f")),
                ],
                "c",
            ),
            path(vec![hop("b", EdgePattern::aliased("Owns", "g"))], "d"),
        ],
    );

    let probe = StaticProbe::uniform(&["a", "b", "c", "d"], &["Person", "Device"], 100)
        .with_degree("dbo_Person_Knows_Sampling", degree_row(&[1, 2, 3, 4], 4, 1.0))
        .with_degree("dbo_Person_Owns_Sampling", degree_row(&[1, 2], 2, 1.0));
    planner()
        .plan_query_block(&mut block, &probe, &OuterScope::root())
        .await
        .unwrap();

    assert!(block.match_clause.is_none());
    let where_sql = block.where_clause.as_ref().unwrap().to_string();
    assert!(where_sql.contains("b.age > 30"));
    // If the chosen plan split b, every replica repeats the predicate.
    let from_sql = block.from[0].to_string();
    if from_sql.contains("AS [b_1]") {
        assert!(where_sql.contains("b_1.age > 30"));
    }
}
