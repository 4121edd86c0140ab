use std::sync::Arc;

use sqlguard_core::{
    context::StatementKind,
    parser::{ParserFacade, SqlDialect}
};

#[test]
fn parses_simple_select() {
    let facade = ParserFacade::default();
    let ast = facade.parse("SELECT id, name FROM users WHERE id = 1").unwrap();
    assert_eq!(ast.kind(), StatementKind::Select);
    assert_eq!(ast.statements().len(), 1);
}

#[test]
fn parses_update_and_delete() {
    let facade = ParserFacade::default();
    assert_eq!(
        facade.parse("UPDATE users SET name = 'x' WHERE id = 1").unwrap().kind(),
        StatementKind::Update
    );
    assert_eq!(facade.parse("DELETE FROM users WHERE id = 1").unwrap().kind(), StatementKind::Delete);
    assert_eq!(
        facade.parse("INSERT INTO users (id) VALUES (1)").unwrap().kind(),
        StatementKind::Insert
    );
}

#[test]
fn whitespace_only_sql_returns_empty_handle_without_caching() {
    let facade = ParserFacade::default();
    let ast = facade.parse("   \n\t  ").unwrap();
    assert!(ast.statements().is_empty());
    assert_eq!(ast.kind(), StatementKind::Other);
    assert!(!ast.is_parse_failure());
}

#[test]
fn cache_returns_the_same_arc_on_repeat_parses() {
    let facade = ParserFacade::default();
    let sql = "SELECT 1 FROM dual";
    let first = facade.parse(sql).unwrap();
    let second = facade.parse(sql).unwrap();
    assert!(Arc::ptr_eq(&first, &second), "second parse should hit the LRU cache, not re-parse");
}

#[test]
fn distinct_sql_does_not_share_cache_entries() {
    let facade = ParserFacade::default();
    let a = facade.parse("SELECT 1").unwrap();
    let b = facade.parse("SELECT 2").unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
}

#[test]
fn parse_lenient_never_errors_on_bad_sql() {
    let facade = ParserFacade::default();
    let ast = facade.parse_lenient("SELECT FROM FROM FROM (((");
    assert!(ast.is_parse_failure());
    assert_eq!(ast.kind(), StatementKind::Other);
    assert_eq!(facade.lenient_failure_count(), 1);
}

#[test]
fn parse_lenient_does_not_flag_valid_sql_as_a_failure() {
    let facade = ParserFacade::default();
    let ast = facade.parse_lenient("SELECT 1");
    assert!(!ast.is_parse_failure());
    assert_eq!(facade.lenient_failure_count(), 0);
}

#[test]
fn strict_parse_propagates_an_error() {
    let facade = ParserFacade::default();
    assert!(facade.parse("SELECT FROM FROM FROM (((").is_err());
}

#[test]
fn mysql_limit_comma_syntax_preserves_offset_then_limit() {
    use sqlguard_core::parser::facts::SelectFacts;

    let facade = ParserFacade::new(SqlDialect::MySQL, 100);
    let ast = facade.parse("SELECT * FROM orders LIMIT 100000, 20").unwrap();
    let sqlparser::ast::Statement::Query(query) = ast.primary().unwrap() else {
        panic!("expected a query");
    };
    let facts = SelectFacts::collect(query);
    assert_eq!(facts.pagination.offset, Some(100_000));
    assert_eq!(facts.pagination.limit, Some(20));
}

#[test]
fn dialects_all_parse_their_own_pagination_forms() {
    let cases: &[(SqlDialect, &str)] = &[
        (SqlDialect::MySQL, "SELECT * FROM t LIMIT 5, 10"),
        (SqlDialect::PostgreSQL, "SELECT a FROM t1 EXCEPT SELECT a FROM t2"),
        (SqlDialect::Generic, "SELECT TOP 10 * FROM t"),
    ];
    for (dialect, sql) in cases {
        let facade = ParserFacade::new(*dialect, 100);
        assert!(facade.parse(sql).is_ok(), "failed to parse under {dialect:?}: {sql}");
    }
}

#[test]
fn multi_statement_sql_is_visible_on_the_handle() {
    let facade = ParserFacade::default();
    let ast = facade.parse("SELECT 1; SELECT 2;").unwrap();
    assert_eq!(ast.statements().len(), 2);
}

#[test]
fn trailing_semicolon_alone_is_a_single_statement() {
    let facade = ParserFacade::default();
    let ast = facade.parse("SELECT 1;").unwrap();
    assert_eq!(ast.statements().len(), 1);
}
