use sqlguard_core::{
    config::Config,
    context::StatementContext,
    parser::ParserFacade,
    rules::{Orchestrator, RiskLevel}
};

fn validate(sql: &str, config: &Config) -> sqlguard_core::ValidationResult {
    let facade = ParserFacade::default();
    let ast = facade.parse(sql).expect("valid SQL");
    let ctx = StatementContext::builder(sql).ast(ast).build();
    Orchestrator::from_config(config).run(&ctx)
}

fn validate_with_origin(
    sql: &str,
    origin_id: &str,
    config: &Config
) -> sqlguard_core::ValidationResult {
    let facade = ParserFacade::default();
    let ast = facade.parse(sql).expect("valid SQL");
    let ctx = StatementContext::builder(sql).ast(ast).origin_id(origin_id).build();
    Orchestrator::from_config(config).run(&ctx)
}

fn rule_ids(result: &sqlguard_core::ValidationResult) -> Vec<&str> {
    result.violations.iter().map(|v| v.rule_id.as_str()).collect()
}

/// S1: DELETE without WHERE is CRITICAL via `no-where`.
#[test]
fn s1_delete_without_where_is_critical() {
    let result = validate("DELETE FROM users", &Config::default());
    assert!(!result.passed);
    assert_eq!(result.highest_risk_level, RiskLevel::Critical);
    assert!(rule_ids(&result).contains(&"no-where"));
    assert!(result.violations.iter().any(|v| v.message.contains("no WHERE clause")));
}

/// S2: a parameterized SELECT with a real predicate is SAFE.
#[test]
fn s2_parameterized_select_is_safe() {
    let result = validate("SELECT name, email FROM users WHERE id = ?", &Config::default());
    assert!(result.passed);
    assert_eq!(result.highest_risk_level, RiskLevel::Safe);
    assert!(result.violations.is_empty());
}

/// S3: deep OFFSET is MEDIUM, and ORDER BY keeps `missing-order-by` quiet.
#[test]
fn s3_deep_offset_is_medium() {
    let result = validate(
        "SELECT * FROM orders WHERE status = 'active' ORDER BY id LIMIT 20 OFFSET 50000",
        &Config::default()
    );
    assert!(rule_ids(&result).contains(&"deep-offset"));
    let deep_offset = result.violations.iter().find(|v| v.rule_id.as_str() == "deep-offset").unwrap();
    assert_eq!(deep_offset.risk_level, RiskLevel::Medium);
    assert!(deep_offset.message.contains("50000"));
    assert!(!rule_ids(&result).contains(&"missing-order-by"));
}

/// S4: an unapproved UNION is CRITICAL via `set-operation`.
#[test]
fn s4_union_without_allowlist_is_critical() {
    let result =
        validate("SELECT id FROM a UNION SELECT password FROM admin_users", &Config::default());
    assert!(rule_ids(&result).contains(&"set-operation"));
    assert_eq!(result.highest_risk_level, RiskLevel::Critical);
}

/// S5: a denylisted function call is CRITICAL via `dangerous-function`, and
/// nothing else about the query should fire.
#[test]
fn s5_dangerous_function_call_is_critical_and_isolated() {
    let mut config = Config::default();
    config.rules.dangerous_functions = vec!["load_file".to_string()];
    let result = validate("SELECT load_file('/etc/passwd')", &config);
    assert_eq!(rule_ids(&result), vec!["dangerous-function"]);
    assert_eq!(result.highest_risk_level, RiskLevel::Critical);
}

/// Property 7 / spec §4.3: no-WHERE pagination suppresses deep-offset.
#[test]
fn early_return_pair_suppresses_deep_offset() {
    let result = validate("SELECT * FROM t LIMIT 20 OFFSET 50000", &Config::default());
    let ids = rule_ids(&result);
    assert!(ids.contains(&"no-condition-pagination"));
    assert!(!ids.contains(&"deep-offset"));
    assert_eq!(result.highest_risk_level, RiskLevel::Critical);
}

/// Property 8: `UPDATE ... SET` must not be confused with a session `SET`.
#[test]
fn update_set_clause_does_not_trigger_set_statement_rule() {
    let result = validate("UPDATE t SET x = 1 WHERE id = 1", &Config::default());
    assert!(!rule_ids(&result).contains(&"set-statement"));
}

#[test]
fn bare_set_statement_triggers_set_statement_rule() {
    let result = validate("SET autocommit = 0", &Config::default());
    assert!(rule_ids(&result).contains(&"set-statement"));
}

/// Property 9: `sys_*` denies `sys_user` but not `system`, and not a name
/// with a second `_`-separated segment either (spec §4.4: the star stands
/// for "characters other than `_`", not "any characters").
#[test]
fn denied_table_glob_matches_prefix_only() {
    let mut config = Config::default();
    config.rules.denied_tables = vec!["sys_*".to_string()];

    let denied = validate("SELECT * FROM sys_user", &config);
    assert!(rule_ids(&denied).contains(&"denied-table"));

    let allowed = validate("SELECT * FROM system", &config);
    assert!(!rule_ids(&allowed).contains(&"denied-table"));

    let also_allowed = validate("SELECT * FROM sys_a_b", &config);
    assert!(!rule_ids(&also_allowed).contains(&"denied-table"));
}

/// Property 10: MySQL `LIMIT m, n` keeps offset/limit in the right slots.
#[test]
fn mysql_limit_comma_offset_fires_deep_offset_not_large_page() {
    let facade = ParserFacade::new(sqlguard_core::SqlDialect::MySQL, 100);
    let ast = facade.parse("SELECT * FROM t WHERE a = 1 LIMIT 100000, 20").unwrap();
    let ctx = StatementContext::builder("SELECT * FROM t WHERE a = 1 LIMIT 100000, 20")
        .ast(ast)
        .build();
    let result = Orchestrator::from_config(&Config::default()).run(&ctx);
    let ids = rule_ids(&result);
    assert!(ids.contains(&"deep-offset"));
    assert!(!ids.contains(&"large-page-size"));
}

/// Property 3: empty accumulator is SAFE; highest risk is the max recorded.
#[test]
fn empty_result_is_safe() {
    let result = validate("SELECT id FROM users WHERE id = ?", &Config::default());
    assert!(result.passed);
    assert_eq!(result.highest_risk_level, RiskLevel::Safe);
}

#[test]
fn dummy_predicate_variants_are_all_critical() {
    for sql in [
        "SELECT * FROM t WHERE 1 = 1",
        "SELECT * FROM t WHERE true",
        "SELECT * FROM t WHERE 'x' = 'x'",
    ] {
        let result = validate(sql, &Config::default());
        assert!(rule_ids(&result).contains(&"dummy-predicate"), "failed for: {sql}");
    }
}

#[test]
fn real_predicate_is_not_a_dummy() {
    let result = validate("SELECT * FROM t WHERE id = 5", &Config::default());
    assert!(!rule_ids(&result).contains(&"dummy-predicate"));
}

#[test]
fn multi_statement_sql_is_critical_and_suppresses_structural_rules() {
    let result = validate("DELETE FROM users; DROP TABLE users;", &Config::default());
    let ids = rule_ids(&result);
    assert!(ids.contains(&"multi-statement"));
    assert!(!ids.contains(&"ddl"));
    assert!(!ids.contains(&"no-where"));
}

#[test]
fn sql_comment_outside_string_is_rejected() {
    let result = validate("SELECT * FROM t WHERE id = 1 -- drop everything", &Config::default());
    assert!(rule_ids(&result).contains(&"sql-comment"));
}

#[test]
fn sql_comment_marker_inside_a_string_literal_is_ignored() {
    let result = validate("SELECT * FROM t WHERE name = 'a -- b'", &Config::default());
    assert!(!rule_ids(&result).contains(&"sql-comment"));
}

/// spec §4.4: "optional allowance for hint comments `/*+ ... */`", configured
/// via `rules.sql-comment.allow-hint-comments` (distinct from origin-id
/// exemptions).
#[test]
fn sql_comment_allows_hint_comments_when_configured() {
    let sql = "SELECT /*+ INDEX(t idx) */ * FROM t WHERE id = 1";

    let default_result = validate(sql, &Config::default());
    assert!(rule_ids(&default_result).contains(&"sql-comment"));

    let toml = r#"
        [rules.sql-comment]
        allow-hint-comments = true
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    let result = validate(sql, &config);
    assert!(!rule_ids(&result).contains(&"sql-comment"));
}

#[test]
fn stored_procedure_defaults_below_block_threshold() {
    let result = validate("CALL archive_orders()", &Config::default());
    let call = result.violations.iter().find(|v| v.rule_id.as_str() == "stored-procedure");
    assert!(call.is_some());
    assert!(call.unwrap().risk_level < RiskLevel::High);
}

/// Order-insensitivity (spec §8 property 2): shuffling checkers that do not
/// participate in an early-return pair yields the same violation set.
#[test]
fn checker_order_does_not_change_the_violation_set_outside_early_return() {
    let facade = ParserFacade::default();
    let sql = "SELECT * FROM sys_audit WHERE deleted = 0";
    let mut config = Config::default();
    config.rules.denied_tables = vec!["sys_*".to_string()];
    config.rules.blacklist_fields = vec!["deleted".to_string()];

    let ast = facade.parse(sql).unwrap();
    let ctx = StatementContext::builder(sql).ast(ast).build();

    let forward = sqlguard_core::rules::Orchestrator::with_checkers(vec![
        Box::new(sqlguard_core::rules::access_control::DeniedTableChecker::from_config(&config)),
        Box::new(sqlguard_core::rules::where_quality::BlacklistFieldChecker::from_config(&config)),
    ]);
    let reversed = sqlguard_core::rules::Orchestrator::with_checkers(vec![
        Box::new(sqlguard_core::rules::where_quality::BlacklistFieldChecker::from_config(&config)),
        Box::new(sqlguard_core::rules::access_control::DeniedTableChecker::from_config(&config)),
    ]);

    let mut a = rule_ids(&forward.run(&ctx));
    let mut b = rule_ids(&reversed.run(&ctx));
    a.sort();
    b.sort();
    assert_eq!(a, b);
}

/// spec §4.4: a configured `rules.severity.<id>` override changes the risk
/// level a checker emits, without changing whether it fires.
#[test]
fn severity_override_changes_emitted_risk_level() {
    let sql = "DELETE FROM users";

    let default_result = validate(sql, &Config::default());
    let no_where = default_result.violations.iter().find(|v| v.rule_id.as_str() == "no-where");
    assert_eq!(no_where.unwrap().risk_level, RiskLevel::Critical);

    let mut overridden = Config::default();
    overridden.rules.severity.insert("no-where".to_string(), "high".to_string());
    let result = validate(sql, &overridden);
    let no_where = result.violations.iter().find(|v| v.rule_id.as_str() == "no-where");
    assert_eq!(no_where.unwrap().risk_level, RiskLevel::High);
    assert_eq!(result.highest_risk_level, RiskLevel::High);
}

/// spec §3/§6: `rules.<id>.exemptions` holds origin-id globs; a matching
/// origin-id skips that checker entirely, regardless of what the statement
/// would otherwise trigger.
#[test]
fn origin_id_exemption_skips_the_matching_checker_only() {
    let sql = "DELETE FROM users";

    let toml = r#"
        [rules.no-where]
        exemptions = ["BatchMaintenance.*"]
    "#;
    let config: Config = toml::from_str(toml).unwrap();

    let exempt = validate_with_origin(sql, "BatchMaintenance.purgeInactive", &config);
    assert!(exempt.passed);
    assert!(!rule_ids(&exempt).contains(&"no-where"));

    let not_exempt = validate_with_origin(sql, "OrderMapper.purgeAll", &config);
    assert!(!not_exempt.passed);
    assert!(rule_ids(&not_exempt).contains(&"no-where"));
}

/// The `*` wildcard in an origin-id exemption matches only within one
/// `.`-separated segment, mirroring the table-glob semantics in spec §4.4.
#[test]
fn origin_id_exemption_wildcard_does_not_cross_separator() {
    let sql = "DELETE FROM users";

    let toml = r#"
        [rules.no-where]
        exemptions = ["Batch.*"]
    "#;
    let config: Config = toml::from_str(toml).unwrap();

    let one_segment = validate_with_origin(sql, "Batch.purge", &config);
    assert!(one_segment.passed);

    let two_segments = validate_with_origin(sql, "Batch.jobs.purge", &config);
    assert!(!two_segments.passed);
    assert!(rule_ids(&two_segments).contains(&"no-where"));
}

/// spec §4.4 no-pagination: a table matching the checker's
/// `exempt-tables` patterns is out of scope entirely, distinct from the
/// origin-id `exemptions` field on the same rule.
#[test]
fn no_pagination_exempts_configured_tables() {
    let sql = "SELECT id, name FROM reference_codes";

    let default_result = validate(sql, &Config::default());
    assert!(rule_ids(&default_result).contains(&"no-pagination"));

    let toml = r#"
        [rules.no-pagination]
        exempt-tables = ["reference_*"]
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    let result = validate(sql, &config);
    assert!(!rule_ids(&result).contains(&"no-pagination"));
}
