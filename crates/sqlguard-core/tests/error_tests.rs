use sqlguard_core::error::{config_error, parse_error, rule_fault, safety_violation};

#[test]
fn test_parse_error() {
    let error = parse_error("Invalid syntax");
    let _msg = error.to_string();
}

#[test]
fn test_parse_error_with_position() {
    let error = parse_error("Expected keyword at Line: 5, Column 10");
    let msg = error.to_string();
    assert!(msg.contains("line 5"));
    assert!(msg.contains("column 10"));
}

#[test]
fn test_rule_fault() {
    let error = rule_fault("no-where", "checker panicked");
    let msg = error.to_string();
    assert!(msg.contains("no-where"));
    assert!(msg.contains("checker panicked"));
}

#[test]
fn test_safety_violation() {
    let error = safety_violation("DELETE without WHERE is blocked");
    let _msg = error.to_string();
}

#[test]
fn test_config_error() {
    let error = config_error("Invalid configuration value");
    let _msg = error.to_string();
}

#[test]
fn test_position_extraction_large_numbers() {
    let error = parse_error("Error at Line: 999, Column 12345");
    let msg = error.to_string();
    assert!(msg.contains("line 999"));
    assert!(msg.contains("column 12345"));
}

#[test]
fn test_error_types_are_different() {
    let parse_err = parse_error("test");
    let fault_err = rule_fault("some-rule", "test");
    let violation_err = safety_violation("test");
    let config_err = config_error("test");
    assert!(!parse_err.to_string().is_empty());
    assert!(!fault_err.to_string().is_empty());
    assert!(!violation_err.to_string().is_empty());
    assert!(!config_err.to_string().is_empty());
}
