//! Parse-once SQL validation pipeline: AST facade, context model, rule
//! chassis, the built-in rule library, and the validator entry point.
//!
//! Everything above the AST facade operates on an already-parsed handle
//! (see [`parser::AstHandle`]); rule checkers never touch `sqlparser`
//! directly (see [`parser::AstVisitor`]).

pub mod config;
pub mod context;
pub mod error;
pub mod glob;
pub mod parser;
pub mod rules;
pub mod validator;

pub use config::Config;
pub use context::{ExecutionLayer, StatementContext, StatementKind};
pub use parser::{ParserFacade, SqlDialect};
pub use rules::{Orchestrator, ResultAccumulator, RiskLevel, RuleChecker, ValidationResult};
pub use validator::Validator;
