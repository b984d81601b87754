pub mod ledger_schema;
pub mod migrations;
