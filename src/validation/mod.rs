pub mod statement_parser;

pub use statement_parser::{SqlParserStatementParser, StatementParser};
