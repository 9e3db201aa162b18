use sqlparser::ast::{
    Expr, GroupByExpr, ObjectName, ObjectNamePart, SelectItem, SetExpr, Statement, TableFactor,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::models::{ParsedStatement, SelectColumn};
use crate::services::translator::TranslationError;

/// Turns SQL text into a [`ParsedStatement`]
///
/// Implementations must fail with [`TranslationError::Parse`] on malformed
/// input so the failure reaches the client like any other translation error.
pub trait StatementParser: Send + Sync {
    fn parse(&self, sql: &str) -> Result<ParsedStatement, TranslationError>;
}

/// `sqlparser`-backed parser accepting the single-table SELECT subset
///
/// Any clause the semantic layer cannot honor (filters, ordering, limits,
/// locking, SELECT INTO, joins, subqueries and the like) is rejected rather
/// than ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlParserStatementParser;

impl SqlParserStatementParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_statement(stmt: &Statement) -> Result<ParsedStatement, TranslationError> {
        let query = match stmt {
            Statement::Query(query) => query,
            other => {
                return Err(TranslationError::Unsupported(format!(
                    "only SELECT statements are supported, found: {}",
                    statement_kind(other)
                )))
            }
        };

        if query.with.is_some() {
            return Err(unsupported("WITH"));
        }
        if query.order_by.is_some() {
            return Err(unsupported("ORDER BY"));
        }
        if query.limit_clause.is_some() || query.fetch.is_some() {
            return Err(unsupported("LIMIT"));
        }
        if !query.locks.is_empty() {
            return Err(unsupported("FOR UPDATE/SHARE"));
        }
        if query.for_clause.is_some() || query.format_clause.is_some() {
            return Err(unsupported("FOR/FORMAT output clause"));
        }
        if query.settings.is_some() || !query.pipe_operators.is_empty() {
            return Err(unsupported("SETTINGS/pipe operators"));
        }

        let select = match &*query.body {
            SetExpr::Select(select) => select,
            SetExpr::SetOperation { .. } => return Err(unsupported("UNION/INTERSECT/EXCEPT")),
            _ => {
                return Err(TranslationError::Unsupported(
                    "only plain SELECT queries are supported".to_string(),
                ))
            }
        };

        if select.distinct.is_some() {
            return Err(unsupported("DISTINCT"));
        }
        if select.selection.is_some() {
            return Err(unsupported("WHERE"));
        }
        if select.having.is_some() {
            return Err(unsupported("HAVING"));
        }
        if select.into.is_some() {
            return Err(unsupported("SELECT INTO"));
        }
        if select.top.is_some() {
            return Err(unsupported("TOP"));
        }
        if select.exclude.is_some() {
            return Err(unsupported("EXCLUDE"));
        }
        if !select.named_window.is_empty() || select.qualify.is_some() {
            return Err(unsupported("WINDOW/QUALIFY"));
        }
        if select.prewhere.is_some() || select.connect_by.is_some() {
            return Err(unsupported("PREWHERE/CONNECT BY"));
        }
        if !select.lateral_views.is_empty() {
            return Err(unsupported("LATERAL VIEW"));
        }
        if !select.cluster_by.is_empty()
            || !select.distribute_by.is_empty()
            || !select.sort_by.is_empty()
        {
            return Err(unsupported("CLUSTER/DISTRIBUTE/SORT BY"));
        }
        if select.value_table_mode.is_some() {
            return Err(unsupported("SELECT AS STRUCT/VALUE"));
        }

        let table = Self::extract_table(&select.from)?;

        let columns = select
            .projection
            .iter()
            .map(Self::select_column)
            .collect::<Vec<_>>();

        let group_by = match &select.group_by {
            GroupByExpr::All(_) => return Err(unsupported("GROUP BY ALL")),
            GroupByExpr::Expressions(exprs, _) if exprs.is_empty() => None,
            GroupByExpr::Expressions(exprs, _) => Some(
                exprs
                    .iter()
                    .map(Self::group_by_identifier)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
        };

        Ok(ParsedStatement {
            table,
            columns,
            group_by,
        })
    }

    /// Primary table of the FROM clause; `None` when there is no FROM
    fn extract_table(
        from: &[sqlparser::ast::TableWithJoins],
    ) -> Result<Option<String>, TranslationError> {
        let Some(first) = from.first() else {
            return Ok(None);
        };

        if from.len() > 1 || !first.joins.is_empty() {
            return Err(unsupported("multi-table FROM / JOIN"));
        }

        match &first.relation {
            TableFactor::Table { args: Some(_), .. } => Err(unsupported("table function")),
            TableFactor::Table { name, .. } => Ok(Some(object_name_tail(name))),
            TableFactor::Derived { .. } => Err(unsupported("subquery in FROM")),
            other => Err(TranslationError::Unsupported(format!(
                "table expression '{}' is not supported",
                other
            ))),
        }
    }

    fn select_column(item: &SelectItem) -> SelectColumn {
        match item {
            SelectItem::UnnamedExpr(expr) => SelectColumn::named(expr_name(expr)),
            SelectItem::ExprWithAlias { expr, alias } => {
                SelectColumn::aliased(expr_name(expr), alias.value.clone())
            }
            SelectItem::Wildcard(_) => SelectColumn::named("*"),
            other => SelectColumn::named(other.to_string()),
        }
    }

    fn group_by_identifier(expr: &Expr) -> Result<String, TranslationError> {
        match expr {
            Expr::Identifier(_) | Expr::CompoundIdentifier(_) => Ok(expr_name(expr)),
            other => Err(TranslationError::Unsupported(format!(
                "GROUP BY expression '{}' is not a plain column name",
                other
            ))),
        }
    }
}

impl StatementParser for SqlParserStatementParser {
    fn parse(&self, sql: &str) -> Result<ParsedStatement, TranslationError> {
        let dialect = PostgreSqlDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(sql)
            .map_err(|e| TranslationError::Parse(e.to_string()))?;

        let statements = parser
            .parse_statements()
            .map_err(|e| TranslationError::Parse(e.to_string()))?;

        match statements.as_slice() {
            [] => Err(TranslationError::Parse("Empty SQL query".to_string())),
            [stmt] => Self::parse_statement(stmt),
            _ => Err(unsupported("multiple statements")),
        }
    }
}

fn unsupported(what: &str) -> TranslationError {
    TranslationError::Unsupported(format!("{} is not supported", what))
}

/// Name a select expression is known by: the column for identifiers, the
/// SQL rendering for anything else
fn expr_name(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(ident) => ident.value.clone(),
        Expr::CompoundIdentifier(idents) => idents
            .last()
            .map(|ident| ident.value.clone())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

fn object_name_tail(name: &ObjectName) -> String {
    match name.0.last() {
        Some(ObjectNamePart::Identifier(ident)) => ident.value.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn statement_kind(stmt: &Statement) -> &'static str {
    match stmt {
        Statement::Insert { .. } => "INSERT",
        Statement::Update { .. } => "UPDATE",
        Statement::Delete { .. } => "DELETE",
        Statement::Drop { .. } => "DROP",
        Statement::CreateTable { .. } => "CREATE TABLE",
        Statement::AlterTable { .. } => "ALTER TABLE",
        Statement::StartTransaction { .. } | Statement::Commit { .. } | Statement::Rollback { .. } => {
            "transaction control"
        }
        _ => "non-query statement",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> Result<ParsedStatement, TranslationError> {
        SqlParserStatementParser::new().parse(sql)
    }

    #[test]
    fn test_parse_simple_select() {
        let stmt = parse("SELECT origin, total_passengers FROM flights").unwrap();
        assert_eq!(stmt.table.as_deref(), Some("flights"));
        assert_eq!(
            stmt.columns,
            vec![
                SelectColumn::named("origin"),
                SelectColumn::named("total_passengers"),
            ]
        );
        assert_eq!(stmt.group_by, None);
    }

    #[test]
    fn test_parse_alias_and_group_by() {
        let stmt =
            parse("SELECT region AS r, SUM(units) AS total_units FROM sales GROUP BY region")
                .unwrap();
        assert_eq!(stmt.columns[0].effective_name(), "r");
        assert_eq!(stmt.columns[1].effective_name(), "total_units");
        assert_eq!(stmt.columns[1].alias.as_deref(), Some("total_units"));
        assert_eq!(stmt.group_by, Some(vec!["region".to_string()]));
    }

    #[test]
    fn test_qualified_names_use_last_part() {
        let stmt = parse("SELECT f.origin FROM public.flights f").unwrap();
        assert_eq!(stmt.table.as_deref(), Some("flights"));
        assert_eq!(stmt.columns[0].effective_name(), "origin");
    }

    #[test]
    fn test_unaliased_expression_keeps_rendering() {
        let stmt = parse("SELECT SUM(passengers) FROM flights").unwrap();
        assert_ne!(stmt.columns[0].effective_name(), "passengers");
        assert!(stmt.columns[0].effective_name().contains("SUM"));
    }

    #[test]
    fn test_wildcard() {
        let stmt = parse("SELECT * FROM flights").unwrap();
        assert_eq!(stmt.columns, vec![SelectColumn::named("*")]);
    }

    #[test]
    fn test_no_from_clause() {
        let stmt = parse("SELECT 1").unwrap();
        assert_eq!(stmt.table, None);
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(parse("SELEC origin FROM"), Err(TranslationError::Parse(_))));
        assert!(matches!(parse(""), Err(TranslationError::Parse(_))));
    }

    #[test]
    fn test_unsupported_clauses_are_rejected() {
        let rejected = [
            "SELECT origin FROM flights WHERE origin = 'SFO'",
            "SELECT origin FROM flights ORDER BY origin",
            "SELECT origin FROM flights LIMIT 10",
            "SELECT DISTINCT origin FROM flights",
            "SELECT origin, total_passengers FROM flights GROUP BY origin HAVING total_passengers > 1",
            "SELECT origin FROM flights JOIN sales ON 1 = 1",
            "SELECT origin FROM flights, sales",
            "SELECT origin FROM (SELECT origin FROM flights) t",
            "SELECT origin FROM flights UNION SELECT origin FROM flights",
            "SELECT origin FROM flights GROUP BY UPPER(origin)",
            "INSERT INTO flights VALUES (1)",
            "SELECT origin FROM flights; SELECT origin FROM flights",
            "SELECT origin INTO backup FROM flights",
            "SELECT origin FROM flights FOR UPDATE",
            "SELECT origin FROM flights WINDOW w AS (PARTITION BY origin)",
            "SELECT origin FROM generate_series(1, 3)",
        ];

        for sql in rejected {
            assert!(
                matches!(parse(sql), Err(TranslationError::Unsupported(_))),
                "expected {} to be rejected",
                sql
            );
        }
    }
}
