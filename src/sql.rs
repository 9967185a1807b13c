use chrono::NaiveDate;
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertSpace {
        id: SpaceId,
        owner_id: UserId,
        name: String,
        description: String,
        price_per_night: i64,
    },
    InsertAvailability {
        space_id: SpaceId,
        available_from: NaiveDate,
        available_to: NaiveDate,
    },
    DeleteAvailability {
        id: Ulid,
    },
    InsertBooking {
        user_id: UserId,
        space_id: SpaceId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    ConfirmBooking {
        id: Ulid,
    },
    CancelBooking {
        id: Ulid,
    },
    SelectSpaces,
    SelectAvailabilities {
        id: Option<Ulid>,
        space_id: Option<SpaceId>,
    },
    SelectBookings {
        id: Option<Ulid>,
        space_id: Option<SpaceId>,
        status: Option<BookingStatus>,
    },
    SelectCalendar {
        space_id: SpaceId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        min_days: Option<i64>,
    },
    Listen {
        channel: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if trimmed.to_uppercase().starts_with("LISTEN ") {
        let channel = trimmed[7..].trim().trim_matches(';').to_string();
        return Ok(Command::Listen { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "spaces" => {
            if values.len() < 5 {
                return Err(SqlError::WrongArity("spaces", 5, values.len()));
            }
            Ok(Command::InsertSpace {
                id: parse_i64(&values[0])?,
                owner_id: parse_i64(&values[1])?,
                name: parse_string(&values[2])?,
                description: parse_string(&values[3])?,
                price_per_night: parse_i64(&values[4])?,
            })
        }
        "availabilities" => {
            if values.len() < 3 {
                return Err(SqlError::WrongArity("availabilities", 3, values.len()));
            }
            Ok(Command::InsertAvailability {
                space_id: parse_i64(&values[0])?,
                available_from: parse_date(&values[1])?,
                available_to: parse_date(&values[2])?,
            })
        }
        "bookings" => {
            if values.len() < 4 {
                return Err(SqlError::WrongArity("bookings", 4, values.len()));
            }
            Ok(Command::InsertBooking {
                user_id: parse_i64(&values[0])?,
                space_id: parse_i64(&values[1])?,
                start_date: parse_date(&values[2])?,
                end_date: parse_date(&values[3])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    match table.as_str() {
        "availabilities" => {
            let id = extract_where_id(&delete.selection)?;
            Ok(Command::DeleteAvailability { id })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }

    let assignment = match assignments {
        [one] => one,
        _ => return Err(SqlError::Parse("expected a single SET status = …".into())),
    };
    let column = match &assignment.target {
        ast::AssignmentTarget::ColumnName(name) => object_name_last(name),
        _ => None,
    };
    if column.as_deref() != Some("status") {
        return Err(SqlError::Parse("only the status column is updatable".into()));
    }

    let id = extract_where_id(selection)?;
    match parse_string(&assignment.value)?.as_str() {
        "confirmed" => Ok(Command::ConfirmBooking { id }),
        "cancelled" => Ok(Command::CancelBooking { id }),
        "pending" => Err(SqlError::Parse("bookings cannot be reset to pending".into())),
        other => Err(SqlError::Parse(format!("unknown status: {other}"))),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "spaces" => Ok(Command::SelectSpaces),
        "availabilities" => {
            let mut filters = Filters::default();
            if let Some(selection) = &select.selection {
                extract_filters(selection, &mut filters)?;
            }
            Ok(Command::SelectAvailabilities {
                id: filters.id,
                space_id: filters.space_id,
            })
        }
        "bookings" => {
            let mut filters = Filters::default();
            if let Some(selection) = &select.selection {
                extract_filters(selection, &mut filters)?;
            }
            Ok(Command::SelectBookings {
                id: filters.id,
                space_id: filters.space_id,
                status: filters.status,
            })
        }
        "calendar" => {
            let mut filters = Filters::default();
            if let Some(selection) = &select.selection {
                extract_filters(selection, &mut filters)?;
            }
            Ok(Command::SelectCalendar {
                space_id: filters.space_id.ok_or(SqlError::MissingFilter("space_id"))?,
                start_date: filters
                    .start_date
                    .ok_or(SqlError::MissingFilter("start_date"))?,
                end_date: filters.end_date.ok_or(SqlError::MissingFilter("end_date"))?,
                min_days: filters.min_days,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

#[derive(Default)]
struct Filters {
    id: Option<Ulid>,
    space_id: Option<SpaceId>,
    status: Option<BookingStatus>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    min_days: Option<i64>,
}

fn extract_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_filters(left, filters)?;
                extract_filters(right, filters)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("id") => filters.id = Some(parse_ulid_expr(right)?),
                Some("space_id") => filters.space_id = Some(parse_i64(right)?),
                Some("status") => {
                    let s = parse_string(right)?;
                    filters.status = Some(
                        BookingStatus::parse(&s)
                            .ok_or_else(|| SqlError::Parse(format!("unknown status: {s}")))?,
                    );
                }
                Some("min_days") => filters.min_days = Some(parse_i64(right)?),
                _ => {}
            },
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("start_date") {
                    filters.start_date = Some(parse_date(right)?);
                }
            }
            ast::BinaryOperator::LtEq => {
                if expr_column_name(left).as_deref() == Some("end_date") {
                    filters.end_date = Some(parse_date(right)?);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    parse_i64_expr(expr)
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

/// ISO-8601 calendar date, e.g. '2024-06-01'.
fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    s.parse::<NaiveDate>()
        .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ULID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn parse_insert_space() {
        let sql = "INSERT INTO spaces (id, owner_id, name, description, price_per_night) VALUES (1, 7, 'Cosy Loft', 'sleeps two', 5500)";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertSpace {
                id: 1,
                owner_id: 7,
                name: "Cosy Loft".into(),
                description: "sleeps two".into(),
                price_per_night: 5500,
            }
        );
    }

    #[test]
    fn parse_insert_space_wrong_arity() {
        let sql = "INSERT INTO spaces (id, owner_id) VALUES (1, 7)";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::WrongArity("spaces", 5, 2))
        ));
    }

    #[test]
    fn parse_insert_availability() {
        let sql = "INSERT INTO availabilities (space_id, available_from, available_to) VALUES (1, '2024-06-01', '2024-06-10')";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertAvailability {
                space_id: 1,
                available_from: date("2024-06-01"),
                available_to: date("2024-06-10"),
            }
        );
    }

    #[test]
    fn parse_insert_booking() {
        let sql = "INSERT INTO bookings (user_id, space_id, start_date, end_date) VALUES (9, 1, '2024-06-03', '2024-06-05')";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertBooking {
                user_id: 9,
                space_id: 1,
                start_date: date("2024-06-03"),
                end_date: date("2024-06-05"),
            }
        );
    }

    #[test]
    fn parse_bad_date_errors() {
        let sql = "INSERT INTO bookings (user_id, space_id, start_date, end_date) VALUES (9, 1, 'June 3rd', '2024-06-05')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_delete_availability() {
        let sql = format!("DELETE FROM availabilities WHERE id = '{ULID}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::DeleteAvailability { id } => assert_eq!(id.to_string(), ULID),
            _ => panic!("expected DeleteAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_delete_bookings_unsupported() {
        let sql = format!("DELETE FROM bookings WHERE id = '{ULID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_update_confirm() {
        let sql = format!("UPDATE bookings SET status = 'confirmed' WHERE id = '{ULID}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::ConfirmBooking { .. }));
    }

    #[test]
    fn parse_update_cancel() {
        let sql = format!("UPDATE bookings SET status = 'cancelled' WHERE id = '{ULID}'");
        let cmd = parse_sql(&sql).unwrap();
        assert!(matches!(cmd, Command::CancelBooking { .. }));
    }

    #[test]
    fn parse_update_to_pending_rejected() {
        let sql = format!("UPDATE bookings SET status = 'pending' WHERE id = '{ULID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_update_without_id_rejected() {
        let sql = "UPDATE bookings SET status = 'confirmed'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_update_other_column_rejected() {
        let sql = format!("UPDATE bookings SET start_date = '2024-06-01' WHERE id = '{ULID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_select_spaces() {
        assert_eq!(parse_sql("SELECT * FROM spaces").unwrap(), Command::SelectSpaces);
    }

    #[test]
    fn parse_select_availabilities_all() {
        let cmd = parse_sql("SELECT * FROM availabilities").unwrap();
        assert_eq!(
            cmd,
            Command::SelectAvailabilities {
                id: None,
                space_id: None
            }
        );
    }

    #[test]
    fn parse_select_availabilities_for_space() {
        let cmd = parse_sql("SELECT * FROM availabilities WHERE space_id = 1").unwrap();
        assert_eq!(
            cmd,
            Command::SelectAvailabilities {
                id: None,
                space_id: Some(1)
            }
        );
    }

    #[test]
    fn parse_select_bookings_with_status() {
        let cmd =
            parse_sql("SELECT * FROM bookings WHERE space_id = 1 AND status = 'confirmed'")
                .unwrap();
        assert_eq!(
            cmd,
            Command::SelectBookings {
                id: None,
                space_id: Some(1),
                status: Some(BookingStatus::Confirmed),
            }
        );
    }

    #[test]
    fn parse_select_booking_by_id() {
        let sql = format!("SELECT * FROM bookings WHERE id = '{ULID}'");
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::SelectBookings { id: Some(id), .. } => assert_eq!(id.to_string(), ULID),
            _ => panic!("expected SelectBookings with id, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_bookings_bad_status() {
        let sql = "SELECT * FROM bookings WHERE status = 'paid'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_select_calendar() {
        let sql = "SELECT * FROM calendar WHERE space_id = 1 AND start_date >= '2024-06-01' AND end_date <= '2024-12-31'";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::SelectCalendar {
                space_id: 1,
                start_date: date("2024-06-01"),
                end_date: date("2024-12-31"),
                min_days: None,
            }
        );
    }

    #[test]
    fn parse_select_calendar_with_min_days() {
        let sql = "SELECT * FROM calendar WHERE space_id = 1 AND start_date >= '2024-06-01' AND end_date <= '2024-12-31' AND min_days = 3";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::SelectCalendar { min_days, .. } => assert_eq!(min_days, Some(3)),
            _ => panic!("expected SelectCalendar, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_calendar_missing_filter() {
        let sql = "SELECT * FROM calendar WHERE space_id = 1";
        assert!(matches!(
            parse_sql(sql),
            Err(SqlError::MissingFilter("start_date"))
        ));
    }

    #[test]
    fn parse_listen() {
        let cmd = parse_sql("LISTEN space_1").unwrap();
        assert_eq!(
            cmd,
            Command::Listen {
                channel: "space_1".into()
            }
        );
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = "INSERT INTO foobar (id) VALUES (1)";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
