use super::{Backend, Execution, Params, Row, Statement};
use crate::capture::{ExplainOptions, ExplainValue};
use crate::error::{CaptureError, CaptureResult};
use crate::value::Value;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::error::Error;
use std::sync::Arc;
use tokio_postgres::types::{FromSql, Kind, ToSql, Type};
use tokio_postgres::{Client, NoTls};

const FORMATS: &[&str] = &["TEXT", "JSON", "XML", "YAML"];

const OPTIONS: &[&str] = &[
    "ANALYZE",
    "BUFFERS",
    "COSTS",
    "GENERIC_PLAN",
    "MEMORY",
    "SERIALIZE",
    "SETTINGS",
    "SUMMARY",
    "TIMING",
    "VERBOSE",
    "WAL",
];

/// A [`Backend`] over a `tokio_postgres::Client`.
///
/// Statements are prepared first; the prepared column list decides whether
/// rows are fetched or only the affected-row count is read.
pub struct PgBackend {
    client: Client,
}

impl PgBackend {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect without TLS and drive the connection on a background task.
    pub async fn connect(url: &str) -> CaptureResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(target: "capture_queries", error = %err, "postgres connection error");
            }
        });
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn execute_one(&self, sql: &str, params: &[Value]) -> CaptureResult<Execution> {
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let prepared = self.client.prepare(sql).await?;

        if prepared.columns().is_empty() {
            let rows_affected = self.client.execute(&prepared, &refs).await?;
            return Ok(Execution::affected(rows_affected));
        }

        let columns: Arc<[String]> = prepared
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = self.client.query(&prepared, &refs).await?;
        let rows = rows
            .iter()
            .map(|row| decode_row(row).map(|values| Row::new(columns.clone(), values)))
            .collect::<CaptureResult<Vec<_>>>()?;
        Ok(Execution::with_rows(rows))
    }
}

#[async_trait]
impl Backend for PgBackend {
    fn vendor(&self) -> &str {
        "postgresql"
    }

    async fn execute(&self, statement: &Statement) -> CaptureResult<Execution> {
        match &statement.params {
            Params::Single(params) => self.execute_one(&statement.sql, params).await,
            Params::Many(param_sets) => {
                let mut total = Execution::default();
                for params in param_sets {
                    let execution = self.execute_one(&statement.sql, params).await?;
                    total.rows.extend(execution.rows);
                    total.rows_affected += execution.rows_affected;
                }
                Ok(total)
            }
        }
    }

    fn explain_prefix(&self, options: &ExplainOptions) -> CaptureResult<String> {
        explain_prefix(options)
    }
}

impl std::fmt::Debug for PgBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgBackend")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

/// Render a Postgres EXPLAIN prefix such as `EXPLAIN (ANALYZE true, FORMAT JSON)`.
pub(crate) fn explain_prefix(options: &ExplainOptions) -> CaptureResult<String> {
    options.validate()?;

    let mut parts = Vec::new();

    let unknown: Vec<&str> = options
        .options()
        .keys()
        .filter(|name| !OPTIONS.contains(&name.to_uppercase().as_str()))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(CaptureError::config(format!(
            "Unknown options: {}",
            unknown.join(", ")
        )));
    }

    for (name, value) in options.options() {
        let value = match value {
            ExplainValue::Bool(v) => v.to_string(),
            ExplainValue::Text(v) => {
                if v.is_empty() || !v.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return Err(CaptureError::config(format!(
                        "Invalid value for option {name}: {v:?}"
                    )));
                }
                v.to_uppercase()
            }
        };
        parts.push(format!("{} {value}", name.to_uppercase()));
    }

    if let Some(format) = options.format_name() {
        let format = format.to_uppercase();
        if !FORMATS.contains(&format.as_str()) {
            return Err(CaptureError::config(format!(
                "postgresql does not support {format} format; supported formats: {}",
                FORMATS.join(", ")
            )));
        }
        parts.push(format!("FORMAT {format}"));
    }

    if parts.is_empty() {
        Ok("EXPLAIN".to_string())
    } else {
        Ok(format!("EXPLAIN ({})", parts.join(", ")))
    }
}

/// XML arrives as text on the wire but `String` refuses the type.
struct XmlText(String);

impl<'a> FromSql<'a> for XmlText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(XmlText(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::XML
    }
}

fn decode_row(row: &tokio_postgres::Row) -> CaptureResult<Vec<Value>> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| decode_cell(row, idx, column.name(), column.type_()))
        .collect()
}

fn decode_cell(
    row: &tokio_postgres::Row,
    idx: usize,
    name: &str,
    ty: &Type,
) -> CaptureResult<Value> {
    if let Kind::Array(member) = ty.kind() {
        return decode_array(row, idx, name, ty, member);
    }

    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx, name)?.into(),
        Type::INT2 => get::<i16>(row, idx, name)?.into(),
        Type::INT4 => get::<i32>(row, idx, name)?.into(),
        Type::INT8 => get::<i64>(row, idx, name)?.into(),
        Type::OID => get::<u32>(row, idx, name)?.map(i64::from).into(),
        Type::FLOAT4 => get::<f32>(row, idx, name)?.into(),
        Type::FLOAT8 => get::<f64>(row, idx, name)?.into(),
        Type::NUMERIC => get::<Decimal>(row, idx, name)?.into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx, name)?.into()
        }
        Type::XML => get::<XmlText>(row, idx, name)?.map(|x| x.0).into(),
        Type::BYTEA => get::<Vec<u8>>(row, idx, name)?.into(),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx, name)?.into(),
        Type::UUID => get::<uuid::Uuid>(row, idx, name)?.into(),
        Type::DATE => get::<chrono::NaiveDate>(row, idx, name)?.into(),
        Type::TIMESTAMP => get::<chrono::NaiveDateTime>(row, idx, name)?.into(),
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, idx, name)?.into(),
        _ => return Err(unsupported(name, ty)),
    };
    Ok(value)
}

/// One-dimensional arrays of the scalar types above.
fn decode_array(
    row: &tokio_postgres::Row,
    idx: usize,
    name: &str,
    ty: &Type,
    member: &Type,
) -> CaptureResult<Value> {
    let items: Option<Vec<Value>> = match *member {
        Type::BOOL => array::<bool>(row, idx, name)?,
        Type::INT2 => array::<i16>(row, idx, name)?,
        Type::INT4 => array::<i32>(row, idx, name)?,
        Type::INT8 => array::<i64>(row, idx, name)?,
        Type::FLOAT4 => array::<f32>(row, idx, name)?,
        Type::FLOAT8 => array::<f64>(row, idx, name)?,
        Type::NUMERIC => array::<Decimal>(row, idx, name)?,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => array::<String>(row, idx, name)?,
        Type::BYTEA => array::<Vec<u8>>(row, idx, name)?,
        Type::JSON | Type::JSONB => array::<serde_json::Value>(row, idx, name)?,
        Type::UUID => array::<uuid::Uuid>(row, idx, name)?,
        Type::DATE => array::<chrono::NaiveDate>(row, idx, name)?,
        Type::TIMESTAMP => array::<chrono::NaiveDateTime>(row, idx, name)?,
        Type::TIMESTAMPTZ => array::<chrono::DateTime<chrono::Utc>>(row, idx, name)?,
        _ => return Err(unsupported(name, ty)),
    };
    Ok(items.map_or(Value::Null, Value::Array))
}

fn get<'a, T: FromSql<'a>>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    name: &str,
) -> CaptureResult<Option<T>> {
    row.try_get(idx)
        .map_err(|e| CaptureError::decode(name, e.to_string()))
}

fn array<'a, T>(
    row: &'a tokio_postgres::Row,
    idx: usize,
    name: &str,
) -> CaptureResult<Option<Vec<Value>>>
where
    T: FromSql<'a> + Into<Value>,
{
    let items = get::<Vec<Option<T>>>(row, idx, name)?;
    Ok(items.map(|items| items.into_iter().map(Value::from).collect()))
}

/// Columns of any other type fail to decode instead of reading as NULL.
fn unsupported(name: &str, ty: &Type) -> CaptureError {
    CaptureError::decode(name, format!("unsupported column type {ty}"))
}
