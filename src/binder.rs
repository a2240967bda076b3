//! Turns index descriptors into lookup operations.
//!
//! A [`LookupOperation`] is a generic handler paired with an explicit
//! parameter schema whose names are the index's key columns, in key order.
//! Both the tool name and the resource URI template are derived from it.

use serde_json::Value;
use sqlx::{Connection, PgConnection};
use tracing::{debug, instrument};

use crate::catalog::{IndexDescriptor, IndexKey};
use crate::error::LookupError;
use crate::rows::rows_to_json;
use crate::schema::{ArgumentSchema, JsonType, LookupParam, SchemaValidationError};

/// Scheme of every resource URI template.
pub const URI_SCHEME: &str = "materialize://";

/// Catalog types compared against text parameters without a cast.
const TEXT_TYPES: &[&str] = &[
    "text",
    "character varying",
    "varchar",
    "character",
    "char",
    "bpchar",
    "name",
];

/// A fully built lookup query: SQL text plus the values bound to `$1..$n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupStatement {
    pub sql: String,
    pub params: Vec<String>,
}

/// One bound lookup over an index. Owns copies of the subject and keys.
#[derive(Debug, Clone)]
pub struct LookupOperation {
    subject: String,
    keys: Vec<IndexKey>,
    params: Vec<LookupParam>,
    description: String,
    arguments: ArgumentSchema,
    dsn: String,
}

/// Bind a descriptor to a database. The descriptor is consumed.
pub fn bind(
    descriptor: IndexDescriptor,
    dsn: impl Into<String>,
) -> Result<LookupOperation, SchemaValidationError> {
    let (subject, keys, description) = descriptor.into_parts();
    let params: Vec<LookupParam> = keys
        .iter()
        .map(|k| LookupParam {
            name: k.name.clone(),
            json_type: JsonType::from_catalog(k.type_name.as_deref()),
        })
        .collect();
    let arguments = ArgumentSchema::compile(&params)?;

    Ok(LookupOperation {
        subject,
        keys,
        params,
        description,
        arguments,
        dsn: dsn.into(),
    })
}

/// Quote a Postgres identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl LookupOperation {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &[LookupParam] {
        &self.params
    }

    pub fn param_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn input_schema(&self) -> &Value {
        self.arguments.schema()
    }

    /// `Lookup <subject>`
    pub fn tool_name(&self) -> String {
        format!("Lookup {}", self.subject)
    }

    /// `materialize://<subject>/{k1}/.../{kn}`
    pub fn uri_template(&self) -> String {
        let mut template = format!("{URI_SCHEME}{}", self.subject);
        for key in &self.keys {
            template.push_str("/{");
            template.push_str(&key.name);
            template.push('}');
        }
        template
    }

    /// Build the parameterized query for values given in key order.
    ///
    /// Only catalog-sourced identifiers reach the SQL text, quoted; expression
    /// keys are emitted as their expression text. Values are bound.
    pub fn statement(&self, values: Vec<String>) -> Result<LookupStatement, LookupError> {
        if values.len() != self.keys.len() {
            return Err(LookupError::InvalidArguments(format!(
                "expected {} values, got {}",
                self.keys.len(),
                values.len()
            )));
        }

        let predicate = self
            .keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let placeholder = format!("${}", i + 1);
                let lhs = match &key.expression {
                    Some(expression) => expression.clone(),
                    None => quote_ident(&key.name),
                };
                match key.type_name.as_deref() {
                    Some(ty) if !TEXT_TYPES.contains(&ty.to_ascii_lowercase().as_str()) => {
                        format!("{lhs} = CAST({placeholder} AS {ty})")
                    }
                    _ => format!("{lhs} = {placeholder}"),
                }
            })
            .collect::<Vec<_>>()
            .join(" AND ");

        Ok(LookupStatement {
            sql: format!(
                "SELECT * FROM {} WHERE {predicate}",
                quote_ident(&self.subject)
            ),
            params: values,
        })
    }

    /// Validate tool arguments and pull out one text value per key.
    pub fn values_from_arguments(&self, arguments: &Value) -> Result<Vec<String>, LookupError> {
        self.arguments
            .validate(arguments)
            .map_err(|e| LookupError::InvalidArguments(e.to_string()))?;

        self.keys
            .iter()
            .map(|key| match arguments.get(&key.name) {
                Some(Value::String(s)) => Ok(s.clone()),
                Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
                _ => Err(LookupError::InvalidArguments(format!(
                    "missing value for `{}`",
                    key.name
                ))),
            })
            .collect()
    }

    /// Match a concrete URI against [`Self::uri_template`] and return the
    /// percent-decoded segment values in key order.
    pub fn values_from_uri(&self, uri: &str) -> Result<Vec<String>, LookupError> {
        let mismatch = || LookupError::UriMismatch {
            uri: uri.to_string(),
            template: self.uri_template(),
        };

        let rest = uri
            .strip_prefix(URI_SCHEME)
            .and_then(|r| r.strip_prefix(self.subject.as_str()))
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(mismatch)?;

        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() != self.keys.len() || segments.iter().any(|s| s.is_empty()) {
            return Err(mismatch());
        }

        segments
            .into_iter()
            .map(|s| {
                urlencoding::decode(s)
                    .map(|v| v.into_owned())
                    .map_err(|_| mismatch())
            })
            .collect()
    }

    /// `tools/call` entry point.
    pub async fn call(&self, arguments: &Value) -> Result<String, LookupError> {
        let values = self.values_from_arguments(arguments)?;
        self.execute(self.statement(values)?).await
    }

    /// `resources/read` entry point.
    pub async fn read(&self, uri: &str) -> Result<String, LookupError> {
        let values = self.values_from_uri(uri)?;
        self.execute(self.statement(values)?).await
    }

    /// Run a statement on a fresh connection, closed on every exit path.
    #[instrument(skip_all, fields(subject = %self.subject))]
    async fn execute(&self, statement: LookupStatement) -> Result<String, LookupError> {
        debug!(sql = %statement.sql, params = statement.params.len(), "Running lookup");

        let mut conn = PgConnection::connect(&self.dsn)
            .await
            .map_err(LookupError::Connect)?;

        let mut query = sqlx::query(&statement.sql);
        for value in statement.params {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&mut conn).await;

        if let Err(e) = conn.close().await {
            debug!(error = %e, "Lookup connection did not close cleanly");
        }

        let rows = rows.map_err(LookupError::Query)?;
        debug!(rows = rows.len(), "Lookup finished");
        Ok(rows_to_json(&rows)?)
    }
}
