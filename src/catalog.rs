//! Catalog introspection: discovers the user-defined indexes of the active
//! cluster, schema, and database.

use sqlx::{Connection, PgConnection};
use tracing::{debug, info, instrument, warn};

use crate::error::{CatalogError, DescriptorError};

/// One row per index. Key names and key types are aggregated in
/// `index_position` order so that both arrays line up. Expression keys carry
/// their expression text in `keys` and an empty type.
pub const INDEX_QUERY: &str = r#"
SELECT o.name AS subject,
       array_agg(
         CASE
           WHEN ic.on_position IS NOT NULL THEN col.name
           ELSE ic.on_expression
         END
       ORDER BY ic.index_position) AS keys,
       array_agg(COALESCE(col.type, '') ORDER BY ic.index_position) AS key_types,
       COALESCE(com.comment, o.name) AS description
FROM mz_indexes i
JOIN mz_clusters c ON i.cluster_id = c.id
JOIN mz_objects o ON i.on_id = o.id
JOIN mz_schemas s ON o.schema_id = s.id
JOIN mz_databases d ON s.database_id = d.id
JOIN mz_index_columns ic ON i.id = ic.index_id
LEFT JOIN mz_columns col ON o.id = col.id AND ic.on_position = col.position
LEFT JOIN mz_internal.mz_comments com ON com.id = o.id AND com.object_sub_id IS NULL
WHERE i.id LIKE 'u%'
  AND c.name = current_setting('cluster')
  AND s.name = current_schema()
  AND d.name = current_database()
GROUP BY i.id, o.name, com.comment
ORDER BY o.name, i.id
"#;

/// One key position of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey {
    /// Column name, or `expr_<position>` for expression keys.
    pub name: String,
    /// Catalog type of the key column; `None` when not known.
    pub type_name: Option<String>,
    /// Expression text for keys that are not plain column references.
    pub expression: Option<String>,
}

impl IndexKey {
    /// A column whose type is unknown, compared as text.
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            expression: None,
        }
    }

    pub fn typed(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: Some(type_name.into()),
            expression: None,
        }
    }

    /// An expression key at 1-based `position`. Its parameter is named
    /// `expr_<position>` since expression text is not a usable identifier.
    pub fn expression(position: usize, expression: impl Into<String>) -> Self {
        Self {
            name: format!("expr_{position}"),
            type_name: None,
            expression: Some(expression.into()),
        }
    }
}

/// An index as read from the catalog: the object it is built on and its
/// key columns in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    subject: String,
    keys: Vec<IndexKey>,
    description: String,
}

impl IndexDescriptor {
    /// Keys must be non-empty and unique by name. The description defaults
    /// to the subject.
    pub fn new(subject: impl Into<String>, keys: Vec<IndexKey>) -> Result<Self, DescriptorError> {
        let subject = subject.into();
        if keys.is_empty() {
            return Err(DescriptorError::EmptyKeys { subject });
        }
        for (i, key) in keys.iter().enumerate() {
            if keys[..i].iter().any(|k| k.name == key.name) {
                return Err(DescriptorError::DuplicateKey {
                    subject,
                    key: key.name.clone(),
                });
            }
        }
        Ok(Self {
            description: subject.clone(),
            subject,
            keys,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn keys(&self) -> &[IndexKey] {
        &self.keys
    }

    pub fn key_names(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.name.as_str()).collect()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn into_parts(self) -> (String, Vec<IndexKey>, String) {
        (self.subject, self.keys, self.description)
    }
}

/// Raw shape of an [`INDEX_QUERY`] row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IndexRow {
    pub subject: String,
    pub keys: Vec<String>,
    pub key_types: Vec<String>,
    pub description: String,
}

impl TryFrom<IndexRow> for IndexDescriptor {
    type Error = DescriptorError;

    fn try_from(row: IndexRow) -> Result<Self, Self::Error> {
        // Plain columns always carry a type; an empty type marks an expression.
        let mut types = row.key_types.into_iter();
        let keys = row
            .keys
            .into_iter()
            .enumerate()
            .map(|(i, name)| match types.next().filter(|t| !t.is_empty()) {
                Some(type_name) => IndexKey::typed(name, type_name),
                None => IndexKey::expression(i + 1, name),
            })
            .collect();
        Ok(IndexDescriptor::new(row.subject, keys)?.with_description(row.description))
    }
}

/// Convert catalog rows, skipping (and logging) rows that are not usable.
pub fn descriptors_from_rows(rows: Vec<IndexRow>) -> Vec<IndexDescriptor> {
    rows.into_iter()
        .filter_map(|row| match IndexDescriptor::try_from(row) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(error = %e, "Skipping index");
                None
            }
        })
        .collect()
}

/// Read every user index visible to the connection's session.
///
/// Opens one connection, issues [`INDEX_QUERY`] once, and closes the
/// connection before returning. Failures are not retried.
#[instrument(skip_all)]
pub async fn fetch_indexes(dsn: &str) -> Result<Vec<IndexDescriptor>, CatalogError> {
    let mut conn = PgConnection::connect(dsn)
        .await
        .map_err(CatalogError::Connect)?;

    let rows = sqlx::query_as::<_, IndexRow>(INDEX_QUERY)
        .fetch_all(&mut conn)
        .await;

    if let Err(e) = conn.close().await {
        debug!(error = %e, "Catalog connection did not close cleanly");
    }

    let rows = rows.map_err(CatalogError::Query)?;
    let descriptors = descriptors_from_rows(rows);
    info!(count = descriptors.len(), "Fetched index catalog");
    Ok(descriptors)
}
