use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Postgres, QueryBuilder};
use tracing::debug;

use crate::application::repos::{EntityRow, RelatedRow, RelationalStore, RepoError};
use crate::domain::entities::{EntityId, EntityType};

use super::PostgresStore;
use super::util::{map_sqlx_error, quote_ident};

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn find_by_id(
        &self,
        entity_type: EntityType,
        id: &EntityId,
    ) -> Result<Option<EntityRow>, RepoError> {
        let table = entity_type.as_str();
        let mut qb = QueryBuilder::<Postgres>::new("SELECT to_jsonb(t) FROM ");
        qb.push(quote_ident(table));
        qb.push(" t WHERE ");
        push_column_match(&mut qb, "id", self.column_type(table, "id").as_deref(), id);
        qb.push(" LIMIT 1");

        let row: Option<Value> = qb
            .build_query_scalar()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        match row {
            Some(Value::Object(columns)) => {
                Ok(Some(row_from_columns(id, columns, self.soft_delete_column())))
            }
            Some(other) => Err(RepoError::from_persistence(format!(
                "{entity_type} row is not an object: {other}"
            ))),
            None => {
                debug!(entity_type = %entity_type, id = %id, "Row not found");
                Ok(None)
            }
        }
    }

    async fn find_many_by_relation(
        &self,
        entity_type: EntityType,
        field: &str,
        value: &EntityId,
    ) -> Result<Vec<RelatedRow>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT t.\"id\"::text, COALESCE((to_jsonb(t) ->> ");
        qb.push_bind(self.soft_delete_column().to_owned());
        qb.push(")::boolean, false) FROM ");
        let table = entity_type.as_str();
        qb.push(quote_ident(table));
        qb.push(" t WHERE ");
        push_column_match(&mut qb, field, self.column_type(table, field).as_deref(), value);
        qb.push(" ORDER BY t.\"id\"");

        let rows: Vec<(String, bool)> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|(id, is_deleted)| RelatedRow {
                id: EntityId::new(id),
                is_deleted,
            })
            .collect())
    }
}

/// `t.column = $n`, with the bound text cast to the column's type so an index
/// on the column applies. Columns of unknown type fall back to comparing as
/// text.
fn push_column_match(
    qb: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    column_type: Option<&str>,
    value: &EntityId,
) {
    qb.push("t.");
    qb.push(quote_ident(column));
    match column_type {
        Some(column_type) => {
            qb.push(" = CAST(");
            qb.push_bind(value.as_str().to_owned());
            qb.push(" AS ");
            qb.push(quote_ident(column_type));
            qb.push(")");
        }
        None => {
            qb.push("::text = ");
            qb.push_bind(value.as_str().to_owned());
        }
    }
}

/// Flatten a `to_jsonb` row into text columns. Nulls are dropped so absent
/// foreign keys read as `None`.
pub(super) fn row_from_columns(
    requested: &EntityId,
    columns: Map<String, Value>,
    soft_delete_column: &str,
) -> EntityRow {
    let is_deleted = columns
        .get(soft_delete_column)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let id = columns
        .get("id")
        .and_then(scalar_text)
        .map(EntityId::new)
        .unwrap_or_else(|| requested.clone());

    let mut row = EntityRow::new(id, is_deleted);
    for (name, value) in columns {
        if let Some(text) = scalar_text(&value) {
            row.fields.insert(name, text);
        }
    }
    row
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn columns(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn reads_soft_delete_flag_and_foreign_keys() {
        let row = row_from_columns(
            &EntityId::new("a1"),
            columns(json!({
                "id": "a1",
                "cityId": "c1",
                "isDeleted": true,
                "terminalCount": 3,
                "imageId": null
            })),
            "isDeleted",
        );

        assert!(row.is_deleted);
        assert_eq!(row.foreign_key("cityId"), Some(EntityId::new("c1")));
        assert_eq!(row.foreign_key("imageId"), None);
        assert_eq!(row.fields.get("terminalCount").map(String::as_str), Some("3"));
    }

    #[test]
    fn typed_columns_compare_against_a_cast_parameter() {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT 1 FROM \"Airport\" t WHERE ");
        push_column_match(&mut qb, "cityId", Some("uuid"), &EntityId::new("c1"));
        assert_eq!(
            qb.sql(),
            "SELECT 1 FROM \"Airport\" t WHERE t.\"cityId\" = CAST($1 AS \"uuid\")"
        );

        let mut fallback = QueryBuilder::<Postgres>::new("");
        push_column_match(&mut fallback, "cityId", None, &EntityId::new("c1"));
        assert_eq!(fallback.sql(), "t.\"cityId\"::text = $1");
    }

    #[test]
    fn missing_flag_column_means_live() {
        let row = row_from_columns(
            &EntityId::new("7"),
            columns(json!({"id": 7, "deletedFlag": true})),
            "isDeleted",
        );
        assert!(!row.is_deleted);
        assert_eq!(row.id, EntityId::new("7"));
    }
}
