use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use sqlx::query_as;

use crate::application::repos::{
    FieldDescriptor, ModelDescriptor, RepoError, SchemaIntrospector,
};

use super::PostgresStore;
use super::util::map_sqlx_error;

/// Every column of the current schema with its type and the table its
/// foreign key points at, if any. A column in several constraints yields
/// several rows.
const COLUMNS_WITH_REFERENCES: &str = r#"
SELECT c.table_name::text,
       c.column_name::text,
       c.udt_name::text,
       ccu.table_name::text
FROM information_schema.columns c
LEFT JOIN information_schema.key_column_usage kcu
       ON kcu.table_schema = c.table_schema
      AND kcu.table_name = c.table_name
      AND kcu.column_name = c.column_name
LEFT JOIN information_schema.table_constraints tc
       ON tc.constraint_schema = kcu.constraint_schema
      AND tc.constraint_name = kcu.constraint_name
      AND tc.constraint_type = 'FOREIGN KEY'
LEFT JOIN information_schema.constraint_column_usage ccu
       ON ccu.constraint_schema = tc.constraint_schema
      AND ccu.constraint_name = tc.constraint_name
WHERE c.table_schema = current_schema()
ORDER BY c.table_name, c.ordinal_position
"#;

#[async_trait]
impl SchemaIntrospector for PostgresStore {
    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, RepoError> {
        let rows: Vec<(String, String, String, Option<String>)> =
            query_as(COLUMNS_WITH_REFERENCES)
                .fetch_all(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        let mut types = HashMap::with_capacity(rows.len());
        let columns = rows
            .into_iter()
            .map(|(table, column, udt_name, references)| {
                types.insert((table.clone(), column.clone()), udt_name);
                (table, column, references)
            })
            .collect();
        self.record_column_types(types);
        Ok(group_columns(columns))
    }
}

pub(super) fn group_columns(rows: Vec<(String, String, Option<String>)>) -> Vec<ModelDescriptor> {
    let mut models: BTreeMap<String, Vec<FieldDescriptor>> = BTreeMap::new();
    for (table, column, references) in rows {
        let fields = models.entry(table).or_default();
        match fields.iter_mut().find(|field| field.name == column) {
            Some(existing) => {
                if existing.references.is_none() {
                    existing.references = references;
                }
            }
            None => fields.push(FieldDescriptor {
                name: column,
                references,
            }),
        }
    }

    models
        .into_iter()
        .map(|(name, fields)| ModelDescriptor { name, fields })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(table: &str, column: &str, references: Option<&str>) -> (String, String, Option<String>) {
        (
            table.to_string(),
            column.to_string(),
            references.map(str::to_string),
        )
    }

    #[test]
    fn groups_columns_and_merges_duplicate_constraint_rows() {
        let models = group_columns(vec![
            row("Airport", "id", None),
            row("Airport", "cityId", None),
            row("Airport", "cityId", Some("City")),
            row("City", "id", None),
        ]);

        assert_eq!(models.len(), 2);
        let airport = &models[0];
        assert_eq!(airport.name, "Airport");
        assert_eq!(airport.fields.len(), 2);
        assert_eq!(
            airport
                .field("cityId")
                .and_then(|field| field.references.as_deref()),
            Some("City")
        );
        assert!(models[1].field("id").is_some());
    }
}
