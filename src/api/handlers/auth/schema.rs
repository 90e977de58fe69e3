//! Schema snapshot and the editable-field allow-list derived from it.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use super::{
    error::AuthError,
    storage::{IdentityStore, SESSION_TABLE, USER_TABLE},
};

/// Columns that never become user-editable, whatever the live schema says.
pub const PROTECTED_COLUMNS: [&str; 5] = ["id", "password", "salt", "created_at", "updated_at"];

/// Bumped whenever the derivation rules for [`EditableFields`] change.
pub const EDITABLE_FIELDS_VERSION: u32 = 1;

/// Table name to column names, captured once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    tables: HashMap<String, HashSet<String>>,
}

impl SchemaSnapshot {
    /// Read every base table of `schema` and its columns.
    ///
    /// # Errors
    /// Returns [`AuthError::SchemaDiscovery`] if the table listing or any column
    /// listing fails. Nothing partial is returned.
    pub async fn build(store: &dyn IdentityStore, schema: &str) -> Result<Self, AuthError> {
        let table_names = store
            .list_tables(schema)
            .await
            .map_err(AuthError::SchemaDiscovery)?;

        let mut tables = HashMap::with_capacity(table_names.len());
        for table in table_names {
            let columns = store
                .list_columns(schema, &table)
                .await
                .map_err(AuthError::SchemaDiscovery)?;
            debug!(table = %table, columns = columns.len(), "Discovered table");
            tables.insert(table, columns.into_iter().collect());
        }

        info!(schema, tables = tables.len(), "Schema snapshot built");
        Ok(Self { tables })
    }

    #[must_use]
    pub fn from_tables<T, C, S>(tables: T) -> Self
    where
        T: IntoIterator<Item = (S, C)>,
        C: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|(table, columns)| {
                    (table.into(), columns.into_iter().map(Into::into).collect())
                })
                .collect(),
        }
    }

    /// Pure membership test; says nothing about type or nullability.
    #[must_use]
    pub fn is_whitelisted(&self, table: &str, field: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|columns| columns.contains(field))
    }

    #[must_use]
    pub fn columns(&self, table: &str) -> Option<&HashSet<String>> {
        self.tables.get(table)
    }

    #[must_use]
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }
}

/// Versioned allow-list of fields a partial update may touch, per entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditableFields {
    version: u32,
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl EditableFields {
    /// Derive the allow-list from a startup snapshot.
    ///
    /// # Errors
    /// Returns [`AuthError::SchemaDiscovery`] when the user or session table
    /// is missing.
    pub fn from_snapshot(snapshot: &SchemaSnapshot) -> Result<Self, AuthError> {
        for required in [USER_TABLE, SESSION_TABLE] {
            if !snapshot.has_table(required) {
                return Err(AuthError::SchemaDiscovery(anyhow::anyhow!(
                    "required table {required} not found"
                )));
            }
        }

        let editable = snapshot
            .columns(USER_TABLE)
            .into_iter()
            .flatten()
            .filter(|column| !PROTECTED_COLUMNS.contains(&column.as_str()))
            .cloned()
            .collect();

        let mut tables = BTreeMap::new();
        tables.insert(USER_TABLE.to_string(), editable);
        Ok(Self {
            version: EDITABLE_FIELDS_VERSION,
            tables,
        })
    }

    /// Static declaration. Protected columns are dropped here too.
    #[must_use]
    pub fn from_declaration<'a>(table: &str, fields: impl IntoIterator<Item = &'a str>) -> Self {
        let editable = fields
            .into_iter()
            .filter(|field| !PROTECTED_COLUMNS.contains(field))
            .map(ToString::to_string)
            .collect();
        let mut tables = BTreeMap::new();
        tables.insert(table.to_string(), editable);
        Self {
            version: EDITABLE_FIELDS_VERSION,
            tables,
        }
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub fn allows(&self, table: &str, field: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|fields| fields.contains(field))
    }

    pub fn fields(&self, table: &str) -> impl Iterator<Item = &str> {
        self.tables
            .get(table)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}
