//! Dataset registry: the single source of truth for what a snapshot contains.
//!
//! Every table that participates in the restaurant's referential graph is
//! registered here with its column schema and parent foreign-key edges. The
//! registry order is a valid topological order of the dependency DAG; the
//! bulk loader walks it forwards (parent before child) and the destructive
//! reset walks it backwards (child before parent). Both orderings derive from
//! this one list so they can never drift apart.

/// Scalar column types the snapshot engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-generated integer identifier
    Id,
    /// Plain integer (counts, quantities, flags stored as 0/1)
    Integer,
    /// Boolean stored as 0/1
    Bool,
    /// Decimal amount (REAL affinity)
    Decimal,
    /// Free text
    Text,
    /// RFC 3339 timestamp stored as text
    Timestamp,
    /// Enumerated code stored as text
    Code,
}

/// One column in a dataset's record schema.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
        }
    }

    pub const fn null(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
        }
    }
}

/// A parent edge: this dataset's `column` holds identifiers of `references`.
#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
    pub nullable: bool,
}

impl ForeignKey {
    pub const fn new(column: &'static str, references: &'static str) -> Self {
        Self {
            column,
            references,
            nullable: false,
        }
    }

    pub const fn null(column: &'static str, references: &'static str) -> Self {
        Self {
            column,
            references,
            nullable: true,
        }
    }
}

/// One registered dataset.
#[derive(Debug)]
pub struct DatasetDef {
    /// Dataset name; equals the table name.
    pub name: &'static str,
    /// Auto-increment identifier column, if the table has one.
    pub id_column: Option<&'static str>,
    /// Columns exported for and loaded from the archive.
    pub columns: &'static [Column],
    /// Deterministic export ordering.
    pub order_by: &'static str,
    /// Parent datasets this one references.
    pub parents: &'static [ForeignKey],
}

use ColumnType::{Bool, Code, Decimal, Id, Integer, Text, Timestamp};

/// All managed datasets in load (parent-before-child) order.
pub const DATASETS: &[DatasetDef] = &[
    DatasetDef {
        name: "settings",
        id_column: None,
        columns: &[
            Column::new("name", Text),
            Column::new("value", Text),
            Column::new("updated_at", Timestamp),
        ],
        order_by: "name",
        parents: &[],
    },
    DatasetDef {
        name: "roles",
        id_column: Some("id"),
        columns: &[Column::new("id", Id), Column::new("name", Text)],
        order_by: "id",
        parents: &[],
    },
    DatasetDef {
        name: "permissions",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("code", Code),
            Column::null("description", Text),
        ],
        order_by: "id",
        parents: &[],
    },
    DatasetDef {
        name: "role_permissions",
        id_column: None,
        columns: &[
            Column::new("role_id", Integer),
            Column::new("permission_id", Integer),
        ],
        order_by: "role_id, permission_id",
        parents: &[
            ForeignKey::new("role_id", "roles"),
            ForeignKey::new("permission_id", "permissions"),
        ],
    },
    DatasetDef {
        name: "users",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("username", Text),
            Column::new("display_name", Text),
            Column::new("role_id", Integer),
            Column::new("active", Bool),
            Column::new("created_at", Timestamp),
        ],
        order_by: "id",
        parents: &[ForeignKey::new("role_id", "roles")],
    },
    DatasetDef {
        name: "memberships",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("member_name", Text),
            Column::new("card_code", Code),
            Column::new("points", Integer),
            Column::new("joined_at", Timestamp),
        ],
        order_by: "id",
        parents: &[],
    },
    DatasetDef {
        name: "dining_tables",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("label", Text),
            Column::new("seats", Integer),
            Column::null("zone", Text),
        ],
        order_by: "id",
        parents: &[],
    },
    DatasetDef {
        name: "menu_items",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("name", Text),
            Column::new("category", Code),
            Column::new("price", Decimal),
            Column::new("vat_rate", Decimal),
            Column::new("active", Bool),
            Column::new("created_at", Timestamp),
        ],
        order_by: "id",
        parents: &[],
    },
    DatasetDef {
        name: "orders",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("table_id", Integer),
            Column::new("user_id", Integer),
            Column::null("membership_id", Integer),
            Column::new("status", Code),
            Column::new("opened_at", Timestamp),
            Column::null("closed_at", Timestamp),
        ],
        order_by: "id",
        parents: &[
            ForeignKey::new("table_id", "dining_tables"),
            ForeignKey::new("user_id", "users"),
            ForeignKey::null("membership_id", "memberships"),
        ],
    },
    DatasetDef {
        name: "order_lines",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("order_id", Integer),
            Column::new("menu_item_id", Integer),
            Column::new("quantity", Integer),
            Column::new("unit_price", Decimal),
            Column::null("note", Text),
        ],
        order_by: "id",
        parents: &[
            ForeignKey::new("order_id", "orders"),
            ForeignKey::new("menu_item_id", "menu_items"),
        ],
    },
    DatasetDef {
        name: "invoices",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("order_id", Integer),
            Column::new("number", Code),
            Column::new("issued_at", Timestamp),
            Column::new("total", Decimal),
            Column::new("vat_total", Decimal),
        ],
        order_by: "id",
        parents: &[ForeignKey::new("order_id", "orders")],
    },
    DatasetDef {
        name: "invoice_lines",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("invoice_id", Integer),
            Column::new("description", Text),
            Column::new("quantity", Integer),
            Column::new("unit_price", Decimal),
            Column::new("vat_rate", Decimal),
        ],
        order_by: "id",
        parents: &[ForeignKey::new("invoice_id", "invoices")],
    },
    DatasetDef {
        name: "payments",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("order_id", Integer),
            Column::null("invoice_id", Integer),
            Column::new("method", Code),
            Column::new("amount", Decimal),
            Column::new("paid_at", Timestamp),
        ],
        order_by: "id",
        parents: &[
            ForeignKey::new("order_id", "orders"),
            ForeignKey::null("invoice_id", "invoices"),
        ],
    },
    DatasetDef {
        name: "notifications",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("title", Text),
            Column::null("body", Text),
            Column::new("severity", Code),
            Column::new("created_at", Timestamp),
        ],
        order_by: "id",
        parents: &[],
    },
    DatasetDef {
        name: "notification_statuses",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::new("notification_id", Integer),
            Column::new("user_id", Integer),
            Column::null("read_at", Timestamp),
        ],
        order_by: "id",
        parents: &[
            ForeignKey::new("notification_id", "notifications"),
            ForeignKey::new("user_id", "users"),
        ],
    },
    DatasetDef {
        name: "audit_log",
        id_column: Some("id"),
        columns: &[
            Column::new("id", Id),
            Column::null("user_id", Integer),
            Column::new("action", Code),
            Column::null("detail", Text),
            Column::new("created_at", Timestamp),
        ],
        order_by: "id",
        parents: &[ForeignKey::null("user_id", "users")],
    },
];

/// Datasets in load (parent-before-child) order.
pub fn load_order() -> impl Iterator<Item = &'static DatasetDef> {
    DATASETS.iter()
}

/// Datasets in reset (child-before-parent) order.
pub fn reset_order() -> impl Iterator<Item = &'static DatasetDef> {
    DATASETS.iter().rev()
}

/// Look up a dataset by name.
pub fn dataset(name: &str) -> Option<&'static DatasetDef> {
    DATASETS.iter().find(|d| d.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_dataset_names_unique() {
        let mut seen = HashSet::new();
        for def in DATASETS {
            assert!(seen.insert(def.name), "duplicate dataset {}", def.name);
        }
    }

    #[test]
    fn test_registry_order_is_topological() {
        // Every parent must be registered strictly before its child, so that
        // forward iteration is a valid load order and reverse iteration is a
        // valid reset order.
        let mut registered = HashSet::new();
        for def in load_order() {
            for fk in def.parents {
                assert!(
                    registered.contains(fk.references),
                    "{} references {} which is not registered earlier",
                    def.name,
                    fk.references
                );
            }
            registered.insert(def.name);
        }
    }

    #[test]
    fn test_foreign_key_columns_exist() {
        for def in DATASETS {
            for fk in def.parents {
                let col = def
                    .columns
                    .iter()
                    .find(|c| c.name == fk.column)
                    .unwrap_or_else(|| panic!("{}.{} missing from schema", def.name, fk.column));
                assert_eq!(
                    col.nullable, fk.nullable,
                    "{}.{} nullability mismatch",
                    def.name, fk.column
                );
            }
        }
    }

    #[test]
    fn test_id_columns_exist_and_are_ids() {
        for def in DATASETS {
            if let Some(id_col) = def.id_column {
                let col = def
                    .columns
                    .iter()
                    .find(|c| c.name == id_col)
                    .unwrap_or_else(|| panic!("{}.{} missing from schema", def.name, id_col));
                assert_eq!(col.ty, ColumnType::Id);
                assert!(!col.nullable);
            }
        }
    }

    #[test]
    fn test_parents_reference_id_datasets() {
        for def in DATASETS {
            for fk in def.parents {
                let parent = dataset(fk.references).expect("parent registered");
                assert!(
                    parent.id_column.is_some(),
                    "{} references {} which has no identifier column",
                    def.name,
                    fk.references
                );
            }
        }
    }

    #[test]
    fn test_reset_order_is_reverse_of_load_order() {
        let forward: Vec<_> = load_order().map(|d| d.name).collect();
        let mut backward: Vec<_> = reset_order().map(|d| d.name).collect();
        backward.reverse();
        assert_eq!(forward, backward);
    }
}
