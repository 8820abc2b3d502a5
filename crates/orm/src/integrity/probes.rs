//! Probe planning and SQL composition
//!
//! Every foreign key field of every relationship becomes one probe. Probes of
//! the same direction are combined into a single `UNION ALL` statement whose
//! rows are tagged with the probe's position, so a whole group costs one
//! round trip. Identifiers pass through the entity's allow-list; ids are
//! always bound.

use crate::backends::{DatabaseValue, ParamList, SqlDialect};
use crate::error::OrmResult;
use crate::relationships::{EntityRelationships, RelationshipDirection};

/// One `(table, field)` pair to check for references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Position in discovery order; results are reported in this order
    pub order: usize,
    pub relationship: String,
    pub table: String,
    pub field: String,
    pub cascade_on_delete: bool,
}

/// Probes sharing a direction, executed together
#[derive(Debug, Clone)]
pub struct ProbeGroup {
    pub direction: RelationshipDirection,
    pub probes: Vec<Probe>,
}

impl ProbeGroup {
    /// Comma-separated relationship names, for logs and unverified warnings
    pub fn relationship_names(&self) -> String {
        let mut names: Vec<&str> = Vec::new();
        for probe in &self.probes {
            if !names.contains(&probe.relationship.as_str()) {
                names.push(&probe.relationship);
            }
        }
        names.join(", ")
    }
}

/// A composed statement and its bound values
#[derive(Debug, Clone)]
pub struct ProbeQuery {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
}

pub const PROBE_COLUMN: &str = "probe";
pub const PRESENT_COLUMN: &str = "present";
pub const OWNER_COLUMN: &str = "owner_id";
pub const COUNT_COLUMN: &str = "dependents";

/// Split an entity's relationships into non-empty groups, one probe per field
pub fn plan(relationships: &EntityRelationships) -> Vec<ProbeGroup> {
    let mut probes = Vec::new();
    for descriptor in &relationships.descriptors {
        for field in &descriptor.foreign_key_fields {
            probes.push((
                descriptor.direction,
                Probe {
                    order: probes.len(),
                    relationship: descriptor.name.clone(),
                    table: descriptor.target_table.clone(),
                    field: field.clone(),
                    cascade_on_delete: descriptor.cascade_on_delete,
                },
            ));
        }
    }

    RelationshipDirection::ALL
        .iter()
        .map(|&direction| ProbeGroup {
            direction,
            probes: probes
                .iter()
                .filter(|(d, _)| *d == direction)
                .map(|(_, p)| p.clone())
                .collect(),
        })
        .filter(|group| !group.probes.is_empty())
        .collect()
}

/// `SELECT <order> AS probe, EXISTS (...) AS present` per probe
pub fn existence_query(
    relationships: &EntityRelationships,
    probes: &[Probe],
    id: i64,
    dialect: SqlDialect,
) -> OrmResult<ProbeQuery> {
    let mut params = ParamList::new(dialect);
    let mut parts = Vec::with_capacity(probes.len());
    for probe in probes {
        let table = relationships.allow_list.table(&probe.table)?;
        let field = relationships.allow_list.column(&probe.table, &probe.field)?;
        parts.push(format!(
            "SELECT {} AS {}, EXISTS (SELECT 1 FROM {} WHERE {} = {} LIMIT 1) AS {}",
            probe.order,
            PROBE_COLUMN,
            table,
            field,
            params.push(id),
            PRESENT_COLUMN
        ));
    }

    Ok(ProbeQuery {
        sql: parts.join(" UNION ALL "),
        params: params.into_values(),
    })
}

/// `SELECT <order> AS probe, COUNT(*) AS dependents` per probe
pub fn count_query(
    relationships: &EntityRelationships,
    probes: &[Probe],
    id: i64,
    dialect: SqlDialect,
) -> OrmResult<ProbeQuery> {
    let mut params = ParamList::new(dialect);
    let mut parts = Vec::with_capacity(probes.len());
    for probe in probes {
        let table = relationships.allow_list.table(&probe.table)?;
        let field = relationships.allow_list.column(&probe.table, &probe.field)?;
        parts.push(format!(
            "SELECT {} AS {}, COUNT(*) AS {} FROM {} WHERE {} = {}",
            probe.order,
            PROBE_COLUMN,
            COUNT_COLUMN,
            table,
            field,
            params.push(id)
        ));
    }

    Ok(ProbeQuery {
        sql: parts.join(" UNION ALL "),
        params: params.into_values(),
    })
}

/// Grouped counts per owner id; owners without references produce no row
pub fn batch_query(
    relationships: &EntityRelationships,
    probes: &[Probe],
    ids: &[i64],
    dialect: SqlDialect,
) -> OrmResult<ProbeQuery> {
    let mut params = ParamList::new(dialect);
    let mut parts = Vec::with_capacity(probes.len());
    for probe in probes {
        let table = relationships.allow_list.table(&probe.table)?;
        let field = relationships.allow_list.column(&probe.table, &probe.field)?;
        parts.push(format!(
            "SELECT {order} AS {probe}, {field} AS {owner}, COUNT(*) AS {count} \
             FROM {table} WHERE {field} IN ({ids}) GROUP BY {field}",
            order = probe.order,
            probe = PROBE_COLUMN,
            owner = OWNER_COLUMN,
            count = COUNT_COLUMN,
            table = table,
            field = field,
            ids = params.push_list(ids.iter().copied()),
        ));
    }

    Ok(ProbeQuery {
        sql: parts.join(" UNION ALL "),
        params: params.into_values(),
    })
}
