//! Relationship descriptors produced by discovery

use serde::{Deserialize, Serialize};

/// How a relationship relates to the entity it was discovered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipDirection {
    /// Declared relation whose target is the entity's own table
    SelfReference,
    /// Declared relation to another table holding the foreign key
    Forward,
    /// Undeclared foreign key in another table pointing back at the entity
    Reverse,
}

impl RelationshipDirection {
    /// Probe groups run in this order
    pub const ALL: [RelationshipDirection; 3] = [
        RelationshipDirection::SelfReference,
        RelationshipDirection::Reverse,
        RelationshipDirection::Forward,
    ];
}

/// A single dependent relationship of an entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDescriptor {
    pub name: String,
    pub source_table: String,
    /// Table holding the dependent rows
    pub target_table: String,
    /// Columns of `target_table` that store the owner's primary key
    pub foreign_key_fields: Vec<String>,
    pub cascade_on_delete: bool,
    pub is_collection: bool,
    pub direction: RelationshipDirection,
}

impl RelationshipDescriptor {
    pub fn is_self_reference(&self) -> bool {
        self.direction == RelationshipDirection::SelfReference
    }

    /// True if this descriptor already probes `table.column`
    pub fn covers(&self, table: &str, column: &str) -> bool {
        self.target_table == table && self.foreign_key_fields.iter().any(|f| f == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covers() {
        let descriptor = RelationshipDescriptor {
            name: "photos".to_string(),
            source_table: "animals".to_string(),
            target_table: "photos".to_string(),
            foreign_key_fields: vec!["animal_id".to_string()],
            cascade_on_delete: true,
            is_collection: true,
            direction: RelationshipDirection::Forward,
        };

        assert!(descriptor.covers("photos", "animal_id"));
        assert!(!descriptor.covers("photos", "uploader_id"));
        assert!(!descriptor.covers("litters", "animal_id"));
        assert!(!descriptor.is_self_reference());
    }
}
