//! Checksums over a migration's rendered SQL

use crate::migration::Migration;
use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of a migration
///
/// Hashes the SQL every step renders to, in order. Editing a step's
/// definition after it has shipped changes the checksum.
pub fn migration_checksum(migration: &dyn Migration) -> String {
    let mut hasher = Sha256::new();
    for step in migration.steps() {
        hasher.update(step.to_sql().as_bytes());
        hasher.update(b";\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::step::{ColumnSpec, ColumnType, SchemaStep};

    struct Single(&'static str);

    impl Migration for Single {
        fn name(&self) -> &str {
            "single"
        }

        fn version(&self) -> i64 {
            1
        }

        fn steps(&self) -> Vec<SchemaStep> {
            vec![SchemaStep::add_column_if_absent(
                "jobs",
                ColumnSpec::new(self.0, ColumnType::Text),
            )]
        }
    }

    #[test]
    fn test_checksum_is_stable_hex() {
        let a = migration_checksum(&Single("notes"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, migration_checksum(&Single("notes")));
    }

    #[test]
    fn test_checksum_changes_with_definition() {
        assert_ne!(
            migration_checksum(&Single("notes")),
            migration_checksum(&Single("comments"))
        );
    }
}
