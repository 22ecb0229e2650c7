//! Result map registry.
//!
//! # Responsibility
//! - Build the default column-to-field map for every registered result type.
//! - Layer named alias maps over the default map without replacing it.
//!
//! # Invariants
//! - The default map (name `""`) always exists for a registered type.
//! - Named maps are seeded with every default entry they do not override.
//! - Built once at init, read-only afterwards.

use crate::meta::{LookupError, TypeDescriptor};
use crate::naming::camel_to_under_score;
use log::debug;
use std::collections::HashMap;

/// Upper-cased result-column name to field identifier.
pub type ColumnFieldMap = HashMap<String, &'static str>;

/// Default result map name.
pub const DEFAULT_RESULT_MAP: &str = "";

#[derive(Default)]
pub struct ResultMapRegistry {
    maps: HashMap<&'static str, HashMap<String, ColumnFieldMap>>,
}

impl ResultMapRegistry {
    /// Builds the default and named alias maps for one result type.
    pub(crate) fn register(&mut self, descriptor: &TypeDescriptor) {
        let mut maps: HashMap<String, ColumnFieldMap> = HashMap::new();
        maps.insert(DEFAULT_RESULT_MAP.to_string(), ColumnFieldMap::new());

        for field_spec in &descriptor.fields {
            let declared = field_spec
                .column
                .as_ref()
                .and_then(|c| c.name)
                .unwrap_or(field_spec.field);
            let column = camel_to_under_score(declared);
            if let Some(default_map) = maps.get_mut(DEFAULT_RESULT_MAP) {
                default_map.insert(column, field_spec.field);
            }

            for alias in &field_spec.aliases {
                maps.entry(alias.result_map.to_string())
                    .or_default()
                    .insert(alias.alias.to_uppercase(), field_spec.field);
            }
        }

        // Named maps are supersets of the default: back-fill every default
        // entry the alias set does not override.
        let defaults = maps
            .get(DEFAULT_RESULT_MAP)
            .cloned()
            .unwrap_or_default();
        for (name, map) in maps.iter_mut() {
            if name.is_empty() {
                continue;
            }
            for (column, field) in &defaults {
                map.entry(column.clone()).or_insert(*field);
            }
        }

        debug!(
            "event=result_map_register module=resultmap status=ok type={} maps={}",
            descriptor.type_name,
            maps.len()
        );
        self.maps.insert(descriptor.type_name, maps);
    }

    /// Resolves the column-to-field map for a (type, map name) pair.
    pub fn resolve(
        &self,
        type_name: &str,
        result_map: &str,
    ) -> Result<&ColumnFieldMap, LookupError> {
        self.maps
            .get(type_name)
            .and_then(|maps| maps.get(result_map))
            .ok_or_else(|| LookupError::UnknownResultMap {
                type_name: type_name.to_string(),
                result_map: result_map.to_string(),
            })
    }
}
