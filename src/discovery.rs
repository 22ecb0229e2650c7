//! Type discovery over an explicit registration scope.
//!
//! # Responsibility
//! - Collect the user types and mapper contracts reachable under one root
//!   scope (an explicit registration list, replacing classpath scanning).
//! - Classify registrations into entity types, result types and mapper
//!   contracts.
//!
//! # Invariants
//! - A scope resolves at most once; the resolved sets are read-only.
//! - Duplicate type or mapper names within one scope are rejected.

use crate::mapper::MapperContract;
use crate::meta::TypeDescriptor;
use log::debug;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Root scope unresolvable or inconsistent. Fatal at startup.
#[derive(Debug)]
pub enum DiscoveryError {
    EmptyRoot,
    EmptyScope { root: String },
    DuplicateType { root: String, type_name: &'static str },
    DuplicateMapper { root: String, mapper: &'static str },
}

impl Display for DiscoveryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRoot => write!(f, "root scope name cannot be empty"),
            Self::EmptyScope { root } => {
                write!(f, "root scope `{root}` has no registered types or mappers")
            }
            Self::DuplicateType { root, type_name } => {
                write!(f, "type `{type_name}` registered twice under scope `{root}`")
            }
            Self::DuplicateMapper { root, mapper } => {
                write!(f, "mapper `{mapper}` registered twice under scope `{root}`")
            }
        }
    }
}

impl Error for DiscoveryError {}

/// Explicit registration list standing in for a scanned root scope.
pub struct TypeScope {
    root: String,
    types: Vec<&'static TypeDescriptor>,
    mappers: Vec<MapperContract>,
}

impl TypeScope {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            types: Vec::new(),
            mappers: Vec::new(),
        }
    }

    /// Registers a type descriptor; its markers decide classification.
    pub fn register_type(mut self, descriptor: &'static TypeDescriptor) -> Self {
        self.types.push(descriptor);
        self
    }

    /// Registers a mapper contract.
    pub fn register_mapper(mut self, contract: MapperContract) -> Self {
        self.mappers.push(contract);
        self
    }

    /// Resolves and classifies the scope. Consumed by runtime construction.
    pub(crate) fn resolve(self) -> Result<ResolvedScope, DiscoveryError> {
        if self.root.trim().is_empty() {
            return Err(DiscoveryError::EmptyRoot);
        }
        if self.types.is_empty() && self.mappers.is_empty() {
            return Err(DiscoveryError::EmptyScope { root: self.root });
        }

        let mut seen_types = HashSet::new();
        for descriptor in &self.types {
            if !seen_types.insert(descriptor.type_name) {
                return Err(DiscoveryError::DuplicateType {
                    root: self.root,
                    type_name: descriptor.type_name,
                });
            }
        }
        let mut seen_mappers = HashSet::new();
        for contract in &self.mappers {
            if !seen_mappers.insert(contract.name) {
                return Err(DiscoveryError::DuplicateMapper {
                    root: self.root,
                    mapper: contract.name,
                });
            }
        }

        let entities: Vec<_> = self
            .types
            .iter()
            .copied()
            .filter(|d| d.table.is_some())
            .collect();
        let results: Vec<_> = self
            .types
            .iter()
            .copied()
            .filter(|d| d.result_entity)
            .collect();

        debug!(
            "event=type_discovery module=discovery status=ok root={} entities={} results={} mappers={}",
            self.root,
            entities.len(),
            results.len(),
            self.mappers.len()
        );

        Ok(ResolvedScope {
            root: self.root,
            entities,
            results,
            mappers: self.mappers,
        })
    }
}

/// Classified output of scope resolution.
pub(crate) struct ResolvedScope {
    pub root: String,
    pub entities: Vec<&'static TypeDescriptor>,
    pub results: Vec<&'static TypeDescriptor>,
    pub mappers: Vec<MapperContract>,
}
