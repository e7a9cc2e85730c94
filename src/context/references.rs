use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

use crate::error::{CitrusError, CitrusResult};

type Reference = Arc<dyn Any + Send + Sync>;

/// Registry of shared components (data sources, Kubernetes clients,
/// browsers, ...) that actions look up by name and type.
#[derive(Default)]
pub struct ReferenceRegistry {
    references: DashMap<String, Reference>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a component under a name, replacing any previous binding
    pub fn bind<T: Any + Send + Sync>(&self, name: impl Into<String>, component: Arc<T>) {
        let name = name.into();
        debug!(reference = %name, component = std::any::type_name::<T>(), "Binding reference");
        self.references.insert(name, component);
    }

    /// Resolve a component by name and type
    pub fn resolve<T: Any + Send + Sync>(&self, name: &str) -> CitrusResult<Arc<T>> {
        let reference = self
            .references
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                CitrusError::runtime(format!("Unable to find reference '{}'", name))
            })?;

        reference.downcast::<T>().map_err(|_| {
            CitrusError::runtime(format!(
                "Reference '{}' is not of type {}",
                name,
                std::any::type_name::<T>()
            ))
        })
    }

    /// Resolve by name when given, otherwise the single component of that type
    pub fn resolve_optional_name<T: Any + Send + Sync>(
        &self,
        name: Option<&str>,
    ) -> CitrusResult<Arc<T>> {
        if let Some(name) = name {
            return self.resolve(name);
        }

        let mut candidates: Vec<(String, Arc<T>)> = self
            .references
            .iter()
            .filter_map(|entry| {
                Arc::clone(entry.value())
                    .downcast::<T>()
                    .ok()
                    .map(|component| (entry.key().clone(), component))
            })
            .collect();

        match candidates.len() {
            1 => Ok(candidates.remove(0).1),
            0 => Err(CitrusError::runtime(format!(
                "Unable to find reference of type {}",
                std::any::type_name::<T>()
            ))),
            _ => {
                let mut names: Vec<String> = candidates.into_iter().map(|(name, _)| name).collect();
                names.sort();
                Err(CitrusError::runtime(format!(
                    "Found multiple references of type {} ({}), please specify a name",
                    std::any::type_name::<T>(),
                    names.join(", ")
                )))
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.references.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.references.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct DataSource(String);

    #[test]
    fn test_resolve_by_name_and_type() {
        let registry = ReferenceRegistry::new();
        registry.bind("db", Arc::new(DataSource("memory".to_string())));
        registry.bind("number", Arc::new(42u32));

        let db = registry.resolve::<DataSource>("db").unwrap();
        assert_eq!(db.0, "memory");
        assert!(registry.resolve::<DataSource>("number").is_err());
        assert!(registry.resolve::<DataSource>("missing").is_err());

        let single = registry.resolve_optional_name::<DataSource>(None).unwrap();
        assert_eq!(*single, DataSource("memory".to_string()));
    }

    #[test]
    fn test_ambiguous_resolution() {
        let registry = ReferenceRegistry::new();
        registry.bind("a", Arc::new(DataSource("a".to_string())));
        registry.bind("b", Arc::new(DataSource("b".to_string())));

        let err = registry.resolve_optional_name::<DataSource>(None).unwrap_err();
        assert!(err.to_string().contains("(a, b)"));
    }
}
