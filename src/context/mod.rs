//! Test context: variables, dynamic content resolution and access to the
//! shared component registries used while a test case executes.

pub mod references;
pub mod variables;

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::endpoints::EndpointRegistry;
use crate::error::{CitrusError, CitrusResult};
use crate::functions::FunctionRegistry;
use crate::message::MessageStore;
use crate::settings::CitrusSettings;
use crate::validation::matcher::ValidationMatcherRegistry;
use crate::validation::MessageValidatorRegistry;

pub use references::ReferenceRegistry;

/// Name of the variable holding the current test name
pub const TEST_NAME_VARIABLE: &str = "citrus.test.name";

/// Execution context of a single test case
pub struct TestContext {
    variables: DashMap<String, String>,
    functions: Arc<FunctionRegistry>,
    matchers: Arc<ValidationMatcherRegistry>,
    validators: Arc<MessageValidatorRegistry>,
    endpoints: Arc<EndpointRegistry>,
    references: Arc<ReferenceRegistry>,
    settings: Arc<CitrusSettings>,
    messages: MessageStore,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    /// Context with the default function, matcher and validator libraries
    pub fn new() -> Self {
        TestContextFactory::default().create_context("")
    }

    /// Get a variable value; `${name}` expressions are accepted as well
    pub fn get_variable(&self, name: &str) -> CitrusResult<String> {
        let name = variables::cut_off_variable_prefix(name);
        self.variables
            .get(name)
            .map(|value| value.value().clone())
            .ok_or_else(|| CitrusError::unknown_variable(name))
    }

    /// Set a variable; the value is stored as given
    pub fn set_variable(&self, name: &str, value: impl Into<String>) -> CitrusResult<()> {
        let name = variables::cut_off_variable_prefix(name);
        if name.trim().is_empty() {
            return Err(CitrusError::runtime("Can not create variable with empty name"));
        }

        let value = value.into();
        trace!(variable = %name, value = %value, "Setting variable");
        self.variables.insert(name.to_string(), value);
        Ok(())
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.variables
            .contains_key(variables::cut_off_variable_prefix(name))
    }

    /// Snapshot of all variables, sorted by name
    pub fn variables(&self) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Resolve variable references and function calls in a text
    pub fn replace_dynamic_content(&self, text: &str) -> CitrusResult<String> {
        let resolved = variables::replace_variables_in_string(text, |name| self.get_variable(name))?;
        crate::functions::replace_functions_in_string(&resolved, self)
    }

    /// Resolve a whole value that is either a variable expression, a function
    /// call or a literal
    pub fn resolve_dynamic_value(&self, value: &str) -> CitrusResult<String> {
        if variables::is_variable_name(value) {
            self.get_variable(value)
        } else if crate::functions::is_function(value) {
            crate::functions::resolve_function(value, self)
        } else {
            Ok(value.to_string())
        }
    }

    /// Resolve all values of a map
    pub fn resolve_map(
        &self,
        map: &BTreeMap<String, String>,
    ) -> CitrusResult<BTreeMap<String, String>> {
        map.iter()
            .map(|(key, value)| {
                Ok((
                    self.replace_dynamic_content(key)?,
                    self.replace_dynamic_content(value)?,
                ))
            })
            .collect()
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn matchers(&self) -> &ValidationMatcherRegistry {
        &self.matchers
    }

    pub fn validators(&self) -> &MessageValidatorRegistry {
        &self.validators
    }

    pub fn endpoints(&self) -> &Arc<EndpointRegistry> {
        &self.endpoints
    }

    pub fn references(&self) -> &ReferenceRegistry {
        &self.references
    }

    pub fn settings(&self) -> &CitrusSettings {
        &self.settings
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    /// Copy of the variables sharing all registries; variables set on the
    /// copy are not visible in this context
    pub fn scratch(&self) -> TestContext {
        TestContext {
            variables: self.variables.clone(),
            functions: Arc::clone(&self.functions),
            matchers: Arc::clone(&self.matchers),
            validators: Arc::clone(&self.validators),
            endpoints: Arc::clone(&self.endpoints),
            references: Arc::clone(&self.references),
            settings: Arc::clone(&self.settings),
            messages: MessageStore::new(),
        }
    }
}

/// Creates test contexts that share registries and global variables
#[derive(Clone)]
pub struct TestContextFactory {
    pub functions: Arc<FunctionRegistry>,
    pub matchers: Arc<ValidationMatcherRegistry>,
    pub validators: Arc<MessageValidatorRegistry>,
    pub endpoints: Arc<EndpointRegistry>,
    pub references: Arc<ReferenceRegistry>,
    pub settings: Arc<CitrusSettings>,
    pub global_variables: BTreeMap<String, String>,
}

impl Default for TestContextFactory {
    fn default() -> Self {
        Self::new(CitrusSettings::default())
    }
}

impl TestContextFactory {
    pub fn new(settings: CitrusSettings) -> Self {
        Self {
            functions: Arc::new(FunctionRegistry::with_defaults()),
            matchers: Arc::new(ValidationMatcherRegistry::with_defaults()),
            validators: Arc::new(MessageValidatorRegistry::with_defaults()),
            endpoints: Arc::new(EndpointRegistry::new()),
            references: Arc::new(ReferenceRegistry::new()),
            settings: Arc::new(settings),
            global_variables: BTreeMap::new(),
        }
    }

    pub fn with_global_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.global_variables = variables;
        self
    }

    /// Create a fresh context for a test
    pub fn create_context(&self, test_name: &str) -> TestContext {
        debug!(test = %test_name, "Creating test context");
        let variables = DashMap::new();
        for (name, value) in &self.global_variables {
            variables.insert(name.clone(), value.clone());
        }
        variables.insert(TEST_NAME_VARIABLE.to_string(), test_name.to_string());

        TestContext {
            variables,
            functions: Arc::clone(&self.functions),
            matchers: Arc::clone(&self.matchers),
            validators: Arc::clone(&self.validators),
            endpoints: Arc::clone(&self.endpoints),
            references: Arc::clone(&self.references),
            settings: Arc::clone(&self.settings),
            messages: MessageStore::new(),
        }
    }
}
