//! Experiment definitions and their registry
//!
//! An experiment is a name, a config template and a factory that turns a
//! finished [`RunConfig`] into a [`HardwareProxy`]. Built-in experiments run
//! against simulated hardware; scripted experiments are loaded from Rhai
//! files (see [`crate::scripting`]).
//!
//! # Example
//!
//! ```ignore
//! use quarky_rs::experiment::ExperimentRegistry;
//!
//! let registry = ExperimentRegistry::with_builtins();
//! let cos = registry.get("Cos")?;
//! let config = cos.run_config(&overrides)?;
//! let hardware = cos.instantiate(&config)?;
//! ```

pub mod builtin;

pub use builtin::{builtin_experiments, cos, damp_osc};

use crate::backend::HardwareProxy;
use crate::config::{ConfigMap, RunConfig, RunConfigBuilder};
use crate::error::{QuarkyError, Result, ResultExt};
use crate::scripting::ScriptedExperiment;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Builds the hardware proxy for one run
pub type ExperimentFactory =
    Arc<dyn Fn(&RunConfig) -> Result<Box<dyn HardwareProxy>> + Send + Sync>;

/// A runnable experiment
#[derive(Clone)]
pub struct ExperimentDescriptor {
    name: String,
    description: String,
    template: ConfigMap,
    factory: ExperimentFactory,
}

impl ExperimentDescriptor {
    /// Create a descriptor
    pub fn new<F>(name: impl Into<String>, template: ConfigMap, factory: F) -> Self
    where
        F: Fn(&RunConfig) -> Result<Box<dyn HardwareProxy>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: String::new(),
            template,
            factory: Arc::new(factory),
        }
    }

    /// Attach a one-line description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Registry key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line description (may be empty)
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Experiment-specific config template
    pub fn config_template(&self) -> &ConfigMap {
        &self.template
    }

    /// Builder holding `base ⊕ template`, ready for user overrides
    pub fn config_builder(&self) -> Result<RunConfigBuilder> {
        RunConfigBuilder::from_base()
            .layer(&format!("the {} template", self.name), &self.template)
    }

    /// `base ⊕ template ⊕ overrides`, validated
    pub fn run_config(&self, overrides: &ConfigMap) -> Result<RunConfig> {
        self.config_builder()?.layer("overrides", overrides)?.build()
    }

    /// Build the hardware proxy for a run
    pub fn instantiate(&self, config: &RunConfig) -> Result<Box<dyn HardwareProxy>> {
        (self.factory)(config)
            .with_context(|| format!("Failed to set up experiment '{}'", self.name))
    }
}

impl std::fmt::Debug for ExperimentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

/// Experiments available to the runner, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ExperimentRegistry {
    experiments: BTreeMap<String, ExperimentDescriptor>,
}

impl ExperimentRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in experiments
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_experiments() {
            registry.experiments.insert(descriptor.name().to_string(), descriptor);
        }
        registry
    }

    /// Add an experiment; names must be unique
    pub fn register(&mut self, descriptor: ExperimentDescriptor) -> Result<()> {
        if self.experiments.contains_key(descriptor.name()) {
            return Err(QuarkyError::Experiment(format!(
                "An experiment named '{}' is already registered",
                descriptor.name()
            )));
        }
        tracing::debug!("Registered experiment '{}'", descriptor.name());
        self.experiments
            .insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    /// Load a Rhai experiment file and register it under its file stem
    pub fn load_script(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let experiment = ScriptedExperiment::load(path)?;
        let name = experiment.name().to_string();
        self.register(experiment.into_descriptor())?;
        Ok(name)
    }

    /// Look up an experiment
    pub fn get(&self, name: &str) -> Result<&ExperimentDescriptor> {
        self.experiments.get(name).ok_or_else(|| {
            QuarkyError::Experiment(format!(
                "Unknown experiment '{}' (available: {})",
                name,
                self.names().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    /// Registered names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.experiments.keys().map(String::as_str)
    }

    /// Registered experiments in name order
    pub fn iter(&self) -> impl Iterator<Item = &ExperimentDescriptor> {
        self.experiments.values()
    }

    /// Number of registered experiments
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}
