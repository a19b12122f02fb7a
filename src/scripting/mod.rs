//! Rhai-scripted experiments
//!
//! A scripted experiment is a `.rhai` file that defines two functions:
//!
//! - `config_template()` - returns a map of default parameters
//! - `acquire(set_index, config)` - returns one measurement as a map
//!
//! and optionally `description()` returning a one-line string.
//!
//! ## Measurement maps
//!
//! The map returned by `acquire` is converted key by key:
//!
//! - a number becomes a scalar channel
//! - an array of numbers becomes a trace
//! - an array of arrays becomes a 2-D channel (e.g. I/Q pairs)
//! - the key `x_pts` becomes the sweep axis instead of a channel
//!
//! ## Example Script
//!
//! ```rhai
//! fn config_template() {
//!     #{ center: 5.0, width: 0.5, points: 51, sets: 5 }
//! }
//!
//! fn acquire(set_index, config) {
//!     let xs = linspace(0.0, 10.0, config.points);
//!     let ys = [];
//!     for (x, i) in xs {
//!         ys.push(lorentzian(x, config.center, config.width) + noise(0.05, set_index * 1000 + i));
//!     }
//!     #{ avgi: ys, x_pts: xs }
//! }
//! ```

mod engine;

pub use engine::{
    config_to_dynamic, measurement_from_dynamic, ScriptEngine, ACQUIRE_FN, DESCRIPTION_FN,
    TEMPLATE_FN,
};

use crate::backend::{HardwareProxy, HardwareResult};
use crate::config::{ConfigMap, RunConfig};
use crate::error::{QuarkyError, Result};
use crate::experiment::ExperimentDescriptor;
use crate::types::Measurement;
use rhai::{Dynamic, AST};
use std::path::Path;
use std::sync::Arc;

/// A compiled experiment script
#[derive(Debug, Clone)]
pub struct ScriptedExperiment {
    name: String,
    description: String,
    template: ConfigMap,
    engine: Arc<ScriptEngine>,
    ast: Arc<AST>,
}

impl ScriptedExperiment {
    /// Load a script file; the experiment is named after the file stem
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            QuarkyError::Experiment(format!("Failed to read script {:?}: {}", path, e))
        })?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| QuarkyError::Experiment(format!("Invalid script path {:?}", path)))?;
        let experiment = Self::from_source(name, &source)
            .map_err(|e| e.with_context(format!("Failed to load {:?}", path)))?;
        tracing::info!("Loaded scripted experiment '{}' from {:?}", name, path);
        Ok(experiment)
    }

    /// Compile a script from source
    pub fn from_source(name: impl Into<String>, source: &str) -> Result<Self> {
        let name = name.into();
        let engine = ScriptEngine::new();
        let ast = engine.compile(source)?;

        for (entry, arity) in [(TEMPLATE_FN, 0), (ACQUIRE_FN, 2)] {
            if !ScriptEngine::has_fn(&ast, entry, arity) {
                return Err(QuarkyError::Experiment(format!(
                    "Script '{}' must define {}() with {} parameter(s)",
                    name, entry, arity
                )));
            }
        }

        let template = engine.config_template(&ast)?;
        let description = engine.description(&ast).unwrap_or_default();

        Ok(Self {
            name,
            description,
            template,
            engine: Arc::new(engine),
            ast: Arc::new(ast),
        })
    }

    /// Experiment name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text returned by the script's `description()`, if any
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Parameters returned by `config_template()`
    pub fn config_template(&self) -> &ConfigMap {
        &self.template
    }

    /// Build the hardware proxy for one run
    pub fn proxy(&self, config: &RunConfig) -> Result<ScriptProxy> {
        Ok(ScriptProxy {
            name: self.name.clone(),
            engine: Arc::clone(&self.engine),
            ast: Arc::clone(&self.ast),
            config: config_to_dynamic(config.values())?,
            calls: 0,
        })
    }

    /// Wrap as a registry entry
    pub fn into_descriptor(self) -> ExperimentDescriptor {
        let name = self.name.clone();
        let description = self.description.clone();
        let template = self.template.clone();
        ExperimentDescriptor::new(name, template, move |config: &RunConfig| {
            Ok(Box::new(self.proxy(config)?) as Box<dyn HardwareProxy>)
        })
        .with_description(description)
    }
}

/// Hardware proxy that calls the script's `acquire` once per set
pub struct ScriptProxy {
    name: String,
    engine: Arc<ScriptEngine>,
    ast: Arc<AST>,
    config: Dynamic,
    calls: usize,
}

impl HardwareProxy for ScriptProxy {
    fn acquire(&mut self) -> HardwareResult<Measurement> {
        let set_index = self.calls;
        self.calls += 1;
        self.engine.acquire(&self.ast, set_index, &self.config)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
