use crate::circuit_breaker::{CircuitState, StateListener};
use crate::clock::{Clock, SystemClock};
use crate::config::BulwarkConfig;
use crate::error::{BulwarkError, Result};
use crate::pipeline::{Pipeline, PipelineSnapshot};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// One pipeline per named downstream dependency
#[derive(Clone)]
pub struct PipelineRegistry {
    /// Pipelines keyed by dependency name
    pipelines: Arc<DashMap<String, Arc<Pipeline>>>,
    /// Validated configuration
    config: Arc<BulwarkConfig>,
    /// Clock handed to every breaker
    clock: Arc<dyn Clock>,
    /// Subscribers attached to every pipeline, present and future.
    /// Locked before any map shard by both creation and subscription.
    listeners: Arc<Mutex<Vec<StateListener>>>,
}

impl PipelineRegistry {
    /// Validate `config` and create an empty registry
    pub fn new(config: BulwarkConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: BulwarkConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            pipelines: Arc::new(DashMap::new()),
            config: Arc::new(config),
            clock,
            listeners: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Eagerly create a pipeline for every configured dependency
    pub fn init_configured(&self) {
        for name in self.config.dependencies.keys() {
            self.get_or_create(name);
        }
        info!(
            pipelines = self.pipelines.len(),
            "Configured pipelines initialized"
        );
    }

    /// Get or create the pipeline for a dependency
    pub fn get_or_create(&self, dependency: &str) -> Arc<Pipeline> {
        if let Some(pipeline) = self.pipelines.get(dependency) {
            return pipeline.clone();
        }

        let listeners = self.listeners.lock();
        self.pipelines
            .entry(dependency.to_string())
            .or_insert_with(|| {
                debug!(dependency = dependency, "Creating new pipeline");
                let pipeline = Pipeline::build(
                    dependency.to_string(),
                    self.config.pipeline_config(dependency).clone(),
                    self.clock.clone(),
                );
                for listener in listeners.iter() {
                    pipeline.subscribe(listener.clone());
                }
                Arc::new(pipeline)
            })
            .clone()
    }

    /// Get an existing pipeline
    pub fn get(&self, dependency: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.get(dependency).map(|p| p.clone())
    }

    /// Get the breaker state for a dependency; unknown dependencies are closed
    pub fn state(&self, dependency: &str) -> CircuitState {
        self.pipelines
            .get(dependency)
            .map(|p| p.state())
            .unwrap_or(CircuitState::Closed)
    }

    pub fn snapshot(&self, dependency: &str) -> Option<PipelineSnapshot> {
        self.pipelines.get(dependency).map(|p| p.snapshot())
    }

    /// Snapshots of all pipelines, sorted by name
    pub fn snapshots(&self) -> Vec<PipelineSnapshot> {
        let mut snapshots: Vec<_> = self.pipelines.iter().map(|e| e.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Get all dependency names with a pipeline
    pub fn names(&self) -> Vec<String> {
        self.pipelines.iter().map(|e| e.key().clone()).collect()
    }

    /// Force one dependency's breaker closed
    pub fn reset(&self, dependency: &str) -> Result<()> {
        let pipeline = self.get(dependency).ok_or_else(|| {
            BulwarkError::Config(format!("Unknown dependency: {}", dependency))
        })?;
        pipeline.reset_circuit_breaker();
        Ok(())
    }

    /// Force every breaker closed
    pub fn reset_all(&self) {
        for entry in self.pipelines.iter() {
            entry.value().reset_circuit_breaker();
        }
    }

    /// Subscribe to state changes of every pipeline, including ones created later
    pub fn subscribe(&self, listener: StateListener) {
        let mut listeners = self.listeners.lock();
        for entry in self.pipelines.iter() {
            entry.value().subscribe(listener.clone());
        }
        listeners.push(listener);
    }

    pub fn config(&self) -> &BulwarkConfig {
        &self.config
    }
}

impl std::fmt::Debug for PipelineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRegistry")
            .field("pipelines", &self.names())
            .field("listeners", &self.listeners.lock().len())
            .finish()
    }
}
