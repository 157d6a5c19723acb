//! ComponentRegistry: configuration class names → engine constructors.
//!
//! Configurations name their detective (`model.class_name`), transformer
//! (`transformer.class_name`), data source (`datasource_class`) and
//! optionally their analyzer (`performance.class_name`). The set of names is
//! closed: anything not registered here is rejected when a configuration is
//! validated, before a task is created for it.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::Configuration;
use crate::error::{PipelineError, Result};
use crate::impls::{BaselineDetective, ChunkedDataSource, ScoreDistributionAnalyzer, WindowTransformer};
use crate::ports::{DataSourceFactory, Detective, PerformanceAnalyzer, Transformer};

pub const DEFAULT_ANALYZER: &str = "score_distribution";

type DetectiveFactory = Arc<dyn Fn(&Configuration) -> Result<Box<dyn Detective>> + Send + Sync>;
type TransformerFactory =
    Arc<dyn Fn(&Configuration) -> Result<Box<dyn Transformer>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ComponentRegistry {
    detectives: HashMap<String, DetectiveFactory>,
    transformers: HashMap<String, TransformerFactory>,
    datasources: HashMap<String, Arc<dyn DataSourceFactory>>,
    analyzers: HashMap<String, Arc<dyn PerformanceAnalyzer>>,
}

fn insert_new<V>(map: &mut HashMap<String, V>, kind: &str, name: &str, value: V) -> Result<()> {
    if map.contains_key(name) {
        return Err(PipelineError::Registry(format!(
            "{kind} `{name}` is already registered"
        )));
    }
    map.insert(name.to_string(), value);
    Ok(())
}

fn lookup<'a, V>(map: &'a HashMap<String, V>, kind: &str, name: &str) -> Result<&'a V> {
    map.get(name).ok_or_else(|| {
        let mut known: Vec<&str> = map.keys().map(String::as_str).collect();
        known.sort_unstable();
        PipelineError::Registry(format!("unknown {kind} `{name}` (known: {known:?})"))
    })
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the reference components shipped in `impls`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.detectives.insert(
            "baseline".to_string(),
            Arc::new(|c: &Configuration| {
                Ok(Box::new(BaselineDetective::from_configuration(c)?) as Box<dyn Detective>)
            }),
        );
        registry.transformers.insert(
            "window".to_string(),
            Arc::new(|c: &Configuration| {
                Ok(Box::new(WindowTransformer::from_configuration(c)?) as Box<dyn Transformer>)
            }),
        );
        registry
            .datasources
            .insert("flight".to_string(), Arc::new(ChunkedDataSource::default()));
        registry
            .analyzers
            .insert(DEFAULT_ANALYZER.to_string(), Arc::new(ScoreDistributionAnalyzer));
        registry
    }

    pub fn register_detective<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Configuration) -> Result<Box<dyn Detective>> + Send + Sync + 'static,
    {
        let factory: DetectiveFactory = Arc::new(factory);
        insert_new(&mut self.detectives, "detective", name, factory)
    }

    pub fn register_transformer<F>(&mut self, name: &str, factory: F) -> Result<()>
    where
        F: Fn(&Configuration) -> Result<Box<dyn Transformer>> + Send + Sync + 'static,
    {
        let factory: TransformerFactory = Arc::new(factory);
        insert_new(&mut self.transformers, "transformer", name, factory)
    }

    pub fn register_datasource(
        &mut self,
        name: &str,
        factory: Arc<dyn DataSourceFactory>,
    ) -> Result<()> {
        insert_new(&mut self.datasources, "datasource", name, factory)
    }

    pub fn register_analyzer(
        &mut self,
        name: &str,
        analyzer: Arc<dyn PerformanceAnalyzer>,
    ) -> Result<()> {
        insert_new(&mut self.analyzers, "analyzer", name, analyzer)
    }

    pub fn detective(&self, configuration: &Configuration) -> Result<Box<dyn Detective>> {
        let factory = lookup(&self.detectives, "detective", configuration.model_class()?)?;
        factory(configuration)
    }

    pub fn transformer(&self, configuration: &Configuration) -> Result<Box<dyn Transformer>> {
        let factory = lookup(
            &self.transformers,
            "transformer",
            configuration.transformer_class()?,
        )?;
        factory(configuration)
    }

    pub fn datasource(&self, configuration: &Configuration) -> Result<Arc<dyn DataSourceFactory>> {
        lookup(
            &self.datasources,
            "datasource",
            configuration.datasource_class()?,
        )
        .cloned()
    }

    pub fn analyzer(&self, configuration: &Configuration) -> Result<Arc<dyn PerformanceAnalyzer>> {
        let name = configuration.analyzer_class().unwrap_or(DEFAULT_ANALYZER);
        lookup(&self.analyzers, "analyzer", name).cloned()
    }

    /// Fails on the first class name that is missing or not registered.
    pub fn validate(&self, configuration: &Configuration) -> Result<()> {
        lookup(&self.detectives, "detective", configuration.model_class()?)?;
        lookup(
            &self.transformers,
            "transformer",
            configuration.transformer_class()?,
        )?;
        lookup(
            &self.datasources,
            "datasource",
            configuration.datasource_class()?,
        )?;
        self.analyzer(configuration)?;
        Ok(())
    }
}
