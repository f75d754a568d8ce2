use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use refinery_common::{EvaluatorConfig, RefineryError, SourceType};

use crate::context::EvaluationContext;
use crate::model::ModelCaller;
use crate::verdict::{parse_verdict, Verdict};

/// An independent opinion generator.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn id(&self) -> &str;

    /// Evaluators not applicable to a source type produce no record for it.
    fn applies_to(&self, _source_type: SourceType) -> bool {
        true
    }

    async fn audit(
        &self,
        ctx: &EvaluationContext<'_>,
        model: &dyn ModelCaller,
    ) -> Result<Verdict, RefineryError>;
}

/// Evaluator defined by a model id and a system prompt.
pub struct PromptEvaluator {
    id: String,
    model: String,
    system_prompt: String,
    source_types: Vec<SourceType>,
}

impl PromptEvaluator {
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            system_prompt: system_prompt.into(),
            source_types: Vec::new(),
        }
    }

    pub fn with_source_types(mut self, source_types: Vec<SourceType>) -> Self {
        self.source_types = source_types;
        self
    }

    pub fn from_config(config: &EvaluatorConfig) -> Self {
        Self::new(&config.id, &config.model, &config.system_prompt)
            .with_source_types(config.source_types.clone())
    }
}

#[async_trait]
impl Evaluator for PromptEvaluator {
    fn id(&self) -> &str {
        &self.id
    }

    fn applies_to(&self, source_type: SourceType) -> bool {
        self.source_types.is_empty() || self.source_types.contains(&source_type)
    }

    async fn audit(
        &self,
        ctx: &EvaluationContext<'_>,
        model: &dyn ModelCaller,
    ) -> Result<Verdict, RefineryError> {
        let response = model
            .call(&self.model, &self.system_prompt, &ctx.render())
            .await?;
        let verdict = parse_verdict(&response);
        if verdict.output.is_empty() {
            return Err(RefineryError::Evaluator {
                evaluator: self.id.clone(),
                reason: "empty output".to_string(),
            });
        }
        Ok(verdict)
    }
}

/// Evaluators in registration order. Ids are unique.
#[derive(Default, Clone)]
pub struct EvaluatorRegistry {
    evaluators: Vec<Arc<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[EvaluatorConfig]) -> Result<Self, RefineryError> {
        let mut registry = Self::new();
        for config in configs {
            registry.register(Arc::new(PromptEvaluator::from_config(config)))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) -> Result<(), RefineryError> {
        let id = evaluator.id();
        if id.trim().is_empty() {
            return Err(RefineryError::config("evaluator id must not be empty"));
        }
        if self.evaluators.iter().any(|e| e.id() == id) {
            return Err(RefineryError::config(format!(
                "duplicate evaluator id: {id}"
            )));
        }
        self.evaluators.push(evaluator);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    pub fn ids(&self) -> HashSet<&str> {
        self.evaluators.iter().map(|e| e.id()).collect()
    }

    /// Evaluators applicable to a source type, in registration order.
    pub fn applicable(&self, source_type: SourceType) -> impl Iterator<Item = &Arc<dyn Evaluator>> {
        self.evaluators
            .iter()
            .filter(move |e| e.applies_to(source_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(id: &str, source_types: Vec<SourceType>) -> EvaluatorConfig {
        EvaluatorConfig {
            id: id.into(),
            model: "model-x".into(),
            system_prompt: "You are terse.".into(),
            source_types,
        }
    }

    #[test]
    fn duplicate_ids_are_config_errors() {
        let err = EvaluatorRegistry::from_config(&[config("a", vec![]), config("a", vec![])])
            .err()
            .unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn source_type_filter() {
        let registry = EvaluatorRegistry::from_config(&[
            config("all", vec![]),
            config("markets", vec![SourceType::Market]),
        ])
        .unwrap();
        let for_post: Vec<_> = registry
            .applicable(SourceType::Post)
            .map(|e| e.id().to_string())
            .collect();
        let for_market: Vec<_> = registry
            .applicable(SourceType::Market)
            .map(|e| e.id().to_string())
            .collect();
        assert_eq!(for_post, vec!["all"]);
        assert_eq!(for_market, vec!["all", "markets"]);
        assert_eq!(registry.ids().len(), 2);
    }
}
