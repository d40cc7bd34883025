use crate::output::schema::PipelineSpec;
use crate::validation::rules::{
    EntrypointRunsArtifactRule, FixedArtifactPathsRule, NoToolchainInProductionRule,
    PinnedImagesRule, ReleaseBuildRule, RequiredFieldsRule, ValidationRule,
};
use anyhow::Result;

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Box<dyn ValidationRule>>) -> Self {
        Self { rules }
    }

    pub fn validate(&self, spec: &PipelineSpec) -> Result<()> {
        for rule in &self.rules {
            if let Err(e) = rule.validate(spec) {
                anyhow::bail!("[{}] {}", rule.name(), e);
            }
        }
        Ok(())
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            rules: vec![
                Box::new(RequiredFieldsRule),
                Box::new(ReleaseBuildRule),
                Box::new(PinnedImagesRule),
                Box::new(NoToolchainInProductionRule),
                Box::new(FixedArtifactPathsRule),
                Box::new(EntrypointRunsArtifactRule),
            ],
        }
    }
}
