#![allow(dead_code)]

use std::collections::BTreeMap;

use chrono::Local;
use runjob::config::{DepsConfig, JobConfig, StepConfig, StepKind};
use runjob::dag::step::StepInfo;
use runjob::engine::StepKey;
use runjob::vars::VarEnv;

/// Builder for `JobConfig` to simplify test setup.
pub struct JobConfigBuilder {
    variables: BTreeMap<String, String>,
    steps: BTreeMap<String, StepConfig>,
}

impl JobConfigBuilder {
    pub fn new() -> Self {
        Self {
            variables: BTreeMap::new(),
            steps: BTreeMap::new(),
        }
    }

    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        self.variables.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_step(mut self, key: &str, step: StepConfig) -> Self {
        self.steps.insert(key.to_string(), step);
        self
    }

    pub fn build(self) -> JobConfig {
        JobConfig {
            variables: self.variables,
            steps: self.steps,
        }
    }
}

impl Default for JobConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StepConfig`.
pub struct StepConfigBuilder {
    step: StepConfig,
}

impl StepConfigBuilder {
    pub fn os(task: &str) -> Self {
        Self {
            step: StepConfig {
                kind: StepKind::Os,
                task: task.to_string(),
                name: String::new(),
                dependencies: None,
                enabled: true,
                resultcode_allowed: vec![0],
                detail: BTreeMap::new(),
                simulate: false,
                comment: None,
            },
        }
    }

    pub fn internal(task: &str) -> Self {
        let mut builder = Self::os(task);
        builder.step.kind = StepKind::Internal;
        builder
    }

    pub fn name(mut self, name: &str) -> Self {
        self.step.name = name.to_string();
        self
    }

    pub fn dep(mut self, key: &str) -> Self {
        match &mut self.step.dependencies {
            Some(DepsConfig::Keys(keys)) => keys.push(key.to_string()),
            _ => {
                self.step.dependencies = Some(DepsConfig::Keys(vec![key.to_string()]));
            }
        }
        self
    }

    pub fn all_deps(mut self) -> Self {
        self.step.dependencies = Some(DepsConfig::Sentinel("ALL".to_string()));
        self
    }

    pub fn enabled(mut self, value: bool) -> Self {
        self.step.enabled = value;
        self
    }

    pub fn simulate(mut self, value: bool) -> Self {
        self.step.simulate = value;
        self
    }

    pub fn allow_codes(mut self, codes: &[i32]) -> Self {
        self.step.resultcode_allowed = codes.to_vec();
        self
    }

    pub fn detail_str(mut self, field: &str, value: &str) -> Self {
        self.step.detail.insert(
            field.to_string(),
            serde_json::Value::String(value.to_string()),
        );
        self
    }

    pub fn detail_num(mut self, field: &str, value: u64) -> Self {
        self.step
            .detail
            .insert(field.to_string(), serde_json::Value::from(value));
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}

/// Environment with the required mail variables filled in.
pub fn test_env() -> VarEnv {
    test_env_with(BTreeMap::new())
}

pub fn test_env_with(mut config_vars: BTreeMap<String, String>) -> VarEnv {
    config_vars
        .entry("mail_to".to_string())
        .or_insert_with(|| "ops@example.com".to_string());
    config_vars
        .entry("mail_to_fail".to_string())
        .or_insert_with(|| "oncall@example.com".to_string());
    VarEnv::load(
        "test.conf.json",
        Local::now(),
        config_vars,
        BTreeMap::new(),
        BTreeMap::new(),
    )
}

/// Resolve and validate a config the way `run()` does.
pub fn resolve(cfg: &JobConfig) -> BTreeMap<StepKey, StepInfo> {
    let env = test_env_with(cfg.variables.clone());
    let steps = runjob::dag::resolve_steps(cfg, &env).expect("steps should resolve");
    runjob::config::validate::validate_steps(&steps).expect("steps should validate");
    steps
}
