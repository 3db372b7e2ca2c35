use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::ModelParameters;

/// One parameter write performed when an expression is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterEffect {
    pub parameter: String,
    pub magnitude: f32,
}

impl ParameterEffect {
    pub fn new(parameter: &str, magnitude: f32) -> Self {
        Self {
            parameter: parameter.to_string(),
            magnitude,
        }
    }
}

/// Data-driven mapping from expression tags to parameter effects. The set of
/// supported expressions is table content, not code.
#[derive(Debug, Clone, Default)]
pub struct ExpressionTable {
    effects: HashMap<String, Vec<ParameterEffect>>,
    // Union of every parameter any tag touches; reset clears all of them.
    parameters: Vec<String>,
}

impl ExpressionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The tag set of the shipped character (the nine tags its reply prompt
    /// allows): 祈祷 发光 翻花绳 好奇 泪 脸黑 脸红 生气 星星.
    pub fn character_default() -> Self {
        let mut table = Self::new();
        table.insert("祈祷", vec![ParameterEffect::new("ParamPray", 1.0)]);
        table.insert("发光", vec![ParameterEffect::new("ParamGlow", 1.0)]);
        table.insert("翻花绳", vec![ParameterEffect::new("ParamCatsCradle", 1.0)]);
        table.insert(
            "好奇",
            vec![
                ParameterEffect::new("ParamCurious", 1.0),
                ParameterEffect::new("ParamEyeOpen", 1.2),
            ],
        );
        table.insert(
            "泪",
            vec![
                ParameterEffect::new("ParamTear", 1.0),
                ParameterEffect::new("ParamSad", 0.8),
            ],
        );
        table.insert("脸黑", vec![ParameterEffect::new("ParamGloom", 1.0)]);
        table.insert(
            "脸红",
            vec![
                ParameterEffect::new("ParamBlush", 1.0),
                ParameterEffect::new("ParamCheek", 0.9),
            ],
        );
        table.insert(
            "生气",
            vec![
                ParameterEffect::new("ParamAngry", 1.0),
                ParameterEffect::new("ParamBrowAngerL", 0.8),
                ParameterEffect::new("ParamBrowAngerR", 0.8),
            ],
        );
        table.insert("星星", vec![ParameterEffect::new("ParamStarEyes", 1.0)]);
        table
    }

    pub fn insert(&mut self, tag: &str, effects: Vec<ParameterEffect>) {
        for effect in &effects {
            if !self.parameters.contains(&effect.parameter) {
                self.parameters.push(effect.parameter.clone());
            }
        }
        self.effects.insert(tag.to_string(), effects);
    }

    pub fn effects(&self, tag: &str) -> Option<&[ParameterEffect]> {
        self.effects.get(tag).map(|e| e.as_slice())
    }

    /// Every parameter any known tag touches.
    pub fn known_parameters(&self) -> &[String] {
        &self.parameters
    }
}

/// Discrete expression state on the model. Exactly one expression is ever
/// active; applying a tag always resets every known parameter first, so
/// expressions never blend.
pub struct ExpressionController {
    model: Arc<dyn ModelParameters>,
    table: ExpressionTable,
    current: Option<String>,
}

impl ExpressionController {
    pub fn new(model: Arc<dyn ModelParameters>, table: ExpressionTable) -> Self {
        Self {
            model,
            table,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Clears every known parameter to neutral (0.0) and commits. Leaves
    /// `current` untouched; only a successful `apply` moves it.
    pub fn reset(&self) {
        if !self.model.is_ready() {
            return;
        }
        for parameter in self.table.known_parameters() {
            self.model.set_parameter(parameter, 0.0);
        }
        self.model.commit_parameters();
    }

    /// Applies `tag`: reset, then set the tag's effects and commit. An empty
    /// tag just resets; an unknown tag logs and leaves the model neutral
    /// without changing `current`.
    pub fn apply(&mut self, tag: &str) {
        if !self.model.is_ready() {
            warn!(tag, "model not ready; dropping expression change");
            return;
        }
        if tag.is_empty() {
            self.reset();
            return;
        }

        self.reset();
        match self.table.effects(tag) {
            Some(effects) => {
                for effect in effects {
                    self.model.set_parameter(&effect.parameter, effect.magnitude);
                }
                self.model.commit_parameters();
                debug!(tag, "expression applied");
                self.current = Some(tag.to_string());
            }
            None => {
                warn!(tag, "unknown expression tag; model left neutral");
            }
        }
    }
}
