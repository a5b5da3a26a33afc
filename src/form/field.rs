use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::expression::Expression;

/// Position of an element within a template.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ElementIndex {
    #[serde(default)]
    pub section: u32,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub element: u32,
}

impl ElementIndex {
    pub fn new(section: u32, page: u32, element: u32) -> Self {
        Self {
            section,
            page,
            element,
        }
    }

    pub fn page_key(&self) -> (u32, u32) {
        (self.section, self.page)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub code: String,
    #[serde(default)]
    pub plugin_code: String,
    #[serde(default)]
    pub index: ElementIndex,
    /// Literal parameters pass through, expressions are evaluated.
    #[serde(default)]
    pub parameters: BTreeMap<String, Expression>,
    #[serde(default = "always")]
    pub is_visible: Expression,
    #[serde(default = "always")]
    pub is_editable: Expression,
    #[serde(default = "never")]
    pub is_required: Expression,
    #[serde(default)]
    pub validation: Option<Expression>,
    #[serde(default)]
    pub validation_message: Option<String>,
    #[serde(default, rename = "default")]
    pub default_value: Option<Expression>,
}

fn always() -> Expression {
    Expression::literal(true)
}

fn never() -> Expression {
    Expression::literal(false)
}

impl FieldDefinition {
    pub fn new(code: &str, plugin_code: &str) -> Self {
        Self {
            code: code.to_string(),
            plugin_code: plugin_code.to_string(),
            index: ElementIndex::default(),
            parameters: BTreeMap::new(),
            is_visible: always(),
            is_editable: always(),
            is_required: never(),
            validation: None,
            validation_message: None,
            default_value: None,
        }
    }

    pub fn at(mut self, index: ElementIndex) -> Self {
        self.index = index;
        self
    }

    pub fn with_parameter(mut self, name: &str, value: Expression) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    pub fn required(mut self, is_required: Expression) -> Self {
        self.is_required = is_required;
        self
    }

    pub fn visible(mut self, is_visible: Expression) -> Self {
        self.is_visible = is_visible;
        self
    }

    pub fn editable(mut self, is_editable: Expression) -> Self {
        self.is_editable = is_editable;
        self
    }

    pub fn with_validation(mut self, validation: Expression, message: &str) -> Self {
        self.validation = Some(validation);
        self.validation_message = Some(message.to_string());
        self
    }

    pub fn with_default(mut self, default_value: Expression) -> Self {
        self.default_value = Some(default_value);
        self
    }

    /// Parameters that need the evaluator.
    pub fn dynamic_parameters(&self) -> impl Iterator<Item = (&str, &Expression)> {
        self.parameters
            .iter()
            .filter(|(_, value)| !value.is_literal())
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Every expression slot, named as in the template.
    pub fn expressions(&self) -> Vec<(String, &Expression)> {
        let mut slots = vec![
            ("isVisible".to_string(), &self.is_visible),
            ("isEditable".to_string(), &self.is_editable),
            ("isRequired".to_string(), &self.is_required),
        ];
        if let Some(validation) = &self.validation {
            slots.push(("validation".to_string(), validation));
        }
        if let Some(default_value) = &self.default_value {
            slots.push(("default".to_string(), default_value));
        }
        for (name, value) in &self.parameters {
            slots.push((format!("parameters.{}", name), value));
        }
        slots
    }
}
