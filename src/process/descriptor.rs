use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::handler::Handler;
use super::value::{Value, ValueType};
use crate::error::{FinchError, Result};

/// A declared input of a process.
#[derive(Debug, Clone, PartialEq)]
pub struct InputParameter {
    pub name: String,
    pub value_type: ValueType,
    pub required: bool,
    pub default: Option<Value>,
    /// Maximum number of occurrences accepted for this input.
    pub max_occurs: usize,
    /// When set, every supplied value must be one of these.
    pub allowed_values: Option<Vec<Value>>,
}

impl InputParameter {
    pub fn required(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: true,
            default: None,
            max_occurs: 1,
            allowed_values: None,
        }
    }

    pub fn optional(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            required: false,
            ..Self::required(name, value_type)
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_max_occurs(mut self, max_occurs: usize) -> Self {
        self.max_occurs = max_occurs;
        self
    }

    pub fn with_allowed_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// A declared output of a process.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputParameter {
    pub name: String,
    pub value_type: ValueType,
    /// Delivered as a staged artifact location rather than inline data.
    pub as_reference: bool,
}

impl OutputParameter {
    pub fn literal(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            as_reference: false,
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: ValueType::Reference,
            as_reference: true,
        }
    }
}

/// Immutable description of a registered process and its handler.
#[derive(Clone)]
pub struct ProcessDescriptor {
    pub id: String,
    pub title: String,
    pub version: String,
    pub abstract_text: String,
    pub inputs: Vec<InputParameter>,
    pub outputs: Vec<OutputParameter>,
    pub max_duration: Option<Duration>,
    handler: Arc<dyn Handler>,
}

impl ProcessDescriptor {
    pub fn builder(id: impl Into<String>) -> ProcessBuilder {
        ProcessBuilder::new(id)
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }

    pub fn input(&self, name: &str) -> Option<&InputParameter> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputParameter> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

impl fmt::Debug for ProcessDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessDescriptor")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("max_duration", &self.max_duration)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ProcessDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.version == other.version
            && self.abstract_text == other.abstract_text
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.max_duration == other.max_duration
            && Arc::ptr_eq(&self.handler, &other.handler)
    }
}

pub struct ProcessBuilder {
    id: String,
    title: Option<String>,
    version: String,
    abstract_text: String,
    inputs: Vec<InputParameter>,
    outputs: Vec<OutputParameter>,
    max_duration: Option<Duration>,
}

impl ProcessBuilder {
    fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            version: "1.0".to_string(),
            abstract_text: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            max_duration: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn abstract_text(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = text.into();
        self
    }

    pub fn input(mut self, input: InputParameter) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: OutputParameter) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Finishes the descriptor, checking that its parameter lists are coherent.
    pub fn handler(self, handler: impl Handler + 'static) -> Result<ProcessDescriptor> {
        self.handler_arc(Arc::new(handler))
    }

    pub fn handler_arc(self, handler: Arc<dyn Handler>) -> Result<ProcessDescriptor> {
        let invalid = |reason: String| FinchError::InvalidDescriptor {
            process: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("identifier must not be empty".into()));
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert(input.name.as_str()) {
                return Err(invalid(format!("duplicate input '{}'", input.name)));
            }
            if input.max_occurs == 0 {
                return Err(invalid(format!("input '{}' has max_occurs of 0", input.name)));
            }
            if let Some(default) = &input.default
                && default.coerce(input.value_type).is_none()
            {
                return Err(invalid(format!(
                    "default of '{}' is not a {}",
                    input.name, input.value_type
                )));
            }
        }

        let mut seen = HashSet::new();
        for output in &self.outputs {
            if !seen.insert(output.name.as_str()) {
                return Err(invalid(format!("duplicate output '{}'", output.name)));
            }
        }

        Ok(ProcessDescriptor {
            title: self.title.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            version: self.version,
            abstract_text: self.abstract_text,
            inputs: self.inputs,
            outputs: self.outputs,
            max_duration: self.max_duration,
            handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::handler::{HandlerContext, HandlerOutput, handler_fn};

    fn noop() -> impl Handler {
        handler_fn(|_ctx: HandlerContext| async { Ok(Vec::<HandlerOutput>::new()) })
    }

    #[test]
    fn builder_defaults_title_to_id() {
        let d = ProcessDescriptor::builder("subset_gridpoint")
            .input(InputParameter::required("lat", ValueType::Float))
            .handler(noop())
            .unwrap();
        assert_eq!(d.title, "subset_gridpoint");
        assert_eq!(d.version, "1.0");
        assert!(d.input("lat").unwrap().required);
    }

    #[test]
    fn duplicate_input_is_rejected() {
        let err = ProcessDescriptor::builder("p")
            .input(InputParameter::required("a", ValueType::Integer))
            .input(InputParameter::optional("a", ValueType::Float))
            .handler(noop())
            .unwrap_err();
        assert!(matches!(err, FinchError::InvalidDescriptor { .. }));
    }

    #[test]
    fn default_must_match_type() {
        let err = ProcessDescriptor::builder("p")
            .input(InputParameter::optional("lon0", ValueType::Float).with_default("zero"))
            .handler(noop())
            .unwrap_err();
        assert!(err.to_string().contains("default of 'lon0'"));

        // Integer defaults widen to float parameters.
        ProcessDescriptor::builder("p")
            .input(InputParameter::optional("lon0", ValueType::Float).with_default(0i64))
            .handler(noop())
            .unwrap();
    }

    #[test]
    fn empty_identifier_is_rejected() {
        assert!(ProcessDescriptor::builder("  ").handler(noop()).is_err());
    }

    #[test]
    fn clones_compare_equal() {
        let d = ProcessDescriptor::builder("p").handler(noop()).unwrap();
        assert_eq!(d.clone(), d);

        let other = ProcessDescriptor::builder("p").handler(noop()).unwrap();
        assert_ne!(d, other);
    }
}
