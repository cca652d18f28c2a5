use super::descriptor::ProcessDescriptor;
use super::value::Inputs;
use crate::error::{FinchError, Result};

/// Checks `inputs` against the descriptor and returns the bound inputs.
///
/// Supplied values are coerced to their declared type and absent optional
/// inputs receive their default. The first offending parameter is reported.
pub fn bind_inputs(descriptor: &ProcessDescriptor, inputs: &Inputs) -> Result<Inputs> {
    if let Some(unknown) = inputs.names().find(|name| descriptor.input(name).is_none()) {
        return Err(FinchError::invalid_input(
            unknown,
            format!("not declared by process '{}'", descriptor.id),
        ));
    }

    let mut bound = Inputs::new();
    for param in &descriptor.inputs {
        let supplied = inputs.get_all(&param.name);

        if supplied.is_empty() {
            if let Some(default) = &param.default {
                // Defaults were checked when the descriptor was built.
                let value = default.coerce(param.value_type).unwrap_or_else(|| default.clone());
                bound.set(param.name.clone(), vec![value]);
            } else if param.required {
                return Err(FinchError::invalid_input(&param.name, "missing required input"));
            }
            continue;
        }

        if supplied.len() > param.max_occurs {
            return Err(FinchError::invalid_input(
                &param.name,
                format!(
                    "supplied {} times, at most {} allowed",
                    supplied.len(),
                    param.max_occurs
                ),
            ));
        }

        let mut values = Vec::with_capacity(supplied.len());
        for value in supplied {
            let coerced = value.coerce(param.value_type).ok_or_else(|| {
                FinchError::invalid_input(
                    &param.name,
                    format!("expected {}, got {}", param.value_type, value.value_type()),
                )
            })?;
            if let Some(allowed) = &param.allowed_values
                && !allowed.iter().any(|a| a.coerce(param.value_type).as_ref() == Some(&coerced))
            {
                return Err(FinchError::invalid_input(
                    &param.name,
                    format!("value '{coerced}' is not allowed"),
                ));
            }
            values.push(coerced);
        }
        bound.set(param.name.clone(), values);
    }

    Ok(bound)
}
