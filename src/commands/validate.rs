use super::{CommandConfig, CommandDescriptor};
use crate::error::ValidationError;
use crate::runner::variables::{check_references, is_variable_reference};

/// Check every raw value of `config` against its property descriptor.
///
/// * required properties must be non-blank
/// * selector properties must hold a declared option or a single `${name}`
///   reference (blank is allowed when the property is optional)
/// * every `${` must open a well-formed reference
///
/// All violations are collected, in descriptor order.
pub fn validate_config(
    descriptor: &CommandDescriptor,
    config: &CommandConfig,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for property in descriptor.properties {
        let value = config.get(property.key);
        let blank = value.trim().is_empty();

        if blank {
            if !property.optional {
                errors.push(ValidationError::MissingRequired {
                    property: property.key.to_string(),
                });
            }
            continue;
        }

        if let Err(fragment) = check_references(value) {
            log::debug!("malformed reference {} in '{}'", fragment, property.key);
            errors.push(ValidationError::MalformedVariable {
                property: property.key.to_string(),
                value: value.to_string(),
            });
            continue;
        }

        if property.is_selector()
            && !property.options.contains(&value)
            && !is_variable_reference(value)
        {
            errors.push(ValidationError::InvalidSelection {
                property: property.key.to_string(),
                value: value.to_string(),
                options: property.options.iter().map(|o| o.to_string()).collect(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check a resolved value against the property's option list.
pub fn check_selection(
    descriptor: &CommandDescriptor,
    key: &str,
    resolved: &str,
) -> Result<(), ValidationError> {
    let Some(property) = descriptor.property(key) else {
        return Err(ValidationError::UnknownProperty {
            property: key.to_string(),
        });
    };
    if !property.is_selector() || (property.optional && resolved.trim().is_empty()) {
        return Ok(());
    }
    if property.options.contains(&resolved) {
        Ok(())
    } else {
        Err(ValidationError::InvalidSelection {
            property: key.to_string(),
            value: resolved.to_string(),
            options: property.options.iter().map(|o| o.to_string()).collect(),
        })
    }
}
