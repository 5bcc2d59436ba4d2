//! Definition checks. Pure functions, no engine access.

use crate::attribute_def::AttributeDefinition;
use crate::error::ValidationError;
use crate::ports::AttributeRecord;

const MAX_CODE_LENGTH: usize = 60;

/// Pre-flight validation, run before any schema mutation.
///
/// Store-specific attribute labels and options are rejected together: the
/// engine's option-creation path drops the attribute's store labels once
/// options are added.
pub fn validate(def: &AttributeDefinition) -> Result<(), ValidationError> {
    validate_code(&def.code)?;

    if def.default_label.trim().is_empty() {
        return Err(ValidationError::MissingDefaultLabel);
    }

    if !def.locale_labels.is_empty() && def.has_options() {
        return Err(ValidationError::ConflictingOptionLabelConfig);
    }

    Ok(())
}

fn validate_code(code: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidAttributeCode {
        code: code.to_string(),
        reason: reason.to_string(),
    };

    if code.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if code.len() > MAX_CODE_LENGTH {
        return Err(invalid("longer than 60 characters"));
    }
    if !code.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(invalid("must start with a lowercase letter"));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(invalid("only a-z, 0-9 and _ are allowed"));
    }
    Ok(())
}

/// Checks the stored attribute before options are attached to it.
pub fn check_option_target(attribute: &AttributeRecord) -> Result<(), ValidationError> {
    if let Some(source_model) = &attribute.source_model {
        return Err(ValidationError::SourceModelConflict {
            source_model: source_model.clone(),
        });
    }

    if !matches!(attribute.frontend_input.as_str(), "select" | "multiselect") {
        return Err(ValidationError::IncompatibleInputType {
            input: attribute.frontend_input.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_def::{AttributeSettings, InputType};
    use crate::ports::{AttributeId, EntityTypeId};

    fn record(input: &str, source_model: Option<&str>) -> AttributeRecord {
        AttributeRecord {
            attribute_id: AttributeId(1),
            entity_type_id: EntityTypeId(4),
            code: "color".into(),
            frontend_input: input.into(),
            source_model: source_model.map(String::from),
            frontend_labels: vec![],
            settings: AttributeSettings::default(),
        }
    }

    #[test]
    fn plain_definition_passes() {
        assert_eq!(validate(&AttributeDefinition::new("my_attribute", "My Attribute")), Ok(()));
    }

    #[test]
    fn labels_with_simple_options_conflict() {
        let mut def = AttributeDefinition::new("my_attribute", "My Attribute");
        def.input_type = InputType::Select;
        def.locale_labels.insert(1, "x");
        def.simple_option_values = vec!["y".into()];
        assert_eq!(validate(&def), Err(ValidationError::ConflictingOptionLabelConfig));
    }

    #[test]
    fn labels_with_localized_options_conflict() {
        let mut def = AttributeDefinition::new("my_attribute", "My Attribute");
        def.input_type = InputType::Select;
        def.locale_labels.insert(2, "x");
        def.localized_options = vec![[(0, "Default")].into_iter().collect()];
        assert_eq!(validate(&def), Err(ValidationError::ConflictingOptionLabelConfig));
    }

    #[test]
    fn labels_alone_or_options_alone_pass() {
        let mut labelled = AttributeDefinition::new("my_attribute", "My Attribute");
        labelled.locale_labels.insert(1, "Store1 Label");
        assert!(validate(&labelled).is_ok());

        let mut optioned = AttributeDefinition::new("my_attribute", "My Attribute");
        optioned.input_type = InputType::Select;
        optioned.simple_option_values = vec!["Value A".into()];
        assert!(validate(&optioned).is_ok());
    }

    #[test]
    fn bad_codes_rejected() {
        let too_long = "a".repeat(61);
        for code in ["", "My_Attribute", "1st", "with-dash", too_long.as_str()] {
            let def = AttributeDefinition::new(code, "Label");
            assert!(
                matches!(validate(&def), Err(ValidationError::InvalidAttributeCode { .. })),
                "code {code:?} should be rejected"
            );
        }
        assert!(validate(&AttributeDefinition::new("a".repeat(60), "Label")).is_ok());
    }

    #[test]
    fn blank_label_rejected() {
        let def = AttributeDefinition::new("my_attribute", "   ");
        assert_eq!(validate(&def), Err(ValidationError::MissingDefaultLabel));
    }

    #[test]
    fn option_target_checks_source_model_first() {
        let err = check_option_target(&record("text", Some("Vendor\\Source\\Color"))).unwrap_err();
        assert!(matches!(err, ValidationError::SourceModelConflict { .. }));
    }

    #[test]
    fn option_target_requires_select_input() {
        assert_eq!(
            check_option_target(&record("text", None)),
            Err(ValidationError::IncompatibleInputType {
                input: "text".into()
            })
        );
        assert!(check_option_target(&record("select", None)).is_ok());
        assert!(check_option_target(&record("multiselect", None)).is_ok());
    }
}
