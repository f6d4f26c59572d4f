use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::debug;

use spectriq_core::AxisUnit;
use spectriq_plugin_sdk::{
    ConfigDecl, Configuration, Dependency, DependencyKind, Field, FieldDecl, FieldDirection,
    FieldKind, FloatOptions, GraphKind, IntOptions, PluginKey,
};

/// Structural problems in a declared configuration, reported with the field
/// or rule that failed so plugin authors can act on them.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("field `{field}` declares unsupported datatype `{datatype}`")]
    UnknownDatatype { field: String, datatype: String },
    #[error("field `{field}` declares unknown direction `{direction}`")]
    UnknownDirection { field: String, direction: String },
    #[error("action field `{field}` declares no command")]
    ActionWithoutCommand { field: String },
    #[error("enumerated field `{field}` declares no choices")]
    EnumeratedWithoutChoices { field: String },
    #[error("field `{field}` is declared more than once")]
    DuplicateField { field: String },
    #[error("field `{field}` has an unusable default: {detail}")]
    BadDefault { field: String, detail: String },
    #[error("field `{field}` declares min above max")]
    InvalidBounds { field: String },
    #[error("unsupported graph type `{graph_type}`")]
    UnknownGraphType { graph_type: String },
    #[error("dependency `{key}` declares unknown kind `{kind}`")]
    UnknownDependencyKind { key: String, kind: String },
}

/// Normalize and type-check a declared configuration.
///
/// Everything downstream of selection acts on the returned
/// [`Configuration`]; the raw declaration is never consulted again. The
/// pass folds datatype and direction aliases to their canonical forms,
/// forces the directions that are the only meaningful choice for their
/// kind, defaults the display name from the plugin identifier, normalizes
/// the graph type, and classifies the x-axis label.
pub fn validate(key: &PluginKey, decl: &ConfigDecl) -> Result<Configuration, ValidationError> {
    let display_name = decl
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| key.to_string());

    let mut fields = Vec::new();
    let mut seen = HashSet::new();
    let mut commands = HashMap::new();

    let declared = decl
        .fields
        .iter()
        .map(|field| (None, field))
        .chain(decl.pages.iter().flat_map(|page| {
            page.fields
                .iter()
                .map(move |field| (Some(page.title.clone()), field))
        }));

    for (page, raw) in declared {
        let field = validate_field(page, raw)?;
        if !seen.insert(field.name.clone()) {
            return Err(ValidationError::DuplicateField { field: field.name });
        }
        if let (FieldKind::Action, Some(command)) = (&field.kind, &field.command) {
            commands.insert(field.name.clone(), command.clone());
        }
        fields.push(field);
    }

    let graph_kind = match decl.graph_type.as_deref() {
        None => GraphKind::Line,
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "line" => GraphKind::Line,
            "xy" => GraphKind::Xy,
            _ => {
                return Err(ValidationError::UnknownGraphType {
                    graph_type: raw.to_string(),
                })
            }
        },
    };

    let mut dependencies = Vec::new();
    for dependency in &decl.dependencies {
        let kind = match dependency.kind.trim().to_ascii_lowercase().as_str() {
            "existing_directory" | "directory" | "dir" => DependencyKind::ExistingDirectory,
            "existing_file" | "file" => DependencyKind::ExistingFile,
            other => {
                return Err(ValidationError::UnknownDependencyKind {
                    key: dependency.key.clone(),
                    kind: other.to_string(),
                })
            }
        };
        dependencies.push(Dependency {
            key: dependency.key.clone(),
            kind,
        });
    }

    let x_label = decl.x_label.clone().unwrap_or_default();
    let y_label = decl.y_label.clone().unwrap_or_default();
    let axis_unit = AxisUnit::classify(&x_label);
    debug!(
        "validated configuration for {key}: {} fields, axis {}",
        fields.len(),
        axis_unit.label()
    );

    Ok(Configuration {
        display_name,
        fields,
        streaming: decl.streaming,
        is_blocking: decl.is_blocking,
        block_host: decl.block_host,
        multi_device: decl.multi_device,
        has_aux_graph: decl.has_aux_graph,
        graph_kind,
        series_names: decl.series_names.clone(),
        x_label,
        y_label,
        axis_unit,
        dependencies,
        commands,
    })
}

fn validate_field(page: Option<String>, raw: &FieldDecl) -> Result<Field, ValidationError> {
    let kind = coerce_kind(raw)?;

    // Table and action-like fields only make sense in one direction; the
    // declared direction is ignored for them.
    let direction = match kind {
        FieldKind::Table => FieldDirection::Output,
        FieldKind::Action | FieldKind::Enumerated { .. } => FieldDirection::Input,
        _ => match raw.direction.as_deref() {
            None => FieldDirection::Input,
            Some(raw_direction) => match raw_direction.trim().to_ascii_lowercase().as_str() {
                "input" | "in" => FieldDirection::Input,
                "output" | "out" => FieldDirection::Output,
                other => {
                    return Err(ValidationError::UnknownDirection {
                        field: raw.name.clone(),
                        direction: other.to_string(),
                    })
                }
            },
        },
    };

    if matches!(kind, FieldKind::Action) && raw.command.is_none() {
        return Err(ValidationError::ActionWithoutCommand {
            field: raw.name.clone(),
        });
    }

    let label = raw
        .label
        .as_deref()
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| raw.name.clone());

    let value = kind.default_value();

    Ok(Field {
        name: raw.name.clone(),
        label,
        page,
        kind,
        direction,
        value,
        command: raw.command.clone(),
    })
}

fn coerce_kind(raw: &FieldDecl) -> Result<FieldKind, ValidationError> {
    let unknown = || ValidationError::UnknownDatatype {
        field: raw.name.clone(),
        datatype: raw.datatype.clone(),
    };

    match raw.datatype.trim().to_ascii_lowercase().as_str() {
        "str" | "string" | "text" => Ok(FieldKind::Text {
            default: default_text(raw)?,
        }),
        "int" | "integer" | "long" => {
            let (min, max) = int_bounds(raw)?;
            Ok(FieldKind::Int(IntOptions {
                default: default_int(raw, min, max)?,
                min,
                max,
                step: raw.step.map(|step| step as i64),
            }))
        }
        "float" | "double" | "number" | "real" => {
            let (min, max) = float_bounds(raw)?;
            Ok(FieldKind::Float(FloatOptions {
                default: default_float(raw, min, max)?,
                min,
                max,
                step: raw.step,
            }))
        }
        "bool" | "boolean" => Ok(FieldKind::Toggle {
            default: default_bool(raw)?,
        }),
        "action" | "button" | "trigger" => Ok(FieldKind::Action),
        "table" | "grid" => Ok(FieldKind::Table),
        "enum" | "enumerated" | "choice" | "select" => {
            if raw.choices.is_empty() {
                return Err(ValidationError::EnumeratedWithoutChoices {
                    field: raw.name.clone(),
                });
            }
            Ok(FieldKind::Enumerated {
                choices: raw.choices.clone(),
                default: default_choice(raw)?,
            })
        }
        _ => Err(unknown()),
    }
}

fn float_bounds(raw: &FieldDecl) -> Result<(Option<f64>, Option<f64>), ValidationError> {
    if let (Some(min), Some(max)) = (raw.min, raw.max) {
        if min > max {
            return Err(ValidationError::InvalidBounds {
                field: raw.name.clone(),
            });
        }
    }
    Ok((raw.min, raw.max))
}

fn int_bounds(raw: &FieldDecl) -> Result<(Option<i64>, Option<i64>), ValidationError> {
    let (min, max) = float_bounds(raw)?;
    Ok((min.map(|v| v as i64), max.map(|v| v as i64)))
}

fn default_text(raw: &FieldDecl) -> Result<String, ValidationError> {
    match &raw.default {
        None => Ok(String::new()),
        Some(serde_json::Value::String(text)) => Ok(text.clone()),
        Some(other) => Err(bad_default(raw, format!("expected a string, got {other}"))),
    }
}

fn default_int(
    raw: &FieldDecl,
    min: Option<i64>,
    max: Option<i64>,
) -> Result<i64, ValidationError> {
    let value = match &raw.default {
        None => min.unwrap_or(0),
        Some(serde_json::Value::Number(number)) => number
            .as_i64()
            .ok_or_else(|| bad_default(raw, format!("{number} is not an integer")))?,
        Some(other) => return Err(bad_default(raw, format!("expected an integer, got {other}"))),
    };
    if min.map_or(false, |min| value < min) || max.map_or(false, |max| value > max) {
        return Err(bad_default(raw, format!("{value} is outside the bounds")));
    }
    Ok(value)
}

fn default_float(
    raw: &FieldDecl,
    min: Option<f64>,
    max: Option<f64>,
) -> Result<f64, ValidationError> {
    let value = match &raw.default {
        None => min.unwrap_or(0.0),
        Some(serde_json::Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| bad_default(raw, format!("{number} is not representable")))?,
        Some(other) => return Err(bad_default(raw, format!("expected a number, got {other}"))),
    };
    if min.map_or(false, |min| value < min) || max.map_or(false, |max| value > max) {
        return Err(bad_default(raw, format!("{value} is outside the bounds")));
    }
    Ok(value)
}

fn default_bool(raw: &FieldDecl) -> Result<bool, ValidationError> {
    match &raw.default {
        None => Ok(false),
        Some(serde_json::Value::Bool(value)) => Ok(*value),
        Some(other) => Err(bad_default(raw, format!("expected a bool, got {other}"))),
    }
}

fn default_choice(raw: &FieldDecl) -> Result<usize, ValidationError> {
    match &raw.default {
        None => Ok(0),
        Some(serde_json::Value::Number(number)) => {
            let index = number
                .as_u64()
                .ok_or_else(|| bad_default(raw, format!("{number} is not an index")))?
                as usize;
            if index >= raw.choices.len() {
                return Err(bad_default(raw, format!("index {index} has no choice")));
            }
            Ok(index)
        }
        Some(serde_json::Value::String(choice)) => raw
            .choices
            .iter()
            .position(|candidate| candidate == choice)
            .ok_or_else(|| bad_default(raw, format!("`{choice}` is not among the choices"))),
        Some(other) => Err(bad_default(
            raw,
            format!("expected a choice name or index, got {other}"),
        )),
    }
}

fn bad_default(raw: &FieldDecl, detail: String) -> ValidationError {
    ValidationError::BadDefault {
        field: raw.name.clone(),
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use spectriq_plugin_sdk::{DependencyDecl, PageDecl};

    fn key() -> PluginKey {
        PluginKey::new("spectriq", "unit-under-test")
    }

    #[test]
    fn display_name_defaults_to_identifier() {
        let config = validate(&key(), &ConfigDecl::new()).expect("valid");
        assert_eq!(config.display_name, "spectriq.unit-under-test");

        let named = validate(&key(), &ConfigDecl::new().with_name("  Peak Finder  ")).expect("valid");
        assert_eq!(named.display_name, "Peak Finder");
    }

    #[test]
    fn datatype_aliases_fold_to_canonical_kinds() {
        let decl = ConfigDecl::new()
            .with_field(FieldDecl::new("a", "Double"))
            .with_field(FieldDecl::new("b", " str "))
            .with_field(FieldDecl::new("c", "Boolean"))
            .with_field(FieldDecl::new("d", "integer"));
        let config = validate(&key(), &decl).expect("valid");
        assert!(matches!(config.field("a").unwrap().kind, FieldKind::Float(_)));
        assert!(matches!(
            config.field("b").unwrap().kind,
            FieldKind::Text { .. }
        ));
        assert!(matches!(
            config.field("c").unwrap().kind,
            FieldKind::Toggle { .. }
        ));
        assert!(matches!(config.field("d").unwrap().kind, FieldKind::Int(_)));
    }

    #[test]
    fn unsupported_datatype_is_rejected_by_name() {
        let decl = ConfigDecl::new().with_field(FieldDecl::new("weird", "complex"));
        match validate(&key(), &decl) {
            Err(ValidationError::UnknownDatatype { field, .. }) => assert_eq!(field, "weird"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn forced_directions_override_declarations() {
        let decl = ConfigDecl::new()
            .with_field(FieldDecl::new("grid", "table").with_direction("input"))
            .with_field(
                FieldDecl::new("fire", "action")
                    .with_direction("output")
                    .with_command("fire"),
            )
            .with_field(
                FieldDecl::new("mode", "enum")
                    .with_direction("output")
                    .with_choices(vec!["fast".into(), "slow".into()]),
            );
        let config = validate(&key(), &decl).expect("valid");
        assert_eq!(config.field("grid").unwrap().direction, FieldDirection::Output);
        assert_eq!(config.field("fire").unwrap().direction, FieldDirection::Input);
        assert_eq!(config.field("mode").unwrap().direction, FieldDirection::Input);
    }

    #[test]
    fn action_without_command_is_rejected() {
        let decl = ConfigDecl::new().with_field(FieldDecl::new("go", "action"));
        match validate(&key(), &decl) {
            Err(ValidationError::ActionWithoutCommand { field }) => assert_eq!(field, "go"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn enumerated_without_choices_is_rejected() {
        let decl = ConfigDecl::new().with_field(FieldDecl::new("mode", "enum"));
        match validate(&key(), &decl) {
            Err(ValidationError::EnumeratedWithoutChoices { field }) => assert_eq!(field, "mode"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn pages_flatten_but_keep_their_tag() {
        let decl = ConfigDecl::new()
            .with_field(FieldDecl::new("top", "float"))
            .with_page(PageDecl::new("Advanced").with_field(FieldDecl::new("inner", "float")));
        let config = validate(&key(), &decl).expect("valid");
        assert_eq!(config.fields.len(), 2);
        assert_eq!(config.field("top").unwrap().page, None);
        assert_eq!(
            config.field("inner").unwrap().page.as_deref(),
            Some("Advanced")
        );
    }

    #[test]
    fn duplicate_names_across_pages_are_rejected() {
        let decl = ConfigDecl::new()
            .with_field(FieldDecl::new("width", "float"))
            .with_page(PageDecl::new("More").with_field(FieldDecl::new("width", "int")));
        assert!(matches!(
            validate(&key(), &decl),
            Err(ValidationError::DuplicateField { .. })
        ));
    }

    #[test]
    fn graph_type_is_normalized() {
        let config = validate(&key(), &ConfigDecl::new().with_graph_type("  XY ")).expect("valid");
        assert_eq!(config.graph_kind, GraphKind::Xy);
        assert!(matches!(
            validate(&key(), &ConfigDecl::new().with_graph_type("scatter")),
            Err(ValidationError::UnknownGraphType { .. })
        ));
    }

    #[test]
    fn axis_label_is_classified() {
        let config = validate(
            &key(),
            &ConfigDecl::new().with_x_label("Raman shift [cm-1]"),
        )
        .expect("valid");
        assert_eq!(config.axis_unit, AxisUnit::Wavenumber);
    }

    #[test]
    fn dependencies_are_normalized() {
        let decl = ConfigDecl::new()
            .with_dependency(DependencyDecl::existing_directory("export_dir"))
            .with_dependency(DependencyDecl {
                key: "calibration".into(),
                kind: "File".into(),
            });
        let config = validate(&key(), &decl).expect("valid");
        assert_eq!(config.dependencies[0].kind, DependencyKind::ExistingDirectory);
        assert_eq!(config.dependencies[1].kind, DependencyKind::ExistingFile);
    }

    #[test]
    fn action_fields_feed_the_command_table() {
        let decl = ConfigDecl::new()
            .with_field(FieldDecl::new("capture", "button").with_command("capture_dark"));
        let config = validate(&key(), &decl).expect("valid");
        assert_eq!(config.commands.get("capture").map(String::as_str), Some("capture_dark"));
    }

    #[test]
    fn defaults_are_typed_and_bounded() {
        let decl = ConfigDecl::new().with_field(
            FieldDecl::new("width", "int")
                .with_bounds(1.0, 9.0)
                .with_default(serde_json::json!(25)),
        );
        assert!(matches!(
            validate(&key(), &decl),
            Err(ValidationError::BadDefault { .. })
        ));
    }
}
