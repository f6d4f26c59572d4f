use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use spectriq_core::AxisUnit;

use crate::fields::{Field, FieldDirection, FieldValue};

/// Raw configuration as declared by a plugin.
///
/// This is what [`ProcessorPlugin::configuration`](crate::ProcessorPlugin::configuration)
/// returns. It is deliberately loose (datatypes are free-form strings,
/// directions are optional) and must pass through the host's validator
/// before anything acts on it. Declarations can be deserialized from JSON
/// manifests or built in code through the `with_*` helpers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDecl {
    /// Display name; defaulted from the plugin identifier when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Fields declared at the top level.
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    /// Fields grouped into display pages. Pages scope display only; names
    /// must stay unique across the flattened set.
    #[serde(default)]
    pub pages: Vec<PageDecl>,
    /// Receive every new reading, not only manual triggers.
    #[serde(default)]
    pub streaming: bool,
    /// Allow only one in-flight request at a time.
    #[serde(default)]
    pub is_blocking: bool,
    /// Host thread waits synchronously for each response.
    #[serde(default)]
    pub block_host: bool,
    /// Accept readings originating from non-selected instruments.
    #[serde(default)]
    pub multi_device: bool,
    #[serde(default)]
    pub has_aux_graph: bool,
    /// Graph rendering style; `line` or `xy`, normalized by the validator.
    #[serde(default)]
    pub graph_type: Option<String>,
    #[serde(default)]
    pub series_names: Vec<String>,
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default)]
    pub y_label: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
}

impl ConfigDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_page(mut self, page: PageDecl) -> Self {
        self.pages.push(page);
        self
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn blocking(mut self, blocking: bool) -> Self {
        self.is_blocking = blocking;
        self
    }

    pub fn block_host(mut self, block: bool) -> Self {
        self.block_host = block;
        self
    }

    pub fn multi_device(mut self, multi: bool) -> Self {
        self.multi_device = multi;
        self
    }

    pub fn with_graph_type(mut self, graph_type: impl Into<String>) -> Self {
        self.graph_type = Some(graph_type.into());
        self
    }

    pub fn with_series(mut self, name: impl Into<String>) -> Self {
        self.series_names.push(name.into());
        self
    }

    pub fn with_x_label(mut self, label: impl Into<String>) -> Self {
        self.x_label = Some(label.into());
        self
    }

    pub fn with_y_label(mut self, label: impl Into<String>) -> Self {
        self.y_label = Some(label.into());
        self
    }

    pub fn with_dependency(mut self, dependency: DependencyDecl) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

/// A display page grouping declared fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageDecl {
    pub title: String,
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
}

impl PageDecl {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: FieldDecl) -> Self {
        self.fields.push(field);
        self
    }
}

/// Raw field declaration; the validator coerces `datatype` and `direction`
/// into their canonical enums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    /// Free-form datatype marker, e.g. `"float"`, `"double"`, `"str"`.
    pub datatype: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub choices: Vec<String>,
    /// Command dispatched when an action field fires. Required for actions.
    #[serde(default)]
    pub command: Option<String>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            datatype: datatype.into(),
            direction: None,
            default: None,
            min: None,
            max: None,
            step: None,
            choices: Vec::new(),
            command: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.direction = Some(direction.into());
        self
    }

    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = choices;
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

/// Raw dependency declaration, e.g. `{"key": "export_dir", "kind": "existing_directory"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyDecl {
    pub key: String,
    pub kind: String,
}

impl DependencyDecl {
    pub fn existing_directory(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: "existing_directory".to_string(),
        }
    }

    pub fn existing_file(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: "existing_file".to_string(),
        }
    }
}

/// Graph rendering style for declared series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphKind {
    /// Flat Y sequences plotted against the active axis.
    Line,
    /// Explicit X/Y pairs.
    Xy,
}

/// Canonical dependency kinds the host knows how to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    ExistingDirectory,
    ExistingFile,
}

/// A validated dependency a plugin needs satisfied before connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub key: String,
    pub kind: DependencyKind,
}

/// Validated, normalized configuration. Only the host's validator produces
/// these; everything downstream (controller, worker, UI) acts on this form
/// and never on a raw [`ConfigDecl`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub display_name: String,
    /// Flattened field set; pages survive only as each field's `page` tag.
    pub fields: Vec<Field>,
    pub streaming: bool,
    pub is_blocking: bool,
    pub block_host: bool,
    pub multi_device: bool,
    pub has_aux_graph: bool,
    pub graph_kind: GraphKind,
    pub series_names: Vec<String>,
    pub x_label: String,
    pub y_label: String,
    /// Classification of `x_label`, for default-axis selection.
    pub axis_unit: AxisUnit,
    pub dependencies: Vec<Dependency>,
    /// Action dispatch table: field name to the command it fires.
    pub commands: HashMap<String, String>,
}

impl Configuration {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|field| field.name == name)
    }

    /// Current values of every value-bearing field, as dispatched inside a
    /// request.
    pub fn value_snapshot(&self) -> HashMap<String, FieldValue> {
        self.fields
            .iter()
            .filter_map(|field| {
                field
                    .value
                    .as_ref()
                    .map(|value| (field.name.clone(), value.clone()))
            })
            .collect()
    }

    /// Names of input-direction fields, in declaration order.
    pub fn input_names(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|field| field.direction == FieldDirection::Input)
            .map(|field| field.name.as_str())
            .collect()
    }
}
