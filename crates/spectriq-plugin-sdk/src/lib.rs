//! Spectriq Plugin SDK
//! ===================
//!
//! Contract and vocabulary for externally-authored Spectriq processing
//! plugins. A plugin declares its configuration (fields, flags, graph
//! layout) through [`ConfigDecl`], implements the [`ProcessorPlugin`]
//! lifecycle hooks, and exchanges [`PluginRequest`]/[`PluginResponse`]
//! messages with the hosting engine. Factories registered through
//! [`PluginModule`] let the host instantiate plugins by stable identifier,
//! either in-process or from a dynamic library exporting the entry point
//! declared with [`declare_spectriq_plugins!`].

mod config;
mod fields;
mod plugin;
mod protocol;
mod registry;

pub use config::{
    ConfigDecl, Configuration, Dependency, DependencyDecl, DependencyKind, FieldDecl, GraphKind,
    PageDecl,
};
pub use fields::{
    Field, FieldDirection, FieldError, FieldKind, FieldValue, FloatOptions, IntOptions,
};
pub use plugin::{HostInfo, ProcessorPlugin};
pub use protocol::{OverrideTarget, PluginRequest, PluginResponse, SeriesData, TablePayload};
pub use registry::{PluginExport, PluginFactory, PluginKey, PluginModule};

/// Common imports for plugin authors.
pub mod prelude {
    pub use crate::{
        ConfigDecl, Configuration, FieldDecl, FieldDirection, FieldKind, FieldValue, GraphKind,
        HostInfo, OverrideTarget, PluginFactory, PluginKey, PluginModule, PluginRequest,
        PluginResponse, ProcessorPlugin, SeriesData, TablePayload,
    };
    pub use spectriq_core::{
        AcquisitionSettings, AxisUnit, DeviceRef, RecordEvent, SpectralReading,
    };
}

/// Declare the plugin entry point for a dynamic Spectriq plugin module.
///
/// The macro expects one or more expressions that evaluate to types
/// implementing [`PluginFactory`]. Each factory will be registered within
/// the exported [`PluginModule`].
///
/// # Example
///
/// ```ignore
/// use spectriq_plugin_sdk::{declare_spectriq_plugins, PluginFactory, PluginModule};
///
/// struct MyFactory;
///
/// impl PluginFactory for MyFactory { /* ... */ }
///
/// declare_spectriq_plugins!(MyFactory);
/// ```
#[macro_export]
macro_rules! declare_spectriq_plugins {
    ($($factory:expr),+ $(,)?) => {
        #[no_mangle]
        pub extern "C" fn spectriq_plugin_entrypoint() -> $crate::PluginExport {
            let mut module = $crate::PluginModule::new();
            $(module.register_factory(Box::new($factory));)+
            $crate::PluginExport::new(module)
        }
    };
}
