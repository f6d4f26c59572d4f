use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, info};

use spectriq_plugin_sdk::{ConfigDecl, PluginExport, PluginFactory, PluginKey, ProcessorPlugin};

use crate::error::HostError;

/// Signature of the canonical entry point exported by dynamic plugin
/// modules (`spectriq_plugin_entrypoint`, declared via the SDK macro).
pub type PluginEntryPoint = extern "C" fn() -> PluginExport;

const ENTRY_SYMBOL: &[u8] = b"spectriq_plugin_entrypoint\0";

/// Where a plugin's code comes from.
///
/// Discovery (scanning directories, reading manifests) lives in the
/// application; the loader is only handed the outcome: an identifier plus a
/// way to obtain instances.
pub enum PluginSource {
    /// An in-process factory, typically from a statically linked plugin
    /// crate.
    Factory(Box<dyn PluginFactory>),
    /// A dynamic library exporting the canonical entry point.
    Library(PathBuf),
}

/// A loaded plugin: identifier, declared configuration, and the live
/// instance. Created once per identifier and cached for the lifetime of the
/// loader, so re-selecting a previously visited plugin never re-runs its
/// initialization.
pub struct PluginUnit {
    key: PluginKey,
    declaration: ConfigDecl,
    instance: Arc<Mutex<Box<dyn ProcessorPlugin>>>,
    // Keeps the backing dynamic library alive for as long as the instance.
    _library: Option<Arc<Library>>,
}

impl PluginUnit {
    pub fn key(&self) -> &PluginKey {
        &self.key
    }

    /// The raw configuration the plugin declared at load time.
    pub fn declaration(&self) -> &ConfigDecl {
        &self.declaration
    }

    /// Shared handle to the plugin instance. After a session connects, only
    /// the worker thread touches it.
    pub(crate) fn instance(&self) -> Arc<Mutex<Box<dyn ProcessorPlugin>>> {
        Arc::clone(&self.instance)
    }
}

impl std::fmt::Debug for PluginUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginUnit").field("key", &self.key).finish()
    }
}

/// Resolves plugin identifiers to loadable units, lazily and with caching.
///
/// All failure modes (a missing source, a library without the entry
/// point, a factory that panics) are converted into [`HostError::Load`]
/// diagnostics; nothing raised by plugin code escapes this boundary.
#[derive(Default)]
pub struct UnitLoader {
    sources: HashMap<PluginKey, PluginSource>,
    cache: HashMap<PluginKey, Arc<PluginUnit>>,
}

impl UnitLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-process factory under its own key.
    pub fn register_factory(&mut self, factory: Box<dyn PluginFactory>) {
        let key = factory.key();
        debug!("registered plugin factory {key}");
        self.sources.insert(key, PluginSource::Factory(factory));
    }

    /// Register a dynamic library as the source for `key`.
    pub fn register_library(&mut self, key: PluginKey, path: impl AsRef<Path>) {
        debug!("registered plugin library {key} at {}", path.as_ref().display());
        self.sources
            .insert(key, PluginSource::Library(path.as_ref().to_path_buf()));
    }

    /// Register an arbitrary source under `key`, as handed over by the
    /// application's discovery step.
    pub fn register(&mut self, key: PluginKey, source: PluginSource) {
        self.sources.insert(key, source);
    }

    /// Identifiers the loader can currently resolve.
    pub fn keys(&self) -> Vec<PluginKey> {
        self.sources.keys().cloned().collect()
    }

    /// Drop the cached unit for `key`, forcing the next load to
    /// re-instantiate it.
    pub fn invalidate(&mut self, key: &PluginKey) {
        self.cache.remove(key);
    }

    /// Resolve `key` to its unit, instantiating on first use.
    pub fn load(&mut self, key: &PluginKey) -> Result<Arc<PluginUnit>, HostError> {
        if let Some(unit) = self.cache.get(key) {
            debug!("plugin {key} served from cache");
            return Ok(Arc::clone(unit));
        }

        let source = self.sources.get(key).ok_or_else(|| HostError::Load {
            key: key.clone(),
            reason: "no registered source for this identifier".to_string(),
        })?;

        let (instance, library) = match source {
            PluginSource::Factory(factory) => (instantiate(key, factory.as_ref())?, None),
            PluginSource::Library(path) => {
                let (factory, library) = load_library_factory(key, path)?;
                (instantiate(key, factory.as_ref())?, Some(library))
            }
        };

        let declaration = catch_unwind(AssertUnwindSafe(|| instance.configuration())).map_err(
            |payload| HostError::Load {
                key: key.clone(),
                reason: format!("configuration hook panicked: {}", describe_panic(payload.as_ref())),
            },
        )?;

        let unit = Arc::new(PluginUnit {
            key: key.clone(),
            declaration,
            instance: Arc::new(Mutex::new(instance)),
            _library: library,
        });
        info!("loaded plugin {key}");
        self.cache.insert(key.clone(), Arc::clone(&unit));
        Ok(unit)
    }
}

fn instantiate(
    key: &PluginKey,
    factory: &dyn PluginFactory,
) -> Result<Box<dyn ProcessorPlugin>, HostError> {
    catch_unwind(AssertUnwindSafe(|| factory.create())).map_err(|payload| HostError::Load {
        key: key.clone(),
        reason: format!("factory panicked: {}", describe_panic(payload.as_ref())),
    })
}

fn load_library_factory(
    key: &PluginKey,
    path: &Path,
) -> Result<(Box<dyn PluginFactory>, Arc<Library>), HostError> {
    if !path.exists() {
        return Err(HostError::Load {
            key: key.clone(),
            reason: format!("plugin binary not found at {}", path.display()),
        });
    }

    let library = unsafe { Library::new(path) }.map_err(|err| HostError::Load {
        key: key.clone(),
        reason: format!("failed to open {}: {err}", path.display()),
    })?;
    let entry = unsafe { library.get::<PluginEntryPoint>(ENTRY_SYMBOL) }.map_err(|_| {
        HostError::Load {
            key: key.clone(),
            reason: format!(
                "{} does not export spectriq_plugin_entrypoint",
                path.display()
            ),
        }
    })?;

    let export = catch_unwind(AssertUnwindSafe(|| entry())).map_err(|payload| HostError::Load {
        key: key.clone(),
        reason: format!("module entry point panicked: {}", describe_panic(payload.as_ref())),
    })?;

    let factory = export
        .into_module()
        .into_factories()
        .into_iter()
        .find(|factory| &factory.key() == key)
        .ok_or_else(|| HostError::Load {
            key: key.clone(),
            reason: format!("module at {} does not provide this plugin", path.display()),
        })?;

    Ok((factory, Arc::new(library)))
}

/// Best-effort text for a panic payload.
pub(crate) fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use spectriq_plugin_sdk::{ConfigDecl, HostInfo, PluginRequest, PluginResponse};

    struct InertPlugin;

    impl ProcessorPlugin for InertPlugin {
        fn configuration(&self) -> ConfigDecl {
            ConfigDecl::new().with_name("Inert")
        }

        fn connect(&mut self, _host: &HostInfo) -> anyhow::Result<bool> {
            Ok(true)
        }

        fn process_request(&mut self, request: &PluginRequest) -> anyhow::Result<PluginResponse> {
            Ok(PluginResponse::for_request(request.id))
        }

        fn disconnect(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct InertFactory;

    impl PluginFactory for InertFactory {
        fn key(&self) -> PluginKey {
            PluginKey::new("test", "inert")
        }

        fn create(&self) -> Box<dyn ProcessorPlugin> {
            Box::new(InertPlugin)
        }
    }

    struct PanickingFactory;

    impl PluginFactory for PanickingFactory {
        fn key(&self) -> PluginKey {
            PluginKey::new("test", "explosive")
        }

        fn create(&self) -> Box<dyn ProcessorPlugin> {
            panic!("constructor blew up");
        }
    }

    #[test]
    fn caches_units_per_key() {
        let mut loader = UnitLoader::new();
        loader.register_factory(Box::new(InertFactory));
        let key = PluginKey::new("test", "inert");
        let first = loader.load(&key).expect("first load");
        let second = loader.load(&key).expect("second load");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unknown_key_is_a_load_error() {
        let mut loader = UnitLoader::new();
        let err = loader.load(&PluginKey::new("test", "ghost")).unwrap_err();
        assert!(matches!(err, HostError::Load { .. }));
    }

    #[test]
    fn factory_panic_is_contained() {
        let mut loader = UnitLoader::new();
        loader.register_factory(Box::new(PanickingFactory));
        let err = loader
            .load(&PluginKey::new("test", "explosive"))
            .unwrap_err();
        match err {
            HostError::Load { reason, .. } => assert!(reason.contains("constructor blew up")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalidate_forces_reinstantiation() {
        let mut loader = UnitLoader::new();
        loader.register_factory(Box::new(InertFactory));
        let key = PluginKey::new("test", "inert");
        let first = loader.load(&key).expect("first load");
        loader.invalidate(&key);
        let second = loader.load(&key).expect("reload");
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
