//! Module loader hook (spec.md §4.5): when the guest imports a specifier,
//! the bridge calls a registered loader callback with
//! `(specifier, importer-resolve-dir)`; the callback returns `{code,
//! resolveDir}` or throws. Compiled modules are memoised in the per-isolate
//! module cache (`isolate_core::Isolate::cache_module`/`cached_module`).

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use deno_core::error::ModuleLoaderError;
use deno_core::{ModuleLoadResponse, ModuleLoader, ModuleSource, ModuleSourceCode, ModuleSpecifier, ModuleType, RequestedModuleType, ResolutionKind};
use isolate_core::Isolate;

use crate::error::EngineError;

/// What a registered loader callback hands back for one specifier.
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub code: String,
    pub resolve_dir: String,
}

/// The host-side hook a guest's `module loader` callback is bridged
/// through. `isolate-daemon` supplies the concrete implementation
/// (forwarding to the client-registered callback over IPC); keeping this as
/// a trait lets `isolate-engine` stay decoupled from the transport.
pub trait ModuleLoaderHook {
    fn load(
        &self,
        specifier: &str,
        importer_resolve_dir: &str,
    ) -> Pin<Box<dyn Future<Output = Result<LoadedModule, EngineError>>>>;
}

/// Adapts a `ModuleLoaderHook` plus the owning isolate's module cache into
/// `deno_core`'s `ModuleLoader` trait.
pub struct GuestModuleLoader {
    hook: Rc<dyn ModuleLoaderHook>,
    isolate: Rc<RefCell<Isolate>>,
}

impl GuestModuleLoader {
    #[must_use]
    pub fn new(hook: Rc<dyn ModuleLoaderHook>, isolate: Rc<RefCell<Isolate>>) -> Self {
        Self { hook, isolate }
    }
}

impl ModuleLoader for GuestModuleLoader {
    fn resolve(
        &self,
        specifier: &str,
        referrer: &str,
        _kind: ResolutionKind,
    ) -> Result<ModuleSpecifier, ModuleLoaderError> {
        deno_core::resolve_import(specifier, referrer)
            .map_err(|e| ModuleLoaderError::Unsupported(Box::from(e.to_string())))
    }

    fn load(
        &self,
        module_specifier: &ModuleSpecifier,
        _maybe_referrer: Option<&ModuleSpecifier>,
        _is_dynamic: bool,
        _requested_module_type: RequestedModuleType,
    ) -> ModuleLoadResponse {
        let specifier = module_specifier.to_string();

        if let Some(cached) = self.isolate.borrow().cached_module(&specifier) {
            return ModuleLoadResponse::Sync(Ok(ModuleSource::new(
                ModuleType::JavaScript,
                ModuleSourceCode::String(cached.into()),
                module_specifier,
                None,
            )));
        }

        let hook = Rc::clone(&self.hook);
        let isolate = Rc::clone(&self.isolate);
        let import_dir = resolve_dir_of(module_specifier);
        let specifier_owned = specifier;
        let target = module_specifier.clone();

        ModuleLoadResponse::Async(Box::pin(async move {
            let loaded = hook
                .load(&specifier_owned, &import_dir)
                .await
                .map_err(|e| ModuleLoaderError::Unsupported(Box::from(e.to_string())))?;

            isolate.borrow_mut().cache_module(specifier_owned.clone(), loaded.code.clone());

            Ok(ModuleSource::new(
                ModuleType::JavaScript,
                ModuleSourceCode::String(loaded.code.into()),
                &target,
                None,
            ))
        }))
    }
}

fn resolve_dir_of(specifier: &ModuleSpecifier) -> String {
    let path = specifier.path();
    match path.rfind('/') {
        Some(index) => path[..index].to_owned(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct StaticHook {
        modules: Mutex<HashMap<String, LoadedModule>>,
    }

    impl ModuleLoaderHook for StaticHook {
        fn load(
            &self,
            specifier: &str,
            _importer_resolve_dir: &str,
        ) -> Pin<Box<dyn Future<Output = Result<LoadedModule, EngineError>>>> {
            let result = self
                .modules
                .lock()
                .unwrap()
                .get(specifier)
                .cloned()
                .ok_or_else(|| EngineError::ModuleLoadFailed {
                    specifier: specifier.to_owned(),
                    message: "not registered".to_owned(),
                });
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn unregistered_specifier_surfaces_a_module_load_error() {
        let hook = StaticHook {
            modules: Mutex::new(HashMap::new()),
        };
        let result = hook.load("file:///missing.js", "").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn registered_specifier_resolves_to_its_code() {
        let mut modules = HashMap::new();
        modules.insert(
            "file:///main.js".to_owned(),
            LoadedModule {
                code: "export const x = 1;".to_owned(),
                resolve_dir: "/".to_owned(),
            },
        );
        let hook = StaticHook {
            modules: Mutex::new(modules),
        };
        let loaded = hook.load("file:///main.js", "/").await.unwrap();
        assert_eq!(loaded.code, "export const x = 1;");
    }
}
