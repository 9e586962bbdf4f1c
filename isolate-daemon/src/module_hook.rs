//! The concrete `isolate_engine::ModuleLoaderHook` for this daemon: forwards
//! a load request to the client-registered module loader callback, if any
//! (spec.md §6 "Runtime options ... supply callbacks").

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use isolate_engine::{EngineError, LoadedModule, ModuleLoaderHook};
use isolate_protocol::{CallbackId, MarshalledValue};

use crate::callback_bridge::CallbackBridge;

pub struct ConnectionModuleLoader {
    bridge: CallbackBridge,
    callback_id: Option<CallbackId>,
}

impl ConnectionModuleLoader {
    #[must_use]
    pub fn new(bridge: CallbackBridge, callback_id: Option<CallbackId>) -> Self {
        Self { bridge, callback_id }
    }
}

impl ModuleLoaderHook for ConnectionModuleLoader {
    fn load(
        &self,
        specifier: &str,
        importer_resolve_dir: &str,
    ) -> Pin<Box<dyn Future<Output = Result<LoadedModule, EngineError>>>> {
        let Some(callback_id) = self.callback_id else {
            let specifier = specifier.to_owned();
            return Box::pin(async move {
                Err(EngineError::ModuleLoadFailed {
                    specifier,
                    message: "no module loader callback registered for this runtime".to_owned(),
                })
            });
        };

        let bridge = self.bridge.clone();
        let specifier = specifier.to_owned();
        let importer_resolve_dir = importer_resolve_dir.to_owned();

        Box::pin(async move {
            let arguments = vec![
                MarshalledValue::String(specifier.clone()),
                MarshalledValue::String(importer_resolve_dir),
            ];
            let result = bridge
                .invoke(callback_id, arguments)
                .await
                .map_err(|e| EngineError::ModuleLoadFailed {
                    specifier: specifier.clone(),
                    message: e.message,
                })?;

            let MarshalledValue::Record(fields) = result else {
                return Err(EngineError::ModuleLoadFailed {
                    specifier,
                    message: "module loader callback must resolve to {code, resolveDir}".to_owned(),
                });
            };
            read_loaded_module(&specifier, &fields)
        })
    }
}

fn read_loaded_module(
    specifier: &str,
    fields: &BTreeMap<String, MarshalledValue>,
) -> Result<LoadedModule, EngineError> {
    let code = match fields.get("code") {
        Some(MarshalledValue::String(code)) => code.clone(),
        _ => {
            return Err(EngineError::ModuleLoadFailed {
                specifier: specifier.to_owned(),
                message: "missing 'code' field".to_owned(),
            })
        }
    };
    let resolve_dir = match fields.get("resolveDir") {
        Some(MarshalledValue::String(dir)) => dir.clone(),
        _ => String::new(),
    };
    Ok(LoadedModule { code, resolve_dir })
}
