//! Embedded scripting runtime
//!
//! Named VMs built on rhai. Each VM keeps its scope between calls, so an
//! initialization script can define constants and state that later
//! expressions (e.g. from `script` meters) read.

use crate::config::ScriptConfig;
use crate::error::{Result, SeleneError};
use crate::logging::get_logger;
use rhai::{Dynamic, Engine, Scope};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const MAX_OPERATIONS: u64 = 1_000_000;

/// One named scripting context
pub struct ScriptVm {
    name: String,
    engine: Engine,
    scope: Mutex<Scope<'static>>,
}

impl std::fmt::Debug for ScriptVm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptVm").field("name", &self.name).finish()
    }
}

impl ScriptVm {
    fn new(name: &str) -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);

        let logger = get_logger(&format!("js-{}", name));
        engine.on_print(move |s| logger.info(s));

        Self {
            name: name.to_string(),
            engine,
            scope: Mutex::new(Scope::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run a script for its side effects on the VM scope
    pub fn run(&self, script: &str) -> Result<()> {
        let mut scope = self
            .scope
            .lock()
            .map_err(|_| SeleneError::script(format!("vm {}: scope poisoned", self.name)))?;
        self.engine.run_with_scope(&mut scope, script)?;
        Ok(())
    }

    /// Evaluate an expression and coerce the result to a number
    pub fn eval_f64(&self, expr: &str) -> Result<f64> {
        let value: Dynamic = {
            let mut scope = self
                .scope
                .lock()
                .map_err(|_| SeleneError::script(format!("vm {}: scope poisoned", self.name)))?;
            self.engine.eval_with_scope::<Dynamic>(&mut scope, expr)?
        };

        if let Ok(f) = value.as_float() {
            return Ok(f);
        }
        if let Ok(i) = value.as_int() {
            return Ok(i as f64);
        }
        if let Ok(b) = value.as_bool() {
            return Ok(if b { 1.0 } else { 0.0 });
        }
        Err(SeleneError::script(format!(
            "vm {}: expected number, got {}",
            self.name,
            value.type_name()
        )))
    }
}

/// Registry of named VMs, shared by everything configured after it
#[derive(Debug, Default)]
pub struct ScriptRuntime {
    vms: Mutex<HashMap<String, Arc<ScriptVm>>>,
}

impl ScriptRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the VM with the given name, creating it on first use
    pub fn vm(&self, name: &str) -> Result<Arc<ScriptVm>> {
        let mut vms = self
            .vms
            .lock()
            .map_err(|_| SeleneError::script("vm registry poisoned"))?;
        let vm = vms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ScriptVm::new(name)));
        Ok(Arc::clone(vm))
    }

    /// Look up an existing VM
    pub fn get(&self, name: &str) -> Option<Arc<ScriptVm>> {
        self.vms.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vms
            .lock()
            .map(|vms| vms.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Create every configured VM and run its initialization script
pub fn configure(configs: &[ScriptConfig]) -> Result<ScriptRuntime> {
    let runtime = ScriptRuntime::new();
    for cc in configs {
        let vm = runtime.vm(&cc.vm)?;
        if !cc.script.trim().is_empty() {
            vm.run(&cc.script)
                .map_err(|e| e.context(format!("vm {}", cc.vm)))?;
        }
    }
    Ok(runtime)
}
