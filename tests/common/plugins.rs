use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use switchyard::registry::{CommandContext, Plugin, PluginFactoryRegistry, PluginSettings};

/// Counters shared by every instance built from the same factory
#[derive(Debug, Default)]
pub struct LifecycleCounters {
    pub initialized: AtomicUsize,
    pub shut_down: AtomicUsize,
    pub commands: AtomicUsize,
}

impl LifecycleCounters {
    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn shut_down(&self) -> usize {
        self.shut_down.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }
}

/// Well-behaved plugin that echoes commands and counts lifecycle calls
pub struct RecorderPlugin {
    settings: PluginSettings,
    counters: Arc<LifecycleCounters>,
}

impl RecorderPlugin {
    pub fn new(settings: PluginSettings, counters: Arc<LifecycleCounters>) -> Self {
        Self { settings, counters }
    }
}

impl Plugin for RecorderPlugin {
    fn initialize(&self) -> bool {
        self.counters.initialized.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn shutdown(&self) {
        self.counters.shut_down.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_command(&self, command: &str, context: &CommandContext) -> anyhow::Result<Value> {
        self.counters.commands.fetch_add(1, Ordering::SeqCst);
        Ok(json!({
            "command": command,
            "intent": context.get("intent").cloned().unwrap_or(Value::Null),
            "settings": self.settings,
        }))
    }
}

/// Faults in the hook named by `stage`
pub struct FaultyPlugin {
    stage: &'static str,
}

impl Plugin for FaultyPlugin {
    fn initialize(&self) -> bool {
        match self.stage {
            "initialize_panic" => panic!("initialize exploded"),
            "initialize_false" => false,
            _ => true,
        }
    }

    fn shutdown(&self) {
        if self.stage == "shutdown_panic" {
            panic!("shutdown exploded");
        }
    }

    fn handle_command(&self, _command: &str, _context: &CommandContext) -> anyhow::Result<Value> {
        match self.stage {
            "command_panic" => panic!("command exploded"),
            _ => anyhow::bail!("command refused"),
        }
    }
}

/// Register the factories the test manifests reference
///
/// Returns the counters shared by `test.Recorder` instances.
pub fn register_test_factories(factories: &PluginFactoryRegistry) -> Arc<LifecycleCounters> {
    let counters = Arc::new(LifecycleCounters::default());
    let shared = counters.clone();
    factories.register("test.Recorder", move |settings| {
        Ok(Arc::new(RecorderPlugin::new(settings.clone(), shared.clone())))
    });

    for stage in [
        "initialize_panic",
        "initialize_false",
        "shutdown_panic",
        "command_panic",
        "command_error",
    ] {
        factories.register(format!("test.Faulty.{stage}"), move |_| {
            Ok(Arc::new(FaultyPlugin { stage }))
        });
    }

    factories.register("test.ConstructorPanics", |_| -> anyhow::Result<Arc<dyn Plugin>> {
        panic!("constructor exploded")
    });
    factories.register("test.ConstructorFails", |_| -> anyhow::Result<Arc<dyn Plugin>> {
        anyhow::bail!("missing api key")
    });

    counters
}
