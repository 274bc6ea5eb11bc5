// Live telemetry table
//
// Values are written by key into one named table; the last write wins. The
// table itself is pluggable: zenoh for the running robot, memory for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, warn};
use zenoh::Wait;

use crate::config::LIVE_TABLE;
use crate::messages::LiveValue;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Telemetry transport error on {key}: {reason}")]
    Transport { key: String, reason: String },

    #[error("Failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A named key/value table
pub trait TelemetryTable: Send + Sync {
    fn name(&self) -> &str;

    fn set_double(&self, key: &str, value: f64) -> Result<(), TelemetryError>;

    fn set_boolean(&self, key: &str, value: bool) -> Result<(), TelemetryError>;
}

/// Table kept in process memory
#[derive(Debug, Default)]
pub struct MemoryTable {
    name: String,
    entries: Mutex<HashMap<String, LiveValue>>,
}

impl MemoryTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<LiveValue> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: &str, value: LiveValue) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}

impl TelemetryTable for MemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_double(&self, key: &str, value: f64) -> Result<(), TelemetryError> {
        self.insert(key, LiveValue::Number(value));
        Ok(())
    }

    fn set_boolean(&self, key: &str, value: bool) -> Result<(), TelemetryError> {
        self.insert(key, LiveValue::Boolean(value));
        Ok(())
    }
}

/// Table published over zenoh, one key expression per entry
pub struct ZenohTable {
    name: String,
    session: zenoh::Session,
}

impl ZenohTable {
    pub fn new(session: zenoh::Session, name: &str) -> Self {
        Self {
            name: name.to_string(),
            session,
        }
    }

    fn put(&self, key: &str, value: LiveValue) -> Result<(), TelemetryError> {
        let payload = serde_json::to_string(&value).map_err(|source| TelemetryError::Encode {
            key: key.to_string(),
            source,
        })?;
        let key_expr = format!("{}/{}", self.name, key);
        self.session
            .put(key_expr, payload)
            .wait()
            .map_err(|e| TelemetryError::Transport {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

impl TelemetryTable for ZenohTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_double(&self, key: &str, value: f64) -> Result<(), TelemetryError> {
        self.put(key, LiveValue::Number(value))
    }

    fn set_boolean(&self, key: &str, value: bool) -> Result<(), TelemetryError> {
        self.put(key, LiveValue::Boolean(value))
    }
}

/// Writes live values into a telemetry table
#[derive(Clone)]
pub struct LiveGraph {
    table: Arc<dyn TelemetryTable>,
}

impl LiveGraph {
    pub fn new(table: Arc<dyn TelemetryTable>) -> Self {
        Self { table }
    }

    pub fn table_name(&self) -> &str {
        self.table.name()
    }

    pub fn add_number(&self, key: &str, value: f64) {
        if let Err(e) = self.table.set_double(key, value) {
            warn!("Failed to publish {}: {}", key, e);
        }
    }

    pub fn add_bool(&self, key: &str, value: bool) {
        if let Err(e) = self.table.set_boolean(key, value) {
            warn!("Failed to publish {}: {}", key, e);
        }
    }
}

static GLOBAL: RwLock<Option<LiveGraph>> = RwLock::new(None);

/// Process-wide live graph, bound to an in-memory table on first use
pub fn global() -> LiveGraph {
    if let Some(graph) = GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return graph.clone();
    }

    let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    slot.get_or_insert_with(|| {
        debug!("Binding live graph to in-memory table {}", LIVE_TABLE);
        LiveGraph::new(Arc::new(MemoryTable::new(LIVE_TABLE)))
    })
    .clone()
}

/// Point the process-wide live graph at `table`
pub fn bind(table: Arc<dyn TelemetryTable>) {
    debug!("Binding live graph to table {}", table.name());
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = Some(LiveGraph::new(table));
}

/// Drop the process-wide binding; the next `global()` binds afresh
pub fn unbind() {
    *GLOBAL.write().unwrap_or_else(PoisonError::into_inner) = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenTable;

    impl TelemetryTable for BrokenTable {
        fn name(&self) -> &str {
            "broken"
        }

        fn set_double(&self, key: &str, _value: f64) -> Result<(), TelemetryError> {
            Err(TelemetryError::Transport {
                key: key.to_string(),
                reason: "down".to_string(),
            })
        }

        fn set_boolean(&self, key: &str, _value: bool) -> Result<(), TelemetryError> {
            Err(TelemetryError::Transport {
                key: key.to_string(),
                reason: "down".to_string(),
            })
        }
    }

    #[test]
    fn test_last_write_wins() {
        let table = Arc::new(MemoryTable::new(LIVE_TABLE));
        let graph = LiveGraph::new(table.clone());

        graph.add_number("x", 3.5);
        graph.add_number("x", 4.0);
        assert_eq!(table.get("x"), Some(LiveValue::Number(4.0)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_bool_overwrites_number() {
        let table = Arc::new(MemoryTable::new(LIVE_TABLE));
        let graph = LiveGraph::new(table.clone());

        graph.add_number("enabled", 1.0);
        graph.add_bool("enabled", true);
        assert_eq!(table.get("enabled"), Some(LiveValue::Boolean(true)));
        assert_eq!(table.get("missing"), None);
    }

    #[test]
    fn test_transport_errors_are_swallowed() {
        let graph = LiveGraph::new(Arc::new(BrokenTable));
        graph.add_number("x", 1.0);
        graph.add_bool("y", false);
        assert_eq!(graph.table_name(), "broken");
    }

    // Single test for the global so parallel tests don't race on it
    #[test]
    fn test_global_lifecycle() {
        unbind();
        assert_eq!(global().table_name(), LIVE_TABLE);

        let table = Arc::new(MemoryTable::new("rebound"));
        bind(table.clone());
        global().add_number("position", 12.0);
        assert_eq!(global().table_name(), "rebound");
        assert_eq!(table.get("position"), Some(LiveValue::Number(12.0)));

        unbind();
        global().add_number("position", 13.0);
        assert_eq!(table.get("position"), Some(LiveValue::Number(12.0)));
        assert_eq!(global().table_name(), LIVE_TABLE);
    }
}
