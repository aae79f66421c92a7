//! # Ledger Events
//!
//! Events the bridge emits into the ledger's event stream: one summary event
//! per VM call plus one event per VM-emitted Move event.

use crate::domain::entities::JsonEvent;
use crate::domain::value_objects::{AccountAddress, Identifier, ModuleId};
use serde::{Deserialize, Serialize};

/// Event types and attribute keys.
pub mod keys {
    /// Summary event of an entry-function call.
    pub const EVENT_TYPE_EXECUTE: &str = "execute";
    /// Summary event of a script call.
    pub const EVENT_TYPE_SCRIPT: &str = "script";
    /// Event carrying one VM-emitted Move event.
    pub const EVENT_TYPE_MOVE: &str = "move";

    /// Call sender (repeated per sender).
    pub const ATTR_SENDER: &str = "sender";
    /// Module address.
    pub const ATTR_MODULE_ADDR: &str = "module_addr";
    /// Module name.
    pub const ATTR_MODULE_NAME: &str = "module_name";
    /// Function name.
    pub const ATTR_FUNCTION_NAME: &str = "function_name";
    /// Move event type tag.
    pub const ATTR_TYPE_TAG: &str = "type_tag";
    /// Raw JSON event data.
    pub const ATTR_DATA: &str = "data";
}

// =============================================================================
// LEDGER EVENT
// =============================================================================

/// A typed ledger event with ordered string attributes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    /// Event type.
    pub kind: String,
    /// Attributes, in emission order.
    pub attributes: Vec<(String, String)>,
}

impl LedgerEvent {
    /// Creates an event with no attributes.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Appends an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// First value of `key`, if present.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Summary event of one VM call.
    #[must_use]
    pub fn execute(senders: &[AccountAddress], module: &ModuleId, function: &Identifier) -> Self {
        let mut event = Self::new(keys::EVENT_TYPE_EXECUTE);
        for sender in senders {
            event = event.with_attribute(keys::ATTR_SENDER, sender.to_string());
        }
        event
            .with_attribute(keys::ATTR_MODULE_ADDR, module.address.to_string())
            .with_attribute(keys::ATTR_MODULE_NAME, module.name.as_str())
            .with_attribute(keys::ATTR_FUNCTION_NAME, function.as_str())
    }

    /// Summary event of one script call.
    #[must_use]
    pub fn script(senders: &[AccountAddress]) -> Self {
        senders
            .iter()
            .fold(Self::new(keys::EVENT_TYPE_SCRIPT), |event, sender| {
                event.with_attribute(keys::ATTR_SENDER, sender.to_string())
            })
    }

    /// Converts a VM event. Scalar top-level JSON fields are promoted to
    /// attributes; arrays and objects stay only in the raw `data` attribute.
    #[must_use]
    pub fn from_move_event(event: &JsonEvent) -> Self {
        let mut ledger_event = Self::new(keys::EVENT_TYPE_MOVE)
            .with_attribute(keys::ATTR_TYPE_TAG, event.type_tag.as_str())
            .with_attribute(keys::ATTR_DATA, event.event_data.as_str());

        if let Ok(serde_json::Value::Object(fields)) =
            serde_json::from_str::<serde_json::Value>(&event.event_data)
        {
            for (key, value) in fields {
                let promoted = match value {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    serde_json::Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                };
                if let Some(value) = promoted {
                    ledger_event = ledger_event.with_attribute(key, value);
                }
            }
        }
        ledger_event
    }
}

// =============================================================================
// EVENT MANAGER
// =============================================================================

/// Per-call collector of ledger events.
#[derive(Clone, Debug, Default)]
pub struct EventManager {
    events: Vec<LedgerEvent>,
}

impl EventManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one event.
    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    /// Emits several events in order.
    pub fn emit_all(&mut self, events: impl IntoIterator<Item = LedgerEvent>) {
        self.events.extend(events);
    }

    /// Events emitted so far.
    #[must_use]
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Events of the given type.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a LedgerEvent> + 'a {
        self.events.iter().filter(move |e| e.kind == kind)
    }

    /// Number of events emitted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if nothing was emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Consumes the manager.
    #[must_use]
    pub fn into_events(self) -> Vec<LedgerEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_event_promotes_scalars_only() {
        let event = JsonEvent::new(
            "0x1::coin::MintEvent",
            r#"{"account":"0x2","amount":"100","ok":true,"n":7,"list":[1,2],"inner":{"a":1},"none":null}"#,
        );
        let ledger = LedgerEvent::from_move_event(&event);

        assert_eq!(ledger.kind, "move");
        assert_eq!(ledger.attribute("type_tag"), Some("0x1::coin::MintEvent"));
        assert_eq!(ledger.attribute("account"), Some("0x2"));
        assert_eq!(ledger.attribute("amount"), Some("100"));
        assert_eq!(ledger.attribute("ok"), Some("true"));
        assert_eq!(ledger.attribute("n"), Some("7"));
        assert_eq!(ledger.attribute("list"), None);
        assert_eq!(ledger.attribute("inner"), None);
        assert_eq!(ledger.attribute("none"), None);
        assert!(ledger.attribute("data").unwrap().contains("\"list\""));
    }

    #[test]
    fn test_non_object_data_kept_raw() {
        let ledger = LedgerEvent::from_move_event(&JsonEvent::new("u64", "42"));
        assert_eq!(ledger.attributes.len(), 2);
        assert_eq!(ledger.attribute("data"), Some("42"));
    }

    #[test]
    fn test_execute_event_lists_every_sender() {
        let module = ModuleId::new(AccountAddress::ONE, Identifier::new("coin").unwrap());
        let function = Identifier::new("transfer").unwrap();
        let senders = [AccountAddress::ONE, AccountAddress::from_hex_literal("0x2").unwrap()];
        let event = LedgerEvent::execute(&senders, &module, &function);

        let sender_attrs: Vec<_> = event
            .attributes
            .iter()
            .filter(|(k, _)| k == "sender")
            .map(|(_, v)| v.as_str())
            .collect();
        assert_eq!(sender_attrs, vec!["0x1", "0x2"]);
        assert_eq!(event.attribute("module_name"), Some("coin"));
        assert_eq!(event.attribute("function_name"), Some("transfer"));
    }
}
