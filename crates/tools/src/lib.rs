//! Built-in capability providers for Ponder.
//!
//! These tools give the reasoning loop something real to call: arithmetic,
//! currency conversion, weather, and the clock. None of them touch the
//! host (no shell, files, or network), so the default registry is safe to
//! hand to any model.

pub mod calculator;
pub mod clock;
pub mod currency;
pub mod weather_lookup;

use std::sync::Arc;

use ponder_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use clock::CurrentTimeTool;
pub use currency::CurrencyConverterTool;
pub use weather_lookup::WeatherLookupTool;

/// Create a registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    // Built-in names are distinct, so registration cannot collide.
    for tool in [
        Arc::new(CalculatorTool::new()) as Arc<dyn ponder_core::Tool>,
        Arc::new(CurrencyConverterTool::new()),
        Arc::new(WeatherLookupTool::new()),
        Arc::new(CurrentTimeTool::new()),
    ] {
        if let Err(e) = registry.register(tool) {
            tracing::warn!(error = %e, "Skipping built-in tool");
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_builtins() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec!["calculator", "convertCurrency", "current_time", "weather_lookup"]
        );
    }

    #[test]
    fn manifest_entries_are_object_schemas() {
        for def in default_registry().definitions() {
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }
}
