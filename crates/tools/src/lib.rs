//! Built-in tool implementations for Stepwise.

pub mod calculator;

pub use calculator::CalculatorTool;

use stepwise_core::tool::ToolRegistry;

/// Create a tool registry with every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool));
    registry
}
