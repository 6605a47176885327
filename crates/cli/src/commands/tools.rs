//! `ponder tools` — List the tools the agent can call.

use ponder_core::tool::ToolDescriptor;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let registry = ponder_tools::default_registry();

    println!("🔧 Registered Tools ({})", registry.len());
    println!("======================");
    for descriptor in registry.descriptors() {
        println!();
        for line in describe(descriptor) {
            println!("  {line}");
        }
    }
    Ok(())
}

fn describe(d: &ToolDescriptor) -> Vec<String> {
    let retries = if d.retryable { d.max_retries } else { 0 };
    let mut lines = vec![
        format!("{} v{} [{}]", d.name, d.version, d.category),
        format!("  {}", d.description),
        format!("  timeout {}ms, retries {}", d.timeout_ms, retries),
    ];
    for p in &d.parameters {
        let optional = if p.required { "" } else { ", optional" };
        lines.push(format!(
            "  - {} ({}{optional}): {}",
            p.name,
            p.param_type.schema_name().unwrap_or("any"),
            p.description
        ));
    }
    lines
}
