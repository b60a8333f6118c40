//! Check-config command implementation.

use colored::Colorize;
use goalsmith_models::ModelType;
use goalsmith_orchestrator::adapter::placement::InstructionPlacement;
use goalsmith_orchestrator::adapter::tool_calling;
use goalsmith_orchestrator::{AgentConfig, GoalsmithConfig};

const fn model_type_name(model_type: ModelType) -> &'static str {
    match model_type {
        ModelType::Mock => "mock",
        ModelType::Universal => "universal",
    }
}

fn print_agent(agent: &AgentConfig) {
    let capabilities = agent.capabilities();
    let placement = match InstructionPlacement::for_capability(capabilities.supports_system_prompt) {
        InstructionPlacement::Dedicated => "system message",
        InstructionPlacement::FoldedIntoFirstUser => "folded into first user turn",
    };
    let strategy = tool_calling::for_capability(capabilities.supports_tool_calling);

    println!("  {}", agent.role.as_str().bold());
    println!("    model:         {} ({})", agent.model_id, model_type_name(agent.model_type));
    println!("    instructions:  {placement}");
    println!("    tool calling:  {}", strategy.name());
    println!("    tools:         {}", agent.permitted_tools().join(", "));
    println!("    tool rounds:   {}", agent.max_tool_rounds);
    println!("    repairs:       {}", agent.max_repair_attempts);
}

/// Execute the check-config command. The configuration is already validated.
pub fn execute(config: &GoalsmithConfig) -> bool {
    println!("{}", "Configuration OK".green().bold());
    println!();
    println!("{}", "Agents".bold().cyan());
    print_agent(&config.agents.generator);
    print_agent(&config.agents.judge);
    println!();

    let pipeline = &config.pipeline;
    println!("{}", "Pipeline".bold().cyan());
    println!("  attempts per stage:  {}", pipeline.max_attempts);
    println!(
        "  backoff:             {}ms x{} up to {}ms",
        pipeline.initial_backoff_ms, pipeline.backoff_multiplier, pipeline.max_backoff_ms
    );
    println!("  stage timeout:       {}s", pipeline.stage_timeout_secs);
    println!("  concurrent runs:     {}", pipeline.max_concurrent_runs);
    println!("  tool timeout:        {}ms", config.tools.timeout_ms);
    println!("  score scale:         {} to {}", config.scoring.scale_min, config.scoring.scale_max);
    true
}
