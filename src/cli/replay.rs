//! CLI `replay` command: feed recorded interactions through the engine.

use anyhow::{Context, Result};
use std::path::Path;

use agora::collective::Collective;
use agora::config::AgoraConfig;
use agora::emergence::types::Interaction;

/// Replay a JSON Lines file of interactions and report what emerged.
pub async fn replay(config: AgoraConfig, path: &Path) -> Result<()> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let collective = Collective::open(config)?;

    let mut observed = 0usize;
    let mut promoted = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let interaction: Interaction = serde_json::from_str(line)
            .with_context(|| format!("invalid interaction on line {}", line_no + 1))?;
        observed += 1;
        if let Some(pattern) = collective.engine.process_interaction(interaction).await {
            promoted.push(pattern);
        }
    }
    promoted.extend(collective.engine.sweep().await);

    println!("Replayed {observed} interaction(s)");
    println!("Candidates still emerging: {}", collective.engine.candidate_count());
    println!();

    if promoted.is_empty() {
        println!("No patterns promoted.");
    } else {
        println!("Promoted {} pattern(s):", promoted.len());
        for pattern in &promoted {
            super::print_pattern(pattern);
        }
    }
    println!();

    println!("Mailbox deliveries:");
    for agent in collective.bus.agents() {
        let delivered = collective.bus.receive(&agent);
        println!("  {:<18} {}", agent, delivered.len());
    }

    Ok(())
}
