use anyhow::Result;

use agora::collective::Collective;
use agora::config::AgoraConfig;

/// Record one verification of a stored pattern.
pub async fn verify(
    config: AgoraConfig,
    pattern_id: &str,
    contributor: &str,
    success: bool,
) -> Result<()> {
    let collective = Collective::open(config)?;
    match collective.engine.verify(pattern_id, contributor, success).await? {
        Some(pattern) => {
            println!(
                "Recorded {} from {contributor}",
                if success { "validation" } else { "invalidation" }
            );
            super::print_pattern(&pattern);
        }
        None => println!("Pattern not found: {pattern_id}"),
    }
    Ok(())
}
