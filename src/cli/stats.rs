use anyhow::Result;

use agora::collective::Collective;
use agora::config::AgoraConfig;

/// Display pattern statistics in the terminal.
pub async fn stats(config: AgoraConfig) -> Result<()> {
    let collective = Collective::open(config)?;
    let stats = collective.engine.statistics().await;

    println!("Pattern Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total patterns:      {}", stats.total_patterns);
    println!("  Average strength:    {:.3}", stats.average_strength);
    println!("  Emerging:            {}", stats.emerging_patterns);
    println!();

    if stats.top_domains.is_empty() {
        println!("Top domains:           (none)");
    } else {
        println!("Top domains:");
        for (rank, domain) in stats.top_domains.iter().enumerate() {
            println!("  {}. {}", rank + 1, domain);
        }
    }

    Ok(())
}
