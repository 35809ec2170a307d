use anyhow::Result;

use agora::collective::Collective;
use agora::config::AgoraConfig;
use agora::emergence::types::PatternCriteria;

/// List stored patterns matching the filters, strongest first.
pub async fn patterns(config: AgoraConfig, criteria: PatternCriteria) -> Result<()> {
    let collective = Collective::open(config)?;
    let found = collective.engine.find_relevant(&criteria).await?;

    if found.is_empty() {
        println!("No patterns found.");
        return Ok(());
    }

    println!("Found {} pattern(s)\n", found.len());
    for pattern in &found {
        super::print_pattern(pattern);
    }
    Ok(())
}
