//! CLI `doctor` command: run database diagnostics and print a health report.

use anyhow::{Context, Result};

use agora::config::AgoraConfig;
use agora::db;

/// Run database diagnostics and print a health report.
pub fn doctor(config: &AgoraConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `agora replay <file>` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let conn = db::open_database(&db_path)
        .context("failed to open database (may be corrupt)")?;

    let report = db::check_database_health(&conn)
        .context("failed to run health check")?;

    println!("Agora Health Report");
    println!("===================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Row counts:");
    println!("  Patterns:        {}", report.pattern_count);
    println!("  Contributions:   {}", report.contribution_count);
    println!("  Observations:    {}", report.observation_count);
    println!("  Wisdom:          {}", report.wisdom_count);
    println!("  Learning log:    {}", report.learning_count);
    println!("  Field cache:     {}", report.field_cache_count);
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db ~/.agora/agora.db");
        println!("  2. Or move the damaged file aside; patterns re-emerge from new observations.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
