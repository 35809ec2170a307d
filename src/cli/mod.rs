pub mod doctor;
pub mod patterns;
pub mod replay;
pub mod stats;
pub mod verify;

use agora::emergence::types::Pattern;

/// One-line summary used by every command that lists patterns.
fn print_pattern(pattern: &Pattern) {
    println!(
        "[{}] {} ({}) strength {:.3}, {} verification(s)",
        pattern.id,
        pattern.element_key(),
        pattern.context_domain,
        pattern.strength,
        pattern.verification_count
    );
    println!("    {}", pattern.integration_wisdom);
}
