//! Charset and card stock listings (`x029 charsets`, `x029 cards`).

use anyhow::Result;
use keypunch::{CardImageRegistry, Charset, PunchEncoding};

pub fn charsets() -> Result<()> {
    println!("Available charsets:");
    for cs in Charset::all() {
        println!("  - {}: {}", cs.name(), cs.description());
    }
    Ok(())
}

pub fn cards() -> Result<()> {
    println!("Available card stock:");
    for img in CardImageRegistry::list() {
        println!("  - {}: {}", img.name, img.description);
        for field in img.fields {
            println!("      {:>2}-{:>2}: {}", field.start, field.end, field.label);
        }
    }
    Ok(())
}
