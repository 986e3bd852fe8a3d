use crate::context::Context;
use anyhow::Result;
use colored::*;

pub fn stats(ctx: &Context) -> Result<i32> {
    let stats = ctx.cache.stats()?;
    println!("{}", "Cache Statistics".bold().underline());
    println!("  Path:            {}", ctx.cache.path().display());
    println!("  Total entries:   {}", stats.total_entries);
    println!("  Active entries:  {}", stats.active_entries);
    println!("  Expired entries: {}", stats.expired_entries);
    println!("  Total size:      {} bytes", stats.total_size_bytes);
    Ok(0)
}

pub fn clear(ctx: &Context) -> Result<i32> {
    let removed = ctx.cache.clear()?;
    println!("{} {} entries", "Cleared".green(), removed);
    Ok(0)
}

pub fn evict(ctx: &Context) -> Result<i32> {
    let removed = ctx.cache.evict_expired()?;
    println!("{} {} expired entries", "Evicted".green(), removed);
    Ok(0)
}
