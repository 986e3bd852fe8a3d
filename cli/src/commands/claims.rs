use crate::context::Context;
use anyhow::Result;
use cancellation::CancelSignal;
use colored::*;

pub async fn attach(
    ctx: &Context,
    principal: &str,
    claim_type: &str,
    value: Option<&str>,
    cancel: &CancelSignal,
) -> Result<i32> {
    let value = value.unwrap_or(claim_type);
    ctx.office
        .reconciler()
        .attach_claim(principal, claim_type, value, cancel)
        .await?;
    println!("{} {}={} to {}", "Attached".green(), claim_type, value, principal);
    Ok(0)
}

pub async fn detach(
    ctx: &Context,
    principal: &str,
    claim_type: &str,
    cancel: &CancelSignal,
) -> Result<i32> {
    ctx.office
        .reconciler()
        .detach_claim(principal, claim_type, cancel)
        .await?;
    println!("{} {} claims from {}", "Detached".green(), claim_type, principal);
    Ok(0)
}

pub async fn available(ctx: &Context, principal: &str, cancel: &CancelSignal) -> Result<i32> {
    let available = ctx.office.available_claims(principal, cancel).await?;
    if available.is_empty() {
        println!("{} already holds every assignable claim", principal);
    }
    for claim_type in &available {
        println!("  - {}", claim_type);
    }
    Ok(0)
}
