use crate::context::Context;
use anyhow::{anyhow, Result};
use authz::Principal;
use cancellation::CancelSignal;
use colored::*;
use membership::PrincipalDirectory;

pub async fn add(ctx: &Context, id: String, name: String, email: Option<String>) -> Result<i32> {
    let mut principal = Principal::new(id, name);
    principal.email = email;
    ctx.directory.add_principal(&principal).await?;
    println!("{} {}", "Added principal".green(), principal.id);
    Ok(0)
}

pub async fn list(ctx: &Context, cancel: &CancelSignal) -> Result<i32> {
    let principals = cancel.run(ctx.directory.principals()).await??;
    for principal in &principals {
        print_summary(principal);
    }
    println!("\nTotal principals: {}", principals.len());
    Ok(0)
}

pub async fn show(ctx: &Context, id: &str, cancel: &CancelSignal) -> Result<i32> {
    let principal = cancel
        .run(ctx.directory.find_principal(id))
        .await??
        .ok_or_else(|| anyhow!("Principal not found: {}", id))?;

    print_summary(&principal);
    println!("  {}", "Roles:".bold());
    for role in &principal.roles {
        println!("    - {} ({})", role.name, role.id);
    }
    println!("  {}", "Claims:".bold());
    for claim in &principal.claims {
        println!("    - {} = {}", claim.claim_type, claim.value);
    }
    Ok(0)
}

pub async fn edit(
    ctx: &Context,
    id: &str,
    name: Option<&str>,
    email: Option<&str>,
    cancel: &CancelSignal,
) -> Result<i32> {
    let principal = ctx
        .office
        .reconciler()
        .edit_principal(id, name, email, cancel)
        .await?;
    print!("{} ", "Updated".green());
    print_summary(&principal);
    Ok(0)
}

pub async fn remove(ctx: &Context, id: &str, cancel: &CancelSignal) -> Result<i32> {
    ctx.office.reconciler().remove_principal(id, cancel).await?;
    println!("{} {}", "Removed principal".green(), id);
    Ok(0)
}

fn print_summary(principal: &Principal) {
    match &principal.email {
        Some(email) => println!(
            "{} {} <{}>",
            principal.id.cyan(),
            principal.display_name,
            email
        ),
        None => println!("{} {}", principal.id.cyan(), principal.display_name),
    }
}
