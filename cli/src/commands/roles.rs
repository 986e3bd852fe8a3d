use crate::context::Context;
use anyhow::Result;
use cancellation::CancelSignal;
use colored::*;

pub async fn list(ctx: &Context, cancel: &CancelSignal) -> Result<i32> {
    let roles = ctx.office.reconciler().roles(cancel).await?;
    for role in &roles {
        println!("{} {}", role.name.cyan(), role.id.dimmed());
    }
    println!("\nTotal roles: {}", roles.len());
    Ok(0)
}

pub async fn add(ctx: &Context, name: &str, cancel: &CancelSignal) -> Result<i32> {
    let role = ctx.office.reconciler().add_role(name, cancel).await?;
    println!("{} {} ({})", "Created role".green(), role.name, role.id);
    Ok(0)
}

pub async fn remove(ctx: &Context, key: &str, cancel: &CancelSignal) -> Result<i32> {
    let role = ctx.resolve_role(key, cancel).await?;
    ctx.office.reconciler().remove_role(&role.id, cancel).await?;
    println!("{} {}", "Removed role".green(), role.name);
    Ok(0)
}

pub async fn rename(ctx: &Context, key: &str, new_name: &str, cancel: &CancelSignal) -> Result<i32> {
    let role = ctx.resolve_role(key, cancel).await?;
    let renamed = ctx
        .office
        .reconciler()
        .rename_role(&role.id, new_name, cancel)
        .await?;
    println!("{} {} -> {}", "Renamed role".green(), role.name, renamed.name);
    Ok(0)
}

pub async fn exists(ctx: &Context, name: &str, cancel: &CancelSignal) -> Result<i32> {
    if ctx.office.reconciler().role_exists(name, cancel).await? {
        println!("Role {} exists", name);
        Ok(0)
    } else {
        println!("Role {} does not exist", name);
        Ok(1)
    }
}

pub async fn members(ctx: &Context, key: &str, cancel: &CancelSignal) -> Result<i32> {
    let role = ctx.resolve_role(key, cancel).await?;
    let members = ctx.office.reconciler().members_of(&role.id, cancel).await?;
    println!("{}", format!("Members of {}", role.name).bold());
    for principal in &members {
        println!("  - {} {}", principal.id.cyan(), principal.display_name);
    }
    Ok(0)
}

pub async fn candidates(ctx: &Context, key: &str, cancel: &CancelSignal) -> Result<i32> {
    let role = ctx.resolve_role(key, cancel).await?;
    let candidates = ctx
        .office
        .reconciler()
        .candidates_for(&role.id, cancel)
        .await?;
    println!("{}", format!("Candidates for {}", role.name).bold());
    for principal in &candidates {
        println!("  - {} {}", principal.id.cyan(), principal.display_name);
    }
    Ok(0)
}

pub async fn set_membership(
    ctx: &Context,
    principal: &str,
    key: &str,
    present: bool,
    cancel: &CancelSignal,
) -> Result<i32> {
    let role = ctx.resolve_role(key, cancel).await?;
    ctx.office
        .reconciler()
        .set_role_membership(principal, &role.id, present, cancel)
        .await?;
    if present {
        println!("{} is a member of {}", principal, role.name);
    } else {
        println!("{} is no longer a member of {}", principal, role.name);
    }
    Ok(0)
}
