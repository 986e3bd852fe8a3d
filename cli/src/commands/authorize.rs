use crate::context::Context;
use anyhow::Result;
use authz::Decision;
use cancellation::CancelSignal;
use colored::*;

/// Exit code for a Deny decision
pub const DENIED: i32 = 2;

/// Exit code for a cancelled evaluation
pub const CANCELLED: i32 = 130;

/// Evaluate `policy` for `principal` and print the decision
pub async fn execute(
    ctx: &Context,
    principal: &str,
    policy: &str,
    format: &str,
    cancel: &CancelSignal,
) -> Result<i32> {
    let decision = ctx.office.authorize(principal, policy, cancel).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        match &decision {
            Decision::Allow => println!("{} {} may {}", "ALLOWED".green().bold(), principal, policy),
            Decision::Deny(_) => {
                println!("{} {} may not {}", "DENIED".red().bold(), principal, policy);
                for reason in decision.reasons() {
                    println!("  - {}", reason);
                }
            }
            Decision::Cancelled => println!("{}", "CANCELLED".yellow().bold()),
        }
    }

    Ok(match decision {
        Decision::Allow => 0,
        Decision::Deny(_) => DENIED,
        Decision::Cancelled => CANCELLED,
    })
}
