use crate::context::Context;
use anyhow::Result;
use colored::*;
use serde_json::json;
use std::collections::BTreeMap;

/// List configured policies with their requirement labels
pub fn list(ctx: &Context, format: &str) -> Result<i32> {
    let engine = ctx.office.engine();
    let unsatisfiable = engine.unsatisfiable_requirements();

    let policies: BTreeMap<&str, Vec<String>> = engine
        .policies()
        .iter()
        .map(|p| (p.name(), p.requirements().iter().map(|r| r.label()).collect()))
        .collect();

    match format {
        "json" => {
            let output = json!({
                "policies": policies,
                "unsatisfiable": unsatisfiable
                    .iter()
                    .map(|(policy, requirement)| json!({ "policy": policy, "requirement": requirement }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        "yaml" => {
            println!("{}", serde_yaml::to_string(&ctx.config.policies)?);
        }
        _ => {
            println!("{}", "Access Policies".bold().underline());
            for (name, labels) in &policies {
                println!("\n{}", name.cyan().bold());
                for label in labels {
                    let broken = unsatisfiable
                        .iter()
                        .any(|(p, r)| p.as_str() == *name && r == label);
                    if broken {
                        println!("  - {} {}", label, "(no handler)".red());
                    } else {
                        println!("  - {}", label);
                    }
                }
            }
            println!("\nTotal policies: {}", policies.len());
        }
    }

    Ok(0)
}
