use anyhow::Result;
use backoffice::BackOfficeError;
use clap::{Parser, Subcommand};
use json_cache::JsonCacheError;
use membership::MembershipError;
use colored::*;
use std::path::PathBuf;

mod commands;
mod context;

use commands::{authorize, cache, claims, policies, roles, users};
use context::{load_config, Context};

/// Back-office CLI - administer roles, claims and access policies
#[derive(Parser)]
#[command(name = "boctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write logs to the configured log directory instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    /// Configuration file (built-in defaults when absent)
    #[arg(short, long, global = true, env = "BACKOFFICE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured policies and their requirements
    Policies {
        /// Output format (json, yaml, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Evaluate a policy for a principal
    Authorize {
        principal: String,
        policy: String,

        /// Output format (json, text)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Principal directory commands
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Role administration
    Role {
        #[command(subcommand)]
        action: RoleAction,
    },

    /// Role membership administration
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },

    /// Claim administration
    Claim {
        #[command(subcommand)]
        action: ClaimAction,
    },

    /// Catalog cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Register a principal in the directory
    Add {
        id: String,
        name: String,
        #[arg(long)]
        email: Option<String>,
    },
    /// List all principals
    List,
    /// Show one principal with roles and claims
    Show { id: String },
    /// Change display name or email
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Delete a principal with its memberships and claims
    Remove { id: String },
}

#[derive(Subcommand)]
enum RoleAction {
    List,
    Add {
        name: String,
    },
    /// Remove a role (by name or id)
    Remove {
        role: String,
    },
    Rename {
        role: String,
        new_name: String,
    },
    /// Check whether a role name is taken
    Exists {
        name: String,
    },
    /// List members of a role
    Members {
        role: String,
    },
    /// List principals not yet in a role
    Candidates {
        role: String,
    },
}

#[derive(Subcommand)]
enum MemberAction {
    Add { principal: String, role: String },
    Remove { principal: String, role: String },
}

#[derive(Subcommand)]
enum ClaimAction {
    /// Attach a claim; the value defaults to the claim type
    Attach {
        principal: String,
        claim_type: String,
        value: Option<String>,
    },
    /// Remove every claim of a type
    Detach {
        principal: String,
        claim_type: String,
    },
    /// Claim types the principal can still be given
    Available { principal: String },
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    Clear,
    Evict,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => fail(e),
    };

    let log_guard = if cli.log_file {
        match backoffice::logging::init_logging(&config.log_dir) {
            Ok(guard) => Some(guard),
            Err(e) => fail(e.into()),
        }
    } else {
        let log_level = if cli.verbose { "debug" } else { "warn" };
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .with_writer(std::io::stderr)
            .init();
        None
    };

    let ctx = match Context::open(config).await {
        Ok(ctx) => ctx,
        Err(e) => fail(e),
    };

    // Ctrl-C cancels whatever request is in flight
    let cancel = ctx.cancel_on_ctrl_c();

    let result = match cli.command {
        Commands::Policies { format } => policies::list(&ctx, &format),
        Commands::Authorize {
            principal,
            policy,
            format,
        } => authorize::execute(&ctx, &principal, &policy, &format, &cancel).await,
        Commands::User { action } => match action {
            UserAction::Add { id, name, email } => users::add(&ctx, id, name, email).await,
            UserAction::List => users::list(&ctx, &cancel).await,
            UserAction::Show { id } => users::show(&ctx, &id, &cancel).await,
            UserAction::Edit { id, name, email } => {
                users::edit(&ctx, &id, name.as_deref(), email.as_deref(), &cancel).await
            }
            UserAction::Remove { id } => users::remove(&ctx, &id, &cancel).await,
        },
        Commands::Role { action } => match action {
            RoleAction::List => roles::list(&ctx, &cancel).await,
            RoleAction::Add { name } => roles::add(&ctx, &name, &cancel).await,
            RoleAction::Remove { role } => roles::remove(&ctx, &role, &cancel).await,
            RoleAction::Rename { role, new_name } => {
                roles::rename(&ctx, &role, &new_name, &cancel).await
            }
            RoleAction::Exists { name } => roles::exists(&ctx, &name, &cancel).await,
            RoleAction::Members { role } => roles::members(&ctx, &role, &cancel).await,
            RoleAction::Candidates { role } => roles::candidates(&ctx, &role, &cancel).await,
        },
        Commands::Member { action } => match action {
            MemberAction::Add { principal, role } => {
                roles::set_membership(&ctx, &principal, &role, true, &cancel).await
            }
            MemberAction::Remove { principal, role } => {
                roles::set_membership(&ctx, &principal, &role, false, &cancel).await
            }
        },
        Commands::Claim { action } => match action {
            ClaimAction::Attach {
                principal,
                claim_type,
                value,
            } => claims::attach(&ctx, &principal, &claim_type, value.as_deref(), &cancel).await,
            ClaimAction::Detach {
                principal,
                claim_type,
            } => claims::detach(&ctx, &principal, &claim_type, &cancel).await,
            ClaimAction::Available { principal } => {
                claims::available(&ctx, &principal, &cancel).await
            }
        },
        Commands::Cache { action } => match action {
            CacheAction::Stats => cache::stats(&ctx),
            CacheAction::Clear => cache::clear(&ctx),
            CacheAction::Evict => cache::evict(&ctx),
        },
    };

    ctx.close().await;
    drop(ctx);

    if let Some(guard) = log_guard {
        backoffice::logging::log_shutdown();
        // Flush the file writer before exiting
        drop(guard);
    }

    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) if is_cancelled(&e) => {
            eprintln!("{}", "CANCELLED".yellow().bold());
            std::process::exit(authorize::CANCELLED);
        }
        Err(e) => fail(e),
    }
}

/// Cancellation is not a failure, whichever layer noticed it.
fn is_cancelled(e: &anyhow::Error) -> bool {
    if e.is::<cancellation::Cancelled>() {
        return true;
    }
    if let Some(e) = e.downcast_ref::<BackOfficeError>() {
        return e.is_cancelled();
    }
    if let Some(e) = e.downcast_ref::<MembershipError>() {
        return e.is_cancelled();
    }
    e.downcast_ref::<JsonCacheError>()
        .is_some_and(JsonCacheError::is_cancelled)
}

fn fail(e: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), e);
    std::process::exit(1);
}
