//! cleantabs-admin - maintenance commands against the CleanTabs database
//!
//! Uses the same configuration (and `CLEANTABS_*` overrides) as the server.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cleantabs::{
    config::Config,
    db::{
        self,
        repositories::{MagicLinkRepository, SqlxMagicLinkRepository},
    },
    models::{Plan, User},
    services::UserService,
};

#[derive(Parser, Debug)]
#[command(name = "cleantabs-admin", version, about = "CleanTabs maintenance tool")]
struct Cli {
    /// Configuration file
    #[arg(long, short = 'c', env = "CLEANTABS_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a verified user with a password
    CreateUser {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
        /// free or pro
        #[arg(long, default_value = "free")]
        plan: Plan,
    },
    /// Show a user
    FindUser {
        #[arg(long)]
        email: String,
    },
    /// List users, newest first
    ListUsers {
        #[arg(long, default_value_t = 1)]
        page: i64,
        #[arg(long, default_value_t = 50)]
        per_page: i64,
    },
    /// Set a new password and sign the user out everywhere
    ResetPassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Normalize the email, mark it verified and relink the credentials account
    FixUser {
        #[arg(long)]
        email: String,
    },
    /// Delete a user with all their data
    DeleteUser {
        #[arg(long)]
        email: String,
    },
    /// Delete expired sessions and sign-in links
    Cleanup,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cleantabs=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_with_env(&cli.config)?;
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;
    db::migrations::run_migrations(&pool).await?;

    let users = UserService::from_pool(&pool, config.auth.clone());

    match cli.command {
        Command::CreateUser {
            email,
            password,
            name,
            plan,
        } => {
            let user = users.create_user_direct(&email, &password, name, plan).await?;
            println!("Created user");
            print_user(&user);
        }
        Command::FindUser { email } => match users.find_by_email(&email).await? {
            Some(user) => print_user(&user),
            None => anyhow::bail!("No user with email {}", email),
        },
        Command::ListUsers { page, per_page } => {
            let (list, total) = users.list_users(page, per_page).await?;
            for user in &list {
                println!(
                    "{:>6}  {:<40}  {:<5}  {}",
                    user.id,
                    user.email,
                    user.plan,
                    user.created_at.format("%Y-%m-%d")
                );
            }
            println!("{} of {} users (page {})", list.len(), total, page);
        }
        Command::ResetPassword { email, password } => {
            let user = users.set_password(&email, &password).await?;
            println!("Password updated, all sessions revoked");
            print_user(&user);
        }
        Command::FixUser { email } => {
            let user = users.fix_user(&email).await?;
            println!("User repaired");
            print_user(&user);
        }
        Command::DeleteUser { email } => {
            users.delete_user(&email).await?;
            println!("Deleted {}", email);
        }
        Command::Cleanup => {
            let sessions = users.cleanup_expired_sessions().await?;
            let links = SqlxMagicLinkRepository::new(pool.clone())
                .delete_expired(Utc::now())
                .await?;
            println!("Deleted {} expired sessions and {} expired sign-in links", sessions, links);
        }
    }

    pool.close().await;
    Ok(())
}

fn print_user(user: &User) {
    println!("  id:         {}", user.id);
    println!("  email:      {}", user.email);
    println!("  name:       {}", user.name.as_deref().unwrap_or("-"));
    println!("  plan:       {}", user.plan);
    println!("  password:   {}", if user.has_password() { "set" } else { "none" });
    println!(
        "  verified:   {}",
        user.email_verified
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "no".to_string())
    );
    println!("  created at: {}", user.created_at.to_rfc3339());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_config_path_from_flag_or_env() {
        std::env::remove_var("CLEANTABS_CONFIG");
        let cli = Cli::try_parse_from(["cleantabs-admin", "cleanup"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.yml"));

        std::env::set_var("CLEANTABS_CONFIG", "/etc/cleantabs/config.yml");
        let cli = Cli::try_parse_from(["cleantabs-admin", "find-user", "--email", "a@b.c"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/cleantabs/config.yml"));
        assert!(matches!(cli.command, Command::FindUser { ref email } if email == "a@b.c"));

        let cli = Cli::try_parse_from(["cleantabs-admin", "-c", "other.yml", "cleanup"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("other.yml"));
        std::env::remove_var("CLEANTABS_CONFIG");
    }

    #[test]
    fn test_create_user_plan_parses() {
        let cli = Cli::try_parse_from([
            "cleantabs-admin",
            "create-user",
            "--email",
            "a@b.c",
            "--password",
            "long-enough",
            "--plan",
            "pro",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::CreateUser { plan: Plan::Pro, .. }));
    }
}
