//! Command line entry points. With no subcommand the binary serves HTTP.

use chrono::Utc;
use clap::{Parser, Subcommand};

use crate::db::Database;
use crate::security::hash_password;

#[derive(Parser, Debug)]
#[command(name = "persona-backend", version, about = "Resume persona chat server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Admin account maintenance
    Admin {
        #[command(subcommand)]
        action: AdminCommand,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum AdminCommand {
    /// Set a new password, unlock and reactivate the account
    Reset { username: String, password: String },
    /// Create a new active admin account
    Create { username: String, password: String },
}

/// Run an admin command, returning the line to print on success
pub fn run_admin(db: &Database, bcrypt_cost: u32, command: &AdminCommand) -> Result<String, String> {
    match command {
        AdminCommand::Reset { username, password } => reset_password(db, bcrypt_cost, username, password),
        AdminCommand::Create { username, password } => create_admin(db, bcrypt_cost, username, password),
    }
}

fn reset_password(db: &Database, cost: u32, username: &str, password: &str) -> Result<String, String> {
    let Some(mut user) = db.get_user_by_username(username).map_err(|e| e.to_string())? else {
        let known = db
            .list_users()
            .map_err(|e| e.to_string())?
            .into_iter()
            .map(|u| u.username)
            .collect::<Vec<_>>();
        return Err(format!(
            "User '{}' not found. Existing users: {}",
            username,
            if known.is_empty() { "(none)".to_string() } else { known.join(", ") }
        ));
    };

    user.password_hash = hash_password(password, cost)?;
    user.password_changed_at = Some(Utc::now());
    user.must_change_password = false;
    user.unlock();
    user.is_active = true;
    db.save_user(&user).map_err(|e| e.to_string())?;

    Ok(format!("Password for '{}' reset; account unlocked and active", username))
}

fn create_admin(db: &Database, cost: u32, username: &str, password: &str) -> Result<String, String> {
    if db.get_user_by_username(username).map_err(|e| e.to_string())?.is_some() {
        return Err(format!("User '{}' already exists, use `admin reset` instead", username));
    }

    let hash = hash_password(password, cost)?;
    db.create_user(username, None, &hash, false)
        .map_err(|e| e.to_string())?;

    Ok(format!("Admin user '{}' created", username))
}
