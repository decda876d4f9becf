use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use rpassword::prompt_password;
use serde::{Deserialize, Serialize};
use shared::{
    config::Config,
    models::{AuthLoginRequest, User},
};

use crate::api::SidechatClient;

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Sign in and remember the account on this machine
    Login(LoginArgs),
    /// Forget the signed-in account
    Logout,
    /// Show the signed-in account
    Whoami,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email; prompted for when omitted
    #[arg(long, short)]
    pub email: Option<String>,

    /// Account password; prompted for without echo when omitted
    #[arg(long)]
    pub password: Option<String>,
}

/// The signed-in account as stored next to the client state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user: User,
    pub token: String,
    pub server_url: String,
}

pub async fn run(command: SessionCommand, config: &Config) -> Result<()> {
    match command {
        SessionCommand::Login(args) => login(args, config).await,
        SessionCommand::Logout => logout(config),
        SessionCommand::Whoami => whoami(config),
    }
}

async fn login(args: LoginArgs, config: &Config) -> Result<()> {
    let email = match args.email {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = match args.password {
        Some(password) => password,
        None => prompt_password("Password: ")?,
    };
    if password.trim().is_empty() {
        bail!("password must not be empty");
    }

    let client = SidechatClient::new(config.base_url()?, config.request_timeout())?;
    let response = client.login(&AuthLoginRequest { email, password }).await?;

    let session = Session {
        user: response.user,
        token: response.token,
        server_url: config.server_url.clone(),
    };
    let path = config.session_path();
    save_session(&session, &path)?;
    print_session_summary(&session, &path);
    Ok(())
}

fn logout(config: &Config) -> Result<()> {
    let path = config.session_path();
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove session file {}", path.display()))?;
        println!("Removed session at {}", path.display());
    } else {
        println!("No session found at {}", path.display());
    }
    Ok(())
}

fn whoami(config: &Config) -> Result<()> {
    let path = config.session_path();
    let session = load_session(&path)?;
    print_session_summary(&session, &path);
    Ok(())
}

/// Reads the stored session, failing with a sign-in hint when there is none.
pub fn load_session(path: &Path) -> Result<Session> {
    if !path.exists() {
        bail!(
            "no active session found at {}; run `sidechat session login` first",
            path.display()
        );
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read session file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("session file {} is corrupt", path.display()))
}

pub fn save_session(session: &Session, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let contents = serde_json::to_string_pretty(session)?;
    fs::write(path, contents)
        .with_context(|| format!("failed to write session file {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .context("failed to set session file permissions")?;
    }
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush().ok();
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let trimmed = input.trim().to_string();
    if trimmed.is_empty() {
        bail!("input must not be empty");
    }
    Ok(trimmed)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create session directory {}", parent.display()))?;
    }
    Ok(())
}

fn print_session_summary(session: &Session, path: &Path) {
    println!("Logged in as {} <{}>", session.user.name, session.user.email);
    println!("user id: {}", session.user.id);
    println!("server: {}", session.server_url);
    println!("session stored at {}", path.display());
}
