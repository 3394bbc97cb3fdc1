use anyhow::{Context, Result};
use dialoguer::{Input, Password};
use sshcli::Credentials;

/// Credentials from flags/environment, prompting for whatever is missing
pub fn resolve(username: Option<String>, password: Option<String>) -> Result<Credentials> {
    let username = match username.filter(|u| !u.trim().is_empty()) {
        Some(u) => u,
        None => Input::<String>::new()
            .with_prompt("Username")
            .interact_text()
            .context("Failed to read username")?,
    };

    let password = match password {
        Some(p) => p,
        None => Password::new()
            .with_prompt(format!("Password for {username}"))
            .interact()
            .context("Failed to read password")?,
    };

    Ok(Credentials::new(username, password))
}
