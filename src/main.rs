use clap::{Arg, Command};
use std::process;
use std::sync::Arc;

use reset_warden::auth::password::{read_password, validate_password};
use reset_warden::utils::io::{prompt, read_line};
use reset_warden::utils::logging::{init_console_logging, initialize_logging};
use reset_warden::utils::time::utc_to_local;
use reset_warden::{
    ConsoleNotifier, ConsumeOutcome, InMemoryAccountStore, Notifier, ResetConfig, ResetError,
    ResetTokenManager, SmtpNotifier, SystemClock, Validation, MAX_TOKEN_ATTEMPTS,
};

fn main() {
    let matches = Command::new("reset-warden")
        .about("Password reset token issuance and redemption")
        .arg(
            Arg::new("config")
                .long("config")
                .help("Path to the JSON configuration file")
                .default_value("reset-warden.json"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .help("Write logs to this file instead of stderr"),
        )
        .subcommand(
            Command::new("demo")
                .about("Register an account and walk through a password reset")
                .arg(Arg::new("username").help("Account to create").required(true))
                .arg(Arg::new("email").help("Email address of the account").required(true))
                .arg(
                    Arg::new("smtp")
                        .long("smtp")
                        .help("Send the token by email instead of printing it")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand_required(true)
        .get_matches();

    match matches.get_one::<String>("log-file") {
        Some(path) => {
            if let Err(e) = initialize_logging(path) {
                eprintln!("Failed to initialize logging: {}", e);
                process::exit(1);
            }
        }
        None => {
            if let Err(e) = init_console_logging() {
                eprintln!("Failed to initialize logging: {}", e);
            }
        }
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("reset-warden.json");
    let config = match ResetConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if let Some(sub_matches) = matches.subcommand_matches("demo") {
        let username = sub_matches.get_one::<String>("username").cloned().unwrap_or_default();
        let email = sub_matches.get_one::<String>("email").cloned().unwrap_or_default();
        let use_smtp = sub_matches.get_flag("smtp");

        if let Err(e) = run_demo(&config, &username, &email, use_smtp) {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_demo(
    config: &ResetConfig,
    username: &str,
    email: &str,
    use_smtp: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let accounts = Arc::new(InMemoryAccountStore::new());

    println!("=== Register {} ===", username);
    print!("Choose a password: ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let password = read_password()?;
    accounts.register(username, email, &password)?;
    println!("Account created.");

    let manager = ResetTokenManager::from_config(accounts.clone(), Arc::new(SystemClock), config);
    let notifier: Box<dyn Notifier> = match (&config.smtp, use_smtp) {
        (Some(settings), true) => Box::new(
            SmtpNotifier::new(settings.clone(), manager.default_ttl()).with_directory(accounts.clone()),
        ),
        (None, true) => return Err("--smtp requires an smtp section in the configuration".into()),
        _ => Box::new(ConsoleNotifier::new()),
    };

    println!("\n=== Password Reset ===");
    let token = match manager.issue_default(email) {
        Ok(token) => token,
        Err(ResetError::UnknownAccount) => {
            // Same answer either way so the prompt does not confirm accounts
            println!("If an account exists with this email, you will receive reset instructions.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if let Err(e) = notifier.deliver(email, &token) {
        manager.revoke(email);
        return Err(format!("Failed to send reset token: {}", e).into());
    }
    if let Some(expires_at) = manager.expires_at(email) {
        println!("Token valid until {}", utc_to_local(expires_at));
    }

    let mut attempts = 0;
    while attempts < MAX_TOKEN_ATTEMPTS {
        let entered = prompt("\nEnter the reset token (or 'cancel' to abort): ")?;
        if entered.eq_ignore_ascii_case("cancel") {
            manager.revoke(email);
            println!("Password reset cancelled.");
            return Ok(());
        }

        match manager.validate(email, &entered) {
            Validation::Valid => {
                let new_password = read_new_password()?;
                return match manager.reset_password(email, &entered, &new_password)? {
                    ConsumeOutcome::Success => {
                        println!("Password reset successful!");
                        let verified = accounts.verify_credentials(username, &new_password);
                        println!("Login with new password: {}", if verified { "ok" } else { "failed" });
                        Ok(())
                    }
                    ConsumeOutcome::Expired => Err("Token expired before it was used.".into()),
                    other => Err(format!("Token was no longer usable: {:?}", other).into()),
                };
            }
            Validation::Mismatch => {
                attempts += 1;
                if attempts < MAX_TOKEN_ATTEMPTS {
                    println!(
                        "Invalid token. Please try again. {} attempts remaining.",
                        MAX_TOKEN_ATTEMPTS - attempts
                    );
                }
            }
            Validation::Expired => return Err("Reset token has expired. Please start over.".into()),
            Validation::NoPendingRequest => return Err("No reset is pending.".into()),
        }
    }

    manager.revoke(email);
    Err("Too many invalid attempts. Please start over.".into())
}

fn read_new_password() -> Result<String, Box<dyn std::error::Error>> {
    loop {
        print!("New password: ");
        std::io::Write::flush(&mut std::io::stdout())?;
        let password = read_password()?;
        if let Err(e) = validate_password(&password) {
            println!("{}. Try again.", e);
            continue;
        }

        print!("Confirm new password: ");
        std::io::Write::flush(&mut std::io::stdout())?;
        if read_password()? == password {
            return Ok(password);
        }
        println!("Passwords do not match. Press Enter to retry.");
        read_line()?;
    }
}
