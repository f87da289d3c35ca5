//! Password hashing utility for Workforce
//!
//! Generates Argon2id password hashes for seeding accounts manually without
//! exposing plaintext passwords.
//!
//! Usage:
//!   cargo run --bin hash-password
//!   cargo run --bin hash-password "MySecurePassword123!"

use std::env;
use std::io::{self, Write};

use workforce_auth::password;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let password = if let Some(pwd) = env::args().nth(1) {
        // Password provided as argument
        pwd
    } else {
        // Read password from stdin (doesn't show in process list)
        print!("Enter password to hash: ");
        io::stdout().flush()?;

        let mut password = String::new();
        io::stdin().read_line(&mut password)?;
        password.trim().to_string()
    };

    if password.is_empty() {
        eprintln!("Error: Password cannot be empty");
        std::process::exit(1);
    }

    if password.len() < 12 {
        eprintln!("Warning: Password is less than 12 characters. Consider using a longer password.");
    }

    let hash = password::hash_password(&password)
        .map_err(|e| format!("Password hashing failed: {}", e))?;

    println!("{}", hash);
    Ok(())
}
