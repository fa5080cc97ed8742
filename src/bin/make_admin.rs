//! Promotes an existing user to ADMIN. Usage: `make_admin user@example.com`
//! with `DATABASE_URL` set.

use std::process::ExitCode;

use apex_portal::store::{PgStore, Store};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> ExitCode {
    let Some(email) = std::env::args().nth(1).map(|e| e.trim().to_lowercase()) else {
        eprintln!("❌ Please provide an email address");
        eprintln!("\nUsage: make_admin user@example.com\n");
        return ExitCode::FAILURE;
    };

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("❌ DATABASE_URL is not set");
        return ExitCode::FAILURE;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("❌ Could not connect to the database: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store = PgStore::new(pool);
    match store.promote_to_admin(&email).await {
        Ok(Some(user)) => {
            println!("\n✅ Successfully updated user to ADMIN!\n");
            println!("   Name: {}", user.name);
            println!("   Email: {}", user.email);
            println!("   Role: {}", user.role);
            println!("   ID: {}\n", user.id);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("❌ User with email \"{email}\" not found in database");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ Error updating user: {e}");
            ExitCode::FAILURE
        }
    }
}
