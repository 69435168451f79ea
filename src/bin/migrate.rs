#[cfg(feature = "ssr")]
use arrow_words::{config::Config, establish_connection, run_migrations};

#[cfg(feature = "ssr")]
fn main() {
    let config = Config::from_env().expect("Invalid configuration");
    let mut conn = establish_connection(&config.database_url).expect("Failed to open database");
    let applied = run_migrations(&mut conn).expect("Failed to run migrations");
    println!("Applied {} migration(s).", applied);
}

#[cfg(not(feature = "ssr"))]
fn main() {
    println!("This binary requires the 'ssr' feature to be enabled.");
}
