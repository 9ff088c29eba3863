use chrono::NaiveDate;
use dotenv::dotenv;
use dreamdeck_rust::config::DreamDeckConfig;
use dreamdeck_rust::DreamDeck;
use dreamdeck_rust_auth::{AuthMode, SignupForm};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv().ok();

    // Initialize the DreamDeck client from DREAMDECK_API_URL / DREAMDECK_API_KEY
    let config = DreamDeckConfig::from_env()?;
    let deck = DreamDeck::new(config)?;

    println!("Starting auth example");

    // Sign up a new user. Validation (age gate, password strength,
    // confirmation) runs before anything touches the network.
    let form = SignupForm {
        username: "dreamer".to_string(),
        email: "dreamer@example.com".to_string(),
        name: "Dreamer".to_string(),
        birthday: NaiveDate::from_ymd_opt(1990, 6, 15).expect("valid date"),
        password: "Dreams4ever!".to_string(),
        confirm_password: "Dreams4ever!".to_string(),
    };

    match deck.auth().sign_up(&form).await {
        Ok(session) => println!("Signed up as {}", session.user.username),
        Err(err) => println!("Sign up failed: {}", err),
    }

    // Or drive the login form flow, which tracks phases and error display
    let mut flow = deck.auth_flow(AuthMode::Login);
    match flow.submit_login("dreamer@example.com", "Dreams4ever!").await {
        Ok(session) => println!("Signed in as {}", session.user.username),
        Err(err) => {
            println!("Sign in failed: {}", err);
            if let Some(message) = flow.visible_error() {
                println!("Form shows: {}", message);
            }
        }
    }

    // The session survives restarts through the on-disk store
    if let Some(session) = deck.auth().current_session()? {
        println!("Current user: {}", session.user.email);
    }

    Ok(())
}
