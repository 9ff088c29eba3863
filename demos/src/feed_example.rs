use dotenv::dotenv;
use dreamdeck_rust::config::DreamDeckConfig;
use dreamdeck_rust::DreamDeck;
use dreamdeck_rust_dreams::FeedState;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = DreamDeckConfig::from_env()?;
    let deck = DreamDeck::new(config)?;

    println!("Starting feed example");

    // The feed refuses to fetch without a stored session
    let mut feed = deck.feed();
    feed.load().await;

    match feed.state() {
        FeedState::SignedOut => {
            println!("Please log in to view your dreams.");
            return Ok(());
        }
        FeedState::Errored(message) => {
            println!("Error loading dreams: {}", message);
            return Ok(());
        }
        _ => {}
    }

    println!("Loaded {} dreams", feed.dreams().len());

    // Client-side search over title and content
    feed.set_search_term("flying");
    for dream in feed.visible() {
        println!("- {} ({})", dream.title, dream.date.format("%Y-%m-%d"));
    }

    // Record a new dream; on success the composer publishes on the
    // invalidation bus and the feed picks it up.
    let mut composer = deck.composer();
    composer.set_title("Glass city");
    composer.set_content(
        "I was walking through a city of glass towers that bent like reeds in the wind.",
    );
    composer.select_emotion("Wonder");
    composer.set_intensity("Wonder", 8);

    match composer.submit().await {
        Ok(dream) => println!("Recorded dream {}", dream.id),
        Err(err) => println!("Failed to record dream: {}", err),
    }

    feed.reload_on_invalidation().await;
    println!("Feed now has {} dreams", feed.dreams().len());

    Ok(())
}
