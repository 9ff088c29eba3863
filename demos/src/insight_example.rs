use dotenv::dotenv;
use dreamdeck_rust::config::DreamDeckConfig;
use dreamdeck_rust::DreamDeck;
use dreamdeck_rust_insight::InsightPanel;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = DreamDeckConfig::from_env()?;
    let deck = DreamDeck::new(config)?;

    println!("Starting insight example");

    let dreams = deck.dreams();
    let list = dreams.list().await?;
    let Some(dream) = list.first() else {
        println!("No dreams recorded yet.");
        return Ok(());
    };

    // Generation is lazy: the panel only offers it while the dream has
    // no insight, and guards against double requests.
    let mut panel = InsightPanel::new(&dream.id, dream.insight.clone());
    if panel.can_generate() {
        println!("Generating insight for '{}'...", dream.title);
        panel.generate(deck.insight(), &dream.content).await?;
    }

    if let Some(insight) = panel.insight() {
        println!("Summary: {}", insight.summary);
        // Every known section renders, with an empty body when the
        // backend did not produce it.
        for section in insight.render_sections() {
            println!("## {}", section.title);
            if section.body.is_empty() {
                println!("(nothing here)");
            } else {
                println!("{}", section.body);
            }
        }
    }

    Ok(())
}
