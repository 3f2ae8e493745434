mod api;

use std::sync::Arc;

use roomcap_core::{settings, SessionState, Settings, Theory};
use roomcap_suggest::Generator;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("init") => init_settings(),
        Some("generate") => generate_once(&args[1..]).await,
        None | Some("serve") => serve().await,
        Some(other) => {
            eprintln!("Unknown command '{other}'.");
            eprintln!("Usage: roomcap-server [serve | init | generate <imageUrl> [7-elements|feng-shui]]");
            std::process::exit(2);
        }
    }
}

fn load_generator() -> Result<(Settings, Generator), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;
    let missing = settings.missing_credentials();
    if !missing.is_empty() {
        warn!(?missing, "credentials not set; generate calls will fail");
    }
    let generator = Generator::from_settings(&settings)?;
    Ok((settings, generator))
}

async fn serve() -> Result<(), Box<dyn std::error::Error>> {
    let (settings, generator) = load_generator()?;
    let app = api::router(api::AppState {
        generator: Arc::new(generator),
    });

    let listener = tokio::net::TcpListener::bind(&settings.bind).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app)
        .await
        .inspect_err(|e| eprintln!("server error: {}", e))?;
    Ok(())
}

/// Run one generate cycle the way the page does and print the outcome.
async fn generate_once(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let image_url = args
        .first()
        .ok_or("usage: roomcap-server generate <imageUrl> [theory]")?;
    let theory = match args.get(1) {
        Some(t) => t.parse::<Theory>()?,
        None => Theory::default(),
    };

    let (_, generator) = load_generator()?;

    let mut session = SessionState::new();
    session.set_image(image_url.as_str());
    session.set_theory(theory);
    let request = session.begin_generate().ok_or("nothing to generate")?;

    let outcome = generator.generate(&request).await;
    if let Err(e) = &outcome {
        warn!(error = %e, "generate failed");
    }
    session.finish(outcome);

    if let Some(error) = &session.error {
        eprintln!("{error}");
        std::process::exit(1);
    }
    println!("## Analysis ({})\n", session.theory.label());
    println!("{}\n", session.analysis.as_deref().unwrap_or_default());
    println!("## Suggestion\n");
    println!("{}", session.suggestion.as_deref().unwrap_or_default());
    Ok(())
}

/// Write a default settings file so keys and endpoints can be filled in.
fn init_settings() -> Result<(), Box<dyn std::error::Error>> {
    let path = settings::settings_path();
    if path.exists() {
        println!("Settings already exist at {}", path.display());
        return Ok(());
    }
    Settings::default().write_to(&path)?;
    println!("Wrote {}", path.display());
    println!("Set REPLICATE_API_KEY and AI21_API_KEY there or in the environment.");
    Ok(())
}
