use clap::Parser;

use rootless::{DeserializationOptions, Server, handlers::echo_handler};

/// Listen for JSON requests and echo their (unwrapped) payloads.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// URI for the server to listen for requests.
    #[arg(short, long)]
    uri: String,

    /// Treat the request body itself as the payload.
    #[arg(short, long)]
    without_root: bool,

    /// Root key the payload is wrapped in.
    #[arg(short, long, default_value = "payload")]
    root: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let options = DeserializationOptions::new().without_root(args.without_root);
    let server = Server::new(&args.uri)
        .with_options(options)
        .with_root(&args.root);

    server.run(echo_handler::<serde_json::Value>).await?;

    Ok(())
}
