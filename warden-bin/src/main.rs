use clap::Parser;
use warden_cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        eprintln!("❌ Error: {e}");
        std::process::exit(1);
    }
    // a console read may still be parked on stdin
    std::process::exit(0);
}
