use clap::Parser;
use vantage_server::VantageServer;

#[derive(Parser)]
#[command(name = "vantage-server", about = "Vantage query and analytics server")]
struct Args {
    /// Path to the application config file
    #[arg(long, default_value = "config/vantage.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vantage_common::telemetry::init_logging("info,queries=info,cache=info");

    let args = Args::parse();
    VantageServer::new().with_config(&args.config).run().await
}
