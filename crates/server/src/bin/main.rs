use quarry_server::QuarryServer;

#[derive(clap::Parser)]
#[command(name = "quarry-server", version, about = "Chart query execution server")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, default_value = "config/quarry.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    QuarryServer::new().with_config(args.config).run().await
}
