#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pairline_server::run().await
}
