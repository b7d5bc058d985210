#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app_lib::run().await
}
