use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    depmonkey_cli::main_entry().await
}
