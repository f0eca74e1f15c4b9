#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mess_server::start_server().await
}
