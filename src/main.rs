#[cfg(feature = "server")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    slot_ledger::server::run().await
}
