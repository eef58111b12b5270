mod bus;
mod clock;
mod eeprom;
mod host;
mod parse;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
