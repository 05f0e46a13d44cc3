use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use xdm1041ctrl::poll::LogSink;
use xdm1041ctrl::proto::command::Mode;
use xdm1041ctrl::{Device, PollConfig, Poller, DEFAULT_BAUDRATE};

#[tokio::main]
async fn main() -> xdm1041ctrl::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = "/dev/ttyUSB0".to_string();
    let mut device = Device::default();
    device.connect(&path, DEFAULT_BAUDRATE).await?;
    println!("Instrument ID: {}", device.query_identity().await?);
    device.configure(Mode::DcVoltage).await?;

    let mut poller = Poller::new(
        Arc::new(Mutex::new(device)),
        Arc::new(LogSink),
        PollConfig::default(),
    );
    poller.start();
    tokio::time::sleep(Duration::from_secs(5)).await;
    poller.switch_mode(Mode::Resistance).await?;
    tokio::time::sleep(Duration::from_secs(5)).await;
    poller.stop().await;

    poller.device().lock().await.disconnect().await
}
