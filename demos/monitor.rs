use joule_connector::{Credentials, JouleClient, MessageLogMode, sensor};
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> joule_connector::Result<()> {
    tracing_subscriber::fmt::init();

    let username = env::var("JOULE_USERNAME").expect("JOULE_USERNAME must be set");
    let password = env::var("JOULE_PASSWORD").expect("JOULE_PASSWORD must be set");
    let args: Vec<String> = env::args().collect();
    let interval: u64 = args
        .iter()
        .position(|a| a == "--interval")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);

    let mut builder = JouleClient::builder(Credentials::new(username, password))
        .refresh_interval(Duration::from_secs(interval))
        .on_event(|event| {
            println!("{event:?}");
        })
        .on_snapshot(|snapshot| {
            for device in snapshot.iter() {
                let readings: Vec<String> = sensor::sensors_for(device)
                    .into_iter()
                    .filter_map(|s| (s.read)(device).map(|v| format!("{}: {v}", s.name)))
                    .collect();
                println!(
                    "[{}] target {} | {:?} | {}",
                    device.display_name,
                    device.target_temperature,
                    device.hvac_action(),
                    readings.join(" | "),
                );
            }
        });

    if let Some(i) = args.iter().position(|a| a == "--log") {
        let path = args.get(i + 1).expect("--log needs a path");
        builder = builder.message_log(MessageLogMode::Diffed, path.as_str());
    }

    let client = builder.build()?;

    println!("Logging in...");
    client.login().await?;
    println!("Logged in. Polling every {interval}s...");

    let cancel = CancellationToken::new();
    let handle = client.start(cancel.clone());

    let _ = tokio::signal::ctrl_c().await;
    cancel.cancel();
    let _ = handle.await;

    let status = client.status();
    println!(
        "Stopped. Last success: {:?}, consecutive failures: {}",
        status.last_success_at, status.consecutive_failures
    );
    Ok(())
}
