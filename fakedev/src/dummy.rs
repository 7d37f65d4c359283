use app::{BoardSettings, DriverConfig, DriverSettings, MeasurementMode};
use fakedev::run;
use std::{env, process::exit, thread::sleep, time::Duration};

const DEFAULT_SECONDS: u64 = 5;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let seconds = match env::args().nth(1).map(|arg| arg.parse::<u64>()) {
        None => DEFAULT_SECONDS,
        Some(Ok(seconds)) => seconds,
        Some(Err(err)) => {
            log::error!("Bad duration: {}", err);
            exit(2);
        }
    };
    if let Err(err) = measure(seconds) {
        log::error!("Measurement failed: {} (code {})", err, err.code());
        exit(1);
    }
}

fn measure(seconds: u64) -> app::Result<()> {
    let config = DriverConfig::default()
        .drift_references_path(env::temp_dir().join("daqhat-dummy").join("drift_references"));
    let (_board, mut driver) = run(config)?;

    let mut board = BoardSettings::new();
    board
        .set_channel_mode(3, MeasurementMode::Current)?
        .set_channel_gain(0, 2.0)?;
    driver.set_board_settings(&board)?;
    log::info!("Board settings: {}", serde_json::to_string(driver.board_settings()?.as_map())?);

    let mut settings = DriverSettings::new();
    settings.set_sample_rate(32000)?.set_frequency(2)?;
    driver.set_settings(settings)?;

    driver.start_with_events(
        |burst, lost| {
            let means = burst
                .channels()
                .iter()
                .map(|ch| ch.iter().sum::<f32>() / ch.len().max(1) as f32)
                .collect::<Vec<_>>();
            log::info!("{} samples, {} bursts lost, means {:?}", burst.size(), lost, means);
        },
        |event| log::info!("Event: {:?}", event),
    )?;
    sleep(Duration::from_secs(seconds));
    driver.stop()?;
    log::info!("Statistics: {}", driver.statistics());
    Ok(())
}
