use std::path::PathBuf;
use std::sync::Arc;

use clap::ArgAction;

use passthru_channel::config::ChannelConfig;
use passthru_channel::j2534::dll;
use passthru_channel::j2534::types::{to_hex, FILTER_PASS, PROTOCOL_CAN};
use passthru_channel::{Channel, Device, Error, J2534Lib, PassThruMsg, Result};

fn args() -> clap::Command {
    clap::command!()
        .about("Print every frame received on a J2534 PassThru channel")
        .arg(
            clap::Arg::new("list")
                .short('l')
                .long("list")
                .action(ArgAction::SetTrue)
                .help("List registered J2534 drivers and exit"),
        )
        .arg(
            clap::Arg::new("json")
                .long("json")
                .action(ArgAction::SetTrue)
                .requires("list")
                .help("Print the driver list as JSON"),
        )
        .arg(
            clap::Arg::new("dll")
                .short('d')
                .long("dll")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Driver library, overrides dll_path from the config"),
        )
        .arg(
            clap::Arg::new("config")
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Channel configuration (JSON)"),
        )
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = args().get_matches();
    if let Err(e) = run(&matches) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    if matches.get_flag("list") {
        let drivers = dll::discover_j2534_dlls();
        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(&drivers)?);
            return Ok(());
        }
        if drivers.is_empty() {
            println!("No J2534 drivers registered");
        }
        for entry in drivers {
            println!("{}\t{}", entry.name, entry.path.display());
        }
        return Ok(());
    }

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ChannelConfig::from_file(path)?,
        None => ChannelConfig::default(),
    };
    if let Some(path) = matches.get_one::<PathBuf>("dll") {
        config.dll_path = Some(path.clone());
    }

    let dll_path = match config.dll_path.clone() {
        Some(path) => path,
        None => dll::discover_j2534_dlls()
            .into_iter()
            .next()
            .map(|entry| entry.path)
            .ok_or_else(|| Error::Config("no J2534 driver registered, pass --dll".into()))?,
    };

    let lib = Arc::new(J2534Lib::load(&dll_path.to_string_lossy())?);
    let device = Device::open(lib)?;
    match device.read_version() {
        Ok(version) => log::info!(
            "Firmware {}, DLL {}, API {}",
            version.firmware,
            version.dll,
            version.api
        ),
        Err(e) => log::warn!("PassThruReadVersion failed: {}", e),
    }
    match device.read_battery_voltage() {
        Ok(volts) => log::info!("Battery {:.2} V", volts),
        Err(e) => log::warn!("READ_VBATT failed: {}", e),
    }

    let protocol_id = config.protocol.resolve()?;
    let channel = Channel::connect(
        &device,
        protocol_id,
        config.flags,
        config.baudrate,
        config.tx_flags,
    )?;

    if !config.params.is_empty() {
        channel.set_config(&config.params).into_result()?;
    }

    let mut filters = Vec::new();
    for filter in &config.filters {
        let (mask, pattern) = filter.records(protocol_id)?;
        filters.push(channel.start_msg_filter(FILTER_PASS, Some(&mask), Some(&pattern), None)?);
    }
    if filters.is_empty() && protocol_id == PROTOCOL_CAN {
        // Raw CAN delivers nothing until a pass filter exists
        let open = PassThruMsg::new(PROTOCOL_CAN, 0, &[0; 4])?;
        filters.push(channel.start_msg_filter(FILTER_PASS, Some(&open), Some(&open), None)?);
        log::info!("No filters configured, passing all CAN IDs");
    }

    channel.clear_rx().into_result()?;
    log::info!(
        "Listening on channel {} at {} baud",
        channel.channel_id(),
        channel.baudrate()
    );

    let status = channel.read_msgs_with(config.read_timeout_ms, |data| {
        println!(
            "{} {}",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            to_hex(data)
        );
        true
    });
    channel.stop_msg_filters(&filters);
    status.into_result()?;
    Ok(())
}
