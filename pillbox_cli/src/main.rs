mod drivers;

use clap::{Parser, Subcommand};
use drivers::{
    ConsoleFeedback, FlagFileSensor, LoggingDispenser, LoggingNotifier, StdinChannel, SystemClock,
};
use pillbox_core::controller::{ACK, NACK};
use pillbox_core::dose_log::{read_entries, TIMESTAMP_FORMAT};
use pillbox_core::*;
use std::path::{Path, PathBuf};

/// Reply to a slot request for a slot that does not exist.
const UNKNOWN_REPLY: &str = "none";

#[derive(Parser)]
#[command(name = "pillbox")]
#[command(about = "Scheduled medicine dispenser controller", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller, speaking the pairing protocol on stdin/stdout
    Run {
        /// Stop after this many scheduling ticks
        #[arg(long)]
        ticks: Option<u64>,
    },

    /// Receive one schedule over stdin and exit
    Provision,

    /// Print the saved schedule
    Show {
        /// Print the field tuple of a single slot
        #[arg(long)]
        slot: Option<u8>,

        /// Print as JSON
        #[arg(long, conflicts_with = "slot")]
        json: bool,
    },

    /// Print the dispense log
    Log {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Archive and erase the saved schedule
    Clear,

    /// Write the default configuration to the config path
    InitConfig {
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_level(logging::level_for_verbosity(cli.verbose));

    if let Commands::InitConfig { force } = &cli.command {
        return cmd_init_config(cli.config.as_deref(), *force);
    }

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| config.data.data_dir.clone());

    match cli.command {
        Commands::Run { ticks } => cmd_run(config, &data_dir, ticks),
        Commands::Provision => cmd_provision(config, &data_dir),
        Commands::Show { slot, json } => cmd_show(config, &data_dir, slot, json),
        Commands::Log { json } => cmd_log(&data_dir, json),
        Commands::Clear => cmd_clear(config, &data_dir),
        Commands::InitConfig { .. } => Ok(()),
    }
}

fn start_controller(
    config: Config,
    data_dir: &Path,
    feedback: &mut ConsoleFeedback,
) -> Result<Controller> {
    let store = match FileScheduleStore::open(data_dir) {
        Ok(store) => store,
        Err(e) => {
            feedback.show("Storage failure");
            return Err(e);
        }
    };
    let log = CsvDoseLog::new(data_dir.join(CsvDoseLog::LOG_FILE));
    Controller::start(config, Box::new(store), Box::new(log), feedback)
}

fn cmd_run(config: Config, data_dir: &Path, ticks: Option<u64>) -> Result<()> {
    let tick_interval = config.timing.tick_interval();
    let mut feedback = ConsoleFeedback::default();
    let mut ctl = start_controller(config, data_dir, &mut feedback)?;

    let mut clock = SystemClock;
    let mut dispenser = LoggingDispenser;
    let mut sensor = FlagFileSensor::new(data_dir.join(FlagFileSensor::FLAG_FILE));
    let mut notifier = LoggingNotifier;
    let mut channel = StdinChannel::spawn();

    tracing::info!("Controller running from {:?}", data_dir);
    let mut ticks_run = 0u64;

    loop {
        // Checked before the mode, so a `clear` mid-run still stops on time
        if ticks.is_some_and(|limit| ticks_run >= limit) {
            tracing::info!("Stopping after {} ticks", ticks_run);
            return Ok(());
        }

        match ctl.mode() {
            Mode::Provisioning => {
                if ctl.serve_provisioning(&mut channel, &mut feedback).is_none()
                    && channel.is_closed()
                {
                    return Err(Error::Provisioning(
                        "input closed before a schedule was received".into(),
                    ));
                }
            }
            Mode::Dispensing => {
                let mut devices = Devices {
                    clock: &mut clock,
                    dispenser: &mut dispenser,
                    sensor: &mut sensor,
                    feedback: &mut feedback,
                    notifier: &mut notifier,
                };
                for event in ctl.tick(&mut devices) {
                    println!(
                        "{} {} {}",
                        event.dispensed_at.format(TIMESTAMP_FORMAT),
                        event.name,
                        event.outcome
                    );
                }
                ticks_run += 1;

                // Diagnostics are answered between ticks
                if channel.is_closed() {
                    devices.clock.sleep(tick_interval);
                } else if let Some(request) = channel.receive_field(tick_interval) {
                    answer_diagnostic(&mut ctl, &mut channel, &request);
                }
            }
        }
    }
}

fn answer_diagnostic(ctl: &mut Controller, channel: &mut StdinChannel, request: &str) {
    match ctl.handle_diagnostic(request) {
        Ok(DiagnosticReply::Slot(tuple)) => channel.reply(&tuple),
        Ok(DiagnosticReply::Unknown) => channel.reply(UNKNOWN_REPLY),
        Ok(DiagnosticReply::Cleared) => channel.reply(ACK),
        Err(e) => {
            tracing::error!("Diagnostic {:?} failed: {}", request, e);
            channel.reply(NACK);
        }
    }
}

fn cmd_provision(config: Config, data_dir: &Path) -> Result<()> {
    let mut feedback = ConsoleFeedback::default();
    let mut ctl = start_controller(config, data_dir, &mut feedback)?;

    if ctl.mode() == Mode::Dispensing {
        eprintln!("A schedule is already saved. Run `pillbox clear` first.");
        return Err(Error::Provisioning("schedule already provisioned".into()));
    }

    let mut channel = StdinChannel::spawn();
    while ctl.mode() == Mode::Provisioning {
        if ctl.serve_provisioning(&mut channel, &mut feedback).is_none() && channel.is_closed() {
            return Err(Error::Provisioning(
                "input closed before a schedule was received".into(),
            ));
        }
    }

    eprintln!("✓ Schedule saved to {}", data_dir.display());
    Ok(())
}

fn cmd_show(config: Config, data_dir: &Path, slot: Option<u8>, json: bool) -> Result<()> {
    let mut feedback = ConsoleFeedback::default();
    let mut ctl = start_controller(config, data_dir, &mut feedback)?;

    if let Some(id) = slot {
        match ctl.handle_diagnostic(&format!("med{}", id))? {
            DiagnosticReply::Slot(tuple) => println!("{}", tuple),
            _ => println!("{}", UNKNOWN_REPLY),
        }
        return Ok(());
    }

    let Some(record) = ctl.record() else {
        println!("No schedule provisioned.");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    display_schedule(record);
    Ok(())
}

fn display_schedule(record: &ScheduleRecord) {
    println!("Contact: {}", record.contact());
    for slot in record.slots() {
        println!();
        println!(
            "  [{}] {}{}",
            slot.id(),
            slot.name(),
            if slot.active { "" } else { " (inactive)" }
        );
        println!(
            "      {} per day, every {} min from {}",
            slot.doses_per_day(),
            slot.dose_interval_minutes,
            slot.base_time
        );
        println!(
            "      Next dose: {}  Last dispensed: {}",
            slot.next_time(),
            slot.last_dispensed()
        );
    }
}

fn cmd_log(data_dir: &Path, json: bool) -> Result<()> {
    let entries = read_entries(&data_dir.join(CsvDoseLog::LOG_FILE))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No doses logged yet.");
        return Ok(());
    }

    for entry in &entries {
        match entry.actual {
            Some(actual) => println!(
                "{}  taken at {}",
                entry.scheduled.format(TIMESTAMP_FORMAT),
                actual.format("%H:%M")
            ),
            None => println!("{}  missed", entry.scheduled.format(TIMESTAMP_FORMAT)),
        }
    }
    Ok(())
}

fn cmd_clear(config: Config, data_dir: &Path) -> Result<()> {
    let mut feedback = ConsoleFeedback::default();
    let mut ctl = start_controller(config, data_dir, &mut feedback)?;

    if ctl.record().is_none() {
        println!("No schedule to clear.");
        return Ok(());
    }

    ctl.handle_diagnostic("clear")?;
    println!(
        "✓ Schedule archived to {}",
        data_dir.join(FileScheduleStore::ARCHIVE_FILE).display()
    );
    Ok(())
}

fn cmd_init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_config_path);

    if path.exists() && !force {
        eprintln!(
            "Config already exists at {}. Use --force to replace it.",
            path.display()
        );
        return Err(Error::Config(format!("{:?} already exists", path)));
    }

    Config::default().save_to(&path)?;
    println!("✓ Wrote default config to {}", path.display());
    Ok(())
}
