use anyhow::{bail, Context, Result};
use framesync::config::ConfigFile;
use framesync::settings::{SettingsStore, SqliteSettings};
use framesync::{log_info, log_warn, FrameStatus, FrameSync};
use std::sync::Arc;
use std::time::{Duration, Instant};

const USAGE: &str = "\
usage:
  framesync send <name> [--fps N] [--frames N]
  framesync receive <name> [--frames N]
  framesync policy on|off|status

options:
  --stream-logs   write the session log as it happens instead of on exit
  --verbose       include debug output";

enum Command {
    Send {
        name: String,
        fps: i32,
        frames: Option<u64>,
    },
    Receive {
        name: String,
        frames: Option<u64>,
    },
    Policy(Option<bool>),
}

struct Args {
    command: Command,
    stream_logs: bool,
    verbose: bool,
}

fn option_value<'a>(rest: &[&'a str], flag: &str) -> Result<Option<&'a str>> {
    match rest.iter().position(|a| *a == flag) {
        Some(i) => rest
            .get(i + 1)
            .copied()
            .map(Some)
            .with_context(|| format!("{} needs a value", flag)),
        None => Ok(None),
    }
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let stream_logs = raw.iter().any(|a| a == "--stream-logs");
    let verbose = raw.iter().any(|a| a == "--verbose");
    let rest: Vec<&str> = raw
        .iter()
        .map(String::as_str)
        .filter(|a| *a != "--stream-logs" && *a != "--verbose")
        .collect();

    let command = match rest.first().copied() {
        Some("send") => {
            let name = rest.get(1).context("send needs a sender name")?.to_string();
            let fps = match option_value(&rest, "--fps")? {
                Some(v) => v.parse().with_context(|| format!("invalid --fps value '{}'", v))?,
                None => 60,
            };
            let frames = match option_value(&rest, "--frames")? {
                Some(v) => Some(v.parse().with_context(|| format!("invalid --frames value '{}'", v))?),
                None => None,
            };
            Command::Send { name, fps, frames }
        }
        Some("receive") => {
            let name = rest.get(1).context("receive needs a sender name")?.to_string();
            let frames = match option_value(&rest, "--frames")? {
                Some(v) => Some(v.parse().with_context(|| format!("invalid --frames value '{}'", v))?),
                None => None,
            };
            Command::Receive { name, frames }
        }
        Some("policy") => match rest.get(1).copied() {
            Some("on") => Command::Policy(Some(true)),
            Some("off") => Command::Policy(Some(false)),
            Some("status") | None => Command::Policy(None),
            Some(other) => bail!("unknown policy value '{}'\n{}", other, USAGE),
        },
        Some(other) => bail!("unknown command '{}'\n{}", other, USAGE),
        None => bail!("{}", USAGE),
    };

    Ok(Args {
        command,
        stream_logs,
        verbose,
    })
}

fn main() -> Result<()> {
    let result = run_app();
    let _ = framesync::logger::finalize_logs();
    result
}

fn run_app() -> Result<()> {
    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let config_file = ConfigFile::new()?;
    let config = config_file.load()?;
    framesync::logger::init_logger(
        config_file.logs_dir(),
        "framesync",
        config.log_retention_count,
        args.stream_logs,
        args.verbose,
    )?;
    if let Some(log_path) = framesync::logger::get_log_path() {
        log_info!("Log file: {}", log_path.display());
    }

    let settings: Arc<dyn SettingsStore> = Arc::new(
        SqliteSettings::open(config_file.settings_db_path()).context("Failed to open settings database")?,
    );

    match args.command {
        Command::Policy(value) => {
            let mut sync = FrameSync::new(settings, config);
            if let Some(enabled) = value {
                sync.set_global_frame_count_policy(enabled)?;
            }
            println!(
                "frame counting is {}",
                if sync.is_frame_count_policy_enabled() { "on" } else { "off" }
            );
            Ok(())
        }
        Command::Send { name, fps, frames } => run_sender(FrameSync::new(settings, config), &name, fps, frames),
        Command::Receive { name, frames } => run_receiver(FrameSync::new(settings, config), &name, frames),
    }
}

fn run_sender(mut sync: FrameSync, name: &str, fps: i32, frames: Option<u64>) -> Result<()> {
    if !sync.is_frame_count_policy_enabled() {
        log_warn!("Frame counting is off; run 'framesync policy on' to enable it");
    }
    sync.create_access_lock(name)?;
    sync.enable_frame_count(name)?;
    log_info!("Sending [{}] at {} fps", name, fps);

    let mut sent = 0u64;
    let mut skipped = 0u64;
    let mut last_report = Instant::now();
    while frames.map_or(true, |limit| sent < limit) {
        let access = sync.check_access(None);
        if access.is_granted() {
            // The texture write would happen here
            sync.advance_frame();
            sync.allow_access(None);
            sent += 1;
        } else {
            skipped += 1;
        }
        sync.hold_fps(fps);

        if last_report.elapsed() >= Duration::from_secs(1) {
            log_info!(
                "[{}] frame {} ({:.1} fps, {} skipped)",
                name,
                sync.frame_number(),
                sync.fps(),
                skipped
            );
            last_report = Instant::now();
        }
    }

    log_info!("Sent {} frames, skipped {}", sent, skipped);
    Ok(())
}

fn run_receiver(mut sync: FrameSync, name: &str, frames: Option<u64>) -> Result<()> {
    if !sync.is_frame_count_policy_enabled() {
        log_warn!("Frame counting is off; every poll will report an untracked frame");
    }
    sync.create_access_lock(name)?;
    sync.enable_frame_count(name)?;
    log_info!("Receiving [{}]", name);

    let mut received = 0u64;
    let mut last_report = Instant::now();
    while frames.map_or(true, |limit| received < limit) {
        let access = sync.check_access(None);
        if access.is_granted() {
            let status = sync.poll_new_frame();
            // The texture read would happen here when the frame is new
            sync.allow_access(None);
            if status == FrameStatus::New {
                received += 1;
            }
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            log_info!(
                "[{}] frame {} ({:.1} fps, {} new)",
                name,
                sync.frame_number(),
                sync.fps(),
                received
            );
            last_report = Instant::now();
        }
        std::thread::sleep(Duration::from_millis(1));
    }

    log_info!("Received {} frames", received);
    Ok(())
}
