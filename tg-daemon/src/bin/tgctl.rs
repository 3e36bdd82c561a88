//! tgctl - operator client for thermguardd
//!
//! Talks to the daemon over its control socket.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use tg_core::constants::paths;
use tg_core::ControlClient;
use tg_protocol::{SensorSnapshot, CLEAR_OVERRIDE};

#[derive(Parser)]
#[command(name = "tgctl")]
#[command(version)]
#[command(about = "Control and inspect the thermguard temperature daemon")]
#[command(long_about = "Control and inspect the thermguard temperature daemon

EXAMPLES:
    tgctl sensors                 List every sensor with its status
    tgctl dump                    Print the support dump
    tgctl test base-1 96000       Force base-1 to 96 C
    tgctl test base-1 clear       Return base-1 to hardware readings
    tgctl exit                    Stop the daemon between ticks")]
#[command(propagate_version = true)]
struct Cli {
    /// Control socket path
    #[arg(short, long, default_value = paths::SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the support dump of every subsystem and sensor
    Dump,

    /// List sensors
    Sensors {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Force a sensor reading for testing
    Test {
        /// Sensor name, e.g. base-1
        sensor: String,
        /// Millidegrees Celsius, or "clear"
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Check that the daemon answers
    Ping,

    /// Print the daemon version
    Version,

    /// Ask the daemon to exit
    Exit,
}

fn parse_override(value: &str) -> anyhow::Result<i32> {
    if value.eq_ignore_ascii_case("clear") {
        return Ok(CLEAR_OVERRIDE);
    }
    value
        .parse::<i32>()
        .with_context(|| format!("Invalid temperature '{}': expected millidegrees or 'clear'", value))
}

fn print_sensors(sensors: &[SensorSnapshot]) {
    println!(
        "{:<16} {:<12} {:<14} {:<10} {:>9} {:>9} {:>9} {:>6}",
        "SENSOR", "SUBSYSTEM", "STATUS", "FAN", "TEMP", "MIN", "MAX", "FAULTS"
    );
    for s in sensors {
        let marker = if s.test_override.is_some() { " *" } else { "" };
        let (min, max) = extrema(s);
        println!(
            "{:<16} {:<12} {:<14} {:<10} {:>9.2} {:>9} {:>9} {:>6}{}",
            s.name,
            s.subsystem,
            s.status,
            s.fan_state,
            celsius(s.temperature),
            min,
            max,
            s.fault_count,
            marker
        );
    }
}

/// `n/a` until the sensor has produced a good reading
fn extrema(s: &SensorSnapshot) -> (String, String) {
    if s.min > s.max {
        ("n/a".into(), "n/a".into())
    } else {
        (format!("{:.2}", celsius(s.min)), format!("{:.2}", celsius(s.max)))
    }
}

fn celsius(millidegrees: i32) -> f64 {
    f64::from(millidegrees) / 1000.0
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut client = ControlClient::connect(&cli.socket)
        .with_context(|| format!("Connecting to {}", cli.socket.display()))?;

    match cli.command {
        Commands::Dump => print!("{}", client.dump()?),
        Commands::Sensors { json } => {
            let sensors = client.list_sensors()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sensors)?);
            } else {
                print_sensors(&sensors);
            }
        }
        Commands::Test { sensor, value } => {
            let millidegrees = parse_override(&value)?;
            client.test_override(&sensor, millidegrees)?;
            if millidegrees == CLEAR_OVERRIDE {
                println!("{}: override cleared", sensor);
            } else {
                println!("{}: forced to {:.2} C", sensor, celsius(millidegrees));
            }
        }
        Commands::Ping => println!("{}", client.ping()?),
        Commands::Version => println!("{}", client.version()?),
        Commands::Exit => {
            client.exit()?;
            println!("Exit requested");
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_test_command() {
        let cli = Cli::try_parse_from(["tgctl", "-s", "/tmp/tg.sock", "test", "base-1", "96000"]).unwrap();
        assert_eq!(cli.socket, PathBuf::from("/tmp/tg.sock"));
        match cli.command {
            Commands::Test { sensor, value } => {
                assert_eq!(sensor, "base-1");
                assert_eq!(parse_override(&value).unwrap(), 96_000);
            }
            _ => panic!("expected test subcommand"),
        }
    }

    #[test]
    fn test_override_values() {
        assert_eq!(parse_override("clear").unwrap(), CLEAR_OVERRIDE);
        assert_eq!(parse_override("-1").unwrap(), CLEAR_OVERRIDE);
        assert!(parse_override("hot").is_err());
        assert_eq!(parse_override("-5000").unwrap(), -5_000);
    }

    #[test]
    fn test_extrema_before_first_read() {
        let mut s = SensorSnapshot {
            name: "base-1".into(),
            subsystem: "base".into(),
            location: "inlet".into(),
            status: "normal".into(),
            fan_state: "normal".into(),
            temperature: 0,
            min: 1_000_000,
            max: -1_000_000,
            fault_count: 0,
            test_override: None,
        };
        assert_eq!(extrema(&s), ("n/a".to_string(), "n/a".to_string()));

        s.min = 38_500;
        s.max = 41_000;
        assert_eq!(extrema(&s), ("38.50".to_string(), "41.00".to_string()));
    }
}
