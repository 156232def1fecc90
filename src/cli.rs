use anyhow::{Result, anyhow};
use pico_args::Arguments;
use std::{env, net::SocketAddr, time::Instant};

use crate::config::{DaemonConfigState, Overrides};
use crate::daemon;
use crate::input::InputSource;
use crate::osc::{Delivery, OscMessage, OscSender, OscType};

const DEFAULT_SEND_TO: &str = "127.0.0.1:3335";

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let subcmd: Option<String> = pargs.subcommand()?;

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.opt_free_from_str()?;
            match topic {
                Some(t) => print_subcmd_help(&t),
                None => print_help(),
            }
            Ok(())
        }

        Some("listen") => {
            let profile: Option<String> = pargs.opt_value_from_str("--profile")?;
            let overrides = parse_overrides(&mut pargs)?;
            reject_leftovers(pargs)?;
            daemon::run_listen(profile.as_deref(), &overrides)
        }

        Some("send") => {
            let to: Option<SocketAddr> = pargs.opt_value_from_str("--to")?;
            let addr: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: ghopper send <address> [args...] [--to host:port]"))?;
            if !addr.starts_with('/') {
                return Err(anyhow!("OSC addresses start with '/': {addr}"));
            }
            let args = pargs
                .finish()
                .into_iter()
                .map(|a| {
                    a.into_string()
                        .map(|s| parse_arg(&s))
                        .map_err(|_| anyhow!("argument is not valid UTF-8"))
                })
                .collect::<Result<Vec<_>>>()?;
            let to = match to {
                Some(to) => to,
                None => DEFAULT_SEND_TO.parse()?,
            };
            send_once(to, OscMessage::new(addr, args))
        }

        Some("profiles") => {
            let st = DaemonConfigState::load_or_install_default()?;
            for name in st.list_profiles() {
                let mark = if name == st.active_name { '*' } else { ' ' };
                println!("{mark} {name}");
            }
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: ghopper use <profile_name>"))?;
            let mut st = DaemonConfigState::load_or_install_default()?;
            st.set_active(&name)?;
            println!("active profile: {}", st.active_name);
            Ok(())
        }

        Some("doctor") => {
            let st = DaemonConfigState::load_or_install_default()?;
            print_response(&st.doctor_report());
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn parse_overrides(pargs: &mut Arguments) -> Result<Overrides> {
    Ok(Overrides {
        port: pargs.opt_value_from_str("--daemonspeak")?,
        source: pargs.opt_value_from_str::<_, InputSource>("--source")?,
        allowed_sender: pargs.opt_value_from_str("--allow")?,
    })
}

fn reject_leftovers(pargs: Arguments) -> Result<()> {
    let rest = pargs.finish();
    if !rest.is_empty() {
        return Err(anyhow!("unexpected arguments: {rest:?}"));
    }
    Ok(())
}

/// Int, then float, then string.
pub fn parse_arg(s: &str) -> OscType {
    if let Ok(i) = s.parse::<i32>() {
        return OscType::Int(i);
    }
    if let Ok(f) = s.parse::<f32>() {
        if f.is_finite() {
            return OscType::Float(f);
        }
    }
    OscType::String(s.to_string())
}

fn send_once(to: SocketAddr, msg: OscMessage) -> Result<()> {
    let mut sender = OscSender::connect(to);
    match sender.send(&msg, Instant::now()) {
        Delivery::Sent => {
            println!("ok: sent {} to {to}", msg.addr);
            Ok(())
        }
        Delivery::Queued => {
            if sender.flush() > 0 {
                println!("ok: sent {} to {to}", msg.addr);
                Ok(())
            } else {
                Err(anyhow!("could not send {} to {to}", msg.addr))
            }
        }
    }
}

fn print_help() {
    println!(
        r#"ghopper - multi-touch gesture and OSC/TUIO input daemon

USAGE:
  ghopper help [command]                  Show general or command-specific help
  ghopper listen [flags]                  Receive input, print gestures as JSON lines
  ghopper send <address> [args...]        Send one OSC message
  ghopper profiles                        List profiles
  ghopper use <name>                      Switch active profile
  ghopper doctor                          Diagnose permissions/devices

LISTEN FLAGS:
  --profile <name>                        Use this profile instead of the active one
  --daemonspeak <port>                    UDP port for OSC/TUIO (default 3336)
  --source <tuio|touch|mouse>             Input source
  --allow <ip>                            Only accept datagrams from this sender

TIPS:
  - Profiles: ~/.config/ghopper/profiles
  - Active profile pointer: ~/.config/ghopper/active
  - Log level: RUST_LOG=debug ghopper listen
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "listen" => println!(
            "usage: ghopper listen [--profile <name>] [--daemonspeak <port>] [--source <tuio|touch|mouse>] [--allow <ip>]\n\
             Runs the frame loop until SIGINT/SIGTERM. Edits to the active profile are picked up live."
        ),
        "send" => println!(
            "usage: ghopper send <address> [args...] [--to host:port]\n\
             Arguments are sent as int, else float, else string. Default destination {DEFAULT_SEND_TO}."
        ),
        "profiles" => println!("usage: ghopper profiles\nLists available profiles; marks active with '*'."),
        "use" => println!("usage: ghopper use <name>\nSwitches the active profile to <name>."),
        "doctor" => println!(
            "usage: ghopper doctor\nChecks input-group membership and lists detected touch and pointer devices."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_arguments_prefer_int_then_float() {
        assert_eq!(parse_arg("42"), OscType::Int(42));
        assert_eq!(parse_arg("-7"), OscType::Int(-7));
        assert_eq!(parse_arg("0.5"), OscType::Float(0.5));
        assert_eq!(parse_arg("hello"), OscType::String("hello".into()));
        assert_eq!(parse_arg("inf"), OscType::String("inf".into()));
    }

    #[test]
    fn listen_flags_become_overrides() {
        let mut pargs = Arguments::from_vec(
            ["--daemonspeak", "4000", "--source", "mouse", "--allow", "10.0.0.9"]
                .into_iter()
                .map(Into::into)
                .collect(),
        );
        let o = parse_overrides(&mut pargs).unwrap();
        assert_eq!(o.port, Some(4000));
        assert_eq!(o.source, Some(InputSource::Mouse));
        assert_eq!(o.allowed_sender.as_deref(), Some("10.0.0.9"));

        let mut bad = Arguments::from_vec(vec!["--source".into(), "pen".into()]);
        assert!(parse_overrides(&mut bad).is_err());
    }
}
