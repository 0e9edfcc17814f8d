use std::{process, time::Duration};

use log::debug;
use structopt::StructOpt;

use mcstat::{target::DEFAULT_PORT, ProbeConfig, ProbeMethod, ProbeResult, StatusProbe, Target};

#[derive(StructOpt, Debug)]
#[structopt(name = "mcstat", about = "Show the status of Minecraft servers.")]
struct Opt {
    /// Exchange to use: ping, basic or full
    #[structopt(short, long, default_value = "ping")]
    method: ProbeMethod,

    /// Seconds to wait on connect and on each read or write
    #[structopt(short, long, default_value = "5")]
    timeout: f64,

    /// Print the outcome as JSON
    #[structopt(long)]
    json: bool,

    /// Servers to probe, as HOST or HOST:PORT
    #[structopt(required = true)]
    hosts: Vec<String>,
}

/// Drops `§x` formatting codes.
fn strip_formatting(motd: &str) -> String {
    let mut out = String::with_capacity(motd.len());
    let mut chars = motd.chars();
    while let Some(c) = chars.next() {
        if c == '§' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

fn summary(target: &Target, result: &ProbeResult) -> String {
    let mut message = target.hostname.clone();
    if target.port != DEFAULT_PORT {
        message.push_str(&format!(":{}", target.port));
    }
    let version = match result {
        ProbeResult::Ping(r) => r.server_version.as_str(),
        ProbeResult::Basic(r) => r.gametype.as_str(),
        ProbeResult::Full(r) => r.version().unwrap_or(&r.gametype),
    };
    format!(
        "{} {} {}/{} {}ms\n{}",
        message,
        version,
        result.player_count(),
        result.player_max(),
        result.latency_ms(),
        strip_formatting(result.motd())
    )
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let opt = Opt::from_args();

    let seconds = if opt.timeout.is_nan() { 5.0 } else { opt.timeout.clamp(0.0, 3600.0) };
    let config = ProbeConfig::builder()
        .timeout(Duration::from_secs_f64(seconds))
        .build();

    let mut errors = 0usize;
    for host in &opt.hosts {
        let target = match host.parse::<Target>() {
            Ok(target) => target,
            Err(e) => {
                eprintln!("Invalid host {} ({})", host, e);
                errors += 1;
                continue;
            }
        };

        let probe = StatusProbe::new(target.clone(), config.clone());
        let outcome = probe.probe(opt.method);
        debug!("{} history entries for {}", probe.history().len(), target);

        if opt.json {
            let value = serde_json::json!({ "target": &target, "method": opt.method, "outcome": &outcome });
            match colored_json::to_colored_json_auto(&value) {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("Could not render JSON for {} ({})", target, e),
            }
        }

        match outcome {
            Ok(result) => {
                if !opt.json {
                    println!("{}", summary(&target, &result));
                }
            }
            Err(e) => {
                eprintln!("Error probing {} ({})", target, e);
                errors += 1;
            }
        }
    }

    process::exit(errors.min(255) as i32);
}

#[cfg(test)]
mod tests {
    use mcstat::PingResult;

    use super::*;

    #[test]
    fn formatting_codes_are_stripped() {
        assert_eq!(strip_formatting("§aHello §lWorld§"), "Hello World");
        assert_eq!(strip_formatting("plain"), "plain");
    }

    #[test]
    fn summary_omits_default_port() {
        let result = ProbeResult::Ping(PingResult {
            protocol_version: "127".to_string(),
            server_version: "1.8.9".to_string(),
            motd: "§1A Server".to_string(),
            player_count: "3".to_string(),
            player_max: "20".to_string(),
            latency_ms: 12,
        });
        assert_eq!(
            summary(&Target::new("example.org", 25565), &result),
            "example.org 1.8.9 3/20 12ms\nA Server"
        );
        assert!(summary(&Target::new("example.org", 25570), &result).starts_with("example.org:25570 "));
    }
}
